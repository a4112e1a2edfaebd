//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system resources (time, randomness). Tests
//! drive a virtual clock and a seeded generator; production uses the system
//! clock and OS entropy.

use std::time::Duration;

/// Time, randomness and sleeping.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - `wall_clock_secs()` is unix time; it only feeds persisted timestamps and
///   freshness windows, never retransmission timing
/// - `random_bytes()` uses OS entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    type Instant: Copy
        + Ord
        + Send
        + Sync
        + std::fmt::Debug
        + std::ops::Sub<Output = Duration>
        + std::ops::Add<Duration, Output = Self::Instant>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Current unix time in seconds.
    fn wall_clock_secs(&self) -> u64;

    /// Sleep for `duration`. Only driver code awaits this.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random `u32`.
    fn random_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    /// Random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    /// Random 16-byte key.
    fn random_key(&self) -> [u8; 16] {
        let mut key = [0u8; 16];
        self.random_bytes(&mut key);
        key
    }
}
