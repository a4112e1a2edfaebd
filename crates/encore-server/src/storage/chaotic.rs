//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails operations so tests can check that
//! every handler turns repository failures into `OperationError` replies and
//! keeps serving.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use super::{Collection, Storage, StorageError};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but fails operations
/// with probability `failure_rate`. The RNG is seeded, so a failing run
/// replays exactly.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    rng: Arc<Mutex<ChaoticRng>>,
    operation_count: Arc<AtomicUsize>,
}

/// Linear congruential generator; fast and reproducible.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // Numerical Recipes constants
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrap `inner` with a fixed default seed.
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with an explicit seed. `failure_rate` is clamped to
    /// [0.0, 1.0].
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        Self {
            inner,
            failure_rate: failure_rate.clamp(0.0, 1.0),
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::Relaxed)
    }

    fn roll(&self) -> Result<(), StorageError> {
        self.operation_count.fetch_add(1, Ordering::Relaxed);
        let roll = self.rng.lock().unwrap_or_else(PoisonError::into_inner).next();
        if roll < self.failure_rate {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.roll()?;
        self.inner.get(collection, key)
    }

    fn put(&self, collection: Collection, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.roll()?;
        self.inner.put(collection, key, value)
    }

    fn insert_new(&self, collection: Collection, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.roll()?;
        self.inner.insert_new(collection, key, value)
    }

    fn delete(&self, collection: Collection, key: &str) -> Result<bool, StorageError> {
        self.roll()?;
        self.inner.delete(collection, key)
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        self.roll()?;
        self.inner.scan(collection)
    }

    fn increment(&self, counter: &str) -> Result<u64, StorageError> {
        self.roll()?;
        self.inner.increment(counter)
    }
}
