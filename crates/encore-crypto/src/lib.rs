//! Encore Cryptographic Primitives
//!
//! The legacy primitives spoken by the client family. Pure functions with
//! deterministic outputs; callers provide random bytes (session keys, info
//! keys) so every ticket can be reproduced in tests.
//!
//! # Ticket Flow
//!
//! ```text
//! password, pid
//!        │
//!        ▼
//! MD5^N  → user key K          (N = 65000 + pid % 1024)
//!        │
//!        ▼
//! RC4_K(session_key ‖ 1 ‖ 0x24 ‖ buffer{RC4_Kinfo(info)})
//!        │
//!        ▼
//! ‖ HMAC-MD5_K(encrypted body) → ticket
//! ```
//!
//! The auth endpoint builds the ticket at login; the secure endpoint verifies
//! it on CONNECT and rekeys the connection cipher with the session key.
//!
//! # Security
//!
//! None of this is modern cryptography. RC4 and MD5 are kept because the
//! deployed clients require them; nothing here should be reused elsewhere.
//! Key material is zeroized on drop.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod kerberos;
pub mod signature;
pub mod stream_cipher;

pub use error::CryptoError;
pub use kerberos::{IssuedTicket, SessionKey, UserKey, build_ticket, derive_user_key, verify_ticket};
pub use signature::{data_signature, hmac_md5};
pub use stream_cipher::Rc4;
