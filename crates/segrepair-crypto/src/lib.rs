//! Cryptographic building blocks for the segment repair data path.
//!
//! Two parties sign things the repairer has to check:
//! - the **satellite** signs every order limit it hands out;
//! - the **uplink** (via the per-segment piece key) signs every piece hash
//!   at upload time, and storage nodes echo that signed hash back on
//!   download.
//!
//! # Modules
//!
//! - [`ed25519`] - Ed25519 keys and signatures
//! - [`canonicalize`] - Deterministic signing bytes for structured messages
//! - [`hash`] - Streaming piece content hash
//!
//! # Example
//!
//! ```rust
//! use segrepair_crypto::ed25519::Ed25519SigningKey;
//!
//! let sk = Ed25519SigningKey::generate();
//! let sig = sk.sign_with_context(b"order-limit", b"serialized limit");
//! assert!(sk
//!     .verifying_key()
//!     .verify_with_context(b"order-limit", b"serialized limit", &sig)
//!     .is_ok());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod canonicalize;
pub mod ed25519;
pub mod error;
pub mod hash;

pub use canonicalize::{Signable, canonical_signing_bytes, to_deterministic_cbor};
pub use ed25519::{Ed25519Signature, Ed25519SigningKey, Ed25519VerifyingKey};
pub use error::{CryptoError, CryptoResult};
pub use hash::{PIECE_HASH_SIZE, PieceHasher, hash_piece};
