//! Error types for signing and verification.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Byte string of the wrong length for a key or signature.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length provided.
        actual: usize,
    },

    /// Signature did not verify against the message and key.
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// Bytes do not encode a valid Ed25519 point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// A message that must be signed was missing its signature.
    #[error("missing signature")]
    MissingSignature,

    /// Deterministic encoding of a message failed.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type alias for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
