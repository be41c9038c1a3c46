//! Error types for order limits and piece hashes.

use segrepair_crypto::CryptoError;
use thiserror::Error;

use crate::ids::NodeId;

/// Errors raised while issuing, signing or checking orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Signing or signature verification failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The limit claims a satellite other than the one verifying it.
    #[error("order limit satellite mismatch: expected {expected}, got {actual}")]
    SatelliteMismatch {
        /// Satellite doing the verification.
        expected: NodeId,
        /// Satellite named in the limit.
        actual: NodeId,
    },

    /// Too few nodes to produce a usable set of limits.
    #[error("not enough nodes available: got {got}, required {required}")]
    NotEnoughNodes {
        /// Limits that could be created.
        got: usize,
        /// Limits needed.
        required: usize,
    },

    /// A piece number does not fit the redundancy layout.
    #[error("piece num greater than total pieces: {piece_num} >= {total}")]
    PieceNumOutOfRange {
        /// Offending piece number.
        piece_num: usize,
        /// Total pieces in the layout.
        total: usize,
    },

    /// Configured order expiration does not fit a timestamp.
    #[error("order expiration out of range: {0:?}")]
    InvalidExpiration(std::time::Duration),
}

/// Result alias for order operations.
pub type OrderResult<T> = Result<T, OrderError>;
