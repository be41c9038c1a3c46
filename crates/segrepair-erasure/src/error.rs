//! Erasure coding error types.

use thiserror::Error;

/// Errors from scheme validation, encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErasureError {
    /// Scheme parameters are inconsistent.
    #[error("invalid redundancy scheme: {0}")]
    InvalidScheme(String),

    /// Fewer piece readers than the scheme requires.
    #[error("not enough pieces to decode: got {got}, required {required}")]
    NotEnoughPieces {
        /// Readers supplied.
        got: usize,
        /// Readers needed.
        required: usize,
    },

    /// Piece index outside `0..total`.
    #[error("piece index {index} out of range for {total} pieces")]
    PieceIndexOutOfRange {
        /// Offending index.
        index: usize,
        /// Total pieces in the scheme.
        total: usize,
    },

    /// The underlying Reed-Solomon codec rejected the operation.
    #[error("reed-solomon: {0}")]
    Codec(String),
}

impl From<reed_solomon_erasure::Error> for ErasureError {
    fn from(err: reed_solomon_erasure::Error) -> Self {
        Self::Codec(format!("{err:?}"))
    }
}
