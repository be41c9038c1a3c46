//! Piece content hashing.
//!
//! Pieces are hashed with SHA-256 as they stream in, so verification never
//! needs a second pass over the bytes.

use sha2::{Digest, Sha256};

/// Size of a piece hash in bytes.
pub const PIECE_HASH_SIZE: usize = 32;

/// Incremental piece hasher.
#[derive(Clone, Default)]
pub struct PieceHasher {
    inner: Sha256,
    written: u64,
}

impl PieceHasher {
    /// Create an empty hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more piece bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.written += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Finish and return the digest.
    #[must_use]
    pub fn finalize(self) -> Vec<u8> {
        self.inner.finalize().to_vec()
    }
}

impl std::fmt::Debug for PieceHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PieceHasher")
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}

/// Hash a complete piece in one call.
#[must_use]
pub fn hash_piece(data: &[u8]) -> Vec<u8> {
    let mut hasher = PieceHasher::new();
    hasher.update(data);
    hasher.finalize()
}
