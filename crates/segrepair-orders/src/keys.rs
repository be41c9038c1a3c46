//! Per-segment piece keys.
//!
//! The satellite mints a fresh key pair for every segment action. The public
//! half goes into each order limit; the private half is handed to whoever
//! talks to the storage nodes and signs the piece hashes it uploads.

use segrepair_crypto::{Ed25519Signature, Ed25519SigningKey, Ed25519VerifyingKey, CryptoResult};
use serde::{Deserialize, Serialize};

/// Private half of a piece key pair.
#[derive(Clone, Debug)]
pub struct PiecePrivateKey(Ed25519SigningKey);

/// Public half of a piece key pair, embedded in order limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PiecePublicKey(Ed25519VerifyingKey);

/// Generate a fresh piece key pair.
#[must_use]
pub fn new_piece_key_pair() -> (PiecePublicKey, PiecePrivateKey) {
    let private = PiecePrivateKey(Ed25519SigningKey::generate());
    (private.public_key(), private)
}

impl PiecePrivateKey {
    /// Wrap an existing signing key.
    #[must_use]
    pub const fn from_signing_key(key: Ed25519SigningKey) -> Self {
        Self(key)
    }

    /// Matching public key.
    #[must_use]
    pub fn public_key(&self) -> PiecePublicKey {
        PiecePublicKey(self.0.verifying_key())
    }

    /// Sign raw bytes.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        self.0.sign(message)
    }
}

impl PiecePublicKey {
    /// Wrap an existing verifying key.
    #[must_use]
    pub const fn from_verifying_key(key: Ed25519VerifyingKey) -> Self {
        Self(key)
    }

    /// Borrow the inner verifying key.
    #[must_use]
    pub const fn verifying_key(&self) -> &Ed25519VerifyingKey {
        &self.0
    }

    /// Verify a signature over raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature does not match.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> CryptoResult<()> {
        self.0.verify(message, signature)
    }
}
