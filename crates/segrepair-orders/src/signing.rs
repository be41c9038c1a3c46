//! Satellite and uplink signatures over limits and piece hashes.

use segrepair_crypto::{CryptoError, Ed25519Signature, Ed25519SigningKey, Ed25519VerifyingKey, Signable};

use crate::error::{OrderError, OrderResult};
use crate::ids::NodeId;
use crate::keys::{PiecePrivateKey, PiecePublicKey};
use crate::limit::{OrderLimit, PieceHash};

/// Something that can sign on behalf of an identity.
pub trait Signer: Send + Sync {
    /// Identity the signatures belong to.
    fn id(&self) -> NodeId;

    /// Sign raw bytes.
    fn sign(&self, message: &[u8]) -> Ed25519Signature;
}

/// Something that can check signatures made by an identity.
pub trait Signee: Send + Sync {
    /// Identity whose signatures are checked.
    fn id(&self) -> NodeId;

    /// Check a signature over raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature does not verify.
    fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CryptoError>;
}

/// Full satellite identity (signing key plus derived node ID).
#[derive(Clone, Debug)]
pub struct SatelliteIdentity {
    id: NodeId,
    key: Ed25519SigningKey,
}

impl SatelliteIdentity {
    /// Identity for an existing signing key.
    #[must_use]
    pub fn new(key: Ed25519SigningKey) -> Self {
        Self {
            id: NodeId::from_public_key(&key.verifying_key()),
            key,
        }
    }

    /// Fresh random identity.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Ed25519SigningKey::generate())
    }

    /// Public-only view for parties that verify but never sign.
    #[must_use]
    pub fn signee(&self) -> SatelliteSignee {
        SatelliteSignee {
            id: self.id,
            key: self.key.verifying_key(),
        }
    }
}

impl Signer for SatelliteIdentity {
    fn id(&self) -> NodeId {
        self.id
    }

    fn sign(&self, message: &[u8]) -> Ed25519Signature {
        self.key.sign(message)
    }
}

impl Signee for SatelliteIdentity {
    fn id(&self) -> NodeId {
        self.id
    }

    fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CryptoError> {
        self.key.verifying_key().verify(message, signature)
    }
}

/// Satellite public identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SatelliteSignee {
    id: NodeId,
    key: Ed25519VerifyingKey,
}

impl SatelliteSignee {
    #[must_use]
    pub fn new(key: Ed25519VerifyingKey) -> Self {
        Self {
            id: NodeId::from_public_key(&key),
            key,
        }
    }
}

impl Signee for SatelliteSignee {
    fn id(&self) -> NodeId {
        self.id
    }

    fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CryptoError> {
        self.key.verify(message, signature)
    }
}

/// Sign an order limit as the satellite, returning the signed copy.
///
/// # Errors
///
/// Returns an error if the limit cannot be encoded.
pub fn sign_order_limit(satellite: &dyn Signer, mut limit: OrderLimit) -> OrderResult<OrderLimit> {
    let bytes = limit.signing_bytes()?;
    limit.satellite_signature = Some(satellite.sign(&bytes));
    Ok(limit)
}

/// Check that `limit` was signed by `satellite`.
///
/// # Errors
///
/// Returns an error if the limit names another satellite, carries no
/// signature, or the signature does not verify.
pub fn verify_order_limit_signature(satellite: &dyn Signee, limit: &OrderLimit) -> OrderResult<()> {
    if limit.satellite_id != satellite.id() {
        return Err(OrderError::SatelliteMismatch {
            expected: satellite.id(),
            actual: limit.satellite_id,
        });
    }
    let signature = limit
        .satellite_signature
        .as_ref()
        .ok_or(CryptoError::MissingSignature)?;
    satellite.verify(&limit.signing_bytes()?, signature)?;
    Ok(())
}

/// Sign a piece hash with the uplink's piece private key.
///
/// # Errors
///
/// Returns an error if the hash cannot be encoded.
pub fn sign_uplink_piece_hash(key: &PiecePrivateKey, mut hash: PieceHash) -> OrderResult<PieceHash> {
    let bytes = hash.signing_bytes()?;
    hash.signature = Some(key.sign(&bytes));
    Ok(hash)
}

/// Check that `hash` was signed by the holder of the piece private key.
///
/// # Errors
///
/// Returns an error if the hash carries no signature or it does not verify.
pub fn verify_uplink_piece_hash_signature(key: &PiecePublicKey, hash: &PieceHash) -> OrderResult<()> {
    let signature = hash.signature.as_ref().ok_or(CryptoError::MissingSignature)?;
    key.verify(&hash.signing_bytes()?, signature)?;
    Ok(())
}
