//! Piece verification.
//!
//! Pure checks over what a node returned; nothing here touches the network,
//! so a malicious node can be simulated with plain values.

use segrepair_orders::{
    OrderLimit, PieceHash, Signee, verify_order_limit_signature as verify_satellite_signature,
    verify_uplink_piece_hash_signature,
};

use crate::error::VerifyError;

/// Check a node-returned piece hash against its order limit and the hash of
/// the bytes actually received.
///
/// # Errors
///
/// Returns the first check that fails: empty calculated hash, piece ID
/// mismatch, hash mismatch, then the uplink signature on the hash.
pub fn verify_piece_hash(
    limit: &OrderLimit,
    hash: &PieceHash,
    expected_hash: &[u8],
) -> Result<(), VerifyError> {
    if expected_hash.is_empty() {
        return Err(VerifyError::InvalidArguments);
    }
    if limit.piece_id != hash.piece_id {
        return Err(VerifyError::PieceIdChanged {
            expected: limit.piece_id,
            actual: hash.piece_id,
        });
    }
    if hash.hash != expected_hash {
        return Err(VerifyError::HashMismatch {
            signed: hash.hash.clone(),
            calculated: expected_hash.to_vec(),
        });
    }
    verify_uplink_piece_hash_signature(&limit.uplink_public_key, hash)
        .map_err(VerifyError::InvalidHashSignature)
}

/// Check that `limit` was signed by the trusted satellite.
///
/// # Errors
///
/// Returns [`VerifyError::InvalidOrderLimitSignature`] otherwise.
pub fn verify_order_limit_signature(
    satellite: &dyn Signee,
    limit: &OrderLimit,
) -> Result<(), VerifyError> {
    verify_satellite_signature(satellite, limit).map_err(VerifyError::InvalidOrderLimitSignature)
}
