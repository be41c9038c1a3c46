//! Canonical signing bytes.
//!
//! Every signed message is reduced to one byte string before signing:
//! 1. Take the "unsigned view" of the object (signature field removed)
//! 2. Encode it as CBOR
//! 3. Prefix `SIGNING_DOMAIN || schema_hash(schema_id)`
//!
//! Signer and verifier run the same procedure, so the signature covers
//! every field except itself.

use crate::error::{CryptoError, CryptoResult};

/// Domain separation prefix for canonical signing.
pub const SIGNING_DOMAIN: &[u8] = b"SEGREPAIR-SIGN-V1";

/// Schema hash size in bytes.
pub const SCHEMA_HASH_SIZE: usize = 8;

/// `BLAKE3(schema_id)[0..8]`.
#[must_use]
pub fn schema_hash(schema_id: &str) -> [u8; SCHEMA_HASH_SIZE] {
    let hash = blake3::hash(schema_id.as_bytes());
    let mut result = [0u8; SCHEMA_HASH_SIZE];
    result.copy_from_slice(&hash.as_bytes()[..SCHEMA_HASH_SIZE]);
    result
}

/// Build `SIGNING_DOMAIN || schema_hash || cbor_bytes`.
#[must_use]
pub fn canonical_signing_bytes(schema_id: &str, cbor_bytes: &[u8]) -> Vec<u8> {
    let schema = schema_hash(schema_id);
    let mut result = Vec::with_capacity(SIGNING_DOMAIN.len() + SCHEMA_HASH_SIZE + cbor_bytes.len());
    result.extend_from_slice(SIGNING_DOMAIN);
    result.extend_from_slice(&schema);
    result.extend_from_slice(cbor_bytes);
    result
}

/// Encode a value as CBOR.
///
/// Struct fields are emitted in declaration order, so encoding the same
/// unsigned view always yields the same bytes.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_deterministic_cbor<T: serde::Serialize>(value: &T) -> CryptoResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| CryptoError::SerializationError(e.to_string()))?;
    Ok(bytes)
}

/// An object that is signed over its canonical bytes.
pub trait Signable {
    /// Schema identifier, e.g. `"segrepair.OrderLimit/1"`.
    fn schema_id(&self) -> &'static str;

    /// CBOR encoding of the object without its signature.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn unsigned_cbor(&self) -> CryptoResult<Vec<u8>>;

    /// Full signing bytes with domain separation.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn signing_bytes(&self) -> CryptoResult<Vec<u8>> {
        let cbor = self.unsigned_cbor()?;
        Ok(canonical_signing_bytes(self.schema_id(), &cbor))
    }
}
