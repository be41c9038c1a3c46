//! Ed25519 signing and verification.
//!
//! Thin wrappers around ed25519-dalek. Satellite identities and per-segment
//! piece keys are both Ed25519 key pairs; the wrappers add context-separated
//! signing so an order-limit signature can never be replayed as a piece-hash
//! signature.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};

/// Ed25519 secret key size in bytes.
pub const SECRET_KEY_SIZE: usize = 32;

/// Ed25519 public key size in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 signature size in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Ed25519 signing key (secret key).
///
/// The inner dalek key zeroizes itself on drop.
pub struct Ed25519SigningKey {
    inner: SigningKey,
}

impl Ed25519SigningKey {
    /// Generate a new random signing key.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            inner: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Create from raw secret key bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; SECRET_KEY_SIZE]) -> Self {
        Self {
            inner: SigningKey::from_bytes(bytes),
        }
    }

    /// Export the secret key bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_SIZE] {
        self.inner.to_bytes()
    }

    /// Get the corresponding verifying (public) key.
    #[must_use]
    pub fn verifying_key(&self) -> Ed25519VerifyingKey {
        Ed25519VerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Sign raw message bytes.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature {
            inner: self.inner.sign(message),
        }
    }

    /// Sign with domain separation.
    ///
    /// Computes `Sign(BLAKE3(context || message))`.
    #[must_use]
    pub fn sign_with_context(&self, context: &[u8], message: &[u8]) -> Ed25519Signature {
        self.sign(context_digest(context, message).as_bytes())
    }
}

impl Clone for Ed25519SigningKey {
    fn clone(&self) -> Self {
        Self::from_bytes(&self.inner.to_bytes())
    }
}

impl std::fmt::Debug for Ed25519SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519SigningKey")
            .field("public", &hex::encode(self.inner.verifying_key().as_bytes()))
            .finish_non_exhaustive()
    }
}

fn context_digest(context: &[u8], message: &[u8]) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(context);
    hasher.update(message);
    hasher.finalize()
}

/// Ed25519 verifying key (public key).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519VerifyingKey {
    inner: VerifyingKey,
}

impl Ed25519VerifyingKey {
    /// Create from raw public key bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid Ed25519 public key.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_SIZE]) -> CryptoResult<Self> {
        let inner = VerifyingKey::from_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { inner })
    }

    /// Export the public key bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.inner.to_bytes()
    }

    /// Verify a signature over raw message bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature is invalid.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> CryptoResult<()> {
        self.inner
            .verify(message, &signature.inner)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }

    /// Verify a signature produced by [`Ed25519SigningKey::sign_with_context`].
    ///
    /// # Errors
    ///
    /// Returns an error if the signature is invalid.
    pub fn verify_with_context(
        &self,
        context: &[u8],
        message: &[u8],
        signature: &Ed25519Signature,
    ) -> CryptoResult<()> {
        self.verify(context_digest(context, message).as_bytes(), signature)
    }
}

impl std::fmt::Debug for Ed25519VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519VerifyingKey({})", hex::encode(self.to_bytes()))
    }
}

impl Serialize for Ed25519VerifyingKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Ed25519VerifyingKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = serde_bytes_vec(deserializer)?;
        let arr: [u8; PUBLIC_KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            serde::de::Error::custom(format!(
                "invalid public key length: expected {PUBLIC_KEY_SIZE}, got {}",
                bytes.len()
            ))
        })?;
        Self::from_bytes(&arr).map_err(serde::de::Error::custom)
    }
}

/// Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature {
    inner: Signature,
}

impl Ed25519Signature {
    /// Create from raw signature bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; SIGNATURE_SIZE]) -> Self {
        Self {
            inner: Signature::from_bytes(bytes),
        }
    }

    /// Export the signature bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        self.inner.to_bytes()
    }

    /// Try to create from a slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly `SIGNATURE_SIZE` bytes.
    pub fn try_from_slice(slice: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; SIGNATURE_SIZE] =
            slice
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: SIGNATURE_SIZE,
                    actual: slice.len(),
                })?;
        Ok(Self::from_bytes(&arr))
    }
}

impl std::fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519Signature({})", hex::encode(self.to_bytes()))
    }
}

impl Serialize for Ed25519Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = serde_bytes_vec(deserializer)?;
        Self::try_from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Accept either a byte string (binary formats) or a sequence of integers
/// (self-describing text formats such as JSON).
fn serde_bytes_vec<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct BytesVisitor;

    impl<'de> serde::de::Visitor<'de> for BytesVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a byte string")
        }

        fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::SeqAccess<'de>,
        {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(b) = seq.next_element::<u8>()? {
                out.push(b);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_bytes(BytesVisitor)
}
