//! Fixed-size identifiers: storage nodes, pieces and order serial numbers.

use std::fmt;

use segrepair_crypto::Ed25519VerifyingKey;
use serde::{Deserialize, Serialize};

macro_rules! byte_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(#[serde(with = "hex_or_bytes")] [u8; $len]);

        impl $name {
            /// Length in bytes.
            pub const LEN: usize = $len;

            /// Construct from raw bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Borrow the raw bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Fresh random identifier.
            #[must_use]
            pub fn random() -> Self {
                Self(rand::random())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.to_string()).finish()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

byte_id!(
    /// Identity of a storage node or satellite.
    NodeId,
    32
);

byte_id!(
    /// Identifier of a single stored piece.
    PieceId,
    32
);

byte_id!(
    /// Serial number shared by every order limit of one segment action.
    SerialNumber,
    16
);

impl NodeId {
    /// Derive the node identity from its public key.
    #[must_use]
    pub fn from_public_key(key: &Ed25519VerifyingKey) -> Self {
        let mut h = blake3::Hasher::new();
        h.update(b"SEGREPAIR-NODE-ID-V1");
        h.update(&key.to_bytes());
        Self(*h.finalize().as_bytes())
    }
}

impl PieceId {
    /// Derive the piece ID stored on `node_id` for piece number `piece_num`.
    ///
    /// Every node holding a piece of the same segment sees a distinct ID, all
    /// derived from the segment's root piece ID.
    #[must_use]
    pub fn derive(&self, node_id: &NodeId, piece_num: u16) -> Self {
        let mut h = blake3::Hasher::new_keyed(&self.0);
        h.update(node_id.as_bytes());
        h.update(&piece_num.to_be_bytes());
        Self(*h.finalize().as_bytes())
    }
}

/// Serialize byte arrays as hex for human-readable formats and raw bytes otherwise.
mod hex_or_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(bytes))
        } else {
            serializer.serialize_bytes(bytes)
        }
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec = if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            hex::decode(s).map_err(serde::de::Error::custom)?
        } else {
            deserializer.deserialize_bytes(BytesVisitor)?
        };
        vec.as_slice().try_into().map_err(|_| {
            serde::de::Error::custom(format!("expected {N} bytes, got {}", vec.len()))
        })
    }

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
            let mut out = Vec::new();
            while let Some(b) = seq.next_element::<u8>()? {
                out.push(b);
            }
            Ok(out)
        }
    }
}
