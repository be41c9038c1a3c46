//! Order limits and the piece hashes nodes return for them.

use std::fmt;

use chrono::{DateTime, Utc};
use segrepair_crypto::{CryptoResult, Ed25519Signature, Signable, to_deterministic_cbor};
use serde::{Deserialize, Serialize};

use crate::ids::{NodeId, PieceId, SerialNumber};
use crate::keys::PiecePublicKey;

/// What an order limit authorizes the holder to do with a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceAction {
    /// Customer download.
    Get,
    /// Customer upload.
    Put,
    /// Audit download.
    GetAudit,
    /// Repair download.
    GetRepair,
    /// Repair upload.
    PutRepair,
    /// Piece deletion.
    Delete,
}

impl PieceAction {
    /// Whether the action moves bytes from the node to the caller.
    #[must_use]
    pub const fn is_download(self) -> bool {
        matches!(self, Self::Get | Self::GetAudit | Self::GetRepair)
    }

    /// Whether the action moves bytes from the caller to the node.
    #[must_use]
    pub const fn is_upload(self) -> bool {
        matches!(self, Self::Put | Self::PutRepair)
    }
}

impl fmt::Display for PieceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::GetAudit => "GET_AUDIT",
            Self::GetRepair => "GET_REPAIR",
            Self::PutRepair => "PUT_REPAIR",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Satellite-signed authorization for one node to serve one piece action.
///
/// Limits are immutable once signed; every field except
/// `satellite_signature` is covered by the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLimit {
    pub serial_number: SerialNumber,
    pub satellite_id: NodeId,
    pub uplink_public_key: PiecePublicKey,
    pub storage_node_id: NodeId,
    pub piece_id: PieceId,
    pub action: PieceAction,
    /// Maximum number of bytes the action may transfer.
    pub limit: u64,
    pub piece_expiration: Option<DateTime<Utc>>,
    pub order_creation: DateTime<Utc>,
    pub order_expiration: DateTime<Utc>,
    pub satellite_signature: Option<Ed25519Signature>,
}

#[derive(Serialize)]
struct UnsignedOrderLimit<'a> {
    serial_number: &'a SerialNumber,
    satellite_id: &'a NodeId,
    uplink_public_key: &'a PiecePublicKey,
    storage_node_id: &'a NodeId,
    piece_id: &'a PieceId,
    action: PieceAction,
    limit: u64,
    piece_expiration: Option<i64>,
    order_creation: i64,
    order_expiration: i64,
}

impl Signable for OrderLimit {
    fn schema_id(&self) -> &'static str {
        "segrepair.OrderLimit/1"
    }

    fn unsigned_cbor(&self) -> CryptoResult<Vec<u8>> {
        to_deterministic_cbor(&UnsignedOrderLimit {
            serial_number: &self.serial_number,
            satellite_id: &self.satellite_id,
            uplink_public_key: &self.uplink_public_key,
            storage_node_id: &self.storage_node_id,
            piece_id: &self.piece_id,
            action: self.action,
            limit: self.limit,
            piece_expiration: self.piece_expiration.map(|t| t.timestamp_micros()),
            order_creation: self.order_creation.timestamp_micros(),
            order_expiration: self.order_expiration.timestamp_micros(),
        })
    }
}

/// Dialable address of a storage node (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Wrap an address string.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A storage node: identity plus where to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub address: NodeAddress,
}

/// An order limit together with the address of the node it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressedOrderLimit {
    pub limit: OrderLimit,
    pub storage_node_address: NodeAddress,
}

impl AddressedOrderLimit {
    /// Node the limit is addressed to.
    #[must_use]
    pub fn node(&self) -> Node {
        Node {
            id: self.limit.storage_node_id,
            address: self.storage_node_address.clone(),
        }
    }
}

/// Signed content hash of a stored piece.
///
/// Created by the uplink at upload time and signed with the piece private
/// key; storage nodes keep it and echo it back at the end of a download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceHash {
    pub piece_id: PieceId,
    pub hash: Vec<u8>,
    pub piece_size: u64,
    pub timestamp: DateTime<Utc>,
    pub signature: Option<Ed25519Signature>,
}

#[derive(Serialize)]
struct UnsignedPieceHash<'a> {
    piece_id: &'a PieceId,
    hash: &'a [u8],
    piece_size: u64,
    timestamp: i64,
}

impl Signable for PieceHash {
    fn schema_id(&self) -> &'static str {
        "segrepair.PieceHash/1"
    }

    fn unsigned_cbor(&self) -> CryptoResult<Vec<u8>> {
        to_deterministic_cbor(&UnsignedPieceHash {
            piece_id: &self.piece_id,
            hash: &self.hash,
            piece_size: self.piece_size,
            timestamp: self.timestamp.timestamp_micros(),
        })
    }
}
