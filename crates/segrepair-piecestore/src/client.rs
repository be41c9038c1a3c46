//! Dialer and piece session traits.

use std::fmt;

use async_trait::async_trait;
use segrepair_erasure::PieceReader;
use segrepair_orders::{NodeId, OrderLimit, PieceHash, PiecePrivateKey};
use tokio::io::AsyncRead;

use crate::error::TransportError;

/// Node identity plus the address to dial it at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeUrl {
    pub id: NodeId,
    pub address: String,
}

impl NodeUrl {
    #[must_use]
    pub fn new(id: NodeId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }
}

impl fmt::Display for NodeUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}

/// Opens piece sessions to storage nodes.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connect to `node`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Dial`] if the node cannot be reached.
    async fn dial(&self, node: &NodeUrl) -> Result<Box<dyn PieceClient>, TransportError>;
}

/// One connected storage node.
#[async_trait]
pub trait PieceClient: Send + Sync {
    /// Start downloading `size` bytes of the piece named by `limit`,
    /// beginning at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the node refuses the download.
    async fn download(
        &self,
        limit: &OrderLimit,
        key: &PiecePrivateKey,
        offset: u64,
        size: u64,
    ) -> Result<Box<dyn PieceDownload>, TransportError>;

    /// Upload the whole of `data` as the piece named by `limit`.
    ///
    /// Returns the piece hash the node stored once the upload is committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails or the node rejects the piece.
    async fn upload(
        &self,
        limit: &OrderLimit,
        key: &PiecePrivateKey,
        data: PieceReader,
    ) -> Result<PieceHash, TransportError>;
}

/// An in-progress piece download.
///
/// Read the piece bytes to EOF, then ask for the node's [`DownloadProof`].
pub trait PieceDownload: AsyncRead + Send + Unpin {
    /// What the node sent to prove what it served.
    ///
    /// Only meaningful after the stream reached EOF.
    fn proof(&mut self) -> DownloadProof;
}

/// The node's closing statement for a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadProof {
    /// Signed piece hash and the order limit the piece was uploaded under.
    Signed {
        hash: PieceHash,
        original_limit: OrderLimit,
    },
    /// The node closed the stream without a complete proof.
    Missing(MissingProof),
}

/// Which half of the download proof never arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingProof {
    Hash,
    OrderLimit,
}

impl fmt::Display for MissingProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash => f.write_str("hash was not sent from storagenode"),
            Self::OrderLimit => f.write_str("original order limit was not sent from storagenode"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_url_display() {
        let id = NodeId::from_bytes([0xab; 32]);
        let url = NodeUrl::new(id, "10.0.0.1:28967");
        assert_eq!(url.to_string(), format!("{}@10.0.0.1:28967", "ab".repeat(32)));
    }

    #[test]
    fn missing_proof_messages() {
        assert_eq!(
            MissingProof::Hash.to_string(),
            "hash was not sent from storagenode"
        );
        assert_eq!(
            MissingProof::OrderLimit.to_string(),
            "original order limit was not sent from storagenode"
        );
    }
}
