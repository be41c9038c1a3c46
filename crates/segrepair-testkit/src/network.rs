//! In-memory storage node network.
//!
//! [`MockNetwork`] implements [`Dialer`]; each node it knows about stores
//! pieces in memory and misbehaves according to its [`NodeBehavior`].

use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use segrepair_crypto::hash_piece;
use segrepair_erasure::PieceReader;
use segrepair_orders::{
    Node, NodeAddress, NodeId, OrderLimit, PieceHash, PieceId, PiecePrivateKey,
    SatelliteIdentity, sign_order_limit, sign_uplink_piece_hash,
};
use segrepair_piecestore::{
    Dialer, DownloadProof, MissingProof, NodeUrl, PieceClient, PieceDownload, TransportError,
};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// How a mock node treats requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeBehavior {
    /// Serves and stores pieces correctly.
    #[default]
    Honest,
    /// Every dial fails.
    Offline,
    /// Answers correctly after a delay.
    Slow(Duration),
    /// Accepts the request and never answers.
    Hang,
    /// Serves a piece with one byte flipped.
    TamperedPiece,
    /// Echoes an order limit re-signed by a satellite nobody trusts.
    ForgedLimit,
    /// Serves only half of the piece.
    ShortPiece,
    /// Closes the download without sending the piece hash.
    MissingHash,
    /// Rejects every upload after reading it.
    RejectUpload,
    /// Reads the first chunk of an upload, then stops reading for good.
    StallUpload,
    /// Reads the whole upload, then drops the connection after a delay.
    FailLate(Duration),
}

#[derive(Debug, Clone)]
struct StoredPiece {
    data: Vec<u8>,
    hash: PieceHash,
    limit: OrderLimit,
}

#[derive(Debug, Default)]
struct MockNode {
    behavior: NodeBehavior,
    pieces: HashMap<PieceId, StoredPiece>,
    downloads: usize,
    uploads: usize,
}

#[derive(Debug)]
struct Inner {
    nodes: Mutex<HashMap<NodeId, MockNode>>,
    offline_addresses: Mutex<HashSet<String>>,
    dialed: Mutex<Vec<NodeUrl>>,
    active_downloads: AtomicUsize,
    peak_downloads: AtomicUsize,
    next_address: AtomicUsize,
    rogue_satellite: SatelliteIdentity,
}

/// A set of in-memory storage nodes reachable through [`Dialer`].
#[derive(Debug, Clone)]
pub struct MockNetwork {
    inner: Arc<Inner>,
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                nodes: Mutex::new(HashMap::new()),
                offline_addresses: Mutex::new(HashSet::new()),
                dialed: Mutex::new(Vec::new()),
                active_downloads: AtomicUsize::new(0),
                peak_downloads: AtomicUsize::new(0),
                next_address: AtomicUsize::new(1),
                rogue_satellite: SatelliteIdentity::generate(),
            }),
        }
    }

    /// Add a node with a fresh ID and address.
    pub fn add_node(&self, behavior: NodeBehavior) -> Node {
        let n = self.inner.next_address.fetch_add(1, Ordering::Relaxed);
        let node = Node {
            id: NodeId::random(),
            address: NodeAddress::new(format!(
                "10.{}.{}.{}:28967",
                (n >> 16) & 0xff,
                (n >> 8) & 0xff,
                n & 0xff
            )),
        };
        self.inner.nodes.lock().insert(
            node.id,
            MockNode {
                behavior,
                ..MockNode::default()
            },
        );
        node
    }

    /// Add `count` nodes sharing one behavior.
    pub fn add_nodes(&self, count: usize, behavior: NodeBehavior) -> Vec<Node> {
        (0..count).map(|_| self.add_node(behavior)).collect()
    }

    /// Change how an existing node behaves.
    pub fn set_behavior(&self, node: &NodeId, behavior: NodeBehavior) {
        if let Some(node) = self.inner.nodes.lock().get_mut(node) {
            node.behavior = behavior;
        }
    }

    /// Make every dial to `address` fail, whichever node it names.
    pub fn set_address_offline(&self, address: impl Into<String>) {
        self.inner.offline_addresses.lock().insert(address.into());
    }

    /// Put a piece on a node as if it had been uploaded under `limit`.
    pub fn store_piece(&self, node: &NodeId, data: Vec<u8>, hash: PieceHash, limit: OrderLimit) {
        if let Some(node) = self.inner.nodes.lock().get_mut(node) {
            node.pieces.insert(limit.piece_id, StoredPiece { data, hash, limit });
        }
    }

    /// Bytes a node holds for `piece_id`.
    #[must_use]
    pub fn stored_piece(&self, node: &NodeId, piece_id: &PieceId) -> Option<Vec<u8>> {
        self.inner
            .nodes
            .lock()
            .get(node)
            .and_then(|node| node.pieces.get(piece_id))
            .map(|piece| piece.data.clone())
    }

    /// Number of pieces a node holds.
    #[must_use]
    pub fn piece_count(&self, node: &NodeId) -> usize {
        self.inner.nodes.lock().get(node).map_or(0, |node| node.pieces.len())
    }

    /// Dials attempted so far, successful or not.
    #[must_use]
    pub fn dial_count(&self) -> usize {
        self.inner.dialed.lock().len()
    }

    /// Every URL dialed, in order.
    #[must_use]
    pub fn dialed(&self) -> Vec<NodeUrl> {
        self.inner.dialed.lock().clone()
    }

    /// Downloads a node has started serving.
    #[must_use]
    pub fn download_count(&self, node: &NodeId) -> usize {
        self.inner.nodes.lock().get(node).map_or(0, |node| node.downloads)
    }

    /// Downloads started across every node.
    #[must_use]
    pub fn total_downloads(&self) -> usize {
        self.inner.nodes.lock().values().map(|node| node.downloads).sum()
    }

    /// Most downloads ever in progress at once.
    #[must_use]
    pub fn peak_concurrent_downloads(&self) -> usize {
        self.inner.peak_downloads.load(Ordering::SeqCst)
    }

    /// Uploads a node has started receiving.
    #[must_use]
    pub fn upload_count(&self, node: &NodeId) -> usize {
        self.inner.nodes.lock().get(node).map_or(0, |node| node.uploads)
    }

    fn behavior(&self, node: &NodeId) -> Option<NodeBehavior> {
        self.inner.nodes.lock().get(node).map(|node| node.behavior)
    }

    fn track_download(&self) -> ActiveDownload {
        let active = self.inner.active_downloads.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_downloads.fetch_max(active, Ordering::SeqCst);
        ActiveDownload {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Counts a download as in progress until dropped.
struct ActiveDownload {
    inner: Arc<Inner>,
}

impl Drop for ActiveDownload {
    fn drop(&mut self) {
        self.inner.active_downloads.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Dialer for MockNetwork {
    async fn dial(&self, url: &NodeUrl) -> Result<Box<dyn PieceClient>, TransportError> {
        self.inner.dialed.lock().push(url.clone());

        let refused = |reason: &str| TransportError::Dial {
            address: url.address.clone(),
            reason: reason.to_string(),
        };
        if self.inner.offline_addresses.lock().contains(&url.address) {
            return Err(refused("connection refused"));
        }
        match self.behavior(&url.id) {
            None => Err(refused("no such node")),
            Some(NodeBehavior::Offline) => Err(refused("connection refused")),
            Some(_) => Ok(Box::new(MockClient {
                network: self.clone(),
                node_id: url.id,
            })),
        }
    }
}

struct MockClient {
    network: MockNetwork,
    node_id: NodeId,
}

impl MockClient {
    fn start(&self, upload: bool) -> Result<NodeBehavior, TransportError> {
        let mut nodes = self.network.inner.nodes.lock();
        let node = nodes
            .get_mut(&self.node_id)
            .ok_or_else(|| TransportError::Protocol("connection reset".to_string()))?;
        if upload {
            node.uploads += 1;
        } else {
            node.downloads += 1;
        }
        Ok(node.behavior)
    }
}

#[async_trait]
impl PieceClient for MockClient {
    async fn download(
        &self,
        limit: &OrderLimit,
        _key: &PiecePrivateKey,
        offset: u64,
        size: u64,
    ) -> Result<Box<dyn PieceDownload>, TransportError> {
        let behavior = self.start(false)?;
        let _active = self.network.track_download();
        match behavior {
            NodeBehavior::Slow(delay) => tokio::time::sleep(delay).await,
            NodeBehavior::Hang => std::future::pending::<()>().await,
            _ => {}
        }

        let stored = self
            .network
            .inner
            .nodes
            .lock()
            .get(&self.node_id)
            .and_then(|node| node.pieces.get(&limit.piece_id).cloned())
            .ok_or_else(|| TransportError::Rejected("file does not exist".to_string()))?;

        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(stored.data.len());
        let end = usize::try_from(offset.saturating_add(size))
            .unwrap_or(usize::MAX)
            .min(stored.data.len());
        let mut data = stored.data[start..end].to_vec();
        let mut original_limit = stored.limit;

        let proof = match behavior {
            NodeBehavior::TamperedPiece => {
                if let Some(byte) = data.first_mut() {
                    *byte ^= 0xff;
                }
                signed(stored.hash, original_limit)
            }
            NodeBehavior::ForgedLimit => {
                original_limit.satellite_signature = None;
                let forged = sign_order_limit(&self.network.inner.rogue_satellite, original_limit)
                    .map_err(|err| TransportError::Protocol(err.to_string()))?;
                signed(stored.hash, forged)
            }
            NodeBehavior::ShortPiece => {
                data.truncate(data.len() / 2);
                signed(stored.hash, original_limit)
            }
            NodeBehavior::MissingHash => DownloadProof::Missing(MissingProof::Hash),
            _ => signed(stored.hash, original_limit),
        };

        Ok(Box::new(MockDownload {
            data: Cursor::new(data),
            proof,
        }))
    }

    async fn upload(
        &self,
        limit: &OrderLimit,
        key: &PiecePrivateKey,
        mut data: PieceReader,
    ) -> Result<PieceHash, TransportError> {
        let behavior = self.start(true)?;

        if behavior == NodeBehavior::StallUpload {
            let mut first = [0u8; 1];
            data.read(&mut first).await?;
            std::future::pending::<()>().await;
        }

        let mut received = Vec::new();
        data.read_to_end(&mut received).await?;

        match behavior {
            NodeBehavior::Slow(delay) => tokio::time::sleep(delay).await,
            NodeBehavior::Hang => std::future::pending::<()>().await,
            NodeBehavior::RejectUpload => {
                return Err(TransportError::Rejected("out of space".to_string()));
            }
            NodeBehavior::FailLate(delay) => {
                tokio::time::sleep(delay).await;
                return Err(TransportError::Protocol("connection reset".to_string()));
            }
            _ => {}
        }

        let hash = sign_uplink_piece_hash(
            key,
            PieceHash {
                piece_id: limit.piece_id,
                hash: hash_piece(&received),
                piece_size: received.len() as u64,
                timestamp: Utc::now(),
                signature: None,
            },
        )
        .map_err(|err| TransportError::Protocol(err.to_string()))?;

        self.network
            .store_piece(&self.node_id, received, hash.clone(), limit.clone());
        Ok(hash)
    }
}

fn signed(hash: PieceHash, original_limit: OrderLimit) -> DownloadProof {
    DownloadProof::Signed {
        hash,
        original_limit,
    }
}

struct MockDownload {
    data: Cursor<Vec<u8>>,
    proof: DownloadProof,
}

impl AsyncRead for MockDownload {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.data).poll_read(cx, buf)
    }
}

impl PieceDownload for MockDownload {
    fn proof(&mut self) -> DownloadProof {
        self.proof.clone()
    }
}
