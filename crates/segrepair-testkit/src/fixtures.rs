//! Satellites and stored segments for tests.

use std::sync::Arc;

use chrono::Utc;
use segrepair_crypto::hash_piece;
use segrepair_erasure::{ErasureCodec, PieceReader, RedundancyScheme, ReedSolomonCodec};
use segrepair_orders::{
    AddressedOrderLimit, Node, NodeId, OrderLimitIssuer, OrderLimitIssuerConfig, PieceAction,
    PieceHash, PieceId, PiecePrivateKey, SatelliteIdentity, Signee, Signer,
    sign_uplink_piece_hash,
};
use tokio::io::AsyncReadExt;

use crate::network::{MockNetwork, NodeBehavior};

/// A satellite that signs limits for tests.
#[derive(Debug, Clone)]
pub struct TestSatellite {
    identity: Arc<SatelliteIdentity>,
    issuer: OrderLimitIssuer,
}

impl Default for TestSatellite {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSatellite {
    #[must_use]
    pub fn new() -> Self {
        let identity = Arc::new(SatelliteIdentity::generate());
        let issuer = OrderLimitIssuer::new(identity.clone(), OrderLimitIssuerConfig::default());
        Self { identity, issuer }
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        Signer::id(self.identity.as_ref())
    }

    /// Verifier the repairer should trust.
    #[must_use]
    pub fn signee(&self) -> Arc<dyn Signee> {
        Arc::new(self.identity.signee())
    }

    #[must_use]
    pub const fn issuer(&self) -> &OrderLimitIssuer {
        &self.issuer
    }
}

/// A segment whose pieces live on a [`MockNetwork`], one node per piece.
#[derive(Debug, Clone)]
pub struct StoredSegment {
    pub root_piece_id: PieceId,
    pub data: Vec<u8>,
    pub scheme: RedundancyScheme,
    pub piece_size: u64,
    /// Holder of each piece, indexed by piece number.
    pub nodes: Vec<Node>,
}

impl StoredSegment {
    /// Encode `data` and upload every piece to a new honest node.
    ///
    /// # Panics
    ///
    /// Panics if encoding or signing fails.
    pub async fn store(
        network: &MockNetwork,
        satellite: &TestSatellite,
        scheme: RedundancyScheme,
        data: Vec<u8>,
    ) -> Self {
        let codec = ReedSolomonCodec::default();
        let readers = codec
            .encode(Box::new(std::io::Cursor::new(data.clone())), &scheme)
            .expect("encode segment");
        let pieces = read_pieces(readers).await;

        let root_piece_id = PieceId::random();
        let piece_size = scheme.piece_size(data.len() as u64);
        let batch = satellite
            .issuer()
            .batch(PieceAction::Put, root_piece_id, None, piece_size)
            .expect("start put batch");

        let nodes = network.add_nodes(pieces.len(), NodeBehavior::Honest);
        for (piece_num, (node, piece)) in nodes.iter().zip(pieces).enumerate() {
            let num = u16::try_from(piece_num).expect("piece number fits u16");
            let addressed = batch.sign(node, num).expect("sign put limit");
            let hash = sign_uplink_piece_hash(
                batch.private_key(),
                PieceHash {
                    piece_id: addressed.limit.piece_id,
                    hash: hash_piece(&piece),
                    piece_size,
                    timestamp: Utc::now(),
                    signature: None,
                },
            )
            .expect("sign piece hash");
            network.store_piece(&node.id, piece, hash, addressed.limit);
        }

        Self {
            root_piece_id,
            data,
            scheme,
            piece_size,
            nodes,
        }
    }

    /// Repair download limits for the listed piece numbers.
    ///
    /// # Panics
    ///
    /// Panics if a piece number is out of range.
    #[must_use]
    pub fn get_limits(
        &self,
        satellite: &TestSatellite,
        pieces: &[usize],
    ) -> (Vec<Option<AddressedOrderLimit>>, PiecePrivateKey) {
        let healthy: Vec<(u16, Node)> = pieces
            .iter()
            .map(|&i| (u16::try_from(i).expect("piece number fits u16"), self.nodes[i].clone()))
            .collect();
        satellite
            .issuer()
            .create_get_repair_limits(
                self.root_piece_id,
                None,
                self.piece_size,
                self.scheme.total_count(),
                0,
                &healthy,
            )
            .expect("create get repair limits")
    }

    /// Repair upload limits placing `targets[i]` at piece number `i`.
    ///
    /// `None` targets leave the slot empty.
    ///
    /// # Panics
    ///
    /// Panics if there are more targets than pieces.
    #[must_use]
    pub fn put_limits(
        &self,
        satellite: &TestSatellite,
        targets: &[Option<Node>],
    ) -> (Vec<Option<AddressedOrderLimit>>, PiecePrivateKey) {
        assert!(targets.len() <= self.scheme.total_count());
        let batch = satellite
            .issuer()
            .batch(PieceAction::PutRepair, self.root_piece_id, None, self.piece_size)
            .expect("start put repair batch");
        let mut limits = vec![None; self.scheme.total_count()];
        for (piece_num, target) in targets.iter().enumerate() {
            if let Some(node) = target {
                let num = u16::try_from(piece_num).expect("piece number fits u16");
                limits[piece_num] = Some(batch.sign(node, num).expect("sign put repair limit"));
            }
        }
        (limits, batch.into_private_key())
    }

    /// Piece ID of `piece_num` when stored on `node`.
    #[must_use]
    pub fn piece_id(&self, node: &NodeId, piece_num: u16) -> PieceId {
        self.root_piece_id.derive(node, piece_num)
    }
}

/// Erasure-encode `data` into complete pieces.
///
/// # Panics
///
/// Panics if encoding fails.
pub async fn encode_pieces(scheme: &RedundancyScheme, data: &[u8]) -> Vec<Vec<u8>> {
    let readers = ReedSolomonCodec::default()
        .encode(Box::new(std::io::Cursor::new(data.to_vec())), scheme)
        .expect("encode segment");
    read_pieces(readers).await
}

async fn read_pieces(readers: Vec<PieceReader>) -> Vec<Vec<u8>> {
    let tasks: Vec<_> = readers
        .into_iter()
        .map(|mut reader| {
            tokio::spawn(async move {
                let mut piece = Vec::new();
                reader.read_to_end(&mut piece).await.map(|_| piece)
            })
        })
        .collect();
    let mut pieces = Vec::with_capacity(tasks.len());
    for task in tasks {
        pieces.push(task.await.expect("join piece reader").expect("read piece"));
    }
    pieces
}

/// Deterministic test data.
#[must_use]
pub fn segment_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
