//! Outcomes handed back to the caller.

use std::fmt;

use segrepair_erasure::SegmentReader;
use segrepair_orders::{Node, NodeId, PieceHash};
use segrepair_telemetry::metrics::SegmentPieceCounts;
use serde::{Deserialize, Serialize};

/// One piece of a segment as stored on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemotePiece {
    pub piece_num: usize,
    pub node_id: NodeId,
}

/// Per-node outcome of a download pass.
///
/// Every node whose piece was actually fetched lands in exactly one list.
/// Limits that were never dispatched (enough pieces already, or the
/// required count became unreachable) are not reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub successes: Vec<NodeId>,
    /// Served data that failed verification.
    pub fails: Vec<NodeId>,
    /// Could not be dialed.
    pub offlines: Vec<NodeId>,
    /// Connected but timed out mid-transfer.
    pub pending_audits: Vec<NodeId>,
    pub unknown: Vec<NodeId>,
}

impl Report {
    /// Total nodes reported.
    #[must_use]
    pub fn len(&self) -> usize {
        self.successes.len()
            + self.fails.len()
            + self.offlines.len()
            + self.pending_audits.len()
            + self.unknown.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `node` appears in any list.
    #[must_use]
    pub fn contains(&self, node: &NodeId) -> bool {
        [
            &self.successes,
            &self.fails,
            &self.offlines,
            &self.pending_audits,
            &self.unknown,
        ]
        .iter()
        .any(|list| list.contains(node))
    }
}

/// A segment being reconstructed from verified pieces.
pub struct SegmentDownload {
    /// Decoded segment bytes, produced as they are read.
    pub reader: SegmentReader,
    /// Pieces whose nodes failed verification.
    pub failed_pieces: Vec<RemotePiece>,
    pub report: Report,
}

impl fmt::Debug for SegmentDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentDownload")
            .field("failed_pieces", &self.failed_pieces)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

/// Upload tallies for one repair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairStats {
    /// Limit slots, nil included.
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub canceled: usize,
}

impl From<RepairStats> for SegmentPieceCounts {
    fn from(stats: RepairStats) -> Self {
        Self {
            total: stats.total,
            successful: stats.successful,
            failed: stats.failed,
            canceled: stats.canceled,
        }
    }
}

/// Result of a repair upload.
///
/// Both vectors are indexed by piece number; `None` means the slot had no
/// limit or its upload did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub successful_nodes: Vec<Option<Node>>,
    pub successful_hashes: Vec<Option<PieceHash>>,
    pub stats: RepairStats,
}

impl RepairOutcome {
    /// Piece numbers that now hold a repaired piece.
    pub fn repaired_pieces(&self) -> impl Iterator<Item = RemotePiece> + '_ {
        self.successful_nodes
            .iter()
            .enumerate()
            .filter_map(|(piece_num, node)| {
                node.as_ref().map(|node| RemotePiece {
                    piece_num,
                    node_id: node.id,
                })
            })
    }
}
