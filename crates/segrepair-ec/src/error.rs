//! Repairer error types.
//!
//! Per-piece failures are [`PieceError`]s. They stay inside the coordinator
//! and only reach the caller folded into an aggregate [`EcError`].

use std::fmt;
use std::time::Duration;

use segrepair_erasure::ErasureError;
use segrepair_orders::{NodeId, OrderError, PieceId};
use segrepair_piecestore::{MissingProof, TransportError};
use thiserror::Error;

use crate::report::{RemotePiece, Report};

/// Why a downloaded piece was rejected.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Nothing to compare against.
    #[error("invalid arguments")]
    InvalidArguments,

    /// The hash names a different piece than the limit.
    #[error("piece id changed: expected {expected}, got {actual}")]
    PieceIdChanged {
        /// Piece named by the order limit.
        expected: PieceId,
        /// Piece named by the hash.
        actual: PieceId,
    },

    /// Content does not hash to the signed value.
    #[error(
        "hash from storage node, {}, does not match calculated hash, {}",
        hex::encode(.signed),
        hex::encode(.calculated)
    )]
    HashMismatch {
        /// Hash the node sent.
        signed: Vec<u8>,
        /// Hash of the bytes actually received.
        calculated: Vec<u8>,
    },

    /// The piece hash was not signed by the uplink key in the limit.
    #[error("invalid piece hash signature")]
    InvalidHashSignature(#[source] OrderError),

    /// The order limit was not signed by the trusted satellite.
    #[error("invalid order limit signature: {0}")]
    InvalidOrderLimitSignature(#[source] OrderError),
}

/// What stopped an upload early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutoffReason {
    /// Enough uploads already succeeded.
    Threshold,
    /// The repair deadline passed.
    Deadline,
    /// The repair itself was dropped.
    Caller,
}

impl fmt::Display for CutoffReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Threshold => f.write_str("success threshold reached"),
            Self::Deadline => f.write_str("repair deadline passed"),
            Self::Caller => f.write_str("repair canceled by caller"),
        }
    }
}

/// Failure of a single piece transfer.
#[derive(Debug, Error)]
pub enum PieceError {
    /// The node could not be reached.
    #[error("dial failed: {0}")]
    Dial(#[source] TransportError),

    /// The transfer broke after connecting.
    #[error(transparent)]
    Transport(TransportError),

    /// The download ran past its budget after connecting.
    #[error("download timed out after {0:?}")]
    Timeout(Duration),

    /// The node sent too much or too little data.
    #[error("didn't download the correct amount of data, want {want}, got {got}")]
    SizeMismatch {
        /// Expected piece size.
        want: u64,
        /// Bytes received.
        got: u64,
    },

    /// The node closed the download without its proof.
    #[error("{0}")]
    MissingProof(MissingProof),

    /// The node served data it could not prove.
    #[error("piece hashes don't match: {0}")]
    Verification(#[source] VerifyError),

    /// Local piece buffer could not be written.
    #[error("piece buffer: {0}")]
    Buffer(#[source] std::io::Error),

    /// The transfer was abandoned on purpose.
    #[error("context canceled: {reason}")]
    Cancelled {
        /// What triggered the cutoff.
        reason: CutoffReason,
        /// Transport error that arrived while cancelling, if any.
        #[source]
        source: Option<TransportError>,
    },
}

impl PieceError {
    /// The node served bad data or bad proof.
    #[must_use]
    pub const fn is_verification_failure(&self) -> bool {
        matches!(self, Self::Verification(_))
    }

    /// The transfer was cut off, not failed.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The node could not be reached at all.
    #[must_use]
    pub const fn is_dial_failure(&self) -> bool {
        matches!(self, Self::Dial(_))
    }
}

/// A per-node error kept for the aggregate.
#[derive(Debug, Error)]
#[error("node id: {node_id}, error: {error}")]
pub struct NodeError {
    pub node_id: NodeId,
    #[source]
    pub error: PieceError,
}

/// Fewer than the required pieces could be retrieved and verified.
#[derive(Debug, Error)]
#[error(
    "segment is irreparable: {pieces_available} pieces available, {pieces_required} required{}",
    join_errors(.errors)
)]
pub struct IrreparableError {
    pub pieces_available: usize,
    pub pieces_required: usize,
    /// Nodes that failed verification.
    pub failed_pieces: Vec<RemotePiece>,
    pub report: Report,
    pub errors: Vec<NodeError>,
}

/// Errors returned by [`EcRepairer`](crate::EcRepairer).
#[derive(Debug, Error)]
pub enum EcError {
    /// Limits do not line up with the redundancy scheme.
    #[error("number of limits slice ({got}) does not match total count ({total}) of erasure scheme")]
    LimitCountMismatch {
        /// Limit slots passed.
        got: usize,
        /// Pieces in the scheme.
        total: usize,
    },

    /// Too few limits for a download to ever succeed.
    #[error("number of non-nil limits ({got}) is less than required count ({required}) of erasure scheme")]
    NotEnoughLimits {
        /// Non-nil limit slots.
        got: usize,
        /// Pieces needed.
        required: usize,
    },

    /// Two upload slots name the same node.
    #[error("duplicated nodes are not allowed")]
    DuplicateNodes,

    /// A sample asked for more limits than exist.
    #[error("cannot sample {requested} order limits from {available}")]
    SampleTooLarge {
        /// Sample size asked for.
        requested: usize,
        /// Non-nil limits present.
        available: usize,
    },

    /// Download could not collect enough verified pieces.
    #[error(transparent)]
    Irreparable(#[from] IrreparableError),

    /// Not a single upload succeeded.
    #[error("repair to all nodes failed{}", join_errors(.errors))]
    AllUploadsFailed {
        /// Every non-cancellation failure.
        errors: Vec<NodeError>,
    },

    /// The codec rejected the scheme or the pieces.
    #[error("erasure coding: {0}")]
    Erasure(#[from] ErasureError),
}

fn join_errors(errors: &[NodeError]) -> String {
    errors.iter().fold(String::new(), |mut out, err| {
        out.push_str("; ");
        out.push_str(&err.to_string());
        out
    })
}
