//! Erasure-coded piece transfer for segment repair.
//!
//! [`EcRepairer::get`] races storage nodes for enough verified pieces to
//! rebuild a segment and hands back a lazily decoding reader.
//! [`EcRepairer::repair`] encodes a segment and fans the pieces out to new
//! nodes, cutting off the long tail once enough uploads landed or the
//! deadline passed.
//!
//! Every downloaded piece is checked by the verifier in [`verify`] before it
//! is used: the node must echo an order limit signed by the trusted
//! satellite, and a piece hash signed by the uplink key in that limit that
//! matches the bytes actually received. Nodes that fail those checks are
//! reported separately from nodes that were merely unreachable.
//!
//! ```rust,ignore
//! let repairer = EcRepairer::with_reed_solomon(dialer, satellite, EcRepairerConfig::default());
//! let download = repairer.get(&get_limits, &cached, &get_key, &scheme, segment_size).await?;
//! let outcome = repairer
//!     .repair(&put_limits, &put_key, &scheme, download.reader, timeout, optimal)
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

mod buffer;
pub mod config;
mod download;
pub mod error;
pub mod limits;
mod repairer;
pub mod report;
mod upload;
pub mod verify;

pub use config::EcRepairerConfig;
pub use error::{CutoffReason, EcError, IrreparableError, NodeError, PieceError, VerifyError};
pub use limits::random_sample;
pub use repairer::EcRepairer;
pub use report::{RemotePiece, RepairOutcome, RepairStats, Report, SegmentDownload};
pub use verify::{verify_order_limit_signature, verify_piece_hash};
