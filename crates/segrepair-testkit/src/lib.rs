//! Test kit for the segment repairer.
//!
//! - [`MockNetwork`]: in-memory storage nodes behind the [`Dialer`] trait,
//!   each with a scripted [`NodeBehavior`]
//! - [`TestSatellite`] and [`StoredSegment`]: real signed limits and pieces
//!   encoded with the real codec
//! - tracing setup for test output
//!
//! ```rust,ignore
//! let network = MockNetwork::new();
//! let satellite = TestSatellite::new();
//! let segment = StoredSegment::store(&network, &satellite, scheme, segment_data(4096)).await;
//! let (limits, key) = segment.get_limits(&satellite, &[0, 1, 2, 3]);
//! ```
//!
//! [`Dialer`]: segrepair_piecestore::Dialer

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod fixtures;
mod network;
mod tracing_config;

pub use fixtures::{StoredSegment, TestSatellite, encode_pieces, segment_data};
pub use network::{MockNetwork, NodeBehavior};
pub use tracing_config::*;
