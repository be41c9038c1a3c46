//! Erasure coding for segment repair.
//!
//! A segment of `data_size` bytes is padded to whole stripes and split into
//! `total` pieces of [`RedundancyScheme::piece_size`] bytes each, any
//! `required` of which reconstruct it. The [`ErasureCodec`] trait is the
//! capability the repairer consumes; [`ReedSolomonCodec`] is the streaming
//! implementation.

#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod padding;
pub mod scheme;
pub mod stream;

pub use codec::{DEFAULT_BUFFER_SHARES, ErasureCodec, ReedSolomonCodec};
pub use error::ErasureError;
pub use scheme::RedundancyScheme;
pub use stream::{ChannelReader, PieceReader, SegmentReader};
