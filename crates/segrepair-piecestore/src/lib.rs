//! Storage node transport capability.
//!
//! The repairer never opens sockets itself. It is handed a [`Dialer`] that
//! turns a [`NodeUrl`] into a [`PieceClient`] session; the session moves one
//! piece per call. Connection management and transport-level retries live
//! behind these traits.

#![forbid(unsafe_code)]

pub mod client;
pub mod error;

pub use client::{Dialer, DownloadProof, MissingProof, NodeUrl, PieceClient, PieceDownload};
pub use error::TransportError;
