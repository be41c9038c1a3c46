//! Order limits and piece hashes.
//!
//! An [`OrderLimit`] is the satellite's signed permission for one storage
//! node to serve one action on one piece. A [`PieceHash`] is the uplink's
//! signed statement of what a piece's content hashes to. The repairer trusts
//! neither until the signatures check out.

#![forbid(unsafe_code)]

pub mod error;
pub mod ids;
pub mod issuer;
pub mod keys;
pub mod limit;
pub mod signing;

pub use error::{OrderError, OrderResult};
pub use ids::{NodeId, PieceId, SerialNumber};
pub use issuer::{LimitBatch, OrderLimitIssuer, OrderLimitIssuerConfig};
pub use keys::{PiecePrivateKey, PiecePublicKey, new_piece_key_pair};
pub use limit::{AddressedOrderLimit, Node, NodeAddress, OrderLimit, PieceAction, PieceHash};
pub use signing::{
    SatelliteIdentity, SatelliteSignee, Signee, Signer, sign_order_limit, sign_uplink_piece_hash,
    verify_order_limit_signature, verify_uplink_piece_hash_signature,
};
