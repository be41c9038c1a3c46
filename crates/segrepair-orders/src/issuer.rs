//! Satellite-side order limit issuing for repair.
//!
//! The issuer only signs what it is handed: callers pick the nodes and the
//! piece numbers. Every limit of one batch shares a serial number, a piece
//! key pair and the creation/expiration window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OrderError, OrderResult};
use crate::ids::{PieceId, SerialNumber};
use crate::keys::{PiecePrivateKey, PiecePublicKey, new_piece_key_pair};
use crate::limit::{AddressedOrderLimit, Node, OrderLimit, PieceAction};
use crate::signing::{Signer, sign_order_limit};

/// Issuer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLimitIssuerConfig {
    /// How long issued limits stay valid.
    #[serde(with = "duration_secs")]
    pub order_expiration: Duration,
}

impl Default for OrderLimitIssuerConfig {
    fn default() -> Self {
        Self {
            order_expiration: Duration::from_secs(48 * 60 * 60),
        }
    }
}

/// Signs order limits with the satellite identity.
#[derive(Clone)]
pub struct OrderLimitIssuer {
    satellite: Arc<dyn Signer>,
    config: OrderLimitIssuerConfig,
}

impl std::fmt::Debug for OrderLimitIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderLimitIssuer")
            .field("satellite", &self.satellite.id())
            .field("config", &self.config)
            .finish()
    }
}

/// One batch of limits for a single segment action.
pub struct LimitBatch<'a> {
    issuer: &'a OrderLimitIssuer,
    serial_number: SerialNumber,
    action: PieceAction,
    root_piece_id: PieceId,
    piece_expiration: Option<DateTime<Utc>>,
    order_creation: DateTime<Utc>,
    order_expiration: DateTime<Utc>,
    limit: u64,
    public_key: PiecePublicKey,
    private_key: PiecePrivateKey,
}

impl OrderLimitIssuer {
    #[must_use]
    pub fn new(satellite: Arc<dyn Signer>, config: OrderLimitIssuerConfig) -> Self {
        Self { satellite, config }
    }

    /// Start a batch for `action` on the pieces of one segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured expiration cannot be represented.
    pub fn batch(
        &self,
        action: PieceAction,
        root_piece_id: PieceId,
        piece_expiration: Option<DateTime<Utc>>,
        piece_size: u64,
    ) -> OrderResult<LimitBatch<'_>> {
        let expiration = chrono::Duration::from_std(self.config.order_expiration)
            .map_err(|_| OrderError::InvalidExpiration(self.config.order_expiration))?;
        let order_creation = Utc::now();
        let (public_key, private_key) = new_piece_key_pair();
        Ok(LimitBatch {
            issuer: self,
            serial_number: SerialNumber::random(),
            action,
            root_piece_id,
            piece_expiration,
            order_creation,
            order_expiration: order_creation + expiration,
            limit: piece_size,
            public_key,
            private_key,
        })
    }

    /// Limits for downloading the healthy pieces of a segment.
    ///
    /// `healthy` pairs piece numbers with the node holding them; the result
    /// has `total` slots with `None` for every piece number not listed.
    ///
    /// # Errors
    ///
    /// Returns an error if a piece number is out of range or fewer than
    /// `required` limits could be created.
    pub fn create_get_repair_limits(
        &self,
        root_piece_id: PieceId,
        piece_expiration: Option<DateTime<Utc>>,
        piece_size: u64,
        total: usize,
        required: usize,
        healthy: &[(u16, Node)],
    ) -> OrderResult<(Vec<Option<AddressedOrderLimit>>, PiecePrivateKey)> {
        let batch = self.batch(PieceAction::GetRepair, root_piece_id, piece_expiration, piece_size)?;
        let mut limits = vec![None; total];
        let mut count = 0;
        for (piece_num, node) in healthy {
            let slot = limits
                .get_mut(usize::from(*piece_num))
                .ok_or(OrderError::PieceNumOutOfRange {
                    piece_num: usize::from(*piece_num),
                    total,
                })?;
            *slot = Some(batch.sign(node, *piece_num)?);
            count += 1;
        }
        if count < required {
            return Err(OrderError::NotEnoughNodes {
                got: count,
                required,
            });
        }
        Ok((limits, batch.into_private_key()))
    }

    /// Limits for uploading repaired pieces to `new_nodes`.
    ///
    /// New nodes fill the slots that `existing` leaves empty, in order,
    /// until the segment would hold `total_after_repair` pieces.
    ///
    /// # Errors
    ///
    /// Returns an error if the free slots run out before the nodes do.
    pub fn create_put_repair_limits(
        &self,
        root_piece_id: PieceId,
        piece_expiration: Option<DateTime<Utc>>,
        piece_size: u64,
        existing: &[Option<AddressedOrderLimit>],
        new_nodes: &[Node],
        total_after_repair: usize,
    ) -> OrderResult<(Vec<Option<AddressedOrderLimit>>, PiecePrivateKey)> {
        let batch = self.batch(PieceAction::PutRepair, root_piece_id, piece_expiration, piece_size)?;
        let total = existing.len();
        let current = existing.iter().filter(|l| l.is_some()).count();
        let mut to_repair = total_after_repair.min(total).saturating_sub(current);

        let mut limits = vec![None; total];
        let mut piece_num = 0;
        for node in new_nodes {
            if to_repair == 0 {
                break;
            }
            while piece_num < total && existing[piece_num].is_some() {
                piece_num += 1;
            }
            if piece_num >= total {
                return Err(OrderError::PieceNumOutOfRange { piece_num, total });
            }
            let num = u16::try_from(piece_num)
                .map_err(|_| OrderError::PieceNumOutOfRange { piece_num, total })?;
            limits[piece_num] = Some(batch.sign(node, num)?);
            piece_num += 1;
            to_repair -= 1;
        }
        Ok((limits, batch.into_private_key()))
    }
}

impl LimitBatch<'_> {
    /// Sign the limit for `piece_num` stored on `node`.
    ///
    /// # Errors
    ///
    /// Returns an error if the limit cannot be encoded.
    pub fn sign(&self, node: &Node, piece_num: u16) -> OrderResult<AddressedOrderLimit> {
        let limit = OrderLimit {
            serial_number: self.serial_number,
            satellite_id: self.issuer.satellite.id(),
            uplink_public_key: self.public_key,
            storage_node_id: node.id,
            piece_id: self.root_piece_id.derive(&node.id, piece_num),
            action: self.action,
            limit: self.limit,
            piece_expiration: self.piece_expiration,
            order_creation: self.order_creation,
            order_expiration: self.order_expiration,
            satellite_signature: None,
        };
        Ok(AddressedOrderLimit {
            limit: sign_order_limit(self.issuer.satellite.as_ref(), limit)?,
            storage_node_address: node.address.clone(),
        })
    }

    #[must_use]
    pub const fn serial_number(&self) -> SerialNumber {
        self.serial_number
    }

    /// Private key matching every limit of the batch.
    #[must_use]
    pub fn private_key(&self) -> &PiecePrivateKey {
        &self.private_key
    }

    #[must_use]
    pub fn into_private_key(self) -> PiecePrivateKey {
        self.private_key
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
