//! Upload coordinator.
//!
//! Every slot gets its own task. Results come back over one channel and only
//! this coordinator touches the tallies. A watch channel carries the cutoff:
//! it is set once, by the deadline or by reaching the success threshold, and
//! closing it (dropping the coordinator) cancels everything still running.

use std::time::Duration;

use segrepair_erasure::{PieceReader, RedundancyScheme, SegmentReader};
use segrepair_orders::{AddressedOrderLimit, PieceHash, PiecePrivateKey};
use segrepair_piecestore::NodeUrl;
use segrepair_telemetry::metrics::record_segment_pieces;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::error::{CutoffReason, EcError, NodeError, PieceError};
use crate::limits::unique;
use crate::report::{RepairOutcome, RepairStats};
use crate::repairer::EcRepairer;

type Cutoff = watch::Receiver<Option<CutoffReason>>;

struct SlotResult {
    piece_num: usize,
    /// `None` for an empty slot.
    outcome: Option<(AddressedOrderLimit, Result<PieceHash, PieceError>)>,
}

impl EcRepairer {
    /// Erasure-encode `data` and upload each piece to the node in its slot.
    ///
    /// Uploads run concurrently. Once `successful_needed` uploads succeed, or
    /// `timeout` passes, the remaining uploads are cancelled. Empty slots
    /// still consume their piece stream so the encoder never stalls.
    ///
    /// Dropping the returned future cancels every outstanding upload.
    ///
    /// # Errors
    ///
    /// Fails without touching the network if `limits` does not have one slot
    /// per piece or two limits name the same node. Fails with
    /// [`EcError::AllUploadsFailed`] if no upload succeeded.
    pub async fn repair(
        &self,
        limits: &[Option<AddressedOrderLimit>],
        private_key: &PiecePrivateKey,
        scheme: &RedundancyScheme,
        data: SegmentReader,
        timeout: Duration,
        successful_needed: usize,
    ) -> Result<RepairOutcome, EcError> {
        let total = scheme.total_count();
        if limits.len() != total {
            return Err(EcError::LimitCountMismatch {
                got: limits.len(),
                total,
            });
        }
        if !unique(limits) {
            return Err(EcError::DuplicateNodes);
        }

        let readers = self.codec.encode(data, scheme)?;
        let (cutoff_tx, cutoff_rx) = watch::channel(None);
        let (results_tx, mut results_rx) = mpsc::channel(total.max(1));

        for (piece_num, (addressed, reader)) in limits.iter().zip(readers).enumerate() {
            let repairer = self.clone();
            let addressed = addressed.clone();
            let key = private_key.clone();
            let cutoff = cutoff_rx.clone();
            let results = results_tx.clone();

            tokio::spawn(async move {
                let outcome = match addressed {
                    Some(addressed) => {
                        let result = repairer.put_piece(&addressed, &key, reader, cutoff).await;
                        Some((addressed, result))
                    }
                    None => {
                        discard(piece_num, reader).await;
                        None
                    }
                };
                let _ = results.send(SlotResult { piece_num, outcome }).await;
            });
        }
        drop(results_tx);
        drop(cutoff_rx);

        let mut successful_nodes = vec![None; total];
        let mut successful_hashes = vec![None; total];
        let mut stats = RepairStats {
            total,
            ..RepairStats::default()
        };
        let mut errors = Vec::new();

        let timer = tokio::time::sleep(timeout);
        tokio::pin!(timer);
        let mut timer_armed = true;

        loop {
            tokio::select! {
                () = &mut timer, if timer_armed => {
                    timer_armed = false;
                    if set_cutoff(&cutoff_tx, CutoffReason::Deadline) {
                        debug!("Timer expired. Canceling the long tail...");
                    }
                }
                received = results_rx.recv() => {
                    let Some(slot) = received else {
                        break;
                    };
                    let Some((addressed, result)) = slot.outcome else {
                        continue;
                    };
                    let node_id = addressed.limit.storage_node_id;
                    match result {
                        Ok(hash) => {
                            successful_nodes[slot.piece_num] = Some(addressed.node());
                            successful_hashes[slot.piece_num] = Some(hash);
                            stats.successful += 1;
                            if stats.successful >= successful_needed
                                && set_cutoff(&cutoff_tx, CutoffReason::Threshold)
                            {
                                debug!(
                                    successful = stats.successful,
                                    "Number of successful uploads met. Canceling the long tail..."
                                );
                            }
                        }
                        Err(error) if error.is_cancelled() => {
                            stats.canceled += 1;
                            debug!(
                                node_id = %node_id,
                                piece_num = slot.piece_num,
                                error = %error,
                                "Repair to storage node cancelled"
                            );
                        }
                        Err(error) => {
                            stats.failed += 1;
                            warn!(
                                node_id = %node_id,
                                piece_num = slot.piece_num,
                                error = %error,
                                "Repair to a storage node failed"
                            );
                            errors.push(NodeError { node_id, error });
                        }
                    }
                }
            }
        }

        if stats.successful == 0 {
            return Err(EcError::AllUploadsFailed { errors });
        }

        record_segment_pieces(stats.into());

        debug!(
            total = stats.total,
            successful = stats.successful,
            failed = stats.failed,
            canceled = stats.canceled,
            "Successfully repaired"
        );

        Ok(RepairOutcome {
            successful_nodes,
            successful_hashes,
            stats,
        })
    }

    async fn put_piece(
        &self,
        addressed: &AddressedOrderLimit,
        key: &PiecePrivateKey,
        data: PieceReader,
        mut cutoff: Cutoff,
    ) -> Result<PieceHash, PieceError> {
        let limit = &addressed.limit;
        let node_id = limit.storage_node_id;
        let url = NodeUrl::new(node_id, addressed.storage_node_address.as_str());

        let transfer = async {
            let client = self.dialer.dial(&url).await.map_err(|err| {
                debug!(
                    node_id = %node_id,
                    address = %url.address,
                    error = %err,
                    "Failed dialing for putting piece to node"
                );
                PieceError::Dial(err)
            })?;
            client
                .upload(limit, key, data)
                .await
                .map_err(PieceError::Transport)
        };

        // A transfer that already finished wins over a cutoff seen in the
        // same poll.
        tokio::select! {
            biased;
            result = transfer => {
                let error = match result {
                    Ok(hash) => return Ok(hash),
                    Err(error) => error,
                };
                let reason = *cutoff.borrow();
                if let Some(reason) = reason {
                    return Err(cancelled(reason, error));
                }
                if !error.is_dial_failure() {
                    debug!(
                        node_id = %node_id,
                        error = %error,
                        "Failed uploading piece to node"
                    );
                }
                Err(error)
            }
            reason = cutoff_signal(&mut cutoff) => {
                match reason {
                    CutoffReason::Caller => {
                        debug!(node_id = %node_id, "Upload to node canceled by user");
                    }
                    CutoffReason::Threshold | CutoffReason::Deadline => {
                        debug!(node_id = %node_id, %reason, "Node cut from upload due to slow connection");
                    }
                }
                Err(PieceError::Cancelled { reason, source: None })
            }
        }
    }
}

/// Record the first cutoff. Returns false if one was already set.
fn set_cutoff(tx: &watch::Sender<Option<CutoffReason>>, reason: CutoffReason) -> bool {
    tx.send_if_modified(|current| {
        if current.is_some() {
            return false;
        }
        *current = Some(reason);
        true
    })
}

async fn cutoff_signal(cutoff: &mut Cutoff) -> CutoffReason {
    match cutoff.wait_for(Option::is_some).await {
        Ok(reason) => (*reason).unwrap_or(CutoffReason::Caller),
        Err(_) => CutoffReason::Caller,
    }
}

fn cancelled(reason: CutoffReason, error: PieceError) -> PieceError {
    let source = match error {
        PieceError::Dial(e) | PieceError::Transport(e) => Some(e),
        PieceError::Cancelled { source, .. } => source,
        _ => None,
    };
    PieceError::Cancelled { reason, source }
}

async fn discard(piece_num: usize, mut reader: PieceReader) {
    if let Err(err) = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
        debug!(piece_num, error = %err, "Failed draining unused piece");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use segrepair_erasure::RedundancyScheme;
    use segrepair_piecestore::TransportError;
    use segrepair_testkit::{MockNetwork, NodeBehavior, StoredSegment, TestSatellite, segment_data};

    use super::*;
    use crate::config::EcRepairerConfig;

    struct Target {
        repairer: EcRepairer,
        limit: AddressedOrderLimit,
        key: PiecePrivateKey,
    }

    async fn target(behavior: NodeBehavior) -> Target {
        let network = MockNetwork::new();
        let satellite = TestSatellite::new();
        let scheme = RedundancyScheme::new(2, 3, 3, 4, 64).unwrap();
        let segment = StoredSegment::store(&network, &satellite, scheme, segment_data(512)).await;
        let node = network.add_node(behavior);
        let (mut limits, key) = segment.put_limits(&satellite, &[Some(node)]);
        let repairer = EcRepairer::with_reed_solomon(
            Arc::new(network),
            satellite.signee(),
            EcRepairerConfig::default(),
        );
        Target {
            repairer,
            limit: limits[0].take().unwrap(),
            key,
        }
    }

    fn piece() -> PieceReader {
        Box::new(Cursor::new(vec![7u8; 256]))
    }

    #[tokio::test]
    async fn failure_after_cutoff_is_cancellation_with_source() {
        let target = target(NodeBehavior::RejectUpload).await;
        let (_tx, cutoff) = watch::channel(Some(CutoffReason::Threshold));

        let err = target
            .repairer
            .put_piece(&target.limit, &target.key, piece(), cutoff)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(matches!(
            err,
            PieceError::Cancelled {
                reason: CutoffReason::Threshold,
                source: Some(TransportError::Rejected(_)),
            }
        ));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn failure_before_cutoff_is_a_node_failure() {
        let target = target(NodeBehavior::RejectUpload).await;
        let (_tx, cutoff) = watch::channel(None);

        let err = target
            .repairer
            .put_piece(&target.limit, &target.key, piece(), cutoff)
            .await
            .unwrap_err();

        assert!(!err.is_cancelled());
        assert!(matches!(err, PieceError::Transport(TransportError::Rejected(_))));
    }

    #[tokio::test]
    async fn finished_upload_wins_over_cutoff() {
        let target = target(NodeBehavior::Honest).await;
        let (_tx, cutoff) = watch::channel(Some(CutoffReason::Deadline));

        let hash = target
            .repairer
            .put_piece(&target.limit, &target.key, piece(), cutoff)
            .await
            .unwrap();

        assert_eq!(hash.piece_id, target.limit.limit.piece_id);
        assert_eq!(hash.piece_size, 256);
    }

    #[tokio::test]
    async fn closed_cutoff_cancels_as_caller() {
        let target = target(NodeBehavior::Hang).await;
        let (tx, cutoff) = watch::channel(None);
        drop(tx);

        let err = target
            .repairer
            .put_piece(&target.limit, &target.key, piece(), cutoff)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PieceError::Cancelled {
                reason: CutoffReason::Caller,
                source: None,
            }
        ));
    }
}
