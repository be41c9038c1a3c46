//! Download coordinator.
//!
//! Workers race to collect `required` verified pieces. A semaphore keeps at
//! most `required` workers alive, and a shared gate decides under one lock
//! whether each worker fetches, waits, or gives up.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use segrepair_erasure::{PieceReader, RedundancyScheme};
use segrepair_orders::{AddressedOrderLimit, NodeId, PiecePrivateKey};
use segrepair_piecestore::{DownloadProof, NodeUrl, PieceClient, TransportError};
use segrepair_telemetry::metrics::{
    DOWNLOAD_FAILED_NOT_ENOUGH_PIECES, REPAIR_BYTES_DOWNLOADED, increment_counter,
    increment_counter_by,
};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

use crate::buffer::{BufferError, buffer_piece};
use crate::error::{EcError, IrreparableError, NodeError, PieceError, VerifyError};
use crate::limits::non_nil_count;
use crate::report::{RemotePiece, Report, SegmentDownload};
use crate::repairer::EcRepairer;
use crate::verify::{verify_order_limit_signature, verify_piece_hash};

#[derive(Default)]
struct GetState {
    successful: usize,
    in_progress: usize,
    unused_limits: usize,
    pieces: BTreeMap<usize, PieceReader>,
    failed_pieces: Vec<RemotePiece>,
    report: Report,
    errors: Vec<NodeError>,
}

struct Gate {
    required: usize,
    state: Mutex<GetState>,
    changed: Notify,
}

enum Admission {
    Fetch,
    Abstain,
    Wait,
}

impl Gate {
    fn admit(&self) -> Admission {
        let mut state = self.state.lock();
        if state.successful >= self.required {
            return Admission::Abstain;
        }
        if state.successful + state.in_progress + state.unused_limits < self.required {
            return Admission::Abstain;
        }
        if state.successful + state.in_progress >= self.required {
            return Admission::Wait;
        }
        state.unused_limits -= 1;
        state.in_progress += 1;
        Admission::Fetch
    }

    /// Block until this worker may fetch. Returns false if it should not.
    async fn enter(&self) -> bool {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.admit() {
                Admission::Fetch => return true,
                Admission::Abstain => {
                    self.changed.notify_waiters();
                    return false;
                }
                Admission::Wait => notified.await,
            }
        }
    }

    fn finish(&self, piece_num: usize, node_id: NodeId, result: Result<PieceReader, PieceError>) {
        let mut state = self.state.lock();
        state.in_progress -= 1;
        match result {
            Ok(reader) => {
                state.successful += 1;
                state.pieces.insert(piece_num, reader);
                state.report.successes.push(node_id);
            }
            Err(error) => {
                if error.is_verification_failure() {
                    state.failed_pieces.push(RemotePiece { piece_num, node_id });
                    state.report.fails.push(node_id);
                } else {
                    match &error {
                        PieceError::Dial(_) => state.report.offlines.push(node_id),
                        PieceError::Timeout(_) => state.report.pending_audits.push(node_id),
                        _ => state.report.unknown.push(node_id),
                    }
                }
                state.errors.push(NodeError { node_id, error });
            }
        }
        drop(state);
        self.changed.notify_waiters();
    }
}

impl EcRepairer {
    /// Download and verify enough pieces to rebuild a segment.
    ///
    /// `limits` holds one slot per piece number. Pieces are fetched
    /// concurrently, at most `required` at a time, and fetching stops once
    /// `required` pieces verified or that became impossible. Each fetch dials
    /// the node's cached address from `cached_ips_and_ports` first when one
    /// is known, falling back to the limit's address if the dial fails.
    ///
    /// The returned reader decodes lazily as it is read.
    ///
    /// # Errors
    ///
    /// Fails without touching the network if `limits` does not have one slot
    /// per piece or holds fewer than `required` limits. Fails with
    /// [`EcError::Irreparable`] if fewer than `required` pieces verified;
    /// its `failed_pieces` lists the nodes that served bad pieces.
    pub async fn get(
        &self,
        limits: &[Option<AddressedOrderLimit>],
        cached_ips_and_ports: &HashMap<NodeId, String>,
        private_key: &PiecePrivateKey,
        scheme: &RedundancyScheme,
        data_size: u64,
    ) -> Result<SegmentDownload, EcError> {
        let total = scheme.total_count();
        let required = scheme.required_count();
        if limits.len() != total {
            return Err(EcError::LimitCountMismatch {
                got: limits.len(),
                total,
            });
        }
        let non_nil = non_nil_count(limits);
        if non_nil < required {
            return Err(EcError::NotEnoughLimits {
                got: non_nil,
                required,
            });
        }

        let piece_size = self.codec.piece_size(data_size, scheme);
        let gate = Arc::new(Gate {
            required,
            state: Mutex::new(GetState {
                unused_limits: non_nil,
                ..GetState::default()
            }),
            changed: Notify::new(),
        });
        let limiter = Arc::new(Semaphore::new(required));
        let mut workers = JoinSet::new();

        for (piece_num, addressed) in limits.iter().enumerate() {
            let Some(addressed) = addressed else {
                continue;
            };
            let Ok(permit) = Arc::clone(&limiter).acquire_owned().await else {
                break;
            };

            let repairer = self.clone();
            let gate = Arc::clone(&gate);
            let addressed = addressed.clone();
            let cached = cached_ips_and_ports
                .get(&addressed.limit.storage_node_id)
                .cloned();
            let key = private_key.clone();

            workers.spawn(async move {
                let _permit = permit;
                if !gate.enter().await {
                    return;
                }
                let node_id = addressed.limit.storage_node_id;
                let result = repairer
                    .download_and_verify_piece(&addressed, cached.as_deref(), &key, piece_size)
                    .await;
                if let Err(err) = &result {
                    if err.is_verification_failure() {
                        info!(node_id = %node_id, piece_num, error = %err, "audit failed");
                    } else {
                        debug!(
                            node_id = %node_id,
                            piece_num,
                            error = %err,
                            "Failed to download piece for repair"
                        );
                    }
                }
                gate.finish(piece_num, node_id, result);
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                if err.is_panic() {
                    std::panic::resume_unwind(err.into_panic());
                }
            }
        }

        let state = std::mem::take(&mut *gate.state.lock());
        if state.successful < required {
            increment_counter(DOWNLOAD_FAILED_NOT_ENOUGH_PIECES, &[]);
            return Err(IrreparableError {
                pieces_available: state.successful,
                pieces_required: required,
                failed_pieces: state.failed_pieces,
                report: state.report,
                errors: state.errors,
            }
            .into());
        }

        let reader = self.codec.decode(state.pieces, scheme, data_size)?;
        Ok(SegmentDownload {
            reader,
            failed_pieces: state.failed_pieces,
            report: state.report,
        })
    }

    async fn download_and_verify_piece(
        &self,
        addressed: &AddressedOrderLimit,
        cached_address: Option<&str>,
        key: &PiecePrivateKey,
        piece_size: u64,
    ) -> Result<PieceReader, PieceError> {
        let deadline = Instant::now() + self.config.download_timeout;
        let limit = &addressed.limit;
        let node_id = limit.storage_node_id;
        let limit_address = addressed.storage_node_address.as_str();

        let client = match cached_address.filter(|a| !a.is_empty() && *a != limit_address) {
            Some(cached) => match self.dial_until(deadline, node_id, cached).await {
                Err(err) if err.is_dial_failure() => {
                    debug!(
                        node_id = %node_id,
                        cached_address = cached,
                        error = %err,
                        "Failed dialing cached address, retrying with order limit address"
                    );
                    self.dial_until(deadline, node_id, limit_address).await?
                }
                dialed => dialed?,
            },
            None => self.dial_until(deadline, node_id, limit_address).await?,
        };

        let transfer = async {
            let mut download = client
                .download(limit, key, 0, piece_size)
                .await
                .map_err(PieceError::Transport)?;
            let piece = buffer_piece(&mut download, piece_size, self.config.in_memory_repair)
                .await
                .map_err(|err| match err {
                    BufferError::Read(e) => PieceError::Transport(TransportError::Io(e)),
                    BufferError::Store(e) => PieceError::Buffer(e),
                })?;
            Ok::<_, PieceError>((piece, download.proof()))
        };
        let (piece, proof) = timeout_at(deadline, transfer)
            .await
            .map_err(|_| PieceError::Timeout(self.config.download_timeout))??;

        increment_counter_by(REPAIR_BYTES_DOWNLOADED, piece.size, &[]);

        if piece.size != piece_size {
            return Err(PieceError::SizeMismatch {
                want: piece_size,
                got: piece.size,
            });
        }

        let (hash, original_limit) = match proof {
            DownloadProof::Signed {
                hash,
                original_limit,
            } => (hash, original_limit),
            DownloadProof::Missing(missing) => return Err(PieceError::MissingProof(missing)),
        };

        verify_order_limit_signature(self.satellite.as_ref(), &original_limit)
            .map_err(PieceError::Verification)?;
        if original_limit.piece_id != limit.piece_id {
            return Err(PieceError::Verification(VerifyError::PieceIdChanged {
                expected: limit.piece_id,
                actual: original_limit.piece_id,
            }));
        }
        verify_piece_hash(&original_limit, &hash, &piece.hash).map_err(PieceError::Verification)?;

        Ok(piece.reader)
    }

    async fn dial_until(
        &self,
        deadline: Instant,
        node_id: NodeId,
        address: &str,
    ) -> Result<Box<dyn PieceClient>, PieceError> {
        let url = NodeUrl::new(node_id, address);
        match timeout_at(deadline, self.dialer.dial(&url)).await {
            Ok(dialed) => dialed.map_err(PieceError::Dial),
            Err(_) => Err(PieceError::Dial(TransportError::Timeout)),
        }
    }
}
