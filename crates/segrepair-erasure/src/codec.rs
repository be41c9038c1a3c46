//! Streaming Reed-Solomon piece codec.
//!
//! Encoding reads the segment one stripe at a time and pushes one share per
//! stripe into each of the `total` piece streams. Every piece stream queues
//! on its own, and the encoder only waits while even the fastest reader is
//! `buffer_shares` behind. Decoding pulls one share per stripe from
//! `required` piece streams and only runs as fast as the caller reads the
//! output.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use reed_solomon_erasure::galois_8::ReedSolomon;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::error::ErasureError;
use crate::padding::make_padding;
use crate::scheme::RedundancyScheme;
use crate::stream::{ChannelReader, ChunkSender, PieceQueue, PieceReader, SegmentReader};

/// Default number of shares the encoder runs ahead of its fastest reader.
pub const DEFAULT_BUFFER_SHARES: usize = 32;

/// Splits a segment into pieces and joins pieces back into a segment.
pub trait ErasureCodec: Send + Sync {
    /// Encode `data` into `scheme.total_count()` piece streams.
    ///
    /// Each reader advances independently; a reader that stalls or is
    /// dropped never blocks the others.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is not supported by the codec.
    fn encode(
        &self,
        data: SegmentReader,
        scheme: &RedundancyScheme,
    ) -> Result<Vec<PieceReader>, ErasureError>;

    /// Decode a segment of `data_size` bytes from pieces keyed by piece number.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than `scheme.required_count()` pieces are
    /// given or a piece number is out of range.
    fn decode(
        &self,
        pieces: BTreeMap<usize, PieceReader>,
        scheme: &RedundancyScheme,
        data_size: u64,
    ) -> Result<SegmentReader, ErasureError>;

    /// Size of every piece for a segment of `data_size` bytes.
    fn piece_size(&self, data_size: u64, scheme: &RedundancyScheme) -> u64 {
        scheme.piece_size(data_size)
    }
}

/// Reed-Solomon over GF(2^8).
#[derive(Debug, Clone)]
pub struct ReedSolomonCodec {
    buffer_shares: usize,
}

impl Default for ReedSolomonCodec {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SHARES)
    }
}

impl ReedSolomonCodec {
    /// Codec whose encoder runs at most `buffer_shares` shares ahead of the
    /// fastest piece reader.
    #[must_use]
    pub fn new(buffer_shares: usize) -> Self {
        Self {
            buffer_shares: buffer_shares.max(1),
        }
    }
}

/// `None` when there is no parity to compute.
fn reed_solomon(scheme: &RedundancyScheme) -> Result<Option<ReedSolomon>, ErasureError> {
    let parity = scheme.total_count() - scheme.required_count();
    if parity == 0 {
        return Ok(None);
    }
    Ok(Some(ReedSolomon::new(scheme.required_count(), parity)?))
}

impl ErasureCodec for ReedSolomonCodec {
    fn encode(
        &self,
        data: SegmentReader,
        scheme: &RedundancyScheme,
    ) -> Result<Vec<PieceReader>, ErasureError> {
        let rs = reed_solomon(scheme)?;
        let drained = Arc::new(Notify::new());
        let mut queues = Vec::with_capacity(scheme.total_count());
        let mut readers: Vec<PieceReader> = Vec::with_capacity(scheme.total_count());
        for _ in 0..scheme.total_count() {
            let (queue, reader) = PieceQueue::new(Arc::clone(&drained));
            queues.push(Some(queue));
            readers.push(Box::new(reader));
        }
        let pacing = Pacing {
            ahead: self.buffer_shares,
            drained,
        };
        tokio::spawn(encode_task(data, *scheme, rs, queues, pacing));
        Ok(readers)
    }

    fn decode(
        &self,
        pieces: BTreeMap<usize, PieceReader>,
        scheme: &RedundancyScheme,
        data_size: u64,
    ) -> Result<SegmentReader, ErasureError> {
        let required = scheme.required_count();
        if pieces.len() < required {
            return Err(ErasureError::NotEnoughPieces {
                got: pieces.len(),
                required,
            });
        }
        if let Some((&index, _)) = pieces.iter().next_back() {
            if index >= scheme.total_count() {
                return Err(ErasureError::PieceIndexOutOfRange {
                    index,
                    total: scheme.total_count(),
                });
            }
        }
        let rs = reed_solomon(scheme)?;
        let inputs: Vec<(usize, PieceReader)> = pieces.into_iter().take(required).collect();
        let (tx, rx) = ChannelReader::channel(self.buffer_shares);
        tokio::spawn(decode_task(inputs, *scheme, rs, data_size, tx));
        Ok(Box::new(rx))
    }
}

/// Read until `buf` is full or EOF; returns bytes read.
async fn read_full<R: AsyncRead + Unpin + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

struct Pacing {
    ahead: usize,
    drained: Arc<Notify>,
}

impl Pacing {
    /// Wait until some live reader is fewer than `ahead` shares behind.
    /// Returns false once every reader is gone.
    async fn wait_for_room(&self, queues: &mut [Option<PieceQueue>]) -> bool {
        loop {
            let notified = self.drained.notified();
            let mut live = false;
            for slot in queues.iter_mut() {
                match slot.as_ref().map(PieceQueue::pending) {
                    Some(Some(pending)) if pending < self.ahead => return true,
                    Some(Some(_)) => live = true,
                    Some(None) => *slot = None,
                    None => {}
                }
            }
            if !live {
                return false;
            }
            notified.await;
        }
    }
}

fn fail_all(queues: &[Option<PieceQueue>], kind: io::ErrorKind, message: &str) {
    for queue in queues.iter().flatten() {
        queue.fail(io::Error::new(kind, message.to_string()));
    }
}

async fn encode_task(
    mut data: SegmentReader,
    scheme: RedundancyScheme,
    rs: Option<ReedSolomon>,
    mut queues: Vec<Option<PieceQueue>>,
    pacing: Pacing,
) {
    let stripe_size = scheme.stripe_size();
    let mut consumed: u64 = 0;
    let mut buf = vec![0u8; stripe_size];

    loop {
        let n = match read_full(&mut data, &mut buf).await {
            Ok(n) => n,
            Err(err) => {
                debug!(error = %err, "segment read failed, aborting piece streams");
                fail_all(&queues, err.kind(), &err.to_string());
                return;
            }
        };
        consumed += n as u64;

        let last = n < stripe_size;
        let mut block = buf[..n].to_vec();
        if last {
            block.extend(make_padding(consumed, stripe_size));
        }

        for stripe in block.chunks(stripe_size) {
            let shares = match encode_stripe(stripe, &scheme, rs.as_ref()) {
                Ok(shares) => shares,
                Err(err) => {
                    fail_all(&queues, io::ErrorKind::Other, &err.to_string());
                    return;
                }
            };
            if !pacing.wait_for_room(&mut queues).await {
                trace!("all piece readers dropped");
                return;
            }
            for (slot, share) in queues.iter_mut().zip(shares) {
                if let Some(queue) = slot.as_ref() {
                    if !queue.push(Bytes::from(share)) {
                        *slot = None;
                    }
                }
            }
        }

        if last {
            trace!(bytes = consumed, "segment encoded");
            return;
        }
    }
}

fn encode_stripe(
    stripe: &[u8],
    scheme: &RedundancyScheme,
    rs: Option<&ReedSolomon>,
) -> Result<Vec<Vec<u8>>, ErasureError> {
    let share_size = scheme.share_size();
    let mut shares: Vec<Vec<u8>> = stripe.chunks(share_size).map(<[u8]>::to_vec).collect();
    shares.resize(scheme.total_count(), vec![0u8; share_size]);
    if let Some(rs) = rs {
        rs.encode(&mut shares)?;
    }
    Ok(shares)
}

async fn decode_task(
    mut inputs: Vec<(usize, PieceReader)>,
    scheme: RedundancyScheme,
    rs: Option<ReedSolomon>,
    data_size: u64,
    tx: ChunkSender,
) {
    let share_size = scheme.share_size();
    let required = scheme.required_count();
    let mut remaining = data_size;

    for _ in 0..scheme.stripe_count(data_size) {
        if remaining == 0 {
            break;
        }
        let mut shards: Vec<Option<Vec<u8>>> = vec![None; scheme.total_count()];
        for (index, reader) in &mut inputs {
            let mut share = vec![0u8; share_size];
            if let Err(err) = reader.read_exact(&mut share).await {
                debug!(piece_num = *index, error = %err, "piece read failed during decode");
                let _ = tx.send(Err(err)).await;
                return;
            }
            shards[*index] = Some(share);
        }

        if let Some(rs) = rs.as_ref() {
            if let Err(err) = rs.reconstruct_data(&mut shards) {
                let _ = tx.send(Err(io::Error::other(format!("reed-solomon: {err:?}")))).await;
                return;
            }
        }

        let mut stripe = Vec::with_capacity(scheme.stripe_size());
        for share in shards.into_iter().take(required) {
            match share {
                Some(share) => stripe.extend_from_slice(&share),
                None => {
                    let _ = tx
                        .send(Err(io::Error::other("data share missing after reconstruction")))
                        .await;
                    return;
                }
            }
        }

        let take = usize::try_from(remaining).map_or(stripe.len(), |r| r.min(stripe.len()));
        stripe.truncate(take);
        remaining -= take as u64;
        if tx.send(Ok(Bytes::from(stripe))).await.is_err() {
            trace!("segment reader dropped");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::RngCore;

    use super::*;

    fn segment(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut data);
        data
    }

    async fn encode_all(codec: &ReedSolomonCodec, data: &[u8], scheme: &RedundancyScheme) -> Vec<Vec<u8>> {
        let readers = codec
            .encode(Box::new(std::io::Cursor::new(data.to_vec())), scheme)
            .unwrap();
        let mut tasks = Vec::new();
        for mut reader in readers {
            tasks.push(tokio::spawn(async move {
                let mut out = Vec::new();
                reader.read_to_end(&mut out).await.unwrap();
                out
            }));
        }
        let mut pieces = Vec::new();
        for task in tasks {
            pieces.push(task.await.unwrap());
        }
        pieces
    }

    async fn decode_from(
        codec: &ReedSolomonCodec,
        pieces: &[Vec<u8>],
        indices: &[usize],
        scheme: &RedundancyScheme,
        data_size: u64,
    ) -> Vec<u8> {
        let map: BTreeMap<usize, PieceReader> = indices
            .iter()
            .map(|&i| (i, Box::new(std::io::Cursor::new(pieces[i].clone())) as PieceReader))
            .collect();
        let mut reader = codec.decode(map, scheme, data_size).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn pieces_have_computed_size() {
        let scheme = RedundancyScheme::new(4, 5, 6, 8, 32).unwrap();
        let codec = ReedSolomonCodec::default();
        let data = segment(1000);

        let pieces = encode_all(&codec, &data, &scheme).await;
        assert_eq!(pieces.len(), 8);
        for piece in &pieces {
            assert_eq!(piece.len() as u64, codec.piece_size(1000, &scheme));
        }
    }

    #[tokio::test]
    async fn any_k_pieces_reconstruct() {
        let scheme = RedundancyScheme::new(4, 5, 6, 8, 32).unwrap();
        let codec = ReedSolomonCodec::new(2);
        let data = segment(3333);
        let pieces = encode_all(&codec, &data, &scheme).await;

        for indices in [[0, 1, 2, 3], [4, 5, 6, 7], [0, 3, 5, 7], [1, 2, 6, 7]] {
            let out = decode_from(&codec, &pieces, &indices, &scheme, data.len() as u64).await;
            assert_eq!(out, data, "indices {indices:?}");
        }
    }

    #[tokio::test]
    async fn no_parity_scheme() {
        let scheme = RedundancyScheme::new(3, 3, 3, 3, 8).unwrap();
        let codec = ReedSolomonCodec::default();
        let data = segment(100);
        let pieces = encode_all(&codec, &data, &scheme).await;
        let out = decode_from(&codec, &pieces, &[0, 1, 2], &scheme, 100).await;
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn empty_segment() {
        let scheme = RedundancyScheme::new(2, 3, 3, 4, 8).unwrap();
        let codec = ReedSolomonCodec::default();
        let pieces = encode_all(&codec, &[], &scheme).await;
        assert!(pieces.iter().all(|p| p.len() == 8));
        let out = decode_from(&codec, &pieces, &[1, 3], &scheme, 0).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn dropped_readers_do_not_stall_others() {
        let scheme = RedundancyScheme::new(2, 3, 3, 4, 4).unwrap();
        let codec = ReedSolomonCodec::new(1);
        let data = segment(500);
        let mut readers = codec
            .encode(Box::new(std::io::Cursor::new(data.clone())), &scheme)
            .unwrap();
        readers.truncate(2);

        let mut pieces = Vec::new();
        let mut tasks = Vec::new();
        for mut reader in readers {
            tasks.push(tokio::spawn(async move {
                let mut out = Vec::new();
                reader.read_to_end(&mut out).await.unwrap();
                out
            }));
        }
        for task in tasks {
            pieces.push(task.await.unwrap());
        }
        let out = decode_from(&codec, &pieces, &[0, 1], &scheme, 500).await;
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn idle_reader_does_not_stall_others() {
        let scheme = RedundancyScheme::new(4, 5, 6, 8, 256).unwrap();
        let codec = ReedSolomonCodec::new(2);
        let data = segment(200 * 1024);
        let mut readers = codec
            .encode(Box::new(std::io::Cursor::new(data.clone())), &scheme)
            .unwrap();
        // Held open and never read.
        let idle = readers.remove(0);

        let mut tasks = Vec::new();
        for mut reader in readers {
            tasks.push(tokio::spawn(async move {
                let mut out = Vec::new();
                reader.read_to_end(&mut out).await.unwrap();
                out
            }));
        }
        let mut pieces = vec![Vec::new()];
        for task in tasks {
            let piece = tokio::time::timeout(std::time::Duration::from_secs(10), task)
                .await
                .expect("piece stream stalled behind an idle reader")
                .unwrap();
            pieces.push(piece);
        }
        drop(idle);

        let piece_size = codec.piece_size(data.len() as u64, &scheme);
        assert!(pieces[1..].iter().all(|p| p.len() as u64 == piece_size));
        let out = decode_from(&codec, &pieces, &[1, 3, 5, 7], &scheme, data.len() as u64).await;
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn decode_needs_required_pieces() {
        let scheme = RedundancyScheme::new(2, 3, 3, 4, 4).unwrap();
        let codec = ReedSolomonCodec::default();
        let one: BTreeMap<usize, PieceReader> =
            [(0, Box::new(std::io::Cursor::new(Vec::new())) as PieceReader)].into();
        assert!(matches!(
            codec.decode(one, &scheme, 10),
            Err(ErasureError::NotEnoughPieces { got: 1, required: 2 })
        ));

        let out_of_range: BTreeMap<usize, PieceReader> = [0, 9]
            .into_iter()
            .map(|i| (i, Box::new(std::io::Cursor::new(Vec::new())) as PieceReader))
            .collect();
        assert!(matches!(
            codec.decode(out_of_range, &scheme, 10),
            Err(ErasureError::PieceIndexOutOfRange { index: 9, total: 4 })
        ));
    }

    #[tokio::test]
    async fn short_piece_surfaces_error() {
        let scheme = RedundancyScheme::new(2, 3, 3, 4, 4).unwrap();
        let codec = ReedSolomonCodec::default();
        let map: BTreeMap<usize, PieceReader> = [0, 1]
            .into_iter()
            .map(|i| (i, Box::new(std::io::Cursor::new(vec![0u8; 2])) as PieceReader))
            .collect();
        let mut reader = codec.decode(map, &scheme, 10).unwrap();
        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).await.is_err());
    }
}
