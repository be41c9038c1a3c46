//! Channel-backed byte streams.
//!
//! The decoder pushes chunks into a bounded channel that the segment reader
//! drains. The encoder feeds each piece through its own unbounded
//! [`PieceQueue`] so one idle reader never holds back the others.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker, ready};

use bytes::{Buf, Bytes};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::{Notify, mpsc};

/// Readable stream of one piece's bytes.
pub type PieceReader = Box<dyn AsyncRead + Send + Unpin>;

/// Readable stream of a whole segment's bytes.
pub type SegmentReader = Box<dyn AsyncRead + Send + Unpin>;

/// Sending half of a [`ChannelReader`].
pub type ChunkSender = mpsc::Sender<io::Result<Bytes>>;

/// [`AsyncRead`] over a channel of byte chunks.
///
/// An `Err` item is surfaced once to the reader. A closed channel is EOF.
#[derive(Debug)]
pub struct ChannelReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    current: Bytes,
    done: bool,
}

impl ChannelReader {
    /// Create a reader and the sender that feeds it.
    #[must_use]
    pub fn channel(buffer: usize) -> (ChunkSender, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            tx,
            Self {
                rx,
                current: Bytes::new(),
                done: false,
            },
        )
    }
}

impl AsyncRead for ChannelReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.current.has_remaining() {
                let n = this.current.len().min(buf.remaining());
                buf.put_slice(&this.current[..n]);
                this.current.advance(n);
                return Poll::Ready(Ok(()));
            }
            if this.done || buf.remaining() == 0 {
                return Poll::Ready(Ok(()));
            }
            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(chunk)) => this.current = chunk,
                Some(Err(err)) => {
                    this.done = true;
                    return Poll::Ready(Err(err));
                }
                None => this.done = true,
            }
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    chunks: VecDeque<Bytes>,
    error: Option<io::Error>,
    closed: bool,
    reader_gone: bool,
    waker: Option<Waker>,
}

impl QueueState {
    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

#[derive(Debug)]
struct Queue {
    state: Mutex<QueueState>,
    /// Shared by every queue of one encoding; signalled when a reader
    /// takes a chunk or goes away.
    drained: Arc<Notify>,
}

/// Writing half of one piece stream. Pushing never waits.
#[derive(Debug)]
pub(crate) struct PieceQueue {
    queue: Arc<Queue>,
}

/// Reading half of a [`PieceQueue`].
#[derive(Debug)]
pub(crate) struct PieceQueueReader {
    queue: Arc<Queue>,
    current: Bytes,
}

impl PieceQueue {
    pub(crate) fn new(drained: Arc<Notify>) -> (Self, PieceQueueReader) {
        let queue = Arc::new(Queue {
            state: Mutex::new(QueueState::default()),
            drained,
        });
        (
            Self {
                queue: Arc::clone(&queue),
            },
            PieceQueueReader {
                queue,
                current: Bytes::new(),
            },
        )
    }

    /// Append a chunk. Returns false once the reader is gone.
    pub(crate) fn push(&self, chunk: Bytes) -> bool {
        let mut state = self.queue.state.lock();
        if state.reader_gone {
            return false;
        }
        state.chunks.push_back(chunk);
        state.wake();
        true
    }

    /// Fail the stream after whatever is already queued.
    pub(crate) fn fail(&self, err: io::Error) {
        let mut state = self.queue.state.lock();
        state.error = Some(err);
        state.wake();
    }

    /// Chunks not yet read, or `None` once the reader is gone.
    pub(crate) fn pending(&self) -> Option<usize> {
        let state = self.queue.state.lock();
        (!state.reader_gone).then_some(state.chunks.len())
    }
}

impl Drop for PieceQueue {
    fn drop(&mut self) {
        let mut state = self.queue.state.lock();
        state.closed = true;
        state.wake();
    }
}

impl AsyncRead for PieceQueueReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.current.has_remaining() {
                let n = this.current.len().min(buf.remaining());
                buf.put_slice(&this.current[..n]);
                this.current.advance(n);
                return Poll::Ready(Ok(()));
            }
            if buf.remaining() == 0 {
                return Poll::Ready(Ok(()));
            }
            let mut state = this.queue.state.lock();
            if let Some(chunk) = state.chunks.pop_front() {
                drop(state);
                this.current = chunk;
                this.queue.drained.notify_one();
                continue;
            }
            if let Some(err) = state.error.take() {
                state.closed = true;
                return Poll::Ready(Err(err));
            }
            if state.closed {
                return Poll::Ready(Ok(()));
            }
            state.waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
    }
}

impl Drop for PieceQueueReader {
    fn drop(&mut self) {
        let mut state = self.queue.state.lock();
        state.reader_gone = true;
        state.chunks.clear();
        drop(state);
        self.queue.drained.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn reads_chunks_in_order() {
        let (tx, mut reader) = ChannelReader::channel(4);
        tokio::spawn(async move {
            for chunk in [&b"ab"[..], b"", b"cde"] {
                tx.send(Ok(Bytes::copy_from_slice(chunk))).await.unwrap();
            }
        });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abcde");
    }

    #[tokio::test]
    async fn surfaces_errors() {
        let (tx, mut reader) = ChannelReader::channel(4);
        tx.send(Ok(Bytes::from_static(b"x"))).await.unwrap();
        tx.send(Err(io::Error::new(io::ErrorKind::BrokenPipe, "encoder gone")))
            .await
            .unwrap();
        drop(tx);

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(out, b"x");
    }

    #[tokio::test]
    async fn queue_accepts_chunks_without_a_reader_draining() {
        let (queue, mut reader) = PieceQueue::new(Arc::new(Notify::new()));
        for i in 0..1000u32 {
            assert!(queue.push(Bytes::copy_from_slice(&i.to_be_bytes())));
        }
        assert_eq!(queue.pending(), Some(1000));
        drop(queue);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), 4000);
        assert_eq!(&out[3996..], &999u32.to_be_bytes());
    }

    #[tokio::test]
    async fn queue_error_follows_queued_data() {
        let (queue, mut reader) = PieceQueue::new(Arc::new(Notify::new()));
        queue.push(Bytes::from_static(b"ab"));
        queue.fail(io::Error::new(io::ErrorKind::UnexpectedEof, "segment truncated"));

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, b"ab");
    }

    #[tokio::test]
    async fn dropped_reader_stops_queue_and_signals() {
        let drained = Arc::new(Notify::new());
        let (queue, reader) = PieceQueue::new(Arc::clone(&drained));
        queue.push(Bytes::from_static(b"ab"));
        drop(reader);

        assert_eq!(queue.pending(), None);
        assert!(!queue.push(Bytes::from_static(b"cd")));
        tokio::time::timeout(std::time::Duration::from_secs(1), drained.notified())
            .await
            .unwrap();
    }
}
