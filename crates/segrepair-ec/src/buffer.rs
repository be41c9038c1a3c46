//! Local piece buffering.
//!
//! A downloaded piece is hashed while it is copied into memory or an
//! anonymous temporary file, then rewound so the decoder can read it again.
//! The temporary file has no name on disk and disappears when its reader is
//! dropped.

use std::io::{self, Cursor, SeekFrom};

use segrepair_crypto::PieceHasher;
use segrepair_erasure::PieceReader;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

const COPY_CHUNK: usize = 32 * 1024;

/// A fully received piece, rewound to its first byte.
pub(crate) struct BufferedPiece {
    pub reader: PieceReader,
    pub size: u64,
    pub hash: Vec<u8>,
}

#[derive(Debug)]
pub(crate) enum BufferError {
    /// The source stream failed.
    Read(io::Error),
    /// The local buffer failed.
    Store(io::Error),
}

enum Sink {
    Memory(Vec<u8>),
    File(tokio::fs::File),
}

impl Sink {
    fn open(in_memory: bool) -> io::Result<Self> {
        if in_memory {
            return Ok(Self::Memory(Vec::new()));
        }
        Ok(Self::File(tokio::fs::File::from_std(tempfile::tempfile()?)))
    }

    async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            Self::Memory(buf) => {
                buf.extend_from_slice(chunk);
                Ok(())
            }
            Self::File(file) => file.write_all(chunk).await,
        }
    }

    async fn rewind(self) -> io::Result<PieceReader> {
        match self {
            Self::Memory(buf) => Ok(Box::new(Cursor::new(buf))),
            Self::File(mut file) => {
                file.flush().await?;
                file.seek(SeekFrom::Start(0)).await?;
                Ok(Box::new(file))
            }
        }
    }
}

/// Copy at most `max_bytes + 1` bytes of `src` into a local buffer.
///
/// The extra byte lets the caller tell an oversized piece from an exact one.
pub(crate) async fn buffer_piece<R>(
    src: &mut R,
    max_bytes: u64,
    in_memory: bool,
) -> Result<BufferedPiece, BufferError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut sink = Sink::open(in_memory).map_err(BufferError::Store)?;
    let mut src = src.take(max_bytes.saturating_add(1));
    let mut hasher = PieceHasher::new();
    let mut chunk = vec![0u8; COPY_CHUNK];

    loop {
        let n = src.read(&mut chunk).await.map_err(BufferError::Read)?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
        sink.write(&chunk[..n]).await.map_err(BufferError::Store)?;
    }

    let size = hasher.written();
    Ok(BufferedPiece {
        reader: sink.rewind().await.map_err(BufferError::Store)?,
        size,
        hash: hasher.finalize(),
    })
}
