//! Bounded chunk pipeline between a byte source and a chunk sink.
//!
//! A producer task reads the source into freshly allocated buffers of
//! `min(remaining, chunk_size)` bytes and hands them over a bounded channel.
//! The consumer, running in the caller's task, writes each chunk at the
//! running offset and advances the shared [`TransferProgress`].
//!
//! The producer stops on its own byte count; it never waits for an end
//! marker. The same pipeline drives both directions: socket to file on the
//! downloader, file to socket on the uploader.

use std::future::Future;
use std::io::SeekFrom;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::CHUNK_QUEUE_DEPTH;
use crate::error::SessionError;

/// Byte counter shared between the chunk consumer and a progress observer.
///
/// Written only by the consumer; safe to read from any task.
#[derive(Debug)]
pub struct TransferProgress {
    transferred: AtomicU64,
    total: u64,
}

impl TransferProgress {
    pub fn new(total: u64) -> Self {
        Self {
            transferred: AtomicU64::new(0),
            total,
        }
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Acquire)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Returns the progress as a percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.transferred() as f64 / self.total as f64 * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.transferred() >= self.total
    }

    fn advance(&self, bytes: u64) {
        self.transferred.fetch_add(bytes, Ordering::AcqRel);
    }
}

/// Destination of an ordered chunk stream.
pub trait ChunkSink {
    /// Writes `chunk` at byte `offset`. Offsets arrive strictly increasing
    /// and contiguous.
    fn write_chunk(
        &mut self,
        offset: u64,
        chunk: &[u8],
    ) -> impl Future<Output = std::io::Result<()>> + Send;
}

/// Writes chunks into a file at their offsets.
pub struct FileSink {
    file: File,
}

impl FileSink {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Flushes buffered writes and syncs the file to disk.
    pub async fn finish(mut self) -> std::io::Result<File> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(self.file)
    }
}

impl ChunkSink for FileSink {
    async fn write_chunk(&mut self, offset: u64, chunk: &[u8]) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(chunk).await
    }
}

/// Writes chunks to a stream in arrival order.
pub struct StreamSink<'a, W> {
    writer: &'a mut W,
    position: u64,
}

impl<'a, W> StreamSink<'a, W> {
    pub fn new(writer: &'a mut W) -> Self {
        Self {
            writer,
            position: 0,
        }
    }
}

impl<W> ChunkSink for StreamSink<'_, W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_chunk(&mut self, offset: u64, chunk: &[u8]) -> std::io::Result<()> {
        // A stream cannot seek; the pipeline guarantees contiguity.
        if offset != self.position {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("chunk at {offset} does not follow {}", self.position),
            ));
        }
        self.writer.write_all(chunk).await?;
        self.position += chunk.len() as u64;
        Ok(())
    }
}

/// Totals reported by a completed pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub bytes: u64,
    pub chunks: u64,
}

/// Moves exactly `size` bytes from `source` to `sink` in chunks of at most
/// `chunk_size` bytes.
///
/// Returns the source so the caller can keep using it (the downloader reads
/// nothing more from the socket, but still owns it until the session ends).
pub async fn run_pipeline<R, S>(
    source: R,
    sink: &mut S,
    size: u64,
    chunk_size: usize,
    progress: &TransferProgress,
) -> Result<(R, PipelineReport), SessionError>
where
    R: AsyncRead + Unpin + Send + 'static,
    S: ChunkSink,
{
    if chunk_size == 0 {
        return Err(SessionError::InvalidArgument(
            "chunk size must be greater than zero".into(),
        ));
    }

    let (tx, mut rx) = mpsc::channel(CHUNK_QUEUE_DEPTH);
    let producer = spawn_producer(source, size, chunk_size, tx);

    match consume_chunks(&mut rx, sink, size, progress).await {
        Ok(chunks) => {
            let source = producer
                .await
                .map_err(|e| SessionError::Transfer(format!("chunk producer failed: {e}")))??;
            debug!(bytes = size, chunks, "pipeline drained");
            Ok((
                source,
                PipelineReport {
                    bytes: size,
                    chunks,
                },
            ))
        }
        Err(consumer_err) => {
            // Stop reading; a producer failure is the more precise cause.
            drop(rx);
            producer.abort();
            match producer.await {
                Ok(Err(producer_err)) => Err(producer_err),
                _ => Err(consumer_err),
            }
        }
    }
}

/// Spawns the producer task. It resolves to the source once exactly `size`
/// bytes were read and handed off.
pub fn spawn_producer<R>(
    mut source: R,
    size: u64,
    chunk_size: usize,
    tx: mpsc::Sender<Vec<u8>>,
) -> JoinHandle<Result<R, SessionError>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        produce_chunks(&mut source, size, chunk_size, &tx).await?;
        Ok(source)
    })
}

async fn produce_chunks<R>(
    source: &mut R,
    size: u64,
    chunk_size: usize,
    tx: &mpsc::Sender<Vec<u8>>,
) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut read_total: u64 = 0;

    while read_total < size {
        let len = (size - read_total).min(chunk_size as u64) as usize;
        let mut chunk = vec![0u8; len];

        // Short reads are normal on a socket; keep filling the same buffer.
        let mut filled = 0;
        while filled < len {
            let n = source
                .read(&mut chunk[filled..])
                .await
                .map_err(SessionError::transfer)?;
            if n == 0 {
                return Err(SessionError::Transfer(format!(
                    "source closed after {} of {size} bytes",
                    read_total + filled as u64
                )));
            }
            filled += n;
        }

        read_total += len as u64;
        trace!(len, read_total, "chunk produced");
        tx.send(chunk)
            .await
            .map_err(|_| SessionError::Transfer("chunk consumer stopped".into()))?;
    }

    Ok(())
}

/// Drains chunks into `sink` until `size` bytes were written. Returns the
/// number of chunks consumed.
pub async fn consume_chunks<S>(
    rx: &mut mpsc::Receiver<Vec<u8>>,
    sink: &mut S,
    size: u64,
    progress: &TransferProgress,
) -> Result<u64, SessionError>
where
    S: ChunkSink,
{
    let mut offset: u64 = 0;
    let mut chunks: u64 = 0;

    while offset < size {
        let Some(chunk) = rx.recv().await else {
            return Err(SessionError::Transfer(format!(
                "producer stopped after {offset} of {size} bytes"
            )));
        };
        let len = chunk.len() as u64;
        if len == 0 || offset + len > size {
            return Err(SessionError::Transfer(format!(
                "chunk of {len} bytes at offset {offset} violates size {size}"
            )));
        }

        sink.write_chunk(offset, &chunk)
            .await
            .map_err(SessionError::transfer)?;
        offset += len;
        chunks += 1;
        progress.advance(len);
    }

    Ok(chunks)
}
