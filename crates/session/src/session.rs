//! Buffered duplex stream for one established peer connection.

use std::fmt;
use std::net::SocketAddr;

use tokio::io::{
    AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf,
};
use tracing::debug;

use crate::TCP_BUFFER_SIZE;
use crate::error::SessionError;

/// An established connection to the other peer.
///
/// The connection is owned here and closed exactly once: gracefully by
/// [`close`](Self::close) on success, or by dropping the session on any error
/// path.
pub struct PeerSession<S> {
    pub(crate) reader: BufReader<ReadHalf<S>>,
    pub(crate) writer: BufWriter<WriteHalf<S>>,
    peer_addr: SocketAddr,
}

impl<S> fmt::Debug for PeerSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

impl<S> PeerSession<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S, peer_addr: SocketAddr) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::with_capacity(TCP_BUFFER_SIZE, reader),
            writer: BufWriter::with_capacity(TCP_BUFFER_SIZE, writer),
            peer_addr,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Splits the session so the reader can move into a producer task.
    pub(crate) fn into_parts(self) -> (BufReader<ReadHalf<S>>, BufWriter<WriteHalf<S>>, SocketAddr) {
        (self.reader, self.writer, self.peer_addr)
    }

    pub(crate) fn from_parts(
        reader: BufReader<ReadHalf<S>>,
        writer: BufWriter<WriteHalf<S>>,
        peer_addr: SocketAddr,
    ) -> Self {
        Self {
            reader,
            writer,
            peer_addr,
        }
    }

    /// Flushes pending output and shuts the connection down.
    pub async fn close(mut self) -> Result<(), SessionError> {
        self.writer.flush().await.map_err(SessionError::transport)?;
        self.writer
            .shutdown()
            .await
            .map_err(SessionError::transport)?;
        debug!(peer = %self.peer_addr, "peer session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::HangupOnShutdown;
    use tokio::io::{AsyncReadExt, duplex};

    fn loopback() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    #[test]
    fn debug_output_names_the_peer() {
        let (local, _remote) = duplex(64);
        let session = PeerSession::new(local, loopback());
        let shown = format!("{session:?}");
        assert!(shown.starts_with("PeerSession"));
        assert!(shown.contains("127.0.0.1:9"));
    }

    #[tokio::test]
    async fn close_flushes_buffered_output() {
        let (local, mut remote) = duplex(64);
        let mut session = PeerSession::new(local, loopback());
        session.writer.write_all(b"bye").await.unwrap();
        session.close().await.unwrap();

        let mut seen = Vec::new();
        remote.read_to_end(&mut seen).await.unwrap();
        assert_eq!(seen, b"bye");
    }

    #[tokio::test]
    async fn close_reports_a_hung_up_peer() {
        let (local, _remote) = duplex(64);
        let session = PeerSession::new(HangupOnShutdown(local), loopback());
        let err = session.close().await.unwrap_err();
        assert_eq!(err.stage(), crate::error::Stage::Transport);
    }
}
