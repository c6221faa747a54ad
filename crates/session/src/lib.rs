//! Direct peer-to-peer file transfer over a hole-punched TLS connection.
//!
//! A session runs through fixed stages, each a precondition for the next:
//!
//! 1. [`rendezvous`]: announce the role to the rendezvous service, learn the
//!    session id and the local port the NAT mapping was created for.
//! 2. [`transport`]: listen (downloader) or dial (uploader) on that port and
//!    negotiate mutual TLS.
//! 3. [`handshake`]: exchange compatibility tokens.
//! 4. [`wire`]: send or receive the three-line metadata record.
//! 5. [`pipeline`]: stream the content in bounded chunks.
//! 6. [`verify`]: re-hash the written file and report the verdict.
//!
//! [`download`] and [`upload`] drive the stages for each role.

pub mod download;
pub mod error;
pub mod events;
pub mod handshake;
pub mod pipeline;
pub mod rendezvous;
pub mod session;
pub mod tls;
pub mod transport;
pub mod upload;
pub mod verify;
pub mod wire;

#[cfg(test)]
mod testing;

pub use download::{DownloadOutcome, download};
pub use error::{SessionError, Stage};
pub use events::{EventSender, SessionEvent};
pub use pipeline::TransferProgress;
pub use rendezvous::{Announce, Rendezvous, punch_hole};
pub use session::PeerSession;
pub use tls::{TlsContext, TlsIdentity};
pub use upload::{UploadOutcome, file_info_for, upload};
pub use verify::Verdict;

pub use peershift_protocol as protocol;

use std::time::Duration;

/// Socket read/write buffer size (256 KB).
pub const TCP_BUFFER_SIZE: usize = 256 * 1024;

/// Default timeout for dialing the rendezvous service or the peer.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time the downloader waits for the uploader to connect.
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default timeout for the TLS negotiation plus compatibility exchange.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Number of chunks that may be in flight between producer and consumer.
pub const CHUNK_QUEUE_DEPTH: usize = 4;

/// Where the rendezvous service lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendezvousSettings {
    pub host: String,
    pub port: u16,
}

/// Tunables for a single session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Upper bound on a content chunk.
    pub chunk_size: usize,
    pub connect_timeout: Duration,
    pub accept_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            chunk_size: protocol::DEFAULT_CHUNK_SIZE,
            connect_timeout: CONNECT_TIMEOUT,
            accept_timeout: ACCEPT_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }
}
