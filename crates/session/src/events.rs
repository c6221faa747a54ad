//! Milestones reported to the caller while a session runs.

use std::net::SocketAddr;
use std::sync::Arc;

use peershift_protocol::{FileInfo, SessionId};
use tokio::sync::mpsc;

use crate::pipeline::TransferProgress;
use crate::verify::Verdict;

/// A session milestone. Delivery is best-effort: events are dropped rather
/// than stalling the session when the receiver falls behind.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The rendezvous service issued an id for this peer.
    SessionId(SessionId),
    /// The downloader is accepting on the given local port.
    Listening { port: u16 },
    /// TLS and the compatibility exchange succeeded.
    Connected { peer: SocketAddr },
    /// Metadata is known; the content transfer is about to start.
    Transferring {
        info: FileInfo,
        progress: Arc<TransferProgress>,
    },
    /// All content bytes have moved; the checksum is being verified.
    Verifying,
    /// The terminal verdict of the session.
    Finished(Verdict),
}

/// Sender side of the event channel handed to [`download`](crate::download)
/// and [`upload`](crate::upload).
pub type EventSender = mpsc::Sender<SessionEvent>;

/// Reports an event without waiting for channel capacity.
pub(crate) fn emit(events: &EventSender, event: SessionEvent) {
    let _ = events.try_send(event);
}
