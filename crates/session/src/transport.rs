//! Direct TLS connection between the two peers.
//!
//! The peer link reuses the local port the rendezvous dial went out on, so
//! that the NAT mapping created for the rendezvous service also admits the
//! peer. This only works if the OS lets the port be rebound right after the
//! rendezvous connection closed (address reuse, plus port reuse on Unix) and
//! the NAT keeps the mapping alive for the duration. Neither is guaranteed;
//! failures surface as bind, accept or dial errors and are not retried.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use peershift_protocol::Role;
use rustls::pki_types::ServerName;
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;
use tokio_rustls::TlsStream;
use tracing::{debug, info};

use crate::SessionOptions;
use crate::error::{SessionError, Stage};
use crate::events::{EventSender, SessionEvent, emit};
use crate::rendezvous::Rendezvous;
use crate::session::PeerSession;
use crate::tls::TlsContext;

/// TLS stream carrying a peer session, client or server side.
pub type PeerStream = TlsStream<TcpStream>;

/// Creates a socket bound to `local_addr` that tolerates a recently used
/// port.
pub fn reusable_socket(local_addr: SocketAddr) -> std::io::Result<TcpSocket> {
    let socket = match local_addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    #[cfg(unix)]
    socket.set_reuseport(true)?;
    socket.bind(local_addr)?;
    Ok(socket)
}

/// Wildcard address of the same family as `addr`.
pub(crate) fn unspecified_like(addr: &SocketAddr) -> IpAddr {
    match addr {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

/// Opens the peer link for `role` on the port obtained from rendezvous.
///
/// The downloader accepts exactly one connection; the uploader dials the
/// coordinates relayed by the rendezvous service.
pub async fn establish(
    role: Role,
    rendezvous: &Rendezvous,
    tls: &TlsContext,
    options: &SessionOptions,
    events: &EventSender,
) -> Result<PeerSession<PeerStream>, SessionError> {
    if role.listens() {
        accept_once(rendezvous.local_addr, tls, options, events).await
    } else {
        let peer = rendezvous.peer_addr.ok_or_else(|| {
            SessionError::InvalidArgument("rendezvous did not relay a peer address".into())
        })?;
        dial(rendezvous.local_addr, peer, tls, options).await
    }
}

async fn accept_once(
    local: SocketAddr,
    tls: &TlsContext,
    options: &SessionOptions,
    events: &EventSender,
) -> Result<PeerSession<PeerStream>, SessionError> {
    let port = local.port();
    let bind_addr = SocketAddr::new(unspecified_like(&local), port);
    let listener = reusable_socket(bind_addr)
        .and_then(|socket| socket.listen(1))
        .map_err(|e| SessionError::Transport(format!("failed to listen on port {port}: {e}")))?;

    info!(port, "waiting for peer");
    emit(events, SessionEvent::Listening { port });

    let (tcp, peer) = timeout(options.accept_timeout, listener.accept())
        .await
        .map_err(|_| SessionError::timeout(Stage::Transport, "waiting for the peer to connect"))?
        .map_err(SessionError::transport)?;
    // One connection per session.
    drop(listener);
    debug!(%peer, "peer connected, negotiating TLS");

    let stream = timeout(options.handshake_timeout, tls.acceptor().accept(tcp))
        .await
        .map_err(|_| SessionError::timeout(Stage::Transport, "negotiating TLS"))?
        .map_err(|e| SessionError::Transport(format!("TLS accept failed: {e}")))?;

    Ok(PeerSession::new(TlsStream::Server(stream), peer))
}

async fn dial(
    local: SocketAddr,
    peer: SocketAddr,
    tls: &TlsContext,
    options: &SessionOptions,
) -> Result<PeerSession<PeerStream>, SessionError> {
    let bind_addr = SocketAddr::new(unspecified_like(&peer), local.port());
    let socket = reusable_socket(bind_addr).map_err(|e| {
        SessionError::Transport(format!("failed to bind port {}: {e}", local.port()))
    })?;

    info!(%peer, port = local.port(), "dialing peer");
    let tcp = timeout(options.connect_timeout, socket.connect(peer))
        .await
        .map_err(|_| SessionError::timeout(Stage::Transport, "connecting to the peer"))?
        .map_err(|e| SessionError::Transport(format!("failed to connect to {peer}: {e}")))?;

    let stream = timeout(
        options.handshake_timeout,
        tls.connector().connect(ServerName::from(peer.ip()), tcp),
    )
    .await
    .map_err(|_| SessionError::timeout(Stage::Transport, "negotiating TLS"))?
    .map_err(|e| SessionError::Transport(format!("TLS connect failed: {e}")))?;

    Ok(PeerSession::new(TlsStream::Client(stream), peer))
}
