//! Client for the rendezvous service.
//!
//! Each peer dials the service once over TLS, announces its role and learns
//! its session id. The service sees the public address of that connection;
//! the local side of it is the port the peer link is later opened on (see
//! [`transport`](crate::transport)). The connection is closed as soon as the
//! reply is read and is never reused.

use std::net::SocketAddr;

use peershift_protocol::{Role, SessionId};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::lookup_host;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{SessionError, Stage};
use crate::tls::TlsContext;
use crate::transport::{reusable_socket, unspecified_like};
use crate::wire::{read_peer_address, read_session_id, write_announcement};
use crate::{RendezvousSettings, SessionOptions};

/// What a peer tells the rendezvous service about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announce {
    /// Waits for an uploader; receives a fresh id to share out of band.
    Downloader,
    /// Asks to be paired with the downloader holding `peer`.
    Uploader { peer: SessionId },
}

impl Announce {
    pub fn role(&self) -> Role {
        match self {
            Announce::Downloader => Role::Downloader,
            Announce::Uploader { .. } => Role::Uploader,
        }
    }
}

/// Result of a successful rendezvous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendezvous {
    pub session_id: SessionId,
    /// Local end of the rendezvous connection; its port is reused for the
    /// peer link.
    pub local_addr: SocketAddr,
    /// Public address of the downloader, relayed to uploaders only.
    pub peer_addr: Option<SocketAddr>,
}

impl Rendezvous {
    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }
}

/// Contacts the rendezvous service and returns the session coordinates.
///
/// Fails fast: an unreachable service, a refused TLS handshake, or a short
/// or malformed reply is a [`SessionError::Rendezvous`] (or a rendezvous
/// timeout). Nothing is retried.
pub async fn punch_hole(
    announce: &Announce,
    settings: &RendezvousSettings,
    tls: &TlsContext,
    options: &SessionOptions,
) -> Result<Rendezvous, SessionError> {
    let remote = lookup_host((settings.host.as_str(), settings.port))
        .await
        .map_err(|e| SessionError::Rendezvous(format!("cannot resolve {}: {e}", settings.host)))?
        .next()
        .ok_or_else(|| SessionError::Rendezvous(format!("{} has no address", settings.host)))?;

    // An ephemeral port, but bound reusable so the peer link can take it over.
    let socket = reusable_socket(SocketAddr::new(unspecified_like(&remote), 0))
        .map_err(SessionError::rendezvous)?;

    debug!(%remote, role = %announce.role(), "dialing rendezvous service");
    let tcp = timeout(options.connect_timeout, socket.connect(remote))
        .await
        .map_err(|_| SessionError::timeout(Stage::Rendezvous, "connecting to the rendezvous service"))?
        .map_err(|e| SessionError::Rendezvous(format!("cannot reach {remote}: {e}")))?;
    let local_addr = tcp.local_addr().map_err(SessionError::rendezvous)?;

    let server_name =
        ServerName::try_from(settings.host.clone()).map_err(SessionError::rendezvous)?;

    let (session_id, peer_addr) = timeout(options.handshake_timeout, async {
        let stream = tls
            .connector()
            .connect(server_name, tcp)
            .await
            .map_err(|e| SessionError::Rendezvous(format!("TLS with rendezvous failed: {e}")))?;
        exchange(stream, announce).await
    })
    .await
    .map_err(|_| SessionError::timeout(Stage::Rendezvous, "talking to the rendezvous service"))??;

    info!(session_id = %session_id, local_port = local_addr.port(), "rendezvous complete");
    Ok(Rendezvous {
        session_id,
        local_addr,
        peer_addr,
    })
}

/// Runs the announcement exchange over an established stream and closes it.
pub async fn exchange<S>(
    stream: S,
    announce: &Announce,
) -> Result<(SessionId, Option<SocketAddr>), SessionError>
where
    S: AsyncRead + AsyncWrite,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    let target = match announce {
        Announce::Downloader => None,
        Announce::Uploader { peer } => Some(peer),
    };
    write_announcement(&mut writer, announce.role().announcement(), target)
        .await
        .map_err(SessionError::rendezvous)?;

    let session_id = read_session_id(&mut reader).await?;
    let peer_addr = match announce {
        Announce::Downloader => None,
        Announce::Uploader { .. } => Some(read_peer_address(&mut reader).await?),
    };

    // The service may already have hung up; the reply is all that matters.
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "rendezvous connection closed uncleanly");
    }

    Ok((session_id, peer_addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockRendezvous, generate_identity};
    use tokio::io::{AsyncReadExt, duplex};

    #[tokio::test]
    async fn downloader_exchange_reads_only_the_id() {
        let (client, mut service) = duplex(256);
        let reply = tokio::spawn(async move {
            let mut role = [0u8; 1];
            service.read_exact(&mut role).await.unwrap();
            assert_eq!(role[0], 0x02);
            service.write_all(b"Zx9Kq2Lm").await.unwrap();
            service.shutdown().await.unwrap();
        });

        let (id, peer) = exchange(client, &Announce::Downloader).await.unwrap();
        reply.await.unwrap();
        assert_eq!(id.as_str(), "Zx9Kq2Lm");
        assert_eq!(peer, None);
    }

    #[tokio::test]
    async fn uploader_exchange_sends_target_and_reads_address() {
        let (client, mut service) = duplex(256);
        let reply = tokio::spawn(async move {
            let mut request = [0u8; 9];
            service.read_exact(&mut request).await.unwrap();
            assert_eq!(&request, b"\x01Zx9Kq2Lm");
            service
                .write_all(b"Up000001203.0.113.9:6000\n")
                .await
                .unwrap();
            service.shutdown().await.unwrap();
        });

        let announce = Announce::Uploader {
            peer: "Zx9Kq2Lm".parse().unwrap(),
        };
        let (id, peer) = exchange(client, &announce).await.unwrap();
        reply.await.unwrap();
        assert_eq!(id.as_str(), "Up000001");
        assert_eq!(peer, Some("203.0.113.9:6000".parse().unwrap()));
    }

    #[tokio::test]
    async fn short_id_is_a_rendezvous_error() {
        let (client, mut service) = duplex(256);
        tokio::spawn(async move {
            let mut role = [0u8; 1];
            let _ = service.read_exact(&mut role).await;
            let _ = service.write_all(b"abc").await;
            let _ = service.shutdown().await;
        });

        let err = exchange(client, &Announce::Downloader).await.unwrap_err();
        assert!(matches!(err, SessionError::Rendezvous(_)));
        assert_eq!(err.stage(), Stage::Rendezvous);
    }

    #[tokio::test]
    async fn punch_hole_over_tls_issues_id_and_port() {
        let identity = generate_identity();
        let tls = TlsContext::new(&identity, Vec::new()).unwrap();
        let service = MockRendezvous::start(&identity).await;

        let rv = punch_hole(
            &Announce::Downloader,
            &service.settings(),
            &tls,
            &SessionOptions::default(),
        )
        .await
        .unwrap();
        assert_ne!(rv.local_port(), 0);
        assert_eq!(rv.peer_addr, None);
        assert_eq!(
            service.registered(&rv.session_id).map(|addr| addr.port()),
            Some(rv.local_port())
        );
    }

    #[tokio::test]
    async fn punch_hole_with_unknown_peer_fails() {
        let identity = generate_identity();
        let tls = TlsContext::new(&identity, Vec::new()).unwrap();
        let service = MockRendezvous::start(&identity).await;

        let announce = Announce::Uploader {
            peer: "NOBODY00".parse().unwrap(),
        };
        let err = punch_hole(&announce, &service.settings(), &tls, &SessionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Rendezvous(_)));
    }

    #[tokio::test]
    async fn untrusted_service_is_refused() {
        let service = MockRendezvous::start(&generate_identity()).await;
        let tls = TlsContext::new(&generate_identity(), Vec::new()).unwrap();

        let err = punch_hole(
            &Announce::Downloader,
            &service.settings(),
            &tls,
            &SessionOptions::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.stage(), Stage::Rendezvous);
    }

    #[tokio::test]
    async fn unreachable_service_is_a_rendezvous_error() {
        let tls = TlsContext::new(&generate_identity(), Vec::new()).unwrap();
        // Bound but never listening, so connections are refused.
        let parked = reusable_socket("127.0.0.1:0".parse().unwrap()).unwrap();
        let settings = RendezvousSettings {
            host: "127.0.0.1".into(),
            port: parked.local_addr().unwrap().port(),
        };

        let err = punch_hole(
            &Announce::Downloader,
            &settings,
            &tls,
            &SessionOptions::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.stage(), Stage::Rendezvous);
    }
}
