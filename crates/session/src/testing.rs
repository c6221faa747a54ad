//! Test fixtures: throwaway identities, an in-process rendezvous service and
//! a stream whose peer vanishes at shutdown.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use peershift_protocol::{ProtocolMessage, SessionId, UID_LENGTH};
use rustls::pki_types::PrivateKeyDer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::RendezvousSettings;
use crate::tls::{TlsContext, TlsIdentity};

/// Generates a fresh self-signed identity.
pub(crate) fn generate_identity() -> TlsIdentity {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["peershift".to_string()]).unwrap();
    TlsIdentity::new(
        vec![cert.der().clone()],
        PrivateKeyDer::Pkcs8(key_pair.serialize_der().into()),
    )
    .unwrap()
}

type Registry = Arc<Mutex<HashMap<String, SocketAddr>>>;

/// Loopback rendezvous service speaking the real wire protocol.
///
/// Downloaders are registered under a fresh id with the address their
/// connection came from; uploaders naming an unknown id get the connection
/// closed without a reply.
pub(crate) struct MockRendezvous {
    addr: SocketAddr,
    registry: Registry,
    task: JoinHandle<()>,
}

impl MockRendezvous {
    pub(crate) async fn start(identity: &TlsIdentity) -> Self {
        let acceptor = TlsContext::new(identity, Vec::new()).unwrap().acceptor();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Registry::default();
        let ids = Arc::new(AtomicU32::new(1));

        let task = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                while let Ok((tcp, remote)) = listener.accept().await {
                    let acceptor = acceptor.clone();
                    let registry = Arc::clone(&registry);
                    let ids = Arc::clone(&ids);
                    tokio::spawn(async move {
                        let _ = serve(acceptor, tcp, remote, registry, ids).await;
                    });
                }
            })
        };

        Self {
            addr,
            registry,
            task,
        }
    }

    pub(crate) fn settings(&self) -> RendezvousSettings {
        RendezvousSettings {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
        }
    }

    /// Address recorded for a registered downloader.
    pub(crate) fn registered(&self, id: &SessionId) -> Option<SocketAddr> {
        self.registry.lock().unwrap().get(id.as_str()).copied()
    }
}

impl Drop for MockRendezvous {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    acceptor: TlsAcceptor,
    tcp: TcpStream,
    remote: SocketAddr,
    registry: Registry,
    ids: Arc<AtomicU32>,
) -> std::io::Result<()> {
    let stream = acceptor.accept(tcp).await?;
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    let role = reader.read_u8().await?;
    let next_id = |prefix: char| format!("{prefix}{:07}", ids.fetch_add(1, Ordering::Relaxed));

    match ProtocolMessage::try_from(role) {
        Ok(ProtocolMessage::DownloaderRole) => {
            let id = next_id('D');
            registry.lock().unwrap().insert(id.clone(), remote);
            writer.write_all(id.as_bytes()).await?;
        }
        Ok(ProtocolMessage::UploaderRole) => {
            let mut target = [0u8; UID_LENGTH];
            reader.read_exact(&mut target).await?;
            let target = String::from_utf8_lossy(&target).into_owned();
            let found = registry.lock().unwrap().get(&target).copied();
            if let Some(peer) = found {
                writer.write_all(next_id('U').as_bytes()).await?;
                writer.write_all(format!("{peer}\n").as_bytes()).await?;
            }
        }
        _ => {}
    }

    writer.flush().await?;
    writer.shutdown().await
}

/// Stream whose shutdown fails as if the peer had already torn the
/// connection down. Reads and writes pass through.
pub(crate) struct HangupOnShutdown<S>(pub(crate) S);

impl<S: AsyncRead + Unpin> AsyncRead for HangupOnShutdown<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for HangupOnShutdown<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
    }
}
