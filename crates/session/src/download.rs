//! Receiving side of a session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use peershift_protocol::{FileInfo, Role};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{SessionError, Stage};
use crate::events::{EventSender, SessionEvent, emit};
use crate::handshake::check_compatibility;
use crate::pipeline::{FileSink, TransferProgress, run_pipeline};
use crate::rendezvous::{Announce, punch_hole};
use crate::session::PeerSession;
use crate::tls::TlsContext;
use crate::transport::establish;
use crate::verify::{Verdict, verify_and_report};
use crate::wire::read_file_info;
use crate::{RendezvousSettings, SessionOptions};

/// A file received and verified.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    /// Where the content was written.
    pub path: PathBuf,
    pub info: FileInfo,
    pub chunks: u64,
}

/// Runs a complete download: rendezvous, accept the uploader, receive and
/// verify one file.
///
/// `destination` may name the output file or an existing directory; when it
/// is absent the declared name is used in the working directory.
pub async fn download(
    settings: &RendezvousSettings,
    tls: &TlsContext,
    destination: Option<&Path>,
    options: &SessionOptions,
    events: &EventSender,
) -> Result<DownloadOutcome, SessionError> {
    let rendezvous = punch_hole(&Announce::Downloader, settings, tls, options).await?;
    emit(events, SessionEvent::SessionId(rendezvous.session_id.clone()));

    let session = establish(Role::Downloader, &rendezvous, tls, options, events).await?;
    receive_file(session, destination, options, events).await
}

/// Receives one file over an established session and closes it.
///
/// The verdict is sent to the peer whether or not the checksum matches.
pub async fn receive_file<S>(
    session: PeerSession<S>,
    destination: Option<&Path>,
    options: &SessionOptions,
    events: &EventSender,
) -> Result<DownloadOutcome, SessionError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer, peer) = session.into_parts();

    timeout(
        options.handshake_timeout,
        check_compatibility(&mut reader, &mut writer),
    )
    .await
    .map_err(|_| SessionError::timeout(Stage::Handshake, "exchanging compatibility tokens"))??;
    info!(%peer, "peer connected");
    emit(events, SessionEvent::Connected { peer });

    let info = read_file_info(&mut reader).await?;
    let path = destination_path(destination, &info).await?;
    info!(
        name = info.name(),
        size = info.size(),
        path = %path.display(),
        "receiving file"
    );

    let file = File::create(&path).await?;
    let progress = Arc::new(TransferProgress::new(info.size()));
    emit(
        events,
        SessionEvent::Transferring {
            info: info.clone(),
            progress: Arc::clone(&progress),
        },
    );

    let mut sink = FileSink::new(file);
    let (reader, report) =
        run_pipeline(reader, &mut sink, info.size(), options.chunk_size, &progress).await?;
    sink.finish().await?;
    info!(bytes = report.bytes, chunks = report.chunks, "content received");

    emit(events, SessionEvent::Verifying);
    let verified = verify_and_report(&mut writer, &path, info.checksum()).await;
    let session = PeerSession::from_parts(reader, writer, peer);

    match verified {
        Ok(verdict) => {
            emit(events, SessionEvent::Finished(verdict));
            // The peer may hang up as soon as it has the verdict.
            if let Err(err) = session.close().await {
                debug!(error = %err, "peer session closed uncleanly");
            }
            Ok(DownloadOutcome {
                path,
                info,
                chunks: report.chunks,
            })
        }
        Err(err) => {
            if matches!(err, SessionError::ChecksumMismatch { .. }) {
                emit(events, SessionEvent::Finished(Verdict::Mismatch));
            }
            // The verdict is already flushed; a failed close changes nothing.
            let _ = session.close().await;
            Err(err)
        }
    }
}

/// Resolves where the received content goes.
///
/// Only the final component of the declared name is ever used, so the peer
/// cannot place the file outside the chosen directory.
async fn destination_path(
    destination: Option<&Path>,
    info: &FileInfo,
) -> Result<PathBuf, SessionError> {
    let Some(dest) = destination.filter(|dest| !dest.as_os_str().is_empty()) else {
        return Ok(PathBuf::from(info.local_name()?));
    };
    let is_dir = tokio::fs::metadata(dest)
        .await
        .is_ok_and(|metadata| metadata.is_dir());
    if is_dir {
        Ok(dest.join(info.local_name()?))
    } else {
        Ok(dest.to_path_buf())
    }
}
