//! Sending side of a session.

use std::path::Path;
use std::sync::Arc;

use peershift_protocol::{FileInfo, Role, SessionId};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{SessionError, Stage};
use crate::events::{EventSender, SessionEvent, emit};
use crate::handshake::check_compatibility;
use crate::pipeline::{StreamSink, TransferProgress, run_pipeline};
use crate::rendezvous::{Announce, punch_hole};
use crate::session::PeerSession;
use crate::tls::TlsContext;
use crate::transport::establish;
use crate::verify::{Verdict, file_checksum, read_verdict};
use crate::wire::write_file_info;
use crate::{RendezvousSettings, SessionOptions};

/// A file delivered and confirmed by the peer.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub info: FileInfo,
    pub chunks: u64,
}

/// Runs a complete upload of `path` to the downloader holding `peer`.
///
/// The file is hashed before the rendezvous so the peer is never kept
/// waiting on a large local read.
pub async fn upload(
    settings: &RendezvousSettings,
    tls: &TlsContext,
    peer: &SessionId,
    path: &Path,
    options: &SessionOptions,
    events: &EventSender,
) -> Result<UploadOutcome, SessionError> {
    let info = file_info_for(path).await?;
    info!(name = info.name(), size = info.size(), checksum = %info.checksum(), "file prepared");

    let announce = Announce::Uploader { peer: peer.clone() };
    let rendezvous = punch_hole(&announce, settings, tls, options).await?;
    emit(events, SessionEvent::SessionId(rendezvous.session_id.clone()));

    let session = establish(Role::Uploader, &rendezvous, tls, options, events).await?;
    let source = File::open(path).await?;
    send_file(session, source, &info, options, events).await
}

/// Describes a local file: its name, size and checksum.
pub async fn file_info_for(path: &Path) -> Result<FileInfo, SessionError> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(SessionError::InvalidArgument(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            SessionError::InvalidArgument(format!("{} has no usable file name", path.display()))
        })?;
    let checksum = file_checksum(path).await?;

    FileInfo::new(name, metadata.len(), checksum)
        .map_err(|e| SessionError::InvalidArgument(e.to_string()))
}

/// Sends `source` as described by `info` over an established session, then
/// waits for the peer's verdict.
pub async fn send_file<S>(
    session: PeerSession<S>,
    source: File,
    info: &FileInfo,
    options: &SessionOptions,
    events: &EventSender,
) -> Result<UploadOutcome, SessionError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer, peer) = session.into_parts();

    // Nothing file-specific goes out until both sides agree.
    timeout(
        options.handshake_timeout,
        check_compatibility(&mut reader, &mut writer),
    )
    .await
    .map_err(|_| SessionError::timeout(Stage::Handshake, "exchanging compatibility tokens"))??;
    info!(%peer, "peer connected");
    emit(events, SessionEvent::Connected { peer });

    write_file_info(&mut writer, info)
        .await
        .map_err(SessionError::transfer)?;

    let progress = Arc::new(TransferProgress::new(info.size()));
    emit(
        events,
        SessionEvent::Transferring {
            info: info.clone(),
            progress: Arc::clone(&progress),
        },
    );

    let mut sink = StreamSink::new(&mut writer);
    let (mut source, report) =
        run_pipeline(source, &mut sink, info.size(), options.chunk_size, &progress).await?;

    let mut extra = [0u8; 1];
    if source.read(&mut extra).await? != 0 {
        return Err(SessionError::Transfer(format!(
            "{} grew past its declared {} bytes",
            info.name(),
            info.size()
        )));
    }
    writer.flush().await.map_err(SessionError::transfer)?;
    info!(bytes = report.bytes, chunks = report.chunks, "content sent");

    emit(events, SessionEvent::Verifying);
    let verdict = read_verdict(&mut reader).await?;
    emit(events, SessionEvent::Finished(verdict));
    let session = PeerSession::from_parts(reader, writer, peer);

    match verdict {
        Verdict::Match => {
            // The transfer is settled; a peer that already left is fine.
            if let Err(err) = session.close().await {
                debug!(error = %err, "peer session closed uncleanly");
            }
            Ok(UploadOutcome {
                info: info.clone(),
                chunks: report.chunks,
            })
        }
        Verdict::Mismatch => {
            warn!(name = info.name(), "peer reported a checksum mismatch");
            let _ = session.close().await;
            Err(SessionError::PeerChecksumMismatch)
        }
    }
}
