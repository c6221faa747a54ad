//! Framing primitives shared by the rendezvous and peer protocols.
//!
//! # Wire format
//!
//! ```text
//! RENDEZVOUS (peer -> service):
//!   downloader: [1 byte: 0x02]
//!   uploader:   [1 byte: 0x01][UID_LENGTH bytes: downloader's id]
//! RENDEZVOUS (service -> peer):
//!   [UID_LENGTH bytes: session id]
//!   uploader only: [host:port\n]
//!
//! PEER SESSION: see `peershift_protocol`.
//! ```

use std::net::SocketAddr;

use peershift_protocol::{
    CompatToken, FileInfo, MAX_ADDRESS_LINE_LEN, MAX_METADATA_LEN, METADATA_LINES,
    MetadataError, ProtocolError, ProtocolMessage, SessionId, UID_LENGTH,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SessionError;

/// Writes a single control message and flushes it.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: ProtocolMessage,
) -> std::io::Result<()> {
    writer.write_u8(message.to_byte()).await?;
    writer.flush().await
}

/// Reads a single control message. Unknown bytes are an error.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Result<ProtocolMessage, ProtocolError>, std::io::Error> {
    let byte = reader.read_u8().await?;
    Ok(ProtocolMessage::try_from(byte))
}

/// Writes this build's compatibility token and flushes it.
pub async fn write_compat_token<W: AsyncWrite + Unpin>(
    writer: &mut W,
    token: CompatToken,
) -> std::io::Result<()> {
    writer.write_all(&token.to_bytes()).await?;
    writer.flush().await
}

/// Reads exactly one compatibility token and nothing more.
pub async fn read_compat_token<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<CompatToken> {
    let mut buf = [0u8; CompatToken::LEN];
    reader.read_exact(&mut buf).await?;
    CompatToken::from_bytes(&buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Writes the metadata record. The caller flushes.
pub async fn write_file_info<W: AsyncWrite + Unpin>(
    writer: &mut W,
    info: &FileInfo,
) -> std::io::Result<()> {
    writer.write_all(&info.encode()).await
}

/// Reads exactly [`METADATA_LINES`] lines and decodes them.
///
/// Stops at the last line terminator, so whatever follows stays buffered for
/// the content reader.
pub async fn read_file_info<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<FileInfo, SessionError> {
    let mut buf = Vec::new();
    let mut limited = reader.take(MAX_METADATA_LEN as u64);

    for line in 0..METADATA_LINES {
        let n = limited
            .read_until(b'\n', &mut buf)
            .await
            .map_err(SessionError::transfer)?;
        if n == 0 || buf.last() != Some(&b'\n') {
            if buf.len() >= MAX_METADATA_LEN {
                return Err(MetadataError::TooLong(MAX_METADATA_LEN).into());
            }
            return Err(MetadataError::Truncated {
                lines: line,
                expected: METADATA_LINES,
            }
            .into());
        }
    }

    Ok(FileInfo::decode(&buf)?)
}

/// Writes a rendezvous announcement and flushes it.
pub async fn write_announcement<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: ProtocolMessage,
    target: Option<&SessionId>,
) -> std::io::Result<()> {
    writer.write_u8(message.to_byte()).await?;
    if let Some(id) = target {
        writer.write_all(id.as_bytes()).await?;
    }
    writer.flush().await
}

/// Reads the fixed-length session id issued by the rendezvous service.
pub async fn read_session_id<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<SessionId, SessionError> {
    let mut buf = [0u8; UID_LENGTH];
    let mut filled = 0;
    while filled < UID_LENGTH {
        let n = reader
            .read(&mut buf[filled..])
            .await
            .map_err(SessionError::rendezvous)?;
        if n == 0 {
            return Err(SessionError::Rendezvous(format!(
                "service closed the connection after {filled} of {UID_LENGTH} id bytes"
            )));
        }
        filled += n;
    }
    SessionId::from_bytes(&buf).map_err(SessionError::rendezvous)
}

/// Reads the newline-terminated peer address relayed to an uploader.
pub async fn read_peer_address<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<SocketAddr, SessionError> {
    let mut line = Vec::new();
    reader
        .take(MAX_ADDRESS_LINE_LEN as u64)
        .read_until(b'\n', &mut line)
        .await
        .map_err(SessionError::rendezvous)?;
    if line.pop() != Some(b'\n') {
        return Err(SessionError::Rendezvous(
            "peer address line is missing or unterminated".into(),
        ));
    }
    let text = std::str::from_utf8(&line).map_err(SessionError::rendezvous)?;
    text.trim_end_matches('\r')
        .parse()
        .map_err(|e| SessionError::Rendezvous(format!("invalid peer address {text:?}: {e}")))
}
