//! Compatibility exchange run before any file data crosses the wire.
//!
//! Both sides send their token, read the peer's token, then exchange a
//! one-byte verdict. The exchange is symmetric and reads exactly
//! `CompatToken::LEN + 1` bytes, so nothing that follows is consumed.

use peershift_protocol::{CompatToken, ProtocolMessage};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::wire::{read_compat_token, read_message, write_compat_token, write_message};

/// Runs the compatibility exchange with this build's token.
pub async fn check_compatibility<R, W>(reader: &mut R, writer: &mut W) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    exchange_tokens(reader, writer, CompatToken::current()).await
}

/// Runs the compatibility exchange asserting `ours`.
pub async fn exchange_tokens<R, W>(
    reader: &mut R,
    writer: &mut W,
    ours: CompatToken,
) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_compat_token(writer, ours)
        .await
        .map_err(|e| SessionError::Incompatible(format!("failed to send token: {e}")))?;
    let theirs = read_compat_token(reader)
        .await
        .map_err(|e| SessionError::Incompatible(format!("failed to read peer token: {e}")))?;

    let compatible = ours.is_compatible_with(&theirs);
    let verdict = if compatible {
        ProtocolMessage::Compatible
    } else {
        ProtocolMessage::Incompatible
    };
    write_message(writer, verdict)
        .await
        .map_err(|e| SessionError::Incompatible(format!("failed to send verdict: {e}")))?;

    if !compatible {
        warn!(%ours, %theirs, "peer speaks an incompatible protocol");
        return Err(SessionError::Incompatible(format!(
            "local {ours}, peer {theirs}"
        )));
    }

    let peer_verdict = read_message(reader)
        .await
        .map_err(|e| SessionError::Incompatible(format!("failed to read peer verdict: {e}")))?
        .map_err(|e| SessionError::Incompatible(e.to_string()))?;

    match peer_verdict {
        ProtocolMessage::Compatible => {
            debug!(token = %ours, "compatibility confirmed");
            Ok(())
        }
        ProtocolMessage::Incompatible => Err(SessionError::Incompatible(format!(
            "peer rejected {ours}"
        ))),
        other => Err(SessionError::Incompatible(format!(
            "unexpected verdict {other:?}"
        ))),
    }
}
