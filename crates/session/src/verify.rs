//! End-to-end integrity check over the fully written file.

use std::path::Path;

use peershift_protocol::{Checksum, ProtocolMessage};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{info, warn};

use crate::TCP_BUFFER_SIZE;
use crate::error::SessionError;
use crate::wire::{read_message, write_message};

/// Outcome of comparing the written file against the declared checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Match,
    Mismatch,
}

impl Verdict {
    /// Terminal message that reports this verdict to the peer.
    pub fn message(self) -> ProtocolMessage {
        match self {
            Verdict::Match => ProtocolMessage::ChecksumMatch,
            Verdict::Mismatch => ProtocolMessage::ChecksumMismatch,
        }
    }
}

/// Computes the SHA-256 of a file by streaming it from the start.
pub async fn file_checksum(path: &Path) -> std::io::Result<Checksum> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; TCP_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(Checksum::from_hasher(hasher))
}

/// Re-reads `path` and compares its digest with `expected`.
///
/// Returns the verdict together with the digest actually computed.
pub async fn verify(path: &Path, expected: &Checksum) -> std::io::Result<(Verdict, Checksum)> {
    let actual = file_checksum(path).await?;
    let verdict = if actual == *expected {
        Verdict::Match
    } else {
        Verdict::Mismatch
    };
    Ok((verdict, actual))
}

/// Verifies the written file and always reports the verdict to the peer.
///
/// A mismatch is returned as [`SessionError::ChecksumMismatch`] once the peer
/// has been told. If the file cannot be re-read, the peer still gets
/// `ChecksumMismatch` before the local error is returned.
pub async fn verify_and_report<W>(
    writer: &mut W,
    path: &Path,
    expected: &Checksum,
) -> Result<Verdict, SessionError>
where
    W: AsyncWrite + Unpin,
{
    let checked = verify(path, expected).await;
    let verdict = match &checked {
        Ok((verdict, _)) => *verdict,
        Err(_) => Verdict::Mismatch,
    };

    write_message(writer, verdict.message())
        .await
        .map_err(SessionError::transfer)?;

    let (verdict, actual) = checked?;
    match verdict {
        Verdict::Match => {
            info!(checksum = %actual, "checksum verified");
            Ok(verdict)
        }
        Verdict::Mismatch => {
            warn!(expected = %expected, actual = %actual, "checksum mismatch");
            Err(SessionError::ChecksumMismatch {
                expected: *expected,
                actual,
            })
        }
    }
}

/// Waits for the receiver's terminal message.
pub async fn read_verdict<R>(reader: &mut R) -> Result<Verdict, SessionError>
where
    R: AsyncRead + Unpin,
{
    let message = read_message(reader)
        .await
        .map_err(|e| SessionError::Transfer(format!("no verdict from peer: {e}")))?
        .map_err(SessionError::transfer)?;

    match message {
        ProtocolMessage::ChecksumMatch => Ok(Verdict::Match),
        ProtocolMessage::ChecksumMismatch => Ok(Verdict::Mismatch),
        other => Err(SessionError::Transfer(format!(
            "expected a checksum verdict, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checksum_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, vec![7u8; 600 * 1024]).unwrap();

        let first = file_checksum(&path).await.unwrap();
        let second = file_checksum(&path).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Checksum::of(&vec![7u8; 600 * 1024]));
    }

    #[tokio::test]
    async fn matching_file_reports_checksum_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.txt");
        std::fs::write(&path, b"payload").unwrap();

        let mut sent = Vec::new();
        let verdict = verify_and_report(&mut sent, &path, &Checksum::of(b"payload"))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Match);
        assert_eq!(sent, vec![ProtocolMessage::ChecksumMatch.to_byte()]);
    }

    #[tokio::test]
    async fn corrupted_byte_reports_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        let original = b"payload".to_vec();
        let mut corrupted = original.clone();
        corrupted[3] ^= 0xff;
        std::fs::write(&path, &corrupted).unwrap();

        let mut sent = Vec::new();
        let err = verify_and_report(&mut sent, &path, &Checksum::of(&original))
            .await
            .unwrap_err();
        match err {
            SessionError::ChecksumMismatch { expected, actual } => {
                assert_eq!(expected, Checksum::of(&original));
                assert_eq!(actual, Checksum::of(&corrupted));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sent, vec![ProtocolMessage::ChecksumMismatch.to_byte()]);
    }

    #[tokio::test]
    async fn unreadable_file_still_signals_peer() {
        let dir = tempfile::tempdir().unwrap();
        let mut sent = Vec::new();
        let err = verify_and_report(&mut sent, &dir.path().join("gone"), &Checksum::of(b""))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Io(_)));
        assert_eq!(sent, vec![ProtocolMessage::ChecksumMismatch.to_byte()]);
    }

    #[tokio::test]
    async fn read_verdict_maps_terminal_messages() {
        let mut cursor: &[u8] = &[0x20];
        assert_eq!(read_verdict(&mut cursor).await.unwrap(), Verdict::Match);
        let mut cursor: &[u8] = &[0x21];
        assert_eq!(read_verdict(&mut cursor).await.unwrap(), Verdict::Mismatch);

        let mut cursor: &[u8] = &[ProtocolMessage::Compatible.to_byte()];
        assert!(matches!(
            read_verdict(&mut cursor).await,
            Err(SessionError::Transfer(_))
        ));
        let mut cursor: &[u8] = &[];
        assert!(matches!(
            read_verdict(&mut cursor).await,
            Err(SessionError::Transfer(_))
        ));
    }
}
