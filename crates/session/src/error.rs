//! Error types for a peer session.

use peershift_protocol::{Checksum, MetadataError};

/// Session stage an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Rendezvous,
    Transport,
    Handshake,
    Metadata,
    Transfer,
    Integrity,
    /// Local file system or caller input, outside the wire protocol.
    Local,
}

/// Errors produced while running a session. Every variant is fatal.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("rendezvous failed: {0}")]
    Rendezvous(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("timed out while {during}")]
    Timeout { stage: Stage, during: &'static str },

    #[error("incompatible peer: {0}")]
    Incompatible(String),

    #[error("malformed file info: {0}")]
    Metadata(#[from] MetadataError),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: Checksum, actual: Checksum },

    #[error("peer reported a checksum mismatch")]
    PeerChecksumMismatch,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Returns the stage that failed, so callers can report it precisely.
    pub fn stage(&self) -> Stage {
        match self {
            SessionError::Rendezvous(_) => Stage::Rendezvous,
            SessionError::Transport(_) | SessionError::Tls(_) => Stage::Transport,
            SessionError::Timeout { stage, .. } => *stage,
            SessionError::Incompatible(_) => Stage::Handshake,
            SessionError::Metadata(_) => Stage::Metadata,
            SessionError::Transfer(_) => Stage::Transfer,
            SessionError::ChecksumMismatch { .. } | SessionError::PeerChecksumMismatch => {
                Stage::Integrity
            }
            SessionError::InvalidArgument(_) | SessionError::Io(_) => Stage::Local,
        }
    }

    pub(crate) fn rendezvous(err: impl std::fmt::Display) -> Self {
        SessionError::Rendezvous(err.to_string())
    }

    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        SessionError::Transport(err.to_string())
    }

    pub(crate) fn timeout(stage: Stage, during: &'static str) -> Self {
        SessionError::Timeout { stage, during }
    }

    pub(crate) fn transfer(err: impl std::fmt::Display) -> Self {
        SessionError::Transfer(err.to_string())
    }
}
