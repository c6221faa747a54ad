//! Error types for decoding wire values.

/// Errors produced while decoding fixed-format protocol values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown protocol message: 0x{0:02x}")]
    UnknownMessage(u8),

    #[error("unexpected protocol message: {0:?}")]
    UnexpectedMessage(crate::ProtocolMessage),

    #[error("session id must be {expected} bytes, got {actual}")]
    SessionIdLength { expected: usize, actual: usize },

    #[error("session id contains non-printable bytes")]
    SessionIdEncoding,

    #[error("compatibility token must be {expected} bytes, got {actual}")]
    TokenLength { expected: usize, actual: usize },
}

/// Errors produced by the file metadata codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("expected {expected} metadata lines, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("metadata is not valid UTF-8")]
    Encoding,

    #[error("file name is empty")]
    EmptyName,

    #[error("file name contains a line terminator")]
    InvalidName,

    #[error("file name {0:?} has no usable final component")]
    NoFileName(String),

    #[error("invalid file size: {0:?}")]
    InvalidSize(String),

    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),

    #[error("metadata record exceeds {0} bytes")]
    TooLong(usize),

    #[error("connection closed after {lines} of {expected} metadata lines")]
    Truncated { lines: usize, expected: usize },
}
