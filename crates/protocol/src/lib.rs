//! Wire types shared by both peers and the rendezvous service.
//!
//! Everything here is synchronous and allocation-light; the async framing
//! lives in `peershift-session`.
//!
//! # Session wire format
//!
//! ```text
//! COMPATIBILITY (both ways):  [4 bytes: "PSFT"][2 bytes BE: version]
//! VERDICT (both ways):        [1 byte: 0x10=compatible, 0x11=incompatible]
//!
//! METADATA (sender -> receiver):
//!   name\n
//!   size as decimal ASCII\n
//!   SHA-256 as lowercase hex\n
//!
//! CONTENT (sender -> receiver): [size bytes, chunked by the sender]
//! TERMINAL (receiver -> sender): [1 byte: 0x20=match, 0x21=mismatch]
//! ```

pub mod checksum;
pub mod compat;
pub mod error;
pub mod file_info;
pub mod message;
pub mod session_id;

pub use checksum::Checksum;
pub use compat::CompatToken;
pub use error::{MetadataError, ProtocolError};
pub use file_info::FileInfo;
pub use message::{ProtocolMessage, Role};
pub use session_id::SessionId;

/// Length of a session identifier minted by the rendezvous service.
pub const UID_LENGTH: usize = 8;

/// Default upper bound for a single content chunk (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Version advertised in the compatibility token.
pub const PROTOCOL_VERSION: u16 = 1;

/// Magic prefix of the compatibility token.
pub const PROTOCOL_MAGIC: [u8; 4] = *b"PSFT";

/// Number of newline-terminated lines in a metadata record.
pub const METADATA_LINES: usize = 3;

/// Upper bound on the encoded size of a metadata record.
pub const MAX_METADATA_LEN: usize = 4096;

/// Upper bound on the relayed peer address line from the rendezvous service.
pub const MAX_ADDRESS_LINE_LEN: usize = 256;
