//! Compatibility token exchanged before any file data.

use crate::{PROTOCOL_MAGIC, PROTOCOL_VERSION, ProtocolError};

/// Protocol identity asserted by each peer at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompatToken {
    pub magic: [u8; 4],
    pub version: u16,
}

impl CompatToken {
    /// Encoded length on the wire.
    pub const LEN: usize = 6;

    /// The token this build speaks.
    pub const fn current() -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
        }
    }

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let v = self.version.to_be_bytes();
        let m = self.magic;
        [m[0], m[1], m[2], m[3], v[0], v[1]]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != Self::LEN {
            return Err(ProtocolError::TokenLength {
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            magic: [bytes[0], bytes[1], bytes[2], bytes[3]],
            version: u16::from_be_bytes([bytes[4], bytes[5]]),
        })
    }

    /// Two peers interoperate only if magic and version are identical.
    pub fn is_compatible_with(&self, other: &CompatToken) -> bool {
        self == other
    }
}

impl std::fmt::Display for CompatToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/v{}",
            String::from_utf8_lossy(&self.magic),
            self.version
        )
    }
}
