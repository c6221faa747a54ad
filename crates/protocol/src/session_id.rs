use crate::{ProtocolError, UID_LENGTH};

/// Identifier minted by the rendezvous service for one hole-punch attempt.
///
/// Used for display and for telling the rendezvous service which peer an
/// uploader wants to reach. It is not a secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Validates a raw identifier received from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != UID_LENGTH {
            return Err(ProtocolError::SessionIdLength {
                expected: UID_LENGTH,
                actual: bytes.len(),
            });
        }
        if !bytes.iter().all(u8::is_ascii_graphic) {
            return Err(ProtocolError::SessionIdEncoding);
        }
        // All bytes are ASCII, so this cannot fail.
        let id = String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::SessionIdEncoding)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::str::FromStr for SessionId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
