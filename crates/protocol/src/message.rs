//! One-byte control messages.

use crate::ProtocolError;

/// Which side of a session a peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sends the file; dials the peer.
    Uploader,
    /// Receives the file; listens for the peer.
    Downloader,
}

impl Role {
    /// The message announcing this role to the rendezvous service.
    pub fn announcement(self) -> ProtocolMessage {
        match self {
            Role::Uploader => ProtocolMessage::UploaderRole,
            Role::Downloader => ProtocolMessage::DownloaderRole,
        }
    }

    /// Returns `true` if this role accepts the peer connection.
    pub fn listens(self) -> bool {
        matches!(self, Role::Downloader)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Uploader => f.write_str("uploader"),
            Role::Downloader => f.write_str("downloader"),
        }
    }
}

/// Closed set of control signals exchanged as single bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolMessage {
    UploaderRole = 0x01,
    DownloaderRole = 0x02,
    Compatible = 0x10,
    Incompatible = 0x11,
    ChecksumMatch = 0x20,
    ChecksumMismatch = 0x21,
}

impl ProtocolMessage {
    /// Wire encoding of this message.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Returns the announced role, if this is a role announcement.
    pub fn role(self) -> Option<Role> {
        match self {
            ProtocolMessage::UploaderRole => Some(Role::Uploader),
            ProtocolMessage::DownloaderRole => Some(Role::Downloader),
            _ => None,
        }
    }
}

impl TryFrom<u8> for ProtocolMessage {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(ProtocolMessage::UploaderRole),
            0x02 => Ok(ProtocolMessage::DownloaderRole),
            0x10 => Ok(ProtocolMessage::Compatible),
            0x11 => Ok(ProtocolMessage::Incompatible),
            0x20 => Ok(ProtocolMessage::ChecksumMatch),
            0x21 => Ok(ProtocolMessage::ChecksumMismatch),
            other => Err(ProtocolError::UnknownMessage(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ProtocolMessage; 6] = [
        ProtocolMessage::UploaderRole,
        ProtocolMessage::DownloaderRole,
        ProtocolMessage::Compatible,
        ProtocolMessage::Incompatible,
        ProtocolMessage::ChecksumMatch,
        ProtocolMessage::ChecksumMismatch,
    ];

    #[test]
    fn every_message_decodes_from_its_byte() {
        for msg in ALL {
            assert_eq!(ProtocolMessage::try_from(msg.to_byte()).unwrap(), msg);
        }
    }

    #[test]
    fn encodings_are_distinct() {
        let mut bytes: Vec<u8> = ALL.iter().map(|m| m.to_byte()).collect();
        bytes.sort_unstable();
        bytes.dedup();
        assert_eq!(bytes.len(), ALL.len());
    }

    #[test]
    fn unknown_byte_is_an_error() {
        assert_eq!(
            ProtocolMessage::try_from(0x00),
            Err(ProtocolError::UnknownMessage(0x00))
        );
        assert!(ProtocolMessage::try_from(0xff).is_err());
    }

    #[test]
    fn role_announcements() {
        assert_eq!(Role::Uploader.announcement(), ProtocolMessage::UploaderRole);
        assert_eq!(
            ProtocolMessage::DownloaderRole.role(),
            Some(Role::Downloader)
        );
        assert_eq!(ProtocolMessage::ChecksumMatch.role(), None);
    }

    #[test]
    fn only_downloader_listens() {
        assert!(Role::Downloader.listens());
        assert!(!Role::Uploader.listens());
    }
}
