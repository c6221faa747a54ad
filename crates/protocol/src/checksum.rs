use sha2::{Digest, Sha256};

use crate::MetadataError;

/// SHA-256 digest of a complete file.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; Checksum::LEN]);

impl Checksum {
    /// Digest length in bytes.
    pub const LEN: usize = 32;

    pub const fn from_digest(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Computes the digest of an in-memory buffer.
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Finishes an incremental hasher fed by a streaming reader.
    pub fn from_hasher(hasher: Sha256) -> Self {
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses the hex form used in metadata records.
    pub fn from_hex(text: &str) -> Result<Self, MetadataError> {
        let bytes = hex::decode(text).map_err(|e| MetadataError::InvalidChecksum(e.to_string()))?;
        let digest: [u8; Self::LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            MetadataError::InvalidChecksum(format!(
                "expected {} bytes, got {}",
                Self::LEN,
                b.len()
            ))
        })?;
        Ok(Self(digest))
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(Checksum::of(b"hello world"), Checksum::of(b"hello world"));
        assert_ne!(Checksum::of(b"hello"), Checksum::of(b"world"));
    }

    #[test]
    fn known_empty_digest() {
        assert_eq!(
            Checksum::of(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut hasher = Sha256::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(Checksum::from_hasher(hasher), Checksum::of(b"hello world"));
    }

    #[test]
    fn hex_parse_accepts_own_output() {
        let sum = Checksum::of(b"data");
        assert_eq!(sum.to_hex().len(), 64);
        assert_eq!(Checksum::from_hex(&sum.to_hex()).unwrap(), sum);
    }

    #[test]
    fn hex_parse_rejects_wrong_length_and_garbage() {
        assert!(matches!(
            Checksum::from_hex("abcd"),
            Err(MetadataError::InvalidChecksum(_))
        ));
        assert!(Checksum::from_hex(&"zz".repeat(32)).is_err());
    }
}
