//! File metadata record sent ahead of the content.
//!
//! The record is exactly [`METADATA_LINES`] newline-terminated lines so the
//! receiver can stop reading at the last terminator without touching the
//! first content byte.

use crate::{Checksum, METADATA_LINES, MAX_METADATA_LEN, MetadataError};

/// Describes the single file carried by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    name: String,
    size: u64,
    checksum: Checksum,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, size: u64, checksum: Checksum) -> Result<Self, MetadataError> {
        let name = name.into();
        validate_name(&name)?;
        check_encoded_len(&name, size)?;
        Ok(Self {
            name,
            size,
            checksum,
        })
    }

    /// Declared file name, as chosen by the sender.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Final path component of the declared name, safe to create locally.
    ///
    /// Both `/` and `\` count as separators regardless of platform, so a
    /// sender cannot steer the file outside the receiver's destination.
    pub fn local_name(&self) -> Result<&str, MetadataError> {
        let last = self.name.rsplit(['/', '\\']).next().unwrap_or_default();
        match last {
            "" | "." | ".." => Err(MetadataError::NoFileName(self.name.clone())),
            name => Ok(name),
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    /// Serializes the record: name, decimal size, hex checksum.
    pub fn encode(&self) -> Vec<u8> {
        format!("{}\n{}\n{}\n", self.name, self.size, self.checksum.to_hex()).into_bytes()
    }

    /// Parses a record previously read as exactly [`METADATA_LINES`] lines.
    pub fn decode(bytes: &[u8]) -> Result<Self, MetadataError> {
        if bytes.len() > MAX_METADATA_LEN {
            return Err(MetadataError::TooLong(MAX_METADATA_LEN));
        }
        let text = std::str::from_utf8(bytes).map_err(|_| MetadataError::Encoding)?;

        // Every field, including the last, must be terminated.
        let Some(body) = text.strip_suffix('\n') else {
            return Err(MetadataError::FieldCount {
                expected: METADATA_LINES,
                found: text.lines().count().saturating_sub(1),
            });
        };
        let fields: Vec<&str> = body.split('\n').collect();
        if fields.len() != METADATA_LINES {
            return Err(MetadataError::FieldCount {
                expected: METADATA_LINES,
                found: fields.len(),
            });
        }

        let name = fields[0];
        validate_name(name)?;
        let size = fields[1]
            .parse::<u64>()
            .map_err(|_| MetadataError::InvalidSize(fields[1].to_string()))?;
        let checksum = Checksum::from_hex(fields[2])?;
        check_encoded_len(name, size)?;

        Ok(Self {
            name: name.to_string(),
            size,
            checksum,
        })
    }
}

fn validate_name(name: &str) -> Result<(), MetadataError> {
    if name.is_empty() {
        return Err(MetadataError::EmptyName);
    }
    if name.contains(['\n', '\r']) {
        return Err(MetadataError::InvalidName);
    }
    Ok(())
}

/// Longest name that still fits the record alongside `size`.
pub(crate) fn max_name_len(size: u64) -> usize {
    let fixed = size.to_string().len() + Checksum::LEN * 2 + METADATA_LINES;
    MAX_METADATA_LEN.saturating_sub(fixed)
}

// Anything accepted here must be readable by the peer.
fn check_encoded_len(name: &str, size: u64) -> Result<(), MetadataError> {
    if name.len() > max_name_len(size) {
        return Err(MetadataError::TooLong(MAX_METADATA_LEN));
    }
    Ok(())
}
