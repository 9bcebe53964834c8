// identification_block.rs
use super::ID_BLOCK_SIZE;
use crate::{Error, Result};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::str::from_utf8;

/// Identification block - the fixed 64-byte header at file offset 0.
///
/// Carries the file magic ("MDF     " for finalized files, "UnFinMF " for
/// unfinalized ones), the format version, and the unfinalized-flag pair
/// that an external finalizer must clear when it repairs the file.
#[derive(Debug, Clone)]
pub struct IdentificationBlock {
    pub file_identifier: String,
    pub version_identifier: String,
    pub program_identifier: String,
    pub version_number: u16,
    pub standard_unfinalized_flags: u16,
    pub custom_unfinalized_flags: u16,
}

impl Default for IdentificationBlock {
    fn default() -> Self {
        IdentificationBlock {
            file_identifier: String::from("MDF     "),
            version_identifier: String::from("4.10    "), // padded to 8 bytes
            program_identifier: String::from("mdfkit  "), // padded to 8 bytes
            version_number: 410,                          // 4.10
            standard_unfinalized_flags: 0,
            custom_unfinalized_flags: 0,
        }
    }
}

impl IdentificationBlock {
    /// Creates an identification block marked unfinalized with the given
    /// standard flags (see [`super::unfin_flags`]).
    pub fn unfinalized(standard_flags: u16) -> Self {
        IdentificationBlock {
            file_identifier: String::from("UnFinMF "),
            standard_unfinalized_flags: standard_flags,
            ..Default::default()
        }
    }

    /// True when the file magic says the file has not been finalized.
    pub fn is_unfinalized(&self) -> bool {
        self.file_identifier.trim_end() == "UnFinMF"
    }

    /// Copy a string into a fixed-size byte field.
    ///
    /// Per MDF 4.1 the identification strings are space padded with no zero
    /// termination.
    fn copy_string_with_padding(source: &str, target: &mut [u8]) {
        let src_bytes = source.as_bytes();
        let copy_len = core::cmp::min(src_bytes.len(), target.len());
        target[..copy_len].copy_from_slice(&src_bytes[..copy_len]);
        for byte in target.iter_mut().skip(copy_len) {
            *byte = b' ';
        }
    }

    /// Serializes the identification block to its 64-byte on-disk form.
    ///
    /// # Structure (64 bytes total):
    /// - File identifier: 8 bytes ("MDF     " or "UnFinMF ")
    /// - Version identifier: 8 bytes ("4.10    ")
    /// - Program identifier: 8 bytes
    /// - Reserved: 4 bytes (zeros)
    /// - Version number: 2 bytes (e.g., 410 for version 4.10)
    /// - Reserved: 30 bytes (zeros)
    /// - Standard unfinalized flags: 2 bytes
    /// - Custom unfinalized flags: 2 bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(ID_BLOCK_SIZE);

        let mut file_id = [0u8; 8];
        Self::copy_string_with_padding(&self.file_identifier, &mut file_id);
        buffer.extend_from_slice(&file_id);

        let mut version_id = [0u8; 8];
        Self::copy_string_with_padding(&self.version_identifier, &mut version_id);
        buffer.extend_from_slice(&version_id);

        let mut program_id = [0u8; 8];
        Self::copy_string_with_padding(&self.program_identifier, &mut program_id);
        buffer.extend_from_slice(&program_id);

        buffer.extend_from_slice(&[0u8; 4]);
        buffer.extend_from_slice(&self.version_number.to_le_bytes());
        buffer.extend_from_slice(&[0u8; 30]);
        buffer.extend_from_slice(&self.standard_unfinalized_flags.to_le_bytes());
        buffer.extend_from_slice(&self.custom_unfinalized_flags.to_le_bytes());

        debug_assert_eq!(buffer.len(), ID_BLOCK_SIZE);
        Ok(buffer)
    }

    /// Parse an identification block from a 64-byte slice.
    ///
    /// Accepts both finalized ("MDF     ") and unfinalized ("UnFinMF ")
    /// files and rejects anything else.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ID_BLOCK_SIZE {
            return Err(Error::TooShortBuffer {
                actual: bytes.len(),
                expected: ID_BLOCK_SIZE,
                file: file!(),
                line: line!(),
            });
        }

        let file_identifier = String::from_utf8_lossy(&bytes[0..8]).into_owned();
        if file_identifier != "MDF     " && file_identifier != "UnFinMF " {
            return Err(Error::FileIdentifierError(file_identifier));
        }

        let (major, minor) = Self::parse_block_version(&bytes[8..16])?;
        let version_u16 = major * 100 + minor;

        if version_u16 < 410 {
            return Err(Error::FileVersioningError(version_u16.to_string()));
        }

        Ok(Self {
            file_identifier,
            version_identifier: String::from_utf8_lossy(&bytes[8..16]).into_owned(),
            program_identifier: String::from_utf8_lossy(&bytes[16..24]).into_owned(),
            // Reserved bytes 24..28 are skipped; the numeric version
            // follows at 28..30
            version_number: u16::from_le_bytes(bytes[28..30].try_into().unwrap()),
            // Reserved bytes 30..60 are skipped
            standard_unfinalized_flags: u16::from_le_bytes(bytes[60..62].try_into().unwrap()),
            custom_unfinalized_flags: u16::from_le_bytes(bytes[62..64].try_into().unwrap()),
        })
    }

    /// Parse the textual version stored in the identification block.
    ///
    /// # Arguments
    /// * `bytes` - Eight bytes containing the version string, e.g. `"4.10\0"`.
    ///
    /// # Returns
    /// `(major, minor)` on success or an [`Error`] when the format is
    /// unexpected.
    pub fn parse_block_version(bytes: &[u8]) -> Result<(u16, u16)> {
        let raw = from_utf8(bytes)
            .map_err(|_| Error::InvalidVersionString("Invalid UTF-8".to_string()))?;

        let s = raw.trim_end_matches(char::from(0)).trim();
        let mut parts = s.split('.');
        let maj = parts
            .next()
            .ok_or_else(|| Error::InvalidVersionString("Missing major version".to_string()))?
            .parse::<u16>()
            .map_err(|_| Error::InvalidVersionString("Invalid major version string".to_string()))?;
        let min =
            parts.next().unwrap_or("0").parse::<u16>().map_err(|_| {
                Error::InvalidVersionString("Invalid minor version string".to_string())
            })?;
        Ok((maj, min))
    }
}
