//! Registry hive base block (header) parsing.
//!
//! The base block is the first 4096 bytes (0x1000) of a registry hive file.
//! It contains metadata about the hive including version, timestamps, and
//! the root key cell offset.

use crate::error::{RegistryError, Result};
use crate::utils::{calculate_checksum, filetime_to_datetime, read_u32_le, read_u64_le};
use encoding_rs::UTF_16LE;
use std::fmt;
use tracing::warn;

/// Size of the base block in bytes.
pub const BASE_BLOCK_SIZE: usize = 4096;

/// Expected signature for a valid registry hive ("regf").
pub const REGF_SIGNATURE: &[u8; 4] = b"regf";

/// Offset of the embedded file name.
const FILE_NAME_OFFSET: usize = 0x30;

/// Length of the embedded file name (32 UTF-16LE characters).
const FILE_NAME_LENGTH: usize = 64;

/// Offset of the checksum field.
const CHECKSUM_OFFSET: usize = 0x1FC;

/// Registry hive base block header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BaseBlock {
    /// Primary sequence number.
    pub primary_sequence: u32,

    /// Secondary sequence number.
    pub secondary_sequence: u32,

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// Major version of the hive format.
    pub major_version: u32,

    /// Minor version of the hive format.
    pub minor_version: u32,

    /// File type (0 = primary file).
    pub file_type: u32,

    /// Relative offset of the root key cell.
    pub root_cell_offset: u32,

    /// Length of the hive bins data in bytes.
    pub hive_length: u32,

    /// Tail of the path the hive was created from.
    pub file_name: String,

    /// Stored checksum.
    pub checksum: u32,

    /// True if the stored checksum matches the computed one.
    pub checksum_valid: bool,
}

impl BaseBlock {
    /// Parses a base block from the start of a hive buffer.
    ///
    /// A checksum mismatch is logged and recorded in `checksum_valid`; with
    /// `verify_checksum` it is rejected instead.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHiveHeader` if the buffer is shorter than a base block,
    /// the `regf` magic is missing, or (when requested) the checksum fails.
    pub fn parse(data: &[u8], verify_checksum: bool) -> Result<Self> {
        if data.len() < BASE_BLOCK_SIZE {
            return Err(RegistryError::InvalidHiveHeader(format!(
                "hive is {} bytes, smaller than the {} byte base block",
                data.len(),
                BASE_BLOCK_SIZE
            )));
        }

        if &data[0..4] != REGF_SIGNATURE {
            return Err(RegistryError::InvalidHiveHeader(format!(
                "expected 'regf' signature, found {}",
                hex::encode(&data[0..4])
            )));
        }

        let checksum = read_u32_le(data, CHECKSUM_OFFSET)?;
        let calculated = calculate_checksum(data);
        let checksum_valid = checksum == calculated;

        if !checksum_valid {
            if verify_checksum {
                return Err(RegistryError::InvalidHiveHeader(format!(
                    "checksum mismatch: stored {:#x}, calculated {:#x}",
                    checksum, calculated
                )));
            }
            warn!(
                stored = %format!("{:#x}", checksum),
                calculated = %format!("{:#x}", calculated),
                "Base block checksum mismatch"
            );
        }

        let (file_name, _) = UTF_16LE
            .decode_without_bom_handling(&data[FILE_NAME_OFFSET..FILE_NAME_OFFSET + FILE_NAME_LENGTH]);

        Ok(BaseBlock {
            primary_sequence: read_u32_le(data, 0x04)?,
            secondary_sequence: read_u32_le(data, 0x08)?,
            last_written: read_u64_le(data, 0x0C)?,
            major_version: read_u32_le(data, 0x14)?,
            minor_version: read_u32_le(data, 0x18)?,
            file_type: read_u32_le(data, 0x1C)?,
            root_cell_offset: read_u32_le(data, 0x24)?,
            hive_length: read_u32_le(data, 0x28)?,
            file_name: file_name.trim_end_matches('\0').to_string(),
            checksum,
            checksum_valid,
        })
    }

    /// Returns true if the hive was cleanly written.
    ///
    /// The hive is consistent when primary and secondary sequence numbers match.
    pub fn is_consistent(&self) -> bool {
        self.primary_sequence == self.secondary_sequence
    }

    /// Converts the last written timestamp to a UTC timestamp.
    pub fn last_written_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        filetime_to_datetime(self.last_written)
    }
}

impl fmt::Display for BaseBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Registry Hive Header:\n\
             - Version: {}.{}\n\
             - Root Cell Offset: {:#x}\n\
             - Hive Length: {} bytes\n\
             - Consistent: {}\n\
             - File Name: {}",
            self.major_version,
            self.minor_version,
            self.root_cell_offset,
            self.hive_length,
            self.is_consistent(),
            self.file_name
        )
    }
}
