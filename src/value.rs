//! Value key (vk) decoding and data resolution.

use crate::bigdata;
use crate::cell::{read_cell, CellHeader, ValueType};
use crate::error::{RegistryError, Result};
use crate::source::HiveSource;
use crate::utils::{
    bias, decode_utf16_data, read_ascii_string, read_u16_le, read_u32_le, read_utf16_string,
    slice_at,
};
use std::fmt;
use tracing::debug;

/// Raw lengths above this value mark resident data.
pub const RESIDENT_THRESHOLD: u32 = 0x8000_0000;

/// Name reported for a value whose stored name is empty.
pub const DEFAULT_VALUE_NAME: &str = "(Default)";

/// Size of the fixed part of a value key body (signature to name).
const VALUE_KEY_MIN_SIZE: usize = 0x14;

/// Value name flag: name is stored one byte per character.
const VALUE_NAME_ASCII: u16 = 0x0001;

/// Splits a raw data length field into `(length, resident)`.
///
/// Data is resident only when the raw field is strictly greater than
/// [`RESIDENT_THRESHOLD`]; exactly `0x8000_0000` is a non-resident length.
pub fn classify_length(raw: u32) -> (u32, bool) {
    if raw > RESIDENT_THRESHOLD {
        (raw - RESIDENT_THRESHOLD, true)
    } else {
        (raw, false)
    }
}

/// Decoded value key (vk) cell.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ValueKeyCell {
    /// Absolute buffer offset of this cell.
    pub offset: usize,

    /// Raw cell size field.
    pub size: i32,

    /// False for unallocated (deleted) cells.
    pub allocated: bool,

    /// Path of the hive this value was decoded from.
    pub hive_path: String,

    /// Full path of the owning key.
    pub key_path: String,

    /// Stored name length in bytes.
    pub name_length: u16,

    /// Data length with the residency bit removed.
    pub data_length: u32,

    /// True when the data is packed into `data_offset`.
    pub resident: bool,

    /// Raw data offset field: a relative offset, or the data itself.
    pub data_offset: u32,

    /// Declared value type.
    pub value_type: ValueType,

    /// Value flags.
    pub flags: u16,

    /// Decoded name, or [`DEFAULT_VALUE_NAME`].
    pub name: String,
}

impl ValueKeyCell {
    /// Decodes the value key cell at absolute `offset`.
    ///
    /// # Errors
    ///
    /// Returns `NotAValueKey` if the cell does not carry the `vk` signature,
    /// or `MalformedCell` if it is too short for its declared name.
    pub fn decode(buffer: &[u8], offset: usize, hive_path: &str, key_path: &str) -> Result<Self> {
        let (header, body) = read_cell(buffer, offset)?;

        if !header.is(b"vk") {
            return Err(RegistryError::NotAValueKey {
                offset,
                found: header.signature_str(),
            });
        }

        if body.len() < VALUE_KEY_MIN_SIZE {
            return Err(RegistryError::malformed(
                offset,
                format!("value key body is {} bytes, need {}", body.len(), VALUE_KEY_MIN_SIZE),
            ));
        }

        let name_length = read_u16_le(body, 0x02)?;
        let (data_length, resident) = classify_length(read_u32_le(body, 0x04)?);
        let flags = read_u16_le(body, 0x10)?;

        let name = if name_length == 0 {
            DEFAULT_VALUE_NAME.to_string()
        } else {
            let name_data = slice_at(body, VALUE_KEY_MIN_SIZE, name_length as usize)
                .map_err(|_| RegistryError::malformed(offset, "value name overruns its cell"))?;
            if flags & VALUE_NAME_ASCII != 0 {
                read_ascii_string(name_data)
            } else {
                read_utf16_string(name_data, offset)?
            }
        };

        Ok(ValueKeyCell {
            offset,
            size: header.size,
            allocated: header.allocated,
            hive_path: hive_path.to_string(),
            key_path: key_path.to_string(),
            name_length,
            data_length,
            resident,
            data_offset: read_u32_le(body, 0x08)?,
            value_type: ValueType::from_u32(read_u32_le(body, 0x0C)?),
            flags,
            name,
        })
    }

    /// Returns the four bytes of the data offset field.
    ///
    /// For resident values these are the data; callers truncate to
    /// `data_length` when interpreting them.
    pub fn resident_bytes(&self) -> [u8; 4] {
        self.data_offset.to_le_bytes()
    }

    /// Resolves this value's data.
    ///
    /// Resident data is returned as its four raw bytes. Non-resident data
    /// that lands on a `db` cell is reassembled from its segments regardless
    /// of the declared type. Anything else is read from the data cell body;
    /// `REG_SZ` is decoded as UTF-16, every other type is returned raw.
    pub fn data(&self, buffer: &[u8]) -> Result<ValueContent> {
        if self.resident {
            return Ok(ValueContent::Bytes(self.resident_bytes().to_vec()));
        }

        if self.data_length == 0 {
            return Ok(match self.value_type {
                ValueType::String => ValueContent::String(String::new()),
                _ => ValueContent::Bytes(Vec::new()),
            });
        }

        let cell = bias(self.data_offset)?;
        if CellHeader::parse(buffer, cell)?.is(b"db") {
            debug!(value = %self.name, cell = %format!("{:#x}", cell), "Value uses big data");
            return bigdata::reassemble(buffer, self).map(ValueContent::Bytes);
        }

        let data = slice_at(buffer, cell + 4, self.data_length as usize)?;
        Ok(match self.value_type {
            ValueType::String => ValueContent::String(decode_utf16_data(data)),
            _ => ValueContent::Bytes(data.to_vec()),
        })
    }

    /// Like [`ValueKeyCell::data`], reloading the hive from `source`.
    pub fn load_data(&self, source: &dyn HiveSource) -> Result<ValueContent> {
        let bytes = source
            .load(&self.hive_path)
            .map_err(|e| RegistryError::IoUnavailable {
                path: self.hive_path.clone(),
                source: Box::new(e),
            })?;
        self.data(&bytes)
    }
}

/// Resolved value data.
///
/// Only `REG_SZ` is decoded here; typed interpretation of every other
/// type belongs to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ValueContent {
    /// Raw data bytes.
    Bytes(Vec<u8>),

    /// Decoded `REG_SZ` string.
    String(String),
}

impl ValueContent {
    /// Returns the raw bytes, if this is not a decoded string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ValueContent::Bytes(b) => Some(b),
            ValueContent::String(_) => None,
        }
    }

    /// Returns the decoded string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ValueContent::String(s) => Some(s),
            ValueContent::Bytes(_) => None,
        }
    }

    /// Returns the content as bytes; strings are re-encoded as UTF-16LE.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            ValueContent::Bytes(b) => b,
            ValueContent::String(s) => s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect(),
        }
    }
}

impl fmt::Display for ValueContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueContent::String(s) => f.write_str(s),
            ValueContent::Bytes(b) => f.write_str(&hex::encode(b)),
        }
    }
}
