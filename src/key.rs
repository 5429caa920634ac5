//! Named key (nk) decoding and enumeration.

use crate::cell::{read_cell, KeyNodeFlags};
use crate::error::{RegistryError, Result};
use crate::list::{decode_list, decode_value_list};
use crate::security::SecurityKey;
use crate::source::HiveSource;
use crate::utils::{
    bias, filetime_to_datetime, names_match, path_label, read_ascii_string, read_u16_le,
    read_u32_le, read_u64_le, read_utf16_string, slice_at,
};
use crate::value::ValueKeyCell;
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::debug;

/// Name the hive-creation tool gives the root key of offline hives.
/// Full paths replace it with `"<HiveLabel>:"`.
pub const ROOT_MARKER: &str = "CsiTool-CreateHive-{00000000-0000-0000-0000-000000000000}";

/// Size of the fixed part of a named key body (signature to name).
const KEY_NODE_MIN_SIZE: usize = 0x4C;

/// Offset of the key name within the cell body.
const KEY_NAME_OFFSET: usize = 0x4C;

/// Decoded named key (nk) cell.
///
/// A read-only projection: every field is copied out of the hive buffer,
/// and enumeration methods take the buffer again rather than holding it.
/// Offsets are stored exactly as they appear on disk (relative to the first
/// hive bin) except [`NamedKeyCell::offset`], which is absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NamedKeyCell {
    /// Absolute buffer offset of this cell.
    pub offset: usize,

    /// Raw cell size field.
    pub size: i32,

    /// False for unallocated (deleted) cells.
    pub allocated: bool,

    /// Path of the hive this key was decoded from.
    pub hive_path: String,

    /// Key flags.
    pub flags: KeyNodeFlags,

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// Relative offset of the parent key.
    pub parent_offset: u32,

    /// Number of stable subkeys.
    pub subkey_count: u32,

    /// Number of volatile subkeys (meaningless on disk).
    pub volatile_subkey_count: u32,

    /// Relative offset of the subkey list.
    pub subkey_list_offset: u32,

    /// Relative offset of the volatile subkey list.
    pub volatile_subkey_list_offset: u32,

    /// Number of values.
    pub value_count: u32,

    /// Relative offset of the value list.
    pub value_list_offset: u32,

    /// Relative offset of the security key.
    pub security_offset: u32,

    /// Relative offset of the class name.
    pub class_name_offset: u32,

    /// Largest subkey name size hint.
    pub max_subkey_name_len: u32,

    /// Largest subkey class name size hint.
    pub max_subkey_class_len: u32,

    /// Largest value name size hint.
    pub max_value_name_len: u32,

    /// Largest value data size hint.
    pub max_value_data_len: u32,

    /// Stored name length in bytes.
    pub name_length: u16,

    /// Stored class name length in bytes.
    pub class_name_length: u16,

    /// Decoded key name.
    pub name: String,

    /// Drive-qualified logical path, e.g. `SOFTWARE:\Microsoft\Windows`.
    pub full_path: String,
}

impl NamedKeyCell {
    /// Decodes the named key cell at absolute `offset`.
    ///
    /// `ancestor_path` is the full path of the parent key (empty for the
    /// root); the new key's full path is derived from it.
    ///
    /// # Errors
    ///
    /// Returns `NotANamedKey` if the cell does not carry the `nk` signature,
    /// or `MalformedCell` if the cell is too short for its declared fields.
    pub fn decode(buffer: &[u8], offset: usize, hive_path: &str, ancestor_path: &str) -> Result<Self> {
        let (header, body) = read_cell(buffer, offset)?;

        if !header.is(b"nk") {
            return Err(RegistryError::NotANamedKey {
                offset,
                found: header.signature_str(),
            });
        }

        if body.len() < KEY_NODE_MIN_SIZE {
            return Err(RegistryError::malformed(
                offset,
                format!("named key body is {} bytes, need {}", body.len(), KEY_NODE_MIN_SIZE),
            ));
        }

        let flags = KeyNodeFlags(read_u16_le(body, 0x02)?);
        let name_length = read_u16_le(body, 0x48)?;

        let name_data = slice_at(body, KEY_NAME_OFFSET, name_length as usize).map_err(|_| {
            RegistryError::malformed(offset, format!("key name of {} bytes overruns its cell", name_length))
        })?;
        let name = if flags.is_ascii_name() {
            read_ascii_string(name_data)
        } else {
            read_utf16_string(name_data, offset)?
        };

        let full_path = derive_full_path(hive_path, ancestor_path, &name);

        Ok(NamedKeyCell {
            offset,
            size: header.size,
            allocated: header.allocated,
            hive_path: hive_path.to_string(),
            flags,
            last_written: read_u64_le(body, 0x04)?,
            parent_offset: read_u32_le(body, 0x10)?,
            subkey_count: read_u32_le(body, 0x14)?,
            volatile_subkey_count: read_u32_le(body, 0x18)?,
            subkey_list_offset: read_u32_le(body, 0x1C)?,
            volatile_subkey_list_offset: read_u32_le(body, 0x20)?,
            value_count: read_u32_le(body, 0x24)?,
            value_list_offset: read_u32_le(body, 0x28)?,
            security_offset: read_u32_le(body, 0x2C)?,
            class_name_offset: read_u32_le(body, 0x30)?,
            max_subkey_name_len: read_u32_le(body, 0x34)?,
            max_subkey_class_len: read_u32_le(body, 0x38)?,
            max_value_name_len: read_u32_le(body, 0x3C)?,
            max_value_data_len: read_u32_le(body, 0x40)?,
            name_length,
            class_name_length: read_u16_le(body, 0x4A)?,
            name,
            full_path,
        })
    }

    /// Returns true if this key declares subkeys.
    pub fn has_subkeys(&self) -> bool {
        self.subkey_count > 0
    }

    /// Returns true if this key declares values.
    pub fn has_values(&self) -> bool {
        self.value_count > 0
    }

    /// Returns the last written time as a UTC timestamp.
    pub fn last_written_datetime(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.last_written)
    }

    /// Decodes the immediate subkeys of this key.
    ///
    /// A key with a zero subkey count has no addressable list and yields an
    /// empty vector, never an error.
    pub fn sub_keys(&self, buffer: &[u8]) -> Result<Vec<NamedKeyCell>> {
        if !self.has_subkeys() {
            return Ok(Vec::new());
        }

        let list = bias(self.subkey_list_offset)?;
        let offsets = decode_list(buffer, list, Some(self.subkey_count))?;
        debug!(key = %self.full_path, count = offsets.len(), "Enumerating subkeys");

        offsets
            .into_iter()
            .map(|offset| NamedKeyCell::decode(buffer, offset, &self.hive_path, &self.full_path))
            .collect()
    }

    /// Decodes the values of this key.
    ///
    /// # Errors
    ///
    /// Returns `NoValues` when the key declares zero values.
    pub fn values(&self, buffer: &[u8]) -> Result<Vec<ValueKeyCell>> {
        if !self.has_values() {
            return Err(RegistryError::NoValues {
                key: self.full_path.clone(),
            });
        }

        let list = bias(self.value_list_offset)?;
        decode_value_list(buffer, list, self.value_count)?
            .into_iter()
            .map(|offset| ValueKeyCell::decode(buffer, offset, &self.hive_path, &self.full_path))
            .collect()
    }

    /// Finds a value by case-insensitive name.
    pub fn value(&self, buffer: &[u8], name: &str) -> Result<ValueKeyCell> {
        self.values(buffer)?
            .into_iter()
            .find(|v| names_match(&v.name, name))
            .ok_or_else(|| RegistryError::value_not_found(name, &self.full_path))
    }

    /// Returns the raw security descriptor bytes of this key.
    pub fn security_descriptor(&self, buffer: &[u8]) -> Result<Vec<u8>> {
        let sk = SecurityKey::decode(buffer, bias(self.security_offset)?)?;
        Ok(sk.descriptor)
    }

    /// Returns the class name, if the key has one.
    ///
    /// Class names are UTF-16LE, stored in a bare data cell.
    pub fn class_name(&self, buffer: &[u8]) -> Result<Option<String>> {
        if self.class_name_length == 0 || self.class_name_offset == u32::MAX {
            return Ok(None);
        }

        let cell = bias(self.class_name_offset)?;
        let data = slice_at(buffer, cell + 4, self.class_name_length as usize)?;
        read_utf16_string(data, cell).map(Some)
    }

    /// Like [`NamedKeyCell::sub_keys`], reloading the hive from `source`.
    pub fn load_sub_keys(&self, source: &dyn HiveSource) -> Result<Vec<NamedKeyCell>> {
        if !self.has_subkeys() {
            return Ok(Vec::new());
        }
        let bytes = self.reload(source)?;
        self.sub_keys(&bytes)
    }

    /// Like [`NamedKeyCell::values`], reloading the hive from `source`.
    pub fn load_values(&self, source: &dyn HiveSource) -> Result<Vec<ValueKeyCell>> {
        if !self.has_values() {
            return Err(RegistryError::NoValues {
                key: self.full_path.clone(),
            });
        }
        let bytes = self.reload(source)?;
        self.values(&bytes)
    }

    /// Like [`NamedKeyCell::security_descriptor`], reloading the hive from `source`.
    pub fn load_security_descriptor(&self, source: &dyn HiveSource) -> Result<Vec<u8>> {
        let bytes = self.reload(source)?;
        self.security_descriptor(&bytes)
    }

    fn reload(&self, source: &dyn HiveSource) -> Result<crate::source::HiveBytes> {
        source
            .load(&self.hive_path)
            .map_err(|e| RegistryError::IoUnavailable {
                path: self.hive_path.clone(),
                source: Box::new(e),
            })
    }
}

impl fmt::Display for NamedKeyCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last_written_datetime() {
            Some(time) => write!(
                f,
                "Registry key {} last written to at {} [{}]",
                self.full_path, time, self.value_count
            ),
            None => write!(f, "Registry key {} [{}]", self.full_path, self.value_count),
        }
    }
}

/// Builds a key's full path from its ancestor path.
///
/// An ancestor that already contains the name is taken as complete. The
/// root marker becomes the hive's drive label, so the root of
/// `C:\Windows\System32\config\SOFTWARE` reads as `SOFTWARE:`.
pub fn derive_full_path(hive_path: &str, ancestor_path: &str, name: &str) -> String {
    let joined = if ancestor_path.contains(name) {
        ancestor_path.to_string()
    } else {
        format!("{}\\{}", ancestor_path, name)
    };

    joined
        .trim_start_matches('\\')
        .replace(ROOT_MARKER, &format!("{}:", path_label(hive_path)))
}
