//! Utility functions for bounds-checked reads, offset biasing and string conversion.

use crate::error::{RegistryError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use encoding_rs::UTF_16LE;
use std::io::Cursor;

/// Offset where hive bins start (after base block).
///
/// Every relative offset stored inside a hive is biased by this value.
pub const HBIN_START_OFFSET: usize = 0x1000;

/// Returns the `len` bytes at `offset`, or an out-of-bounds error.
#[inline]
pub fn slice_at(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .map(|end| &data[offset..end])
        .ok_or_else(|| RegistryError::out_of_bounds(offset, len, data.len()))
}

/// Reads a u16 from a byte slice at the given offset.
pub fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    let mut cursor = Cursor::new(slice_at(data, offset, 2)?);
    Ok(cursor.read_u16::<LittleEndian>()?)
}

/// Reads a u32 from a byte slice at the given offset.
pub fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    let mut cursor = Cursor::new(slice_at(data, offset, 4)?);
    Ok(cursor.read_u32::<LittleEndian>()?)
}

/// Reads an i32 from a byte slice at the given offset.
pub fn read_i32_le(data: &[u8], offset: usize) -> Result<i32> {
    let mut cursor = Cursor::new(slice_at(data, offset, 4)?);
    Ok(cursor.read_i32::<LittleEndian>()?)
}

/// Reads a u64 from a byte slice at the given offset.
pub fn read_u64_le(data: &[u8], offset: usize) -> Result<u64> {
    let mut cursor = Cursor::new(slice_at(data, offset, 8)?);
    Ok(cursor.read_u64::<LittleEndian>()?)
}

/// Converts a relative cell offset to an absolute buffer offset.
///
/// The result is not bounds-checked against any buffer; readers check it
/// before dereferencing.
///
/// # Errors
///
/// Returns `RegistryError::OffsetOutOfBounds` if the addition would overflow.
#[inline]
pub fn bias(relative: u32) -> Result<usize> {
    (relative as usize)
        .checked_add(HBIN_START_OFFSET)
        .ok_or_else(|| RegistryError::out_of_bounds(relative as usize, 0, 0))
}

/// Converts an absolute buffer offset back to a relative cell offset.
#[inline]
pub fn unbias(absolute: usize) -> Result<u32> {
    absolute
        .checked_sub(HBIN_START_OFFSET)
        .and_then(|rel| u32::try_from(rel).ok())
        .ok_or_else(|| {
            RegistryError::malformed(absolute, "absolute offset is before the first hive bin")
        })
}

/// Reads a compressed (one byte per character) name.
///
/// Compressed names are Latin-1, so every byte maps to one `char`.
pub fn read_ascii_string(data: &[u8]) -> String {
    data.iter()
        .map(|&b| b as char)
        .collect::<String>()
        .trim_end_matches('\0')
        .to_string()
}

/// Reads a UTF-16LE name, trimming null terminators.
///
/// # Errors
///
/// Returns an error if the length is odd or the data is not valid UTF-16.
pub fn read_utf16_string(data: &[u8], offset: usize) -> Result<String> {
    if data.is_empty() {
        return Ok(String::new());
    }

    if data.len() % 2 != 0 {
        return Err(RegistryError::InvalidUtf16 { offset });
    }

    let (decoded, had_errors) = UTF_16LE.decode_without_bom_handling(data);
    if had_errors {
        return Err(RegistryError::InvalidUtf16 { offset });
    }

    Ok(decoded.trim_end_matches('\0').to_string())
}

/// Decodes UTF-16LE value data, replacing undecodable units.
///
/// Exactly one trailing null terminator is stripped; value data is evidence,
/// so anything else (embedded or repeated nulls) is preserved.
pub fn decode_utf16_data(data: &[u8]) -> String {
    let even = &data[..data.len() & !1];
    let (decoded, _) = UTF_16LE.decode_without_bom_handling(even);
    let mut s = decoded.into_owned();
    if s.ends_with('\0') {
        s.pop();
    }
    s
}

/// Case-insensitive name comparison used by every key and value lookup.
pub fn names_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_uppercase() == b.to_uppercase()
}

/// Returns the final component of a hive path, accepting either separator.
pub fn path_label(path: &str) -> &str {
    path.rsplit(['\\', '/'])
        .find(|s| !s.is_empty())
        .unwrap_or(path)
}

/// Converts a Windows FILETIME to a UTC timestamp.
///
/// FILETIME counts 100-nanosecond intervals since 1601-01-01.
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    const FILETIME_UNIX_DIFF: i64 = 11_644_473_600;

    let seconds = (filetime / 10_000_000) as i64 - FILETIME_UNIX_DIFF;
    let nanos = ((filetime % 10_000_000) * 100) as u32;

    DateTime::from_timestamp(seconds, nanos)
}

/// Calculates the XOR checksum over the first 508 bytes of the base block.
pub fn calculate_checksum(data: &[u8]) -> u32 {
    (0..0x1FC)
        .step_by(4)
        .filter_map(|i| read_u32_le(data, i).ok())
        .fold(0, |acc, dword| acc ^ dword)
}
