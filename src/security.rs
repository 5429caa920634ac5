//! Security key (sk) location.
//!
//! Only the raw self-relative descriptor is extracted; ACL decoding is left
//! to the caller.

use crate::cell::read_cell;
use crate::error::{RegistryError, Result};
use crate::utils::{read_u32_le, slice_at};

/// Offset of the descriptor within the cell body.
const DESCRIPTOR_OFFSET: usize = 0x14;

/// Decoded security key (sk) cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityKey {
    /// Absolute buffer offset of this cell.
    pub offset: usize,

    /// Relative offset of the next security key in the hive's list.
    pub flink: u32,

    /// Relative offset of the previous security key in the hive's list.
    pub blink: u32,

    /// Number of keys sharing this descriptor.
    pub reference_count: u32,

    /// Raw descriptor bytes.
    pub descriptor: Vec<u8>,
}

impl SecurityKey {
    /// Decodes the security key cell at absolute `offset`.
    pub fn decode(buffer: &[u8], offset: usize) -> Result<Self> {
        let (header, body) = read_cell(buffer, offset)?;

        if !header.is(b"sk") {
            return Err(RegistryError::malformed(
                offset,
                format!("expected 'sk' signature, found {:?}", header.signature_str()),
            ));
        }

        let length = read_u32_le(body, 0x10)? as usize;
        let descriptor = slice_at(body, DESCRIPTOR_OFFSET, length)
            .map_err(|_| RegistryError::malformed(offset, "security descriptor overruns its cell"))?
            .to_vec();

        Ok(SecurityKey {
            offset,
            flink: read_u32_le(body, 0x04)?,
            blink: read_u32_le(body, 0x08)?,
            reference_count: read_u32_le(body, 0x0C)?,
            descriptor,
        })
    }
}
