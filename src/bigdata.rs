//! Big data (db) reassembly.
//!
//! Values too large for a single cell point at a `db` cell instead of their
//! data. The `db` cell names a segment table; each segment is a cell whose
//! body carries one slice of the value.

use crate::cell::{read_cell, CellHeader};
use crate::error::{RegistryError, Result};
use crate::list::decode_segment_table;
use crate::utils::{bias, read_u16_le, read_u32_le, slice_at};
use crate::value::ValueKeyCell;
use tracing::{debug, warn};

/// Bytes of each segment cell that are not value data: the 4-byte size
/// field plus 4 trailing bytes.
pub const SEGMENT_ENVELOPE: usize = 8;

/// Big data block header.
///
/// Format:
/// ```text
/// Offset  Size  Description
/// 0x00    2     Signature ("db")
/// 0x02    2     Number of segments
/// 0x04    4     Offset to segment table
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigDataBlock {
    /// Absolute buffer offset of the `db` cell.
    pub offset: usize,

    /// Number of data segments.
    pub segment_count: u16,

    /// Relative offset of the segment table.
    pub segment_list_offset: u32,
}

impl BigDataBlock {
    /// Minimum size of a big data block body.
    const MIN_SIZE: usize = 8;

    /// Parses the `db` cell at absolute `offset`.
    pub fn parse(buffer: &[u8], offset: usize) -> Result<Self> {
        let (header, body) = read_cell(buffer, offset)?;

        if !header.is(b"db") {
            return Err(RegistryError::malformed(
                offset,
                format!("expected 'db' signature, found {:?}", header.signature_str()),
            ));
        }

        if body.len() < Self::MIN_SIZE {
            return Err(RegistryError::malformed(offset, "big data header truncated"));
        }

        Ok(BigDataBlock {
            offset,
            segment_count: read_u16_le(body, 0x02)?,
            segment_list_offset: read_u32_le(body, 0x04)?,
        })
    }

    /// Returns the absolute offsets of the segment cells, in table order.
    pub fn segment_offsets(&self, buffer: &[u8]) -> Result<Vec<usize>> {
        let table = bias(self.segment_list_offset)?;
        decode_segment_table(buffer, table, self.segment_count)
    }
}

/// Reassembles the data of a big-data value.
///
/// Segments are concatenated in table order with their envelope removed.
/// The value's declared length is only compared against the result;
/// partially overwritten evidence often disagrees with it.
pub fn reassemble(buffer: &[u8], value: &ValueKeyCell) -> Result<Vec<u8>> {
    let block = BigDataBlock::parse(buffer, bias(value.data_offset)?)?;
    let segments = block.segment_offsets(buffer)?;
    debug!(
        value = %value.name,
        segments = segments.len(),
        "Reassembling big data"
    );

    let mut data = Vec::new();
    for segment in segments {
        let header = CellHeader::parse(buffer, segment)?;
        let len = header.len().checked_sub(SEGMENT_ENVELOPE).ok_or_else(|| {
            RegistryError::malformed(segment, format!("segment size {} is below its envelope", header.size))
        })?;
        data.extend_from_slice(slice_at(buffer, segment + 4, len)?);
    }

    if data.len() != value.data_length as usize {
        warn!(
            value = %value.name,
            declared = value.data_length,
            reassembled = data.len(),
            "Big data length does not match the value's declared length"
        );
    }

    Ok(data)
}
