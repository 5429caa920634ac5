//! Hive bin (hbin) parsing and cell scanning.
//!
//! Hive bins are 4KB-aligned blocks that contain registry cells. Scanning
//! them cell by cell, rather than following offsets from the root, is how
//! unallocated (deleted) cells are found.

use crate::cell::{CellHeader, CELL_HEADER_SIZE};
use crate::error::{RegistryError, Result};
use crate::utils::{read_u32_le, read_u64_le, slice_at, HBIN_START_OFFSET};
use tracing::warn;

/// Expected signature for hive bins ("hbin").
pub const HBIN_SIGNATURE: &[u8; 4] = b"hbin";

/// Size of an hbin header.
pub const HBIN_HEADER_SIZE: usize = 0x20;

/// Bins are sized in multiples of this.
const HBIN_ALIGNMENT: usize = 0x1000;

/// Hive bin header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HbinHeader {
    /// Absolute buffer offset of this bin.
    pub absolute_offset: usize,

    /// Stored offset of this bin, relative to the first bin.
    pub offset: u32,

    /// Size of this bin in bytes, including the header.
    pub size: u32,

    /// Timestamp (Windows FILETIME), only meaningful in the first bin.
    pub timestamp: u64,
}

impl HbinHeader {
    /// Parses the bin header at absolute `offset`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedCell` if the signature is wrong, the size is not a
    /// positive multiple of 4KB, or the stored offset disagrees with the
    /// bin's position.
    pub fn parse(buffer: &[u8], offset: usize) -> Result<Self> {
        let data = slice_at(buffer, offset, HBIN_HEADER_SIZE)?;

        if &data[0..4] != HBIN_SIGNATURE {
            return Err(RegistryError::malformed(
                offset,
                format!("expected 'hbin' signature, found {}", hex::encode(&data[0..4])),
            ));
        }

        let stored = read_u32_le(data, 0x04)?;
        let size = read_u32_le(data, 0x08)?;

        if size == 0 || size as usize % HBIN_ALIGNMENT != 0 {
            return Err(RegistryError::malformed(offset, format!("invalid bin size {:#x}", size)));
        }

        if stored as usize + HBIN_START_OFFSET != offset {
            return Err(RegistryError::malformed(
                offset,
                format!("bin offset mismatch: stored {:#x}", stored),
            ));
        }

        Ok(HbinHeader {
            absolute_offset: offset,
            offset: stored,
            size,
            timestamp: read_u64_le(data, 0x14)?,
        })
    }

    /// Returns the absolute offset one past the end of this bin.
    pub fn end(&self) -> usize {
        self.absolute_offset + self.size as usize
    }
}

/// Iterator over the bins of a hive.
///
/// A bin header that fails to parse is yielded as an error and the walk
/// resumes at the next 4KB boundary, where the following bin may start.
pub struct HbinIterator<'a> {
    buffer: &'a [u8],
    offset: usize,
    end: usize,
}

impl<'a> HbinIterator<'a> {
    /// Creates an iterator over the bins in `buffer[0x1000..end]`.
    pub fn new(buffer: &'a [u8], end: usize) -> Self {
        Self {
            buffer,
            offset: HBIN_START_OFFSET,
            end: end.min(buffer.len()),
        }
    }
}

impl<'a> Iterator for HbinIterator<'a> {
    type Item = Result<HbinHeader>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + HBIN_HEADER_SIZE > self.end {
            return None;
        }

        match HbinHeader::parse(self.buffer, self.offset) {
            Ok(header) => {
                self.offset = header.end();
                Some(Ok(header))
            }
            Err(e) => {
                self.offset += HBIN_ALIGNMENT;
                Some(Err(e))
            }
        }
    }
}

/// A cell found while scanning bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannedCell {
    /// Absolute buffer offset of the cell.
    pub offset: usize,

    /// Decoded cell header.
    pub header: CellHeader,
}

/// Iterator over every cell of every bin, allocated or not.
///
/// A cell whose size is zero, unaligned, or runs past its bin ends the scan
/// of that bin; the scan resumes at the next bin. A page whose bin header
/// fails to parse is skipped.
pub struct CellIterator<'a> {
    buffer: &'a [u8],
    bins: HbinIterator<'a>,
    cursor: usize,
    bin_end: usize,
}

impl<'a> CellIterator<'a> {
    /// Creates a cell iterator over the bins in `buffer[0x1000..end]`.
    pub fn new(buffer: &'a [u8], end: usize) -> Self {
        Self {
            buffer,
            bins: HbinIterator::new(buffer, end),
            cursor: 0,
            bin_end: 0,
        }
    }
}

impl<'a> Iterator for CellIterator<'a> {
    type Item = ScannedCell;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cursor + CELL_HEADER_SIZE <= self.bin_end {
                let offset = self.cursor;
                if let Ok(header) = CellHeader::parse(self.buffer, offset) {
                    let len = header.len();
                    if len >= 8 && len % 8 == 0 && offset + len <= self.bin_end {
                        self.cursor += len;
                        return Some(ScannedCell { offset, header });
                    }
                    warn!(
                        offset = %format!("{:#x}", offset),
                        size = header.size,
                        "Corrupt cell framing, skipping rest of bin"
                    );
                }
                self.cursor = self.bin_end;
            }

            match self.bins.next()? {
                Ok(bin) => {
                    self.cursor = bin.absolute_offset + HBIN_HEADER_SIZE;
                    self.bin_end = bin.end().min(self.buffer.len());
                }
                Err(e) => {
                    warn!(error = %e, "Skipping page with invalid bin header");
                }
            }
        }
    }
}
