//! List decoding (li, lf, lh, ri, value lists, big-data segment tables).
//!
//! Every indirection block in a hive reduces to an ordered sequence of cell
//! offsets. Subkey lists select their decoding rule from their own 2-byte
//! signature; value lists and segment tables are bare offset arrays.
//! All decoders return *absolute* buffer offsets (already biased).

use crate::cell::read_cell;
use crate::error::{RegistryError, Result};
use crate::utils::{bias, read_u16_le, read_u32_le};
use tracing::{debug, warn};

/// Maximum nesting of index roots. Real hives never nest them; anything
/// deeper than this is an offset cycle.
pub const MAX_LIST_NESTING: usize = 8;

/// Signature-bearing list encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// Index leaf (li) - bare offsets.
    IndexLeaf,

    /// Fast leaf (lf) - offsets interleaved with 4-byte name hints.
    FastLeaf,

    /// Hash leaf (lh) - offsets interleaved with name hashes.
    HashLeaf,

    /// Index root (ri) - offsets of further lists.
    IndexRoot,
}

impl ListKind {
    /// Selects the decoding rule for a block signature.
    pub fn from_signature(sig: &[u8; 2]) -> Option<Self> {
        match sig {
            b"li" => Some(ListKind::IndexLeaf),
            b"lf" => Some(ListKind::FastLeaf),
            b"lh" => Some(ListKind::HashLeaf),
            b"ri" => Some(ListKind::IndexRoot),
            _ => None,
        }
    }

    /// Bytes per entry. The hint field of lf/lh entries is skipped.
    pub fn stride(&self) -> usize {
        match self {
            ListKind::FastLeaf | ListKind::HashLeaf => 8,
            ListKind::IndexLeaf | ListKind::IndexRoot => 4,
        }
    }
}

/// Decodes the subkey list at absolute `block` into absolute key offsets.
///
/// Index roots are flattened: each entry is decoded as a sub-list and the
/// results are concatenated in entry order. `expected` (a key's subkey
/// count) is only compared against the result; a mismatch is logged and
/// decoding continues with the block's own framing.
///
/// # Errors
///
/// Returns `UnknownListSignature` for an unrecognized block, or
/// `HiveTooDeep` when index roots nest past [`MAX_LIST_NESTING`].
pub fn decode_list(buffer: &[u8], block: usize, expected: Option<u32>) -> Result<Vec<usize>> {
    let offsets = decode_nested(buffer, block, 0)?;

    if let Some(expected) = expected {
        if offsets.len() != expected as usize {
            warn!(
                block = %format!("{:#x}", block),
                expected,
                decoded = offsets.len(),
                "Subkey count does not match list framing"
            );
        }
    }

    Ok(offsets)
}

fn decode_nested(buffer: &[u8], block: usize, depth: usize) -> Result<Vec<usize>> {
    if depth > MAX_LIST_NESTING {
        return Err(RegistryError::HiveTooDeep {
            limit: MAX_LIST_NESTING,
        });
    }

    let (header, body) = read_cell(buffer, block)?;
    let kind = ListKind::from_signature(&header.signature)
        .ok_or_else(|| RegistryError::unknown_list(block, header.signature))?;

    let entries = leaf_entries(body, block, kind)?;
    debug!(
        block = %format!("{:#x}", block),
        ?kind,
        count = entries.len(),
        "Decoded list block"
    );

    if kind != ListKind::IndexRoot {
        return Ok(entries);
    }

    let mut offsets = Vec::new();
    for sub_block in entries {
        offsets.extend(decode_nested(buffer, sub_block, depth + 1)?);
    }
    Ok(offsets)
}

/// Reads the entries of one list block, trusting its count field only as
/// far as the cell's own size allows.
fn leaf_entries(body: &[u8], block: usize, kind: ListKind) -> Result<Vec<usize>> {
    let declared = read_u16_le(body, 2)? as usize;
    let capacity = body.len().saturating_sub(4) / kind.stride();

    let count = if declared > capacity {
        warn!(
            block = %format!("{:#x}", block),
            declared,
            capacity,
            "List count exceeds its cell, truncating"
        );
        capacity
    } else {
        declared
    };

    (0..count)
        .map(|i| bias(read_u32_le(body, 4 + i * kind.stride())?))
        .collect()
}

/// Decodes a value list: a bare array of value-cell offsets.
///
/// Cells are padded to 8 bytes, so the array may hold more slots than the
/// key declares; only `expected` slots are read. A cell too small for
/// `expected` entries is logged and read as far as it goes.
pub fn decode_value_list(buffer: &[u8], block: usize, expected: u32) -> Result<Vec<usize>> {
    let (_, body) = read_cell(buffer, block)?;
    let capacity = body.len() / 4;
    let expected = expected as usize;

    if capacity < expected {
        warn!(
            block = %format!("{:#x}", block),
            expected,
            capacity,
            "Value list is smaller than the declared value count"
        );
    }

    (0..expected.min(capacity))
        .map(|i| bias(read_u32_le(body, i * 4)?))
        .collect()
}

/// Decodes a big-data segment table.
///
/// The table is addressed including its own size field, which occupies
/// slot 0; segment offsets start at slot 1. At most `expected` segments are
/// returned.
pub fn decode_segment_table(buffer: &[u8], block: usize, expected: u16) -> Result<Vec<usize>> {
    let (header, _) = read_cell(buffer, block)?;
    let capacity = (header.len() / 4).saturating_sub(1);
    let expected = expected as usize;

    if capacity < expected {
        warn!(
            block = %format!("{:#x}", block),
            expected,
            capacity,
            "Segment table is smaller than the declared segment count"
        );
    }

    (1..=expected.min(capacity))
        .map(|slot| bias(read_u32_le(buffer, block + slot * 4)?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_cell(buf: &mut Vec<u8>, abs: usize, body: &[u8]) {
        let size = (4 + body.len() + 7) & !7;
        if buf.len() < abs + size {
            buf.resize(abs + size, 0);
        }
        buf[abs..abs + 4].copy_from_slice(&(-(size as i32)).to_le_bytes());
        buf[abs + 4..abs + 4 + body.len()].copy_from_slice(body);
    }

    fn list_body(sig: &[u8; 2], entries: &[u32], hinted: bool) -> Vec<u8> {
        let mut body = sig.to_vec();
        body.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for e in entries {
            body.extend_from_slice(&e.to_le_bytes());
            if hinted {
                body.extend_from_slice(b"hint");
            }
        }
        body
    }

    #[test]
    fn test_list_kind_from_signature() {
        assert_eq!(ListKind::from_signature(b"li"), Some(ListKind::IndexLeaf));
        assert_eq!(ListKind::from_signature(b"lf"), Some(ListKind::FastLeaf));
        assert_eq!(ListKind::from_signature(b"lh"), Some(ListKind::HashLeaf));
        assert_eq!(ListKind::from_signature(b"ri"), Some(ListKind::IndexRoot));
        assert_eq!(ListKind::from_signature(b"XX"), None);
        assert_eq!(ListKind::HashLeaf.stride(), 8);
    }

    #[test]
    fn test_index_leaf_ignores_padding() {
        let mut buf = vec![0u8; 0x1000];
        // One entry: 4 + 4 + 4 = 12 bytes, padded to 16.
        put_cell(&mut buf, 0x1000, &list_body(b"li", &[0x80], false));
        let offsets = decode_list(&buf, 0x1000, Some(1)).unwrap();
        assert_eq!(offsets, vec![0x1080]);
    }

    #[test]
    fn test_hash_leaf_skips_hints() {
        let mut buf = vec![0u8; 0x1000];
        put_cell(&mut buf, 0x1000, &list_body(b"lh", &[0x20, 0x40, 0x60], true));
        let offsets = decode_list(&buf, 0x1000, Some(3)).unwrap();
        assert_eq!(offsets, vec![0x1020, 0x1040, 0x1060]);
    }

    #[test]
    fn test_index_root_concatenates_in_order() {
        let mut buf = vec![0u8; 0x1000];
        put_cell(&mut buf, 0x1100, &list_body(b"lf", &[0x300, 0x310], true));
        put_cell(&mut buf, 0x1200, &list_body(b"li", &[0x320], false));
        put_cell(&mut buf, 0x1000, &list_body(b"ri", &[0x100, 0x200], false));

        let offsets = decode_list(&buf, 0x1000, Some(3)).unwrap();
        assert_eq!(offsets, vec![0x1300, 0x1310, 0x1320]);
    }

    #[test]
    fn test_count_mismatch_is_tolerated() {
        let mut buf = vec![0u8; 0x1000];
        put_cell(&mut buf, 0x1000, &list_body(b"lf", &[0x20, 0x40], true));
        let offsets = decode_list(&buf, 0x1000, Some(5)).unwrap();
        assert_eq!(offsets.len(), 2);
    }

    #[test]
    fn test_declared_count_clamped_to_cell() {
        let mut buf = vec![0u8; 0x1000];
        let mut body = list_body(b"li", &[0x20], false);
        body[2..4].copy_from_slice(&500u16.to_le_bytes());
        put_cell(&mut buf, 0x1000, &body);
        // 16-byte cell: 8 bytes of entries after the list header.
        assert_eq!(decode_list(&buf, 0x1000, None).unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_signature() {
        let mut buf = vec![0u8; 0x1000];
        put_cell(&mut buf, 0x1000, &list_body(b"zz", &[0x20], false));
        assert!(matches!(
            decode_list(&buf, 0x1000, None),
            Err(RegistryError::UnknownListSignature { offset: 0x1000, .. })
        ));
    }

    #[test]
    fn test_self_referencing_index_root() {
        let mut buf = vec![0u8; 0x1000];
        put_cell(&mut buf, 0x1000, &list_body(b"ri", &[0x0], false));
        assert!(matches!(
            decode_list(&buf, 0x1000, None),
            Err(RegistryError::HiveTooDeep { limit: MAX_LIST_NESTING })
        ));
    }

    #[test]
    fn test_value_list_reads_declared_count() {
        let mut buf = vec![0u8; 0x1000];
        let body: Vec<u8> = [0x40u32, 0x80]
            .iter()
            .flat_map(|o| o.to_le_bytes())
            .collect();
        put_cell(&mut buf, 0x1000, &body);
        assert_eq!(
            decode_value_list(&buf, 0x1000, 2).unwrap(),
            vec![0x1040, 0x1080]
        );
        assert_eq!(decode_value_list(&buf, 0x1000, 1).unwrap(), vec![0x1040]);
    }

    #[test]
    fn test_segment_table_skips_size_slot() {
        let mut buf = vec![0u8; 0x1000];
        let body: Vec<u8> = [0x100u32, 0x200, 0x300]
            .iter()
            .flat_map(|o| o.to_le_bytes())
            .collect();
        put_cell(&mut buf, 0x1000, &body);
        assert_eq!(
            decode_segment_table(&buf, 0x1000, 3).unwrap(),
            vec![0x1100, 0x1200, 0x1300]
        );
    }
}
