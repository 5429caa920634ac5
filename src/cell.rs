//! Cell header model and shared cell-level type definitions.
//!
//! Every cell starts with a 4-byte signed size (negative when allocated)
//! followed by a 2-byte ASCII signature identifying its variant.

use crate::error::{RegistryError, Result};
use crate::utils::{read_i32_le, slice_at};

/// Bytes occupied by the size field plus the signature.
pub const CELL_HEADER_SIZE: usize = 6;

/// Decoded cell header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CellHeader {
    /// Raw signed size field.
    pub size: i32,

    /// True when the cell is in use (size field negative).
    pub allocated: bool,

    /// Two-byte type signature.
    pub signature: [u8; 2],
}

impl CellHeader {
    /// Parses the header of the cell starting at absolute `offset`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedCell` if fewer than six bytes remain at `offset`.
    pub fn parse(buffer: &[u8], offset: usize) -> Result<Self> {
        let header = slice_at(buffer, offset, CELL_HEADER_SIZE).map_err(|_| {
            RegistryError::malformed(offset, "buffer too short for a cell header")
        })?;
        let size = read_i32_le(header, 0)?;

        Ok(CellHeader {
            size,
            allocated: size < 0,
            signature: [header[4], header[5]],
        })
    }

    /// Returns the cell length in bytes, including the size field.
    pub fn len(&self) -> usize {
        self.size.unsigned_abs() as usize
    }

    /// Returns true if the size field is zero.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the signature as a printable string.
    pub fn signature_str(&self) -> String {
        String::from_utf8_lossy(&self.signature).into_owned()
    }

    /// Returns true if the signature equals `sig`.
    pub fn is(&self, sig: &[u8; 2]) -> bool {
        &self.signature == sig
    }
}

/// Reads the cell at absolute `offset` and returns its header and body.
///
/// The body excludes the 4-byte size field and spans to the end of the cell
/// as declared by that field.
pub fn read_cell(buffer: &[u8], offset: usize) -> Result<(CellHeader, &[u8])> {
    let header = CellHeader::parse(buffer, offset)?;
    let len = header.len();

    if len < CELL_HEADER_SIZE {
        return Err(RegistryError::malformed(
            offset,
            format!("cell size {} is smaller than its header", header.size),
        ));
    }

    let body = slice_at(buffer, offset + 4, len - 4)?;
    Ok((header, body))
}

/// Cell type signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    /// Named key (nk).
    KeyNode,

    /// Value key (vk).
    ValueKey,

    /// Security key (sk).
    Security,

    /// Index leaf (li) - list of subkey offsets.
    IndexLeaf,

    /// Fast leaf (lf) - list of subkeys with name hints.
    FastLeaf,

    /// Hash leaf (lh) - list of subkeys with name hashes.
    HashLeaf,

    /// Index root (ri) - list of subkey list offsets.
    IndexRoot,

    /// Big data (db).
    BigData,
}

impl CellType {
    /// Parses a cell type from a 2-byte signature.
    ///
    /// Value lists, segment tables and raw data cells have no signature, so
    /// an unrecognized signature is not an error at this level.
    pub fn from_signature(sig: &[u8; 2]) -> Option<Self> {
        match sig {
            b"nk" => Some(CellType::KeyNode),
            b"vk" => Some(CellType::ValueKey),
            b"sk" => Some(CellType::Security),
            b"li" => Some(CellType::IndexLeaf),
            b"lf" => Some(CellType::FastLeaf),
            b"lh" => Some(CellType::HashLeaf),
            b"ri" => Some(CellType::IndexRoot),
            b"db" => Some(CellType::BigData),
            _ => None,
        }
    }

    /// Returns the 2-byte signature for this cell type.
    pub fn signature(&self) -> &'static [u8; 2] {
        match self {
            CellType::KeyNode => b"nk",
            CellType::ValueKey => b"vk",
            CellType::Security => b"sk",
            CellType::IndexLeaf => b"li",
            CellType::FastLeaf => b"lf",
            CellType::HashLeaf => b"lh",
            CellType::IndexRoot => b"ri",
            CellType::BigData => b"db",
        }
    }
}

/// Flags for named keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct KeyNodeFlags(pub u16);

impl KeyNodeFlags {
    /// Key is volatile (not stored on disk).
    pub const VOLATILE: u16 = 0x0001;

    /// Key is a mount point for another hive.
    pub const MOUNT_POINT: u16 = 0x0002;

    /// Key is the hive root.
    pub const ROOT_KEY: u16 = 0x0004;

    /// Key cannot be deleted.
    pub const IMMUTABLE: u16 = 0x0008;

    /// Key is a symbolic link.
    pub const SYMBOLIC_LINK: u16 = 0x0010;

    /// Key name is stored one byte per character.
    pub const ASCII_NAME: u16 = 0x0020;

    /// Key is a predefined handle.
    pub const PREDEFINED_HANDLE: u16 = 0x0040;

    /// Returns true if the specified flag is set.
    pub fn has_flag(&self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    /// Returns true if the key name is stored compressed.
    pub fn is_ascii_name(&self) -> bool {
        self.has_flag(Self::ASCII_NAME)
    }

    /// Returns true if this is a volatile key.
    pub fn is_volatile(&self) -> bool {
        self.has_flag(Self::VOLATILE)
    }

    /// Returns true if this is the hive root.
    pub fn is_root(&self) -> bool {
        self.has_flag(Self::ROOT_KEY)
    }

    /// Returns true if this key is a symbolic link.
    pub fn is_symbolic_link(&self) -> bool {
        self.has_flag(Self::SYMBOLIC_LINK)
    }
}

/// Registry value data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ValueType {
    /// REG_NONE.
    None,
    /// REG_SZ, UTF-16 string.
    String,
    /// REG_EXPAND_SZ, string with environment references.
    ExpandString,
    /// REG_BINARY.
    Binary,
    /// REG_DWORD, 32-bit little-endian.
    Dword,
    /// REG_DWORD_BIG_ENDIAN.
    DwordBigEndian,
    /// REG_LINK, symbolic link target.
    Link,
    /// REG_MULTI_SZ.
    MultiString,
    /// REG_RESOURCE_LIST.
    ResourceList,
    /// REG_FULL_RESOURCE_DESCRIPTOR.
    FullResourceDescriptor,
    /// REG_RESOURCE_REQUIREMENTS_LIST.
    ResourceRequirementsList,
    /// REG_QWORD, 64-bit little-endian.
    Qword,
    /// Non-standard type; carries the raw type value.
    Unknown(u32),
}

impl ValueType {
    /// Maps a raw type field to a value type. Never fails: any value outside
    /// 0-11 becomes `Unknown`.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => ValueType::None,
            1 => ValueType::String,
            2 => ValueType::ExpandString,
            3 => ValueType::Binary,
            4 => ValueType::Dword,
            5 => ValueType::DwordBigEndian,
            6 => ValueType::Link,
            7 => ValueType::MultiString,
            8 => ValueType::ResourceList,
            9 => ValueType::FullResourceDescriptor,
            10 => ValueType::ResourceRequirementsList,
            11 => ValueType::Qword,
            _ => ValueType::Unknown(value),
        }
    }

    /// Returns the `REG_*` name of this value type.
    pub fn name(&self) -> String {
        let name = match self {
            ValueType::None => "REG_NONE",
            ValueType::String => "REG_SZ",
            ValueType::ExpandString => "REG_EXPAND_SZ",
            ValueType::Binary => "REG_BINARY",
            ValueType::Dword => "REG_DWORD",
            ValueType::DwordBigEndian => "REG_DWORD_BIG_ENDIAN",
            ValueType::Link => "REG_LINK",
            ValueType::MultiString => "REG_MULTI_SZ",
            ValueType::ResourceList => "REG_RESOURCE_LIST",
            ValueType::FullResourceDescriptor => "REG_FULL_RESOURCE_DESCRIPTOR",
            ValueType::ResourceRequirementsList => "REG_RESOURCE_REQUIREMENTS_LIST",
            ValueType::Qword => "REG_QWORD",
            ValueType::Unknown(value) => return format!("REG_UNKNOWN_{:#010x}", value),
        };
        name.to_string()
    }
}
