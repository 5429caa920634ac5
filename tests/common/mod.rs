//! Synthetic hive builder shared by the integration tests and benchmarks.
//!
//! Cells are appended to a single hive bin and addressed by their relative
//! (unbiased) offsets, exactly as the hive itself stores them.

#![allow(dead_code)]

use reg_evidence::utils::calculate_checksum;
use reg_evidence::{KeyNodeFlags, ValueType, ROOT_MARKER};

pub const BASE_BLOCK_SIZE: usize = 0x1000;
pub const BIN_HEADER_SIZE: usize = 0x20;
pub const PAGE: usize = 0x1000;

/// Builds a hive bottom-up: children before parents, data before values.
pub struct HiveBuilder {
    data: Vec<u8>,
    root: u32,
    file_name: String,
}

impl Default for HiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HiveBuilder {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; BASE_BLOCK_SIZE + BIN_HEADER_SIZE],
            root: 0,
            file_name: String::new(),
        }
    }

    /// Sets the file name embedded in the base block.
    pub fn file_name(&mut self, name: &str) -> &mut Self {
        self.file_name = name.to_string();
        self
    }

    /// Appends an allocated cell and returns its relative offset.
    pub fn cell(&mut self, body: &[u8]) -> u32 {
        self.push_cell(body, true)
    }

    /// Appends an unallocated cell and returns its relative offset.
    pub fn free_cell(&mut self, body: &[u8]) -> u32 {
        self.push_cell(body, false)
    }

    fn push_cell(&mut self, body: &[u8], allocated: bool) -> u32 {
        let size = (4 + body.len() + 7) & !7;
        let abs = self.data.len();
        let raw = if allocated { -(size as i32) } else { size as i32 };

        self.data.extend_from_slice(&raw.to_le_bytes());
        self.data.extend_from_slice(body);
        self.data.resize(abs + size, 0);
        (abs - BASE_BLOCK_SIZE) as u32
    }

    /// Overwrites a u32 inside the body of the cell at relative `cell`.
    pub fn patch_u32(&mut self, cell: u32, body_offset: usize, value: u32) {
        let at = BASE_BLOCK_SIZE + cell as usize + 4 + body_offset;
        self.data[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Appends an `lf`, `lh`, `li` or `ri` block.
    pub fn list(&mut self, signature: &[u8; 2], entries: &[u32]) -> u32 {
        let hinted = matches!(signature, b"lf" | b"lh");
        let mut body = signature.to_vec();
        body.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for entry in entries {
            body.extend_from_slice(&entry.to_le_bytes());
            if hinted {
                body.extend_from_slice(&0u32.to_le_bytes());
            }
        }
        self.cell(&body)
    }

    /// Appends a bare value list.
    pub fn value_list(&mut self, entries: &[u32]) -> u32 {
        let body: Vec<u8> = entries.iter().flat_map(|e| e.to_le_bytes()).collect();
        self.cell(&body)
    }

    /// Builds a named key body with explicit counts and list offsets.
    pub fn nk_body(
        name: &[u8],
        flags: u16,
        subkeys: (u32, u32),
        values: (u32, u32),
        security: u32,
    ) -> Vec<u8> {
        let mut body = vec![0u8; 0x4C];
        body[0..2].copy_from_slice(b"nk");
        body[0x02..0x04].copy_from_slice(&flags.to_le_bytes());
        body[0x04..0x0C].copy_from_slice(&0x01D9_0000_0000_0000u64.to_le_bytes());
        body[0x14..0x18].copy_from_slice(&subkeys.0.to_le_bytes());
        body[0x1C..0x20].copy_from_slice(&subkeys.1.to_le_bytes());
        body[0x20..0x24].copy_from_slice(&u32::MAX.to_le_bytes());
        body[0x24..0x28].copy_from_slice(&values.0.to_le_bytes());
        body[0x28..0x2C].copy_from_slice(&values.1.to_le_bytes());
        body[0x2C..0x30].copy_from_slice(&security.to_le_bytes());
        body[0x30..0x34].copy_from_slice(&u32::MAX.to_le_bytes());
        body[0x48..0x4A].copy_from_slice(&(name.len() as u16).to_le_bytes());
        body.extend_from_slice(name);
        body
    }

    /// Appends an ASCII-named key whose subkeys sit behind an `lf` list.
    pub fn key(&mut self, name: &str, subkeys: &[u32], values: &[u32]) -> u32 {
        self.key_with_list(name, b"lf", subkeys, values)
    }

    /// Like [`HiveBuilder::key`] with a chosen subkey list encoding.
    pub fn key_with_list(
        &mut self,
        name: &str,
        signature: &[u8; 2],
        subkeys: &[u32],
        values: &[u32],
    ) -> u32 {
        let subkey_list = if subkeys.is_empty() {
            u32::MAX
        } else {
            self.list(signature, subkeys)
        };
        let value_list = if values.is_empty() {
            u32::MAX
        } else {
            self.value_list(values)
        };
        let body = Self::nk_body(
            name.as_bytes(),
            KeyNodeFlags::ASCII_NAME,
            (subkeys.len() as u32, subkey_list),
            (values.len() as u32, value_list),
            u32::MAX,
        );
        self.cell(&body)
    }

    /// Appends a key whose name is stored as UTF-16LE.
    pub fn utf16_key(&mut self, name: &str) -> u32 {
        let encoded: Vec<u8> = name.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        let body = Self::nk_body(&encoded, 0, (0, u32::MAX), (0, u32::MAX), u32::MAX);
        self.cell(&body)
    }

    /// Appends the root key (named with the hive-creation marker) and makes
    /// it the hive's root.
    pub fn root(&mut self, subkeys: &[u32], values: &[u32]) -> u32 {
        let root = self.key(ROOT_MARKER, subkeys, values);
        self.patch_u16(root, 0x02, KeyNodeFlags::ASCII_NAME | KeyNodeFlags::ROOT_KEY);
        self.root = root;
        root
    }

    /// Points the base block at an arbitrary root cell.
    pub fn set_root(&mut self, root: u32) {
        self.root = root;
    }

    fn patch_u16(&mut self, cell: u32, body_offset: usize, value: u16) {
        let at = BASE_BLOCK_SIZE + cell as usize + 4 + body_offset;
        self.data[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Appends a value key cell.
    pub fn vk(&mut self, name: &str, value_type: u32, raw_length: u32, data_offset: u32) -> u32 {
        let mut body = vec![0u8; 0x14];
        body[0..2].copy_from_slice(b"vk");
        body[0x02..0x04].copy_from_slice(&(name.len() as u16).to_le_bytes());
        body[0x04..0x08].copy_from_slice(&raw_length.to_le_bytes());
        body[0x08..0x0C].copy_from_slice(&data_offset.to_le_bytes());
        body[0x0C..0x10].copy_from_slice(&value_type.to_le_bytes());
        body[0x10..0x12].copy_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(name.as_bytes());
        self.cell(&body)
    }

    /// Appends a non-resident value with its data cell.
    pub fn value(&mut self, name: &str, value_type: ValueType, data: &[u8]) -> u32 {
        let cell = self.cell(data);
        self.vk(name, raw_type(value_type), data.len() as u32, cell)
    }

    /// Appends a `REG_SZ` value holding `text` plus its terminating null.
    pub fn string_value(&mut self, name: &str, text: &str) -> u32 {
        let mut data: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        data.extend_from_slice(&[0, 0]);
        self.value(name, ValueType::String, &data)
    }

    /// Appends a resident `REG_DWORD` value.
    pub fn dword_value(&mut self, name: &str, value: u32) -> u32 {
        self.vk(name, 4, 0x8000_0004, value)
    }

    /// Appends a big-data value split across `segments`.
    ///
    /// Each segment cell carries its payload plus four trailing bytes, so
    /// payloads must be multiples of 8 bytes to avoid padding.
    pub fn big_value(&mut self, name: &str, segments: &[&[u8]]) -> u32 {
        let mut offsets = Vec::new();
        let mut total = 0u32;
        for segment in segments {
            assert_eq!(segment.len() % 8, 0, "segment payloads must be 8-byte multiples");
            let mut body = segment.to_vec();
            body.extend_from_slice(&[0xEE; 4]);
            offsets.push(self.cell(&body));
            total += segment.len() as u32;
        }

        let table = self.value_list(&offsets);

        let mut db = b"db".to_vec();
        db.extend_from_slice(&(segments.len() as u16).to_le_bytes());
        db.extend_from_slice(&table.to_le_bytes());
        let db = self.cell(&db);

        self.vk(name, 3, total, db)
    }

    /// Appends a security key cell.
    pub fn sk(&mut self, descriptor: &[u8]) -> u32 {
        let mut body = vec![0u8; 0x14];
        body[0..2].copy_from_slice(b"sk");
        body[0x0C..0x10].copy_from_slice(&1u32.to_le_bytes());
        body[0x10..0x14].copy_from_slice(&(descriptor.len() as u32).to_le_bytes());
        body.extend_from_slice(descriptor);
        self.cell(&body)
    }

    /// Lays out the bin and base block around the cells.
    pub fn build(&self) -> Vec<u8> {
        let mut data = self.data.clone();

        let bins_len = (data.len() - BASE_BLOCK_SIZE + 8 + PAGE - 1) / PAGE * PAGE;
        let free = BASE_BLOCK_SIZE + bins_len - data.len();
        let tail = data.len();
        data.resize(BASE_BLOCK_SIZE + bins_len, 0);
        data[tail..tail + 4].copy_from_slice(&(free as i32).to_le_bytes());

        let bin = BASE_BLOCK_SIZE;
        data[bin..bin + 4].copy_from_slice(b"hbin");
        data[bin + 8..bin + 12].copy_from_slice(&(bins_len as u32).to_le_bytes());

        data[0..4].copy_from_slice(b"regf");
        data[0x04..0x08].copy_from_slice(&1u32.to_le_bytes());
        data[0x08..0x0C].copy_from_slice(&1u32.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&1u32.to_le_bytes());
        data[0x18..0x1C].copy_from_slice(&5u32.to_le_bytes());
        data[0x24..0x28].copy_from_slice(&self.root.to_le_bytes());
        data[0x28..0x2C].copy_from_slice(&(bins_len as u32).to_le_bytes());
        for (i, unit) in self.file_name.encode_utf16().take(32).enumerate() {
            data[0x30 + i * 2..0x32 + i * 2].copy_from_slice(&unit.to_le_bytes());
        }
        let checksum = calculate_checksum(&data);
        data[0x1FC..0x200].copy_from_slice(&checksum.to_le_bytes());

        data
    }
}

fn raw_type(value_type: ValueType) -> u32 {
    match value_type {
        ValueType::None => 0,
        ValueType::String => 1,
        ValueType::ExpandString => 2,
        ValueType::Binary => 3,
        ValueType::Dword => 4,
        ValueType::DwordBigEndian => 5,
        ValueType::Link => 6,
        ValueType::MultiString => 7,
        ValueType::ResourceList => 8,
        ValueType::FullResourceDescriptor => 9,
        ValueType::ResourceRequirementsList => 10,
        ValueType::Qword => 11,
        ValueType::Unknown(raw) => raw,
    }
}

/// Hive path used by most tests; its label is `SOFTWARE`.
pub const SOFTWARE_PATH: &str = r"C:\Windows\System32\config\SOFTWARE";

/// A small SOFTWARE-like hive:
///
/// ```text
/// SOFTWARE:
///   Microsoft
///     Windows
///       CurrentVersion   ProgramFilesDir (REG_SZ), Version (REG_DWORD)
///     Windows NT         (no values)
///   Policies             (no subkeys, no values)
/// ```
pub fn software_hive() -> Vec<u8> {
    let mut b = HiveBuilder::new();
    b.file_name(r"\SystemRoot\System32\Config\SOFTWARE");

    let dir = b.string_value("ProgramFilesDir", r"C:\Program Files");
    let version = b.dword_value("Version", 0x0A00);
    let current = b.key("CurrentVersion", &[], &[dir, version]);
    let windows = b.key("Windows", &[current], &[]);
    let nt = b.key("Windows NT", &[], &[]);
    let microsoft = b.key("Microsoft", &[windows, nt], &[]);
    let policies = b.key("Policies", &[], &[]);
    b.root(&[microsoft, policies], &[]);

    b.build()
}
