//! # Windows Registry Hive Decoding Engine
//!
//! Read-only decoding of offline Windows registry hives for evidence
//! collection: named keys, values and their data, recovered straight from
//! the hive's cell structure.
//!
//! ## Features
//!
//! - **Zero-copy input**: hives are memory-mapped once and shared between traversals
//! - **Forensic tolerance**: count mismatches and truncated lists are logged, not fatal
//! - **Case-insensitive resolution**: `software\microsoft` finds `Software\Microsoft`
//! - **Big data support**: values split across `db` segments are reassembled
//! - **Deleted key recovery**: unallocated `nk` cells are found by scanning bins
//!
//! ## Binary Layout
//!
//! ```text
//! [Base Block - 4KB]
//!   - Signature: "regf"
//!   - Root cell offset, hive length, embedded file name
//!   - Checksum
//!
//! [Hive Bins - 4KB aligned]
//!   [Hbin Header - 32 bytes]
//!   [Cells]
//!     [Size - 4 bytes, negative if allocated]
//!     [Signature - 2 bytes: nk, vk, lf, lh, li, ri, db, sk]
//!     [Body]
//! ```
//!
//! Every offset stored inside the hive is relative to the first bin, which
//! starts 0x1000 bytes into the file.
//!
//! ## Example
//!
//! ```no_run
//! use reg_evidence::Hive;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hive = Hive::open(r"C:\Windows\System32\config\SOFTWARE")?;
//!
//! for key in hive.sub_keys(Some(r"Microsoft\Windows\CurrentVersion"))? {
//!     match key.values(hive.data()) {
//!         Ok(values) => println!("{} has {} values", key.full_path, values.len()),
//!         Err(e) if e.is_not_found() => continue,
//!         Err(e) => return Err(e.into()),
//!     }
//! }
//!
//! let data = hive.value_data(Some(r"Microsoft\Windows NT\CurrentVersion"), "ProductName")?;
//! println!("{}", data);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bigdata;
pub mod cell;
pub mod error;
pub mod hbin;
pub mod header;
pub mod hive;
pub mod key;
pub mod list;
pub mod options;
pub mod resolver;
pub mod security;
pub mod source;
pub mod utils;
pub mod value;

pub use cell::{CellHeader, CellType, KeyNodeFlags, ValueType};
pub use error::{RegistryError, Result};
pub use hbin::{CellIterator, HbinHeader, HbinIterator, ScannedCell};
pub use header::BaseBlock;
pub use hive::Hive;
pub use key::{NamedKeyCell, ROOT_MARKER};
pub use options::HiveOptions;
pub use security::SecurityKey;
pub use source::{FileSource, HiveBytes, HiveSource, MemorySource};
pub use value::{ValueContent, ValueKeyCell};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
