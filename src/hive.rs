//! Hive handle: one immutable buffer plus its base block.

use crate::error::Result;
use crate::hbin::{CellIterator, HbinIterator};
use crate::header::BaseBlock;
use crate::key::NamedKeyCell;
use crate::options::HiveOptions;
use crate::resolver::{descendants, resolve, resolve_value};
use crate::source::{FileSource, HiveBytes, HiveSource};
use crate::utils::{bias, names_match, path_label, HBIN_START_OFFSET};
use crate::value::{ValueContent, ValueKeyCell};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Locates and decodes the root key of the hive in `buffer`.
///
/// # Errors
///
/// Returns `InvalidHiveHeader` if `buffer` does not start with a `regf`
/// base block.
pub fn root_key(buffer: &[u8], hive_path: &str) -> Result<NamedKeyCell> {
    let base_block = BaseBlock::parse(buffer, false)?;
    NamedKeyCell::decode(buffer, bias(base_block.root_cell_offset)?, hive_path, "")
}

/// A registry hive loaded for decoding.
///
/// Holds the hive bytes once so that any number of traversals can run
/// against them. Every operation is a pure read; a `Hive` can be shared
/// between threads.
///
/// # Examples
///
/// ```no_run
/// use reg_evidence::Hive;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let hive = Hive::open(r"C:\Windows\System32\config\SOFTWARE")?;
/// let run = hive.key(r"Microsoft\Windows\CurrentVersion\Run")?;
/// for value in run.values(hive.data())? {
///     println!("{} = {}", value.name, value.data(hive.data())?);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Hive {
    data: HiveBytes,
    base_block: BaseBlock,
    path: String,
    options: HiveOptions,
}

impl Hive {
    /// Opens a hive file with default options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, HiveOptions::default())
    }

    /// Opens a hive file.
    #[instrument(skip(path, options), fields(path = %path.as_ref().display()))]
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: HiveOptions) -> Result<Self> {
        info!("Opening registry hive");
        let hive_path = path.as_ref().to_string_lossy().into_owned();
        Self::from_source(&FileSource, &hive_path, options)
    }

    /// Loads a hive through a byte source.
    pub fn from_source(source: &dyn HiveSource, hive_path: &str, options: HiveOptions) -> Result<Self> {
        let data = source.load(hive_path)?;
        Self::from_bytes(data, hive_path, options)
    }

    /// Creates a hive from owned bytes with default options.
    pub fn from_vec(data: Vec<u8>, hive_path: &str) -> Result<Self> {
        Self::from_bytes(data.into(), hive_path, HiveOptions::default())
    }

    /// Creates a hive from already loaded bytes.
    pub fn from_bytes(data: HiveBytes, hive_path: &str, options: HiveOptions) -> Result<Self> {
        let base_block = BaseBlock::parse(&data, options.verify_checksum)?;
        debug!(
            root = %format!("{:#x}", base_block.root_cell_offset),
            size = data.len(),
            "Parsed base block"
        );

        Ok(Self {
            data,
            base_block,
            path: hive_path.to_string(),
            options,
        })
    }

    /// Returns the hive bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the base block header.
    pub fn base_block(&self) -> &BaseBlock {
        &self.base_block
    }

    /// Returns the hive path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the drive label used in full paths (the hive file name).
    pub fn label(&self) -> &str {
        path_label(&self.path)
    }

    /// Returns the options this hive was opened with.
    pub fn options(&self) -> &HiveOptions {
        &self.options
    }

    /// Returns the root key.
    pub fn root_key(&self) -> Result<NamedKeyCell> {
        NamedKeyCell::decode(
            &self.data,
            bias(self.base_block.root_cell_offset)?,
            &self.path,
            "",
        )
    }

    /// Resolves a backslash-delimited key path from the root.
    pub fn key(&self, path: &str) -> Result<NamedKeyCell> {
        resolve(&self.data, &self.root_key()?, Some(path))
    }

    /// Returns the immediate subkeys of `path`, or of the root for `None`.
    pub fn sub_keys(&self, path: Option<&str>) -> Result<Vec<NamedKeyCell>> {
        resolve(&self.data, &self.root_key()?, path)?.sub_keys(&self.data)
    }

    /// Returns every key in the hive below the root, depth first.
    ///
    /// # Errors
    ///
    /// Returns `HiveTooDeep` when nesting exceeds the configured bound.
    #[instrument(skip(self), fields(hive = %self.path))]
    pub fn sub_keys_recursive(&self) -> Result<Vec<NamedKeyCell>> {
        descendants(&self.data, &self.root_key()?, self.options.max_depth)
    }

    /// Returns the values of the key at `path`, or of the root for `None`.
    pub fn values(&self, path: Option<&str>) -> Result<Vec<ValueKeyCell>> {
        resolve(&self.data, &self.root_key()?, path)?.values(&self.data)
    }

    /// Looks up one value by case-insensitive name.
    pub fn value(&self, path: Option<&str>, name: &str) -> Result<ValueKeyCell> {
        resolve_value(&self.data, &self.root_key()?, path, name)
    }

    /// Looks up one value and resolves its data.
    pub fn value_data(&self, path: Option<&str>, name: &str) -> Result<ValueContent> {
        self.value(path, name)?.data(&self.data)
    }

    /// Returns true if this hive is of `kind` (e.g. `"NTUSER.DAT"`).
    ///
    /// Matches the final component of the file name embedded in the base
    /// block, or of the hive path, ignoring case.
    pub fn is_kind(&self, kind: &str) -> bool {
        let embedded = path_label(&self.base_block.file_name);
        names_match(embedded, kind) || names_match(self.label(), kind)
    }

    /// Iterates over the bins of the hive.
    pub fn bins(&self) -> HbinIterator<'_> {
        HbinIterator::new(&self.data, self.bins_end())
    }

    /// Iterates over every cell of the hive, allocated or not.
    pub fn cells(&self) -> CellIterator<'_> {
        CellIterator::new(&self.data, self.bins_end())
    }

    /// Decodes every unallocated `nk` cell still present in the hive.
    ///
    /// Deleted keys have no trustworthy ancestry, so each full path is just
    /// the key's own name. Cells that no longer decode are skipped.
    pub fn deleted_keys(&self) -> Vec<NamedKeyCell> {
        self.cells()
            .filter(|cell| !cell.header.allocated && cell.header.is(b"nk"))
            .filter_map(|cell| {
                match NamedKeyCell::decode(&self.data, cell.offset, &self.path, "") {
                    Ok(key) => Some(key),
                    Err(e) => {
                        debug!(
                            offset = %format!("{:#x}", cell.offset),
                            error = %e,
                            "Skipping unrecoverable deleted key"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    fn bins_end(&self) -> usize {
        match self.base_block.hive_length {
            0 => self.data.len(),
            len => HBIN_START_OFFSET.saturating_add(len as usize),
        }
    }
}
