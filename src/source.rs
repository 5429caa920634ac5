//! Hive byte sources.
//!
//! The engine never performs I/O while decoding. A [`HiveSource`] produces
//! the complete, immutable bytes of a hive once; callers keep the result
//! (usually inside a [`crate::Hive`]) for every traversal that follows.

use crate::error::{RegistryError, Result};
use crate::header::BASE_BLOCK_SIZE;
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Immutable hive bytes, either memory-mapped or owned.
///
/// Cloning is cheap; all clones share one buffer.
#[derive(Clone)]
pub struct HiveBytes(Storage);

#[derive(Clone)]
enum Storage {
    Mapped(Arc<Mmap>),
    Owned(Arc<[u8]>),
}

impl HiveBytes {
    /// Returns the hive bytes.
    pub fn as_slice(&self) -> &[u8] {
        match &self.0 {
            Storage::Mapped(mmap) => mmap,
            Storage::Owned(data) => data,
        }
    }
}

impl Deref for HiveBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Vec<u8>> for HiveBytes {
    fn from(data: Vec<u8>) -> Self {
        HiveBytes(Storage::Owned(data.into()))
    }
}

impl From<Mmap> for HiveBytes {
    fn from(mmap: Mmap) -> Self {
        HiveBytes(Storage::Mapped(Arc::new(mmap)))
    }
}

impl std::fmt::Debug for HiveBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.0 {
            Storage::Mapped(_) => "mapped",
            Storage::Owned(_) => "owned",
        };
        write!(f, "HiveBytes({}, {} bytes)", kind, self.len())
    }
}

/// Produces the bytes of a hive from a hive path.
///
/// Implementations must be idempotent and free of side effects visible to
/// the engine. Failures are reported as `HiveUnreadable`.
pub trait HiveSource {
    /// Loads the complete hive at `hive_path`.
    fn load(&self, hive_path: &str) -> Result<HiveBytes>;
}

/// Reads hives from the file system through a read-only memory map.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSource;

impl HiveSource for FileSource {
    #[instrument(skip(self))]
    fn load(&self, hive_path: &str) -> Result<HiveBytes> {
        let unreadable = |source: io::Error| RegistryError::HiveUnreadable {
            path: hive_path.to_string(),
            source,
        };

        let file = File::open(hive_path).map_err(unreadable)?;
        let file_size = file.metadata().map_err(unreadable)?.len() as usize;

        if file_size < BASE_BLOCK_SIZE {
            return Err(RegistryError::InvalidHiveHeader(format!(
                "'{}' is {} bytes, smaller than the {} byte base block",
                hive_path, file_size, BASE_BLOCK_SIZE
            )));
        }

        // SAFETY: The file is opened read-only and only ever read through the
        // mapping. Every access is bounds-checked against the mapping length,
        // which was validated above. The Mmap is owned by the returned bytes,
        // so the mapping outlives every slice handed out from it.
        let mmap = unsafe { Mmap::map(&file) }.map_err(unreadable)?;
        debug!(size = mmap.len(), "Memory mapped hive file");

        Ok(HiveBytes::from(mmap))
    }
}

/// Serves hives already held in memory, keyed by hive path.
///
/// Useful for hives copied off a raw volume by an outer layer.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    hives: HashMap<String, HiveBytes>,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the bytes served for `hive_path`.
    pub fn insert(&mut self, hive_path: impl Into<String>, data: impl Into<HiveBytes>) {
        self.hives.insert(hive_path.into(), data.into());
    }
}

impl HiveSource for MemorySource {
    fn load(&self, hive_path: &str) -> Result<HiveBytes> {
        self.hives
            .get(hive_path)
            .cloned()
            .ok_or_else(|| RegistryError::HiveUnreadable {
                path: hive_path.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "hive not registered"),
            })
    }
}
