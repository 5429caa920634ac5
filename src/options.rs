//! Decoding options.

/// Default bound on key nesting during recursive enumeration.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Options controlling how a [`crate::Hive`] is opened and walked.
///
/// # Examples
///
/// ```rust
/// use reg_evidence::HiveOptions;
///
/// let options = HiveOptions::default()
///     .with_max_depth(128)
///     .with_checksum_verification(true);
/// assert_eq!(options.max_depth, 128);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HiveOptions {
    /// Maximum key nesting followed by recursive enumeration before failing
    /// with `HiveTooDeep`.
    pub max_depth: usize,

    /// Reject hives whose base block checksum does not match.
    pub verify_checksum: bool,
}

impl Default for HiveOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            verify_checksum: false,
        }
    }
}

impl HiveOptions {
    /// Sets the recursion bound.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets whether a checksum mismatch is fatal.
    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }
}
