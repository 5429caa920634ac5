//! Error types for hive decoding.
//!
//! Decode failures (`MalformedCell`, `UnknownListSignature`, ...) mean the hive
//! is corrupt or an offset was computed wrongly; they are never retried.
//! Resolution misses (`KeyNotFound`, `ValueNotFound`, `NoValues`) are routine
//! while sweeping many hives and are meant to be caught and skipped.

use std::io;
use thiserror::Error;

/// Result type alias for hive operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur while decoding a registry hive.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// I/O error outside of the hive byte source.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Cell header too short, or cell framing inconsistent with the buffer.
    #[error("Malformed cell at {offset:#x}: {reason}")]
    MalformedCell {
        /// Absolute buffer offset of the cell.
        offset: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// A biased offset points outside the hive buffer.
    #[error("Offset {offset:#x} (+{len} bytes) is outside the hive buffer ({hive_size:#x} bytes)")]
    OffsetOutOfBounds {
        /// Absolute buffer offset that was requested.
        offset: usize,
        /// Number of bytes requested at that offset.
        len: usize,
        /// Total buffer size.
        hive_size: usize,
    },

    /// A cell expected to be a named key carries another signature.
    #[error("Cell at {offset:#x} is not a valid named key (signature {found:?})")]
    NotANamedKey {
        /// Absolute buffer offset of the cell.
        offset: usize,
        /// Signature actually found.
        found: String,
    },

    /// A cell expected to be a value key carries another signature.
    #[error("Cell at {offset:#x} is not a valid value key (signature {found:?})")]
    NotAValueKey {
        /// Absolute buffer offset of the cell.
        offset: usize,
        /// Signature actually found.
        found: String,
    },

    /// An indirection block carries a signature no decoding rule exists for.
    #[error("Unknown list signature {signature:?} at {offset:#x}")]
    UnknownListSignature {
        /// Absolute buffer offset of the block.
        offset: usize,
        /// Hex rendering of the two signature bytes.
        signature: String,
    },

    /// A path component matched no subkey.
    #[error("Cannot find key '{component}' while resolving '{path}': it does not exist")]
    KeyNotFound {
        /// The component that failed to match.
        component: String,
        /// The full path being resolved.
        path: String,
    },

    /// No value with the requested name exists beneath the key.
    #[error("Cannot find value '{name}' as a value of '{key}': it does not exist")]
    ValueNotFound {
        /// Requested value name.
        name: String,
        /// Full path of the key that was searched.
        key: String,
    },

    /// Value enumeration was requested on a key declaring zero values.
    #[error("The key '{key}' has no associated values")]
    NoValues {
        /// Full path of the key.
        key: String,
    },

    /// The hive byte source could not produce the hive.
    #[error("Cannot read hive '{path}': {source}")]
    HiveUnreadable {
        /// Hive path handed to the source.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The base block is missing, truncated, or fails validation.
    #[error("Invalid hive header: {0}")]
    InvalidHiveHeader(String),

    /// A buffer-free overload could not re-acquire the hive bytes.
    #[error("Hive bytes for '{path}' are unavailable")]
    IoUnavailable {
        /// Hive path that was reloaded.
        path: String,
        /// Failure reported by the hive byte source.
        #[source]
        source: Box<RegistryError>,
    },

    /// Recursion bound tripped: nesting past the limit, or a key reached a
    /// second time through an offset cycle or a shared subkey list.
    #[error("Hive nesting exceeds the maximum depth of {limit}")]
    HiveTooDeep {
        /// Configured depth limit.
        limit: usize,
    },

    /// A UTF-16 name could not be decoded.
    #[error("Invalid UTF-16 string at {offset:#x}")]
    InvalidUtf16 {
        /// Absolute buffer offset of the owning cell.
        offset: usize,
    },
}

impl RegistryError {
    /// Creates a malformed cell error.
    pub fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedCell {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates an out-of-bounds error for a `len`-byte read at `offset`.
    pub fn out_of_bounds(offset: usize, len: usize, hive_size: usize) -> Self {
        Self::OffsetOutOfBounds {
            offset,
            len,
            hive_size,
        }
    }

    /// Creates an unknown list signature error.
    pub fn unknown_list(offset: usize, signature: [u8; 2]) -> Self {
        Self::UnknownListSignature {
            offset,
            signature: hex::encode(signature),
        }
    }

    /// Creates a key-not-found error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use reg_evidence::error::RegistryError;
    /// let err = RegistryError::key_not_found("DoesNotExist", "Software\\DoesNotExist");
    /// assert!(err.is_not_found());
    /// ```
    pub fn key_not_found(component: &str, path: &str) -> Self {
        Self::KeyNotFound {
            component: component.to_string(),
            path: path.to_string(),
        }
    }

    /// Creates a value-not-found error.
    pub fn value_not_found(name: &str, key: &str) -> Self {
        Self::ValueNotFound {
            name: name.to_string(),
            key: key.to_string(),
        }
    }

    /// Returns true for routine resolution misses that sweeps should skip.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::KeyNotFound { .. } | Self::ValueNotFound { .. } | Self::NoValues { .. }
        )
    }
}
