//! Path resolution and recursive enumeration.
//!
//! Paths are backslash-delimited and resolved from the hive root one named
//! key at a time, case-insensitively, failing on the first component that
//! matches nothing.

use crate::error::{RegistryError, Result};
use crate::key::NamedKeyCell;
use crate::utils::names_match;
use crate::value::ValueKeyCell;
use std::collections::HashSet;
use tracing::{debug, instrument, warn};

/// Resolves `path` beneath `root`.
///
/// Empty components (leading, trailing or doubled separators) are ignored,
/// so `None`, `""` and `"\\"` all resolve to `root` itself. Each component
/// must equal a subkey name exactly, ignoring case; there is no prefix
/// matching. When several siblings match, the last in list order wins.
///
/// # Errors
///
/// Returns `KeyNotFound` naming the first component that matched nothing.
#[instrument(skip(buffer, root), fields(root = %root.full_path))]
pub fn resolve(buffer: &[u8], root: &NamedKeyCell, path: Option<&str>) -> Result<NamedKeyCell> {
    let Some(path) = path else {
        return Ok(root.clone());
    };

    let mut current = root.clone();
    for component in path.split('\\').filter(|c| !c.is_empty()) {
        let matched = current
            .sub_keys(buffer)?
            .into_iter()
            .filter(|child| names_match(&child.name, component))
            .last();

        match matched {
            Some(child) => current = child,
            None => {
                debug!(component, "Path component not found");
                return Err(RegistryError::key_not_found(component, path));
            }
        }
    }

    Ok(current)
}

/// Resolves `key_path` beneath `root` and looks up the value `name` there.
pub fn resolve_value(
    buffer: &[u8],
    root: &NamedKeyCell,
    key_path: Option<&str>,
    name: &str,
) -> Result<ValueKeyCell> {
    resolve(buffer, root, key_path)?.value(buffer, name)
}

/// Returns every key beneath `key`, depth first, each key followed by its
/// own descendants.
///
/// Each key's subkey list is expanded at most once, so the output is bounded
/// by the number of list entries in the hive.
///
/// # Errors
///
/// Returns `HiveTooDeep` when nesting exceeds `max_depth`, or when a key
/// with subkeys is reached a second time. Both only happen in corrupt hives,
/// through an offset cycle or a subkey list shared between keys.
pub fn descendants(buffer: &[u8], key: &NamedKeyCell, max_depth: usize) -> Result<Vec<NamedKeyCell>> {
    let mut walk = Walk {
        buffer,
        max_depth,
        expanded: HashSet::new(),
    };
    let mut out = Vec::new();
    walk.collect(key, 0, &mut out)?;
    Ok(out)
}

struct Walk<'a> {
    buffer: &'a [u8],
    max_depth: usize,
    expanded: HashSet<usize>,
}

impl Walk<'_> {
    fn collect(&mut self, key: &NamedKeyCell, depth: usize, out: &mut Vec<NamedKeyCell>) -> Result<()> {
        if depth >= self.max_depth {
            return Err(RegistryError::HiveTooDeep { limit: self.max_depth });
        }

        if !self.expanded.insert(key.offset) {
            warn!(
                key = %key.full_path,
                offset = %format!("{:#x}", key.offset),
                "Key reached twice during recursive enumeration"
            );
            return Err(RegistryError::HiveTooDeep { limit: self.max_depth });
        }

        for sub in key.sub_keys(self.buffer)? {
            let mut nested = Vec::new();
            if sub.has_subkeys() {
                self.collect(&sub, depth + 1, &mut nested)?;
            }
            out.push(sub);
            out.append(&mut nested);
        }

        Ok(())
    }
}
