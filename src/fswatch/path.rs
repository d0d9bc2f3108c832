//! Mapping between filesystem paths and config path keys.

use std::path::{Component, Path};

/// Config path key for `path`: its location relative to `root`, joined with `/`.
///
/// Returns `None` for the root itself, for paths outside the root and for
/// names that are not valid UTF-8.
pub fn config_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
