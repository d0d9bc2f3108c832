//! Name validity filter for watched entries.

use std::path::Path;

/// Extensions left behind by editors and tools that never hold real config.
const EXCLUDED_EXTENSIONS: &[&str] = &["swp", "swx", "tmp"];

/// Returns `false` for hidden names and editor or temporary artifacts.
///
/// Rejected: names starting with `.`, names ending with `~` (backups), and
/// names whose extension is one of `swp`, `swx` or `tmp`.
pub fn is_valid_file_name(name: &str) -> bool {
    if name.is_empty() || name.starts_with('.') || name.ends_with('~') {
        return false;
    }
    match Path::new(name).extension().and_then(|ext| ext.to_str()) {
        Some(ext) => !EXCLUDED_EXTENSIONS.contains(&ext),
        None => true,
    }
}

/// Applies [`is_valid_file_name`] to the base name of `path`.
pub fn is_valid_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(is_valid_file_name)
}
