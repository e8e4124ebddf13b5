//! Utility functions

pub mod binary;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Append `suffix` to a file prefix (`out/sample` + `.txt` → `out/sample.txt`).
pub fn prefixed_path(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Whether the directory component of a file prefix exists.
///
/// A bare prefix (`sample`) refers to the working directory and always passes.
pub fn dir_of_prefix_exists(prefix: &Path) -> bool {
    match prefix.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.is_dir(),
        _ => true,
    }
}
