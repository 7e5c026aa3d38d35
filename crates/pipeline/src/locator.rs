//! Binary Locator
//!
//! Resolves a tool's required executable against the `PATH` the
//! subprocesses will inherit.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Looks up executables on a search path.
#[derive(Debug, Clone)]
pub struct BinaryLocator {
    search_path: Option<OsString>,
}

impl Default for BinaryLocator {
    fn default() -> Self {
        Self::from_env()
    }
}

impl BinaryLocator {
    /// Use the current process `PATH`.
    pub fn from_env() -> Self {
        Self {
            search_path: std::env::var_os("PATH"),
        }
    }

    /// Use an explicit search path (colon-separated on unix).
    pub fn with_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }

    /// Full path of `binary`, if it resolves to an executable file.
    ///
    /// A name containing a path separator is checked as-is.
    pub fn find(&self, binary: &str) -> Option<PathBuf> {
        if binary.is_empty() {
            return None;
        }
        if binary.contains(std::path::MAIN_SEPARATOR) {
            let candidate = PathBuf::from(binary);
            return is_executable(&candidate).then_some(candidate);
        }

        let search_path = self.search_path.as_ref()?;
        std::env::split_paths(search_path)
            .flat_map(|dir| candidates(&dir, binary))
            .find(|candidate| is_executable(candidate))
    }

    pub fn exists(&self, binary: &str) -> bool {
        self.find(binary).is_some()
    }
}

#[cfg(windows)]
fn candidates(dir: &Path, binary: &str) -> Vec<PathBuf> {
    ["", ".exe", ".cmd", ".bat"]
        .iter()
        .map(|ext| dir.join(format!("{}{}", binary, ext)))
        .collect()
}

#[cfg(not(windows))]
fn candidates(dir: &Path, binary: &str) -> Vec<PathBuf> {
    vec![dir.join(binary)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
