// ProtonTPR Device Locator
// Resolve the device node from an explicit path or a directory scan

use std::path::{Path, PathBuf};

use crate::error::{MirrorError, MirrorResult};

/// Directory scanned when no explicit path is given
pub const DEFAULT_SEARCH_DIR: &str = "/dev/input/by-id";

/// Substring the by-id entry of the rudder contains
pub const DEFAULT_SEARCH_PATTERN: &str = "usb-Thrustmaster_T-Pendular-Rudder-event-";

/// Entries of `dir` whose file name contains `pattern`, sorted.
///
/// A missing or unreadable directory yields no candidates.
pub fn candidates(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot scan {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().contains(pattern))
        .map(|entry| entry.path())
        .collect();
    found.sort();
    found
}

/// The single entry matching `pattern`.
///
/// No match is `NotFound`, more than one is `Ambiguous`.
pub fn find_by_pattern(dir: &Path, pattern: &str) -> MirrorResult<PathBuf> {
    let mut found = candidates(dir, pattern);
    match found.len() {
        0 => Err(MirrorError::NotFound {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
        }),
        1 => Ok(found.remove(0)),
        _ => Err(MirrorError::Ambiguous {
            pattern: pattern.to_string(),
            candidates: found,
        }),
    }
}

/// Where the device path comes from in the static modes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceLocator {
    /// Path given by the user, used as is
    Explicit(PathBuf),
    /// Single directory entry containing a pattern
    Pattern { dir: PathBuf, pattern: String },
}

impl Default for DeviceLocator {
    fn default() -> Self {
        DeviceLocator::Pattern {
            dir: PathBuf::from(DEFAULT_SEARCH_DIR),
            pattern: DEFAULT_SEARCH_PATTERN.to_string(),
        }
    }
}

impl DeviceLocator {
    /// Resolve to a device path.
    ///
    /// Explicit paths are not checked here; opening them reports problems.
    pub fn resolve(&self) -> MirrorResult<PathBuf> {
        match self {
            DeviceLocator::Explicit(path) => Ok(path.clone()),
            DeviceLocator::Pattern { dir, pattern } => {
                let path = find_by_pattern(dir, pattern)?;
                log::info!("Found device {}", path.display());
                Ok(path)
            }
        }
    }
}
