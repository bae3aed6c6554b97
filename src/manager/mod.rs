//! Unit file store
//!
//! Locates unit files below a root directory and edits the system
//! configuration directory in place, like `systemctl --root=<dir>` does.
//! Symlink targets are written as absolute paths inside the root.

mod enable;

pub use enable::UnitChange;

use std::io;
use std::path::{Path, PathBuf};

use crate::units::ParseError;

/// Where `systemctl enable` puts its symlinks
pub const CONFIG_DIR: &str = "etc/systemd/system";

/// Searched in order after the config directory
const VENDOR_DIRS: &[&str] = &["run/systemd/system", "lib/systemd/system", "usr/lib/systemd/system"];

/// Mask target
pub const DEV_NULL: &str = "/dev/null";

/// Unit store rooted at a directory (`/` on a live system)
#[derive(Debug, Clone)]
pub struct Manager {
    root: PathBuf,
    config_dir: PathBuf,
    unit_paths: Vec<PathBuf>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    pub fn new() -> Self {
        Self::with_root("/")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let config_dir = root.join(CONFIG_DIR);
        let mut unit_paths = vec![config_dir.clone()];
        unit_paths.extend(VENDOR_DIRS.iter().map(|dir| root.join(dir)));

        Self {
            root,
            config_dir,
            unit_paths,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Find the unit file for `name`, skipping masks.
    ///
    /// Returns the host path of the file.
    fn find_unit(&self, name: &str) -> Result<PathBuf, ManagerError> {
        for base in &self.unit_paths {
            let path = base.join(name);

            if path.is_symlink() {
                let target = read_link(&path)?;
                if target == Path::new(DEV_NULL) {
                    return Err(ManagerError::Masked(name.to_string()));
                }
                let resolved = self.host_path(&target);
                if resolved.is_file() {
                    return Ok(resolved);
                }
                continue;
            }

            if path.is_file() {
                return Ok(path);
            }
        }

        Err(ManagerError::NotFound(name.to_string()))
    }

    /// Path as seen from inside the root (what goes into a symlink)
    fn in_root(&self, host: &Path) -> PathBuf {
        match host.strip_prefix(&self.root) {
            Ok(rel) => Path::new("/").join(rel),
            Err(_) => host.to_path_buf(),
        }
    }

    /// Path inside the root translated to a host path
    fn host_path(&self, in_root: &Path) -> PathBuf {
        if in_root.is_absolute() {
            let rel = in_root.strip_prefix("/").unwrap_or(in_root);
            self.root.join(rel)
        } else {
            self.config_dir.join(in_root)
        }
    }
}

fn read_link(path: &Path) -> Result<PathBuf, ManagerError> {
    std::fs::read_link(path).map_err(|source| ManagerError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Unit not found: {0}")]
    NotFound(String),

    #[error("Unit is masked: {0}")]
    Masked(String),

    #[error("Unit has no installable [Install] section: {0}")]
    NoInstallSection(String),

    #[error("{} exists and is not a symlink", .0.display())]
    LinkConflict(PathBuf),

    #[error("Failed to parse unit {unit}: {source}")]
    Parse {
        unit: String,
        #[source]
        source: ParseError,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
