//! Unit enable/mask operations
//!
//! Handles symlink creation for WantedBy=, RequiredBy=, Alias= and Also=, and
//! masking via a link to /dev/null. Every operation is idempotent: a link that
//! already points at the right place is left alone and not reported.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use super::{read_link, Manager, ManagerError, DEV_NULL};
use crate::units::{normalize_name, InstallSection, UnitFile, UnitState};

/// One filesystem change made while enabling or masking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitChange {
    /// New symlink
    Created { link: PathBuf, target: PathBuf },
    /// Existing symlink pointed somewhere else
    Replaced { link: PathBuf, target: PathBuf },
}

impl UnitChange {
    pub fn link(&self) -> &Path {
        match self {
            UnitChange::Created { link, .. } | UnitChange::Replaced { link, .. } => link,
        }
    }
}

impl fmt::Display for UnitChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitChange::Created { link, target } => {
                write!(f, "Created symlink {} → {}", link.display(), target.display())
            }
            UnitChange::Replaced { link, target } => {
                write!(f, "Replaced symlink {} → {}", link.display(), target.display())
            }
        }
    }
}

impl Manager {
    /// Enable a unit (create symlinks based on its [Install] section)
    pub async fn enable(&self, name: &str) -> Result<Vec<UnitChange>, ManagerError> {
        let requested = normalize_name(name);
        let mut changes = Vec::new();
        let mut to_enable = vec![requested.clone()];
        let mut seen: HashSet<String> = HashSet::new();

        while let Some(unit_name) = to_enable.pop() {
            if !seen.insert(unit_name.clone()) {
                continue;
            }

            let unit_path = match self.find_unit(&unit_name) {
                Ok(path) => path,
                Err(ManagerError::NotFound(_)) if unit_name != requested => {
                    log::warn!("Also= unit {} not found, skipping", unit_name);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let install = self.install_section(&unit_name, &unit_path).await?;
            if unit_name == requested && !install.has_links() && install.also.is_empty() {
                return Err(ManagerError::NoInstallSection(unit_name));
            }

            let target = self.in_root(&unit_path);

            for wanted in &install.wanted_by {
                let link = self.config_dir.join(format!("{}.wants", wanted)).join(&unit_name);
                changes.extend(self.ensure_link(&link, &target)?);
            }

            for required in &install.required_by {
                let link = self.config_dir.join(format!("{}.requires", required)).join(&unit_name);
                changes.extend(self.ensure_link(&link, &target)?);
            }

            for alias in &install.alias {
                let link = self.config_dir.join(alias);
                changes.extend(self.ensure_link(&link, &target)?);
            }

            to_enable.extend(install.also.iter().map(|also| normalize_name(also)));
        }

        Ok(changes)
    }

    /// Mask a unit (link it to /dev/null in the config directory)
    pub async fn mask(&self, name: &str) -> Result<Vec<UnitChange>, ManagerError> {
        let link = self.config_dir.join(normalize_name(name));
        Ok(self.ensure_link(&link, Path::new(DEV_NULL))?.into_iter().collect())
    }

    /// Enablement state from the links on disk.
    ///
    /// Never reports [`UnitState::Active`]; that needs the running init system.
    /// Units without install links report [`UnitState::Disabled`].
    pub async fn unit_state(&self, name: &str) -> Result<UnitState, ManagerError> {
        let name = normalize_name(name);

        let unit_path = match self.find_unit(&name) {
            Ok(path) => path,
            Err(ManagerError::Masked(_)) => return Ok(UnitState::Masked),
            Err(e) => return Err(e),
        };

        let install = self.install_section(&name, &unit_path).await?;

        let links = install
            .wanted_by
            .iter()
            .map(|t| self.config_dir.join(format!("{}.wants", t)).join(&name))
            .chain(
                install
                    .required_by
                    .iter()
                    .map(|t| self.config_dir.join(format!("{}.requires", t)).join(&name)),
            )
            .chain(install.alias.iter().map(|a| self.config_dir.join(a)));

        for link in links {
            if link.is_symlink() || link.exists() {
                return Ok(UnitState::Enabled);
            }
        }

        Ok(UnitState::Disabled)
    }

    async fn install_section(
        &self,
        name: &str,
        path: &Path,
    ) -> Result<InstallSection, ManagerError> {
        let file = UnitFile::load(path).await.map_err(|source| ManagerError::Parse {
            unit: name.to_string(),
            source,
        })?;
        Ok(InstallSection::from_file(&file))
    }

    /// Make `link` a symlink to `target`, reporting only real changes
    fn ensure_link(&self, link: &Path, target: &Path) -> Result<Option<UnitChange>, ManagerError> {
        let io_err = |source: std::io::Error| ManagerError::Io {
            path: link.to_path_buf(),
            source,
        };

        let replaced = if link.is_symlink() {
            if read_link(link)? == target {
                log::debug!("{} already points to {}", link.display(), target.display());
                return Ok(None);
            }
            std::fs::remove_file(link).map_err(io_err)?;
            true
        } else if link.exists() {
            return Err(ManagerError::LinkConflict(link.to_path_buf()));
        } else {
            false
        };

        if let Some(parent) = link.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::os::unix::fs::symlink(target, link).map_err(io_err)?;

        let (link, target) = (link.to_path_buf(), target.to_path_buf());
        Ok(Some(if replaced {
            UnitChange::Replaced { link, target }
        } else {
            UnitChange::Created { link, target }
        }))
    }
}
