//! Unit files and unit names
//!
//! The orchestrator never runs units itself; it only reads `[Install]` sections
//! and lays down the symlinks `systemctl enable`/`mask` would.

pub mod declared;
mod parser;

pub use parser::{ParseError, ParsedSection, UnitFile};

/// Unit suffixes recognised when normalizing names
const UNIT_SUFFIXES: &[&str] = &[
    ".service", ".socket", ".target", ".mount", ".automount", ".timer", ".path", ".slice",
    ".scope", ".device", ".swap",
];

/// State of a unit as seen by the init system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Disabled,
    Enabled,
    /// Running; only the init system itself can report this
    Active,
    Masked,
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnitState::Disabled => "disabled",
            UnitState::Enabled => "enabled",
            UnitState::Active => "active",
            UnitState::Masked => "masked",
        };
        f.write_str(s)
    }
}

/// [Install] section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSection {
    pub wanted_by: Vec<String>,
    pub required_by: Vec<String>,
    pub alias: Vec<String>,
    pub also: Vec<String>,
}

impl InstallSection {
    pub fn from_file(file: &UnitFile) -> Self {
        Self {
            wanted_by: file.values("Install", "WantedBy").to_vec(),
            required_by: file.values("Install", "RequiredBy").to_vec(),
            alias: file.values("Install", "Alias").to_vec(),
            also: file.values("Install", "Also").to_vec(),
        }
    }

    /// Whether enabling would create any symlink of its own
    pub fn has_links(&self) -> bool {
        !(self.wanted_by.is_empty() && self.required_by.is_empty() && self.alias.is_empty())
    }
}

/// Append `.service` to bare names, like systemctl does
pub fn normalize_name(name: &str) -> String {
    if UNIT_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        name.to_string()
    } else {
        format!("{}.service", name)
    }
}
