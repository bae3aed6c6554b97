//! INI-style unit file reader
//!
//! Only what enabling needs: section/key lookup with systemd's list rules.
//! Keys are case-sensitive in systemd but matched case-insensitively here.

use std::collections::HashMap;
use std::path::Path;

/// Values for each key of one section, in file order
pub type ParsedSection = HashMap<String, Vec<String>>;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {0}: expected `Key=Value`")]
    Malformed(usize),

    #[error("line {0}: setting outside of a section")]
    NoSection(usize),
}

/// Keys whose values are whitespace-separated unit lists
const LIST_KEYS: &[&str] = &["WANTEDBY", "REQUIREDBY", "ALSO", "ALIAS", "WANTS", "REQUIRES", "AFTER", "BEFORE"];

/// A unit file split into `[Section]` → key → values
#[derive(Debug, Default, Clone)]
pub struct UnitFile {
    sections: HashMap<String, ParsedSection>,
}

impl UnitFile {
    pub fn parse(content: &str) -> Result<Self, ParseError> {
        let mut file = UnitFile::default();
        let mut current: Option<String> = None;

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                // Repeated sections are merged, as systemd does
                file.sections.entry(line.to_string()).or_default();
                current = Some(line.to_string());
                continue;
            }

            let (key, value) = line.split_once('=').ok_or(ParseError::Malformed(idx + 1))?;
            let section = current
                .as_ref()
                .and_then(|name| file.sections.get_mut(name))
                .ok_or(ParseError::NoSection(idx + 1))?;

            let key = key.trim().to_uppercase();
            let value = value.trim();
            let entry = section.entry(key.clone()).or_default();

            // An empty assignment resets the list
            if value.is_empty() {
                entry.clear();
                continue;
            }

            if LIST_KEYS.contains(&key.as_str()) {
                entry.extend(value.split_whitespace().map(str::to_string));
            } else {
                entry.push(value.to_string());
            }
        }

        Ok(file)
    }

    pub async fn load(path: &Path) -> Result<Self, ParseError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    pub fn section(&self, name: &str) -> Option<&ParsedSection> {
        self.sections.get(&format!("[{}]", name))
    }

    /// All values of `key` in `section` (empty if missing)
    pub fn values(&self, section: &str, key: &str) -> &[String] {
        self.section(section)
            .and_then(|s| s.get(&key.to_uppercase()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
