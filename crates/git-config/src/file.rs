//! Single config file representation with formatting preservation.

use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice};

use crate::error::ConfigError;
use crate::parse::{self, ConfigEvent};
use crate::{ConfigEntry, ConfigKey, ConfigScope};

/// A parsed config file that preserves original formatting.
pub struct ConfigFile {
    /// Original file path.
    path: Option<PathBuf>,
    /// Scope of this file.
    scope: ConfigScope,
    /// Raw events preserving formatting.
    events: Vec<ConfigEvent>,
}

impl ConfigFile {
    /// Parse a config file from bytes.
    pub fn parse(
        content: &[u8],
        path: Option<&Path>,
        scope: ConfigScope,
    ) -> Result<Self, ConfigError> {
        let filename = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string());
        let events = parse::parse_config(content, &filename)?;

        Ok(ConfigFile {
            path: path.map(|p| p.to_path_buf()),
            scope,
            events,
        })
    }

    /// Load and parse a config file from disk.
    pub fn load(path: &Path, scope: ConfigScope) -> Result<Self, ConfigError> {
        let content = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.to_path_buf())
            } else {
                ConfigError::Io(e)
            }
        })?;
        Self::parse(&content, Some(path), scope)
    }

    /// Get the file path.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get the scope.
    pub fn scope(&self) -> ConfigScope {
        self.scope
    }

    /// Get all entries as ConfigEntry values.
    pub fn entries(&self) -> Vec<ConfigEntry> {
        let mut entries = Vec::new();
        let mut current_section = BString::new(Vec::new());
        let mut current_subsection: Option<BString> = None;

        for event in &self.events {
            match event {
                ConfigEvent::SectionHeader {
                    section,
                    subsection,
                    ..
                } => {
                    current_section = section.clone();
                    current_subsection = subsection.clone();
                }
                ConfigEvent::Entry {
                    key,
                    value,
                    line_number,
                    ..
                } => {
                    let config_key = ConfigKey {
                        section: current_section.clone(),
                        subsection: current_subsection.clone(),
                        name: key.clone(),
                    };
                    entries.push(ConfigEntry {
                        key: config_key,
                        value: value.clone(),
                        scope: self.scope,
                        source_file: self.path.clone(),
                        line_number: Some(*line_number),
                    });
                }
                _ => {}
            }
        }

        entries
    }

    /// Get the first value for a key.
    pub fn get(&self, key: &ConfigKey) -> Option<Option<&BStr>> {
        let mut current_section = BString::new(Vec::new());
        let mut current_subsection: Option<BString> = None;

        for event in &self.events {
            match event {
                ConfigEvent::SectionHeader {
                    section,
                    subsection,
                    ..
                } => {
                    current_section = section.clone();
                    current_subsection = subsection.clone();
                }
                ConfigEvent::Entry {
                    key: entry_key,
                    value,
                    ..
                } => {
                    if key.section == current_section
                        && key.subsection == current_subsection
                        && key.name == *entry_key
                    {
                        return Some(value.as_deref().map(|v| v.as_bstr()));
                    }
                }
                _ => {}
            }
        }

        None
    }

    /// Get all values for a key (multi-valued).
    pub fn get_all(&self, key: &ConfigKey) -> Vec<Option<&BStr>> {
        let mut results = Vec::new();
        let mut current_section = BString::new(Vec::new());
        let mut current_subsection: Option<BString> = None;

        for event in &self.events {
            match event {
                ConfigEvent::SectionHeader {
                    section,
                    subsection,
                    ..
                } => {
                    current_section = section.clone();
                    current_subsection = subsection.clone();
                }
                ConfigEvent::Entry {
                    key: entry_key,
                    value,
                    ..
                } => {
                    if key.section == current_section
                        && key.subsection == current_subsection
                        && key.name == *entry_key
                    {
                        results.push(value.as_deref().map(|v| v.as_bstr()));
                    }
                }
                _ => {}
            }
        }

        results
    }

    /// Get a raw reference to the events (for include processing).
    pub fn events(&self) -> &[ConfigEvent] {
        &self.events
    }
}

impl std::fmt::Debug for ConfigFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigFile")
            .field("path", &self.path)
            .field("scope", &self.scope)
            .field("events_count", &self.events.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_get() {
        let input = b"[user]\n\tname = Alice\n\temail = alice@example.com\n";
        let file = ConfigFile::parse(input, None, ConfigScope::Local).unwrap();

        let key = ConfigKey::parse("user.name").unwrap();
        assert_eq!(
            file.get(&key),
            Some(Some(BStr::new("Alice")))
        );
    }

    #[test]
    fn get_missing_key() {
        let input = b"[user]\n\tname = Alice\n";
        let file = ConfigFile::parse(input, None, ConfigScope::Local).unwrap();

        let key = ConfigKey::parse("user.email").unwrap();
        assert_eq!(file.get(&key), None);
    }

    #[test]
    fn get_all_multi_valued() {
        let input = b"[remote \"origin\"]\n\tfetch = +refs/heads/*:refs/remotes/origin/*\n\tfetch = +refs/tags/*:refs/tags/*\n";
        let file = ConfigFile::parse(input, None, ConfigScope::Local).unwrap();

        let key = ConfigKey::parse("remote.origin.fetch").unwrap();
        let values = file.get_all(&key);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn entries_list() {
        let input = b"[user]\n\tname = Alice\n\temail = alice@example.com\n";
        let file = ConfigFile::parse(input, None, ConfigScope::Local).unwrap();
        let entries = file.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key.to_canonical(), "user.name");
        assert_eq!(entries[1].key.to_canonical(), "user.email");
    }

    #[test]
    fn boolean_key_no_value() {
        let input = b"[core]\n\tbare\n";
        let file = ConfigFile::parse(input, None, ConfigScope::Local).unwrap();
        let key = ConfigKey::parse("core.bare").unwrap();
        // get returns Some(None) for boolean key with no value
        assert_eq!(file.get(&key), Some(None));
    }
}
