//! Merged configuration visible to a repository: system, global, and
//! repository-local files layered in priority order, plus environment
//! overrides.

use std::path::{Path, PathBuf};

use bstr::{BString, ByteSlice};

use crate::env::load_env_overrides;
use crate::error::ConfigError;
use crate::file::ConfigFile;
use crate::include;
use crate::types;
use crate::{ConfigEntry, ConfigKey, ConfigScope};

/// All configuration visible to a repository, merged across scopes.
pub struct ConfigSet {
    files: Vec<ConfigFile>,
    env_overrides: Vec<ConfigEntry>,
}

impl Default for ConfigSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSet {
    /// Load system, global, and (if a git dir is given) repository-local and
    /// worktree configuration, following `include`/`includeIf` directives and
    /// applying `GIT_CONFIG_COUNT`-style environment overrides last.
    pub fn load(git_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let mut files = Vec::new();

        if let Some(path) = system_config_path() {
            if let Ok(f) = ConfigFile::load(&path, ConfigScope::System) {
                files.push(f);
            }
        }
        if let Some(path) = global_config_path() {
            if let Ok(f) = ConfigFile::load(&path, ConfigScope::Global) {
                files.push(f);
            }
        }
        if let Some(dir) = git_dir {
            let local = dir.join("config");
            if local.is_file() {
                files.push(ConfigFile::load(&local, ConfigScope::Local)?);
            }
            let worktree = dir.join("config.worktree");
            if worktree.is_file() {
                files.push(ConfigFile::load(&worktree, ConfigScope::Worktree)?);
            }
        }

        include::process_includes(&mut files, git_dir, None)?;

        let env_overrides = load_env_overrides()?;

        Ok(ConfigSet { files, env_overrides })
    }

    /// Build a config set directly from already-parsed files. Used by tests
    /// that don't want to touch the filesystem.
    pub fn from_files(files: Vec<ConfigFile>) -> Self {
        ConfigSet { files, env_overrides: Vec::new() }
    }

    /// An empty config set with no files loaded yet.
    pub fn new() -> Self {
        ConfigSet { files: Vec::new(), env_overrides: Vec::new() }
    }

    /// Append an already-loaded file, lowest priority last.
    pub fn add_file(&mut self, file: ConfigFile) {
        self.files.push(file);
    }

    /// The loaded files, in priority order (lowest scope first).
    pub fn files(&self) -> &[ConfigFile] {
        &self.files
    }

    /// Mutable access to the loaded files, e.g. for `include::process_includes`
    /// to append newly-discovered files in place.
    pub fn files_mut(&mut self) -> &mut Vec<ConfigFile> {
        &mut self.files
    }

    /// Last-writer-wins raw lookup: environment overrides beat files, later
    /// files beat earlier ones, the last occurrence within a file wins.
    /// `Some(None)` means the key is set with no value (boolean true).
    fn get_raw(&self, key: &ConfigKey) -> Option<Option<BString>> {
        for entry in self.env_overrides.iter().rev() {
            if entry.key.matches(key) {
                return Some(entry.value.clone());
            }
        }
        for file in self.files.iter().rev() {
            if let Some(value) = file.get(key) {
                return Some(value.map(|v| v.to_owned()));
            }
        }
        None
    }

    /// Get a raw string value for `key` ("section.name" or
    /// "section.subsection.name").
    pub fn get_string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let config_key = ConfigKey::parse(key)?;
        match self.get_raw(&config_key) {
            Some(Some(v)) => Ok(Some(v.to_str_lossy().into_owned())),
            Some(None) => Ok(None),
            None => Ok(None),
        }
    }

    /// Get a boolean value for `key`. `None` means the key is entirely unset;
    /// a key present with no `=` sign parses as `true`.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        let config_key = ConfigKey::parse(key)?;
        match self.get_raw(&config_key) {
            Some(value) => Ok(Some(types::parse_bool(value.as_deref().map(|v| v.as_bstr()))?)),
            None => Ok(None),
        }
    }

    /// Get an integer value for `key`, applying k/m/g suffix multipliers.
    pub fn get_int(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        let config_key = ConfigKey::parse(key)?;
        match self.get_raw(&config_key) {
            Some(Some(v)) => Ok(Some(types::parse_int(v.as_bstr())?)),
            Some(None) => Err(ConfigError::InvalidInt(key.to_string())),
            None => Ok(None),
        }
    }

    /// All entries across every loaded file, in priority order (lowest
    /// scope first).
    pub fn all_entries(&self) -> Vec<ConfigEntry> {
        self.files.iter().flat_map(|f| f.entries()).collect()
    }
}

fn system_config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("GIT_CONFIG_SYSTEM") {
        return Some(PathBuf::from(path));
    }
    Some(PathBuf::from("/etc/gitconfig"))
}

fn global_config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("GIT_CONFIG_GLOBAL") {
        return Some(PathBuf::from(path));
    }
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("git").join("config");
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".gitconfig"))
}
