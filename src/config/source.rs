//! # Configuration sources.
//!
//! A [`ConfigSource`] produces a fresh [`WorkerConfig`] snapshot each time it is
//! asked. Workers read it once at startup and again whenever a reload is
//! requested, so edits made to the source take effect on reload, never
//! immediately.
//!
//! ## Provided sources
//! - [`StaticSource`]: always returns the same snapshot.
//! - [`SharedSource`]: in-memory value that an operator may replace at runtime.
//! - [`FileSource`]: TOML file, re-read on every load.
//!
//! ## File layout
//! ```toml
//! [count_roles]
//! check_duration = 10      # seconds, 1..=i32::MAX
//! database = "postgres"
//! ```
//! Missing keys fall back to the defaults; unknown keys in the section are rejected.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Deserialize;

use crate::config::worker::{DEFAULT_CHECK_DURATION, DEFAULT_DATABASE, WorkerConfig};
use crate::error::ConfigError;

/// Produces worker configuration snapshots.
pub trait ConfigSource: Send + Sync + 'static {
    /// Loads the current configuration.
    fn load(&self) -> Result<WorkerConfig, ConfigError>;
}

/// Source that always yields the same snapshot.
#[derive(Clone, Debug, Default)]
pub struct StaticSource(WorkerConfig);

impl StaticSource {
    /// Wraps a fixed configuration.
    pub fn new(cfg: WorkerConfig) -> Self {
        Self(cfg)
    }
}

impl ConfigSource for StaticSource {
    fn load(&self) -> Result<WorkerConfig, ConfigError> {
        Ok(self.0.clone())
    }
}

/// In-memory source whose value can be replaced while workers run.
///
/// Clones share the same value.
#[derive(Clone, Debug, Default)]
pub struct SharedSource {
    inner: Arc<RwLock<WorkerConfig>>,
}

impl SharedSource {
    /// Creates a source holding `cfg`.
    pub fn new(cfg: WorkerConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(cfg)),
        }
    }

    /// Replaces the stored configuration. Running workers observe it after a reload.
    pub fn set(&self, cfg: WorkerConfig) {
        let mut g = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *g = cfg;
    }
}

impl ConfigSource for SharedSource {
    fn load(&self) -> Result<WorkerConfig, ConfigError> {
        let g = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(g.clone())
    }
}

/// Section contents as written in the file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Section {
    check_duration: Option<u64>,
    database: Option<String>,
}

impl Section {
    fn into_config(self) -> Result<WorkerConfig, ConfigError> {
        let secs = self
            .check_duration
            .unwrap_or(DEFAULT_CHECK_DURATION.as_secs());
        let database = self
            .database
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        WorkerConfig::from_secs(secs, database)
    }
}

/// TOML file source, re-read on every [`load`](ConfigSource::load).
#[derive(Clone, Debug)]
pub struct FileSource {
    path: PathBuf,
    section: String,
}

impl FileSource {
    /// Default section name.
    pub const DEFAULT_SECTION: &'static str = "count_roles";

    /// Creates a source reading `path`, section `[count_roles]`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            section: Self::DEFAULT_SECTION.to_string(),
        }
    }

    /// Reads values from a different section.
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = section.into();
        self
    }

    /// Parses TOML text, taking values from `section`.
    ///
    /// A missing section yields the defaults.
    pub fn parse(text: &str, section: &str) -> Result<WorkerConfig, ConfigError> {
        let table: toml::Table = text.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
            error: e.message().to_string(),
        })?;

        let parsed = match table.get(section) {
            Some(value) => value
                .clone()
                .try_into::<Section>()
                .map_err(|e| ConfigError::Parse {
                    error: format!("[{section}]: {}", e.message()),
                })?,
            None => Section::default(),
        };
        parsed.into_config()
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<WorkerConfig, ConfigError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::Read {
            path: self.path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&text, &self.section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parse_full_section() {
        let text = r#"
            [count_roles]
            check_duration = 3
            database = "app"
        "#;
        let cfg = FileSource::parse(text, "count_roles").unwrap();
        assert_eq!(cfg.check_duration(), Duration::from_secs(3));
        assert_eq!(cfg.database(), "app");
    }

    #[test]
    fn missing_section_uses_defaults() {
        let cfg = FileSource::parse("[other]\nx = 1\n", "count_roles").unwrap();
        assert_eq!(cfg, WorkerConfig::default());
    }

    #[test]
    fn missing_keys_use_defaults() {
        let cfg = FileSource::parse("[count_roles]\ndatabase = \"app\"\n", "count_roles").unwrap();
        assert_eq!(cfg.check_duration(), DEFAULT_CHECK_DURATION);
        assert_eq!(cfg.database(), "app");
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = FileSource::parse("[count_roles]\nnaptime = 3\n", "count_roles").unwrap_err();
        assert_eq!(err.as_label(), "config_parse");
    }

    #[test]
    fn out_of_range_interval_is_rejected() {
        let err = FileSource::parse("[count_roles]\ncheck_duration = 0\n", "count_roles").unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let err = FileSource::parse("[count_roles\n", "count_roles").unwrap_err();
        assert_eq!(err.as_label(), "config_parse");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = FileSource::new("/nonexistent/bgvisor.toml").load().unwrap_err();
        assert_eq!(err.as_label(), "config_read");
    }

    #[test]
    fn shared_source_observes_updates() {
        let src = SharedSource::new(WorkerConfig::default());
        let other = src.clone();
        other.set(WorkerConfig::from_secs(1, "app").unwrap());
        assert_eq!(src.load().unwrap().database(), "app");
    }
}
