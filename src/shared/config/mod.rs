//! Engine configuration module
//!
//! Provides configuration types for the revision store, the paragraph matcher
//! and the reconciliation engine. Values come from defaults, an optional TOML
//! file, and `PARASYNC_*` environment variables, in that order.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default link threshold for the residual similarity pass
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.6;

/// Default capacity of the store's change-notification channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// What the matcher does with link graphs that are neither splits nor merges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Resolve every link graph with the claim rule
    #[default]
    Accept,
    /// Fail the match when existing and incoming paragraphs are cross-linked many-to-many
    Reject,
}

/// Paragraph matcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum word-level similarity for a residual link
    pub similarity_threshold: f32,
    pub ambiguity: AmbiguityPolicy,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            ambiguity: AmbiguityPolicy::Accept,
        }
    }
}

/// Reconciliation engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Commit matched pairs even when nothing changed
    pub commit_unchanged: bool,
    /// Refuse imports into chapters that still hold conflict groups
    pub reject_conflicted_chapters: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            commit_unchanged: true,
            reject_conflicted_chapters: true,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database file; `None` uses the platform data directory
    pub database_path: Option<PathBuf>,
    /// Buffered change notifications per subscriber
    pub event_capacity: usize,
    pub matcher: MatcherConfig,
    pub reconcile: ReconcileConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            matcher: MatcherConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new EngineConfigBuilder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = std::env::var("PARASYNC_DB_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Ok(value) = std::env::var("PARASYNC_SIMILARITY_THRESHOLD") {
            self.matcher.similarity_threshold = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("similarity_threshold", value))?;
        }
        self.validate()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.matcher.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::InvalidValue(
                "similarity_threshold",
                threshold.to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidValue("event_capacity", "0".to_string()));
        }
        Ok(())
    }

    /// Database file to open
    ///
    /// Falls back to `<data dir>/parasync/revisions.db`.
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
            path.push("parasync");
            path.push("revisions.db");
            path
        })
    }
}

/// Builder for EngineConfig
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the database file
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = Some(path.into());
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.matcher.similarity_threshold = threshold;
        self
    }

    pub fn ambiguity(mut self, policy: AmbiguityPolicy) -> Self {
        self.config.matcher.ambiguity = policy;
        self
    }

    pub fn commit_unchanged(mut self, enabled: bool) -> Self {
        self.config.reconcile.commit_unchanged = enabled;
        self
    }

    pub fn reject_conflicted_chapters(mut self, enabled: bool) -> Self {
        self.config.reconcile.reject_conflicted_chapters = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
}
