//! Configuration file parser for feed definitions.
//!
//! The config is a TOML file listing every syndicated feed with its limits,
//! templates and preprocessing actions. A missing file yields an empty
//! `Config::default()`. Unknown top-level keys are accepted but logged.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::feed::PreprocessingAction;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Well-formed TOML that describes an unusable setup.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Definition of one syndicated feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Unique identity key of the feed.
    pub name: String,

    /// Maximum number of items kept after processing.
    pub max_items: usize,

    /// Maximum characters kept from each item's title and summary.
    pub max_item_length: usize,

    /// Ordered preprocessing steps. Absent means no preprocessing.
    #[serde(default)]
    pub preprocessing_actions: Vec<PreprocessingAction>,

    /// Per-item template, e.g. `<li><a href="{link}">{title}</a></li>`.
    pub html_feed_item_entry_template: String,

    /// Optional feed-level wrapper; must contain `{items}`.
    #[serde(default)]
    pub html_wrapper: Option<String>,
}

impl FeedConfig {
    /// Minimal feed definition with no preprocessing and no wrapper.
    pub fn new(
        name: impl Into<String>,
        max_items: usize,
        max_item_length: usize,
        template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            max_items,
            max_item_length,
            preprocessing_actions: Vec::new(),
            html_feed_item_entry_template: template.into(),
            html_wrapper: None,
        }
    }

    /// Checks the invariants that do not depend on feed content.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("feed name must not be empty".to_string()));
        }
        if self.max_items == 0 {
            return Err(ConfigError::Invalid(format!(
                "feed '{}': max_items must be positive",
                self.name
            )));
        }
        if self.max_item_length == 0 {
            return Err(ConfigError::Invalid(format!(
                "feed '{}': max_item_length must be positive",
                self.name
            )));
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of feed updates processed in parallel by a batch refresh.
    pub concurrency: usize,

    /// Feed definitions.
    pub feeds: Vec<FeedConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 8,
            feeds: Vec::new(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 2] = ["concurrency", "feeds"];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Duplicate names or zero limits → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.display(), feeds = config.feeds.len(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be positive".to_string()));
        }

        let mut seen = HashSet::new();
        for feed in &self.feeds {
            feed.validate()?;
            if !seen.insert(feed.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate feed name '{}'",
                    feed.name
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
concurrency = 4

[[feeds]]
name = "news"
max_items = 10
max_item_length = 140
html_feed_item_entry_template = "<li><a href=\"{link}\">{title}</a></li>"
html_wrapper = "<ul>{items}</ul>"
preprocessing_actions = [
    { action = "strip_tags" },
    { action = "rewrite_links", from = "http://", to = "https://" },
]

[[feeds]]
name = "releases"
max_items = 3
max_item_length = 60
html_feed_item_entry_template = "<p>{text}</p>"
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.concurrency, 8);
        assert!(config.feeds.is_empty());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedcast_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert!(config.feeds.is_empty());
    }

    #[test]
    fn test_whitespace_only_returns_default() {
        let config = Config::from_toml_str("   \n  \n  ").unwrap();
        assert_eq!(config.concurrency, 8);
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml_str(FULL).unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.feeds.len(), 2);

        let news = &config.feeds[0];
        assert_eq!(news.name, "news");
        assert_eq!(news.max_items, 10);
        assert_eq!(news.html_wrapper.as_deref(), Some("<ul>{items}</ul>"));
        assert_eq!(
            news.preprocessing_actions,
            vec![
                PreprocessingAction::StripTags,
                PreprocessingAction::RewriteLinks {
                    from: "http://".to_string(),
                    to: "https://".to_string(),
                },
            ]
        );

        let releases = &config.feeds[1];
        assert!(releases.preprocessing_actions.is_empty());
        assert!(releases.html_wrapper.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join("feedcast_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("feeds.toml");
        std::fs::write(&path, FULL).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.feeds.len(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::from_toml_str("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_unknown_action_rejected() {
        let content = r#"
[[feeds]]
name = "x"
max_items = 1
max_item_length = 1
html_feed_item_entry_template = "{text}"
preprocessing_actions = [{ action = "summon_demons" }]
"#;
        assert!(matches!(Config::from_toml_str(content), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let content = "concurrency = 2\ntotally_fake_key = \"ok\"\n";
        let config = Config::from_toml_str(content).unwrap();
        assert_eq!(config.concurrency, 2);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let content = r#"
[[feeds]]
name = "dup"
max_items = 1
max_item_length = 1
html_feed_item_entry_template = "{text}"

[[feeds]]
name = "dup"
max_items = 2
max_item_length = 2
html_feed_item_entry_template = "{text}"
"#;
        let err = Config::from_toml_str(content).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("duplicate feed name 'dup'"));
    }

    #[test]
    fn test_zero_limits_rejected() {
        assert!(FeedConfig::new("a", 0, 10, "{text}").validate().is_err());
        assert!(FeedConfig::new("a", 10, 0, "{text}").validate().is_err());
        assert!(FeedConfig::new("  ", 10, 10, "{text}").validate().is_err());
        assert!(FeedConfig::new("a", 1, 1, "{text}").validate().is_ok());

        let err = Config::from_toml_str("concurrency = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("feedcast_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("feeds.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
