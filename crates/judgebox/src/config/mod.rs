use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{CompileConfig, FileName, Language, RunConfig};
use crate::types::ResourceLimits;

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../judgebox.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid file name '{0}': must be a plain name without '/' or '..'")]
    InvalidFileName(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("unsupported language '{0}'")]
    UnsupportedLanguage(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for judgebox
///
/// Built once at startup and shared read-only between concurrent executions.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Execution image containing the toolchains of every configured language
    #[serde(default = "default_image")]
    pub image: String,

    /// Docker control socket (uses the platform default if not specified)
    #[serde(default)]
    pub docker_host: Option<String>,

    /// Directory inside the environment where sources are written and stages run
    #[serde(default = "default_working_dir")]
    pub working_dir: String,

    /// User the stages run as inside the environment (image default if not specified)
    #[serde(default)]
    pub user: Option<String>,

    /// Maximum number of environments alive at the same time
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Default resource limits applied to all executions.
    /// Language and request limits override these field by field.
    #[serde(default)]
    pub default_limits: ResourceLimits,

    /// Language profiles keyed by language ID
    #[serde(default)]
    pub languages: HashMap<String, Language>,
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            image: default_image(),
            docker_host: None,
            working_dir: default_working_dir(),
            user: None,
            max_concurrent: default_max_concurrent(),
            default_limits: ResourceLimits::reference(),
            languages: HashMap::new(),
        }
    }

    /// Look up the profile of a language
    pub fn language(&self, id: &str) -> Result<&Language, ConfigError> {
        self.languages
            .get(id)
            .ok_or_else(|| ConfigError::UnsupportedLanguage(id.to_string()))
    }

    /// Language IDs in sorted order
    pub fn language_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.languages.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Merge limits: reference → config defaults → language → request overrides
    pub fn effective_limits(
        &self,
        language: &Language,
        overrides: Option<&ResourceLimits>,
    ) -> ResourceLimits {
        let mut limits = ResourceLimits::reference().with_overrides(&self.default_limits);
        if let Some(ref lang_limits) = language.limits {
            limits = limits.with_overrides(lang_limits);
        }
        if let Some(user_limits) = overrides {
            limits = limits.with_overrides(user_limits);
        }
        limits
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_image() -> String {
    "judgebox-runtime:1.0".to_owned()
}

fn default_working_dir() -> String {
    "/workspace".to_owned()
}

fn default_max_concurrent() -> u32 {
    8
}
