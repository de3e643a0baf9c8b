//! Configuration file loading for judgebox
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, FileName};
use crate::types::ResourceLimits;

/// Prefix of environment variables overriding file values (e.g. `JUDGEBOX_IMAGE`)
const ENV_PREFIX: &str = "JUDGEBOX";

impl Config {
    /// Load configuration from a file, then apply `JUDGEBOX_*` environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.image.trim().is_empty() {
            return Err(ConfigError::Invalid("image must not be empty".to_owned()));
        }
        if !self.working_dir.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "working_dir '{}' must be an absolute path",
                self.working_dir
            )));
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent must be at least 1".to_owned(),
            ));
        }
        validate_limits("default_limits", &self.default_limits)?;

        for (id, lang) in &self.languages {
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if lang.run.command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty run command"
                )));
            }
            if let Some(ref compile) = lang.compile {
                if compile.command.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "language '{id}' has empty compile command"
                    )));
                }
                FileName::new(&compile.output_name)?;
            }
            if let Some(ref limits) = lang.limits {
                validate_limits(&format!("languages.{id}.limits"), limits)?;
            }
        }

        Ok(())
    }
}

fn validate_limits(section: &str, limits: &ResourceLimits) -> Result<(), ConfigError> {
    limits
        .validate()
        .map_err(|e| ConfigError::Invalid(format!("{section}.{e}")))
}
