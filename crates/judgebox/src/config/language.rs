use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;
use crate::types::ResourceLimits;

const INVALID_FILE_NAME_CHARS: [char; 3] = ['/', '\\', '\0'];

/// How to materialize, compile and run a submission in one language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Human-readable name for the language (e.g., "C++ 17 (GCC)")
    pub name: String,

    /// File the submission is written to inside the environment
    pub source_name: FileName,

    /// Compilation step (None for interpreted languages)
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    /// Execution step
    pub run: RunConfig,

    /// Limits for this language (overrides defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

impl Language {
    /// Check if the language is compiled
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Source file name inside the environment
    pub fn source_name(&self) -> &str {
        self.source_name.as_str()
    }

    /// Name substituted for `{binary}`: the compiler output, or the source itself
    pub fn binary_name(&self) -> &str {
        match self.compile {
            Some(ref compile) => &compile.output_name,
            None => self.source_name(),
        }
    }

    /// Expanded compile command, if the language has a compile step
    pub fn compile_command(&self) -> Option<Vec<String>> {
        self.compile.as_ref().map(|compile| {
            Self::expand_command(&compile.command, self.source_name(), self.binary_name())
        })
    }

    /// Expanded run command
    pub fn run_command(&self) -> Vec<String> {
        Self::expand_command(&self.run.command, self.source_name(), self.binary_name())
    }

    /// Expand placeholders in the given command
    ///
    /// Every argument stays a separate argv entry; nothing is handed to a shell.
    pub fn expand_command(command: &[String], source: &str, binary: &str) -> Vec<String> {
        command
            .iter()
            .map(|arg| {
                arg.replace("{source}", source)
                    .replace("{output}", binary)
                    .replace("{binary}", binary)
            })
            .collect()
    }
}

/// Plain file name inside the environment's working directory (e.g., "Main.java")
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileName(String);

impl FileName {
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        let contains_invalid = name
            .chars()
            .any(|c| INVALID_FILE_NAME_CHARS.contains(&c));
        if name.is_empty() || name == "." || name.contains("..") || contains_invalid {
            return Err(ConfigError::InvalidFileName(name.to_owned()));
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for FileName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileName::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a plain file name without path separators or '..'",
            )
        })
    }
}

impl std::fmt::Display for FileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for the compilation step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {output}, {binary}
    pub command: Vec<String>,

    /// Compiler output name (e.g., "main")
    pub output_name: String,

    /// Environment variables to set during compilation
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Configuration for the execution step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {binary}
    pub command: Vec<String>,

    /// Environment variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,
}
