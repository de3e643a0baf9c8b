//! Builders for container creation and in-container commands

use std::collections::{BTreeMap, HashMap};

use crate::types::ResourceLimits;

/// Label attached to every environment created by judgebox
pub const MANAGED_LABEL: &str = "judgebox.managed";

/// Process kept as PID 1 so the container stays up between stages
const KEEPALIVE_COMMAND: [&str; 2] = ["sleep", "infinity"];

/// Description of one disposable execution environment
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    image: String,
    name: Option<String>,
    working_dir: String,
    user: Option<String>,
    limits: ResourceLimits,
    labels: HashMap<String, String>,
    command: Vec<String>,
}

impl ContainerSpec {
    /// Create a spec for the given image
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: None,
            working_dir: "/workspace".to_owned(),
            user: None,
            limits: ResourceLimits::default(),
            labels: HashMap::from([(MANAGED_LABEL.to_owned(), "true".to_owned())]),
            command: KEEPALIVE_COMMAND.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    /// Set the container name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Set the user processes run as
    pub fn user(mut self, user: Option<impl Into<String>>) -> Self {
        self.user = user.map(Into::into);
        self
    }

    /// Set resource limits
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Add a label
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn container_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn workdir(&self) -> &str {
        &self.working_dir
    }

    pub fn run_as(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn resource_limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    /// PID 1 command
    pub fn command(&self) -> &[String] {
        &self.command
    }
}

/// Builder for a command run inside a live environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecCommand {
    argv: Vec<String>,
    working_dir: Option<String>,
    user: Option<String>,
    env: BTreeMap<String, String>,
}

impl ExecCommand {
    /// Create a command from its argv; arguments are passed verbatim, never through a shell
    pub fn new(argv: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the user the command runs as
    pub fn user(mut self, user: Option<impl Into<String>>) -> Self {
        self.user = user.map(Into::into);
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables
    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn workdir(&self) -> Option<&str> {
        self.working_dir.as_deref()
    }

    pub fn run_as(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Environment in `KEY=value` form, sorted by key
    pub fn env_pairs(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}
