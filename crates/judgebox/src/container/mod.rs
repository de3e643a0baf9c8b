//! Container runtime wrapper
//!
//! This module provides the disposable execution environments the judge runs
//! submissions in: creating and removing containers, copying sources in and
//! running stages with captured output.
//!
//! The runtime itself sits behind the [`ContainerRuntime`] trait so that one
//! thread-safe client can be shared by every in-flight execution. The
//! production implementation is [`DockerRuntime`].

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use thiserror::Error;
use tokio::io::AsyncWrite;

pub use crate::container::archive::pack_file;
pub use crate::container::command::{ContainerSpec, ExecCommand, MANAGED_LABEL};
pub use crate::container::docker::DockerRuntime;
pub use crate::container::environment::{EnvironmentManager, ExecutionEnvironment};
pub use crate::container::process::run_stage;

mod archive;
mod command;
mod docker;
mod environment;
mod process;

/// Errors that occur while talking to the container runtime
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("environment unavailable: {0}")]
    Unavailable(String),

    #[error("environment {0} not found")]
    NotFound(String),

    #[error("failed to copy files into environment {id}: {message}")]
    CopyIn { id: String, message: String },

    #[error("failed to start command in environment: {0}")]
    Exec(String),

    #[error("output stream failed: {0}")]
    Stream(String),

    #[error("failed to remove environment {id}: {message}")]
    CleanupFailed { id: String, message: String },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("failed to build archive: {0}")]
    Archive(#[source] std::io::Error),

    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
}

/// One chunk of output read from a running command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Stdout(Bytes),
    Stderr(Bytes),
}

/// Demultiplexed output of a running command
pub type OutputStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ContainerError>> + Send>>;

/// Standard input of a running command
pub type InputSink = Pin<Box<dyn AsyncWrite + Send>>;

/// A command started inside an environment
pub struct ExecSession {
    /// Runtime-assigned id used to inspect the exit status
    pub exec_id: String,

    /// Combined stdout/stderr chunks, ending when the command exits
    pub output: OutputStream,

    /// Standard input; shutting it down delivers EOF to the command
    pub input: Option<InputSink>,
}

impl std::fmt::Debug for ExecSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecSession")
            .field("exec_id", &self.exec_id)
            .field("input", &self.input.is_some())
            .finish_non_exhaustive()
    }
}

/// Operations the judge needs from a container runtime
///
/// Implementations must be safe to share between concurrent executions.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + std::fmt::Debug {
    /// Create (but do not start) a container, returning its id
    async fn create(&self, spec: &ContainerSpec) -> Result<String, ContainerError>;

    /// Start a created container
    async fn start(&self, id: &str) -> Result<(), ContainerError>;

    /// Extract a tar archive into `dir` inside the container
    async fn copy_in(&self, id: &str, dir: &str, archive: Vec<u8>) -> Result<(), ContainerError>;

    /// Start a command inside a running container with attached I/O
    async fn exec(&self, id: &str, command: &ExecCommand) -> Result<ExecSession, ContainerError>;

    /// Exit code of a started command, or `None` while it is still running
    async fn exec_exit_code(&self, exec_id: &str) -> Result<Option<i64>, ContainerError>;

    /// Kill and remove a container. Removing a container that no longer exists succeeds.
    async fn remove(&self, id: &str) -> Result<(), ContainerError>;

    /// Whether the container still exists
    async fn is_live(&self, id: &str) -> Result<bool, ContainerError>;
}
