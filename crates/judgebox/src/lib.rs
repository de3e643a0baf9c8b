//! A library for sandboxed code execution.
//!
//! Judgebox provides an async Rust API for compiling and running untrusted,
//! user-submitted code inside disposable Docker containers and turning the
//! outcome into a structured result.
//!
//! # Features
//!
//! - **Disposable environments**: every submission gets a fresh container that is removed on every exit path.
//! - **Multi-language**: compiled and interpreted languages are described by a declarative profile table.
//! - **TOML configuration**: image, limits and per-language commands.
//! - **Resource limits**: wall clock deadlines per stage, memory, CPU, process count and output size.
//! - **Bounded concurrency**: a fixed number of environments alive at once, shared by concurrent requests.
//!
//! # Example
//!
//! ```no_run
//! use judgebox::{Config, ExecutionRequest, Judge};
//!
//! # async fn run() -> Result<(), judgebox::JudgeError> {
//! let judge = Judge::connect(Config::default())?;
//! let request = ExecutionRequest::new("python", "print(input())").with_input("ping\n");
//! let result = judge.execute(&request).await?;
//! assert_eq!(result.output, "ping\n");
//! # Ok(())
//! # }
//! ```

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language};
pub use container::{
    ContainerError, ContainerRuntime, DockerRuntime, EnvironmentManager, ExecutionEnvironment,
};
pub use runner::{COMPILATION_ERROR_PREFIX, Judge, JudgeError, SYSTEM_ERROR_PREFIX};
pub use types::{
    ExecutionRequest, ExecutionResult, ExecutionStatus, InvalidLimit, ResourceLimits, StageOutcome,
    StageResult,
};

pub mod config;
pub mod container;
pub mod runner;
pub mod types;
