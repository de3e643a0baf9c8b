//! Judge pipeline
//!
//! Runs one submission end to end: acquire an environment, write the source,
//! compile if the language declares it, run, assemble the result and release
//! the environment on every path.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use thiserror::Error;
use tracing::{info, instrument, warn};

pub use crate::runner::assemble::{COMPILATION_ERROR_PREFIX, SYSTEM_ERROR_PREFIX};

mod assemble;
mod compile;
mod execute;

use crate::{
    config::{Config, Language},
    container::{
        ContainerError, ContainerRuntime, DockerRuntime, EnvironmentManager, ExecutionEnvironment,
    },
    types::{ExecutionRequest, ExecutionResult, InvalidLimit, ResourceLimits},
};

/// Errors returned by [`Judge`]
///
/// Only requests that are rejected before any environment exists surface as
/// errors; every later failure is reported inside the [`ExecutionResult`].
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("unsupported language '{0}'")]
    UnsupportedLanguage(String),

    #[error("invalid limits: {0}")]
    InvalidLimits(#[source] InvalidLimit),

    #[error("container runtime error: {0}")]
    Container(#[from] ContainerError),
}

/// Failures inside the pipeline, reported as system errors
#[derive(Debug, Error)]
enum PipelineError {
    #[error("{0}")]
    Acquire(#[source] ContainerError),

    #[error("failed to write source: {0}")]
    Materialize(#[source] ContainerError),

    #[error("compile stage failed: {0}")]
    Compile(#[source] ContainerError),

    #[error("run stage failed: {0}")]
    Execute(#[source] ContainerError),

    #[error("internal error: {0}")]
    Panicked(String),
}

/// Sandboxed code execution engine
///
/// Cheap to clone; clones share the configuration and the environment pool,
/// so one judge can serve any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct Judge {
    config: Arc<Config>,
    manager: Arc<EnvironmentManager>,
}

impl Judge {
    /// Create a judge on top of the given container runtime
    pub fn new(config: Config, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let manager = EnvironmentManager::new(runtime, &config);
        Self {
            config: Arc::new(config),
            manager: Arc::new(manager),
        }
    }

    /// Create a judge connected to the Docker daemon named in the config
    pub fn connect(config: Config) -> Result<Self, JudgeError> {
        let runtime = DockerRuntime::connect(&config)?;
        Ok(Self::new(config, Arc::new(runtime)))
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the environment manager
    pub fn environments(&self) -> &EnvironmentManager {
        &self.manager
    }

    /// Judge one submission
    ///
    /// # Errors
    ///
    /// Returns [`JudgeError::UnsupportedLanguage`] if the language is not
    /// configured, and [`JudgeError::InvalidLimits`] if the request's limit
    /// overrides would lift a ceiling. No environment is created in either
    /// case.
    #[instrument(skip(self, request), fields(language = %request.language))]
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, JudgeError> {
        let language = self
            .config
            .language(&request.language)
            .map_err(|_| JudgeError::UnsupportedLanguage(request.language.clone()))?;
        if let Some(ref overrides) = request.limits {
            overrides.validate().map_err(JudgeError::InvalidLimits)?;
        }
        let limits = self
            .config
            .effective_limits(language, request.limits.as_ref());

        let mut env = match self.manager.acquire(&limits).await {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "could not acquire environment");
                return Ok(assemble::system_error(PipelineError::Acquire(e)));
            }
        };

        let outcome = AssertUnwindSafe(run_pipeline(&env, language, request, &limits))
            .catch_unwind()
            .await;
        self.manager.release(&mut env).await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(error = %e, "execution failed");
                assemble::system_error(e)
            }
            Err(panic) => {
                let e = PipelineError::Panicked(panic_message(&*panic));
                warn!(error = %e, "execution panicked");
                assemble::system_error(e)
            }
        };

        info!(
            status = ?result.status,
            time_ms = result.execution_time_ms,
            "execution finished"
        );
        Ok(result)
    }
}

/// Write, compile and run inside an acquired environment
async fn run_pipeline(
    env: &ExecutionEnvironment,
    language: &Language,
    request: &ExecutionRequest,
    limits: &ResourceLimits,
) -> Result<ExecutionResult, PipelineError> {
    env.write_file(language.source_name(), request.code.as_bytes())
        .await
        .map_err(PipelineError::Materialize)?;

    if let Some(stage) = compile::compile(env, language, limits)
        .await
        .map_err(PipelineError::Compile)?
        && !stage.is_success()
    {
        return Ok(assemble::compile_failure(&stage));
    }

    let input = request.input.as_deref().map(str::as_bytes);
    let stage = execute::execute(env, language, input, limits)
        .await
        .map_err(PipelineError::Execute)?;

    Ok(assemble::from_run(&stage))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
