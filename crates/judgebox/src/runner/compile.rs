//! Compilation step for code execution
//!
//! Handles compiling source code using language-specific compilers.

use tracing::{debug, instrument};

use crate::config::Language;
use crate::container::{ContainerError, ExecutionEnvironment, run_stage};
use crate::types::{ResourceLimits, StageResult};

/// Compile the source already written to the environment
///
/// Returns `None` for languages without a compile step. A compiler that
/// exits non-zero or overruns its deadline is a stage outcome, not an error.
#[instrument(skip(env, language, limits), fields(language = %language.name))]
pub(crate) async fn compile(
    env: &ExecutionEnvironment,
    language: &Language,
    limits: &ResourceLimits,
) -> Result<Option<StageResult>, ContainerError> {
    let (Some(compile_config), Some(argv)) = (language.compile.as_ref(), language.compile_command())
    else {
        return Ok(None);
    };

    let command = env.command(argv).envs(&compile_config.env);
    let stage = run_stage(
        env,
        command,
        None,
        limits.compile_deadline(),
        limits.output_cap(),
    )
    .await?;

    debug!(
        success = stage.is_success(),
        exit_code = stage.exit_code,
        elapsed = ?stage.elapsed,
        "compilation complete"
    );

    Ok(Some(stage))
}
