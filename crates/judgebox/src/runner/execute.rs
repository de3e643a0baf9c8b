//! Execution step for code running
//!
//! Handles running compiled or interpreted programs with input/output.

use tracing::{debug, instrument, warn};

use crate::config::Language;
use crate::container::{ContainerError, ExecutionEnvironment, run_stage};
use crate::types::{ResourceLimits, StageResult};

/// Run the program with batch I/O
///
/// `input` is written to standard input and closed; programs that read
/// nothing still see end-of-file immediately.
#[instrument(skip(env, language, input, limits), fields(language = %language.name))]
pub(crate) async fn execute(
    env: &ExecutionEnvironment,
    language: &Language,
    input: Option<&[u8]>,
    limits: &ResourceLimits,
) -> Result<StageResult, ContainerError> {
    let command = env.command(language.run_command()).envs(&language.run.env);
    debug!(argv = ?command.argv(), "executing program");

    let stage = run_stage(
        env,
        command,
        input,
        limits.run_deadline(),
        limits.output_cap(),
    )
    .await?;

    if stage.truncated {
        warn!(cap = ?limits.output_cap(), "program output truncated");
    }

    debug!(
        exit_code = stage.exit_code,
        outcome = ?stage.outcome,
        elapsed = ?stage.elapsed,
        "execution complete"
    );

    Ok(stage)
}
