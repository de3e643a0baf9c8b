//! Turning stage outcomes into the result handed to collaborators

use crate::types::{ExecutionResult, ExecutionStatus, StageResult};

/// Prefix of the error text when the compile stage fails
pub const COMPILATION_ERROR_PREFIX: &str = "Compilation Error:\n";

/// Prefix of the error text when the judge itself fails
pub const SYSTEM_ERROR_PREFIX: &str = "System Error: ";

/// Result for a compile stage that did not succeed; the run stage was skipped
pub(crate) fn compile_failure(stage: &StageResult) -> ExecutionResult {
    let status = if stage.timed_out() {
        ExecutionStatus::Timeout
    } else {
        ExecutionStatus::CompilationError
    };

    ExecutionResult {
        success: false,
        output: String::new(),
        error: format!("{COMPILATION_ERROR_PREFIX}{}", stage.stderr_text()),
        execution_time_ms: 0,
        status,
        exit_code: Some(stage.exit_code),
        truncated: stage.truncated,
    }
}

/// Result for a run stage that reached an outcome
pub(crate) fn from_run(stage: &StageResult) -> ExecutionResult {
    let status = if stage.timed_out() {
        ExecutionStatus::Timeout
    } else if stage.exit_code == 0 {
        ExecutionStatus::Ok
    } else {
        ExecutionStatus::RuntimeError
    };

    ExecutionResult {
        success: status == ExecutionStatus::Ok,
        output: stage.stdout_text(),
        error: stage.stderr_text(),
        execution_time_ms: u64::try_from(stage.elapsed.as_millis()).unwrap_or(u64::MAX),
        status,
        exit_code: Some(stage.exit_code),
        truncated: stage.truncated,
    }
}

/// Result for a failure outside any stage
pub(crate) fn system_error(message: impl std::fmt::Display) -> ExecutionResult {
    ExecutionResult {
        success: false,
        output: String::new(),
        error: format!("{SYSTEM_ERROR_PREFIX}{message}"),
        execution_time_ms: 0,
        status: ExecutionStatus::SystemError,
        exit_code: None,
        truncated: false,
    }
}
