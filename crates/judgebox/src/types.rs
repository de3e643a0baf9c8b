use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Run-stage deadline used when no limit is configured
pub const DEFAULT_RUN_DEADLINE: Duration = Duration::from_secs(5);

/// Compile-stage deadline used when no limit is configured
pub const DEFAULT_COMPILE_DEADLINE: Duration = Duration::from_secs(15);

/// Exit code reported for a stage that did not finish before its deadline.
///
/// Real process exit codes reported by the container runtime are never negative.
pub const TIMEOUT_EXIT_CODE: i64 = -1;

/// A limit value that would lift the limit instead of setting it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{key} must be {expected}")]
pub struct InvalidLimit {
    pub key: &'static str,
    pub expected: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Run-stage wall clock deadline in seconds
    #[serde(default)]
    pub time_limit: Option<f64>,

    /// Compile-stage wall clock deadline in seconds
    #[serde(default)]
    pub compile_time_limit: Option<f64>,

    /// Memory ceiling of the whole environment in kilobytes
    #[serde(default)]
    pub memory_limit: Option<u64>,

    /// CPU quota in cores (fractional values allowed)
    #[serde(default)]
    pub cpu_limit: Option<f64>,

    /// Maximum number of processes/threads inside the environment
    #[serde(default)]
    pub max_processes: Option<u32>,

    /// Maximum captured size of each output stream in kilobytes
    #[serde(default)]
    pub max_output: Option<u64>,
}

impl ResourceLimits {
    /// 1 kilobyte in kilobytes
    pub const KB: u64 = 1;
    /// 1 megabyte in kilobytes
    pub const MB: u64 = 1024;
    /// 1 gigabyte in kilobytes
    pub const GB: u64 = 1024 * 1024;

    /// Create new resource limits with all fields unset
    pub fn new() -> Self {
        Self::default()
    }

    /// Baseline limits applied when the configuration does not say otherwise
    pub fn reference() -> Self {
        Self {
            time_limit: Some(5.0),
            compile_time_limit: Some(15.0),
            memory_limit: Some(512 * Self::MB),
            cpu_limit: Some(1.0),
            max_processes: Some(64),
            max_output: Some(16 * Self::MB),
        }
    }

    /// Set the run-stage deadline in seconds
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    /// Set the compile-stage deadline in seconds
    pub fn with_compile_time_limit(mut self, seconds: f64) -> Self {
        self.compile_time_limit = Some(seconds);
        self
    }

    /// Set the memory ceiling in kilobytes
    pub fn with_memory_limit(mut self, kb: u64) -> Self {
        self.memory_limit = Some(kb);
        self
    }

    /// Set the CPU quota in cores
    pub fn with_cpu_limit(mut self, cores: f64) -> Self {
        self.cpu_limit = Some(cores);
        self
    }

    /// Set the maximum number of processes
    pub fn with_max_processes(mut self, count: u32) -> Self {
        self.max_processes = Some(count);
        self
    }

    /// Set the maximum captured output per stream in kilobytes
    pub fn with_max_output(mut self, kb: u64) -> Self {
        self.max_output = Some(kb);
        self
    }

    /// Apply overrides from another ResourceLimits, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            time_limit: overrides.time_limit.or(self.time_limit),
            compile_time_limit: overrides.compile_time_limit.or(self.compile_time_limit),
            memory_limit: overrides.memory_limit.or(self.memory_limit),
            cpu_limit: overrides.cpu_limit.or(self.cpu_limit),
            max_processes: overrides.max_processes.or(self.max_processes),
            max_output: overrides.max_output.or(self.max_output),
        }
    }

    /// Check that every set value is a usable limit
    ///
    /// The container runtime reads a memory or process limit of 0 as
    /// "unlimited", and an output cap of 0 discards all output.
    pub fn validate(&self) -> Result<(), InvalidLimit> {
        let positive_reals = [
            ("time_limit", self.time_limit),
            ("compile_time_limit", self.compile_time_limit),
            ("cpu_limit", self.cpu_limit),
        ];
        for (key, value) in positive_reals {
            if let Some(v) = value
                && !(v.is_finite() && v > 0.0)
            {
                return Err(InvalidLimit {
                    key,
                    expected: "a positive number",
                });
            }
        }

        let positive_counts = [
            ("memory_limit", self.memory_limit),
            ("max_processes", self.max_processes.map(u64::from)),
            ("max_output", self.max_output),
        ];
        for (key, value) in positive_counts {
            if value == Some(0) {
                return Err(InvalidLimit {
                    key,
                    expected: "positive",
                });
            }
        }
        Ok(())
    }

    /// Deadline of the run stage
    pub fn run_deadline(&self) -> Duration {
        seconds_or(self.time_limit, DEFAULT_RUN_DEADLINE)
    }

    /// Deadline of the compile stage
    pub fn compile_deadline(&self) -> Duration {
        seconds_or(self.compile_time_limit, DEFAULT_COMPILE_DEADLINE)
    }

    /// Memory ceiling in bytes, as the container runtime expects it
    pub fn memory_bytes(&self) -> Option<i64> {
        self.memory_limit
            .filter(|kb| *kb > 0)
            .and_then(|kb| kb.checked_mul(1024))
            .and_then(|bytes| i64::try_from(bytes).ok())
    }

    /// Process ceiling as the container runtime expects it
    pub fn pids_limit(&self) -> Option<i64> {
        self.max_processes.filter(|n| *n > 0).map(i64::from)
    }

    /// CPU quota in billionths of a core
    pub fn nano_cpus(&self) -> Option<i64> {
        self.cpu_limit
            .filter(|cores| cores.is_finite() && *cores > 0.0)
            .map(|cores| (cores * 1_000_000_000.0) as i64)
    }

    /// Output cap per stream in bytes
    pub fn output_cap(&self) -> Option<usize> {
        self.max_output
            .and_then(|kb| kb.checked_mul(1024))
            .and_then(|bytes| usize::try_from(bytes).ok())
    }
}

fn seconds_or(seconds: Option<f64>, fallback: Duration) -> Duration {
    seconds
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .filter(|d| !d.is_zero())
        .unwrap_or(fallback)
}

/// A single submission to judge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// Language identifier, a key of the configured language table
    pub language: String,

    /// Submitted source code
    #[serde(alias = "sourceCode")]
    pub code: String,

    /// Data fed to the program's standard input
    #[serde(default, alias = "stdin")]
    pub input: Option<String>,

    /// Per-request limit overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceLimits>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            input: None,
            limits: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = Some(limits);
        self
    }
}

/// How a stage ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    /// The process exited and its status was inspected
    Completed,
    /// The deadline elapsed first
    TimedOut,
}

/// Captured outcome of one compile or run stage
#[derive(Debug, Clone)]
pub struct StageResult {
    /// Raw standard output bytes
    pub stdout: Vec<u8>,

    /// Raw standard error bytes
    pub stderr: Vec<u8>,

    /// Exit code, or [`TIMEOUT_EXIT_CODE`] if the stage timed out
    pub exit_code: i64,

    pub outcome: StageOutcome,

    /// Wall clock time spent in the stage
    pub elapsed: Duration,

    /// Whether either stream hit the output cap
    pub truncated: bool,
}

impl StageResult {
    /// Check if the stage completed with exit code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == StageOutcome::Completed && self.exit_code == 0
    }

    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.outcome == StageOutcome::TimedOut
    }

    /// Standard output decoded as UTF-8
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded as UTF-8
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Signal number, for processes the runtime reports as killed (exit code 128 + n)
    pub fn signal(&self) -> Option<i32> {
        if self.outcome != StageOutcome::Completed || self.exit_code <= 128 {
            return None;
        }
        i32::try_from(self.exit_code - 128).ok()
    }
}

/// Strip a single trailing record separator (`\n` or `\r\n`)
pub fn trim_record_separator(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

/// Classification of a finished execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Program exited with code 0
    #[serde(rename = "OK")]
    Ok,

    /// Compile stage exited non-zero
    #[serde(rename = "CE")]
    CompilationError,

    /// Run stage exited non-zero (crash, kill, out of memory)
    #[serde(rename = "RE")]
    RuntimeError,

    /// A stage did not finish before its deadline
    #[serde(rename = "TO")]
    Timeout,

    /// The judge itself failed
    #[serde(rename = "XX")]
    SystemError,
}

/// Result handed to collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    #[serde(rename = "isSuccess")]
    pub success: bool,

    /// Captured standard output of the run stage
    pub output: String,

    /// Captured standard error, or a prefixed compile/system diagnostic
    pub error: String,

    /// Wall clock time of the run stage only
    pub execution_time_ms: u64,

    pub status: ExecutionStatus,

    /// Exit code of the last stage that ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,

    /// Whether captured output was cut at the output cap
    #[serde(default)]
    pub truncated: bool,
}

impl ExecutionResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Output with one trailing record separator removed, for comparisons
    pub fn trimmed_output(&self) -> &str {
        trim_record_separator(&self.output)
    }
}
