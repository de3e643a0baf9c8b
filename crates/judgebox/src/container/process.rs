//! Running stages inside an environment
//!
//! Handles starting a command, feeding its standard input, capturing output
//! and enforcing the stage deadline.

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use crate::container::command::ExecCommand;
use crate::container::environment::ExecutionEnvironment;
use crate::container::{ContainerError, ContainerRuntime, InputSink, OutputStream, StreamChunk};
use crate::types::{StageOutcome, StageResult, TIMEOUT_EXIT_CODE};

/// How often a finished command's exit status is polled
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Separate stdout/stderr buffers, each capped independently
#[derive(Debug, Default)]
pub(crate) struct OutputCapture {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    cap: Option<usize>,
    truncated: bool,
}

impl OutputCapture {
    pub(crate) fn new(cap: Option<usize>) -> Self {
        Self {
            cap,
            ..Default::default()
        }
    }

    pub(crate) fn push(&mut self, chunk: StreamChunk) {
        let (buf, bytes) = match chunk {
            StreamChunk::Stdout(ref bytes) => (&mut self.stdout, bytes),
            StreamChunk::Stderr(ref bytes) => (&mut self.stderr, bytes),
        };

        let room = match self.cap {
            Some(cap) => cap.saturating_sub(buf.len()),
            None => bytes.len(),
        };
        if bytes.len() > room {
            self.truncated = true;
        }
        buf.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    /// Read the stream to its end
    ///
    /// Chunks past the cap are still read and discarded so the command never
    /// blocks on a full pipe.
    pub(crate) async fn drain(&mut self, mut output: OutputStream) -> Result<(), ContainerError> {
        while let Some(chunk) = output.next().await {
            self.push(chunk?);
        }
        Ok(())
    }

    pub(crate) fn into_result(
        self,
        exit_code: i64,
        outcome: StageOutcome,
        elapsed: Duration,
    ) -> StageResult {
        StageResult {
            stdout: self.stdout,
            stderr: self.stderr,
            exit_code,
            outcome,
            elapsed,
            truncated: self.truncated,
        }
    }
}

/// Write `data` to the command's standard input, then close it
async fn feed_stdin(input: Option<InputSink>, data: Option<&[u8]>) -> std::io::Result<()> {
    let Some(mut input) = input else {
        return Ok(());
    };
    if let Some(data) = data
        && !data.is_empty()
    {
        input.write_all(data).await?;
    }
    input.shutdown().await
}

async fn wait_for_exit(
    runtime: &dyn ContainerRuntime,
    exec_id: &str,
) -> Result<i64, ContainerError> {
    loop {
        if let Some(code) = runtime.exec_exit_code(exec_id).await? {
            return Ok(code);
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
}

/// Run one stage in an environment
///
/// Starting the command, feeding stdin, draining both output streams and
/// waiting for the exit status all happen under a single deadline. When the
/// deadline elapses every part is abandoned at once and the output captured
/// so far is returned with [`TIMEOUT_EXIT_CODE`]. The command itself keeps
/// running until its environment is released.
#[instrument(skip(env, command, stdin), fields(env = %env.id(), argv = ?command.argv()))]
pub async fn run_stage(
    env: &ExecutionEnvironment,
    command: ExecCommand,
    stdin: Option<&[u8]>,
    deadline: Duration,
    output_cap: Option<usize>,
) -> Result<StageResult, ContainerError> {
    let runtime = env.runtime();
    let mut capture = OutputCapture::new(output_cap);
    let started = Instant::now();

    let staged = tokio::time::timeout(deadline, async {
        let session = runtime.exec(env.id(), &command).await?;

        let (fed, drained) = tokio::join!(
            feed_stdin(session.input, stdin),
            capture.drain(session.output)
        );
        drained?;
        if let Err(e) = fed {
            // Commands that exit without reading all of stdin close the pipe early
            debug!(error = %e, "stdin not fully delivered");
        }

        wait_for_exit(runtime, &session.exec_id).await
    })
    .await;
    let elapsed = started.elapsed();

    match staged {
        Ok(Ok(exit_code)) => {
            debug!(exit_code, ?elapsed, "stage complete");
            Ok(capture.into_result(exit_code, StageOutcome::Completed, elapsed))
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            warn!(?deadline, "stage timed out");
            Ok(capture.into_result(TIMEOUT_EXIT_CODE, StageOutcome::TimedOut, elapsed))
        }
    }
}
