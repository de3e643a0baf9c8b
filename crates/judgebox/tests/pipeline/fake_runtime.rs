//! In-memory container runtime
//!
//! Containers are maps of file names to contents. Commands are interpreted by
//! looking at the program they were asked to run:
//!
//! - compilers (`gcc`, `g++`, `javac`) fail when the source contains
//!   `SYNTAX_ERROR`, hang on `COMPILE_FOREVER`, and otherwise copy the source
//!   to the output file;
//! - programs hang on `LOOP_FOREVER`, exit 137 on `ALLOC_HUGE`, exit 1 with a
//!   traceback on `CRASH`, emit a warning on stderr for `WARN`, and otherwise
//!   echo their stdin;
//! - the runtime itself panics on `PANIC_RUNTIME`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use judgebox::container::{ContainerSpec, ExecCommand, ExecSession, StreamChunk};
use judgebox::{ContainerError, ContainerRuntime};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct Container {
    files: HashMap<String, Vec<u8>>,
    started: bool,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    containers: HashMap<String, Container>,
    specs: Vec<ContainerSpec>,
    removed: Vec<String>,
    exec_codes: HashMap<String, Option<i64>>,
    execs: Vec<(String, Vec<String>)>,
    uploads: Vec<(String, String, Vec<u8>)>,
    peak_live: usize,
}

/// Behavior of one started command
enum Script {
    Finish {
        stdout: Option<Vec<u8>>,
        stderr: Vec<u8>,
        exit_code: i64,
        output_file: Option<(String, Vec<u8>)>,
    },
    Hang,
}

#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<State>>,
    pub fail_create: AtomicBool,
    pub fail_start: AtomicBool,
    pub fail_copy_in: AtomicBool,
    pub fail_remove: AtomicBool,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Containers that exist right now
    pub fn live(&self) -> Vec<String> {
        self.state.lock().unwrap().containers.keys().cloned().collect()
    }

    pub fn created(&self) -> usize {
        self.state.lock().unwrap().specs.len()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    pub fn specs(&self) -> Vec<ContainerSpec> {
        self.state.lock().unwrap().specs.clone()
    }

    /// argv of every started command, in order
    pub fn exec_argvs(&self) -> Vec<Vec<String>> {
        let state = self.state.lock().unwrap();
        state.execs.iter().map(|(_, argv)| argv.clone()).collect()
    }

    /// Files uploaded into any container, as (name, content)
    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        let state = self.state.lock().unwrap();
        state
            .uploads
            .iter()
            .map(|(_, name, content)| (name.clone(), content.clone()))
            .collect()
    }

    /// Most containers that were alive at the same time
    pub fn peak_live(&self) -> usize {
        self.state.lock().unwrap().peak_live
    }

    fn script(argv: &[String], files: &HashMap<String, Vec<u8>>) -> Script {
        let program = argv.first().map(String::as_str).unwrap_or_default();
        // The last argument naming an existing file is the source or binary
        let (target, content) = argv
            .iter()
            .rev()
            .find_map(|arg| {
                let name = arg.strip_prefix("./").unwrap_or(arg);
                files.get(name).map(|content| (name.to_owned(), content.clone()))
            })
            .unwrap_or_default();
        let text = String::from_utf8_lossy(&content).into_owned();

        match program {
            "gcc" | "g++" | "javac" => {
                if text.contains("COMPILE_FOREVER") {
                    return Script::Hang;
                }
                if text.contains("SYNTAX_ERROR") {
                    return Script::Finish {
                        stdout: Some(Vec::new()),
                        stderr: format!("{target}:3:5: error: expected ';' before '}}' token\n")
                            .into_bytes(),
                        exit_code: 1,
                        output_file: None,
                    };
                }
                let output = argv
                    .iter()
                    .position(|arg| arg == "-o")
                    .and_then(|i| argv.get(i + 1).cloned())
                    .unwrap_or_else(|| target.trim_end_matches(".java").to_owned());
                Script::Finish {
                    stdout: Some(Vec::new()),
                    stderr: Vec::new(),
                    exit_code: 0,
                    output_file: Some((output, content)),
                }
            }
            _ if text.contains("LOOP_FOREVER") => Script::Hang,
            _ if text.contains("ALLOC_HUGE") => Script::Finish {
                stdout: Some(Vec::new()),
                stderr: Vec::new(),
                exit_code: 137,
                output_file: None,
            },
            _ if text.contains("CRASH") => Script::Finish {
                stdout: Some(Vec::new()),
                stderr: b"Traceback (most recent call last):\nZeroDivisionError: division by zero\n"
                    .to_vec(),
                exit_code: 1,
                output_file: None,
            },
            _ => Script::Finish {
                stdout: None,
                stderr: if text.contains("WARN") {
                    b"warning: deprecated\n".to_vec()
                } else {
                    Vec::new()
                },
                exit_code: 0,
                output_file: None,
            },
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<String, ContainerError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ContainerError::Unavailable("no space left on device".to_owned()));
        }
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("fake-{}", state.next_id);
        state.containers.insert(id.clone(), Container::default());
        state.specs.push(spec.clone());
        state.peak_live = state.peak_live.max(state.containers.len());
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<(), ContainerError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ContainerError::Unavailable("image not found".to_owned()));
        }
        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| ContainerError::NotFound(id.to_owned()))?;
        container.started = true;
        Ok(())
    }

    async fn copy_in(&self, id: &str, _dir: &str, archive: Vec<u8>) -> Result<(), ContainerError> {
        if self.fail_copy_in.load(Ordering::SeqCst) {
            return Err(ContainerError::CopyIn {
                id: id.to_owned(),
                message: "read-only file system".to_owned(),
            });
        }

        let mut unpacked = Vec::new();
        let mut archive = tar::Archive::new(&archive[..]);
        for entry in archive.entries().map_err(ContainerError::Archive)? {
            let mut entry = entry.map_err(ContainerError::Archive)?;
            let name = entry
                .path()
                .map_err(ContainerError::Archive)?
                .to_string_lossy()
                .into_owned();
            let mut content = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut content).map_err(ContainerError::Archive)?;
            unpacked.push((name, content));
        }

        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| ContainerError::NotFound(id.to_owned()))?;
        for (name, content) in &unpacked {
            container.files.insert(name.clone(), content.clone());
        }
        for (name, content) in unpacked {
            state.uploads.push((id.to_owned(), name, content));
        }
        Ok(())
    }

    async fn exec(&self, id: &str, command: &ExecCommand) -> Result<ExecSession, ContainerError> {
        let argv = command.argv().to_vec();
        let (script, panics) = {
            let state = self.state.lock().unwrap();
            let container = state
                .containers
                .get(id)
                .ok_or_else(|| ContainerError::NotFound(id.to_owned()))?;
            if !container.started {
                return Err(ContainerError::Exec("container is not running".to_owned()));
            }
            let panics = container
                .files
                .values()
                .any(|content| content.windows(13).any(|w| w == b"PANIC_RUNTIME"));
            (Self::script(&argv, &container.files), panics)
        };
        // Outside the lock so the state stays usable for cleanup
        if panics {
            panic!("fake runtime asked to panic");
        }

        let (stdin_tx, mut stdin_rx) = tokio::io::duplex(64 * 1024);
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel::<Result<StreamChunk, ContainerError>>();
        let exec_id = {
            let mut state = self.state.lock().unwrap();
            let exec_id = format!("{id}-exec-{}", state.execs.len());
            state.execs.push((id.to_owned(), argv));
            state.exec_codes.insert(exec_id.clone(), None);
            exec_id
        };

        let state = Arc::clone(&self.state);
        let container_id = id.to_owned();
        let task_exec_id = exec_id.clone();
        let task = tokio::spawn(async move {
            let mut stdin = Vec::new();
            let _ = stdin_rx.read_to_end(&mut stdin).await;

            let Script::Finish {
                stdout,
                stderr,
                exit_code,
                output_file,
            } = script
            else {
                // Keep the output stream open until the container goes away
                let _chunk_tx = chunk_tx;
                std::future::pending::<()>().await;
                return;
            };

            let stdout = stdout.unwrap_or(stdin);
            if !stdout.is_empty() {
                let _ = chunk_tx.send(Ok(StreamChunk::Stdout(Bytes::from(stdout))));
            }
            if !stderr.is_empty() {
                let _ = chunk_tx.send(Ok(StreamChunk::Stderr(Bytes::from(stderr))));
            }

            let mut state = state.lock().unwrap();
            if let Some((name, content)) = output_file
                && let Some(container) = state.containers.get_mut(&container_id)
            {
                container.files.insert(name, content);
            }
            state.exec_codes.insert(task_exec_id, Some(exit_code));
        });

        {
            let mut state = self.state.lock().unwrap();
            if let Some(container) = state.containers.get_mut(id) {
                container.tasks.push(task);
            }
        }

        let output = stream::unfold(chunk_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();

        Ok(ExecSession {
            exec_id,
            output,
            input: Some(Box::pin(stdin_tx)),
        })
    }

    async fn exec_exit_code(&self, exec_id: &str) -> Result<Option<i64>, ContainerError> {
        let state = self.state.lock().unwrap();
        state
            .exec_codes
            .get(exec_id)
            .copied()
            .ok_or_else(|| ContainerError::Exec(format!("no such exec {exec_id}")))
    }

    async fn remove(&self, id: &str) -> Result<(), ContainerError> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(ContainerError::CleanupFailed {
                id: id.to_owned(),
                message: "daemon not responding".to_owned(),
            });
        }
        let mut state = self.state.lock().unwrap();
        if let Some(container) = state.containers.remove(id) {
            for task in container.tasks {
                task.abort();
            }
            state.removed.push(id.to_owned());
        }
        Ok(())
    }

    async fn is_live(&self, id: &str) -> Result<bool, ContainerError> {
        Ok(self.state.lock().unwrap().containers.contains_key(id))
    }
}
