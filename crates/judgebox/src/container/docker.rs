//! Docker implementation of [`ContainerRuntime`]
//!
//! Talks to the local Docker daemon through bollard. A single client is
//! cloned into every call; bollard multiplexes requests over its own
//! connection pool, so concurrent executions need no extra locking.

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, UploadToContainerOptions,
};
use bollard::{API_DEFAULT_VERSION, Docker};
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::container::{
    ContainerError, ContainerRuntime, ContainerSpec, ExecCommand, ExecSession, StreamChunk,
};

/// Seconds bollard waits for a daemon response before giving up
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Prefix of generated container names
const NAME_PREFIX: &str = "judgebox";

/// Container runtime backed by the Docker daemon
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using `docker_host` from the config, or the platform defaults
    pub fn connect(config: &Config) -> Result<Self, ContainerError> {
        let docker = match config.docker_host {
            Some(ref socket) => {
                Docker::connect_with_socket(socket, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| ContainerError::Unavailable(e.to_string()))?;

        Ok(Self { docker })
    }

    /// Check that the daemon answers
    pub async fn ping(&self) -> Result<(), ContainerError> {
        self.docker
            .ping()
            .await
            .map_err(|e| ContainerError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

/// Translate a spec into the daemon's create request
///
/// Swap is pinned to the memory ceiling so the ceiling is a hard limit, and the
/// network stack is removed entirely.
pub(crate) fn create_body(spec: &ContainerSpec) -> ContainerCreateBody {
    let limits = spec.resource_limits();
    let memory = limits.memory_bytes();

    ContainerCreateBody {
        image: Some(spec.image().to_owned()),
        cmd: Some(spec.command().to_vec()),
        working_dir: Some(spec.workdir().to_owned()),
        user: spec.run_as().map(str::to_owned),
        labels: Some(spec.labels().clone()),
        network_disabled: Some(true),
        tty: Some(false),
        attach_stdin: Some(false),
        attach_stdout: Some(false),
        attach_stderr: Some(false),
        host_config: Some(HostConfig {
            memory,
            memory_swap: memory,
            nano_cpus: limits.nano_cpus(),
            pids_limit: limits.pids_limit(),
            network_mode: Some("none".to_owned()),
            cap_drop: Some(vec!["ALL".to_owned()]),
            security_opt: Some(vec!["no-new-privileges".to_owned()]),
            init: Some(true),
            auto_remove: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn status_code(err: &BollardError) -> Option<u16> {
    match err {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

/// The container is already gone (404) or already being removed (409)
fn already_reclaimed(err: &BollardError) -> bool {
    matches!(status_code(err), Some(404 | 409))
}

fn to_chunk(item: Result<LogOutput, BollardError>) -> Option<Result<StreamChunk, ContainerError>> {
    match item {
        Ok(LogOutput::StdOut { message }) => Some(Ok(StreamChunk::Stdout(message))),
        Ok(LogOutput::StdErr { message }) => Some(Ok(StreamChunk::Stderr(message))),
        Ok(LogOutput::StdIn { .. } | LogOutput::Console { .. }) => None,
        Err(e) => Some(Err(ContainerError::Stream(e.to_string()))),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    #[instrument(skip(self, spec), fields(image = spec.image()))]
    async fn create(&self, spec: &ContainerSpec) -> Result<String, ContainerError> {
        let name = spec
            .container_name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{NAME_PREFIX}-{}", Uuid::new_v4()));
        let options = CreateContainerOptions {
            name: Some(name),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), create_body(spec))
            .await
            .map_err(|e| ContainerError::Unavailable(e.to_string()))?;

        debug!(id = %response.id, "container created");
        Ok(response.id)
    }

    async fn start(&self, id: &str) -> Result<(), ContainerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(|e| ContainerError::Unavailable(e.to_string()))
    }

    #[instrument(skip(self, archive), fields(len = archive.len()))]
    async fn copy_in(&self, id: &str, dir: &str, archive: Vec<u8>) -> Result<(), ContainerError> {
        let options = UploadToContainerOptions {
            path: dir.to_owned(),
            ..Default::default()
        };

        self.docker
            .upload_to_container(id, Some(options), bollard::body_full(Bytes::from(archive)))
            .await
            .map_err(|e| ContainerError::CopyIn {
                id: id.to_owned(),
                message: e.to_string(),
            })
    }

    #[instrument(skip(self, command), fields(argv = ?command.argv()))]
    async fn exec(&self, id: &str, command: &ExecCommand) -> Result<ExecSession, ContainerError> {
        let env = command.env_pairs();
        let options = CreateExecOptions::<String> {
            cmd: Some(command.argv().to_vec()),
            working_dir: command.workdir().map(str::to_owned),
            user: command.run_as().map(str::to_owned),
            env: (!env.is_empty()).then_some(env),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };

        let created = self
            .docker
            .create_exec(id, options)
            .await
            .map_err(|e| match status_code(&e) {
                Some(404) => ContainerError::NotFound(id.to_owned()),
                _ => ContainerError::Exec(e.to_string()),
            })?;

        let started = self
            .docker
            .start_exec(
                &created.id,
                Some(StartExecOptions {
                    detach: false,
                    tty: false,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| ContainerError::Exec(e.to_string()))?;

        match started {
            StartExecResults::Attached { output, input } => Ok(ExecSession {
                exec_id: created.id,
                output: output
                    .filter_map(|item| std::future::ready(to_chunk(item)))
                    .boxed(),
                input: Some(input),
            }),
            StartExecResults::Detached => Err(ContainerError::Exec(
                "daemon started the command detached".to_owned(),
            )),
        }
    }

    async fn exec_exit_code(&self, exec_id: &str) -> Result<Option<i64>, ContainerError> {
        let inspect = self.docker.inspect_exec(exec_id).await?;
        if inspect.running == Some(true) {
            return Ok(None);
        }
        Ok(inspect.exit_code)
    }

    #[instrument(skip(self))]
    async fn remove(&self, id: &str) -> Result<(), ContainerError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => {
                debug!("container removed");
                Ok(())
            }
            Err(e) if already_reclaimed(&e) => {
                debug!(error = %e, "container already reclaimed");
                Ok(())
            }
            Err(e) => Err(ContainerError::CleanupFailed {
                id: id.to_owned(),
                message: e.to_string(),
            }),
        }
    }

    async fn is_live(&self, id: &str) -> Result<bool, ContainerError> {
        match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if status_code(&e) == Some(404) => Ok(false),
            Err(e) => Err(ContainerError::Docker(e)),
        }
    }
}
