//! Environment lifecycle management
//!
//! Manages the creation, use, and removal of disposable execution environments.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, warn};

use crate::config::{Config, FileName};
use crate::container::archive::pack_file;
use crate::container::command::{ContainerSpec, ExecCommand};
use crate::container::{ContainerError, ContainerRuntime};
use crate::types::ResourceLimits;

/// A live, exclusively owned execution environment
///
/// # Cleanup
///
/// **Important:** Always release the environment through
/// [`EnvironmentManager::release`] (or [`release()`](Self::release)) before
/// dropping it. The `Drop` implementation schedules best-effort removal on the
/// current tokio runtime, but nothing waits for it to complete.
pub struct ExecutionEnvironment {
    /// Container id assigned by the runtime
    id: String,

    runtime: Arc<dyn ContainerRuntime>,

    /// Directory sources are written to and stages run in
    working_dir: String,

    /// User stages run as
    user: Option<String>,

    /// Whether the container may still exist
    live: bool,

    /// Pool permit held for the lifetime of the environment
    _permit: Option<OwnedSemaphorePermit>,
}

impl ExecutionEnvironment {
    pub(crate) fn new(
        id: String,
        runtime: Arc<dyn ContainerRuntime>,
        working_dir: impl Into<String>,
        user: Option<String>,
    ) -> Self {
        Self {
            id,
            runtime,
            working_dir: working_dir.into(),
            user,
            live: true,
            _permit: None,
        }
    }

    /// Get the container id
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn working_dir(&self) -> &str {
        &self.working_dir
    }

    pub(crate) fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    /// Check if the environment has not been released yet
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Build a command that runs in this environment's working directory
    pub fn command(&self, argv: impl IntoIterator<Item = impl Into<String>>) -> ExecCommand {
        ExecCommand::new(argv)
            .working_dir(self.working_dir.as_str())
            .user(self.user.as_deref())
    }

    /// Write a file into the working directory
    ///
    /// The content is uploaded as a tar archive through the runtime API and
    /// arrives byte-for-byte.
    #[instrument(skip(self, content), fields(env = %self.id, len = content.len()))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<(), ContainerError> {
        let name = FileName::new(name).map_err(|_| ContainerError::InvalidPath(name.to_owned()))?;
        let archive = pack_file(name.as_str(), content)?;
        self.runtime
            .copy_in(&self.id, &self.working_dir, archive)
            .await?;
        debug!(name = %name, "wrote file to environment");
        Ok(())
    }

    /// Remove the environment
    ///
    /// Idempotent: once removal succeeded, further calls do nothing.
    #[must_use = "cleanup errors should be handled"]
    #[instrument(skip(self), fields(env = %self.id))]
    pub async fn release(&mut self) -> Result<(), ContainerError> {
        if !self.live {
            return Ok(());
        }
        self.runtime.remove(&self.id).await?;
        self.live = false;
        debug!("environment released");
        Ok(())
    }

    /// Attach a pool permit to this environment
    pub(crate) fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self._permit = Some(permit);
        self
    }

    /// Stop tracking the container without removing it
    fn abandon(&mut self) {
        self.live = false;
    }
}

impl std::fmt::Debug for ExecutionEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEnvironment")
            .field("id", &self.id)
            .field("working_dir", &self.working_dir)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}

impl Drop for ExecutionEnvironment {
    fn drop(&mut self) {
        if !self.live {
            return;
        }

        warn!(
            env = %self.id,
            "ExecutionEnvironment dropped without release! \
             Scheduling best-effort removal (may not complete)."
        );

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(env = %self.id, "no tokio runtime available, environment leaked");
            return;
        };

        let runtime = Arc::clone(&self.runtime);
        let id = std::mem::take(&mut self.id);
        handle.spawn(async move {
            match runtime.remove(&id).await {
                Ok(()) => debug!(env = %id, "best-effort removal succeeded"),
                Err(e) => warn!(env = %id, error = %e, "best-effort removal failed"),
            }
        });
    }
}

/// Creates environments from the execution image and guarantees their removal
///
/// At most `capacity` environments are alive at once; further acquisitions wait.
#[derive(Debug)]
pub struct EnvironmentManager {
    runtime: Arc<dyn ContainerRuntime>,

    /// Execution image
    image: String,

    working_dir: String,

    user: Option<String>,

    /// Maximum number of live environments
    capacity: u32,

    semaphore: Arc<Semaphore>,

    /// Releases that failed and were suppressed
    cleanup_failures: AtomicU64,
}

impl EnvironmentManager {
    /// Create a manager for the image and limits in `config`
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &Config) -> Self {
        let capacity = config.max_concurrent.max(1);
        Self {
            runtime,
            image: config.image.clone(),
            working_dir: config.working_dir.clone(),
            user: config.user.clone(),
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
            cleanup_failures: AtomicU64::new(0),
        }
    }

    /// The shared runtime client
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Create and start a fresh environment
    ///
    /// Fails with [`ContainerError::Unavailable`] when the runtime cannot provide
    /// one. A container that was created but failed to start is removed before
    /// returning.
    #[instrument(skip(self, limits))]
    pub async fn acquire(
        &self,
        limits: &ResourceLimits,
    ) -> Result<ExecutionEnvironment, ContainerError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ContainerError::Unavailable("environment pool closed".to_owned()))?;

        let spec = ContainerSpec::new(&self.image)
            .working_dir(&self.working_dir)
            .user(self.user.as_deref())
            .limits(limits.clone());

        let id = self.runtime.create(&spec).await?;
        let mut env = ExecutionEnvironment::new(
            id,
            Arc::clone(&self.runtime),
            &self.working_dir,
            self.user.clone(),
        )
        .with_permit(permit);

        if let Err(e) = self.runtime.start(env.id()).await {
            warn!(env = %env.id(), error = %e, "environment failed to start");
            self.release(&mut env).await;
            return Err(match e {
                ContainerError::Unavailable(_) => e,
                other => ContainerError::Unavailable(other.to_string()),
            });
        }

        debug!(env = %env.id(), "environment acquired");
        Ok(env)
    }

    /// Remove an environment, logging instead of propagating failures
    ///
    /// A failed removal is counted in [`cleanup_failures`](Self::cleanup_failures)
    /// and never retried.
    pub async fn release(&self, env: &mut ExecutionEnvironment) {
        if let Err(e) = env.release().await {
            self.cleanup_failures.fetch_add(1, Ordering::Relaxed);
            warn!(env = %env.id(), error = %e, "failed to release environment");
            env.abandon();
        }
    }

    /// Get the number of environments that can still be acquired without waiting
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get the maximum number of live environments
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of releases that failed since the manager was created
    pub fn cleanup_failures(&self) -> u64 {
        self.cleanup_failures.load(Ordering::Relaxed)
    }
}
