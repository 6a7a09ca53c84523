//! Container lifecycle: image pulls, launches, readiness, artifact extraction and teardown.

use std::{
    collections::{BTreeMap, HashSet},
    future::Future,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{Instant, sleep, timeout_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    ContainerDescriptor, ContainerEngine, ContainerError, ContainerStatus, ExtractedArtifact,
    LaunchSpec, PlaceholderSet, Readiness, ReadinessHandle, ReadinessSignal, RoleKind,
    default_descriptors,
};
use crate::images::is_floating;

/// Name marker geth uses for keystore files.
pub const KEYSTORE_MARKER: &str = "UTC--";

/// Directory searched for the dev node's coinbase keystore.
pub const KEYSTORE_SEARCH_DIR: &str = "/tmp";

/// Gateway alias that lets a container reach ports published on the host.
pub const HOST_GATEWAY: &str = "host.docker.internal:host-gateway";

/// Bounded polling used while waiting for a node container to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Delay between two inspections.
    pub interval: Duration,
    /// Inspections performed before giving up.
    pub max_attempts: u32,
    /// Delay after the container runs and before the artifact is searched for.
    pub settle: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self { interval: Duration::from_secs(3), max_attempts: 40, settle: Duration::from_secs(3) }
    }
}

impl ReadinessPolicy {
    /// Sets the inspection interval.
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the number of inspections.
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the settle delay.
    pub const fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

/// Configuration for [`ContainerManager`].
#[derive(Debug, Clone)]
pub struct ContainerManagerConfig {
    /// Readiness polling policy for node roles.
    pub readiness: ReadinessPolicy,
    /// Directory inside the node container searched for the keystore.
    pub keystore_search_dir: String,
    /// Local directory the keystore is copied to.
    pub staging_dir: PathBuf,
}

impl ContainerManagerConfig {
    /// Creates a configuration staging artifacts into `staging_dir`.
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            readiness: ReadinessPolicy::default(),
            keystore_search_dir: KEYSTORE_SEARCH_DIR.to_string(),
            staging_dir: staging_dir.into(),
        }
    }

    /// Sets the readiness policy.
    pub const fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }
}

type Registry = Arc<Mutex<BTreeMap<String, ContainerDescriptor>>>;
type ReadinessTasks = Arc<Mutex<Vec<JoinHandle<()>>>>;

/// Drives containers through their lifecycle against a [`ContainerEngine`].
///
/// Clones share the engine, the descriptor registry, the readiness tasks and the cancellation
/// token.
#[derive(Debug)]
pub struct ContainerManager<E> {
    engine: Arc<E>,
    registry: Registry,
    readiness_tasks: ReadinessTasks,
    config: ContainerManagerConfig,
    cancel: CancellationToken,
}

impl<E> Clone for ContainerManager<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            registry: Arc::clone(&self.registry),
            readiness_tasks: Arc::clone(&self.readiness_tasks),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<E: ContainerEngine> ContainerManager<E> {
    /// Creates a manager over the default descriptor registry.
    pub fn new(engine: Arc<E>, config: ContainerManagerConfig, cancel: CancellationToken) -> Self {
        Self::with_descriptors(engine, default_descriptors(), config, cancel)
    }

    /// Creates a manager over an explicit descriptor registry.
    pub fn with_descriptors(
        engine: Arc<E>,
        descriptors: BTreeMap<String, ContainerDescriptor>,
        config: ContainerManagerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            registry: Arc::new(Mutex::new(descriptors)),
            readiness_tasks: Arc::default(),
            config,
            cancel,
        }
    }

    fn registry(&self) -> MutexGuard<'_, BTreeMap<String, ContainerDescriptor>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn readiness_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.readiness_tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for every spawned readiness task to exit.
    ///
    /// Tasks still running after `timeout` are aborted. Returns how many had to be aborted.
    pub async fn join_readiness_tasks(&self, timeout: Duration) -> usize {
        let tasks = std::mem::take(&mut *self.readiness_tasks());
        let deadline = Instant::now() + timeout;

        let mut aborted = 0;
        for mut task in tasks {
            match timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(%err, "readiness task failed"),
                Err(_) => {
                    task.abort();
                    aborted += 1;
                }
            }
        }
        aborted
    }

    /// Returns a snapshot of a role's descriptor.
    pub fn descriptor(&self, role: &str) -> Option<ContainerDescriptor> {
        self.registry().get(role).cloned()
    }

    /// Returns the role kind, or an error for roles outside the registry.
    pub fn kind(&self, role: &str) -> Result<RoleKind, ContainerError> {
        self.descriptor(role)
            .map(|descriptor| descriptor.kind)
            .ok_or_else(|| ContainerError::UnsupportedRole(role.to_string()))
    }

    /// Names of the roles currently flagged running.
    pub fn running_roles(&self) -> Vec<String> {
        self.registry()
            .iter()
            .filter(|(_, descriptor)| descriptor.running)
            .map(|(role, _)| role.clone())
            .collect()
    }

    /// Makes sure every role's image is available locally, pulling what is missing.
    ///
    /// Every role is validated before the engine is contacted. Floating tags are always pulled.
    /// Returns the references that were pulled.
    pub async fn ensure_images_present(
        &self,
        roles: &[&str],
    ) -> Result<Vec<String>, ContainerError> {
        let required = {
            let registry = self.registry();
            let mut required = Vec::with_capacity(roles.len());
            for role in roles {
                let descriptor = registry
                    .get(*role)
                    .ok_or_else(|| ContainerError::UnsupportedRole(role.to_string()))?;
                if !required.contains(&descriptor.image_ref) {
                    required.push(descriptor.image_ref.clone());
                }
            }
            required
        };

        let cached: HashSet<String> = self
            .engine
            .list_image_refs()
            .await
            .map_err(ContainerError::ImageList)?
            .into_iter()
            .collect();

        let mut pulled = Vec::new();
        for image in required {
            if cached.contains(&image) && !is_floating(&image) {
                debug!(%image, "image cached");
                continue;
            }

            info!(%image, "pulling image");
            self.engine
                .pull_image(&image)
                .await
                .map_err(|source| ContainerError::ImagePull { image: image.clone(), source })?;
            info!(%image, "image pulled");
            pulled.push(image);
        }

        Ok(pulled)
    }

    /// Launches a role's container with its port published on `0.0.0.0:host_port`.
    ///
    /// Bundler roles need `placeholders`; node roles ignore them. The returned handle resolves
    /// once the container is usable: immediately for bundlers, and for nodes only after the
    /// container is observed running and its coinbase keystore has been staged locally.
    pub async fn launch(
        &self,
        role: &str,
        host_port: u16,
        placeholders: Option<&PlaceholderSet>,
    ) -> Result<(String, ReadinessHandle), ContainerError> {
        let descriptor =
            self.descriptor(role).ok_or_else(|| ContainerError::UnsupportedRole(role.to_string()))?;
        if descriptor.running {
            return Err(ContainerError::AlreadyRunning(role.to_string()));
        }

        let (cmd, env, extra_hosts) = match descriptor.kind {
            RoleKind::Node => (descriptor.cmd.clone(), descriptor.env.clone(), Vec::new()),
            RoleKind::Bundler => {
                let placeholders = placeholders
                    .ok_or_else(|| ContainerError::MissingPlaceholders(role.to_string()))?;
                let (cmd, env) = descriptor.resolve(placeholders);
                (cmd, env, vec![HOST_GATEWAY.to_string()])
            }
        };

        let spec = LaunchSpec {
            name: descriptor.container_name.clone(),
            image: descriptor.image_ref.clone(),
            cmd,
            env,
            host_port,
            container_port: descriptor.exposed_port(host_port),
            extra_hosts,
        };

        let container_id = self
            .engine
            .create_and_start(&spec)
            .await
            .map_err(|source| ContainerError::Launch { role: role.to_string(), source })?;
        info!(role, %container_id, host_port, "container started");

        if let Some(entry) = self.registry().get_mut(role) {
            entry.container_id = Some(container_id.clone());
            entry.host_port = Some(host_port);
            entry.running = true;
        }

        let handle = match descriptor.kind {
            RoleKind::Bundler => ReadinessHandle::ready(Readiness {
                container_id: container_id.clone(),
                host_port,
                artifact: None,
            }),
            RoleKind::Node => {
                let (signal, handle) = ReadinessSignal::pair();
                let manager = self.clone();
                let id = container_id.clone();
                let task = tokio::spawn(async move {
                    match manager.await_node_ready(&id, host_port).await {
                        Ok(readiness) => signal.close(readiness),
                        Err(err) => signal.fail(err),
                    }
                });
                self.readiness_tasks().push(task);
                handle
            }
        };

        Ok((container_id, handle))
    }

    async fn await_node_ready(
        &self,
        container_id: &str,
        host_port: u16,
    ) -> Result<Readiness, ContainerError> {
        info!(%container_id, "waiting for node container to run");
        let policy = self.config.readiness;

        let mut attempts = 0;
        loop {
            attempts += 1;
            let status = tokio::select! {
                _ = self.cancel.cancelled() => return Err(ContainerError::Cancelled),
                status = self.engine.status(container_id) => status.map_err(|source| {
                    ContainerError::Inspect { container_id: container_id.to_string(), source }
                })?,
            };
            debug!(%container_id, %status, attempts, "node container status");

            if status == ContainerStatus::Running {
                break;
            }
            if attempts >= policy.max_attempts {
                return Err(ContainerError::ReadinessTimeout {
                    container_id: container_id.to_string(),
                    attempts,
                    status: status.to_string(),
                });
            }
            self.pause(policy.interval).await?;
        }

        self.pause(policy.settle).await?;
        let artifact = self.extract_keystore(container_id).await?;
        info!(%container_id, keystore = %artifact.file_name, "node container ready");

        Ok(Readiness {
            container_id: container_id.to_string(),
            host_port,
            artifact: Some(artifact),
        })
    }

    async fn pause(&self, duration: Duration) -> Result<(), ContainerError> {
        self.unless_cancelled(sleep(duration)).await
    }

    async fn unless_cancelled<T>(
        &self,
        step: impl Future<Output = T>,
    ) -> Result<T, ContainerError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ContainerError::Cancelled),
            out = step => Ok(out),
        }
    }

    /// Finds the coinbase keystore inside the container and copies it to the staging directory.
    async fn extract_keystore(
        &self,
        container_id: &str,
    ) -> Result<ExtractedArtifact, ContainerError> {
        let dir = self.config.keystore_search_dir.as_str();
        let pattern = format!("*{KEYSTORE_MARKER}*");
        let output = self
            .unless_cancelled(
                self.engine.exec(container_id, &["find", dir, "-type", "f", "-name", &pattern]),
            )
            .await?
            .map_err(|source| ContainerError::ArtifactExtraction {
                path: dir.to_string(),
                container_id: container_id.to_string(),
                source,
            })?;

        if !output.success() {
            // find exits non-zero on unreadable subdirectories but still lists what it saw
            warn!(
                %container_id,
                exit_code = output.exit_code,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "keystore search reported errors"
            );
        }

        let mut candidates: Vec<String> = output
            .stdout_lines()
            .into_iter()
            .filter(|path| file_name(path).contains(KEYSTORE_MARKER))
            .collect();
        candidates.sort();
        let path = candidates.into_iter().next().ok_or_else(|| ContainerError::ArtifactNotFound {
            container_id: container_id.to_string(),
            dir: dir.to_string(),
            marker: KEYSTORE_MARKER.to_string(),
        })?;
        debug!(%container_id, %path, "found keystore file");

        let contents = self
            .unless_cancelled(self.engine.copy_file_from(container_id, &path))
            .await?
            .map_err(|source| ContainerError::ArtifactExtraction {
                path: path.clone(),
                container_id: container_id.to_string(),
                source,
            })?;

        let file_name = file_name(&path).to_string();
        let staged_path = self.config.staging_dir.join(&file_name);
        tokio::fs::create_dir_all(&self.config.staging_dir).await.map_err(|source| {
            ContainerError::Staging { path: self.config.staging_dir.clone(), source }
        })?;
        // key material is never written once shutdown has begun
        if self.cancel.is_cancelled() {
            return Err(ContainerError::Cancelled);
        }
        tokio::fs::write(&staged_path, contents)
            .await
            .map_err(|source| ContainerError::Staging { path: staged_path.clone(), source })?;
        debug!(path = %staged_path.display(), "staged keystore");

        Ok(ExtractedArtifact { file_name, staged_path })
    }

    /// Stops and removes every container flagged running.
    ///
    /// Containers are killed without a grace period. A failure on one container is recorded and
    /// the sweep continues with the rest; all failures are reported together. Returns the number
    /// of containers removed.
    pub async fn stop_and_remove_all(&self) -> Result<usize, ContainerError> {
        let running: Vec<(String, String, String)> = self
            .registry()
            .iter()
            .filter(|(_, descriptor)| descriptor.running)
            .filter_map(|(role, descriptor)| {
                descriptor.container_id.clone().map(|id| {
                    (role.clone(), descriptor.container_name.clone(), id)
                })
            })
            .collect();

        let mut removed = 0;
        let mut failures = Vec::new();
        for (role, name, container_id) in running {
            debug!(%name, %container_id, "stopping container");
            let result = match self.engine.stop(&container_id).await {
                Ok(()) => self.engine.remove(&container_id).await,
                Err(err) => Err(err),
            };

            match result {
                Ok(()) => {
                    info!(%name, %container_id, "container removed");
                    if let Some(entry) = self.registry().get_mut(&role) {
                        entry.running = false;
                        entry.container_id = None;
                    }
                    removed += 1;
                }
                Err(err) => {
                    warn!(%name, %container_id, %err, "failed to tear down container");
                    failures.push((name, err));
                }
            }
        }

        if failures.is_empty() { Ok(removed) } else { Err(ContainerError::Teardown { failures }) }
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
