//! The container engine seam and its Docker implementation.

use std::{collections::HashMap, fmt, io::Read, path::Path};

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use testcontainers::bollard::{
    Docker,
    container::{
        Config, CreateContainerOptions, DownloadFromContainerOptions, InspectContainerOptions,
        LogOutput, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    },
    exec::{CreateExecOptions, StartExecResults},
    image::{CreateImageOptions, ListImagesOptions},
    secret::{HostConfig, PortBinding},
};
use tracing::debug;

use super::EngineError;

/// Host address every published port is bound to.
pub const BIND_ALL: &str = "0.0.0.0";

/// Status reported by container inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Created but not started.
    Created,
    /// Running.
    Running,
    /// Exited or dead.
    Exited,
    /// Any other engine status, kept verbatim.
    Other(String),
}

impl ContainerStatus {
    /// Parses the status string the engine reports.
    pub fn from_engine(status: &str) -> Self {
        match status {
            "created" => Self::Created,
            "running" => Self::Running,
            "exited" | "dead" => Self::Exited,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Running => f.write_str("running"),
            Self::Exited => f.write_str("exited"),
            Self::Other(status) => f.write_str(status),
        }
    }
}

/// Everything the engine needs to create and start one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Resolved command arguments.
    pub cmd: Vec<String>,
    /// Resolved `KEY=value` environment.
    pub env: Vec<String>,
    /// Port published on [`BIND_ALL`].
    pub host_port: u16,
    /// Port inside the container the host port maps to.
    pub container_port: u16,
    /// Extra `/etc/hosts` entries, `host:ip`.
    pub extra_hosts: Vec<String>,
}

/// Output of a finished exec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Process exit code.
    pub exit_code: i64,
    /// Captured stdout.
    pub stdout: Vec<u8>,
    /// Captured stderr.
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    /// Returns true when the process exited with code zero.
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout split into non-empty trimmed lines.
    pub fn stdout_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Operations the lifecycle manager needs from a container engine.
#[async_trait]
pub trait ContainerEngine: Send + Sync + 'static {
    /// Lists the `name:tag` references of every locally cached image.
    async fn list_image_refs(&self) -> Result<Vec<String>, EngineError>;

    /// Pulls an image reference.
    async fn pull_image(&self, image_ref: &str) -> Result<(), EngineError>;

    /// Creates and starts a container, returning its id.
    async fn create_and_start(&self, spec: &LaunchSpec) -> Result<String, EngineError>;

    /// Inspects the current status of a container.
    async fn status(&self, container_id: &str) -> Result<ContainerStatus, EngineError>;

    /// Runs a command inside a container and waits for it to exit.
    async fn exec(&self, container_id: &str, cmd: &[&str]) -> Result<ExecOutput, EngineError>;

    /// Copies one regular file out of a container.
    async fn copy_file_from(&self, container_id: &str, path: &str) -> Result<Vec<u8>, EngineError>;

    /// Stops a container without a grace period.
    async fn stop(&self, container_id: &str) -> Result<(), EngineError>;

    /// Removes a stopped container.
    async fn remove(&self, container_id: &str) -> Result<(), EngineError>;
}

/// [`ContainerEngine`] backed by the local Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connects to the Docker daemon using the local defaults (socket or `DOCKER_HOST`).
    pub fn connect() -> Result<Self, EngineError> {
        Ok(Self { docker: Docker::connect_with_local_defaults()? })
    }

    /// Wraps an existing client.
    pub const fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn list_image_refs(&self) -> Result<Vec<String>, EngineError> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> { all: false, ..Default::default() }))
            .await?;
        Ok(images.into_iter().flat_map(|image| image.repo_tags).collect())
    }

    async fn pull_image(&self, image_ref: &str) -> Result<(), EngineError> {
        let (from_image, tag) = split_reference(image_ref);
        let mut pull_stream = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: from_image.to_string(),
                tag: tag.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(progress) = pull_stream.try_next().await? {
            if let Some(status) = progress.status {
                debug!(image = image_ref, %status, "pull progress");
            }
        }
        Ok(())
    }

    async fn create_and_start(&self, spec: &LaunchSpec) -> Result<String, EngineError> {
        let port_key = format!("{}/tcp", spec.container_port);
        let host_config = HostConfig {
            port_bindings: Some(HashMap::from([(
                port_key.clone(),
                Some(vec![PortBinding {
                    host_ip: Some(BIND_ALL.to_string()),
                    host_port: Some(spec.host_port.to_string()),
                }]),
            )])),
            extra_hosts: (!spec.extra_hosts.is_empty()).then(|| spec.extra_hosts.clone()),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            env: Some(spec.env.clone()),
            exposed_ports: Some(HashMap::from([(port_key, HashMap::new())])),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions { name: spec.name.clone(), ..Default::default() }),
                config,
            )
            .await?;

        self.docker.start_container(&created.id, None::<StartContainerOptions<String>>).await?;
        Ok(created.id)
    }

    async fn status(&self, container_id: &str) -> Result<ContainerStatus, EngineError> {
        let inspect =
            self.docker.inspect_container(container_id, None::<InspectContainerOptions>).await?;
        let status = inspect
            .state
            .and_then(|state| state.status)
            .map(|status| status.to_string())
            .unwrap_or_default();
        Ok(ContainerStatus::from_engine(&status))
    }

    async fn exec(&self, container_id: &str, cmd: &[&str]) -> Result<ExecOutput, EngineError> {
        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(cmd.iter().map(|arg| arg.to_string()).collect::<Vec<_>>()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        else {
            return Err(EngineError::Detached(exec.id));
        };

        let mut result = ExecOutput::default();
        while let Some(chunk) = output.next().await {
            match chunk? {
                LogOutput::StdOut { message } => result.stdout.extend_from_slice(&message),
                LogOutput::StdErr { message } => result.stderr.extend_from_slice(&message),
                LogOutput::StdIn { .. } | LogOutput::Console { .. } => {}
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        result.exit_code = inspect.exit_code.unwrap_or_default();
        Ok(result)
    }

    async fn copy_file_from(&self, container_id: &str, path: &str) -> Result<Vec<u8>, EngineError> {
        let archive: Vec<u8> = self
            .docker
            .download_from_container(
                container_id,
                Some(DownloadFromContainerOptions { path: path.to_string() }),
            )
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;

        read_file_from_tar(&archive, path)
    }

    async fn stop(&self, container_id: &str) -> Result<(), EngineError> {
        self.docker.stop_container(container_id, Some(StopContainerOptions { t: 0 })).await?;
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> Result<(), EngineError> {
        self.docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions { force: false, ..Default::default() }),
            )
            .await?;
        Ok(())
    }
}

/// Splits `registry/name:tag` into name and tag, defaulting to `latest`.
fn split_reference(image_ref: &str) -> (&str, &str) {
    let name_start = image_ref.rfind('/').map_or(0, |idx| idx + 1);
    match image_ref[name_start..].rfind(':') {
        Some(idx) => (&image_ref[..name_start + idx], &image_ref[name_start + idx + 1..]),
        None => (image_ref, "latest"),
    }
}

/// Reads the single regular file named like `path` out of a tar archive.
fn read_file_from_tar(archive: &[u8], path: &str) -> Result<Vec<u8>, EngineError> {
    let wanted = Path::new(path)
        .file_name()
        .ok_or_else(|| EngineError::FileNotInArchive(path.to_string()))?;

    let mut archive = tar::Archive::new(archive);
    for entry in archive.entries().map_err(EngineError::Archive)? {
        let mut entry = entry.map_err(EngineError::Archive)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .map_err(EngineError::Archive)?
            .file_name()
            .is_some_and(|name| name == wanted);
        if matches {
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).map_err(EngineError::Archive)?;
            return Ok(contents);
        }
    }

    Err(EngineError::FileNotInArchive(path.to_string()))
}
