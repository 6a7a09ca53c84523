//! Container lifecycle error types.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Error returned by a [`ContainerEngine`](super::ContainerEngine) implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The Docker daemon rejected or failed a request.
    #[error("docker: {0}")]
    Docker(#[from] testcontainers::bollard::errors::Error),

    /// The archive returned by a file copy could not be read.
    #[error("archive: {0}")]
    Archive(#[source] io::Error),

    /// The requested file was not part of the copied archive.
    #[error("{0} not found in container archive")]
    FileNotInArchive(String),

    /// An exec could not be attached to.
    #[error("exec {0} started detached")]
    Detached(String),

    /// Any other engine failure.
    #[error("{0}")]
    Other(String),
}

/// Error returned by the container lifecycle manager.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The role is not part of the descriptor registry.
    #[error("role {0} is not supported")]
    UnsupportedRole(String),

    /// A bundler role was launched without resolved placeholders.
    #[error("role {0} needs wallet placeholders before it can launch")]
    MissingPlaceholders(String),

    /// A role that is already running was launched again.
    #[error("role {0} is already running")]
    AlreadyRunning(String),

    /// Pulling an image failed.
    #[error("failed to pull image {image}")]
    ImagePull {
        /// Image reference.
        image: String,
        /// Underlying engine error.
        #[source]
        source: EngineError,
    },

    /// Listing local images failed.
    #[error("failed to list local images")]
    ImageList(#[source] EngineError),

    /// Creating or starting a container failed.
    #[error("failed to launch {role} container")]
    Launch {
        /// Role name.
        role: String,
        /// Underlying engine error.
        #[source]
        source: EngineError,
    },

    /// Inspecting a container failed while waiting for it.
    #[error("failed to inspect container {container_id}")]
    Inspect {
        /// Engine id of the container.
        container_id: String,
        /// Underlying engine error.
        #[source]
        source: EngineError,
    },

    /// The container never reached the running state.
    #[error("container {container_id} not running after {attempts} checks (last status: {status})")]
    ReadinessTimeout {
        /// Engine id of the container.
        container_id: String,
        /// Number of inspections performed.
        attempts: u32,
        /// Last observed status.
        status: String,
    },

    /// The readiness wait was cancelled before completion.
    #[error("readiness wait cancelled")]
    Cancelled,

    /// No keystore file was found in the container.
    #[error("no keystore file matching {marker} under {dir} in container {container_id}")]
    ArtifactNotFound {
        /// Engine id of the container.
        container_id: String,
        /// Directory searched.
        dir: String,
        /// Name marker looked for.
        marker: String,
    },

    /// The artifact was found but could not be copied out.
    #[error("failed to extract {path} from container {container_id}")]
    ArtifactExtraction {
        /// Path inside the container.
        path: String,
        /// Engine id of the container.
        container_id: String,
        /// Underlying engine error.
        #[source]
        source: EngineError,
    },

    /// Writing the artifact to the staging directory failed.
    #[error("failed to stage artifact at {}", path.display())]
    Staging {
        /// Local destination.
        path: PathBuf,
        /// Underlying io error.
        #[source]
        source: io::Error,
    },

    /// Stopping or removing one or more containers failed.
    #[error("failed to tear down {} container(s)", failures.len())]
    Teardown {
        /// Container name and error for every failed container.
        failures: Vec<(String, EngineError)>,
    },
}
