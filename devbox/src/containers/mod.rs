//! Container roles, the engine seam and the lifecycle manager built on top of it.

mod descriptor;
pub use descriptor::{
    AA_BUNDLER_CONTAINER_NAME, AA_BUNDLER_ROLE, BENEFICIARY_PLACEHOLDER, ContainerDescriptor,
    ENTRYPOINT_PLACEHOLDER, ETH_PORT_PLACEHOLDER, GETH_CONTAINER_NAME, GETH_ROLE,
    MNEMONIC_PLACEHOLDER, PlaceholderSet, RoleKind, TRANSEPTOR_CONTAINER_NAME, TRANSEPTOR_ROLE,
    default_descriptors,
};

mod engine;
pub use engine::{BIND_ALL, ContainerEngine, ContainerStatus, DockerEngine, ExecOutput, LaunchSpec};

mod error;
pub use error::{ContainerError, EngineError};

mod manager;
pub use manager::{
    ContainerManager, ContainerManagerConfig, HOST_GATEWAY, KEYSTORE_MARKER, KEYSTORE_SEARCH_DIR,
    ReadinessPolicy,
};

mod readiness;
pub use readiness::{ExtractedArtifact, Readiness, ReadinessHandle, ReadinessSignal};
