//! One-shot readiness signalling between a launch task and the stage waiting on it.

use std::{
    future::Future,
    path::PathBuf,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot;

use super::ContainerError;

/// What a dependent stage learns once a container is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// Engine id of the ready container.
    pub container_id: String,
    /// Host port the container is reachable on.
    pub host_port: u16,
    /// Artifact extracted during startup, for roles that produce one.
    pub artifact: Option<ExtractedArtifact>,
}

/// A file copied out of a container into the local staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArtifact {
    /// File name as found in the container.
    pub file_name: String,
    /// Local path the bytes were written to.
    pub staged_path: PathBuf,
}

/// Sending half of a readiness pair.
///
/// Closing consumes the signal, so it can be closed at most once. Dropping it without closing
/// resolves the handle with [`ContainerError::Cancelled`].
#[derive(Debug)]
pub struct ReadinessSignal {
    tx: oneshot::Sender<Result<Readiness, ContainerError>>,
}

impl ReadinessSignal {
    /// Creates a connected signal/handle pair.
    pub fn pair() -> (Self, ReadinessHandle) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, ReadinessHandle { rx })
    }

    /// Marks the container ready.
    pub fn close(self, readiness: Readiness) {
        let _ = self.tx.send(Ok(readiness));
    }

    /// Reports that the container will never become ready.
    pub fn fail(self, error: ContainerError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Receiving half of a readiness pair; resolves once the launch finishes either way.
#[derive(Debug)]
pub struct ReadinessHandle {
    rx: oneshot::Receiver<Result<Readiness, ContainerError>>,
}

impl ReadinessHandle {
    /// A handle that is already resolved.
    pub fn ready(readiness: Readiness) -> Self {
        let (signal, handle) = ReadinessSignal::pair();
        signal.close(readiness);
        handle
    }
}

impl Future for ReadinessHandle {
    type Output = Result<Readiness, ContainerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| Err(ContainerError::Cancelled)))
    }
}
