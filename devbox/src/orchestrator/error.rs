use std::io;

use thiserror::Error;

use super::Stage;
use crate::{
    bundler::BundlerClientError, containers::ContainerError, mempool::MempoolError,
    wallet::WalletError,
};

/// Error that ends a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A configured endpoint is not a valid URL.
    #[error("invalid endpoint url")]
    Url(#[from] url::ParseError),

    /// The configured bundler is not a bundler role.
    #[error("{0} is not a bundler")]
    NotABundler(String),

    /// A container step failed.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// The node became ready without staging its keystore.
    #[error("node became ready without a coinbase keystore")]
    MissingKeystore,

    /// Wallet bootstrap failed.
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// The bundler client could not be built.
    #[error(transparent)]
    Bundler(#[from] BundlerClientError),

    /// The mempool poller could not be started.
    #[error(transparent)]
    Mempool(#[from] MempoolError),

    /// The dashboard could not bind or stopped with an error.
    #[error("dashboard server failed")]
    Server(#[source] io::Error),

    /// A background service task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),

    /// A stage change was requested that the lifecycle does not allow.
    #[error("invalid stage transition {from} -> {to}")]
    InvalidTransition {
        /// Current stage.
        from: Stage,
        /// Requested stage.
        to: Stage,
    },

    /// A termination request arrived during startup.
    #[error("interrupted")]
    Interrupted,
}
