//! Wallet bootstrap error types.

use std::{io, path::PathBuf};

use alloy_primitives::{Address, B256};
use alloy_signer_local::LocalSignerError;
use thiserror::Error;

/// A failed node RPC call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{method} failed: {reason}")]
pub struct NodeError {
    /// JSON-RPC method that failed.
    pub method: &'static str,
    /// Error reported by the transport or the node.
    pub reason: String,
}

impl NodeError {
    /// Wraps any displayable error raised by `method`.
    pub fn new(method: &'static str, reason: impl std::fmt::Display) -> Self {
        Self { method, reason: reason.to_string() }
    }
}

/// Error raised while sending and confirming a single transaction.
#[derive(Debug, Error)]
pub enum TxError {
    /// A node call failed.
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Signing the transaction failed.
    #[error("failed to sign transaction: {0}")]
    Signing(#[from] alloy_signer::Error),

    /// No receipt showed up in time.
    #[error("no receipt for {tx_hash} after {timeout_secs}s")]
    ReceiptTimeout {
        /// Transaction hash.
        tx_hash: B256,
        /// Seconds waited.
        timeout_secs: u64,
    },

    /// The sender nonce did not advance after the receipt.
    #[error("nonce of {sender} did not reach {expected}")]
    NonceTimeout {
        /// Sending account.
        sender: Address,
        /// Nonce waited for.
        expected: u64,
    },

    /// The transaction was mined but reverted.
    #[error("transaction {0} reverted")]
    Reverted(B256),

    /// A creation receipt carried no contract address.
    #[error("receipt for {0} has no contract address")]
    MissingContractAddress(B256),

    /// The created address holds no code.
    #[error("no code at {0} after deployment")]
    EmptyCode(Address),
}

/// Error returned by the wallet bootstrapper.
#[derive(Debug, Error)]
pub enum WalletError {
    /// The node endpoint could not be reached.
    #[error("failed to connect to node at {url}")]
    Connect {
        /// Node endpoint.
        url: String,
        /// Underlying call error.
        #[source]
        source: NodeError,
    },

    /// A node call failed outside of a transaction.
    #[error(transparent)]
    Node(#[from] NodeError),

    /// A contract artifact could not be read.
    #[error("failed to read contract artifact {}", path.display())]
    ArtifactRead {
        /// Artifact path.
        path: PathBuf,
        /// Underlying io error.
        #[source]
        source: io::Error,
    },

    /// A contract artifact is not valid init code.
    #[error("invalid contract artifact {}: {reason}", path.display())]
    InvalidArtifact {
        /// Artifact path.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// Importing the coinbase keystore failed.
    #[error("failed to import keystore {}", path.display())]
    KeyImport {
        /// Keystore path.
        path: PathBuf,
        /// Underlying signer error.
        #[source]
        source: LocalSignerError,
    },

    /// Creating a new keystore entry failed.
    #[error("failed to generate keystore in {}", dir.display())]
    KeyGeneration {
        /// Keystore directory.
        dir: PathBuf,
        /// Underlying signer error.
        #[source]
        source: LocalSignerError,
    },

    /// A filesystem operation on the keystore directory failed.
    #[error("keystore io on {}", path.display())]
    KeystoreIo {
        /// Path involved.
        path: PathBuf,
        /// Underlying io error.
        #[source]
        source: io::Error,
    },

    /// Deriving a developer account failed.
    #[error("failed to derive account {index}: {reason}")]
    Derivation {
        /// Derivation index.
        index: u32,
        /// Reason reported by the derivation.
        reason: String,
    },

    /// Funding a developer account failed.
    #[error("failed to fund {to}")]
    Funding {
        /// Funded account.
        to: Address,
        /// Underlying transaction error.
        #[source]
        source: TxError,
    },

    /// Deploying a contract failed.
    #[error("failed to deploy {contract}")]
    Deployment {
        /// Contract name.
        contract: &'static str,
        /// Underlying transaction error.
        #[source]
        source: TxError,
    },

    /// The account factory would have been deployed against the zero address.
    #[error("account factory needs a deployed entry point")]
    ZeroEntryPoint,

    /// A blocking key operation was cancelled or panicked.
    #[error("key task failed: {0}")]
    Task(String),
}
