//! Background mirror of the bundler's pending user operations.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use alloy_primitives::{Address, B256, Bytes};
use alloy_sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    bundler::BundlerClientError,
    userop::{IEntryPoint, UserOperation},
    wallet::{NodeClient, NodeError},
};

/// Interval between two mempool refreshes.
pub const MEMPOOL_REFRESH_INTERVAL: Duration = Duration::from_secs(3);

/// Status of an operation in the local table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserOpStatus {
    /// Seen in the bundler's mempool.
    Pending,
}

/// An operation stored in the local table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolEntry {
    /// The operation as reported by the bundler.
    pub user_op: UserOperation,
    /// Local status.
    pub status: UserOpStatus,
}

/// Error returned by the mempool poller.
#[derive(Debug, Error)]
pub enum MempoolError {
    /// Fetching pending operations failed.
    #[error("failed to fetch pending user operations")]
    Fetch(#[from] BundlerClientError),

    /// Hashing an operation against the entry point failed.
    #[error("failed to hash user operation from {sender}")]
    Hash {
        /// Operation sender.
        sender: Address,
        /// Underlying node error.
        #[source]
        source: NodeError,
    },

    /// The entry point returned something other than a hash.
    #[error("entry point returned an undecodable hash: {0}")]
    HashDecode(String),

    /// The poller was started after it had been stopped.
    #[error("mempool poller was stopped and cannot be restarted")]
    Stopped,
}

/// Where pending operations come from.
#[async_trait]
pub trait PendingOpSource: Send + Sync + 'static {
    /// Returns every operation currently pending.
    async fn pending_ops(&self) -> Result<Vec<UserOperation>, BundlerClientError>;
}

/// Computes operation hashes.
#[async_trait]
pub trait UserOpHasher: Send + Sync + 'static {
    /// Returns the hash identifying `op`.
    async fn user_op_hash(&self, op: &UserOperation) -> Result<B256, MempoolError>;
}

/// Hashes operations by calling `getUserOpHash` on a deployed entry point.
#[derive(Debug)]
pub struct EntryPointHasher<C> {
    client: Arc<C>,
    entry_point: Address,
}

impl<C> EntryPointHasher<C> {
    /// Creates a hasher for the entry point at `entry_point`.
    pub const fn new(client: Arc<C>, entry_point: Address) -> Self {
        Self { client, entry_point }
    }

    /// Entry point the hashes are bound to.
    pub const fn entry_point(&self) -> Address {
        self.entry_point
    }
}

#[async_trait]
impl<C: NodeClient> UserOpHasher for EntryPointHasher<C> {
    async fn user_op_hash(&self, op: &UserOperation) -> Result<B256, MempoolError> {
        let call = IEntryPoint::getUserOpHashCall { userOp: op.pack() };
        let output = self
            .client
            .call(self.entry_point, Bytes::from(call.abi_encode()))
            .await
            .map_err(|source| MempoolError::Hash { sender: op.sender, source })?;
        B256::abi_decode(&output).map_err(|e| MempoolError::HashDecode(e.to_string()))
    }
}

type Table = Arc<Mutex<HashMap<B256, MempoolEntry>>>;

#[derive(Debug, Default)]
struct Lifecycle {
    task: Option<JoinHandle<()>>,
    stopped: bool,
}

/// Polls a [`PendingOpSource`] on a fixed interval and keeps a deduplicated table of what it saw.
///
/// The first entry stored under a hash is never replaced.
#[derive(Debug)]
pub struct MempoolPoller<S, H> {
    source: Arc<S>,
    hasher: Arc<H>,
    interval: Duration,
    table: Table,
    errors: Arc<AtomicU64>,
    cancel: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl<S: PendingOpSource, H: UserOpHasher> MempoolPoller<S, H> {
    /// Creates a stopped poller refreshing every [`MEMPOOL_REFRESH_INTERVAL`].
    pub fn new(source: Arc<S>, hasher: Arc<H>) -> Self {
        Self {
            source,
            hasher,
            interval: MEMPOOL_REFRESH_INTERVAL,
            table: Table::default(),
            errors: Arc::default(),
            cancel: CancellationToken::new(),
            lifecycle: Mutex::default(),
        }
    }

    /// Sets the refresh interval.
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the background refresh task.
    ///
    /// Calling it while running does nothing. A stopped poller cannot be started again.
    pub fn run(&self) -> Result<(), MempoolError> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.stopped {
            return Err(MempoolError::Stopped);
        }
        if lifecycle.task.is_some() {
            return Ok(());
        }

        info!(interval = ?self.interval, "starting mempool poller");
        let refresher = Refresher {
            source: Arc::clone(&self.source),
            hasher: Arc::clone(&self.hasher),
            table: Arc::clone(&self.table),
        };
        let errors = Arc::clone(&self.errors);
        let cancel = self.cancel.clone();
        let interval = self.interval;

        lifecycle.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = refresher.refresh().await {
                            let count = errors.fetch_add(1, Ordering::Relaxed) + 1;
                            warn!(%err, count, "could not refresh mempool");
                        }
                    }
                }
            }
            debug!("mempool poller exited");
        }));
        Ok(())
    }

    /// Stops the background task and waits for it to exit.
    ///
    /// Safe to call any number of times, running or not.
    pub async fn stop(&self) {
        let task = {
            let mut lifecycle = self.lifecycle();
            lifecycle.stopped = true;
            lifecycle.task.take()
        };
        self.cancel.cancel();

        if let Some(task) = task {
            info!("shutting down mempool poller");
            if let Err(err) = task.await {
                warn!(%err, "mempool poller task failed");
            }
        }
    }

    /// Whether the background task is active.
    pub fn is_running(&self) -> bool {
        self.lifecycle().task.is_some()
    }

    /// Number of refresh cycles that failed.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Runs one refresh cycle immediately.
    pub async fn refresh(&self) -> Result<usize, MempoolError> {
        Refresher {
            source: Arc::clone(&self.source),
            hasher: Arc::clone(&self.hasher),
            table: Arc::clone(&self.table),
        }
        .refresh()
        .await
    }

    /// Snapshot of the table, keyed by operation hash.
    pub fn snapshot(&self) -> HashMap<B256, MempoolEntry> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

struct Refresher<S, H> {
    source: Arc<S>,
    hasher: Arc<H>,
    table: Table,
}

impl<S: PendingOpSource, H: UserOpHasher> Refresher<S, H> {
    /// Fetches, hashes and inserts; returns the number of newly stored operations.
    ///
    /// Nothing is inserted unless every operation of the batch hashed successfully.
    async fn refresh(&self) -> Result<usize, MempoolError> {
        let ops = self.source.pending_ops().await?;
        debug!(count = ops.len(), "fetched pending user operations");

        let mut hashed = Vec::with_capacity(ops.len());
        for op in ops {
            hashed.push((self.hasher.user_op_hash(&op).await?, op));
        }

        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for (hash, user_op) in hashed {
            if table.contains_key(&hash) {
                debug!(%hash, "user operation already in mempool");
                continue;
            }
            table.insert(hash, MempoolEntry { user_op, status: UserOpStatus::Pending });
            debug!(%hash, "added user operation to mempool");
            added += 1;
        }
        Ok(added)
    }
}
