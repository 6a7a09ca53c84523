//! Session sequencing: brings every service up in order and tears everything down on exit.
//!
//! Startup runs `images -> node -> wallet -> bundler -> mempool poller + dashboard`. A failure at
//! any step aborts the session; a termination request at any step shuts it down. Either way the
//! poller is stopped first, then the dashboard, then pending readiness tasks are joined, then every
//! container is removed, and the wallet directory is removed last.

use std::{
    future::Future,
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::{
    net::TcpListener,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    bundler::BundlerClient,
    config::DevboxConfig,
    containers::{
        ContainerEngine, ContainerError, ContainerManager, ContainerManagerConfig, GETH_ROLE,
        RoleKind,
    },
    mempool::{EntryPointHasher, MempoolPoller},
    server::{self, DashboardState},
    wallet::{ContractArtifacts, NodeConnector, Wallet, WalletConfig},
};

mod error;
pub use error::SessionError;

mod stage;
pub use stage::Stage;

mod summary;
pub use summary::SessionSummary;

/// Interface the dashboard listens on.
pub const DASHBOARD_BIND: &str = "127.0.0.1";

type Poller<C> = MempoolPoller<BundlerClient, EntryPointHasher<C>>;

/// Outcome of a session that was shut down on request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Final stage.
    pub stage: Stage,
    /// Containers stopped and removed.
    pub containers_removed: usize,
    /// Teardown steps that failed, one line each.
    pub teardown_failures: Vec<String>,
}

#[derive(Debug)]
struct DashboardHandle {
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct Services<C> {
    poller: Option<Arc<Poller<C>>>,
    dashboard: Option<DashboardHandle>,
    ready: Arc<AtomicBool>,
    /// Background services report fatal errors here.
    failed: mpsc::Sender<SessionError>,
    failures: mpsc::Receiver<SessionError>,
}

impl<C> Default for Services<C> {
    fn default() -> Self {
        let (failed, failures) = mpsc::channel(4);
        Self {
            poller: None,
            dashboard: None,
            ready: Arc::new(AtomicBool::new(false)),
            failed,
            failures,
        }
    }
}

/// Runs one devbox session.
#[derive(Debug)]
pub struct Orchestrator<E, N> {
    config: DevboxConfig,
    containers: ContainerManager<E>,
    connector: N,
    cancel: CancellationToken,
    stage: watch::Sender<Stage>,
}

impl<E: ContainerEngine, N: NodeConnector> Orchestrator<E, N> {
    /// Creates a session driving `engine` and reaching the node through `connector`.
    pub fn new(config: DevboxConfig, engine: Arc<E>, connector: N) -> Self {
        let cancel = CancellationToken::new();
        let manager_config =
            ContainerManagerConfig::new(config.staging_dir()).with_readiness(config.readiness);
        let containers = ContainerManager::new(engine, manager_config, cancel.clone());
        let (stage, _) = watch::channel(Stage::Init);
        Self { config, containers, connector, cancel, stage }
    }

    /// Session configuration.
    pub const fn config(&self) -> &DevboxConfig {
        &self.config
    }

    /// Container manager of this session.
    pub const fn containers(&self) -> &ContainerManager<E> {
        &self.containers
    }

    /// Subscribes to stage changes.
    pub fn subscribe(&self) -> watch::Receiver<Stage> {
        self.stage.subscribe()
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        *self.stage.borrow()
    }

    /// Token that shuts the session down when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Brings the session up and keeps it running until `shutdown` resolves or a service fails.
    ///
    /// Resources are released on every exit path. Returns a report when the session was shut down
    /// on request and the error that ended it otherwise.
    pub async fn run<F>(self, shutdown: F) -> Result<SessionReport, SessionError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let signal = tokio::spawn(async move {
            shutdown.await;
            info!("termination requested");
            cancel.cancel();
        });

        let mut services = Services::default();
        let outcome = match self.start(&mut services).await {
            Ok(()) => self.serve_until_stopped(&mut services).await,
            Err(err) => Err(err),
        };
        signal.abort();

        let failure = match outcome {
            Ok(()) | Err(SessionError::Interrupted) => {
                self.advance_or_warn(Stage::ShuttingDown);
                None
            }
            Err(err) => {
                error!(stage = %self.stage(), %err, "session failed");
                self.advance_or_warn(Stage::Aborted);
                Some(err)
            }
        };

        let (containers_removed, teardown_failures) = self.teardown(&mut services).await;

        match failure {
            Some(err) => Err(err),
            None => {
                self.advance_or_warn(Stage::Stopped);
                Ok(SessionReport { stage: self.stage(), containers_removed, teardown_failures })
            }
        }
    }

    async fn start(&self, services: &mut Services<N::Client>) -> Result<(), SessionError> {
        let config = &self.config;
        let node_url = config.node_url()?;
        let bundler_url = config.bundler_url()?;
        let dashboard_url = config.dashboard_url()?;

        if self.containers.kind(&config.bundler)? != RoleKind::Bundler {
            return Err(SessionError::NotABundler(config.bundler.clone()));
        }
        let artifacts = ContractArtifacts::load(&config.contracts_dir)?;

        let roles = [GETH_ROLE, config.bundler.as_str()];
        let pulled = self.interruptible(self.containers.ensure_images_present(&roles)).await?;
        debug!(?pulled, "images available");
        self.advance(Stage::ImagesPulled)?;

        let (_, node) = self.containers.launch(GETH_ROLE, config.eth_port, None).await?;
        self.advance(Stage::NodeStarting)?;
        let node = self.interruptible(node).await?;
        let keystore = node.artifact.ok_or(SessionError::MissingKeystore)?;
        self.advance(Stage::NodeReady)?;

        let wallet_config = WalletConfig::new(&config.wallet_dir);
        let wallet = self
            .interruptible(Wallet::bootstrap(
                &self.connector,
                &node_url,
                &keystore.staged_path,
                &artifacts,
                &wallet_config,
            ))
            .await?;
        let wallet = Arc::new(wallet);
        let state = wallet.state();
        self.advance(Stage::WalletBootstrapped)?;

        let placeholders = state.placeholders(config.eth_port);
        let (_, bundler) = self
            .containers
            .launch(&config.bundler, config.bundler_port, Some(&placeholders))
            .await?;
        self.advance(Stage::BundlerStarting)?;
        self.interruptible(bundler).await?;
        self.advance(Stage::BundlerReady)?;

        let source = Arc::new(BundlerClient::new(bundler_url.clone())?);
        let entry_point = state.contracts.entry_point;
        let hasher = Arc::new(EntryPointHasher::new(Arc::clone(wallet.client()), entry_point));
        let poller =
            Arc::new(MempoolPoller::new(source, hasher).with_interval(config.mempool_interval));
        poller.run()?;
        services.poller = Some(Arc::clone(&poller));

        let listener = TcpListener::bind((DASHBOARD_BIND, config.http_port))
            .await
            .map_err(SessionError::Server)?;
        let dashboard = DashboardState::new(wallet, poller, Arc::clone(&services.ready));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(watch_dashboard(
            listener,
            dashboard,
            cancel.clone(),
            services.failed.clone(),
        ));
        services.dashboard = Some(DashboardHandle { task, cancel });

        services.ready.store(true, Ordering::SeqCst);
        self.advance(Stage::ServicesRunning)?;

        let summary = SessionSummary {
            node_url,
            bundler_url,
            dashboard_url,
            bundler: config.bundler.clone(),
            wallet: state,
        };
        println!("{summary}");
        println!("\nPress Ctrl+C to stop...");
        Ok(())
    }

    /// Waits for a termination request or the first background failure.
    async fn serve_until_stopped(
        &self,
        services: &mut Services<N::Client>,
    ) -> Result<(), SessionError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Ok(()),
            Some(err) = services.failures.recv() => Err(err),
        }
    }

    /// Releases everything in reverse startup order, continuing past failures.
    async fn teardown(&self, services: &mut Services<N::Client>) -> (usize, Vec<String>) {
        self.cancel.cancel();
        services.ready.store(false, Ordering::SeqCst);
        let mut failures = Vec::new();

        if let Some(poller) = services.poller.take() {
            poller.stop().await;
            info!(errors = poller.error_count(), "mempool poller stopped");
        }

        if let Some(DashboardHandle { mut task, cancel }) = services.dashboard.take() {
            cancel.cancel();
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => failures.push(format!("dashboard task: {err}")),
                Err(_) => {
                    task.abort();
                    failures.push(format!(
                        "dashboard: not stopped within {:?}",
                        self.config.shutdown_timeout
                    ));
                }
            }
        }

        while let Ok(err) = services.failures.try_recv() {
            failures.push(format!("dashboard: {err}"));
        }

        // a readiness task may still be staging the node keystore
        let aborted = self.containers.join_readiness_tasks(self.config.shutdown_timeout).await;
        if aborted > 0 {
            failures.push(format!(
                "{aborted} readiness task(s) not stopped within {:?}",
                self.config.shutdown_timeout
            ));
        }

        let running = self.containers.running_roles().len();
        let removed = match self.containers.stop_and_remove_all().await {
            Ok(removed) => removed,
            Err(ContainerError::Teardown { failures: containers }) => {
                let removed = running.saturating_sub(containers.len());
                failures.extend(containers.into_iter().map(|(name, err)| format!("{name}: {err}")));
                removed
            }
            Err(err) => {
                failures.push(err.to_string());
                0
            }
        };
        info!(removed, "containers removed");

        match tokio::fs::remove_dir_all(&self.config.wallet_dir).await {
            Ok(()) => info!(dir = %self.config.wallet_dir.display(), "wallet directory removed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => failures.push(format!("{}: {err}", self.config.wallet_dir.display())),
        }

        for failure in &failures {
            warn!(%failure, "teardown step failed");
        }
        (removed, failures)
    }

    async fn interruptible<T, StepError>(
        &self,
        step: impl Future<Output = Result<T, StepError>>,
    ) -> Result<T, SessionError>
    where
        SessionError: From<StepError>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SessionError::Interrupted),
            res = step => res.map_err(SessionError::from),
        }
    }

    fn advance(&self, to: Stage) -> Result<(), SessionError> {
        let from = self.stage();
        if !from.can_transition_to(to) {
            return Err(SessionError::InvalidTransition { from, to });
        }
        self.stage.send_replace(to);
        info!(%from, %to, "stage changed");
        Ok(())
    }

    fn advance_or_warn(&self, to: Stage) {
        if let Err(err) = self.advance(to) {
            warn!(%err, "ignoring stage change");
        }
    }
}

/// Serves the dashboard and reports an exit that was not requested through `cancel`.
async fn watch_dashboard(
    listener: TcpListener,
    state: DashboardState,
    cancel: CancellationToken,
    failed: mpsc::Sender<SessionError>,
) {
    let err = match server::serve(listener, server::router(state), cancel.clone()).await {
        Ok(()) if cancel.is_cancelled() => return,
        Ok(()) => SessionError::Task("dashboard server exited".to_string()),
        Err(err) => SessionError::Server(err),
    };
    if failed.send(err).await.is_err() {
        debug!("session already finished, dropping dashboard failure");
    }
}
