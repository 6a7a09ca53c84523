//! Dashboard JSON API.
//!
//! - `GET /health`        liveness, always 200 while the listener is up
//! - `GET /health/ready`  200 once every service is running, 503 before
//! - `GET /accounts`      developer accounts with freshly read balances
//! - `GET /mempool`       user operations seen in the bundler mempool, keyed by hash

use std::{
    collections::{BTreeMap, HashMap},
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use alloy_primitives::B256;
use async_trait::async_trait;
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    mempool::{MempoolEntry, MempoolPoller, PendingOpSource, UserOpHasher},
    wallet::{DevAccount, NodeClient, Wallet, WalletError},
};

/// Source of the developer account listing.
#[async_trait]
pub trait AccountSource: Send + Sync + 'static {
    /// Developer accounts with current balances.
    async fn dev_accounts(&self) -> Result<Vec<DevAccount>, WalletError>;
}

#[async_trait]
impl<C: NodeClient> AccountSource for Wallet<C> {
    async fn dev_accounts(&self) -> Result<Vec<DevAccount>, WalletError> {
        self.refresh_dev_account_balances().await?;
        Ok(self.state().accounts)
    }
}

/// Source of the mempool listing.
pub trait MempoolView: Send + Sync + 'static {
    /// Snapshot of the stored operations.
    fn user_ops(&self) -> HashMap<B256, MempoolEntry>;
}

impl<S: PendingOpSource, H: UserOpHasher> MempoolView for MempoolPoller<S, H> {
    fn user_ops(&self) -> HashMap<B256, MempoolEntry> {
        self.snapshot()
    }
}

/// State shared by every handler.
#[derive(Clone)]
pub struct DashboardState {
    accounts: Arc<dyn AccountSource>,
    mempool: Arc<dyn MempoolView>,
    ready: Arc<AtomicBool>,
}

impl std::fmt::Debug for DashboardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardState").field("ready", &self.ready).finish_non_exhaustive()
    }
}

impl DashboardState {
    /// Creates handler state; `/health/ready` answers 200 once `ready` is set.
    pub fn new(
        accounts: Arc<dyn AccountSource>,
        mempool: Arc<dyn MempoolView>,
        ready: Arc<AtomicBool>,
    ) -> Self {
        Self { accounts, mempool, ready }
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn ready(State(state): State<DashboardState>) -> impl IntoResponse {
    if state.ready.load(Ordering::Relaxed) {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "starting" })))
    }
}

async fn accounts(State(state): State<DashboardState>) -> impl IntoResponse {
    match state.accounts.dev_accounts().await {
        Ok(accounts) => (StatusCode::OK, Json(json!({ "accounts": accounts }))),
        Err(err) => {
            warn!(%err, "failed to list developer accounts");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": err.to_string() })))
        }
    }
}

async fn mempool(State(state): State<DashboardState>) -> impl IntoResponse {
    let user_ops: BTreeMap<String, MempoolEntry> = state
        .mempool
        .user_ops()
        .into_iter()
        .map(|(hash, entry)| (hash.to_string(), entry))
        .collect();
    Json(json!({ "userOps": user_ops }))
}

/// Builds the dashboard router.
pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        .route("/accounts", get(accounts))
        .route("/mempool", get(mempool))
        .with_state(state)
}

/// Serves `router` on `listener` until `cancel` fires, then drains in-flight requests.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    info!(?addr, "dashboard server started");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("dashboard server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, U256, b256};

    use super::*;
    use crate::{mempool::UserOpStatus, userop::UserOperation};

    struct FixedAccounts(Result<Vec<DevAccount>, ()>);

    #[async_trait]
    impl AccountSource for FixedAccounts {
        async fn dev_accounts(&self) -> Result<Vec<DevAccount>, WalletError> {
            self.0.clone().map_err(|()| WalletError::Task("node unreachable".into()))
        }
    }

    struct FixedMempool(HashMap<B256, MempoolEntry>);

    impl MempoolView for FixedMempool {
        fn user_ops(&self) -> HashMap<B256, MempoolEntry> {
            self.0.clone()
        }
    }

    async fn start_test_server(
        accounts: FixedAccounts,
        mempool: FixedMempool,
        ready: Arc<AtomicBool>,
    ) -> (SocketAddr, CancellationToken) {
        let cancel = CancellationToken::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = DashboardState::new(Arc::new(accounts), Arc::new(mempool), ready);
        tokio::spawn(serve(listener, router(state), cancel.clone()));
        (addr, cancel)
    }

    fn account() -> DevAccount {
        DevAccount {
            index: 0,
            address: Address::repeat_byte(0x11),
            private_key: B256::repeat_byte(0x22),
            balance: U256::from(5),
        }
    }

    #[tokio::test]
    async fn health_and_readiness() {
        let ready = Arc::new(AtomicBool::new(false));
        let (addr, cancel) = start_test_server(
            FixedAccounts(Ok(vec![])),
            FixedMempool(HashMap::new()),
            Arc::clone(&ready),
        )
        .await;

        let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert_eq!(resp.status(), 200);

        let resp = reqwest::get(format!("http://{addr}/health/ready")).await.unwrap();
        assert_eq!(resp.status(), 503);

        ready.store(true, Ordering::SeqCst);
        let resp = reqwest::get(format!("http://{addr}/health/ready")).await.unwrap();
        assert_eq!(resp.status(), 200);

        cancel.cancel();
    }

    #[tokio::test]
    async fn accounts_are_listed() {
        let (addr, cancel) = start_test_server(
            FixedAccounts(Ok(vec![account()])),
            FixedMempool(HashMap::new()),
            Arc::new(AtomicBool::new(true)),
        )
        .await;

        let body: serde_json::Value =
            reqwest::get(format!("http://{addr}/accounts")).await.unwrap().json().await.unwrap();
        assert_eq!(body["accounts"].as_array().unwrap().len(), 1);
        assert_eq!(body["accounts"][0]["balance"], "0x5");

        cancel.cancel();
    }

    #[tokio::test]
    async fn account_failure_is_500() {
        let (addr, cancel) = start_test_server(
            FixedAccounts(Err(())),
            FixedMempool(HashMap::new()),
            Arc::new(AtomicBool::new(true)),
        )
        .await;

        let resp = reqwest::get(format!("http://{addr}/accounts")).await.unwrap();
        assert_eq!(resp.status(), 500);

        cancel.cancel();
    }

    #[tokio::test]
    async fn mempool_is_keyed_by_hash() {
        let hash = b256!("0x0101010101010101010101010101010101010101010101010101010101010101");
        let entry =
            MempoolEntry { user_op: UserOperation::default(), status: UserOpStatus::Pending };
        let (addr, cancel) = start_test_server(
            FixedAccounts(Ok(vec![])),
            FixedMempool(HashMap::from([(hash, entry)])),
            Arc::new(AtomicBool::new(true)),
        )
        .await;

        let body: serde_json::Value =
            reqwest::get(format!("http://{addr}/mempool")).await.unwrap().json().await.unwrap();
        assert_eq!(body["userOps"][hash.to_string()]["status"], "pending");

        cancel.cancel();
    }

    #[tokio::test]
    async fn cancel_stops_the_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let state = DashboardState::new(
            Arc::new(FixedAccounts(Ok(vec![]))),
            Arc::new(FixedMempool(HashMap::new())),
            Arc::new(AtomicBool::new(true)),
        );
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(listener, router(state), cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}
