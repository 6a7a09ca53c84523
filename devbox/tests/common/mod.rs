//! In-memory container engine, node and bundler shared by the integration tests.

#![allow(dead_code, unreachable_pub)]

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    net::SocketAddr,
    path::Path,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy_consensus::TxEnvelope;
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{Address, B256, Bytes, TxKind, U256, keccak256};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use axum::{Json, Router, routing::post};
use devbox::{
    containers::{
        ContainerEngine, ContainerStatus, EngineError, ExecOutput, LaunchSpec, ReadinessPolicy,
    },
    wallet::{
        ACCOUNT_FACTORY_ARTIFACT, ENTRY_POINT_ARTIFACT, GLOBAL_COUNTER_ARTIFACT, KEYSTORE_PASSWORD,
        NodeClient, NodeConnector, NodeError, ReceiptSummary,
    },
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

/// File name the mock node's keystore is exposed under.
pub const COINBASE_KEYSTORE: &str = "UTC--2024-06-01T12-00-00.000000000Z--coinbase";

/// Readiness polling fast enough for tests.
pub fn fast_readiness() -> ReadinessPolicy {
    ReadinessPolicy::default()
        .with_interval(Duration::from_millis(10))
        .with_max_attempts(20)
        .with_settle(Duration::ZERO)
}

/// Creates a coinbase keystore and returns its signer and encrypted bytes.
pub fn coinbase_keystore() -> (PrivateKeySigner, Vec<u8>) {
    let dir = tempfile::tempdir().unwrap();
    let (signer, _) = PrivateKeySigner::new_keystore(
        dir.path(),
        &mut rand::thread_rng(),
        KEYSTORE_PASSWORD,
        Some(COINBASE_KEYSTORE),
    )
    .unwrap();
    let bytes = std::fs::read(dir.path().join(COINBASE_KEYSTORE)).unwrap();
    (signer, bytes)
}

/// Writes small but non-empty init code for every contract into `dir`.
pub fn write_artifacts(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(ENTRY_POINT_ARTIFACT), "0x60016000").unwrap();
    std::fs::write(dir.join(ACCOUNT_FACTORY_ARTIFACT), "0x60026000").unwrap();
    std::fs::write(dir.join(GLOBAL_COUNTER_ARTIFACT), "0x60036000\n").unwrap();
}

#[derive(Debug, Default)]
pub struct EngineState {
    /// Images reported as cached.
    pub cached: Vec<String>,
    pub pulled: Vec<String>,
    pub launched: Vec<LaunchSpec>,
    pub running: BTreeSet<String>,
    pub removed: Vec<String>,
    /// Container ids whose stop fails.
    pub fail_stop: HashSet<String>,
    /// Status calls answered with `created` before `running`.
    pub starting_polls: u32,
    pub status_calls: u32,
    /// Keystore exposed by every container, `None` for an empty search result.
    pub keystore: Option<Vec<u8>>,
    /// How long a file copy takes.
    pub copy_delay: Duration,
    pub calls: usize,
}

/// Container engine keeping everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<EngineState>>,
}

impl MockEngine {
    pub fn with_keystore(keystore: Vec<u8>) -> Self {
        let engine = Self::default();
        engine.state().keystore = Some(keystore);
        engine
    }

    pub fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap()
    }

    fn record(&self) -> MutexGuard<'_, EngineState> {
        let mut state = self.state();
        state.calls += 1;
        state
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn list_image_refs(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.record().cached.clone())
    }

    async fn pull_image(&self, image_ref: &str) -> Result<(), EngineError> {
        self.record().pulled.push(image_ref.to_string());
        Ok(())
    }

    async fn create_and_start(&self, spec: &LaunchSpec) -> Result<String, EngineError> {
        let mut state = self.record();
        let id = format!("id-{}", spec.name);
        state.launched.push(spec.clone());
        state.running.insert(id.clone());
        Ok(id)
    }

    async fn status(&self, container_id: &str) -> Result<ContainerStatus, EngineError> {
        let mut state = self.record();
        state.status_calls += 1;
        if !state.running.contains(container_id) {
            return Ok(ContainerStatus::Exited);
        }
        if state.status_calls <= state.starting_polls {
            return Ok(ContainerStatus::Created);
        }
        Ok(ContainerStatus::Running)
    }

    async fn exec(&self, _container_id: &str, cmd: &[&str]) -> Result<ExecOutput, EngineError> {
        let state = self.record();
        let dir = cmd.get(1).copied().unwrap_or("/tmp");
        let stdout = match state.keystore {
            Some(_) => format!("{dir}/keystore/{COINBASE_KEYSTORE}\n"),
            None => String::new(),
        };
        Ok(ExecOutput { exit_code: 0, stdout: stdout.into_bytes(), stderr: Vec::new() })
    }

    async fn copy_file_from(
        &self,
        _container_id: &str,
        path: &str,
    ) -> Result<Vec<u8>, EngineError> {
        let (delay, keystore) = {
            let state = self.record();
            (state.copy_delay, state.keystore.clone())
        };
        tokio::time::sleep(delay).await;
        keystore.ok_or_else(|| EngineError::FileNotInArchive(path.into()))
    }

    async fn stop(&self, container_id: &str) -> Result<(), EngineError> {
        let state = self.record();
        if state.fail_stop.contains(container_id) {
            return Err(EngineError::Other(format!("cannot stop {container_id}")));
        }
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> Result<(), EngineError> {
        let mut state = self.record();
        state.running.remove(container_id);
        state.removed.push(container_id.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NodeState {
    pub chain_id: u64,
    pub nonce: u64,
    /// Nonce of every accepted transaction, in order.
    pub sent_nonces: Vec<u64>,
    pub balances: HashMap<Address, U256>,
    pub receipts: HashMap<B256, ReceiptSummary>,
    pub code: HashMap<Address, Bytes>,
    /// Init code of every contract creation, in order.
    pub deployments: Vec<Bytes>,
    /// Targets of read-only calls.
    pub calls: Vec<Address>,
    pub fail_balance: bool,
    pub revert_deployments: bool,
    pub drop_code: bool,
}

/// Node that mines every transaction instantly.
#[derive(Debug, Clone)]
pub struct MockNode {
    state: Arc<Mutex<NodeState>>,
}

impl Default for MockNode {
    fn default() -> Self {
        let state = NodeState { chain_id: 1337, ..Default::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }
}

impl MockNode {
    pub fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn chain_id(&self) -> Result<u64, NodeError> {
        Ok(self.state().chain_id)
    }

    async fn balance(&self, address: Address) -> Result<U256, NodeError> {
        let state = self.state();
        if state.fail_balance {
            return Err(NodeError::new("eth_getBalance", "connection refused"));
        }
        Ok(state.balances.get(&address).copied().unwrap_or_default())
    }

    async fn nonce(&self, _address: Address) -> Result<u64, NodeError> {
        Ok(self.state().nonce)
    }

    async fn gas_price(&self) -> Result<u128, NodeError> {
        Ok(1_000_000_000)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, NodeError> {
        const METHOD: &str = "eth_sendRawTransaction";
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|e| NodeError::new(METHOD, e))?;
        let TxEnvelope::Eip1559(signed) = envelope else {
            return Err(NodeError::new(METHOD, "unexpected transaction type"));
        };
        let tx = signed.tx();
        let tx_hash = *signed.hash();

        let mut state = self.state();
        if tx.nonce != state.nonce {
            return Err(NodeError::new(METHOD, format!("nonce {} != {}", tx.nonce, state.nonce)));
        }
        state.nonce += 1;
        state.sent_nonces.push(tx.nonce);

        let mut receipt = ReceiptSummary {
            tx_hash,
            success: true,
            contract_address: None,
            block_number: Some(state.nonce),
        };
        match tx.to {
            TxKind::Call(to) => {
                *state.balances.entry(to).or_default() += tx.value;
            }
            TxKind::Create => {
                let address = Address::ZERO.create(tx.nonce);
                state.deployments.push(tx.input.clone());
                receipt.success = !state.revert_deployments;
                receipt.contract_address = Some(address);
                if !state.drop_code {
                    state.code.insert(address, tx.input.clone());
                }
            }
        }
        state.receipts.insert(tx_hash, receipt);
        Ok(tx_hash)
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<ReceiptSummary>, NodeError> {
        Ok(self.state().receipts.get(&tx_hash).cloned())
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, NodeError> {
        Ok(self.state().code.get(&address).cloned().unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, NodeError> {
        self.state().calls.push(to);
        Ok(Bytes::from(keccak256(&data).to_vec()))
    }
}

/// Hands out clones of one [`MockNode`].
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    pub node: MockNode,
    pub refuse: bool,
}

impl NodeConnector for MockConnector {
    type Client = MockNode;

    fn connect(&self, url: &Url) -> Result<Self::Client, NodeError> {
        if self.refuse {
            return Err(NodeError::new("connect", format!("{url} refused")));
        }
        Ok(self.node.clone())
    }
}

/// A pending operation in bundler wire format.
pub fn wire_user_op(sender: Address, nonce: u64) -> Value {
    json!({
        "sender": sender,
        "nonce": format!("{nonce:#x}"),
        "callData": "0x",
        "callGasLimit": "0x5208",
        "verificationGasLimit": "0x10000",
        "preVerificationGas": "0x5000",
        "maxFeePerGas": "0x3b9aca00",
        "maxPriorityFeePerGas": "0xf4240",
        "signature": "0x"
    })
}

/// Serves a bundler answering `debug_bundler_dumpMempool` with `ops` on an ephemeral port.
pub async fn spawn_bundler(ops: Vec<Value>) -> SocketAddr {
    spawn_counting_bundler(ops).await.0
}

/// Like [`spawn_bundler`], also counting `debug_bundler_dumpMempool` requests.
pub async fn spawn_counting_bundler(ops: Vec<Value>) -> (SocketAddr, Arc<AtomicUsize>) {
    let ops = Arc::new(ops);
    let dumps = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&dumps);
    let router = Router::new().route(
        "/",
        post(move |Json(body): Json<Value>| {
            let ops = Arc::clone(&ops);
            let counter = Arc::clone(&counter);
            async move {
                let result = match body["method"].as_str() {
                    Some("debug_bundler_dumpMempool") => {
                        counter.fetch_add(1, Ordering::SeqCst);
                        json!(*ops)
                    }
                    _ => json!("ok"),
                };
                Json(json!({ "jsonrpc": "2.0", "id": body["id"], "result": result }))
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    (addr, dumps)
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

/// Polls `check` until it holds or five seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
