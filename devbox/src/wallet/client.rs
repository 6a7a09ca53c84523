//! The node RPC seam used by the wallet and the mempool hasher.

use alloy_eips::BlockNumberOrTag;
use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types_eth::{TransactionInput, TransactionRequest};
use async_trait::async_trait;
use url::Url;

use super::NodeError;

/// The parts of a transaction receipt the wallet acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptSummary {
    /// Transaction hash.
    pub tx_hash: B256,
    /// Whether execution succeeded.
    pub success: bool,
    /// Created contract, for creation transactions.
    pub contract_address: Option<Address>,
    /// Block the transaction was included in.
    pub block_number: Option<u64>,
}

/// Chain reads and writes needed to bootstrap a wallet.
#[async_trait]
pub trait NodeClient: Send + Sync + 'static {
    /// Chain id reported by the node.
    async fn chain_id(&self) -> Result<u64, NodeError>;

    /// Balance of `address` at the latest block.
    async fn balance(&self, address: Address) -> Result<U256, NodeError>;

    /// Transaction count of `address` at the latest block.
    async fn nonce(&self, address: Address) -> Result<u64, NodeError>;

    /// Current gas price in wei.
    async fn gas_price(&self) -> Result<u128, NodeError>;

    /// Submits an EIP-2718 encoded transaction, returning its hash.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, NodeError>;

    /// Receipt of a transaction, if it has been mined.
    async fn receipt(&self, tx_hash: B256) -> Result<Option<ReceiptSummary>, NodeError>;

    /// Runtime code at `address`.
    async fn code_at(&self, address: Address) -> Result<Bytes, NodeError>;

    /// Executes a read-only call against `to`.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, NodeError>;
}

/// Opens [`NodeClient`]s for an endpoint.
pub trait NodeConnector: Send + Sync + 'static {
    /// Client type produced.
    type Client: NodeClient;

    /// Creates a client for `url`.
    fn connect(&self, url: &Url) -> Result<Self::Client, NodeError>;
}

/// Connects over HTTP with an alloy [`RootProvider`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

impl NodeConnector for HttpConnector {
    type Client = RootProvider;

    fn connect(&self, url: &Url) -> Result<Self::Client, NodeError> {
        Ok(RootProvider::new_http(url.clone()))
    }
}

#[async_trait]
impl NodeClient for RootProvider {
    async fn chain_id(&self) -> Result<u64, NodeError> {
        self.get_chain_id().await.map_err(|e| NodeError::new("eth_chainId", e))
    }

    async fn balance(&self, address: Address) -> Result<U256, NodeError> {
        self.get_balance(address).await.map_err(|e| NodeError::new("eth_getBalance", e))
    }

    async fn nonce(&self, address: Address) -> Result<u64, NodeError> {
        self.get_transaction_count(address)
            .block_id(BlockNumberOrTag::Latest.into())
            .await
            .map_err(|e| NodeError::new("eth_getTransactionCount", e))
    }

    async fn gas_price(&self) -> Result<u128, NodeError> {
        self.get_gas_price().await.map_err(|e| NodeError::new("eth_gasPrice", e))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, NodeError> {
        let pending = Provider::send_raw_transaction(self, &raw)
            .await
            .map_err(|e| NodeError::new("eth_sendRawTransaction", e))?;
        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<ReceiptSummary>, NodeError> {
        let receipt = self
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| NodeError::new("eth_getTransactionReceipt", e))?;
        Ok(receipt.map(|receipt| ReceiptSummary {
            tx_hash: receipt.transaction_hash,
            success: receipt.status(),
            contract_address: receipt.contract_address,
            block_number: receipt.block_number,
        }))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, NodeError> {
        self.get_code_at(address).await.map_err(|e| NodeError::new("eth_getCode", e))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, NodeError> {
        let request = TransactionRequest::default().to(to).input(TransactionInput::new(data));
        Provider::call(self, request).await.map_err(|e| NodeError::new("eth_call", e))
    }
}
