//! Wallet bootstrap: key import, developer accounts, funding and contract deployment.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use alloy_primitives::{Address, U256};
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

mod accounts;
pub use accounts::{
    DEV_ACCOUNT_COUNT, DEV_MNEMONIC, DevAccount, FUNDING_AMOUNT, derive_account, derive_accounts,
};

mod artifacts;
pub use artifacts::{
    ACCOUNT_FACTORY_ARTIFACT, ContractArtifacts, ENTRY_POINT_ARTIFACT, GLOBAL_COUNTER_ARTIFACT,
};

mod client;
pub use client::{HttpConnector, NodeClient, NodeConnector, ReceiptSummary};

mod error;
pub use error::{NodeError, TxError, WalletError};

mod keystore;
pub use keystore::{KEYSTORE_PASSWORD, generate_keystore, import_keystore};

mod tx;
pub use tx::{DEPLOY_GAS_LIMIT, PRIORITY_FEE, TRANSFER_GAS_LIMIT, deploy_contract, fund_account};

use crate::containers::PlaceholderSet;

/// Addresses of the contracts deployed at bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedContracts {
    /// ERC-4337 entry point.
    pub entry_point: Address,
    /// Simple account factory bound to the entry point.
    pub account_factory: Address,
    /// Example counter contract.
    pub global_counter: Address,
}

/// Everything learned and created while bootstrapping a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletState {
    /// Chain id of the node.
    pub chain_id: u64,
    /// Node coinbase imported from its keystore.
    pub coinbase: Address,
    /// Freshly generated bundler beneficiary.
    pub beneficiary: Address,
    /// Funded developer accounts in derivation order.
    pub accounts: Vec<DevAccount>,
    /// Deployed contracts.
    pub contracts: DeployedContracts,
    /// Mnemonic handed to the bundler.
    #[serde(skip)]
    pub mnemonic: String,
}

impl WalletState {
    /// Placeholder values for a bundler talking to the node on `node_port`.
    pub fn placeholders(&self, node_port: u16) -> PlaceholderSet {
        PlaceholderSet::for_bundler(
            node_port,
            self.contracts.entry_point,
            self.beneficiary,
            &self.mnemonic,
        )
    }
}

/// Inputs of a wallet bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletConfig {
    /// Directory keystore files are written to.
    pub keystore_dir: PathBuf,
    /// Password of every keystore entry.
    pub keystore_password: String,
    /// Mnemonic developer accounts are derived from.
    pub mnemonic: String,
    /// Number of developer accounts.
    pub account_count: u32,
    /// Wei sent to each developer account.
    pub funding_amount: U256,
}

impl WalletConfig {
    /// Defaults writing keystores into `keystore_dir`.
    pub fn new(keystore_dir: impl Into<PathBuf>) -> Self {
        Self {
            keystore_dir: keystore_dir.into(),
            keystore_password: KEYSTORE_PASSWORD.to_string(),
            mnemonic: DEV_MNEMONIC.to_string(),
            account_count: DEV_ACCOUNT_COUNT,
            funding_amount: U256::from(FUNDING_AMOUNT),
        }
    }

    /// Sets the number of developer accounts.
    pub const fn with_account_count(mut self, account_count: u32) -> Self {
        self.account_count = account_count;
        self
    }

    /// Sets the amount each developer account is funded with.
    pub const fn with_funding_amount(mut self, funding_amount: U256) -> Self {
        self.funding_amount = funding_amount;
        self
    }
}

/// A bootstrapped wallet bound to a node client.
#[derive(Debug)]
pub struct Wallet<C> {
    client: Arc<C>,
    state: RwLock<WalletState>,
    refresh_failures: AtomicU64,
}

impl<C: NodeClient> Wallet<C> {
    /// Connects to `endpoint` and bootstraps a fresh wallet.
    ///
    /// The coinbase is imported from the staged keystore at `coinbase_keystore`. Every step must
    /// succeed; a partially bootstrapped wallet is never returned.
    pub async fn bootstrap<N>(
        connector: &N,
        endpoint: &Url,
        coinbase_keystore: &Path,
        artifacts: &ContractArtifacts,
        config: &WalletConfig,
    ) -> Result<Self, WalletError>
    where
        N: NodeConnector<Client = C>,
    {
        let connect_error = |source| WalletError::Connect { url: endpoint.to_string(), source };
        let client = Arc::new(connector.connect(endpoint).map_err(connect_error)?);
        let chain_id = client.chain_id().await.map_err(connect_error)?;
        info!(%endpoint, chain_id, "connected to node");

        let coinbase = import_keystore(
            coinbase_keystore,
            &config.keystore_dir,
            &config.keystore_password,
        )
        .await?;
        info!(address = %coinbase.address(), "imported coinbase");

        let beneficiary = generate_keystore(&config.keystore_dir, &config.keystore_password).await?;
        info!(address = %beneficiary.address(), "generated bundler beneficiary");

        let mut accounts = derive_accounts(&config.mnemonic, config.account_count)?;
        for account in &mut accounts {
            fund_account(
                client.as_ref(),
                &coinbase,
                chain_id,
                account.address,
                config.funding_amount,
            )
            .await
            .map_err(|source| WalletError::Funding { to: account.address, source })?;
            account.balance = client.balance(account.address).await?;
        }
        info!(count = accounts.len(), amount = %config.funding_amount, "funded developer accounts");

        let entry_point =
            deploy_contract(client.as_ref(), &coinbase, chain_id, artifacts.entry_point.clone())
                .await
                .map_err(|source| WalletError::Deployment { contract: "EntryPoint", source })?;
        info!(address = %entry_point, "deployed entry point");

        let factory_code = artifacts.account_factory_init_code(entry_point)?;
        let account_factory = deploy_contract(client.as_ref(), &coinbase, chain_id, factory_code)
            .await
            .map_err(|source| WalletError::Deployment {
                contract: "SimpleAccountFactory",
                source,
            })?;
        info!(address = %account_factory, "deployed account factory");

        let global_counter =
            deploy_contract(client.as_ref(), &coinbase, chain_id, artifacts.global_counter.clone())
                .await
                .map_err(|source| WalletError::Deployment { contract: "GlobalCounter", source })?;
        info!(address = %global_counter, "deployed global counter");

        let state = WalletState {
            chain_id,
            coinbase: coinbase.address(),
            beneficiary: beneficiary.address(),
            accounts,
            contracts: DeployedContracts { entry_point, account_factory, global_counter },
            mnemonic: config.mnemonic.clone(),
        };

        Ok(Self { client, state: RwLock::new(state), refresh_failures: AtomicU64::new(0) })
    }

    /// Node client the wallet was bootstrapped with.
    pub const fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Snapshot of the wallet state.
    pub fn state(&self) -> WalletState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of balance refreshes that failed.
    pub fn refresh_failures(&self) -> u64 {
        self.refresh_failures.load(Ordering::Relaxed)
    }

    /// Re-reads every developer account balance.
    ///
    /// Balances are only replaced when every read succeeds. Failures are counted.
    pub async fn refresh_dev_account_balances(&self) -> Result<(), WalletError> {
        let addresses: Vec<Address> = self.state().accounts.iter().map(|a| a.address).collect();

        let mut balances = Vec::with_capacity(addresses.len());
        for address in addresses {
            match self.client.balance(address).await {
                Ok(balance) => balances.push((address, balance)),
                Err(err) => {
                    self.refresh_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(%address, %err, "failed to refresh balance");
                    return Err(err.into());
                }
            }
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        for (address, balance) in balances {
            if let Some(account) = state.accounts.iter_mut().find(|a| a.address == address) {
                account.balance = balance;
            }
        }
        Ok(())
    }
}
