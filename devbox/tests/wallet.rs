//! Wallet bootstrap against an in-memory node.

mod common;

use std::path::PathBuf;

use alloy_primitives::{Address, Bytes, U256};
use alloy_signer_local::PrivateKeySigner;
use common::{COINBASE_KEYSTORE, MockConnector, MockNode, coinbase_keystore, write_artifacts};
use devbox::wallet::{
    ContractArtifacts, DEV_ACCOUNT_COUNT, FUNDING_AMOUNT, TxError, Wallet, WalletConfig,
    WalletError, deploy_contract, fund_account,
};
use tempfile::TempDir;
use url::Url;

struct Fixture {
    _dir: TempDir,
    coinbase: PrivateKeySigner,
    staged: PathBuf,
    keystore_dir: PathBuf,
    artifacts: ContractArtifacts,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let (coinbase, bytes) = coinbase_keystore();

        let staging = dir.path().join("staging");
        std::fs::create_dir_all(&staging).unwrap();
        let staged = staging.join(COINBASE_KEYSTORE);
        std::fs::write(&staged, bytes).unwrap();

        let contracts = dir.path().join("contracts");
        write_artifacts(&contracts);
        let artifacts = ContractArtifacts::load(&contracts).unwrap();

        let keystore_dir = dir.path().join("wallet");
        Self { _dir: dir, coinbase, staged, keystore_dir, artifacts }
    }

    async fn bootstrap(&self, connector: &MockConnector) -> Result<Wallet<MockNode>, WalletError> {
        Wallet::bootstrap(
            connector,
            &endpoint(),
            &self.staged,
            &self.artifacts,
            &WalletConfig::new(&self.keystore_dir),
        )
        .await
    }
}

fn endpoint() -> Url {
    "http://localhost:8545".parse().unwrap()
}

#[tokio::test]
async fn bootstrap_funds_accounts_and_deploys_contracts() {
    let fixture = Fixture::new();
    let connector = MockConnector::default();

    let wallet = fixture.bootstrap(&connector).await.unwrap();
    let state = wallet.state();

    assert_eq!(state.chain_id, 1337);
    assert_eq!(state.coinbase, fixture.coinbase.address());
    assert_ne!(state.beneficiary, state.coinbase);
    assert_eq!(state.accounts.len(), DEV_ACCOUNT_COUNT as usize);
    for account in &state.accounts {
        assert_eq!(account.balance, U256::from(FUNDING_AMOUNT), "account {}", account.index);
    }

    let node = connector.node.state();
    let contracts = state.contracts;
    for address in [contracts.entry_point, contracts.account_factory, contracts.global_counter] {
        assert!(!node.code[&address].is_empty());
    }
    assert_eq!(node.deployments.len(), 3);

    // coinbase keystore imported and removed from staging, beneficiary generated next to it
    assert!(!fixture.staged.exists());
    assert!(fixture.keystore_dir.join(COINBASE_KEYSTORE).exists());
    assert_eq!(std::fs::read_dir(&fixture.keystore_dir).unwrap().count(), 2);
}

#[tokio::test]
async fn every_transaction_uses_the_next_nonce() {
    let fixture = Fixture::new();
    let connector = MockConnector::default();

    fixture.bootstrap(&connector).await.unwrap();

    let sent = connector.node.state().sent_nonces.clone();
    let expected: Vec<u64> = (0..DEV_ACCOUNT_COUNT as u64 + 3).collect();
    assert_eq!(sent, expected);
}

#[tokio::test]
async fn account_factory_receives_the_entry_point() {
    let fixture = Fixture::new();
    let connector = MockConnector::default();

    let state = fixture.bootstrap(&connector).await.unwrap().state();
    let entry_point = state.contracts.entry_point;
    assert_ne!(entry_point, Address::ZERO);

    let node = connector.node.state();
    let factory_init = &node.deployments[1];
    assert!(factory_init.starts_with(&fixture.artifacts.account_factory));
    assert_eq!(&factory_init[factory_init.len() - 20..], entry_point.as_slice());
    assert_eq!(factory_init.len(), fixture.artifacts.account_factory.len() + 32);
}

#[tokio::test]
async fn sequential_funding_has_gap_free_nonces() {
    let node = MockNode::default();
    let (signer, _) = coinbase_keystore();

    let mut nonces = Vec::new();
    for i in 1..=5u8 {
        let nonce = fund_account(&node, &signer, 1337, Address::repeat_byte(i), U256::from(1))
            .await
            .unwrap();
        nonces.push(nonce);
    }

    assert_eq!(nonces, vec![0, 1, 2, 3, 4]);
    assert_eq!(node.state().balances[&Address::repeat_byte(3)], U256::from(1));
}

#[tokio::test]
async fn deployment_without_code_is_rejected() {
    let node = MockNode::default();
    node.state().drop_code = true;
    let (signer, _) = coinbase_keystore();

    let err = deploy_contract(&node, &signer, 1337, Bytes::from_static(&[0x60, 0x00]))
        .await
        .unwrap_err();
    assert!(matches!(err, TxError::EmptyCode(_)));
}

#[tokio::test]
async fn reverted_deployment_is_rejected() {
    let node = MockNode::default();
    node.state().revert_deployments = true;
    let (signer, _) = coinbase_keystore();

    let err = deploy_contract(&node, &signer, 1337, Bytes::from_static(&[0x60, 0x00]))
        .await
        .unwrap_err();
    assert!(matches!(err, TxError::Reverted(_)));
}

#[tokio::test]
async fn failed_deployment_aborts_bootstrap() {
    let fixture = Fixture::new();
    let connector = MockConnector::default();
    connector.node.state().drop_code = true;

    let err = fixture.bootstrap(&connector).await.unwrap_err();
    assert!(matches!(err, WalletError::Deployment { contract: "EntryPoint", .. }));
}

#[tokio::test]
async fn unreachable_node_fails_to_connect() {
    let fixture = Fixture::new();
    let connector = MockConnector { refuse: true, ..Default::default() };

    let err = fixture.bootstrap(&connector).await.unwrap_err();
    assert!(matches!(err, WalletError::Connect { .. }));
    // nothing was imported
    assert!(fixture.staged.exists());
}

#[tokio::test]
async fn balance_refresh_is_all_or_nothing() {
    let fixture = Fixture::new();
    let connector = MockConnector::default();
    let wallet = fixture.bootstrap(&connector).await.unwrap();

    let first = wallet.state().accounts[0].address;
    *connector.node.state().balances.get_mut(&first).unwrap() = U256::from(42);
    wallet.refresh_dev_account_balances().await.unwrap();
    assert_eq!(wallet.state().accounts[0].balance, U256::from(42));

    *connector.node.state().balances.get_mut(&first).unwrap() = U256::from(7);
    connector.node.state().fail_balance = true;
    assert!(wallet.refresh_dev_account_balances().await.is_err());
    assert_eq!(wallet.refresh_failures(), 1);
    assert_eq!(wallet.state().accounts[0].balance, U256::from(42));
}
