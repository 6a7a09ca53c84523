//! Funding and deployment transactions, signed locally and confirmed on chain.

use std::time::Duration;

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use tokio::time::{sleep, timeout};
use tracing::debug;

use super::{NodeClient, ReceiptSummary, TxError};

/// Gas limit for contract deployments.
pub const DEPLOY_GAS_LIMIT: u64 = 10_000_000;

/// Gas limit for plain transfers.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Priority fee attached to every transaction.
pub const PRIORITY_FEE: u128 = 1_000_000;

const RECEIPT_TIMEOUT: Duration = Duration::from_secs(30);
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const NONCE_TIMEOUT: Duration = Duration::from_secs(10);
const NONCE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sends `amount` wei from `signer` to `to` and waits until it is mined.
///
/// Returns the nonce the transfer was sent with.
pub async fn fund_account<C: NodeClient + ?Sized>(
    client: &C,
    signer: &PrivateKeySigner,
    chain_id: u64,
    to: Address,
    amount: U256,
) -> Result<u64, TxError> {
    debug!(%to, %amount, "funding account");
    let (nonce, receipt) = send_and_confirm(
        client,
        signer,
        chain_id,
        TxKind::Call(to),
        amount,
        Bytes::new(),
        TRANSFER_GAS_LIMIT,
    )
    .await?;
    if !receipt.success {
        return Err(TxError::Reverted(receipt.tx_hash));
    }

    debug!(%to, nonce, "account funded");
    Ok(nonce)
}

/// Deploys `init_code` from `signer` and returns the created address.
///
/// Fails unless the receipt reports success and the new address holds code.
pub async fn deploy_contract<C: NodeClient + ?Sized>(
    client: &C,
    signer: &PrivateKeySigner,
    chain_id: u64,
    init_code: Bytes,
) -> Result<Address, TxError> {
    let (_, receipt) = send_and_confirm(
        client,
        signer,
        chain_id,
        TxKind::Create,
        U256::ZERO,
        init_code,
        DEPLOY_GAS_LIMIT,
    )
    .await?;
    if !receipt.success {
        return Err(TxError::Reverted(receipt.tx_hash));
    }

    let contract_address =
        receipt.contract_address.ok_or(TxError::MissingContractAddress(receipt.tx_hash))?;
    if client.code_at(contract_address).await?.is_empty() {
        return Err(TxError::EmptyCode(contract_address));
    }

    debug!(%contract_address, "contract deployed");
    Ok(contract_address)
}

async fn send_and_confirm<C: NodeClient + ?Sized>(
    client: &C,
    signer: &PrivateKeySigner,
    chain_id: u64,
    to: TxKind,
    value: U256,
    input: Bytes,
    gas_limit: u64,
) -> Result<(u64, ReceiptSummary), TxError> {
    let sender = signer.address();
    let nonce = client.nonce(sender).await?;
    let gas_price = client.gas_price().await?;

    let tx = TxEip1559 {
        chain_id,
        nonce,
        gas_limit,
        max_fee_per_gas: (gas_price * 2).max(PRIORITY_FEE),
        max_priority_fee_per_gas: PRIORITY_FEE,
        to,
        value,
        access_list: Default::default(),
        input,
    };

    let signature = signer.sign_hash_sync(&tx.signature_hash())?;
    let envelope: TxEnvelope = tx.into_signed(signature).into();
    let raw: Bytes = envelope.encoded_2718().into();
    let tx_hash = *envelope.tx_hash();
    debug!(%tx_hash, %sender, nonce, "sending transaction");

    client.send_raw_transaction(raw).await?;

    let receipt = timeout(RECEIPT_TIMEOUT, async {
        loop {
            if let Some(receipt) = client.receipt(tx_hash).await? {
                return Ok::<_, TxError>(receipt);
            }
            sleep(RECEIPT_POLL_INTERVAL).await;
        }
    })
    .await
    .map_err(|_| TxError::ReceiptTimeout { tx_hash, timeout_secs: RECEIPT_TIMEOUT.as_secs() })??;

    // the next transaction from this sender must not read a stale nonce
    let expected = nonce + 1;
    timeout(NONCE_TIMEOUT, async {
        loop {
            if client.nonce(sender).await? >= expected {
                return Ok::<_, TxError>(());
            }
            sleep(NONCE_POLL_INTERVAL).await;
        }
    })
    .await
    .map_err(|_| TxError::NonceTimeout { sender, expected })??;

    Ok((nonce, receipt))
}
