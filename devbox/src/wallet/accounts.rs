//! Developer accounts derived from a mnemonic.

use alloy_primitives::{Address, B256, U256};
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};
use serde::Serialize;

use super::WalletError;

/// Well-known development mnemonic; its accounts match those of common dev chains.
pub const DEV_MNEMONIC: &str = "test test test test test test test test test test test junk";

/// Number of developer accounts derived and funded per session.
pub const DEV_ACCOUNT_COUNT: u32 = 10;

/// Wei sent to each developer account: 1000 ETH.
pub const FUNDING_AMOUNT: u128 = 1_000_000_000_000_000_000_000;

/// A derived, funded developer account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevAccount {
    /// Derivation index.
    pub index: u32,
    /// Account address.
    pub address: Address,
    /// Account private key.
    pub private_key: B256,
    /// Last known balance in wei.
    pub balance: U256,
}

impl DevAccount {
    /// Signer for the account.
    pub fn signer(&self) -> Result<PrivateKeySigner, WalletError> {
        PrivateKeySigner::from_bytes(&self.private_key)
            .map_err(|e| WalletError::Derivation { index: self.index, reason: e.to_string() })
    }
}

/// Derives the account at `m/44'/60'/0'/0/{index}`.
pub fn derive_account(mnemonic: &str, index: u32) -> Result<DevAccount, WalletError> {
    let derivation = |reason: String| WalletError::Derivation { index, reason };

    let path = format!("m/44'/60'/0'/0/{index}");
    let signer = MnemonicBuilder::<English>::default()
        .phrase(mnemonic)
        .derivation_path(&path)
        .map_err(|e| derivation(e.to_string()))?
        .build()
        .map_err(|e| derivation(e.to_string()))?;
    let private_key = B256::from_slice(signer.credential().to_bytes().as_slice());

    Ok(DevAccount { index, address: signer.address(), private_key, balance: U256::ZERO })
}

/// Derives accounts `0..count` in index order.
pub fn derive_accounts(mnemonic: &str, count: u32) -> Result<Vec<DevAccount>, WalletError> {
    (0..count).map(|index| derive_account(mnemonic, index)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn funding_amount_is_a_thousand_ether() {
        assert_eq!(U256::from(FUNDING_AMOUNT), U256::from(10).pow(U256::from(21)));
    }

    #[test]
    fn signer_matches_derived_address() {
        let account = derive_account(DEV_MNEMONIC, 3).unwrap();
        assert_eq!(account.signer().unwrap().address(), account.address);
    }

    #[test]
    fn bad_phrase_reports_index() {
        let err = derive_account("not a mnemonic", 7).unwrap_err();
        assert!(matches!(err, WalletError::Derivation { index: 7, .. }));
    }
}
