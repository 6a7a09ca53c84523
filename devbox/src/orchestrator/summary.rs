//! Human readable summary printed once a session is up.

use std::fmt;

use alloy_primitives::utils::format_ether;
use url::Url;

use crate::wallet::WalletState;

/// Endpoints, contracts and accounts of a running session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Node RPC endpoint.
    pub node_url: Url,
    /// Bundler RPC endpoint.
    pub bundler_url: Url,
    /// Dashboard endpoint.
    pub dashboard_url: Url,
    /// Bundler role that was launched.
    pub bundler: String,
    /// Wallet state after bootstrap.
    pub wallet: WalletState,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let contracts = &self.wallet.contracts;
        writeln!(f)?;
        writeln!(f, "Endpoints:")?;
        writeln!(f, "  Node:      {}", self.node_url)?;
        writeln!(f, "  Bundler:   {} ({})", self.bundler_url, self.bundler)?;
        writeln!(f, "  Dashboard: {}", self.dashboard_url)?;
        writeln!(f)?;
        writeln!(f, "Chain id: {}", self.wallet.chain_id)?;
        writeln!(f)?;
        writeln!(f, "Contracts:")?;
        writeln!(f, "  EntryPoint:           {}", contracts.entry_point)?;
        writeln!(f, "  SimpleAccountFactory: {}", contracts.account_factory)?;
        writeln!(f, "  GlobalCounter:        {}", contracts.global_counter)?;
        writeln!(f)?;
        writeln!(f, "Beneficiary: {}", self.wallet.beneficiary)?;
        writeln!(f)?;
        write!(f, "Accounts:")?;
        for account in &self.wallet.accounts {
            write!(
                f,
                "\n  ({}) {} ({} ETH)\n      {}",
                account.index,
                account.address,
                format_ether(account.balance),
                account.private_key
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, B256, U256};

    use super::*;
    use crate::wallet::{DeployedContracts, DevAccount, FUNDING_AMOUNT};

    #[test]
    fn lists_endpoints_and_accounts() {
        let summary = SessionSummary {
            node_url: "http://localhost:8545".parse().unwrap(),
            bundler_url: "http://localhost:4337".parse().unwrap(),
            dashboard_url: "http://localhost:8080".parse().unwrap(),
            bundler: "transeptor".to_string(),
            wallet: WalletState {
                chain_id: 1337,
                coinbase: Address::repeat_byte(1),
                beneficiary: Address::repeat_byte(2),
                accounts: vec![DevAccount {
                    index: 0,
                    address: Address::repeat_byte(3),
                    private_key: B256::repeat_byte(4),
                    balance: U256::from(FUNDING_AMOUNT),
                }],
                contracts: DeployedContracts {
                    entry_point: Address::repeat_byte(5),
                    account_factory: Address::repeat_byte(6),
                    global_counter: Address::repeat_byte(7),
                },
                mnemonic: String::new(),
            },
        };

        let text = summary.to_string();
        assert!(text.contains("http://localhost:4337/ (transeptor)"));
        assert!(text.contains("Chain id: 1337"));
        assert!(text.contains("1000.000000000000000000 ETH"));
        assert!(text.contains(&Address::repeat_byte(5).to_string()));
    }
}
