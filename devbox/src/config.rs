//! Session configuration.

use std::{path::PathBuf, time::Duration};

use url::Url;

use crate::{
    containers::{ReadinessPolicy, TRANSEPTOR_ROLE},
    mempool::MEMPOOL_REFRESH_INTERVAL,
};

/// Default dashboard port.
pub const DEFAULT_HTTP_PORT: u16 = 8080;
/// Default node RPC port.
pub const DEFAULT_ETH_PORT: u16 = 8545;
/// Default bundler RPC port.
pub const DEFAULT_BUNDLER_PORT: u16 = 4337;
/// Default wallet directory.
pub const DEFAULT_WALLET_DIR: &str = "./wallet/tmp";
/// Default contract artifacts directory.
pub const DEFAULT_CONTRACTS_DIR: &str = "./contracts";
/// Grace period given to the dashboard server on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const COINBASE_STAGING_SUBDIR: &str = "coinbase";

/// Everything a devbox session needs to know up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevboxConfig {
    /// Dashboard port.
    pub http_port: u16,
    /// Node RPC port on the host.
    pub eth_port: u16,
    /// Bundler role to launch.
    pub bundler: String,
    /// Bundler RPC port on the host.
    pub bundler_port: u16,
    /// Host the published ports are reached through.
    pub host: String,
    /// Keystore directory; removed on shutdown.
    pub wallet_dir: PathBuf,
    /// Directory holding contract init code.
    pub contracts_dir: PathBuf,
    /// Node readiness polling.
    pub readiness: ReadinessPolicy,
    /// Mempool refresh interval.
    pub mempool_interval: Duration,
    /// Bound on the dashboard's graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for DevboxConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            eth_port: DEFAULT_ETH_PORT,
            bundler: TRANSEPTOR_ROLE.to_string(),
            bundler_port: DEFAULT_BUNDLER_PORT,
            host: "localhost".to_string(),
            wallet_dir: PathBuf::from(DEFAULT_WALLET_DIR),
            contracts_dir: PathBuf::from(DEFAULT_CONTRACTS_DIR),
            readiness: ReadinessPolicy::default(),
            mempool_interval: MEMPOOL_REFRESH_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl DevboxConfig {
    /// Sets the dashboard port.
    pub const fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    /// Sets the node RPC port.
    pub const fn with_eth_port(mut self, port: u16) -> Self {
        self.eth_port = port;
        self
    }

    /// Sets the bundler RPC port.
    pub const fn with_bundler_port(mut self, port: u16) -> Self {
        self.bundler_port = port;
        self
    }

    /// Sets the bundler role.
    pub fn with_bundler(mut self, bundler: impl Into<String>) -> Self {
        self.bundler = bundler.into();
        self
    }

    /// Sets the host published ports are reached through.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the wallet directory.
    pub fn with_wallet_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.wallet_dir = dir.into();
        self
    }

    /// Sets the contract artifacts directory.
    pub fn with_contracts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.contracts_dir = dir.into();
        self
    }

    /// Sets the node readiness policy.
    pub const fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Sets the mempool refresh interval.
    pub const fn with_mempool_interval(mut self, interval: Duration) -> Self {
        self.mempool_interval = interval;
        self
    }

    /// Sets the dashboard shutdown bound.
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Directory the node keystore is staged in before import.
    pub fn staging_dir(&self) -> PathBuf {
        self.wallet_dir.join(COINBASE_STAGING_SUBDIR)
    }

    /// Node RPC endpoint.
    pub fn node_url(&self) -> Result<Url, url::ParseError> {
        self.url(self.eth_port)
    }

    /// Bundler RPC endpoint.
    pub fn bundler_url(&self) -> Result<Url, url::ParseError> {
        self.url(self.bundler_port)
    }

    /// Dashboard endpoint.
    pub fn dashboard_url(&self) -> Result<Url, url::ParseError> {
        self.url(self.http_port)
    }

    fn url(&self, port: u16) -> Result<Url, url::ParseError> {
        Url::parse(&format!("http://{}:{port}", self.host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_ports() {
        let config = DevboxConfig::default();
        assert_eq!(config.node_url().unwrap().as_str(), "http://localhost:8545/");
        assert_eq!(config.bundler_url().unwrap().port(), Some(4337));
        assert_eq!(config.dashboard_url().unwrap().port(), Some(8080));
        assert_eq!(config.bundler, "transeptor");
        assert_eq!(config.staging_dir(), PathBuf::from("./wallet/tmp/coinbase"));
    }

    #[test]
    fn builders_override() {
        let config = DevboxConfig::default().with_eth_port(9545).with_wallet_dir("/tmp/w");
        assert_eq!(config.node_url().unwrap().port(), Some(9545));
        assert_eq!(config.staging_dir(), PathBuf::from("/tmp/w/coinbase"));
    }
}
