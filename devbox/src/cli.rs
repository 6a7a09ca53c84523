//! Command-line interface of the `devbox` binary.

use std::path::PathBuf;

use clap::Parser;

use crate::{
    config::{
        DEFAULT_BUNDLER_PORT, DEFAULT_CONTRACTS_DIR, DEFAULT_ETH_PORT, DEFAULT_HTTP_PORT,
        DEFAULT_WALLET_DIR, DevboxConfig,
    },
    containers::{AA_BUNDLER_ROLE, TRANSEPTOR_ROLE},
    logging::LogArgs,
};

/// Run a local ERC-4337 development environment: dev node, bundler, funded wallet and dashboard
#[derive(Parser, Debug)]
#[command(name = "devbox", version, about)]
pub struct DevboxCli {
    /// Dashboard HTTP port
    #[arg(long = "http.port", env = "DEVBOX_HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    /// Dev node RPC port
    #[arg(long = "eth.port", env = "DEVBOX_ETH_PORT", default_value_t = DEFAULT_ETH_PORT)]
    pub eth_port: u16,

    /// Bundler to run
    #[arg(
        long,
        env = "DEVBOX_BUNDLER",
        default_value = TRANSEPTOR_ROLE,
        value_parser = [TRANSEPTOR_ROLE, AA_BUNDLER_ROLE],
    )]
    pub bundler: String,

    /// Bundler RPC port
    #[arg(
        long = "bundler.port",
        env = "DEVBOX_BUNDLER_PORT",
        default_value_t = DEFAULT_BUNDLER_PORT
    )]
    pub bundler_port: u16,

    /// Keystore directory, removed on exit
    #[arg(long = "wallet.dir", env = "DEVBOX_WALLET_DIR", default_value = DEFAULT_WALLET_DIR)]
    pub wallet_dir: PathBuf,

    /// Directory with contract init code
    #[arg(
        long = "contracts.dir",
        env = "DEVBOX_CONTRACTS_DIR",
        default_value = DEFAULT_CONTRACTS_DIR
    )]
    pub contracts_dir: PathBuf,

    /// Shorthand for debug-level logs
    #[arg(long, env = "DEVBOX_DEBUG")]
    pub debug: bool,

    /// Logging options
    #[command(flatten)]
    pub logging: LogArgs,
}

impl DevboxCli {
    /// Logging options with `--debug` applied.
    pub fn log_args(&self) -> LogArgs {
        let mut logging = self.logging.clone();
        if self.debug {
            logging.verbosity = logging.verbosity.max(1);
        }
        logging
    }

    /// Session configuration selected by the flags.
    pub fn config(&self) -> DevboxConfig {
        DevboxConfig::default()
            .with_http_port(self.http_port)
            .with_eth_port(self.eth_port)
            .with_bundler(self.bundler.clone())
            .with_bundler_port(self.bundler_port)
            .with_wallet_dir(self.wallet_dir.clone())
            .with_contracts_dir(self.contracts_dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = DevboxCli::parse_from(["devbox"]);
        assert_eq!(cli.config(), DevboxConfig::default());
        assert_eq!(cli.log_args().verbosity, 0);
    }

    #[test]
    fn dotted_flags() {
        let cli = DevboxCli::parse_from([
            "devbox",
            "--http.port",
            "9090",
            "--eth.port",
            "9545",
            "--bundler",
            "aabundler",
            "--bundler.port",
            "3000",
            "--debug",
        ]);
        let config = cli.config();
        assert_eq!(config.http_port, 9090);
        assert_eq!(config.eth_port, 9545);
        assert_eq!(config.bundler, AA_BUNDLER_ROLE);
        assert_eq!(config.bundler_port, 3000);
        assert_eq!(cli.log_args().verbosity, 1);
    }

    #[test]
    fn unknown_bundler_is_rejected() {
        assert!(DevboxCli::try_parse_from(["devbox", "--bundler", "rundler"]).is_err());
    }
}
