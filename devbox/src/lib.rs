#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod bundler;
pub mod cli;
pub mod config;
pub mod containers;
pub mod images;
pub mod logging;
pub mod mempool;
pub mod orchestrator;
pub mod server;
pub mod userop;
pub mod wallet;

pub use bundler::{BundlerClient, BundlerClientError};
pub use config::DevboxConfig;
pub use mempool::{MempoolEntry, MempoolPoller, UserOpStatus};
pub use orchestrator::{Orchestrator, SessionError, SessionReport, Stage};
pub use userop::UserOperation;
pub use wallet::{DevAccount, Wallet, WalletState};
