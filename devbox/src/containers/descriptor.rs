//! Launch templates for every container role devbox knows how to run.

use std::collections::BTreeMap;

use alloy_primitives::Address;

use crate::images::{AA_BUNDLER_IMAGE, GETH_IMAGE, TRANSEPTOR_IMAGE};

/// Role name of the go-ethereum dev node.
pub const GETH_ROLE: &str = "geth";
/// Role name of the Transeptor bundler.
pub const TRANSEPTOR_ROLE: &str = "transeptor";
/// Role name of the eth-infinitism reference bundler.
pub const AA_BUNDLER_ROLE: &str = "aabundler";

/// Name of the node container.
pub const GETH_CONTAINER_NAME: &str = "devbox-geth";
/// Name of the Transeptor container.
pub const TRANSEPTOR_CONTAINER_NAME: &str = "devbox-transeptor";
/// Name of the reference bundler container.
pub const AA_BUNDLER_CONTAINER_NAME: &str = "devbox-aabundler";

/// Placeholder for the host port the node RPC is bound to.
pub const ETH_PORT_PLACEHOLDER: &str = "$ETH_PORT";
/// Placeholder for the deployed entry point address.
pub const ENTRYPOINT_PLACEHOLDER: &str = "$ENTRYPOINT_ADDRESS";
/// Placeholder for the bundler beneficiary address.
pub const BENEFICIARY_PLACEHOLDER: &str = "$BENEFICIARY";
/// Placeholder for the mnemonic the bundler signs bundles with.
pub const MNEMONIC_PLACEHOLDER: &str = "$MNEMONIC";

/// What a container does in the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    /// Execution node exposing the chain RPC.
    Node,
    /// ERC-4337 bundler fed by the node.
    Bundler,
}

/// Launch template and run state for a single container role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    /// Full image reference, `name:tag`.
    pub image_ref: String,
    /// Container name passed to the engine.
    pub container_name: String,
    /// Ordered command arguments, possibly containing placeholder tokens.
    pub cmd: Vec<String>,
    /// `KEY=value` environment entries, possibly containing placeholder tokens.
    pub env: Vec<String>,
    /// Port the container listens on, when it differs from the host port.
    pub container_port: Option<u16>,
    /// What the container does.
    pub kind: RoleKind,
    /// Engine id of the running container.
    pub container_id: Option<String>,
    /// Host port bound on the last launch.
    pub host_port: Option<u16>,
    /// Whether the container was started and not yet torn down.
    pub running: bool,
}

impl ContainerDescriptor {
    fn template(
        image_ref: &str,
        container_name: &str,
        kind: RoleKind,
        cmd: &[&str],
        env: &[&str],
    ) -> Self {
        Self {
            image_ref: image_ref.to_string(),
            container_name: container_name.to_string(),
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
            env: env.iter().map(|s| s.to_string()).collect(),
            container_port: None,
            kind,
            container_id: None,
            host_port: None,
            running: false,
        }
    }

    /// Port inside the container that the host port maps to.
    pub fn exposed_port(&self, host_port: u16) -> u16 {
        self.container_port.unwrap_or(host_port)
    }

    /// Returns the command and environment with every placeholder token resolved.
    ///
    /// The stored templates are left untouched so a descriptor can be relaunched.
    pub fn resolve(&self, placeholders: &PlaceholderSet) -> (Vec<String>, Vec<String>) {
        let cmd = self.cmd.iter().map(|arg| placeholders.substitute(arg)).collect();
        let env = self.env.iter().map(|var| placeholders.substitute(var)).collect();
        (cmd, env)
    }

    /// The go-ethereum dev node template.
    pub fn geth() -> Self {
        Self::template(
            GETH_IMAGE,
            GETH_CONTAINER_NAME,
            RoleKind::Node,
            &[
                "--dev",
                "--nodiscover",
                "--http",
                "--dev.gaslimit",
                "30000000",
                "--http.api",
                "eth,net,web3,debug",
                "--http.corsdomain",
                "*://localhost:*",
                "--http.vhosts",
                "*,localhost,host.docker.internal",
                "--http.addr",
                "0.0.0.0",
                "--networkid",
                "1337",
                "--verbosity",
                "2",
                "--maxpeers",
                "0",
                "--allow-insecure-unlock",
                "--rpc.allow-unprotected-txs",
            ],
            &[],
        )
    }

    /// The Transeptor bundler template.
    pub fn transeptor() -> Self {
        Self::template(
            TRANSEPTOR_IMAGE,
            TRANSEPTOR_CONTAINER_NAME,
            RoleKind::Bundler,
            &[
                "--txMode",
                "base",
                "--unsafe",
                "--httpApi",
                "web3,eth,debug",
                "--auto",
                "--autoBundleInterval",
                "10000",
                "--network",
                "http://host.docker.internal:$ETH_PORT",
            ],
            &[
                "TRANSEPTOR_MNEMONIC=$MNEMONIC",
                "TRANSEPTOR_BENEFICIARY=$BENEFICIARY",
                "TRANSEPTOR_ENTRYPOINT_ADDRESS=$ENTRYPOINT_ADDRESS",
            ],
        )
    }

    /// The eth-infinitism reference bundler template.
    pub fn aa_bundler() -> Self {
        Self::template(
            AA_BUNDLER_IMAGE,
            AA_BUNDLER_CONTAINER_NAME,
            RoleKind::Bundler,
            &[
                "--network",
                "http://host.docker.internal:$ETH_PORT",
                "--entryPoint",
                "$ENTRYPOINT_ADDRESS",
                "--beneficiary",
                "$BENEFICIARY",
            ],
            &[],
        )
    }
}

/// The default set of role templates, keyed by role name.
pub fn default_descriptors() -> BTreeMap<String, ContainerDescriptor> {
    BTreeMap::from([
        (GETH_ROLE.to_string(), ContainerDescriptor::geth()),
        (TRANSEPTOR_ROLE.to_string(), ContainerDescriptor::transeptor()),
        (AA_BUNDLER_ROLE.to_string(), ContainerDescriptor::aa_bundler()),
    ])
}

/// Values substituted into bundler templates once the wallet is bootstrapped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderSet {
    values: BTreeMap<String, String>,
}

impl PlaceholderSet {
    /// Builds the placeholder set a bundler launch needs.
    pub fn for_bundler(
        node_port: u16,
        entry_point: Address,
        beneficiary: Address,
        mnemonic: &str,
    ) -> Self {
        Self::default()
            .with(ETH_PORT_PLACEHOLDER, node_port.to_string())
            .with(ENTRYPOINT_PLACEHOLDER, entry_point.to_checksum(None))
            .with(BENEFICIARY_PLACEHOLDER, beneficiary.to_checksum(None))
            .with(MNEMONIC_PLACEHOLDER, mnemonic)
    }

    /// Adds or replaces a token.
    pub fn with(mut self, token: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(token.into(), value.into());
        self
    }

    /// Iterates over `(token, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replaces every occurrence of every token in `input`.
    ///
    /// Longer tokens go first so a token that prefixes another one never eats it.
    pub fn substitute(&self, input: &str) -> String {
        let mut tokens: Vec<_> = self.values.iter().collect();
        tokens.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
        tokens.into_iter().fold(input.to_string(), |acc, (token, value)| acc.replace(token, value))
    }
}
