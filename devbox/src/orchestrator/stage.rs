//! Session stages.

use std::fmt;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Nothing started.
    Init,
    /// Every required image is available locally.
    ImagesPulled,
    /// The node container was started.
    NodeStarting,
    /// The node is running and its keystore was staged.
    NodeReady,
    /// Accounts are funded and contracts deployed.
    WalletBootstrapped,
    /// The bundler container was started.
    BundlerStarting,
    /// The bundler is reachable.
    BundlerReady,
    /// Mempool poller and dashboard are running.
    ServicesRunning,
    /// Tearing down after a termination request.
    ShuttingDown,
    /// Torn down after a termination request.
    Stopped,
    /// Ended by a failure. Teardown still runs.
    Aborted,
}

impl Stage {
    /// Whether the session has ended.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Aborted)
    }

    /// The stage a successful step leads to.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::ImagesPulled),
            Self::ImagesPulled => Some(Self::NodeStarting),
            Self::NodeStarting => Some(Self::NodeReady),
            Self::NodeReady => Some(Self::WalletBootstrapped),
            Self::WalletBootstrapped => Some(Self::BundlerStarting),
            Self::BundlerStarting => Some(Self::BundlerReady),
            Self::BundlerReady => Some(Self::ServicesRunning),
            Self::ShuttingDown => Some(Self::Stopped),
            Self::ServicesRunning | Self::Stopped | Self::Aborted => None,
        }
    }

    /// Whether `self -> to` is a legal transition.
    ///
    /// Startup stages advance one at a time. Any live stage may shut down or abort.
    pub fn can_transition_to(self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            Self::Aborted => true,
            Self::ShuttingDown => self != Self::ShuttingDown,
            _ => self.next() == Some(to),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::ImagesPulled => "images-pulled",
            Self::NodeStarting => "node-starting",
            Self::NodeReady => "node-ready",
            Self::WalletBootstrapped => "wallet-bootstrapped",
            Self::BundlerStarting => "bundler-starting",
            Self::BundlerReady => "bundler-ready",
            Self::ServicesRunning => "services-running",
            Self::ShuttingDown => "shutting-down",
            Self::Stopped => "stopped",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_path_is_linear() {
        let mut stage = Stage::Init;
        let mut path = vec![stage];
        while let Some(next) = stage.next().filter(|_| stage != Stage::ShuttingDown) {
            assert!(stage.can_transition_to(next));
            stage = next;
            path.push(stage);
        }
        assert_eq!(path.last(), Some(&Stage::ServicesRunning));
        assert_eq!(path.len(), 8);
    }

    #[test]
    fn stages_cannot_be_skipped() {
        assert!(!Stage::Init.can_transition_to(Stage::NodeReady));
        assert!(!Stage::NodeReady.can_transition_to(Stage::BundlerStarting));
        assert!(!Stage::ServicesRunning.can_transition_to(Stage::Stopped));
    }

    #[test]
    fn abort_from_any_live_stage() {
        for stage in [Stage::Init, Stage::NodeStarting, Stage::ServicesRunning, Stage::ShuttingDown]
        {
            assert!(stage.can_transition_to(Stage::Aborted), "{stage}");
        }
        assert!(!Stage::Stopped.can_transition_to(Stage::Aborted));
        assert!(!Stage::Aborted.can_transition_to(Stage::ShuttingDown));
    }

    #[test]
    fn shutdown_leads_to_stopped() {
        assert!(Stage::ServicesRunning.can_transition_to(Stage::ShuttingDown));
        assert!(Stage::NodeStarting.can_transition_to(Stage::ShuttingDown));
        assert!(Stage::ShuttingDown.can_transition_to(Stage::Stopped));
        assert!(Stage::Stopped.is_terminal());
    }
}
