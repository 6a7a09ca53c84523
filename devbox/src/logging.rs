//! Logging arguments and tracing subscriber setup.

use std::io;

use clap::{ArgAction, Args, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Timestamp, level, target and spans.
    #[default]
    Full,
    /// Level and message only.
    Compact,
    /// One JSON object per event.
    Json,
}

/// Logging flags shared by every devbox command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct LogArgs {
    /// Increase logging verbosity (`-v` debug, `-vv` trace). The default level is info.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Log output format.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Full, global = true)]
    pub format: LogFormat,
}

impl LogArgs {
    /// Level selected by the verbosity count.
    pub const fn level_filter(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Installs the global subscriber. `RUST_LOG` directives take precedence.
    pub fn init_tracing(&self) -> eyre::Result<()> {
        let filter = EnvFilter::builder()
            .with_default_directive(self.level_filter().into())
            .from_env_lossy();

        let base = tracing_subscriber::fmt::layer().with_writer(io::stderr);
        let layer: Box<dyn Layer<Registry> + Send + Sync> = match self.format {
            LogFormat::Full => Box::new(base),
            LogFormat::Compact => Box::new(base.compact()),
            LogFormat::Json => Box::new(base.json()),
        };

        tracing_subscriber::registry()
            .with(layer)
            .with(filter)
            .try_init()
            .map_err(|e| eyre::eyre!("failed to initialize tracing subscriber: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        logging: LogArgs,
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(LogArgs::default().level_filter(), LevelFilter::INFO);
        let debug = LogArgs { verbosity: 1, ..Default::default() };
        assert_eq!(debug.level_filter(), LevelFilter::DEBUG);
        let trace = LogArgs { verbosity: 4, ..Default::default() };
        assert_eq!(trace.level_filter(), LevelFilter::TRACE);
    }

    #[test]
    fn parses_flags() {
        let cli = TestCli::parse_from(["devbox", "-vv", "--log-format", "json"]);
        assert_eq!(cli.logging.verbosity, 2);
        assert_eq!(cli.logging.format, LogFormat::Json);
    }
}
