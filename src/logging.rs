// src/logging.rs

//! Subscriber setup for the `flowwatch` binary.
//!
//! The filter comes from the first of:
//! 1. `--log-level`, applied to every target
//! 2. `FLOWWATCH_LOG`, full `EnvFilter` directives such as
//!    `warn,flowwatch::engine=debug`
//! 3. `info`
//!
//! Records go to stderr; stdout belongs to the `jsonl` event sink when it has
//! no path.

use anyhow::{Context, Result};
use tracing::{debug, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "FLOWWATCH_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

/// Where the active filter came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSource {
    Cli(LogLevel),
    Env,
    Default,
    /// `FLOWWATCH_LOG` was set but didn't parse; holds the parse error.
    RejectedEnv(String),
}

fn directive_for(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

/// Resolve the filter from a CLI level and the raw `FLOWWATCH_LOG` value.
pub fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> (EnvFilter, FilterSource) {
    if let Some(level) = cli_level {
        return (EnvFilter::new(directive_for(level)), FilterSource::Cli(level));
    }

    match env.map(str::trim).filter(|s| !s.is_empty()) {
        None => (EnvFilter::new(DEFAULT_DIRECTIVES), FilterSource::Default),
        Some(directives) => match EnvFilter::try_new(directives) {
            Ok(filter) => (filter, FilterSource::Env),
            Err(err) => (
                EnvFilter::new(DEFAULT_DIRECTIVES),
                FilterSource::RejectedEnv(err.to_string()),
            ),
        },
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let (filter, source) = build_filter(cli_level, env.as_deref());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .context("global tracing subscriber already installed")?;

    match source {
        FilterSource::RejectedEnv(error) => {
            warn!(var = LOG_ENV, %error, "ignoring unparsable log directives; using info")
        }
        source => debug!(?source, "logging initialised"),
    }
    Ok(())
}
