//! Tracing setup for the `strata` binary.
//!
//! Logs go to stderr; stdout is reserved for block listings and reports.

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Crates whose events a bare `--log-level` applies to.
const STRATA_TARGETS: [&str; 3] = ["strata_ledger", "strata_contracts", "strata_cli"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Turns `--log-level` into filter directives.
///
/// A bare level such as `debug` is scoped to the strata crates, with
/// everything else left at `warn`. Anything containing `=` or `,` is
/// taken as a full directive string.
fn directives(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let mut parts = vec!["warn".to_string()];
    parts.extend(STRATA_TARGETS.iter().map(|t| format!("{t}={level}")));
    parts.join(",")
}

/// Installs the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directives(level))
            .with_context(|| format!("invalid log level {level:?}"))?,
    };

    let layer = match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .context("tracing subscriber already installed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_is_scoped_to_strata_crates() {
        assert_eq!(
            directives("debug"),
            "warn,strata_ledger=debug,strata_contracts=debug,strata_cli=debug"
        );
    }

    #[test]
    fn explicit_directives_pass_through() {
        assert_eq!(directives("strata_ledger=trace"), "strata_ledger=trace");
        assert_eq!(directives("info,hyper=off"), "info,hyper=off");
    }

    #[test]
    fn directives_parse_as_filters() {
        for level in ["info", "trace", "strata_cli=debug"] {
            assert!(EnvFilter::try_new(directives(level)).is_ok());
        }
    }
}
