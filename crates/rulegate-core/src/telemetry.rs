//! Tracing setup for the rulegate binaries.
//!
//! The gate usually runs inside a commit hook on a developer's terminal,
//! so the default output is compact human-readable lines. CI and log
//! aggregation switch to newline-delimited JSON. Filtering reads
//! `RULEGATE_LOG` first and falls back to `RUST_LOG`, so a hook can be
//! made chatty without changing the logging of whatever invoked it.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Environment variable consulted first when building the log filter.
pub const LOG_ENV_VAR: &str = "RULEGATE_LOG";

/// Install the global subscriber.
///
/// `level` applies when neither `RULEGATE_LOG` nor `RUST_LOG` is set.
/// Extra calls are no-ops; the process keeps its first subscriber.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let format = fmt::layer().with_target(false);
    let format = if json {
        format.json().boxed()
    } else {
        format.boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .try_init()
        .ok();
}
