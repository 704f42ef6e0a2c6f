//! Opt-in log output.
//!
//! The crate only emits `tracing` events. With the `logging` feature enabled,
//! [`init`] installs a compact `fmt` subscriber so those events show up in
//! test output without any extra setup.
//!
//! ```rust,ignore
//! fixative::logging::init()?;
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{FixtureError, Result};

/// Environment variable holding the log filter. Falls back to `RUST_LOG`.
pub const ENV_LOG: &str = "FIXATIVE_LOG";

const DEFAULT_FILTER: &str = "info";

fn filter() -> EnvFilter {
    let directives = std::env::var(ENV_LOG)
        .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
        .unwrap_or_else(|_| DEFAULT_FILTER.to_string());

    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init() -> Result<()> {
    let layer = tracing_subscriber::fmt::layer()
        .without_time()
        .with_target(false)
        .with_test_writer()
        .compact()
        .with_filter(filter());

    Registry::default()
        .with(layer)
        .try_init()
        .map_err(|err| FixtureError::Config(format!("cannot install log subscriber: {err}")))
}
