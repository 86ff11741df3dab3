//! Tracing subscriber setup for binaries and tests embedding the domain core.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use crate::config::DomainConfig;

/// Installs the global tracing subscriber.
///
/// Filtering follows `config.log_level` (an `EnvFilter` directive); lines are
/// human-readable unless `config.log_json` is set. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(config: &DomainConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let json = config.log_json.then(|| tracing_subscriber::fmt::layer().json());
    let plain = (!config.log_json).then(|| tracing_subscriber::fmt::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .try_init()
}
