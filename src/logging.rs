//! Tracing subscriber setup.

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (e.g. `info` or
/// `sluice_pool=debug,info`) is used.
pub fn init(level: &str) -> Result<()> {
  let filter = match EnvFilter::try_from_default_env() {
    Ok(filter) => filter,
    Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log level: {level}"))?,
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .try_init()
    .map_err(|e| anyhow!(e))
}
