//! Sluice Config
//!
//! Serializable configuration types shared by the sluice crates. Every struct
//! has a `Default` and uses `#[serde(default)]`, so a config file only needs
//! to name the settings it wants to change.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `--config=sluice.json`)
//! - CLI flags / environment variables layered on top by the binary

mod enums;
mod error;
mod retry;
mod service;

pub use enums::{AdmissionPolicy, RetryBackoff};
pub use error::ConfigError;
pub use retry::RetryPolicy;
pub use service::{
  LedgerConfig, PoolConfig, QueueConfig, RunnerConfig, ServiceConfig, SupervisorConfig,
};
