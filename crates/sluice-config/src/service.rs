//! Process-level configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enums::AdmissionPolicy;
use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Worker pool sizing and admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
  /// Number of execution slots, i.e. the global concurrency ceiling.
  pub size: usize,
  pub admission: AdmissionPolicy,
  /// Grace period the container runtime gets to clean up after a deadline.
  pub cancel_grace_ms: u64,
}

impl Default for PoolConfig {
  fn default() -> Self {
    let cpus = std::thread::available_parallelism()
      .map(|n| n.get())
      .unwrap_or(1);
    Self {
      size: cpus * 2,
      admission: AdmissionPolicy::Block,
      cancel_grace_ms: 5_000,
    }
  }
}

impl PoolConfig {
  pub fn cancel_grace(&self) -> Duration {
    Duration::from_millis(self.cancel_grace_ms)
  }
}

/// Retention for the set of task ids whose outcome is final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
  pub capacity: usize,
  pub ttl_secs: u64,
}

impl Default for LedgerConfig {
  fn default() -> Self {
    Self {
      capacity: 10_000,
      ttl_secs: 3_600,
    }
  }
}

impl LedgerConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_secs(self.ttl_secs)
  }
}

/// Durable queue behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
  /// How long a reserved message stays invisible before it is redelivered.
  pub reservation_timeout_ms: u64,
  /// Poll interval for backends without push notification (SQLite).
  pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      reservation_timeout_ms: 300_000,
      poll_interval_ms: 200,
    }
  }
}

impl QueueConfig {
  pub fn reservation_timeout(&self) -> Duration {
    Duration::from_millis(self.reservation_timeout_ms)
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms)
  }
}

/// Async runner loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
  /// Long-poll wait for a single `reserve` call.
  pub reserve_timeout_ms: u64,
  /// Deadline given to each async task attempt.
  pub task_timeout_ms: u64,
  /// Reserved messages handled at once; 0 means one per pool slot.
  pub concurrency: usize,
  pub retry: RetryPolicy,
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self {
      reserve_timeout_ms: 1_000,
      task_timeout_ms: 60_000,
      concurrency: 0,
      retry: RetryPolicy::default(),
    }
  }
}

impl RunnerConfig {
  pub fn reserve_timeout(&self) -> Duration {
    Duration::from_millis(self.reserve_timeout_ms)
  }

  pub fn task_timeout(&self) -> Duration {
    Duration::from_millis(self.task_timeout_ms)
  }

  /// Effective concurrency for a pool with `pool_size` slots.
  pub fn concurrency_for(&self, pool_size: usize) -> usize {
    match self.concurrency {
      0 => pool_size.max(1),
      n => n,
    }
  }
}

/// Restart and shutdown timing for supervised units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
  pub restart_delay_ms: u64,
  pub max_restart_delay_ms: u64,
  pub drain_timeout_ms: u64,
}

impl Default for SupervisorConfig {
  fn default() -> Self {
    Self {
      restart_delay_ms: 100,
      max_restart_delay_ms: 5_000,
      drain_timeout_ms: 30_000,
    }
  }
}

impl SupervisorConfig {
  pub fn restart_delay(&self) -> Duration {
    Duration::from_millis(self.restart_delay_ms)
  }

  pub fn max_restart_delay(&self) -> Duration {
    Duration::from_millis(self.max_restart_delay_ms)
  }

  pub fn drain_timeout(&self) -> Duration {
    Duration::from_millis(self.drain_timeout_ms)
  }
}

/// Top-level configuration for the `sluice` service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
  pub log_level: String,
  pub port: u16,
  /// Datastore URL: `memory://` or `sqlite://<path>`.
  pub db_url: String,
  /// Queue URL: `memory://` or `sqlite://<path>`.
  pub mq_url: String,
  /// Base URL that async status callbacks are posted to. Defaults to the
  /// service's own listener when unset.
  pub api_url: Option<String>,
  /// Deadline for sync invocations that don't carry their own.
  pub sync_timeout_ms: u64,
  pub pool: PoolConfig,
  pub runner: RunnerConfig,
  pub queue: QueueConfig,
  pub ledger: LedgerConfig,
  pub supervisor: SupervisorConfig,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      log_level: "info".to_string(),
      port: 8080,
      db_url: "sqlite://data/sluice.db".to_string(),
      mq_url: "sqlite://data/sluice_mq.db".to_string(),
      api_url: None,
      sync_timeout_ms: 30_000,
      pool: PoolConfig::default(),
      runner: RunnerConfig::default(),
      queue: QueueConfig::default(),
      ledger: LedgerConfig::default(),
      supervisor: SupervisorConfig::default(),
    }
  }
}

impl ServiceConfig {
  /// Load a config file, filling unspecified fields with defaults.
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    config.check()?;
    Ok(config)
  }

  /// Reject values the rest of the system can't work with.
  pub fn check(&self) -> Result<(), ConfigError> {
    if self.pool.size == 0 {
      return Err(ConfigError::Invalid {
        field: "pool.size".to_string(),
        message: "must be at least 1".to_string(),
      });
    }
    if self.runner.retry.max_attempts == 0 {
      return Err(ConfigError::Invalid {
        field: "runner.retry.max_attempts".to_string(),
        message: "must be at least 1".to_string(),
      });
    }
    Ok(())
  }

  /// Base URL for status callbacks.
  pub fn callback_base_url(&self) -> String {
    self
      .api_url
      .clone()
      .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.port))
  }

  pub fn sync_timeout(&self) -> Duration {
    Duration::from_millis(self.sync_timeout_ms)
  }
}
