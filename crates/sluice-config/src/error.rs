use std::path::PathBuf;

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  /// The config file could not be read.
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The config file is not valid JSON for [`crate::ServiceConfig`].
  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  /// A value parsed but makes no sense (e.g. a zero-sized pool).
  #[error("invalid config value for '{field}': {message}")]
  Invalid { field: String, message: String },
}
