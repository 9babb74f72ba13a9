use sluice_queue::QueueError;

/// Errors that end the runner loop.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
  /// The queue couldn't be read; the loop needs restarting.
  #[error("queue unavailable: {0}")]
  Queue(#[from] QueueError),
}

/// Errors delivering a status callback.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),
}
