use sluice_route::RouteKey;

/// Why a task was not admitted to the pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
  /// Every slot is taken and the admission policy is `reject`.
  #[error("worker pool saturated")]
  Saturated,

  /// The route is at its concurrency limit and the admission policy is `reject`.
  #[error("route {route} is at its concurrency limit")]
  RouteSaturated { route: RouteKey },

  /// The pool has shut down.
  #[error("worker pool closed")]
  Closed,
}

/// Errors that end the pool's driver loop.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
  /// An execution slot panicked.
  #[error("execution slot panicked: {message}")]
  SlotPanicked { message: String },

  /// An execution slot stopped while the pool was still running.
  #[error("execution slot {slot} exited unexpectedly")]
  SlotExited { slot: usize },
}
