//! Sluice Worker Pool
//!
//! Every invocation, sync or async, is executed here. The pool owns a fixed
//! number of execution slots that pull tasks from a shared intake and run
//! them against a [`ContainerRuntime`](sluice_container::ContainerRuntime).
//!
//! Admission is two-gated: a task first takes a permit from its route's
//! gate (only for routes with a concurrency limit), then one of the pool's
//! global permits. Both are held until the outcome is recorded, so at most
//! `size` tasks are ever in the intake or running.
//!
//! ```ignore
//! let pool = WorkerPool::new(config, runtime, ledger);
//!
//! // supervised driver
//! tokio::spawn(pool.clone().run(cancel.child_token()));
//!
//! // from anywhere
//! let outcome = pool.execute(Arc::new(task)).await?;
//! ```

mod env;
mod error;
mod gate;
mod pool;

pub use env::invocation_env;
pub use error::{AdmissionError, PoolError};
pub use pool::WorkerPool;
