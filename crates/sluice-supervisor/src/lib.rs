//! Sluice Supervisor
//!
//! Keeps the service's long-running units (worker pool driver, async
//! runner, HTTP listener) alive. Each unit is registered with a factory that
//! builds a fresh future from a cancellation token; whenever that future
//! returns, errors or panics before shutdown, the supervisor waits a backoff
//! delay and calls the factory again.
//!
//! ```ignore
//! let mut supervisor = Supervisor::new(config);
//! supervisor.add("pool", move |cancel| pool.clone().run(cancel).map_err(Into::into).boxed());
//! supervisor.serve(shutdown).await?;
//! ```

mod supervisor;

pub use supervisor::{Supervisor, SupervisorError, SupervisorHandle, UnitFuture};
