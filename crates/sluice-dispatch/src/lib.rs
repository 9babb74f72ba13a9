//! Sluice Dispatch
//!
//! The two entry paths into execution, plus the facade that picks between
//! them:
//!
//! - [`SyncDispatcher`]: build a task, run it through the worker pool and
//!   wait for the result or the deadline.
//! - [`AsyncEnqueuer`]: serialize a task onto the durable queue and return
//!   its id straight away.
//! - [`Invoker`]: resolve `(app, path)` through the datastore, validate the
//!   route, and hand off to whichever of the two the route's type asks for.

mod enqueue;
mod error;
mod invoke;
mod sync;

pub use enqueue::AsyncEnqueuer;
pub use error::{DispatchError, EnqueueError, InvokeError};
pub use invoke::{Invocation, InvokeRequest, Invoker};
pub use sync::{Dispatched, SyncDispatcher};
