//! Sluice Task
//!
//! A [`Task`] is one invocation attempt of a route. It carries the request
//! (payload, headers, deadline), a [`TaskState`] that only moves forward, and
//! a completion slot: the first [`TaskOutcome`] recorded wins and wakes every
//! waiter, later ones are ignored.
//!
//! The [`OutcomeLedger`] remembers final outcomes by [`TaskId`] so that a
//! queue message delivered twice is not executed twice. [`TaskEnvelope`] is
//! the form a task takes on the durable queue.

mod envelope;
mod error;
mod id;
mod ledger;
mod outcome;
mod panic;
mod state;
mod task;

pub use envelope::TaskEnvelope;
pub use error::TaskError;
pub use id::TaskId;
pub use ledger::OutcomeLedger;
pub use outcome::{Failure, TaskOutcome};
pub use panic::panic_message;
pub use state::TaskState;
pub use task::Task;
