//! Sluice Async Runner
//!
//! Consumes the durable queue: reserve a message, rebuild the task, run it
//! through the same [`WorkerPool`](sluice_pool::WorkerPool) sync invocations
//! use, then settle the message.
//!
//! | outcome                               | queue                | callback |
//! |---------------------------------------|----------------------|----------|
//! | succeeded                             | delete               | yes      |
//! | failed, not transient                 | delete               | yes      |
//! | failed, transient, attempts left      | release with backoff | no       |
//! | failed, transient, attempts exhausted | delete               | yes      |
//! | already recorded (redelivery)         | delete               | no       |

mod callback;
mod error;
mod runner;

pub use callback::{HttpCallback, NoopCallback, StatusCallback, StatusReport};
pub use error::{CallbackError, RunnerError};
pub use runner::AsyncRunner;
