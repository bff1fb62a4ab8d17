//! The multi-worker LSP coordinator.
//!
//! One [`Master`] multiplexes a client session across isolated worker
//! processes: an interaction worker for hover/completion queries, a
//! signature worker keeping the environment loaded, and N code workers
//! batch-checking files. The master routes, aggregates, and accounts for
//! progress; it never touches a type itself.

pub mod controller;
pub mod master;
pub mod progress;
pub mod protocol;
pub mod runtime;
pub mod worker;

pub use controller::{CheckRequest, TypeCheckController, fresh_guid};
pub use master::Master;
pub use progress::WorkDoneProgress;
pub use protocol::{Message, RequestId, read_message, write_message};
pub use runtime::{WorkerRuntime, run_worker};
pub use worker::{
    Dest, Event, Inbound, SendMessageJob, Source, WorkerId, WorkerKind, WorkerProcess,
    spawn_worker,
};

#[cfg(test)]
mod tests;
