//! Command line interface for the steep type checker.

pub mod args;
pub mod driver;
pub mod tracing_config;

pub use args::{Cli, Command};
pub use driver::{EXIT_DIAGNOSTICS, EXIT_OK, EXIT_WORKER_ERROR};
