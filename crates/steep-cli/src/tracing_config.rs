//! Tracing setup.
//!
//! Always stderr: stdout carries the LSP protocol. `STEEP_LOG` selects
//! the filter (`STEEP_LOG=steep_solver=trace`), defaulting to warnings.

use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("STEEP_LOG")
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
