//! CLI arguments for the steep binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "steep",
    version,
    about = "Signature-driven static type checker"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Type check the project's signature files and print diagnostics.
    Check {
        /// Path to the Steepfile.
        #[arg(long = "steepfile")]
        steepfile: Option<PathBuf>,

        /// Number of type check worker processes.
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Check only these files (defaults to every signature file).
        paths: Vec<PathBuf>,
    },

    /// Run the LSP server on stdin/stdout.
    Langserver {
        /// Path to the Steepfile.
        #[arg(long = "steepfile")]
        steepfile: Option<PathBuf>,

        /// Number of type check worker processes.
        #[arg(short = 'j', long)]
        jobs: Option<usize>,
    },

    /// Run a worker process. Spawned by the master; not for direct use.
    Worker {
        /// Answer hover/completion/definition queries.
        #[arg(long)]
        interaction: bool,

        /// Watch the signature environment.
        #[arg(long)]
        signature: bool,

        /// Batch-check assigned files.
        #[arg(long)]
        typecheck: bool,

        /// Which code worker this is.
        #[arg(long, default_value_t = 0)]
        index: usize,

        /// How many code workers exist.
        #[arg(long, default_value_t = 1)]
        count: usize,

        /// Path to the Steepfile.
        #[arg(long = "steepfile")]
        steepfile: Option<PathBuf>,
    },
}
