//! The steep binary: `check`, `langserver`, and the `worker` entry the
//! master spawns its children through.

use anyhow::Result;
use clap::Parser;
use tracing::error;

use steep_cli::args::{Cli, Command};
use steep_cli::driver;

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Check {
            steepfile,
            jobs,
            paths,
        } => driver::run_check(steepfile, jobs, paths),
        Command::Langserver { steepfile, jobs } => driver::run_langserver(steepfile, jobs),
        Command::Worker {
            interaction,
            signature,
            typecheck,
            index,
            count,
            steepfile,
        } => driver::run_worker(interaction, signature, typecheck, index, count, steepfile),
    }
}

fn main() {
    steep_cli::tracing_config::init_tracing();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(error) => {
            error!(%error, "steep failed");
            driver::EXIT_WORKER_ERROR
        }
    };
    std::process::exit(code);
}
