//! The driver: wires the master, the worker processes, and the client
//! side of the session together for each CLI mode.
//!
//! Exit codes: 0 clean, 1 diagnostics reported, 2 unrecoverable worker
//! error.

use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tracing::{info, warn};

use steep_check::Project;
use steep_common::Diagnostic;
use steep_server::{
    Dest, Event, Inbound, Master, Message, RequestId, SendMessageJob, Source, WorkerKind,
    WorkerProcess, read_message, spawn_worker, write_message,
};

pub const EXIT_OK: i32 = 0;
pub const EXIT_DIAGNOSTICS: i32 = 1;
pub const EXIT_WORKER_ERROR: i32 = 2;

fn default_jobs() -> usize {
    thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

fn code_worker_kinds(jobs: usize) -> Vec<WorkerKind> {
    (0..jobs)
        .map(|index| WorkerKind::Code { index, count: jobs })
        .collect()
}

/// Route write-queue jobs to the client channel or the worker stdin
/// channels.
fn spawn_dispatcher(
    job_rx: Receiver<SendMessageJob>,
    client_tx: Sender<Message>,
    worker_senders: Vec<Sender<Message>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(job) = job_rx.recv() {
            match job.dest {
                Dest::Client => {
                    let _ = client_tx.send(job.message);
                }
                Dest::Worker(id) => {
                    if let Some(sender) = worker_senders.get(id) {
                        let _ = sender.send(job.message);
                    }
                }
            }
        }
    })
}

fn spawn_workers(
    kinds: &[WorkerKind],
    steepfile: &Path,
    inbound_tx: &Sender<Inbound>,
) -> Result<Vec<WorkerProcess>> {
    let mut processes = Vec::new();
    for (id, kind) in kinds.iter().enumerate() {
        processes.push(spawn_worker(*kind, Some(steepfile), id, inbound_tx.clone())?);
    }
    Ok(processes)
}

// =============================================================================
// steep check
// =============================================================================

pub fn run_check(
    steepfile: Option<PathBuf>,
    jobs: Option<usize>,
    paths: Vec<PathBuf>,
) -> Result<i32> {
    let steepfile = steepfile.unwrap_or_else(|| PathBuf::from("Steepfile"));
    let project = Project::load(&steepfile)
        .with_context(|| format!("failed to load {}", steepfile.display()))?;
    let targets = if paths.is_empty() {
        project.signature_files()
    } else {
        paths
    };
    if targets.is_empty() {
        info!("no signature files to check");
        return Ok(EXIT_OK);
    }

    let jobs = jobs.unwrap_or_else(default_jobs).max(1).min(targets.len());
    let mut kinds = vec![WorkerKind::Signature];
    kinds.extend(code_worker_kinds(jobs));

    let (inbound_tx, inbound_rx) = channel::<Inbound>();
    let processes = spawn_workers(&kinds, &steepfile, &inbound_tx)?;
    let (job_tx, job_rx) = channel::<SendMessageJob>();
    let (client_tx, client_rx) = channel::<Message>();
    let dispatcher = spawn_dispatcher(
        job_rx,
        client_tx,
        processes.iter().map(|p| p.sender.clone()).collect(),
    );

    let mut master = Master::new(kinds, job_tx);
    let master_thread = thread::spawn(move || {
        master.run(&inbound_rx);
        master
    });

    // The driver is the client of its own master.
    let send_client = |message: Message| {
        let _ = inbound_tx.send(Inbound {
            source: Source::Client,
            event: Event::Message(message),
        });
    };
    send_client(Message::request(
        RequestId::Number(1),
        "initialize",
        json!({ "capabilities": {} }),
    ));
    let target_strings: Vec<String> = targets.iter().map(|p| p.display().to_string()).collect();
    send_client(Message::request(
        RequestId::Number(2),
        "$/steep/typecheck",
        json!({ "paths": target_strings }),
    ));

    let mut diagnostics: BTreeMap<String, Vec<Diagnostic>> = BTreeMap::new();
    let mut fatal = false;
    let mut shutdown_sent = false;
    while let Ok(message) = client_rx.recv() {
        match message.method() {
            "textDocument/publishDiagnostics" => {
                let uri = message.params()["uri"].as_str().unwrap_or("").to_string();
                let file_diagnostics: Vec<Diagnostic> =
                    serde_json::from_value(message.params()["diagnostics"].clone())
                        .unwrap_or_default();
                diagnostics.insert(uri, file_diagnostics);
            }
            "window/showMessage" => {
                if message.params()["type"].as_i64() == Some(1) {
                    warn!(
                        message = message.params()["message"].as_str().unwrap_or(""),
                        "worker error"
                    );
                    fatal = true;
                    // The batch may never finish now; wind the session
                    // down instead of waiting for it.
                    if !shutdown_sent {
                        shutdown_sent = true;
                        send_client(Message::request(
                            RequestId::Number(3),
                            "shutdown",
                            Value::Null,
                        ));
                    }
                }
            }
            _ => {}
        }
        if message.is_response() {
            match &message.id {
                Some(RequestId::Number(2)) => {
                    if !shutdown_sent {
                        shutdown_sent = true;
                        send_client(Message::request(
                            RequestId::Number(3),
                            "shutdown",
                            Value::Null,
                        ));
                    }
                }
                Some(RequestId::Number(3)) => {
                    send_client(Message::notification("exit", Value::Null));
                    break;
                }
                _ => {}
            }
        }
    }

    let master = master_thread
        .join()
        .ok()
        .context("master thread panicked")?;
    fatal |= master.fatal_error();
    drop(master);
    drop(inbound_tx);
    let _ = dispatcher.join();
    for process in processes {
        let _ = process.join();
    }

    let count = print_diagnostics(&diagnostics);
    if fatal {
        Ok(EXIT_WORKER_ERROR)
    } else if count > 0 {
        Ok(EXIT_DIAGNOSTICS)
    } else {
        Ok(EXIT_OK)
    }
}

fn print_diagnostics(diagnostics: &BTreeMap<String, Vec<Diagnostic>>) -> usize {
    let mut count = 0;
    for (uri, file_diagnostics) in diagnostics {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        for diagnostic in file_diagnostics {
            count += 1;
            println!(
                "{path}:{}:{}: [{}] {}",
                diagnostic.range.start.line + 1,
                diagnostic.range.start.character + 1,
                diagnostic.code,
                diagnostic.message
            );
        }
    }
    if count == 0 {
        println!("No type errors detected.");
    } else {
        println!("Detected {count} problem(s).");
    }
    count
}

// =============================================================================
// steep langserver
// =============================================================================

pub fn run_langserver(steepfile: Option<PathBuf>, jobs: Option<usize>) -> Result<i32> {
    let steepfile = steepfile.unwrap_or_else(|| PathBuf::from("Steepfile"));
    let jobs = jobs.unwrap_or_else(default_jobs).max(1);
    let mut kinds = vec![WorkerKind::Interaction, WorkerKind::Signature];
    kinds.extend(code_worker_kinds(jobs));

    let (inbound_tx, inbound_rx) = channel::<Inbound>();
    let processes = spawn_workers(&kinds, &steepfile, &inbound_tx)?;
    let (job_tx, job_rx) = channel::<SendMessageJob>();
    let (client_tx, client_rx) = channel::<Message>();
    let dispatcher = spawn_dispatcher(
        job_rx,
        client_tx,
        processes.iter().map(|p| p.sender.clone()).collect(),
    );

    // Client reader: stdin to the shared inbound queue.
    let stdin_tx = inbound_tx.clone();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut reader = BufReader::new(stdin.lock());
        loop {
            match read_message(&mut reader) {
                Ok(Some(message)) => {
                    if stdin_tx
                        .send(Inbound {
                            source: Source::Client,
                            event: Event::Message(message),
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = stdin_tx.send(Inbound {
                        source: Source::Client,
                        event: Event::Eof,
                    });
                    break;
                }
                Err(error) => {
                    warn!(%error, "dropping malformed client message");
                }
            }
        }
    });

    // Client writer: the write queue's client side to stdout.
    let writer_thread = thread::spawn(move || {
        let stdout = std::io::stdout();
        let mut writer = stdout.lock();
        while let Ok(message) = client_rx.recv() {
            if let Err(error) = write_message(&mut writer, &message) {
                warn!(%error, "failed to write to client");
                break;
            }
        }
    });

    let mut master = Master::new(kinds, job_tx);
    master.run(&inbound_rx);
    let fatal = master.fatal_error();

    drop(master);
    drop(inbound_tx);
    let _ = dispatcher.join();
    let _ = writer_thread.join();
    for process in processes {
        let _ = process.join();
    }

    Ok(if fatal { EXIT_WORKER_ERROR } else { EXIT_OK })
}

// =============================================================================
// steep worker
// =============================================================================

pub fn run_worker(
    interaction: bool,
    signature: bool,
    typecheck: bool,
    index: usize,
    count: usize,
    steepfile: Option<PathBuf>,
) -> Result<i32> {
    let kind = match (interaction, signature, typecheck) {
        (true, false, false) => WorkerKind::Interaction,
        (false, true, false) => WorkerKind::Signature,
        (false, false, true) => WorkerKind::Code {
            index,
            count: count.max(1),
        },
        _ => bail!("specify exactly one of --interaction, --signature, --typecheck"),
    };
    steep_server::run_worker(kind, steepfile)?;
    Ok(EXIT_OK)
}
