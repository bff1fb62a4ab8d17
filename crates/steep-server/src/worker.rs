//! The worker process abstraction.
//!
//! A worker is a child process speaking LSP framing on stdin/stdout with
//! stderr inherited. One reader thread per worker decodes messages onto
//! the master's shared inbound queue; one writer thread per worker drains
//! a channel into the child's stdin. Dropping the channel sender closes
//! stdin, which is the worker's graceful-shutdown sentinel.

use std::io::BufReader;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::protocol::{Message, read_message, write_message};

pub type WorkerId = usize;

/// What a worker process is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerKind {
    /// Answers hover/completion/definition queries.
    Interaction,
    /// Watches the signature environment as a whole.
    Signature,
    /// Checks assigned files; there are `count` of these.
    Code { index: usize, count: usize },
}

impl WorkerKind {
    pub fn is_code(&self) -> bool {
        matches!(self, WorkerKind::Code { .. })
    }

    pub fn name(&self) -> String {
        match self {
            WorkerKind::Interaction => "interaction".to_string(),
            WorkerKind::Signature => "signature".to_string(),
            WorkerKind::Code { index, .. } => format!("code[{index}]"),
        }
    }
}

/// Where an inbound message came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Client,
    Worker(WorkerId),
}

/// What the reader thread saw.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Message(Message),
    /// The stream ended: the process died or closed stdout.
    Eof,
}

/// An entry on the master's shared inbound queue.
#[derive(Clone, Debug, PartialEq)]
pub struct Inbound {
    pub source: Source,
    pub event: Event,
}

/// Destination of an outbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dest {
    Client,
    Worker(WorkerId),
}

/// An entry on the master's write queue.
#[derive(Clone, Debug, PartialEq)]
pub struct SendMessageJob {
    pub dest: Dest,
    pub message: Message,
}

impl SendMessageJob {
    pub fn to_client(message: Message) -> Self {
        SendMessageJob {
            dest: Dest::Client,
            message,
        }
    }

    pub fn to_worker(worker: WorkerId, message: Message) -> Self {
        SendMessageJob {
            dest: Dest::Worker(worker),
            message,
        }
    }
}

/// A spawned worker process with its I/O threads.
pub struct WorkerProcess {
    pub kind: WorkerKind,
    pub sender: Sender<Message>,
    child: Child,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

/// Spawn a worker as a child of the current executable.
///
/// `worker_id` tags the messages its reader thread pushes onto
/// `inbound`.
pub fn spawn_worker(
    kind: WorkerKind,
    steepfile: Option<&Path>,
    worker_id: WorkerId,
    inbound: Sender<Inbound>,
) -> Result<WorkerProcess> {
    let exe = std::env::current_exe().context("cannot locate the steep executable")?;
    let mut command = Command::new(exe);
    command.arg("worker");
    match kind {
        WorkerKind::Interaction => {
            command.arg("--interaction");
        }
        WorkerKind::Signature => {
            command.arg("--signature");
        }
        WorkerKind::Code { index, count } => {
            command
                .arg("--typecheck")
                .arg(format!("--index={index}"))
                .arg(format!("--count={count}"));
        }
    }
    if let Some(steepfile) = steepfile {
        command.arg(format!("--steepfile={}", steepfile.display()));
    }
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to spawn {} worker", kind.name()))?;
    info!(worker = %kind.name(), pid = child.id(), "spawned worker");

    let stdout = child.stdout.take().context("worker stdout not piped")?;
    let reader = std::thread::spawn(move || {
        let mut reader = BufReader::new(stdout);
        loop {
            match read_message(&mut reader) {
                Ok(Some(message)) => {
                    if inbound
                        .send(Inbound {
                            source: Source::Worker(worker_id),
                            event: Event::Message(message),
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = inbound.send(Inbound {
                        source: Source::Worker(worker_id),
                        event: Event::Eof,
                    });
                    break;
                }
                Err(error) => {
                    // Malformed message: logged and skipped.
                    warn!(worker = worker_id, %error, "dropping malformed message");
                }
            }
        }
    });

    let stdin = child.stdin.take().context("worker stdin not piped")?;
    let (sender, receiver): (Sender<Message>, Receiver<Message>) = channel();
    let kind_name = kind.name();
    let writer = std::thread::spawn(move || {
        let mut stdin = stdin;
        while let Ok(message) = receiver.recv() {
            if let Err(error) = write_message(&mut stdin, &message) {
                warn!(worker = %kind_name, %error, "failed to write to worker");
                break;
            }
        }
        // Receiver drained and senders dropped: stdin closes here, which
        // tells the worker to finish up.
    });

    Ok(WorkerProcess {
        kind,
        sender,
        child,
        reader: Some(reader),
        writer: Some(writer),
    })
}

impl WorkerProcess {
    /// Close stdin and wait for the process and its threads. Any other
    /// clones of `sender` must be dropped first for stdin to actually
    /// close.
    pub fn join(mut self) -> Result<()> {
        let (stub, _) = channel();
        drop(std::mem::replace(&mut self.sender, stub));
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        Ok(())
    }
}
