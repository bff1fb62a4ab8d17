//! Worker-side runtimes.
//!
//! Each worker process runs a single-threaded loop over framed stdin,
//! regardless of kind. The closed-stdin sentinel (EOF) doubles as the
//! graceful shutdown signal. What differs per kind is which methods do
//! real work:
//!
//! - code workers answer `$/steep/typecheck_start` and `workspace/symbol`
//! - the interaction worker answers hover / completion / definition
//! - the signature worker keeps the environment loaded and reports
//!   whether it is loadable at all

use std::io::{BufRead, BufReader, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;

use anyhow::Result;
use serde_json::{Value, json};
use steep_check::{CheckService, Project};
use steep_common::Position;
use tracing::{debug, info, warn};

use crate::controller::stable_hash;
use crate::protocol::{
    METHOD_NOT_FOUND, Message, path_to_uri, read_message, uri_to_path, write_message,
};
use crate::worker::WorkerKind;

/// LSP symbol kind for classes; near enough for interfaces and aliases
/// in this symbol table.
const SYMBOL_KIND_CLASS: i64 = 5;

pub struct WorkerRuntime {
    kind: WorkerKind,
    steepfile: Option<PathBuf>,
    service: Option<CheckService>,
}

/// Run a worker over stdin/stdout until EOF or `exit`.
pub fn run_worker(kind: WorkerKind, steepfile: Option<PathBuf>) -> Result<()> {
    let stdin = std::io::stdin();
    let mut reader = BufReader::new(stdin.lock());
    let stdout = std::io::stdout();
    let mut writer = stdout.lock();
    WorkerRuntime::new(kind, steepfile).run(&mut reader, &mut writer)
}

impl WorkerRuntime {
    pub fn new(kind: WorkerKind, steepfile: Option<PathBuf>) -> Self {
        WorkerRuntime {
            kind,
            steepfile,
            service: None,
        }
    }

    pub fn run<R: BufRead, W: Write>(&mut self, reader: &mut R, writer: &mut W) -> Result<()> {
        info!(worker = %self.kind.name(), "worker ready");
        loop {
            let message = match read_message(reader) {
                Ok(Some(message)) => message,
                // Closed stdin: drain finished, exit gracefully.
                Ok(None) => break,
                Err(error) => {
                    warn!(%error, "dropping malformed message");
                    continue;
                }
            };
            let mut outbound = Vec::new();
            let flow = self.handle(message, &mut outbound);
            for message in outbound {
                write_message(writer, &message)?;
            }
            if let ControlFlow::Break(()) = flow {
                break;
            }
        }
        Ok(())
    }

    /// Handle one message, pushing whatever should be sent onto
    /// `outbound`.
    pub fn handle(&mut self, message: Message, outbound: &mut Vec<Message>) -> ControlFlow<()> {
        let id_for_unhandled = message.id.clone();
        match message.method() {
            "initialize" => self.handle_initialize(message, outbound),
            "initialized" => {}
            "textDocument/didOpen" => {
                if let Some((path, Some(text))) = self.document_of(&message, "text") {
                    self.update_overlay(path, text);
                }
            }
            "textDocument/didChange" => {
                let text = message.params()["contentChanges"][0]["text"]
                    .as_str()
                    .map(str::to_string);
                if let Some((path, _)) = self.document_of(&message, "text") {
                    if let Some(text) = text {
                        self.update_overlay(path, text);
                    }
                }
            }
            "textDocument/didClose" => {
                // Re-checking is whole-file: reload the saved content.
                if let Some((path, _)) = self.document_of(&message, "text") {
                    if let Ok(text) = std::fs::read_to_string(&path) {
                        self.update_overlay(path, text);
                    }
                }
            }
            "$/steep/typecheck_start" => self.handle_typecheck_start(&message, outbound),
            "textDocument/hover" => self.handle_hover(&message, outbound),
            "textDocument/completion" => self.handle_completion(&message, outbound),
            "textDocument/definition" | "textDocument/implementation" => {
                self.handle_definition(&message, outbound);
            }
            "workspace/symbol" => self.handle_workspace_symbol(&message, outbound),
            "$/cancelRequest" => {
                // Handlers are run-to-completion; by the time a
                // cancellation arrives the answer is already queued.
            }
            "shutdown" => {
                if let Some(id) = message.id {
                    outbound.push(Message::response(id, Value::Null));
                }
            }
            "exit" => return ControlFlow::Break(()),
            other => {
                if let Some(id) = id_for_unhandled {
                    outbound.push(Message::error_response(
                        id,
                        METHOD_NOT_FOUND,
                        format!("unhandled method: {other}"),
                    ));
                } else {
                    debug!(method = other, "ignoring notification");
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_initialize(&mut self, message: Message, outbound: &mut Vec<Message>) {
        let steepfile = self
            .steepfile
            .clone()
            .unwrap_or_else(|| PathBuf::from("Steepfile"));
        match Project::load(&steepfile).and_then(|project| CheckService::load(&project)) {
            Ok(service) => {
                info!(worker = %self.kind.name(), "signature environment loaded");
                self.service = Some(service);
            }
            Err(error) => {
                // A worker without an environment cannot do anything
                // useful; the master treats this as unrecoverable.
                outbound.push(Message::notification(
                    "window/showMessage",
                    json!({
                        "type": 1,
                        "message": format!("failed to load signatures: {error}"),
                    }),
                ));
            }
        }
        if let Some(id) = message.id {
            outbound.push(Message::response(id, json!({ "capabilities": {} })));
        }
    }

    fn update_overlay(&mut self, path: PathBuf, text: String) {
        if let Some(service) = &mut self.service {
            service.update_file(path, text);
        }
    }

    /// Extract the document path plus an optional string field of
    /// `textDocument` (e.g. `text` for didOpen).
    fn document_of(&self, message: &Message, field: &str) -> Option<(PathBuf, Option<String>)> {
        let doc = &message.params()["textDocument"];
        let uri = doc["uri"].as_str()?;
        let path = uri_to_path(uri)?;
        let value = doc[field].as_str().map(str::to_string);
        Some((path, value))
    }

    fn position_of(message: &Message) -> Option<Position> {
        let position = &message.params()["position"];
        Some(Position::new(
            u32::try_from(position["line"].as_u64()?).ok()?,
            u32::try_from(position["character"].as_u64()?).ok()?,
        ))
    }

    // =========================================================================
    // Batch Checking (code workers)
    // =========================================================================

    fn handle_typecheck_start(&mut self, message: &Message, outbound: &mut Vec<Message>) {
        let params = message.params();
        let guid = params["guid"].as_str().unwrap_or("").to_string();
        let paths: Vec<PathBuf> = params["paths"]
            .as_array()
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(Value::as_str)
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();
        debug!(worker = %self.kind.name(), %guid, count = paths.len(), "batch check");

        for path in paths {
            let diagnostics = match &self.service {
                Some(service) => match service.check_file(&path) {
                    Ok(diagnostics) => diagnostics,
                    Err(error) => {
                        // An internal invariant broke: abandon the batch
                        // and let the master treat it as unrecoverable.
                        outbound.push(Message::notification(
                            "window/showMessage",
                            json!({
                                "type": 1,
                                "message": format!(
                                    "internal error checking {}: {error}",
                                    path.display()
                                ),
                            }),
                        ));
                        return;
                    }
                },
                None => Vec::new(),
            };
            outbound.push(Message::notification(
                "textDocument/publishDiagnostics",
                json!({
                    "uri": path_to_uri(&path),
                    "diagnostics": diagnostics,
                }),
            ));
            outbound.push(Message::notification(
                "$/steep/typecheck_update",
                json!({ "guid": guid, "path": path.display().to_string() }),
            ));
        }
    }

    // =========================================================================
    // Interaction Queries
    // =========================================================================

    fn handle_hover(&mut self, message: &Message, outbound: &mut Vec<Message>) {
        let Some(id) = message.id.clone() else {
            return;
        };
        let result = self.with_document(message, |service, path, position| {
            service.hover(&path, position).map(|contents| {
                json!({
                    "contents": { "kind": "markdown", "value": contents }
                })
            })
        });
        outbound.push(Message::response(id, result.unwrap_or(Value::Null)));
    }

    fn handle_completion(&mut self, message: &Message, outbound: &mut Vec<Message>) {
        let Some(id) = message.id.clone() else {
            return;
        };
        let items: Vec<Value> = match &self.service {
            Some(service) => service
                .completion()
                .into_iter()
                .map(|name| json!({ "label": name }))
                .collect(),
            None => Vec::new(),
        };
        outbound.push(Message::response(id, json!(items)));
    }

    fn handle_definition(&mut self, message: &Message, outbound: &mut Vec<Message>) {
        let Some(id) = message.id.clone() else {
            return;
        };
        let result = self.with_document(message, |service, path, position| {
            service.definition(&path, position).map(|(path, range)| {
                json!([{ "uri": path_to_uri(&path), "range": range }])
            })
        });
        outbound.push(Message::response(id, result.unwrap_or_else(|| json!([]))));
    }

    fn with_document(
        &self,
        message: &Message,
        query: impl FnOnce(&CheckService, PathBuf, Position) -> Option<Value>,
    ) -> Option<Value> {
        let service = self.service.as_ref()?;
        let (path, _) = self.document_of(message, "text")?;
        let position = Self::position_of(message)?;
        query(service, path, position)
    }

    // =========================================================================
    // Workspace Symbols (code workers)
    // =========================================================================

    /// Report symbols declared in the files this worker owns for this
    /// request. The master partitions ownership over the workers it has
    /// alive and sends each its slot in the params, so the aggregation
    /// sees each symbol exactly once; a worker spawned as one of N may
    /// own a different share once siblings die.
    fn handle_workspace_symbol(&mut self, message: &Message, outbound: &mut Vec<Message>) {
        let Some(id) = message.id.clone() else {
            return;
        };
        let params = message.params();
        let query = params["query"].as_str().unwrap_or("");
        let index = usize::try_from(params["index"].as_u64().unwrap_or(0)).unwrap_or(0);
        let count = usize::try_from(params["count"].as_u64().unwrap_or(1))
            .unwrap_or(1)
            .max(1);
        let mut symbols = Vec::new();
        if let Some(service) = &self.service {
            for name in service.completion() {
                if !query.is_empty() && !name.contains(query) {
                    continue;
                }
                let Some((path, span)) = service.decl_location(&name) else {
                    continue;
                };
                if stable_hash(path) % count != index {
                    continue;
                }
                let Some(file) = service.file(path) else {
                    continue;
                };
                let range = file.line_map.span_to_range(*span, &file.source);
                symbols.push(json!({
                    "name": name,
                    "kind": SYMBOL_KIND_CLASS,
                    "location": { "uri": path_to_uri(path), "range": range },
                }));
            }
        }
        outbound.push(Message::response(id, json!(symbols)));
    }
}
