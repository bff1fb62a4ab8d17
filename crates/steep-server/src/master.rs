//! The LSP master.
//!
//! A single event-loop thread owns all master state. Reader threads (one
//! per worker, one for the client) marshal bytes into the shared inbound
//! queue; everything the master says goes out through the write queue as
//! `SendMessageJob`s, drained by writer threads per destination.
//!
//! The master never does type work itself: it routes client traffic to
//! the interaction / signature / code workers, tracks batch check
//! progress, and aggregates worker responses.

use std::ops::ControlFlow;
use std::path::PathBuf;

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Value, json};
use std::sync::mpsc::{Receiver, Sender};
use tracing::{debug, info, trace, warn};

use crate::controller::{CheckRequest, TypeCheckController, fresh_guid};
use crate::progress::WorkDoneProgress;
use crate::protocol::{METHOD_NOT_FOUND, Message, RequestId, is_untitled, uri_to_path};
use crate::worker::{Event, Inbound, SendMessageJob, Source, WorkerId, WorkerKind};

/// Severity constant of `window/showMessage`.
const MESSAGE_TYPE_ERROR: i64 = 1;

/// Progress events are suppressed for batches smaller than this unless
/// configured otherwise.
pub const DEFAULT_REPORT_PROGRESS_THRESHOLD: usize = 0;

struct WorkerMeta {
    kind: WorkerKind,
    alive: bool,
}

struct SymbolAggregation {
    client_id: RequestId,
    remaining: usize,
    results: Vec<Value>,
}

pub struct Master {
    workers: Vec<WorkerMeta>,
    out: Sender<SendMessageJob>,
    controller: TypeCheckController,
    work_done_progress: bool,
    report_progress_threshold: usize,
    current_request: Option<CheckRequest>,
    progress: FxHashMap<String, WorkDoneProgress>,
    /// Outstanding interaction request ids, mapped to the originating
    /// client request id.
    interaction_requests: FxHashMap<RequestId, RequestId>,
    cancelled: FxHashSet<RequestId>,
    symbol_requests: FxHashMap<RequestId, SymbolAggregation>,
    shutdown_acks: FxHashSet<RequestId>,
    shutdown_client_id: Option<RequestId>,
    next_id: i64,
    fatal_error: bool,
}

impl Master {
    pub fn new(kinds: Vec<WorkerKind>, out: Sender<SendMessageJob>) -> Master {
        let code_count = kinds.iter().filter(|k| k.is_code()).count();
        Master {
            workers: kinds
                .into_iter()
                .map(|kind| WorkerMeta { kind, alive: true })
                .collect(),
            out,
            controller: TypeCheckController::new(code_count),
            work_done_progress: false,
            report_progress_threshold: DEFAULT_REPORT_PROGRESS_THRESHOLD,
            current_request: None,
            progress: FxHashMap::default(),
            interaction_requests: FxHashMap::default(),
            cancelled: FxHashSet::default(),
            symbol_requests: FxHashMap::default(),
            shutdown_acks: FxHashSet::default(),
            shutdown_client_id: None,
            next_id: 0,
            fatal_error: false,
        }
    }

    #[must_use]
    pub fn with_report_progress_threshold(mut self, threshold: usize) -> Master {
        self.report_progress_threshold = threshold;
        self
    }

    /// True once a worker reported an unrecoverable error.
    pub fn fatal_error(&self) -> bool {
        self.fatal_error
    }

    pub fn controller(&self) -> &TypeCheckController {
        &self.controller
    }

    /// Drain the inbound queue until `exit` or a fatal condition.
    pub fn run(&mut self, inbound: &Receiver<Inbound>) {
        while let Ok(item) = inbound.recv() {
            if let ControlFlow::Break(()) = self.process(item) {
                break;
            }
        }
    }

    /// Handle one inbound item. Run-to-completion: no suspension points
    /// inside a handler.
    pub fn process(&mut self, inbound: Inbound) -> ControlFlow<()> {
        match (inbound.source, inbound.event) {
            (Source::Client, Event::Message(message)) => self.handle_client_message(message),
            (Source::Client, Event::Eof) => ControlFlow::Break(()),
            (Source::Worker(id), Event::Message(message)) => {
                self.handle_worker_message(id, message)
            }
            (Source::Worker(id), Event::Eof) => self.handle_worker_eof(id),
        }
    }

    // =========================================================================
    // Outbound Helpers
    // =========================================================================

    fn send_to_client(&self, message: Message) {
        let _ = self.out.send(SendMessageJob::to_client(message));
    }

    fn send_to_worker(&self, worker: WorkerId, message: Message) {
        let _ = self.out.send(SendMessageJob::to_worker(worker, message));
    }

    fn fresh_request_id(&mut self) -> RequestId {
        self.next_id += 1;
        RequestId::Number(self.next_id)
    }

    fn alive_workers(&self) -> impl Iterator<Item = (WorkerId, &WorkerMeta)> {
        self.workers
            .iter()
            .enumerate()
            .filter(|(_, meta)| meta.alive)
    }

    /// Alive code workers with their assignment ordinal (position among
    /// all code workers, dead ones included, matching the controller's
    /// numbering).
    fn code_workers(&self) -> Vec<(WorkerId, usize)> {
        self.workers
            .iter()
            .enumerate()
            .filter(|(_, meta)| meta.kind.is_code())
            .enumerate()
            .filter(|(_, (_, meta))| meta.alive)
            .map(|(ordinal, (id, _))| (id, ordinal))
            .collect()
    }

    fn code_ordinal(&self, worker: WorkerId) -> Option<usize> {
        self.workers
            .iter()
            .enumerate()
            .filter(|(_, meta)| meta.kind.is_code())
            .position(|(id, _)| id == worker)
    }

    fn interaction_worker(&self) -> Option<WorkerId> {
        self.alive_workers()
            .find(|(_, meta)| meta.kind == WorkerKind::Interaction)
            .map(|(id, _)| id)
    }

    // =========================================================================
    // Client Messages
    // =========================================================================

    fn handle_client_message(&mut self, message: Message) -> ControlFlow<()> {
        trace!(method = message.method(), "client message");
        match message.method() {
            "initialize" => self.handle_initialize(message),
            "initialized" => {}
            "textDocument/didOpen" => {
                if let Some(path) = self.editable_path(&message) {
                    self.controller.update_priority(&[path], &[]);
                    self.forward_to_code_workers(message);
                }
            }
            "textDocument/didClose" => {
                if let Some(path) = self.editable_path(&message) {
                    self.controller.update_priority(&[], &[path]);
                    self.forward_to_code_workers(message);
                }
            }
            "textDocument/didChange" => {
                if let Some(path) = self.editable_path(&message) {
                    self.controller.push_change(path);
                    self.forward_to_code_workers(message);
                }
            }
            // Saving changes nothing the workers have not already seen.
            "textDocument/didSave" => {}
            "textDocument/hover" | "textDocument/completion" => {
                self.route_interaction(message, Value::Null);
            }
            "textDocument/definition" | "textDocument/implementation" => {
                self.route_interaction(message, json!([]));
            }
            "workspace/symbol" => self.handle_workspace_symbol(message),
            "$/steep/typecheck" => self.start_type_check(message),
            "$/cancelRequest" => self.handle_cancel(&message),
            "shutdown" => self.handle_shutdown(message),
            "exit" => {
                for (id, _) in self.alive_workers() {
                    self.send_to_worker(id, Message::notification("exit", Value::Null));
                }
                return ControlFlow::Break(());
            }
            _ => {
                if let Some(id) = message.id.clone() {
                    self.send_to_client(Message::error_response(
                        id,
                        METHOD_NOT_FOUND,
                        format!("unhandled method: {}", message.method()),
                    ));
                } else {
                    debug!(method = message.method(), "ignoring notification");
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_initialize(&mut self, message: Message) {
        self.work_done_progress = message.params()["capabilities"]["window"]["workDoneProgress"]
            .as_bool()
            .unwrap_or(false);
        info!(
            work_done_progress = self.work_done_progress,
            "initializing session"
        );

        // Every worker loads its own signature environment.
        let targets: Vec<WorkerId> = self.alive_workers().map(|(id, _)| id).collect();
        for id in targets {
            let request_id = self.fresh_request_id();
            self.send_to_worker(
                id,
                Message::request(request_id, "initialize", message.params().clone()),
            );
        }

        if let Some(id) = message.id {
            self.send_to_client(Message::response(
                id,
                json!({
                    "capabilities": {
                        "textDocumentSync": { "openClose": true, "change": 1 },
                        "hoverProvider": true,
                        "completionProvider": {},
                        "definitionProvider": true,
                        "implementationProvider": true,
                        "workspaceSymbolProvider": true,
                    }
                }),
            ));
        }
    }

    /// The path of the document a notification talks about. Untitled
    /// URIs yield None: they never reach the controller or a worker.
    fn editable_path(&self, message: &Message) -> Option<PathBuf> {
        let uri = message.params()["textDocument"]["uri"].as_str()?;
        if is_untitled(uri) {
            return None;
        }
        uri_to_path(uri)
    }

    fn forward_to_code_workers(&self, message: Message) {
        for (id, _) in self.code_workers() {
            self.send_to_worker(id, message.clone());
        }
    }

    /// Route an interaction request, answering `untitled_reply`
    /// immediately for untitled buffers without a worker round-trip.
    fn route_interaction(&mut self, message: Message, untitled_reply: Value) {
        let Some(client_id) = message.id.clone() else {
            return;
        };
        let uri = message.params()["textDocument"]["uri"]
            .as_str()
            .unwrap_or("");
        if is_untitled(uri) {
            self.send_to_client(Message::response(client_id, untitled_reply));
            return;
        }
        let Some(worker) = self.interaction_worker() else {
            self.send_to_client(Message::response(client_id, untitled_reply));
            return;
        };
        let out_id = self.fresh_request_id();
        self.interaction_requests.insert(out_id.clone(), client_id);
        self.send_to_worker(
            worker,
            Message::request(out_id, message.method(), message.params().clone()),
        );
    }

    /// Broadcast a symbol query to the code workers. Symbol ownership is
    /// partitioned per request over the workers currently alive (each
    /// gets its slot in the params), so the aggregated response sees
    /// every symbol exactly once even after a worker died.
    fn handle_workspace_symbol(&mut self, message: Message) {
        let Some(client_id) = message.id.clone() else {
            return;
        };
        let workers = self.code_workers();
        if workers.is_empty() {
            self.send_to_client(Message::response(client_id, json!([])));
            return;
        }
        let out_id = self.fresh_request_id();
        self.symbol_requests.insert(
            out_id.clone(),
            SymbolAggregation {
                client_id,
                remaining: workers.len(),
                results: Vec::new(),
            },
        );
        let query = message.params()["query"].clone();
        let count = workers.len();
        for (slot, (id, _)) in workers.into_iter().enumerate() {
            self.send_to_worker(
                id,
                Message::request(
                    out_id.clone(),
                    "workspace/symbol",
                    json!({ "query": query.clone(), "index": slot, "count": count }),
                ),
            );
        }
    }

    fn handle_cancel(&mut self, message: &Message) {
        let Ok(client_id) = serde_json::from_value::<RequestId>(message.params()["id"].clone())
        else {
            return;
        };
        self.cancelled.insert(client_id.clone());
        // Forward the cancellation for any in-flight interaction request.
        let out_ids: Vec<RequestId> = self
            .interaction_requests
            .iter()
            .filter(|(_, client)| **client == client_id)
            .map(|(out, _)| out.clone())
            .collect();
        if let Some(worker) = self.interaction_worker() {
            for out_id in out_ids {
                self.send_to_worker(
                    worker,
                    Message::notification(
                        "$/cancelRequest",
                        json!({ "id": serde_json::to_value(&out_id).unwrap_or(Value::Null) }),
                    ),
                );
            }
        }
    }

    fn handle_shutdown(&mut self, message: Message) {
        let targets: Vec<WorkerId> = self.alive_workers().map(|(id, _)| id).collect();
        if targets.is_empty() {
            if let Some(id) = message.id {
                self.send_to_client(Message::response(id, Value::Null));
            }
            return;
        }
        self.shutdown_client_id = message.id;
        for id in targets {
            let request_id = self.fresh_request_id();
            self.shutdown_acks.insert(request_id.clone());
            self.send_to_worker(id, Message::request(request_id, "shutdown", Value::Null));
        }
    }

    // =========================================================================
    // Batch Checks
    // =========================================================================

    fn start_type_check(&mut self, message: Message) {
        let params = message.params();
        if let Some(paths) = params["paths"].as_array() {
            for path in paths.iter().filter_map(Value::as_str) {
                self.controller.push_change(PathBuf::from(path));
            }
        }
        let guid = params["guid"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(fresh_guid);

        // A new batch check replaces the previous one: answer the old
        // request, close its progress, and carry its unchecked paths
        // into the new assignment.
        let previous = self.current_request.take();
        if let Some(previous) = &previous {
            if let Some(mut progress) = self.progress.remove(&previous.guid) {
                if let Some(end) = progress.end_message() {
                    self.send_to_client(end);
                }
            }
            if let Some(client_id) = previous.client_request_id.clone() {
                self.send_to_client(Message::response(
                    client_id,
                    json!({ "guid": previous.guid }),
                ));
            }
        }

        let request = self
            .controller
            .make_request(previous.as_ref(), guid, message.id.clone());
        let Some(request) = request else {
            if let Some(id) = message.id {
                self.send_to_client(Message::response(id, Value::Null));
            }
            return;
        };
        info!(guid = %request.guid, total = request.total, "starting batch check");

        if self.work_done_progress && request.total >= self.report_progress_threshold {
            let mut progress = WorkDoneProgress::new(request.guid.clone());
            self.send_to_client(progress.create_message());
            if let Some(begin) = progress.begin_message("Type checking") {
                self.send_to_client(begin);
            }
            self.progress.insert(request.guid.clone(), progress);
        }

        for (worker, ordinal) in self.code_workers() {
            let paths = request.paths_for(ordinal);
            if paths.is_empty() {
                continue;
            }
            self.send_typecheck_start(worker, &request.guid, paths.to_vec());
        }

        self.current_request = Some(request);
    }

    fn send_typecheck_start(&self, worker: WorkerId, guid: &str, paths: Vec<PathBuf>) {
        let paths: Vec<String> = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        self.send_to_worker(
            worker,
            Message::notification(
                "$/steep/typecheck_start",
                json!({ "guid": guid, "paths": paths }),
            ),
        );
    }

    /// Progress accounting for one checked path.
    pub fn on_type_check_update(&mut self, guid: &str, path: &std::path::Path) {
        let Some(request) = &mut self.current_request else {
            return;
        };
        if request.guid != guid {
            debug!(%guid, "dropping stale typecheck update");
            return;
        }
        if !request.mark_checked(path) {
            // A worker checked something outside its assignment: the
            // diagnostics were already forwarded, the counters stay.
            return;
        }
        let percentage = request.percentage();
        let finished = request.finished();
        let guid = request.guid.clone();
        let client_id = request.client_request_id.clone();

        if let Some(progress) = self.progress.get_mut(&guid) {
            if let Some(report) = progress.report_message(percentage) {
                self.send_to_client(report);
            }
        }
        if finished {
            if let Some(mut progress) = self.progress.remove(&guid) {
                if let Some(end) = progress.end_message() {
                    self.send_to_client(end);
                }
            }
            if let Some(client_id) = client_id {
                self.send_to_client(Message::response(client_id, json!({ "guid": guid })));
            }
            self.current_request = None;
        }
    }

    // =========================================================================
    // Worker Messages
    // =========================================================================

    fn handle_worker_message(&mut self, worker: WorkerId, message: Message) -> ControlFlow<()> {
        trace!(worker, method = message.method(), "worker message");
        if message.is_response() {
            self.handle_worker_response(message);
            return ControlFlow::Continue(());
        }
        match message.method() {
            "textDocument/publishDiagnostics" => {
                self.send_to_client(message);
            }
            "$/steep/typecheck_update" => {
                let params = message.params();
                let guid = params["guid"].as_str().unwrap_or("").to_string();
                let path = PathBuf::from(params["path"].as_str().unwrap_or(""));
                self.on_type_check_update(&guid, &path);
            }
            "window/showMessage" => {
                let is_error =
                    message.params()["type"].as_i64() == Some(MESSAGE_TYPE_ERROR);
                self.send_to_client(message);
                if is_error {
                    warn!(worker, "worker reported an unrecoverable error");
                    self.fatal_error = true;
                }
            }
            "window/logMessage" => {
                self.send_to_client(message);
            }
            other => {
                debug!(worker, method = other, "ignoring worker message");
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_worker_response(&mut self, message: Message) {
        let Some(id) = message.id.clone() else {
            return;
        };

        if let Some(client_id) = self.interaction_requests.remove(&id) {
            if self.cancelled.remove(&client_id) {
                debug!(%client_id, "dropping response for cancelled request");
                return;
            }
            self.send_to_client(Message {
                id: Some(client_id),
                ..message
            });
            return;
        }

        if let Some(aggregation) = self.symbol_requests.get_mut(&id) {
            if let Some(Value::Array(items)) = &message.result {
                aggregation.results.extend(items.iter().cloned());
            }
            aggregation.remaining -= 1;
            let done = aggregation.remaining == 0;
            if done {
                if let Some(aggregation) = self.symbol_requests.remove(&id) {
                    self.send_to_client(Message::response(
                        aggregation.client_id,
                        Value::Array(aggregation.results),
                    ));
                }
            }
            return;
        }

        if self.shutdown_acks.remove(&id) {
            if self.shutdown_acks.is_empty() {
                if let Some(client_id) = self.shutdown_client_id.take() {
                    self.send_to_client(Message::response(client_id, Value::Null));
                }
            }
            return;
        }

        // Acks for broadcasts the master does not track (initialize).
        trace!(%id, "dropping untracked worker response");
    }

    // =========================================================================
    // Worker Death
    // =========================================================================

    fn handle_worker_eof(&mut self, worker: WorkerId) -> ControlFlow<()> {
        if !self.workers.get(worker).is_some_and(|meta| meta.alive) {
            return ControlFlow::Continue(());
        }
        let ordinal = self.code_ordinal(worker);
        warn!(
            worker = %self.workers[worker].kind.name(),
            "worker died, requeueing its paths"
        );
        self.workers[worker].alive = false;

        if self.workers[worker].kind == WorkerKind::Interaction {
            // Pending hovers never get an answer from a dead worker.
            let pending: Vec<RequestId> = self.interaction_requests.drain().map(|(_, c)| c).collect();
            for client_id in pending {
                if !self.cancelled.remove(&client_id) {
                    self.send_to_client(Message::response(client_id, Value::Null));
                }
            }
            return ControlFlow::Continue(());
        }

        let Some(ordinal) = ordinal else {
            return ControlFlow::Continue(());
        };
        // Later batches must hash over the survivors only, or paths
        // assigned to the dead slot would never be dispatched.
        self.controller.remove_worker(ordinal);

        let survivors = self.code_workers();
        if survivors.is_empty() {
            self.fatal_error = true;
            self.send_to_client(Message::notification(
                "window/showMessage",
                json!({
                    "type": MESSAGE_TYPE_ERROR,
                    "message": "all type check workers exited; shutting down",
                }),
            ));
            return ControlFlow::Break(());
        }

        let (guid, orphaned) = match &mut self.current_request {
            Some(request) => (request.guid.clone(), request.take_assignment(ordinal)),
            None => return ControlFlow::Continue(()),
        };
        if !orphaned.is_empty() {
            // Round-robin the orphaned paths over the survivors.
            let mut chunks: Vec<Vec<PathBuf>> = vec![Vec::new(); survivors.len()];
            for (i, path) in orphaned.into_iter().enumerate() {
                chunks[i % survivors.len()].push(path);
            }
            for ((survivor, survivor_ordinal), chunk) in survivors.into_iter().zip(chunks) {
                if chunk.is_empty() {
                    continue;
                }
                if let Some(request) = &mut self.current_request {
                    if let Some(assignment) = request.assignments.get_mut(survivor_ordinal) {
                        assignment.extend(chunk.iter().cloned());
                    }
                }
                self.send_typecheck_start(survivor, &guid, chunk);
            }
        }
        ControlFlow::Continue(())
    }
}
