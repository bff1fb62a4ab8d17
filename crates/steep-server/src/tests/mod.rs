//! Unit tests for the coordinator.

mod controller_tests;

use std::sync::mpsc::{Receiver, channel};

use serde_json::{Value, json};

use crate::master::Master;
use crate::protocol::{Message, RequestId};
use crate::worker::{Event, Inbound, SendMessageJob, Source, WorkerKind};

pub(crate) fn master_with(kinds: Vec<WorkerKind>) -> (Master, Receiver<SendMessageJob>) {
    let (tx, rx) = channel();
    (Master::new(kinds, tx), rx)
}

pub(crate) fn from_client(message: Message) -> Inbound {
    Inbound {
        source: Source::Client,
        event: Event::Message(message),
    }
}

pub(crate) fn from_worker(worker: usize, message: Message) -> Inbound {
    Inbound {
        source: Source::Worker(worker),
        event: Event::Message(message),
    }
}

pub(crate) fn drain(rx: &Receiver<SendMessageJob>) -> Vec<SendMessageJob> {
    let mut jobs = Vec::new();
    while let Ok(job) = rx.try_recv() {
        jobs.push(job);
    }
    jobs
}

/// An `initialize` request advertising (or not) workDoneProgress.
pub(crate) fn initialize(work_done_progress: bool) -> Message {
    Message::request(
        RequestId::Number(1000),
        "initialize",
        json!({
            "capabilities": { "window": { "workDoneProgress": work_done_progress } }
        }),
    )
}

pub(crate) fn typecheck_request(id: i64, paths: &[&str]) -> Message {
    Message::request(
        RequestId::Number(id),
        "$/steep/typecheck",
        json!({ "guid": format!("guid-{id}"), "paths": paths }),
    )
}

pub(crate) fn typecheck_update(guid: &str, path: &str) -> Message {
    Message::notification(
        "$/steep/typecheck_update",
        json!({ "guid": guid, "path": path }),
    )
}

pub(crate) fn did_open(uri: &str) -> Message {
    Message::notification(
        "textDocument/didOpen",
        json!({ "textDocument": { "uri": uri, "text": "" } }),
    )
}

pub(crate) fn did_change(uri: &str) -> Message {
    Message::notification(
        "textDocument/didChange",
        json!({
            "textDocument": { "uri": uri },
            "contentChanges": [{ "text": "" }]
        }),
    )
}

/// The `value.kind` of a `$/progress` notification, or the method name.
pub(crate) fn describe(job: &SendMessageJob) -> String {
    let message = &job.message;
    match message.method() {
        "$/progress" => {
            let value = &message.params()["value"];
            let kind = value["kind"].as_str().unwrap_or("?");
            match value["percentage"].as_u64() {
                Some(pct) => format!("progress:{kind}({pct})"),
                None => format!("progress:{kind}"),
            }
        }
        "" => match &message.result {
            Some(Value::Null) => "response:null".to_string(),
            Some(_) => "response".to_string(),
            None => "error-response".to_string(),
        },
        method => method.to_string(),
    }
}
