//! JSON-RPC 2.0 messages over LSP framing.
//!
//! Input: `Content-Length: N\r\n\r\n<body>`. Output: same. One `Message`
//! type covers requests, notifications, and responses; the accessors tell
//! them apart. Malformed payloads are reported to the caller, which logs
//! and skips them; framing errors never take the process down.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request id: LSP allows numbers and strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

/// Error code for an unrecognized method.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// A JSON-RPC message: request, notification, or response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Message {
    fn base() -> Message {
        Message {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        }
    }

    pub fn request(id: RequestId, method: &str, params: Value) -> Message {
        Message {
            id: Some(id),
            method: Some(method.to_string()),
            params: Some(params),
            ..Message::base()
        }
    }

    pub fn notification(method: &str, params: Value) -> Message {
        Message {
            method: Some(method.to_string()),
            params: Some(params),
            ..Message::base()
        }
    }

    /// A response; `result` may be `Value::Null`, which serializes as an
    /// explicit `"result": null`.
    pub fn response(id: RequestId, result: Value) -> Message {
        Message {
            id: Some(id),
            result: Some(result),
            ..Message::base()
        }
    }

    pub fn error_response(id: RequestId, code: i64, message: String) -> Message {
        Message {
            id: Some(id),
            error: Some(ResponseError { code, message }),
            ..Message::base()
        }
    }

    pub fn is_request(&self) -> bool {
        self.id.is_some() && self.method.is_some()
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.is_some()
    }

    pub fn is_response(&self) -> bool {
        self.method.is_none() && self.id.is_some()
    }

    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("")
    }

    pub fn params(&self) -> &Value {
        static NULL: Value = Value::Null;
        self.params.as_ref().unwrap_or(&NULL)
    }
}

// =============================================================================
// Framing
// =============================================================================

/// Read one Content-Length framed message. Returns `Ok(None)` at EOF.
pub fn read_message<R: BufRead>(reader: &mut R) -> Result<Option<Message>> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            return Ok(None); // EOF
        }
        let line = line.trim_end();
        if line.is_empty() {
            if content_length.is_some() {
                break; // end of headers
            }
            continue; // stray blank line between messages
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = Some(
                value
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("invalid Content-Length: {}", value.trim()))?,
            );
        }
        // Other headers (Content-Type) are tolerated and ignored.
    }

    let length = content_length.context("missing Content-Length header")?;
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;
    let body = String::from_utf8(body).context("invalid UTF-8 in message body")?;
    let message = serde_json::from_str(&body)
        .with_context(|| format!("malformed message body: {body}"))?;
    Ok(Some(message))
}

/// Write one Content-Length framed message.
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let body = serde_json::to_string(message)?;
    write!(writer, "Content-Length: {}\r\n\r\n{}", body.len(), body)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// URIs
// =============================================================================

/// Scheme of in-editor buffers that have never been saved. They have no
/// path, so they never reach the controller or a worker.
pub const UNTITLED_SCHEME: &str = "untitled:";

pub fn is_untitled(uri: &str) -> bool {
    uri.starts_with(UNTITLED_SCHEME)
}

/// Convert a `file://` URI to a path. Untitled and foreign schemes yield
/// `None`.
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    Some(PathBuf::from(rest))
}

pub fn path_to_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    #[test]
    fn test_frame_round_trip() {
        let message = Message::request(
            RequestId::Number(3),
            "textDocument/hover",
            serde_json::json!({"textDocument": {"uri": "file:///a.sig"}}),
        );
        let mut bytes = Vec::new();
        write_message(&mut bytes, &message).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("Content-Length: "));

        let mut reader = BufReader::new(bytes.as_slice());
        let decoded = read_message(&mut reader).unwrap().unwrap();
        assert_eq!(decoded, message);
        // Stream is exhausted afterwards.
        assert!(read_message(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_null_result_is_serialized() {
        let response = Message::response(RequestId::Number(1), Value::Null);
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"result\":null"));
    }

    #[test]
    fn test_message_kind_accessors() {
        let request = Message::request(RequestId::Number(1), "shutdown", Value::Null);
        let notification = Message::notification("exit", Value::Null);
        let response = Message::response(RequestId::Number(1), Value::Null);
        assert!(request.is_request() && !request.is_notification());
        assert!(notification.is_notification() && !notification.is_response());
        assert!(response.is_response() && !response.is_request());
    }

    #[test]
    fn test_malformed_body_is_an_error_not_a_panic() {
        let raw = b"Content-Length: 9\r\n\r\nnot json!";
        let mut reader = BufReader::new(raw.as_slice());
        assert!(read_message(&mut reader).is_err());
    }

    #[test]
    fn test_uri_helpers() {
        assert!(is_untitled("untitled:Untitled-1"));
        assert!(!is_untitled("file:///a.sig"));
        assert_eq!(
            uri_to_path("file:///work/sig/a.sig"),
            Some(PathBuf::from("/work/sig/a.sig"))
        );
        assert_eq!(uri_to_path("untitled:Untitled-1"), None);
        assert_eq!(path_to_uri(Path::new("/work/a.sig")), "file:///work/a.sig");
    }

    #[test]
    fn test_request_id_accepts_strings_and_numbers() {
        let n: RequestId = serde_json::from_str("7").unwrap();
        let s: RequestId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(n, RequestId::Number(7));
        assert_eq!(s, RequestId::String("abc".to_string()));
    }
}
