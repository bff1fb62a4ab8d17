//! Work-done progress reporting.
//!
//! One state machine per batch check GUID. The sequence it can emit is
//! exactly: one `window/workDoneProgress/create`, one `begin`, zero or
//! more `report`s, at most one `end`. Attempts to emit out of order
//! return `None` and the caller skips them.

use serde_json::json;

use crate::protocol::Message;

#[derive(Debug)]
pub struct WorkDoneProgress {
    token: String,
    begun: bool,
    ended: bool,
}

impl WorkDoneProgress {
    pub fn new(token: String) -> Self {
        WorkDoneProgress {
            token,
            begun: false,
            ended: false,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn create_message(&self) -> Message {
        Message::notification(
            "window/workDoneProgress/create",
            json!({ "token": self.token }),
        )
    }

    pub fn begin_message(&mut self, title: &str) -> Option<Message> {
        if self.begun {
            return None;
        }
        self.begun = true;
        Some(Message::notification(
            "$/progress",
            json!({
                "token": self.token,
                "value": { "kind": "begin", "title": title, "percentage": 0 }
            }),
        ))
    }

    pub fn report_message(&mut self, percentage: u32) -> Option<Message> {
        if !self.begun || self.ended {
            return None;
        }
        Some(Message::notification(
            "$/progress",
            json!({
                "token": self.token,
                "value": { "kind": "report", "percentage": percentage }
            }),
        ))
    }

    pub fn end_message(&mut self) -> Option<Message> {
        if !self.begun || self.ended {
            return None;
        }
        self.ended = true;
        Some(Message::notification(
            "$/progress",
            json!({
                "token": self.token,
                "value": { "kind": "end" }
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(message: &Message) -> String {
        message.params()["value"]["kind"]
            .as_str()
            .unwrap_or("")
            .to_string()
    }

    #[test]
    fn test_begin_report_end_sequence() {
        let mut progress = WorkDoneProgress::new("guid-1".to_string());
        let begin = progress.begin_message("checking").unwrap();
        assert_eq!(kind_of(&begin), "begin");
        assert_eq!(begin.params()["value"]["percentage"], 0);

        let report = progress.report_message(50).unwrap();
        assert_eq!(kind_of(&report), "report");
        assert_eq!(report.params()["value"]["percentage"], 50);

        let end = progress.end_message().unwrap();
        assert_eq!(kind_of(&end), "end");
    }

    #[test]
    fn test_at_most_one_begin_and_end() {
        let mut progress = WorkDoneProgress::new("guid-2".to_string());
        assert!(progress.begin_message("checking").is_some());
        assert!(progress.begin_message("checking").is_none());
        assert!(progress.end_message().is_some());
        assert!(progress.end_message().is_none());
        // Nothing after end.
        assert!(progress.report_message(100).is_none());
    }

    #[test]
    fn test_no_report_before_begin() {
        let mut progress = WorkDoneProgress::new("guid-3".to_string());
        assert!(progress.report_message(10).is_none());
    }
}
