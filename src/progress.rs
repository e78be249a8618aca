//! `$/progress` title tracking, turned into toast text for the editor.

use std::collections::HashMap;

use serde_json::Value;

use crate::json::{get_f64, get_str};

#[derive(Debug, Default)]
pub struct ProgressTracker {
    titles: HashMap<(String, String), String>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one `$/progress` notification; returns the toast text to emit,
    /// if any.
    pub fn handle(&mut self, client_key: &str, token: &str, value: &Value) -> Option<String> {
        let kind = get_str(value, "kind")?;
        let key = (client_key.to_string(), token.to_string());
        match kind {
            "begin" => {
                let title = get_str(value, "title").unwrap_or("").to_string();
                let toast = format_toast(&title, value);
                self.titles.insert(key, title);
                Some(toast)
            }
            "report" => {
                let title = self.titles.get(&key)?.clone();
                Some(format_toast(&title, value))
            }
            "end" => {
                let title = self.titles.remove(&key).unwrap_or_default();
                get_str(value, "message").map(|message| format!("[yac] {title}: {message}"))
            }
            _ => None,
        }
    }
}

fn format_toast(title: &str, value: &Value) -> String {
    let percentage = get_f64(value, "percentage").map(|p| p.clamp(0.0, 100.0) as i64);
    let message = get_str(value, "message");

    let mut toast = format!("[yac] {title}");
    if let Some(pct) = percentage {
        toast.push_str(&format!(" ({pct}%)"));
    }
    if let Some(msg) = message {
        toast.push_str(&format!(": {msg}"));
    }
    toast
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_progress_lifecycle_emits_three_toasts_then_clears() {
        let mut tracker = ProgressTracker::new();
        let begin = tracker
            .handle("rust@/p", "T", &json!({"kind": "begin", "title": "Indexing"}))
            .unwrap();
        assert_eq!(begin, "[yac] Indexing");

        let report = tracker
            .handle("rust@/p", "T", &json!({"kind": "report", "percentage": 42}))
            .unwrap();
        assert_eq!(report, "[yac] Indexing (42%)");

        let end = tracker
            .handle("rust@/p", "T", &json!({"kind": "end", "message": "done"}))
            .unwrap();
        assert_eq!(end, "[yac] Indexing: done");

        assert!(tracker.titles.is_empty());
    }

    #[test]
    fn report_without_begin_is_ignored() {
        let mut tracker = ProgressTracker::new();
        let report = tracker.handle("rust@/p", "T", &json!({"kind": "report", "percentage": 1}));
        assert!(report.is_none());
    }
}
