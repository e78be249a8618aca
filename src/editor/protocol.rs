//! The editor wire protocol: line-delimited JSON frames over the Unix
//! socket.
//!
//! Inbound frames are `[vim_req_id, {method, params}]`. Outbound frames are
//! one of three tagged shapes — a plain response, an ex-command side effect,
//! or an async call into the editor. (The vim channel protocol also defines
//! an `expr` shape for evaluate-and-respond round trips; nothing this daemon
//! does needs to ask the editor a question, so it's not implemented here.)

use serde::Serialize;
use serde_json::Value;

use crate::json::get_str;

#[derive(Debug, Clone)]
pub struct EditorRequest {
    pub vim_req_id: i64,
    pub method: String,
    pub params: Value,
}

impl EditorRequest {
    /// Parse one line of editor input: `[vim_req_id, {method, params}]`.
    pub fn parse(line: &str) -> Option<Self> {
        let frame: Value = serde_json::from_str(line).ok()?;
        let arr = frame.as_array()?;
        if arr.len() != 2 {
            return None;
        }
        let vim_req_id = arr[0].as_i64()?;
        let body = &arr[1];
        let method = get_str(body, "method")?.to_string();
        let params = body.get("params").cloned().unwrap_or(Value::Null);
        Some(Self {
            vim_req_id,
            method,
            params,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    /// `[vim_req_id, value]`
    Response(i64, Value),
    /// `["ex", "<vimscript>"]`
    Ex(&'static str, String),
    /// `["call", "<funcName>", [args]]`
    Call(&'static str, String, Vec<Value>),
}

impl OutboundFrame {
    pub fn response(vim_req_id: i64, value: Value) -> Self {
        Self::Response(vim_req_id, value)
    }

    pub fn toast(message: impl Into<String>) -> Self {
        let escaped = crate::json::vim_escape(&message.into());
        Self::Ex("ex", format!("echomsg '{escaped}'"))
    }

    pub fn call(func_name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Call("call", func_name.into(), args)
    }

    /// Serialize to a single line (LF-terminated) for writing to the socket.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).expect("OutboundFrame always serializes");
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_request_frame() {
        let req = EditorRequest::parse(r#"[7, {"method":"hover","params":{"file":"/a.rs"}}]"#)
            .unwrap();
        assert_eq!(req.vim_req_id, 7);
        assert_eq!(req.method, "hover");
        assert_eq!(req.params, json!({"file": "/a.rs"}));
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(EditorRequest::parse("not json").is_none());
        assert!(EditorRequest::parse("[1]").is_none());
        assert!(EditorRequest::parse(r#"[1, {"params": {}}]"#).is_none());
    }

    #[test]
    fn response_frame_serializes_as_a_pair() {
        let frame = OutboundFrame::response(7, json!({"file": "/a.rs"}));
        assert_eq!(frame.to_line().trim(), r#"[7,{"file":"/a.rs"}]"#);
    }

    #[test]
    fn toast_escapes_quotes_and_newlines() {
        let frame = OutboundFrame::toast("it's\nbroken");
        assert!(frame.to_line().contains("it''s broken"));
    }
}
