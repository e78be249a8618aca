//! A single spawned LSP server: process lifetime, framing, and the
//! pending-request map that correlates responses back to their originator.
//!
//! Adapted from a synchronous-handle, oneshot-per-request LSP client: here
//! the daemon's single-threaded event loop owns the readiness wait, so this
//! struct exposes its child's stdout directly for the loop to poll instead
//! of running its own reader task.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use crate::config::LanguageEntry;
use crate::editor::client::ClientId;
use crate::error::LspError;
use crate::framer::{encode_message, MessageFramer};
use crate::lsp::capabilities::initialize_params;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LspState {
    Uninitialized,
    Initializing,
    Initialized,
    ShuttingDown,
    Shutdown,
}

/// What to do with a pending request's response once it arrives.
pub enum PendingKind {
    /// Forward the (transformed) result to this editor client.
    Editor {
        client_id: ClientId,
        vim_req_id: i64,
        editor_method: String,
        ssh_host: Option<String>,
    },
    /// The daemon itself is awaiting this (e.g. `initialize`, `shutdown`);
    /// resolved internally rather than forwarded to an editor.
    Internal,
}

pub struct PendingRequest {
    pub method: String,
    pub kind: PendingKind,
}

/// A buffer open that arrived before the server finished initializing.
pub struct PendingOpen {
    pub uri: String,
    pub language_id: String,
    pub text: String,
}

/// An editor request frozen while the server was still initializing.
pub struct DeferredRequest {
    pub client_id: ClientId,
    pub vim_req_id: i64,
    pub method: String,
    pub params: Value,
}

pub struct LspClient {
    pub language_id: String,
    pub workspace_root: Option<PathBuf>,
    pub state: LspState,
    child: Child,
    stdout_taken: bool,
    next_id: i64,
    pending: HashMap<i64, PendingRequest>,
    framer: MessageFramer,
    /// uri -> (version, hash of last-sent content), to skip redundant didChange.
    opened_files: HashMap<String, (i32, u64)>,
    pub pending_opens: VecDeque<PendingOpen>,
    pub deferred_requests: VecDeque<DeferredRequest>,
}

pub enum OpenAction {
    /// First open of this document in this session: issue `didOpen`.
    Opened,
    /// Document already open with unchanged content: no request needed.
    Unchanged,
    /// Document already open with new content: issue `didChange`.
    Changed { version: i32 },
}

impl LspClient {
    pub async fn spawn(
        entry: &LanguageEntry,
        workspace_root: Option<PathBuf>,
    ) -> Result<Self, LspError> {
        let mut child = Command::new(&entry.command)
            .args(&entry.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LspError::Spawn {
                command: entry.command.clone(),
                source,
            })?;

        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_drain(stderr, entry.command.clone());
        }

        Ok(Self {
            language_id: entry.language_id.clone(),
            workspace_root,
            state: LspState::Uninitialized,
            child,
            stdout_taken: false,
            next_id: 1,
            pending: HashMap::new(),
            framer: MessageFramer::new(),
            opened_files: HashMap::new(),
            pending_opens: VecDeque::new(),
            deferred_requests: VecDeque::new(),
        })
    }

    /// Take the child's stdout once, for the event loop to register with its
    /// readiness wait. Subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        if self.stdout_taken {
            return None;
        }
        self.stdout_taken = true;
        self.child.stdout.take()
    }

    fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        if self.next_id == 0 {
            self.next_id = 1;
        }
        id
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), LspError> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| LspError::Protocol("stdin already closed".into()))?;
        stdin
            .write_all(bytes)
            .await
            .map_err(|e| LspError::Protocol(e.to_string()))
    }

    pub async fn send_request(
        &mut self,
        method: &str,
        params: Value,
        kind: PendingKind,
    ) -> Result<i64, LspError> {
        let id = self.next_id();
        let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        self.write(&encode_message(&message)).await?;
        self.pending.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                kind,
            },
        );
        Ok(id)
    }

    pub async fn send_notification(&mut self, method: &str, params: Value) -> Result<(), LspError> {
        let message = json!({"jsonrpc": "2.0", "method": method, "params": params});
        self.write(&encode_message(&message)).await
    }

    pub async fn send_response(&mut self, id: Value, result: Value) -> Result<(), LspError> {
        let message = json!({"jsonrpc": "2.0", "id": id, "result": result});
        self.write(&encode_message(&message)).await
    }

    pub fn take_pending(&mut self, id: i64) -> Option<PendingRequest> {
        self.pending.remove(&id)
    }

    /// Remove every still-outstanding request, for the caller to answer once
    /// this client is known to be gone (process death, socket error).
    pub fn drain_pending(&mut self) -> Vec<PendingRequest> {
        self.pending.drain().map(|(_, request)| request).collect()
    }

    /// Feed freshly read bytes; returns every complete message parsed out.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Value>, LspError> {
        self.framer.push(bytes);
        let mut messages = Vec::new();
        while let Some(value) = self.framer.try_next()? {
            messages.push(value);
        }
        Ok(messages)
    }

    pub async fn initialize(&mut self) -> Result<i64, LspError> {
        self.state = LspState::Initializing;
        let params = initialize_params(self.workspace_root.as_deref(), std::process::id());
        self.send_request("initialize", params, PendingKind::Internal)
            .await
    }

    /// Called once the `initialize` response has arrived. Sends
    /// `initialized`, then replays queued opens, and returns the deferred
    /// editor requests (in FIFO order) for the caller to re-dispatch — this
    /// client doesn't know how to dispatch, only how to queue and hand back.
    pub async fn complete_initialization(&mut self) -> Result<Vec<DeferredRequest>, LspError> {
        self.state = LspState::Initialized;
        self.send_notification("initialized", json!({})).await?;

        while let Some(open) = self.pending_opens.pop_front() {
            self.did_open(&open.uri, &open.language_id, &open.text).await?;
        }

        Ok(self.deferred_requests.drain(..).collect())
    }

    pub async fn did_open(&mut self, uri: &str, language_id: &str, text: &str) -> Result<(), LspError> {
        let hash = hash_content(text);
        self.opened_files.insert(uri.to_string(), (1, hash));
        let params = json!({
            "textDocument": {
                "uri": uri,
                "languageId": language_id,
                "version": 1,
                "text": text,
            }
        });
        self.send_notification("textDocument/didOpen", params).await
    }

    /// Decide what a buffer open/change should do for this document, and
    /// update the tracked version/hash accordingly.
    pub fn classify_open(&mut self, uri: &str, text: &str) -> OpenAction {
        let hash = hash_content(text);
        match self.opened_files.get(uri).copied() {
            None => {
                self.opened_files.insert(uri.to_string(), (1, hash));
                OpenAction::Opened
            }
            Some((_, last_hash)) if last_hash == hash => OpenAction::Unchanged,
            Some((version, _)) => {
                let next_version = version + 1;
                self.opened_files
                    .insert(uri.to_string(), (next_version, hash));
                OpenAction::Changed {
                    version: next_version,
                }
            }
        }
    }

    pub async fn did_change(&mut self, uri: &str, version: i32, text: &str) -> Result<(), LspError> {
        let params = json!({
            "textDocument": {"uri": uri, "version": version},
            "contentChanges": [{"text": text}],
        });
        self.send_notification("textDocument/didChange", params).await
    }

    pub async fn did_save(&mut self, uri: &str) -> Result<(), LspError> {
        let params = json!({"textDocument": {"uri": uri}});
        self.send_notification("textDocument/didSave", params).await
    }

    pub async fn will_save(&mut self, uri: &str) -> Result<(), LspError> {
        let params = json!({"textDocument": {"uri": uri}, "reason": 1});
        self.send_notification("textDocument/willSave", params).await
    }

    pub async fn did_close(&mut self, uri: &str) -> Result<(), LspError> {
        self.opened_files.remove(uri);
        let params = json!({"textDocument": {"uri": uri}});
        self.send_notification("textDocument/didClose", params).await
    }

    pub async fn shutdown(&mut self) {
        if matches!(self.state, LspState::Shutdown | LspState::ShuttingDown) {
            return;
        }
        self.state = LspState::ShuttingDown;
        let _ = self
            .send_request("shutdown", Value::Null, PendingKind::Internal)
            .await;
        let _ = self.send_notification("exit", Value::Null).await;
        self.state = LspState::Shutdown;

        let waited =
            tokio::time::timeout(std::time::Duration::from_secs(5), self.child.wait()).await;
        if waited.is_err() {
            warn!(language = %self.language_id, "server did not exit in time, killing");
            let _ = self.child.kill().await;
        }

        if !self.pending.is_empty() {
            warn!(
                language = %self.language_id,
                pending = self.pending.len(),
                "dropped pending LSP requests on shutdown"
            );
        }
    }
}

fn hash_content(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

fn spawn_stderr_drain(stderr: tokio::process::ChildStderr, server_name: String) {
    use tokio::io::{AsyncBufReadExt, BufReader};
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(server = %server_name, "{line}");
        }
    });
}

/// `file://<abs>` -> absolute path string, decoding percent-escapes. Remote
/// `scp://host/path` forms are unwrapped by the caller before this is
/// called; this only handles the local form LSP servers speak.
pub fn uri_to_path(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("file://")?;
    Some(percent_decode(rest))
}

pub fn path_to_uri(path: &Path) -> String {
    format!("file://{}", percent_encode(&path.to_string_lossy()))
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        if is_unreserved_path_byte(byte) {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push(hex_upper(byte >> 4));
            out.push(hex_upper(byte & 0xF));
        }
    }
    out
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_unreserved_path_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~' | b'/')
}

fn hex_upper(nibble: u8) -> char {
    match nibble {
        0..=9 => (b'0' + nibble) as char,
        _ => (b'A' + (nibble - 10)) as char,
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_uri_round_trip_with_spaces() {
        let path = Path::new("/home/user/my project/a.rs");
        let uri = path_to_uri(path);
        assert_eq!(uri, "file:///home/user/my%20project/a.rs");
        assert_eq!(uri_to_path(&uri).unwrap(), "/home/user/my project/a.rs");
    }

    #[test]
    fn uri_to_path_rejects_non_file_scheme() {
        assert_eq!(uri_to_path("scp://host/a.rs"), None);
    }

    #[test]
    fn classify_open_hash_is_stable_and_order_independent_of_insertion() {
        let text_v1 = "fn main() {}";
        assert_eq!(hash_content(text_v1), hash_content(text_v1));
        assert_ne!(hash_content(text_v1), hash_content("fn main() {1}"));
    }
}
