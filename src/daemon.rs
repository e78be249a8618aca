//! The event loop.
//!
//! Every connected editor socket and every spawned LSP server's stdout gets
//! a small reader task whose only job is I/O: read a chunk, forward it down
//! an mpsc channel, repeat. All protocol state (the framer, the
//! pending-request map, client bookkeeping) lives exclusively in this
//! module's `Daemon`, mutated from one place — the `select!` loop draining
//! that channel. Since the daemon runs on a `current_thread` runtime, every
//! one of these tasks is cooperatively scheduled on the same single OS
//! thread; this is the readiness-multiplexing the design calls for,
//! expressed with tokio's task model instead of a hand-rolled `poll(2)`
//! loop.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::LanguageTable;
use crate::dispatch::{self, DispatchContext, DispatchResult};
use crate::editor::client::ClientId;
use crate::error::LspError;
use crate::editor::protocol::{EditorRequest, OutboundFrame};
use crate::json::{get_i64, get_str};
use crate::lsp::client::{path_to_uri, DeferredRequest, PendingKind};
use crate::lsp::registry::{LspRegistry, WorkspaceKey};
use crate::picker::FileIndex;
use crate::progress::ProgressTracker;
use crate::transform;
use crate::treesitter::Bridge as TreesitterBridge;

enum DaemonEvent {
    EditorConnected(ClientId, tokio::net::unix::OwnedWriteHalf),
    EditorLine(ClientId, String),
    EditorDisconnected(ClientId),
    LspBytes(WorkspaceKey, Vec<u8>),
    LspDisconnected(WorkspaceKey),
    PickerBytes(Vec<u8>),
    Shutdown,
}

pub struct Daemon {
    socket_path: PathBuf,
    writers: HashMap<ClientId, tokio::net::unix::OwnedWriteHalf>,
    ssh_hosts: HashMap<ClientId, Option<String>>,
    registry: LspRegistry,
    progress: ProgressTracker,
    picker: Option<FileIndex>,
    treesitter: TreesitterBridge,
    events_tx: mpsc::UnboundedSender<DaemonEvent>,
    events_rx: mpsc::UnboundedReceiver<DaemonEvent>,
}

impl Daemon {
    pub fn new(socket_path: PathBuf, language_table: LanguageTable) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            socket_path,
            writers: HashMap::new(),
            ssh_hosts: HashMap::new(),
            registry: LspRegistry::new(language_table),
            progress: ProgressTracker::new(),
            picker: None,
            treesitter: TreesitterBridge::new(),
            events_tx,
            events_rx,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o600))?;
        info!(socket = %self.socket_path.display(), "yac daemon listening");

        spawn_accept_loop(listener, self.events_tx.clone());
        spawn_shutdown_watcher(self.events_tx.clone());

        while let Some(event) = self.events_rx.recv().await {
            match event {
                DaemonEvent::Shutdown => {
                    info!("shutdown signal received");
                    break;
                }
                DaemonEvent::EditorConnected(id, writer) => {
                    self.writers.insert(id, writer);
                    self.ssh_hosts.insert(id, None);
                }
                DaemonEvent::EditorDisconnected(id) => {
                    self.writers.remove(&id);
                    self.ssh_hosts.remove(&id);
                    debug!(client = id, "editor disconnected");
                }
                DaemonEvent::EditorLine(id, line) => {
                    self.handle_editor_line(id, &line).await;
                }
                DaemonEvent::LspBytes(key, bytes) => {
                    self.handle_lsp_bytes(&key, &bytes).await;
                }
                DaemonEvent::LspDisconnected(key) => {
                    self.handle_lsp_disconnected(&key).await;
                }
                DaemonEvent::PickerBytes(bytes) => {
                    if let Some(index) = self.picker.as_mut() {
                        index.ingest(&bytes);
                    }
                }
            }
        }

        self.shutdown_all().await;
        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }

    async fn handle_editor_line(&mut self, client_id: ClientId, line: &str) {
        let Some(request) = EditorRequest::parse(line) else {
            warn!(client = client_id, "malformed editor frame, skipping");
            return;
        };

        if let Some(result) = self.dispatch_picker(&request).await {
            self.respond(client_id, request.vim_req_id, result).await;
            return;
        }

        self.update_treesitter_buffer(&request);
        if let Some(result) = self.dispatch_treesitter(&request) {
            self.respond(client_id, request.vim_req_id, result).await;
            return;
        }

        let ssh_host = self.ssh_hosts.get(&client_id).cloned().flatten();

        let mut ctx = DispatchContext {
            registry: &mut self.registry,
            client_id,
            vim_req_id: request.vim_req_id,
            ssh_host,
            touched_keys: Vec::new(),
        };

        let outcome = dispatch::dispatch(&mut ctx, &request.method, &request.params).await;
        let touched_keys = ctx.touched_keys;
        for key in &touched_keys {
            self.ensure_lsp_reader(key);
        }

        match outcome {
            Ok(DispatchResult::Data(value)) => {
                self.respond(client_id, request.vim_req_id, value).await;
            }
            Ok(DispatchResult::Empty) => {
                self.respond(client_id, request.vim_req_id, Value::Null).await;
            }
            Ok(DispatchResult::PendingLsp { .. } | DispatchResult::Initializing { .. }) => {}
            Err(e) => {
                warn!(client = client_id, error = %e, "dispatch failed");
                self.respond(client_id, request.vim_req_id, Value::Null).await;
                self.toast(client_id, &format!("request failed: {e}")).await;
            }
        }
    }

    async fn dispatch_picker(&mut self, request: &EditorRequest) -> Option<Value> {
        match request.method.as_str() {
            "picker_open" => {
                let cwd = get_str(&request.params, "cwd").unwrap_or(".").to_string();
                let recent = get_array_of_strings(&request.params, "recent_files");
                let mut index = FileIndex::new(recent.clone());
                index.spawn_scanner(std::path::Path::new(&cwd));
                if let Some(stdout) = index.scanner_stdout() {
                    spawn_picker_reader(stdout, self.events_tx.clone());
                }
                self.picker = Some(index);
                Some(json!({"items": recent.iter().map(|p| picker_item(p)).collect::<Vec<_>>()}))
            }
            "picker_query" => {
                let query = get_str(&request.params, "query").unwrap_or("");
                let mode = get_str(&request.params, "mode").unwrap_or("file");
                if mode != "file" {
                    return None;
                }
                let items = self.picker.as_ref().map(|p| p.query(query)).unwrap_or_default();
                Some(json!({
                    "items": items.iter().map(|p| picker_item(p)).collect::<Vec<_>>(),
                    "mode": "file",
                }))
            }
            "picker_close" => {
                if let Some(mut index) = self.picker.take() {
                    index.stop();
                }
                Some(Value::Null)
            }
            _ => None,
        }
    }

    /// Keep the tree-sitter bridge's buffer for this file in sync with the
    /// same `file_open`/`did_change`/`did_close` frames that drive the LSP
    /// side. The wire protocol only ever carries the buffer's full text, not
    /// a diff, so every change is a full reparse rather than an incremental
    /// `edit()` (that path is exercised directly by `treesitter`'s own unit
    /// tests, which do have byte-range edits to apply).
    fn update_treesitter_buffer(&mut self, request: &EditorRequest) {
        let Some(file) = get_str(&request.params, "file") else {
            return;
        };
        let path = std::path::Path::new(file);
        match request.method.as_str() {
            "file_open" | "did_change" => {
                let Some(language_id) = self.registry.detect_language(path).map(|e| e.language_id.clone()) else {
                    return;
                };
                let text = get_str(&request.params, "text").unwrap_or("");
                self.treesitter.open(&path_to_uri(path), &language_id, text);
            }
            "did_close" => self.treesitter.close(&path_to_uri(path)),
            _ => {}
        }
    }

    /// Local (non-LSP) tree-sitter queries, answered synchronously from the
    /// already-parsed buffer.
    fn dispatch_treesitter(&mut self, request: &EditorRequest) -> Option<Value> {
        let file = get_str(&request.params, "file")?;
        let uri = path_to_uri(std::path::Path::new(file));
        match request.method.as_str() {
            "ts_symbols" => Some(json!({"items": self.treesitter.ts_symbols(&uri, file)})),
            "ts_folding" => Some(json!({"folds": self.treesitter.ts_folding(&uri)})),
            "ts_navigate" => {
                let direction = get_str(&request.params, "direction").unwrap_or("next");
                let object = get_str(&request.params, "object").unwrap_or("function");
                let line = get_i64(&request.params, "line").unwrap_or(0).max(0) as usize;
                let column = get_i64(&request.params, "column").unwrap_or(0).max(0) as usize;
                Some(
                    self.treesitter
                        .ts_navigate(&uri, direction, object, line, column)
                        .unwrap_or(Value::Null),
                )
            }
            "ts_textobjects" => {
                let object = get_str(&request.params, "object").unwrap_or("function");
                let around = request.params.get("around").and_then(Value::as_bool).unwrap_or(false);
                let line = get_i64(&request.params, "line").unwrap_or(0).max(0) as usize;
                let column = get_i64(&request.params, "column").unwrap_or(0).max(0) as usize;
                Some(
                    self.treesitter
                        .ts_textobjects(&uri, object, around, line, column)
                        .unwrap_or(Value::Null),
                )
            }
            "ts_highlights" => Some(json!({"ranges": self.treesitter.ts_highlights(&uri)})),
            _ => None,
        }
    }

    /// Spawn a reader task for this client's stdout the first time it's
    /// needed (i.e. the first time a request is actually sent to it).
    fn ensure_lsp_reader(&mut self, key: &WorkspaceKey) {
        if let Some(client) = self.registry.get_mut(key) {
            if let Some(stdout) = client.take_stdout() {
                spawn_lsp_reader(key.clone(), stdout, self.events_tx.clone());
            }
        }
    }

    async fn handle_lsp_bytes(&mut self, key: &WorkspaceKey, bytes: &[u8]) {
        let messages = {
            let Some(client) = self.registry.get_mut(key) else {
                return;
            };
            match client.feed(bytes) {
                Ok(messages) => messages,
                Err(e) => {
                    error!(key = %key, error = %e, "framer error, dropping server");
                    self.registry.remove(key);
                    return;
                }
            }
        };
        for message in messages {
            self.handle_lsp_message(key, message).await;
        }
    }

    async fn handle_lsp_message(&mut self, key: &WorkspaceKey, message: Value) {
        if let (Some(id), Some(method)) = (message.get("id"), get_str(&message, "method")) {
            self.handle_server_request(key, id.clone(), method, message.get("params")).await;
        } else if get_str(&message, "method").is_some() {
            self.handle_notification(key, &message).await;
        } else if let Some(id) = get_i64(&message, "id") {
            self.handle_response(key, id, &message).await;
        }
    }

    /// The server's stdout closed (process exit or pipe error). Every editor
    /// request still waiting on a reply from it gets `null` plus a crash
    /// toast instead of hanging forever.
    async fn handle_lsp_disconnected(&mut self, key: &WorkspaceKey) {
        let Some(mut client) = self.registry.remove(key) else {
            return;
        };
        warn!(key = %key, error = %LspError::ServerDied, "language server stream closed");
        let server = client.language_id.clone();
        for pending in client.drain_pending() {
            if let PendingKind::Editor { client_id, vim_req_id, .. } = pending.kind {
                self.respond(client_id, vim_req_id, Value::Null).await;
                self.toast(client_id, &format!("{server} crashed")).await;
            }
        }
    }

    async fn handle_response(&mut self, key: &WorkspaceKey, id: i64, message: &Value) {
        let Some(client) = self.registry.get_mut(key) else {
            return;
        };
        let Some(pending) = client.take_pending(id) else {
            return;
        };

        if pending.method == "initialize" {
            match client.complete_initialization().await {
                Ok(deferred) => {
                    info!(key = %key, "language server initialized");
                    self.replay_deferred(deferred).await;
                }
                Err(e) => error!(key = %key, error = %e, "failed completing initialization"),
            }
            return;
        }
        if pending.method == "shutdown" {
            return;
        }

        let PendingKind::Editor {
            client_id,
            vim_req_id,
            editor_method,
            ssh_host,
        } = pending.kind
        else {
            return;
        };

        if let Some(error) = message.get("error") {
            let reported = LspError::ServerReported {
                code: get_i64(error, "code").unwrap_or(0),
                message: get_str(error, "message").unwrap_or("unknown error").to_string(),
            };
            debug!(client = client_id, key = %key, error = %reported, "lsp request failed");
            let msg = get_str(error, "message").unwrap_or("unknown error");
            self.toast(client_id, &format!("{editor_method} failed: {msg}")).await;
            self.respond(client_id, vim_req_id, Value::Null).await;
            return;
        }

        let result = message.get("result").cloned().unwrap_or(Value::Null);
        let transformed = transform_result(&editor_method, &result, ssh_host.as_deref());
        self.respond(client_id, vim_req_id, transformed).await;
    }

    async fn replay_deferred(&mut self, deferred: Vec<DeferredRequest>) {
        for req in deferred {
            let ssh_host = self.ssh_hosts.get(&req.client_id).cloned().flatten();
            let mut ctx = DispatchContext {
                registry: &mut self.registry,
                client_id: req.client_id,
                vim_req_id: req.vim_req_id,
                ssh_host,
                touched_keys: Vec::new(),
            };
            let outcome = dispatch::dispatch(&mut ctx, &req.method, &req.params).await;
            let touched_keys = ctx.touched_keys;
            for key in &touched_keys {
                self.ensure_lsp_reader(key);
            }
            match outcome {
                Ok(DispatchResult::Data(value)) => {
                    self.respond(req.client_id, req.vim_req_id, value).await;
                }
                Ok(DispatchResult::Empty) => {
                    self.respond(req.client_id, req.vim_req_id, Value::Null).await;
                }
                _ => {}
            }
        }
    }

    async fn handle_notification(&mut self, key: &WorkspaceKey, message: &Value) {
        let method = get_str(message, "method").unwrap_or("");
        let params = message.get("params").cloned().unwrap_or(Value::Null);
        match method {
            "$/progress" => {
                let (Some(token), Some(value)) =
                    (get_str(&params, "token"), params.get("value"))
                else {
                    return;
                };
                if let Some(toast) = self.progress.handle(key, token, value) {
                    self.broadcast_ex(&toast).await;
                }
            }
            "window/showMessage" | "window/logMessage" => {
                if let Some(msg) = get_str(&params, "message") {
                    self.broadcast_ex(&format!("[yac] {msg}")).await;
                }
            }
            "textDocument/publishDiagnostics" => {
                debug!(key = %key, "diagnostics published");
            }
            _ => {}
        }
    }

    async fn handle_server_request(&mut self, key: &WorkspaceKey, id: Value, method: &str, params: Option<&Value>) {
        let result = match method {
            "workspace/applyEdit" => {
                if let Some(edit) = params.and_then(|p| p.get("edit")) {
                    self.broadcast_call("yac#apply_workspace_edit", vec![edit.clone()]).await;
                }
                json!({"applied": true})
            }
            "window/workDoneProgress/create" => Value::Null,
            "client/registerCapability" | "client/unregisterCapability" => Value::Null,
            "workspace/configuration" => json!([Value::Null]),
            _ => Value::Null,
        };

        if let Some(client) = self.registry.get_mut(key) {
            if let Err(e) = client.send_response(id, result).await {
                warn!(key = %key, error = %e, "failed to answer server request");
            }
        }
    }

    async fn shutdown_all(&mut self) {
        for (_, client) in self.registry.iter_mut() {
            client.shutdown().await;
        }
    }

    async fn respond(&mut self, client_id: ClientId, vim_req_id: i64, value: Value) {
        self.write_frame(client_id, &OutboundFrame::response(vim_req_id, value)).await;
    }

    async fn toast(&mut self, client_id: ClientId, message: &str) {
        self.write_frame(client_id, &OutboundFrame::toast(format!("[yac] {message}"))).await;
    }

    async fn broadcast_ex(&mut self, message: &str) {
        let ids: Vec<ClientId> = self.writers.keys().copied().collect();
        let frame = OutboundFrame::toast(message);
        for id in ids {
            self.write_frame(id, &frame).await;
        }
    }

    async fn broadcast_call(&mut self, func: &str, args: Vec<Value>) {
        let ids: Vec<ClientId> = self.writers.keys().copied().collect();
        let frame = OutboundFrame::call(func, args);
        for id in ids {
            self.write_frame(id, &frame).await;
        }
    }

    async fn write_frame(&mut self, client_id: ClientId, frame: &OutboundFrame) {
        if let Some(writer) = self.writers.get_mut(&client_id) {
            if writer.write_all(frame.to_line().as_bytes()).await.is_err() {
                self.writers.remove(&client_id);
            }
        }
    }
}

fn transform_result(editor_method: &str, result: &Value, ssh_host: Option<&str>) -> Value {
    match editor_method {
        "goto_definition" | "goto_declaration" | "goto_type_definition" | "goto_implementation" => {
            transform::transform_goto(result, ssh_host)
        }
        "references" => transform::transform_references(result, ssh_host),
        "inlay_hints" => transform::transform_inlay_hints(result),
        "formatting" | "range_formatting" => transform::transform_formatting(result),
        "picker_workspace_symbol" => transform::transform_symbol_picker_results(result, "workspace_symbol", ssh_host),
        "picker_document_symbol" => transform::transform_symbol_picker_results(result, "document_symbol", ssh_host),
        _ => result.clone(),
    }
}

fn picker_item(path: &str) -> Value {
    json!({"label": path, "detail": "", "file": path, "line": 0, "column": 0})
}

fn get_array_of_strings(params: &Value, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

fn spawn_accept_loop(listener: UnixListener, events_tx: mpsc::UnboundedSender<DaemonEvent>) {
    tokio::spawn(async move {
        let mut next_id: ClientId = 1;
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let id = next_id;
                    next_id += 1;
                    let (read_half, write_half) = stream.into_split();
                    if events_tx.send(DaemonEvent::EditorConnected(id, write_half)).is_err() {
                        break;
                    }
                    spawn_editor_reader(id, read_half, events_tx.clone());
                }
                Err(e) => {
                    warn!("accept failed: {e}");
                }
            }
        }
    });
}

fn spawn_editor_reader(
    id: ClientId,
    mut read_half: tokio::net::unix::OwnedReadHalf,
    events_tx: mpsc::UnboundedSender<DaemonEvent>,
) {
    tokio::spawn(async move {
        let mut carry = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    carry.extend_from_slice(&buf[..n]);
                    while let Some(pos) = carry.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = carry.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&line[..line.len() - 1]).to_string();
                        if !line.trim().is_empty()
                            && events_tx.send(DaemonEvent::EditorLine(id, line)).is_err()
                        {
                            return;
                        }
                    }
                }
            }
        }
        let _ = events_tx.send(DaemonEvent::EditorDisconnected(id));
    });
}

fn spawn_lsp_reader(
    key: WorkspaceKey,
    mut stdout: tokio::process::ChildStdout,
    events_tx: mpsc::UnboundedSender<DaemonEvent>,
) {
    tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        loop {
            match stdout.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if events_tx
                        .send(DaemonEvent::LspBytes(key.clone(), buf[..n].to_vec()))
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
        let _ = events_tx.send(DaemonEvent::LspDisconnected(key));
    });
}

fn spawn_picker_reader(
    mut stdout: tokio::process::ChildStdout,
    events_tx: mpsc::UnboundedSender<DaemonEvent>,
) {
    tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        loop {
            match stdout.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if events_tx.send(DaemonEvent::PickerBytes(buf[..n].to_vec())).is_err() {
                        return;
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_result_passes_through_unrecognized_methods() {
        let result = json!({"foo": "bar"});
        assert_eq!(transform_result("hover", &result, None), result);
    }

    #[test]
    fn transform_result_routes_goto_variants_through_the_goto_transform() {
        let result = json!({"uri": "file:///a.rs", "range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 1}}});
        let transformed = transform_result("goto_definition", &result, None);
        assert_eq!(transformed["file"], "/a.rs");
    }

    #[test]
    fn picker_item_builds_a_zero_position_entry() {
        let item = picker_item("/a.rs");
        assert_eq!(item["label"], "/a.rs");
        assert_eq!(item["file"], "/a.rs");
        assert_eq!(item["line"], 0);
        assert_eq!(item["column"], 0);
    }

    #[test]
    fn get_array_of_strings_filters_non_string_entries() {
        let params = json!({"recent_files": ["/a.rs", 1, "/b.rs", null]});
        assert_eq!(get_array_of_strings(&params, "recent_files"), vec!["/a.rs", "/b.rs"]);
    }

    #[test]
    fn get_array_of_strings_defaults_to_empty_when_missing() {
        let params = json!({});
        assert!(get_array_of_strings(&params, "recent_files").is_empty());
    }
}

fn spawn_shutdown_watcher(events_tx: mpsc::UnboundedSender<DaemonEvent>) {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let Ok(mut term) = signal(SignalKind::terminate()) else {
            return;
        };
        let Ok(mut interrupt) = signal(SignalKind::interrupt()) else {
            return;
        };
        tokio::select! {
            _ = term.recv() => {}
            _ = interrupt.recv() => {}
        }
        let _ = events_tx.send(DaemonEvent::Shutdown);
    });
}
