//! Editor method name -> LSP request/notification dispatch table.
//!
//! Each handler either produces data immediately (rare — only for purely
//! local methods, handled upstream of this module), issues an LSP request
//! and returns `PendingLsp` for the event loop to correlate, defers the
//! request until the server finishes initializing, or declines with
//! `Empty`.

use serde_json::{json, Value};

use crate::editor::client::ClientId;
use crate::error::LspError;
use crate::json::{get_i64, get_str};
use crate::lsp::client::{DeferredRequest, LspState, OpenAction, PendingKind, PendingOpen};
use crate::lsp::registry::{LspRegistry, WorkspaceKey};
use crate::lsp::client::path_to_uri;

pub enum DispatchResult {
    /// Emit this value as the response immediately.
    Data(Value),
    /// Emit a null response immediately.
    Empty,
    /// An LSP request was issued under `client_key` with this LSP request id;
    /// bind it to the editor request for when the response arrives.
    PendingLsp { client_key: WorkspaceKey, lsp_id: i64 },
    /// The server isn't ready yet; the request was queued for replay once
    /// `client_key` finishes initializing.
    Initializing { client_key: WorkspaceKey },
}

pub struct DispatchContext<'a> {
    pub registry: &'a mut LspRegistry,
    pub client_id: ClientId,
    pub vim_req_id: i64,
    pub ssh_host: Option<String>,
    /// Workspace keys touched during this dispatch that may need a reader
    /// task spawned (idempotent: `ensure_lsp_reader` no-ops once spawned).
    pub touched_keys: Vec<WorkspaceKey>,
}

fn file_path_of(params: &Value) -> Option<&std::path::Path> {
    get_str(params, "file").map(std::path::Path::new)
}

fn position_params(params: &Value, uri: &str) -> Value {
    json!({
        "textDocument": {"uri": uri},
        "position": {
            "line": get_i64(params, "line").unwrap_or(0),
            "character": get_i64(params, "column").unwrap_or(0),
        }
    })
}

/// Resolve (or spawn) the LSP client for `params.file`, returning its
/// workspace key and document URI. Returns `Ok(None)` when the extension has
/// no configured language (not an error — just nothing to dispatch to).
async fn resolve_client(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<Option<(WorkspaceKey, String)>, LspError> {
    let Some(path) = file_path_of(params) else {
        return Ok(None);
    };
    match ctx.registry.get_or_create(path).await {
        Ok(Some((key, _spawned))) => {
            ctx.touched_keys.push(key.clone());
            Ok(Some((key, path_to_uri(path))))
        }
        Ok(None) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Issue `method` against the client at `key`, either immediately (if
/// Initialized) or by deferring it (if still Initializing).
async fn dispatch_request(
    ctx: &mut DispatchContext<'_>,
    key: WorkspaceKey,
    lsp_method: &str,
    editor_method: &str,
    lsp_params: Value,
    editor_params: Value,
) -> Result<DispatchResult, LspError> {
    let client = ctx
        .registry
        .get_mut(&key)
        .expect("resolve_client only returns keys for clients it just created/found");

    match client.state {
        LspState::Uninitialized => {
            let _ = client.initialize().await?;
            client.deferred_requests.push_back(DeferredRequest {
                client_id: ctx.client_id,
                vim_req_id: ctx.vim_req_id,
                method: editor_method.to_string(),
                params: editor_params,
            });
            Ok(DispatchResult::Initializing { client_key: key })
        }
        LspState::Initializing => {
            client.deferred_requests.push_back(DeferredRequest {
                client_id: ctx.client_id,
                vim_req_id: ctx.vim_req_id,
                method: editor_method.to_string(),
                params: editor_params,
            });
            Ok(DispatchResult::Initializing { client_key: key })
        }
        LspState::Initialized => {
            let lsp_id = client
                .send_request(
                    lsp_method,
                    lsp_params,
                    PendingKind::Editor {
                        client_id: ctx.client_id,
                        vim_req_id: ctx.vim_req_id,
                        editor_method: editor_method.to_string(),
                        ssh_host: ctx.ssh_host.clone(),
                    },
                )
                .await?;
            Ok(DispatchResult::PendingLsp {
                client_key: key,
                lsp_id,
            })
        }
        LspState::ShuttingDown | LspState::Shutdown => Ok(DispatchResult::Empty),
    }
}

pub async fn dispatch(
    ctx: &mut DispatchContext<'_>,
    method: &str,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    match method {
        "file_open" => handle_file_open(ctx, params).await,
        "did_change" => handle_did_change(ctx, params).await,
        "did_save" => handle_did_save(ctx, params).await,
        "did_close" => handle_did_close(ctx, params).await,
        "will_save" => handle_will_save(ctx, params).await,

        "goto_definition" => handle_position_request(ctx, params, "textDocument/definition", "goto_definition").await,
        "goto_declaration" => handle_position_request(ctx, params, "textDocument/declaration", "goto_declaration").await,
        "goto_type_definition" => handle_position_request(ctx, params, "textDocument/typeDefinition", "goto_type_definition").await,
        "goto_implementation" => handle_position_request(ctx, params, "textDocument/implementation", "goto_implementation").await,
        "hover" => handle_position_request(ctx, params, "textDocument/hover", "hover").await,
        "completion" => handle_position_request(ctx, params, "textDocument/completion", "completion").await,

        "references" => handle_references(ctx, params).await,
        "rename" => handle_rename(ctx, params).await,
        "code_action" => handle_code_action(ctx, params).await,
        "document_symbols" => handle_document_symbols(ctx, params).await,
        "inlay_hints" => handle_inlay_hints(ctx, params).await,
        "folding_range" => handle_folding_range(ctx, params).await,
        "call_hierarchy" => handle_call_hierarchy(ctx, params).await,
        "execute_command" => handle_execute_command(ctx, params).await,
        "formatting" => handle_formatting(ctx, params).await,
        "range_formatting" => handle_range_formatting(ctx, params).await,

        "picker_query" => handle_picker_query(ctx, params).await,

        _ => Ok(DispatchResult::Empty),
    }
}

async fn handle_file_open(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let Some((key, uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Data(json!({"action": "none"})));
    };
    let text = get_str(params, "text").unwrap_or("").to_string();
    let language_id = ctx
        .registry
        .detect_language(file_path_of(params).unwrap())
        .map(|e| e.language_id.clone())
        .unwrap_or_default();

    let client = ctx.registry.get_mut(&key).expect("just resolved");
    match client.state {
        LspState::Uninitialized => {
            let _ = client.initialize().await?;
            client.pending_opens.push_back(PendingOpen {
                uri,
                language_id,
                text,
            });
        }
        LspState::Initializing => {
            client.pending_opens.push_back(PendingOpen {
                uri,
                language_id,
                text,
            });
        }
        LspState::Initialized => {
            client.did_open(&uri, &language_id, &text).await?;
        }
        LspState::ShuttingDown | LspState::Shutdown => {}
    }
    Ok(DispatchResult::Data(json!({"action": "none"})))
}

async fn handle_did_change(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let Some((key, uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Empty);
    };
    let text = get_str(params, "text").unwrap_or("").to_string();
    let is_initialized = ctx
        .registry
        .get_mut(&key)
        .expect("just resolved")
        .state
        == LspState::Initialized;
    if !is_initialized {
        return Ok(DispatchResult::Empty);
    }

    let action = ctx
        .registry
        .get_mut(&key)
        .expect("just resolved")
        .classify_open(&uri, &text);

    match action {
        OpenAction::Opened => {
            let language_id = ctx
                .registry
                .detect_language(file_path_of(params).unwrap())
                .map(|e| e.language_id.clone())
                .unwrap_or_default();
            ctx.registry
                .get_mut(&key)
                .expect("just resolved")
                .did_open(&uri, &language_id, &text)
                .await?;
        }
        OpenAction::Changed { version } => {
            ctx.registry
                .get_mut(&key)
                .expect("just resolved")
                .did_change(&uri, version, &text)
                .await?;
        }
        OpenAction::Unchanged => {}
    }
    Ok(DispatchResult::Empty)
}

async fn handle_did_close(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let Some((key, uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Empty);
    };
    let client = ctx.registry.get_mut(&key).expect("just resolved");
    if client.state == LspState::Initialized {
        client.did_close(&uri).await?;
    }
    Ok(DispatchResult::Empty)
}

async fn handle_did_save(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let Some((key, uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Empty);
    };
    let client = ctx.registry.get_mut(&key).expect("just resolved");
    if client.state == LspState::Initialized {
        client.did_save(&uri).await?;
    }
    Ok(DispatchResult::Empty)
}

async fn handle_will_save(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let Some((key, uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Empty);
    };
    let client = ctx.registry.get_mut(&key).expect("just resolved");
    if client.state == LspState::Initialized {
        client.will_save(&uri).await?;
    }
    Ok(DispatchResult::Empty)
}

async fn handle_position_request(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
    lsp_method: &'static str,
    editor_method: &'static str,
) -> Result<DispatchResult, LspError> {
    let Some((key, uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Empty);
    };
    let lsp_params = position_params(params, &uri);
    dispatch_request(ctx, key, lsp_method, editor_method, lsp_params, params.clone()).await
}

async fn handle_references(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let Some((key, uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Empty);
    };
    let mut lsp_params = position_params(params, &uri);
    lsp_params["context"] = json!({"includeDeclaration": true});
    dispatch_request(ctx, key, "textDocument/references", "references", lsp_params, params.clone()).await
}

async fn handle_rename(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let Some((key, uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Empty);
    };
    let mut lsp_params = position_params(params, &uri);
    lsp_params["newName"] = json!(get_str(params, "new_name").unwrap_or(""));
    dispatch_request(ctx, key, "textDocument/rename", "rename", lsp_params, params.clone()).await
}

async fn handle_code_action(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let Some((key, uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Empty);
    };
    let lsp_params = json!({
        "textDocument": {"uri": uri},
        "range": {
            "start": {"line": get_i64(params, "line").unwrap_or(0), "character": get_i64(params, "column").unwrap_or(0)},
            "end": {"line": get_i64(params, "line").unwrap_or(0), "character": get_i64(params, "column").unwrap_or(0)},
        },
        "context": {"diagnostics": []},
    });
    dispatch_request(ctx, key, "textDocument/codeAction", "code_action", lsp_params, params.clone()).await
}

async fn handle_document_symbols(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let Some((key, uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Empty);
    };
    let lsp_params = json!({"textDocument": {"uri": uri}});
    dispatch_request(ctx, key, "textDocument/documentSymbol", "document_symbols", lsp_params, params.clone()).await
}

async fn handle_inlay_hints(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let Some((key, uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Empty);
    };
    let lsp_params = json!({
        "textDocument": {"uri": uri},
        "range": {
            "start": {"line": 0, "character": 0},
            "end": {"line": get_i64(params, "end_line").unwrap_or(i64::MAX), "character": 0},
        },
    });
    dispatch_request(ctx, key, "textDocument/inlayHint", "inlay_hints", lsp_params, params.clone()).await
}

async fn handle_folding_range(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let Some((key, uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Empty);
    };
    let lsp_params = json!({"textDocument": {"uri": uri}});
    dispatch_request(ctx, key, "textDocument/foldingRange", "folding_range", lsp_params, params.clone()).await
}

async fn handle_call_hierarchy(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let Some((key, uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Empty);
    };
    let lsp_params = position_params(params, &uri);
    dispatch_request(ctx, key, "textDocument/prepareCallHierarchy", "call_hierarchy", lsp_params, params.clone()).await
}

async fn handle_execute_command(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let Some((key, _uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Empty);
    };
    let lsp_params = json!({
        "command": get_str(params, "command").unwrap_or(""),
        "arguments": params.get("arguments").cloned().unwrap_or(json!([])),
    });
    dispatch_request(ctx, key, "workspace/executeCommand", "execute_command", lsp_params, params.clone()).await
}

fn formatting_options(params: &Value) -> Value {
    json!({
        "tabSize": get_i64(params, "tab_size").unwrap_or(4),
        "insertSpaces": true,
    })
}

async fn handle_formatting(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let Some((key, uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Empty);
    };
    let lsp_params = json!({
        "textDocument": {"uri": uri},
        "options": formatting_options(params),
    });
    dispatch_request(ctx, key, "textDocument/formatting", "formatting", lsp_params, params.clone()).await
}

async fn handle_range_formatting(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let Some((key, uri)) = resolve_client(ctx, params).await? else {
        return Ok(DispatchResult::Empty);
    };
    let lsp_params = json!({
        "textDocument": {"uri": uri},
        "range": {
            "start": {"line": get_i64(params, "start_line").unwrap_or(0), "character": get_i64(params, "start_column").unwrap_or(0)},
            "end": {"line": get_i64(params, "end_line").unwrap_or(0), "character": get_i64(params, "end_column").unwrap_or(0)},
        },
        "options": formatting_options(params),
    });
    dispatch_request(ctx, key, "textDocument/rangeFormatting", "range_formatting", lsp_params, params.clone()).await
}

/// `picker_query` in `mode="file"` is answered locally before dispatch ever
/// sees it (see `daemon::dispatch_picker`); this handles the two modes that
/// need a live LSP round trip. The response is mapped through
/// `transform::transform_symbol_picker_results` by `daemon::transform_result`,
/// keyed off the `editor_method` recorded here.
async fn handle_picker_query(
    ctx: &mut DispatchContext<'_>,
    params: &Value,
) -> Result<DispatchResult, LspError> {
    let mode = get_str(params, "mode").unwrap_or("file");
    match mode {
        "workspace_symbol" => {
            let Some((key, _uri)) = resolve_client(ctx, params).await? else {
                return Ok(DispatchResult::Data(json!({"items": [], "mode": "workspace_symbol"})));
            };
            let lsp_params = json!({"query": get_str(params, "query").unwrap_or("")});
            dispatch_request(ctx, key, "workspace/symbol", "picker_workspace_symbol", lsp_params, params.clone()).await
        }
        "document_symbol" => {
            let Some((key, uri)) = resolve_client(ctx, params).await? else {
                return Ok(DispatchResult::Data(json!({"items": [], "mode": "document_symbol"})));
            };
            let lsp_params = json!({"textDocument": {"uri": uri}});
            dispatch_request(ctx, key, "textDocument/documentSymbol", "picker_document_symbol", lsp_params, params.clone()).await
        }
        _ => Ok(DispatchResult::Empty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_params_use_zero_based_coordinates_verbatim() {
        let params = json!({"file": "/a.rs", "line": 3, "column": 7});
        let lsp_params = position_params(&params, "file:///a.rs");
        assert_eq!(lsp_params["position"]["line"], 3);
        assert_eq!(lsp_params["position"]["character"], 7);
    }

    #[test]
    fn position_params_default_missing_coordinates_to_zero() {
        let params = json!({"file": "/a.rs"});
        let lsp_params = position_params(&params, "file:///a.rs");
        assert_eq!(lsp_params["position"]["line"], 0);
        assert_eq!(lsp_params["position"]["character"], 0);
    }

    #[test]
    fn file_path_of_extracts_the_file_field() {
        let params = json!({"file": "/a.rs", "line": 1});
        assert_eq!(file_path_of(&params), Some(std::path::Path::new("/a.rs")));
    }

    #[test]
    fn file_path_of_is_none_without_a_file_field() {
        let params = json!({"line": 1});
        assert_eq!(file_path_of(&params), None);
    }
}
