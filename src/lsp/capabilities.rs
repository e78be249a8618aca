//! Client capabilities advertised in `initialize`.

use serde_json::{json, Value};

/// Build the `ClientCapabilities` object this daemon advertises to every LSP
/// server it spawns. Scoped to exactly the methods the dispatch table (§4.4
/// of the design) actually issues.
pub fn client_capabilities() -> Value {
    json!({
        "workspace": {
            "applyEdit": true,
            "workspaceEdit": { "documentChanges": true },
            "symbol": { "dynamicRegistration": false },
            "executeCommand": { "dynamicRegistration": false },
            "workspaceFolders": true,
            "configuration": true,
        },
        "textDocument": {
            "synchronization": {
                "didSave": true,
                "willSave": true,
                "dynamicRegistration": false,
            },
            "completion": {
                "dynamicRegistration": false,
                "completionItem": { "snippetSupport": false },
            },
            "hover": { "dynamicRegistration": false },
            "definition": { "dynamicRegistration": false },
            "declaration": { "dynamicRegistration": false },
            "typeDefinition": { "dynamicRegistration": false },
            "implementation": { "dynamicRegistration": false },
            "references": { "dynamicRegistration": false },
            "rename": { "dynamicRegistration": false },
            "codeAction": { "dynamicRegistration": false },
            "documentSymbol": { "dynamicRegistration": false, "hierarchicalDocumentSymbolSupport": true },
            "inlayHint": { "dynamicRegistration": false },
            "foldingRange": { "dynamicRegistration": false },
            "callHierarchy": { "dynamicRegistration": false },
            "publishDiagnostics": { "relatedInformation": true },
        },
        "window": {
            "workDoneProgress": true,
        },
    })
}

/// Build the `initialize` request params for a given workspace root.
pub fn initialize_params(workspace_root: Option<&std::path::Path>, process_id: u32) -> Value {
    let root_uri = workspace_root.map(|p| format!("file://{}", p.display()));
    let workspace_folders = workspace_root.map(|p| {
        json!([{
            "uri": format!("file://{}", p.display()),
            "name": p.file_name().and_then(|n| n.to_str()).unwrap_or("workspace"),
        }])
    });
    json!({
        "processId": process_id,
        "rootUri": root_uri,
        "workspaceFolders": workspace_folders,
        "capabilities": client_capabilities(),
        "clientInfo": {
            "name": "yac",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_params_carries_root_uri_when_present() {
        let params = initialize_params(Some(std::path::Path::new("/p")), 123);
        assert_eq!(params["rootUri"], "file:///p");
        assert_eq!(params["processId"], 123);
    }

    #[test]
    fn initialize_params_nulls_root_when_absent() {
        let params = initialize_params(None, 1);
        assert_eq!(params["rootUri"], Value::Null);
    }
}
