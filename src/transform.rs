//! LSP result shapes -> editor-facing shapes.
//!
//! Chosen by the editor-facing method name, not the LSP method, since a
//! handful of LSP shapes (`Location | Location[] | LocationLink[]`) cover
//! several distinct editor commands identically.

use serde_json::{json, Value};

use crate::json::{get_i64, get_object, get_str};

/// `goto_definition`/`goto_declaration`/`goto_type_definition`/`goto_implementation`:
/// take the first location out of a `Location | Location[] | LocationLink[]`
/// result and reduce it to `{file, line, column}`.
pub fn transform_goto(result: &Value, ssh_host: Option<&str>) -> Value {
    let first = first_location(result);
    match first {
        Some((uri, line, column)) => location_response(uri, line, column, ssh_host),
        None => Value::Null,
    }
}

/// `references`: map every element of a `Location[]` the same way, skipping
/// anything missing `uri`/`range`.
pub fn transform_references(result: &Value, ssh_host: Option<&str>) -> Value {
    let mut locations = Vec::new();
    if let Some(arr) = result.as_array() {
        for item in arr {
            if let Some((uri, line, column)) = location_of(item) {
                locations.push(json!({
                    "file": uri_to_display_path(&uri, ssh_host),
                    "line": line,
                    "column": column,
                }));
            }
        }
    }
    json!({ "locations": locations })
}

/// `TextEdit[]` -> `{edits:[{start_line,start_column,end_line,end_column,new_text}]}`
pub fn transform_formatting(result: &Value) -> Value {
    let mut edits = Vec::new();
    if let Some(arr) = result.as_array() {
        for edit in arr {
            let Some(range) = get_object(edit, "range") else {
                continue;
            };
            let Some(new_text) = get_str(edit, "newText") else {
                continue;
            };
            let Some((start_line, start_column)) = position_of(range.get("start")) else {
                continue;
            };
            let Some((end_line, end_column)) = position_of(range.get("end")) else {
                continue;
            };
            edits.push(json!({
                "start_line": start_line,
                "start_column": start_column,
                "end_line": end_line,
                "end_column": end_column,
                "new_text": new_text,
            }));
        }
    }
    json!({ "edits": edits })
}

/// `InlayHint[]` -> `{hints:[{line,column,label,kind}]}`
pub fn transform_inlay_hints(result: &Value) -> Value {
    let mut hints = Vec::new();
    if let Some(arr) = result.as_array() {
        for hint in arr {
            let Some(position) = hint.get("position") else {
                continue;
            };
            let Some((line, column)) = position_of(Some(position)) else {
                continue;
            };
            let label = inlay_hint_label(hint);
            let kind = match get_i64(hint, "kind") {
                Some(1) => "type",
                Some(2) => "parameter",
                _ => "other",
            };
            let padded = pad_label(&label, hint);
            hints.push(json!({
                "line": line,
                "column": column,
                "label": padded,
                "kind": kind,
            }));
        }
    }
    json!({ "hints": hints })
}

fn pad_label(label: &str, hint: &Value) -> String {
    let mut out = String::new();
    if hint.get("paddingLeft").and_then(Value::as_bool) == Some(true) {
        out.push(' ');
    }
    out.push_str(label);
    if hint.get("paddingRight").and_then(Value::as_bool) == Some(true) {
        out.push(' ');
    }
    out
}

fn inlay_hint_label(hint: &Value) -> String {
    match hint.get("label") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| get_str(p, "value"))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

const SYMBOL_KIND_NAMES: [&str; 26] = [
    "File", "Module", "Namespace", "Package", "Class", "Method", "Property", "Field",
    "Constructor", "Enum", "Interface", "Function", "Variable", "Constant", "String", "Number",
    "Boolean", "Array", "Object", "Key", "Null", "EnumMember", "Struct", "Event", "Operator",
    "TypeParameter",
];

pub fn symbol_kind_name(kind: i64) -> &'static str {
    SYMBOL_KIND_NAMES
        .get((kind - 1).max(0) as usize)
        .copied()
        .unwrap_or("Unknown")
}

/// Render a picker item for either a `SymbolInformation` (has `location`) or
/// a `DocumentSymbol` (has `selectionRange`/`range`, no `location`).
pub fn transform_symbol_picker_item(symbol: &Value, ssh_host: Option<&str>) -> Option<Value> {
    let name = get_str(symbol, "name")?;
    let kind = get_i64(symbol, "kind")?;
    let detail = match get_str(symbol, "containerName") {
        Some(container) if !container.is_empty() => {
            format!("{} ({})", symbol_kind_name(kind), container)
        }
        _ => symbol_kind_name(kind).to_string(),
    };

    if let Some(location) = get_object(symbol, "location") {
        let location_value = Value::Object(location.clone());
        let uri = get_str(&location_value, "uri")?.to_string();
        let range = get_object(&location_value, "range")?;
        let (line, column) = position_of(range.get("start"))?;
        return Some(json!({
            "label": name,
            "detail": detail,
            "file": uri_to_display_path(&uri, ssh_host),
            "line": line,
            "column": column,
        }));
    }

    // DocumentSymbol: prefer selectionRange, fall back to range. Caller is
    // expected to supply the owning document's URI separately since
    // DocumentSymbol carries no URI of its own.
    let range = get_object(symbol, "selectionRange").or_else(|| get_object(symbol, "range"))?;
    let (line, column) = position_of(range.get("start"))?;
    Some(json!({
        "label": name,
        "detail": detail,
        "line": line,
        "column": column,
    }))
}

/// `picker_query{mode:"workspace_symbol"|"document_symbol"}`: map every
/// element of the `SymbolInformation[]`/`DocumentSymbol[]` result through
/// [`transform_symbol_picker_item`], skipping anything that doesn't parse.
pub fn transform_symbol_picker_results(result: &Value, mode: &str, ssh_host: Option<&str>) -> Value {
    let mut items = Vec::new();
    if let Some(arr) = result.as_array() {
        for symbol in arr {
            if let Some(item) = transform_symbol_picker_item(symbol, ssh_host) {
                items.push(item);
            }
        }
    }
    json!({ "items": items, "mode": mode })
}

fn position_of(position: Option<&Value>) -> Option<(i64, i64)> {
    let position = position?;
    Some((
        get_i64(position, "line")?,
        get_i64(position, "character")?,
    ))
}

fn location_of(value: &Value) -> Option<(String, i64, i64)> {
    // Location: {uri, range}. LocationLink: {targetUri, targetSelectionRange}.
    if let Some(uri) = get_str(value, "uri") {
        let range = get_object(value, "range")?;
        let (line, column) = position_of(range.get("start"))?;
        return Some((uri.to_string(), line, column));
    }
    if let Some(uri) = get_str(value, "targetUri") {
        let range = get_object(value, "targetSelectionRange")
            .or_else(|| get_object(value, "targetRange"))?;
        let (line, column) = position_of(range.get("start"))?;
        return Some((uri.to_string(), line, column));
    }
    None
}

fn first_location(result: &Value) -> Option<(String, i64, i64)> {
    match result {
        Value::Array(arr) => arr.first().and_then(location_of),
        Value::Object(_) => location_of(result),
        _ => None,
    }
}

fn location_response(uri: String, line: i64, column: i64, ssh_host: Option<&str>) -> Value {
    json!({
        "file": uri_to_display_path(&uri, ssh_host),
        "line": line,
        "column": column,
    })
}

/// Convert a `file://` URI to a local path, or an `scp://host/path` display
/// form when the originating request carried an SSH host.
pub fn uri_to_display_path(uri: &str, ssh_host: Option<&str>) -> String {
    let path = crate::lsp::client::uri_to_path(uri).unwrap_or_else(|| uri.to_string());
    match ssh_host {
        Some(host) => format!("scp://{host}/{path}"),
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goto_definition_extracts_file_line_column() {
        let result = json!([{
            "uri": "file:///a.zig",
            "range": {"start": {"line": 10, "character": 5}, "end": {"line": 10, "character": 8}}
        }]);
        let out = transform_goto(&result, None);
        assert_eq!(out, json!({"file": "/a.zig", "line": 10, "column": 5}));
    }

    #[test]
    fn goto_definition_wraps_scp_uri_when_ssh_host_present() {
        let result = json!({
            "uri": "file:///a.zig",
            "range": {"start": {"line": 10, "character": 5}, "end": {"line": 10, "character": 8}}
        });
        let out = transform_goto(&result, Some("bob"));
        assert_eq!(out["file"], "scp://bob//a.zig");
    }

    #[test]
    fn references_on_empty_array_yields_empty_locations() {
        let out = transform_references(&json!([]), None);
        assert_eq!(out, json!({"locations": []}));
    }

    #[test]
    fn inlay_hints_derive_kind_and_position() {
        let result = json!([{
            "position": {"line": 4, "character": 10},
            "label": ": i32",
            "kind": 1
        }]);
        let out = transform_inlay_hints(&result);
        assert_eq!(
            out,
            json!({"hints": [{"line": 4, "column": 10, "label": ": i32", "kind": "type"}]})
        );
    }

    #[test]
    fn symbol_information_picker_item_includes_container() {
        let symbol = json!({
            "name": "foo",
            "kind": 12,
            "location": {"uri": "file:///a.rs", "range": {"start": {"line": 1, "character": 0}, "end": {"line": 1, "character": 3}}}
        });
        let item = transform_symbol_picker_item(&symbol, None).unwrap();
        assert_eq!(item["label"], "foo");
        assert_eq!(item["detail"], "Function");
    }

    #[test]
    fn workspace_symbol_results_render_label_and_detail() {
        let result = json!([{
            "name": "foo",
            "kind": 12,
            "location": {"uri": "file:///a.rs", "range": {"start": {"line": 1, "character": 0}, "end": {"line": 1, "character": 3}}}
        }]);
        let out = transform_symbol_picker_results(&result, "workspace_symbol", None);
        assert_eq!(out["mode"], "workspace_symbol");
        assert_eq!(out["items"][0]["label"], "foo");
        assert_eq!(out["items"][0]["detail"], "Function");
    }

    #[test]
    fn document_symbol_results_render_line_and_column() {
        let result = json!([{
            "name": "bar",
            "kind": 6,
            "selectionRange": {"start": {"line": 2, "character": 0}, "end": {"line": 2, "character": 3}}
        }]);
        let out = transform_symbol_picker_results(&result, "document_symbol", None);
        assert_eq!(out["items"][0]["label"], "bar");
        assert_eq!(out["items"][0]["detail"], "Method");
        assert_eq!(out["items"][0]["line"], 2);
        assert_eq!(out["items"][0]["column"], 0);
    }

    #[test]
    fn document_symbol_picker_item_uses_selection_range() {
        let symbol = json!({
            "name": "bar",
            "kind": 6,
            "selectionRange": {"start": {"line": 2, "character": 0}, "end": {"line": 2, "character": 3}},
            "range": {"start": {"line": 0, "character": 0}, "end": {"line": 5, "character": 0}}
        });
        let item = transform_symbol_picker_item(&symbol, None).unwrap();
        assert_eq!(item["label"], "bar");
        assert_eq!(item["detail"], "Method");
        assert_eq!(item["line"], 2);
        assert_eq!(item["column"], 0);
    }
}
