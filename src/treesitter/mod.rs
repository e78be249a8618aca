//! The tree-sitter bridge: one parser + tree per open buffer, queried for
//! symbols, folds, navigation targets, text objects, and highlight spans.
//!
//! Grammars for the five baseline languages (`rust`, `python`, `javascript`,
//! `typescript`, `go`) are linked in natively. The expanded design also
//! calls for lazily loading other grammars from `.wasm` files under the
//! configured grammar directory; wiring that up needs a WASM runtime crate
//! (`wasmtime`) that this crate's dependency stack doesn't otherwise pull
//! in, so this build treats any language without a native grammar as
//! unsupported rather than fabricating that dependency — see DESIGN.md.
//! `ts_*` operations on an unsupported language return empty, the same as
//! a missing `.wasm` file would under the full design.

mod queries;

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::warn;
use tree_sitter::{InputEdit, Language, Parser, Point, Query, QueryCursor, Tree};
use tree_sitter_highlight::{HighlightConfiguration, HighlightEvent, Highlighter};

/// Capture names recognized across every baseline language's
/// `highlights.scm`. `HighlightConfiguration::configure` maps each query
/// capture onto an index into this list; `Highlighter::highlight` then
/// reports spans tagged by that index instead of the capture name string.
const HIGHLIGHT_NAMES: [&str; 6] = ["variable", "type", "string", "number", "comment", "keyword"];

fn native_language(language_id: &str) -> Option<Language> {
    Some(match language_id {
        "rust" => tree_sitter_rust::LANGUAGE.into(),
        "python" => tree_sitter_python::LANGUAGE.into(),
        "javascript" | "javascriptreact" => tree_sitter_javascript::LANGUAGE.into(),
        "typescript" => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        "typescriptreact" => tree_sitter_typescript::LANGUAGE_TSX.into(),
        "go" => tree_sitter_go::LANGUAGE.into(),
        _ => return None,
    })
}

/// Compiled queries for one language, cached after the first successful (or
/// failed) compile. A query that fails to compile is `None` and just
/// disables the one operation that needed it.
struct CompiledQueries {
    symbols: Option<Query>,
    folds: Option<Query>,
    objects: Option<Query>,
    highlights: Option<HighlightConfiguration>,
}

impl CompiledQueries {
    fn compile(language: &Language, language_id: &str, source: &queries::LanguageQueries) -> Self {
        let compile = |name: &str, text: &str| match Query::new(language, text) {
            Ok(q) => Some(q),
            Err(e) => {
                warn!(language = language_id, query = name, error = %e, "query compile failed");
                None
            }
        };
        let highlights = match HighlightConfiguration::new(language.clone(), language_id, source.highlights, "", "") {
            Ok(mut config) => {
                config.configure(&HIGHLIGHT_NAMES);
                Some(config)
            }
            Err(e) => {
                warn!(language = language_id, query = "highlights", error = %e, "query compile failed");
                None
            }
        };
        Self {
            symbols: compile("symbols", source.symbols),
            folds: compile("folds", source.folds),
            objects: compile("objects", source.objects),
            highlights,
        }
    }
}

struct Buffer {
    language_id: String,
    parser: Parser,
    tree: Option<Tree>,
    text: String,
}

/// Owns one parsed buffer per open document URI and the per-language query
/// cache shared across all of them.
pub struct Bridge {
    buffers: HashMap<String, Buffer>,
    queries: HashMap<String, Option<CompiledQueries>>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            queries: HashMap::new(),
        }
    }

    fn queries_for(&mut self, language_id: &str) -> Option<&CompiledQueries> {
        if !self.queries.contains_key(language_id) {
            let compiled = native_language(language_id).and_then(|lang| {
                queries::for_language(language_id).map(|src| CompiledQueries::compile(&lang, language_id, &src))
            });
            self.queries.insert(language_id.to_string(), compiled);
        }
        self.queries.get(language_id).and_then(Option::as_ref)
    }

    /// Parse (or fully re-parse) a buffer's text. Called on `did_open` and
    /// whenever an edit can't be expressed incrementally (e.g. the editor
    /// sent a full-text change).
    pub fn open(&mut self, uri: &str, language_id: &str, text: &str) -> bool {
        let Some(language) = native_language(language_id) else {
            return false;
        };
        let mut parser = Parser::new();
        if parser.set_language(&language).is_err() {
            return false;
        }
        let Some(tree) = parser.parse(text, None) else {
            return false;
        };
        self.buffers.insert(
            uri.to_string(),
            Buffer {
                language_id: language_id.to_string(),
                parser,
                tree: Some(tree),
                text: text.to_string(),
            },
        );
        true
    }

    pub fn close(&mut self, uri: &str) {
        self.buffers.remove(uri);
    }

    /// Incrementally reparse after a single-region edit, given byte offsets
    /// into the *old* text and the full *new* text.
    pub fn edit(
        &mut self,
        uri: &str,
        start_byte: usize,
        old_end_byte: usize,
        new_text: &str,
        new_end_byte: usize,
    ) {
        let Some(buffer) = self.buffers.get_mut(uri) else {
            return;
        };
        let start_position = byte_to_point(&buffer.text, start_byte);
        let old_end_position = byte_to_point(&buffer.text, old_end_byte);
        let input_edit = InputEdit {
            start_byte,
            old_end_byte,
            new_end_byte,
            start_position,
            old_end_position,
            new_end_position: byte_to_point(new_text, new_end_byte),
        };
        if let Some(tree) = buffer.tree.as_mut() {
            tree.edit(&input_edit);
        }
        buffer.text = new_text.to_string();
        buffer.tree = buffer.parser.parse(&buffer.text, buffer.tree.as_ref());
    }

    pub fn has_buffer(&self, uri: &str) -> bool {
        self.buffers.contains_key(uri)
    }

    pub fn ts_symbols(&mut self, uri: &str, file: &str) -> Vec<Value> {
        let Some(buffer) = self.buffers.get(uri) else {
            return Vec::new();
        };
        let language_id = buffer.language_id.clone();
        let Some(tree) = buffer.tree.clone() else {
            return Vec::new();
        };
        let text = buffer.text.clone();
        let Some(compiled) = self.queries_for(&language_id) else {
            return Vec::new();
        };
        let Some(query) = compiled.symbols.as_ref() else {
            return Vec::new();
        };

        let mut cursor = QueryCursor::new();
        let matches = cursor.matches(query, tree.root_node(), text.as_bytes());
        let mut out = Vec::new();
        for m in matches {
            for capture in m.captures {
                let name = &query.capture_names()[capture.index as usize];
                let Some(kind) = name.strip_prefix("symbol.") else {
                    continue;
                };
                let node = capture.node;
                let label = node.utf8_text(text.as_bytes()).unwrap_or_default();
                out.push(json!({
                    "label": label,
                    "detail": capitalize(kind),
                    "file": file,
                    "line": node.start_position().row,
                    "column": node.start_position().column,
                }));
            }
        }
        out
    }

    pub fn ts_folding(&mut self, uri: &str) -> Vec<Value> {
        let Some(buffer) = self.buffers.get(uri) else {
            return Vec::new();
        };
        let language_id = buffer.language_id.clone();
        let Some(tree) = buffer.tree.clone() else {
            return Vec::new();
        };
        let text = buffer.text.clone();
        let Some(compiled) = self.queries_for(&language_id) else {
            return Vec::new();
        };
        let Some(query) = compiled.folds.as_ref() else {
            return Vec::new();
        };

        let mut cursor = QueryCursor::new();
        let matches = cursor.matches(query, tree.root_node(), text.as_bytes());
        let mut out = Vec::new();
        for m in matches {
            for capture in m.captures {
                let node = capture.node;
                let start = node.start_position().row;
                let end = node.end_position().row;
                if end > start {
                    out.push(json!({"start_line": start, "end_line": end}));
                }
            }
        }
        out
    }

    pub fn ts_navigate(&mut self, uri: &str, direction: &str, object: &str, line: usize, column: usize) -> Option<Value> {
        let targets = self.object_ranges(uri, object)?;
        let cursor = Point::new(line, column);
        let candidates = targets.into_iter().map(|(outer, _inner)| outer.start_point);
        match direction {
            "next" => candidates.filter(|p| point_gt(*p, cursor)).min_by_key(|p| (p.row, p.column)),
            "prev" => candidates.filter(|p| point_gt(cursor, *p)).max_by_key(|p| (p.row, p.column)),
            _ => None,
        }
        .map(|p| json!({"line": p.row, "column": p.column}))
    }

    pub fn ts_textobjects(&mut self, uri: &str, object: &str, around: bool, line: usize, column: usize) -> Option<Value> {
        let targets = self.object_ranges(uri, object)?;
        let cursor = Point::new(line, column);
        let (outer, inner) = targets
            .into_iter()
            .filter(|(outer, _)| point_le(outer.start_point, cursor) && point_le(cursor, outer.end_point))
            .min_by_key(|(outer, _)| outer.end_point.row - outer.start_point.row)?;
        let range = if around { outer } else { inner.unwrap_or(outer) };
        Some(json!({
            "start_line": range.start_point.row,
            "start_column": range.start_point.column,
            "end_line": range.end_point.row,
            "end_column": range.end_point.column,
        }))
    }

    /// Run the `objects.scm` query for one object kind, returning
    /// `(outer_range, inner_range)` pairs sorted by their start position.
    fn object_ranges(&mut self, uri: &str, object: &str) -> Option<Vec<(tree_sitter::Range, Option<tree_sitter::Range>)>> {
        let buffer = self.buffers.get(uri)?;
        let language_id = buffer.language_id.clone();
        let tree = buffer.tree.clone()?;
        let text = buffer.text.clone();
        let compiled = self.queries_for(&language_id)?;
        let query = compiled.objects.as_ref()?;

        let outer_tag = format!("object.{object}");
        let inner_tag = format!("object.{object}.inner");

        let mut cursor = QueryCursor::new();
        let matches = cursor.matches(query, tree.root_node(), text.as_bytes());
        let mut out = Vec::new();
        for m in matches {
            let mut outer = None;
            let mut inner = None;
            for capture in m.captures {
                let name = &query.capture_names()[capture.index as usize];
                if *name == outer_tag {
                    outer = Some(capture.node.range());
                } else if *name == inner_tag {
                    inner = Some(capture.node.range());
                }
            }
            if let Some(outer) = outer {
                out.push((outer, inner));
            }
        }
        out.sort_by_key(|(outer, _)| (outer.start_point.row, outer.start_point.column));
        Some(out)
    }

    pub fn ts_highlights(&mut self, uri: &str) -> Vec<Value> {
        let Some(buffer) = self.buffers.get(uri) else {
            return Vec::new();
        };
        let language_id = buffer.language_id.clone();
        let text = buffer.text.clone();
        let Some(compiled) = self.queries_for(&language_id) else {
            return Vec::new();
        };
        let Some(config) = compiled.highlights.as_ref() else {
            return Vec::new();
        };

        let mut highlighter = Highlighter::new();
        let Ok(events) = highlighter.highlight(config, text.as_bytes(), None, |_| None) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        for event in events {
            let Ok(event) = event else { break };
            match event {
                HighlightEvent::HighlightStart(h) => stack.push(h.0),
                HighlightEvent::HighlightEnd => {
                    stack.pop();
                }
                HighlightEvent::Source { start, end } => {
                    let Some(&scope_idx) = stack.last() else {
                        continue;
                    };
                    let start_point = byte_to_point(&text, start);
                    let end_point = byte_to_point(&text, end);
                    out.push(json!({
                        "start_line": start_point.row,
                        "start_column": start_point.column,
                        "end_line": end_point.row,
                        "end_column": end_point.column,
                        "scope": HIGHLIGHT_NAMES.get(scope_idx).copied().unwrap_or("unknown"),
                    }));
                }
            }
        }
        out
    }
}

fn point_gt(a: Point, b: Point) -> bool {
    (a.row, a.column) > (b.row, b.column)
}

fn point_le(a: Point, b: Point) -> bool {
    (a.row, a.column) <= (b.row, b.column)
}

fn byte_to_point(text: &str, byte_offset: usize) -> Point {
    let clamped = byte_offset.min(text.len());
    let prefix = &text[..clamped];
    let row = prefix.matches('\n').count();
    let column = match prefix.rfind('\n') {
        Some(idx) => clamped - idx - 1,
        None => clamped,
    };
    Point::new(row, column)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rust_buffer_and_extracts_symbols() {
        let mut bridge = Bridge::new();
        assert!(bridge.open("file:///a.rs", "rust", "fn foo() {}\nstruct Bar { x: i32 }\n"));
        let symbols = bridge.ts_symbols("file:///a.rs", "/a.rs");
        let labels: Vec<&str> = symbols.iter().filter_map(|s| s["label"].as_str()).collect();
        assert!(labels.contains(&"foo"));
        assert!(labels.contains(&"Bar"));
    }

    #[test]
    fn unsupported_language_yields_empty_results_not_an_error() {
        let mut bridge = Bridge::new();
        assert!(!bridge.open("file:///a.zig", "zig", "fn main() void {}"));
        assert!(bridge.ts_symbols("file:///a.zig", "/a.zig").is_empty());
        assert!(bridge.ts_folding("file:///a.zig").is_empty());
    }

    #[test]
    fn incremental_edit_reflects_in_reparsed_symbols() {
        let mut bridge = Bridge::new();
        bridge.open("file:///a.rs", "rust", "fn foo() {}\n");
        let old = "fn foo() {}\n";
        let new = "fn foo() {}\nfn bar() {}\n";
        bridge.edit("file:///a.rs", old.len(), old.len(), new, new.len());
        let symbols = bridge.ts_symbols("file:///a.rs", "/a.rs");
        let labels: Vec<&str> = symbols.iter().filter_map(|s| s["label"].as_str()).collect();
        assert!(labels.contains(&"foo"));
        assert!(labels.contains(&"bar"));
    }

    #[test]
    fn folding_skips_single_line_ranges() {
        let mut bridge = Bridge::new();
        bridge.open("file:///a.rs", "rust", "fn foo() {}\n");
        let folds = bridge.ts_folding("file:///a.rs");
        assert!(folds.is_empty());
    }

    #[test]
    fn highlights_tag_keywords_and_strings() {
        let mut bridge = Bridge::new();
        bridge.open("file:///a.rs", "rust", "let x = \"hi\";\n");
        let spans = bridge.ts_highlights("file:///a.rs");
        let scopes: Vec<&str> = spans.iter().filter_map(|s| s["scope"].as_str()).collect();
        assert!(scopes.contains(&"keyword"));
        assert!(scopes.contains(&"string"));
    }

    #[test]
    fn navigate_next_finds_the_following_function() {
        let mut bridge = Bridge::new();
        bridge.open("file:///a.rs", "rust", "fn foo() {}\nfn bar() {}\n");
        let target = bridge.ts_navigate("file:///a.rs", "next", "function", 0, 0).unwrap();
        assert_eq!(target["line"], 1);
    }

    #[test]
    fn close_drops_the_buffer() {
        let mut bridge = Bridge::new();
        bridge.open("file:///a.rs", "rust", "fn foo() {}\n");
        assert!(bridge.has_buffer("file:///a.rs"));
        bridge.close("file:///a.rs");
        assert!(!bridge.has_buffer("file:///a.rs"));
    }
}
