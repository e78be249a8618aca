//! Typed accessors over `serde_json::Value`.
//!
//! The daemon's internal dynamic value is `serde_json::Value` itself rather
//! than a bespoke sum type: it already is the `{Null, Bool, Int, Float,
//! String, Array, Object}` shape every wire message (editor frame or LSP
//! payload) deserializes into, and both `lsp-types` and the editor protocol
//! round-trip through it already. These helpers give the stable,
//! None-on-mismatch extraction the rest of the daemon relies on instead of
//! repeating `.get(...).and_then(...)` chains at every call site.

use serde_json::Value;

pub fn get_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

pub fn get_i64(value: &Value, key: &str) -> Option<i64> {
    value.get(key).and_then(Value::as_i64)
}

pub fn get_f64(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

pub fn get_bool(value: &Value, key: &str) -> Option<bool> {
    value.get(key).and_then(Value::as_bool)
}

pub fn get_object<'a>(value: &'a Value, key: &str) -> Option<&'a serde_json::Map<String, Value>> {
    value.get(key).and_then(Value::as_object)
}

pub fn get_array<'a>(value: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    value.get(key).and_then(Value::as_array)
}

/// Truncate and sanitize a string for a vim `echo`/toast command: collapse
/// CR/LF to spaces, double single quotes, and cap the length.
pub fn vim_escape(s: &str) -> String {
    const MAX_LEN: usize = 200;
    let collapsed: String = s
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    let escaped = collapsed.replace('\'', "''");
    if escaped.chars().count() > MAX_LEN {
        let truncated: String = escaped.chars().take(MAX_LEN).collect();
        format!("{truncated}...")
    } else {
        escaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_typed_fields() {
        let v = json!({"a": "x", "b": 3, "c": true, "d": {"e": 1}, "f": [1,2]});
        assert_eq!(get_str(&v, "a"), Some("x"));
        assert_eq!(get_i64(&v, "b"), Some(3));
        assert_eq!(get_bool(&v, "c"), Some(true));
        assert!(get_object(&v, "d").is_some());
        assert_eq!(get_array(&v, "f").unwrap().len(), 2);
        assert_eq!(get_str(&v, "missing"), None);
    }

    #[test]
    fn vim_escape_doubles_quotes_and_strips_newlines() {
        assert_eq!(vim_escape("it's\nbroken"), "it''s broken");
    }

    #[test]
    fn vim_escape_truncates_long_strings() {
        let long = "a".repeat(250);
        let escaped = vim_escape(&long);
        assert!(escaped.ends_with("..."));
        assert_eq!(escaped.chars().count(), 203);
    }
}
