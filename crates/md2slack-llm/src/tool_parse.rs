//! Last-resort parser for tool calls written as text, e.g.
//! `create_task(intent="Fix login", estimated_hours: 2)`.

use serde_json::{Map, Number, Value};

use crate::types::ToolCall;

/// Every `name(args)` in `text` whose name is in `known`.
pub fn parse_tool_calls(text: &str, known: &[&str]) -> Vec<ToolCall> {
    let bytes = text.as_bytes();
    let mut calls = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if !is_name_start(bytes[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && is_name_part(bytes[i]) {
            i += 1;
        }
        let name = &text[start..i];
        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != b'(' {
            i = j;
            continue;
        }
        let Some(end) = find_matching_paren(bytes, j) else {
            i = j + 1;
            continue;
        };
        if known.iter().any(|k| k.eq_ignore_ascii_case(name)) {
            let params = normalize_tool_params(name, parse_args(&text[j + 1..end]));
            calls.push(ToolCall::new(name, params));
        }
        i = end + 1;
    }
    calls
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_name_part(b: u8) -> bool {
    is_name_start(b) || b.is_ascii_digit()
}

/// Scans quotes the same way for both the paren matcher and the argument
/// splitter.
#[derive(Default)]
struct Quotes {
    single: bool,
    double: bool,
    escape: bool,
}

impl Quotes {
    /// Feed one byte; returns true when it is outside any quoted string.
    fn feed(&mut self, b: u8) -> bool {
        if self.escape {
            self.escape = false;
            return false;
        }
        let quoted = self.single || self.double;
        match b {
            b'\\' if quoted => {
                self.escape = true;
                false
            }
            b'\'' if !self.double => {
                self.single = !self.single;
                false
            }
            b'"' if !self.single => {
                self.double = !self.double;
                false
            }
            _ => !quoted,
        }
    }
}

fn find_matching_paren(bytes: &[u8], start: usize) -> Option<usize> {
    let mut quotes = Quotes::default();
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if !quotes.feed(b) {
            continue;
        }
        match b {
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_args(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quotes = Quotes::default();
    let mut depth = 0usize;
    let mut last = 0;
    for (i, b) in s.bytes().enumerate() {
        if !quotes.feed(b) {
            continue;
        }
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(&s[last..i]);
                last = i + 1;
            }
            _ => {}
        }
    }
    if last < s.len() {
        parts.push(&s[last..]);
    }
    parts
}

fn parse_args(args: &str) -> Map<String, Value> {
    split_args(args)
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter_map(|part| {
            let (key, val) = part.split_once('=').or_else(|| part.split_once(':'))?;
            Some((key.trim().to_string(), parse_value(val)))
        })
        .collect()
}

fn parse_value(val: &str) -> Value {
    let val = val.trim();
    if val.is_empty() {
        return Value::String(String::new());
    }
    let quoted = val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')));
    if quoted {
        return Value::String(val[1..val.len() - 1].to_string());
    }
    match val.to_ascii_lowercase().as_str() {
        "null" | "nil" | "none" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = val.parse::<i64>() {
        return Value::from(i);
    }
    if let Some(n) = val.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(val.to_string())
}

/// Map the aliases models use for task tool parameters onto the canonical
/// names: `task_intent`, `task_type` and `id`.
pub fn normalize_tool_params(tool: &str, mut params: Map<String, Value>) -> Map<String, Value> {
    let tool = tool.to_ascii_lowercase();
    if !matches!(tool.as_str(), "create_task" | "update_task" | "edit_task") {
        return params;
    }
    for (alias, canonical) in [("task_intent", "intent"), ("task_type", "type"), ("id", "index")] {
        if let Some(v) = params.remove(alias) {
            params.entry(canonical).or_insert(v);
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KNOWN: &[&str] = &["create_task", "update_task", "add_time"];

    #[test]
    fn parses_mixed_argument_styles() {
        let calls = parse_tool_calls(
            r#"I'll do this: create_task(intent="Fix (login) flow, again", estimated_hours: 2, scope='auth', done=true, x=null)"#,
            KNOWN,
        );
        assert_eq!(calls.len(), 1);
        let p = &calls[0].parameters;
        assert_eq!(p["intent"], json!("Fix (login) flow, again"));
        assert_eq!(p["estimated_hours"], json!(2));
        assert_eq!(p["scope"], json!("auth"));
        assert_eq!(p["done"], json!(true));
        assert!(p["x"].is_null());
    }

    #[test]
    fn multiple_calls_and_unknown_names_skipped() {
        let calls = parse_tool_calls(
            "print(1) add_time(index=0, hours=1.5)\nupdate_task (id=2, task_intent=\"New\")",
            KNOWN,
        );
        let names: Vec<_> = calls.iter().map(|c| c.tool.as_str()).collect();
        assert_eq!(names, vec!["add_time", "update_task"]);
        assert_eq!(calls[0].parameters["hours"], json!(1.5));
        assert_eq!(calls[1].parameters["index"], json!(2));
        assert_eq!(calls[1].parameters["intent"], json!("New"));
        assert!(!calls[1].parameters.contains_key("id"));
    }

    #[test]
    fn escaped_quotes_stay_inside_strings() {
        let calls = parse_tool_calls(r#"create_task(intent="say \"hi\", then)")"#, KNOWN);
        assert_eq!(calls[0].parameters["intent"], json!(r#"say \"hi\", then)"#));
    }

    #[test]
    fn unbalanced_call_is_ignored() {
        assert!(parse_tool_calls("create_task(intent=\"x\"", KNOWN).is_empty());
    }

    #[test]
    fn normalisation_keeps_explicit_canonical_keys() {
        let mut params = Map::new();
        params.insert("intent".into(), json!("kept"));
        params.insert("task_intent".into(), json!("dropped"));
        let out = normalize_tool_params("create_task", params);
        assert_eq!(out["intent"], json!("kept"));
        assert_eq!(out.len(), 1);

        let mut params = Map::new();
        params.insert("id".into(), json!(3));
        assert!(normalize_tool_params("add_time", params).contains_key("id"));
    }
}
