//! Recovering JSON from model output.
//!
//! Models wrap answers in code fences, prefix them with prose, wrap lists in
//! an object, or answer a single object where a list was asked for. The
//! helpers here peel those layers off before handing the text to serde.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::LlmError;
use crate::Result;

/// Drop a leading ```` ``` ```` fence line and everything from the last fence on.
pub fn strip_code_fences(input: &str) -> &str {
    let mut s = input;
    if s.starts_with("```") {
        if let Some((_, rest)) = s.split_once('\n') {
            s = rest;
        }
        if let Some(idx) = s.rfind("```") {
            s = &s[..idx];
        }
    }
    s.trim()
}

/// The first balanced `[...]` or `{...}` in `input`, whichever opens
/// earlier. Brackets inside JSON strings are ignored. Returns `input`
/// unchanged when nothing balanced is found.
pub fn extract_json_payload(input: &str) -> &str {
    let first_arr = input.find('[');
    let first_obj = input.find('{');
    let (start, open, close) = match (first_arr, first_obj) {
        (Some(a), Some(o)) if a < o => (a, b'[', b']'),
        (Some(a), None) => (a, b'[', b']'),
        (_, Some(o)) => (o, b'{', b'}'),
        (None, None) => return input,
    };
    match find_matching_end(input.as_bytes(), start, open, close) {
        Some(end) => &input[start..=end],
        None => input,
    }
}

fn find_matching_end(bytes: &[u8], start: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escape {
            escape = false;
            continue;
        }
        match b {
            b'\\' if in_string => escape = true,
            b'"' => in_string = !in_string,
            _ if in_string => {}
            _ if b == open => depth += 1,
            _ if b == close => {
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

/// Fences stripped and payload extracted.
pub fn clean_response(response: &str) -> &str {
    extract_json_payload(strip_code_fences(response.trim())).trim()
}

/// Decode a single value from a model response.
pub fn decode<T: DeserializeOwned>(response: &str) -> Result<T> {
    serde_json::from_str(clean_response(response)).map_err(|e| unmarshal_error(e, response))
}

/// Decode a list from a model response.
///
/// `{}` is an empty list. An object wrapping the list (`{"tasks": [...]}`)
/// yields its first value that decodes, and a lone object becomes a
/// one-element list.
pub fn decode_list<T: DeserializeOwned>(response: &str) -> Result<Vec<T>> {
    let clean = clean_response(response);
    if clean == "{}" || clean == "{ }" {
        return Ok(Vec::new());
    }
    let err = match serde_json::from_str::<Vec<T>>(clean) {
        Ok(list) => return Ok(list),
        Err(e) => e,
    };

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(clean) {
        for value in map.values() {
            if let Ok(list) = serde_json::from_value::<Vec<T>>(value.clone()) {
                return Ok(list);
            }
        }
    }

    if clean.starts_with('{') {
        if let Ok(list) = serde_json::from_str::<Vec<T>>(&format!("[{clean}]")) {
            return Ok(list);
        }
    }

    Err(unmarshal_error(err, response))
}

fn unmarshal_error(e: serde_json::Error, response: &str) -> LlmError {
    LlmError::Unmarshal {
        message: e.to_string(),
        response: response.to_string(),
    }
}
