//! JSON-path selection over an endpoint response.
//!
//! Strings come back unquoted so they can be stored as plain property
//! values; every other JSON value is rendered compact so composites
//! round-trip as JSON. Arrays are flattened one level: a matched array
//! yields its elements in order.

use serde_json::Value;

use super::error::JsonSelectError;

/// Render one JSON value under the property quoting rule.
pub fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Normalize a user-supplied path: empty means the whole document, a bare
/// identifier means a top-level field.
fn normalize(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        "$".to_string()
    } else if trimmed.starts_with('$') {
        trimmed.to_string()
    } else {
        format!("$.{trimmed}")
    }
}

/// Evaluate `path` against the JSON document `body` and return the matched
/// values as strings.
pub fn from_path(path: &str, body: &str) -> Result<Vec<String>, JsonSelectError> {
    let path = normalize(path);

    let compiled = jsonpath_lib::Compiled::compile(&path).map_err(|reason| {
        JsonSelectError::BadPath {
            path: path.clone(),
            reason,
        }
    })?;

    let document: Value =
        serde_json::from_str(body).map_err(|e| JsonSelectError::BadJson(e.to_string()))?;

    let matches = compiled
        .select(&document)
        .map_err(|e| JsonSelectError::EvalError(format!("{e:?}")))?;

    let values = match matches.as_slice() {
        [] => Vec::new(),
        [Value::Array(elements)] => elements.iter().map(render_scalar).collect(),
        many => many.iter().map(|v| render_scalar(v)).collect(),
    };

    Ok(values)
}
