//! Error kinds for the update engine.
//!
//! Per-node failures are collected during a fan-out and joined with `"; "`
//! into one aggregated message; callers always receive the set of nodes that
//! did succeed beside it.

use thiserror::Error;

/// Failure of a JSON-path selection.
#[derive(Debug, Clone, Error)]
pub enum JsonSelectError {
    #[error("invalid JSON path '{path}': {reason}")]
    BadPath { path: String, reason: String },
    #[error("response is not valid JSON: {0}")]
    BadJson(String),
    #[error("JSON path evaluation failed: {0}")]
    EvalError(String),
}

/// Failure of one node query. One node failing never aborts the others.
#[derive(Debug, Error)]
pub enum NodeQueryError {
    #[error("interpolation failed: {0}")]
    Interpolation(String),
    #[error("endpoint returned HTTP {code}: {body}")]
    Http { code: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error(transparent)]
    Json(#[from] JsonSelectError),
    #[error("property write failed: {0}")]
    Write(String),
}

/// Errors surfaced by the data-source lifecycle (CRUD path).
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("{0}")]
    Config(String),
    #[error("data source '{0}' does not exist")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl DataSourceError {
    pub fn reserved_id(id: &str) -> Self {
        Self::Config(format!(
            "cannot save data source '{id}': property name '{id}' is reserved by the system"
        ))
    }
}

/// Join per-node failure reasons into the single aggregated message exposed
/// to callers and logs.
pub fn join_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(node, reason)| format!("node '{node}': {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}
