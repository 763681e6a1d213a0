//! Fleet node model — the read-only view the update engine works against.
//!
//! Inventory is resolved by the caller before a fan-out starts, so the
//! executor never re-queries it mid-run (see `PartialNodeUpdate`).

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Provider recorded on every property this system writes. The node store
/// refuses overwrites of a property held by a different provider.
pub const PROPERTY_PROVIDER: &str = "stoker";

pub type NodeId = String;

/// A managed node as seen by the update engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub hostname: String,
    /// Every node is governed by exactly one policy server (itself included).
    pub policy_server_id: NodeId,
    #[serde(default)]
    pub is_policy_server: bool,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

/// A global parameter available to interpolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: serde_json::Value,
}

/// One property on one node, as produced by a node query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProperty {
    pub name: String,
    pub value: String,
    pub provider: Option<String>,
}

impl NodeProperty {
    pub fn owned_by_us(name: &str, value: String) -> Self {
        Self {
            name: name.to_string(),
            value,
            provider: Some(PROPERTY_PROVIDER.to_string()),
        }
    }
}

/// Audit record attached to every resulting property write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCause {
    pub modification_id: String,
    pub actor: String,
    pub reason: Option<String>,
}

impl UpdateCause {
    /// Build a cause for one triggered action on one source.
    pub fn new(source_id: &str, actor: &str, reason: Option<String>) -> Self {
        Self {
            modification_id: format!("{}-{}", source_id, Utc::now().timestamp_millis()),
            actor: actor.to_string(),
            reason,
        }
    }
}

/// The pre-resolved working set for one fan-out: nodes to visit, the policy
/// servers they reference, and the parameters interpolation may use.
#[derive(Debug, Clone, Default)]
pub struct PartialNodeUpdate {
    pub nodes: HashMap<NodeId, NodeInfo>,
    pub policy_servers: HashMap<NodeId, NodeInfo>,
    pub parameters: Vec<Parameter>,
}

impl PartialNodeUpdate {
    pub fn node_ids(&self) -> HashSet<NodeId> {
        self.nodes.keys().cloned().collect()
    }
}
