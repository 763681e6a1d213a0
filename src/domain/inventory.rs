//! Inventory, parameter, and property-write ports plus their file-backed
//! adapters.
//!
//! The engine treats all three as thread-safe black boxes and never caches
//! their answers across fan-outs. The shipped adapters persist plain JSON
//! documents with atomic tmp-then-rename writes.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::node::{NodeId, NodeInfo, NodeProperty, Parameter, UpdateCause};

/// Read-only fleet inventory.
#[async_trait]
pub trait NodeInventory: Send + Sync {
    async fn list_nodes(&self) -> Result<HashMap<NodeId, NodeInfo>>;
    async fn get_node(&self, id: &str) -> Result<Option<NodeInfo>>;
    async fn policy_servers(&self) -> Result<HashMap<NodeId, NodeInfo>>;
}

/// Read-only global parameter store.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn list_parameters(&self) -> Result<Vec<Parameter>>;
}

/// Write side: merge properties into one node's property set. Conflict
/// resolution between competing providers lives here, not in the engine.
#[async_trait]
pub trait PropertyWriter: Send + Sync {
    async fn write_properties(
        &self,
        node_id: &str,
        properties: Vec<NodeProperty>,
        cause: &UpdateCause,
    ) -> Result<()>;
}

// ── File-backed inventory ──────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    nodes: Vec<NodeInfo>,
    #[serde(default)]
    parameters: Vec<Parameter>,
}

/// Inventory read from a single JSON document listing nodes and parameters.
pub struct FileInventory {
    path: PathBuf,
}

impl FileInventory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn load(&self) -> Result<InventoryFile> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", self.path.display()))
    }
}

#[async_trait]
impl NodeInventory for FileInventory {
    async fn list_nodes(&self) -> Result<HashMap<NodeId, NodeInfo>> {
        let file = self.load().await?;
        Ok(file.nodes.into_iter().map(|n| (n.id.clone(), n)).collect())
    }

    async fn get_node(&self, id: &str) -> Result<Option<NodeInfo>> {
        let file = self.load().await?;
        Ok(file.nodes.into_iter().find(|n| n.id == id))
    }

    async fn policy_servers(&self) -> Result<HashMap<NodeId, NodeInfo>> {
        let file = self.load().await?;
        Ok(file
            .nodes
            .into_iter()
            .filter(|n| n.is_policy_server)
            .map(|n| (n.id.clone(), n))
            .collect())
    }
}

#[async_trait]
impl ParameterStore for FileInventory {
    async fn list_parameters(&self) -> Result<Vec<Parameter>> {
        Ok(self.load().await?.parameters)
    }
}

// ── File-backed property store ─────────────────────────────

/// One stored property with its audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProperty {
    pub value: String,
    pub provider: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub cause: UpdateCause,
}

type PropertyFile = HashMap<NodeId, HashMap<String, StoredProperty>>;

/// Property writer persisting per-node property maps in one JSON file.
///
/// A property already held by a different provider is refused: data-source
/// properties belong to this system alone and nothing else may clobber a
/// slot another writer owns.
pub struct FilePropertyStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FilePropertyStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<PropertyFile> {
        if !self.path.exists() {
            return Ok(PropertyFile::new());
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", self.path.display()))
    }

    async fn persist(&self, file: &PropertyFile) -> Result<()> {
        let content = serde_json::to_string_pretty(file).context("serializing property store")?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &content)
            .await
            .with_context(|| format!("writing temp file {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| {
                format!("renaming {} to {}", tmp_path.display(), self.path.display())
            })?;
        Ok(())
    }

    /// Read one node's current properties (admin/status use).
    pub async fn node_properties(&self, node_id: &str) -> Result<HashMap<String, StoredProperty>> {
        Ok(self.load().await?.remove(node_id).unwrap_or_default())
    }
}

#[async_trait]
impl PropertyWriter for FilePropertyStore {
    async fn write_properties(
        &self,
        node_id: &str,
        properties: Vec<NodeProperty>,
        cause: &UpdateCause,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut file = self.load().await?;
        let slot = file.entry(node_id.to_string()).or_default();

        for property in properties {
            if let Some(existing) = slot.get(&property.name) {
                if existing.provider != property.provider {
                    bail!(
                        "property '{}' on node '{}' is owned by provider {:?}",
                        property.name,
                        node_id,
                        existing.provider
                    );
                }
            }
            slot.insert(
                property.name.clone(),
                StoredProperty {
                    value: property.value,
                    provider: property.provider,
                    updated_at: Utc::now(),
                    cause: cause.clone(),
                },
            );
        }

        self.persist(&file).await
    }
}
