//! Data-source descriptor storage.
//!
//! The engine only sees this port; the update manager mirrors its scheduler
//! map from whatever the repository returns. The file adapter keeps every
//! descriptor in one JSON document in the wire schema, written atomically.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::data_source::DataSource;
use super::error::DataSourceError;

#[async_trait]
pub trait DataSourceRepository: Send + Sync {
    async fn get_all(&self) -> Result<Vec<DataSource>, DataSourceError>;
    async fn get(&self, id: &str) -> Result<Option<DataSource>, DataSourceError>;
    async fn save(&self, source: DataSource) -> Result<(), DataSourceError>;
    async fn delete(&self, id: &str) -> Result<(), DataSourceError>;
}

// ── File-backed repository ─────────────────────────────────

pub struct FileDataSourceRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileDataSourceRepository {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, DataSource>, DataSourceError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| DataSourceError::Storage(format!("reading {}: {e}", self.path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| DataSourceError::Storage(format!("parsing {}: {e}", self.path.display())))
    }

    async fn persist(&self, sources: &BTreeMap<String, DataSource>) -> Result<(), DataSourceError> {
        let content = serde_json::to_string_pretty(sources)
            .map_err(|e| DataSourceError::Storage(format!("serializing data sources: {e}")))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DataSourceError::Storage(format!("creating {}: {e}", parent.display()))
            })?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &content).await.map_err(|e| {
            DataSourceError::Storage(format!("writing {}: {e}", tmp_path.display()))
        })?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            DataSourceError::Storage(format!(
                "renaming {} to {}: {e}",
                tmp_path.display(),
                self.path.display()
            ))
        })
    }
}

#[async_trait]
impl DataSourceRepository for FileDataSourceRepository {
    async fn get_all(&self) -> Result<Vec<DataSource>, DataSourceError> {
        Ok(self.load().await?.into_values().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<DataSource>, DataSourceError> {
        Ok(self.load().await?.remove(id))
    }

    async fn save(&self, source: DataSource) -> Result<(), DataSourceError> {
        let _guard = self.write_lock.lock().await;
        let mut sources = self.load().await?;
        sources.insert(source.id.clone(), source);
        self.persist(&sources).await
    }

    async fn delete(&self, id: &str) -> Result<(), DataSourceError> {
        let _guard = self.write_lock.lock().await;
        let mut sources = self.load().await?;
        if sources.remove(id).is_none() {
            return Err(DataSourceError::NotFound(id.to_string()));
        }
        self.persist(&sources).await
    }
}

// ── In-memory repository ───────────────────────────────────

/// Repository holding descriptors in memory. Used by tests and by ephemeral
/// daemons that do not persist configuration.
#[derive(Default)]
pub struct MemoryDataSourceRepository {
    sources: Mutex<BTreeMap<String, DataSource>>,
}

impl MemoryDataSourceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataSourceRepository for MemoryDataSourceRepository {
    async fn get_all(&self) -> Result<Vec<DataSource>, DataSourceError> {
        Ok(self.sources.lock().await.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<DataSource>, DataSourceError> {
        Ok(self.sources.lock().await.get(id).cloned())
    }

    async fn save(&self, source: DataSource) -> Result<(), DataSourceError> {
        self.sources.lock().await.insert(source.id.clone(), source);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), DataSourceError> {
        match self.sources.lock().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(DataSourceError::NotFound(id.to_string())),
        }
    }
}
