//! Registry of source schedulers, mirrored from the descriptor repository.
//!
//! `save`/`delete` serialize on one mutation lock and touch the in-memory
//! registry only after storage succeeded. Event hooks never take that lock:
//! they read a snapshot of the registry and dispatch to schedulers, which
//! are self-synchronizing.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::data_source::DataSource;
use super::error::DataSourceError;
use super::fan_out::FanOutExecutor;
use super::inventory::{NodeInventory, ParameterStore, PropertyWriter};
use super::repository::DataSourceRepository;
use super::scheduler::{LastRun, SchedulerDeps, SourceScheduler, Trigger};

/// Property names the host system claims for its own node metadata. A data
/// source may not shadow them.
pub const RESERVED_PROPERTY_IDS: &[&str] = &["inventory", "identity", "report", "fleet", "system"];

/// Delay between consecutive periodic sources at boot, so a restart does not
/// hammer every upstream service at once.
const BOOT_STAGGER: Duration = Duration::from_secs(60);

struct Entry {
    source: DataSource,
    /// None while the source is disabled: the id still reserves the
    /// property, but nothing can fire.
    scheduler: Option<SourceScheduler>,
}

/// Status row for the admin API.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceStatus {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub last_run: Option<LastRun>,
}

pub struct UpdateManager {
    repository: Arc<dyn DataSourceRepository>,
    deps: SchedulerDeps,
    entries: RwLock<HashMap<String, Entry>>,
    mutation_lock: Mutex<()>,
}

impl UpdateManager {
    pub fn new(
        repository: Arc<dyn DataSourceRepository>,
        inventory: Arc<dyn NodeInventory>,
        parameters: Arc<dyn ParameterStore>,
        writer: Arc<dyn PropertyWriter>,
    ) -> Self {
        Self {
            repository,
            deps: SchedulerDeps {
                inventory,
                parameters,
                executor: Arc::new(FanOutExecutor::new(writer)),
            },
            entries: RwLock::new(HashMap::new()),
            mutation_lock: Mutex::new(()),
        }
    }

    /// Load every descriptor and build its scheduler, idle. Called once at
    /// boot; `start_all` arms the periodic ones afterwards.
    pub async fn initialize(&self) -> Result<(), DataSourceError> {
        let _guard = self.mutation_lock.lock().await;
        let sources = self.repository.get_all().await?;
        let count = sources.len();

        let mut entries = self.entries.write().expect("registry lock poisoned");
        entries.clear();
        for source in sources {
            entries.insert(source.id.clone(), self.build_entry(source));
        }
        drop(entries);

        info!(sources = count, "update manager initialized");
        Ok(())
    }

    /// Arm periodic sources staggered by ascending period, one minute apart.
    pub fn start_all(&self) {
        let entries = self.entries.read().expect("registry lock poisoned");
        let mut periodic: Vec<&Entry> = entries
            .values()
            .filter(|e| e.source.enabled && e.source.run_param.schedule.is_scheduled())
            .collect();
        periodic.sort_by_key(|e| e.source.run_param.schedule.period());

        for (index, entry) in periodic.iter().enumerate() {
            let delay = BOOT_STAGGER * (index as u32 + 1);
            if let Some(scheduler) = &entry.scheduler {
                debug!(source = %entry.source.id, delay_secs = delay.as_secs(), "arming periodic source");
                scheduler.arm_after(delay);
            }
        }
    }

    // ── CRUD ───────────────────────────────────────────────

    pub async fn get_all_ids(&self) -> Result<Vec<String>, DataSourceError> {
        Ok(self.repository.get_all().await?.into_iter().map(|s| s.id).collect())
    }

    pub async fn get_all(&self) -> Result<Vec<DataSource>, DataSourceError> {
        self.repository.get_all().await
    }

    pub async fn get(&self, id: &str) -> Result<Option<DataSource>, DataSourceError> {
        self.repository.get(id).await
    }

    /// Persist the descriptor, then replace any existing scheduler with one
    /// reflecting it. The old scheduler is cancelled before the new one is
    /// installed; the periodic timer starts one full period out.
    pub async fn save(&self, source: DataSource) -> Result<(), DataSourceError> {
        if source.id.trim().is_empty() {
            return Err(DataSourceError::Config(
                "data source id must not be empty".to_string(),
            ));
        }
        if RESERVED_PROPERTY_IDS.contains(&source.id.as_str()) {
            return Err(DataSourceError::reserved_id(&source.id));
        }

        let _guard = self.mutation_lock.lock().await;
        self.repository.save(source.clone()).await?;

        let entry = self.build_entry(source.clone());
        if source.enabled && source.run_param.schedule.is_scheduled() {
            if let Some(scheduler) = &entry.scheduler {
                scheduler.arm_after(source.run_param.schedule.period());
            }
        }

        let mut entries = self.entries.write().expect("registry lock poisoned");
        if let Some(old) = entries.insert(source.id.clone(), entry) {
            if let Some(scheduler) = old.scheduler {
                scheduler.cancel();
            }
        }
        drop(entries);

        info!(source = %source.id, enabled = source.enabled, "data source saved");
        Ok(())
    }

    /// Remove the descriptor and stop its scheduler. Once this returns, no
    /// further run of the source can start.
    pub async fn delete(&self, id: &str) -> Result<(), DataSourceError> {
        let _guard = self.mutation_lock.lock().await;
        self.repository.delete(id).await?;

        let removed = {
            let mut entries = self.entries.write().expect("registry lock poisoned");
            entries.remove(id)
        };
        if let Some(entry) = removed {
            if let Some(scheduler) = entry.scheduler {
                scheduler.cancel();
            }
        }

        info!(source = %id, "data source deleted");
        Ok(())
    }

    // ── Event hooks ────────────────────────────────────────

    /// A node was accepted into the fleet: refresh it on every source that
    /// opted into new-node updates.
    pub fn on_new_node(&self, node_id: &str) {
        self.dispatch(None, |source| source.run_param.on_new_node, || {
            Trigger::NewNode(node_id.to_string())
        });
    }

    /// A policy generation started: full refresh on opted-in sources.
    pub fn on_generation_started(&self) {
        self.dispatch(None, |source| source.run_param.on_generation, || Trigger::Generation);
    }

    pub fn on_user_ask_update_all_nodes(&self) {
        self.dispatch(None, |_| true, || Trigger::RefreshAll);
    }

    pub fn on_user_ask_update_all_nodes_for(&self, source_id: &str) -> Result<(), DataSourceError> {
        self.ensure_known(source_id)?;
        self.dispatch(Some(source_id), |_| true, || Trigger::RefreshAll);
        Ok(())
    }

    pub fn on_user_ask_update_node(&self, node_id: &str) {
        self.dispatch(None, |_| true, || Trigger::RefreshNode(node_id.to_string()));
    }

    pub fn on_user_ask_update_node_for(
        &self,
        node_id: &str,
        source_id: &str,
    ) -> Result<(), DataSourceError> {
        self.ensure_known(source_id)?;
        self.dispatch(Some(source_id), |_| true, || {
            Trigger::RefreshNode(node_id.to_string())
        });
        Ok(())
    }

    /// Status of every registered source, for the admin API.
    pub fn status(&self) -> Vec<SourceStatus> {
        let entries = self.entries.read().expect("registry lock poisoned");
        let mut rows: Vec<SourceStatus> = entries
            .values()
            .map(|e| SourceStatus {
                id: e.source.id.clone(),
                name: e.source.name.clone(),
                enabled: e.source.enabled,
                last_run: e.scheduler.as_ref().and_then(|s| s.last_run()),
            })
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows
    }

    // ── Internal ───────────────────────────────────────────

    fn build_entry(&self, source: DataSource) -> Entry {
        let scheduler = source
            .enabled
            .then(|| SourceScheduler::spawn(source.clone(), self.deps.clone()));
        Entry { source, scheduler }
    }

    fn ensure_known(&self, source_id: &str) -> Result<(), DataSourceError> {
        let entries = self.entries.read().expect("registry lock poisoned");
        if entries.contains_key(source_id) {
            Ok(())
        } else {
            Err(DataSourceError::NotFound(source_id.to_string()))
        }
    }

    /// Iterate the registry exactly once, filtered by enablement, the
    /// per-source predicate, and the optional id filter.
    fn dispatch<P, T>(&self, only: Option<&str>, opted_in: P, trigger: T)
    where
        P: Fn(&DataSource) -> bool,
        T: Fn() -> Trigger,
    {
        let entries = self.entries.read().expect("registry lock poisoned");
        for entry in entries.values() {
            if let Some(filter) = only {
                if entry.source.id != filter {
                    continue;
                }
            }
            if !entry.source.enabled || !opted_in(&entry.source) {
                continue;
            }
            if let Some(scheduler) = &entry.scheduler {
                scheduler.trigger(trigger());
            }
        }
    }
}
