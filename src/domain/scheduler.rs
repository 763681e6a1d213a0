//! Per-source scheduler — one actor task per data source.
//!
//! Runs execute inline in the actor loop, so two fan-outs of the same
//! source can never overlap. Triggers arriving while a run is in flight
//! buffer on the channel and are coalesced when the run ends: at most one
//! follow-up all-node run fires (only if a schedule-resetting trigger came
//! in), and buffered single-node triggers are dropped to prevent pile-ups.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::data_source::DataSource;
use super::fan_out::FanOutExecutor;
use super::inventory::{NodeInventory, ParameterStore};
use super::node::{NodeId, PartialNodeUpdate, UpdateCause};

/// Timestamped summary of one completed run, kept per scheduler for the
/// admin status route.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LastRun {
    pub at: chrono::DateTime<Utc>,
    pub updated: usize,
    pub failed: usize,
}

/// An external reason to run a source now.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Policy generation started: refresh all nodes, reset the timer.
    Generation,
    /// Operator asked for a full refresh: all nodes, reset the timer.
    RefreshAll,
    /// A node joined the fleet: refresh that node only, timer untouched.
    NewNode(NodeId),
    /// Operator asked for one node: that node only, timer untouched.
    RefreshNode(NodeId),
}

impl Trigger {
    fn resets_schedule(&self) -> bool {
        matches!(self, Trigger::Generation | Trigger::RefreshAll)
    }

    fn action(&self) -> &'static str {
        match self {
            Trigger::Generation => "policy generation",
            Trigger::RefreshAll => "manual refresh",
            Trigger::NewNode(_) => "new node",
            Trigger::RefreshNode(_) => "node refresh",
        }
    }

    fn actor(&self) -> &'static str {
        match self {
            Trigger::Generation => "policy-generation",
            Trigger::RefreshAll | Trigger::RefreshNode(_) => "operator",
            Trigger::NewNode(_) => "node-acceptance",
        }
    }
}

enum Msg {
    Trigger(Trigger),
    /// Arm (or re-arm) the periodic timer to fire after the delay.
    Arm(Duration),
}

/// Collaborators a scheduler needs to assemble and execute a run.
#[derive(Clone)]
pub struct SchedulerDeps {
    pub inventory: Arc<dyn NodeInventory>,
    pub parameters: Arc<dyn ParameterStore>,
    pub executor: Arc<FanOutExecutor>,
}

/// Handle to one source's scheduler actor.
pub struct SourceScheduler {
    tx: mpsc::UnboundedSender<Msg>,
    cancel: CancellationToken,
    last_run: Arc<RwLock<Option<LastRun>>>,
}

impl SourceScheduler {
    /// Spawn the actor idle: no timer armed, no run started. Arm it with
    /// `arm_after` (boot staggering) or drive it through triggers.
    pub fn spawn(source: DataSource, deps: SchedulerDeps) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let last_run = Arc::new(RwLock::new(None));

        let actor = Actor {
            source,
            deps,
            cancel: cancel.clone(),
            last_run: Arc::clone(&last_run),
        };
        tokio::spawn(actor.run_loop(rx));

        Self {
            tx,
            cancel,
            last_run,
        }
    }

    pub fn trigger(&self, trigger: Trigger) {
        // A closed channel means the actor is gone (cancelled); late
        // triggers for a dead scheduler are dropped by design.
        let _ = self.tx.send(Msg::Trigger(trigger));
    }

    pub fn arm_after(&self, delay: Duration) {
        let _ = self.tx.send(Msg::Arm(delay));
    }

    /// Stop the timer and signal any running fan-out. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn last_run(&self) -> Option<LastRun> {
        self.last_run.read().ok().and_then(|g| g.clone())
    }
}

impl Drop for SourceScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Actor {
    source: DataSource,
    deps: SchedulerDeps,
    cancel: CancellationToken,
    last_run: Arc<RwLock<Option<LastRun>>>,
}

impl Actor {
    async fn run_loop(self, mut rx: mpsc::UnboundedReceiver<Msg>) {
        let periodic = self.source.run_param.schedule.is_scheduled();
        let period = self.source.run_param.schedule.period();
        let mut next_fire: Option<Instant> = None;

        loop {
            let timer = async move {
                match next_fire {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = timer => {
                    self.run_all("scheduled refresh", "scheduler").await;
                    next_fire = periodic.then(|| Instant::now() + period);
                    if self.coalesce_buffered(&mut rx).await {
                        next_fire = periodic.then(|| Instant::now() + period);
                    }
                }
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    match msg {
                        Msg::Arm(delay) => {
                            if periodic {
                                next_fire = Some(Instant::now() + delay);
                            }
                        }
                        Msg::Trigger(trigger) => {
                            self.handle(&trigger).await;
                            if trigger.resets_schedule() && periodic {
                                next_fire = Some(Instant::now() + period);
                            }
                            if self.coalesce_buffered(&mut rx).await {
                                next_fire = periodic.then(|| Instant::now() + period);
                            }
                        }
                    }
                }
            }
        }
    }

    async fn handle(&self, trigger: &Trigger) {
        match trigger {
            Trigger::Generation | Trigger::RefreshAll => {
                self.run_all(trigger.action(), trigger.actor()).await;
            }
            Trigger::NewNode(node_id) | Trigger::RefreshNode(node_id) => {
                self.run_one(node_id, trigger.action(), trigger.actor()).await;
            }
        }
    }

    /// Drain triggers that buffered while a run was in flight. Returns true
    /// if a follow-up all-node run was executed (the timer must re-arm).
    async fn coalesce_buffered(&self, rx: &mut mpsc::UnboundedReceiver<Msg>) -> bool {
        let mut follow_up = false;
        let mut dropped = 0usize;
        while let Ok(msg) = rx.try_recv() {
            match msg {
                Msg::Trigger(t) if t.resets_schedule() => follow_up = true,
                Msg::Trigger(_) => dropped += 1,
                Msg::Arm(_) => {}
            }
        }
        if dropped > 0 {
            warn!(
                source = %self.source.id,
                dropped,
                "dropped single-node triggers that arrived during a run"
            );
        }
        if follow_up {
            self.run_all("coalesced refresh", "scheduler").await;
        }
        follow_up
    }

    async fn run_all(&self, action: &str, actor: &str) {
        let update = match self.full_update().await {
            Ok(u) => u,
            Err(e) => {
                error!(source = %self.source.id, error = %e, "could not assemble node update context");
                return;
            }
        };
        self.execute(update, action, actor).await;
    }

    async fn run_one(&self, node_id: &str, action: &str, actor: &str) {
        let update = match self.single_update(node_id).await {
            Ok(Some(u)) => u,
            Ok(None) => {
                warn!(source = %self.source.id, node = %node_id, "node not found in inventory, skipping");
                return;
            }
            Err(e) => {
                error!(source = %self.source.id, error = %e, "could not assemble node update context");
                return;
            }
        };
        self.execute(update, action, actor).await;
    }

    async fn execute(&self, update: PartialNodeUpdate, action: &str, actor: &str) {
        let started = std::time::Instant::now();
        let cause = UpdateCause::new(&self.source.id, actor, Some(action.to_string()));

        let report = self
            .deps
            .executor
            .run(
                &self.source.id,
                self.source.http(),
                update,
                cause,
                self.source.update_timeout,
                self.cancel.child_token(),
            )
            .await;

        if let Ok(mut guard) = self.last_run.write() {
            *guard = Some(LastRun {
                at: Utc::now(),
                updated: report.updated.len(),
                failed: report.failures.len(),
            });
        }

        info!(
            source = %self.source.id,
            name = %self.source.name,
            action = action,
            updated = report.updated.len(),
            failed = report.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "data source update finished"
        );
        if let Some(message) = report.error_message() {
            error!(source = %self.source.id, action = action, "{message}");
        }
    }

    async fn full_update(&self) -> anyhow::Result<PartialNodeUpdate> {
        let nodes = self.deps.inventory.list_nodes().await?;
        let policy_servers = self.deps.inventory.policy_servers().await?;
        let parameters = self.deps.parameters.list_parameters().await?;
        Ok(PartialNodeUpdate {
            nodes,
            policy_servers,
            parameters,
        })
    }

    async fn single_update(&self, node_id: &str) -> anyhow::Result<Option<PartialNodeUpdate>> {
        let Some(node) = self.deps.inventory.get_node(node_id).await? else {
            return Ok(None);
        };
        let policy_servers = self.deps.inventory.policy_servers().await?;
        let parameters = self.deps.parameters.list_parameters().await?;
        Ok(Some(PartialNodeUpdate {
            nodes: [(node.id.clone(), node)].into_iter().collect(),
            policy_servers,
            parameters,
        }))
    }
}
