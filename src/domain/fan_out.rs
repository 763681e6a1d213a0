//! Bounded-parallel fan-out of one data source over a set of nodes.
//!
//! Best-effort semantics: every node is attempted, one node's failure never
//! aborts the others, and the caller receives the set of nodes actually
//! written beside one aggregated failure message. The run ends when all
//! node tasks complete, the update deadline elapses, or the scheduler is
//! cancelled — whichever comes first.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::data_source::{HttpSource, RequestMode};
use super::error::join_failures;
use super::http_fetch::HttpFetcher;
use super::inventory::PropertyWriter;
use super::node::{NodeId, PartialNodeUpdate, UpdateCause};
use super::node_query::query_node;

/// Ceiling on in-flight node queries per fan-out. Protects upstream servers
/// and avoids socket exhaustion on constrained hosts.
pub const MAX_PARALLEL_NODE_QUERIES: usize = 50;

/// Outcome of one fan-out: which nodes were written, and why the rest were
/// not. `error_message()` is the `"; "`-joined aggregate surfaced to logs
/// and the admin API.
#[derive(Debug, Default)]
pub struct FanOutReport {
    pub updated: HashSet<NodeId>,
    pub failures: Vec<(NodeId, String)>,
}

impl FanOutReport {
    pub fn error_message(&self) -> Option<String> {
        if self.failures.is_empty() {
            None
        } else {
            Some(join_failures(&self.failures))
        }
    }
}

pub struct FanOutExecutor {
    writer: Arc<dyn PropertyWriter>,
    parallelism: usize,
}

impl FanOutExecutor {
    pub fn new(writer: Arc<dyn PropertyWriter>) -> Self {
        Self::with_parallelism(writer, MAX_PARALLEL_NODE_QUERIES)
    }

    pub fn with_parallelism(writer: Arc<dyn PropertyWriter>, parallelism: usize) -> Self {
        Self {
            writer,
            parallelism: parallelism.max(1),
        }
    }

    /// Visit every node in `update` for `source_id`, writing the extracted
    /// property through the writer. `update_timeout` is the hard deadline on
    /// the whole run.
    pub async fn run(
        &self,
        source_id: &str,
        http: &HttpSource,
        update: PartialNodeUpdate,
        cause: UpdateCause,
        update_timeout: Duration,
        cancel: CancellationToken,
    ) -> FanOutReport {
        let mut report = FanOutReport::default();

        if let RequestMode::AllNodes { .. } = http.request_mode {
            // Parsed and persisted, but the one-call splitting path is not
            // active; see the request-mode notes in DESIGN.md.
            warn!(
                source = %source_id,
                "request mode 'allNodes' is not implemented, falling back to one request per node"
            );
        }

        let fetcher = match HttpFetcher::new(http.check_ssl, http.request_timeout) {
            Ok(f) => Arc::new(f),
            Err(e) => {
                // No client means no node can be attempted at all.
                report.failures = update
                    .nodes
                    .keys()
                    .map(|id| (id.clone(), e.to_string()))
                    .collect();
                return report;
            }
        };

        let source_id: Arc<str> = Arc::from(source_id);
        let http = Arc::new(http.clone());
        let policy_servers = Arc::new(update.policy_servers);
        let parameters = Arc::new(update.parameters);
        let cause = Arc::new(cause);
        let semaphore = Arc::new(Semaphore::new(self.parallelism));

        let mut pending: HashSet<NodeId> = HashSet::new();
        // JoinError carries no node id, so remember which task ran which
        // node to attribute panics.
        let mut task_nodes: HashMap<tokio::task::Id, NodeId> = HashMap::new();
        let mut join_set: JoinSet<(NodeId, Result<bool, String>)> = JoinSet::new();

        for (node_id, node) in update.nodes {
            pending.insert(node_id.clone());
            let tracked_id = node_id.clone();

            let source_id = Arc::clone(&source_id);
            let http = Arc::clone(&http);
            let policy_servers = Arc::clone(&policy_servers);
            let parameters = Arc::clone(&parameters);
            let cause = Arc::clone(&cause);
            let fetcher = Arc::clone(&fetcher);
            let writer = Arc::clone(&self.writer);
            let semaphore = Arc::clone(&semaphore);

            let handle = join_set.spawn(async move {
                // Queue until a slot frees up; the semaphore lives as long
                // as every task, so acquisition cannot fail.
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");

                let Some(policy_server) = policy_servers.get(&node.policy_server_id) else {
                    return (
                        node_id,
                        Err(format!(
                            "policy server '{}' not found in update context",
                            node.policy_server_id
                        )),
                    );
                };

                let queried = query_node(
                    &source_id,
                    &http,
                    &fetcher,
                    &node,
                    policy_server,
                    &parameters,
                )
                .await;

                let result = match queried {
                    Ok(None) => Ok(false),
                    Ok(Some(property)) => writer
                        .write_properties(&node_id, vec![property], &cause)
                        .await
                        .map(|()| true)
                        .map_err(|e| format!("property write failed: {e}")),
                    Err(e) => Err(e.to_string()),
                };
                (node_id, result)
            });
            task_nodes.insert(handle.id(), tracked_id);
        }

        let deadline = tokio::time::sleep(update_timeout);
        tokio::pin!(deadline);
        let mut interrupted: Option<String> = None;

        loop {
            tokio::select! {
                _ = &mut deadline, if interrupted.is_none() => {
                    interrupted = Some(format!(
                        "update timed out after {}s",
                        update_timeout.as_secs()
                    ));
                    join_set.abort_all();
                }
                _ = cancel.cancelled(), if interrupted.is_none() => {
                    interrupted = Some("update cancelled".to_string());
                    join_set.abort_all();
                }
                next = join_set.join_next() => {
                    let Some(joined) = next else { break };
                    match joined {
                        Ok((node_id, Ok(written))) => {
                            pending.remove(&node_id);
                            if written {
                                debug!(source = %source_id, node = %node_id, "node property updated");
                                report.updated.insert(node_id);
                            }
                        }
                        Ok((node_id, Err(reason))) => {
                            pending.remove(&node_id);
                            report.failures.push((node_id, reason));
                        }
                        // An aborted task stays in `pending` and is reported
                        // below with the interruption reason; a panicked one
                        // must be charged to its node here or it would vanish
                        // from the report entirely.
                        Err(e) if e.is_panic() => {
                            if let Some(node_id) = task_nodes.get(&e.id()) {
                                pending.remove(node_id);
                                report.failures.push((
                                    node_id.clone(),
                                    format!("node query task panicked: {e}"),
                                ));
                            }
                        }
                        Err(_) => {}
                    }
                }
            }
        }

        if let Some(reason) = interrupted {
            for node_id in pending {
                report.failures.push((node_id, reason.clone()));
            }
        }

        report
    }
}
