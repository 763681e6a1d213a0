//! Update-manager lifecycle: reserved ids, CRUD mirroring, event routing,
//! delete safety, schedule semantics, trigger coalescing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use httpmock::prelude::*;
use httpmock::Mock;

use stoker::domain::data_source::{
    DataSource, DataSourceType, HttpMethod, HttpSource, MissingNodeBehavior, RequestMode,
    RunParam, Schedule,
};
use stoker::domain::error::DataSourceError;
use stoker::domain::inventory::{FilePropertyStore, NodeInventory, ParameterStore};
use stoker::domain::node::{NodeId, NodeInfo, Parameter};
use stoker::domain::repository::MemoryDataSourceRepository;
use stoker::domain::update_manager::UpdateManager;

struct StaticInventory {
    nodes: Vec<NodeInfo>,
}

impl StaticInventory {
    fn single_node() -> Self {
        let root = NodeInfo {
            id: "root".to_string(),
            hostname: "policy.example.com".to_string(),
            policy_server_id: "root".to_string(),
            is_policy_server: true,
            properties: HashMap::new(),
        };
        let node = NodeInfo {
            id: "n1".to_string(),
            hostname: "n1.example.com".to_string(),
            policy_server_id: "root".to_string(),
            is_policy_server: false,
            properties: HashMap::new(),
        };
        Self {
            nodes: vec![root, node],
        }
    }
}

#[async_trait]
impl NodeInventory for StaticInventory {
    async fn list_nodes(&self) -> Result<HashMap<NodeId, NodeInfo>> {
        Ok(self
            .nodes
            .iter()
            .filter(|n| !n.is_policy_server)
            .map(|n| (n.id.clone(), n.clone()))
            .collect())
    }

    async fn get_node(&self, id: &str) -> Result<Option<NodeInfo>> {
        Ok(self.nodes.iter().find(|n| n.id == id).cloned())
    }

    async fn policy_servers(&self) -> Result<HashMap<NodeId, NodeInfo>> {
        Ok(self
            .nodes
            .iter()
            .filter(|n| n.is_policy_server)
            .map(|n| (n.id.clone(), n.clone()))
            .collect())
    }
}

#[async_trait]
impl ParameterStore for StaticInventory {
    async fn list_parameters(&self) -> Result<Vec<Parameter>> {
        Ok(Vec::new())
    }
}

fn manager(dir: &tempfile::TempDir) -> UpdateManager {
    let inventory = Arc::new(StaticInventory::single_node());
    UpdateManager::new(
        Arc::new(MemoryDataSourceRepository::new()),
        inventory.clone(),
        inventory,
        Arc::new(FilePropertyStore::new(dir.path().join("properties.json"))),
    )
}

fn source(id: &str, url: String, schedule: Schedule) -> DataSource {
    DataSource {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        enabled: true,
        update_timeout: Duration::from_secs(10),
        run_param: RunParam {
            on_generation: false,
            on_new_node: false,
            schedule,
        },
        source_type: DataSourceType::Http(HttpSource {
            url,
            path: "$.ip".to_string(),
            method: HttpMethod::Get,
            check_ssl: true,
            headers: Vec::new(),
            params: Vec::new(),
            request_timeout: Duration::from_secs(5),
            request_mode: RequestMode::ByNode,
            missing_node_behavior: MissingNodeBehavior::NoChange,
        }),
    }
}

fn triggered_only(id: &str, url: String) -> DataSource {
    source(id, url, Schedule::NoSchedule(Duration::from_secs(300)))
}

/// Poll until the mock saw `expected` hits or the timeout elapses.
async fn wait_for_hits(mock: &Mock<'_>, expected: usize) {
    for _ in 0..100 {
        if mock.hits() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("mock never reached {expected} hits (got {})", mock.hits());
}

#[tokio::test]
async fn reserved_id_is_rejected_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    mgr.initialize().await.unwrap();

    let err = mgr
        .save(triggered_only("inventory", "http://example.invalid".to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err, DataSourceError::Config(_)));
    assert!(err.to_string().contains("reserved"));
    assert!(mgr.get_all_ids().await.unwrap().is_empty());
    assert!(mgr.status().is_empty());
}

#[tokio::test]
async fn crud_round_trip_mirrors_registry() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    mgr.initialize().await.unwrap();

    mgr.save(triggered_only("dc", "http://example.invalid".to_string()))
        .await
        .unwrap();

    assert_eq!(mgr.get_all_ids().await.unwrap(), vec!["dc".to_string()]);
    assert!(mgr.get("dc").await.unwrap().is_some());
    assert_eq!(mgr.status().len(), 1);

    mgr.delete("dc").await.unwrap();
    assert!(mgr.get("dc").await.unwrap().is_none());
    assert!(mgr.status().is_empty());

    let err = mgr.delete("dc").await.unwrap_err();
    assert!(matches!(err, DataSourceError::NotFound(_)));
}

#[tokio::test]
async fn operator_refresh_reaches_the_endpoint() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/nodes/n1");
        then.status(200).body(r#"{"ip":"1.2.3.4"}"#);
    });

    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    mgr.initialize().await.unwrap();
    mgr.save(triggered_only(
        "dc",
        format!("{}/nodes/${{node.id}}", server.base_url()),
    ))
    .await
    .unwrap();

    mgr.on_user_ask_update_all_nodes_for("dc").unwrap();
    wait_for_hits(&mock, 1).await;
}

#[tokio::test]
async fn no_run_can_start_after_delete() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET);
        then.status(200).body(r#"{"ip":"1.2.3.4"}"#);
    });

    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    mgr.initialize().await.unwrap();
    mgr.save(triggered_only("dc", server.base_url())).await.unwrap();

    mgr.on_user_ask_update_all_nodes();
    wait_for_hits(&mock, 1).await;

    mgr.delete("dc").await.unwrap();
    let hits_at_delete = mock.hits();

    mgr.on_user_ask_update_all_nodes();
    mgr.on_generation_started();
    mgr.on_new_node("n1");
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(mock.hits(), hits_at_delete);
    assert!(matches!(
        mgr.on_user_ask_update_all_nodes_for("dc").unwrap_err(),
        DataSourceError::NotFound(_)
    ));
}

#[tokio::test]
async fn events_only_reach_opted_in_sources() {
    let server = MockServer::start();
    let opted = server.mock(|when, then| {
        when.method(GET).path("/opted");
        then.status(200).body(r#"{"ip":"1.2.3.4"}"#);
    });
    let not_opted = server.mock(|when, then| {
        when.method(GET).path("/other");
        then.status(200).body(r#"{"ip":"1.2.3.4"}"#);
    });

    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    mgr.initialize().await.unwrap();

    let mut a = triggered_only("a", format!("{}/opted", server.base_url()));
    a.run_param.on_new_node = true;
    mgr.save(a).await.unwrap();
    mgr.save(triggered_only("b", format!("{}/other", server.base_url())))
        .await
        .unwrap();

    mgr.on_new_node("n1");
    wait_for_hits(&opted, 1).await;
    assert_eq!(not_opted.hits(), 0);
}

#[tokio::test]
async fn disabled_source_reserves_its_id_but_never_fires() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET);
        then.status(200).body(r#"{"ip":"1.2.3.4"}"#);
    });

    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    mgr.initialize().await.unwrap();

    let mut ds = triggered_only("dc", server.base_url());
    ds.enabled = false;
    mgr.save(ds).await.unwrap();

    mgr.on_user_ask_update_all_nodes();
    mgr.on_generation_started();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(mock.hits(), 0);
    let status = mgr.status();
    assert_eq!(status.len(), 1);
    assert!(!status[0].enabled);
}

#[tokio::test]
async fn scheduled_source_re_arms_after_each_run() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET);
        then.status(200).body(r#"{"ip":"1.2.3.4"}"#);
    });

    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    mgr.initialize().await.unwrap();
    mgr.save(source(
        "dc",
        server.base_url(),
        Schedule::Scheduled(Duration::from_millis(200)),
    ))
    .await
    .unwrap();

    // Period 200ms: first fire one period after save, then one per period.
    wait_for_hits(&mock, 3).await;
}

#[tokio::test]
async fn unscheduled_source_never_fires_on_its_own() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET);
        then.status(200).body(r#"{"ip":"1.2.3.4"}"#);
    });

    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    mgr.initialize().await.unwrap();
    mgr.save(triggered_only("dc", server.base_url())).await.unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(mock.hits(), 0);
}

#[tokio::test]
async fn rapid_triggers_coalesce_into_one_follow_up() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET);
        then.status(200)
            .delay(Duration::from_millis(200))
            .body(r#"{"ip":"1.2.3.4"}"#);
    });

    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    mgr.initialize().await.unwrap();
    mgr.save(triggered_only("dc", server.base_url())).await.unwrap();

    // Three rapid full refreshes: the first starts a run, the other two
    // buffer while it executes and collapse into a single follow-up.
    mgr.on_user_ask_update_all_nodes();
    mgr.on_user_ask_update_all_nodes();
    mgr.on_user_ask_update_all_nodes();

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(mock.hits(), 2);
}
