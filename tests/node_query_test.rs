//! End-to-end (source, node) query scenarios against a mock endpoint.

use std::collections::HashMap;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use stoker::domain::data_source::{HttpMethod, HttpSource, MissingNodeBehavior, RequestMode};
use stoker::domain::error::NodeQueryError;
use stoker::domain::http_fetch::HttpFetcher;
use stoker::domain::node::{NodeInfo, Parameter};
use stoker::domain::node_query::query_node;

fn node(id: &str) -> NodeInfo {
    NodeInfo {
        id: id.to_string(),
        hostname: format!("{id}.example.com"),
        policy_server_id: "root".to_string(),
        is_policy_server: false,
        properties: HashMap::new(),
    }
}

fn policy_server() -> NodeInfo {
    NodeInfo {
        id: "root".to_string(),
        hostname: "policy.example.com".to_string(),
        policy_server_id: "root".to_string(),
        is_policy_server: true,
        properties: HashMap::new(),
    }
}

fn source(url: String, path: &str, missing: MissingNodeBehavior) -> HttpSource {
    HttpSource {
        url,
        path: path.to_string(),
        method: HttpMethod::Get,
        check_ssl: true,
        headers: Vec::new(),
        params: Vec::new(),
        request_timeout: Duration::from_secs(5),
        request_mode: RequestMode::ByNode,
        missing_node_behavior: missing,
    }
}

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(true, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn extracts_first_match_into_property() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/nodes/node1");
        then.status(200).body(r#"{"ip":"1.2.3.4"}"#);
    });

    let http = source(
        format!("{}/nodes/${{node.id}}", server.base_url()),
        "$.ip",
        MissingNodeBehavior::NoChange,
    );
    let prop = query_node("ipsource", &http, &fetcher(), &node("node1"), &policy_server(), &[])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(prop.name, "ipsource");
    assert_eq!(prop.value, "1.2.3.4");
    assert_eq!(prop.provider.as_deref(), Some("stoker"));
    mock.assert();
}

#[tokio::test]
async fn interpolates_headers_and_query_params() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/lookup")
            .header("X-Api-Key", "s3cret")
            .query_param("fqdn", "node1.example.com");
        then.status(200).body(r#"{"dc":"paris"}"#);
    });

    let mut http = source(
        format!("{}/lookup", server.base_url()),
        "$.dc",
        MissingNodeBehavior::NoChange,
    );
    http.headers = vec![("X-Api-Key".to_string(), "${param[api_key]}".to_string())];
    http.params = vec![("fqdn".to_string(), "${node.hostname}".to_string())];

    let params = vec![Parameter {
        name: "api_key".to_string(),
        value: json!("s3cret"),
    }];
    let prop = query_node("dc", &http, &fetcher(), &node("node1"), &policy_server(), &params)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(prop.value, "paris");
    mock.assert();
}

#[tokio::test]
async fn post_sends_params_as_form_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/lookup")
            .header("content-type", "application/x-www-form-urlencoded")
            .body_contains("node=node1");
        then.status(200).body(r#"{"dc":"berlin"}"#);
    });

    let mut http = source(
        format!("{}/lookup", server.base_url()),
        "$.dc",
        MissingNodeBehavior::NoChange,
    );
    http.method = HttpMethod::Post;
    http.params = vec![("node".to_string(), "${node.id}".to_string())];

    let prop = query_node("dc", &http, &fetcher(), &node("node1"), &policy_server(), &[])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(prop.value, "berlin");
    mock.assert();
}

#[tokio::test]
async fn empty_selection_clears_the_property() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET);
        then.status(200).body("{}");
    });

    let http = source(server.base_url(), "$.missing", MissingNodeBehavior::NoChange);
    let prop = query_node("dc", &http, &fetcher(), &node("node1"), &policy_server(), &[])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(prop.value, "");
}

#[tokio::test]
async fn not_found_with_no_change_touches_nothing() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET);
        then.status(404);
    });

    let http = source(server.base_url(), "$.ip", MissingNodeBehavior::NoChange);
    let result = query_node("dc", &http, &fetcher(), &node("node1"), &policy_server(), &[])
        .await
        .unwrap();

    assert!(result.is_none());
}

#[tokio::test]
async fn not_found_with_delete_writes_empty_string() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET);
        then.status(404);
    });

    let http = source(server.base_url(), "$.ip", MissingNodeBehavior::Delete);
    let prop = query_node("dc", &http, &fetcher(), &node("node1"), &policy_server(), &[])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(prop.value, "");
}

#[tokio::test]
async fn not_found_with_default_value_writes_compact_json() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET);
        then.status(404);
    });

    let http = source(
        server.base_url(),
        "$.ip",
        MissingNodeBehavior::DefaultValue(json!({"status":"down"})),
    );
    let prop = query_node("dc", &http, &fetcher(), &node("node1"), &policy_server(), &[])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(prop.value, r#"{"status":"down"}"#);
}

#[tokio::test]
async fn not_found_with_string_default_writes_bare_string() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET);
        then.status(404);
    });

    let http = source(
        server.base_url(),
        "$.ip",
        MissingNodeBehavior::DefaultValue(json!("unknown")),
    );
    let prop = query_node("dc", &http, &fetcher(), &node("node1"), &policy_server(), &[])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(prop.value, "unknown");
}

#[tokio::test]
async fn server_error_fails_the_query() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET);
        then.status(500).body("boom");
    });

    let http = source(server.base_url(), "$.ip", MissingNodeBehavior::NoChange);
    let err = query_node("dc", &http, &fetcher(), &node("node1"), &policy_server(), &[])
        .await
        .unwrap_err();

    match err {
        NodeQueryError::Http { code, body } => {
            assert_eq!(code, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected Http error, got {other}"),
    }
}

#[tokio::test]
async fn unknown_interpolation_token_fails_before_any_call() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET);
        then.status(200).body("{}");
    });

    let http = source(
        format!("{}/${{node.nope}}", server.base_url()),
        "$.ip",
        MissingNodeBehavior::NoChange,
    );
    let err = query_node("dc", &http, &fetcher(), &node("node1"), &policy_server(), &[])
        .await
        .unwrap_err();

    assert!(matches!(err, NodeQueryError::Interpolation(_)));
    assert_eq!(mock.hits(), 0);
}

#[tokio::test]
async fn malformed_response_is_a_json_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET);
        then.status(200).body("not json");
    });

    let http = source(server.base_url(), "$.ip", MissingNodeBehavior::NoChange);
    let err = query_node("dc", &http, &fetcher(), &node("node1"), &policy_server(), &[])
        .await
        .unwrap_err();

    assert!(matches!(err, NodeQueryError::Json(_)));
}
