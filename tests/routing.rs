//! End-to-end routing through the traffic listener.

use fleet_router::config::FleetConfig;
use fleet_router::load_balancer::Strategy;
use serde_json::Value;

mod common;

#[tokio::test]
async fn test_round_robin_visits_each_instance_once() {
    let a = common::start_mock_backend("A").await;
    let b = common::start_mock_backend("B").await;
    let c = common::start_mock_backend("C").await;

    let config = FleetConfig {
        instances: vec![
            common::instance("A", "database", a),
            common::instance("B", "database", b),
            common::instance("C", "database", c),
        ],
        ..FleetConfig::default()
    };
    let fleet = common::start_fleet(config).await;
    let cycle = fleet.fleet.health().probe_all().await;
    assert_eq!(cycle.healthy, 3);

    let client = common::client();
    let mut served = Vec::new();
    for _ in 0..3 {
        let res = client.get(fleet.url("/database/query")).send().await.unwrap();
        assert_eq!(res.status(), 200);
        let header = res.headers()["x-fleet-instance"].to_str().unwrap().to_string();
        let body = res.text().await.unwrap();
        assert_eq!(header, body);
        served.push(body);
    }
    assert_eq!(served, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_category_prefix_is_stripped() {
    let echo = common::start_echo_backend().await;
    let config = FleetConfig {
        instances: vec![common::instance("E", "fs", echo)],
        ..FleetConfig::default()
    };
    let fleet = common::start_fleet(config).await;
    fleet.fleet.health().probe_all().await;

    let res = common::client()
        .get(fleet.url("/fs/files/a.txt?rev=3"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "/files/a.txt?rev=3");
}

#[tokio::test]
async fn test_request_id_assigned_and_propagated() {
    let backend = common::start_mock_backend("ok").await;
    let config = FleetConfig {
        instances: vec![common::instance("A", "db", backend)],
        ..FleetConfig::default()
    };
    let fleet = common::start_fleet(config).await;
    fleet.fleet.health().probe_all().await;
    let client = common::client();

    let res = client.get(fleet.url("/db/")).send().await.unwrap();
    assert!(res.headers().contains_key("x-request-id"));

    let res = client
        .get(fleet.url("/db/"))
        .header("x-request-id", "req-42")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "req-42");
}

#[tokio::test]
async fn test_unknown_category_is_unavailable() {
    let backend = common::start_mock_backend("ok").await;
    let config = FleetConfig {
        instances: vec![common::instance("A", "database", backend)],
        ..FleetConfig::default()
    };
    let fleet = common::start_fleet(config).await;
    fleet.fleet.health().probe_all().await;

    let res = common::client().get(fleet.url("/ai-ml/infer")).send().await.unwrap();
    assert_eq!(res.status(), 503);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "no_instance_available");
    assert_eq!(body["category"], "ai-ml");
    assert_eq!(body["available_categories"], serde_json::json!(["database"]));
}

#[tokio::test]
async fn test_missing_category_is_bad_request() {
    let fleet = common::start_fleet(FleetConfig::default()).await;
    let res = common::client().get(fleet.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "missing_category");
}

#[tokio::test]
async fn test_unprobed_instances_are_not_selected() {
    let backend = common::start_mock_backend("ok").await;
    let config = FleetConfig {
        instances: vec![common::instance("A", "db", backend)],
        ..FleetConfig::default()
    };
    let fleet = common::start_fleet(config).await;

    let res = common::client().get(fleet.url("/db/")).send().await.unwrap();
    assert_eq!(res.status(), 503);
}

#[tokio::test]
async fn test_least_connections_per_category() {
    let a = common::start_mock_backend("A").await;
    let b = common::start_mock_backend("B").await;
    let mut config = FleetConfig {
        instances: vec![common::instance("A", "db", a), common::instance("B", "db", b)],
        ..FleetConfig::default()
    };
    config
        .balancer
        .categories
        .insert("db".to_string(), Strategy::LeastConnections);
    let fleet = common::start_fleet(config).await;
    fleet.fleet.health().probe_all().await;

    // A busy request on A steers the next one to B.
    let _busy = fleet.fleet.registry().get("A").unwrap().acquire();
    let res = common::client().get(fleet.url("/db/")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "B");
}

#[tokio::test]
async fn test_reload_swaps_instance_set() {
    let a = common::start_mock_backend("A").await;
    let b = common::start_mock_backend("B").await;
    let config = FleetConfig {
        instances: vec![common::instance("A", "db", a)],
        ..FleetConfig::default()
    };
    let fleet = common::start_fleet(config).await;
    fleet.fleet.health().probe_all().await;

    let summary = fleet
        .fleet
        .reload(&[common::instance("B", "db", b), common::instance("Z", "cache", b)])
        .unwrap();
    assert_eq!(summary.removed, vec!["A"]);
    fleet.fleet.health().probe_all().await;

    let client = common::client();
    let res = client.get(fleet.url("/db/")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "B");
    let res = client.get(fleet.url("/cache/")).send().await.unwrap();
    assert_eq!(res.status(), 200);
}
