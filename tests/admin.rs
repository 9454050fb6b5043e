//! Admin query endpoints.

use fleet_router::config::FleetConfig;
use serde_json::Value;

mod common;

async fn get_json(url: String) -> (u16, Value) {
    let res = common::client().get(url).send().await.unwrap();
    let status = res.status().as_u16();
    (status, res.json().await.unwrap_or(Value::Null))
}

async fn fleet_with_two_categories() -> common::TestFleet {
    let a = common::start_mock_backend("A").await;
    let b = common::start_mock_backend("B").await;
    let dead = common::closed_addr().await;
    let mut config = FleetConfig {
        instances: vec![
            common::instance("A", "database", a),
            common::instance("B", "database", b),
            common::instance("F", "filesystem", dead),
        ],
        ..FleetConfig::default()
    };
    config.monitoring.sampler = fleet_router::config::SamplerKind::Fixed;
    let fleet = common::start_fleet(config).await;
    fleet.fleet.health().probe_all().await;
    fleet
}

#[tokio::test]
async fn test_status_and_fleet_overview() {
    let fleet = fleet_with_two_categories().await;
    fleet.fleet.collector().collect();

    let (status, body) = get_json(fleet.admin_url("/admin/status")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "operational");
    assert_eq!(body["instances"], 3);
    assert_eq!(body["active_alerts"], 1);

    let (_, body) = get_json(fleet.admin_url("/admin/fleet")).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["healthy"], 2);
    assert_eq!(body["unhealthy"], 1);
    assert_eq!(body["categories"]["filesystem"]["unhealthy"], 1);

    let (_, body) = get_json(fleet.admin_url("/admin/categories")).await;
    assert_eq!(body["database"]["healthy"], 2);
}

#[tokio::test]
async fn test_category_and_instance_views() {
    let fleet = fleet_with_two_categories().await;
    fleet.fleet.collector().collect();

    let (status, body) = get_json(fleet.admin_url("/admin/categories/database")).await;
    assert_eq!(status, 200);
    assert_eq!(body["strategy"], "round-robin");
    assert_eq!(body["eligible"], 2);
    assert_eq!(body["instances"][0]["id"], "A");
    assert_eq!(body["instances"][0]["breaker"], "closed");

    let (status, _) = get_json(fleet.admin_url("/admin/categories/ai-ml")).await;
    assert_eq!(status, 404);

    let (_, body) = get_json(fleet.admin_url("/admin/instances/F/health")).await;
    assert_eq!(body["instance"]["health"], "unhealthy");
    assert_eq!(body["record"]["consecutive_failures"], 1);
    assert!(body["record"]["last_error"].is_string());

    let (_, body) = get_json(fleet.admin_url("/admin/instances/A/metrics")).await;
    assert_eq!(body["history"]["memory"].as_array().unwrap().len(), 1);
    assert_eq!(body["latest"]["memory"], 0.0);

    let (status, _) = get_json(fleet.admin_url("/admin/instances/Z/metrics")).await;
    assert_eq!(status, 404);

    let (_, body) = get_json(fleet.admin_url("/admin/health")).await;
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_alerts_and_breakers() {
    let fleet = fleet_with_two_categories().await;
    for _ in 0..5 {
        fleet.fleet.breakers().record_failure("B");
    }

    let hot = fleet_router::monitoring::InstanceSample {
        instance_id: "B".to_string(),
        category: "database".to_string(),
        timestamp: 0,
        memory: 0.95,
        cpu: 0.1,
        disk: 0.1,
        bytes_in: 0,
        bytes_out: 0,
        avg_latency_ms: Some(1.0),
        error_rate: 0.0,
    };
    fleet.fleet.alerts().evaluate(&[hot]);

    let (_, body) = get_json(fleet.admin_url("/admin/alerts")).await;
    let alerts = body.as_array().unwrap();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0]["kind"], "high-resource");
    assert_eq!(alerts[0]["severity"], "warning");
    assert_eq!(alerts[1]["kind"], "instance-down");
    assert_eq!(alerts[1]["severity"], "critical");

    let (_, body) = get_json(fleet.admin_url("/admin/alerts?limit=1")).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = get_json(fleet.admin_url("/admin/breakers")).await;
    assert_eq!(body["B"]["state"], "open");
    assert_eq!(body["B"]["consecutive_failures"], 5);
}

#[tokio::test]
async fn test_queries_do_not_mutate() {
    let fleet = fleet_with_two_categories().await;
    let before = fleet.fleet.breakers().snapshots().len();
    for path in ["/admin/breakers", "/admin/health", "/admin/categories/database", "/admin/instances/A/health"] {
        get_json(fleet.admin_url(path)).await;
    }
    assert_eq!(fleet.fleet.breakers().snapshots().len(), before);
    assert!(fleet.fleet.collector().history().instance("A").is_none());
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let mut config = FleetConfig::default();
    config.admin.api_key = Some("s3cret".to_string());
    let fleet = common::start_fleet(config).await;
    let client = common::client();

    let res = client.get(fleet.admin_url("/admin/status")).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .get(fleet.admin_url("/admin/status"))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
}
