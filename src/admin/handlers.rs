use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::admin::query::{InstanceHealth, SystemStatus};
use crate::admin::AdminState;
use crate::alerts::Alert;
use crate::monitoring::{CategorySnapshot, FleetSnapshot};
use crate::resilience::circuit_breaker::BreakerSnapshot;

#[derive(Debug, Deserialize)]
pub struct AlertParams {
    pub limit: Option<usize>,
}

fn not_found(kind: &str, name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "not_found", "kind": kind, "name": name })),
    )
        .into_response()
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(state.query.status())
}

pub async fn get_fleet(State(state): State<AdminState>) -> Json<FleetSnapshot> {
    Json(FleetSnapshot::clone(&state.query.overview()))
}

pub async fn get_categories(State(state): State<AdminState>) -> Json<BTreeMap<String, CategorySnapshot>> {
    Json(state.query.categories())
}

pub async fn get_category(State(state): State<AdminState>, Path(name): Path<String>) -> Response {
    match state.query.category(&name) {
        Some(detail) => Json(detail).into_response(),
        None => not_found("category", &name),
    }
}

pub async fn get_instance_health(State(state): State<AdminState>, Path(id): Path<String>) -> Response {
    match state.query.instance_health(&id) {
        Some(health) => Json(health).into_response(),
        None => not_found("instance", &id),
    }
}

pub async fn get_instance_metrics(State(state): State<AdminState>, Path(id): Path<String>) -> Response {
    match state.query.instance_metrics(&id) {
        Some(metrics) => Json(metrics).into_response(),
        None => not_found("instance", &id),
    }
}

pub async fn get_health(State(state): State<AdminState>) -> Json<Vec<InstanceHealth>> {
    Json(state.query.health())
}

pub async fn get_breakers(State(state): State<AdminState>) -> Json<BTreeMap<String, BreakerSnapshot>> {
    Json(state.query.breakers())
}

pub async fn get_alerts(State(state): State<AdminState>, Query(params): Query<AlertParams>) -> Json<Vec<Alert>> {
    Json(state.query.active_alerts(params.limit))
}
