//! Request forwarding to a selected instance.
//!
//! # Responsibilities
//! - Hold an in-flight guard until the response body is finished or dropped
//! - Enforce the forward timeout
//! - Feed outcomes back to the circuit breaker and health state
//! - Keep traffic counters for the metrics collector
//!
//! # Design Decisions
//! - No implicit retry on another instance; the caller decides
//! - Connection errors, timeouts and 5xx are instance failures
//! - A cancelled forward releases its guard and records nothing else
//! - Outcomes for an instance replaced by a reload are not fed back

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, HttpBody};
use axum::http::{header, HeaderValue, Request, Response, Uri};
use futures_util::future::BoxFuture;
use http_body_util::BodyExt;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Serialize;
use tokio::time;

use crate::config::BalancerConfig;
use crate::health::HealthProber;
use crate::http::response::X_FLEET_INSTANCE;
use crate::load_balancer::{NoInstanceAvailable, Selector};
use crate::observability::metrics;
use crate::registry::{ConnectionGuard, Instance};
use crate::resilience::circuit_breaker::BreakerRegistry;

/// Transport-level failure talking to an instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct UpstreamError(pub String);

/// Sends an absolute-form request to an instance.
pub trait Upstream: Send + Sync {
    fn send(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, UpstreamError>>;
}

/// hyper-util pooled HTTP/1 client.
pub struct HttpUpstream {
    client: Client<HttpConnector, Body>,
}

impl HttpUpstream {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HttpUpstream {
    fn default() -> Self {
        Self::new()
    }
}

impl Upstream for HttpUpstream {
    fn send(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, UpstreamError>> {
        Box::pin(async move {
            self.client
                .request(request)
                .await
                .map(|response| response.map(Body::new))
                .map_err(|e| UpstreamError(e.to_string()))
        })
    }
}

/// Why the selected instance failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    Connect { message: String },
    Timeout { after_ms: u64 },
    ServerError { status: u16 },
    InvalidRequest { message: String },
}

impl FailureCause {
    /// Whether the failure is attributable to the instance.
    pub fn counts_against_instance(&self) -> bool {
        !matches!(self, FailureCause::InvalidRequest { .. })
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Connect { message } => write!(f, "connection error: {message}"),
            FailureCause::Timeout { after_ms } => write!(f, "timed out after {after_ms}ms"),
            FailureCause::ServerError { status } => write!(f, "server error status {status}"),
            FailureCause::InvalidRequest { message } => write!(f, "invalid request: {message}"),
        }
    }
}

/// The two unavailability signals a caller can receive.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForwardError {
    /// Category level: nothing could be selected.
    #[error(transparent)]
    NoInstanceAvailable(#[from] NoInstanceAvailable),

    /// Instance level: the selected instance failed.
    #[error("instance '{instance_id}' failed: {cause}")]
    InstanceFailed { instance_id: String, cause: FailureCause },
}

/// Releases the in-flight count when the response body is dropped.
struct BodyLease(ConnectionGuard);

impl Drop for BodyLease {
    fn drop(&mut self) {
        // The inner guard decrements after this runs.
        metrics::record_in_flight(&self.0.id, self.0.in_flight().saturating_sub(1));
    }
}

fn hold_until_body_ends(response: Response<Body>, guard: ConnectionGuard) -> Response<Body> {
    let lease = BodyLease(guard);
    response.map(move |body| {
        Body::new(body.map_frame(move |frame| {
            let _ = &lease;
            frame
        }))
    })
}

/// Selects and forwards.
pub struct Forwarder {
    selector: Selector,
    breakers: Arc<BreakerRegistry>,
    health: Arc<HealthProber>,
    upstream: Arc<dyn Upstream>,
    balancer: BalancerConfig,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(
        selector: Selector,
        breakers: Arc<BreakerRegistry>,
        health: Arc<HealthProber>,
        upstream: Arc<dyn Upstream>,
        balancer: BalancerConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            selector,
            breakers,
            health,
            upstream,
            balancer,
            timeout,
        }
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Select an instance of `category` with its configured strategy and forward.
    pub async fn route(&self, category: &str, request: Request<Body>) -> Result<Response<Body>, ForwardError> {
        let strategy = self.balancer.strategy_for(category);
        let instance = self.selector.select(category, strategy)?;
        self.forward(request, &instance).await
    }

    /// Forward `request` (origin-form URI) to `instance`.
    pub async fn forward(
        &self,
        request: Request<Body>,
        instance: &Arc<Instance>,
    ) -> Result<Response<Body>, ForwardError> {
        let guard = instance.acquire();
        metrics::record_in_flight(&instance.id, guard.in_flight());

        let started = Instant::now();
        let bytes_in = request.body().size_hint().exact().unwrap_or(0);

        let outcome = match rewrite(request, instance) {
            Ok(request) => match time::timeout(self.timeout, self.upstream.send(request)).await {
                Ok(Ok(response)) if response.status().is_server_error() => {
                    Err(FailureCause::ServerError {
                        status: response.status().as_u16(),
                    })
                }
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) => Err(FailureCause::Connect { message: e.0 }),
                Err(_) => Err(FailureCause::Timeout {
                    after_ms: self.timeout.as_millis() as u64,
                }),
            },
            Err(cause) => Err(cause),
        };
        let elapsed = started.elapsed();
        let current = self.selector.registry().is_current(instance);

        match outcome {
            Ok(mut response) => {
                if let Ok(value) = HeaderValue::from_str(&instance.id) {
                    response.headers_mut().insert(X_FLEET_INSTANCE, value);
                }
                let bytes_out = response.body().size_hint().exact().unwrap_or(0);
                instance.traffic().record(elapsed, bytes_in, bytes_out, false);
                if current {
                    self.breakers.record_success(&instance.id);
                }
                metrics::record_request(&instance.category, response.status().as_u16(), &instance.id, started);
                Ok(hold_until_body_ends(response, guard))
            }
            Err(cause) => {
                tracing::warn!(instance = %instance.id, category = %instance.category, cause = %cause, "Forward failed");
                if cause.counts_against_instance() {
                    instance.traffic().record(elapsed, bytes_in, 0, true);
                    if current {
                        self.breakers.record_failure(&instance.id);
                        self.health.report_traffic_failure(instance, &cause.to_string());
                    }
                }
                metrics::record_request(&instance.category, cause.status().as_u16(), &instance.id, started);
                drop(guard);
                metrics::record_in_flight(&instance.id, instance.in_flight());
                Err(ForwardError::InstanceFailed {
                    instance_id: instance.id.clone(),
                    cause,
                })
            }
        }
    }
}

/// Point an origin-form request at `instance`.
fn rewrite(request: Request<Body>, instance: &Instance) -> Result<Request<Body>, FailureCause> {
    let (mut parts, body) = request.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    parts.uri = format!("http://{}{}", instance.address, path)
        .parse::<Uri>()
        .map_err(|e| FailureCause::InvalidRequest {
            message: e.to_string(),
        })?;
    // The client derives Host from the new authority.
    parts.headers.remove(header::HOST);
    Ok(Request::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, HealthCheckConfig, InstanceConfig};
    use crate::health::{HttpProbe, Transition};
    use crate::registry::{HealthState, Registry};
    use crate::resilience::circuit_breaker::BreakerState;
    use axum::http::StatusCode;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Ok,
        Refuse,
        ServerError,
        Hang,
    }

    /// Upstream scripted per request, recording the URIs it saw.
    struct FakeUpstream {
        behaviour: Mutex<Behaviour>,
        seen: Mutex<Vec<String>>,
    }

    impl FakeUpstream {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour: Mutex::new(behaviour),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl Upstream for FakeUpstream {
        fn send(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, UpstreamError>> {
            self.seen.lock().unwrap().push(request.uri().to_string());
            let behaviour = *self.behaviour.lock().unwrap();
            Box::pin(async move {
                match behaviour {
                    Behaviour::Ok => Ok(Response::new(Body::from("ok"))),
                    Behaviour::Refuse => Err(UpstreamError("connection refused".into())),
                    Behaviour::ServerError => Ok(Response::builder()
                        .status(StatusCode::INTERNAL_SERVER_ERROR)
                        .body(Body::empty())
                        .unwrap()),
                    Behaviour::Hang => {
                        std::future::pending::<()>().await;
                        unreachable!()
                    }
                }
            })
        }
    }

    struct Harness {
        forwarder: Arc<Forwarder>,
        registry: Arc<Registry>,
        breakers: Arc<BreakerRegistry>,
        upstream: Arc<FakeUpstream>,
        events: mpsc::UnboundedReceiver<crate::health::HealthEvent>,
    }

    fn harness(behaviour: Behaviour) -> Harness {
        let registry = Arc::new(
            Registry::from_instances(&[
                InstanceConfig::new("A", "db", "127.0.0.1", 7001),
                InstanceConfig::new("B", "db", "127.0.0.1", 7002),
                InstanceConfig::new("C", "db", "127.0.0.1", 7003),
            ])
            .unwrap(),
        );
        for instance in registry.all() {
            instance.set_health(HealthState::Healthy);
        }
        let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig::default()));
        let (tx, events) = mpsc::unbounded_channel();
        let health = Arc::new(
            HealthProber::new(
                registry.clone(),
                Arc::new(HttpProbe::new("/health")),
                HealthCheckConfig::default(),
            )
            .with_observer(Arc::new(tx))
            .with_observer(breakers.clone()),
        );
        let upstream = FakeUpstream::new(behaviour);
        let forwarder = Arc::new(Forwarder::new(
            Selector::new(registry.clone(), breakers.clone()),
            breakers.clone(),
            health,
            upstream.clone(),
            BalancerConfig::default(),
            Duration::from_millis(100),
        ));
        Harness {
            forwarder,
            registry,
            breakers,
            upstream,
            events,
        }
    }

    fn request(path: &str) -> Request<Body> {
        Request::builder()
            .uri(path)
            .header("host", "fleet.local")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_rewrites_uri_and_releases_guard() {
        let h = harness(Behaviour::Ok);
        let a = h.registry.get("A").unwrap();

        let response = h.forwarder.forward(request("/users?id=7"), &a).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_FLEET_INSTANCE], "A");
        assert_eq!(h.upstream.seen.lock().unwrap()[0], "http://127.0.0.1:7001/users?id=7");
        assert_eq!(a.traffic().totals().requests, 1);

        // The body is still owed to the caller.
        assert_eq!(a.in_flight(), 1);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
        assert_eq!(a.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_dropped_response_releases_guard() {
        let h = harness(Behaviour::Ok);
        let a = h.registry.get("A").unwrap();
        let response = h.forwarder.forward(request("/"), &a).await.unwrap();
        assert_eq!(response.body().size_hint().exact(), Some(2));
        drop(response);
        assert_eq!(a.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_outcome_for_replaced_instance_not_fed_back() {
        let h = harness(Behaviour::Refuse);
        let old = h.registry.get("A").unwrap();
        h.registry
            .reload(&[
                InstanceConfig::new("A", "db", "127.0.0.1", 7101),
                InstanceConfig::new("B", "db", "127.0.0.1", 7002),
                InstanceConfig::new("C", "db", "127.0.0.1", 7003),
            ])
            .unwrap();

        assert!(h.forwarder.forward(request("/"), &old).await.is_err());
        assert!(h.breakers.snapshot("A").is_none());
        assert_eq!(h.registry.get("A").unwrap().health(), HealthState::Unknown);
        assert_eq!(old.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_marks_unhealthy_and_counts_breaker() {
        let mut h = harness(Behaviour::Refuse);
        let a = h.registry.get("A").unwrap();

        let err = h.forwarder.forward(request("/"), &a).await.unwrap_err();
        assert!(matches!(
            err,
            ForwardError::InstanceFailed { ref instance_id, cause: FailureCause::Connect { .. } } if instance_id == "A"
        ));
        assert_eq!(a.health(), HealthState::Unhealthy);
        assert_eq!(h.breakers.snapshot("A").unwrap().consecutive_failures, 1);
        assert_eq!(h.events.try_recv().unwrap().transition, Transition::Down);
        assert_eq!(a.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_server_error_is_instance_failure() {
        let h = harness(Behaviour::ServerError);
        let a = h.registry.get("A").unwrap();
        let err = h.forwarder.forward(request("/"), &a).await.unwrap_err();
        assert!(matches!(
            err,
            ForwardError::InstanceFailed { cause: FailureCause::ServerError { status: 500 }, .. }
        ));
        assert_eq!(a.traffic().totals().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let h = harness(Behaviour::Hang);
        let a = h.registry.get("A").unwrap();
        let err = h.forwarder.forward(request("/"), &a).await.unwrap_err();
        assert!(matches!(
            err,
            ForwardError::InstanceFailed { cause: FailureCause::Timeout { after_ms: 100 }, .. }
        ));
        assert_eq!(a.health(), HealthState::Unhealthy);
        assert_eq!(h.breakers.snapshot("A").unwrap().consecutive_failures, 1);
        assert_eq!(a.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_forward_releases_without_failure() {
        let h = harness(Behaviour::Hang);
        let a = h.registry.get("A").unwrap();

        let forwarder = h.forwarder.clone();
        let target = a.clone();
        let task = tokio::spawn(async move { forwarder.forward(request("/"), &target).await });
        while a.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;

        assert_eq!(a.in_flight(), 0);
        assert_eq!(a.health(), HealthState::Healthy);
        assert_eq!(h.breakers.state("A"), BreakerState::Closed);
        assert!(h.breakers.snapshot("A").is_none());
    }

    #[tokio::test]
    async fn test_breaker_opens_after_threshold_then_recovers() {
        let h = harness(Behaviour::Refuse);
        let a = h.registry.get("A").unwrap();

        for _ in 0..5 {
            // Each failure marks A unhealthy; put it back so only the breaker gates it.
            a.set_health(HealthState::Healthy);
            let _ = h.forwarder.forward(request("/"), &a).await;
        }
        assert_eq!(h.breakers.state("A"), BreakerState::Open);

        a.set_health(HealthState::Healthy);
        for _ in 0..9 {
            let picked = h.forwarder.selector().select("db", crate::load_balancer::Strategy::RoundRobin).unwrap();
            assert_ne!(picked.id, "A");
        }

        // Probe-driven recovery: unhealthy → healthy emits Recovered → half-open.
        a.set_health(HealthState::Unhealthy);
        h.forwarder.health.record_probe(&a, Ok(Duration::from_millis(1)));
        assert_eq!(h.breakers.state("A"), BreakerState::HalfOpen);

        *h.upstream.behaviour.lock().unwrap() = Behaviour::Ok;
        h.forwarder.forward(request("/"), &a).await.unwrap();
        assert_eq!(h.breakers.state("A"), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_route_distinguishes_category_failure() {
        let h = harness(Behaviour::Ok);
        let err = h.forwarder.route("ai-ml", request("/")).await.unwrap_err();
        match err {
            ForwardError::NoInstanceAvailable(e) => assert_eq!(e.available_categories, vec!["db"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_in_flight_balanced_under_concurrency() {
        let h = harness(Behaviour::Ok);
        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let forwarder = h.forwarder.clone();
                tokio::spawn(async move {
                    let _ = forwarder.route("db", request(&format!("/{i}"))).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        for instance in h.registry.all() {
            assert_eq!(instance.in_flight(), 0);
        }
        let total: u64 = h.registry.all().iter().map(|i| i.traffic().totals().requests).sum();
        assert_eq!(total, 64);
    }
}
