//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use fleet_router::admin::{serve_admin, AdminState};
use fleet_router::config::{FleetConfig, InstanceConfig};
use fleet_router::{Fleet, HttpServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Read one request head and return its path (with query).
async fn read_request_path(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf);
    head.lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    }
}

/// Start a backend whose response is computed from the request path.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let Some(path) = read_request_path(&mut socket).await else {
                    return;
                };
                let (status, body) = f(path).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line(status),
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Start a backend that answers every path with 200 and `body`.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move |_| async move { (200, body.to_string()) }).await
}

/// Start a backend that echoes the request path.
pub async fn start_echo_backend() -> SocketAddr {
    start_programmable_backend(|path| async move { (200, path) }).await
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn instance(id: &str, category: &str, addr: SocketAddr) -> InstanceConfig {
    InstanceConfig::new(id, category, addr.ip().to_string(), addr.port())
}

pub struct TestFleet {
    pub fleet: Arc<Fleet>,
    pub traffic: SocketAddr,
    pub admin: SocketAddr,
    pub shutdown: Arc<Shutdown>,
}

impl TestFleet {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.traffic, path)
    }

    pub fn admin_url(&self, path: &str) -> String {
        format!("http://{}{}", self.admin, path)
    }
}

impl Drop for TestFleet {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Serve `config` on ephemeral ports. Background loops are not started;
/// tests drive probing and sampling explicitly.
pub async fn start_fleet(config: FleetConfig) -> TestFleet {
    let fleet = Arc::new(Fleet::from_config(config).unwrap());
    let shutdown = Arc::new(Shutdown::new());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let traffic = listener.local_addr().unwrap();
    let server = HttpServer::new(&fleet);
    tokio::spawn(server.run(listener, shutdown.subscribe()));

    let admin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let admin = admin_listener.local_addr().unwrap();
    let state = AdminState::new(fleet.query(), fleet.config().admin.api_key.clone());
    tokio::spawn(serve_admin(admin_listener, state, shutdown.subscribe()));

    TestFleet {
        fleet,
        traffic,
        admin,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Wait until every instance has released its in-flight count.
///
/// Guards live until the server drops the streamed response body, which can
/// trail the client seeing the response.
pub async fn wait_until_idle(fleet: &Fleet) {
    for _ in 0..200 {
        if fleet.registry().all().iter().all(|i| i.in_flight() == 0) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("instances still have requests in flight");
}
