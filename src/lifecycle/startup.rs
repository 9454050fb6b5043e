//! Startup orchestration.
//!
//! # Responsibilities
//! - Start background tasks (probing, sampling + alerting, alert retention)
//! - Apply hot-reloaded instance sets
//! - Serve traffic and admin listeners until shutdown, then drain
//!
//! # Design Decisions
//! - Background tasks start before listeners accept traffic
//! - Shutdown waits for tasks up to a deadline, then gives up on them

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::admin::{serve_admin, AdminState};
use crate::config::FleetConfig;
use crate::fleet::Fleet;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;

const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

/// Owns the fleet's background tasks for the life of the process.
pub struct Supervisor {
    fleet: Arc<Fleet>,
    shutdown: Arc<Shutdown>,
    tasks: Vec<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(fleet: Arc<Fleet>) -> Self {
        Self {
            fleet,
            shutdown: Arc::new(Shutdown::new()),
            tasks: Vec::new(),
        }
    }

    pub fn shutdown(&self) -> &Arc<Shutdown> {
        &self.shutdown
    }

    pub fn fleet(&self) -> &Arc<Fleet> {
        &self.fleet
    }

    /// Spawn the probe loop, the collection loop and the alert sweeper.
    pub fn spawn_background(&mut self) {
        let health = self.fleet.health().clone();
        self.tasks.push(tokio::spawn(health.run(self.shutdown.subscribe())));

        let collector = self.fleet.collector().clone();
        let alerts = self.fleet.alerts().clone();
        self.tasks
            .push(tokio::spawn(collector.run(alerts, self.shutdown.subscribe())));

        let sweeper = self.fleet.alerts().clone();
        self.tasks.push(tokio::spawn(sweeper.run(self.shutdown.subscribe())));
    }

    /// Apply each reloaded configuration's instance set.
    ///
    /// Other sections take effect on restart only.
    pub fn spawn_reload_listener(&mut self, mut updates: mpsc::UnboundedReceiver<FleetConfig>) {
        let fleet = self.fleet.clone();
        let mut shutdown = self.shutdown.subscribe();
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates.recv() => {
                        let Some(config) = update else { break };
                        match fleet.reload(&config.instances) {
                            Ok(summary) => tracing::info!(
                                added = ?summary.added,
                                removed = ?summary.removed,
                                "Instance set reloaded"
                            ),
                            Err(e) => tracing::error!(error = %e, "Reload rejected, keeping current instance set"),
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        }));
    }

    /// Serve until shutdown, then wait for background tasks to finish.
    pub async fn serve(self, traffic: TcpListener, admin: Option<TcpListener>) -> io::Result<()> {
        let server = HttpServer::new(&self.fleet);
        let traffic_task = tokio::spawn(server.run(traffic, self.shutdown.subscribe()));

        let admin_task = admin.map(|listener| {
            let state = AdminState::new(self.fleet.query(), self.fleet.config().admin.api_key.clone());
            tokio::spawn(serve_admin(listener, state, self.shutdown.subscribe()))
        });

        let traffic_result = join_server(traffic_task).await;
        // A listener that died on its own takes the rest down with it.
        self.shutdown.trigger();
        if let Some(task) = admin_task {
            if let Err(e) = join_server(task).await {
                tracing::error!(error = %e, "Admin server failed");
            }
        }

        let drain = futures_util::future::join_all(self.tasks);
        if tokio::time::timeout(DRAIN_DEADLINE, drain).await.is_err() {
            tracing::warn!(deadline_secs = DRAIN_DEADLINE.as_secs(), "Background tasks did not stop in time");
        }
        traffic_result
    }
}

async fn join_server(task: JoinHandle<io::Result<()>>) -> io::Result<()> {
    match task.await {
        Ok(result) => result,
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
    }
}
