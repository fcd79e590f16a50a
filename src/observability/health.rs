//! Health check HTTP server
//!
//! Exposes the gateway's state to operators: overall health, the metrics
//! snapshot and the broker's device and pairing tables.

use crate::broker::Broker;
use crate::observability::metrics::metrics;
use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use warp::http::StatusCode;
use warp::Filter;

/// HTTP health check server
pub struct HealthServer {
    node_name: String,
    port: u16,
    broker: Arc<Broker>,
    radio_running: Arc<AtomicBool>,
}

impl HealthServer {
    pub fn new(node_name: String, port: u16, broker: Arc<Broker>) -> Self {
        Self {
            node_name,
            port,
            broker,
            radio_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_radio_running(&self, running: bool) {
        self.radio_running.store(running, Ordering::Relaxed);
    }

    /// All endpoints as one warp filter
    pub fn routes(
        self: &Arc<Self>,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let health_server = Arc::clone(self);
        let devices_server = Arc::clone(self);

        // GET /health
        let health_route = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .map(move || {
                let status = health_server.get_health_status();
                let code = if status.status == "healthy" {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                warp::reply::with_status(warp::reply::json(&status), code)
            });

        // GET /metrics
        let metrics_route = warp::path("metrics")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(|| async move {
                Ok::<_, Infallible>(warp::reply::json(&metrics().snapshot()))
            });

        // GET /devices
        let devices_route = warp::path("devices")
            .and(warp::path::end())
            .and(warp::get())
            .map(move || warp::reply::json(&devices_server.broker.snapshot()));

        // GET /
        let root_route = warp::path::end().and(warp::get()).map(|| {
            let endpoints = BTreeMap::from([
                ("/health", "Overall gateway health with per-component checks"),
                ("/metrics", "Radio, MQTT and broker counters"),
                ("/devices", "Known devices and active pairings"),
            ]);
            warp::reply::json(&endpoints)
        });

        health_route
            .or(metrics_route)
            .or(devices_route)
            .or(root_route)
    }

    /// Serve until `shutdown` resolves
    pub async fn start<S>(
        self: Arc<Self>,
        shutdown: S,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let (bound, server) =
            warp::serve(self.routes()).try_bind_with_graceful_shutdown(addr, shutdown)?;

        info!(addr = %bound, "Health server listening");
        server.await;
        Ok(())
    }

    fn get_health_status(&self) -> HealthStatus {
        let now = current_timestamp();
        let snapshot = metrics().snapshot();

        let mut checks = BTreeMap::new();
        checks.insert("radio".to_string(), self.check_radio_health(now));
        checks.insert(
            "mqtt".to_string(),
            check_mqtt_health(snapshot.mqtt.connected, now),
        );

        let healthy = checks.values().all(|check| check.status == "healthy");

        HealthStatus {
            status: if healthy { "healthy" } else { "degraded" }.to_string(),
            timestamp: now,
            node_name: self.node_name.clone(),
            uptime_seconds: snapshot.lifecycle.uptime_seconds,
            known_devices: self.broker.snapshot().devices.len(),
            checks,
        }
    }

    fn check_radio_health(&self, now: u64) -> HealthCheck {
        if self.radio_running.load(Ordering::Relaxed) {
            HealthCheck {
                status: "healthy".to_string(),
                message: Some("Radio poll loop running".to_string()),
                last_check: now,
            }
        } else {
            HealthCheck {
                status: "unhealthy".to_string(),
                message: Some("Radio poll loop stopped".to_string()),
                last_check: now,
            }
        }
    }
}

fn check_mqtt_health(connected: bool, now: u64) -> HealthCheck {
    if connected {
        HealthCheck {
            status: "healthy".to_string(),
            message: Some("MQTT connection established".to_string()),
            last_check: now,
        }
    } else {
        HealthCheck {
            status: "unhealthy".to_string(),
            message: Some("MQTT connection lost or not yet established".to_string()),
            last_check: now,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: Option<String>,
    pub last_check: u64,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: String,
    timestamp: u64,
    node_name: String,
    uptime_seconds: u64,
    known_devices: usize,
    checks: BTreeMap<String, HealthCheck>,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
