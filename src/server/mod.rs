use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::agent::router::{EntityRouter, Routed};
use crate::export::health::HealthMetrics;
use crate::sensor::{RawValue, ReportedExtrema};

/// HTTP server for state ingestion, sensor status, `/metrics` and
/// `/healthz`.
pub struct Server {
    addr: String,
    shutdown: parking_lot::Mutex<Option<CancellationToken>>,
}

/// Shared state for axum handlers.
struct AppState {
    router: Arc<EntityRouter>,
    health: Arc<HealthMetrics>,
}

/// Body of `POST /api/states/{entity_id}`.
#[derive(Debug, Deserialize)]
pub struct StateUpdate {
    pub state: RawValue,
    /// Time of the change; defaults to the time of receipt.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// One entry of `GET /api/sensors`.
#[derive(Debug, Serialize)]
pub struct SensorStatus {
    pub sensor: Arc<str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    pub entity_id: Vec<Arc<str>>,
    pub buffered_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_entity_id: Option<Arc<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_entity_id: Option<Arc<str>>,
}

impl Server {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            shutdown: parking_lot::Mutex::new(None),
        }
    }

    /// Binds the listener and serves in the background. Returns the bound
    /// address.
    pub async fn start(
        &self,
        router: Arc<EntityRouter>,
        health: Arc<HealthMetrics>,
    ) -> Result<SocketAddr> {
        let addr = if self.addr.is_empty() {
            ":8080"
        } else {
            &self.addr
        };

        // Parse address, handling ":port" shorthand.
        let bind_addr = if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        };

        let app = app(Arc::new(AppState { router, health }));

        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("listening on {bind_addr}"))?;

        let local_addr = listener.local_addr().context("getting local address")?;

        let cancel = CancellationToken::new();
        *self.shutdown.lock() = Some(cancel.clone());

        tokio::spawn(async move {
            tracing::info!(addr = %local_addr, "HTTP server started");

            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    cancel.cancelled().await;
                })
                .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        });

        Ok(local_addr)
    }

    /// Gracefully shuts down the server.
    pub async fn stop(&self) -> Result<()> {
        if let Some(cancel) = self.shutdown.lock().take() {
            cancel.cancel();
        }

        Ok(())
    }
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/states/{entity_id}", post(ingest_handler))
        .route("/api/sensors", get(sensors_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(state)
}

/// POST /api/states/{entity_id} - Route a state change to its sensors.
async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(update): Json<StateUpdate>,
) -> Response {
    let timestamp = update.last_updated.unwrap_or_else(Utc::now);

    match state.router.ingest(&entity_id, timestamp, &update.state) {
        Routed::Accepted(sensors) => {
            (StatusCode::ACCEPTED, Json(json!({ "accepted": sensors }))).into_response()
        }
        Routed::Dropped => (StatusCode::OK, Json(json!({ "accepted": 0 }))).into_response(),
        Routed::Rejected(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
        Routed::UnknownEntity => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no sensor subscribes to {entity_id}") })),
        )
            .into_response(),
    }
}

/// GET /api/sensors - Current value of every sensor.
async fn sensors_handler(State(state): State<Arc<AppState>>) -> Json<Vec<SensorStatus>> {
    let statuses = state
        .router
        .sensors()
        .iter()
        .map(|sensor| {
            let snapshot = sensor.snapshot();
            let extrema = match &snapshot.reported_extrema {
                ReportedExtrema::Tracked(Some(e)) => Some(e.clone()),
                _ => None,
            };

            SensorStatus {
                sensor: Arc::clone(&snapshot.info.id),
                friendly_name: snapshot.info.friendly_name.clone(),
                value: snapshot.value,
                unit_of_measurement: snapshot.info.unit_of_measurement.clone(),
                entity_id: snapshot.info.entities.clone(),
                buffered_samples: snapshot.buffered_samples,
                min_value: extrema.as_ref().map(|e| e.min.value),
                min_entity_id: extrema.as_ref().map(|e| Arc::clone(&e.min.source)),
                max_value: extrema.as_ref().map(|e| e.max.value),
                max_entity_id: extrema.as_ref().map(|e| Arc::clone(&e.max.source)),
            }
        })
        .collect();

    Json(statuses)
}

/// GET /metrics - Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.health.render() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            tracing::error!(error = %e, "encoding metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encoding error".to_string(),
            )
        }
    }
}

/// GET /healthz - Simple health check.
async fn healthz_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::sensor::{AverageSensor, SensorInfo, SensorSettings};

    async fn start_server() -> (Server, String, Arc<EntityRouter>) {
        let health = Arc::new(HealthMetrics::new().expect("metrics"));
        let mut settings = SensorSettings::new(SensorInfo::new("house_power", ["sensor.a"]));
        settings.extremas = true;
        let sensor = Arc::new(AverageSensor::new(settings).expect("sensor"));
        let router = Arc::new(EntityRouter::new(vec![sensor], Arc::clone(&health)));

        let server = Server::new("127.0.0.1:0");
        let addr = server
            .start(Arc::clone(&router), health)
            .await
            .expect("start server");

        (server, format!("http://{addr}"), router)
    }

    async fn post_state(base: &str, entity: &str, body: Value) -> (StatusCode, Value) {
        let resp = reqwest::Client::new()
            .post(format!("{base}/api/states/{entity}"))
            .json(&body)
            .send()
            .await
            .expect("request");
        let status = StatusCode::from_u16(resp.status().as_u16()).expect("status");
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_ingest_status_codes() {
        let (server, base, router) = start_server().await;

        let (status, body) = post_state(&base, "sensor.a", json!({ "state": "12.5" })).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["accepted"], 1);

        let (status, _) = post_state(
            &base,
            "sensor.a",
            json!({ "state": 14, "last_updated": "2024-01-01T00:00:30Z" }),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, _) = post_state(&base, "sensor.a", json!({ "state": "unknown" })).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = post_state(&base, "sensor.a", json!({ "state": "abc" })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap_or("").contains("not a number"));

        let (status, _) = post_state(&base, "sensor.z", json!({ "state": 1 })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let sensor = router.sensor("house_power").expect("sensor");
        assert_eq!(sensor.snapshot().buffered_samples, 2);

        server.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn test_sensors_metrics_and_health() {
        let (server, base, router) = start_server().await;
        let client = reqwest::Client::new();

        let sensor = router.sensor("house_power").expect("sensor");
        sensor.restore(Some("7.5")).expect("restore");

        let sensors: Value = client
            .get(format!("{base}/api/sensors"))
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(sensors[0]["sensor"], "house_power");
        assert_eq!(sensors[0]["value"], 7.5);
        assert_eq!(sensors[0]["entity_id"][0], "sensor.a");

        let health = client
            .get(format!("{base}/healthz"))
            .send()
            .await
            .expect("request")
            .text()
            .await
            .expect("text");
        assert_eq!(health, "ok");

        post_state(&base, "sensor.a", json!({ "state": 3 })).await;
        let metrics = client
            .get(format!("{base}/metrics"))
            .send()
            .await
            .expect("request")
            .text()
            .await
            .expect("text");
        assert!(metrics.contains("tw_average_samples_ingested_total{sensor=\"house_power\"} 1"));

        server.stop().await.expect("stop");
    }
}
