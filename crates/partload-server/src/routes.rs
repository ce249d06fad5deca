//! HTTP routes
//!
//! `POST /invoke` runs one ingestion and answers with the invocation envelope;
//! the HTTP status mirrors the envelope's `statusCode`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use partload_core::error::ErrorDetail;
use partload_core::{ErrorKind, InvocationAdapter, InvocationEvent, ResponseEnvelope};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

use crate::middleware;

#[derive(Clone)]
pub struct AppState {
    adapter: Arc<InvocationAdapter>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl AppState {
    pub fn new(adapter: Arc<InvocationAdapter>) -> Self {
        Self {
            adapter,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claim `date`; `None` when another request already holds it.
    fn claim(&self, date: &str) -> Option<InFlight> {
        let mut running = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        running.insert(date.to_string()).then(|| InFlight {
            date: date.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }
}

/// Releases its date when dropped, including when the request is cancelled.
struct InFlight {
    date: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.date);
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/invoke", post(invoke))
        .route("/pending", get(pending))
        .route("/partitions/:date", get(partition_status))
        .with_state(state)
        .layer(middleware::tracing_layer())
}

fn envelope_response(envelope: ResponseEnvelope) -> Response {
    let status =
        StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(envelope)).into_response()
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn invoke(State(state): State<AppState>, Json(raw): Json<Value>) -> Response {
    let date = serde_json::from_value::<InvocationEvent>(raw.clone())
        .ok()
        .and_then(|event| event.target_date);

    let Some(date) = date else {
        // malformed or dateless events are answered by the adapter
        return envelope_response(state.adapter.handle_json(raw).await);
    };

    let Some(_claim) = state.claim(&date) else {
        warn!(target_date = %date, "Ingestion already running for date");
        return envelope_response(ResponseEnvelope {
            status_code: StatusCode::CONFLICT.as_u16(),
            body: json!({
                "message": "Ingestion already running for this date",
                "target_date": date,
            }),
        });
    };

    envelope_response(state.adapter.handle(InvocationEvent::for_date(date)).await)
}

async fn pending(State(state): State<AppState>) -> Response {
    match state.adapter.orchestrator().pending_dates().await {
        Ok(dates) => {
            let dates: Vec<String> = dates.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect();
            (StatusCode::OK, Json(json!({ "pending": dates }))).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to list pending sources");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": ErrorDetail::from(&e) })),
            )
                .into_response()
        }
    }
}

async fn partition_status(State(state): State<AppState>, Path(date): Path<String>) -> Response {
    match state.adapter.orchestrator().partition_status(&date).await {
        Ok((key, rows)) => (
            StatusCode::OK,
            Json(json!({
                "table": key.table.display_name(),
                "partition_column": key.column,
                "target_date": key.value_string(),
                "rows": rows,
            })),
        )
            .into_response(),
        Err(e) => {
            let detail = ErrorDetail::from(&e);
            let status = match detail.kind {
                ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
                _ => StatusCode::SERVICE_UNAVAILABLE,
            };
            (status, Json(json!({ "error": detail }))).into_response()
        }
    }
}
