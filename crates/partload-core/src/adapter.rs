//! Invocation adapter
//!
//! Translates an inbound event into an orchestrator run and the run's result
//! into a `{statusCode, body}` envelope.
//!
//! Status codes: `200` for success and no-data, `400` when the event carries
//! no date or a date that is not `YYYY-MM-DD`, `500` for every other
//! failure. Failure bodies carry `rows_inserted` and `committed`; a failed
//! archive step after a committed write reports `committed: true`.

use crate::error::{ErrorDetail, ErrorKind, IngestError, Stage};
use crate::pipeline::{IngestStatus, IngestionOrchestrator, IngestionResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

/// Inbound event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationEvent {
    #[serde(alias = "TARGET_DATE")]
    pub target_date: Option<String>,
}

impl InvocationEvent {
    pub fn for_date(date: impl Into<String>) -> Self {
        Self {
            target_date: Some(date.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: Value,
}

impl ResponseEnvelope {
    pub fn from_result(result: &IngestionResult, target_table: &str) -> Self {
        match result.status {
            IngestStatus::Success => Self {
                status_code: 200,
                body: json!({
                    "message": "Ingestion completed",
                    "rows_inserted": result.rows_inserted,
                    "target_date": result.target_date,
                    "target_table": target_table,
                    "archive_key": result.archive.as_ref().map(|a| a.archive_key.clone()),
                    "source_retained": result.archive.as_ref().is_some_and(|a| a.source_retained),
                    "invocation_id": result.invocation_id,
                }),
            },
            IngestStatus::NoData => Self {
                status_code: 200,
                body: json!({
                    "message": "No data found",
                    "rows_inserted": 0,
                    "target_date": result.target_date,
                    "invocation_id": result.invocation_id,
                }),
            },
            IngestStatus::Failed => {
                let detail = result.error.clone().unwrap_or_else(|| ErrorDetail {
                    kind: ErrorKind::WriteError,
                    stage: Stage::Write,
                    message: "ingestion failed without an error description".to_string(),
                    retryable: true,
                });
                let status_code = match detail.kind {
                    ErrorKind::InvalidArgument => 400,
                    _ => 500,
                };
                let mut envelope = Self::error(status_code, &detail, Some(&result.target_date));
                envelope.body["rows_inserted"] = json!(result.rows_inserted);
                envelope.body["committed"] = json!(result.committed);
                envelope
            }
        }
    }

    pub fn error(status_code: u16, detail: &ErrorDetail, target_date: Option<&str>) -> Self {
        Self {
            status_code,
            body: json!({
                "error": detail,
                "target_date": target_date,
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

pub struct InvocationAdapter {
    orchestrator: Arc<IngestionOrchestrator>,
    target_table: String,
}

impl InvocationAdapter {
    pub fn new(orchestrator: Arc<IngestionOrchestrator>) -> Self {
        let target_table = orchestrator.resolver().table().display_name();
        Self {
            orchestrator,
            target_table,
        }
    }

    pub fn orchestrator(&self) -> &Arc<IngestionOrchestrator> {
        &self.orchestrator
    }

    pub async fn handle(&self, event: InvocationEvent) -> ResponseEnvelope {
        let Some(target_date) = event.target_date else {
            let err = IngestError::InvalidArgument("event has no target_date".to_string());
            warn!(error = %err, "Rejected invocation event");
            return ResponseEnvelope::error(400, &ErrorDetail::from(&err), None);
        };
        let result = self.orchestrator.run(&target_date).await;
        ResponseEnvelope::from_result(&result, &self.target_table)
    }

    /// Decode a raw JSON event, answering 400 when it is not an event.
    pub async fn handle_json(&self, raw: Value) -> ResponseEnvelope {
        match serde_json::from_value::<InvocationEvent>(raw) {
            Ok(event) => self.handle(event).await,
            Err(e) => {
                let err = IngestError::InvalidArgument(format!("malformed event: {}", e));
                warn!(error = %err, "Rejected invocation event");
                ResponseEnvelope::error(400, &ErrorDetail::from(&err), None)
            }
        }
    }
}
