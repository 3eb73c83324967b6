//! # audit
//!
//! §2 supplemented feature: the Elasticsearch audit sink shape from
//! `xpot/utils.go` (`{client, imei, protocol, timestamp, payload}`), kept
//! as a trait so the worker always has something to call even when
//! `ELASTIC_URL` is unset (§6) — the HTTP client itself stays an external
//! collaborator (§1).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub client: String,
    pub imei: String,
    pub protocol: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent);
}

/// No Elasticsearch URL configured (§6): every event is silently dropped.
#[derive(Debug, Default)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn record(&self, _event: &AuditEvent) {}
}

/// Writes one structured `tracing::info!` line per event instead of
/// shipping to Elasticsearch — real output, no network, useful on its own
/// for operators tailing worker logs.
#[derive(Debug, Default)]
pub struct LoggingAuditSink;

#[async_trait]
impl AuditSink for LoggingAuditSink {
    async fn record(&self, event: &AuditEvent) {
        info!(
            client = %event.client,
            imei = %event.imei,
            protocol = %event.protocol,
            timestamp = %event.timestamp.to_rfc3339(),
            payload = %event.payload,
            "audit event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn null_sink_accepts_every_event_without_panicking() {
        let sink = NullAuditSink;
        let event = AuditEvent {
            client: "bridge-worker-1".to_string(),
            imei: "864507035846483".to_string(),
            protocol: "gt06".to_string(),
            timestamp: Utc::now(),
            payload: json!({"ok": true}),
        };
        sink.record(&event).await;
    }

    #[tokio::test]
    async fn logging_sink_accepts_every_event_without_panicking() {
        let sink = LoggingAuditSink;
        let event = AuditEvent {
            client: "bridge-worker-1".to_string(),
            imei: "864507035846483".to_string(),
            protocol: "bsj".to_string(),
            timestamp: Utc::now(),
            payload: json!({"ok": true}),
        };
        sink.record(&event).await;
    }
}
