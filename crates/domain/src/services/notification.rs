//! Operator notification service.
//!
//! Provides abstractions for raising alerts to the operations channel.
//! Delivery is fire-and-forget: implementations log their own failures and
//! never report them back to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// Alert kind enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Pending requests older than the overdue threshold.
    OverdueRequests,
    /// Requests the timeout sweep moved to errored.
    TimedOutRequests,
    /// The pending backlog exceeds its threshold.
    BacklogThresholdExceeded,
    /// A background job failed a run.
    JobFailed,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::OverdueRequests => write!(f, "overdue_requests"),
            AlertKind::TimedOutRequests => write!(f, "timed_out_requests"),
            AlertKind::BacklogThresholdExceeded => write!(f, "backlog_threshold_exceeded"),
            AlertKind::JobFailed => write!(f, "job_failed"),
        }
    }
}

/// Alert payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub summary: String,
    /// Number of affected requests, or the measured value for threshold alerts.
    pub count: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_ids: Vec<Uuid>,
    pub raised_at: DateTime<Utc>,
}

impl AlertPayload {
    pub fn new(summary: impl Into<String>, count: i64, raised_at: DateTime<Utc>) -> Self {
        Self {
            summary: summary.into(),
            count,
            request_ids: Vec::new(),
            raised_at,
        }
    }

    pub fn with_request_ids(mut self, request_ids: Vec<Uuid>) -> Self {
        self.request_ids = request_ids;
        self
    }
}

/// Notifier trait for raising operator alerts.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, kind: AlertKind, payload: AlertPayload);
}

/// Notifier that only writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, kind: AlertKind, payload: AlertPayload) {
        tracing::warn!(
            alert = %kind,
            count = payload.count,
            request_ids = ?payload.request_ids,
            "{}",
            payload.summary
        );
    }
}

/// Notifier that keeps every alert it receives.
///
/// Used in tests and wherever alerts must be inspected after the fact.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<(AlertKind, AlertPayload)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<(AlertKind, AlertPayload)> {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Alerts of one kind, oldest first.
    pub fn alerts_of(&self, kind: AlertKind) -> Vec<AlertPayload> {
        self.alerts()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, p)| p)
            .collect()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, kind: AlertKind, payload: AlertPayload) {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((kind, payload));
    }
}
