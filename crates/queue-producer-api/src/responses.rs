//! Response types for the API.

use chrono::{DateTime, Utc};
use queue_producer_core::PublishReport;
use serde::Serialize;

/// Producer trigger response
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub status: String,
    pub queue: String,
    pub messages_sent: usize,
    pub batches_sent: usize,
}

impl From<PublishReport> for TriggerResponse {
    fn from(report: PublishReport) -> Self {
        Self {
            status: "sent".to_string(),
            queue: report.queue_name.to_string(),
            messages_sent: report.messages_sent,
            batches_sent: report.batches_sent,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub queue: String,
    pub timestamp: DateTime<Utc>,
}
