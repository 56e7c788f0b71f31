//! Metrics collection for the API service.
//!
//! Metrics live in a registry owned by [`ServiceMetrics`] rather than the
//! process-global default registry, so several service instances (and tests)
//! can coexist in one process.

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;

/// Service metrics for observability
#[derive(Debug)]
pub struct ServiceMetrics {
    registry: Registry,

    pub trigger_requests_total: IntCounter,
    pub trigger_failures_total: IntCounter,
    pub messages_published_total: IntCounter,
    pub batches_sent_total: IntCounter,
    pub publish_duration_seconds: Histogram,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new_custom(Some("queue_producer".to_string()), None)?;

        let trigger_requests_total = IntCounter::new(
            "trigger_requests_total",
            "Total producer trigger requests received",
        )?;
        let trigger_failures_total = IntCounter::new(
            "trigger_failures_total",
            "Producer trigger requests that did not publish every message",
        )?;
        let messages_published_total = IntCounter::new(
            "messages_published_total",
            "Messages delivered to the queue",
        )?;
        let batches_sent_total =
            IntCounter::new("batches_sent_total", "Message batches sent to the queue")?;
        let publish_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "publish_duration_seconds",
                "Time to build and publish the messages of one trigger",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;

        registry.register(Box::new(trigger_requests_total.clone()))?;
        registry.register(Box::new(trigger_failures_total.clone()))?;
        registry.register(Box::new(messages_published_total.clone()))?;
        registry.register(Box::new(batches_sent_total.clone()))?;
        registry.register(Box::new(publish_duration_seconds.clone()))?;

        Ok(Arc::new(Self {
            registry,
            trigger_requests_total,
            trigger_failures_total,
            messages_published_total,
            batches_sent_total,
            publish_duration_seconds,
        }))
    }

    pub fn record_trigger_success(&self, duration: Duration, messages_sent: usize, batches_sent: usize) {
        self.trigger_requests_total.inc();
        self.publish_duration_seconds.observe(duration.as_secs_f64());
        self.messages_published_total.inc_by(messages_sent as u64);
        self.batches_sent_total.inc_by(batches_sent as u64);
    }

    /// Record a failed trigger; messages sent before the failure still count
    pub fn record_trigger_failure(&self, duration: Duration, messages_sent: usize) {
        self.trigger_requests_total.inc();
        self.trigger_failures_total.inc();
        self.publish_duration_seconds.observe(duration.as_secs_f64());
        self.messages_published_total.inc_by(messages_sent as u64);
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}
