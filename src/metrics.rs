//! Bridge counters exported in Prometheus text format

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct BridgeMetrics {
    pub requests_total: AtomicU64,
    pub test_requests_total: AtomicU64,
    pub deliveries_total: AtomicU64,
    pub timeouts_total: AtomicU64,
    pub publish_failures_total: AtomicU64,
    pub cancelled_total: AtomicU64,
    pub active_workers: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub test_requests_total: u64,
    pub deliveries_total: u64,
    pub timeouts_total: u64,
    pub publish_failures_total: u64,
    pub cancelled_total: u64,
    pub active_workers: u64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_test_request(&self) {
        self.test_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.deliveries_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_finished(&self) {
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            test_requests_total: self.test_requests_total.load(Ordering::Relaxed),
            deliveries_total: self.deliveries_total.load(Ordering::Relaxed),
            timeouts_total: self.timeouts_total.load(Ordering::Relaxed),
            publish_failures_total: self.publish_failures_total.load(Ordering::Relaxed),
            cancelled_total: self.cancelled_total.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::Relaxed),
        }
    }

    /// Render all counters as Prometheus exposition text
    pub fn to_prometheus_format(&self) -> String {
        let s = self.snapshot();
        let rows: [(&str, &str, &str, u64); 7] = [
            ("rng_requests_total", "counter", "Random number requests accepted", s.requests_total),
            ("rng_test_requests_total", "counter", "Diagnostic requests accepted", s.test_requests_total),
            ("rng_deliveries_total", "counter", "Random numbers published", s.deliveries_total),
            ("rng_timeouts_total", "counter", "Requests that hit the deadline", s.timeouts_total),
            ("rng_publish_failures_total", "counter", "Publishes rejected by the bus", s.publish_failures_total),
            ("rng_cancelled_total", "counter", "Workers cancelled by shutdown", s.cancelled_total),
            ("rng_active_workers", "gauge", "Workers currently waiting or publishing", s.active_workers),
        ];

        let mut out = String::new();
        for (name, kind, help, value) in rows {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} {}", name, kind);
            let _ = writeln!(out, "{} {}", name, value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = BridgeMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_delivery();
        metrics.worker_started();
        metrics.worker_started();
        metrics.worker_finished();

        let s = metrics.snapshot();
        assert_eq!(s.requests_total, 2);
        assert_eq!(s.deliveries_total, 1);
        assert_eq!(s.active_workers, 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = BridgeMetrics::new();
        metrics.record_timeout();

        let text = metrics.to_prometheus_format();
        assert!(text.contains("# TYPE rng_timeouts_total counter"));
        assert!(text.contains("rng_timeouts_total 1"));
        assert!(text.contains("rng_active_workers 0"));
    }
}
