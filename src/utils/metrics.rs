use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Latency samples kept for percentile reporting
const LATENCY_WINDOW: usize = 1024;

/// Process-wide metrics collector.
///
/// Tracks vision service calls, item outcomes and batches. Cheap to clone;
/// all clones share the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Vision service calls
    api_calls_total: AtomicUsize,
    api_calls_success: AtomicUsize,
    api_calls_failed: AtomicUsize,
    api_retries: AtomicUsize,
    api_latency_ms: RwLock<VecDeque<u64>>,

    // Item outcomes
    items_succeeded: AtomicUsize,
    items_failed: AtomicUsize,

    // Batches
    batches_processed: AtomicUsize,
    batches_rejected: AtomicUsize,

    endpoint_counters: DashMap<String, AtomicUsize>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                api_calls_total: AtomicUsize::new(0),
                api_calls_success: AtomicUsize::new(0),
                api_calls_failed: AtomicUsize::new(0),
                api_retries: AtomicUsize::new(0),
                api_latency_ms: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                items_succeeded: AtomicUsize::new(0),
                items_failed: AtomicUsize::new(0),
                batches_processed: AtomicUsize::new(0),
                batches_rejected: AtomicUsize::new(0),
                endpoint_counters: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_api_call(&self, success: bool, duration: Duration) {
        self.inner.api_calls_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.inner.api_calls_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.api_calls_failed.fetch_add(1, Ordering::Relaxed);
        }

        let mut latencies = self.inner.api_latency_ms.write();
        if latencies.len() == LATENCY_WINDOW {
            latencies.pop_front();
        }
        latencies.push_back(duration.as_millis() as u64);
    }

    pub fn record_retry(&self) {
        self.inner.api_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_item(&self, success: bool) {
        if success {
            self.inner.items_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.items_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_batch_processed(&self) {
        self.inner.batches_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_rejected(&self) {
        self.inner.batches_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latencies: Vec<u64> = self.inner.api_latency_ms.read().iter().copied().collect();

        let mut endpoint_requests: Vec<(String, usize)> = self
            .inner
            .endpoint_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        endpoint_requests.sort();

        MetricsSnapshot {
            api_calls_total: self.inner.api_calls_total.load(Ordering::Relaxed),
            api_calls_success: self.inner.api_calls_success.load(Ordering::Relaxed),
            api_calls_failed: self.inner.api_calls_failed.load(Ordering::Relaxed),
            api_retries: self.inner.api_retries.load(Ordering::Relaxed),
            api_latency_avg_ms: avg(&latencies),
            api_latency_p50_ms: percentile(&latencies, 0.5),
            api_latency_p95_ms: percentile(&latencies, 0.95),
            items_succeeded: self.inner.items_succeeded.load(Ordering::Relaxed),
            items_failed: self.inner.items_failed.load(Ordering::Relaxed),
            batches_processed: self.inner.batches_processed.load(Ordering::Relaxed),
            batches_rejected: self.inner.batches_rejected.load(Ordering::Relaxed),
            endpoint_requests,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Prometheus text exposition format
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = format!(
            r#"# HELP vision_calls_total Total number of vision service calls
# TYPE vision_calls_total counter
vision_calls_total {}

# HELP vision_calls_success Number of successful vision service calls
# TYPE vision_calls_success counter
vision_calls_success {}

# HELP vision_calls_failed Number of failed vision service calls
# TYPE vision_calls_failed counter
vision_calls_failed {}

# HELP vision_retries_total Retries issued after transient failures
# TYPE vision_retries_total counter
vision_retries_total {}

# HELP vision_latency_avg_ms Average vision call latency in milliseconds
# TYPE vision_latency_avg_ms gauge
vision_latency_avg_ms {}

# HELP items_processed_total Items processed by outcome
# TYPE items_processed_total counter
items_processed_total{{outcome="success"}} {}
items_processed_total{{outcome="error"}} {}

# HELP batches_total Submissions by outcome
# TYPE batches_total counter
batches_total{{outcome="processed"}} {}
batches_total{{outcome="rejected"}} {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {}
"#,
            snapshot.api_calls_total,
            snapshot.api_calls_success,
            snapshot.api_calls_failed,
            snapshot.api_retries,
            snapshot.api_latency_avg_ms,
            snapshot.items_succeeded,
            snapshot.items_failed,
            snapshot.batches_processed,
            snapshot.batches_rejected,
            snapshot.uptime_seconds,
        );

        if !snapshot.endpoint_requests.is_empty() {
            out.push_str("\n# HELP http_requests_total Requests per endpoint\n# TYPE http_requests_total counter\n");
            for (endpoint, count) in &snapshot.endpoint_requests {
                out.push_str(&format!(
                    "http_requests_total{{endpoint=\"{}\"}} {}\n",
                    endpoint, count
                ));
            }
        }

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub api_calls_total: usize,
    pub api_calls_success: usize,
    pub api_calls_failed: usize,
    pub api_retries: usize,
    pub api_latency_avg_ms: u64,
    pub api_latency_p50_ms: u64,
    pub api_latency_p95_ms: u64,
    pub items_succeeded: usize,
    pub items_failed: usize,
    pub batches_processed: usize,
    pub batches_rejected: usize,
    pub endpoint_requests: Vec<(String, usize)>,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_api_call(true, Duration::from_millis(100));
        metrics.record_api_call(false, Duration::from_millis(50));
        metrics.record_retry();
        metrics.record_item(true);
        metrics.record_item(false);
        metrics.record_item(false);
        metrics.record_batch_processed();
        metrics.record_endpoint_request("/analyze");
        metrics.record_endpoint_request("/analyze");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.api_calls_total, 2);
        assert_eq!(snapshot.api_calls_success, 1);
        assert_eq!(snapshot.api_calls_failed, 1);
        assert_eq!(snapshot.api_retries, 1);
        assert_eq!(snapshot.api_latency_avg_ms, 75);
        assert_eq!(snapshot.items_succeeded, 1);
        assert_eq!(snapshot.items_failed, 2);
        assert_eq!(snapshot.batches_processed, 1);
        assert_eq!(snapshot.endpoint_requests, vec![("/analyze".to_string(), 2)]);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let metrics = Metrics::new();
        for _ in 0..(LATENCY_WINDOW + 10) {
            metrics.record_api_call(true, Duration::from_millis(1));
        }
        assert_eq!(metrics.inner.api_latency_ms.read().len(), LATENCY_WINDOW);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_api_call(true, Duration::from_millis(100));
        metrics.record_endpoint_request("/analyze");

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("vision_calls_total 1"));
        assert!(prometheus.contains("items_processed_total{outcome=\"success\"} 0"));
        assert!(prometheus.contains("http_requests_total{endpoint=\"/analyze\"} 1"));
    }
}
