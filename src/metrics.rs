//! Prometheus metrics for the fans service.
//!
//! Absorbed failures (cache errors, count lookups, background population)
//! never reach the caller; these counters are where they become visible.

use prometheus::{IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters registered on a private registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Pages served, by `source` (cache, store, deep, empty).
    pub requests: IntCounterVec,
    /// Absorbed range cache failures, by `op`.
    pub cache_errors: IntCounterVec,
    /// Count lookups that failed or timed out.
    pub count_lookup_failures: IntCounter,
    /// Population jobs, by `outcome` (completed, failed, panicked, dropped).
    pub populate_jobs: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("fans".to_string()), None)?;

        let requests = IntCounterVec::new(
            Opts::new("requests_total", "Fans pages served by source"),
            &["source"],
        )?;
        let cache_errors = IntCounterVec::new(
            Opts::new("cache_errors_total", "Range cache failures absorbed as misses"),
            &["op"],
        )?;
        let count_lookup_failures = IntCounter::new(
            "count_lookup_failures_total",
            "Count store lookups degraded to zero-filled counts",
        )?;
        let populate_jobs = IntCounterVec::new(
            Opts::new("populate_jobs_total", "Background cache population jobs by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(cache_errors.clone()))?;
        registry.register(Box::new(count_lookup_failures.clone()))?;
        registry.register(Box::new(populate_jobs.clone()))?;

        Ok(Self {
            registry,
            requests,
            cache_errors,
            count_lookup_failures,
            populate_jobs,
        })
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_prefixed_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.requests.with_label_values(&["cache"]).inc();
        metrics.count_lookup_failures.inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("fans_requests_total{source=\"cache\"} 1"));
        assert!(text.contains("fans_count_lookup_failures_total 1"));
    }
}
