//! Prometheus metrics exposition
//!
//! Registered series:
//!
//! - `search_requests_total` (counter): labels `op`, `outcome`
//! - `upstream_request_duration_seconds` (histogram): label `op`
//! - `quota_units_consumed_total` (counter): label `op`
//! - `pool_exhausted_total` (counter)
//! - `ad_plays_total` (counter): label `kind`

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering.
///
/// Explicit buckets make `upstream_request_duration_seconds` render as a
/// true histogram (`_bucket` lines usable with `histogram_quantile()`)
/// instead of the default summary. The range covers fast cache-adjacent
/// answers up to the configured upstream timeout ceiling.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "upstream_request_duration_seconds".to_string(),
            ),
            &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed gateway request with its outcome label.
pub fn record_search(op: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!("search_requests_total", "op" => op.to_string(), "outcome" => outcome.to_string())
        .increment(1);
    metrics::histogram!("upstream_request_duration_seconds", "op" => op.to_string())
        .record(duration_secs);
}

/// Record quota units charged against the pool.
pub fn record_quota_units(op: &str, units: u64) {
    metrics::counter!("quota_units_consumed_total", "op" => op.to_string()).increment(units);
}

/// Record an acquire() that found no usable credential.
pub fn record_pool_exhausted() {
    metrics::counter!("pool_exhausted_total").increment(1);
}

/// Record a counted ad play.
pub fn record_ad_play(kind: &str) {
    metrics::counter!("ad_plays_total", "kind" => kind.to_string()).increment(1);
}
