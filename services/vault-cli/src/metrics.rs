//! Prometheus metrics for the CLI
//!
//! Client counters come from `vault_api::metrics`. The CLI adds:
//!
//! - `vault_cli_command_duration_seconds` (histogram): labels `command`, `outcome`

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "vault_cli_command_duration_seconds";
const DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Buckets span 10ms to 60s, the upper end matching the default request timeout.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record how long one command took and whether it succeeded.
pub fn record_command(command: &'static str, ok: bool, duration_secs: f64) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::histogram!(DURATION_METRIC, "command" => command, "outcome" => outcome)
        .record(duration_secs);
}
