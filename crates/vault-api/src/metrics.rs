//! Client metrics
//!
//! - `vault_api_requests_total` (counter): labels `method`, `status`
//! - `vault_api_token_refreshes_total` (counter): label `outcome`
//! - `vault_api_forced_logouts_total` (counter)
//!
//! Without an installed recorder these calls are no-ops.

/// Record a completed resource API call.
pub fn record_request(method: &str, status: u16) {
    metrics::counter!(
        "vault_api_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a refresh exchange outcome: `success`, `failure` or `unavailable`.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("vault_api_token_refreshes_total", "outcome" => outcome).increment(1);
}

pub fn record_forced_logout() {
    metrics::counter!("vault_api_forced_logouts_total").increment(1);
}
