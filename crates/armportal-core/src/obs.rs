//! Structured observability hooks for the request pipeline and workflows.
//!
//! This module provides:
//! - A request-scoped tracing span for use with `Instrument`
//! - Emission functions for key lifecycle events: request start/finish,
//!   policy evaluation, pull request creation, event dispatch
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).

use tracing::{info, warn};

/// Span covering one request's trip through the pipeline.
///
/// ```ignore
/// next.run(request).instrument(obs::request_span("GetJobQuery")).await
/// ```
pub fn request_span(request_type: &str) -> tracing::Span {
    tracing::info_span!("armportal.request", request_type = %request_type)
}

/// Emit event: request entered the pipeline. `payload` is already redacted.
pub fn emit_request_started(request_type: &str, payload: &serde_json::Value) {
    info!(event = "request.started", request_type = %request_type, payload = %payload);
}

/// Emit event: request left the pipeline.
pub fn emit_request_finished(request_type: &str, duration_ms: u64, success: bool) {
    info!(
        event = "request.finished",
        request_type = %request_type,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: request failed with an expected error.
pub fn emit_request_failed(request_type: &str, duration_ms: u64, error: &dyn std::fmt::Display) {
    warn!(
        event = "request.failed",
        request_type = %request_type,
        duration_ms = duration_ms,
        error = %error,
    );
}

/// Emit event: policy evaluation finished.
pub fn emit_policy_evaluated(
    blueprint_id: &str,
    environment: &str,
    valid: bool,
    errors: usize,
    warnings: usize,
) {
    info!(
        event = "policy.evaluated",
        blueprint_id = %blueprint_id,
        environment = %environment,
        valid = valid,
        errors = errors,
        warnings = warnings,
    );
}

/// Emit event: a pull request was opened on the git host.
pub fn emit_pr_opened(number: u64, branch: &str, url: &str) {
    info!(event = "pr.opened", pr_number = number, branch = %branch, url = %url);
}

/// Emit event: a domain event was handed to its handlers.
pub fn emit_event_dispatched(event_type: &str, handlers: usize) {
    info!(event = "event.dispatched", event_type = %event_type, handlers = handlers);
}

/// Emit event: an event handler failed; the failure is swallowed.
pub fn emit_event_handler_failed(event_type: &str, handler: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "event.handler_failed",
        event_type = %event_type,
        handler = %handler,
        error = %error,
    );
}

/// Emit event: a best-effort cache write failed.
pub fn emit_cache_write_failed(key: &str, error: &dyn std::fmt::Display) {
    warn!(event = "cache.write_failed", key = %key, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitters_do_not_panic_without_subscriber() {
        let _span = request_span("GetJobQuery").entered();
        emit_request_started("GetJobQuery", &serde_json::json!({"prNumber": 1}));
        emit_request_finished("GetJobQuery", 3, true);
        emit_request_failed("GetJobQuery", 3, &"not found");
        emit_policy_evaluated("azure-rg-basic", "dev", true, 0, 1);
        emit_pr_opened(12, "requests/dev/x", "https://example.test/pull/12");
        emit_event_dispatched("ResourceDestroyedEvent", 1);
        emit_event_handler_failed("ResourceDestroyedEvent", "audit", &"boom");
        emit_cache_write_failed("pr:details:12", &"full");
    }
}
