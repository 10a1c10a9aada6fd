//! The standard pipeline behaviors.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{error, Instrument};

use super::dispatcher::DomainEventDispatcher;
use super::validators::{standard_validators, RequestValidator};
use super::{redact, Handled, Next, PipelineBehavior, Request, RequestKind};
use crate::domain::error::{PortalError, Result};
use crate::metrics::METRICS;
use crate::obs;

const GENERIC_UNEXPECTED: &str = "An unexpected error occurred";

/// Deployment mode. Only development exposes unexpected-error details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortalEnv {
    Development,
    #[default]
    Production,
}

impl PortalEnv {
    /// Read `ARMPORTAL_ENV`; anything but `development` is production.
    pub fn from_env() -> Self {
        match std::env::var("ARMPORTAL_ENV").as_deref() {
            Ok("development") => PortalEnv::Development,
            _ => PortalEnv::Production,
        }
    }

    pub fn exposes_details(&self) -> bool {
        *self == PortalEnv::Development
    }
}

// ---------------------------------------------------------------------------
// ExceptionHandling
// ---------------------------------------------------------------------------

/// Outermost behavior. Expected errors pass through untouched; unexpected
/// errors and panics are logged once here and genericized.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionHandlingBehavior {
    env: PortalEnv,
}

impl ExceptionHandlingBehavior {
    pub fn new(env: PortalEnv) -> Self {
        Self { env }
    }

    fn unexpected(&self, kind: RequestKind, detail: String) -> PortalError {
        error!(
            event = "request.unexpected",
            request_type = %kind,
            detail = %detail,
            "unhandled error in request pipeline"
        );
        if self.env.exposes_details() {
            PortalError::unexpected(detail)
        } else {
            PortalError::unexpected(GENERIC_UNEXPECTED)
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}

#[async_trait]
impl PipelineBehavior for ExceptionHandlingBehavior {
    fn name(&self) -> &'static str {
        "exception-handling"
    }

    async fn handle(&self, request: &Request, next: Next<'_>) -> Result<Handled> {
        let kind = request.kind();
        match AssertUnwindSafe(next.run(request)).catch_unwind().await {
            Ok(Ok(handled)) => Ok(handled),
            Ok(Err(e)) if e.is_expected() => Err(e),
            Ok(Err(e)) => Err(self.unexpected(kind, e.to_string())),
            Err(panic) => Err(self.unexpected(kind, panic_message(panic))),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logs request type, redacted payload, duration and outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingBehavior;

#[async_trait]
impl PipelineBehavior for LoggingBehavior {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(&self, request: &Request, next: Next<'_>) -> Result<Handled> {
        let kind = request.kind();
        obs::emit_request_started(kind.as_str(), &redact(&request.payload()));

        let started = Instant::now();
        let result = next
            .run(request)
            .instrument(obs::request_span(kind.as_str()))
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => {
                METRICS.inc_requests_handled();
                obs::emit_request_finished(kind.as_str(), duration_ms, true);
            }
            Err(e) => {
                METRICS.inc_requests_failed();
                obs::emit_request_failed(kind.as_str(), duration_ms, e);
                obs::emit_request_finished(kind.as_str(), duration_ms, false);
            }
        }
        result
    }
}

// ---------------------------------------------------------------------------
// DomainEvent
// ---------------------------------------------------------------------------

/// Dispatches the events a successful handler returned, then clears them.
pub struct DomainEventBehavior {
    dispatcher: Arc<DomainEventDispatcher>,
}

impl DomainEventBehavior {
    pub fn new(dispatcher: Arc<DomainEventDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl PipelineBehavior for DomainEventBehavior {
    fn name(&self) -> &'static str {
        "domain-event"
    }

    async fn handle(&self, request: &Request, next: Next<'_>) -> Result<Handled> {
        let mut handled = next.run(request).await?;
        let events = std::mem::take(&mut handled.events);
        self.dispatcher.dispatch_all(&events).await;
        Ok(handled)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Runs the validator registered for the request kind, if any.
#[derive(Default)]
pub struct ValidationBehavior {
    validators: HashMap<RequestKind, Arc<dyn RequestValidator>>,
}

impl ValidationBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validators for every built-in request kind.
    pub fn standard() -> Self {
        let mut behavior = Self::new();
        for (kind, validator) in standard_validators() {
            behavior = behavior.with_validator(kind, validator);
        }
        behavior
    }

    pub fn with_validator(mut self, kind: RequestKind, validator: Arc<dyn RequestValidator>) -> Self {
        self.validators.insert(kind, validator);
        self
    }

    pub fn has_validator(&self, kind: RequestKind) -> bool {
        self.validators.contains_key(&kind)
    }
}

#[async_trait]
impl PipelineBehavior for ValidationBehavior {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn handle(&self, request: &Request, next: Next<'_>) -> Result<Handled> {
        if let Some(validator) = self.validators.get(&request.kind()) {
            let errors = validator.validate(request);
            if !errors.is_empty() {
                return Err(PortalError::validation("Validation failed", errors));
            }
        }
        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{GetJobQuery, ListJobsQuery};
    use crate::domain::job::Job;
    use crate::mediator::{Mediator, RequestHandler, Response};

    struct Panicking;

    #[async_trait]
    impl RequestHandler for Panicking {
        async fn handle(&self, _request: &Request) -> Result<Handled> {
            panic!("handler exploded")
        }
    }

    struct Failing(PortalError);

    #[async_trait]
    impl RequestHandler for Failing {
        async fn handle(&self, _request: &Request) -> Result<Handled> {
            Err(self.0.clone())
        }
    }

    struct Jobs;

    #[async_trait]
    impl RequestHandler for Jobs {
        async fn handle(&self, _request: &Request) -> Result<Handled> {
            Ok(Handled::new(Response::Jobs(vec![Job::default()])))
        }
    }

    fn mediator(env: PortalEnv, kind: RequestKind, handler: Arc<dyn RequestHandler>) -> Mediator {
        let mut m = Mediator::new();
        m.add_behavior(Arc::new(ExceptionHandlingBehavior::new(env)))
            .add_behavior(Arc::new(LoggingBehavior))
            .add_behavior(Arc::new(ValidationBehavior::standard()))
            .register_handler(kind, handler);
        m
    }

    #[test]
    fn portal_env_defaults_to_production() {
        assert_eq!(PortalEnv::default(), PortalEnv::Production);
        assert!(!PortalEnv::Production.exposes_details());
        assert!(PortalEnv::Development.exposes_details());
    }

    #[tokio::test]
    async fn panics_become_generic_unexpected_errors() {
        let m = mediator(PortalEnv::Production, RequestKind::ListJobs, Arc::new(Panicking));
        let err = m
            .send(Request::ListJobs(ListJobsQuery::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_string(), GENERIC_UNEXPECTED);
    }

    #[tokio::test]
    async fn development_exposes_unexpected_details() {
        let failing = Failing(PortalError::unexpected("disk on fire"));
        let m = mediator(PortalEnv::Development, RequestKind::ListJobs, Arc::new(failing));
        let err = m
            .send(Request::ListJobs(ListJobsQuery::default()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[tokio::test]
    async fn expected_errors_pass_through_unchanged() {
        let failing = Failing(PortalError::not_found("Pull request #9 not found"));
        let m = mediator(PortalEnv::Production, RequestKind::GetJob, Arc::new(failing));
        let err = m
            .send(Request::GetJob(GetJobQuery { pr_number: 9 }))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "Pull request #9 not found");
    }

    #[tokio::test]
    async fn validation_blocks_the_handler() {
        let m = mediator(PortalEnv::Production, RequestKind::GetJob, Arc::new(Panicking));
        let err = m
            .send(Request::GetJob(GetJobQuery { pr_number: 0 }))
            .await
            .unwrap_err();
        match err {
            PortalError::Validation { errors, .. } => assert_eq!(errors[0].field, "prNumber"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_counts_as_handled() {
        let m = mediator(PortalEnv::Production, RequestKind::ListJobs, Arc::new(Jobs));
        let before = METRICS.requests_handled();
        let response = m.send(Request::ListJobs(ListJobsQuery::default())).await.unwrap();
        assert!(matches!(response, Response::Jobs(jobs) if jobs.len() == 1));
        assert!(METRICS.requests_handled() > before);
    }
}
