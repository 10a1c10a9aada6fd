//! Request mediator.
//!
//! Routes each [`Request`] to the handler registered for its kind, through
//! an ordered chain of [`PipelineBehavior`]s. The first behavior added is
//! the outermost: it sees the request first and the result last.
//!
//! ```text
//! send(request)
//!   └─ ExceptionHandling
//!        └─ Logging
//!             └─ DomainEvent
//!                  └─ Validation
//!                       └─ handler
//! ```

pub mod behaviors;
pub mod dispatcher;
pub mod validators;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::commands::{
    DestroyResourceCommand, GetJobQuery, ListJobsQuery, PreviewBlueprintQuery, PreviewOutcome,
    PromoteResourceCommand, ProvisionBlueprintCommand,
};
use crate::domain::error::{PortalError, Result};
use crate::domain::events::DomainEvent;
use crate::domain::job::Job;
use crate::domain::promotion::PromotionOutcome;
use crate::domain::provision::ProvisionOutcome;
use crate::domain::submission::DestroyOutcome;

pub use behaviors::{
    DomainEventBehavior, ExceptionHandlingBehavior, LoggingBehavior, PortalEnv, ValidationBehavior,
};
pub use dispatcher::{DomainEventDispatcher, DomainEventHandler, LoggingEventHandler};
pub use validators::RequestValidator;

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// Every request the mediator understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ProvisionBlueprint(ProvisionBlueprintCommand),
    PromoteResource(PromoteResourceCommand),
    DestroyResource(DestroyResourceCommand),
    GetJob(GetJobQuery),
    ListJobs(ListJobsQuery),
    PreviewBlueprint(PreviewBlueprintQuery),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestKind {
    ProvisionBlueprint,
    PromoteResource,
    DestroyResource,
    GetJob,
    ListJobs,
    PreviewBlueprint,
}

impl RequestKind {
    pub const ALL: [RequestKind; 6] = [
        RequestKind::ProvisionBlueprint,
        RequestKind::PromoteResource,
        RequestKind::DestroyResource,
        RequestKind::GetJob,
        RequestKind::ListJobs,
        RequestKind::PreviewBlueprint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::ProvisionBlueprint => "ProvisionBlueprintCommand",
            RequestKind::PromoteResource => "PromoteResourceCommand",
            RequestKind::DestroyResource => "DestroyResourceCommand",
            RequestKind::GetJob => "GetJobQuery",
            RequestKind::ListJobs => "ListJobsQuery",
            RequestKind::PreviewBlueprint => "PreviewBlueprintQuery",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::ProvisionBlueprint(_) => RequestKind::ProvisionBlueprint,
            Request::PromoteResource(_) => RequestKind::PromoteResource,
            Request::DestroyResource(_) => RequestKind::DestroyResource,
            Request::GetJob(_) => RequestKind::GetJob,
            Request::ListJobs(_) => RequestKind::ListJobs,
            Request::PreviewBlueprint(_) => RequestKind::PreviewBlueprint,
        }
    }

    /// The request body as JSON, unredacted.
    pub fn payload(&self) -> Value {
        let value = match self {
            Request::ProvisionBlueprint(c) => serde_json::to_value(c),
            Request::PromoteResource(c) => serde_json::to_value(c),
            Request::DestroyResource(c) => serde_json::to_value(c),
            Request::GetJob(q) => serde_json::to_value(q),
            Request::ListJobs(q) => serde_json::to_value(q),
            Request::PreviewBlueprint(q) => serde_json::to_value(q),
        };
        value.unwrap_or(Value::Null)
    }

    /// Error for a handler that received a request of the wrong kind.
    pub fn mismatch(&self, expected: RequestKind) -> PortalError {
        PortalError::unexpected(format!(
            "{expected} handler received {}",
            self.kind().as_str()
        ))
    }
}

const SENSITIVE_KEYS: [&str; 3] = ["password", "token", "secret"];

/// Replace the value of every key that mentions a password, token or
/// secret, at any depth.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let lower = k.to_ascii_lowercase();
                    if SENSITIVE_KEYS.iter().any(|s| lower.contains(s)) {
                        (k.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (k.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// Successful handler outcomes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Provisioned(ProvisionOutcome),
    Promoted(PromotionOutcome),
    Destroyed(DestroyOutcome),
    Job(Box<Job>),
    Jobs(Vec<Job>),
    Preview(Box<PreviewOutcome>),
}

/// A handler's response plus the domain events its entity raised.
#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    pub response: Response,
    pub events: Vec<DomainEvent>,
}

impl Handled {
    pub fn new(response: Response) -> Self {
        Self {
            response,
            events: Vec::new(),
        }
    }

    pub fn with_events(response: Response, events: Vec<DomainEvent>) -> Self {
        Self { response, events }
    }
}

// ---------------------------------------------------------------------------
// Handlers and behaviors
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: &Request) -> Result<Handled>;
}

/// Builds a handler for each request.
pub type HandlerFactory = Arc<dyn Fn() -> Arc<dyn RequestHandler> + Send + Sync>;

/// A cross-cutting step wrapped around every handler.
#[async_trait]
pub trait PipelineBehavior: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, request: &Request, next: Next<'_>) -> Result<Handled>;
}

/// The remainder of the pipeline below the current behavior.
pub struct Next<'a> {
    behaviors: &'a [Arc<dyn PipelineBehavior>],
    handler: &'a dyn RequestHandler,
}

impl<'a> Next<'a> {
    pub fn new(behaviors: &'a [Arc<dyn PipelineBehavior>], handler: &'a dyn RequestHandler) -> Self {
        Self { behaviors, handler }
    }

    pub fn run(self, request: &'a Request) -> BoxFuture<'a, Result<Handled>> {
        match self.behaviors.split_first() {
            Some((behavior, rest)) => behavior.handle(request, Next::new(rest, self.handler)),
            None => self.handler.handle(request),
        }
    }
}

// ---------------------------------------------------------------------------
// Mediator
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Mediator {
    handlers: HashMap<RequestKind, HandlerFactory>,
    behaviors: Vec<Arc<dyn PipelineBehavior>>,
}

impl Mediator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mediator with the standard behavior stack.
    pub fn standard(dispatcher: Arc<DomainEventDispatcher>, env: PortalEnv) -> Self {
        let mut mediator = Self::new();
        mediator
            .add_behavior(Arc::new(ExceptionHandlingBehavior::new(env)))
            .add_behavior(Arc::new(LoggingBehavior))
            .add_behavior(Arc::new(DomainEventBehavior::new(dispatcher)))
            .add_behavior(Arc::new(ValidationBehavior::standard()));
        mediator
    }

    pub fn register<F>(&mut self, kind: RequestKind, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn RequestHandler> + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(factory));
        self
    }

    /// Register a shared handler instance.
    pub fn register_handler(&mut self, kind: RequestKind, handler: Arc<dyn RequestHandler>) -> &mut Self {
        self.register(kind, move || handler.clone())
    }

    pub fn add_behavior(&mut self, behavior: Arc<dyn PipelineBehavior>) -> &mut Self {
        self.behaviors.push(behavior);
        self
    }

    pub fn has_handler(&self, kind: RequestKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn registered_requests(&self) -> Vec<RequestKind> {
        RequestKind::ALL
            .into_iter()
            .filter(|k| self.handlers.contains_key(k))
            .collect()
    }

    pub fn behavior_names(&self) -> Vec<&'static str> {
        self.behaviors.iter().map(|b| b.name()).collect()
    }

    /// Run the request through the pipeline, keeping any events the
    /// behaviors did not drain.
    pub async fn send_handled(&self, request: Request) -> Result<Handled> {
        let kind = request.kind();
        let factory = self
            .handlers
            .get(&kind)
            .ok_or_else(|| PortalError::HandlerNotRegistered {
                request_type: kind.as_str().to_string(),
            })?;
        let handler = factory();
        Next::new(&self.behaviors, handler.as_ref())
            .run(&request)
            .await
    }

    pub async fn send(&self, request: Request) -> Result<Response> {
        self.send_handled(request).await.map(|h| h.response)
    }
}
