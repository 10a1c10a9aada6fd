//! ARM Portal Core Library
//!
//! Domain model, policy engine, IaC renderers and the request mediator
//! shared by the GitOps client, the workflows and the CLI.

pub mod cache;
pub mod commands;
pub mod domain;
pub mod mediator;
pub mod metrics;
pub mod obs;
pub mod policy;
pub mod render;
pub mod telemetry;

pub use cache::{cache_evict, cache_get, cache_put, Cache, MemoryCache};

pub use commands::{
    DestroyResourceCommand, GetJobQuery, ListJobsQuery, PreviewBlueprintQuery, PreviewOutcome,
    PromoteResourceCommand, ProvisionBlueprintCommand,
};

pub use domain::{
    Blueprint, BlueprintCatalog, DestroyMethod, DestroyOutcome, DestroySubmission, DomainEvent,
    DomainEventKind, Environment, ErrorBody, FieldError, Job, JobStatus, PolicyIssue,
    PortalError, PromotionOutcome, PromotionRequest, PromotionSubmission, Provider,
    ProvisionOutcome, ProvisionRequest, Rejected, Result, Severity, StageStatus, Submission,
    Variables,
};

pub use mediator::{
    DomainEventDispatcher, DomainEventHandler, Handled, HandlerFactory, Mediator, Next,
    PipelineBehavior, PortalEnv, Request, RequestHandler, RequestKind, Response,
};

pub use policy::{PolicyConfig, PolicyEngine, PolicyInput, PolicyResult};

pub use render::{render, RenderRequest, RenderedArtifact};

/// ARM Portal version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
