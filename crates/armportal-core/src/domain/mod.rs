//! Domain models for ARM Portal.
//!
//! Canonical definitions for the core entities:
//! - `Blueprint` / `BlueprintCatalog`: versioned provisionable units
//! - `ProvisionRequest`, `PromotionRequest`: workflow state machines
//! - `Job`: projection of a provisioning pull request
//! - `DomainEvent`: facts raised by state transitions

pub mod blueprint;
pub mod catalog;
pub mod environment;
pub mod error;
pub mod events;
pub mod job;
pub mod promotion;
pub mod provision;
pub mod submission;
pub mod variables;

pub use blueprint::{
    Blueprint, CrossplaneMode, CrossplaneSpec, OutputDef, Provider, StackComponent, StackOutput,
    VariableDef, VariableType,
};
pub use catalog::{BlueprintCatalog, Semver};
pub use environment::Environment;
pub use error::{
    ErrorBody, FieldError, PolicyIssue, PortalError, Rejected, Result, Severity,
};
pub use events::{DomainEvent, DomainEventKind, EventId, EventMeta};
pub use job::{Job, JobStatus, StageStatus};
pub use promotion::{PromotionOutcome, PromotionRequest, PromotionStatus};
pub use provision::{ProvisionOutcome, ProvisionRequest, ProvisionStatus};
pub use submission::{
    DestroyMethod, DestroyOutcome, DestroySubmission, PromotionSubmission, Submission,
};
pub use variables::Variables;
