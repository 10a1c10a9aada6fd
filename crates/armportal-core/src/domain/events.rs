//! Domain events raised by workflow entities.
//!
//! Events are immutable facts. Entities return them from state transitions;
//! the request pipeline dispatches them once the handler has succeeded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::environment::Environment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity and timestamp shared by every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    pub event_id: EventId,
    pub occurred_on: DateTime<Utc>,
}

impl EventMeta {
    pub fn now() -> Self {
        Self {
            event_id: EventId::new(),
            occurred_on: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainEventKind {
    BlueprintProvisioned,
    ResourcePromoted,
    ResourceDestroyed,
}

impl DomainEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainEventKind::BlueprintProvisioned => "BlueprintProvisionedEvent",
            DomainEventKind::ResourcePromoted => "ResourcePromotedEvent",
            DomainEventKind::ResourceDestroyed => "ResourceDestroyedEvent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DomainEvent {
    BlueprintProvisioned {
        meta: EventMeta,
        blueprint_id: String,
        environment: Environment,
        pull_request_url: String,
        created_by: Option<String>,
    },
    ResourcePromoted {
        meta: EventMeta,
        source_job_id: u64,
        source_environment: Environment,
        target_environment: Environment,
        pull_request_url: String,
    },
    ResourceDestroyed {
        meta: EventMeta,
        job_id: u64,
        pull_request_url: String,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> DomainEventKind {
        match self {
            DomainEvent::BlueprintProvisioned { .. } => DomainEventKind::BlueprintProvisioned,
            DomainEvent::ResourcePromoted { .. } => DomainEventKind::ResourcePromoted,
            DomainEvent::ResourceDestroyed { .. } => DomainEventKind::ResourceDestroyed,
        }
    }

    pub fn meta(&self) -> &EventMeta {
        match self {
            DomainEvent::BlueprintProvisioned { meta, .. }
            | DomainEvent::ResourcePromoted { meta, .. }
            | DomainEvent::ResourceDestroyed { meta, .. } => meta,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.meta().event_id
    }
}
