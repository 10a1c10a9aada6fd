//! Domain event fan-out.
//!
//! Handlers for one event run concurrently and are awaited together; events
//! are dispatched one after another. A failing handler is logged and
//! skipped: events are side effects, never the primary outcome.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::info;

use crate::domain::error::Result;
use crate::domain::events::{DomainEvent, DomainEventKind};
use crate::metrics::METRICS;
use crate::obs;

#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, event: &DomainEvent) -> Result<()>;
}

#[derive(Default)]
pub struct DomainEventDispatcher {
    handlers: HashMap<DomainEventKind, Vec<Arc<dyn DomainEventHandler>>>,
}

impl DomainEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with a [`LoggingEventHandler`] on every event kind.
    pub fn with_default_handlers() -> Self {
        let mut dispatcher = Self::new();
        let logger: Arc<dyn DomainEventHandler> = Arc::new(LoggingEventHandler);
        for kind in [
            DomainEventKind::BlueprintProvisioned,
            DomainEventKind::ResourcePromoted,
            DomainEventKind::ResourceDestroyed,
        ] {
            dispatcher.register(kind, logger.clone());
        }
        dispatcher
    }

    pub fn register(&mut self, kind: DomainEventKind, handler: Arc<dyn DomainEventHandler>) -> &mut Self {
        self.handlers.entry(kind).or_default().push(handler);
        self
    }

    pub fn handler_count(&self, kind: DomainEventKind) -> usize {
        self.handlers.get(&kind).map(Vec::len).unwrap_or(0)
    }

    pub async fn dispatch(&self, event: &DomainEvent) {
        let kind = event.kind();
        let Some(handlers) = self.handlers.get(&kind) else {
            return;
        };
        let results = join_all(handlers.iter().map(|h| h.handle(event))).await;
        for (handler, result) in handlers.iter().zip(results) {
            if let Err(e) = result {
                METRICS.inc_event_handler_failures();
                obs::emit_event_handler_failed(kind.as_str(), handler.name(), &e);
            }
        }
        METRICS.inc_events_dispatched();
        obs::emit_event_dispatched(kind.as_str(), handlers.len());
    }

    pub async fn dispatch_all(&self, events: &[DomainEvent]) {
        for event in events {
            self.dispatch(event).await;
        }
    }
}

/// Writes each event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventHandler;

#[async_trait]
impl DomainEventHandler for LoggingEventHandler {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        match event {
            DomainEvent::BlueprintProvisioned {
                meta,
                blueprint_id,
                environment,
                pull_request_url,
                created_by,
            } => info!(
                event = "domain.blueprint_provisioned",
                event_id = %meta.event_id,
                blueprint_id = %blueprint_id,
                environment = %environment,
                pull_request_url = %pull_request_url,
                created_by = created_by.as_deref().unwrap_or("unknown"),
            ),
            DomainEvent::ResourcePromoted {
                meta,
                source_job_id,
                source_environment,
                target_environment,
                pull_request_url,
            } => info!(
                event = "domain.resource_promoted",
                event_id = %meta.event_id,
                source_job_id = source_job_id,
                source_environment = %source_environment,
                target_environment = %target_environment,
                pull_request_url = %pull_request_url,
            ),
            DomainEvent::ResourceDestroyed {
                meta,
                job_id,
                pull_request_url,
            } => info!(
                event = "domain.resource_destroyed",
                event_id = %meta.event_id,
                job_id = job_id,
                pull_request_url = %pull_request_url,
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::PortalError;
    use crate::domain::events::EventMeta;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl DomainEventHandler for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn handle(&self, event: &DomainEvent) -> Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, event.kind().as_str()));
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl DomainEventHandler for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn handle(&self, _event: &DomainEvent) -> Result<()> {
            Err(PortalError::upstream("webhook down"))
        }
    }

    fn destroyed(job_id: u64) -> DomainEvent {
        DomainEvent::ResourceDestroyed {
            meta: EventMeta::now(),
            job_id,
            pull_request_url: format!("https://github.com/o/r/pull/{job_id}"),
        }
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_others() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = DomainEventDispatcher::new();
        dispatcher
            .register(DomainEventKind::ResourceDestroyed, Arc::new(Broken))
            .register(
                DomainEventKind::ResourceDestroyed,
                Arc::new(Recorder {
                    name: "audit",
                    seen: seen.clone(),
                }),
            );

        let before = METRICS.event_handler_failures();
        dispatcher.dispatch_all(&[destroyed(1), destroyed(2)]).await;

        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(METRICS.event_handler_failures() >= before + 2);
    }

    #[tokio::test]
    async fn unhandled_kinds_are_ignored() {
        let dispatcher = DomainEventDispatcher::new();
        dispatcher.dispatch(&destroyed(3)).await;
        assert_eq!(dispatcher.handler_count(DomainEventKind::ResourceDestroyed), 0);
    }

    #[test]
    fn default_handlers_cover_every_kind() {
        let dispatcher = DomainEventDispatcher::with_default_handlers();
        assert_eq!(dispatcher.handler_count(DomainEventKind::BlueprintProvisioned), 1);
        assert_eq!(dispatcher.handler_count(DomainEventKind::ResourcePromoted), 1);
        assert_eq!(dispatcher.handler_count(DomainEventKind::ResourceDestroyed), 1);
    }
}
