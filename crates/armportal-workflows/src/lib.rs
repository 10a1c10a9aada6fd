//! ARM Portal Workflows
//!
//! Provision, promote and destroy, each ending in a pull request on the
//! infrastructure repository, plus the read-side job queries. Everything is
//! reached through the request mediator assembled by [`build_mediator`].

pub mod destroy;
pub mod handlers;
pub mod portal;
pub mod promote;
pub mod provision;

use std::sync::Arc;

use armportal_core::{DomainEventDispatcher, Mediator, PortalEnv, RequestKind};

pub use destroy::destroy;
pub use handlers::{
    DestroyResourceHandler, GetJobHandler, ListJobsHandler, PreviewBlueprintHandler,
    PromoteResourceHandler, ProvisionBlueprintHandler,
};
pub use portal::Portal;
pub use promote::promote;
pub use provision::{preview, provision};

/// Mediator with the standard behaviors and a handler for every request.
pub fn build_mediator(portal: Portal, env: PortalEnv) -> Mediator {
    let dispatcher = Arc::new(DomainEventDispatcher::with_default_handlers());
    let mut mediator = Mediator::standard(dispatcher, env);
    mediator
        .register_handler(
            RequestKind::ProvisionBlueprint,
            Arc::new(ProvisionBlueprintHandler::new(portal.clone())),
        )
        .register_handler(
            RequestKind::PromoteResource,
            Arc::new(PromoteResourceHandler::new(portal.clone())),
        )
        .register_handler(
            RequestKind::DestroyResource,
            Arc::new(DestroyResourceHandler::new(portal.clone())),
        )
        .register_handler(RequestKind::GetJob, Arc::new(GetJobHandler::new(portal.clone())))
        .register_handler(RequestKind::ListJobs, Arc::new(ListJobsHandler::new(portal.clone())))
        .register_handler(
            RequestKind::PreviewBlueprint,
            Arc::new(PreviewBlueprintHandler::new(portal)),
        );
    mediator
}
