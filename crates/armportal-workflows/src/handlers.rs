//! Request handlers: one per request kind, each delegating to a workflow.

use async_trait::async_trait;

use armportal_core::{Handled, Request, RequestHandler, RequestKind, Response, Result};

use crate::destroy::destroy;
use crate::portal::{parse_optional_environment, Portal};
use crate::promote::promote;
use crate::provision::{preview, provision};

macro_rules! handler {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub struct $name {
            portal: Portal,
        }

        impl $name {
            pub fn new(portal: Portal) -> Self {
                Self { portal }
            }
        }
    };
}

handler!(
    /// Opens the provisioning pull request.
    ProvisionBlueprintHandler
);
handler!(
    /// Opens the promotion pull request.
    PromoteResourceHandler
);
handler!(
    /// Opens the destroy pull request.
    DestroyResourceHandler
);
handler!(GetJobHandler);
handler!(ListJobsHandler);
handler!(
    /// Offline render with policy evaluation.
    PreviewBlueprintHandler
);

#[async_trait]
impl RequestHandler for ProvisionBlueprintHandler {
    async fn handle(&self, request: &Request) -> Result<Handled> {
        let Request::ProvisionBlueprint(cmd) = request else {
            return Err(request.mismatch(RequestKind::ProvisionBlueprint));
        };
        let (request, events) = provision(&self.portal, cmd).await?;
        Ok(Handled::with_events(
            Response::Provisioned(request.to_result()),
            events,
        ))
    }
}

#[async_trait]
impl RequestHandler for PromoteResourceHandler {
    async fn handle(&self, request: &Request) -> Result<Handled> {
        let Request::PromoteResource(cmd) = request else {
            return Err(request.mismatch(RequestKind::PromoteResource));
        };
        let (request, events) = promote(&self.portal, cmd).await?;
        Ok(Handled::with_events(
            Response::Promoted(request.to_result()),
            events,
        ))
    }
}

#[async_trait]
impl RequestHandler for DestroyResourceHandler {
    async fn handle(&self, request: &Request) -> Result<Handled> {
        let Request::DestroyResource(cmd) = request else {
            return Err(request.mismatch(RequestKind::DestroyResource));
        };
        let (outcome, events) = destroy(&self.portal, cmd).await?;
        Ok(Handled::with_events(Response::Destroyed(outcome), events))
    }
}

#[async_trait]
impl RequestHandler for GetJobHandler {
    async fn handle(&self, request: &Request) -> Result<Handled> {
        let Request::GetJob(query) = request else {
            return Err(request.mismatch(RequestKind::GetJob));
        };
        let job = self.portal.jobs.get_job(query.pr_number).await?;
        Ok(Handled::new(Response::Job(Box::new(job))))
    }
}

#[async_trait]
impl RequestHandler for ListJobsHandler {
    async fn handle(&self, request: &Request) -> Result<Handled> {
        let Request::ListJobs(query) = request else {
            return Err(request.mismatch(RequestKind::ListJobs));
        };
        let environment = parse_optional_environment(query.environment.as_deref())?;
        let jobs = self.portal.jobs.list_jobs(environment).await?;
        Ok(Handled::new(Response::Jobs(jobs)))
    }
}

#[async_trait]
impl RequestHandler for PreviewBlueprintHandler {
    async fn handle(&self, request: &Request) -> Result<Handled> {
        let Request::PreviewBlueprint(query) = request else {
            return Err(request.mismatch(RequestKind::PreviewBlueprint));
        };
        let outcome = preview(&self.portal, query)?;
        Ok(Handled::new(Response::Preview(Box::new(outcome))))
    }
}
