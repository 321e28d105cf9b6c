use std::sync::Arc;

use super::domain::{ModerationDecision, RequestId, ServiceRequest};
use super::events::Transition;
use super::identity::Actor;
use super::lifecycle::RequestLifecycle;
use super::repository::MarketplaceRepository;
use super::service::{require_admin, MarketplaceError};

/// The only path out of `pending_review`: an admin publishes or rejects a request.
pub struct ModerationGate<R> {
    lifecycle: Arc<RequestLifecycle<R>>,
}

impl<R> ModerationGate<R>
where
    R: MarketplaceRepository + 'static,
{
    pub fn new(lifecycle: Arc<RequestLifecycle<R>>) -> Self {
        Self { lifecycle }
    }

    pub fn decide(
        &self,
        actor: &Actor,
        request_id: RequestId,
        decision: ModerationDecision,
        notes: Option<String>,
    ) -> Result<Transition<ServiceRequest>, MarketplaceError> {
        require_admin(actor, "only admins can moderate requests")?;
        self.lifecycle.moderate(request_id, decision, notes)
    }
}
