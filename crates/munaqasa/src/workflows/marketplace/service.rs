use std::sync::Arc;

use tracing::info;

use super::bids::{Acceptance, BidArbitrator};
use super::domain::{
    Bid, BidId, BidTerms, InvalidTransition, ModerationDecision, Notification, NotificationId,
    RatingSummary, RequestDetails, RequestId, Review, ReviewSubmission, ServiceRequest, User,
    UserId, UserStatusUpdate,
};
use super::events::Transition;
use super::identity::{Actor, IdentityProvider};
use super::lifecycle::RequestLifecycle;
use super::moderation::ModerationGate;
use super::notifications::NotificationDispatcher;
use super::repository::{MarketplaceCounts, MarketplaceRepository, MarketplaceStore, RepositoryError};
use super::reviews::ReviewLedger;

/// Facade exposing the lifecycle operations to the transport layer.
///
/// Every state-changing call commits its primary transaction first and then hands the
/// resulting events to the [`NotificationDispatcher`]; callers never observe
/// notification failures.
pub struct MarketplaceService<R, I> {
    repository: Arc<R>,
    identity: Arc<I>,
    lifecycle: Arc<RequestLifecycle<R>>,
    moderation: ModerationGate<R>,
    bids: BidArbitrator<R>,
    reviews: ReviewLedger<R>,
    notifications: NotificationDispatcher<R>,
}

impl<R, I> MarketplaceService<R, I>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    pub fn new(repository: Arc<R>, identity: Arc<I>) -> Self {
        let lifecycle = Arc::new(RequestLifecycle::new(repository.clone()));

        Self {
            moderation: ModerationGate::new(lifecycle.clone()),
            bids: BidArbitrator::new(repository.clone()),
            reviews: ReviewLedger::new(repository.clone()),
            notifications: NotificationDispatcher::new(repository.clone()),
            lifecycle,
            repository,
            identity,
        }
    }

    /// Resolve a bearer credential. Runs before any repository access.
    pub fn authenticate(&self, token: Option<&str>) -> Result<Actor, MarketplaceError> {
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(MarketplaceError::Unauthenticated)?;
        self.identity
            .resolve(token)
            .ok_or(MarketplaceError::Unauthenticated)
    }

    pub fn create_request(
        &self,
        actor: &Actor,
        details: RequestDetails,
    ) -> Result<ServiceRequest, MarketplaceError> {
        let transition = self.lifecycle.create(actor, details)?;
        Ok(self.publish(transition))
    }

    pub fn moderate_request(
        &self,
        actor: &Actor,
        request_id: RequestId,
        decision: ModerationDecision,
        notes: Option<String>,
    ) -> Result<ServiceRequest, MarketplaceError> {
        let transition = self.moderation.decide(actor, request_id, decision, notes)?;
        Ok(self.publish(transition))
    }

    pub fn complete_request(
        &self,
        actor: &Actor,
        request_id: RequestId,
    ) -> Result<ServiceRequest, MarketplaceError> {
        let transition = self.lifecycle.complete(actor, request_id)?;
        Ok(self.publish(transition))
    }

    pub fn cancel_request(
        &self,
        actor: &Actor,
        request_id: RequestId,
    ) -> Result<ServiceRequest, MarketplaceError> {
        let transition = self.lifecycle.cancel(actor, request_id)?;
        Ok(self.publish(transition))
    }

    pub fn get_request(
        &self,
        actor: &Actor,
        request_id: RequestId,
    ) -> Result<ServiceRequest, MarketplaceError> {
        self.lifecycle.get(actor, request_id)
    }

    pub fn submit_bid(
        &self,
        actor: &Actor,
        request_id: RequestId,
        terms: BidTerms,
    ) -> Result<Bid, MarketplaceError> {
        let transition = self.bids.submit(actor, request_id, terms)?;
        Ok(self.publish(transition))
    }

    pub fn update_bid(
        &self,
        actor: &Actor,
        bid_id: BidId,
        terms: BidTerms,
    ) -> Result<Bid, MarketplaceError> {
        self.bids.update(actor, bid_id, terms)
    }

    pub fn accept_bid(&self, actor: &Actor, bid_id: BidId) -> Result<Acceptance, MarketplaceError> {
        let transition = self.bids.accept(actor, bid_id)?;
        Ok(self.publish(transition))
    }

    pub fn reject_bid(&self, actor: &Actor, bid_id: BidId) -> Result<Bid, MarketplaceError> {
        let transition = self.bids.reject(actor, bid_id)?;
        Ok(self.publish(transition))
    }

    pub fn list_bids(
        &self,
        actor: &Actor,
        request_id: RequestId,
    ) -> Result<Vec<Bid>, MarketplaceError> {
        self.bids.list(actor, request_id)
    }

    pub fn submit_review(
        &self,
        actor: &Actor,
        request_id: RequestId,
        submission: ReviewSubmission,
    ) -> Result<Review, MarketplaceError> {
        let transition = self.reviews.submit(actor, request_id, submission)?;
        Ok(self.publish(transition))
    }

    pub fn rating_summary(&self, user_id: UserId) -> Result<RatingSummary, MarketplaceError> {
        self.reviews.rating_summary(user_id)
    }

    pub fn list_notifications(&self, actor: &Actor) -> Result<Vec<Notification>, MarketplaceError> {
        self.notifications.list(actor)
    }

    pub fn mark_notification_read(
        &self,
        actor: &Actor,
        id: NotificationId,
    ) -> Result<Notification, MarketplaceError> {
        self.notifications.mark_read(actor, id)
    }

    /// Admin-only: toggle an account's active flag and badge label.
    pub fn set_user_status(
        &self,
        actor: &Actor,
        user_id: UserId,
        update: UserStatusUpdate,
    ) -> Result<User, MarketplaceError> {
        require_admin(actor, "only admins can change account status")?;

        let user = self.repository.transaction(|store| -> Result<_, MarketplaceError> {
            let mut user = store.user(user_id)?.ok_or(MarketplaceError::NotFound("user"))?;
            user.active = update.active;
            user.badge = update
                .badge
                .map(|badge| badge.trim().to_string())
                .filter(|badge| !badge.is_empty());
            store.save_user(&user)?;
            Ok(user)
        })?;

        info!(user_id = user.id.0, active = user.active, "account status updated");
        Ok(user)
    }

    /// Admin-only row counts.
    pub fn overview(&self, actor: &Actor) -> Result<MarketplaceCounts, MarketplaceError> {
        require_admin(actor, "only admins can view the overview")?;
        self.repository
            .transaction(|store| store.counts())
            .map_err(MarketplaceError::from)
    }

    /// Make sure an account exists for a configured identity; existing rows win.
    pub fn ensure_user(&self, user: User) -> Result<User, MarketplaceError> {
        self.repository.transaction(|store| -> Result<_, MarketplaceError> {
            match store.user(user.id)? {
                Some(existing) => Ok(existing),
                None => Ok(store.insert_user(user)?),
            }
        })
    }

    fn publish<T>(&self, transition: Transition<T>) -> T {
        let Transition { value, events } = transition;
        self.notifications.dispatch(events);
        value
    }
}

/// Error raised by the marketplace components.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketplaceError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("authentication required")]
    Unauthenticated,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for MarketplaceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(detail) => Self::Conflict(detail),
            RepositoryError::NotFound => Self::NotFound("record"),
            RepositoryError::Unavailable(detail) => Self::Internal(detail),
        }
    }
}

impl From<InvalidTransition> for MarketplaceError {
    fn from(value: InvalidTransition) -> Self {
        Self::InvalidState(value.to_string())
    }
}

pub(crate) fn require_admin(actor: &Actor, reason: &str) -> Result<(), MarketplaceError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(MarketplaceError::Forbidden(reason.to_string()))
    }
}

/// Load an account that is allowed to author new rows.
pub(crate) fn active_account(
    store: &dyn MarketplaceStore,
    user_id: UserId,
) -> Result<User, MarketplaceError> {
    let user = store
        .user(user_id)?
        .ok_or(MarketplaceError::NotFound("user"))?;
    if !user.active {
        return Err(MarketplaceError::Forbidden("account is suspended".to_string()));
    }
    Ok(user)
}

pub(crate) fn load_request(
    store: &dyn MarketplaceStore,
    request_id: RequestId,
) -> Result<ServiceRequest, MarketplaceError> {
    store
        .request(request_id)?
        .ok_or(MarketplaceError::NotFound("request"))
}

pub(crate) fn load_bid(store: &dyn MarketplaceStore, bid_id: BidId) -> Result<Bid, MarketplaceError> {
    store.bid(bid_id)?.ok_or(MarketplaceError::NotFound("bid"))
}
