use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::domain::{
    Bid, ModerationDecision, NotificationKind, RequestDetails, RequestId, RequestStatus, Role,
    ServiceRequest,
};
use super::events::{NotificationEvent, Recipient, Transition};
use super::identity::Actor;
use super::repository::{MarketplaceRepository, MarketplaceStore, NewRequest};
use super::service::{active_account, load_request, require_admin, MarketplaceError};

/// State machine driving a request from review to completion.
///
/// Every mutation goes through [`RequestStatus::transition`], so a skipped or
/// reversed step fails with `InvalidState` before anything is written.
pub struct RequestLifecycle<R> {
    repository: Arc<R>,
}

impl<R> RequestLifecycle<R>
where
    R: MarketplaceRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Post a new request. It waits in `pending_review` until an admin moderates it.
    pub fn create(
        &self,
        actor: &Actor,
        details: RequestDetails,
    ) -> Result<Transition<ServiceRequest>, MarketplaceError> {
        if actor.role != Role::Client {
            return Err(MarketplaceError::Forbidden(
                "only clients can post requests".to_string(),
            ));
        }
        details.validate().map_err(MarketplaceError::Validation)?;

        let details = RequestDetails {
            title: details.title.trim().to_string(),
            description: details.description.trim().to_string(),
            ..details
        };

        let request = self
            .repository
            .transaction(|store| -> Result<_, MarketplaceError> {
                active_account(store, actor.user_id)?;
                Ok(store.insert_request(NewRequest {
                    client_id: actor.user_id,
                    details,
                    created_at: Utc::now(),
                })?)
            })?;

        info!(
            request_id = request.id.0,
            project = %request.project_number,
            client_id = actor.user_id.0,
            "request submitted for review"
        );

        let event = NotificationEvent::new(
            Recipient::Admins,
            NotificationKind::NewRequest,
            "New request awaiting review",
            format!("{}: {}", request.project_number, request.details.title),
        )
        .referencing(request.id.0);

        Ok(Transition::new(request).with_event(event))
    }

    /// Apply an admin decision. Reachable only through the moderation gate.
    pub(crate) fn moderate(
        &self,
        request_id: RequestId,
        decision: ModerationDecision,
        notes: Option<String>,
    ) -> Result<Transition<ServiceRequest>, MarketplaceError> {
        let notes = notes
            .map(|notes| notes.trim().to_string())
            .filter(|notes| !notes.is_empty());

        let request = self
            .repository
            .transaction(|store| -> Result<_, MarketplaceError> {
                let mut request = load_request(store, request_id)?;
                if request.status != RequestStatus::PendingReview {
                    return Err(MarketplaceError::InvalidState(format!(
                        "request is {}, only pending_review requests can be moderated",
                        request.status
                    )));
                }
                request.status = request.status.transition(decision.target())?;
                request.admin_notes = notes;
                store.save_request(&request)?;
                Ok(request)
            })?;

        info!(
            request_id = request.id.0,
            status = request.status.label(),
            "request moderated"
        );

        let (title, verdict) = match decision {
            ModerationDecision::Open => ("Request approved", "was approved and is now open for bids"),
            ModerationDecision::Rejected => ("Request rejected", "was rejected"),
        };
        let body = match &request.admin_notes {
            Some(notes) => format!("{} {verdict}. Notes: {notes}", request.project_number),
            None => format!("{} {verdict}.", request.project_number),
        };
        let event = NotificationEvent::new(
            Recipient::User(request.client_id),
            NotificationKind::ModerationDecision,
            title,
            body,
        )
        .referencing(request.id.0);

        Ok(Transition::new(request).with_event(event))
    }

    /// Move an open request into `in_progress` for the winning bid.
    ///
    /// Runs inside the bid arbitration transaction; the caller has already checked
    /// that the request is open and the bid pending.
    pub(crate) fn assign_on_accept(
        store: &mut dyn MarketplaceStore,
        mut request: ServiceRequest,
        bid: &Bid,
        at: DateTime<Utc>,
    ) -> Result<ServiceRequest, MarketplaceError> {
        request.status = request.status.transition(RequestStatus::InProgress)?;
        request.accepted_bid = Some(bid.id);
        request.assigned_provider = Some(bid.provider_id);
        request.assigned_at = Some(at);
        store.save_request(&request)?;
        Ok(request)
    }

    /// Admin marks the engagement finished.
    pub fn complete(
        &self,
        actor: &Actor,
        request_id: RequestId,
    ) -> Result<Transition<ServiceRequest>, MarketplaceError> {
        require_admin(actor, "only admins can complete requests")?;

        let request = self
            .repository
            .transaction(|store| -> Result<_, MarketplaceError> {
                let mut request = load_request(store, request_id)?;
                request.status = request.status.transition(RequestStatus::Completed)?;
                request.completed_at = Some(Utc::now());
                store.save_request(&request)?;
                Ok(request)
            })?;

        info!(request_id = request.id.0, "request completed");

        let mut transition = Transition::new(request.clone()).with_event(
            NotificationEvent::new(
                Recipient::User(request.client_id),
                NotificationKind::RequestCompleted,
                "Request completed",
                format!("{} has been marked as completed.", request.project_number),
            )
            .referencing(request.id.0),
        );
        if let Some(provider) = request.assigned_provider {
            transition = transition.with_event(
                NotificationEvent::new(
                    Recipient::User(provider),
                    NotificationKind::RequestCompleted,
                    "Project completed",
                    format!("{} has been marked as completed.", request.project_number),
                )
                .referencing(request.id.0),
            );
        }

        Ok(transition)
    }

    /// Owner or admin withdraws a request that has not reached a terminal state.
    pub fn cancel(
        &self,
        actor: &Actor,
        request_id: RequestId,
    ) -> Result<Transition<ServiceRequest>, MarketplaceError> {
        let request = self
            .repository
            .transaction(|store| -> Result<_, MarketplaceError> {
                let mut request = load_request(store, request_id)?;
                if !(actor.is_admin() || request.is_owned_by(actor.user_id)) {
                    return Err(MarketplaceError::Forbidden(
                        "only the owner or an admin can cancel a request".to_string(),
                    ));
                }
                request.status = request.status.transition(RequestStatus::Cancelled)?;
                store.save_request(&request)?;
                Ok(request)
            })?;

        info!(
            request_id = request.id.0,
            actor_id = actor.user_id.0,
            "request cancelled"
        );

        let mut transition = Transition::new(request.clone());
        let body = format!("{} has been cancelled.", request.project_number);
        if let Some(provider) = request.assigned_provider {
            transition = transition.with_event(
                NotificationEvent::new(
                    Recipient::User(provider),
                    NotificationKind::RequestCancelled,
                    "Project cancelled",
                    body.clone(),
                )
                .referencing(request.id.0),
            );
        }
        if !request.is_owned_by(actor.user_id) {
            transition = transition.with_event(
                NotificationEvent::new(
                    Recipient::User(request.client_id),
                    NotificationKind::RequestCancelled,
                    "Request cancelled",
                    body,
                )
                .referencing(request.id.0),
            );
        }

        Ok(transition)
    }

    /// Visible to the owner, admins, the assigned provider, and any provider while open.
    pub fn get(
        &self,
        actor: &Actor,
        request_id: RequestId,
    ) -> Result<ServiceRequest, MarketplaceError> {
        let request = self
            .repository
            .transaction(|store| load_request(store, request_id))?;

        let visible = actor.is_admin()
            || request.is_owned_by(actor.user_id)
            || request.assigned_provider == Some(actor.user_id)
            || (actor.role == Role::Provider && request.status == RequestStatus::Open);
        if visible {
            Ok(request)
        } else {
            Err(MarketplaceError::Forbidden(
                "request is not visible to this account".to_string(),
            ))
        }
    }
}
