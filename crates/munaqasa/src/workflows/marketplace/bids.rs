use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::domain::{
    Bid, BidId, BidStatus, BidTerms, NotificationKind, RequestId, RequestStatus, Role,
    ServiceRequest,
};
use super::events::{NotificationEvent, Recipient, Transition};
use super::identity::Actor;
use super::lifecycle::RequestLifecycle;
use super::repository::{MarketplaceRepository, NewBid};
use super::service::{active_account, load_bid, load_request, MarketplaceError};

/// Outcome of a successful acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acceptance {
    pub request: ServiceRequest,
    pub bid: Bid,
    pub rejected_bids: Vec<BidId>,
}

/// Resolves competing bids. At most one bid per request ever reaches `accepted`.
pub struct BidArbitrator<R> {
    repository: Arc<R>,
}

impl<R> BidArbitrator<R>
where
    R: MarketplaceRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Place a provider's bid on an open request.
    pub fn submit(
        &self,
        actor: &Actor,
        request_id: RequestId,
        terms: BidTerms,
    ) -> Result<Transition<Bid>, MarketplaceError> {
        if actor.role != Role::Provider {
            return Err(MarketplaceError::Forbidden(
                "only providers can bid".to_string(),
            ));
        }
        terms.validate().map_err(MarketplaceError::Validation)?;

        let (request, bid) = self
            .repository
            .transaction(|store| -> Result<_, MarketplaceError> {
                active_account(store, actor.user_id)?;
                let request = load_request(store, request_id)?;
                if request.status != RequestStatus::Open {
                    return Err(MarketplaceError::InvalidState(format!(
                        "request is {}, bids are only accepted while open",
                        request.status
                    )));
                }
                let bid = store.insert_bid(NewBid {
                    request_id,
                    provider_id: actor.user_id,
                    terms,
                    created_at: Utc::now(),
                })?;
                Ok((request, bid))
            })?;

        info!(
            bid_id = bid.id.0,
            request_id = request_id.0,
            provider_id = actor.user_id.0,
            price = bid.terms.price,
            "bid submitted"
        );

        let body = format!(
            "{} received a bid of {} for {} day(s).",
            request.project_number, bid.terms.price, bid.terms.days
        );
        Ok(Transition::new(bid.clone())
            .with_event(
                NotificationEvent::new(
                    Recipient::User(request.client_id),
                    NotificationKind::NewBid,
                    "New bid on your request",
                    body.clone(),
                )
                .referencing(request.id.0),
            )
            .with_event(
                NotificationEvent::new(
                    Recipient::Admins,
                    NotificationKind::NewBid,
                    "New bid submitted",
                    body,
                )
                .referencing(request.id.0),
            ))
    }

    /// Owning provider revises a bid that is still pending.
    pub fn update(
        &self,
        actor: &Actor,
        bid_id: BidId,
        terms: BidTerms,
    ) -> Result<Bid, MarketplaceError> {
        terms.validate().map_err(MarketplaceError::Validation)?;

        let bid = self
            .repository
            .transaction(|store| -> Result<_, MarketplaceError> {
                let mut bid = load_bid(store, bid_id)?;
                if bid.provider_id != actor.user_id {
                    return Err(MarketplaceError::Forbidden(
                        "only the bidding provider can edit a bid".to_string(),
                    ));
                }
                if bid.status != BidStatus::Pending {
                    return Err(MarketplaceError::InvalidState(format!(
                        "cannot edit {} bid",
                        bid.status
                    )));
                }
                bid.terms = terms;
                store.save_bid(&bid)?;
                Ok(bid)
            })?;

        info!(bid_id = bid.id.0, price = bid.terms.price, "bid updated");
        Ok(bid)
    }

    /// Accept one bid, reject its siblings, and assign the request, atomically.
    ///
    /// Preconditions are re-read inside the transaction: if the bid is no longer
    /// pending or the request no longer open (a racing accept won), the call fails
    /// with `Conflict` and nothing is written.
    pub fn accept(
        &self,
        actor: &Actor,
        bid_id: BidId,
    ) -> Result<Transition<Acceptance>, MarketplaceError> {
        let acceptance = self
            .repository
            .transaction(|store| -> Result<_, MarketplaceError> {
                let mut bid = load_bid(store, bid_id)?;
                let request = load_request(store, bid.request_id)?;

                if !(actor.is_admin() || request.is_owned_by(actor.user_id)) {
                    return Err(MarketplaceError::Forbidden(
                        "only the request owner or an admin can accept bids".to_string(),
                    ));
                }
                if bid.status != BidStatus::Pending {
                    return Err(MarketplaceError::Conflict(format!(
                        "bid is already {}",
                        bid.status
                    )));
                }
                if request.status != RequestStatus::Open {
                    return Err(MarketplaceError::Conflict(format!(
                        "request is {}, not open",
                        request.status
                    )));
                }

                bid.status = BidStatus::Accepted;
                store.save_bid(&bid)?;

                let mut rejected_bids = Vec::new();
                for mut sibling in store.bids_for_request(request.id)? {
                    if sibling.id == bid.id || sibling.status == BidStatus::Rejected {
                        continue;
                    }
                    sibling.status = BidStatus::Rejected;
                    store.save_bid(&sibling)?;
                    rejected_bids.push(sibling.id);
                }

                let request =
                    RequestLifecycle::<R>::assign_on_accept(store, request, &bid, Utc::now())?;

                Ok(Acceptance {
                    request,
                    bid,
                    rejected_bids,
                })
            })?;

        info!(
            bid_id = acceptance.bid.id.0,
            request_id = acceptance.request.id.0,
            provider_id = acceptance.bid.provider_id.0,
            rejected = acceptance.rejected_bids.len(),
            "bid accepted"
        );

        let project = acceptance.request.project_number.clone();
        let request_id = acceptance.request.id.0;
        let provider = acceptance.bid.provider_id;
        let client = acceptance.request.client_id;

        Ok(Transition::new(acceptance)
            .with_event(
                NotificationEvent::new(
                    Recipient::User(provider),
                    NotificationKind::BidAccepted,
                    "Your bid was accepted",
                    format!("Your bid on {project} was accepted. The project is now in progress."),
                )
                .referencing(request_id),
            )
            .with_event(
                NotificationEvent::new(
                    Recipient::User(client),
                    NotificationKind::RequestAssigned,
                    "Provider assigned",
                    format!("{project} has been assigned to provider {provider}."),
                )
                .referencing(request_id),
            ))
    }

    /// Reject a single pending bid. Siblings and the request are left alone.
    pub fn reject(
        &self,
        actor: &Actor,
        bid_id: BidId,
    ) -> Result<Transition<Bid>, MarketplaceError> {
        let (request, bid) = self
            .repository
            .transaction(|store| -> Result<_, MarketplaceError> {
                let mut bid = load_bid(store, bid_id)?;
                let request = load_request(store, bid.request_id)?;

                if !(actor.is_admin() || request.is_owned_by(actor.user_id)) {
                    return Err(MarketplaceError::Forbidden(
                        "only the request owner or an admin can reject bids".to_string(),
                    ));
                }
                if bid.status != BidStatus::Pending {
                    return Err(MarketplaceError::InvalidState(format!(
                        "cannot reject {} bid",
                        bid.status
                    )));
                }

                bid.status = BidStatus::Rejected;
                store.save_bid(&bid)?;
                Ok((request, bid))
            })?;

        info!(bid_id = bid.id.0, request_id = request.id.0, "bid rejected");

        let event = NotificationEvent::new(
            Recipient::User(bid.provider_id),
            NotificationKind::BidRejected,
            "Your bid was declined",
            format!("Your bid on {} was declined.", request.project_number),
        )
        .referencing(request.id.0);

        Ok(Transition::new(bid).with_event(event))
    }

    /// Owner and admins see every bid; a provider sees only their own.
    pub fn list(&self, actor: &Actor, request_id: RequestId) -> Result<Vec<Bid>, MarketplaceError> {
        self.repository
            .transaction(|store| -> Result<_, MarketplaceError> {
                let request = load_request(store, request_id)?;
                let bids = store.bids_for_request(request_id)?;

                if actor.is_admin() || request.is_owned_by(actor.user_id) {
                    return Ok(bids);
                }
                if actor.role == Role::Provider {
                    return Ok(bids
                        .into_iter()
                        .filter(|bid| bid.provider_id == actor.user_id)
                        .collect());
                }
                Err(MarketplaceError::Forbidden(
                    "bids are visible to the request owner only".to_string(),
                ))
            })
    }
}
