use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::domain::{
    NotificationKind, RatingSummary, RequestId, RequestStatus, Review, ReviewDirection,
    ReviewSubmission, UserId,
};
use super::events::{NotificationEvent, Recipient, Transition};
use super::identity::Actor;
use super::repository::{MarketplaceRepository, NewReview};
use super::service::{active_account, load_request, MarketplaceError};

/// Post-engagement ratings, one per (request, reviewer).
///
/// Only the two parties of a completed request may review, and each reviews the
/// other: the client rates the assigned provider and vice versa.
pub struct ReviewLedger<R> {
    repository: Arc<R>,
}

impl<R> ReviewLedger<R>
where
    R: MarketplaceRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn submit(
        &self,
        actor: &Actor,
        request_id: RequestId,
        submission: ReviewSubmission,
    ) -> Result<Transition<Review>, MarketplaceError> {
        if !(1..=5).contains(&submission.rating) {
            return Err(MarketplaceError::Validation(
                "rating must be between 1 and 5".to_string(),
            ));
        }

        let review = self
            .repository
            .transaction(|store| -> Result<_, MarketplaceError> {
                active_account(store, actor.user_id)?;
                let request = load_request(store, request_id)?;

                let (direction, counterpart) = if request.is_owned_by(actor.user_id) {
                    (ReviewDirection::ClientToProvider, request.assigned_provider)
                } else if request.assigned_provider == Some(actor.user_id) {
                    (ReviewDirection::ProviderToClient, Some(request.client_id))
                } else {
                    return Err(MarketplaceError::Forbidden(
                        "only the client and the assigned provider can review".to_string(),
                    ));
                };

                if request.status != RequestStatus::Completed {
                    return Err(MarketplaceError::InvalidState(format!(
                        "request is {}, reviews open once it is completed",
                        request.status
                    )));
                }
                if counterpart != Some(submission.reviewed_id) {
                    return Err(MarketplaceError::Validation(
                        "reviewed user must be the other party of the request".to_string(),
                    ));
                }
                if direction != submission.direction {
                    return Err(MarketplaceError::Validation(format!(
                        "direction must be {}",
                        direction.label()
                    )));
                }

                Ok(store.insert_review(NewReview {
                    request_id,
                    reviewer_id: actor.user_id,
                    reviewed_id: submission.reviewed_id,
                    rating: submission.rating,
                    comment: submission.comment.trim().to_string(),
                    direction,
                    created_at: Utc::now(),
                })?)
            })?;

        info!(
            review_id = review.id.0,
            request_id = request_id.0,
            rating = review.rating,
            "review recorded"
        );

        let event = NotificationEvent::new(
            Recipient::User(review.reviewed_id),
            NotificationKind::NewReview,
            "New review",
            format!("You received a {}-star review.", review.rating),
        )
        .referencing(request_id.0);

        Ok(Transition::new(review).with_event(event))
    }

    /// Mean of every rating the user has received, recomputed on each call.
    pub fn rating_summary(&self, user_id: UserId) -> Result<RatingSummary, MarketplaceError> {
        let reviews = self
            .repository
            .transaction(|store| store.reviews_of(user_id))?;
        Ok(RatingSummary::from_reviews(user_id, &reviews))
    }
}
