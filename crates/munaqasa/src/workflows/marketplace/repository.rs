use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    Bid, BidId, BidTerms, Notification, NotificationId, NotificationKind, RequestDetails,
    RequestId, Review, ReviewDirection, Role, ServiceRequest, User, UserId,
};

/// Request row prior to id assignment.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub client_id: UserId,
    pub details: RequestDetails,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBid {
    pub request_id: RequestId,
    pub provider_id: UserId,
    pub terms: BidTerms,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub request_id: RequestId,
    pub reviewer_id: UserId,
    pub reviewed_id: UserId,
    pub rating: u8,
    pub comment: String,
    pub direction: ReviewDirection,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient: UserId,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub reference: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Row counts surfaced on the admin overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarketplaceCounts {
    pub users: u64,
    pub requests: u64,
    pub bids: u64,
}

/// Row-level access available inside a repository transaction.
///
/// Inserts assign ids. `insert_bid` and `insert_review` must report
/// [`RepositoryError::Conflict`] when the (request, provider) or (request, reviewer)
/// pair already exists; `save_*` report [`RepositoryError::NotFound`] for unknown ids.
pub trait MarketplaceStore {
    fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    fn users_with_role(&self, role: Role) -> Result<Vec<User>, RepositoryError>;
    fn insert_user(&mut self, user: User) -> Result<User, RepositoryError>;
    fn save_user(&mut self, user: &User) -> Result<(), RepositoryError>;

    fn request(&self, id: RequestId) -> Result<Option<ServiceRequest>, RepositoryError>;
    fn insert_request(&mut self, draft: NewRequest) -> Result<ServiceRequest, RepositoryError>;
    fn save_request(&mut self, request: &ServiceRequest) -> Result<(), RepositoryError>;

    fn bid(&self, id: BidId) -> Result<Option<Bid>, RepositoryError>;
    /// Bids on a request in submission order.
    fn bids_for_request(&self, request_id: RequestId) -> Result<Vec<Bid>, RepositoryError>;
    fn insert_bid(&mut self, draft: NewBid) -> Result<Bid, RepositoryError>;
    fn save_bid(&mut self, bid: &Bid) -> Result<(), RepositoryError>;

    fn insert_review(&mut self, draft: NewReview) -> Result<Review, RepositoryError>;
    fn reviews_of(&self, reviewed: UserId) -> Result<Vec<Review>, RepositoryError>;

    fn insert_notification(
        &mut self,
        draft: NewNotification,
    ) -> Result<Notification, RepositoryError>;
    fn notification(&self, id: NotificationId) -> Result<Option<Notification>, RepositoryError>;
    /// Notifications addressed to a user, newest first.
    fn notifications_for(&self, recipient: UserId) -> Result<Vec<Notification>, RepositoryError>;
    fn mark_notification_read(&mut self, id: NotificationId) -> Result<(), RepositoryError>;

    fn counts(&self) -> Result<MarketplaceCounts, RepositoryError>;
}

/// Storage abstraction so the lifecycle components can be exercised in isolation.
///
/// `transaction` runs `work` against a consistent view of the store. Its writes are
/// committed only when it returns `Ok`; an `Err` leaves the store untouched.
/// Transactions are serializable.
pub trait MarketplaceRepository: Send + Sync {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn MarketplaceStore) -> Result<T, E>,
        E: From<RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
