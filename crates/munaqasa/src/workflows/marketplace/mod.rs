//! Request, bid, and review lifecycle for the moderated service marketplace.
//!
//! Clients post requests that wait in review until an admin opens them, providers bid
//! on open requests, the owner (or an admin) accepts exactly one bid, and both parties
//! rate each other once an admin marks the work complete. Every committed change
//! emits notification events that are recorded on a best-effort basis.

pub mod bids;
pub mod domain;
pub mod events;
pub mod identity;
pub mod lifecycle;
pub mod memory;
pub mod moderation;
pub mod notifications;
pub mod repository;
pub mod reviews;
pub mod router;
pub mod service;
pub mod sqlite;

#[cfg(test)]
mod tests;

pub use bids::{Acceptance, BidArbitrator};
pub use domain::{
    project_number, Bid, BidId, BidStatus, BidTerms, InvalidTransition, ModerationDecision,
    Notification, NotificationId, NotificationKind, RatingSummary, RequestDetails, RequestId,
    RequestStatus, Review, ReviewDirection, ReviewId, ReviewSubmission, Role, ServiceRequest,
    User, UserId, UserStatusUpdate,
};
pub use events::{NotificationEvent, Recipient, Transition};
pub use identity::{Actor, IdentityProvider, IdentitySpecError, TokenRegistry};
pub use lifecycle::RequestLifecycle;
pub use memory::InMemoryRepository;
pub use moderation::ModerationGate;
pub use notifications::NotificationDispatcher;
pub use repository::{
    MarketplaceCounts, MarketplaceRepository, MarketplaceStore, NewBid, NewNotification,
    NewRequest, NewReview, RepositoryError,
};
pub use reviews::ReviewLedger;
pub use router::marketplace_router;
pub use service::{MarketplaceError, MarketplaceService};
pub use sqlite::SqliteRepository;
