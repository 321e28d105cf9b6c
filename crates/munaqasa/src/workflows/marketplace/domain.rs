use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Identifier supplied by the identity provider for every account.
    UserId
);
record_id!(
    /// Store-assigned identifier of a service request.
    RequestId
);
record_id!(
    /// Store-assigned identifier of a provider bid.
    BidId
);
record_id!(ReviewId);
record_id!(NotificationId);

/// Account role as asserted by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Provider,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Provider => "provider",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "client" => Some(Role::Client),
            "provider" => Some(Role::Provider),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Marketplace account as seen by the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
}

/// Lifecycle stage of a service request.
///
/// `PendingReview -> Open -> InProgress -> Completed`, with `PendingReview -> Rejected`
/// and any non-terminal stage `-> Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    PendingReview,
    Open,
    InProgress,
    Completed,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::PendingReview => "pending_review",
            RequestStatus::Open => "open",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending_review" => Some(RequestStatus::PendingReview),
            "open" => Some(RequestStatus::Open),
            "in_progress" => Some(RequestStatus::InProgress),
            "completed" => Some(RequestStatus::Completed),
            "rejected" => Some(RequestStatus::Rejected),
            "cancelled" => Some(RequestStatus::Cancelled),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        match self {
            RequestStatus::Completed | RequestStatus::Rejected | RequestStatus::Cancelled => true,
            RequestStatus::PendingReview | RequestStatus::Open | RequestStatus::InProgress => {
                false
            }
        }
    }

    pub const fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;

        match (self, next) {
            (PendingReview, Open) | (PendingReview, Rejected) => true,
            (Open, InProgress) => true,
            (InProgress, Completed) => true,
            (PendingReview, Cancelled) | (Open, Cancelled) | (InProgress, Cancelled) => true,
            (PendingReview, _) | (Open, _) | (InProgress, _) => false,
            (Completed, _) | (Rejected, _) | (Cancelled, _) => false,
        }
    }

    /// Validate a move along the lifecycle graph, returning the new status.
    pub fn transition(self, next: RequestStatus) -> Result<RequestStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Rejected attempt to skip or reverse a request transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("request cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: RequestStatus,
    pub to: RequestStatus,
}

/// Descriptive fields a client supplies when posting a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDetails {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub budget_min: Option<i64>,
    #[serde(default)]
    pub budget_max: Option<i64>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
}

impl RequestDetails {
    /// Check required fields and budget bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        if self.description.trim().is_empty() {
            return Err("description is required".to_string());
        }

        for (field, value) in [("budget_min", self.budget_min), ("budget_max", self.budget_max)] {
            if matches!(value, Some(amount) if amount < 0) {
                return Err(format!("{field} must not be negative"));
            }
        }

        if let (Some(min), Some(max)) = (self.budget_min, self.budget_max) {
            if min > max {
                return Err("budget_min must not exceed budget_max".to_string());
            }
        }

        Ok(())
    }
}

/// A client's posted need for a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: RequestId,
    pub project_number: String,
    pub client_id: UserId,
    pub status: RequestStatus,
    #[serde(flatten)]
    pub details: RequestDetails,
    pub assigned_provider: Option<UserId>,
    pub accepted_bid: Option<BidId>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ServiceRequest {
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.client_id == user
    }
}

/// Human-readable project number, stable for a given id and creation date.
pub fn project_number(id: RequestId, created_at: DateTime<Utc>) -> String {
    format!("MNQ-{}-{:05}", created_at.format("%Y%m%d"), id.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
}

impl BidStatus {
    pub const fn label(self) -> &'static str {
        match self {
            BidStatus::Pending => "pending",
            BidStatus::Accepted => "accepted",
            BidStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(BidStatus::Pending),
            "accepted" => Some(BidStatus::Accepted),
            "rejected" => Some(BidStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Price, duration, and note offered by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidTerms {
    pub price: i64,
    pub days: i64,
    #[serde(default)]
    pub note: Option<String>,
}

impl BidTerms {
    pub fn validate(&self) -> Result<(), String> {
        if self.price <= 0 {
            return Err("price must be positive".to_string());
        }
        if self.days <= 0 {
            return Err("days must be positive".to_string());
        }
        Ok(())
    }
}

/// A provider's priced, timed offer against an open request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub request_id: RequestId,
    pub provider_id: UserId,
    #[serde(flatten)]
    pub terms: BidTerms,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
}

/// Which side of an engagement wrote a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDirection {
    ClientToProvider,
    ProviderToClient,
}

impl ReviewDirection {
    pub const fn label(self) -> &'static str {
        match self {
            ReviewDirection::ClientToProvider => "client_to_provider",
            ReviewDirection::ProviderToClient => "provider_to_client",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "client_to_provider" => Some(ReviewDirection::ClientToProvider),
            "provider_to_client" => Some(ReviewDirection::ProviderToClient),
            _ => None,
        }
    }
}

/// Review payload supplied by the reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSubmission {
    pub reviewed_id: UserId,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    pub direction: ReviewDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub request_id: RequestId,
    pub reviewer_id: UserId,
    pub reviewed_id: UserId,
    pub rating: u8,
    pub comment: String,
    pub direction: ReviewDirection,
    pub created_at: DateTime<Utc>,
}

/// Average rating projection, recomputed from reviews on each read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingSummary {
    pub user_id: UserId,
    pub average: Option<f64>,
    pub count: usize,
}

impl RatingSummary {
    pub fn from_reviews(user_id: UserId, reviews: &[Review]) -> Self {
        let ratings: Vec<u8> = reviews
            .iter()
            .filter(|review| review.reviewed_id == user_id)
            .map(|review| review.rating)
            .collect();

        let average = if ratings.is_empty() {
            None
        } else {
            let total: u32 = ratings.iter().map(|rating| u32::from(*rating)).sum();
            Some(f64::from(total) / ratings.len() as f64)
        };

        Self {
            user_id,
            average,
            count: ratings.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewRequest,
    ModerationDecision,
    NewBid,
    BidAccepted,
    RequestAssigned,
    BidRejected,
    RequestCompleted,
    RequestCancelled,
    NewReview,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationKind::NewRequest => "new_request",
            NotificationKind::ModerationDecision => "moderation_decision",
            NotificationKind::NewBid => "new_bid",
            NotificationKind::BidAccepted => "bid_accepted",
            NotificationKind::RequestAssigned => "request_assigned",
            NotificationKind::BidRejected => "bid_rejected",
            NotificationKind::RequestCompleted => "request_completed",
            NotificationKind::RequestCancelled => "request_cancelled",
            NotificationKind::NewReview => "new_review",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new_request" => Some(NotificationKind::NewRequest),
            "moderation_decision" => Some(NotificationKind::ModerationDecision),
            "new_bid" => Some(NotificationKind::NewBid),
            "bid_accepted" => Some(NotificationKind::BidAccepted),
            "request_assigned" => Some(NotificationKind::RequestAssigned),
            "bid_rejected" => Some(NotificationKind::BidRejected),
            "request_completed" => Some(NotificationKind::RequestCompleted),
            "request_cancelled" => Some(NotificationKind::RequestCancelled),
            "new_review" => Some(NotificationKind::NewReview),
            _ => None,
        }
    }
}

/// Append-only record of a domain event for one user. Only `read` ever changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: UserId,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub reference: Option<i64>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Admin decision on a request awaiting review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationDecision {
    Open,
    Rejected,
}

impl ModerationDecision {
    pub const fn target(self) -> RequestStatus {
        match self {
            ModerationDecision::Open => RequestStatus::Open,
            ModerationDecision::Rejected => RequestStatus::Rejected,
        }
    }
}

/// Admin-controlled profile flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatusUpdate {
    pub active: bool,
    #[serde(default)]
    pub badge: Option<String>,
}
