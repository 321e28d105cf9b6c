use std::sync::Arc;

use axum::response::Response;
use serde_json::Value;

use crate::workflows::marketplace::domain::{
    Bid, BidId, BidTerms, ModerationDecision, Notification, NotificationId, RequestDetails,
    RequestId, Review, Role, ServiceRequest, User, UserId,
};
use crate::workflows::marketplace::identity::{Actor, TokenRegistry};
use crate::workflows::marketplace::memory::InMemoryRepository;
use crate::workflows::marketplace::repository::{
    MarketplaceCounts, MarketplaceRepository, MarketplaceStore, NewBid, NewNotification,
    NewRequest, NewReview, RepositoryError,
};
use crate::workflows::marketplace::{marketplace_router, MarketplaceService};

pub(super) const ADMIN: Actor = Actor {
    user_id: UserId(1),
    role: Role::Admin,
};
pub(super) const CLIENT: Actor = Actor {
    user_id: UserId(2),
    role: Role::Client,
};
pub(super) const PROVIDER_A: Actor = Actor {
    user_id: UserId(3),
    role: Role::Provider,
};
pub(super) const PROVIDER_B: Actor = Actor {
    user_id: UserId(4),
    role: Role::Provider,
};
pub(super) const OTHER_CLIENT: Actor = Actor {
    user_id: UserId(5),
    role: Role::Client,
};

pub(super) const ADMIN_TOKEN: &str = "admin-token";
pub(super) const CLIENT_TOKEN: &str = "client-token";
pub(super) const PROVIDER_A_TOKEN: &str = "provider-a-token";
pub(super) const PROVIDER_B_TOKEN: &str = "provider-b-token";
pub(super) const OTHER_CLIENT_TOKEN: &str = "other-client-token";

pub(super) const EVERYONE: [Actor; 5] = [ADMIN, CLIENT, PROVIDER_A, PROVIDER_B, OTHER_CLIENT];

pub(super) type TestService<R> = MarketplaceService<R, TokenRegistry>;

pub(super) fn identities() -> TokenRegistry {
    TokenRegistry::new()
        .with_token(ADMIN_TOKEN, ADMIN)
        .with_token(CLIENT_TOKEN, CLIENT)
        .with_token(PROVIDER_A_TOKEN, PROVIDER_A)
        .with_token(PROVIDER_B_TOKEN, PROVIDER_B)
        .with_token(OTHER_CLIENT_TOKEN, OTHER_CLIENT)
}

pub(super) fn account(actor: Actor, name: &str) -> User {
    User {
        id: actor.user_id,
        name: name.to_string(),
        role: actor.role,
        active: true,
        badge: None,
    }
}

pub(super) fn seed_users<R>(service: &TestService<R>)
where
    R: MarketplaceRepository + 'static,
{
    for (actor, name) in EVERYONE
        .iter()
        .zip(["Rana", "Omar", "Layla", "Karim", "Hana"])
    {
        service
            .ensure_user(account(*actor, name))
            .expect("seed user");
    }
}

pub(super) fn service_with<R>(repository: Arc<R>) -> TestService<R>
where
    R: MarketplaceRepository + 'static,
{
    let service = MarketplaceService::new(repository, Arc::new(identities()));
    seed_users(&service);
    service
}

pub(super) fn build_service() -> (TestService<InMemoryRepository>, Arc<InMemoryRepository>) {
    let repository = Arc::new(InMemoryRepository::new());
    let service = service_with(repository.clone());
    (service, repository)
}

pub(super) fn details() -> RequestDetails {
    RequestDetails {
        title: "Kitchen renovation".to_string(),
        description: "Replace cabinets and countertops".to_string(),
        category: Some("renovation".to_string()),
        city: Some("Amman".to_string()),
        address: Some("12 Rainbow Street".to_string()),
        budget_min: Some(1500),
        budget_max: Some(4000),
        deadline: None,
    }
}

pub(super) fn terms(price: i64, days: i64) -> BidTerms {
    BidTerms {
        price,
        days,
        note: None,
    }
}

pub(super) fn open_request<R>(service: &TestService<R>) -> ServiceRequest
where
    R: MarketplaceRepository + 'static,
{
    let request = service
        .create_request(&CLIENT, details())
        .expect("request created");
    service
        .moderate_request(&ADMIN, request.id, ModerationDecision::Open, None)
        .expect("request opened")
}

/// Open request with a pending bid from each provider.
pub(super) fn contested_request<R>(service: &TestService<R>) -> (ServiceRequest, Bid, Bid)
where
    R: MarketplaceRepository + 'static,
{
    let request = open_request(service);
    let first = service
        .submit_bid(&PROVIDER_A, request.id, terms(3200, 14))
        .expect("first bid");
    let second = service
        .submit_bid(&PROVIDER_B, request.id, terms(2800, 21))
        .expect("second bid");
    (request, first, second)
}

pub(super) fn assigned_request<R>(service: &TestService<R>) -> ServiceRequest
where
    R: MarketplaceRepository + 'static,
{
    let request = open_request(service);
    let bid = service
        .submit_bid(&PROVIDER_B, request.id, terms(2800, 21))
        .expect("bid submitted");
    service
        .accept_bid(&CLIENT, bid.id)
        .expect("bid accepted")
        .request
}

pub(super) fn completed_request<R>(service: &TestService<R>) -> ServiceRequest
where
    R: MarketplaceRepository + 'static,
{
    let request = assigned_request(service);
    service
        .complete_request(&ADMIN, request.id)
        .expect("request completed")
}

pub(super) fn notifications_of<R>(service: &TestService<R>, actor: &Actor) -> Vec<Notification>
where
    R: MarketplaceRepository + 'static,
{
    service
        .list_notifications(actor)
        .expect("notifications listed")
}

pub(super) fn total_notifications<R>(service: &TestService<R>) -> usize
where
    R: MarketplaceRepository + 'static,
{
    EVERYONE
        .iter()
        .map(|actor| notifications_of(service, actor).len())
        .sum()
}

/// Delegates to an in-memory store but refuses every notification write.
#[derive(Default, Clone)]
pub(super) struct NotificationOutageRepository {
    pub(super) inner: InMemoryRepository,
}

impl MarketplaceRepository for NotificationOutageRepository {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn MarketplaceStore) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        self.inner.transaction(|store| {
            let mut guarded = NotificationOutage { inner: store };
            work(&mut guarded)
        })
    }
}

struct NotificationOutage<'a> {
    inner: &'a mut dyn MarketplaceStore,
}

impl MarketplaceStore for NotificationOutage<'_> {
    fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.inner.user(id)
    }

    fn users_with_role(&self, role: Role) -> Result<Vec<User>, RepositoryError> {
        self.inner.users_with_role(role)
    }

    fn insert_user(&mut self, user: User) -> Result<User, RepositoryError> {
        self.inner.insert_user(user)
    }

    fn save_user(&mut self, user: &User) -> Result<(), RepositoryError> {
        self.inner.save_user(user)
    }

    fn request(&self, id: RequestId) -> Result<Option<ServiceRequest>, RepositoryError> {
        self.inner.request(id)
    }

    fn insert_request(&mut self, draft: NewRequest) -> Result<ServiceRequest, RepositoryError> {
        self.inner.insert_request(draft)
    }

    fn save_request(&mut self, request: &ServiceRequest) -> Result<(), RepositoryError> {
        self.inner.save_request(request)
    }

    fn bid(&self, id: BidId) -> Result<Option<Bid>, RepositoryError> {
        self.inner.bid(id)
    }

    fn bids_for_request(&self, request_id: RequestId) -> Result<Vec<Bid>, RepositoryError> {
        self.inner.bids_for_request(request_id)
    }

    fn insert_bid(&mut self, draft: NewBid) -> Result<Bid, RepositoryError> {
        self.inner.insert_bid(draft)
    }

    fn save_bid(&mut self, bid: &Bid) -> Result<(), RepositoryError> {
        self.inner.save_bid(bid)
    }

    fn insert_review(&mut self, draft: NewReview) -> Result<Review, RepositoryError> {
        self.inner.insert_review(draft)
    }

    fn reviews_of(&self, reviewed: UserId) -> Result<Vec<Review>, RepositoryError> {
        self.inner.reviews_of(reviewed)
    }

    fn insert_notification(
        &mut self,
        _draft: NewNotification,
    ) -> Result<Notification, RepositoryError> {
        Err(RepositoryError::Unavailable("notification table locked".to_string()))
    }

    fn notification(&self, id: NotificationId) -> Result<Option<Notification>, RepositoryError> {
        self.inner.notification(id)
    }

    fn notifications_for(&self, recipient: UserId) -> Result<Vec<Notification>, RepositoryError> {
        self.inner.notifications_for(recipient)
    }

    fn mark_notification_read(&mut self, id: NotificationId) -> Result<(), RepositoryError> {
        self.inner.mark_notification_read(id)
    }

    fn counts(&self) -> Result<MarketplaceCounts, RepositoryError> {
        self.inner.counts()
    }
}

pub(super) struct UnavailableRepository;

impl MarketplaceRepository for UnavailableRepository {
    fn transaction<T, E, F>(&self, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn MarketplaceStore) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(E::from(RepositoryError::Unavailable(
            "database offline".to_string(),
        )))
    }
}

pub(super) fn router_with_service<R>(service: TestService<R>) -> axum::Router
where
    R: MarketplaceRepository + 'static,
{
    marketplace_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
