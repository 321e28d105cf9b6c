use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::domain::{
    project_number, Bid, BidId, BidStatus, Notification, NotificationId, RequestId,
    RequestStatus, Review, ReviewId, Role, ServiceRequest, User, UserId,
};
use super::repository::{
    MarketplaceCounts, MarketplaceRepository, MarketplaceStore, NewBid, NewNotification,
    NewRequest, NewReview, RepositoryError,
};

/// Process-local repository backed by ordered maps.
///
/// A transaction holds the table lock for its whole duration and writes in place,
/// recording the prior value of every touched row. Unless the work returns `Ok`, the
/// recorded values are restored on the way out, so a failed transaction leaves the
/// tables as it found them. Reads never copy the tables.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRepository {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarketplaceRepository for InMemoryRepository {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn MarketplaceStore) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut tables = self.tables.lock().map_err(|_| {
            E::from(RepositoryError::Unavailable(
                "in-memory tables poisoned".to_string(),
            ))
        })?;

        let mut session = Session::begin(&mut tables);
        let value = work(&mut session)?;
        session.commit();
        Ok(value)
    }
}

#[derive(Debug, Default, Clone)]
struct Tables {
    users: BTreeMap<UserId, User>,
    requests: BTreeMap<RequestId, ServiceRequest>,
    bids: BTreeMap<BidId, Bid>,
    reviews: BTreeMap<ReviewId, Review>,
    notifications: BTreeMap<NotificationId, Notification>,
    sequences: Sequences,
}

/// Last id handed out per table.
#[derive(Debug, Default, Clone, Copy)]
struct Sequences {
    request: i64,
    bid: i64,
    review: i64,
    notification: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Prior state of a row touched inside a transaction. `None` means the row did not
/// exist before.
#[derive(Debug)]
enum Undo {
    User(UserId, Option<User>),
    Request(RequestId, Option<ServiceRequest>),
    Bid(BidId, Option<Bid>),
    Review(ReviewId),
    Notification(NotificationId, Option<Notification>),
}

fn restore<K: Ord, V>(table: &mut BTreeMap<K, V>, key: K, prior: Option<V>) {
    match prior {
        Some(row) => {
            table.insert(key, row);
        }
        None => {
            table.remove(&key);
        }
    }
}

/// Write-through view of the tables that rolls back on drop unless committed.
struct Session<'a> {
    tables: &'a mut Tables,
    sequences: Sequences,
    undo: Vec<Undo>,
    committed: bool,
}

impl<'a> Session<'a> {
    fn begin(tables: &'a mut Tables) -> Self {
        Self {
            sequences: tables.sequences,
            tables,
            undo: Vec::new(),
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }

    fn rollback(&mut self) {
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::User(id, prior) => restore(&mut self.tables.users, id, prior),
                Undo::Request(id, prior) => restore(&mut self.tables.requests, id, prior),
                Undo::Bid(id, prior) => restore(&mut self.tables.bids, id, prior),
                Undo::Review(id) => {
                    self.tables.reviews.remove(&id);
                }
                Undo::Notification(id, prior) => {
                    restore(&mut self.tables.notifications, id, prior)
                }
            }
        }
        self.tables.sequences = self.sequences;
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

impl MarketplaceStore for Session<'_> {
    fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.tables.user(id)
    }

    fn users_with_role(&self, role: Role) -> Result<Vec<User>, RepositoryError> {
        self.tables.users_with_role(role)
    }

    fn insert_user(&mut self, user: User) -> Result<User, RepositoryError> {
        let user = self.tables.insert_user(user)?;
        self.undo.push(Undo::User(user.id, None));
        Ok(user)
    }

    fn save_user(&mut self, user: &User) -> Result<(), RepositoryError> {
        let prior = self.tables.users.get(&user.id).cloned();
        self.tables.save_user(user)?;
        self.undo.push(Undo::User(user.id, prior));
        Ok(())
    }

    fn request(&self, id: RequestId) -> Result<Option<ServiceRequest>, RepositoryError> {
        self.tables.request(id)
    }

    fn insert_request(&mut self, draft: NewRequest) -> Result<ServiceRequest, RepositoryError> {
        let request = self.tables.insert_request(draft)?;
        self.undo.push(Undo::Request(request.id, None));
        Ok(request)
    }

    fn save_request(&mut self, request: &ServiceRequest) -> Result<(), RepositoryError> {
        let prior = self.tables.requests.get(&request.id).cloned();
        self.tables.save_request(request)?;
        self.undo.push(Undo::Request(request.id, prior));
        Ok(())
    }

    fn bid(&self, id: BidId) -> Result<Option<Bid>, RepositoryError> {
        self.tables.bid(id)
    }

    fn bids_for_request(&self, request_id: RequestId) -> Result<Vec<Bid>, RepositoryError> {
        self.tables.bids_for_request(request_id)
    }

    fn insert_bid(&mut self, draft: NewBid) -> Result<Bid, RepositoryError> {
        let bid = self.tables.insert_bid(draft)?;
        self.undo.push(Undo::Bid(bid.id, None));
        Ok(bid)
    }

    fn save_bid(&mut self, bid: &Bid) -> Result<(), RepositoryError> {
        let prior = self.tables.bids.get(&bid.id).cloned();
        self.tables.save_bid(bid)?;
        self.undo.push(Undo::Bid(bid.id, prior));
        Ok(())
    }

    fn insert_review(&mut self, draft: NewReview) -> Result<Review, RepositoryError> {
        let review = self.tables.insert_review(draft)?;
        self.undo.push(Undo::Review(review.id));
        Ok(review)
    }

    fn reviews_of(&self, reviewed: UserId) -> Result<Vec<Review>, RepositoryError> {
        self.tables.reviews_of(reviewed)
    }

    fn insert_notification(
        &mut self,
        draft: NewNotification,
    ) -> Result<Notification, RepositoryError> {
        let notification = self.tables.insert_notification(draft)?;
        self.undo.push(Undo::Notification(notification.id, None));
        Ok(notification)
    }

    fn notification(&self, id: NotificationId) -> Result<Option<Notification>, RepositoryError> {
        self.tables.notification(id)
    }

    fn notifications_for(&self, recipient: UserId) -> Result<Vec<Notification>, RepositoryError> {
        self.tables.notifications_for(recipient)
    }

    fn mark_notification_read(&mut self, id: NotificationId) -> Result<(), RepositoryError> {
        let prior = self.tables.notifications.get(&id).cloned();
        self.tables.mark_notification_read(id)?;
        self.undo.push(Undo::Notification(id, prior));
        Ok(())
    }

    fn counts(&self) -> Result<MarketplaceCounts, RepositoryError> {
        self.tables.counts()
    }
}

impl MarketplaceStore for Tables {
    fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.get(&id).cloned())
    }

    fn users_with_role(&self, role: Role) -> Result<Vec<User>, RepositoryError> {
        Ok(self
            .users
            .values()
            .filter(|user| user.role == role)
            .cloned()
            .collect())
    }

    fn insert_user(&mut self, user: User) -> Result<User, RepositoryError> {
        if self.users.contains_key(&user.id) {
            return Err(RepositoryError::Conflict(format!(
                "user {} already exists",
                user.id
            )));
        }
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn save_user(&mut self, user: &User) -> Result<(), RepositoryError> {
        let slot = self.users.get_mut(&user.id).ok_or(RepositoryError::NotFound)?;
        *slot = user.clone();
        Ok(())
    }

    fn request(&self, id: RequestId) -> Result<Option<ServiceRequest>, RepositoryError> {
        Ok(self.requests.get(&id).cloned())
    }

    fn insert_request(&mut self, draft: NewRequest) -> Result<ServiceRequest, RepositoryError> {
        let id = RequestId(next_id(&mut self.sequences.request));
        let request = ServiceRequest {
            id,
            project_number: project_number(id, draft.created_at),
            client_id: draft.client_id,
            status: RequestStatus::PendingReview,
            details: draft.details,
            assigned_provider: None,
            accepted_bid: None,
            admin_notes: None,
            created_at: draft.created_at,
            assigned_at: None,
            completed_at: None,
        };
        self.requests.insert(id, request.clone());
        Ok(request)
    }

    fn save_request(&mut self, request: &ServiceRequest) -> Result<(), RepositoryError> {
        let slot = self
            .requests
            .get_mut(&request.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = request.clone();
        Ok(())
    }

    fn bid(&self, id: BidId) -> Result<Option<Bid>, RepositoryError> {
        Ok(self.bids.get(&id).cloned())
    }

    fn bids_for_request(&self, request_id: RequestId) -> Result<Vec<Bid>, RepositoryError> {
        Ok(self
            .bids
            .values()
            .filter(|bid| bid.request_id == request_id)
            .cloned()
            .collect())
    }

    fn insert_bid(&mut self, draft: NewBid) -> Result<Bid, RepositoryError> {
        let duplicate = self
            .bids
            .values()
            .any(|bid| bid.request_id == draft.request_id && bid.provider_id == draft.provider_id);
        if duplicate {
            return Err(RepositoryError::Conflict("duplicate bid".to_string()));
        }

        let id = BidId(next_id(&mut self.sequences.bid));
        let bid = Bid {
            id,
            request_id: draft.request_id,
            provider_id: draft.provider_id,
            terms: draft.terms,
            status: BidStatus::Pending,
            created_at: draft.created_at,
        };
        self.bids.insert(id, bid.clone());
        Ok(bid)
    }

    fn save_bid(&mut self, bid: &Bid) -> Result<(), RepositoryError> {
        let slot = self.bids.get_mut(&bid.id).ok_or(RepositoryError::NotFound)?;
        *slot = bid.clone();
        Ok(())
    }

    fn insert_review(&mut self, draft: NewReview) -> Result<Review, RepositoryError> {
        let duplicate = self.reviews.values().any(|review| {
            review.request_id == draft.request_id && review.reviewer_id == draft.reviewer_id
        });
        if duplicate {
            return Err(RepositoryError::Conflict("already reviewed".to_string()));
        }

        let id = ReviewId(next_id(&mut self.sequences.review));
        let review = Review {
            id,
            request_id: draft.request_id,
            reviewer_id: draft.reviewer_id,
            reviewed_id: draft.reviewed_id,
            rating: draft.rating,
            comment: draft.comment,
            direction: draft.direction,
            created_at: draft.created_at,
        };
        self.reviews.insert(id, review.clone());
        Ok(review)
    }

    fn reviews_of(&self, reviewed: UserId) -> Result<Vec<Review>, RepositoryError> {
        Ok(self
            .reviews
            .values()
            .filter(|review| review.reviewed_id == reviewed)
            .cloned()
            .collect())
    }

    fn insert_notification(
        &mut self,
        draft: NewNotification,
    ) -> Result<Notification, RepositoryError> {
        let id = NotificationId(next_id(&mut self.sequences.notification));
        let notification = Notification {
            id,
            recipient: draft.recipient,
            title: draft.title,
            body: draft.body,
            kind: draft.kind,
            reference: draft.reference,
            read: false,
            created_at: draft.created_at,
        };
        self.notifications.insert(id, notification.clone());
        Ok(notification)
    }

    fn notification(&self, id: NotificationId) -> Result<Option<Notification>, RepositoryError> {
        Ok(self.notifications.get(&id).cloned())
    }

    fn notifications_for(&self, recipient: UserId) -> Result<Vec<Notification>, RepositoryError> {
        let mut matching: Vec<Notification> = self
            .notifications
            .values()
            .filter(|notification| notification.recipient == recipient)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matching)
    }

    fn mark_notification_read(&mut self, id: NotificationId) -> Result<(), RepositoryError> {
        let notification = self
            .notifications
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        notification.read = true;
        Ok(())
    }

    fn counts(&self) -> Result<MarketplaceCounts, RepositoryError> {
        Ok(MarketplaceCounts {
            users: self.users.len() as u64,
            requests: self.requests.len() as u64,
            bids: self.bids.len() as u64,
        })
    }
}
