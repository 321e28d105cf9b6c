//! SQLite persistence for the marketplace tables.
//!
//! Uniqueness of (request, provider) on bids and (request, reviewer) on reviews is
//! enforced by the schema. Status columns carry `CHECK` constraints so the closed
//! enumerations survive a trip through the database.
//!
//! # Schema Versioning
//!
//! The schema version lives in SQLite's `user_version` pragma. Bump
//! `SCHEMA_VERSION` and add a `migrate_v{N}_to_v{N+1}` step when the schema changes.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};

use super::domain::{
    project_number, Bid, BidId, BidStatus, BidTerms, Notification, NotificationId,
    NotificationKind, RequestDetails, RequestId, RequestStatus, Review, ReviewDirection, ReviewId,
    Role, ServiceRequest, User, UserId,
};
use super::repository::{
    MarketplaceCounts, MarketplaceRepository, MarketplaceStore, NewBid, NewNotification,
    NewRequest, NewReview, RepositoryError,
};

const SCHEMA_VERSION: i32 = 1;

const REQUEST_COLUMNS: &str = "id, client_id, title, description, category, city, address, \
     budget_min, budget_max, deadline, status, assigned_provider, accepted_bid, admin_notes, \
     created_at, assigned_at, completed_at";
const BID_COLUMNS: &str = "id, request_id, provider_id, price, days, note, status, created_at";
const REVIEW_COLUMNS: &str =
    "id, request_id, reviewer_id, reviewed_id, rating, comment, direction, created_at";
const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, title, body, kind, reference_id, is_read, created_at";

/// SQLite-backed repository.
///
/// `rusqlite::Connection` is not `Sync`, so the connection sits behind a mutex and
/// every transaction holds it until commit or rollback.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open or create the database file at `path`. `:memory:` yields a private
    /// in-memory database.
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path).map_err(storage_error)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, RepositoryError> {
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(storage_error)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl MarketplaceRepository for SqliteRepository {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn MarketplaceStore) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut conn = self.conn.lock().map_err(|_| {
            E::from(RepositoryError::Unavailable(
                "sqlite connection poisoned".to_string(),
            ))
        })?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|error| E::from(storage_error(error)))?;

        let mut store = SqliteStore { conn: &tx };
        let value = work(&mut store)?;

        tx.commit().map_err(|error| E::from(storage_error(error)))?;
        Ok(value)
    }
}

fn init_schema(conn: &Connection) -> Result<(), RepositoryError> {
    let current_version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(storage_error)?;

    if current_version > SCHEMA_VERSION {
        return Err(RepositoryError::Unavailable(format!(
            "database schema version {current_version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    if current_version < 1 {
        migrate_v0_to_v1(conn)?;
    }

    if current_version < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(storage_error)?;
    }

    Ok(())
}

fn migrate_v0_to_v1(conn: &Connection) -> Result<(), RepositoryError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('client', 'provider', 'admin')),
            active INTEGER NOT NULL DEFAULT 1,
            badge TEXT
        );

        CREATE TABLE IF NOT EXISTS requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            client_id INTEGER NOT NULL REFERENCES users(id),
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            category TEXT,
            city TEXT,
            address TEXT,
            budget_min INTEGER,
            budget_max INTEGER,
            deadline TEXT,
            status TEXT NOT NULL CHECK(status IN (
                'pending_review', 'open', 'in_progress', 'completed', 'rejected', 'cancelled'
            )),
            assigned_provider INTEGER REFERENCES users(id),
            accepted_bid INTEGER,
            admin_notes TEXT,
            created_at TEXT NOT NULL,
            assigned_at TEXT,
            completed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS bids (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id INTEGER NOT NULL REFERENCES requests(id),
            provider_id INTEGER NOT NULL REFERENCES users(id),
            price INTEGER NOT NULL CHECK(price > 0),
            days INTEGER NOT NULL CHECK(days > 0),
            note TEXT,
            status TEXT NOT NULL CHECK(status IN ('pending', 'accepted', 'rejected')),
            created_at TEXT NOT NULL,
            UNIQUE (request_id, provider_id)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_one_accepted_bid
        ON bids(request_id) WHERE status = 'accepted';

        CREATE TABLE IF NOT EXISTS reviews (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id INTEGER NOT NULL REFERENCES requests(id),
            reviewer_id INTEGER NOT NULL REFERENCES users(id),
            reviewed_id INTEGER NOT NULL REFERENCES users(id),
            rating INTEGER NOT NULL CHECK(rating BETWEEN 1 AND 5),
            comment TEXT NOT NULL DEFAULT '',
            direction TEXT NOT NULL CHECK(direction IN (
                'client_to_provider', 'provider_to_client'
            )),
            created_at TEXT NOT NULL,
            UNIQUE (request_id, reviewer_id)
        );

        CREATE INDEX IF NOT EXISTS idx_reviews_reviewed ON reviews(reviewed_id);

        CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipient_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            kind TEXT NOT NULL,
            reference_id INTEGER,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
        ON notifications(recipient_id, created_at);
        "#,
    )
    .map_err(storage_error)
}

fn storage_error(error: rusqlite::Error) -> RepositoryError {
    RepositoryError::Unavailable(error.to_string())
}

/// Map a UNIQUE violation to a conflict carrying `label`; anything else is a
/// storage failure.
fn unique_violation(error: rusqlite::Error, label: &str) -> RepositoryError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            RepositoryError::Conflict(label.to_string())
        }
        _ => storage_error(error),
    }
}

fn expect_changed(changed: usize) -> Result<(), RepositoryError> {
    if changed == 0 {
        Err(RepositoryError::NotFound)
    } else {
        Ok(())
    }
}

fn decode<T>(index: usize, raw: String, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Text,
            format!("unrecognised value '{raw}'").into(),
        )
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        name: row.get(1)?,
        role: decode(2, row.get(2)?, Role::parse)?,
        active: row.get(3)?,
        badge: row.get(4)?,
    })
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<ServiceRequest> {
    let id = RequestId(row.get(0)?);
    let created_at = row.get(14)?;
    Ok(ServiceRequest {
        id,
        project_number: project_number(id, created_at),
        client_id: UserId(row.get(1)?),
        details: RequestDetails {
            title: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            city: row.get(5)?,
            address: row.get(6)?,
            budget_min: row.get(7)?,
            budget_max: row.get(8)?,
            deadline: row.get(9)?,
        },
        status: decode(10, row.get(10)?, RequestStatus::parse)?,
        assigned_provider: row.get::<_, Option<i64>>(11)?.map(UserId),
        accepted_bid: row.get::<_, Option<i64>>(12)?.map(BidId),
        admin_notes: row.get(13)?,
        created_at,
        assigned_at: row.get(15)?,
        completed_at: row.get(16)?,
    })
}

fn bid_from_row(row: &Row<'_>) -> rusqlite::Result<Bid> {
    Ok(Bid {
        id: BidId(row.get(0)?),
        request_id: RequestId(row.get(1)?),
        provider_id: UserId(row.get(2)?),
        terms: BidTerms {
            price: row.get(3)?,
            days: row.get(4)?,
            note: row.get(5)?,
        },
        status: decode(6, row.get(6)?, BidStatus::parse)?,
        created_at: row.get(7)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: ReviewId(row.get(0)?),
        request_id: RequestId(row.get(1)?),
        reviewer_id: UserId(row.get(2)?),
        reviewed_id: UserId(row.get(3)?),
        rating: row.get(4)?,
        comment: row.get(5)?,
        direction: decode(6, row.get(6)?, ReviewDirection::parse)?,
        created_at: row.get(7)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: NotificationId(row.get(0)?),
        recipient: UserId(row.get(1)?),
        title: row.get(2)?,
        body: row.get(3)?,
        kind: decode(4, row.get(4)?, NotificationKind::parse)?,
        reference: row.get(5)?,
        read: row.get(6)?,
        created_at: row.get(7)?,
    })
}

struct SqliteStore<'tx> {
    conn: &'tx Connection,
}

impl SqliteStore<'_> {
    fn query_one<T>(
        &self,
        sql: &str,
        id: i64,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>, RepositoryError> {
        self.conn
            .query_row(sql, params![id], map)
            .optional()
            .map_err(storage_error)
    }

    fn query_many<T>(
        &self,
        sql: &str,
        key: &dyn rusqlite::ToSql,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, RepositoryError> {
        let mut statement = self.conn.prepare(sql).map_err(storage_error)?;
        let rows = statement
            .query_map(params![key], map)
            .map_err(storage_error)?;
        rows.collect::<rusqlite::Result<Vec<T>>>()
            .map_err(storage_error)
    }
}

impl MarketplaceStore for SqliteStore<'_> {
    fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.query_one(
            "SELECT id, name, role, active, badge FROM users WHERE id = ?1",
            id.0,
            user_from_row,
        )
    }

    fn users_with_role(&self, role: Role) -> Result<Vec<User>, RepositoryError> {
        self.query_many(
            "SELECT id, name, role, active, badge FROM users WHERE role = ?1 ORDER BY id",
            &role.label(),
            user_from_row,
        )
    }

    fn insert_user(&mut self, user: User) -> Result<User, RepositoryError> {
        self.conn
            .execute(
                "INSERT INTO users (id, name, role, active, badge) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user.id.0, user.name, user.role.label(), user.active, user.badge],
            )
            .map_err(|error| unique_violation(error, &format!("user {} already exists", user.id)))?;
        Ok(user)
    }

    fn save_user(&mut self, user: &User) -> Result<(), RepositoryError> {
        let changed = self
            .conn
            .execute(
                "UPDATE users SET name = ?2, role = ?3, active = ?4, badge = ?5 WHERE id = ?1",
                params![user.id.0, user.name, user.role.label(), user.active, user.badge],
            )
            .map_err(storage_error)?;
        expect_changed(changed)
    }

    fn request(&self, id: RequestId) -> Result<Option<ServiceRequest>, RepositoryError> {
        self.query_one(
            &format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1"),
            id.0,
            request_from_row,
        )
    }

    fn insert_request(&mut self, draft: NewRequest) -> Result<ServiceRequest, RepositoryError> {
        let details = &draft.details;
        self.conn
            .execute(
                "INSERT INTO requests (client_id, title, description, category, city, address, \
                 budget_min, budget_max, deadline, status, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    draft.client_id.0,
                    details.title,
                    details.description,
                    details.category,
                    details.city,
                    details.address,
                    details.budget_min,
                    details.budget_max,
                    details.deadline,
                    RequestStatus::PendingReview.label(),
                    draft.created_at,
                ],
            )
            .map_err(storage_error)?;

        let id = RequestId(self.conn.last_insert_rowid());
        self.request(id)?.ok_or(RepositoryError::NotFound)
    }

    fn save_request(&mut self, request: &ServiceRequest) -> Result<(), RepositoryError> {
        let details = &request.details;
        let changed = self
            .conn
            .execute(
                "UPDATE requests SET title = ?2, description = ?3, category = ?4, city = ?5, \
                 address = ?6, budget_min = ?7, budget_max = ?8, deadline = ?9, status = ?10, \
                 assigned_provider = ?11, accepted_bid = ?12, admin_notes = ?13, \
                 assigned_at = ?14, completed_at = ?15 WHERE id = ?1",
                params![
                    request.id.0,
                    details.title,
                    details.description,
                    details.category,
                    details.city,
                    details.address,
                    details.budget_min,
                    details.budget_max,
                    details.deadline,
                    request.status.label(),
                    request.assigned_provider.map(|id| id.0),
                    request.accepted_bid.map(|id| id.0),
                    request.admin_notes,
                    request.assigned_at,
                    request.completed_at,
                ],
            )
            .map_err(storage_error)?;
        expect_changed(changed)
    }

    fn bid(&self, id: BidId) -> Result<Option<Bid>, RepositoryError> {
        self.query_one(
            &format!("SELECT {BID_COLUMNS} FROM bids WHERE id = ?1"),
            id.0,
            bid_from_row,
        )
    }

    fn bids_for_request(&self, request_id: RequestId) -> Result<Vec<Bid>, RepositoryError> {
        self.query_many(
            &format!("SELECT {BID_COLUMNS} FROM bids WHERE request_id = ?1 ORDER BY id"),
            &request_id.0,
            bid_from_row,
        )
    }

    fn insert_bid(&mut self, draft: NewBid) -> Result<Bid, RepositoryError> {
        self.conn
            .execute(
                "INSERT INTO bids (request_id, provider_id, price, days, note, status, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    draft.request_id.0,
                    draft.provider_id.0,
                    draft.terms.price,
                    draft.terms.days,
                    draft.terms.note,
                    BidStatus::Pending.label(),
                    draft.created_at,
                ],
            )
            .map_err(|error| unique_violation(error, "duplicate bid"))?;

        let id = BidId(self.conn.last_insert_rowid());
        self.bid(id)?.ok_or(RepositoryError::NotFound)
    }

    fn save_bid(&mut self, bid: &Bid) -> Result<(), RepositoryError> {
        let changed = self
            .conn
            .execute(
                "UPDATE bids SET price = ?2, days = ?3, note = ?4, status = ?5 WHERE id = ?1",
                params![
                    bid.id.0,
                    bid.terms.price,
                    bid.terms.days,
                    bid.terms.note,
                    bid.status.label(),
                ],
            )
            .map_err(|error| unique_violation(error, "request already has an accepted bid"))?;
        expect_changed(changed)
    }

    fn insert_review(&mut self, draft: NewReview) -> Result<Review, RepositoryError> {
        self.conn
            .execute(
                "INSERT INTO reviews (request_id, reviewer_id, reviewed_id, rating, comment, \
                 direction, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    draft.request_id.0,
                    draft.reviewer_id.0,
                    draft.reviewed_id.0,
                    draft.rating,
                    draft.comment,
                    draft.direction.label(),
                    draft.created_at,
                ],
            )
            .map_err(|error| unique_violation(error, "already reviewed"))?;

        let id = self.conn.last_insert_rowid();
        self.query_one(
            &format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?1"),
            id,
            review_from_row,
        )?
        .ok_or(RepositoryError::NotFound)
    }

    fn reviews_of(&self, reviewed: UserId) -> Result<Vec<Review>, RepositoryError> {
        self.query_many(
            &format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE reviewed_id = ?1 ORDER BY id"),
            &reviewed.0,
            review_from_row,
        )
    }

    fn insert_notification(
        &mut self,
        draft: NewNotification,
    ) -> Result<Notification, RepositoryError> {
        self.conn
            .execute(
                "INSERT INTO notifications (recipient_id, title, body, kind, reference_id, \
                 is_read, created_at) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                params![
                    draft.recipient.0,
                    draft.title,
                    draft.body,
                    draft.kind.label(),
                    draft.reference,
                    draft.created_at,
                ],
            )
            .map_err(storage_error)?;

        let id = NotificationId(self.conn.last_insert_rowid());
        self.notification(id)?.ok_or(RepositoryError::NotFound)
    }

    fn notification(&self, id: NotificationId) -> Result<Option<Notification>, RepositoryError> {
        self.query_one(
            &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
            id.0,
            notification_from_row,
        )
    }

    fn notifications_for(&self, recipient: UserId) -> Result<Vec<Notification>, RepositoryError> {
        self.query_many(
            &format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE recipient_id = ?1 \
                 ORDER BY created_at DESC, id DESC"
            ),
            &recipient.0,
            notification_from_row,
        )
    }

    fn mark_notification_read(&mut self, id: NotificationId) -> Result<(), RepositoryError> {
        let changed = self
            .conn
            .execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1",
                params![id.0],
            )
            .map_err(storage_error)?;
        expect_changed(changed)
    }

    fn counts(&self) -> Result<MarketplaceCounts, RepositoryError> {
        self.conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM users), (SELECT COUNT(*) FROM requests), \
                 (SELECT COUNT(*) FROM bids)",
                [],
                |row| {
                    Ok(MarketplaceCounts {
                        users: row.get::<_, i64>(0)? as u64,
                        requests: row.get::<_, i64>(1)? as u64,
                        bids: row.get::<_, i64>(2)? as u64,
                    })
                },
            )
            .map_err(storage_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn seeded() -> SqliteRepository {
        let repository = SqliteRepository::open_in_memory().expect("in-memory database opens");
        repository
            .transaction(|store| {
                for (id, role) in [(1, Role::Client), (2, Role::Provider), (3, Role::Admin)] {
                    store.insert_user(User {
                        id: UserId(id),
                        name: format!("user-{id}"),
                        role,
                        active: true,
                        badge: None,
                    })?;
                }
                Ok::<_, RepositoryError>(())
            })
            .expect("users seeded");
        repository
    }

    fn new_request() -> NewRequest {
        NewRequest {
            client_id: UserId(1),
            details: RequestDetails {
                title: "Tile the bathroom".to_string(),
                description: "Roughly 12 square metres".to_string(),
                city: Some("Riyadh".to_string()),
                budget_max: Some(4000),
                ..RequestDetails::default()
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn request_round_trips_through_columns() {
        let repository = seeded();
        let stored = repository
            .transaction(|store| store.insert_request(new_request()))
            .expect("request stored");

        assert_eq!(stored.status, RequestStatus::PendingReview);
        assert_eq!(stored.details.city.as_deref(), Some("Riyadh"));
        assert_eq!(stored.project_number, project_number(stored.id, stored.created_at));

        let mut updated = stored.clone();
        updated.status = RequestStatus::Open;
        updated.admin_notes = Some("looks fine".to_string());
        repository
            .transaction(|store| store.save_request(&updated))
            .expect("request updated");

        let reloaded = repository
            .transaction(|store| store.request(stored.id))
            .expect("request loads")
            .expect("request exists");
        assert_eq!(reloaded, updated);
    }

    #[test]
    fn unique_constraints_surface_as_conflicts() {
        let repository = seeded();
        let request = repository
            .transaction(|store| store.insert_request(new_request()))
            .expect("request stored");

        let draft = NewBid {
            request_id: request.id,
            provider_id: UserId(2),
            terms: BidTerms {
                price: 100,
                days: 2,
                note: None,
            },
            created_at: Utc::now(),
        };
        repository
            .transaction(|store| store.insert_bid(draft.clone()))
            .expect("first bid stored");
        let error = repository
            .transaction(|store| store.insert_bid(draft.clone()))
            .expect_err("duplicate rejected");
        assert_eq!(error, RepositoryError::Conflict("duplicate bid".to_string()));
    }

    #[test]
    fn rolled_back_work_is_discarded() {
        let repository = seeded();
        let result: Result<(), RepositoryError> = repository.transaction(|store| {
            store.insert_request(new_request())?;
            Err(RepositoryError::Conflict("abort".to_string()))
        });
        assert!(result.is_err());

        let counts = repository
            .transaction(|store| store.counts())
            .expect("counts load");
        assert_eq!(counts.requests, 0);
        assert_eq!(counts.users, 3);
    }

    #[test]
    fn saving_unknown_rows_reports_not_found() {
        let repository = seeded();
        let error = repository
            .transaction(|store| store.mark_notification_read(NotificationId(42)))
            .expect_err("missing notification");
        assert_eq!(error, RepositoryError::NotFound);
    }
}
