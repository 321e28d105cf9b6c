use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use super::domain::{Notification, NotificationId, NotificationKind, Role, UserId};
use super::events::{NotificationEvent, Recipient};
use super::identity::Actor;
use super::repository::{MarketplaceRepository, NewNotification, RepositoryError};
use super::service::MarketplaceError;

/// Best-effort sink turning committed domain events into notification rows.
///
/// Each notification is written in its own transaction after the triggering change
/// has committed. Write failures are logged and dropped; nothing is retried.
pub struct NotificationDispatcher<R> {
    repository: Arc<R>,
}

impl<R> NotificationDispatcher<R>
where
    R: MarketplaceRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Record every event, returning how many rows were written.
    pub fn dispatch(&self, events: Vec<NotificationEvent>) -> usize {
        let mut recorded = 0;

        for event in events {
            let recipients = match event.recipient {
                Recipient::User(user_id) => vec![user_id],
                Recipient::Admins => match self.active_admins() {
                    Ok(admins) => admins,
                    Err(error) => {
                        warn!(kind = event.kind.label(), %error, "could not resolve admin recipients");
                        continue;
                    }
                },
            };

            for recipient in recipients {
                match self.record(
                    recipient,
                    &event.title,
                    &event.body,
                    event.kind,
                    event.reference,
                ) {
                    Ok(notification) => {
                        recorded += 1;
                        debug!(
                            notification_id = notification.id.0,
                            recipient = recipient.0,
                            kind = event.kind.label(),
                            "notification recorded"
                        );
                    }
                    Err(error) => {
                        warn!(
                            recipient = recipient.0,
                            kind = event.kind.label(),
                            %error,
                            "dropping notification"
                        );
                    }
                }
            }
        }

        recorded
    }

    /// Append a single notification row.
    pub fn record(
        &self,
        recipient: UserId,
        title: &str,
        body: &str,
        kind: NotificationKind,
        reference: Option<i64>,
    ) -> Result<Notification, RepositoryError> {
        let draft = NewNotification {
            recipient,
            title: title.to_string(),
            body: body.to_string(),
            kind,
            reference,
            created_at: Utc::now(),
        };
        self.repository
            .transaction(|store| store.insert_notification(draft))
    }

    /// Notifications for the calling user, newest first.
    pub fn list(&self, actor: &Actor) -> Result<Vec<Notification>, MarketplaceError> {
        self.repository
            .transaction(|store| store.notifications_for(actor.user_id))
            .map_err(MarketplaceError::from)
    }

    /// Flip the read flag; only the recipient may do so.
    pub fn mark_read(
        &self,
        actor: &Actor,
        id: NotificationId,
    ) -> Result<Notification, MarketplaceError> {
        self.repository.transaction(|store| -> Result<_, MarketplaceError> {
            let mut notification = store
                .notification(id)?
                .ok_or(MarketplaceError::NotFound("notification"))?;
            if notification.recipient != actor.user_id {
                return Err(MarketplaceError::Forbidden(
                    "notification belongs to another user".to_string(),
                ));
            }
            if !notification.read {
                store.mark_notification_read(id)?;
                notification.read = true;
            }
            Ok(notification)
        })
    }

    fn active_admins(&self) -> Result<Vec<UserId>, RepositoryError> {
        let admins = self
            .repository
            .transaction(|store| store.users_with_role(Role::Admin))?;
        Ok(admins
            .into_iter()
            .filter(|user| user.active)
            .map(|user| user.id)
            .collect())
    }
}
