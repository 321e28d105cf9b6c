use super::domain::{NotificationKind, UserId};

/// Who a notification event is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    User(UserId),
    /// Every active admin at dispatch time.
    Admins,
}

/// User-facing event emitted by a committed state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub reference: Option<i64>,
}

impl NotificationEvent {
    pub fn new(
        recipient: Recipient,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient,
            kind,
            title: title.into(),
            body: body.into(),
            reference: None,
        }
    }

    pub fn referencing(mut self, reference: i64) -> Self {
        self.reference = Some(reference);
        self
    }
}

/// Result of a state-changing operation plus the events to dispatch once it has
/// committed.
#[derive(Debug, Clone)]
pub struct Transition<T> {
    pub value: T,
    pub events: Vec<NotificationEvent>,
}

impl<T> Transition<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: NotificationEvent) -> Self {
        self.events.push(event);
        self
    }
}
