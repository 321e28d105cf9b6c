use std::sync::Arc;

use super::common::*;

use crate::workflows::marketplace::domain::{
    ModerationDecision, NotificationId, NotificationKind, RequestStatus, Role, User, UserId,
    UserStatusUpdate,
};
use crate::workflows::marketplace::events::{NotificationEvent, Recipient};
use crate::workflows::marketplace::identity::Actor;
use crate::workflows::marketplace::memory::InMemoryRepository;
use crate::workflows::marketplace::notifications::NotificationDispatcher;
use crate::workflows::marketplace::MarketplaceError;

#[test]
fn failed_notification_writes_do_not_undo_the_transition() {
    let repository = Arc::new(NotificationOutageRepository::default());
    let service = service_with(repository);

    let (request, _, second) = contested_request(&service);
    let acceptance = service
        .accept_bid(&CLIENT, second.id)
        .expect("acceptance commits without notifications");

    assert_eq!(acceptance.request.status, RequestStatus::InProgress);
    let stored = service
        .get_request(&ADMIN, request.id)
        .expect("request readable");
    assert_eq!(stored.assigned_provider, Some(PROVIDER_B.user_id));
    assert_eq!(total_notifications(&service), 0);
}

#[test]
fn admin_fan_out_skips_suspended_admins() {
    let (service, _) = build_service();
    let deputy = Actor::new(UserId(6), Role::Admin);
    service
        .ensure_user(User {
            id: deputy.user_id,
            name: "Sami".to_string(),
            role: Role::Admin,
            active: true,
            badge: None,
        })
        .expect("deputy admin");

    service
        .create_request(&CLIENT, details())
        .expect("first request");
    assert_eq!(notifications_of(&service, &deputy).len(), 1);

    service
        .set_user_status(
            &ADMIN,
            deputy.user_id,
            UserStatusUpdate {
                active: false,
                badge: None,
            },
        )
        .expect("deputy suspended");
    service
        .create_request(&CLIENT, details())
        .expect("second request");

    assert_eq!(notifications_of(&service, &deputy).len(), 1);
    assert_eq!(notifications_of(&service, &ADMIN).len(), 2);
}

#[test]
fn inbox_lists_newest_first() {
    let (service, _) = build_service();
    let request = service
        .create_request(&CLIENT, details())
        .expect("request created");
    service
        .moderate_request(&ADMIN, request.id, ModerationDecision::Open, None)
        .expect("opened");
    service
        .submit_bid(&PROVIDER_A, request.id, terms(900, 3))
        .expect("bid");

    let kinds: Vec<NotificationKind> = notifications_of(&service, &CLIENT)
        .into_iter()
        .map(|notification| notification.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![NotificationKind::NewBid, NotificationKind::ModerationDecision]
    );
}

#[test]
fn only_the_recipient_marks_a_notification_read() {
    let (service, _) = build_service();
    open_request(&service);
    let notification = notifications_of(&service, &CLIENT)
        .into_iter()
        .next()
        .expect("moderation notice");
    assert!(!notification.read);

    let err = service
        .mark_notification_read(&ADMIN, notification.id)
        .expect_err("admins cannot read a client's inbox");
    assert!(matches!(err, MarketplaceError::Forbidden(_)));

    let read = service
        .mark_notification_read(&CLIENT, notification.id)
        .expect("marked read");
    assert!(read.read);
    let again = service
        .mark_notification_read(&CLIENT, notification.id)
        .expect("idempotent");
    assert!(again.read);
    assert!(notifications_of(&service, &CLIENT)[0].read);

    assert_eq!(
        service.mark_notification_read(&CLIENT, NotificationId(999)),
        Err(MarketplaceError::NotFound("notification"))
    );
}

#[test]
fn dispatcher_counts_rows_per_recipient() {
    let (service, repository) = build_service();
    let dispatcher = NotificationDispatcher::new(repository);

    let recorded = dispatcher.dispatch(vec![
        NotificationEvent::new(
            Recipient::User(CLIENT.user_id),
            NotificationKind::RequestCompleted,
            "Done",
            "All finished",
        )
        .referencing(12),
        NotificationEvent::new(
            Recipient::Admins,
            NotificationKind::NewRequest,
            "Review",
            "Something to review",
        ),
    ]);

    assert_eq!(recorded, 2);
    let inbox = notifications_of(&service, &CLIENT);
    assert_eq!(inbox[0].title, "Done");
    assert_eq!(inbox[0].reference, Some(12));
}

#[test]
fn dispatcher_survives_a_broken_store() {
    let dispatcher = NotificationDispatcher::new(Arc::new(UnavailableRepository));
    let recorded = dispatcher.dispatch(vec![
        NotificationEvent::new(
            Recipient::User(CLIENT.user_id),
            NotificationKind::NewBid,
            "Bid",
            "New bid",
        ),
        NotificationEvent::new(
            Recipient::Admins,
            NotificationKind::NewBid,
            "Bid",
            "New bid",
        ),
    ]);
    assert_eq!(recorded, 0);

    let empty = NotificationDispatcher::new(Arc::new(InMemoryRepository::new()));
    assert_eq!(empty.dispatch(Vec::new()), 0);
}
