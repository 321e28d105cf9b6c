use super::common::*;

use crate::workflows::marketplace::domain::{BidId, BidStatus, NotificationKind, RequestStatus};
use crate::workflows::marketplace::MarketplaceError;

#[test]
fn bids_are_only_taken_on_open_requests() {
    let (service, _) = build_service();
    let pending = service
        .create_request(&CLIENT, details())
        .expect("request created");

    let err = service
        .submit_bid(&PROVIDER_A, pending.id, terms(1000, 5))
        .expect_err("request still in review");
    assert!(matches!(err, MarketplaceError::InvalidState(_)));

    let assigned = assigned_request(&service);
    let err = service
        .submit_bid(&PROVIDER_A, assigned.id, terms(1000, 5))
        .expect_err("request already assigned");
    assert!(matches!(err, MarketplaceError::InvalidState(_)));
}

#[test]
fn only_providers_bid() {
    let (service, _) = build_service();
    let request = open_request(&service);

    let err = service
        .submit_bid(&OTHER_CLIENT, request.id, terms(1000, 5))
        .expect_err("clients cannot bid");
    assert!(matches!(err, MarketplaceError::Forbidden(_)));
}

#[test]
fn bid_terms_must_be_positive() {
    let (service, _) = build_service();
    let request = open_request(&service);

    for bad in [terms(0, 5), terms(1000, 0), terms(-20, 3)] {
        let err = service
            .submit_bid(&PROVIDER_A, request.id, bad)
            .expect_err("invalid terms");
        assert!(matches!(err, MarketplaceError::Validation(_)));
    }
}

#[test]
fn second_bid_from_same_provider_conflicts() {
    let (service, _) = build_service();
    let request = open_request(&service);
    service
        .submit_bid(&PROVIDER_A, request.id, terms(3200, 14))
        .expect("first bid");

    let err = service
        .submit_bid(&PROVIDER_A, request.id, terms(3000, 10))
        .expect_err("one bid per provider");
    assert!(matches!(err, MarketplaceError::Conflict(_)));

    let bids = service.list_bids(&CLIENT, request.id).expect("bids listed");
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0].terms.price, 3200);
}

#[test]
fn new_bid_notifies_owner_and_admins() {
    let (service, _) = build_service();
    let request = open_request(&service);
    service
        .submit_bid(&PROVIDER_A, request.id, terms(3200, 14))
        .expect("bid");

    for actor in [CLIENT, ADMIN] {
        let newest = &notifications_of(&service, &actor)[0];
        assert_eq!(newest.kind, NotificationKind::NewBid);
        assert_eq!(newest.reference, Some(request.id.0));
    }
}

#[test]
fn accepting_a_bid_assigns_the_request_and_rejects_siblings() {
    let (service, _) = build_service();
    let (request, first, second) = contested_request(&service);
    let before = total_notifications(&service);

    let acceptance = service
        .accept_bid(&CLIENT, second.id)
        .expect("second bid accepted");

    assert_eq!(acceptance.request.status, RequestStatus::InProgress);
    assert_eq!(acceptance.request.assigned_provider, Some(PROVIDER_B.user_id));
    assert_eq!(acceptance.request.accepted_bid, Some(second.id));
    assert!(acceptance.request.assigned_at.is_some());
    assert_eq!(acceptance.bid.status, BidStatus::Accepted);
    assert_eq!(acceptance.rejected_bids, vec![first.id]);

    let bids = service.list_bids(&CLIENT, request.id).expect("bids listed");
    let statuses: Vec<(BidId, BidStatus)> = bids.iter().map(|bid| (bid.id, bid.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (first.id, BidStatus::Rejected),
            (second.id, BidStatus::Accepted)
        ]
    );

    assert_eq!(total_notifications(&service) - before, 2);
    assert_eq!(
        notifications_of(&service, &PROVIDER_B)[0].kind,
        NotificationKind::BidAccepted
    );
    assert_eq!(
        notifications_of(&service, &CLIENT)[0].kind,
        NotificationKind::RequestAssigned
    );
    assert!(notifications_of(&service, &PROVIDER_A).is_empty());
}

#[test]
fn a_request_accepts_at_most_one_bid() {
    let (service, _) = build_service();
    let (request, first, second) = contested_request(&service);
    service
        .accept_bid(&CLIENT, second.id)
        .expect("first acceptance wins");

    let err = service
        .accept_bid(&CLIENT, first.id)
        .expect_err("sibling already rejected");
    assert!(matches!(err, MarketplaceError::Conflict(_)));

    let err = service
        .accept_bid(&ADMIN, second.id)
        .expect_err("already accepted");
    assert!(matches!(err, MarketplaceError::Conflict(_)));

    let accepted = service
        .list_bids(&ADMIN, request.id)
        .expect("bids listed")
        .into_iter()
        .filter(|bid| bid.status == BidStatus::Accepted)
        .count();
    assert_eq!(accepted, 1);
}

#[test]
fn only_owner_or_admin_accepts() {
    let (service, _) = build_service();
    let (_, first, _) = contested_request(&service);

    for outsider in [OTHER_CLIENT, PROVIDER_A] {
        let err = service
            .accept_bid(&outsider, first.id)
            .expect_err("not the owner");
        assert!(matches!(err, MarketplaceError::Forbidden(_)));
    }

    let acceptance = service.accept_bid(&ADMIN, first.id).expect("admin accepts");
    assert_eq!(acceptance.request.assigned_provider, Some(PROVIDER_A.user_id));
}

#[test]
fn accepting_unknown_bid_is_not_found() {
    let (service, _) = build_service();
    assert_eq!(
        service.accept_bid(&CLIENT, BidId(99)).map(|acceptance| acceptance.bid),
        Err(MarketplaceError::NotFound("bid"))
    );
}

#[test]
fn rejecting_one_bid_leaves_the_request_open() {
    let (service, _) = build_service();
    let (request, first, second) = contested_request(&service);

    let rejected = service.reject_bid(&CLIENT, first.id).expect("bid rejected");
    assert_eq!(rejected.status, BidStatus::Rejected);

    let still_open = service
        .get_request(&CLIENT, request.id)
        .expect("request readable");
    assert_eq!(still_open.status, RequestStatus::Open);
    assert_eq!(
        notifications_of(&service, &PROVIDER_A)[0].kind,
        NotificationKind::BidRejected
    );

    let err = service
        .reject_bid(&CLIENT, first.id)
        .expect_err("already rejected");
    assert!(matches!(err, MarketplaceError::InvalidState(_)));

    let acceptance = service
        .accept_bid(&CLIENT, second.id)
        .expect("remaining bid accepted");
    assert!(acceptance.rejected_bids.is_empty());
}

#[test]
fn providers_edit_only_their_pending_bids() {
    let (service, _) = build_service();
    let (_, first, second) = contested_request(&service);

    let updated = service
        .update_bid(&PROVIDER_A, first.id, terms(2500, 12))
        .expect("bid revised");
    assert_eq!(updated.terms.price, 2500);
    assert_eq!(updated.terms.days, 12);

    let err = service
        .update_bid(&PROVIDER_B, first.id, terms(1, 1))
        .expect_err("not the bidder");
    assert!(matches!(err, MarketplaceError::Forbidden(_)));

    service.accept_bid(&CLIENT, second.id).expect("accepted");
    let err = service
        .update_bid(&PROVIDER_B, second.id, terms(3000, 21))
        .expect_err("accepted bids are frozen");
    assert!(matches!(err, MarketplaceError::InvalidState(_)));
}

#[test]
fn providers_see_only_their_own_bids() {
    let (service, _) = build_service();
    let (request, first, _) = contested_request(&service);

    let own = service
        .list_bids(&PROVIDER_A, request.id)
        .expect("provider listing");
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].id, first.id);

    assert_eq!(
        service
            .list_bids(&CLIENT, request.id)
            .expect("owner listing")
            .len(),
        2
    );
    assert!(matches!(
        service.list_bids(&OTHER_CLIENT, request.id),
        Err(MarketplaceError::Forbidden(_))
    ));
}
