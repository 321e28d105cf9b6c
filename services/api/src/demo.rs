use crate::infra::{parse_date, seed_identities};
use chrono::NaiveDate;
use clap::Args;
use munaqasa::error::AppError;
use munaqasa::workflows::marketplace::{
    Acceptance, Actor, BidTerms, InMemoryRepository, MarketplaceRepository, MarketplaceService,
    ModerationDecision, RatingSummary, RequestDetails, Review, ReviewDirection, ReviewSubmission,
    Role, ServiceRequest, SqliteRepository, TokenRegistry, UserId,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

const ADMIN: Actor = Actor {
    user_id: UserId(1),
    role: Role::Admin,
};
const CLIENT: Actor = Actor {
    user_id: UserId(100),
    role: Role::Client,
};
const FIRST_PROVIDER: Actor = Actor {
    user_id: UserId(200),
    role: Role::Provider,
};
const SECOND_PROVIDER: Actor = Actor {
    user_id: UserId(201),
    role: Role::Provider,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Deadline attached to the demo request (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) deadline: Option<NaiveDate>,
    /// Run against a SQLite file instead of the in-memory store
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
    /// Print the final state as JSON after the walkthrough
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct DemoSummary {
    pub(crate) request: ServiceRequest,
    pub(crate) acceptance: Acceptance,
    pub(crate) reviews: Vec<Review>,
    pub(crate) provider_rating: RatingSummary,
    pub(crate) client_rating: RatingSummary,
    pub(crate) notifications: Vec<InboxCount>,
}

#[derive(Debug, Serialize)]
pub(crate) struct InboxCount {
    pub(crate) user_id: UserId,
    pub(crate) role: Role,
    pub(crate) unread: usize,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        deadline,
        database,
        json,
    } = args;

    let summary = match database {
        Some(path) => {
            println!("Marketplace demo (SQLite store at {})", path.display());
            run_scenario(Arc::new(SqliteRepository::open(&path)?), deadline)?
        }
        None => {
            println!("Marketplace demo (in-memory store)");
            run_scenario(Arc::new(InMemoryRepository::new()), deadline)?
        }
    };

    println!("\nInboxes");
    for inbox in &summary.notifications {
        println!(
            "  - user {} ({}): {} unread",
            inbox.user_id, inbox.role, inbox.unread
        );
    }

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(payload) => println!("\n{payload}"),
            Err(err) => println!("\nFinal state unavailable: {err}"),
        }
    }

    Ok(())
}

fn demo_identities() -> TokenRegistry {
    TokenRegistry::new()
        .with_token("demo-admin", ADMIN)
        .with_token("demo-client", CLIENT)
        .with_token("demo-provider-1", FIRST_PROVIDER)
        .with_token("demo-provider-2", SECOND_PROVIDER)
}

fn demo_request(deadline: Option<NaiveDate>) -> RequestDetails {
    RequestDetails {
        title: "Rewire apartment lighting".to_string(),
        description: "Replace six ceiling fixtures and add two dimmer switches".to_string(),
        category: Some("electrical".to_string()),
        city: Some("Amman".to_string()),
        address: Some("Jabal Al-Webdeh".to_string()),
        budget_min: Some(300),
        budget_max: Some(750),
        deadline,
    }
}

pub(crate) fn run_scenario<R>(
    repository: Arc<R>,
    deadline: Option<NaiveDate>,
) -> Result<DemoSummary, AppError>
where
    R: MarketplaceRepository + 'static,
{
    let registry = demo_identities();
    let service = MarketplaceService::new(repository, Arc::new(registry.clone()));
    seed_identities(&service, &registry)?;

    let request = service.create_request(&CLIENT, demo_request(deadline))?;
    println!(
        "1. Client {} posted {} ({})",
        CLIENT.user_id, request.project_number, request.status
    );

    let request = service.moderate_request(
        &ADMIN,
        request.id,
        ModerationDecision::Open,
        Some("Approved for bidding".to_string()),
    )?;
    println!("2. Admin moderated the request: {}", request.status);

    let first = service.submit_bid(
        &FIRST_PROVIDER,
        request.id,
        BidTerms {
            price: 690,
            days: 3,
            note: Some("Fixtures supplied by the client".to_string()),
        },
    )?;
    let second = service.submit_bid(
        &SECOND_PROVIDER,
        request.id,
        BidTerms {
            price: 540,
            days: 4,
            note: None,
        },
    )?;
    println!(
        "3. Bids received: #{} at {} and #{} at {}",
        first.id, first.terms.price, second.id, second.terms.price
    );

    let acceptance = service.accept_bid(&CLIENT, second.id)?;
    println!(
        "4. Client accepted bid #{}; {} sibling bid(s) rejected; request is {}",
        acceptance.bid.id,
        acceptance.rejected_bids.len(),
        acceptance.request.status
    );

    let request = service.complete_request(&ADMIN, request.id)?;
    println!("5. Admin marked {} {}", request.project_number, request.status);

    let reviews = vec![
        service.submit_review(
            &CLIENT,
            request.id,
            ReviewSubmission {
                reviewed_id: SECOND_PROVIDER.user_id,
                rating: 5,
                comment: "Neat wiring and on time".to_string(),
                direction: ReviewDirection::ClientToProvider,
            },
        )?,
        service.submit_review(
            &SECOND_PROVIDER,
            request.id,
            ReviewSubmission {
                reviewed_id: CLIENT.user_id,
                rating: 4,
                comment: "Clear instructions".to_string(),
                direction: ReviewDirection::ProviderToClient,
            },
        )?,
    ];
    println!("6. Both parties left reviews");

    let provider_rating = service.rating_summary(SECOND_PROVIDER.user_id)?;
    let client_rating = service.rating_summary(CLIENT.user_id)?;

    let mut notifications = Vec::new();
    for actor in [ADMIN, CLIENT, FIRST_PROVIDER, SECOND_PROVIDER] {
        let unread = service
            .list_notifications(&actor)?
            .iter()
            .filter(|notification| !notification.read)
            .count();
        notifications.push(InboxCount {
            user_id: actor.user_id,
            role: actor.role,
            unread,
        });
    }

    Ok(DemoSummary {
        request,
        acceptance,
        reviews,
        provider_rating,
        client_rating,
        notifications,
    })
}
