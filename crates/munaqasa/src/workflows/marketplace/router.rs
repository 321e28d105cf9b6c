use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    BidId, BidTerms, ModerationDecision, NotificationId, RequestDetails, RequestId,
    ReviewSubmission, UserId, UserStatusUpdate,
};
use super::identity::{Actor, IdentityProvider};
use super::repository::MarketplaceRepository;
use super::service::{MarketplaceError, MarketplaceService};

type SharedService<R, I> = Arc<MarketplaceService<R, I>>;

/// Router builder exposing the lifecycle operations over HTTP.
pub fn marketplace_router<R, I>(service: SharedService<R, I>) -> Router
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    Router::new()
        .route("/api/v1/requests", post(create_request_handler::<R, I>))
        .route(
            "/api/v1/requests/:request_id",
            get(get_request_handler::<R, I>),
        )
        .route(
            "/api/v1/requests/:request_id/moderation",
            post(moderate_request_handler::<R, I>),
        )
        .route(
            "/api/v1/requests/:request_id/complete",
            post(complete_request_handler::<R, I>),
        )
        .route(
            "/api/v1/requests/:request_id/cancel",
            post(cancel_request_handler::<R, I>),
        )
        .route(
            "/api/v1/requests/:request_id/bids",
            get(list_bids_handler::<R, I>).post(submit_bid_handler::<R, I>),
        )
        .route(
            "/api/v1/requests/:request_id/reviews",
            post(submit_review_handler::<R, I>),
        )
        .route("/api/v1/bids/:bid_id", put(update_bid_handler::<R, I>))
        .route(
            "/api/v1/bids/:bid_id/accept",
            post(accept_bid_handler::<R, I>),
        )
        .route(
            "/api/v1/bids/:bid_id/reject",
            post(reject_bid_handler::<R, I>),
        )
        .route(
            "/api/v1/users/:user_id/rating",
            get(rating_handler::<R, I>),
        )
        .route(
            "/api/v1/users/:user_id/status",
            put(user_status_handler::<R, I>),
        )
        .route(
            "/api/v1/notifications",
            get(list_notifications_handler::<R, I>),
        )
        .route(
            "/api/v1/notifications/:notification_id/read",
            post(mark_notification_read_handler::<R, I>),
        )
        .route("/api/v1/admin/overview", get(overview_handler::<R, I>))
        .with_state(service)
}

impl IntoResponse for MarketplaceError {
    fn into_response(self) -> Response {
        let status = match &self {
            MarketplaceError::Validation(_) => StatusCode::BAD_REQUEST,
            MarketplaceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            MarketplaceError::Forbidden(_) => StatusCode::FORBIDDEN,
            MarketplaceError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketplaceError::Conflict(_) => StatusCode::CONFLICT,
            MarketplaceError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MarketplaceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModerationPayload {
    pub(crate) decision: ModerationDecision,
    #[serde(default)]
    pub(crate) notes: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

fn caller<R, I>(
    service: &MarketplaceService<R, I>,
    headers: &HeaderMap,
) -> Result<Actor, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    service.authenticate(bearer_token(headers))
}

/// Body and path extractors are taken as `Result` so that authentication runs
/// first; a malformed body from a verified caller is a validation failure.
fn payload<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, MarketplaceError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| MarketplaceError::Validation(rejection.body_text()))
}

fn record_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, MarketplaceError> {
    path.map(|Path(id)| id)
        .map_err(|rejection| MarketplaceError::Validation(rejection.body_text()))
}

/// Run a service call on the blocking pool; stores may hold a lock across file I/O.
async fn blocking<R, I, T, F>(service: SharedService<R, I>, work: F) -> Result<T, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
    T: Send + 'static,
    F: FnOnce(&MarketplaceService<R, I>) -> Result<T, MarketplaceError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || work(service.as_ref()))
        .await
        .map_err(|error| MarketplaceError::Internal(format!("storage task failed: {error}")))?
}

pub(crate) async fn create_request_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
    body: Result<Json<RequestDetails>, JsonRejection>,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let actor = caller(&service, &headers)?;
    let details = payload(body)?;
    let request = blocking(service, move |service| {
        service.create_request(&actor, details)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(request)).into_response())
}

pub(crate) async fn get_request_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let actor = caller(&service, &headers)?;
    let request_id = RequestId(record_id(path)?);
    let request = blocking(service, move |service| {
        service.get_request(&actor, request_id)
    })
    .await?;
    Ok(Json(request).into_response())
}

pub(crate) async fn moderate_request_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<ModerationPayload>, JsonRejection>,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let actor = caller(&service, &headers)?;
    let request_id = RequestId(record_id(path)?);
    let ModerationPayload { decision, notes } = payload(body)?;
    let request = blocking(service, move |service| {
        service.moderate_request(&actor, request_id, decision, notes)
    })
    .await?;
    Ok(Json(request).into_response())
}

pub(crate) async fn complete_request_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let actor = caller(&service, &headers)?;
    let request_id = RequestId(record_id(path)?);
    let request = blocking(service, move |service| {
        service.complete_request(&actor, request_id)
    })
    .await?;
    Ok(Json(request).into_response())
}

pub(crate) async fn cancel_request_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let actor = caller(&service, &headers)?;
    let request_id = RequestId(record_id(path)?);
    let request = blocking(service, move |service| {
        service.cancel_request(&actor, request_id)
    })
    .await?;
    Ok(Json(request).into_response())
}

pub(crate) async fn list_bids_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let actor = caller(&service, &headers)?;
    let request_id = RequestId(record_id(path)?);
    let bids = blocking(service, move |service| service.list_bids(&actor, request_id)).await?;
    Ok(Json(bids).into_response())
}

pub(crate) async fn submit_bid_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<BidTerms>, JsonRejection>,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let actor = caller(&service, &headers)?;
    let request_id = RequestId(record_id(path)?);
    let terms = payload(body)?;
    let bid = blocking(service, move |service| {
        service.submit_bid(&actor, request_id, terms)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(bid)).into_response())
}

pub(crate) async fn update_bid_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<BidTerms>, JsonRejection>,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let actor = caller(&service, &headers)?;
    let bid_id = BidId(record_id(path)?);
    let terms = payload(body)?;
    let bid = blocking(service, move |service| service.update_bid(&actor, bid_id, terms)).await?;
    Ok(Json(bid).into_response())
}

pub(crate) async fn accept_bid_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let actor = caller(&service, &headers)?;
    let bid_id = BidId(record_id(path)?);
    let acceptance = blocking(service, move |service| service.accept_bid(&actor, bid_id)).await?;
    Ok(Json(acceptance).into_response())
}

pub(crate) async fn reject_bid_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let actor = caller(&service, &headers)?;
    let bid_id = BidId(record_id(path)?);
    let bid = blocking(service, move |service| service.reject_bid(&actor, bid_id)).await?;
    Ok(Json(bid).into_response())
}

pub(crate) async fn submit_review_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<ReviewSubmission>, JsonRejection>,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let actor = caller(&service, &headers)?;
    let request_id = RequestId(record_id(path)?);
    let submission = payload(body)?;
    let review = blocking(service, move |service| {
        service.submit_review(&actor, request_id, submission)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(review)).into_response())
}

pub(crate) async fn rating_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    caller(&service, &headers)?;
    let user_id = UserId(record_id(path)?);
    let summary = blocking(service, move |service| service.rating_summary(user_id)).await?;
    Ok(Json(summary).into_response())
}

pub(crate) async fn user_status_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<UserStatusUpdate>, JsonRejection>,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let actor = caller(&service, &headers)?;
    let user_id = UserId(record_id(path)?);
    let update = payload(body)?;
    let user = blocking(service, move |service| {
        service.set_user_status(&actor, user_id, update)
    })
    .await?;
    Ok(Json(user).into_response())
}

pub(crate) async fn list_notifications_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let actor = caller(&service, &headers)?;
    let notifications =
        blocking(service, move |service| service.list_notifications(&actor)).await?;
    Ok(Json(notifications).into_response())
}

pub(crate) async fn mark_notification_read_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let actor = caller(&service, &headers)?;
    let notification_id = NotificationId(record_id(path)?);
    let notification = blocking(service, move |service| {
        service.mark_notification_read(&actor, notification_id)
    })
    .await?;
    Ok(Json(notification).into_response())
}

pub(crate) async fn overview_handler<R, I>(
    State(service): State<SharedService<R, I>>,
    headers: HeaderMap,
) -> Result<Response, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let actor = caller(&service, &headers)?;
    let counts = blocking(service, move |service| service.overview(&actor)).await?;
    Ok(Json(counts).into_response())
}
