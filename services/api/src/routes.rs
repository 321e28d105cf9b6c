use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use munaqasa::workflows::marketplace::{
    marketplace_router, IdentityProvider, MarketplaceRepository, MarketplaceService,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_marketplace_routes<R, I>(service: Arc<MarketplaceService<R, I>>) -> axum::Router
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    marketplace_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use munaqasa::workflows::marketplace::{Actor, InMemoryRepository, Role, TokenRegistry, UserId};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    fn app(ready: bool) -> (axum::Router, Arc<AtomicBool>) {
        let registry =
            TokenRegistry::new().with_token("root", Actor::new(UserId(1), Role::Admin));
        let service = Arc::new(MarketplaceService::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(registry.clone()),
        ));
        crate::infra::seed_identities(&service, &registry).expect("seeded");

        let readiness = Arc::new(AtomicBool::new(ready));
        let state = AppState {
            readiness: readiness.clone(),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        (
            with_marketplace_routes(service).layer(Extension(state)),
            readiness,
        )
    }

    async fn status_of(router: axum::Router, uri: &str, token: Option<&str>) -> StatusCode {
        let mut builder = Request::get(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        router
            .oneshot(builder.body(Body::empty()).expect("request"))
            .await
            .expect("response")
            .status()
    }

    #[tokio::test]
    async fn readiness_tracks_the_startup_flag() {
        let (router, readiness) = app(false);
        assert_eq!(
            status_of(router.clone(), "/ready", None).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        readiness.store(true, Ordering::Release);
        assert_eq!(status_of(router, "/ready", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn operational_and_marketplace_routes_share_the_router() {
        let (router, _) = app(true);

        assert_eq!(status_of(router.clone(), "/health", None).await, StatusCode::OK);
        assert_eq!(status_of(router.clone(), "/metrics", None).await, StatusCode::OK);
        assert_eq!(
            status_of(router.clone(), "/api/v1/admin/overview", None).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(router, "/api/v1/admin/overview", Some("root")).await,
            StatusCode::OK
        );
    }
}
