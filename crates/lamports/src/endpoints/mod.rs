use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use lamports_service::metric;
use lamports_service::service::BalanceService;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use serde::Serialize;
use tower::ServiceBuilder;

mod auth;
mod balance;
mod error;
mod metrics;

pub use error::{ApiResponse, ResponseError};
use metrics::MetricsLayer;

use balance::get_balance;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    metric!(counter("healthcheck") += 1);
    Json(HealthResponse {
        status: "healthy",
        service: "lamports",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn create_app(service: BalanceService) -> Router {
    // The layers here go "top to bottom" according to the reading order here.
    let layer = ServiceBuilder::new()
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(MetricsLayer);

    let api = Router::new()
        .route("/get-balance", post(get_balance))
        .route_layer(middleware::from_fn_with_state(
            service.clone(),
            auth::authenticate,
        ));

    Router::new()
        .nest("/api", api)
        .with_state(service)
        .layer(layer)
        // the health endpoint is last, as it will bypass all the middlewares
        .route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use crate::test;

    #[tokio::test]
    async fn test_health() {
        let app = test::app(|_| {});

        let response = reqwest::get(app.server.url("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "status": "healthy",
                "service": "lamports",
                "version": env!("CARGO_PKG_VERSION"),
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = test::app(|_| {});

        let response = reqwest::get(app.server.url("/api/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
