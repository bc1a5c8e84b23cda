use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use lamports_service::service::{BalanceService, WalletBalance};
use serde::Deserialize;

use super::{ApiResponse, ResponseError};

/// JSON body of a balance request.
#[derive(Debug, Deserialize)]
pub struct GetBalanceRequest {
    #[serde(default)]
    pub wallets: Vec<String>,
}

pub async fn get_balance(
    State(service): State<BalanceService>,
    body: Result<Json<GetBalanceRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Vec<WalletBalance>>>, ResponseError> {
    let Json(request) = body.map_err(|rejection| {
        tracing::debug!("Rejecting balance request: {}", rejection.body_text());
        ResponseError::from((StatusCode::BAD_REQUEST, "Invalid request body"))
    })?;

    let balances = service.get_balances(&request.wallets).await;
    Ok(Json(ApiResponse::success(balances)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lamports_service::service::CacheStatus;
    use reqwest::{Client, StatusCode};
    use serde_json::json;

    use crate::endpoints::auth::API_KEY_HEADER;
    use crate::test::{self, SYSTEM_PROGRAM, WRAPPED_SOL};

    use super::*;

    #[tokio::test]
    async fn test_get_balance() {
        let app = test::app(|_| {});
        app.rpc.set_balance(WRAPPED_SOL, 1_500_000_000);

        let response = Client::new()
            .post(app.server.url("/api/get-balance"))
            .header(API_KEY_HEADER, test::API_KEY)
            .json(&json!({"wallets": [WRAPPED_SOL, SYSTEM_PROGRAM]}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(
            body,
            json!({
                "object": [
                    {"wallet": WRAPPED_SOL, "balance": "1.500000000", "cache": "miss"},
                    {"wallet": SYSTEM_PROGRAM, "balance": "0.000000000", "cache": "miss"},
                ],
                "error": "",
                "success": true,
            })
        );
    }

    #[tokio::test]
    async fn test_concurrent_clients_share_lookup() {
        let app = test::app(|config| {
            config.rate_limit.enabled = false;
        });
        app.rpc.set_delay(Duration::from_millis(100));

        let requests = (0..4).map(|_| {
            Client::new()
                .post(app.server.url("/api/get-balance"))
                .header(API_KEY_HEADER, test::API_KEY)
                .json(&json!({"wallets": [WRAPPED_SOL]}))
                .send()
        });
        let responses = futures::future::join_all(requests).await;

        let mut statuses = Vec::new();
        for response in responses {
            let body: ApiResponse<Vec<WalletBalance>> =
                response.unwrap().json().await.unwrap();
            statuses.push(body.object.unwrap()[0].cache);
        }

        assert_eq!(app.rpc.hits(WRAPPED_SOL), 1);
        let misses = statuses.iter().filter(|s| **s == CacheStatus::Miss).count();
        assert_eq!(misses, 1);
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let app = test::app(|_| {});

        let response = Client::new()
            .post(app.server.url("/api/get-balance"))
            .header(API_KEY_HEADER, test::API_KEY)
            .header("content-type", "application/json")
            .body(r#"{"invalid": json"#)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(
            body,
            json!({"object": null, "error": "Invalid request body", "success": false})
        );
    }

    #[tokio::test]
    async fn test_empty_wallets() {
        let app = test::app(|_| {});

        let response = Client::new()
            .post(app.server.url("/api/get-balance"))
            .header(API_KEY_HEADER, test::API_KEY)
            .json(&json!({"wallets": []}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body, json!({"object": [], "error": "", "success": true}));
        assert_eq!(app.rpc.accesses(), 0);
    }

    #[tokio::test]
    async fn test_invalid_wallet() {
        let app = test::app(|_| {});

        let response = Client::new()
            .post(app.server.url("/api/get-balance"))
            .header(API_KEY_HEADER, test::API_KEY)
            .json(&json!({"wallets": ["invalid_wallet"]}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: ApiResponse<Vec<WalletBalance>> = response.json().await.unwrap();
        let balances = body.object.unwrap();
        assert_eq!(balances[0].balance, "invalid key: invalid_wallet");
        assert_eq!(balances[0].cache, CacheStatus::Miss);
    }
}
