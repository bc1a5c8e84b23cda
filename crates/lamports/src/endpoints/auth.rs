use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use lamports_service::service::BalanceService;

use super::ResponseError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// The address a request originates from.
///
/// Proxies in front of the server report the client in `x-forwarded-for`. Without it, the peer
/// address of the connection is used.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_owned(),
        (None, Some(peer)) => peer.ip().to_string(),
        (None, None) => "unknown".to_owned(),
    }
}

/// Admits requests with a valid API key from clients within their rate limit.
pub async fn authenticate(
    State(service): State<BalanceService>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, ResponseError> {
    let key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|key| !key.is_empty())
        .ok_or((StatusCode::UNAUTHORIZED, "Missing API key"))?
        .to_owned();

    let license = service.licenses().validate(&key)?;
    tracing::trace!(license = %license.name, "Authenticated request");

    let licenses = service.licenses().clone();
    tokio::spawn(async move { licenses.increment_usage(&key) });

    let client = client_ip(request.headers(), peer.map(|ConnectInfo(addr)| addr));
    service.rate_limiter().check(&client).await?;

    Ok(next.run(request).await)
}
