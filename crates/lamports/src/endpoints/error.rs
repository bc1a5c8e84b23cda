use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lamports_service::licenses::LicenseError;
use lamports_service::ratelimit::RateLimitError;
use sentry::integrations::anyhow::capture_anyhow;
use serde::{Deserialize, Serialize};

/// The envelope every API response is wrapped in.
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub object: Option<T>,
    pub error: String,
    pub success: bool,
}

impl<T> ApiResponse<T> {
    pub fn success(object: T) -> Self {
        Self {
            object: Some(object),
            error: String::new(),
            success: true,
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            object: None,
            error,
            success: false,
        }
    }
}

#[derive(Debug)]
pub struct ResponseError {
    status: StatusCode,
    err: anyhow::Error,
}

impl From<(StatusCode, &'static str)> for ResponseError {
    fn from((code, msg): (StatusCode, &'static str)) -> Self {
        Self {
            status: code,
            err: anyhow::anyhow!(msg),
        }
    }
}

impl From<(StatusCode, anyhow::Error)> for ResponseError {
    fn from((status, err): (StatusCode, anyhow::Error)) -> Self {
        Self { status, err }
    }
}

impl From<anyhow::Error> for ResponseError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            err,
        }
    }
}

impl From<LicenseError> for ResponseError {
    fn from(err: LicenseError) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            err: anyhow::Error::new(err).context("Invalid API key"),
        }
    }
}

impl From<RateLimitError> for ResponseError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::TooManyRequests { .. } => Self {
                status: StatusCode::TOO_MANY_REQUESTS,
                err: anyhow::Error::new(err)
                    .context("Too many requests from this IP, please try again later."),
            },
            RateLimitError::Storage(_) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                err: err.into(),
            },
        }
    }
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            capture_anyhow(&self.err);
        } else {
            tracing::debug!(status = %self.status, "Rejecting request: {:#}", self.err);
        }
        let body = ApiResponse::<()>::failure(self.err.to_string());
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lamports_cache::CacheError;

    use super::*;

    #[test]
    fn test_status_codes() {
        let err = ResponseError::from(LicenseError::Expired);
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.err.to_string(), "Invalid API key");

        let err = ResponseError::from(RateLimitError::TooManyRequests {
            retry_after: Duration::from_secs(3),
        });
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);

        let err = ResponseError::from(RateLimitError::Storage(CacheError::Backend(
            "down".into(),
        )));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.err.to_string(), "failed to record request");
    }

    #[test]
    fn test_failure_envelope() {
        let body = serde_json::to_value(ApiResponse::<()>::failure("nope".into())).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"object": null, "error": "nope", "success": false})
        );
    }
}
