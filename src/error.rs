use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::repository::RepositoryError;

/// ApiError
///
/// Every failure a request can end in. Authentication and authorization
/// failures are raised by the route guards before a handler runs; the rest
/// come from handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable bearer token.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Authenticated, but the route's policy is not satisfied.
    #[error("forbidden: policy `{0}` not satisfied")]
    Forbidden(String),

    #[error("customer `{0}` not found")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] RepositoryError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Store details stay in the logs.
        let message = match &self {
            ApiError::Store(e) => {
                tracing::error!(error = %e, "store operation failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": {
                "code": status.as_u16(),
                "message": message,
            }
        });

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_responses_advertise_the_bearer_scheme() {
        let response = ApiError::Unauthenticated("missing".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }

    #[test]
    fn forbidden_is_distinct_from_unauthenticated() {
        let response = ApiError::Forbidden("Admin".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn store_failures_map_to_server_errors() {
        let err = ApiError::from(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
