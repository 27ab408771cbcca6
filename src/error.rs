//! Failure taxonomy shared by the Spotify client, the fetch pipeline and the
//! CSV writers.
//!
//! Every outbound call resolves to either a decoded payload or one of the
//! [`ApiError`] variants below. The retry combinators in [`crate::retry`]
//! only ever look at [`ApiError::is_retryable`], so adding a variant never
//! silently changes retry behavior.

use reqwest::StatusCode;
use thiserror::Error;

/// Maximum number of response-body characters kept in an [`ApiError::Api`].
pub const BODY_PREVIEW_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The upstream answered 401; the bearer credential must be refreshed.
    #[error("unauthorized (401), access token expired or revoked")]
    Unauthorized,

    /// The upstream answered 429.
    #[error("rate limit reached (429)")]
    RateLimited,

    /// Any other non-200 answer.
    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Client-credentials exchange failed. Fatal for the whole run.
    #[error("token acquisition failed: {0}")]
    Token(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    Input(String),
}

impl ApiError {
    /// Builds the error for a non-success status, keeping a short body preview.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
            _ => ApiError::Api {
                status: status.as_u16(),
                body: body.chars().take(BODY_PREVIEW_LEN).collect(),
            },
        }
    }

    /// Authorization and rate-limit failures are transient and worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::RateLimited)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            ApiError::RateLimited
        ));

        let long_body = "x".repeat(500);
        match ApiError::from_status(StatusCode::NOT_FOUND, &long_body) {
            ApiError::Api { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body.len(), BODY_PREVIEW_LEN);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn only_auth_and_rate_limit_are_retryable() {
        assert!(ApiError::Unauthorized.is_retryable());
        assert!(ApiError::RateLimited.is_retryable());
        assert!(
            !ApiError::Api {
                status: 500,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(!ApiError::Token("boom".into()).is_retryable());
    }
}
