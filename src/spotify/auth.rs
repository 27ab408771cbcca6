use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, error};

use crate::{
    error::{ApiError, ApiResult},
    spotify::RequestLog,
    types::ClientCredentials,
};

/// Raw result of a token exchange.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds, when the endpoint reported one.
    pub expires_in: Option<i64>,
}

/// Performs the OAuth 2.0 client-credentials exchange.
///
/// Posts `grant_type=client_credentials` to the token endpoint, authenticating
/// with HTTP basic auth built from the client id and secret.
///
/// # Errors
///
/// Every failure is reported as [`ApiError::Token`]: transport errors,
/// non-200 answers and responses without an `access_token`. Callers treat it
/// as fatal; nothing here retries.
pub async fn request_client_credentials(
    http: &Client,
    token_url: &str,
    credentials: &ClientCredentials,
    log: &RequestLog,
) -> ApiResult<TokenGrant> {
    debug!("Requesting access token...");
    let seq = log.record("POST", token_url);

    let res = http
        .post(token_url)
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await
        .map_err(|e| ApiError::Token(e.to_string()))?;

    let status = res.status();
    if status != StatusCode::OK {
        let body = res.text().await.unwrap_or_default();
        log.response(seq, status, &body);
        error!("Token request failed: {status}");
        return Err(ApiError::Token(format!(
            "token endpoint answered {status}"
        )));
    }
    log.response(seq, status, "");

    let json: Value = res
        .json()
        .await
        .map_err(|e| ApiError::Token(e.to_string()))?;

    let access_token = json["access_token"]
        .as_str()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Token("response carries no access_token".to_string()))?
        .to_string();

    debug!(
        "Access token received: {}...",
        access_token.chars().take(25).collect::<String>()
    );

    Ok(TokenGrant {
        access_token,
        expires_in: json["expires_in"].as_i64(),
    })
}
