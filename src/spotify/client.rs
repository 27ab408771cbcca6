use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::{
    config::Settings,
    error::{ApiError, ApiResult, BODY_PREVIEW_LEN},
    management::TokenManager,
    types::ClientCredentials,
    utils::Jitter,
};

/// Sequence counter shared by every outbound call of a run.
#[derive(Debug, Default)]
pub struct RequestLog {
    counter: AtomicU64,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs an outgoing request and returns its sequence number.
    pub fn record(&self, method: &str, url: &str) -> u64 {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Request #{seq}: {method} {url}");
        seq
    }

    pub fn response(&self, seq: u64, status: StatusCode, body: &str) {
        let preview: String = body.chars().take(BODY_PREVIEW_LEN).collect();
        match status {
            StatusCode::OK => debug!("Response #{seq}: {status}"),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Response #{seq}: {status} rate limited, body: {preview}")
            }
            StatusCode::UNAUTHORIZED => {
                warn!("Response #{seq}: {status} token rejected, body: {preview}")
            }
            _ => error!("Response #{seq}: {status}, body: {preview}"),
        }
    }

    pub fn count(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

/// Rate-limited, token-aware client for the Spotify Web API.
///
/// Every GET sleeps a random jitter first, then classifies the answer: 200
/// yields the JSON body, 401 forces a token refresh before failing with
/// [`ApiError::Unauthorized`], 429 sleeps the configured cooldown before
/// failing with [`ApiError::RateLimited`], anything else is [`ApiError::Api`].
/// The resource methods live in the sibling modules.
pub struct SpotifyClient {
    pub(crate) http: Client,
    pub(crate) settings: Settings,
    tokens: TokenManager,
    log: Arc<RequestLog>,
}

impl SpotifyClient {
    pub fn new(credentials: ClientCredentials, settings: Settings) -> ApiResult<Self> {
        let http = Client::builder().timeout(settings.http_timeout).build()?;
        let log = Arc::new(RequestLog::new());
        let tokens = TokenManager::new(http.clone(), credentials, &settings, Arc::clone(&log));

        Ok(Self {
            http,
            settings,
            tokens,
            log,
        })
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Requests issued so far, token exchanges included.
    pub fn request_count(&self) -> u64 {
        self.log.count()
    }

    /// GET a single resource, using the per-call jitter.
    pub async fn fetch(&self, url: &str) -> ApiResult<Value> {
        self.get_json(url, self.settings.request_jitter).await
    }

    /// GET one page of a listing, using the (longer) page jitter.
    pub async fn fetch_page(&self, url: &str) -> ApiResult<Value> {
        self.get_json(url, self.settings.page_jitter).await
    }

    async fn get_json(&self, url: &str, jitter: Jitter) -> ApiResult<Value> {
        let credential = self.tokens.get_token().await?;

        let delay = jitter.sample();
        debug!("Sleeping {:.2}s before request", delay.as_secs_f64());
        sleep(delay).await;

        let seq = self.log.record("GET", url);
        let response = self
            .http
            .get(url)
            .bearer_auth(&credential.access_token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            self.log.response(seq, status, "");
            return Ok(response.json::<Value>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        self.log.response(seq, status, &body);

        match status {
            StatusCode::UNAUTHORIZED => {
                warn!("Access token expired (401), refreshing...");
                self.tokens.force_refresh(&credential.access_token).await?;
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(
                    "Rate limit reached (429), pausing for {}s...",
                    self.settings.rate_limit_cooldown.as_secs()
                );
                sleep(self.settings.rate_limit_cooldown).await;
            }
            _ => {}
        }

        Err(ApiError::from_status(status, &body))
    }
}
