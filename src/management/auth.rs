use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use chrono::Utc;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    config::Settings,
    error::ApiResult,
    spotify::{RequestLog, auth::request_client_credentials},
    types::{ClientCredentials, Credential},
};

/// Owns the bearer credential of a run.
///
/// The check-then-refresh sequence runs under one async mutex, so however
/// many workers notice a stale token at once, exactly one exchange is in
/// flight and the others pick up its result.
pub struct TokenManager {
    http: Client,
    credentials: ClientCredentials,
    token_url: String,
    margin_secs: i64,
    default_lifetime_secs: i64,
    log: Arc<RequestLog>,
    credential: Mutex<Option<Credential>>,
    exchanges: AtomicU64,
}

impl TokenManager {
    pub fn new(
        http: Client,
        credentials: ClientCredentials,
        settings: &Settings,
        log: Arc<RequestLog>,
    ) -> Self {
        TokenManager {
            http,
            credentials,
            token_url: settings.token_url.clone(),
            margin_secs: settings.token_margin_secs,
            default_lifetime_secs: settings.default_token_lifetime_secs,
            log,
            credential: Mutex::new(None),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Returns the cached credential, exchanging a new one first when there
    /// is none yet or it is within the safety margin of its expiry.
    pub async fn get_token(&self) -> ApiResult<Credential> {
        let mut current = self.credential.lock().await;

        if let Some(credential) = current.as_ref() {
            if !credential.is_expired(Utc::now().timestamp(), self.margin_secs) {
                return Ok(credential.clone());
            }
        }

        debug!("Refreshing access token");
        let fresh = self.exchange().await?;
        *current = Some(fresh.clone());
        debug!("Access token refreshed");
        Ok(fresh)
    }

    /// Exchanges a new credential even if the cached one has not expired.
    /// Called after the upstream rejected `rejected`. When another worker
    /// already replaced that token, its replacement is returned instead.
    pub async fn force_refresh(&self, rejected: &str) -> ApiResult<Credential> {
        let mut current = self.credential.lock().await;

        if let Some(credential) = current.as_ref() {
            if credential.access_token != rejected {
                debug!("Rejected token already replaced");
                return Ok(credential.clone());
            }
        }

        warn!("Forcing access token refresh");
        let fresh = self.exchange().await?;
        *current = Some(fresh.clone());
        Ok(fresh)
    }

    /// Number of client-credentials exchanges performed so far.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    async fn exchange(&self) -> ApiResult<Credential> {
        self.exchanges.fetch_add(1, Ordering::Relaxed);
        let grant = request_client_credentials(
            &self.http,
            &self.token_url,
            &self.credentials,
            &self.log,
        )
        .await?;

        let lifetime = grant.expires_in.unwrap_or(self.default_lifetime_secs);
        Ok(Credential {
            access_token: grant.access_token,
            expires_at: Utc::now().timestamp() + lifetime,
        })
    }
}
