//! Configuration management for the scraper.
//!
//! Values are resolved in this order:
//! 1. Environment variables (highest priority)
//! 2. `.env` in the working directory, then `.env` in the local data directory
//! 3. Built-in defaults matching the public Spotify and kworb endpoints
//!
//! Run tunables (worker counts, retry bounds, file names) are command-line
//! flags, see `main.rs`; the timing constants live in [`Settings`].

use std::{env, path::PathBuf, time::Duration};

use crate::{retry::RetryPolicy, utils::Jitter};

pub const DEFAULT_SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_KWORB_URL: &str = "https://kworb.net";

/// Loads environment variables from `.env` files.
///
/// Looks for `./.env` first and then for `spotscrape/.env` inside the
/// platform-specific local data directory:
/// - Linux: `~/.local/share/spotscrape/.env`
/// - macOS: `~/Library/Application Support/spotscrape/.env`
/// - Windows: `%LOCALAPPDATA%/spotscrape/.env`
///
/// Both files are optional. Variables that are already set in the process
/// environment are never overwritten.
///
/// # Errors
///
/// Returns an error string if the data directory cannot be created.
pub async fn load_env() -> Result<(), String> {
    let _ = dotenv::dotenv();

    let path = data_dir().join(".env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Directory holding the optional `.env` and the `.env.example` template.
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("spotscrape");
    path
}

/// Returns the Spotify Web API base URL (`SPOTIFY_API_URL`).
pub fn spotify_apiurl() -> String {
    env::var("SPOTIFY_API_URL").unwrap_or_else(|_| DEFAULT_SPOTIFY_API_URL.to_string())
}

/// Returns the client-credentials token endpoint (`SPOTIFY_API_TOKEN_URL`).
pub fn spotify_apitoken_url() -> String {
    env::var("SPOTIFY_API_TOKEN_URL").unwrap_or_else(|_| DEFAULT_SPOTIFY_TOKEN_URL.to_string())
}

/// Returns the kworb base URL (`KWORB_URL`).
pub fn kworb_url() -> String {
    env::var("KWORB_URL").unwrap_or_else(|_| DEFAULT_KWORB_URL.to_string())
}

/// Fallback client id used when no credentials file is present.
pub fn spotify_client_id() -> Option<String> {
    env::var("SPOTIFY_API_AUTH_CLIENT_ID").ok()
}

/// Fallback client secret used when no credentials file is present.
pub fn spotify_client_secret() -> Option<String> {
    env::var("SPOTIFY_API_AUTH_CLIENT_SECRET").ok()
}

/// Endpoints and timing constants shared by every component of a run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub token_url: String,
    pub kworb_url: String,
    /// Sleep before single-resource calls.
    pub request_jitter: Jitter,
    /// Sleep before every page of a paginated listing.
    pub page_jitter: Jitter,
    /// Pause after a 429, taken before the failure is reported.
    pub rate_limit_cooldown: Duration,
    /// Retry around a single client call.
    pub call_retry: RetryPolicy,
    /// Retry around one album track listing or one track detail.
    pub unit_retry: RetryPolicy,
    /// Retry around the whole per-artist pipeline.
    pub artist_retry: RetryPolicy,
    pub http_timeout: Duration,
    /// Seconds subtracted from the token lifetime before it counts as expired.
    pub token_margin_secs: i64,
    /// Lifetime assumed when the token response has no `expires_in`.
    pub default_token_lifetime_secs: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_SPOTIFY_API_URL.to_string(),
            token_url: DEFAULT_SPOTIFY_TOKEN_URL.to_string(),
            kworb_url: DEFAULT_KWORB_URL.to_string(),
            request_jitter: Jitter::from_secs(0.5, 1.5),
            page_jitter: Jitter::from_secs(0.5, 2.0),
            rate_limit_cooldown: Duration::from_secs(60),
            call_retry: RetryPolicy::new(3, Duration::from_secs(5)),
            unit_retry: RetryPolicy::new(3, Duration::from_secs(10)),
            artist_retry: RetryPolicy::new(5, Duration::from_secs(5)),
            http_timeout: Duration::from_secs(10),
            token_margin_secs: 60,
            default_token_lifetime_secs: 3600,
        }
    }
}

impl Settings {
    /// Defaults with endpoints taken from the environment.
    pub fn from_env() -> Self {
        Self {
            api_url: spotify_apiurl(),
            token_url: spotify_apitoken_url(),
            kworb_url: kworb_url(),
            ..Self::default()
        }
    }

    /// Points every endpoint at one base URL, e.g. a local mock server.
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.api_url = format!("{base}/v1");
        self.token_url = format!("{base}/api/token");
        self.kworb_url = base.to_string();
        self
    }

    /// Zeroes jitter, cooldown and retry delays while keeping attempt bounds.
    pub fn without_delays(mut self) -> Self {
        self.request_jitter = Jitter::NONE;
        self.page_jitter = Jitter::NONE;
        self.rate_limit_cooldown = Duration::ZERO;
        self.call_retry.delay = Duration::ZERO;
        self.unit_retry.delay = Duration::ZERO;
        self.artist_retry.delay = Duration::ZERO;
        self
    }
}
