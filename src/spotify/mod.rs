//! # Spotify Web API
//!
//! Thin, rate-limited access to the read-only catalogue endpoints the scraper
//! needs. Everything goes through [`SpotifyClient`], which owns the HTTP
//! connection pool, the shared [`TokenManager`](crate::management::TokenManager)
//! and the request sequence counter.
//!
//! ```text
//! pipeline / cli
//!      ↓
//! SpotifyClient ── artists (search, detail)
//!      │        ├─ albums  (paginated listing, optional cap)
//!      │        └─ tracks  (paginated listing, detail)
//!      ↓
//! get_json: token → jitter → GET → classify status
//!      ↓
//! Spotify Web API  (auth: POST /api/token, client credentials)
//! ```
//!
//! ## Endpoints
//!
//! - `POST /api/token` - client-credentials exchange ([`auth`])
//! - `GET /search?type=artist` - artist search
//! - `GET /artists/{id}` - artist detail
//! - `GET /artists/{id}/albums` - artist discography, 50 per page
//! - `GET /albums/{id}/tracks` - album track list, 50 per page
//! - `GET /tracks/{id}` - track detail (carries popularity)
//!
//! ## Failure classes
//!
//! Resource methods return [`ApiError`](crate::error::ApiError). Only
//! `Unauthorized` and `RateLimited` are retried, each call with its own
//! bounded [`RetryPolicy`](crate::retry::RetryPolicy). A malformed body never
//! fails a call: decoders fill missing fields with defaults.

pub mod albums;
pub mod artists;
pub mod auth;
pub mod client;
pub mod tracks;

pub use client::{RequestLog, SpotifyClient};

/// Page size requested from paginated listings.
pub const PAGE_LIMIT: u32 = 50;
