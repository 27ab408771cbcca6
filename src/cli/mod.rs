//! # CLI Module
//!
//! User-facing commands of spotscrape. Each command owns its console output
//! (progress bar, colored status lines, tables) and delegates the actual
//! work to the library layers:
//!
//! ```text
//! cli::fetch  ──▶ pipeline::Dispatcher ──▶ spotify::SpotifyClient
//!                        │
//!                        └──▶ management::CsvSink (17 columns, append)
//!
//! cli::merge  ──▶ spotify (artist id) + kworb (stream stats)
//!                        │
//!                        └──▶ merged file (28 columns, rewritten)
//! ```
//!
//! ## Commands
//!
//! - [`fetch`] - scrapes artists, albums and tracks into the output file and
//!   records artists that exhausted their retries
//! - [`merge`] - joins a fetched file with kworb stream counts and monthly
//!   listeners
//!
//! Fatal setup problems (missing input, no credentials, refused token) end
//! the process through the `error!` macro; everything that happens per
//! artist is logged and summarized instead.

mod fetch;
mod merge;

pub use fetch::{FetchArgs, fetch};
pub use merge::{MergeArgs, merge};

use std::path::Path;

use tracing::info;

use crate::{
    config,
    error::{ApiError, ApiResult},
    types::ClientCredentials,
    utils,
};

/// Client credentials from the credentials file, or from
/// `SPOTIFY_API_AUTH_CLIENT_ID` / `SPOTIFY_API_AUTH_CLIENT_SECRET` when the
/// file does not exist.
pub async fn resolve_credentials(path: &Path) -> ApiResult<ClientCredentials> {
    if async_fs::metadata(path).await.is_ok() {
        return utils::read_credentials(path).await;
    }

    match (config::spotify_client_id(), config::spotify_client_secret()) {
        (Some(client_id), Some(client_secret)) => {
            info!(
                "{} not found, using credentials from the environment",
                path.display()
            );
            Ok(ClientCredentials {
                client_id,
                client_secret,
            })
        }
        _ => Err(ApiError::Input(format!(
            "no credentials: {} is missing and SPOTIFY_API_AUTH_CLIENT_ID/SECRET are not set",
            path.display()
        ))),
    }
}
