use reqwest::Url;
use serde_json::Value;
use tracing::error;

use crate::{
    error::{ApiError, ApiResult},
    spotify::SpotifyClient,
    types::Artist,
};

impl SpotifyClient {
    /// Searches artists by name.
    ///
    /// Hits `GET /search?q={name}&type=artist` and returns the first page of
    /// hits in the upstream's relevance order; callers that need one artist
    /// take the first element. A response without `artists.items` is logged
    /// and treated as no hits.
    ///
    /// Authorization and rate-limit failures are retried with the per-call
    /// policy (3 attempts, 5 seconds apart by default).
    ///
    /// # Example
    ///
    /// ```
    /// let artists = client.find_artists("Tove Lo").await?;
    /// if let Some(artist) = artists.first() {
    ///     println!("{} ({})", artist.name, artist.id);
    /// }
    /// ```
    pub async fn find_artists(&self, name: &str) -> ApiResult<Vec<Artist>> {
        let url = Url::parse_with_params(
            &format!("{}/search", self.settings.api_url),
            &[("q", name), ("type", "artist")],
        )
        .map_err(|e| ApiError::Input(e.to_string()))?;
        let url = url.as_str();

        self.settings
            .call_retry
            .run_api(&format!("find_artists('{name}')"), || async move {
                let data = self.fetch(url).await?;
                match data
                    .get("artists")
                    .and_then(|a| a.get("items"))
                    .and_then(Value::as_array)
                {
                    Some(items) => Ok(items.iter().map(Artist::from_json).collect()),
                    None => {
                        error!("Malformed search response for artist '{name}'");
                        Ok(Vec::new())
                    }
                }
            })
            .await
    }

    /// Fetches the full artist object (`GET /artists/{id}`), which carries
    /// popularity, followers and genres that search hits may lack.
    pub async fn get_artist(&self, artist_id: &str) -> ApiResult<Artist> {
        let url = format!("{}/artists/{artist_id}", self.settings.api_url);
        let url = url.as_str();

        self.settings
            .call_retry
            .run_api(&format!("get_artist('{artist_id}')"), || async move {
                let data = self.fetch(url).await?;
                Ok(Artist::from_json(&data))
            })
            .await
    }
}
