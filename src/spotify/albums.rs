use tracing::info;

use crate::{
    error::ApiResult,
    spotify::{PAGE_LIMIT, SpotifyClient},
    types::{Album, Page},
};

impl SpotifyClient {
    /// Retrieves an artist's albums, following the `next` cursor.
    ///
    /// Starts at `GET /artists/{id}/albums?limit=50` and keeps requesting the
    /// URL found in each page's `next` field until it is null. With
    /// `max_count` set, traversal also stops as soon as that many albums were
    /// collected and the result is truncated to exactly `max_count`.
    ///
    /// The whole traversal is one retriable unit: if a page fails with an
    /// authorization or rate-limit error, the listing restarts from the first
    /// page on the next attempt.
    ///
    /// # Example
    ///
    /// ```
    /// let albums = client.get_albums("4NHQUGzhtTLFvgF5SZesLK", Some(20)).await?;
    /// assert!(albums.len() <= 20);
    /// ```
    pub async fn get_albums(
        &self,
        artist_id: &str,
        max_count: Option<usize>,
    ) -> ApiResult<Vec<Album>> {
        let first = format!(
            "{uri}/artists/{id}/albums?limit={limit}",
            uri = self.settings.api_url,
            id = artist_id,
            limit = PAGE_LIMIT
        );
        let first = first.as_str();

        self.settings
            .call_retry
            .run_api(&format!("get_albums('{artist_id}')"), || async move {
                let mut albums = Vec::new();
                let mut next = Some(first.to_string());

                while let Some(url) = next {
                    let page = Page::from_json(&self.fetch_page(&url).await?, Album::from_json);
                    albums.extend(page.items);

                    if let Some(cap) = max_count {
                        if albums.len() >= cap {
                            albums.truncate(cap);
                            info!("Album limit of {cap} reached for artist {artist_id}");
                            break;
                        }
                    }
                    next = page.next;
                }

                Ok(albums)
            })
            .await
    }
}
