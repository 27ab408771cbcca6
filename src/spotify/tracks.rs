use crate::{
    error::ApiResult,
    spotify::{PAGE_LIMIT, SpotifyClient},
    types::{Page, Track},
};

impl SpotifyClient {
    /// Lists every track of an album (`GET /albums/{id}/tracks`), following
    /// the `next` cursor to the last page. Track-list entries have no
    /// popularity; use [`get_track`](Self::get_track) for that.
    pub async fn get_tracks(&self, album_id: &str) -> ApiResult<Vec<Track>> {
        let first = format!(
            "{uri}/albums/{id}/tracks?limit={limit}",
            uri = self.settings.api_url,
            id = album_id,
            limit = PAGE_LIMIT
        );
        let first = first.as_str();

        self.settings
            .call_retry
            .run_api(&format!("get_tracks('{album_id}')"), || async move {
                let mut tracks = Vec::new();
                let mut next = Some(first.to_string());

                while let Some(url) = next {
                    let page = Page::from_json(&self.fetch_page(&url).await?, Track::from_json);
                    tracks.extend(page.items);
                    next = page.next;
                }

                Ok(tracks)
            })
            .await
    }

    /// Fetches one full track object (`GET /tracks/{id}`).
    pub async fn get_track(&self, track_id: &str) -> ApiResult<Track> {
        let url = format!("{}/tracks/{track_id}", self.settings.api_url);
        let url = url.as_str();

        self.settings
            .call_retry
            .run_api(&format!("get_track('{track_id}')"), || async move {
                let data = self.fetch(url).await?;
                Ok(Track::from_json(&data))
            })
            .await
    }
}
