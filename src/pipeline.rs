//! Hierarchical artist → album → track dispatch.
//!
//! Each level runs in its own bounded [`Pool`] owned by the parent task:
//! the run owns the artist pool, every artist task owns an album pool and
//! every album task owns a track pool. A pool is drained before its owner
//! returns, and nothing is cancelled once spawned.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use tokio::{
    sync::Semaphore,
    task::{Id, JoinError, JoinSet},
};
use tracing::{debug, error, info, warn};

use crate::{
    error::{ApiError, ApiResult},
    management::CsvSink,
    spotify::SpotifyClient,
    types::{Album, Artist, Track, WorkUnit},
};

/// Worker counts for the three pool levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Workers {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
}

impl Default for Workers {
    fn default() -> Self {
        Self {
            artists: 3,
            albums: 5,
            tracks: 10,
        }
    }
}

/// Bounded task pool: every task waits for a permit before running.
pub(crate) struct Pool<T> {
    set: JoinSet<T>,
    permits: Arc<Semaphore>,
    labels: HashMap<Id, String>,
}

impl<T: Send + 'static> Pool<T> {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            set: JoinSet::new(),
            permits: Arc::new(Semaphore::new(workers.max(1))),
            labels: HashMap::new(),
        }
    }

    pub(crate) fn spawn<F>(&mut self, label: String, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let handle = self.set.spawn(async move {
            // The semaphore is never closed, so this always holds a permit.
            let _permit = permits.acquire_owned().await;
            task.await
        });
        self.labels.insert(handle.id(), label);
    }

    /// Next finished task with the label it was spawned under.
    pub(crate) async fn join_next(&mut self) -> Option<(String, Result<T, JoinError>)> {
        let joined = self.set.join_next_with_id().await?;
        let id = match &joined {
            Ok((id, _)) => *id,
            Err(e) => e.id(),
        };
        let label = self.labels.remove(&id).unwrap_or_default();
        Some((label, joined.map(|(_, value)| value)))
    }
}

/// How one artist ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtistOutcome {
    /// Processed; carries the number of rows written.
    Written(usize),
    /// The search returned no hit. Counts as a success.
    NotFound,
    /// Every attempt failed; carries the last error.
    Failed(String),
    /// Not started because an earlier artist hit a fatal token error.
    Skipped,
}

impl ArtistOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Written(_) | Self::NotFound)
    }
}

/// Result of a whole run.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub rows: usize,
    /// Set when a token error stopped the run early.
    pub fatal: Option<String>,
}

#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<SpotifyClient>,
    sink: Arc<CsvSink>,
    workers: Workers,
    max_albums: Option<usize>,
    halted: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(
        client: Arc<SpotifyClient>,
        sink: Arc<CsvSink>,
        workers: Workers,
        max_albums: Option<usize>,
    ) -> Self {
        Self {
            client,
            sink,
            workers,
            max_albums,
            halted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Processes every artist and reports each completion through
    /// `on_done` as it happens.
    pub async fn run<F>(&self, names: Vec<String>, mut on_done: F) -> RunSummary
    where
        F: FnMut(&str, &ArtistOutcome),
    {
        let mut pool = Pool::new(self.workers.artists);
        for name in names {
            let dispatcher = self.clone();
            let label = name.clone();
            pool.spawn(label, async move {
                if dispatcher.halted.load(Ordering::SeqCst) {
                    return (ArtistOutcome::Skipped, None);
                }
                dispatcher.process_artist_retry(&name).await
            });
        }

        let mut summary = RunSummary::default();
        while let Some((name, joined)) = pool.join_next().await {
            let (outcome, fatal) = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("Artist task '{name}' aborted: {e}");
                    (ArtistOutcome::Failed(e.to_string()), None)
                }
            };

            if let ArtistOutcome::Written(rows) = outcome {
                summary.rows += rows;
            }
            if fatal.is_some() && summary.fatal.is_none() {
                summary.fatal = fatal;
            }
            on_done(&name, &outcome);

            if outcome.is_success() {
                summary.succeeded.push(name);
            } else {
                summary.failed.push(name);
            }
        }

        summary
    }

    /// Runs the artist pipeline under the artist-level retry policy.
    ///
    /// Any error is retried except [`ApiError::Token`]: credentials that the
    /// token endpoint refuses will not start working on the next attempt, so
    /// that error halts the remaining artists instead.
    pub async fn process_artist_retry(&self, name: &str) -> (ArtistOutcome, Option<String>) {
        let attempts = AtomicU32::new(0);
        let policy = self.client.settings().artist_retry;

        let result = policy
            .run(
                &format!("artist '{name}'"),
                |e: &ApiError| !matches!(e, ApiError::Token(_)),
                || {
                    attempts.fetch_add(1, Ordering::Relaxed);
                    self.process_artist(name)
                },
            )
            .await;

        match result {
            Ok(Some(rows)) => (ArtistOutcome::Written(rows), None),
            Ok(None) => (ArtistOutcome::NotFound, None),
            Err(e @ ApiError::Token(_)) => {
                error!("Token error while processing '{name}', stopping run: {e}");
                self.halted.store(true, Ordering::SeqCst);
                (ArtistOutcome::Failed(e.to_string()), Some(e.to_string()))
            }
            Err(e) => {
                error!(
                    "Artist '{name}' failed after {} attempts: {e}",
                    attempts.load(Ordering::Relaxed)
                );
                (ArtistOutcome::Failed(e.to_string()), None)
            }
        }
    }

    /// One attempt at an artist. `Ok(None)` when the search finds nothing,
    /// otherwise the number of rows written.
    pub async fn process_artist(&self, name: &str) -> ApiResult<Option<usize>> {
        let Some(hit) = self.client.find_artists(name).await?.into_iter().next() else {
            warn!("Artist '{name}' not found");
            return Ok(None);
        };

        let artist = self.client.get_artist(&hit.id).await?;
        info!(
            "Artist '{}' ({}): {} followers, popularity {}",
            artist.name,
            artist.id,
            artist.follower_count(),
            artist.popularity
        );

        let albums = self.client.get_albums(&artist.id, self.max_albums).await?;
        let albums = filter_albums(&artist.name, albums);
        if albums.is_empty() {
            warn!("No full albums left for '{}' after filtering", artist.name);
            return Ok(Some(0));
        }

        let artist = Arc::new(artist);
        let mut pool = Pool::new(self.workers.albums);
        for album in albums {
            let dispatcher = self.clone();
            let artist = Arc::clone(&artist);
            pool.spawn(album.name.clone(), async move {
                dispatcher.process_album(&artist, album).await
            });
        }

        let mut rows = 0;
        let mut fatal = None;
        while let Some((title, joined)) = pool.join_next().await {
            match joined {
                Ok(Ok(written)) => rows += written,
                Ok(Err(e @ ApiError::Token(_))) => {
                    error!("Album '{title}' of '{}' failed: {e}", artist.name);
                    fatal.get_or_insert(e);
                }
                Ok(Err(e)) => error!("Album '{title}' of '{}' failed: {e}", artist.name),
                Err(e) => error!("Album task '{title}' of '{}' aborted: {e}", artist.name),
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        info!("Artist '{}' done, {rows} rows written", artist.name);
        Ok(Some(rows))
    }

    /// Lists the album's tracks, fetches each track's detail, sorts by
    /// track number and appends the rows. Returns the number of rows.
    pub async fn process_album(&self, artist: &Artist, album: Album) -> ApiResult<usize> {
        let album_id = album.id.as_str();
        let listed = self
            .client
            .settings()
            .unit_retry
            .run_api(&format!("tracks of album '{}'", album.name), || {
                self.client.get_tracks(album_id)
            })
            .await?;
        if listed.is_empty() {
            warn!("Album '{}' has no tracks", album.name);
            return Ok(0);
        }

        let mut pool = Pool::new(self.workers.tracks);
        for track in listed {
            let dispatcher = self.clone();
            pool.spawn(track.name.clone(), async move {
                dispatcher.process_track(track).await
            });
        }

        let mut tracks = Vec::new();
        let mut fatal = None;
        while let Some((title, joined)) = pool.join_next().await {
            match joined {
                Ok(Ok(track)) => tracks.push(track),
                Ok(Err(e)) => {
                    error!("Track '{title}' failed: {e}");
                    fatal.get_or_insert(e);
                }
                Err(e) => error!("Track task '{title}' aborted: {e}"),
            }
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        tracks.sort_by_key(|t| t.track_number);
        debug!("Album '{}': {} tracks", album.name, tracks.len());

        let unit = WorkUnit {
            artist: artist.clone(),
            tracks: HashMap::from([(album.id.clone(), tracks)]),
            albums: vec![album],
        };
        self.sink.append_unit(&unit).await
    }

    /// Fetches the full track. Authorization and rate-limit failures that
    /// outlast the retries fall back to the listed track, which lacks
    /// popularity; a token error is passed up.
    async fn process_track(&self, listed: Track) -> ApiResult<Track> {
        let track_id = listed.id.as_str();
        let result = self
            .client
            .settings()
            .unit_retry
            .run_api(&format!("track '{}'", listed.name), || {
                self.client.get_track(track_id)
            })
            .await;

        match result {
            Ok(track) => Ok(track),
            Err(e @ ApiError::Token(_)) => Err(e),
            Err(e) => {
                warn!(
                    "Using listed data for track '{}' after detail fetch failed: {e}",
                    listed.name
                );
                Ok(listed)
            }
        }
    }
}

/// Keeps full albums: release type "album" with more than one track.
pub fn filter_albums(artist_name: &str, albums: Vec<Album>) -> Vec<Album> {
    let total = albums.len();
    let kept: Vec<Album> = albums.into_iter().filter(Album::is_full_album).collect();
    info!(
        "Artist '{artist_name}': {} of {total} releases are full albums",
        kept.len()
    );
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn album(kind: &str, total_tracks: u32) -> Album {
        Album {
            id: format!("{kind}-{total_tracks}"),
            album_type: kind.to_string(),
            total_tracks,
            ..Album::default()
        }
    }

    #[test]
    fn filter_drops_singles_compilations_and_one_track_albums() {
        let albums = vec![
            album("single", 1),
            album("album", 1),
            album("compilation", 12),
            album("album", 10),
        ];

        let kept = filter_albums("Test Artist", albums);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "album-10");
    }

    #[test]
    fn filter_of_only_singles_is_empty() {
        let kept = filter_albums("Test Artist", vec![album("single", 1), album("album", 1)]);
        assert!(kept.is_empty());
    }

    #[test]
    fn not_found_counts_as_success() {
        assert!(ArtistOutcome::NotFound.is_success());
        assert!(ArtistOutcome::Written(0).is_success());
        assert!(!ArtistOutcome::Skipped.is_success());
        assert!(!ArtistOutcome::Failed("boom".into()).is_success());
    }

    #[tokio::test]
    async fn pool_reports_labels_and_respects_bound() {
        use std::sync::atomic::AtomicUsize;
        use std::time::Duration;

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut pool = Pool::new(2);

        for i in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.spawn(format!("task-{i}"), async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                i
            });
        }

        let mut labels = Vec::new();
        while let Some((label, joined)) = pool.join_next().await {
            let value = joined.unwrap();
            assert_eq!(label, format!("task-{value}"));
            labels.push(label);
        }

        assert_eq!(labels.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn pool_keeps_label_of_panicked_task() {
        let mut pool: Pool<()> = Pool::new(1);
        pool.spawn("doomed".to_string(), async {
            panic!("boom");
        });

        let (label, joined) = pool.join_next().await.unwrap();
        assert_eq!(label, "doomed");
        assert!(joined.unwrap_err().is_panic());
        assert!(pool.join_next().await.is_none());
    }
}
