use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::{sync::OnceCell, time::sleep};
use tracing::{info, warn};

use crate::{
    cli::resolve_credentials,
    config::Settings,
    error,
    error::{ApiError, ApiResult},
    kworb::{ArtistPage, KworbClient, PAGE_TIMEOUT},
    pipeline::Pool,
    spotify::SpotifyClient,
    success,
    types::{MergedRow, TrackRow},
    utils::{self, clean_title},
    warning,
};

/// Pause after each kworb download.
const PAGE_PAUSE: Duration = Duration::from_millis(500);

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    /// File produced by `fetch`
    #[clap(long, default_value = "spotify_data.csv")]
    pub input: PathBuf,

    /// Ranked artist list with `name` and `listeners` columns
    #[clap(long, default_value = "artists.csv")]
    pub artists: PathBuf,

    /// Merged output, overwritten
    #[clap(long, default_value = "spotify_data_with_streams.csv")]
    pub output: PathBuf,

    /// Client id and secret, first row only
    #[clap(long, default_value = "tokens.csv")]
    pub credentials: PathBuf,

    /// Artists processed in parallel
    #[clap(long, default_value_t = 10)]
    pub workers: usize,
}

/// Tracks of one artist after matching against kworb.
#[derive(Debug, Default)]
pub struct ArtistMerge {
    pub rows: Vec<MergedRow>,
    pub unmatched: usize,
}

/// kworb pages shared between artists resolving to the same id.
#[derive(Default)]
struct PageCache {
    pages: Mutex<HashMap<String, Arc<OnceCell<Arc<ArtistPage>>>>>,
}

impl PageCache {
    async fn get(&self, kworb: &KworbClient, artist_id: &str) -> Arc<ArtistPage> {
        let cell = {
            let mut pages = self.pages.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(pages.entry(artist_id.to_string()).or_default())
        };

        let page = cell
            .get_or_init(|| async {
                let page = kworb.artist_page(artist_id).await;
                info!(
                    "Loaded {} songs from kworb for {artist_id}",
                    page.songs.len()
                );
                sleep(PAGE_PAUSE).await;
                Arc::new(page)
            })
            .await;
        Arc::clone(page)
    }
}

pub async fn merge(args: MergeArgs) {
    let rows = match read_rows(&args.input).await {
        Ok(rows) => rows,
        Err(e) => error!("Cannot read {}: {}", args.input.display(), e),
    };
    if rows.is_empty() {
        error!("{} contains no tracks", args.input.display());
    }

    let listeners = Arc::new(utils::read_listeners(&args.artists).await);
    let groups = group_by_artist(rows);
    info!("{} unique artists in {}", groups.len(), args.input.display());

    let credentials = match resolve_credentials(&args.credentials).await {
        Ok(credentials) => credentials,
        Err(e) => error!("{}", e),
    };
    let settings = Settings::from_env();
    let kworb = match KworbClient::new(&settings.kworb_url, PAGE_TIMEOUT) {
        Ok(kworb) => Arc::new(kworb),
        Err(e) => error!("Cannot build HTTP client: {}", e),
    };
    let client = match SpotifyClient::new(credentials, settings) {
        Ok(client) => Arc::new(client),
        Err(e) => error!("Cannot build HTTP client: {}", e),
    };
    if let Err(e) = client.tokens().get_token().await {
        error!("Cannot obtain Spotify access token: {}", e);
    }
    success!("Spotify access token obtained");

    let pb = ProgressBar::new(groups.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let cache = Arc::new(PageCache::default());
    let mut pool = Pool::new(args.workers);
    for (name, tracks) in groups {
        let client = Arc::clone(&client);
        let kworb = Arc::clone(&kworb);
        let cache = Arc::clone(&cache);
        let monthly = listeners.get(&name).copied();
        pool.spawn(name.clone(), async move {
            let page = match find_artist_id(&client, &name).await {
                Some(id) => cache.get(&kworb, &id).await,
                None => {
                    warn!("No Spotify id for '{name}', skipping its tracks");
                    return ArtistMerge {
                        rows: Vec::new(),
                        unmatched: tracks.len(),
                    };
                }
            };
            merge_artist(tracks, &page, monthly)
        });
    }

    let mut merged = Vec::new();
    let mut unmatched = 0;
    while let Some((name, joined)) = pool.join_next().await {
        pb.inc(1);
        match joined {
            Ok(result) => {
                info!(
                    "'{name}': {} matched, {} unmatched",
                    result.rows.len(),
                    result.unmatched
                );
                pb.set_message(name);
                unmatched += result.unmatched;
                merged.extend(result.rows);
            }
            Err(e) => warning!("Merging '{}' aborted: {}", name, e),
        }
    }
    pb.finish_and_clear();

    if let Err(e) = write_merged(&args.output, &merged).await {
        error!("Cannot write {}: {}", args.output.display(), e);
    }
    success!(
        "{} tracks with streams written to {}, {} without a kworb match",
        merged.len(),
        args.output.display(),
        unmatched
    );
}

async fn find_artist_id(client: &SpotifyClient, name: &str) -> Option<String> {
    match client.find_artists(name).await {
        Ok(artists) => artists.into_iter().next().map(|a| a.id),
        Err(e) => {
            warn!("Artist search for '{name}' failed: {e}");
            None
        }
    }
}

/// Reads a fetched 17-column file.
pub async fn read_rows(path: &Path) -> ApiResult<Vec<TrackRow>> {
    let content = async_fs::read_to_string(path).await?;
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    reader
        .deserialize::<TrackRow>()
        .map(|row| row.map_err(ApiError::from))
        .collect()
}

/// Groups rows by artist name, artists in order of first appearance.
pub fn group_by_artist(rows: Vec<TrackRow>) -> Vec<(String, Vec<TrackRow>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<TrackRow>)> = Vec::new();

    for row in rows {
        match index.get(&row.artist) {
            Some(&i) => groups[i].1.push(row),
            None => {
                index.insert(row.artist.clone(), groups.len());
                groups.push((row.artist.clone(), vec![row]));
            }
        }
    }
    groups
}

/// Attaches kworb numbers to an artist's tracks. Tracks without a matching
/// song are dropped and counted.
pub fn merge_artist(tracks: Vec<TrackRow>, page: &ArtistPage, monthly: Option<u64>) -> ArtistMerge {
    let mut result = ArtistMerge::default();
    for row in tracks {
        match page.songs.find(&clean_title(&row.track)) {
            Some(song) => result
                .rows
                .push(MergedRow::new(row, song, &page.stats, monthly)),
            None => result.unmatched += 1,
        }
    }
    result
}

/// Writes the merged rows to a fresh file, header included even when empty.
pub async fn write_merged(path: &Path, rows: &[MergedRow]) -> ApiResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(MergedRow::HEADERS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ApiError::Io(e.into_error()))?;

    async_fs::write(path, bytes).await?;
    Ok(())
}

impl MergedRow {
    pub const HEADERS: [&'static str; 28] = [
        "Service",
        "Artist",
        "Followers",
        "Artist popularity",
        "Genres",
        "Album",
        "Album type",
        "Release year",
        "Track count",
        "Track",
        "Track number",
        "Duration (ms)",
        "Duration (min:sec)",
        "Track popularity",
        "Explicit",
        "Spotify URL (album)",
        "Streams (total)",
        "Streams (daily)",
        "Artist monthly listeners",
        "Total Streams",
        "Total Tracks",
        "As Lead Streams",
        "As Lead Tracks",
        "Solo Streams",
        "Solo Tracks",
        "As Feature Streams",
        "As Feature Tracks",
        "Spotify URL (track)",
    ];
}

#[cfg(test)]
mod tests {
    use crate::{
        kworb::SongTable,
        types::{ArtistStreamStats, SongStreams},
    };

    use super::*;

    fn row(artist: &str, track: &str) -> TrackRow {
        TrackRow {
            artist: artist.to_string(),
            track: track.to_string(),
            ..TrackRow::default()
        }
    }

    fn page() -> ArtistPage {
        let mut songs = SongTable::default();
        songs.insert("habits (stay high)".into(), SongStreams { total: 100, daily: 5 });
        songs.insert("talking body".into(), SongStreams { total: 50, daily: 2 });
        ArtistPage {
            stats: ArtistStreamStats {
                total_streams: Some(150),
                ..ArtistStreamStats::default()
            },
            songs,
        }
    }

    #[test]
    fn groups_keep_first_appearance_order() {
        let groups = group_by_artist(vec![
            row("B", "1"),
            row("A", "2"),
            row("B", "3"),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "B");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "A");
    }

    #[test]
    fn unmatched_tracks_are_dropped_and_counted() {
        let tracks = vec![
            row("Tove Lo", "Habits (Stay High)"),
            row("Tove Lo", "Talking Body (feat. Someone)"),
            row("Tove Lo", "Unreleased Demo"),
        ];

        let merged = merge_artist(tracks, &page(), Some(1_000));
        assert_eq!(merged.rows.len(), 2);
        assert_eq!(merged.unmatched, 1);
        assert_eq!(merged.rows[0].streams_total, 100);
        assert_eq!(merged.rows[1].streams_daily, 2);
        assert_eq!(merged.rows[0].monthly_listeners, Some(1_000));
        assert_eq!(merged.rows[0].total_streams, Some(150));
    }

    #[tokio::test]
    async fn merged_file_has_28_columns_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged.csv");
        let merged = merge_artist(vec![row("Tove Lo", "Habits")], &page(), None);

        write_merged(&path, &merged.rows).await.unwrap();
        write_merged(&path, &merged.rows).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split(',').count(), 28);
        assert!(lines[0].contains("Spotify URL (album),Streams (total),Streams (daily)"));
        assert_eq!(lines[1].split(',').count(), 28);
    }

    #[test]
    fn headers_match_serialized_row() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(MergedRow::default()).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(text.lines().next().unwrap(), MergedRow::HEADERS.join(","));
    }
}
