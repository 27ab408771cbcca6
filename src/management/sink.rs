use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use tracing::debug;

use crate::{
    error::{ApiError, ApiResult},
    types::{Album, Artist, Track, TrackRow, WorkUnit},
};

/// Append-only CSV output shared by every worker of a run.
///
/// All writers of one target file must go through the same `CsvSink`; the
/// header is emitted only when the file does not exist yet. Appending the
/// same data twice produces duplicate rows.
pub struct CsvSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one row per (album, track) pair, albums in the given order and
    /// tracks in the order stored for each album. Returns the rows written.
    pub async fn append(
        &self,
        artist: &Artist,
        albums: &[Album],
        tracks_by_album: &HashMap<String, Vec<Track>>,
    ) -> ApiResult<usize> {
        let rows: Vec<TrackRow> = albums
            .iter()
            .flat_map(|album| {
                tracks_by_album
                    .get(&album.id)
                    .into_iter()
                    .flatten()
                    .map(move |track| TrackRow::new(artist, album, track))
            })
            .collect();

        let _guard = self.lock.lock().await;

        let exists = tokio::fs::try_exists(&self.path).await?;
        let bytes = encode_rows(&rows, !exists)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        debug!(
            "Wrote {} rows for '{}' to {}",
            rows.len(),
            artist.name,
            self.path.display()
        );
        Ok(rows.len())
    }

    pub async fn append_unit(&self, unit: &WorkUnit) -> ApiResult<usize> {
        self.append(&unit.artist, &unit.albums, &unit.tracks).await
    }
}

fn encode_rows(rows: &[TrackRow], with_header: bool) -> ApiResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(with_header)
        .from_writer(Vec::new());

    if with_header && rows.is_empty() {
        writer.write_record(TrackRow::HEADERS)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| ApiError::Io(e.into_error()))
}

impl TrackRow {
    pub const HEADERS: [&'static str; 17] = [
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
        "Spotify URL (track)",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Artist, Album, Vec<Track>) {
        let artist = Artist {
            name: "Test Artist".into(),
            ..Artist::default()
        };
        let album = Album {
            id: "B1".into(),
            name: "Record".into(),
            album_type: "album".into(),
            total_tracks: 2,
            ..Album::default()
        };
        let tracks = (1..=2)
            .map(|n| Track {
                name: format!("Song {n}"),
                track_number: n,
                ..Track::default()
            })
            .collect();
        (artist, album, tracks)
    }

    #[tokio::test]
    async fn header_written_once_and_rows_appended() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out.csv"));
        let (artist, album, tracks) = sample();
        let by_album = HashMap::from([(album.id.clone(), tracks)]);

        assert_eq!(sink.append(&artist, &[album.clone()], &by_album).await.unwrap(), 2);
        assert_eq!(sink.append(&artist, &[album], &by_album).await.unwrap(), 2);

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Service,Artist,Followers"));
        assert_eq!(lines.iter().filter(|l| l.starts_with("Service")).count(), 1);
        assert_eq!(lines[1], lines[3]);
    }

    #[tokio::test]
    async fn empty_append_on_new_file_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out.csv"));
        let (artist, album, _) = sample();

        let written = sink.append(&artist, &[album], &HashMap::new()).await.unwrap();
        assert_eq!(written, 0);

        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert_eq!(content.lines().next().unwrap().split(',').count(), 17);
    }

    #[test]
    fn headers_match_serialized_row() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(TrackRow::default()).unwrap();
        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let header = text.lines().next().unwrap();

        let mut expected = csv::Writer::from_writer(Vec::new());
        expected.write_record(TrackRow::HEADERS).unwrap();
        let expected = String::from_utf8(expected.into_inner().unwrap()).unwrap();
        assert_eq!(header, expected.trim_end());
    }
}
