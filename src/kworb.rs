//! Streaming statistics scraped from kworb.net artist pages.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::{
    error::ApiResult,
    types::{ArtistStreamStats, SongStreams},
    utils::{clean_title, parse_count},
};

const STATS_TABLE: &str = "body > div > div:nth-child(5) > table:nth-child(6)";
const SONGS_TABLE: &str = "table.addpos";

/// Socket timeout for page downloads.
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(15);

/// Per-song streams of one artist page, keyed by cleaned title in page order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongTable {
    songs: Vec<(String, SongStreams)>,
}

impl SongTable {
    /// Adds a song; a repeated title replaces the earlier numbers in place.
    pub fn insert(&mut self, title: String, streams: SongStreams) {
        match self.songs.iter_mut().find(|(t, _)| *t == title) {
            Some((_, existing)) => *existing = streams,
            None => self.songs.push((title, streams)),
        }
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Looks up an already cleaned track title: exact match first, then the
    /// first song whose title contains it or is contained in it.
    pub fn find(&self, clean: &str) -> Option<SongStreams> {
        if let Some((_, streams)) = self.songs.iter().find(|(t, _)| t == clean) {
            return Some(*streams);
        }
        if clean.is_empty() {
            return None;
        }
        self.songs
            .iter()
            .find(|(t, _)| !t.is_empty() && (t.contains(clean) || clean.contains(t.as_str())))
            .map(|(_, streams)| *streams)
    }
}

/// Everything read from one artist page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtistPage {
    pub stats: ArtistStreamStats,
    pub songs: SongTable,
}

pub struct KworbClient {
    http: Client,
    base_url: String,
}

impl KworbClient {
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn songs_url(&self, artist_id: &str) -> String {
        format!("{}/spotify/artist/{artist_id}_songs.html", self.base_url)
    }

    /// Fetches and parses the songs page of a Spotify artist id. Transport
    /// failures and non-200 answers are logged and give an empty page.
    pub async fn artist_page(&self, artist_id: &str) -> ArtistPage {
        let url = self.songs_url(artist_id);
        debug!("GET {url}");

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("kworb request for {artist_id} failed: {e}");
                return ArtistPage::default();
            }
        };

        if response.status() != StatusCode::OK {
            warn!("kworb answered {} for {artist_id}", response.status());
            return ArtistPage::default();
        }

        match response.text().await {
            Ok(html) => {
                let page = parse_artist_page(&html);
                if page.stats == ArtistStreamStats::default() {
                    warn!("No stats table on kworb page for {artist_id}");
                }
                if page.songs.is_empty() {
                    warn!("No songs table on kworb page for {artist_id}");
                }
                page
            }
            Err(e) => {
                warn!("Cannot read kworb page for {artist_id}: {e}");
                ArtistPage::default()
            }
        }
    }
}

fn cells(row: ElementRef<'_>) -> Vec<String> {
    let Ok(td) = Selector::parse("td") else {
        return Vec::new();
    };
    row.select(&td)
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .collect()
}

fn rows<'a>(table: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    match Selector::parse("tr") {
        Ok(tr) => table.select(&tr).collect(),
        Err(_) => Vec::new(),
    }
}

/// Reads the artist summary table and the songs table out of a kworb
/// artist page. Missing tables leave the corresponding part empty.
pub fn parse_artist_page(html: &str) -> ArtistPage {
    let document = Html::parse_document(html);
    ArtistPage {
        stats: parse_stats(&document),
        songs: parse_songs(&document),
    }
}

fn parse_stats(document: &Html) -> ArtistStreamStats {
    let mut stats = ArtistStreamStats::default();
    let Ok(selector) = Selector::parse(STATS_TABLE) else {
        return stats;
    };
    let Some(table) = document.select(&selector).next() else {
        return stats;
    };

    let rows = rows(table);
    // Row 2 holds streams, row 4 track counts; columns 2..5 are
    // total, as lead, solo and as feature.
    if let Some(streams) = rows.get(1).map(|r| cells(*r)).filter(|c| c.len() >= 5) {
        stats.total_streams = Some(parse_count(&streams[1]));
        stats.as_lead_streams = Some(parse_count(&streams[2]));
        stats.solo_streams = Some(parse_count(&streams[3]));
        stats.as_feature_streams = Some(parse_count(&streams[4]));
    }
    if let Some(tracks) = rows.get(3).map(|r| cells(*r)).filter(|c| c.len() >= 5) {
        stats.total_tracks = Some(parse_count(&tracks[1]));
        stats.as_lead_tracks = Some(parse_count(&tracks[2]));
        stats.solo_tracks = Some(parse_count(&tracks[3]));
        stats.as_feature_tracks = Some(parse_count(&tracks[4]));
    }

    stats
}

fn parse_songs(document: &Html) -> SongTable {
    let mut songs = SongTable::default();
    let (Ok(table_sel), Ok(td), Ok(anchor)) = (
        Selector::parse(SONGS_TABLE),
        Selector::parse("td"),
        Selector::parse("a"),
    ) else {
        return songs;
    };
    let Some(table) = document.select(&table_sel).next() else {
        return songs;
    };

    for row in rows(table).into_iter().skip(1) {
        let cols: Vec<ElementRef<'_>> = row.select(&td).collect();
        if cols.len() < 3 {
            continue;
        }
        let Some(link) = cols[0].select(&anchor).next() else {
            continue;
        };

        let title = clean_title(&link.text().collect::<String>());
        let text = |cell: &ElementRef<'_>| cell.text().collect::<String>();
        songs.insert(
            title,
            SongStreams {
                total: parse_count(text(&cols[1]).trim()),
                daily: parse_count(text(&cols[2]).trim()),
            },
        );
    }

    songs
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body><div>
  <div>nav</div>
  <div>title</div>
  <div>info</div>
  <div>spacer</div>
  <div>
    <span>a</span><span>b</span><span>c</span><span>d</span><span>e</span>
    <table>
      <tr><th></th><th>Total</th><th>As lead</th><th>Solo</th><th>As feature</th></tr>
      <tr><td>Streams</td><td>1,234,567</td><td>1,000,000</td><td>900,000</td><td>234,567</td></tr>
      <tr><td>Daily</td><td>5,000</td><td>4,000</td><td>3,000</td><td>1,000</td></tr>
      <tr><td>Tracks</td><td>42</td><td>30</td><td>25</td><td>12</td></tr>
    </table>
    <table class="addpos">
      <tr><th>Song Title</th><th>Streams</th><th>Daily</th></tr>
      <tr><td><a href="/t/1">*Habits (Stay High)</a></td><td>1,500,000,000</td><td>+120,000</td></tr>
      <tr><td><a href="/t/2">Talking Body (feat. Someone)</a></td><td>800,000</td><td>2,000</td></tr>
      <tr><td>no link</td><td>1</td><td>1</td></tr>
      <tr><td><a href="/t/3">Short</a></td><td>n/a</td></tr>
    </table>
  </div>
</div></body></html>
"#;

    #[test]
    fn parses_artist_stats_rows() {
        let page = parse_artist_page(PAGE);
        assert_eq!(page.stats.total_streams, Some(1_234_567));
        assert_eq!(page.stats.as_lead_streams, Some(1_000_000));
        assert_eq!(page.stats.solo_streams, Some(900_000));
        assert_eq!(page.stats.as_feature_streams, Some(234_567));
        assert_eq!(page.stats.total_tracks, Some(42));
        assert_eq!(page.stats.as_feature_tracks, Some(12));
    }

    #[test]
    fn parses_linked_song_rows_with_cleaned_titles() {
        let page = parse_artist_page(PAGE);
        assert_eq!(page.songs.len(), 2);
        assert_eq!(
            page.songs.find("habits (stay high)"),
            Some(SongStreams {
                total: 1_500_000_000,
                daily: 120_000
            })
        );
        assert_eq!(page.songs.find("talking body").map(|s| s.total), Some(800_000));
    }

    #[test]
    fn page_without_tables_is_empty() {
        let page = parse_artist_page("<html><body><p>404</p></body></html>");
        assert_eq!(page, ArtistPage::default());
    }

    #[test]
    fn find_falls_back_to_containment_either_way() {
        let mut songs = SongTable::default();
        songs.insert("habits".into(), SongStreams { total: 1, daily: 0 });
        songs.insert("cool girl - remix".into(), SongStreams { total: 2, daily: 0 });

        assert_eq!(songs.find("habits (stay high)").map(|s| s.total), Some(1));
        assert_eq!(songs.find("cool girl").map(|s| s.total), Some(2));
        assert_eq!(songs.find("unknown"), None);
        assert_eq!(songs.find(""), None);
    }

    #[test]
    fn repeated_title_keeps_last_numbers() {
        let mut songs = SongTable::default();
        songs.insert("a".into(), SongStreams { total: 1, daily: 1 });
        songs.insert("a".into(), SongStreams { total: 9, daily: 9 });
        assert_eq!(songs.len(), 1);
        assert_eq!(songs.find("a").map(|s| s.total), Some(9));
    }

    #[test]
    fn songs_url_uses_base() {
        let client = KworbClient::new("http://localhost:1234/", PAGE_TIMEOUT).unwrap();
        assert_eq!(
            client.songs_url("A1"),
            "http://localhost:1234/spotify/artist/A1_songs.html"
        );
    }
}
