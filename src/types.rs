use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabled::Tabled;

use crate::utils;

// Decoding helpers. A missing key, a null or a value of the wrong JSON type
// all fall back to the documented default; decoding never fails.

fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn opt_str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

fn u64_field(v: &Value, key: &str) -> u64 {
    v.get(key).and_then(Value::as_u64).unwrap_or_default()
}

fn u32_field(v: &Value, key: &str) -> u32 {
    u32::try_from(u64_field(v, key)).unwrap_or(u32::MAX)
}

fn opt_u32_field(v: &Value, key: &str) -> Option<u32> {
    v.get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

fn bool_field(v: &Value, key: &str) -> bool {
    v.get(key).and_then(Value::as_bool).unwrap_or_default()
}

fn list_field<T>(v: &Value, key: &str, decode: impl Fn(&Value) -> T) -> Vec<T> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().map(decode).collect())
        .unwrap_or_default()
}

fn string_list_field(v: &Value, key: &str) -> Vec<String> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// `external_urls` object: the Spotify link plus whatever else is listed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Urls {
    pub spotify: Option<String>,
    pub other: BTreeMap<String, Value>,
}

impl Urls {
    pub fn from_json(v: &Value) -> Self {
        let Some(map) = v.as_object() else {
            return Self::default();
        };

        Self {
            spotify: opt_str_field(v, "spotify"),
            other: map
                .iter()
                .filter(|(k, _)| k.as_str() != "spotify")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Image {
    pub height: Option<u32>,
    pub url: String,
    pub width: Option<u32>,
}

impl Image {
    pub fn from_json(v: &Value) -> Self {
        Self {
            height: opt_u32_field(v, "height"),
            url: str_field(v, "url"),
            width: opt_u32_field(v, "width"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Followers {
    pub href: Option<String>,
    pub total: u64,
}

impl Followers {
    pub fn from_json(v: &Value) -> Self {
        Self {
            href: opt_str_field(v, "href"),
            total: u64_field(v, "total"),
        }
    }
}

/// A full artist object, or an artist summary embedded in an album/track
/// (summaries carry no popularity, followers or genres).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artist {
    pub urls: Urls,
    pub href: String,
    pub id: String,
    pub name: String,
    pub kind: String,
    pub uri: String,
    pub popularity: u32,
    pub followers: Option<Followers>,
    pub genres: Vec<String>,
}

impl Artist {
    pub fn from_json(v: &Value) -> Self {
        Self {
            urls: v.get("external_urls").map(Urls::from_json).unwrap_or_default(),
            href: str_field(v, "href"),
            id: str_field(v, "id"),
            name: str_field(v, "name"),
            kind: str_field(v, "type"),
            uri: str_field(v, "uri"),
            popularity: u32_field(v, "popularity"),
            followers: v
                .get("followers")
                .filter(|f| f.is_object())
                .map(Followers::from_json),
            genres: string_list_field(v, "genres"),
        }
    }

    pub fn follower_count(&self) -> u64 {
        self.followers.as_ref().map_or(0, |f| f.total)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DatePrecision {
    Day,
    Month,
    Year,
    #[default]
    Unknown,
}

impl DatePrecision {
    pub fn parse(s: &str) -> Self {
        match s {
            "day" => Self::Day,
            "month" => Self::Month,
            "year" => Self::Year,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Album {
    /// Release type: "album", "single", "compilation", ...
    pub album_type: String,
    pub total_tracks: u32,
    pub available_markets: Vec<String>,
    pub urls: Urls,
    pub href: String,
    pub id: String,
    pub images: Vec<Image>,
    pub name: String,
    pub release_date: String,
    pub release_date_precision: DatePrecision,
    /// Object type, always "album" for well-formed payloads.
    pub kind: String,
    pub uri: String,
    pub artists: Vec<Artist>,
}

impl Album {
    pub fn from_json(v: &Value) -> Self {
        Self {
            album_type: str_field(v, "album_type"),
            total_tracks: u32_field(v, "total_tracks"),
            available_markets: string_list_field(v, "available_markets"),
            urls: v.get("external_urls").map(Urls::from_json).unwrap_or_default(),
            href: str_field(v, "href"),
            id: str_field(v, "id"),
            images: list_field(v, "images", Image::from_json),
            name: str_field(v, "name"),
            release_date: str_field(v, "release_date"),
            release_date_precision: DatePrecision::parse(&str_field(v, "release_date_precision")),
            kind: str_field(v, "type"),
            uri: str_field(v, "uri"),
            artists: list_field(v, "artists", Artist::from_json),
        }
    }

    /// Studio albums only: release type "album" with more than one track.
    pub fn is_full_album(&self) -> bool {
        self.album_type == "album" && self.total_tracks > 1
    }

    /// Leading year of the release date, empty when the date is unknown.
    pub fn release_year(&self) -> &str {
        self.release_date
            .get(..4)
            .unwrap_or(self.release_date.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub artists: Vec<Artist>,
    pub available_markets: Vec<String>,
    pub disc_number: u32,
    pub duration_ms: u64,
    pub explicit: bool,
    pub urls: Urls,
    pub href: String,
    pub id: String,
    pub name: String,
    pub preview_url: Option<String>,
    pub track_number: u32,
    pub kind: String,
    pub uri: String,
    pub is_local: bool,
    pub popularity: u32,
}

impl Track {
    pub fn from_json(v: &Value) -> Self {
        Self {
            artists: list_field(v, "artists", Artist::from_json),
            available_markets: string_list_field(v, "available_markets"),
            disc_number: u32_field(v, "disc_number"),
            duration_ms: u64_field(v, "duration_ms"),
            explicit: bool_field(v, "explicit"),
            urls: v.get("external_urls").map(Urls::from_json).unwrap_or_default(),
            href: str_field(v, "href"),
            id: str_field(v, "id"),
            name: str_field(v, "name"),
            preview_url: opt_str_field(v, "preview_url"),
            track_number: u32_field(v, "track_number"),
            kind: str_field(v, "type"),
            uri: str_field(v, "uri"),
            is_local: bool_field(v, "is_local"),
            popularity: u32_field(v, "popularity"),
        }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn from_json(v: &Value, decode: impl Fn(&Value) -> T) -> Self {
        Self {
            items: list_field(v, "items", decode),
            next: opt_str_field(v, "next"),
        }
    }
}

/// Bearer token plus the unix timestamp at which it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: i64,
}

impl Credential {
    pub fn is_expired(&self, now: i64, margin_secs: i64) -> bool {
        now >= self.expires_at - margin_secs
    }
}

/// Client id / secret pair used for the client-credentials exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Everything fetched for one artist that still has to be written out.
#[derive(Debug, Clone, Default)]
pub struct WorkUnit {
    pub artist: Artist,
    pub albums: Vec<Album>,
    pub tracks: HashMap<String, Vec<Track>>,
}

pub const SERVICE_NAME: &str = "Spotify";

/// One line of the fetch output: artist x album x track, flattened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackRow {
    #[serde(rename = "Service")]
    pub service: String,
    #[serde(rename = "Artist")]
    pub artist: String,
    #[serde(rename = "Followers")]
    pub followers: u64,
    #[serde(rename = "Artist popularity")]
    pub artist_popularity: u32,
    #[serde(rename = "Genres")]
    pub genres: String,
    #[serde(rename = "Album")]
    pub album: String,
    #[serde(rename = "Album type")]
    pub album_type: String,
    #[serde(rename = "Release year")]
    pub release_year: String,
    #[serde(rename = "Track count")]
    pub track_count: u32,
    #[serde(rename = "Track")]
    pub track: String,
    #[serde(rename = "Track number")]
    pub track_number: u32,
    #[serde(rename = "Duration (ms)")]
    pub duration_ms: u64,
    #[serde(rename = "Duration (min:sec)")]
    pub duration: String,
    #[serde(rename = "Track popularity")]
    pub track_popularity: u32,
    #[serde(rename = "Explicit")]
    pub explicit: String,
    #[serde(rename = "Spotify URL (album)")]
    pub album_url: String,
    #[serde(rename = "Spotify URL (track)")]
    pub track_url: String,
}

impl TrackRow {
    pub fn new(artist: &Artist, album: &Album, track: &Track) -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            artist: artist.name.clone(),
            followers: artist.follower_count(),
            artist_popularity: artist.popularity,
            genres: artist.genres.join(", "),
            album: album.name.clone(),
            album_type: album.album_type.clone(),
            release_year: album.release_year().to_string(),
            track_count: album.total_tracks,
            track: track.name.clone(),
            track_number: track.track_number,
            duration_ms: track.duration_ms,
            duration: utils::format_duration(track.duration_ms),
            track_popularity: track.popularity,
            explicit: if track.explicit { "Yes" } else { "No" }.to_string(),
            album_url: album.urls.spotify.clone().unwrap_or_default(),
            track_url: track.urls.spotify.clone().unwrap_or_default(),
        }
    }
}

/// Artist-wide counters from the kworb songs page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtistStreamStats {
    pub total_streams: Option<u64>,
    pub as_lead_streams: Option<u64>,
    pub solo_streams: Option<u64>,
    pub as_feature_streams: Option<u64>,
    pub total_tracks: Option<u64>,
    pub as_lead_tracks: Option<u64>,
    pub solo_tracks: Option<u64>,
    pub as_feature_tracks: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SongStreams {
    pub total: u64,
    pub daily: u64,
}

/// A [`TrackRow`] extended with stream counts; columns are inserted right
/// after the album URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergedRow {
    #[serde(rename = "Service")]
    pub service: String,
    #[serde(rename = "Artist")]
    pub artist: String,
    #[serde(rename = "Followers")]
    pub followers: u64,
    #[serde(rename = "Artist popularity")]
    pub artist_popularity: u32,
    #[serde(rename = "Genres")]
    pub genres: String,
    #[serde(rename = "Album")]
    pub album: String,
    #[serde(rename = "Album type")]
    pub album_type: String,
    #[serde(rename = "Release year")]
    pub release_year: String,
    #[serde(rename = "Track count")]
    pub track_count: u32,
    #[serde(rename = "Track")]
    pub track: String,
    #[serde(rename = "Track number")]
    pub track_number: u32,
    #[serde(rename = "Duration (ms)")]
    pub duration_ms: u64,
    #[serde(rename = "Duration (min:sec)")]
    pub duration: String,
    #[serde(rename = "Track popularity")]
    pub track_popularity: u32,
    #[serde(rename = "Explicit")]
    pub explicit: String,
    #[serde(rename = "Spotify URL (album)")]
    pub album_url: String,
    #[serde(rename = "Streams (total)")]
    pub streams_total: u64,
    #[serde(rename = "Streams (daily)")]
    pub streams_daily: u64,
    #[serde(rename = "Artist monthly listeners")]
    pub monthly_listeners: Option<u64>,
    #[serde(rename = "Total Streams")]
    pub total_streams: Option<u64>,
    #[serde(rename = "Total Tracks")]
    pub total_tracks: Option<u64>,
    #[serde(rename = "As Lead Streams")]
    pub as_lead_streams: Option<u64>,
    #[serde(rename = "As Lead Tracks")]
    pub as_lead_tracks: Option<u64>,
    #[serde(rename = "Solo Streams")]
    pub solo_streams: Option<u64>,
    #[serde(rename = "Solo Tracks")]
    pub solo_tracks: Option<u64>,
    #[serde(rename = "As Feature Streams")]
    pub as_feature_streams: Option<u64>,
    #[serde(rename = "As Feature Tracks")]
    pub as_feature_tracks: Option<u64>,
    #[serde(rename = "Spotify URL (track)")]
    pub track_url: String,
}

impl MergedRow {
    pub fn new(
        row: TrackRow,
        song: SongStreams,
        stats: &ArtistStreamStats,
        monthly_listeners: Option<u64>,
    ) -> Self {
        Self {
            service: row.service,
            artist: row.artist,
            followers: row.followers,
            artist_popularity: row.artist_popularity,
            genres: row.genres,
            album: row.album,
            album_type: row.album_type,
            release_year: row.release_year,
            track_count: row.track_count,
            track: row.track,
            track_number: row.track_number,
            duration_ms: row.duration_ms,
            duration: row.duration,
            track_popularity: row.track_popularity,
            explicit: row.explicit,
            album_url: row.album_url,
            streams_total: song.total,
            streams_daily: song.daily,
            monthly_listeners,
            total_streams: stats.total_streams,
            total_tracks: stats.total_tracks,
            as_lead_streams: stats.as_lead_streams,
            as_lead_tracks: stats.as_lead_tracks,
            solo_streams: stats.solo_streams,
            solo_tracks: stats.solo_tracks,
            as_feature_streams: stats.as_feature_streams,
            as_feature_tracks: stats.as_feature_tracks,
            track_url: row.track_url,
        }
    }
}

#[derive(Tabled)]
pub struct FailedArtistRow {
    #[tabled(rename = "#")]
    pub position: usize,
    #[tabled(rename = "Artist")]
    pub name: String,
}
