use std::{
    collections::HashMap,
    path::Path,
    sync::LazyLock,
    time::Duration,
};

use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::{
    error::{ApiError, ApiResult},
    types::ClientCredentials,
};

/// Uniformly random delay taken before outbound calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub min: Duration,
    pub max: Duration,
}

impl Jitter {
    pub const NONE: Jitter = Jitter {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn from_secs(min: f64, max: f64) -> Self {
        Self {
            min: Duration::from_secs_f64(min),
            max: Duration::from_secs_f64(max),
        }
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let secs = rand::rng().random_range(self.min.as_secs_f64()..self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Formats milliseconds as `minutes:seconds`, seconds zero-padded.
pub fn format_duration(duration_ms: u64) -> String {
    let minutes = duration_ms / 60_000;
    let seconds = (duration_ms % 60_000) / 1_000;
    format!("{minutes}:{seconds:02}")
}

static FEATURING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\((?:feat\.|ft\.|with)[^)]*\)").expect("featuring pattern is valid")
});

/// Normalizes a song title for fuzzy matching between Spotify and kworb:
/// strips the kworb `*` marker and any featuring parenthesis, lowercases.
pub fn clean_title(title: &str) -> String {
    let title = title.trim().trim_start_matches('*').trim();
    FEATURING.replace_all(title, "").trim().to_lowercase()
}

/// Parses counters like `1,234,567` or `+12,000`. Anything else is 0.
pub fn parse_count(text: &str) -> u64 {
    text.trim()
        .trim_start_matches('+')
        .replace(',', "")
        .parse()
        .unwrap_or(0)
}

fn csv_reader(content: &str, has_headers: bool) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .from_reader(content.as_bytes())
}

/// Reads artist names from the second column of a ranked list.
///
/// The first row is a header and is skipped; rows with fewer than two
/// columns or a blank name are ignored.
pub async fn read_artist_names(path: &Path) -> ApiResult<Vec<String>> {
    let content = async_fs::read_to_string(path).await?;
    let mut reader = csv_reader(&content, false);
    let mut records = reader.records();

    match records.next() {
        Some(header) => {
            header?;
        }
        None => {
            return Err(ApiError::Input(format!("{} is empty", path.display())));
        }
    }

    let mut names = Vec::new();
    for record in records {
        let record = record?;
        if let Some(name) = record.get(1).map(str::trim) {
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Reads the `client id, secret` list; only the first complete row is used.
pub async fn read_credentials(path: &Path) -> ApiResult<ClientCredentials> {
    let content = async_fs::read_to_string(path).await?;
    let mut reader = csv_reader(&content, false);

    for record in reader.records() {
        let record = record?;
        if let (Some(id), Some(secret)) = (record.get(0), record.get(1)) {
            return Ok(ClientCredentials {
                client_id: id.trim().to_string(),
                client_secret: secret.trim().to_string(),
            });
        }
    }

    Err(ApiError::Input(format!(
        "{} contains no credentials",
        path.display()
    )))
}

#[derive(Debug, Deserialize)]
struct ListenerRecord {
    name: String,
    listeners: String,
}

/// Reads `name -> monthly listeners` from the ranked artists list.
/// A missing or unreadable file yields an empty map.
pub async fn read_listeners(path: &Path) -> HashMap<String, u64> {
    let content = match async_fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            warn!(
                "{} not readable ({e}), monthly listeners will be left empty",
                path.display()
            );
            return HashMap::new();
        }
    };

    let mut listeners = HashMap::new();
    for record in csv_reader(&content, true).deserialize::<ListenerRecord>() {
        match record {
            Ok(r) => {
                listeners.insert(r.name.trim().to_string(), parse_count(&r.listeners));
            }
            Err(e) => warn!("skipping malformed row in {}: {e}", path.display()),
        }
    }
    listeners
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_in_range() {
        let jitter = Jitter::from_secs(0.5, 1.5);
        for _ in 0..100 {
            let d = jitter.sample();
            assert!(d >= Duration::from_millis(500) && d < Duration::from_millis(1500));
        }
        assert_eq!(Jitter::NONE.sample(), Duration::ZERO);
    }

    #[test]
    fn durations_are_zero_padded() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(65_000), "1:05");
        assert_eq!(format_duration(185_999), "3:05");
        assert_eq!(format_duration(3_600_000), "60:00");
    }

    #[test]
    fn titles_lose_featuring_and_markers() {
        assert_eq!(clean_title("*Blinding Lights"), "blinding lights");
        assert_eq!(clean_title("Stay (feat. Justin Bieber)"), "stay");
        assert_eq!(clean_title("Stay (FT. Someone)"), "stay");
        assert_eq!(clean_title("Peaches (with Daniel Caesar) - Remix"), "peaches - remix");
        assert_eq!(clean_title("  Plain  "), "plain");
    }

    #[test]
    fn counts_parse_with_separators() {
        assert_eq!(parse_count("1,234,567"), 1_234_567);
        assert_eq!(parse_count(" +12,000 "), 12_000);
        assert_eq!(parse_count("-5"), 0);
        assert_eq!(parse_count("n/a"), 0);
    }
}
