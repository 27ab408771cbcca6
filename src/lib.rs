//! Spotify catalogue scraper library.
//!
//! Resolves a ranked list of artist names against the Spotify Web API,
//! walks every artist's full albums and their tracks with bounded
//! parallelism, and appends one CSV row per track. A second step joins the
//! result with streaming statistics scraped from kworb.net.
//!
//! # Modules
//!
//! - `cli` - `fetch` and `merge` commands
//! - `config` - environment and timing settings
//! - `error` - failure taxonomy
//! - `kworb` - kworb.net page download and parsing
//! - `management` - token lifecycle, CSV sink, failed-artist file
//! - `pipeline` - artist → album → track dispatch
//! - `retry` - bounded fixed-delay retries
//! - `spotify` - Spotify Web API client
//! - `types` - domain records, decoders and CSV rows
//! - `utils` - jitter, formatting and input readers
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use spotscrape::{config::Settings, management::CsvSink, pipeline::{Dispatcher, Workers}};
//!
//! let client = Arc::new(spotscrape::spotify::SpotifyClient::new(credentials, Settings::from_env())?);
//! let dispatcher = Dispatcher::new(client, Arc::new(CsvSink::new("out.csv")), Workers::default(), None);
//! let summary = dispatcher.run(vec!["Tove Lo".into()], |_, _| {}).await;
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod kworb;
pub mod management;
pub mod pipeline;
pub mod retry;
pub mod spotify;
pub mod types;
pub mod utils;

/// Boxed-error result used where failures only end up in a message,
/// e.g. logging setup in the binary.
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

// Console status lines for the commands. Library code logs through
// `tracing` instead.

/// `[o] message` in blue.
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// `[✓] message` in green.
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// `[!] message` in red, then exits with status 1. Only for setup failures
/// a command cannot continue from.
///
/// ```
/// error!("Cannot read artists from {}: {}", path.display(), e);
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// `[!] message` in yellow.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
