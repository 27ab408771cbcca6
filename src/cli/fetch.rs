use std::{path::PathBuf, sync::Arc, time::Instant};

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tabled::Table;

use crate::{
    cli::resolve_credentials,
    config::Settings,
    error, info,
    management::{CsvSink, FailedArtists},
    pipeline::{ArtistOutcome, Dispatcher, Workers},
    spotify::SpotifyClient,
    success,
    types::FailedArtistRow,
    utils, warning,
};

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Ranked artist list; names are read from the second column
    #[clap(long, default_value = "artists.csv")]
    pub input: PathBuf,

    /// Output file, appended to
    #[clap(long, default_value = "spotify_data.csv")]
    pub output: PathBuf,

    /// Where names of artists that exhausted their retries are written
    #[clap(long, default_value = "failed_artists.txt")]
    pub failed: PathBuf,

    /// Client id and secret, first row only
    #[clap(long, default_value = "tokens.csv")]
    pub credentials: PathBuf,

    /// Artists processed in parallel
    #[clap(long, default_value_t = 3)]
    pub artists_workers: usize,

    /// Albums processed in parallel per artist
    #[clap(long, default_value_t = 5)]
    pub albums_workers: usize,

    /// Track details fetched in parallel per album
    #[clap(long, default_value_t = 10)]
    pub tracks_workers: usize,

    /// Upper bound on albums listed per artist (before filtering)
    #[clap(long)]
    pub max_albums: Option<usize>,

    /// Attempts per artist
    #[clap(long, default_value_t = 5)]
    pub max_retries: u32,
}

pub async fn fetch(args: FetchArgs) {
    let started = Instant::now();

    let names = match utils::read_artist_names(&args.input).await {
        Ok(names) => names,
        Err(e) => error!("Cannot read artists from {}: {}", args.input.display(), e),
    };
    if names.is_empty() {
        warning!("No artists in {}", args.input.display());
        return;
    }
    info!("{} artists read from {}", names.len(), args.input.display());

    let credentials = match resolve_credentials(&args.credentials).await {
        Ok(credentials) => credentials,
        Err(e) => error!("{}", e),
    };

    let mut settings = Settings::from_env();
    settings.artist_retry.max_attempts = args.max_retries;

    let client = match SpotifyClient::new(credentials, settings) {
        Ok(client) => Arc::new(client),
        Err(e) => error!("Cannot build HTTP client: {}", e),
    };
    if let Err(e) = client.tokens().get_token().await {
        error!("Cannot obtain Spotify access token: {}", e);
    }
    success!("Spotify access token obtained");

    let dispatcher = Dispatcher::new(
        Arc::clone(&client),
        Arc::new(CsvSink::new(&args.output)),
        Workers {
            artists: args.artists_workers,
            albums: args.albums_workers,
            tracks: args.tracks_workers,
        },
        args.max_albums,
    );

    let pb = ProgressBar::new(names.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );

    let summary = dispatcher
        .run(names, |name, outcome| {
            pb.inc(1);
            match outcome {
                ArtistOutcome::Written(rows) => pb.set_message(format!("{name}: {rows} rows")),
                ArtistOutcome::NotFound => pb.set_message(format!("{name}: not found")),
                ArtistOutcome::Failed(_) => pb.set_message(format!("{name}: failed")),
                ArtistOutcome::Skipped => pb.set_message(format!("{name}: skipped")),
            }
        })
        .await;
    pb.finish_and_clear();

    let elapsed = started.elapsed();
    success!(
        "Done in {:.1}s: {} artists succeeded, {} failed, {} rows written to {} ({} requests)",
        elapsed.as_secs_f64(),
        summary.succeeded.len(),
        summary.failed.len(),
        summary.rows,
        args.output.display(),
        client.request_count()
    );

    if !summary.failed.is_empty() {
        let rows: Vec<FailedArtistRow> = summary
            .failed
            .iter()
            .enumerate()
            .map(|(i, name)| FailedArtistRow {
                position: i + 1,
                name: name.clone(),
            })
            .collect();
        println!("{}", Table::new(rows));

        let mut failed = FailedArtists::new(&args.failed);
        for name in summary.failed {
            failed.add(name);
        }
        match failed.persist().await {
            Ok(_) => warning!(
                "{} failed artists written to {}",
                failed.names().len(),
                failed.path().display()
            ),
            Err(e) => warning!(
                "Cannot write failed artists to {}: {}",
                failed.path().display(),
                e
            ),
        }
    }

    if let Some(reason) = summary.fatal {
        error!("Run stopped early: {}", reason);
    }
}
