mod auth;
mod failed;
mod sink;

pub use auth::TokenManager;
pub use failed::FailedArtists;
pub use sink::CsvSink;
