use std::path::{Path, PathBuf};

use crate::error::ApiResult;

/// Artists that exhausted their retries, kept for a manual re-run.
pub struct FailedArtists {
    path: PathBuf,
    names: Vec<String>,
}

impl FailedArtists {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            names: Vec::new(),
        }
    }

    pub fn add(&mut self, name: String) {
        self.names.push(name);
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrites the side file with one name per line. Nothing is written
    /// when no artist failed.
    pub async fn persist(&self) -> ApiResult<bool> {
        if self.names.is_empty() {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            async_fs::create_dir_all(parent).await?;
        }
        async_fs::write(&self.path, self.names.join("\n")).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_one_name_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed_artists.txt");

        let mut failed = FailedArtists::new(&path);
        failed.add("First".into());
        failed.add("Second".into());

        assert!(failed.persist().await.unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "First\nSecond");
    }

    #[tokio::test]
    async fn nothing_written_without_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed_artists.txt");

        let failed = FailedArtists::new(&path);
        assert!(!failed.persist().await.unwrap());
        assert!(!path.exists());
    }
}
