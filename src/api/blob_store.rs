use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::config::MediaConfig;

/// Storage for uploaded files. Returns a reference that can later be used to fetch the file.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, folder: &str, filename: &str, bytes: &[u8]) -> Result<String>;
}

/// Stores uploads on the local filesystem under `root/<folder>/`.
pub struct LocalBlobStore {
    root: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(config.root.clone(), config.base_url.clone())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, folder: &str, filename: &str, bytes: &[u8]) -> Result<String> {
        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create media folder {}", dir.display()))?;

        let stored_name = format!("{}-{}", Uuid::new_v4().simple(), sanitize_filename(filename));
        let path = dir.join(&stored_name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!(path = %path.display(), size = bytes.len(), "Stored upload");

        Ok(format!("{}/{}/{}", self.base_url, folder, stored_name))
    }
}

fn sanitize_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    match cleaned.trim_matches('.') {
        "" => "upload".to_string(),
        trimmed => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_file_and_returns_reference() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "/media/");

        let reference = store
            .put("store_logos", "logo.png", b"png-bytes")
            .await
            .unwrap();

        assert!(reference.starts_with("/media/store_logos/"));
        assert!(reference.ends_with("-logo.png"));

        let stored_name = reference.rsplit('/').next().unwrap();
        let contents = std::fs::read(dir.path().join("store_logos").join(stored_name)).unwrap();
        assert_eq!(contents, b"png-bytes");
    }

    #[test]
    fn filenames_cannot_escape_folder() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("my photo (1).jpg"), "my_photo__1_.jpg");
        assert_eq!(sanitize_filename(".."), "upload");
    }
}
