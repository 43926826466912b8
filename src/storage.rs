use async_trait::async_trait;
use log::{error, info};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Content-addressed storage for post images, keyed by hex SHA-256.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<(), ImageStoreError>;
    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), ImageStoreError>;
}

/// Sniff the MIME type from content, falling back to octet-stream.
pub fn sniff_mime(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into())
}

fn is_hex_hash(hash: &str) -> bool {
    hash.len() >= 2 && hash.chars().all(|c| c.is_ascii_hexdigit())
}

/// Files under `<root>/<first two hash chars>/<hash>`.
#[derive(Clone, Debug)]
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        info!("image store rooted at '{}'", root.display());
        Self { root }
    }

    fn path_for(&self, hash: &str) -> Result<PathBuf, ImageStoreError> {
        // the hash doubles as a file name, so nothing but hex may reach the filesystem
        if !is_hex_hash(hash) {
            return Err(ImageStoreError::NotFound);
        }
        Ok(self.root.join(&hash[0..2]).join(hash))
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn save(&self, hash: &str, _mime: &str, bytes: &[u8]) -> Result<(), ImageStoreError> {
        let path = self.path_for(hash)?;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ImageStoreError::Duplicate);
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                error!("create_dir_all failed for '{}': {e}", dir.display());
                ImageStoreError::Other(e.to_string())
            })?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            error!("write failed hash={hash} path='{}': {e}", path.display());
            ImageStoreError::Other(e.to_string())
        })
    }

    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), ImageStoreError> {
        let path = self.path_for(hash)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ImageStoreError::NotFound,
            _ => ImageStoreError::Other(e.to_string()),
        })?;
        let mime = sniff_mime(&bytes);
        Ok((bytes, mime))
    }
}
