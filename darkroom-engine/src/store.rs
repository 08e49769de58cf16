//! External image store
//!
//! Pipelines fetch their inputs from, and upload their results to, an
//! external store. The engine only needs three operations, captured by
//! [`ExternalStore`]. [`LocalStore`] keeps images in a directory served
//! under a public base URL and can also fetch plain http(s) URLs.

use async_trait::async_trait;
use darkroom_core::domain::image::ImageRef;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Metadata of an uploaded image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredImage {
    pub id: String,
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: String,
    pub byte_size: u64,
}

impl StoredImage {
    pub fn image_ref(&self) -> ImageRef {
        ImageRef::new(self.id.clone(), self.url.clone())
    }
}

/// Store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Unsupported image URL: {0}")]
    UnsupportedUrl(String),

    #[error("Download of {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Artifact persistence at pipeline boundaries
#[async_trait]
pub trait ExternalStore: Send + Sync {
    /// Uploads a local file as `folder/desired_id`
    async fn upload(
        &self,
        local: &Path,
        folder: &str,
        desired_id: &str,
    ) -> Result<StoredImage, StoreError>;

    /// Deletes a previously uploaded image
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Downloads `url` into `dest`, returning the number of bytes written
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, StoreError>;
}

/// Directory-backed store
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    base_url: String,
    http: reqwest::Client,
}

impl LocalStore {
    /// Creates a store rooted at `root` whose files are served at `base_url`
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Maps a URL served by this store back to its file
    fn local_path(&self, url: &str) -> Option<PathBuf> {
        let relative = url.strip_prefix(&self.base_url)?.trim_start_matches('/');
        if relative.is_empty() || relative.split('/').any(|part| part == "..") {
            return None;
        }
        Some(self.root.join(relative))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<PathBuf>, StoreError> {
        let (folder, stem) = match id.rsplit_once('/') {
            Some((folder, stem)) => (self.root.join(folder), stem),
            None => (self.root.clone(), id),
        };

        let mut entries = match tokio::fs::read_dir(&folder).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(stem) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ExternalStore for LocalStore {
    async fn upload(
        &self,
        local: &Path,
        folder: &str,
        desired_id: &str,
    ) -> Result<StoredImage, StoreError> {
        let ext = local
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png")
            .to_lowercase();
        let folder = folder.trim_matches('/');
        let file_name = format!("{}.{}", desired_id, ext);

        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir).await?;
        let dest = dir.join(&file_name);
        let byte_size = tokio::fs::copy(local, &dest).await?;

        let header = read_header(&dest).await?;
        let (width, height) = png_dimensions(&header).unzip();
        let format = if header.starts_with(PNG_SIGNATURE) {
            "png".to_string()
        } else {
            ext
        };

        let id = if folder.is_empty() {
            desired_id.to_string()
        } else {
            format!("{}/{}", folder, desired_id)
        };
        let url = if folder.is_empty() {
            format!("{}/{}", self.base_url, file_name)
        } else {
            format!("{}/{}/{}", self.base_url, folder, file_name)
        };

        info!("Uploaded {} ({} bytes) as {}", local.display(), byte_size, id);

        Ok(StoredImage {
            id,
            url,
            width,
            height,
            format,
            byte_size,
        })
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        tokio::fs::remove_file(&path).await?;
        info!("Deleted image {}", id);
        Ok(())
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, StoreError> {
        if let Some(path) = self.local_path(url) {
            debug!("Fetching {} from local store", url);
            return match tokio::fs::copy(&path, dest).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(StoreError::NotFound(url.to_string()))
                }
                Err(e) => Err(e.into()),
            };
        }

        if let Some(path) = url.strip_prefix("file://") {
            debug!("Fetching {} from file system", url);
            return Ok(tokio::fs::copy(path, dest).await?);
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            debug!("Downloading {}", url);
            let response = self.http.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(StoreError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            let bytes = response.bytes().await?;
            tokio::fs::write(dest, &bytes).await?;
            return Ok(bytes.len() as u64);
        }

        Err(StoreError::UnsupportedUrl(url.to_string()))
    }
}

async fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    use tokio::io::AsyncReadExt;

    let file = tokio::fs::File::open(path).await?;
    let mut header = Vec::with_capacity(24);
    file.take(24).read_to_end(&mut header).await?;
    Ok(header)
}

/// Reads width and height from a PNG IHDR chunk
fn png_dimensions(header: &[u8]) -> Option<(u32, u32)> {
    if header.len() < 24 || !header.starts_with(PNG_SIGNATURE) || &header[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(header[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(header[20..24].try_into().ok()?);
    Some((width, height))
}
