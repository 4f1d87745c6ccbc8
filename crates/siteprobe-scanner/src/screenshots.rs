//! Multi-viewport screenshots taken before the modules run.

use crate::error::{Result, ScanError};
use async_trait::async_trait;
use siteprobe_browser::{BrowserPage, Viewport};
use siteprobe_core::{ScanId, ScreenshotUrls};
use std::path::PathBuf;

/// Blob storage for captured images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return its public URL.
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<String>;
}

/// Stores blobs as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Public URL a key is served from.
    #[must_use]
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), key)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<String> {
        if key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(ScanError::Storage(format!("invalid blob key: {key}")));
        }

        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(self.public_url(key))
    }
}

/// Capture a full-page screenshot at each preset and upload it.
///
/// A viewport whose capture or upload fails maps to `None`. The page is
/// returned to `restore` afterwards.
pub async fn capture_screenshots(
    page: &dyn BrowserPage,
    store: &dyn BlobStore,
    scan_id: &ScanId,
    presets: &[Viewport],
    restore: Viewport,
) -> ScreenshotUrls {
    let mut urls = ScreenshotUrls::new();

    for viewport in presets {
        let url = match capture_one(page, store, scan_id, *viewport).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(
                    "Screenshot at {} viewport failed for scan {}: {}",
                    viewport.name,
                    scan_id,
                    e
                );
                None
            }
        };
        urls.insert(viewport.name.to_string(), url);
    }

    if let Err(e) = page.set_viewport(restore.width, restore.height).await {
        tracing::warn!("Failed to restore viewport for scan {}: {}", scan_id, e);
    }

    urls
}

async fn capture_one(
    page: &dyn BrowserPage,
    store: &dyn BlobStore,
    scan_id: &ScanId,
    viewport: Viewport,
) -> Result<String> {
    page.set_viewport(viewport.width, viewport.height).await?;
    let png = page.screenshot(true).await?;
    store
        .upload(&format!("{}/{}.png", scan_id, viewport.name), &png)
        .await
}
