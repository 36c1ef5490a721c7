//! Mask resource resolution and fetching.
//!
//! Mask images live in the external job store. A [`MaskResolver`] turns a region's opaque
//! reference into a URL and a [`MaskLoader`] fetches the encoded bytes behind it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use tracing::debug;

use crate::error::{OverlayError, Result};
use crate::traits::{MaskLoader, MaskResolver};

/// Reads masks from the local filesystem.
///
/// Accepts plain paths and `file://` URLs; relative paths are joined onto `root`. Paths
/// that resolve outside `root` are reported as not found.
#[derive(Debug, Clone, Default)]
pub struct FsMaskLoader {
    pub root: PathBuf,
}

impl FsMaskLoader {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Resolve `url` to a canonical path inside `root`; anything escaping it is not found
    async fn confined_path(&self, url: &str) -> Result<PathBuf> {
        let root = if self.root.as_os_str().is_empty() {
            Path::new(".")
        } else {
            self.root.as_path()
        };
        let raw = Path::new(url.strip_prefix("file://").unwrap_or(url));
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            root.join(raw)
        };

        let root = canonical(root, url).await?;
        let path = canonical(&joined, url).await?;
        if !path.starts_with(&root) {
            debug!(url = %truncate(url), root = %root.display(), "mask path escapes root");
            return Err(OverlayError::MaskNotFound(truncate(url)));
        }
        Ok(path)
    }
}

async fn canonical(path: &Path, url: &str) -> Result<PathBuf> {
    tokio::fs::canonicalize(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => OverlayError::MaskNotFound(truncate(url)),
        _ => e.into(),
    })
}

impl MaskLoader for FsMaskLoader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let path = self.confined_path(url).await?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OverlayError::MaskNotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Decodes inline `data:<mime>;base64,<payload>` URLs
#[derive(Debug, Clone, Default)]
pub struct DataUrlLoader;

impl DataUrlLoader {
    pub fn decode(url: &str) -> Result<Vec<u8>> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| OverlayError::MalformedDataUrl(truncate(url)))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| OverlayError::MalformedDataUrl(truncate(url)))?;
        if !header.ends_with(";base64") {
            return Err(OverlayError::MalformedDataUrl(truncate(url)));
        }
        Ok(STANDARD.decode(payload.trim())?)
    }

    /// Encode bytes as a data URL, handy for inlining small masks
    pub fn encode(mime: &str, bytes: &[u8]) -> String {
        format!("data:{mime};base64,{}", STANDARD.encode(bytes))
    }
}

impl MaskLoader for DataUrlLoader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        Self::decode(url)
    }
}

/// Fetches masks over HTTP(S)
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct HttpMaskLoader {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpMaskLoader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
impl MaskLoader for HttpMaskLoader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(OverlayError::MaskNotFound(url.to_string()));
        }
        let bytes = response.error_for_status()?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Serves masks from an in-process map, e.g. masks prefetched alongside a sample
#[derive(Debug, Clone, Default)]
pub struct MemoryMaskLoader {
    masks: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryMaskLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        if let Ok(mut masks) = self.masks.write() {
            masks.insert(url.into(), bytes);
        }
    }

    pub fn len(&self) -> usize {
        self.masks.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MaskLoader for MemoryMaskLoader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let masks = self
            .masks
            .read()
            .map_err(|_| OverlayError::MaskFetch {
                url: url.to_string(),
                reason: "mask cache poisoned".to_string(),
            })?;
        masks
            .get(url)
            .cloned()
            .ok_or_else(|| OverlayError::MaskNotFound(url.to_string()))
    }
}

/// Dispatches on the URL scheme: `data:`, `http(s)://` (with the `http` feature),
/// and everything else as a filesystem path.
#[derive(Debug, Clone, Default)]
pub struct SchemeLoader {
    pub fs: FsMaskLoader,
    pub data: DataUrlLoader,
    #[cfg(feature = "http")]
    pub http: HttpMaskLoader,
}

impl SchemeLoader {
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            fs: FsMaskLoader::new(root),
            ..Default::default()
        }
    }
}

impl MaskLoader for SchemeLoader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if url.starts_with("data:") {
            return self.data.fetch(url).await;
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            #[cfg(feature = "http")]
            return self.http.fetch(url).await;
            #[cfg(not(feature = "http"))]
            return Err(OverlayError::UnsupportedScheme(truncate(url)));
        }
        self.fs.fetch(url).await
    }
}

/// Hands the mask reference through unchanged; pairs with [`FsMaskLoader`] rooted at the
/// job store's mask directory.
#[derive(Debug, Clone, Default)]
pub struct PassthroughResolver;

impl MaskResolver for PassthroughResolver {
    fn resolve(&self, _job_id: i64, mask_ref: &str) -> Option<String> {
        (!mask_ref.is_empty()).then(|| mask_ref.to_string())
    }
}

/// Builds job store mask endpoints: `{base_url}/api/v1/jobs/{job_id}/masks/{mask_ref}`
#[derive(Debug, Clone)]
pub struct JobStoreResolver {
    pub base_url: String,
}

impl JobStoreResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl MaskResolver for JobStoreResolver {
    fn resolve(&self, job_id: i64, mask_ref: &str) -> Option<String> {
        if mask_ref.is_empty() {
            return None;
        }
        Some(format!(
            "{}/api/v1/jobs/{}/masks/{}",
            self.base_url.trim_end_matches('/'),
            job_id,
            mask_ref.trim_start_matches('/')
        ))
    }
}

fn truncate(url: &str) -> String {
    url.chars().take(64).collect()
}
