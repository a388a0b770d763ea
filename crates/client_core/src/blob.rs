use std::{fmt, sync::Arc};

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use shared::domain::ImageRef;

/// Receives upload progress as a whole percentage, 0 through 100.
pub type UploadProgress = Arc<dyn Fn(u8) + Send + Sync>;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Clone)]
enum BlobSource {
    Bytes(Arc<[u8]>),
    Url(String),
}

/// Opaque handle to image content, either raw bytes that still need to be
/// uploaded or content that already lives behind a URL.
#[derive(Clone)]
pub struct ExternalBlob {
    source: BlobSource,
    content_type: Option<String>,
    progress: Option<UploadProgress>,
}

impl ExternalBlob {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source: BlobSource::Bytes(Arc::from(bytes.into())),
            content_type: None,
            progress: None,
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            source: BlobSource::Url(url.into()),
            content_type: None,
            progress: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_upload_progress(mut self, progress: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// URL a renderer can load directly. Bytes that have not been uploaded
    /// yet are inlined as a `data:` URL.
    pub fn get_direct_url(&self) -> String {
        match &self.source {
            BlobSource::Url(url) => url.clone(),
            BlobSource::Bytes(bytes) => {
                format!("data:{};base64,{}", self.content_type(), STANDARD.encode(bytes))
            }
        }
    }

    pub async fn get_bytes(&self) -> Result<Vec<u8>> {
        match &self.source {
            BlobSource::Bytes(bytes) => Ok(bytes.to_vec()),
            BlobSource::Url(url) => {
                if url.starts_with('/') {
                    return Err(anyhow!("cannot fetch relative blob url {url}"));
                }
                let bytes = reqwest::get(url)
                    .await
                    .with_context(|| format!("failed to fetch {url}"))?
                    .error_for_status()?
                    .bytes()
                    .await?;
                Ok(bytes.to_vec())
            }
        }
    }

    /// The stored URL when this blob needs no upload.
    pub fn existing_ref(&self) -> Option<ImageRef> {
        match &self.source {
            BlobSource::Url(url) => Some(ImageRef::new(url.clone())),
            BlobSource::Bytes(_) => None,
        }
    }

    pub(crate) fn pending_bytes(&self) -> Option<Arc<[u8]>> {
        match &self.source {
            BlobSource::Bytes(bytes) => Some(Arc::clone(bytes)),
            BlobSource::Url(_) => None,
        }
    }

    pub(crate) fn progress(&self) -> Option<UploadProgress> {
        self.progress.clone()
    }
}

impl From<&ImageRef> for ExternalBlob {
    fn from(image: &ImageRef) -> Self {
        ExternalBlob::from_url(image.as_str())
    }
}

impl fmt::Debug for ExternalBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("ExternalBlob");
        match &self.source {
            BlobSource::Bytes(bytes) => out.field("bytes", &bytes.len()),
            BlobSource::Url(url) => out.field("url", url),
        };
        out.field("content_type", &self.content_type)
            .field("tracks_progress", &self.progress.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/blob_tests.rs"]
mod tests;
