//! Upload pipeline: validate a staged upload, sniff its type, name it and
//! commit it to the uploads store.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tempfile::TempPath;

use crate::error::{CmsError, Result, StoreError};
use crate::media::{self, MediaAsset, sniff};
use crate::storage::ContentStore;

/// Default upload limit: 5 MiB.
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 5 * 1024 * 1024;

const STORE_FAILED: &str = "Failed to store uploaded file.";

/// Transfer-level failures detected before the pipeline sees any content.
///
/// The `Display` text of each variant is the message returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request body hit the transport limit.
    #[error("Uploaded file exceeds allowed size.")]
    ExceedsTransportLimit,

    /// The body ended or broke mid-transfer.
    #[error("File was only partially uploaded.")]
    Partial,

    /// The file field was present but carried no file.
    #[error("No file was uploaded.")]
    NoFile,

    /// The staging directory is missing or unusable.
    #[error("Missing temporary directory on server.")]
    NoTempDir,

    /// Writing to the staging file failed.
    #[error("Failed to write file to disk.")]
    CantWrite,

    /// The claimed file extension is on the block list.
    #[error("File type blocked by server upload filter.")]
    Blocked,
}

/// Upload content after transfer, before validation.
#[derive(Debug)]
pub enum StagedFile {
    /// Spooled to a temporary file, removed when dropped.
    OnDisk(TempPath),
    /// Held in memory.
    InMemory(Vec<u8>),
}

impl StagedFile {
    /// Size of the staged content as reported by the staging storage.
    pub async fn len(&self) -> std::io::Result<u64> {
        match self {
            StagedFile::OnDisk(path) => Ok(tokio::fs::metadata(path).await?.len()),
            StagedFile::InMemory(bytes) => Ok(bytes.len() as u64),
        }
    }

    pub async fn is_empty(&self) -> std::io::Result<bool> {
        Ok(self.len().await? == 0)
    }

    async fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self {
            StagedFile::OnDisk(path) => tokio::fs::read(&path).await,
            StagedFile::InMemory(bytes) => Ok(bytes),
        }
    }
}

/// One uploaded file as handed over by the transport.
#[derive(Debug)]
pub struct UploadedFile {
    /// Filename claimed by the client.
    pub original_name: String,
    /// Size reported by the transport. Advisory only.
    pub declared_size: u64,
    pub staged: std::result::Result<StagedFile, TransportError>,
}

impl UploadedFile {
    /// An upload whose content is already in memory.
    pub fn in_memory(original_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            original_name: original_name.into(),
            declared_size: bytes.len() as u64,
            staged: Ok(StagedFile::InMemory(bytes)),
        }
    }

    /// An upload that failed in transit.
    pub fn failed(original_name: impl Into<String>, error: TransportError) -> Self {
        Self {
            original_name: original_name.into(),
            declared_size: 0,
            staged: Err(error),
        }
    }
}

/// Size limits and staging options applied while receiving uploads.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Largest accepted file, in bytes.
    pub max_size: u64,
    /// Directory for staging files. `None` uses the system temp directory.
    pub staging_dir: Option<PathBuf>,
    /// Lowercase extensions (without dot) refused before transfer.
    pub blocked_extensions: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_UPLOAD_SIZE,
            staging_dir: None,
            blocked_extensions: Vec::new(),
        }
    }
}

impl UploadLimits {
    /// Whether the extension claimed by `original_name` is blocked.
    pub fn is_blocked(&self, original_name: &str) -> bool {
        let Some((_, ext)) = original_name.rsplit_once('.') else {
            return false;
        };
        let ext = ext.to_ascii_lowercase();
        self.blocked_extensions.iter().any(|b| *b == ext)
    }

    fn too_large(&self) -> CmsError {
        const MIB: u64 = 1024 * 1024;
        let label = if self.max_size % MIB == 0 {
            format!("{}MB", self.max_size / MIB)
        } else {
            format!("{} bytes", self.max_size)
        };
        CmsError::PayloadTooLarge(format!("File exceeds {label} limit."))
    }
}

/// Validates uploads and commits accepted images to a [`ContentStore`].
pub struct UploadPipeline<S: ContentStore> {
    store: Arc<S>,
    limits: UploadLimits,
}

impl<S: ContentStore> UploadPipeline<S> {
    pub fn new(store: Arc<S>, limits: UploadLimits) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// Run one upload through validation, naming and storage.
    pub async fn accept(&self, file: UploadedFile) -> Result<MediaAsset> {
        let staged = file
            .staged
            .map_err(|e| CmsError::BadRequest(e.to_string()))?;

        if file.declared_size > self.limits.max_size {
            return Err(self.limits.too_large());
        }
        let staged_size = staged
            .len()
            .await
            .map_err(|e| CmsError::storage(STORE_FAILED, e))?;
        if staged_size > self.limits.max_size {
            return Err(self.limits.too_large());
        }

        let bytes = staged
            .into_bytes()
            .await
            .map_err(|e| CmsError::storage(STORE_FAILED, e))?;

        let mime = sniff::sniff(&bytes);
        let Some(extension) = media::extension_for(mime) else {
            tracing::debug!(
                "Rejected upload {:?}: sniffed type {mime} is not allowed",
                file.original_name
            );
            return Err(CmsError::UnsupportedMediaType(
                "Unsupported image format.".into(),
            ));
        };

        let uploaded_at = Utc::now();
        let filename = media::stored_filename(&file.original_name, extension, uploaded_at);
        let stored = self
            .store
            .put(&filename, &bytes, mime)
            .await
            .map_err(|e| CmsError::storage(STORE_FAILED, e))?;

        if stored.size != bytes.len() as u64 {
            return Err(CmsError::storage(
                STORE_FAILED,
                StoreError::Backend(
                    format!(
                        "stored size {} differs from upload size {}",
                        stored.size,
                        bytes.len()
                    )
                    .into(),
                ),
            ));
        }

        tracing::info!(
            "Stored upload {:?} as {filename} ({} bytes, {mime})",
            file.original_name,
            stored.size
        );

        let display = media::stem(&file.original_name);
        Ok(MediaAsset {
            name: if display.is_empty() {
                filename.clone()
            } else {
                display.to_string()
            },
            url: media::media_url(&filename),
            filename,
            size: stored.size,
            mime: mime.to_string(),
            uploaded_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x06\0\0\0";

    fn pipeline(store: &MemoryStore) -> UploadPipeline<MemoryStore> {
        UploadPipeline::new(Arc::new(store.clone()), UploadLimits::default())
    }

    #[tokio::test]
    async fn accepts_png_and_normalizes_name() {
        let store = MemoryStore::new();
        let asset = pipeline(&store)
            .accept(UploadedFile::in_memory("My Photo!.png", PNG.to_vec()))
            .await
            .unwrap();

        assert!(asset.filename.starts_with("my-photo-"));
        assert!(asset.filename.ends_with(".png"));
        assert_eq!(asset.name, "My Photo!");
        assert_eq!(asset.mime, "image/png");
        assert_eq!(asset.size, PNG.len() as u64);
        assert_eq!(store.get(&asset.filename).await.unwrap().unwrap(), PNG);
    }

    #[tokio::test]
    async fn extension_follows_content_not_name() {
        let store = MemoryStore::new();
        let asset = pipeline(&store)
            .accept(UploadedFile::in_memory("really-a-png.gif", PNG.to_vec()))
            .await
            .unwrap();
        assert!(asset.filename.ends_with(".png"));
    }

    #[tokio::test]
    async fn rejects_non_image_named_jpg() {
        let store = MemoryStore::new();
        let err = pipeline(&store)
            .accept(UploadedFile::in_memory("fake.jpg", b"<html>nope</html>".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::UnsupportedMediaType(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn zero_byte_upload_is_unsupported() {
        let store = MemoryStore::new();
        let err = pipeline(&store)
            .accept(UploadedFile::in_memory("empty.png", Vec::new()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported image format.");
    }

    #[tokio::test]
    async fn declared_size_over_limit_is_rejected() {
        let store = MemoryStore::new();
        let mut file = UploadedFile::in_memory("big.png", PNG.to_vec());
        file.declared_size = DEFAULT_MAX_UPLOAD_SIZE + 1;

        let err = pipeline(&store).accept(file).await.unwrap_err();
        assert!(matches!(err, CmsError::PayloadTooLarge(_)));
        assert_eq!(err.to_string(), "File exceeds 5MB limit.");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn staged_size_is_revalidated() {
        let store = MemoryStore::new();
        let mut bytes = PNG.to_vec();
        bytes.resize(2048, 0);
        let mut file = UploadedFile::in_memory("sneaky.png", bytes);
        file.declared_size = 10;

        let limits = UploadLimits {
            max_size: 1024,
            ..UploadLimits::default()
        };
        let err = UploadPipeline::new(Arc::new(store.clone()), limits)
            .accept(file)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "File exceeds 1024 bytes limit.");
    }

    #[tokio::test]
    async fn transport_errors_map_to_bad_request() {
        let store = MemoryStore::new();
        let err = pipeline(&store)
            .accept(UploadedFile::failed("x.png", TransportError::Partial))
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::BadRequest(_)));
        assert_eq!(err.to_string(), "File was only partially uploaded.");
    }

    #[tokio::test]
    async fn store_failure_hides_details() {
        let store = MemoryStore::failing();
        let err = pipeline(&store)
            .accept(UploadedFile::in_memory("a.png", PNG.to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::Storage { .. }));
        assert_eq!(err.to_string(), STORE_FAILED);
    }

    #[test]
    fn blocked_extensions_are_case_insensitive() {
        let limits = UploadLimits {
            blocked_extensions: vec!["exe".into(), "php".into()],
            ..UploadLimits::default()
        };
        assert!(limits.is_blocked("setup.EXE"));
        assert!(limits.is_blocked("shell.php"));
        assert!(!limits.is_blocked("photo.png"));
        assert!(!limits.is_blocked("README"));
    }
}
