//! Builder for configuring the stores and mirror behind the HTTP router.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;

use crate::http::{self, AppState};
use crate::mirror::{NoMirror, PageMirror};
use crate::snapshot::SnapshotService;
use crate::storage::{ContentStore, FsStore};
use crate::upload::{UploadLimits, UploadPipeline};

/// Default cap on the upload request body: 16 MiB.
pub const DEFAULT_TRANSPORT_LIMIT: usize = 16 * 1024 * 1024;

/// Builder for the CMS [`Router`].
///
/// Provides a fluent API for the two content stores, upload limits and the
/// relational mirror.
///
/// # Example
///
/// ```rust,no_run
/// use cms_backend::{CmsBuilder, SqlMirror};
///
/// # async fn example() {
/// let app = CmsBuilder::with_storage_root("storage")
///     .max_upload_size(5 * 1024 * 1024)
///     .block_extension("php")
///     .mirror(SqlMirror::new("mysql://root@localhost/cms"))
///     .build();
///
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await.unwrap();
/// axum::serve(listener, app).await.unwrap();
/// # }
/// ```
pub struct CmsBuilder<S: ContentStore, M: PageMirror = NoMirror> {
    uploads: S,
    snapshots: S,
    mirror: M,
    limits: UploadLimits,
    transport_limit: usize,
}

impl CmsBuilder<FsStore> {
    /// Filesystem stores under `root`: `root/uploads` for media and
    /// `root/snapshots` for pages.
    pub fn with_storage_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(
            FsStore::new(root.join("uploads")),
            FsStore::new(root.join("snapshots")),
        )
    }
}

impl<S: ContentStore> CmsBuilder<S> {
    /// Create a builder over the given stores with no database mirror.
    ///
    /// Defaults: 5 MiB upload limit, 16 MiB transport limit, system temp
    /// directory for staging, no blocked extensions.
    pub fn new(uploads: S, snapshots: S) -> Self {
        Self {
            uploads,
            snapshots,
            mirror: NoMirror,
            limits: UploadLimits::default(),
            transport_limit: DEFAULT_TRANSPORT_LIMIT,
        }
    }
}

impl<S: ContentStore, M: PageMirror> CmsBuilder<S, M> {
    /// Largest accepted media file, in bytes.
    pub fn max_upload_size(mut self, bytes: u64) -> Self {
        self.limits.max_size = bytes;
        self
    }

    /// Cap on the whole upload request body. Bodies above it fail as a
    /// transport error rather than a size-limit rejection.
    pub fn transport_limit(mut self, bytes: usize) -> Self {
        self.transport_limit = bytes;
        self
    }

    /// Directory for staging uploads before validation.
    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.limits.staging_dir = Some(dir.into());
        self
    }

    /// Refuse uploads whose claimed filename ends in `.{extension}`.
    pub fn block_extension(mut self, extension: impl AsRef<str>) -> Self {
        let ext = extension.as_ref().trim_start_matches('.').to_ascii_lowercase();
        if !ext.is_empty() {
            self.limits.blocked_extensions.push(ext);
        }
        self
    }

    /// Mirror saved pages into a relational store.
    pub fn mirror<M2: PageMirror>(self, mirror: M2) -> CmsBuilder<S, M2> {
        CmsBuilder {
            uploads: self.uploads,
            snapshots: self.snapshots,
            mirror,
            limits: self.limits,
            transport_limit: self.transport_limit,
        }
    }

    /// Consume the builder and return the application state.
    pub fn into_state(self) -> AppState<S, M> {
        let uploads = Arc::new(self.uploads);
        let snapshots = Arc::new(self.snapshots);

        AppState {
            upload: UploadPipeline::new(Arc::clone(&uploads), self.limits),
            snapshot: SnapshotService::new(Arc::clone(&snapshots), self.mirror),
            uploads,
            snapshots,
        }
    }

    /// Consume the builder and return the router serving every endpoint.
    pub fn build(self) -> Router {
        let transport_limit = self.transport_limit;
        http::router(self.into_state(), transport_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn block_extension_normalizes() {
        let builder = CmsBuilder::new(MemoryStore::new(), MemoryStore::new())
            .block_extension(".PHP")
            .block_extension("")
            .block_extension("exe");
        assert_eq!(builder.limits.blocked_extensions, vec!["php", "exe"]);
    }

    #[test]
    fn defaults() {
        let builder = CmsBuilder::new(MemoryStore::new(), MemoryStore::new());
        assert_eq!(builder.limits.max_size, 5 * 1024 * 1024);
        assert_eq!(builder.transport_limit, DEFAULT_TRANSPORT_LIMIT);
        assert!(builder.limits.staging_dir.is_none());
    }

    #[test]
    fn with_storage_root_layout() {
        let builder = CmsBuilder::with_storage_root("/srv/cms/storage");
        assert_eq!(
            builder.uploads.base_dir(),
            Path::new("/srv/cms/storage/uploads")
        );
        assert_eq!(
            builder.snapshots.base_dir(),
            Path::new("/srv/cms/storage/snapshots")
        );
    }
}
