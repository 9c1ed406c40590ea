//! # cms_backend
//!
//! A small content-management backend for a page editor: a media library
//! with validated image uploads, and HTML page snapshots stored on disk with
//! a best-effort relational mirror.
//!
//! ## Overview
//!
//! Two flows make up the core:
//!
//! - **Uploads** ([`UploadPipeline`]) sniff the real content type, check it
//!   against an image allow-list and the size limit, derive a normalized and
//!   collision-resistant filename, and commit the bytes to a
//!   [`ContentStore`].
//! - **Snapshots** ([`SnapshotService`]) overwrite the page file in the
//!   snapshot store, then try to insert a row through a [`PageMirror`].
//!   Database trouble never fails a save once the file is written; it turns
//!   into warnings or a `partial` status.
//!
//! [`CmsBuilder`] wires both into an axum [`Router`](axum::Router) mounted
//! at the editor's legacy script paths (`/upload-media.php`,
//! `/media-list.php`, `/media.php`, `/save-html.php`, `/preview.php`).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use cms_backend::{CmsBuilder, SqlMirror};
//!
//! # async fn example() {
//! let app = CmsBuilder::with_storage_root("storage")
//!     .mirror(SqlMirror::new("mysql://root@localhost/cms"))
//!     .build();
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await.unwrap();
//! axum::serve(listener, app).await.unwrap();
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `s3` | **yes** | Enables [`S3Store`] and re-exports from `aws-sdk-s3` / `aws-config`. |
//! | `rustls-tls` | no | Use `rustls` instead of the platform TLS for the AWS SDK. |

pub mod config;
pub mod error;
pub mod http;
pub mod media;
pub mod mirror;
pub mod snapshot;
pub mod storage;
pub mod upload;

pub use config::CmsBuilder;
pub use error::{CmsError, Result, StoreError};
pub use http::AppState;
pub use media::MediaAsset;
pub use mirror::{
    Columns, InsertOutcome, MemoryMirror, MirrorError, MirrorMode, MirrorSession, NoMirror,
    PageMirror, PageRecord, SqlMirror,
};
pub use snapshot::{PageSnapshot, SaveReport, SaveRequest, SaveStatus, SnapshotService};
#[cfg(feature = "s3")]
pub use storage::{Credentials, Region, S3Client, S3Config, S3ConfigBuilder, S3Store};
pub use storage::{ContentStore, FsStore, MemoryStore, StoredObject, leaf_name};
pub use upload::{StagedFile, TransportError, UploadLimits, UploadPipeline, UploadedFile};
