//! Pluggable content stores holding media uploads and page snapshots.
//!
//! The crate ships with three backends:
//!
//! - [`FsStore`] -- a directory on the local filesystem.
//! - [`S3Store`] -- an Amazon S3 (or compatible) bucket under a key prefix
//!   (requires the `s3` feature).
//! - [`MemoryStore`] -- an in-memory map, used by tests.
//!
//! Every store is flat: objects are addressed by a bare leaf filename. Use
//! [`leaf_name`] to reduce client-supplied names before touching a store.

mod fs;
mod memory;
#[cfg(feature = "s3")]
mod s3;

#[cfg(feature = "s3")]
pub use aws_config::Region;
#[cfg(feature = "s3")]
pub use aws_sdk_s3::config::Credentials;
#[cfg(feature = "s3")]
pub use aws_sdk_s3::{Client as S3Client, Config as S3Config, config::Builder as S3ConfigBuilder};
pub use fs::FsStore;
pub use memory::MemoryStore;
#[cfg(feature = "s3")]
pub use s3::S3Store;

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Description of one object held by a [`ContentStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Leaf filename, unique within the store.
    pub name: String,
    /// Size in bytes as reported by the backend.
    pub size: u64,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Content type. For [`ContentStore::list`] this is sniffed from the
    /// object's leading bytes.
    pub mime: String,
}

/// Trait for flat, filename-keyed content stores.
///
/// Implementations must be `Send + Sync + 'static` so a single instance can
/// be shared by every request handler.
///
/// # Implementing a custom backend
///
/// ```rust,no_run
/// use cms_backend::{ContentStore, StoreError, StoredObject};
///
/// struct NullStore;
///
/// impl ContentStore for NullStore {
///     async fn put(&self, name: &str, content: &[u8], mime: &str) -> Result<StoredObject, StoreError> {
///         Ok(StoredObject {
///             name: name.to_string(),
///             size: content.len() as u64,
///             modified: chrono::Utc::now(),
///             mime: mime.to_string(),
///         })
///     }
///
///     async fn get(&self, _name: &str) -> Result<Option<Vec<u8>>, StoreError> {
///         Ok(None)
///     }
///
///     async fn list(&self) -> Result<Vec<StoredObject>, StoreError> {
///         Ok(Vec::new())
///     }
/// }
/// ```
pub trait ContentStore: Send + Sync + 'static {
    /// Write `content` under `name`, replacing any existing object.
    fn put(
        &self,
        name: &str,
        content: &[u8],
        content_type: &str,
    ) -> impl Future<Output = Result<StoredObject, StoreError>> + Send;

    /// Read an object. Returns `Ok(None)` when it does not exist.
    fn get(&self, name: &str) -> impl Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    /// List every object in the store. A store that was never written to
    /// lists as empty.
    fn list(&self) -> impl Future<Output = Result<Vec<StoredObject>, StoreError>> + Send;
}

/// Reduce a client-supplied path to its final component.
///
/// Both `/` and `\` count as separators and trailing separators are
/// ignored. Returns `None` when nothing usable is left: an empty name, `.`,
/// `..`, or a name containing control characters.
pub fn leaf_name(raw: &str) -> Option<&str> {
    let leaf = raw
        .split(['/', '\\'])
        .rfind(|segment| !segment.is_empty())?;

    if leaf == "." || leaf == ".." || leaf.chars().any(|c| c.is_control()) {
        return None;
    }
    Some(leaf)
}

/// Fails unless `name` is already a bare leaf filename.
pub(crate) fn ensure_leaf(name: &str) -> Result<(), StoreError> {
    match leaf_name(name) {
        Some(leaf) if leaf == name => Ok(()),
        _ => Err(StoreError::InvalidName(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_name_strips_directories() {
        assert_eq!(leaf_name("about.html"), Some("about.html"));
        assert_eq!(leaf_name("../../etc/passwd"), Some("passwd"));
        assert_eq!(leaf_name("a\\b\\c.png"), Some("c.png"));
        assert_eq!(leaf_name("pages/"), Some("pages"));
    }

    #[test]
    fn leaf_name_rejects_unusable_names() {
        assert_eq!(leaf_name(""), None);
        assert_eq!(leaf_name("/"), None);
        assert_eq!(leaf_name(".."), None);
        assert_eq!(leaf_name("foo/.."), None);
        assert_eq!(leaf_name("."), None);
        assert_eq!(leaf_name("bad\nname"), None);
    }

    #[test]
    fn ensure_leaf_accepts_only_bare_names() {
        assert!(ensure_leaf("photo.png").is_ok());
        assert!(ensure_leaf("dir/photo.png").is_err());
        assert!(ensure_leaf("..").is_err());
        assert!(ensure_leaf("").is_err());
    }
}
