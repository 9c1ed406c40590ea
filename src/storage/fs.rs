//! Filesystem content store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;

use crate::error::StoreError;
use crate::media::sniff;
use crate::storage::{ContentStore, StoredObject, ensure_leaf};

/// Content store backed by a single directory on the local filesystem.
///
/// The directory (and its parents) is created on the first write. Reading
/// from or listing a directory that does not exist yet is not an error.
///
/// # Example
///
/// ```rust,no_run
/// use cms_backend::FsStore;
///
/// let uploads = FsStore::new("/var/lib/cms/storage/uploads");
/// ```
pub struct FsStore {
    base_dir: PathBuf,
}

impl FsStore {
    /// Create a new `FsStore` rooted at the given directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        ensure_leaf(name)?;
        Ok(self.base_dir.join(name))
    }
}

impl ContentStore for FsStore {
    async fn put(
        &self,
        name: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<StoredObject, StoreError> {
        let path = self.path_for(name)?;

        tokio::fs::create_dir_all(&self.base_dir).await?;
        tokio::fs::write(&path, content).await?;

        let meta = tokio::fs::metadata(&path).await?;
        tracing::debug!("Wrote {} bytes to {}", meta.len(), path.display());

        Ok(StoredObject {
            name: name.to_string(),
            size: meta.len(),
            modified: modified_at(&meta),
            mime: content_type.to_string(),
        })
    }

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(name)?;

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        Ok(Some(tokio::fs::read(&path).await?))
    }

    async fn list(&self) -> Result<Vec<StoredObject>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            match entry.file_name().into_string() {
                Ok(name) => paths.push((name, entry.path())),
                Err(raw) => tracing::debug!("Skipping non UTF-8 filename {raw:?}"),
            }
        }

        let described = futures::future::join_all(
            paths.into_iter().map(|(name, path)| describe(name, path)),
        )
        .await;

        let mut objects: Vec<_> = described.into_iter().flatten().collect();
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }
}

/// Listing entry for a regular file, following symlinks. Entries that
/// vanish or cannot be read are skipped.
async fn describe(name: String, path: PathBuf) -> Option<StoredObject> {
    let meta = match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return None,
        Err(e) => {
            tracing::debug!("Skipping {}: {e}", path.display());
            return None;
        }
    };
    let head = match read_head(&path).await {
        Ok(head) => head,
        Err(e) => {
            tracing::debug!("Skipping {}: {e}", path.display());
            return None;
        }
    };

    Some(StoredObject {
        name,
        size: meta.len(),
        modified: modified_at(&meta),
        mime: sniff::sniff(&head).to_string(),
    })
}

async fn read_head(path: &Path) -> Result<Vec<u8>, StoreError> {
    let file = tokio::fs::File::open(path).await?;
    let mut head = Vec::with_capacity(sniff::SNIFF_LEN);
    file.take(sniff::SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .await?;
    Ok(head)
}

fn modified_at(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn put_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path().join("nested/uploads"));

        let obj = store.put("a.html", b"<p>x</p>", "text/html").await.unwrap();
        assert_eq!(obj.size, 8);
        assert_eq!(obj.mime, "text/html");
        assert!(tmp.path().join("nested/uploads/a.html").is_file());
    }

    #[tokio::test]
    async fn put_rejects_path_components() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());

        let err = store.put("../escape.html", b"x", "text/html").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidName(_)));
        assert!(!tmp.path().parent().unwrap().join("escape.html").exists());
    }

    #[tokio::test]
    async fn get_missing_and_directory_are_none() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        let store = FsStore::new(tmp.path());

        assert!(store.get("nope.png").await.unwrap().is_none());
        assert!(store.get("sub").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_missing_directory_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path().join("never-created"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_sniffs_and_skips_directories() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("b.gif"), b"GIF89a\x01\x00\x01\x00\x00\x00\x00;").unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"plain words").unwrap();
        let store = FsStore::new(tmp.path());

        let listed = store.list().await.unwrap();
        let names: Vec<_> = listed.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.gif"]);
        assert_eq!(listed[0].mime, "text/plain");
        assert_eq!(listed[1].mime, "image/gif");
    }

    #[tokio::test]
    async fn vanished_entry_is_skipped() {
        let tmp = TempDir::new().unwrap();
        assert!(describe("gone.png".into(), tmp.path().join("gone.png")).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn list_follows_symlinks_and_skips_dangling_ones() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("target.gif");
        std::fs::write(&target, b"GIF89a\x01\x00\x01\x00\x00\x00\x00;").unwrap();
        let dir = tmp.path().join("uploads");
        std::fs::create_dir(&dir).unwrap();
        std::os::unix::fs::symlink(&target, dir.join("linked.gif")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("missing.gif"), dir.join("dangling.gif"))
            .unwrap();
        let store = FsStore::new(&dir);

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "linked.gif");
        assert_eq!(listed[0].mime, "image/gif");
    }
}
