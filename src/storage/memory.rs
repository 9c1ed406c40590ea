//! In-memory content store for tests and embedding.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::media::sniff;
use crate::storage::{ContentStore, StoredObject, ensure_leaf};

/// Content store that keeps every object in memory.
///
/// Clones share the same underlying map. Can be switched into a failing
/// mode to exercise storage error paths.
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<BTreeMap<String, StoredEntry>>>,
    failing: bool,
}

struct StoredEntry {
    bytes: Vec<u8>,
    object: StoredObject,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }
}

impl ContentStore for MemoryStore {
    async fn put(
        &self,
        name: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<StoredObject, StoreError> {
        ensure_leaf(name)?;
        if self.failing {
            return Err(StoreError::Backend("simulated failure".into()));
        }

        let object = StoredObject {
            name: name.to_string(),
            size: content.len() as u64,
            modified: Utc::now(),
            mime: content_type.to_string(),
        };
        self.objects.lock().await.insert(
            name.to_string(),
            StoredEntry {
                bytes: content.to_vec(),
                object: object.clone(),
            },
        );
        Ok(object)
    }

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        ensure_leaf(name)?;
        Ok(self
            .objects
            .lock()
            .await
            .get(name)
            .map(|entry| entry.bytes.clone()))
    }

    async fn list(&self) -> Result<Vec<StoredObject>, StoreError> {
        Ok(self
            .objects
            .lock()
            .await
            .values()
            .map(|entry| StoredObject {
                mime: sniff::sniff(&entry.bytes).to_string(),
                ..entry.object.clone()
            })
            .collect())
    }
}
