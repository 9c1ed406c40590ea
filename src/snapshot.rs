//! Page snapshot persistence: write the HTML to the snapshot store, then
//! mirror a record to the relational store on a best-effort basis.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{CmsError, Result};
use crate::mirror::{Columns, InsertOutcome, MirrorSession, PageMirror, PageRecord};
use crate::storage::{ContentStore, leaf_name};

pub const DEFAULT_FILENAME: &str = "new-page.html";
pub const DEFAULT_TITLE: &str = "Untitled Page";

pub const MSG_SAVED: &str = "Page saved successfully.";
pub const MSG_PARTIAL: &str = "HTML file saved. Database write failed.";
pub const MSG_WRITE_FAILED: &str = "Unable to write HTML file to disk.";

pub const WARN_UNAVAILABLE: &str = "Database connection unavailable. Content stored locally only.";
pub const WARN_NO_SLUG: &str = "Page saved without slug field. Ensure the pages table has a slug column for friendly URLs.";
pub const WARN_INSERT_FAILED: &str = "Database insert failed. Check server logs for details.";

/// Raw editor submission. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveRequest {
    pub filename: Option<String>,
    pub title: Option<String>,
    pub slug: Option<String>,
    #[serde(rename = "htmlContent")]
    pub html_content: Option<String>,
}

/// A validated page ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    /// Bare leaf filename inside the snapshot store.
    pub filename: String,
    pub title: String,
    pub slug: Option<String>,
    pub html_content: String,
}

impl PageSnapshot {
    /// Apply defaults and reduce the filename to a leaf name.
    ///
    /// Title and slug are trimmed; a blank title becomes
    /// [`DEFAULT_TITLE`] and a blank slug becomes `None`.
    pub fn from_request(request: SaveRequest) -> Result<Self> {
        let raw = request
            .filename
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
        let filename = leaf_name(raw.trim())
            .ok_or_else(|| CmsError::BadRequest("Invalid filename.".into()))?
            .to_string();

        let title = request
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        let slug = request
            .slug
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            filename,
            title,
            slug,
            html_content: request.html_content.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    /// File written; database mirrored or unavailable.
    Success,
    /// File written; database insert failed.
    Partial,
    /// File write failed.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotMeta {
    pub filename: String,
    pub title: String,
    pub slug: Option<String>,
}

/// Response body of a save request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub status: SaveStatus,
    pub message: String,
    pub meta: SnapshotMeta,
    pub warnings: Vec<String>,
}

/// What happened on the database side of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MirrorStep {
    Unavailable,
    Inserted,
    InsertedWithoutSlug,
    Failed,
}

impl MirrorStep {
    fn status(self) -> SaveStatus {
        match self {
            MirrorStep::Failed => SaveStatus::Partial,
            _ => SaveStatus::Success,
        }
    }

    fn message(self) -> &'static str {
        match self {
            MirrorStep::Failed => MSG_PARTIAL,
            _ => MSG_SAVED,
        }
    }

    fn warning(self) -> Option<&'static str> {
        match self {
            MirrorStep::Unavailable => Some(WARN_UNAVAILABLE),
            MirrorStep::Inserted => None,
            MirrorStep::InsertedWithoutSlug => Some(WARN_NO_SLUG),
            MirrorStep::Failed => Some(WARN_INSERT_FAILED),
        }
    }
}

/// Saves page snapshots to a [`ContentStore`] and mirrors them through a
/// [`PageMirror`].
pub struct SnapshotService<S: ContentStore, M: PageMirror> {
    store: Arc<S>,
    mirror: M,
}

impl<S: ContentStore, M: PageMirror> SnapshotService<S, M> {
    pub fn new(store: Arc<S>, mirror: M) -> Self {
        Self { store, mirror }
    }

    /// Persist one snapshot. Never fails: the outcome is carried in the
    /// report's status.
    pub async fn save(&self, snapshot: PageSnapshot) -> SaveReport {
        let meta = SnapshotMeta {
            filename: snapshot.filename.clone(),
            title: snapshot.title.clone(),
            slug: snapshot.slug.clone(),
        };

        if let Err(e) = self
            .store
            .put(
                &snapshot.filename,
                snapshot.html_content.as_bytes(),
                "text/html",
            )
            .await
        {
            tracing::error!("Failed to write snapshot {}: {e}", snapshot.filename);
            return SaveReport {
                status: SaveStatus::Error,
                message: MSG_WRITE_FAILED.to_string(),
                meta,
                warnings: Vec::new(),
            };
        }

        let now = Utc::now();
        let record = PageRecord {
            title: snapshot.title,
            slug: snapshot.slug,
            content: snapshot.html_content,
            created_at: now,
            updated_at: now,
        };
        let step = self.mirror_record(&record).await;
        tracing::info!("Saved snapshot {} (mirror: {step:?})", meta.filename);

        SaveReport {
            status: step.status(),
            message: step.message().to_string(),
            meta,
            warnings: step.warning().map(String::from).into_iter().collect(),
        }
    }

    async fn mirror_record(&self, record: &PageRecord) -> MirrorStep {
        let mut session = match self.mirror.connect().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Page mirror unavailable: {e}");
                return MirrorStep::Unavailable;
            }
        };

        match session.insert(record, Columns::Full).await {
            InsertOutcome::Inserted => MirrorStep::Inserted,
            InsertOutcome::SchemaMismatch => {
                tracing::warn!("pages table has no slug column, retrying without slug");
                match session.insert(record, Columns::WithoutSlug).await {
                    InsertOutcome::Inserted => MirrorStep::InsertedWithoutSlug,
                    InsertOutcome::SchemaMismatch => {
                        tracing::warn!("Page insert without slug hit a schema mismatch");
                        MirrorStep::Failed
                    }
                    InsertOutcome::Failed(reason) => {
                        tracing::warn!("Page insert without slug failed: {reason}");
                        MirrorStep::Failed
                    }
                }
            }
            InsertOutcome::Failed(reason) => {
                tracing::warn!("Page insert failed: {reason}");
                MirrorStep::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{MemoryMirror, MirrorMode, NoMirror};
    use crate::storage::MemoryStore;

    fn about() -> PageSnapshot {
        PageSnapshot::from_request(SaveRequest {
            filename: Some("about.html".into()),
            title: Some("About Us".into()),
            slug: Some("about".into()),
            html_content: Some("<p>Hi</p>".into()),
        })
        .unwrap()
    }

    fn service(
        store: &MemoryStore,
        mirror: &MemoryMirror,
    ) -> SnapshotService<MemoryStore, MemoryMirror> {
        SnapshotService::new(Arc::new(store.clone()), mirror.clone())
    }

    #[test]
    fn request_defaults() {
        let snap = PageSnapshot::from_request(SaveRequest::default()).unwrap();
        assert_eq!(snap.filename, DEFAULT_FILENAME);
        assert_eq!(snap.title, DEFAULT_TITLE);
        assert_eq!(snap.slug, None);
        assert_eq!(snap.html_content, "");
    }

    #[test]
    fn request_blank_title_and_slug() {
        let snap = PageSnapshot::from_request(SaveRequest {
            title: Some("   ".into()),
            slug: Some("".into()),
            ..SaveRequest::default()
        })
        .unwrap();
        assert_eq!(snap.title, DEFAULT_TITLE);
        assert_eq!(snap.slug, None);
    }

    #[test]
    fn request_filename_is_reduced_to_leaf() {
        let snap = PageSnapshot::from_request(SaveRequest {
            filename: Some("../../etc/evil.html".into()),
            ..SaveRequest::default()
        })
        .unwrap();
        assert_eq!(snap.filename, "evil.html");

        let err = PageSnapshot::from_request(SaveRequest {
            filename: Some("..".into()),
            ..SaveRequest::default()
        })
        .unwrap_err();
        assert!(matches!(err, CmsError::BadRequest(_)));
    }

    #[tokio::test]
    async fn full_success_mirrors_row() {
        let store = MemoryStore::new();
        let mirror = MemoryMirror::new(MirrorMode::Available);

        let report = service(&store, &mirror).save(about()).await;
        assert_eq!(report.status, SaveStatus::Success);
        assert_eq!(report.message, MSG_SAVED);
        assert!(report.warnings.is_empty());
        assert_eq!(store.get("about.html").await.unwrap().unwrap(), b"<p>Hi</p>");

        let rows = mirror.rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "About Us");
        assert_eq!(rows[0].slug.as_deref(), Some("about"));
    }

    #[tokio::test]
    async fn unreachable_database_is_success_with_warning() {
        let store = MemoryStore::new();
        let mirror = MemoryMirror::new(MirrorMode::Unreachable);

        let report = service(&store, &mirror).save(about()).await;
        assert_eq!(report.status, SaveStatus::Success);
        assert_eq!(report.warnings, vec![WARN_UNAVAILABLE.to_string()]);
        assert!(store.get("about.html").await.unwrap().is_some());
        assert_eq!(mirror.attempts(), 0);
    }

    #[tokio::test]
    async fn no_mirror_counts_as_unavailable() {
        let store = MemoryStore::new();
        let report = SnapshotService::new(Arc::new(store.clone()), NoMirror)
            .save(about())
            .await;
        assert_eq!(report.status, SaveStatus::Success);
        assert_eq!(report.warnings, vec![WARN_UNAVAILABLE.to_string()]);
    }

    #[tokio::test]
    async fn missing_slug_column_retries_once_without_slug() {
        let store = MemoryStore::new();
        let mirror = MemoryMirror::new(MirrorMode::WithoutSlugColumn);

        let report = service(&store, &mirror).save(about()).await;
        assert_eq!(report.status, SaveStatus::Success);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("slug column"));
        assert_eq!(mirror.attempts(), 2);

        let rows = mirror.rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].slug, None);
    }

    #[tokio::test]
    async fn other_insert_failure_is_partial_without_retry() {
        let store = MemoryStore::new();
        let mirror = MemoryMirror::new(MirrorMode::Failing);

        let report = service(&store, &mirror).save(about()).await;
        assert_eq!(report.status, SaveStatus::Partial);
        assert_eq!(report.message, MSG_PARTIAL);
        assert_eq!(report.warnings, vec![WARN_INSERT_FAILED.to_string()]);
        assert_eq!(mirror.attempts(), 1);
        assert!(store.get("about.html").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn write_failure_skips_database() {
        let store = MemoryStore::failing();
        let mirror = MemoryMirror::new(MirrorMode::Available);

        let report = service(&store, &mirror).save(about()).await;
        assert_eq!(report.status, SaveStatus::Error);
        assert_eq!(report.message, MSG_WRITE_FAILED);
        assert_eq!(mirror.attempts(), 0);
    }

    #[tokio::test]
    async fn report_serializes_slug_as_null_when_absent() {
        let store = MemoryStore::new();
        let mirror = MemoryMirror::new(MirrorMode::Available);
        let snap = PageSnapshot::from_request(SaveRequest {
            filename: Some("x.html".into()),
            ..SaveRequest::default()
        })
        .unwrap();

        let report = service(&store, &mirror).save(snap).await;
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["meta"]["slug"], serde_json::Value::Null);
        assert_eq!(json["meta"]["title"], DEFAULT_TITLE);
        assert_eq!(json["warnings"], serde_json::json!([]));
    }
}
