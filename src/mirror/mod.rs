//! Best-effort relational mirror of saved pages.
//!
//! The file store is authoritative; the mirror is an optional secondary
//! index. Each save opens a [`MirrorSession`] through a [`PageMirror`] and
//! issues at most two inserts. Outcomes are plain values rather than errors
//! so the caller can fold them into a save status.
//!
//! Backends:
//!
//! - [`SqlMirror`] -- MySQL or SQLite through `sqlx`.
//! - [`NoMirror`] -- no database configured; always unavailable.
//! - [`MemoryMirror`] -- in-memory fake with switchable failure modes.

mod memory;
mod sql;

pub use memory::{MemoryMirror, MemorySession, MirrorMode};
pub use sql::{SqlMirror, SqlSession};

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Row written to the `pages` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub title: String,
    /// `None` is stored as SQL `NULL`.
    pub slug: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Column set used for an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Columns {
    /// title, slug, content, created_at, updated_at
    Full,
    /// Everything except slug, for tables that predate the slug column.
    WithoutSlug,
}

/// Result of one insert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The table has no slug column.
    SchemaMismatch,
    /// Any other failure. The reason is for logs only.
    Failed(String),
}

/// Why a mirror session could not be opened.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("No database configured")]
    NotConfigured,

    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(Box<dyn std::error::Error + Send + Sync>),
}

/// A relational store that can receive page records.
pub trait PageMirror: Send + Sync + 'static {
    type Session: MirrorSession;

    /// Open a session. Implementations must bound the time spent here.
    fn connect(&self) -> impl Future<Output = Result<Self::Session, MirrorError>> + Send;
}

/// An open connection to a [`PageMirror`].
pub trait MirrorSession: Send {
    fn insert(
        &mut self,
        record: &PageRecord,
        columns: Columns,
    ) -> impl Future<Output = InsertOutcome> + Send;
}

/// Mirror used when no database is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMirror;

impl PageMirror for NoMirror {
    type Session = Infallible;

    async fn connect(&self) -> Result<Infallible, MirrorError> {
        Err(MirrorError::NotConfigured)
    }
}

impl MirrorSession for Infallible {
    async fn insert(&mut self, _record: &PageRecord, _columns: Columns) -> InsertOutcome {
        match *self {}
    }
}
