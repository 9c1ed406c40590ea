//! In-memory mirror for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

use crate::mirror::{Columns, InsertOutcome, MirrorError, MirrorSession, PageMirror, PageRecord};

/// How a [`MemoryMirror`] behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorMode {
    /// Accepts every insert.
    Available,
    /// Refuses connections.
    Unreachable,
    /// Behaves like a `pages` table without a slug column.
    WithoutSlugColumn,
    /// Connects, then fails every insert.
    Failing,
}

/// Fake relational store recording inserted rows in memory.
///
/// Clones share rows and counters.
#[derive(Clone)]
pub struct MemoryMirror {
    mode: MirrorMode,
    rows: Arc<Mutex<Vec<PageRecord>>>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryMirror {
    pub fn new(mode: MirrorMode) -> Self {
        Self {
            mode,
            rows: Arc::default(),
            attempts: Arc::default(),
        }
    }

    /// Rows inserted so far, in order.
    pub async fn rows(&self) -> Vec<PageRecord> {
        self.rows.lock().await.clone()
    }

    /// Insert attempts made so far, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl PageMirror for MemoryMirror {
    type Session = MemorySession;

    async fn connect(&self) -> Result<MemorySession, MirrorError> {
        if self.mode == MirrorMode::Unreachable {
            return Err(MirrorError::Connect("connection refused".into()));
        }
        Ok(MemorySession {
            mirror: self.clone(),
        })
    }
}

pub struct MemorySession {
    mirror: MemoryMirror,
}

impl MirrorSession for MemorySession {
    async fn insert(&mut self, record: &PageRecord, columns: Columns) -> InsertOutcome {
        self.mirror.attempts.fetch_add(1, Ordering::SeqCst);

        let row = match (self.mirror.mode, columns) {
            (MirrorMode::Failing, _) | (MirrorMode::Unreachable, _) => {
                return InsertOutcome::Failed("simulated failure".into());
            }
            (MirrorMode::WithoutSlugColumn, Columns::Full) => {
                return InsertOutcome::SchemaMismatch;
            }
            (_, Columns::WithoutSlug) => PageRecord {
                slug: None,
                ..record.clone()
            },
            (MirrorMode::Available, Columns::Full) => record.clone(),
        };

        self.mirror.rows.lock().await.push(row);
        InsertOutcome::Inserted
    }
}
