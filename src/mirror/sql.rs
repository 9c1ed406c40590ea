//! `sqlx` mirror for MySQL and SQLite databases.

use std::time::Duration;

use sqlx::{AnyConnection, Connection, Error as SqlxError};

use crate::mirror::{Columns, InsertOutcome, MirrorError, MirrorSession, PageMirror, PageRecord};

const INSERT_FULL: &str = "INSERT INTO pages (title, slug, content, created_at, updated_at) \
     VALUES (?, ?, ?, ?, ?)";
const INSERT_WITHOUT_SLUG: &str = "INSERT INTO pages (title, content, created_at, updated_at) \
     VALUES (?, ?, ?, ?)";

/// SQLSTATE for an unknown column on MySQL.
const UNKNOWN_COLUMN: &str = "42S22";
/// MySQL `ER_BAD_FIELD_ERROR` text.
const MYSQL_UNKNOWN_SLUG: &str = "unknown column 'slug'";
/// SQLite text for an insert naming a column the table lacks.
const SQLITE_NO_SLUG: &str = "has no column named slug";

/// Mirror that inserts into a `pages` table over a fresh connection per save.
///
/// Accepts any URL the `sqlx` `Any` driver understands with `?`
/// placeholders, e.g. `mysql://root@localhost/cms` or
/// `sqlite:///var/lib/cms/pages.db`.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use cms_backend::SqlMirror;
///
/// let mirror = SqlMirror::new("mysql://root@localhost/cms")
///     .connect_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct SqlMirror {
    url: String,
    connect_timeout: Duration,
}

impl SqlMirror {
    /// Default time allowed for opening a connection.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

    pub fn new(url: impl Into<String>) -> Self {
        sqlx::any::install_default_drivers();
        Self {
            url: url.into(),
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Time allowed for opening a connection. A timeout counts as the
    /// database being unavailable.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl PageMirror for SqlMirror {
    type Session = SqlSession;

    async fn connect(&self) -> Result<SqlSession, MirrorError> {
        match tokio::time::timeout(self.connect_timeout, AnyConnection::connect(&self.url)).await {
            Ok(Ok(conn)) => Ok(SqlSession { conn }),
            Ok(Err(e)) => Err(MirrorError::Connect(Box::new(e))),
            Err(_) => Err(MirrorError::Timeout(self.connect_timeout)),
        }
    }
}

/// One open database connection.
pub struct SqlSession {
    conn: AnyConnection,
}

impl MirrorSession for SqlSession {
    async fn insert(&mut self, record: &PageRecord, columns: Columns) -> InsertOutcome {
        let created_at = record.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
        let updated_at = record.updated_at.format("%Y-%m-%d %H:%M:%S").to_string();

        let query = match columns {
            Columns::Full => sqlx::query(INSERT_FULL)
                .bind(record.title.clone())
                .bind(record.slug.clone()),
            Columns::WithoutSlug => sqlx::query(INSERT_WITHOUT_SLUG).bind(record.title.clone()),
        };

        let result = query
            .bind(record.content.clone())
            .bind(created_at)
            .bind(updated_at)
            .execute(&mut self.conn)
            .await;

        match result {
            Ok(_) => InsertOutcome::Inserted,
            Err(e) if is_missing_slug_column(&e) => InsertOutcome::SchemaMismatch,
            Err(e) => InsertOutcome::Failed(e.to_string()),
        }
    }
}

/// Whether the database rejected the insert because `pages` has no slug
/// column. Errors about a slug column that exists but refuses the value
/// (length, type, constraint) do not count.
fn is_missing_slug_column(err: &SqlxError) -> bool {
    let SqlxError::Database(db) = err else {
        return false;
    };
    missing_slug_column(db.code().as_deref(), db.message())
}

fn missing_slug_column(code: Option<&str>, message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    if message.contains(SQLITE_NO_SLUG) {
        return true;
    }
    message.contains(MYSQL_UNKNOWN_SLUG) && code.is_none_or(|c| c == UNKNOWN_COLUMN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_column_messages() {
        assert!(missing_slug_column(
            Some("42S22"),
            "Unknown column 'slug' in 'field list'"
        ));
        assert!(missing_slug_column(None, "table pages has no column named slug"));
    }

    #[test]
    fn rejected_values_are_not_missing_columns() {
        assert!(!missing_slug_column(
            Some("22001"),
            "Data too long for column 'slug' at row 1"
        ));
        assert!(!missing_slug_column(
            None,
            "cannot store TEXT value in INTEGER column pages.slug"
        ));
        assert!(!missing_slug_column(
            Some("23000"),
            "Duplicate entry 'about' for key 'pages.slug'"
        ));
        assert!(!missing_slug_column(None, "no such table: pages"));
    }
}
