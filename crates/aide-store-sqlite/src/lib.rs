use std::fs;
use std::path::{Path, PathBuf};

use aide_core::{parse_kind, parse_role, validate_content, Kind, MemoryError, MemoryRecord, Role};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, DatabaseName};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Structural generation of the store. Version 1 is the legacy
/// `(user_id, message, timestamp, context)` layout; version 2 is the current
/// role/content/kind/deleted layout.
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

const CREATE_SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS conversations (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id TEXT NOT NULL,
  role TEXT NOT NULL,
  content TEXT NOT NULL,
  kind TEXT DEFAULT 'chat',
  deleted INTEGER DEFAULT 0,
  created_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_conv_user_id ON conversations(user_id, id);
CREATE INDEX IF NOT EXISTS idx_conv_user_deleted ON conversations(user_id, deleted);
CREATE INDEX IF NOT EXISTS idx_conv_content ON conversations(content);

CREATE TABLE IF NOT EXISTS meta (
  key TEXT PRIMARY KEY,
  value TEXT
);
";

const SELECT_RECORD_COLUMNS: &str = "SELECT id, user_id, role, content, kind, deleted, created_at FROM conversations";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] MemoryError),
    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to open database at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("conversations table has an unrecognized column layout: [{}]", .columns.join(", "))]
    SchemaAmbiguity { columns: Vec<String> },
    #[error("failed to format timestamp: {0}")]
    TimestampFormat(#[from] time::error::Format),
}

/// SQLite-backed conversation memory.
///
/// Rows are append-only; the only mutation is the monotone soft-delete flag.
/// All mutating and reading operations are scoped by `user_id`, so no
/// operation can observe or affect another namespace.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the backing database and configure runtime pragmas.
    ///
    /// The parent directory is created when missing. WAL journaling with
    /// `synchronous=NORMAL` keeps concurrent CLI invocations safe while
    /// relaxing full-flush durability.
    ///
    /// # Errors
    /// Returns a storage fault when the directory cannot be created or the
    /// database cannot be opened; both carry the offending path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        Ok(Self { conn })
    }

    /// Create the record table, supporting indexes, and the schema-version
    /// fact when absent. Safe to call on every open. On a database that may
    /// carry the legacy layout, run [`SqliteStore::migrate_legacy`] first:
    /// the content index cannot be created until that column exists.
    ///
    /// # Errors
    /// Returns an error when schema statements fail.
    pub fn initialize(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(CREATE_SCHEMA_SQL)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO meta(key, value) VALUES('schema_version', ?1)",
            params![CURRENT_SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    /// Upgrade a legacy `(user_id, message, timestamp, context)` table into
    /// the current layout, detected by column shape.
    ///
    /// The whole upgrade (column additions plus back-fills plus version
    /// bump) runs in one transaction, so a crash mid-way leaves the legacy
    /// columns intact and a later retry finishes the job. A table that is
    /// neither current nor legacy is surfaced as [`StoreError::SchemaAmbiguity`]
    /// and left untouched. Inspection failures degrade to assuming the
    /// current schema.
    ///
    /// # Errors
    /// Returns an error when the layout is ambiguous or the transactional
    /// upgrade fails.
    pub fn migrate_legacy(&mut self) -> Result<(), StoreError> {
        let columns = match table_columns(&self.conn, "conversations") {
            Ok(columns) => columns,
            Err(err) => {
                tracing::warn!("schema inspection failed, assuming current layout: {err}");
                return Ok(());
            }
        };
        if columns.is_empty() {
            return Ok(());
        }

        let has = |name: &str| columns.iter().any(|column| column == name);
        if has("content") && has("role") {
            return Ok(());
        }
        if !(has("message") && has("context")) {
            return Err(StoreError::SchemaAmbiguity { columns });
        }

        let now = now_rfc3339()?;
        let tx = self.conn.transaction()?;

        if !has("role") {
            tx.execute_batch("ALTER TABLE conversations ADD COLUMN role TEXT;")?;
        }
        if !has("content") {
            tx.execute_batch("ALTER TABLE conversations ADD COLUMN content TEXT;")?;
        }
        if !has("kind") {
            tx.execute_batch("ALTER TABLE conversations ADD COLUMN kind TEXT DEFAULT 'chat';")?;
        }
        if !has("deleted") {
            tx.execute_batch("ALTER TABLE conversations ADD COLUMN deleted INTEGER DEFAULT 0;")?;
        }
        if !has("created_at") {
            tx.execute_batch("ALTER TABLE conversations ADD COLUMN created_at TEXT;")?;
        }

        tx.execute(
            "UPDATE conversations SET content = COALESCE(content, message) WHERE content IS NULL",
            [],
        )?;
        tx.execute(
            "UPDATE conversations
             SET role =
                 CASE
                     WHEN lower(COALESCE(context, '')) IN ('user','assistant','system')
                         THEN lower(context)
                     ELSE 'user'
                 END
             WHERE role IS NULL",
            [],
        )?;
        tx.execute(
            "UPDATE conversations
             SET kind =
                 CASE
                     WHEN lower(COALESCE(context, '')) IN ('remembered','memory','note')
                         THEN 'remembered'
                     ELSE COALESCE(kind, 'chat')
                 END",
            [],
        )?;
        if has("timestamp") {
            tx.execute(
                "UPDATE conversations SET created_at = COALESCE(created_at, timestamp)",
                [],
            )?;
        } else {
            tx.execute(
                "UPDATE conversations SET created_at = COALESCE(created_at, ?1)",
                params![now],
            )?;
        }

        // A legacy database may predate the meta table entirely.
        tx.execute_batch("CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT);")?;
        tx.execute(
            "INSERT OR REPLACE INTO meta(key, value) VALUES('schema_version', ?1)",
            params![CURRENT_SCHEMA_VERSION.to_string()],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Read the recorded schema version, when one exists.
    ///
    /// # Errors
    /// Returns an error when the meta table cannot be queried.
    pub fn schema_version(&self) -> Result<Option<i64>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT value FROM meta WHERE key = 'schema_version'")?;
        let mut rows = stmt.query([])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let raw: String = row.get(0)?;
        Ok(raw.parse::<i64>().ok())
    }

    /// Append one record. `role` and `kind` are validated (a blank kind
    /// means `chat`), content is trimmed and must be non-empty. The insert
    /// is a single statement, so either the full row appears or nothing
    /// does. Returns the store-assigned id.
    ///
    /// # Errors
    /// Returns a validation error naming the invalid field before any
    /// persistence attempt, or a storage fault when the insert fails.
    pub fn store(
        &self,
        user_id: &str,
        role: &str,
        content: &str,
        kind: &str,
    ) -> Result<i64, StoreError> {
        let role = parse_role(role)?;
        let kind = parse_kind(kind)?;
        let content = validate_content(content)?;

        self.conn.execute(
            "INSERT INTO conversations (user_id, role, content, kind, deleted, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![user_id, role.as_str(), content, kind.as_str(), now_rfc3339()?],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Store an explicitly remembered item for durable recall.
    ///
    /// # Errors
    /// Same contract as [`SqliteStore::store`].
    pub fn remember(&self, user_id: &str, content: &str) -> Result<i64, StoreError> {
        self.store(user_id, Role::User.as_str(), content, Kind::Remembered.as_str())
    }

    /// Return up to `limit` records for `user_id`, newest first by id.
    /// The effective limit is at least 1. Soft-deleted rows are excluded
    /// unless `include_deleted` is set; `kind` restricts to one kind.
    ///
    /// # Errors
    /// Returns a validation error for an unknown `kind` filter, or a
    /// storage fault when the query fails.
    pub fn recent(
        &self,
        user_id: &str,
        limit: usize,
        include_deleted: bool,
        kind: Option<&str>,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let kind = parse_kind_filter(kind)?;
        let limit = effective_limit(limit);

        let mut clauses = vec!["user_id = ?"];
        let mut bindings: Vec<&dyn ToSql> = vec![&user_id];
        if !include_deleted {
            clauses.push("deleted = 0");
        }
        let kind_str = kind.map(Kind::as_str);
        if let Some(kind_str) = kind_str.as_ref() {
            clauses.push("kind = ?");
            bindings.push(kind_str);
        }
        bindings.push(&limit);

        let sql = format!(
            "{SELECT_RECORD_COLUMNS} WHERE {} ORDER BY id DESC LIMIT ?",
            clauses.join(" AND ")
        );
        self.query_records(&sql, &bindings)
    }

    /// Substring search over content, newest first. Matching is ASCII
    /// case-insensitive (SQLite `LIKE`) and literal: `%`, `_`, and `\` in
    /// the query are escaped. A blank query returns an empty list rather
    /// than matching everything.
    ///
    /// # Errors
    /// Same contract as [`SqliteStore::recent`].
    pub fn search(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
        include_deleted: bool,
        kind: Option<&str>,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let kind = parse_kind_filter(kind)?;
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let limit = effective_limit(limit);
        let pattern = like_pattern(query);

        let mut clauses = vec!["user_id = ?", r"content LIKE ? ESCAPE '\'"];
        let mut bindings: Vec<&dyn ToSql> = vec![&user_id, &pattern];
        if !include_deleted {
            clauses.push("deleted = 0");
        }
        let kind_str = kind.map(Kind::as_str);
        if let Some(kind_str) = kind_str.as_ref() {
            clauses.push("kind = ?");
            bindings.push(kind_str);
        }
        bindings.push(&limit);

        let sql = format!(
            "{SELECT_RECORD_COLUMNS} WHERE {} ORDER BY id DESC LIMIT ?",
            clauses.join(" AND ")
        );
        self.query_records(&sql, &bindings)
    }

    /// Soft-delete every non-deleted record for `user_id` whose content
    /// contains `keyword` (same substring semantics as [`SqliteStore::search`]).
    /// A blank keyword is a no-op returning 0, never a match-everything.
    ///
    /// # Errors
    /// Returns a storage fault when the update fails.
    pub fn forget_by_keyword(&self, user_id: &str, keyword: &str) -> Result<usize, StoreError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(0);
        }

        let affected = self.conn.execute(
            r"UPDATE conversations
              SET deleted = 1
              WHERE user_id = ?1 AND deleted = 0 AND content LIKE ?2 ESCAPE '\'",
            params![user_id, like_pattern(keyword)],
        )?;
        Ok(affected)
    }

    /// Soft-delete one record, only when it belongs to `user_id` and is not
    /// already deleted. Returns 1 when a transition occurred, else 0 (a
    /// missing or cross-namespace id is a no-op, not an error).
    ///
    /// # Errors
    /// Returns a storage fault when the update fails.
    pub fn forget_by_id(&self, user_id: &str, id: i64) -> Result<usize, StoreError> {
        let affected = self.conn.execute(
            "UPDATE conversations SET deleted = 1 WHERE user_id = ?1 AND id = ?2 AND deleted = 0",
            params![user_id, id],
        )?;
        Ok(affected)
    }

    /// Soft-delete every non-deleted record for `user_id`.
    ///
    /// # Errors
    /// Returns a storage fault when the update fails.
    pub fn clear_namespace(&self, user_id: &str) -> Result<usize, StoreError> {
        let affected = self.conn.execute(
            "UPDATE conversations SET deleted = 1 WHERE user_id = ?1 AND deleted = 0",
            params![user_id],
        )?;
        Ok(affected)
    }

    /// Physically compact the backing file. Soft-delete never shrinks the
    /// database, so this is only worthwhile after rows were physically
    /// removed; no other operation depends on it and nothing invokes it
    /// implicitly.
    ///
    /// # Errors
    /// Returns a storage fault when VACUUM fails.
    pub fn reclaim_space(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("VACUUM;")?;
        Ok(())
    }

    /// Write an online backup of the main database to `out_file`.
    ///
    /// # Errors
    /// Returns a storage fault when the backup target cannot be created or
    /// the backup fails.
    pub fn backup(&self, out_file: &Path) -> Result<(), StoreError> {
        if let Some(parent) = out_file.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        self.conn.backup(DatabaseName::Main, out_file, None)?;
        Ok(())
    }

    fn query_records(
        &self,
        sql: &str,
        bindings: &[&dyn ToSql],
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(bindings.iter()), row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

fn effective_limit(limit: usize) -> i64 {
    i64::try_from(limit.max(1)).unwrap_or(i64::MAX)
}

/// Escape `LIKE` metacharacters so user text always matches as a literal
/// substring, then wrap in wildcards.
fn like_pattern(needle: &str) -> String {
    let escaped = needle.replace('\\', r"\\").replace('%', r"\%").replace('_', r"\_");
    format!("%{escaped}%")
}

fn parse_kind_filter(kind: Option<&str>) -> Result<Option<Kind>, MemoryError> {
    let Some(raw) = kind else {
        return Ok(None);
    };
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Ok(None);
    }
    Kind::parse(&normalized).map(Some).ok_or_else(|| MemoryError::InvalidKind(raw.to_string()))
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;

    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let role_raw: String = row.get(2)?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| column_error(2, format!("unknown role in row: {role_raw}")))?;

    let kind_raw: String = row.get(4)?;
    let kind = Kind::parse(&kind_raw)
        .ok_or_else(|| column_error(4, format!("unknown kind in row: {kind_raw}")))?;

    let deleted: i64 = row.get(5)?;
    let created_at = match row.get::<_, Option<String>>(6)? {
        Some(raw) => parse_timestamp(&raw)
            .map_err(|err| column_error(6, format!("invalid timestamp '{raw}': {err}")))?,
        None => OffsetDateTime::UNIX_EPOCH,
    };

    Ok(MemoryRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        role,
        content: row.get(3)?,
        kind,
        deleted: deleted != 0,
        created_at,
    })
}

fn column_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, message.into())
}

fn now_rfc3339() -> Result<String, time::error::Format> {
    OffsetDateTime::now_utc().format(&Rfc3339)
}

/// Parse a stored timestamp. New rows carry RFC3339; rows migrated from the
/// legacy layout may carry SQLite's `YYYY-MM-DD HH:MM:SS` form.
fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    match OffsetDateTime::parse(raw, &Rfc3339) {
        Ok(parsed) => Ok(parsed),
        Err(rfc_err) => {
            let Ok(legacy) =
                time::format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            else {
                return Err(rfc_err);
            };
            PrimitiveDateTime::parse(raw, &legacy).map(PrimitiveDateTime::assume_utc)
        }
    }
}
