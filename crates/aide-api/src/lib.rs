use std::path::PathBuf;

use aide_core::{build_memory_block, Kind, MemoryRecord};
use aide_store_sqlite::{SqliteStore, StoreError};

/// Per-operation facade over the SQLite store.
///
/// Holds only the database path: every method opens its own connection,
/// ensures the schema is current, performs exactly one logical operation,
/// and drops the connection again. Nothing here keeps a lock across
/// operations, so independent processes (or a REPL waiting on a slow
/// generation call) can interleave freely.
#[derive(Debug, Clone)]
pub struct Memory {
    db_path: PathBuf,
}

impl Memory {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    #[must_use]
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    fn open_store(&self) -> Result<SqliteStore, StoreError> {
        let mut store = SqliteStore::open(&self.db_path)?;
        // Legacy upgrade runs first: initialize() cannot index the content
        // column until the migration has added it.
        store.migrate_legacy()?;
        store.initialize()?;
        Ok(store)
    }

    /// Append one record and return its store-assigned id.
    ///
    /// # Errors
    /// Returns a validation error for an invalid role/kind/content, or a
    /// storage fault.
    pub fn store(
        &self,
        user_id: &str,
        role: &str,
        content: &str,
        kind: &str,
    ) -> Result<i64, StoreError> {
        self.open_store()?.store(user_id, role, content, kind)
    }

    /// Store an explicitly remembered item.
    ///
    /// # Errors
    /// Same contract as [`Memory::store`].
    pub fn remember(&self, user_id: &str, content: &str) -> Result<i64, StoreError> {
        self.open_store()?.remember(user_id, content)
    }

    /// Most recent records, newest first.
    ///
    /// # Errors
    /// Returns a validation error for an unknown kind filter, or a storage
    /// fault.
    pub fn recent(
        &self,
        user_id: &str,
        limit: usize,
        include_deleted: bool,
        kind: Option<&str>,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        self.open_store()?.recent(user_id, limit, include_deleted, kind)
    }

    /// Substring search over content, newest first.
    ///
    /// # Errors
    /// Same contract as [`Memory::recent`].
    pub fn search(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
        include_deleted: bool,
        kind: Option<&str>,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        self.open_store()?.search(user_id, query, limit, include_deleted, kind)
    }

    /// Soft-delete records containing `keyword`; returns the count.
    ///
    /// # Errors
    /// Returns a storage fault when the update fails.
    pub fn forget_keyword(&self, user_id: &str, keyword: &str) -> Result<usize, StoreError> {
        self.open_store()?.forget_by_keyword(user_id, keyword)
    }

    /// Soft-delete one record by id; returns 1 on a transition, else 0.
    ///
    /// # Errors
    /// Returns a storage fault when the update fails.
    pub fn forget_id(&self, user_id: &str, id: i64) -> Result<usize, StoreError> {
        self.open_store()?.forget_by_id(user_id, id)
    }

    /// Soft-delete every visible record in the namespace; returns the count.
    ///
    /// # Errors
    /// Returns a storage fault when the update fails.
    pub fn clear(&self, user_id: &str) -> Result<usize, StoreError> {
        self.open_store()?.clear_namespace(user_id)
    }

    /// Physically compact the backing file (explicit maintenance only).
    ///
    /// # Errors
    /// Returns a storage fault when VACUUM fails.
    pub fn reclaim_space(&self) -> Result<(), StoreError> {
        self.open_store()?.reclaim_space()
    }

    /// Write an online backup of the database to `out_file`.
    ///
    /// # Errors
    /// Returns a storage fault when the backup fails.
    pub fn backup(&self, out_file: &std::path::Path) -> Result<(), StoreError> {
        self.open_store()?.backup(out_file)
    }

    /// Recorded schema version, when one exists.
    ///
    /// # Errors
    /// Returns a storage fault when the meta table cannot be read.
    pub fn schema_version(&self) -> Result<Option<i64>, StoreError> {
        self.open_store()?.schema_version()
    }

    /// Render the bounded prompt-injection block: up to `inject_count`
    /// records merged from the chat and remembered recency streams,
    /// chronologically ascending, truncated to the newest `inject_count`.
    ///
    /// # Errors
    /// Returns a storage fault when either stream cannot be fetched.
    pub fn memory_block(
        &self,
        user_id: &str,
        inject_count: usize,
        include_chat: bool,
        include_remembered: bool,
    ) -> Result<String, StoreError> {
        if inject_count == 0 {
            return Ok(String::new());
        }

        let store = self.open_store()?;
        let chat = if include_chat {
            store.recent(user_id, inject_count, false, Some(Kind::Chat.as_str()))?
        } else {
            Vec::new()
        };
        let remembered = if include_remembered {
            store.recent(user_id, inject_count, false, Some(Kind::Remembered.as_str()))?
        } else {
            Vec::new()
        };

        Ok(build_memory_block(&chat, &remembered, inject_count))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn temp_memory(prefix: &str) -> (Memory, PathBuf) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
            .as_nanos();
        let path = std::env::temp_dir().join(format!("{prefix}-{now}.sqlite3"));
        (Memory::new(path.clone()), path)
    }

    #[test]
    fn memory_block_merges_both_streams_and_keeps_the_newest() -> Result<(), StoreError> {
        let (memory, path) = temp_memory("aide-api-block");

        // Interleave chat turns and remembered items, ids 1..=6.
        memory.store("JD", "user", "chat one", "chat")?;
        memory.remember("JD", "fact one")?;
        memory.store("JD", "assistant", "chat two", "chat")?;
        memory.remember("JD", "fact two")?;
        memory.store("JD", "user", "chat three", "chat")?;
        memory.remember("JD", "fact three")?;

        let block = memory.memory_block("JD", 4, true, true)?;
        let lines: Vec<&str> = block.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "- ASSISTANT (chat): chat two");
        assert_eq!(lines[1], "- USER (remembered): fact two");
        assert_eq!(lines[2], "- USER (chat): chat three");
        assert_eq!(lines[3], "- USER (remembered): fact three");

        let _ = std::fs::remove_file(path);
        Ok(())
    }

    #[test]
    fn memory_block_respects_stream_toggles_and_zero_count() -> Result<(), StoreError> {
        let (memory, path) = temp_memory("aide-api-toggles");

        memory.store("JD", "user", "a chat turn", "chat")?;
        memory.remember("JD", "a remembered fact")?;

        assert_eq!(memory.memory_block("JD", 0, true, true)?, "");
        assert_eq!(
            memory.memory_block("JD", 10, false, true)?,
            "- USER (remembered): a remembered fact"
        );
        assert_eq!(memory.memory_block("JD", 10, true, false)?, "- USER (chat): a chat turn");
        assert_eq!(memory.memory_block("unknown-user", 10, true, true)?, "");

        let _ = std::fs::remove_file(path);
        Ok(())
    }

    #[test]
    fn each_operation_uses_its_own_connection() -> Result<(), StoreError> {
        let (memory, path) = temp_memory("aide-api-reopen");

        let id = memory.store("JD", "user", "persisted across opens", "chat")?;
        let other = Memory::new(path.clone());
        let rows = other.recent("JD", 10, false, None)?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);

        let _ = std::fs::remove_file(path);
        Ok(())
    }
}
