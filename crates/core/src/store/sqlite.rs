//! SQLite-backed library store implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, types::Type, Connection, OptionalExtension};
use tokio::sync::broadcast;
use tracing::debug;

use super::{LibraryStore, StoreError, StoreEvent};
use crate::novel::{Category, Chapter, Novel};

/// Capacity of the change notification channel.
const EVENT_CAPACITY: usize = 256;

const NOVEL_COLUMNS: &str = "id, title, source_name, canonical_url, author, description,
     cover_reference, category, chapter_count, last_read_chapter_index,
     last_read_scroll_offset, last_read_timestamp";

/// SQLite-backed library store.
pub struct SqliteLibraryStore {
    conn: Mutex<Connection>,
    events: broadcast::Sender<StoreEvent>,
}

impl SqliteLibraryStore {
    /// Open (or create) the database at `path`.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        Self::initialize_schema(&conn)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            events,
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS novels (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                source_name TEXT NOT NULL,
                canonical_url TEXT NOT NULL,
                author TEXT,
                description TEXT,
                cover_reference TEXT,
                category TEXT NOT NULL DEFAULT 'none',
                chapter_count INTEGER NOT NULL DEFAULT 0,
                last_read_chapter_index INTEGER NOT NULL DEFAULT 1,
                last_read_scroll_offset INTEGER NOT NULL DEFAULT 0,
                last_read_timestamp INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_novels_last_read ON novels(last_read_timestamp);

            CREATE TABLE IF NOT EXISTS chapters (
                novel_id TEXT NOT NULL REFERENCES novels(id) ON DELETE CASCADE,
                idx INTEGER NOT NULL,
                name TEXT NOT NULL,
                source_url TEXT NOT NULL,
                body TEXT,
                PRIMARY KEY (novel_id, idx)
            );

            CREATE TABLE IF NOT EXISTS app_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    fn write_novel(conn: &Connection, novel: &Novel) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO novels (id, title, source_name, canonical_url, author, description,
                 cover_reference, category, chapter_count, last_read_chapter_index,
                 last_read_scroll_offset, last_read_timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 source_name = excluded.source_name,
                 canonical_url = excluded.canonical_url,
                 author = excluded.author,
                 description = excluded.description,
                 cover_reference = excluded.cover_reference,
                 category = excluded.category,
                 chapter_count = excluded.chapter_count,
                 last_read_chapter_index = excluded.last_read_chapter_index,
                 last_read_scroll_offset = excluded.last_read_scroll_offset,
                 last_read_timestamp = excluded.last_read_timestamp",
            params![
                &novel.id,
                &novel.title,
                &novel.source_name,
                &novel.canonical_url,
                &novel.author,
                &novel.description,
                &novel.cover_reference,
                novel.category.as_str(),
                novel.chapter_count,
                novel.last_read_chapter_index,
                novel.last_read_scroll_offset,
                novel.last_read_timestamp,
            ],
        )?;
        Ok(())
    }

    /// Replace the chapter rows of a novel, keeping bodies whose index and
    /// URL are unchanged, and update its chapter count.
    fn write_chapters(
        conn: &Connection,
        novel_id: &str,
        chapters: &[Chapter],
    ) -> Result<(), StoreError> {
        // Bodies already downloaded, keyed by index
        let mut cached: HashMap<u32, (String, String)> = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT idx, source_url, body FROM chapters
                 WHERE novel_id = ?1 AND body IS NOT NULL AND body != ''",
            )?;
            let rows = stmt.query_map(params![novel_id], |row| {
                Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?;
            for row in rows {
                let (index, url, body) = row?;
                cached.insert(index, (url, body));
            }
        }

        conn.execute("DELETE FROM chapters WHERE novel_id = ?1", params![novel_id])?;

        {
            let mut stmt = conn.prepare(
                "INSERT INTO chapters (novel_id, idx, name, source_url, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for chapter in chapters {
                let body = match &chapter.body {
                    Some(body) => Some(body.clone()),
                    None => cached
                        .remove(&chapter.index)
                        .filter(|(url, _)| *url == chapter.source_url)
                        .map(|(_, body)| body),
                };
                stmt.execute(params![
                    novel_id,
                    chapter.index,
                    &chapter.name,
                    &chapter.source_url,
                    body,
                ])?;
            }
        }

        conn.execute(
            "UPDATE novels SET chapter_count = ?2 WHERE id = ?1",
            params![novel_id, chapters.len() as u32],
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn row_to_novel(row: &rusqlite::Row) -> rusqlite::Result<Novel> {
        let category_str: String = row.get(7)?;
        let category = category_str
            .parse::<Category>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

        Ok(Novel {
            id: row.get(0)?,
            title: row.get(1)?,
            source_name: row.get(2)?,
            canonical_url: row.get(3)?,
            author: row.get(4)?,
            description: row.get(5)?,
            cover_reference: row.get(6)?,
            category,
            chapter_count: row.get(8)?,
            last_read_chapter_index: row.get(9)?,
            last_read_scroll_offset: row.get(10)?,
            last_read_timestamp: row.get(11)?,
        })
    }

    fn row_to_chapter(row: &rusqlite::Row) -> rusqlite::Result<Chapter> {
        Ok(Chapter {
            novel_id: row.get(0)?,
            index: row.get(1)?,
            name: row.get(2)?,
            source_url: row.get(3)?,
            body: row.get(4)?,
        })
    }

    fn query_novel(conn: &Connection, id: &str) -> Result<Option<Novel>, StoreError> {
        let sql = format!("SELECT {} FROM novels WHERE id = ?1", NOVEL_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_novel)
            .optional()?)
    }

    fn query_novels(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Novel>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, Self::row_to_novel)?;

        let mut novels = Vec::new();
        for row in rows {
            novels.push(row?);
        }
        Ok(novels)
    }
}

/// Escape `LIKE` wildcards so the query matches literally.
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl LibraryStore for SqliteLibraryStore {
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn get_novel(&self, id: &str) -> Result<Option<Novel>, StoreError> {
        let conn = self.conn()?;
        Self::query_novel(&conn, id)
    }

    fn upsert_novel(&self, novel: &Novel) -> Result<(), StoreError> {
        {
            let conn = self.conn()?;
            Self::write_novel(&conn, novel)?;
        }

        self.emit(StoreEvent::NovelChanged {
            novel_id: novel.id.clone(),
        });
        Ok(())
    }

    fn insert_novel_if_absent(&self, novel: &Novel) -> Result<bool, StoreError> {
        let inserted = {
            let conn = self.conn()?;
            conn.execute(
                "INSERT OR IGNORE INTO novels (id, title, source_name, canonical_url, author,
                     description, cover_reference, category, chapter_count,
                     last_read_chapter_index, last_read_scroll_offset, last_read_timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    &novel.id,
                    &novel.title,
                    &novel.source_name,
                    &novel.canonical_url,
                    &novel.author,
                    &novel.description,
                    &novel.cover_reference,
                    novel.category.as_str(),
                    novel.chapter_count,
                    novel.last_read_chapter_index,
                    novel.last_read_scroll_offset,
                    novel.last_read_timestamp,
                ],
            )? > 0
        };

        if inserted {
            self.emit(StoreEvent::NovelChanged {
                novel_id: novel.id.clone(),
            });
        }
        Ok(inserted)
    }

    fn update_category(
        &self,
        id: &str,
        category: Category,
    ) -> Result<Option<Novel>, StoreError> {
        let updated = {
            let conn = self.conn()?;
            let changed = conn.execute(
                "UPDATE novels SET category = ?2 WHERE id = ?1",
                params![id, category.as_str()],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            Self::query_novel(&conn, id)?
        };

        self.emit(StoreEvent::NovelChanged {
            novel_id: id.to_string(),
        });
        Ok(updated)
    }

    fn update_details(
        &self,
        id: &str,
        author: Option<&str>,
        description: Option<&str>,
        chapter_count: Option<u32>,
    ) -> Result<(), StoreError> {
        let changed = {
            let conn = self.conn()?;
            conn.execute(
                "UPDATE novels SET
                     author = COALESCE(?2, author),
                     description = COALESCE(?3, description),
                     chapter_count = COALESCE(?4, chapter_count)
                 WHERE id = ?1",
                params![id, author, description, chapter_count],
            )?
        };

        if changed > 0 {
            self.emit(StoreEvent::NovelChanged {
                novel_id: id.to_string(),
            });
        }
        Ok(())
    }

    fn update_progress(
        &self,
        id: &str,
        chapter_index: u32,
        scroll_offset: u32,
        timestamp_ms: i64,
    ) -> Result<bool, StoreError> {
        let changed = {
            let conn = self.conn()?;
            conn.execute(
                "UPDATE novels SET
                     last_read_chapter_index = ?2,
                     last_read_scroll_offset = ?3,
                     last_read_timestamp = ?4
                 WHERE id = ?1",
                params![id, chapter_index, scroll_offset, timestamp_ms],
            )?
        };

        if changed > 0 {
            self.emit(StoreEvent::NovelChanged {
                novel_id: id.to_string(),
            });
        }
        Ok(changed > 0)
    }

    fn delete_novel(&self, id: &str) -> Result<bool, StoreError> {
        let deleted = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM chapters WHERE novel_id = ?1", params![id])?;
            let deleted = tx.execute("DELETE FROM novels WHERE id = ?1", params![id])?;
            tx.commit()?;
            deleted > 0
        };

        if deleted {
            self.emit(StoreEvent::NovelDeleted {
                novel_id: id.to_string(),
            });
        }
        Ok(deleted)
    }

    fn list_library(&self) -> Result<Vec<Novel>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM novels
             WHERE NOT (category = 'none' AND last_read_timestamp = 0)
             ORDER BY last_read_timestamp DESC, title ASC",
            NOVEL_COLUMNS
        );
        Self::query_novels(&conn, &sql, [])
    }

    fn search_library(&self, query: &str) -> Result<Vec<Novel>, StoreError> {
        let conn = self.conn()?;
        let pattern = format!("%{}%", escape_like(query));
        let sql = format!(
            "SELECT {} FROM novels
             WHERE title LIKE ?1 ESCAPE '\\' AND category != 'none'
             ORDER BY last_read_timestamp DESC, title ASC",
            NOVEL_COLUMNS
        );
        Self::query_novels(&conn, &sql, params![pattern])
    }

    fn sweep_stale_previews(&self) -> Result<usize, StoreError> {
        let count = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM chapters WHERE novel_id IN (
                     SELECT id FROM novels WHERE category = 'none' AND last_read_timestamp = 0
                 )",
                [],
            )?;
            let count = tx.execute(
                "DELETE FROM novels WHERE category = 'none' AND last_read_timestamp = 0",
                [],
            )?;
            tx.commit()?;
            count
        };

        if count > 0 {
            debug!(count, "Swept stale previews");
            self.emit(StoreEvent::PreviewsSwept { count });
        }
        Ok(count)
    }

    fn replace_chapters_for_novel(
        &self,
        novel_id: &str,
        chapters: &[Chapter],
    ) -> Result<(), StoreError> {
        {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;

            let exists: bool = tx
                .query_row(
                    "SELECT 1 FROM novels WHERE id = ?1",
                    params![novel_id],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if !exists {
                return Err(StoreError::NovelNotFound(novel_id.to_string()));
            }

            Self::write_chapters(&tx, novel_id, chapters)?;
            tx.commit()?;
        }

        self.emit(StoreEvent::ChaptersChanged {
            novel_id: novel_id.to_string(),
        });
        self.emit(StoreEvent::NovelChanged {
            novel_id: novel_id.to_string(),
        });
        Ok(())
    }

    fn upsert_novel_with_chapters(
        &self,
        novel: &Novel,
        chapters: &[Chapter],
    ) -> Result<(), StoreError> {
        {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            Self::write_novel(&tx, novel)?;
            Self::write_chapters(&tx, &novel.id, chapters)?;
            tx.commit()?;
        }

        self.emit(StoreEvent::ChaptersChanged {
            novel_id: novel.id.clone(),
        });
        self.emit(StoreEvent::NovelChanged {
            novel_id: novel.id.clone(),
        });
        Ok(())
    }

    fn get_chapter(&self, novel_id: &str, index: u32) -> Result<Option<Chapter>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT novel_id, idx, name, source_url, body FROM chapters
                 WHERE novel_id = ?1 AND idx = ?2",
                params![novel_id, index],
                Self::row_to_chapter,
            )
            .optional()?)
    }

    fn list_chapters(&self, novel_id: &str) -> Result<Vec<Chapter>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT novel_id, idx, name, source_url, body FROM chapters
             WHERE novel_id = ?1 ORDER BY idx ASC",
        )?;
        let rows = stmt.query_map(params![novel_id], Self::row_to_chapter)?;

        let mut chapters = Vec::new();
        for row in rows {
            chapters.push(row?);
        }
        Ok(chapters)
    }

    fn count_chapters(&self, novel_id: &str) -> Result<u32, StoreError> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM chapters WHERE novel_id = ?1",
            params![novel_id],
            |row| row.get(0),
        )?)
    }

    fn update_chapter_body(
        &self,
        novel_id: &str,
        index: u32,
        body: &str,
    ) -> Result<bool, StoreError> {
        let changed = {
            let conn = self.conn()?;
            conn.execute(
                "UPDATE chapters SET body = ?3 WHERE novel_id = ?1 AND idx = ?2",
                params![novel_id, index, body],
            )?
        };

        if changed > 0 {
            self.emit(StoreEvent::ChaptersChanged {
                novel_id: novel_id.to_string(),
            });
        }
        Ok(changed > 0)
    }

    fn delete_chapters_for_novel(&self, novel_id: &str) -> Result<usize, StoreError> {
        let count = {
            let conn = self.conn()?;
            conn.execute(
                "DELETE FROM chapters WHERE novel_id = ?1",
                params![novel_id],
            )?
        };

        if count > 0 {
            self.emit(StoreEvent::ChaptersChanged {
                novel_id: novel_id.to_string(),
            });
        }
        Ok(count)
    }

    fn get_state(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT value FROM app_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_state(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO app_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::novel::{number_chapters, ChapterEntry};
    use tempfile::TempDir;

    fn create_test_store() -> SqliteLibraryStore {
        SqliteLibraryStore::in_memory().expect("Failed to create in-memory store")
    }

    fn create_test_novel(url: &str, title: &str) -> Novel {
        Novel::preview(title, "NovelFire", url)
    }

    fn create_test_chapters(novel_id: &str, count: u32) -> Vec<Chapter> {
        let entries: Vec<ChapterEntry> = (1..=count)
            .map(|i| ChapterEntry::new(format!("Chapter {}", i), format!("https://s/c/{}", i)))
            .collect();
        number_chapters(novel_id, &entries)
    }

    #[test]
    fn test_upsert_and_get_novel() {
        let store = create_test_store();
        let novel = create_test_novel("https://s/n/1", "Lord of the Mysteries");

        store.upsert_novel(&novel).unwrap();
        let loaded = store.get_novel(&novel.id).unwrap().unwrap();
        assert_eq!(loaded, novel);

        let mut changed = novel.clone();
        changed.author = Some("Cuttlefish".to_string());
        changed.category = Category::Reading;
        store.upsert_novel(&changed).unwrap();
        let loaded = store.get_novel(&novel.id).unwrap().unwrap();
        assert_eq!(loaded.author.as_deref(), Some("Cuttlefish"));
        assert_eq!(loaded.category, Category::Reading);
    }

    #[test]
    fn test_get_nonexistent_novel() {
        let store = create_test_store();
        assert!(store.get_novel("missing").unwrap().is_none());
    }

    #[test]
    fn test_insert_if_absent_keeps_existing_row() {
        let store = create_test_store();
        let mut novel = create_test_novel("https://s/n/1", "A");
        novel.category = Category::OnHold;
        assert!(store.insert_novel_if_absent(&novel).unwrap());

        let preview = create_test_novel("https://s/n/1", "A");
        assert!(!store.insert_novel_if_absent(&preview).unwrap());
        let loaded = store.get_novel(&novel.id).unwrap().unwrap();
        assert_eq!(loaded.category, Category::OnHold);
    }

    #[test]
    fn test_update_category() {
        let store = create_test_store();
        let novel = create_test_novel("https://s/n/1", "A");
        store.upsert_novel(&novel).unwrap();

        let updated = store
            .update_category(&novel.id, Category::Finished)
            .unwrap()
            .unwrap();
        assert_eq!(updated.category, Category::Finished);
        assert!(store
            .update_category("missing", Category::Reading)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_update_details_keeps_unset_fields() {
        let store = create_test_store();
        let mut novel = create_test_novel("https://s/n/1", "A");
        novel.author = Some("Original".to_string());
        store.upsert_novel(&novel).unwrap();

        store
            .update_details(&novel.id, None, Some("A story"), Some(42))
            .unwrap();
        let loaded = store.get_novel(&novel.id).unwrap().unwrap();
        assert_eq!(loaded.author.as_deref(), Some("Original"));
        assert_eq!(loaded.description.as_deref(), Some("A story"));
        assert_eq!(loaded.chapter_count, 42);
    }

    #[test]
    fn test_update_progress() {
        let store = create_test_store();
        let novel = create_test_novel("https://s/n/1", "A");
        store.upsert_novel(&novel).unwrap();

        assert!(store.update_progress(&novel.id, 5, 120, 1000).unwrap());
        let loaded = store.get_novel(&novel.id).unwrap().unwrap();
        assert_eq!(loaded.last_read_chapter_index, 5);
        assert_eq!(loaded.last_read_scroll_offset, 120);
        assert_eq!(loaded.last_read_timestamp, 1000);

        assert!(!store.update_progress("missing", 1, 0, 1).unwrap());
    }

    #[test]
    fn test_library_excludes_transient_previews_and_orders_by_last_read() {
        let store = create_test_store();

        let preview = create_test_novel("https://s/n/preview", "Preview");
        store.upsert_novel(&preview).unwrap();

        let mut older = create_test_novel("https://s/n/older", "Older");
        older.category = Category::Reading;
        older.last_read_timestamp = 100;
        store.upsert_novel(&older).unwrap();

        let mut newer = create_test_novel("https://s/n/newer", "Newer");
        newer.last_read_timestamp = 200; // read but not in library: history
        store.upsert_novel(&newer).unwrap();

        let library = store.list_library().unwrap();
        let titles: Vec<&str> = library.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["Newer", "Older"]);
    }

    #[test]
    fn test_sweep_stale_previews() {
        let store = create_test_store();

        let preview = create_test_novel("https://s/n/preview", "Preview");
        store.upsert_novel(&preview).unwrap();
        store
            .replace_chapters_for_novel(&preview.id, &create_test_chapters(&preview.id, 3))
            .unwrap();

        let mut read = create_test_novel("https://s/n/read", "Read");
        read.last_read_timestamp = 5;
        store.upsert_novel(&read).unwrap();

        let mut shelved = create_test_novel("https://s/n/shelved", "Shelved");
        shelved.category = Category::Reading;
        store.upsert_novel(&shelved).unwrap();

        assert_eq!(store.sweep_stale_previews().unwrap(), 1);
        assert!(store.get_novel(&preview.id).unwrap().is_none());
        assert_eq!(store.count_chapters(&preview.id).unwrap(), 0);
        assert!(store.get_novel(&read.id).unwrap().is_some());
        assert!(store.get_novel(&shelved.id).unwrap().is_some());

        assert_eq!(store.sweep_stale_previews().unwrap(), 0);
    }

    #[test]
    fn test_search_library_only_matches_members() {
        let store = create_test_store();

        let mut member = create_test_novel("https://s/n/1", "Shadow Slave");
        member.category = Category::Reading;
        store.upsert_novel(&member).unwrap();

        let mut history = create_test_novel("https://s/n/2", "Shadow Monarch");
        history.last_read_timestamp = 10;
        store.upsert_novel(&history).unwrap();

        let results = store.search_library("shadow").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Shadow Slave");
    }

    #[test]
    fn test_search_library_matches_wildcards_literally() {
        let store = create_test_store();

        for (url, title) in [
            ("https://s/n/1", "100% Chance"),
            ("https://s/n/2", "1000 Years"),
            ("https://s/n/3", "snake_case"),
            ("https://s/n/4", "snakeXcase"),
        ] {
            let mut novel = create_test_novel(url, title);
            novel.category = Category::Reading;
            store.upsert_novel(&novel).unwrap();
        }

        let percent = store.search_library("100%").unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].title, "100% Chance");

        let underscore = store.search_library("e_c").unwrap();
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].title, "snake_case");
    }

    #[test]
    fn test_upsert_novel_with_chapters_commits_both() {
        let store = create_test_store();
        let mut novel = create_test_novel("https://s/n/1", "A");
        novel.category = Category::Reading;

        store
            .upsert_novel_with_chapters(&novel, &create_test_chapters(&novel.id, 3))
            .unwrap();

        let stored = store.get_novel(&novel.id).unwrap().unwrap();
        assert_eq!(stored.category, Category::Reading);
        assert_eq!(stored.chapter_count, 3);
        assert_eq!(store.count_chapters(&novel.id).unwrap(), 3);
    }

    #[test]
    fn test_upsert_novel_with_chapters_is_atomic_on_failure() {
        let store = create_test_store();
        let preview = create_test_novel("https://s/n/1", "A");
        store.upsert_novel(&preview).unwrap();

        let mut member = preview.clone();
        member.category = Category::Reading;
        let mut broken = create_test_chapters(&member.id, 3);
        broken[2].index = 1;
        assert!(store.upsert_novel_with_chapters(&member, &broken).is_err());

        let stored = store.get_novel(&preview.id).unwrap().unwrap();
        assert_eq!(stored.category, Category::None);
        assert_eq!(store.count_chapters(&preview.id).unwrap(), 0);
    }

    #[test]
    fn test_replace_chapters_sets_count_and_order() {
        let store = create_test_store();
        let novel = create_test_novel("https://s/n/1", "A");
        store.upsert_novel(&novel).unwrap();

        store
            .replace_chapters_for_novel(&novel.id, &create_test_chapters(&novel.id, 4))
            .unwrap();

        let chapters = store.list_chapters(&novel.id).unwrap();
        let indices: Vec<u32> = chapters.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        assert_eq!(store.get_novel(&novel.id).unwrap().unwrap().chapter_count, 4);
        assert_eq!(store.count_chapters(&novel.id).unwrap(), 4);
    }

    #[test]
    fn test_replace_chapters_preserves_bodies_for_unchanged_urls() {
        let store = create_test_store();
        let novel = create_test_novel("https://s/n/1", "A");
        store.upsert_novel(&novel).unwrap();
        store
            .replace_chapters_for_novel(&novel.id, &create_test_chapters(&novel.id, 3))
            .unwrap();
        store.update_chapter_body(&novel.id, 1, "first").unwrap();
        store.update_chapter_body(&novel.id, 2, "second").unwrap();

        let mut next = create_test_chapters(&novel.id, 5);
        next[1].source_url = "https://s/c/moved".to_string();
        store.replace_chapters_for_novel(&novel.id, &next).unwrap();

        let first = store.get_chapter(&novel.id, 1).unwrap().unwrap();
        assert_eq!(first.body.as_deref(), Some("first"));
        let second = store.get_chapter(&novel.id, 2).unwrap().unwrap();
        assert!(second.body.is_none(), "URL changed, body must be dropped");
        assert_eq!(store.count_chapters(&novel.id).unwrap(), 5);
    }

    #[test]
    fn test_replace_chapters_is_atomic_on_failure() {
        let store = create_test_store();
        let novel = create_test_novel("https://s/n/1", "A");
        store.upsert_novel(&novel).unwrap();
        store
            .replace_chapters_for_novel(&novel.id, &create_test_chapters(&novel.id, 3))
            .unwrap();

        // Duplicate index violates the primary key half-way through the insert
        let mut broken = create_test_chapters(&novel.id, 4);
        broken[3].index = 1;
        assert!(store.replace_chapters_for_novel(&novel.id, &broken).is_err());

        let chapters = store.list_chapters(&novel.id).unwrap();
        assert_eq!(chapters.len(), 3);
        assert_eq!(store.get_novel(&novel.id).unwrap().unwrap().chapter_count, 3);
    }

    #[test]
    fn test_replace_chapters_for_unknown_novel_fails() {
        let store = create_test_store();
        let result = store.replace_chapters_for_novel("missing", &create_test_chapters("missing", 1));
        assert!(matches!(result, Err(StoreError::NovelNotFound(_))));
    }

    #[test]
    fn test_update_chapter_body() {
        let store = create_test_store();
        let novel = create_test_novel("https://s/n/1", "A");
        store.upsert_novel(&novel).unwrap();
        store
            .replace_chapters_for_novel(&novel.id, &create_test_chapters(&novel.id, 2))
            .unwrap();

        assert!(store.update_chapter_body(&novel.id, 2, "text").unwrap());
        assert!(!store.update_chapter_body(&novel.id, 9, "text").unwrap());
        let chapter = store.get_chapter(&novel.id, 2).unwrap().unwrap();
        assert!(chapter.has_body());
    }

    #[test]
    fn test_delete_novel_cascades_to_chapters() {
        let store = create_test_store();
        let novel = create_test_novel("https://s/n/1", "A");
        store.upsert_novel(&novel).unwrap();
        store
            .replace_chapters_for_novel(&novel.id, &create_test_chapters(&novel.id, 2))
            .unwrap();

        assert!(store.delete_novel(&novel.id).unwrap());
        assert!(store.get_novel(&novel.id).unwrap().is_none());
        assert!(store.list_chapters(&novel.id).unwrap().is_empty());
        assert!(!store.delete_novel(&novel.id).unwrap());
    }

    #[test]
    fn test_delete_chapters_keeps_novel() {
        let store = create_test_store();
        let novel = create_test_novel("https://s/n/1", "A");
        store.upsert_novel(&novel).unwrap();
        store
            .replace_chapters_for_novel(&novel.id, &create_test_chapters(&novel.id, 2))
            .unwrap();

        assert_eq!(store.delete_chapters_for_novel(&novel.id).unwrap(), 2);
        assert!(store.get_novel(&novel.id).unwrap().is_some());
        assert_eq!(store.count_chapters(&novel.id).unwrap(), 0);
    }

    #[test]
    fn test_app_state_roundtrip() {
        let store = create_test_store();
        assert!(store.get_state("last_active_novel").unwrap().is_none());
        store.set_state("last_active_novel", "abc").unwrap();
        store.set_state("last_active_novel", "def").unwrap();
        assert_eq!(
            store.get_state("last_active_novel").unwrap().as_deref(),
            Some("def")
        );
    }

    #[test]
    fn test_writes_publish_events() {
        let store = create_test_store();
        let mut events = store.subscribe();
        let novel = create_test_novel("https://s/n/1", "A");

        store.upsert_novel(&novel).unwrap();
        store
            .replace_chapters_for_novel(&novel.id, &create_test_chapters(&novel.id, 1))
            .unwrap();
        store.delete_novel(&novel.id).unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            StoreEvent::NovelChanged {
                novel_id: novel.id.clone()
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            StoreEvent::ChaptersChanged {
                novel_id: novel.id.clone()
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            StoreEvent::NovelChanged {
                novel_id: novel.id.clone()
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            StoreEvent::NovelDeleted {
                novel_id: novel.id.clone()
            }
        );
    }

    #[test]
    fn test_file_based_store_persists() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("library.db");
        let novel = create_test_novel("https://s/n/1", "A");

        {
            let store = SqliteLibraryStore::new(&db_path).unwrap();
            store.upsert_novel(&novel).unwrap();
        }

        let store = SqliteLibraryStore::new(&db_path).unwrap();
        assert!(store.get_novel(&novel.id).unwrap().is_some());
    }
}
