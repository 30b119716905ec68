//! Local store for novels, chapters and reading progress.
//!
//! The store is the single source of truth for everything the reader shows.
//! Every committed write is announced as a [`StoreEvent`] so that views built
//! with [`observe_library`], [`observe_novel`] and [`observe_chapters`] stay
//! current.

mod observe;
mod sqlite;

pub use observe::{observe_chapters, observe_library, observe_novel};
pub use sqlite::SqliteLibraryStore;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::novel::{Category, Chapter, Novel};

/// Errors that can occur in the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Novel not found: {0}")]
    NovelNotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Change notification published after a write commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A novel row was inserted or updated.
    NovelChanged { novel_id: String },
    /// A novel row and its chapters were deleted.
    NovelDeleted { novel_id: String },
    /// The chapter list or a chapter body of a novel changed.
    ChaptersChanged { novel_id: String },
    /// Stale previews were removed by the startup sweep.
    PreviewsSwept { count: usize },
}

impl StoreEvent {
    /// The novel this event is about, if any.
    pub fn novel_id(&self) -> Option<&str> {
        match self {
            StoreEvent::NovelChanged { novel_id }
            | StoreEvent::NovelDeleted { novel_id }
            | StoreEvent::ChaptersChanged { novel_id } => Some(novel_id),
            StoreEvent::PreviewsSwept { .. } => None,
        }
    }
}

/// Trait for library storage backends.
///
/// Methods are synchronous; async callers go through [`run_blocking`].
pub trait LibraryStore: Send + Sync {
    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;

    /// Get a novel by id.
    fn get_novel(&self, id: &str) -> Result<Option<Novel>, StoreError>;

    /// Insert or fully replace a novel row. Chapters are untouched.
    fn upsert_novel(&self, novel: &Novel) -> Result<(), StoreError>;

    /// Insert a novel unless a row with the same id exists.
    ///
    /// Returns `true` if the row was inserted.
    fn insert_novel_if_absent(&self, novel: &Novel) -> Result<bool, StoreError>;

    /// Change the category of a novel, returning the updated row.
    fn update_category(&self, id: &str, category: Category)
        -> Result<Option<Novel>, StoreError>;

    /// Fill in metadata discovered while listing chapters.
    ///
    /// `None` values leave the stored value unchanged.
    fn update_details(
        &self,
        id: &str,
        author: Option<&str>,
        description: Option<&str>,
        chapter_count: Option<u32>,
    ) -> Result<(), StoreError>;

    /// Record a reading position. Returns `false` if the novel does not exist.
    fn update_progress(
        &self,
        id: &str,
        chapter_index: u32,
        scroll_offset: u32,
        timestamp_ms: i64,
    ) -> Result<bool, StoreError>;

    /// Delete a novel and all of its chapters.
    fn delete_novel(&self, id: &str) -> Result<bool, StoreError>;

    /// Novels ordered by last read time (most recent first), excluding
    /// transient previews.
    fn list_library(&self) -> Result<Vec<Novel>, StoreError>;

    /// Library members whose title contains `query` (case-insensitive).
    fn search_library(&self, query: &str) -> Result<Vec<Novel>, StoreError>;

    /// Delete previews that were never read. Returns the number removed.
    fn sweep_stale_previews(&self) -> Result<usize, StoreError>;

    /// Atomically replace the chapter list of a novel and update its
    /// chapter count.
    ///
    /// Cached bodies survive for chapters whose index and source URL are
    /// unchanged, unless the replacement chapter carries its own body.
    fn replace_chapters_for_novel(
        &self,
        novel_id: &str,
        chapters: &[Chapter],
    ) -> Result<(), StoreError>;

    /// Insert or replace a novel row together with its chapter list in one
    /// transaction. Cached bodies survive as in
    /// [`replace_chapters_for_novel`](Self::replace_chapters_for_novel).
    fn upsert_novel_with_chapters(
        &self,
        novel: &Novel,
        chapters: &[Chapter],
    ) -> Result<(), StoreError>;

    /// Get a single chapter.
    fn get_chapter(&self, novel_id: &str, index: u32) -> Result<Option<Chapter>, StoreError>;

    /// All chapters of a novel ordered by index.
    fn list_chapters(&self, novel_id: &str) -> Result<Vec<Chapter>, StoreError>;

    /// Number of stored chapters for a novel.
    fn count_chapters(&self, novel_id: &str) -> Result<u32, StoreError>;

    /// Store a downloaded chapter body. Returns `false` if the chapter is unknown.
    fn update_chapter_body(
        &self,
        novel_id: &str,
        index: u32,
        body: &str,
    ) -> Result<bool, StoreError>;

    /// Delete all chapters of a novel. Returns the number removed.
    fn delete_chapters_for_novel(&self, novel_id: &str) -> Result<usize, StoreError>;

    /// Read a value from the app state table.
    fn get_state(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value to the app state table.
    fn set_state(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Run a store operation on the blocking thread pool.
///
/// The operation runs to completion even if the returned future is dropped,
/// so writes started here are never abandoned half-way.
pub async fn run_blocking<T, F>(store: &Arc<dyn LibraryStore>, op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn LibraryStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}
