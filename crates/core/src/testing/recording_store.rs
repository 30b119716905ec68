//! Store wrapper that records writes for test assertions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::novel::{Category, Chapter, Novel};
use crate::store::{LibraryStore, StoreError, StoreEvent};

/// Wraps any [`LibraryStore`] and records the writes that go through it.
///
/// Chapter list and progress writes can be made to fail to simulate a
/// storage error.
pub struct RecordingStore {
    inner: Arc<dyn LibraryStore>,
    progress_writes: Mutex<Vec<(String, u32, u32)>>,
    body_writes: Mutex<Vec<(String, u32)>>,
    chapter_replacements: Mutex<Vec<(String, usize)>>,
    fail_replace: AtomicBool,
    fail_progress: AtomicBool,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn LibraryStore>) -> Self {
        Self {
            inner,
            progress_writes: Mutex::new(Vec::new()),
            body_writes: Mutex::new(Vec::new()),
            chapter_replacements: Mutex::new(Vec::new()),
            fail_replace: AtomicBool::new(false),
            fail_progress: AtomicBool::new(false),
        }
    }

    /// Progress writes as `(novel_id, chapter_index, scroll_offset)`.
    pub fn progress_writes(&self) -> Vec<(String, u32, u32)> {
        self.progress_writes.lock().unwrap().clone()
    }

    /// Chapter body writes as `(novel_id, index)`.
    pub fn body_writes(&self) -> Vec<(String, u32)> {
        self.body_writes.lock().unwrap().clone()
    }

    /// Successful chapter list writes as `(novel_id, chapter_count)`.
    pub fn chapter_replacements(&self) -> Vec<(String, usize)> {
        self.chapter_replacements.lock().unwrap().clone()
    }

    /// Make chapter list writes fail.
    pub fn set_fail_replace(&self, fail: bool) {
        self.fail_replace.store(fail, Ordering::SeqCst);
    }

    /// Make progress writes fail.
    pub fn set_fail_progress(&self, fail: bool) {
        self.fail_progress.store(fail, Ordering::SeqCst);
    }
}

impl LibraryStore for RecordingStore {
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.subscribe()
    }

    fn get_novel(&self, id: &str) -> Result<Option<Novel>, StoreError> {
        self.inner.get_novel(id)
    }

    fn upsert_novel(&self, novel: &Novel) -> Result<(), StoreError> {
        self.inner.upsert_novel(novel)
    }

    fn insert_novel_if_absent(&self, novel: &Novel) -> Result<bool, StoreError> {
        self.inner.insert_novel_if_absent(novel)
    }

    fn update_category(
        &self,
        id: &str,
        category: Category,
    ) -> Result<Option<Novel>, StoreError> {
        self.inner.update_category(id, category)
    }

    fn update_details(
        &self,
        id: &str,
        author: Option<&str>,
        description: Option<&str>,
        chapter_count: Option<u32>,
    ) -> Result<(), StoreError> {
        self.inner
            .update_details(id, author, description, chapter_count)
    }

    fn update_progress(
        &self,
        id: &str,
        chapter_index: u32,
        scroll_offset: u32,
        timestamp_ms: i64,
    ) -> Result<bool, StoreError> {
        if self.fail_progress.load(Ordering::SeqCst) {
            return Err(StoreError::Database("simulated progress failure".to_string()));
        }
        let updated = self
            .inner
            .update_progress(id, chapter_index, scroll_offset, timestamp_ms)?;
        self.progress_writes
            .lock()
            .unwrap()
            .push((id.to_string(), chapter_index, scroll_offset));
        Ok(updated)
    }

    fn delete_novel(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.delete_novel(id)
    }

    fn list_library(&self) -> Result<Vec<Novel>, StoreError> {
        self.inner.list_library()
    }

    fn search_library(&self, query: &str) -> Result<Vec<Novel>, StoreError> {
        self.inner.search_library(query)
    }

    fn sweep_stale_previews(&self) -> Result<usize, StoreError> {
        self.inner.sweep_stale_previews()
    }

    fn replace_chapters_for_novel(
        &self,
        novel_id: &str,
        chapters: &[Chapter],
    ) -> Result<(), StoreError> {
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(StoreError::Database("simulated replace failure".to_string()));
        }
        self.inner.replace_chapters_for_novel(novel_id, chapters)?;
        self.chapter_replacements
            .lock()
            .unwrap()
            .push((novel_id.to_string(), chapters.len()));
        Ok(())
    }

    fn upsert_novel_with_chapters(
        &self,
        novel: &Novel,
        chapters: &[Chapter],
    ) -> Result<(), StoreError> {
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(StoreError::Database("simulated replace failure".to_string()));
        }
        self.inner.upsert_novel_with_chapters(novel, chapters)?;
        self.chapter_replacements
            .lock()
            .unwrap()
            .push((novel.id.clone(), chapters.len()));
        Ok(())
    }

    fn get_chapter(&self, novel_id: &str, index: u32) -> Result<Option<Chapter>, StoreError> {
        self.inner.get_chapter(novel_id, index)
    }

    fn list_chapters(&self, novel_id: &str) -> Result<Vec<Chapter>, StoreError> {
        self.inner.list_chapters(novel_id)
    }

    fn count_chapters(&self, novel_id: &str) -> Result<u32, StoreError> {
        self.inner.count_chapters(novel_id)
    }

    fn update_chapter_body(
        &self,
        novel_id: &str,
        index: u32,
        body: &str,
    ) -> Result<bool, StoreError> {
        let updated = self.inner.update_chapter_body(novel_id, index, body)?;
        self.body_writes
            .lock()
            .unwrap()
            .push((novel_id.to_string(), index));
        Ok(updated)
    }

    fn delete_chapters_for_novel(&self, novel_id: &str) -> Result<usize, StoreError> {
        self.inner.delete_chapters_for_novel(novel_id)
    }

    fn get_state(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get_state(key)
    }

    fn set_state(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set_state(key, value)
    }
}
