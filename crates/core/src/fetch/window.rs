//! Reader window: the chapters currently loaded for one reading session.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::library::LibraryError;
use crate::novel::ChapterData;

use super::coordinator::ChapterFetchCoordinator;
use super::types::FetchOutcome;

#[derive(Debug, Default)]
struct WindowState {
    chapter_count: u32,
    loaded: VecDeque<ChapterData>,
    /// Indices this session is currently loading.
    pending: HashSet<u32>,
}

impl WindowState {
    fn in_range(&self, index: u32) -> bool {
        index >= 1 && index <= self.chapter_count
    }

    fn first_index(&self) -> Option<u32> {
        self.loaded.front().map(|c| c.index)
    }

    fn last_index(&self) -> Option<u32> {
        self.loaded.back().map(|c| c.index)
    }

    /// Reserve `index` for loading unless it is out of range, loaded or pending.
    fn reserve(&mut self, index: u32) -> bool {
        self.in_range(index)
            && !self.loaded.iter().any(|c| c.index == index)
            && self.pending.insert(index)
    }
}

/// A contiguous window of loaded chapters of one novel.
///
/// Scrolling past either end loads the neighbouring chapter and prefetches
/// the one after it. Out-of-range or duplicate requests are ignored.
pub struct ReaderSession {
    coordinator: ChapterFetchCoordinator,
    novel_id: String,
    prefetch: bool,
    state: Mutex<WindowState>,
}

impl ReaderSession {
    /// Open the reader at `start_index`.
    ///
    /// Loads the start chapter (syncing the chapter list if needed), marks
    /// the novel as the active one and prefetches the next chapter.
    pub async fn open(
        coordinator: ChapterFetchCoordinator,
        novel_id: &str,
        start_index: u32,
        prefetch: bool,
    ) -> Result<Self, LibraryError> {
        let library = coordinator.library();
        if library.get_novel(novel_id).await?.is_none() {
            return Err(LibraryError::NovelNotFound(novel_id.to_string()));
        }
        library.mark_active_novel(novel_id).await?;

        let start = start_index.max(1);
        let outcome = coordinator.fetch_chapter(novel_id, start, false).await;
        let chapter_count = coordinator
            .chapter_count(novel_id)
            .await
            .map_err(LibraryError::from)?
            .unwrap_or(0);

        let mut loaded = VecDeque::new();
        loaded.push_back(outcome.chapter_data());

        info!(
            novel_id,
            start,
            chapter_count,
            loaded = outcome.is_loaded(),
            "Reader opened"
        );

        let session = Self {
            coordinator,
            novel_id: novel_id.to_string(),
            prefetch,
            state: Mutex::new(WindowState {
                chapter_count,
                loaded,
                pending: HashSet::new(),
            }),
        };

        if outcome.is_loaded() {
            session.prefetch_chapter(start + 1).await;
        }
        Ok(session)
    }

    pub fn novel_id(&self) -> &str {
        &self.novel_id
    }

    pub fn chapter_count(&self) -> u32 {
        self.state.lock().unwrap().chapter_count
    }

    /// Snapshot of the loaded chapters in reading order.
    pub fn chapters(&self) -> Vec<ChapterData> {
        self.state.lock().unwrap().loaded.iter().cloned().collect()
    }

    /// Load the chapter after the last loaded one.
    ///
    /// Returns `None` when the request is ignored.
    pub async fn load_next(&self) -> Option<ChapterData> {
        self.refresh_chapter_count().await;
        let index = {
            let mut state = self.state.lock().unwrap();
            let next = state.last_index()? + 1;
            if !state.reserve(next) {
                return None;
            }
            next
        };

        let outcome = self.load(index).await;
        {
            let mut state = self.state.lock().unwrap();
            state.pending.remove(&index);
            if !outcome.is_not_found() && state.last_index() == Some(index - 1) {
                state.loaded.push_back(outcome.chapter_data());
            }
        }

        if outcome.is_loaded() {
            self.prefetch_chapter(index + 1).await;
        }
        Some(outcome.chapter_data())
    }

    /// Load the chapter before the first loaded one.
    ///
    /// Returns `None` when the request is ignored.
    pub async fn load_previous(&self) -> Option<ChapterData> {
        self.refresh_chapter_count().await;
        let index = {
            let mut state = self.state.lock().unwrap();
            let previous = state.first_index()?.checked_sub(1)?;
            if !state.reserve(previous) {
                return None;
            }
            previous
        };

        let outcome = self.load(index).await;
        {
            let mut state = self.state.lock().unwrap();
            state.pending.remove(&index);
            if !outcome.is_not_found() && state.first_index() == Some(index + 1) {
                state.loaded.push_front(outcome.chapter_data());
            }
        }

        if outcome.is_loaded() && index > 1 {
            self.prefetch_chapter(index - 1).await;
        }
        Some(outcome.chapter_data())
    }

    /// React to the range of chapters visible on screen.
    ///
    /// Reaching the last loaded chapter loads the next one; reaching the
    /// first loaded chapter loads the previous one. Returns what was loaded.
    pub async fn on_visible_range(&self, first: u32, last: u32) -> Vec<ChapterData> {
        let (at_start, at_end) = {
            let state = self.state.lock().unwrap();
            (
                state.first_index() == Some(first),
                state.last_index() == Some(last),
            )
        };

        let mut loaded = Vec::new();
        if at_end {
            loaded.extend(self.load_next().await);
        }
        if at_start {
            loaded.extend(self.load_previous().await);
        }
        loaded
    }

    /// Re-download a chapter, bypassing the cache.
    ///
    /// The loaded copy is replaced in place and every other loaded chapter
    /// without a body is dropped from the window.
    pub async fn refresh(&self, index: u32) -> Option<ChapterData> {
        self.refresh_chapter_count().await;
        if !self.state.lock().unwrap().in_range(index) {
            return None;
        }

        let outcome = self.coordinator.fetch_chapter(&self.novel_id, index, true).await;
        let data = outcome.chapter_data();
        debug!(novel_id = %self.novel_id, index, loaded = outcome.is_loaded(), "Chapter refreshed");

        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.loaded.iter_mut().find(|c| c.index == index) {
            *slot = data.clone();
        }
        state.loaded.retain(|c| c.index == index || !c.is_empty());
        Some(data)
    }

    /// Re-read the stored chapter count, which may have changed since the
    /// session was opened. An empty list is synced first.
    async fn refresh_chapter_count(&self) {
        let mut count = self.coordinator.chapter_count(&self.novel_id).await;
        if matches!(count, Ok(Some(0))) {
            if let Err(e) = self.coordinator.library().sync_novel(&self.novel_id).await {
                warn!(novel_id = %self.novel_id, error = %e, "Chapter list still unavailable");
                return;
            }
            count = self.coordinator.chapter_count(&self.novel_id).await;
        }

        match count {
            Ok(Some(count)) => self.state.lock().unwrap().chapter_count = count,
            Ok(None) => debug!(novel_id = %self.novel_id, "Novel removed while reading"),
            Err(e) => warn!(novel_id = %self.novel_id, error = %e, "Failed to read chapter count"),
        }
    }

    async fn load(&self, index: u32) -> FetchOutcome {
        let outcome = self
            .coordinator
            .fetch_chapter(&self.novel_id, index, false)
            .await;
        if !outcome.is_loaded() {
            warn!(novel_id = %self.novel_id, index, outcome = outcome.label(), "Chapter could not be loaded");
        }
        outcome
    }

    async fn prefetch_chapter(&self, index: u32) {
        if self.prefetch {
            // Result only warms the cache
            let _ = self.coordinator.prefetch(&self.novel_id, index).await;
        }
    }
}

impl std::fmt::Debug for ReaderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderSession")
            .field("novel_id", &self.novel_id)
            .field("prefetch", &self.prefetch)
            .finish()
    }
}
