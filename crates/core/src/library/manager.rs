//! Library manager implementation.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::novel::{number_chapters, Category, Chapter, Novel};
use crate::progress::ProgressTracker;
use crate::source::{
    ChapterIndex, NovelSource, SearchPage, SearchSession, SourceCursor, SourceRegistry,
    SourceSelector,
};
use crate::store::{run_blocking, LibraryStore};

use super::types::{HistoryRemoval, LibraryError, OpenedPreview, SearchResults, SyncOutcome};

/// App state key holding the id of the novel last opened in the reader.
pub const LAST_ACTIVE_NOVEL_KEY: &str = "last_active_novel";

/// Orchestrates search, library membership and chapter list syncs.
pub struct LibraryManager {
    store: Arc<dyn LibraryStore>,
    sources: SourceRegistry,
    /// Session recorded by `search_sources`, continued by `load_next_page`.
    session: Mutex<Option<SearchSession>>,
    /// One lock per novel whose chapter set is being written.
    sync_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LibraryManager {
    /// Create a new library manager.
    pub fn new(store: Arc<dyn LibraryStore>, sources: SourceRegistry) -> Self {
        Self {
            store,
            sources,
            session: Mutex::new(None),
            sync_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn LibraryStore> {
        &self.store
    }

    /// Names of the configured sources, in registry order.
    pub fn source_names(&self) -> Vec<String> {
        self.sources.names()
    }

    /// The source a novel was found on, matched by exact name.
    pub fn source_for(&self, novel: &Novel) -> Option<Arc<dyn NovelSource>> {
        self.sources.get(&novel.source_name)
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Search the selected sources for `query`.
    ///
    /// Sources are queried in parallel and their results concatenated in
    /// registry order. A failing source contributes no results and is marked
    /// exhausted in the returned session.
    pub async fn search(&self, query: &str, selector: &SourceSelector) -> SearchResults {
        let sources = self.sources.select(selector);
        let pages = join_all(
            sources
                .iter()
                .map(|source| search_page(Arc::clone(source), query, 1)),
        )
        .await;

        let results = collect_pages(query, pages);
        info!(
            query,
            sources = sources.len(),
            results = results.novels.len(),
            "Search completed"
        );
        results
    }

    /// Fetch the next page of a search session.
    ///
    /// Only sources whose cursor still has a next page are queried.
    pub async fn next_page(&self, session: &SearchSession) -> SearchResults {
        let pending: Vec<(Arc<dyn NovelSource>, u32)> = session
            .cursors
            .iter()
            .filter_map(|cursor| {
                let page = cursor.next_page?;
                match self.sources.get(&cursor.source) {
                    Some(source) => Some((source, page)),
                    None => {
                        warn!(source = %cursor.source, "Search cursor for unknown source dropped");
                        None
                    }
                }
            })
            .collect();

        let pages = join_all(
            pending
                .into_iter()
                .map(|(source, page)| search_page(source, &session.query, page)),
        )
        .await;

        collect_pages(&session.query, pages)
    }

    /// Search and remember the session for [`load_next_page`](Self::load_next_page).
    ///
    /// Replaces any previously recorded session.
    pub async fn search_sources(&self, query: &str, selector: &SourceSelector) -> SearchResults {
        let results = self.search(query, selector).await;
        *self.session.lock().await = Some(results.session.clone());
        results
    }

    /// Continue the session recorded by the last [`search_sources`](Self::search_sources).
    ///
    /// Returns an empty result when no search has been made yet.
    pub async fn load_next_page(&self) -> SearchResults {
        let Some(session) = self.session.lock().await.clone() else {
            debug!("load_next_page called before any search");
            return SearchResults::default();
        };

        let results = self.next_page(&session).await;
        *self.session.lock().await = Some(results.session.clone());
        results
    }

    // =========================================================================
    // Previews
    // =========================================================================

    /// Fill in the chapter count of a preview from its source.
    ///
    /// Never writes to the store. Any source failure returns the novel
    /// unchanged.
    pub async fn resolve_preview_details(&self, novel: &Novel) -> Novel {
        let Some(source) = self.source_for(novel) else {
            warn!(source = %novel.source_name, novel_id = %novel.id, "No source for preview");
            return novel.clone();
        };

        match metrics::timed_source_request(source.name(), "chapters", source.chapters(novel))
            .await
        {
            Ok(index) if !index.chapters.is_empty() => {
                let mut resolved = novel.clone();
                resolved.chapter_count = index.chapters.len() as u32;
                if index.author.is_some() {
                    resolved.author = index.author;
                }
                if index.description.is_some() {
                    resolved.description = index.description;
                }
                resolved
            }
            Ok(_) => {
                debug!(novel_id = %novel.id, "Source listed no chapters for preview");
                novel.clone()
            }
            Err(e) => {
                warn!(novel_id = %novel.id, error = %e, "Failed to resolve preview details");
                novel.clone()
            }
        }
    }

    /// Chapter list of a novel straight from its source, without persisting.
    ///
    /// Chapters carry no body. Returns an empty list on failure.
    pub async fn preview_chapters(&self, novel: &Novel) -> Vec<Chapter> {
        let Some(source) = self.source_for(novel) else {
            warn!(source = %novel.source_name, novel_id = %novel.id, "No source for preview");
            return Vec::new();
        };

        match metrics::timed_source_request(source.name(), "chapters", source.chapters(novel))
            .await
        {
            Ok(index) => number_chapters(&novel.id, &index.chapters),
            Err(e) => {
                warn!(novel_id = %novel.id, error = %e, "Failed to list preview chapters");
                Vec::new()
            }
        }
    }

    /// Open a search result.
    ///
    /// A novel that is already stored is returned as is. Otherwise the
    /// result is stored as a preview and its details are resolved in the
    /// background; the write-back never touches category or progress.
    pub async fn open_preview(
        self: &Arc<Self>,
        preview: Novel,
    ) -> Result<OpenedPreview, LibraryError> {
        let id = preview.id.clone();
        if let Some(novel) = run_blocking(&self.store, move |s| s.get_novel(&id)).await? {
            return Ok(OpenedPreview {
                novel,
                details: None,
            });
        }

        let mut row = preview;
        row.category = Category::None;
        row.last_read_timestamp = 0;

        let candidate = row.clone();
        let inserted =
            run_blocking(&self.store, move |s| s.insert_novel_if_absent(&candidate)).await?;
        if !inserted {
            // Lost a race with another open of the same novel
            let id = row.id.clone();
            let novel = run_blocking(&self.store, move |s| s.get_novel(&id))
                .await?
                .ok_or_else(|| LibraryError::NovelNotFound(row.id.clone()))?;
            return Ok(OpenedPreview {
                novel,
                details: None,
            });
        }

        debug!(novel_id = %row.id, title = %row.title, "Preview stored");
        let manager = Arc::clone(self);
        let novel = row.clone();
        let details = tokio::spawn(async move {
            manager.write_back_details(&novel).await;
        });

        Ok(OpenedPreview {
            novel: row,
            details: Some(details),
        })
    }

    async fn write_back_details(&self, novel: &Novel) {
        let resolved = self.resolve_preview_details(novel).await;
        if resolved == *novel {
            return;
        }

        let id = resolved.id.clone();
        let result = run_blocking(&self.store, move |s| {
            s.update_details(
                &id,
                resolved.author.as_deref(),
                resolved.description.as_deref(),
                Some(resolved.chapter_count),
            )
        })
        .await;

        if let Err(e) = result {
            warn!(novel_id = %novel.id, error = %e, "Failed to store preview details");
        }
    }

    // =========================================================================
    // Library membership
    // =========================================================================

    /// Add a novel to the library together with its chapter list.
    ///
    /// A `None` category becomes `Reading`. Reading progress of an already
    /// stored row is kept. The chapter list is fetched first and committed
    /// with the row in one transaction. Fails with
    /// [`LibraryError::SyncFailed`] when no list is available and none is
    /// stored yet; the stored row is then left as it was.
    pub async fn add_to_library(&self, novel: Novel) -> Result<Novel, LibraryError> {
        let novel_id = novel.id.clone();
        let lock = self.sync_lock(&novel_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.add_locked(novel).await
        };
        self.release_sync_lock(&novel_id, lock).await;
        result
    }

    async fn add_locked(&self, novel: Novel) -> Result<Novel, LibraryError> {
        let id = novel.id.clone();
        let existing = run_blocking(&self.store, move |s| s.get_novel(&id)).await?;

        let mut row = novel;
        if row.category == Category::None {
            row.category = Category::Reading;
        }
        if let Some(existing) = existing {
            row.last_read_chapter_index = existing.last_read_chapter_index;
            row.last_read_scroll_offset = existing.last_read_scroll_offset;
            row.last_read_timestamp = existing.last_read_timestamp;
            row.chapter_count = existing.chapter_count;
            row.author = row.author.or(existing.author);
            row.description = row.description.or(existing.description);
            row.cover_reference = row.cover_reference.or(existing.cover_reference);
        }

        match self.fetch_chapter_index(&row).await {
            Some(index) => {
                let chapters = number_chapters(&row.id, &index.chapters);
                row.chapter_count = chapters.len() as u32;
                row.author = index.author.or(row.author);
                row.description = index.description.or(row.description);

                let to_store = row.clone();
                run_blocking(&self.store, move |s| {
                    s.upsert_novel_with_chapters(&to_store, &chapters)
                })
                .await?;
                metrics::CHAPTER_SYNCS.with_label_values(&["replaced"]).inc();
            }
            None => {
                let id = row.id.clone();
                let stored = run_blocking(&self.store, move |s| s.count_chapters(&id)).await?;
                metrics::CHAPTER_SYNCS.with_label_values(&["kept_existing"]).inc();
                if stored == 0 {
                    warn!(novel_id = %row.id, "No chapter list, novel not added");
                    return Err(LibraryError::SyncFailed(row.id));
                }

                let to_store = row.clone();
                run_blocking(&self.store, move |s| s.upsert_novel(&to_store)).await?;
            }
        }

        info!(
            novel_id = %row.id,
            title = %row.title,
            category = %row.category,
            chapters = row.chapter_count,
            "Added to library"
        );
        self.require_novel(&row.id).await
    }

    /// Move a novel to another category.
    ///
    /// Entering any library category syncs the chapter list; moving back to
    /// `None` keeps chapter data.
    pub async fn set_category(
        &self,
        novel_id: &str,
        category: Category,
    ) -> Result<Novel, LibraryError> {
        let id = novel_id.to_string();
        let novel = run_blocking(&self.store, move |s| s.update_category(&id, category))
            .await?
            .ok_or_else(|| LibraryError::NovelNotFound(novel_id.to_string()))?;
        info!(novel_id, category = %category, "Category changed");

        if category.in_library() {
            self.sync_chapters(&novel).await?;
            return self.require_novel(novel_id).await;
        }
        Ok(novel)
    }

    /// Remove a novel from the reading history.
    ///
    /// A novel outside the library is deleted. A library novel keeps its
    /// row but loses its progress and chapter list, which is synced again
    /// the next time it is read.
    pub async fn remove_from_history(
        &self,
        novel_id: &str,
        tracker: &ProgressTracker,
    ) -> Result<HistoryRemoval, LibraryError> {
        let novel = self.require_novel(novel_id).await?;

        if !novel.in_library() {
            let id = novel_id.to_string();
            run_blocking(&self.store, move |s| s.delete_novel(&id)).await?;
            info!(novel_id, "Removed preview from history");
            return Ok(HistoryRemoval::Deleted);
        }

        tracker.reset_progress(novel_id).await?;

        let lock = self.sync_lock(novel_id).await;
        let deleted = {
            let _guard = lock.lock().await;
            let id = novel_id.to_string();
            run_blocking(&self.store, move |s| s.delete_chapters_for_novel(&id)).await
        };
        self.release_sync_lock(novel_id, lock).await;
        let deleted = deleted?;

        info!(novel_id, chapters = deleted, "Reset novel history");
        Ok(HistoryRemoval::Reset)
    }

    // =========================================================================
    // Chapter sync
    // =========================================================================

    /// Refresh a novel's chapter list from its source.
    ///
    /// On success the stored list is replaced in one transaction and cached
    /// bodies survive where index and URL are unchanged. A missing source, a
    /// source error or an empty list leaves stored data untouched. Syncs of
    /// the same novel never interleave.
    pub async fn sync_chapters(&self, novel: &Novel) -> Result<SyncOutcome, LibraryError> {
        let lock = self.sync_lock(&novel.id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.sync_locked(novel).await
        };
        self.release_sync_lock(&novel.id, lock).await;

        let label = match &outcome {
            Ok(SyncOutcome::Replaced { .. }) => "replaced",
            _ => "kept_existing",
        };
        metrics::CHAPTER_SYNCS.with_label_values(&[label]).inc();
        outcome
    }

    /// Sync a stored novel by id.
    pub async fn sync_novel(&self, novel_id: &str) -> Result<SyncOutcome, LibraryError> {
        let novel = self.require_novel(novel_id).await?;
        self.sync_chapters(&novel).await
    }

    async fn sync_locked(&self, novel: &Novel) -> Result<SyncOutcome, LibraryError> {
        let Some(index) = self.fetch_chapter_index(novel).await else {
            return Ok(SyncOutcome::KeptExisting);
        };

        let chapters = number_chapters(&novel.id, &index.chapters);
        let count = chapters.len();
        let id = novel.id.clone();
        run_blocking(&self.store, move |s| {
            s.replace_chapters_for_novel(&id, &chapters)?;
            s.update_details(
                &id,
                index.author.as_deref(),
                index.description.as_deref(),
                None,
            )
        })
        .await?;

        info!(novel_id = %novel.id, chapters = count, "Chapter list synced");
        Ok(SyncOutcome::Replaced { count })
    }

    /// A non-empty chapter index from the novel's source, or `None`.
    async fn fetch_chapter_index(&self, novel: &Novel) -> Option<ChapterIndex> {
        let Some(source) = self.source_for(novel) else {
            warn!(source = %novel.source_name, novel_id = %novel.id, "No source for novel, keeping chapters");
            return None;
        };

        let index = match metrics::timed_source_request(
            source.name(),
            "chapters",
            source.chapters(novel),
        )
        .await
        {
            Ok(index) => index,
            Err(e) => {
                warn!(novel_id = %novel.id, error = %e, "Chapter sync failed, keeping chapters");
                return None;
            }
        };

        if index.chapters.is_empty() {
            warn!(novel_id = %novel.id, "Source listed no chapters, keeping chapters");
            return None;
        }
        Some(index)
    }

    async fn sync_lock(&self, novel_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.sync_locks.lock().await;
        Arc::clone(locks.entry(novel_id.to_string()).or_default())
    }

    async fn release_sync_lock(&self, novel_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.sync_locks.lock().await;
        // The map and this caller hold the only references
        if Arc::strong_count(&lock) == 2 {
            locks.remove(novel_id);
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_novel(&self, novel_id: &str) -> Result<Option<Novel>, LibraryError> {
        let id = novel_id.to_string();
        Ok(run_blocking(&self.store, move |s| s.get_novel(&id)).await?)
    }

    async fn require_novel(&self, novel_id: &str) -> Result<Novel, LibraryError> {
        self.get_novel(novel_id)
            .await?
            .ok_or_else(|| LibraryError::NovelNotFound(novel_id.to_string()))
    }

    /// Stored chapters of a novel, ordered by index.
    pub async fn chapters(&self, novel_id: &str) -> Result<Vec<Chapter>, LibraryError> {
        let id = novel_id.to_string();
        Ok(run_blocking(&self.store, move |s| s.list_chapters(&id)).await?)
    }

    /// Library and reading history, most recently read first.
    pub async fn library(&self) -> Result<Vec<Novel>, LibraryError> {
        Ok(run_blocking(&self.store, |s| s.list_library()).await?)
    }

    /// Library members whose title contains `query`.
    pub async fn search_library(&self, query: &str) -> Result<Vec<Novel>, LibraryError> {
        let query = query.to_string();
        Ok(run_blocking(&self.store, move |s| s.search_library(&query)).await?)
    }

    /// Remember the novel open in the reader.
    pub async fn mark_active_novel(&self, novel_id: &str) -> Result<(), LibraryError> {
        let id = novel_id.to_string();
        run_blocking(&self.store, move |s| s.set_state(LAST_ACTIVE_NOVEL_KEY, &id)).await?;
        Ok(())
    }

    /// The novel last opened in the reader, if it still exists.
    pub async fn last_active_novel(&self) -> Result<Option<Novel>, LibraryError> {
        let Some(id) = run_blocking(&self.store, |s| s.get_state(LAST_ACTIVE_NOVEL_KEY)).await?
        else {
            return Ok(None);
        };
        self.get_novel(&id).await
    }

    /// Delete previews that were never read.
    pub async fn sweep_stale_previews(&self) -> Result<usize, LibraryError> {
        let count = run_blocking(&self.store, |s| s.sweep_stale_previews()).await?;
        if count > 0 {
            info!(count, "Swept stale previews");
        }
        Ok(count)
    }
}

/// Request one page from one source, logging failures.
async fn search_page(
    source: Arc<dyn NovelSource>,
    query: &str,
    page: u32,
) -> (String, Option<SearchPage>) {
    let name = source.name().to_string();
    match metrics::timed_source_request(&name, "search", source.search(query, page)).await {
        Ok(result) => {
            debug!(source = %name, page, results = result.novels.len(), "Source page loaded");
            (name, Some(result))
        }
        Err(e) => {
            warn!(source = %name, page, error = %e, "Source search failed");
            (name, None)
        }
    }
}

fn collect_pages(query: &str, pages: Vec<(String, Option<SearchPage>)>) -> SearchResults {
    let mut novels = Vec::new();
    let mut cursors = Vec::with_capacity(pages.len());

    for (source, page) in pages {
        let next_page = match page {
            Some(page) => {
                novels.extend(page.novels);
                page.next_page
            }
            None => None,
        };
        cursors.push(SourceCursor { source, next_page });
    }

    SearchResults {
        novels,
        session: SearchSession {
            query: query.to_string(),
            cursors,
        },
    }
}
