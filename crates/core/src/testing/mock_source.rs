//! Mock novel source for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::novel::{ChapterEntry, Novel};
use crate::source::{ChapterIndex, NovelSource, SearchPage, SourceError};

use super::fixtures;

/// Mock implementation of the NovelSource trait.
///
/// Provides controllable behavior for testing:
/// - Serve configurable search results, chapter lists and bodies
/// - Count calls for assertions
/// - Simulate failures and slow downloads
///
/// # Example
///
/// ```rust,ignore
/// use atlas_core::testing::{MockSource, fixtures};
///
/// let source = MockSource::new("Mock");
/// let novel = fixtures::novel("Mock", "Shadow Slave");
/// source.add_novel(&novel, 5).await;
///
/// let index = source.chapters(&novel).await?;
/// assert_eq!(index.chapters.len(), 5);
/// assert_eq!(source.chapters_calls(), 1);
/// ```
pub struct MockSource {
    name: String,
    /// Novels returned by search, filtered by title.
    novels: RwLock<Vec<Novel>>,
    /// Results per search page.
    page_size: RwLock<usize>,
    /// Chapter indices by novel URL.
    indices: RwLock<HashMap<String, ChapterIndex>>,
    /// Chapter bodies by chapter URL.
    bodies: RwLock<HashMap<String, String>>,
    fail_search: RwLock<bool>,
    fail_chapters: RwLock<bool>,
    fail_bodies: RwLock<bool>,
    /// Simulated download latency for chapter bodies.
    body_delay: RwLock<Duration>,
    search_calls: AtomicUsize,
    chapters_calls: AtomicUsize,
    body_calls: AtomicUsize,
    body_calls_by_url: RwLock<HashMap<String, usize>>,
}

impl std::fmt::Debug for MockSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSource")
            .field("name", &self.name)
            .field("search_calls", &self.search_calls())
            .field("chapters_calls", &self.chapters_calls())
            .field("body_calls", &self.body_calls())
            .finish()
    }
}

impl MockSource {
    /// Create a mock source with no novels.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            novels: RwLock::new(Vec::new()),
            page_size: RwLock::new(20),
            indices: RwLock::new(HashMap::new()),
            bodies: RwLock::new(HashMap::new()),
            fail_search: RwLock::new(false),
            fail_chapters: RwLock::new(false),
            fail_bodies: RwLock::new(false),
            body_delay: RwLock::new(Duration::ZERO),
            search_calls: AtomicUsize::new(0),
            chapters_calls: AtomicUsize::new(0),
            body_calls: AtomicUsize::new(0),
            body_calls_by_url: RwLock::new(HashMap::new()),
        }
    }

    /// Register a novel with `chapter_count` chapters and their bodies.
    ///
    /// The novel becomes searchable and its chapters are served at
    /// [`fixtures::chapter_url`] with [`fixtures::chapter_body`] as text.
    pub async fn add_novel(&self, novel: &Novel, chapter_count: u32) {
        let entries = fixtures::chapter_entries(&novel.canonical_url, chapter_count);
        {
            let mut bodies = self.bodies.write().await;
            for i in 1..=chapter_count {
                bodies.insert(
                    fixtures::chapter_url(&novel.canonical_url, i),
                    fixtures::chapter_body(i),
                );
            }
        }
        self.indices.write().await.insert(
            novel.canonical_url.clone(),
            ChapterIndex {
                chapters: entries,
                author: Some("Mock Author".to_string()),
                description: Some(format!("About {}.", novel.title)),
            },
        );
        self.novels.write().await.push(novel.clone());
    }

    /// Replace the chapter list served for a novel URL.
    pub async fn set_chapters(&self, novel_url: &str, chapters: Vec<ChapterEntry>) {
        let mut indices = self.indices.write().await;
        let index = indices.entry(novel_url.to_string()).or_default();
        index.chapters = chapters;
    }

    /// Set the body served for a chapter URL.
    pub async fn set_body(&self, chapter_url: &str, body: &str) {
        self.bodies
            .write()
            .await
            .insert(chapter_url.to_string(), body.to_string());
    }

    /// Set the novels returned by search.
    pub async fn set_search_results(&self, novels: Vec<Novel>) {
        *self.novels.write().await = novels;
    }

    /// Set how many results each search page holds.
    pub async fn set_page_size(&self, page_size: usize) {
        *self.page_size.write().await = page_size.max(1);
    }

    /// Make every search fail.
    pub async fn set_fail_search(&self, fail: bool) {
        *self.fail_search.write().await = fail;
    }

    /// Make every chapter listing fail.
    pub async fn set_fail_chapters(&self, fail: bool) {
        *self.fail_chapters.write().await = fail;
    }

    /// Make every body download fail.
    pub async fn set_fail_bodies(&self, fail: bool) {
        *self.fail_bodies.write().await = fail;
    }

    /// Delay every body download by `delay`.
    pub async fn set_body_delay(&self, delay: Duration) {
        *self.body_delay.write().await = delay;
    }

    /// Number of searches performed.
    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    /// Number of chapter listings requested.
    pub fn chapters_calls(&self) -> usize {
        self.chapters_calls.load(Ordering::SeqCst)
    }

    /// Number of body downloads requested.
    pub fn body_calls(&self) -> usize {
        self.body_calls.load(Ordering::SeqCst)
    }

    /// Number of body downloads requested for one chapter URL.
    pub async fn body_calls_for(&self, chapter_url: &str) -> usize {
        self.body_calls_by_url
            .read()
            .await
            .get(chapter_url)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl NovelSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, page: u32) -> Result<SearchPage, SourceError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_search.read().await {
            return Err(SourceError::Http("mock search failure".to_string()));
        }

        let query_lower = query.to_lowercase();
        let matches: Vec<Novel> = self
            .novels
            .read()
            .await
            .iter()
            .filter(|n| query_lower.is_empty() || n.title.to_lowercase().contains(&query_lower))
            .cloned()
            .collect();

        let page_size = *self.page_size.read().await;
        let start = (page.max(1) as usize - 1) * page_size;
        let novels: Vec<Novel> = matches.iter().skip(start).take(page_size).cloned().collect();
        let next_page = if start + page_size < matches.len() {
            Some(page + 1)
        } else {
            None
        };

        Ok(SearchPage { novels, next_page })
    }

    async fn chapters(&self, novel: &Novel) -> Result<ChapterIndex, SourceError> {
        self.chapters_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_chapters.read().await {
            return Err(SourceError::Http("mock chapter list failure".to_string()));
        }

        self.indices
            .read()
            .await
            .get(&novel.canonical_url)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(novel.canonical_url.clone()))
    }

    async fn chapter_body(&self, url: &str) -> Result<String, SourceError> {
        self.body_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .body_calls_by_url
            .write()
            .await
            .entry(url.to_string())
            .or_insert(0) += 1;

        let delay = *self.body_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if *self.fail_bodies.read().await {
            return Err(SourceError::Http("mock body failure".to_string()));
        }

        self.bodies
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(url.to_string()))
    }
}
