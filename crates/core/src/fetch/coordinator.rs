//! Chapter fetch coordinator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::library::LibraryManager;
use crate::metrics;
use crate::novel::Chapter;
use crate::store::{run_blocking, LibraryStore, StoreError};

use super::types::FetchOutcome;

type FetchKey = (String, u32);
type InFlightFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Resolves chapters from the store or the network, one fetch per chapter.
///
/// At most one fetch per `(novel_id, index)` runs at any time; later
/// callers for the same chapter wait for that fetch and receive its
/// outcome. Fetches run as detached tasks, so a caller that goes away does
/// not abort a download or its write.
#[derive(Clone)]
pub struct ChapterFetchCoordinator {
    library: Arc<LibraryManager>,
    in_flight: Arc<Mutex<HashMap<FetchKey, InFlightFetch>>>,
}

impl ChapterFetchCoordinator {
    pub fn new(library: Arc<LibraryManager>) -> Self {
        Self {
            library,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn library(&self) -> &Arc<LibraryManager> {
        &self.library
    }

    /// Resolve a chapter.
    ///
    /// Unless `force_refresh` is set, a cached body is returned without
    /// network access. A missing chapter row triggers a sync first. A
    /// downloaded body is stored only when the download succeeds.
    pub async fn fetch_chapter(
        &self,
        novel_id: &str,
        index: u32,
        force_refresh: bool,
    ) -> FetchOutcome {
        if !force_refresh {
            if let Some(chapter) = cached_chapter(self.library.store(), novel_id, index).await {
                metrics::CHAPTER_FETCHES.with_label_values(&["cached"]).inc();
                debug!(novel_id, index, "Chapter served from cache");
                return FetchOutcome::Cached { chapter };
            }
        }

        let fetch = self.join_or_start(novel_id, index, force_refresh);
        fetch.await
    }

    /// Fetch a chapter in the background to warm the cache.
    ///
    /// Indices outside `1..=chapter_count` are ignored. Joins a fetch of
    /// the same chapter that is already running.
    pub async fn prefetch(&self, novel_id: &str, index: u32) -> Option<JoinHandle<FetchOutcome>> {
        let chapter_count = match self.chapter_count(novel_id).await {
            Ok(Some(count)) => count,
            Ok(None) => return None,
            Err(e) => {
                warn!(novel_id, error = %e, "Prefetch skipped");
                return None;
            }
        };
        if index < 1 || index > chapter_count {
            return None;
        }

        debug!(novel_id, index, "Prefetching chapter");
        let coordinator = self.clone();
        let novel_id = novel_id.to_string();
        Some(tokio::spawn(async move {
            coordinator.fetch_chapter(&novel_id, index, false).await
        }))
    }

    /// Stored chapter count of a novel, `None` if it does not exist.
    pub async fn chapter_count(&self, novel_id: &str) -> Result<Option<u32>, StoreError> {
        let id = novel_id.to_string();
        let novel = run_blocking(self.library.store(), move |s| s.get_novel(&id)).await?;
        Ok(novel.map(|n| n.chapter_count))
    }

    /// Number of fetches currently running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    fn join_or_start(&self, novel_id: &str, index: u32, force_refresh: bool) -> InFlightFetch {
        let key = (novel_id.to_string(), index);
        let mut in_flight = self.in_flight.lock().unwrap();

        if let Some(fetch) = in_flight.get(&key) {
            metrics::CHAPTER_FETCH_JOINS.inc();
            debug!(novel_id, index, "Joining in-flight fetch");
            return fetch.clone();
        }

        // The task removes its own entry, which waits for this lock
        let task = tokio::spawn(run_fetch(
            Arc::clone(&self.library),
            Arc::clone(&self.in_flight),
            key.clone(),
            force_refresh,
        ));

        let novel = novel_id.to_string();
        let fetch = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(novel_id = %novel, index, "Chapter fetch task failed: {}", e);
                    FetchOutcome::Failed {
                        novel_id: novel,
                        index,
                        title: String::new(),
                        error: e.to_string(),
                    }
                }
            }
        }
        .boxed()
        .shared();

        in_flight.insert(key, fetch.clone());
        fetch
    }
}

/// Removes an in-flight entry when its fetch task ends, even by panic.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashMap<FetchKey, InFlightFetch>>>,
    key: FetchKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.key);
        }
    }
}

async fn run_fetch(
    library: Arc<LibraryManager>,
    in_flight: Arc<Mutex<HashMap<FetchKey, InFlightFetch>>>,
    key: FetchKey,
    force_refresh: bool,
) -> FetchOutcome {
    let guard = InFlightGuard { in_flight, key };
    let (novel_id, index) = (&guard.key.0, guard.key.1);
    let outcome = resolve(&library, novel_id, index, force_refresh).await;
    metrics::CHAPTER_FETCHES
        .with_label_values(&[outcome.label()])
        .inc();
    outcome
}

async fn resolve(
    library: &LibraryManager,
    novel_id: &str,
    index: u32,
    force_refresh: bool,
) -> FetchOutcome {
    let store = library.store();

    // A fetch that finished just before this one started may have filled the cache
    if !force_refresh {
        if let Some(chapter) = cached_chapter(store, novel_id, index).await {
            return FetchOutcome::Cached { chapter };
        }
    }

    let mut chapter = stored_chapter(store, novel_id, index).await;
    if chapter.is_none() {
        match library.sync_novel(novel_id).await {
            Ok(outcome) => debug!(novel_id, index, ?outcome, "Synced before fetch"),
            Err(e) => warn!(novel_id, index, error = %e, "Sync before fetch failed"),
        }
        chapter = stored_chapter(store, novel_id, index).await;
    }

    let Some(chapter) = chapter else {
        info!(novel_id, index, "Chapter not found");
        return FetchOutcome::NotFound {
            novel_id: novel_id.to_string(),
            index,
        };
    };

    let failed = |error: String| FetchOutcome::Failed {
        novel_id: novel_id.to_string(),
        index,
        title: chapter.name.clone(),
        error,
    };

    let novel = match library.get_novel(novel_id).await {
        Ok(Some(novel)) => novel,
        Ok(None) => {
            return FetchOutcome::NotFound {
                novel_id: novel_id.to_string(),
                index,
            }
        }
        Err(e) => return failed(e.to_string()),
    };

    let Some(source) = library.source_for(&novel) else {
        warn!(novel_id, source = %novel.source_name, "No source for chapter download");
        return failed(format!("unknown source {}", novel.source_name));
    };

    let body = match metrics::timed_source_request(
        source.name(),
        "chapter_body",
        source.chapter_body(&chapter.source_url),
    )
    .await
    {
        Ok(body) if !body.trim().is_empty() => body,
        Ok(_) => {
            warn!(novel_id, index, "Source returned an empty chapter body");
            return failed("empty chapter body".to_string());
        }
        Err(e) => {
            warn!(novel_id, index, error = %e, "Chapter download failed");
            return failed(e.to_string());
        }
    };

    let id = novel_id.to_string();
    let stored_body = body.clone();
    match run_blocking(store, move |s| s.update_chapter_body(&id, index, &stored_body)).await {
        Ok(true) => debug!(novel_id, index, bytes = body.len(), "Chapter body stored"),
        Ok(false) => warn!(novel_id, index, "Chapter disappeared before its body was stored"),
        Err(e) => warn!(novel_id, index, error = %e, "Failed to store chapter body"),
    }

    FetchOutcome::Downloaded {
        chapter: Chapter {
            body: Some(body),
            ..chapter
        },
    }
}

async fn stored_chapter(
    store: &Arc<dyn LibraryStore>,
    novel_id: &str,
    index: u32,
) -> Option<Chapter> {
    let id = novel_id.to_string();
    match run_blocking(store, move |s| s.get_chapter(&id, index)).await {
        Ok(chapter) => chapter,
        Err(e) => {
            warn!(novel_id, index, error = %e, "Failed to read chapter");
            None
        }
    }
}

async fn cached_chapter(
    store: &Arc<dyn LibraryStore>,
    novel_id: &str,
    index: u32,
) -> Option<Chapter> {
    stored_chapter(store, novel_id, index)
        .await
        .filter(Chapter::has_body)
}
