//! Live-updating views over the store.
//!
//! Each view runs one query up front and re-runs it whenever a relevant
//! [`StoreEvent`] arrives. The refresh task stops once every receiver has
//! been dropped.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{run_blocking, LibraryStore, StoreError, StoreEvent};
use crate::novel::{Chapter, Novel};

/// Observe the library: every non-transient novel, most recently read first.
pub async fn observe_library(
    store: &Arc<dyn LibraryStore>,
) -> Result<watch::Receiver<Vec<Novel>>, StoreError> {
    observe(
        store,
        |event| !matches!(event, StoreEvent::ChaptersChanged { .. }),
        |s| s.list_library(),
    )
    .await
}

/// Observe a single novel. The value becomes `None` when the novel is deleted.
pub async fn observe_novel(
    store: &Arc<dyn LibraryStore>,
    novel_id: &str,
) -> Result<watch::Receiver<Option<Novel>>, StoreError> {
    let watched = novel_id.to_string();
    let id = novel_id.to_string();
    observe(
        store,
        move |event| match event {
            StoreEvent::NovelChanged { novel_id } | StoreEvent::NovelDeleted { novel_id } => {
                *novel_id == watched
            }
            StoreEvent::ChaptersChanged { .. } => false,
            StoreEvent::PreviewsSwept { .. } => true,
        },
        move |s| s.get_novel(&id),
    )
    .await
}

/// Observe the chapter list of a novel, ordered by index.
pub async fn observe_chapters(
    store: &Arc<dyn LibraryStore>,
    novel_id: &str,
) -> Result<watch::Receiver<Vec<Chapter>>, StoreError> {
    let watched = novel_id.to_string();
    let id = novel_id.to_string();
    observe(
        store,
        move |event| match event {
            StoreEvent::ChaptersChanged { novel_id } | StoreEvent::NovelDeleted { novel_id } => {
                *novel_id == watched
            }
            StoreEvent::NovelChanged { .. } => false,
            StoreEvent::PreviewsSwept { .. } => true,
        },
        move |s| s.list_chapters(&id),
    )
    .await
}

async fn observe<T, R, Q>(
    store: &Arc<dyn LibraryStore>,
    relevant: R,
    query: Q,
) -> Result<watch::Receiver<T>, StoreError>
where
    T: Send + Sync + 'static,
    R: Fn(&StoreEvent) -> bool + Send + 'static,
    Q: Fn(&dyn LibraryStore) -> Result<T, StoreError> + Send + Sync + 'static,
{
    // Subscribe before the first query so no write can slip in between
    let mut events = store.subscribe();
    let query = Arc::new(query);

    let initial = {
        let query = Arc::clone(&query);
        run_blocking(store, move |s| (*query)(s)).await?
    };
    let (tx, rx) = watch::channel(initial);
    let store = Arc::clone(store);

    tokio::spawn(async move {
        loop {
            let refresh = tokio::select! {
                _ = tx.closed() => break,
                event = events.recv() => match event {
                    Ok(event) => relevant(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "View lagged behind store events, refreshing");
                        true
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            if !refresh {
                continue;
            }

            let query = Arc::clone(&query);
            match run_blocking(&store, move |s| (*query)(s)).await {
                Ok(value) => {
                    if tx.send(value).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Failed to refresh observed view"),
            }
        }
    });

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::novel::{number_chapters, Category, ChapterEntry};
    use crate::store::SqliteLibraryStore;
    use std::time::Duration;

    fn create_store() -> Arc<dyn LibraryStore> {
        Arc::new(SqliteLibraryStore::in_memory().unwrap())
    }

    async fn next_change<T>(rx: &mut watch::Receiver<T>) {
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("view did not update")
            .expect("view task ended");
    }

    #[tokio::test]
    async fn test_observe_library_updates_on_category_change() {
        let store = create_store();
        let novel = Novel::preview("A", "NovelFire", "https://s/n/1");
        store.upsert_novel(&novel).unwrap();

        let mut rx = observe_library(&store).await.unwrap();
        assert!(rx.borrow().is_empty(), "previews are not part of the library");

        store.update_category(&novel.id, Category::Reading).unwrap();
        next_change(&mut rx).await;
        assert_eq!(rx.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_observe_novel_reports_deletion() {
        let store = create_store();
        let novel = Novel::preview("A", "NovelFire", "https://s/n/1");
        store.upsert_novel(&novel).unwrap();

        let mut rx = observe_novel(&store, &novel.id).await.unwrap();
        assert!(rx.borrow().is_some());

        store.delete_novel(&novel.id).unwrap();
        next_change(&mut rx).await;
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn test_observe_chapters_follows_replacement() {
        let store = create_store();
        let novel = Novel::preview("A", "NovelFire", "https://s/n/1");
        store.upsert_novel(&novel).unwrap();

        let mut rx = observe_chapters(&store, &novel.id).await.unwrap();
        assert!(rx.borrow().is_empty());

        let entries = vec![
            ChapterEntry::new("One", "https://s/c/1"),
            ChapterEntry::new("Two", "https://s/c/2"),
        ];
        store
            .replace_chapters_for_novel(&novel.id, &number_chapters(&novel.id, &entries))
            .unwrap();
        next_change(&mut rx).await;

        let indices: Vec<u32> = rx.borrow().iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2]);
    }
}
