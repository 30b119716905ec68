//! Library lifecycle integration tests.
//!
//! These tests drive the library manager against an on-disk SQLite store:
//! preview -> library -> sync -> history removal -> startup sweep

use std::sync::Arc;

use tempfile::TempDir;

use atlas_core::{
    testing::{fixtures, MockSource, RecordingStore},
    Category, HistoryRemoval, LibraryError, LibraryManager, LibraryStore, NovelSource,
    SourceRegistry, SourceSelector, SqliteLibraryStore, SyncOutcome,
};

const SOURCE: &str = "Mock";

/// Test helper wiring a manager to a mock source and a recording store.
struct TestHarness {
    library: Arc<LibraryManager>,
    source: Arc<MockSource>,
    store: Arc<RecordingStore>,
    db_path: std::path::PathBuf,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let sqlite: Arc<dyn LibraryStore> =
            Arc::new(SqliteLibraryStore::new(&db_path).expect("Failed to create store"));
        let store = Arc::new(RecordingStore::new(sqlite));
        let source = Arc::new(MockSource::new(SOURCE));

        let registry = SourceRegistry::new(vec![Arc::clone(&source) as Arc<dyn NovelSource>]);
        let library = Arc::new(LibraryManager::new(
            Arc::clone(&store) as Arc<dyn LibraryStore>,
            registry,
        ));

        Self {
            library,
            source,
            store,
            db_path,
            _temp_dir: temp_dir,
        }
    }
}

#[tokio::test]
async fn test_search_open_preview_add_to_library() {
    let harness = TestHarness::new();
    let novel = fixtures::novel(SOURCE, "Shadow Slave");
    harness.source.add_novel(&novel, 6).await;

    let results = harness
        .library
        .search("shadow", &SourceSelector::All)
        .await;
    assert_eq!(results.novels.len(), 1);
    let found = results.novels[0].clone();
    assert_eq!(found.id, novel.id);

    let opened = harness.library.open_preview(found.clone()).await.unwrap();
    assert_eq!(opened.novel.category, Category::None);
    if let Some(details) = opened.details {
        details.await.unwrap();
    }
    let stored = harness.library.get_novel(&novel.id).await.unwrap().unwrap();
    assert_eq!(stored.author.as_deref(), Some("Mock Author"));

    // Previews are not part of the library
    assert!(harness.library.library().await.unwrap().is_empty());

    let added = harness.library.add_to_library(found).await.unwrap();
    assert_eq!(added.category, Category::Reading);
    assert_eq!(added.chapter_count, 6);

    let chapters = harness.library.chapters(&novel.id).await.unwrap();
    assert_eq!(chapters.len(), 6);
    assert!(chapters
        .iter()
        .enumerate()
        .all(|(i, c)| c.index == i as u32 + 1));

    assert_eq!(
        harness.store.chapter_replacements(),
        vec![(novel.id.clone(), 6)]
    );
}

#[tokio::test]
async fn test_failed_add_leaves_preview_out_of_library() {
    let harness = TestHarness::new();
    let novel = fixtures::novel(SOURCE, "Shadow Slave");
    harness.source.add_novel(&novel, 5).await;
    let opened = harness.library.open_preview(novel.clone()).await.unwrap();
    if let Some(details) = opened.details {
        details.await.unwrap();
    }

    harness.source.set_fail_chapters(true).await;
    let result = harness.library.add_to_library(novel.clone()).await;
    assert!(matches!(result, Err(LibraryError::SyncFailed(_))));

    let stored = harness.library.get_novel(&novel.id).await.unwrap().unwrap();
    assert_eq!(stored.category, Category::None);
    assert!(harness.library.library().await.unwrap().is_empty());
    assert!(harness.store.chapter_replacements().is_empty());

    // A later attempt succeeds in one write
    harness.source.set_fail_chapters(false).await;
    let added = harness.library.add_to_library(novel.clone()).await.unwrap();
    assert_eq!(added.category, Category::Reading);
    assert_eq!(
        harness.store.chapter_replacements(),
        vec![(novel.id.clone(), 5)]
    );
}

#[tokio::test]
async fn test_failed_sync_keeps_existing_chapters() {
    let harness = TestHarness::new();
    let novel = fixtures::novel(SOURCE, "Lord of Mysteries");
    harness.source.add_novel(&novel, 3).await;
    harness.library.add_to_library(novel.clone()).await.unwrap();

    harness.source.set_fail_chapters(true).await;
    let outcome = harness.library.sync_novel(&novel.id).await.unwrap();
    assert_eq!(outcome, SyncOutcome::KeptExisting);

    let chapters = harness.library.chapters(&novel.id).await.unwrap();
    assert_eq!(chapters.len(), 3);
}

#[tokio::test]
async fn test_failed_store_write_leaves_no_partial_list() {
    let harness = TestHarness::new();
    let novel = fixtures::library_novel(SOURCE, "Reverend Insanity", Category::Reading);
    harness.source.add_novel(&novel, 4).await;
    harness.store.upsert_novel(&novel).unwrap();

    harness.store.set_fail_replace(true);
    let result = harness.library.sync_chapters(&novel).await;
    assert!(matches!(result, Err(LibraryError::Store(_))));

    // First-ever sync failed: still no chapters at all
    assert!(harness.library.chapters(&novel.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resync_preserves_cached_bodies() {
    let harness = TestHarness::new();
    let novel = fixtures::novel(SOURCE, "Omniscient Reader");
    harness.source.add_novel(&novel, 2).await;
    harness.library.add_to_library(novel.clone()).await.unwrap();

    harness
        .store
        .update_chapter_body(&novel.id, 1, "Cached text.")
        .unwrap();

    // The source grows by one chapter
    harness
        .source
        .set_chapters(
            &novel.canonical_url,
            fixtures::chapter_entries(&novel.canonical_url, 3),
        )
        .await;
    let outcome = harness.library.sync_novel(&novel.id).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Replaced { count: 3 });

    let chapters = harness.library.chapters(&novel.id).await.unwrap();
    assert_eq!(chapters.len(), 3);
    assert_eq!(chapters[0].body.as_deref(), Some("Cached text."));
    assert!(chapters[2].body.is_none());
}

#[tokio::test]
async fn test_history_removal_of_library_novel_resets() {
    let harness = TestHarness::new();
    let novel = fixtures::novel(SOURCE, "Shadow Slave");
    harness.source.add_novel(&novel, 3).await;
    harness.library.add_to_library(novel.clone()).await.unwrap();
    harness.store.update_progress(&novel.id, 3, 40, 1_000).unwrap();

    let (tracker, writer) = atlas_core::create_progress_tracker(
        Arc::clone(&harness.store) as Arc<dyn LibraryStore>,
        std::time::Duration::from_millis(20),
        16,
    );
    let writer_handle = tokio::spawn(writer.run());

    let removal = harness
        .library
        .remove_from_history(&novel.id, &tracker)
        .await
        .unwrap();
    assert_eq!(removal, HistoryRemoval::Reset);

    let stored = harness.library.get_novel(&novel.id).await.unwrap().unwrap();
    assert_eq!(stored.category, Category::Reading);
    assert_eq!(stored.last_read_chapter_index, 1);
    assert_eq!(stored.last_read_scroll_offset, 0);
    assert_eq!(stored.last_read_timestamp, 0);
    assert!(harness.library.chapters(&novel.id).await.unwrap().is_empty());

    drop(tracker);
    writer_handle.await.unwrap();
}

#[tokio::test]
async fn test_stale_previews_are_swept_on_restart() {
    let harness = TestHarness::new();
    let preview = fixtures::novel(SOURCE, "Forgotten Preview");
    let read_preview = fixtures::novel(SOURCE, "Read Preview");
    harness.source.add_novel(&preview, 1).await;
    harness.source.add_novel(&read_preview, 1).await;

    harness.library.open_preview(preview.clone()).await.unwrap();
    harness
        .library
        .open_preview(read_preview.clone())
        .await
        .unwrap();
    harness
        .store
        .update_progress(&read_preview.id, 1, 0, 5_000)
        .unwrap();

    // A new process opening the same database
    let reopened: Arc<dyn LibraryStore> =
        Arc::new(SqliteLibraryStore::new(&harness.db_path).unwrap());
    let library = LibraryManager::new(Arc::clone(&reopened), SourceRegistry::default());

    assert_eq!(library.sweep_stale_previews().await.unwrap(), 1);
    assert!(library.get_novel(&preview.id).await.unwrap().is_none());

    let history = library.library().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, read_preview.id);
}
