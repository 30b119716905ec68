use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

use super::ProgressCommand;
use crate::metrics;
use crate::novel::ReadingProgress;
use crate::store::{run_blocking, LibraryStore, StoreError};

/// How long the writer sleeps when nothing is pending.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    progress: ReadingProgress,
    timestamp_ms: i64,
    deadline: Instant,
}

/// Background task that debounces progress updates and writes them to the store
pub struct ProgressWriter {
    rx: mpsc::Receiver<ProgressCommand>,
    store: Arc<dyn LibraryStore>,
    debounce: Duration,
    pending: HashMap<String, PendingWrite>,
}

impl ProgressWriter {
    pub(crate) fn new(
        rx: mpsc::Receiver<ProgressCommand>,
        store: Arc<dyn LibraryStore>,
        debounce: Duration,
    ) -> Self {
        Self {
            rx,
            store,
            debounce,
            pending: HashMap::new(),
        }
    }

    /// Run the writer until every tracker handle is dropped
    ///
    /// Pending positions are written before returning.
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(debounce_ms = self.debounce.as_millis() as u64, "Progress writer started");

        loop {
            let next_deadline = self
                .pending
                .values()
                .map(|p| p.deadline)
                .min()
                .unwrap_or_else(|| Instant::now() + IDLE_WAIT);

            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = sleep_until(next_deadline) => self.write_due().await,
            }
        }

        let remaining = self.pending.len();
        if let Err(e) = self.write_pending(None, "flushed").await {
            error!("Failed to flush progress on shutdown: {}", e);
        }
        info!(flushed = remaining, "Progress writer shutting down");
    }

    async fn handle(&mut self, command: ProgressCommand) {
        match command {
            ProgressCommand::Record {
                novel_id,
                progress,
                timestamp_ms,
            } => {
                // A newer position replaces the pending one and restarts its window
                self.pending.insert(
                    novel_id,
                    PendingWrite {
                        progress,
                        timestamp_ms,
                        deadline: Instant::now() + self.debounce,
                    },
                );
            }
            ProgressCommand::Flush { novel_id, ack } => {
                let result = self.write_pending(novel_id.as_deref(), "flushed").await;
                let _ = ack.send(result);
            }
            ProgressCommand::Reset { novel_id, ack } => {
                self.pending.remove(&novel_id);
                let id = novel_id.clone();
                let result = run_blocking(&self.store, move |s| s.update_progress(&id, 1, 0, 0)).await;
                if result.is_ok() {
                    metrics::PROGRESS_WRITES.with_label_values(&["reset"]).inc();
                    debug!(novel_id = %novel_id, "Progress reset");
                }
                let _ = ack.send(result);
            }
        }
    }

    /// Write every entry whose quiet period has elapsed.
    async fn write_due(&mut self) {
        let now = Instant::now();
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for novel_id in due {
            if let Some(write) = self.pending.remove(&novel_id) {
                if let Err(e) = self.write(&novel_id, write, "debounced").await {
                    error!(novel_id = %novel_id, "Failed to save progress, will retry: {}", e);
                    self.retry_later(novel_id, write);
                }
            }
        }
    }

    /// Queue a failed write again unless a newer position has replaced it.
    fn retry_later(&mut self, novel_id: String, write: PendingWrite) {
        let deadline = Instant::now() + self.debounce;
        self.pending
            .entry(novel_id)
            .or_insert(PendingWrite { deadline, ..write });
    }

    /// Write pending entries immediately: one novel, or all when `novel_id` is `None`.
    async fn write_pending(
        &mut self,
        novel_id: Option<&str>,
        kind: &str,
    ) -> Result<usize, StoreError> {
        let writes: Vec<(String, PendingWrite)> = match novel_id {
            Some(id) => self
                .pending
                .remove(id)
                .map(|w| vec![(id.to_string(), w)])
                .unwrap_or_default(),
            None => self.pending.drain().collect(),
        };

        let mut written = 0;
        let mut first_error = None;
        for (id, write) in writes {
            match self.write(&id, write, kind).await {
                Ok(()) => written += 1,
                Err(e) => {
                    error!(novel_id = %id, "Failed to save progress: {}", e);
                    first_error.get_or_insert(e);
                    self.retry_later(id, write);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    async fn write(&self, novel_id: &str, write: PendingWrite, kind: &str) -> Result<(), StoreError> {
        let id = novel_id.to_string();
        let updated = run_blocking(&self.store, move |s| {
            s.update_progress(
                &id,
                write.progress.chapter_index,
                write.progress.scroll_offset,
                write.timestamp_ms,
            )
        })
        .await?;

        if updated {
            metrics::PROGRESS_WRITES.with_label_values(&[kind]).inc();
            debug!(
                novel_id,
                chapter_index = write.progress.chapter_index,
                scroll_offset = write.progress.scroll_offset,
                kind,
                "Progress saved"
            );
        } else {
            debug!(novel_id, "Progress for unknown novel dropped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::novel::Novel;
    use crate::progress::create_progress_tracker;
    use crate::store::SqliteLibraryStore;
    use crate::testing::RecordingStore;

    fn setup() -> (Arc<RecordingStore>, String) {
        let inner: Arc<dyn LibraryStore> = Arc::new(SqliteLibraryStore::in_memory().unwrap());
        let store = Arc::new(RecordingStore::new(inner));
        let novel = Novel::preview("A", "NovelFire", "https://s/n/1");
        store.upsert_novel(&novel).unwrap();
        (store, novel.id)
    }

    #[tokio::test]
    async fn test_rapid_updates_coalesce_into_one_write() {
        let (store, id) = setup();
        let store_dyn: Arc<dyn LibraryStore> = Arc::clone(&store) as Arc<dyn LibraryStore>;
        let (tracker, writer) = create_progress_tracker(store_dyn, Duration::from_millis(50), 16);
        let writer_handle = tokio::spawn(writer.run());

        tracker.record_progress(&id, 5, 10).await;
        tracker.record_progress(&id, 5, 50).await;
        tracker.record_progress(&id, 5, 120).await;

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.progress_writes(), vec![(id.clone(), 5, 120)]);
        let novel = store.get_novel(&id).unwrap().unwrap();
        assert_eq!(novel.last_read_scroll_offset, 120);
        assert!(novel.last_read_timestamp > 0);

        drop(tracker);
        writer_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_nothing_written_before_quiet_period() {
        let (store, id) = setup();
        let store_dyn: Arc<dyn LibraryStore> = Arc::clone(&store) as Arc<dyn LibraryStore>;
        let (tracker, writer) = create_progress_tracker(store_dyn, Duration::from_millis(500), 16);
        let writer_handle = tokio::spawn(writer.run());

        tracker.record_progress(&id, 2, 30).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.progress_writes().is_empty());

        drop(tracker);
        writer_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_novel_writes_immediately() {
        let (store, id) = setup();
        let store_dyn: Arc<dyn LibraryStore> = Arc::clone(&store) as Arc<dyn LibraryStore>;
        let (tracker, writer) =
            create_progress_tracker(store_dyn, Duration::from_secs(10), 16);
        let writer_handle = tokio::spawn(writer.run());

        tracker.record_progress(&id, 7, 300).await;
        assert!(tracker.flush_novel(&id).await.unwrap());
        assert_eq!(store.progress_writes(), vec![(id.clone(), 7, 300)]);
        assert!(tracker.current(&id).is_none());

        // Nothing left to flush
        assert!(!tracker.flush_novel(&id).await.unwrap());

        drop(tracker);
        writer_handle.await.unwrap();
        assert_eq!(store.progress_writes().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending() {
        let (store, id) = setup();
        let store_dyn: Arc<dyn LibraryStore> = Arc::clone(&store) as Arc<dyn LibraryStore>;
        let (tracker, writer) =
            create_progress_tracker(store_dyn, Duration::from_secs(10), 16);
        let writer_handle = tokio::spawn(writer.run());

        tracker.record_progress(&id, 3, 42).await;
        drop(tracker);
        writer_handle.await.unwrap();

        let novel = store.get_novel(&id).unwrap().unwrap();
        assert_eq!(novel.last_read_chapter_index, 3);
        assert_eq!(novel.last_read_scroll_offset, 42);
    }

    #[tokio::test]
    async fn test_failed_write_is_retried() {
        let (store, id) = setup();
        let store_dyn: Arc<dyn LibraryStore> = Arc::clone(&store) as Arc<dyn LibraryStore>;
        let (tracker, writer) = create_progress_tracker(store_dyn, Duration::from_millis(50), 16);
        let writer_handle = tokio::spawn(writer.run());

        store.set_fail_progress(true);
        tracker.record_progress(&id, 4, 80).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(store.progress_writes().is_empty());

        store.set_fail_progress(false);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(store.progress_writes(), vec![(id.clone(), 4, 80)]);

        drop(tracker);
        writer_handle.await.unwrap();
        assert_eq!(store.progress_writes().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_position_pending() {
        let (store, id) = setup();
        let store_dyn: Arc<dyn LibraryStore> = Arc::clone(&store) as Arc<dyn LibraryStore>;
        let (tracker, writer) = create_progress_tracker(store_dyn, Duration::from_secs(10), 16);
        let writer_handle = tokio::spawn(writer.run());

        tracker.record_progress(&id, 6, 15).await;
        store.set_fail_progress(true);
        assert!(tracker.flush_novel(&id).await.is_err());

        store.set_fail_progress(false);
        assert!(tracker.flush_novel(&id).await.unwrap());
        assert_eq!(store.progress_writes(), vec![(id.clone(), 6, 15)]);

        drop(tracker);
        writer_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_discards_pending_write() {
        let (store, id) = setup();
        let store_dyn: Arc<dyn LibraryStore> = Arc::clone(&store) as Arc<dyn LibraryStore>;
        let (tracker, writer) = create_progress_tracker(store_dyn, Duration::from_millis(50), 16);
        let writer_handle = tokio::spawn(writer.run());

        tracker.record_progress(&id, 9, 900).await;
        assert!(tracker.reset_progress(&id).await.unwrap());
        tokio::time::sleep(Duration::from_millis(150)).await;

        let novel = store.get_novel(&id).unwrap().unwrap();
        assert_eq!(novel.last_read_chapter_index, 1);
        assert_eq!(novel.last_read_scroll_offset, 0);
        assert_eq!(novel.last_read_timestamp, 0);
        assert!(tracker.current(&id).is_none());

        drop(tracker);
        writer_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_novels_are_debounced_independently() {
        let (store, id) = setup();
        let other = Novel::preview("B", "NovelFire", "https://s/n/2");
        store.upsert_novel(&other).unwrap();
        let store_dyn: Arc<dyn LibraryStore> = Arc::clone(&store) as Arc<dyn LibraryStore>;
        let (tracker, writer) = create_progress_tracker(store_dyn, Duration::from_millis(50), 16);
        let writer_handle = tokio::spawn(writer.run());

        tracker.record_progress(&id, 1, 10).await;
        tracker.record_progress(&other.id, 4, 20).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut writes = store.progress_writes();
        writes.sort();
        let mut expected = vec![(id.clone(), 1, 10), (other.id.clone(), 4, 20)];
        expected.sort();
        assert_eq!(writes, expected);

        drop(tracker);
        writer_handle.await.unwrap();
    }
}
