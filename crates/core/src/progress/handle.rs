use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use super::{ProgressCommand, ProgressError};
use crate::novel::ReadingProgress;

/// Handle for recording reading progress
///
/// This is cheaply cloneable and can be shared across tasks.
#[derive(Clone)]
pub struct ProgressTracker {
    tx: mpsc::Sender<ProgressCommand>,
    current: Arc<Mutex<HashMap<String, ReadingProgress>>>,
}

impl ProgressTracker {
    pub(crate) fn new(tx: mpsc::Sender<ProgressCommand>) -> Self {
        Self {
            tx,
            current: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record the reader's position.
    ///
    /// The in-memory position is updated immediately; the durable write is
    /// debounced by the writer. If the writer is gone the error is logged
    /// but the caller is not failed.
    pub async fn record_progress(&self, novel_id: &str, chapter_index: u32, scroll_offset: u32) {
        let progress = ReadingProgress {
            chapter_index,
            scroll_offset,
        };
        self.current
            .lock()
            .unwrap()
            .insert(novel_id.to_string(), progress);

        let command = ProgressCommand::Record {
            novel_id: novel_id.to_string(),
            progress,
            timestamp_ms: Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.tx.send(command).await {
            tracing::error!(novel_id, "Failed to record progress: {}", e);
        }
    }

    /// Latest position recorded through this tracker, if any.
    pub fn current(&self, novel_id: &str) -> Option<ReadingProgress> {
        self.current.lock().unwrap().get(novel_id).copied()
    }

    /// Write the pending position of one novel now.
    ///
    /// Returns `true` if there was something to write. Called when the
    /// reader is closed so that no progress is lost to the debounce window.
    /// The in-memory position is forgotten once it is stored.
    pub async fn flush_novel(&self, novel_id: &str) -> Result<bool, ProgressError> {
        let flushed = self.current(novel_id);
        let written = self.flush_inner(Some(novel_id.to_string())).await?;

        let mut current = self.current.lock().unwrap();
        // A position recorded during the flush is still pending
        if flushed.is_some() && current.get(novel_id).copied() == flushed {
            current.remove(novel_id);
        }
        Ok(written > 0)
    }

    /// Write every pending position now. Returns the number written.
    pub async fn flush(&self) -> Result<usize, ProgressError> {
        let flushed = self.current.lock().unwrap().clone();
        let written = self.flush_inner(None).await?;

        self.current
            .lock()
            .unwrap()
            .retain(|id, progress| flushed.get(id) != Some(&*progress));
        Ok(written)
    }

    async fn flush_inner(&self, novel_id: Option<String>) -> Result<usize, ProgressError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(ProgressCommand::Flush { novel_id, ack })
            .await
            .map_err(|_| ProgressError::WriterClosed)?;
        Ok(done.await.map_err(|_| ProgressError::WriterClosed)??)
    }

    /// Reset a novel to chapter 1, offset 0, never read.
    ///
    /// Any pending debounced write for the novel is discarded first so it
    /// cannot overwrite the reset. Returns `false` if the novel does not exist.
    pub async fn reset_progress(&self, novel_id: &str) -> Result<bool, ProgressError> {
        self.current.lock().unwrap().remove(novel_id);

        let (ack, done) = oneshot::channel();
        self.tx
            .send(ProgressCommand::Reset {
                novel_id: novel_id.to_string(),
                ack,
            })
            .await
            .map_err(|_| ProgressError::WriterClosed)?;
        Ok(done.await.map_err(|_| ProgressError::WriterClosed)??)
    }
}
