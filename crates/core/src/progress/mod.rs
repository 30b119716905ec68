//! Reading progress tracking.
//!
//! [`ProgressTracker`] is a cheap, cloneable handle that keeps the latest
//! reading position of each novel in memory and forwards it to a background
//! [`ProgressWriter`]. The writer debounces durable writes per novel: a burst
//! of scroll events becomes one database write, issued once the novel has
//! been quiet for the debounce window. Explicit flushes and shutdown write
//! whatever is pending immediately.

mod handle;
mod writer;

pub use handle::ProgressTracker;
pub use writer::ProgressWriter;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::novel::ReadingProgress;
use crate::store::{LibraryStore, StoreError};

/// Errors returned by progress operations that wait for the writer.
#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("Progress writer is not running")]
    WriterClosed,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Messages from the handle to the writer.
#[derive(Debug)]
pub(crate) enum ProgressCommand {
    /// Schedule a debounced write.
    Record {
        novel_id: String,
        progress: ReadingProgress,
        timestamp_ms: i64,
    },
    /// Write pending progress now, for one novel or for all of them.
    Flush {
        novel_id: Option<String>,
        ack: oneshot::Sender<Result<usize, StoreError>>,
    },
    /// Drop pending progress and reset the stored position.
    Reset {
        novel_id: String,
        ack: oneshot::Sender<Result<bool, StoreError>>,
    },
}

/// Create a complete progress tracking system.
///
/// Returns:
/// - `ProgressTracker` - clone this to share across tasks
/// - `ProgressWriter` - spawn this as a background task with `tokio::spawn(writer.run())`
///
/// The writer exits, after writing everything still pending, once every
/// tracker clone has been dropped.
pub fn create_progress_tracker(
    store: Arc<dyn LibraryStore>,
    debounce: Duration,
    buffer_size: usize,
) -> (ProgressTracker, ProgressWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let tracker = ProgressTracker::new(tx);
    let writer = ProgressWriter::new(rx, store, debounce);
    (tracker, writer)
}
