//! Types for the library manager.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::novel::Novel;
use crate::progress::ProgressError;
use crate::source::SearchSession;
use crate::store::StoreError;

/// Errors that can occur in library operations.
///
/// Source failures never appear here: they are logged and turned into
/// soft outcomes by the manager.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Novel not found: {0}")]
    NovelNotFound(String),

    #[error("Chapter list could not be synced for novel {0}")]
    SyncFailed(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Progress error: {0}")]
    Progress(#[from] ProgressError),
}

/// Result of a chapter list sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The stored chapter list was replaced.
    Replaced { count: usize },
    /// The source could not produce a list; stored data is untouched.
    KeptExisting,
}

impl SyncOutcome {
    pub fn is_replaced(&self) -> bool {
        matches!(self, SyncOutcome::Replaced { .. })
    }
}

/// What [`LibraryManager::remove_from_history`](super::LibraryManager::remove_from_history) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRemoval {
    /// The novel was not in the library and has been deleted.
    Deleted,
    /// The novel stays in the library with progress and chapters cleared.
    Reset,
}

/// Search results together with the session used to page further.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub novels: Vec<Novel>,
    pub session: SearchSession,
}

/// A preview opened from a search result.
#[derive(Debug)]
pub struct OpenedPreview {
    /// The stored row (existing or newly inserted).
    pub novel: Novel,
    /// Background details resolution, when one was started.
    pub details: Option<JoinHandle<()>>,
}
