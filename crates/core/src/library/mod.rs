//! Library management.
//!
//! The [`LibraryManager`] decides when to go to the network and when the
//! local store is enough:
//! - **Search**: fans out to the selected sources, a failing source contributes nothing
//! - **Membership**: category changes, history removal, preview lifecycle
//! - **Sync**: replaces a novel's chapter list atomically, one sync per novel at a time

mod manager;
mod types;

pub use manager::{LibraryManager, LAST_ACTIVE_NOVEL_KEY};
pub use types::{HistoryRemoval, LibraryError, OpenedPreview, SearchResults, SyncOutcome};
