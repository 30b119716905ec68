//! Chapter fetching for the reader.
//!
//! The [`ChapterFetchCoordinator`] is the single place chapter bodies are
//! downloaded. It serves cached bodies, syncs a chapter list that is missing,
//! and guarantees at most one download per chapter at a time.
//! [`ReaderSession`] keeps the window of loaded chapters and applies the
//! scroll and refresh policy on top of it.

mod coordinator;
mod types;
mod window;

pub use coordinator::ChapterFetchCoordinator;
pub use types::FetchOutcome;
pub use window::ReaderSession;
