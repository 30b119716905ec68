pub mod config;
pub mod fetch;
pub mod library;
pub mod metrics;
pub mod novel;
pub mod progress;
pub mod source;
pub mod store;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    ReaderConfig, ServerConfig, SiteConfig, SourcesConfig,
};
pub use fetch::{ChapterFetchCoordinator, FetchOutcome, ReaderSession};
pub use library::{
    HistoryRemoval, LibraryError, LibraryManager, OpenedPreview, SearchResults, SyncOutcome,
};
pub use novel::{novel_id, Category, Chapter, ChapterData, ChapterEntry, Novel, ReadingProgress};
pub use progress::{create_progress_tracker, ProgressError, ProgressTracker, ProgressWriter};
pub use source::{
    ChapterIndex, NovelSource, SearchPage, SearchSession, SourceError, SourceRegistry,
    SourceSelector,
};
pub use store::{
    observe_chapters, observe_library, observe_novel, LibraryStore, SqliteLibraryStore,
    StoreError, StoreEvent,
};
