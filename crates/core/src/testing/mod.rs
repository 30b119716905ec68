//! Testing utilities and mock implementations.
//!
//! This module provides a scriptable [`MockSource`] and a [`RecordingStore`]
//! wrapper so that library, fetch and progress behavior can be tested
//! without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use atlas_core::testing::{fixtures, MockSource};
//!
//! let source = MockSource::new("Mock");
//! let novel = fixtures::novel("Mock", "Shadow Slave");
//! source.add_novel(&novel, 10).await;
//!
//! // Use in a SourceRegistry...
//! ```

mod mock_source;
mod recording_store;

pub use mock_source::MockSource;
pub use recording_store::RecordingStore;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::novel::{Category, ChapterEntry, Novel};

    /// Lowercase, dash-separated form of a title.
    pub fn slug(text: &str) -> String {
        text.split_whitespace()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join("-")
    }

    /// URL under which `source` publishes `title`.
    pub fn novel_url(source: &str, title: &str) -> String {
        format!("https://{}.test/novel/{}", slug(source), slug(title))
    }

    /// A search-result preview from `source`.
    pub fn novel(source: &str, title: &str) -> Novel {
        Novel::preview(title, source, novel_url(source, title))
    }

    /// A novel already on the given library shelf.
    pub fn library_novel(source: &str, title: &str, category: Category) -> Novel {
        let mut novel = novel(source, title);
        novel.category = category;
        novel
    }

    /// URL of chapter `index` of a novel.
    pub fn chapter_url(novel_url: &str, index: u32) -> String {
        format!("{}/chapter-{}", novel_url.trim_end_matches('/'), index)
    }

    /// Body text served for chapter `index`.
    pub fn chapter_body(index: u32) -> String {
        format!("Text of chapter {}.", index)
    }

    /// `count` chapter entries for a novel, in reading order.
    pub fn chapter_entries(novel_url: &str, count: u32) -> Vec<ChapterEntry> {
        (1..=count)
            .map(|i| ChapterEntry::new(format!("Chapter {}", i), chapter_url(novel_url, i)))
            .collect()
    }
}
