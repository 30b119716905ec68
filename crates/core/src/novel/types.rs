//! Types for novels, chapters and reading state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::novel_id;

/// Library shelf a novel sits on.
///
/// `None` means the novel is known (opened from search, or read once) but is
/// not part of the library.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    None,
    Reading,
    OnHold,
    Finished,
}

impl Category {
    /// Database / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::None => "none",
            Category::Reading => "reading",
            Category::OnHold => "on_hold",
            Category::Finished => "finished",
        }
    }

    /// Whether this category places a novel in the library.
    pub fn in_library(&self) -> bool {
        !matches!(self, Category::None)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown category name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category: {}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Category::None),
            "reading" => Ok(Category::Reading),
            "on_hold" => Ok(Category::OnHold),
            "finished" => Ok(Category::Finished),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// A novel tracked by the app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Novel {
    /// Canonical id, derived from `canonical_url`.
    pub id: String,
    pub title: String,
    /// Name of the source adapter this novel came from.
    pub source_name: String,
    pub canonical_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Local path or remote URL of the cover image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_reference: Option<String>,
    #[serde(default)]
    pub category: Category,
    /// Cached chapter count; may lag the source.
    #[serde(default)]
    pub chapter_count: u32,
    /// 1-based index of the last chapter read.
    #[serde(default = "default_chapter_index")]
    pub last_read_chapter_index: u32,
    /// Scroll offset inside the last chapter read.
    #[serde(default)]
    pub last_read_scroll_offset: u32,
    /// Epoch millis of the last progress save, 0 when never read.
    #[serde(default)]
    pub last_read_timestamp: i64,
}

fn default_chapter_index() -> u32 {
    1
}

impl Novel {
    /// Build a preview as returned by a source search.
    ///
    /// The id is derived from the URL, the category is `None` and no
    /// progress is recorded.
    pub fn preview(
        title: impl Into<String>,
        source_name: impl Into<String>,
        canonical_url: impl Into<String>,
    ) -> Self {
        let canonical_url = canonical_url.into();
        Self {
            id: novel_id(&canonical_url),
            title: title.into(),
            source_name: source_name.into(),
            canonical_url,
            author: None,
            description: None,
            cover_reference: None,
            category: Category::None,
            chapter_count: 0,
            last_read_chapter_index: 1,
            last_read_scroll_offset: 0,
            last_read_timestamp: 0,
        }
    }

    /// Set the cover reference.
    pub fn with_cover(mut self, cover: impl Into<String>) -> Self {
        let cover = cover.into();
        self.cover_reference = if cover.is_empty() { None } else { Some(cover) };
        self
    }

    /// Set the cached chapter count.
    pub fn with_chapter_count(mut self, count: u32) -> Self {
        self.chapter_count = count;
        self
    }

    /// Whether the novel is part of the library.
    pub fn in_library(&self) -> bool {
        self.category.in_library()
    }

    /// Previews that were never read are transient and get swept.
    pub fn is_transient_preview(&self) -> bool {
        self.category == Category::None && self.last_read_timestamp == 0
    }
}

/// One chapter of a novel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub novel_id: String,
    /// 1-based ordinal in reading order.
    pub index: u32,
    pub name: String,
    pub source_url: String,
    /// Cached text; absent until downloaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl Chapter {
    /// Whether a non-empty body is cached.
    pub fn has_body(&self) -> bool {
        self.body.as_deref().is_some_and(|b| !b.is_empty())
    }
}

/// A chapter as listed by a source, before it is numbered and stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub name: String,
    pub url: String,
}

impl ChapterEntry {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Number source entries into chapters of `novel_id`, starting at 1.
pub fn number_chapters(novel_id: &str, entries: &[ChapterEntry]) -> Vec<Chapter> {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| Chapter {
            novel_id: novel_id.to_string(),
            index: i as u32 + 1,
            name: entry.name.clone(),
            source_url: entry.url.clone(),
            body: None,
        })
        .collect()
}

/// A chapter as handed to the reader for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterData {
    pub index: u32,
    pub title: String,
    pub body: String,
}

impl ChapterData {
    /// Placeholder for a chapter that could not be loaded.
    pub fn empty(index: u32) -> Self {
        Self {
            index,
            title: String::new(),
            body: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

impl From<&Chapter> for ChapterData {
    fn from(chapter: &Chapter) -> Self {
        Self {
            index: chapter.index,
            title: chapter.name.clone(),
            body: chapter.body.clone().unwrap_or_default(),
        }
    }
}

/// Last known reading position of a novel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingProgress {
    pub chapter_index: u32,
    pub scroll_offset: u32,
}
