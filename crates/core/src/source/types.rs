//! Types for the novel source abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::novel::{ChapterEntry, Novel};

/// Errors that can occur while talking to a novel source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else {
            SourceError::Http(e.to_string())
        }
    }
}

/// One page of search results from a single source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub novels: Vec<Novel>,
    /// Page to request next, `None` when the source is exhausted.
    pub next_page: Option<u32>,
}

impl SearchPage {
    /// Build a page, reporting a next page whenever this one had results.
    pub fn from_results(novels: Vec<Novel>, page: u32) -> Self {
        let next_page = if novels.is_empty() { None } else { Some(page + 1) };
        Self { novels, next_page }
    }
}

/// Chapter listing of a novel, plus metadata found on the same page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterIndex {
    /// Chapters in reading order.
    pub chapters: Vec<ChapterEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Pagination cursor for one source within a search session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCursor {
    pub source: String,
    pub next_page: Option<u32>,
}

/// Pagination state of a search across sources.
///
/// Sessions are plain values: two clients paginating the same query hold
/// two independent sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSession {
    pub query: String,
    pub cursors: Vec<SourceCursor>,
}

impl SearchSession {
    /// Whether any source reported another page.
    pub fn has_more(&self) -> bool {
        self.cursors.iter().any(|c| c.next_page.is_some())
    }
}

/// Which sources a search should query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum SourceSelector {
    #[default]
    All,
    Named(String),
}

impl SourceSelector {
    /// Label shown for [`SourceSelector::All`] in source pickers.
    pub const ALL_LABEL: &'static str = "All Sources";

    /// Build a selector from an optional source name.
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            None => SourceSelector::All,
            Some(n) if n.is_empty() || n == Self::ALL_LABEL => SourceSelector::All,
            Some(n) => SourceSelector::Named(n.to_string()),
        }
    }

    pub fn matches(&self, source_name: &str) -> bool {
        match self {
            SourceSelector::All => true,
            SourceSelector::Named(name) => name == source_name,
        }
    }
}

/// Capability interface of a novel source.
///
/// Implementations are stateless; pagination state lives in
/// [`SearchSession`] values owned by the caller.
#[async_trait]
pub trait NovelSource: Send + Sync {
    /// Source name, matched exactly against `Novel::source_name`.
    fn name(&self) -> &str;

    /// Search for novels. `page` is 1-based.
    async fn search(&self, query: &str, page: u32) -> Result<SearchPage, SourceError>;

    /// List the chapters of a novel, in reading order.
    async fn chapters(&self, novel: &Novel) -> Result<ChapterIndex, SourceError>;

    /// Fetch the plain-text body of a chapter.
    async fn chapter_body(&self, url: &str) -> Result<String, SourceError>;
}
