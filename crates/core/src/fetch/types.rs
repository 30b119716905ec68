use serde::{Deserialize, Serialize};

use crate::novel::{Chapter, ChapterData};

/// Result of resolving one chapter.
///
/// Failures are values: the reader renders them as an empty chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// Served from the store without network access.
    Cached { chapter: Chapter },
    /// Downloaded from the source and stored.
    Downloaded { chapter: Chapter },
    /// The chapter exists but its body could not be downloaded. Nothing was stored.
    Failed {
        novel_id: String,
        index: u32,
        title: String,
        error: String,
    },
    /// The novel has no chapter at this index, even after a sync.
    NotFound { novel_id: String, index: u32 },
}

impl FetchOutcome {
    /// The resolved chapter, when it has a body.
    pub fn chapter(&self) -> Option<&Chapter> {
        match self {
            FetchOutcome::Cached { chapter } | FetchOutcome::Downloaded { chapter } => {
                Some(chapter)
            }
            _ => None,
        }
    }

    pub fn index(&self) -> u32 {
        match self {
            FetchOutcome::Cached { chapter } | FetchOutcome::Downloaded { chapter } => {
                chapter.index
            }
            FetchOutcome::Failed { index, .. } | FetchOutcome::NotFound { index, .. } => *index,
        }
    }

    /// Whether a body is available.
    pub fn is_loaded(&self) -> bool {
        self.chapter().is_some()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchOutcome::NotFound { .. })
    }

    /// Render data for the reader. Failures produce an empty body.
    pub fn chapter_data(&self) -> ChapterData {
        match self {
            FetchOutcome::Cached { chapter } | FetchOutcome::Downloaded { chapter } => {
                ChapterData::from(chapter)
            }
            FetchOutcome::Failed { index, title, .. } => ChapterData {
                index: *index,
                title: title.clone(),
                body: String::new(),
            },
            FetchOutcome::NotFound { index, .. } => ChapterData::empty(*index),
        }
    }

    /// Metric label for this outcome.
    pub(crate) fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Cached { .. } => "cached",
            FetchOutcome::Downloaded { .. } => "downloaded",
            FetchOutcome::Failed { .. } => "failed",
            FetchOutcome::NotFound { .. } => "not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(body: Option<&str>) -> Chapter {
        Chapter {
            novel_id: "n".to_string(),
            index: 4,
            name: "Chapter 4".to_string(),
            source_url: "https://s/n/chapter-4".to_string(),
            body: body.map(String::from),
        }
    }

    #[test]
    fn test_chapter_data_for_each_outcome() {
        let cached = FetchOutcome::Cached {
            chapter: chapter(Some("text")),
        };
        assert!(cached.is_loaded());
        assert_eq!(cached.chapter_data().body, "text");
        assert_eq!(cached.chapter_data().title, "Chapter 4");

        let failed = FetchOutcome::Failed {
            novel_id: "n".to_string(),
            index: 4,
            title: "Chapter 4".to_string(),
            error: "timeout".to_string(),
        };
        assert!(!failed.is_loaded());
        let data = failed.chapter_data();
        assert_eq!(data.title, "Chapter 4");
        assert!(data.is_empty());

        let missing = FetchOutcome::NotFound {
            novel_id: "n".to_string(),
            index: 99,
        };
        assert!(missing.is_not_found());
        assert_eq!(missing.index(), 99);
        assert_eq!(missing.chapter_data(), ChapterData::empty(99));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = FetchOutcome::NotFound {
            novel_id: "n".to_string(),
            index: 2,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "not_found");
        assert_eq!(json["index"], 2);
    }
}
