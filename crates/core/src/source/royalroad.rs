//! Royal Road source.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::novel::{ChapterEntry, Novel};

use super::html::{
    absolutize, element_text, first_attr, first_text, is_hidden, parse_count, selector,
    visible_text,
};
use super::http::SourceClient;
use super::{ChapterIndex, NovelSource, SearchPage, SourceError};

pub const NAME: &str = "Royal Road";
pub const DEFAULT_BASE_URL: &str = "https://www.royalroad.com";

static FICTION_ITEM: Lazy<Selector> = Lazy::new(|| selector(".fiction-list-item"));
static FICTION_TITLE: Lazy<Selector> = Lazy::new(|| selector("h2.fiction-title a"));
static IMAGE: Lazy<Selector> = Lazy::new(|| selector("img"));
static CHAPTER_STAT: Lazy<Selector> =
    Lazy::new(|| selector("div.row.stats > div:nth-of-type(5) span"));
static AUTHOR: Lazy<Selector> = Lazy::new(|| selector("div.fic-title h4 span a"));
static DESCRIPTION: Lazy<Selector> = Lazy::new(|| selector("div.description"));
static CHAPTER_ROW: Lazy<Selector> = Lazy::new(|| selector("#chapters tbody tr"));
static CHAPTER_LINK: Lazy<Selector> = Lazy::new(|| selector("td a"));
static CHAPTER_INNER: Lazy<Selector> = Lazy::new(|| selector(".chapter-inner"));

/// Royal Road scraper.
pub struct RoyalRoadSource {
    client: SourceClient,
    base_url: String,
}

impl RoyalRoadSource {
    pub fn new(client: SourceClient, base_url: Option<&str>) -> Self {
        Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

#[async_trait]
impl NovelSource for RoyalRoadSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn search(&self, query: &str, page: u32) -> Result<SearchPage, SourceError> {
        let url = format!("{}/fictions/search", self.base_url);
        let page_param = page.to_string();
        let html = self
            .client
            .get_html(&url, &[("title", query), ("page", &page_param)], None)
            .await?;

        let novels = parse_search_results(&html, &self.base_url);
        debug!(query, page, count = novels.len(), "Royal Road search");
        Ok(SearchPage::from_results(novels, page))
    }

    async fn chapters(&self, novel: &Novel) -> Result<ChapterIndex, SourceError> {
        let html = self.client.get_html(&novel.canonical_url, &[], None).await?;
        Ok(parse_fiction_page(&html, &self.base_url))
    }

    async fn chapter_body(&self, url: &str) -> Result<String, SourceError> {
        let html = self.client.get_html(url, &[], None).await?;
        parse_chapter_body(&html)
    }
}

/// Parse the fiction cards of a search results page.
pub fn parse_search_results(html: &str, base_url: &str) -> Vec<Novel> {
    let doc = Html::parse_document(html);
    let mut novels = Vec::new();

    for item in doc.select(&FICTION_ITEM) {
        let Some(link) = item.select(&FICTION_TITLE).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };

        let title = first_text(item, &FICTION_TITLE).unwrap_or_else(|| "Unknown".to_string());
        let cover = first_attr(item, &IMAGE, "src")
            .map(|src| absolutize(base_url, &src))
            .unwrap_or_default();
        let chapter_count = first_text(item, &CHAPTER_STAT)
            .and_then(|t| parse_count(&t))
            .unwrap_or(0);

        novels.push(
            Novel::preview(title, NAME, absolutize(base_url, href))
                .with_cover(cover)
                .with_chapter_count(chapter_count),
        );
    }

    novels
}

/// Parse a fiction page into its chapter index.
pub fn parse_fiction_page(html: &str, base_url: &str) -> ChapterIndex {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let chapters = doc
        .select(&CHAPTER_ROW)
        .filter_map(|row| row.select(&CHAPTER_LINK).next())
        .filter_map(|link| {
            let href = link.value().attr("href")?;
            let name = element_text(link);
            let name = if name.is_empty() {
                "Unknown Chapter".to_string()
            } else {
                name
            };
            Some(ChapterEntry::new(name, absolutize(base_url, href)))
        })
        .collect();

    ChapterIndex {
        chapters,
        author: first_text(root, &AUTHOR),
        description: first_text(root, &DESCRIPTION),
    }
}

/// Extract the readable text of a chapter page, one line per block.
pub fn parse_chapter_body(html: &str) -> Result<String, SourceError> {
    let doc = Html::parse_document(html);
    let content = doc
        .select(&CHAPTER_INNER)
        .next()
        .ok_or_else(|| SourceError::Parse("chapter page has no .chapter-inner".to_string()))?;

    let lines: Vec<String> = content
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| !is_hidden(child, None))
        .map(|child| visible_text(child, None))
        .filter(|line| !line.is_empty())
        .collect();

    let body = if lines.is_empty() {
        visible_text(content, None)
    } else {
        lines.join("\n")
    };

    if body.is_empty() {
        return Err(SourceError::Parse("chapter content is empty".to_string()));
    }
    Ok(body)
}
