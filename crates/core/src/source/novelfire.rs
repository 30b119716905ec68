//! NovelFire source.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::novel::{ChapterEntry, Novel};

use super::html::{
    absolutize, first_attr, first_text, fragment_text, hidden_rule_selector, parse_count,
    selector, visible_paragraphs,
};
use super::http::SourceClient;
use super::{ChapterIndex, NovelSource, SearchPage, SourceError};

pub const NAME: &str = "NovelFire";
pub const DEFAULT_BASE_URL: &str = "https://novelfire.net";

static NOVEL_ITEM: Lazy<Selector> = Lazy::new(|| selector(".novel-item"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a"));
static NOVEL_TITLE: Lazy<Selector> = Lazy::new(|| selector(".novel-title, h4"));
static IMAGE: Lazy<Selector> = Lazy::new(|| selector("img"));
static NOVEL_STATS: Lazy<Selector> = Lazy::new(|| selector(".novel-stats span"));
static AUTHOR: Lazy<Selector> = Lazy::new(|| selector("div.author a span"));
static SUMMARY: Lazy<Selector> = Lazy::new(|| selector("div.summary div.content"));
static CSRF_TOKEN: Lazy<Selector> = Lazy::new(|| selector("meta[name=csrf-token]"));
static NOVEL_REPORT: Lazy<Selector> = Lazy::new(|| selector("#novel-report"));
static CONTENT: Lazy<Selector> = Lazy::new(|| selector("#content"));

/// Data scraped from a novel's landing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NovelPage {
    pub author: Option<String>,
    pub description: Option<String>,
    pub csrf_token: Option<String>,
    pub post_id: Option<String>,
}

/// NovelFire scraper.
///
/// The chapter list is not in the novel page itself; it comes from an AJAX
/// endpoint that needs the page's CSRF token and post id.
pub struct NovelFireSource {
    client: SourceClient,
    base_url: String,
}

impl NovelFireSource {
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
impl NovelSource for NovelFireSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn search(&self, query: &str, page: u32) -> Result<SearchPage, SourceError> {
        let url = format!("{}/search", self.base_url);
        let page_param = page.to_string();
        let html = self
            .client
            .get_html(
                &url,
                &[("keyword", query), ("page", &page_param)],
                Some(&self.base_url),
            )
            .await?;

        let novels = parse_search_results(&html, &self.base_url);
        debug!(query, page, count = novels.len(), "NovelFire search");
        Ok(SearchPage::from_results(novels, page))
    }

    async fn chapters(&self, novel: &Novel) -> Result<ChapterIndex, SourceError> {
        let html = self
            .client
            .get_html(&novel.canonical_url, &[], Some(&self.base_url))
            .await?;
        let page = parse_novel_page(&html);

        let (csrf_token, post_id) = match (&page.csrf_token, &page.post_id) {
            (Some(token), Some(id)) => (token.as_str(), id.as_str()),
            _ => {
                return Err(SourceError::Parse(
                    "novel page has no chapter list token".to_string(),
                ))
            }
        };

        let ajax_url = format!("{}/ajax/getListChapterById", self.base_url);
        let json = self
            .client
            .post_form(
                &ajax_url,
                &[("post_id", post_id), ("_token", csrf_token)],
                &[
                    ("referer", novel.canonical_url.as_str()),
                    ("x-csrf-token", csrf_token),
                    ("x-requested-with", "XMLHttpRequest"),
                ],
            )
            .await?;

        Ok(ChapterIndex {
            chapters: parse_chapter_list(&json, &novel.canonical_url)?,
            author: page.author,
            description: page.description,
        })
    }

    async fn chapter_body(&self, url: &str) -> Result<String, SourceError> {
        let html = self.client.get_html(url, &[], Some(&self.base_url)).await?;
        parse_chapter_body(&html)
    }
}

/// Parse the novel cards of a search results page.
pub fn parse_search_results(html: &str, base_url: &str) -> Vec<Novel> {
    let doc = Html::parse_document(html);
    let mut novels = Vec::new();

    for item in doc.select(&NOVEL_ITEM) {
        let Some(href) = first_attr(item, &LINK, "href") else {
            continue;
        };
        let url = absolutize(base_url, &href);
        let title = first_text(item, &NOVEL_TITLE).unwrap_or_else(|| "Unknown".to_string());

        let cover = item
            .select(&IMAGE)
            .next()
            .and_then(|img| {
                let img = img.value();
                img.attr("data-src")
                    .or_else(|| img.attr("data-lazy-src"))
                    .or_else(|| img.attr("src"))
            })
            .map(|src| absolutize(base_url, src))
            .unwrap_or_default();

        let chapter_count = first_text(item, &NOVEL_STATS)
            .and_then(|t| parse_count(&t))
            .unwrap_or(0);

        novels.push(
            Novel::preview(title, NAME, url)
                .with_cover(cover)
                .with_chapter_count(chapter_count),
        );
    }

    novels
}

/// Parse a novel landing page.
pub fn parse_novel_page(html: &str) -> NovelPage {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    NovelPage {
        author: first_text(root, &AUTHOR),
        description: first_text(root, &SUMMARY),
        csrf_token: first_attr(root, &CSRF_TOKEN, "content"),
        post_id: first_attr(root, &NOVEL_REPORT, "report-post_id"),
    }
}

/// Parse the chapter list returned by the AJAX endpoint.
///
/// Chapter URLs are `{novel_url}/chapter-{n_sort}`.
pub fn parse_chapter_list(json: &str, novel_url: &str) -> Result<Vec<ChapterEntry>, SourceError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| SourceError::Parse(format!("chapter list is not JSON: {}", e)))?;
    let data = value
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Parse("chapter list has no data array".to_string()))?;

    let novel_url = novel_url.trim_end_matches('/');
    let chapters = data
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let name = entry
                .get("title")
                .and_then(Value::as_str)
                .map(fragment_text)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| format!("Chapter {}", i + 1));
            let n_sort = match entry.get("n_sort") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => (i + 1).to_string(),
            };
            ChapterEntry::new(name, format!("{}/chapter-{}", novel_url, n_sort))
        })
        .collect();

    Ok(chapters)
}

/// Extract the readable text of a chapter page.
pub fn parse_chapter_body(html: &str) -> Result<String, SourceError> {
    let doc = Html::parse_document(html);
    let content = doc
        .select(&CONTENT)
        .next()
        .ok_or_else(|| SourceError::Parse("chapter page has no #content".to_string()))?;

    let hidden_rules = hidden_rule_selector(&doc);
    let body = visible_paragraphs(content, hidden_rules.as_ref());
    if body.is_empty() {
        return Err(SourceError::Parse("chapter content is empty".to_string()));
    }
    Ok(body)
}
