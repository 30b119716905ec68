//! Shared HTTP client for scraping sources.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::{Client, Response};
use tracing::debug;

use crate::config::SourcesConfig;

use super::SourceError;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// HTTP client configured for scraping novel sites.
///
/// Cookies are kept between requests, which some sites require to accept a
/// follow-up AJAX call made with a token from an earlier page.
#[derive(Clone)]
pub struct SourceClient {
    client: Client,
}

impl SourceClient {
    /// Create a client from the `[sources]` configuration.
    pub fn new(config: &SourcesConfig) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .map_err(|e| SourceError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// GET a page and return its body.
    pub async fn get_html(
        &self,
        url: &str,
        query: &[(&str, &str)],
        referer: Option<&str>,
    ) -> Result<String, SourceError> {
        debug!(url, "Fetching page");

        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await?;
        Self::body(url, response).await
    }

    /// POST a form and return the response body.
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        headers: &[(&'static str, &str)],
    ) -> Result<String, SourceError> {
        debug!(url, "Posting form");

        let mut request = self.client.post(url).form(form);
        for (name, value) in headers {
            let value = HeaderValue::from_str(value)
                .map_err(|e| SourceError::Http(format!("Invalid header {}: {}", name, e)))?;
            request = request.header(HeaderName::from_static(name), value);
        }

        let response = request.send().await?;
        Self::body(url, response).await
    }

    async fn body(url: &str, response: Response) -> Result<String, SourceError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}
