//! Registry of configured novel sources.

use std::sync::Arc;

use tracing::info;

use crate::config::SourcesConfig;

use super::http::SourceClient;
use super::novelfire::NovelFireSource;
use super::royalroad::RoyalRoadSource;
use super::{NovelSource, SourceError, SourceSelector};

/// Novel sources keyed by their exact name.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn NovelSource>>,
}

impl SourceRegistry {
    /// Create a registry from explicit sources, kept in the given order.
    pub fn new(sources: Vec<Arc<dyn NovelSource>>) -> Self {
        Self { sources }
    }

    /// Create the registry of enabled scraping sources.
    pub fn from_config(config: &SourcesConfig) -> Result<Self, SourceError> {
        let client = SourceClient::new(config)?;
        let mut sources: Vec<Arc<dyn NovelSource>> = Vec::new();

        if config.novelfire.enabled {
            sources.push(Arc::new(NovelFireSource::new(
                client.clone(),
                config.novelfire.base_url.as_deref(),
            )));
        }
        if config.royalroad.enabled {
            sources.push(Arc::new(RoyalRoadSource::new(
                client,
                config.royalroad.base_url.as_deref(),
            )));
        }

        let registry = Self::new(sources);
        info!(sources = ?registry.names(), "Source registry ready");
        Ok(registry)
    }

    /// Look up a source by exact name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn NovelSource>> {
        self.sources.iter().find(|s| s.name() == name).cloned()
    }

    /// Names of all registered sources, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Sources picked by `selector`. An unknown name selects nothing.
    pub fn select(&self, selector: &SourceSelector) -> Vec<Arc<dyn NovelSource>> {
        self.sources
            .iter()
            .filter(|s| selector.matches(s.name()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}
