//! Novel source abstraction.
//!
//! A [`NovelSource`] knows how to search one site, list a novel's chapters
//! and download chapter text. Sources are looked up by exact name through
//! the [`SourceRegistry`].

mod html;
mod http;
pub mod novelfire;
mod registry;
pub mod royalroad;
mod types;

pub use http::SourceClient;
pub use novelfire::NovelFireSource;
pub use registry::SourceRegistry;
pub use royalroad::RoyalRoadSource;
pub use types::*;
