//! # Hondana - manga aggregation and download library
//!
//! Hondana puts heterogeneous manga sources behind one [`Provider`]
//! interface: search, fetch a manga with its chapters, fetch a chapter's
//! pages, and download those pages to a deterministic directory layout.
//!
//! ## Features
//!
//! - **Declarative providers**: a source is a [`ProviderConfig`](provider::ProviderConfig)
//!   table, built into a JSON API, HTML scraping or themed WordPress provider
//! - **Cross-provider search**: bounded concurrent fan-out with a shared
//!   deadline; one failing provider never sinks the others
//! - **Polite HTTP**: per-domain rate limiting, retries with capped
//!   exponential backoff, cooperative cancellation through [`Context`]
//! - **Idempotent downloads**: temp-file-and-rename writes, finished pages
//!   are skipped on the next run
//! - **Tracked errors**: every error carries a [`Category`](error::Category),
//!   key/value context and the chain of operations it passed through
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hondana::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> hondana::Result<()> {
//!     let providers = hondana::sources::registry()?;
//!     let ctx = Context::background();
//!
//!     let results = providers
//!         .search("one piece")
//!         .limit(20)
//!         .context(&ctx)
//!         .flatten()
//!         .await?
//!         .dedupe_by_title();
//!
//!     let first = &results[0];
//!     let provider = providers.resolve(&first.qualified_id())?;
//!     let info = provider.get_manga(&ctx, &first.id).await?;
//!
//!     if let Some(chapter) = info.chapters.first() {
//!         let report = provider
//!             .download_chapter(&ctx, &chapter.id, &DownloadOptions::new("./downloads"))
//!             .await?;
//!         println!("{} pages in {}", report.written, report.dir.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`error`]: tracked errors, categories and remediation hints
//! - [`context`]: cancellation and deadlines
//! - [`net`]: rate limiter, HTTP client with a pluggable transport, JSON and
//!   HTML helpers
//! - [`extract`]: path-based field extraction from JSON records
//! - [`paginate`]: offset, page and cursor pagination
//! - [`provider`]: the provider trait and its three variants
//! - [`sources`]: the built-in provider tables
//! - [`download`]: the download engine
//! - [`search`]: provider registry and cross-provider search

pub mod context;
pub mod download;
pub mod error;
pub mod extract;
pub mod net;
pub mod paginate;
pub mod provider;
pub mod search;
pub mod sources;
pub mod types;

/// Commonly used types and traits.
///
/// ```rust
/// use hondana::prelude::*;
///
/// let id: QualifiedId = "mgd:abc".parse().unwrap();
/// assert_eq!(id.provider, "mgd");
/// ```
pub mod prelude {
    pub use crate::context::Context;
    pub use crate::download::{DownloadOptions, DownloadReport};
    pub use crate::error::{Category, Error, Result, ResultExt};
    pub use crate::provider::Provider;
    pub use crate::search::{Providers, SearchBuilder, SearchResultExt};
    pub use crate::types::{
        Chapter, ChapterInfo, FilterKey, Manga, MangaInfo, Page, QualifiedId, SearchOptions,
        SortKey,
    };
}

pub use context::Context;
pub use error::{Error, Result};
pub use provider::Provider;
pub use search::{Providers, SearchResultExt};
pub use types::{Chapter, Manga, MangaInfo, QualifiedId, SearchOptions};
