//! Provider trait, lifecycle and declarative configuration.
//!
//! Every source of manga is a [`Provider`]. Concrete providers are not
//! hand-written types; they are [`ProviderConfig`] bundles turned into ready
//! providers by [`build`]. The config's [`ProviderKind`] picks the variant:
//!
//! - [`ProviderKind::Api`]: JSON endpoints ([`api::ApiProvider`])
//! - [`ProviderKind::Web`]: HTML scraping ([`web::WebProvider`])
//! - [`ProviderKind::ThemedWeb`]: scraping a WordPress manga theme with its
//!   AJAX endpoints ([`madara::ThemedWebProvider`])
//!
//! # Examples
//!
//! ```rust,no_run
//! use hondana::Context;
//! use hondana::provider::Provider;
//! use hondana::types::SearchOptions;
//!
//! # async fn example() -> hondana::Result<()> {
//! let provider = hondana::sources::mangadex()?;
//! let ctx = Context::background();
//!
//! let results = provider.search(&ctx, "berserk", &SearchOptions::default()).await?;
//! let info = provider.get_manga(&ctx, &results[0].id).await?;
//! println!("{} has {} chapters", info.manga.title, info.chapters.len());
//! # Ok(())
//! # }
//! ```

use crate::context::Context;
use crate::download::{ChapterMeta, DownloadOptions, DownloadReport, Downloader};
use crate::error::{Error, Result, ResultExt};
use crate::extract::{ExtractorSet, Path};
use crate::net::{HttpClient, Method, Query};
use crate::paginate::PaginationConfig;
use crate::types::{Chapter, ChapterInfo, Manga, MangaInfo, SearchOptions};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

pub mod api;
pub mod madara;
pub mod web;

/// The uniform capability set every provider exposes.
///
/// Everything except the identity accessors goes through
/// [`Provider::initialize`] first.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short identifier used in qualified ids (e.g. "mgd")
    fn id(&self) -> &str;

    /// Display name
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Canonical site URL
    fn site_url(&self) -> &str;

    /// The HTTP client this provider sends through.
    fn client(&self) -> &HttpClient;

    /// Referer sent with page image requests, if the host checks it.
    fn referer(&self) -> Option<&str> {
        None
    }

    /// Throttle between consecutive requests of one multi-request operation.
    fn throttle(&self) -> Duration {
        Duration::ZERO
    }

    /// Idempotent warm-up. Repeated calls after success are no-ops.
    async fn initialize(&self, ctx: &Context) -> Result<()>;

    async fn search(
        &self,
        ctx: &Context,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<Manga>>;

    async fn get_manga(&self, ctx: &Context, id: &str) -> Result<MangaInfo>;

    async fn get_chapter(&self, ctx: &Context, id: &str) -> Result<Chapter>;

    /// Best-effort lookup of the manga a chapter belongs to.
    ///
    /// Fails with NotFound when the chapter does not name its manga.
    async fn try_get_manga_for_chapter(&self, ctx: &Context, chapter_id: &str) -> Result<Manga> {
        let chapter = self.get_chapter(ctx, chapter_id).await?;
        if chapter.manga_id.is_empty() {
            return Err(Error::not_found(format!(
                "manga for chapter '{chapter_id}' is not determinable"
            ))
            .with_context("provider", self.id()));
        }
        Ok(self.get_manga(ctx, &chapter.manga_id).await?.manga)
    }

    /// Downloads every page of a chapter under `options.output`.
    ///
    /// The parent manga is looked up for the directory name unless the
    /// caller already supplied a title; a failed lookup only costs the nicer
    /// name.
    async fn download_chapter(
        &self,
        ctx: &Context,
        chapter_id: &str,
        options: &DownloadOptions,
    ) -> Result<DownloadReport> {
        let chapter = self
            .get_chapter(ctx, chapter_id)
            .await
            .with_context("chapter", chapter_id)
            .op("download_chapter")?;

        let manga_title = match &options.manga_title {
            Some(title) => Some(title.clone()),
            None if !chapter.manga_id.is_empty() => {
                match self.get_manga(ctx, &chapter.manga_id).await {
                    Ok(info) => Some(info.manga.title),
                    Err(err) => {
                        debug!(
                            provider = self.id(),
                            error = %err,
                            "manga lookup for download failed"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        let meta = ChapterMeta {
            provider_id: self.id().to_string(),
            manga_id: chapter.manga_id.clone(),
            manga_title,
            chapter_id: chapter.info.id.clone(),
            chapter_number: chapter.info.number,
            volume: options.volume.clone().or_else(|| chapter.info.volume.clone()),
        };

        let mut downloader = Downloader::new(self.client().clone())
            .concurrency(options.concurrency)
            .throttle(options.throttle.unwrap_or_else(|| self.throttle()));
        if let Some(referer) = self.referer() {
            downloader = downloader.referer(referer);
        }
        downloader
            .download(ctx, &chapter, &options.output, &meta)
            .await
            .with_context("provider", self.id())
    }
}

/// Where a provider is in its initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Uninit,
    Ready,
    Failed,
}

/// Runs a provider's warm-up at most once to success.
///
/// Concurrent callers wait for the one running the warm-up. After a failure
/// the next caller tries again.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: Mutex<State>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn state(&self) -> State {
        *self.state.lock().await
    }

    pub async fn ensure<F, Fut>(&self, init: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut state = self.state.lock().await;
        if *state == State::Ready {
            return Ok(());
        }
        match init().await {
            Ok(()) => {
                *state = State::Ready;
                Ok(())
            }
            Err(err) => {
                *state = State::Failed;
                Err(err.op("initialize"))
            }
        }
    }
}

/// Which variant a config builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Api,
    Web,
    ThemedWeb,
}

/// HTTP settings applied to the provider's client.
#[derive(Debug, Clone)]
pub struct HttpPreamble {
    pub headers: Vec<(String, String)>,
    /// Minimum interval between requests to one domain
    pub rate_limit: Duration,
    pub max_retries: u32,
    /// Pause between the requests of one listing or download
    pub throttle: Duration,
    pub timeout: Duration,
}

impl Default for HttpPreamble {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            rate_limit: Duration::from_millis(200),
            max_retries: 3,
            throttle: Duration::ZERO,
            timeout: Duration::from_secs(30),
        }
    }
}

impl HttpPreamble {
    /// Applies the preamble on top of `client`.
    pub fn apply(&self, client: HttpClient) -> HttpClient {
        let client = self
            .headers
            .iter()
            .fold(client, |client, (name, value)| client.with_header(name, value));
        client
            .with_rate_limit(self.rate_limit.as_millis() as u64)
            .with_max_retries(self.max_retries)
            .with_timeout(self.timeout)
    }
}

/// The shape an endpoint's response decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    MangaList,
    Manga,
    Chapter,
    ChapterList,
    Pages,
}

/// A decoded endpoint response.
#[derive(Debug, Clone)]
pub enum Decoded {
    MangaList(Vec<Manga>),
    Manga(MangaInfo),
    Chapter(Chapter),
    ChapterList(Vec<ChapterInfo>),
    /// Absolute page image URLs in reading order
    Pages(Vec<String>),
}

/// Builds endpoint query parameters from search options.
pub type QueryBuilder = Arc<dyn Fn(&SearchOptions) -> Query + Send + Sync>;

/// Turns a raw response body into a decoded value. The second argument is
/// the id the endpoint was called with.
pub type PostProcessor = Arc<dyn Fn(&Value, &str) -> Result<Decoded> + Send + Sync>;

/// Maps one chapter-list row to a chapter.
pub type ChapterRow = Arc<dyn Fn(&Value) -> Result<ChapterInfo> + Send + Sync>;

/// A named, parameterized route of an API provider.
#[derive(Clone)]
pub struct Endpoint {
    /// Path under the base URL; `{id}` is substituted
    pub path: String,
    pub method: Method,
    pub shape: ResponseShape,
    pub requires_auth: bool,
    /// Where the record or list sits in the response
    pub root: Path,
    /// Parameters sent with every call
    pub query: Query,
    pub query_builder: Option<QueryBuilder>,
    pub postprocess: Option<PostProcessor>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("path", &self.path)
            .field("method", &self.method)
            .field("shape", &self.shape)
            .field("requires_auth", &self.requires_auth)
            .field("root", &self.root)
            .field("query", &self.query)
            .field("query_builder", &self.query_builder.is_some())
            .field("postprocess", &self.postprocess.is_some())
            .finish()
    }
}

impl Endpoint {
    pub fn get(path: impl Into<String>, shape: ResponseShape) -> Self {
        Self {
            path: path.into(),
            method: Method::Get,
            shape,
            requires_auth: false,
            root: Path::default(),
            query: Query::new(),
            query_builder: None,
            postprocess: None,
        }
    }

    pub fn root(mut self, root: &str) -> Self {
        self.root = Path::parse(root);
        self
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push(key, value);
        self
    }

    pub fn query_builder<F>(mut self, builder: F) -> Self
    where
        F: Fn(&SearchOptions) -> Query + Send + Sync + 'static,
    {
        self.query_builder = Some(Arc::new(builder));
        self
    }

    pub fn postprocess<F>(mut self, postprocess: F) -> Self
    where
        F: Fn(&Value, &str) -> Result<Decoded> + Send + Sync + 'static,
    {
        self.postprocess = Some(Arc::new(postprocess));
        self
    }

    /// The path with `{id}` substituted, percent-encoded.
    pub fn render(&self, id: &str) -> String {
        self.path.replace("{id}", &urlencoding::encode(id))
    }
}

/// Field mappings from raw records to the canonical shapes.
#[derive(Debug, Clone, Default)]
pub struct ResponseMapping {
    pub manga: Option<ExtractorSet>,
    pub chapter: Option<ExtractorSet>,
}

/// Settings of an API provider.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub endpoints: HashMap<String, Endpoint>,
    pub mapping: ResponseMapping,
    /// Query parameter carrying the search text when no builder is set
    pub search_param: String,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoints: HashMap::new(),
            mapping: ResponseMapping::default(),
            search_param: "q".to_string(),
        }
    }

    pub fn endpoint(mut self, name: &str, endpoint: Endpoint) -> Self {
        self.endpoints.insert(name.to_string(), endpoint);
        self
    }
}

/// Where the pieces of a page live, each a list of fallback selectors.
#[derive(Debug, Clone, Default)]
pub struct Selectors {
    /// Anchors of search results
    pub search: Vec<String>,
    pub title: Vec<String>,
    pub alt_titles: Vec<String>,
    pub description: Vec<String>,
    /// Chapter rows; the row itself or its first anchor is the link
    pub chapters: Vec<String>,
    pub pages: Vec<String>,
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    pub status: Vec<String>,
    /// Publication date within a chapter row
    pub dates: Vec<String>,
    pub cover: Vec<String>,
}

/// Settings of the Web and ThemedWeb variants.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// `{query}` and `{page}` are substituted
    pub search_path: String,
    /// Used instead of `search_path` for an empty query; `{page}` is substituted
    pub list_path: Option<String>,
    /// `{id}` is substituted
    pub manga_path: String,
    pub chapter_path: String,
    /// Path prefixes stripped from links to derive ids
    pub path_prefixes: Vec<String>,
    /// Replaces non-alphanumerics in the search text, for sites that
    /// expect slug-style queries
    pub query_separator: Option<char>,
    /// Ask for all pages on one screen with `style=list`
    pub list_style: bool,
    pub selectors: Selectors,
    /// Accepted chapter-date formats (chrono syntax)
    pub date_formats: Vec<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            search_path: "/?s={query}".to_string(),
            list_path: None,
            manga_path: "/manga/{id}/".to_string(),
            chapter_path: "/manga/{id}/".to_string(),
            path_prefixes: vec!["/manga/".to_string()],
            query_separator: None,
            list_style: false,
            selectors: Selectors::default(),
            date_formats: vec![
                "%b %d,%Y".to_string(),
                "%b %d, %Y".to_string(),
                "%B %d, %Y".to_string(),
                "%Y-%m-%d".to_string(),
                "%d/%m/%Y".to_string(),
            ],
        }
    }
}

/// How a provider lists the chapters of a manga.
#[derive(Clone)]
pub struct ChapterListConfig {
    /// Name of the endpoint to page through
    pub endpoint: String,
    pub pagination: PaginationConfig,
    pub row: Option<ChapterRow>,
}

impl fmt::Debug for ChapterListConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChapterListConfig")
            .field("endpoint", &self.endpoint)
            .field("pagination", &self.pagination)
            .field("row", &self.row.is_some())
            .finish()
    }
}

/// A complete declarative description of a provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub site_url: String,
    pub kind: ProviderKind,
    pub http: HttpPreamble,
    pub api: Option<ApiConfig>,
    pub web: Option<WebConfig>,
    pub pagination: PaginationConfig,
    pub chapter_list: Option<ChapterListConfig>,
}

/// Longest accepted provider id.
pub const MAX_ID_LEN: usize = 4;

impl ProviderConfig {
    pub fn new(id: &str, name: &str, site_url: &str, kind: ProviderKind) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            site_url: site_url.trim_end_matches('/').to_string(),
            kind,
            http: HttpPreamble::default(),
            api: None,
            web: None,
            pagination: PaginationConfig::default(),
            chapter_list: None,
        }
    }

    /// Checks the invariants every variant relies on.
    pub fn validate(&self) -> Result<()> {
        let invalid =
            |msg: String| -> Result<()> { Err(Error::provider(&self.id, msg).op("validate")) };
        if self.id.is_empty() || self.id.len() > MAX_ID_LEN || self.id.contains(':') {
            return invalid(format!(
                "id must be 1-{MAX_ID_LEN} characters without ':'"
            ));
        }
        url::Url::parse(&self.site_url).with_context("provider", &self.id)?;
        match self.kind {
            ProviderKind::Api if self.api.is_none() => {
                invalid("API provider without api config".into())
            }
            ProviderKind::Web | ProviderKind::ThemedWeb if self.web.is_none() => {
                invalid("web provider without web config".into())
            }
            _ => Ok(()),
        }
    }
}

/// Builds a provider on the shared HTTP client.
pub fn build(config: ProviderConfig) -> Result<Arc<dyn Provider>> {
    build_with_client(config, HttpClient::new())
}

/// Builds a provider on top of `client`, e.g. one with a custom transport.
pub fn build_with_client(config: ProviderConfig, client: HttpClient) -> Result<Arc<dyn Provider>> {
    config.validate()?;
    let client = config.http.apply(client);
    Ok(match config.kind {
        ProviderKind::Api => Arc::new(api::ApiProvider::new(config, client)?),
        ProviderKind::Web => Arc::new(web::WebProvider::new(config, client)?),
        ProviderKind::ThemedWeb => Arc::new(madara::ThemedWebProvider::new(config, client)?),
    })
}

/// Selector list helper for config tables.
pub fn selectors(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_lifecycle_runs_once_on_success() {
        let lifecycle = Lifecycle::new();
        let runs = AtomicUsize::new(0);
        for _ in 0..3 {
            lifecycle
                .ensure(|| async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.state().await, State::Ready);
    }

    #[tokio::test]
    async fn test_lifecycle_retries_after_failure() {
        let lifecycle = Lifecycle::new();
        let err = lifecycle
            .ensure(|| async { Err(Error::network("down")) })
            .await
            .unwrap_err();
        assert_eq!(err.call_chain()[0].operation, "initialize");
        assert_eq!(lifecycle.state().await, State::Failed);

        lifecycle.ensure(|| async { Ok(()) }).await.unwrap();
        assert_eq!(lifecycle.state().await, State::Ready);
    }

    #[test]
    fn test_config_validation() {
        let mut config =
            ProviderConfig::new("toolong", "X", "https://x.example", ProviderKind::Web);
        config.web = Some(WebConfig::default());
        assert!(config.validate().is_err());

        config.id = "x".into();
        assert!(config.validate().is_ok());

        config.kind = ProviderKind::Api;
        assert!(config.validate().is_err());

        config.id = "a:b".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_render_encodes_id() {
        let endpoint = Endpoint::get("/manga/{id}/feed", ResponseShape::ChapterList);
        assert_eq!(endpoint.render("a b"), "/manga/a%20b/feed");
    }
}
