//! Provider registry, cross-provider search and result post-processing.
//!
//! [`Providers`] holds the registered providers and starts a fluent
//! [`SearchBuilder`]. Searching more than one provider goes through
//! [`search_across`], which fans out under a semaphore and a shared
//! deadline. A provider that fails is logged and left out; it never sinks
//! the results of the others.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hondana::prelude::*;
//!
//! # async fn example() -> hondana::Result<()> {
//! let providers = hondana::sources::registry()?;
//!
//! let results = providers
//!     .search("one piece")
//!     .limit(20)
//!     .sort(SortKey::Name)
//!     .flatten()
//!     .await?
//!     .dedupe_by_title();
//!
//! let grouped = providers.search("naruto").provider("mgd").group().await?;
//! # Ok(())
//! # }
//! ```

use crate::context::Context;
use crate::error::{Error, Result, ResultExt};
use crate::provider::Provider;
use crate::types::{FilterKey, Manga, QualifiedId, SearchOptions, SortKey};
use futures::future;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Providers searched at once by default.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Deadline of a whole fan-out by default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Registered providers, kept in registration order.
#[derive(Clone, Default)]
pub struct Providers {
    providers: Vec<Arc<dyn Provider>>,
}

impl fmt::Debug for Providers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider, replacing one with the same id in place.
    pub fn add(&mut self, provider: Arc<dyn Provider>) -> &mut Self {
        match self.providers.iter_mut().find(|p| p.id() == provider.id()) {
            Some(slot) => *slot = provider,
            None => self.providers.push(provider),
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    /// The provider a qualified id names, or NotFound.
    pub fn resolve(&self, id: &QualifiedId) -> Result<&Arc<dyn Provider>> {
        self.get(&id.provider).ok_or_else(|| {
            Error::not_found(format!("no provider '{}'", id.provider))
                .with_context("id", id)
        })
    }

    pub fn ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Starts a search; an empty query lists everything.
    pub fn search(&self, query: impl Into<String>) -> SearchBuilder<'_> {
        SearchBuilder::new(self, query.into())
    }
}

/// Runs `search` on every provider concurrently.
///
/// At most `concurrency` providers run at once, and all of them share one
/// deadline of `timeout` derived from `ctx`. The map holds an entry for
/// every provider that answered, including those with no results.
///
/// # Errors
///
/// Failed providers are logged at debug level and dropped. Only when every
/// provider failed by cancellation does the fan-out itself fail, with a
/// Timeout error.
pub async fn search_across(
    ctx: &Context,
    providers: &[Arc<dyn Provider>],
    query: &str,
    options: &SearchOptions,
    concurrency: usize,
    timeout: Duration,
) -> Result<HashMap<String, Vec<Manga>>> {
    let ctx = ctx.with_timeout(timeout);
    let permits = Semaphore::new(concurrency.max(1));

    let calls = providers.iter().map(|provider| {
        let ctx = &ctx;
        let permits = &permits;
        async move {
            let result = match permits.acquire().await {
                Ok(_permit) => ctx.run(provider.search(ctx, query, options)).await,
                Err(_) => Err(Error::cancelled()),
            };
            (provider.id().to_string(), result)
        }
    });
    let outcomes = future::join_all(calls).await;

    let mut results = HashMap::new();
    let mut cancelled = 0;
    for (id, outcome) in outcomes {
        match outcome {
            Ok(mut found) => {
                for manga in &mut found {
                    manga.provider_id.clone_from(&id);
                }
                results.insert(id, found);
            }
            Err(err) => {
                if err.is_cancelled() {
                    cancelled += 1;
                }
                debug!(provider = %id, error = %err.describe(), "provider search failed");
            }
        }
    }

    if !providers.is_empty() && cancelled == providers.len() {
        return Err(Error::timeout("every provider timed out")
            .with_context("query", query)
            .op("search_across"));
    }
    Ok(results)
}

/// Fluent search over a [`Providers`] registry.
pub struct SearchBuilder<'a> {
    providers: &'a Providers,
    ctx: Context,
    options: SearchOptions,
    only: Option<String>,
    concurrency: usize,
    timeout: Duration,
}

impl<'a> SearchBuilder<'a> {
    pub(crate) fn new(providers: &'a Providers, query: String) -> Self {
        Self {
            providers,
            ctx: Context::background(),
            options: SearchOptions::from(query),
            only: None,
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Parent context; the fan-out deadline is derived from it.
    pub fn context(mut self, ctx: &Context) -> Self {
        self.ctx = ctx.clone();
        self
    }

    /// Results per page.
    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = limit;
        self
    }

    /// Pages to fetch per provider; zero walks until the source runs out.
    pub fn pages(mut self, pages: usize) -> Self {
        self.options.pages = pages;
        self
    }

    pub fn sort(mut self, sort: SortKey) -> Self {
        self.options.sort = Some(sort);
        self
    }

    pub fn filter(mut self, key: FilterKey, value: impl Into<String>) -> Self {
        self.options.filters.insert(key, value.into());
        self
    }

    pub fn filters(mut self, filters: BTreeMap<FilterKey, String>) -> Self {
        self.options.filters.extend(filters);
        self
    }

    /// Searches only the provider with this id. Its errors are returned
    /// rather than logged.
    pub fn provider(mut self, id: impl Into<String>) -> Self {
        self.only = Some(id.into());
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The options the search will run with.
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Runs the search and returns filtered, sorted results per provider.
    pub async fn group(self) -> Result<HashMap<String, Vec<Manga>>> {
        let filters = self.options.filters.clone();
        let sort = self.options.sort;
        let grouped = match &self.only {
            Some(id) => {
                let provider = self
                    .providers
                    .get(id)
                    .ok_or_else(|| Error::not_found(format!("no provider '{id}'")))?;
                let ctx = self.ctx.with_timeout(self.timeout);
                let mut found = ctx
                    .run(provider.search(&ctx, &self.options.query, &self.options))
                    .await
                    .with_context("provider", id)
                    .op("search")?;
                for manga in &mut found {
                    manga.provider_id.clone_from(id);
                }
                HashMap::from([(id.clone(), found)])
            }
            None => {
                search_across(
                    &self.ctx,
                    &self.providers.providers,
                    &self.options.query,
                    &self.options,
                    self.concurrency,
                    self.timeout,
                )
                .await?
            }
        };

        Ok(grouped
            .into_iter()
            .map(|(id, found)| (id, found.apply_filters(&filters).sort_by_key(sort)))
            .collect())
    }

    /// Runs the search and concatenates the results in registration order.
    pub async fn flatten(self) -> Result<Vec<Manga>> {
        let providers = self.providers;
        let sort = self.options.sort;
        let mut grouped = self.group().await?;
        let flat: Vec<Manga> = providers
            .iter()
            .filter_map(|p| grouped.remove(p.id()))
            .flatten()
            .collect();
        Ok(flat.sort_by_key(sort))
    }
}

/// Post-processing of search results.
pub trait SearchResultExt {
    /// Keeps the entries matching every filter.
    ///
    /// Title is a plain substring of the main title. Author, tag and genre
    /// match case-insensitive substrings; tag and genre both look at the tag
    /// list. Status matches exactly, ignoring case.
    fn apply_filters(self, filters: &BTreeMap<FilterKey, String>) -> Self;

    /// Stable sort by `key`. Keys that only a provider can rank by
    /// (relevance, popularity, dates) keep the provider's order.
    fn sort_by_key(self, key: Option<SortKey>) -> Self;

    /// Keeps the first entry of each title, ignoring case.
    fn dedupe_by_title(self) -> Self;
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn matches(manga: &Manga, key: FilterKey, value: &str) -> bool {
    let needle = value.trim().to_lowercase();
    match key {
        FilterKey::Title => manga.title.contains(value.trim()),
        FilterKey::Author => manga.authors.iter().any(|a| contains_ci(a, &needle)),
        FilterKey::Tag | FilterKey::Genre => manga.tags.iter().any(|t| contains_ci(t, &needle)),
        FilterKey::Status => manga
            .status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case(&needle)),
    }
}

impl SearchResultExt for Vec<Manga> {
    fn apply_filters(mut self, filters: &BTreeMap<FilterKey, String>) -> Self {
        if filters.is_empty() {
            return self;
        }
        self.retain(|manga| {
            filters
                .iter()
                .all(|(key, value)| matches(manga, *key, value))
        });
        self
    }

    fn sort_by_key(mut self, key: Option<SortKey>) -> Self {
        match key {
            Some(SortKey::Name) => {
                self.sort_by_cached_key(|m| m.title.to_lowercase());
            }
            Some(SortKey::Author) => {
                // no author sorts last
                self.sort_by_cached_key(|m| {
                    m.authors
                        .first()
                        .map(|a| (false, a.to_lowercase()))
                        .unwrap_or((true, String::new()))
                });
            }
            Some(SortKey::Status) => {
                self.sort_by_cached_key(|m| {
                    m.status
                        .as_ref()
                        .map(|s| (false, s.to_lowercase()))
                        .unwrap_or((true, String::new()))
                });
            }
            _ => {}
        }
        self
    }

    fn dedupe_by_title(mut self) -> Self {
        let mut seen = HashSet::new();
        self.retain(|manga| seen.insert(manga.title.trim().to_lowercase()));
        self
    }
}
