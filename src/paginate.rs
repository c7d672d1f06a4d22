//! Paginated fetches over offset or page cursors.
//!
//! A [`PaginationConfig`] names the query parameters and response paths of a
//! provider's list endpoint. A [`Paginator`] walks that endpoint page by page,
//! accumulating items in server order, until the response says there is
//! nothing more.
//!
//! Termination is inferred per page: with a has-more path the flag must be
//! true, with a total path the running position must stay below the total,
//! and with neither a full page (`n >= limit`) means there may be more. An
//! empty page always stops the walk.

use crate::context::Context;
use crate::error::{Error, Result, ResultExt, Sentinel};
use crate::extract::{self, ExtractorSet, Path};
use crate::net::{HttpClient, Request};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Parameter names and response paths of a paginated endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationConfig {
    pub limit_param: String,
    pub offset_param: String,
    /// When set, pages are addressed by number instead of offset.
    pub page_param: Option<String>,
    pub total_path: Option<Path>,
    pub has_more_path: Option<Path>,
    pub items_path: Path,
    pub default_limit: usize,
    pub max_limit: usize,
    pub start_page: usize,
    pub start_offset: usize,
    /// Deepest position the server will serve, if it caps offsets
    pub max_items: Option<usize>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            limit_param: "limit".to_string(),
            offset_param: "offset".to_string(),
            page_param: None,
            total_path: None,
            has_more_path: None,
            items_path: Path::parse("data"),
            default_limit: 20,
            max_limit: 100,
            start_page: 1,
            start_offset: 0,
            max_items: None,
        }
    }
}

impl PaginationConfig {
    /// Offset cursor with a total count in the response.
    pub fn offset(items_path: &str, total_path: &str) -> Self {
        Self {
            items_path: Path::parse(items_path),
            total_path: Some(Path::parse(total_path)),
            ..Default::default()
        }
    }

    /// Page-number cursor, stopping on short pages.
    pub fn paged(page_param: &str, items_path: &str) -> Self {
        Self {
            page_param: Some(page_param.to_string()),
            items_path: Path::parse(items_path),
            ..Default::default()
        }
    }

    pub fn with_limits(mut self, default_limit: usize, max_limit: usize) -> Self {
        self.default_limit = default_limit;
        self.max_limit = max_limit;
        self
    }

    pub fn with_has_more(mut self, path: &str) -> Self {
        self.has_more_path = Some(Path::parse(path));
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }
}

/// Walks a paginated endpoint.
///
/// ```rust,no_run
/// use hondana::Context;
/// use hondana::net::{HttpClient, Request};
/// use hondana::paginate::{PaginationConfig, Paginator};
/// use serde_json::Value;
///
/// # async fn example() -> hondana::Result<()> {
/// let client = HttpClient::new();
/// let config = PaginationConfig::offset("data", "total").with_limits(100, 500);
/// let items: Vec<Value> = Paginator::new(&client, &config)
///     .max_pages(3)
///     .fetch(&Context::background(), &Request::get("https://api.example.com/list"), None)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Paginator<'a> {
    client: &'a HttpClient,
    config: &'a PaginationConfig,
    max_pages: usize,
    throttle: Duration,
    limit: Option<usize>,
}

impl<'a> Paginator<'a> {
    pub fn new(client: &'a HttpClient, config: &'a PaginationConfig) -> Self {
        Self {
            client,
            config,
            max_pages: 0,
            throttle: Duration::ZERO,
            limit: None,
        }
    }

    /// Caps the number of pages fetched; zero means no cap.
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Sleep between pages.
    pub fn throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Overrides the configured default page size.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Page size actually requested: the override or the default, capped
    /// by the maximum.
    pub fn effective_limit(&self) -> usize {
        let cap = if self.config.max_limit == 0 {
            usize::MAX
        } else {
            self.config.max_limit
        };
        self.limit
            .unwrap_or(self.config.default_limit)
            .min(cap)
            .max(1)
    }

    /// Fetches every page and decodes each item into `T`, through the
    /// extractor set when one is given.
    pub async fn fetch<T>(
        &self,
        ctx: &Context,
        base: &Request,
        extractor: Option<&ExtractorSet>,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.fetch_with(ctx, base, |item| match extractor {
            Some(set) => set.apply(item),
            None => serde_json::from_value(item.clone()).map_err(Into::into),
        })
        .await
    }

    /// Fetches every page and maps each item with `map`.
    ///
    /// Items that fail to map are logged and skipped. A failed page aborts
    /// the walk, except NotFound, which ends it: on the first page it means
    /// there are no items, later it means the list ran out.
    pub async fn fetch_with<T, F>(&self, ctx: &Context, base: &Request, map: F) -> Result<Vec<T>>
    where
        F: Fn(&Value) -> Result<T>,
    {
        let config = self.config;
        let limit = self.effective_limit();
        let mut out = Vec::new();
        let mut consumed = 0usize;
        let mut page = 0usize;

        loop {
            if self.max_pages != 0 && page >= self.max_pages {
                break;
            }

            let position = config.start_offset + consumed;
            let limit = match config.max_items {
                Some(cap) if position >= cap => break,
                Some(cap) => limit.min(cap - position),
                None => limit,
            };

            let mut request = base.clone();
            request.query.set(config.limit_param.clone(), limit);
            match &config.page_param {
                Some(param) => request.query.set(param.clone(), config.start_page + page),
                None => request.query.set(config.offset_param.clone(), position),
            }

            let response = match self.client.execute(ctx, request).await {
                Ok(response) => response,
                Err(err) if err.is(Sentinel::NotFound) => {
                    debug!(page, url = %base.url, "page not found, ending pagination");
                    break;
                }
                Err(err) => {
                    return Err(err.op("paginate").with_context("page", page));
                }
            };

            let body = response.json().op("paginate")?;
            let items = extract::walk(body, &config.items_path)?
                .as_array()
                .ok_or_else(|| {
                    Error::parse(format!("'{}' is not an array", config.items_path))
                        .with_context("page", page)
                })?;
            let n = items.len();

            for (i, item) in items.iter().enumerate() {
                match map(item) {
                    Ok(value) => out.push(value),
                    Err(err) => debug!(page, item = i, error = %err, "item skipped"),
                }
            }

            let mut more = n > 0;
            if let Some(path) = &config.has_more_path {
                more &= extract::walk(body, path)
                    .ok()
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
            }
            match config
                .total_path
                .as_ref()
                .and_then(|path| extract::walk(body, path).ok())
                .and_then(as_count)
            {
                Some(total) => more &= position + n < total,
                None if config.has_more_path.is_none() => more &= n >= limit,
                None => {}
            }

            consumed += n;
            page += 1;
            if !more {
                break;
            }
            ctx.sleep(self.throttle).await?;
        }

        Ok(out)
    }
}

fn as_count(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{RateLimiter, RawResponse, Transport};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    /// Serves `total` numbered items, honoring limit/offset or page params.
    #[derive(Debug)]
    struct ListServer {
        total: usize,
        report_total: bool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for ListServer {
        async fn send(&self, request: &Request, _timeout: Duration) -> Result<RawResponse> {
            self.calls.lock().push(request.url.clone());
            let url = url::Url::parse(&request.url)?;
            let param = |name: &str| {
                url.query_pairs()
                    .find(|(k, _)| k == name)
                    .and_then(|(_, v)| v.parse::<usize>().ok())
            };
            let limit = param("limit").unwrap_or(10);
            let offset = match param("page") {
                Some(page) => (page - 1) * limit,
                None => param("offset").unwrap_or(0),
            };
            if offset > self.total + limit {
                return Ok(RawResponse {
                    status: 404,
                    ..Default::default()
                });
            }
            let items: Vec<_> = (offset..(offset + limit).min(self.total))
                .map(|i| json!({"id": i}))
                .collect();
            let body = if self.report_total {
                json!({"total": self.total, "data": items})
            } else {
                json!({"data": items})
            };
            Ok(RawResponse {
                status: 200,
                body: serde_json::to_vec(&body)?.into(),
                ..Default::default()
            })
        }
    }

    fn server(total: usize, report_total: bool) -> (Arc<ListServer>, HttpClient) {
        let server = Arc::new(ListServer {
            total,
            report_total,
            calls: Mutex::new(Vec::new()),
        });
        let client = HttpClient::new()
            .with_transport(server.clone())
            .with_rate_limiter(Arc::new(RateLimiter::new()))
            .with_max_retries(0);
        (server, client)
    }

    #[tokio::test]
    async fn test_stops_on_total() {
        let (server, client) = server(23, true);
        let config = PaginationConfig::offset("data", "total").with_limits(10, 100);
        let items: Vec<Value> = Paginator::new(&client, &config)
            .fetch(
                &Context::background(),
                &Request::get("https://api.example/list"),
                None,
            )
            .await
            .unwrap();

        assert_eq!(items.len(), 23);
        assert_eq!(items[22]["id"], 22);
        assert_eq!(server.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_stops_on_short_page() {
        let (server, client) = server(25, false);
        let config = PaginationConfig::paged("page", "data").with_limits(10, 10);
        let ids: Vec<u64> = Paginator::new(&client, &config)
            .fetch_with(
                &Context::background(),
                &Request::get("https://site.example/list"),
                |item| Ok(item["id"].as_u64().unwrap_or_default()),
            )
            .await
            .unwrap();

        assert_eq!(ids.len(), 25);
        assert_eq!(server.calls.lock().len(), 3);
        assert!(server.calls.lock()[2].contains("page=3"));
    }

    #[tokio::test]
    async fn test_max_pages_and_limit_cap() {
        let (server, client) = server(1000, true);
        let config = PaginationConfig::offset("data", "total").with_limits(50, 20);
        let paginator = Paginator::new(&client, &config).max_pages(2);
        assert_eq!(paginator.effective_limit(), 20);

        let items: Vec<Value> = paginator
            .fetch(
                &Context::background(),
                &Request::get("https://api.example/list"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(items.len(), 40);
        assert_eq!(server.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_max_items_caps_the_walk() {
        let (server, client) = server(1000, true);
        let config = PaginationConfig::offset("data", "total")
            .with_limits(10, 10)
            .with_max_items(25);
        let items: Vec<Value> = Paginator::new(&client, &config)
            .fetch(
                &Context::background(),
                &Request::get("https://api.example/list"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(items.len(), 25);
        let calls = server.calls.lock();
        assert_eq!(calls.len(), 3);
        assert!(calls[2].contains("limit=5"));
    }

    #[tokio::test]
    async fn test_empty_source_is_one_fetch() {
        let (server, client) = server(0, true);
        let config = PaginationConfig::offset("data", "total");
        let items: Vec<Value> = Paginator::new(&client, &config)
            .fetch(
                &Context::background(),
                &Request::get("https://api.example/list"),
                None,
            )
            .await
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(server.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_items_are_skipped() {
        let (_, client) = server(5, true);
        let config = PaginationConfig::offset("data", "total");
        let ids: Vec<u64> = Paginator::new(&client, &config)
            .fetch_with(
                &Context::background(),
                &Request::get("https://api.example/list"),
                |item| match item["id"].as_u64() {
                    Some(id) if id % 2 == 0 => Ok(id),
                    _ => Err(Error::parse("odd")),
                },
            )
            .await
            .unwrap();
        assert_eq!(ids, [0, 2, 4]);
    }
}
