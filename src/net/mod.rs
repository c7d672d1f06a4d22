//! Network utilities for HTTP requests, rate limiting, and content parsing.
//!
//! This module provides the networking infrastructure for Hondana, including:
//!
//! - **HTTP Client**: [`HttpClient`] executes [`Request`]s with retries and backoff
//! - **Rate Limiting**: a per-domain gate in [`rate_limit`]
//! - **Transport**: the [`Transport`] seam, backed by a pooled reqwest client
//! - **Content Parsing**: lazy JSON and HTML views on [`Response`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use hondana::Context;
//! use hondana::net::{HttpClient, Request};
//!
//! # async fn example() -> hondana::Result<()> {
//! let ctx = Context::background();
//! let client = HttpClient::new()
//!     .with_rate_limit(500)  // 500ms between requests to one domain
//!     .with_max_retries(3);
//!
//! let response = client
//!     .execute(&ctx, Request::get("https://api.mangadex.org/manga").param("title", "berserk"))
//!     .await?;
//! let total = response.json()?.get("total").cloned();
//! # Ok(())
//! # }
//! ```

use crate::context::Context;
use crate::error::{Error, Result, ResultExt};
use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::{Lazy, OnceCell};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub mod html;
pub mod json;
pub mod rate_limit;

pub use html::{Document, Node};
pub use rate_limit::RateLimiter;

/// Upper bound of a single backoff sleep between attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub const USER_AGENT: &str = concat!("Hondana/", env!("CARGO_PKG_VERSION"));

/// Global HTTP client instance.
///
/// This client is configured with:
/// - Connection pooling (10 idle connections per host)
/// - Compression support (gzip, brotli)
/// - Custom User-Agent header
///
/// Timeouts are applied per request. The client is created lazily on first
/// use and shared by every [`ReqwestTransport`].
static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(10)
        .gzip(true)
        .brotli(true)
        .build()
        .unwrap_or_else(|_| Client::new())
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// Ordered query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query(Vec<(String, String)>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every value of `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        self.0.retain(|(k, _)| *k != key);
        self.0.push((key, value.to_string()));
    }

    /// Appends a value, keeping earlier ones; used for `key[]` style lists.
    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.push((key.into(), value.to_string()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn extend(&mut self, other: &Query) {
        for (k, v) in &other.0 {
            self.push(k.clone(), v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A request value handed to [`HttpClient::execute`].
///
/// Overrides left as `None` fall back to the client's settings.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Query,
    pub body: Option<Bytes>,
    pub form: Option<Vec<(String, String)>>,
    pub rate_limit: Option<Duration>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.set(key, value);
        self
    }

    pub fn query(mut self, query: Query) -> Self {
        self.query.extend(&query);
        self
    }

    /// Sets a form-encoded body; switches the method to POST.
    pub fn form<K, V, I>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.method = Method::Post;
        self.form = Some(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn rate_limit(mut self, interval: Duration) -> Self {
        self.rate_limit = Some(interval);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// The URL with the query parameters appended.
    pub fn full_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url).with_context("url", &self.url)?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in self.query.iter() {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What a [`Transport`] returns: the status line, headers and raw body.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    /// Final URL after redirects.
    pub url: String,
}

/// Sends one fully prepared request.
///
/// The request handed over already carries the client's default headers and
/// has its query folded into `url`.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(&self, request: &Request, timeout: Duration) -> Result<RawResponse>;
}

/// The default transport, backed by the shared reqwest connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self {
            client: CLIENT.clone(),
        }
    }
}

impl ReqwestTransport {
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &Request, timeout: Duration) -> Result<RawResponse> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, &request.url).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        } else if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            headers,
            body,
            url,
        })
    }
}

/// A successful response with lazily decoded views.
///
/// The JSON and text views are computed on first access and cached. HTML
/// documents are rebuilt from the cached text on each call to
/// [`Response::html`] so the response itself stays `Send`.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    pub url: Url,
    pub method: Method,
    json: OnceCell<Value>,
    text: OnceCell<String>,
}

/// The body as picked by content-type sniffing.
///
/// The HTML side is the cached text; parse it with [`Document::parse`] only
/// when a tree is needed.
pub enum Body<'a> {
    Json(&'a Value),
    Html(&'a str),
}

impl Response {
    pub fn new(raw: RawResponse, method: Method, requested: Url) -> Self {
        let url = Url::parse(&raw.url).unwrap_or(requested);
        Self {
            status: raw.status,
            headers: raw.headers,
            body: raw.body,
            url,
            method,
            json: OnceCell::new(),
            text: OnceCell::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// The body as text, decoded lossily once.
    pub fn text(&self) -> &str {
        self.text
            .get_or_init(|| String::from_utf8_lossy(&self.body).into_owned())
    }

    /// The body as a JSON value, parsed once.
    pub fn json(&self) -> Result<&Value> {
        self.json
            .get_or_try_init(|| json::decode::<Value>(&self.body))
            .with_context("url", &self.url)
    }

    /// Decodes the body into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        json::decode(&self.body).with_context("url", &self.url)
    }

    /// Parses the body as an HTML document whose base is the response URL.
    ///
    /// The tree is not cached: `Document` is not `Send`, and a response is
    /// held across await points. Each call parses again, so call it once
    /// and keep the result.
    pub fn html(&self) -> Document {
        Document::parse(self.text()).with_base(self.url.clone())
    }

    /// Whether the body looks like JSON, by content type or leading byte.
    pub fn is_json(&self) -> bool {
        if let Some(ct) = self.content_type() {
            if ct.contains("json") {
                return true;
            }
            if ct.contains("html") {
                return false;
            }
        }
        matches!(
            self.body.iter().find(|b| !b.is_ascii_whitespace()),
            Some(b'{') | Some(b'[')
        )
    }

    /// Picks the JSON or HTML view by sniffing the content.
    pub fn sniff(&self) -> Result<Body<'_>> {
        if self.is_json() {
            Ok(Body::Json(self.json()?))
        } else {
            Ok(Body::Html(self.text()))
        }
    }
}

/// HTTP client with per-domain rate limiting and retry logic.
///
/// Clones share the transport and the rate limiter.
///
/// # Features
///
/// - **Rate Limiting**: every attempt waits on the request's domain first
/// - **Retry Logic**: transport errors, 5xx and 429 back off `min(2^n, 30)`
///   seconds and retry up to the configured count
/// - **Status Mapping**: terminal statuses become categorized errors
/// - **Cancellation**: every wait observes the caller's [`Context`]
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    headers: Vec<(String, String)>,
    rate_limit: Duration,
    max_retries: u32,
    timeout: Duration,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("transport", &self.transport)
            .field("headers", &self.headers)
            .field("rate_limit", &self.rate_limit)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the shared transport and the global limiter.
    ///
    /// Defaults: no rate limit of its own, 3 retries, 30 second timeout.
    pub fn new() -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::default()),
            limiter: rate_limit::global(),
            headers: Vec::new(),
            rate_limit: Duration::ZERO,
            max_retries: 3,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the minimum delay between requests to one domain.
    ///
    /// ```rust
    /// use hondana::net::HttpClient;
    ///
    /// let client = HttpClient::new().with_rate_limit(1000); // 1 second
    /// ```
    pub fn with_rate_limit(mut self, delay_ms: u64) -> Self {
        self.rate_limit = Duration::from_millis(delay_ms);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a header sent with every request made by this client.
    ///
    /// ```rust
    /// use hondana::net::HttpClient;
    ///
    /// let client = HttpClient::new()
    ///     .with_header("Referer", "https://example.com");
    /// ```
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn prepare(&self, request: Request, url: &Url) -> Request {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .filter(|(k, _)| request.header_value(k).is_none())
            .cloned()
            .collect();
        headers.extend(request.headers);
        Request {
            url: url.to_string(),
            query: Query::new(),
            headers,
            ..request
        }
    }

    /// Executes a request with rate limiting, retries and status mapping.
    ///
    /// # Errors
    ///
    /// * NotFound for 404, Auth for 401/403, Provider (bad request) for
    ///   other 4xx
    /// * RateLimit for 429 and Network (server error) for 5xx once retries
    ///   are exhausted
    /// * Network or Timeout for transport failures
    /// * Timeout as soon as `ctx` is cancelled or past its deadline
    pub async fn execute(&self, ctx: &Context, request: Request) -> Result<Response> {
        let url = request.full_url().op("execute")?;
        let domain = url.host_str().unwrap_or_default().to_string();
        let interval = request.rate_limit.unwrap_or(self.rate_limit);
        let timeout = request.timeout.unwrap_or(self.timeout);
        let max_retries = request.max_retries.unwrap_or(self.max_retries);
        let outgoing = self.prepare(request, &url);

        let mut attempt: u32 = 0;
        loop {
            ctx.check()?;
            self.limiter.wait(ctx, &domain, interval).await?;

            let scoped = ctx.with_timeout(timeout);
            let outcome = scoped.run(self.transport.send(&outgoing, timeout)).await;

            let failure = match outcome {
                Ok(raw) if (200..300).contains(&raw.status) => {
                    return Ok(Response::new(raw, outgoing.method, url));
                }
                Ok(raw) => {
                    let retry_after = raw
                        .headers
                        .get("retry-after")
                        .and_then(|v| v.trim().parse::<u64>().ok());
                    let mut err = Error::from_status(raw.status, &outgoing.url);
                    if let Some(secs) = retry_after {
                        err = err.with_context("retry_after", secs);
                    }
                    if raw.status < 500 && raw.status != 429 {
                        return Err(err.with_context("method", outgoing.method));
                    }
                    err
                }
                Err(_) if ctx.is_done() => {
                    return Err(Error::cancelled().with_context("url", &outgoing.url));
                }
                Err(err) => err,
            };

            if attempt >= max_retries {
                return Err(failure
                    .with_context("attempts", attempt + 1)
                    .with_context("method", outgoing.method));
            }

            let backoff = Duration::from_secs(2u64.saturating_pow(attempt)).min(MAX_BACKOFF);
            warn!(
                url = %outgoing.url,
                attempt = attempt + 1,
                backoff_secs = backoff.as_secs(),
                error = %failure,
                "request failed, retrying"
            );
            ctx.sleep(backoff).await?;
            attempt += 1;
        }
    }

    /// Performs a GET request.
    pub async fn get(&self, ctx: &Context, url: &str) -> Result<Response> {
        debug!(url, "GET");
        self.execute(ctx, Request::get(url)).await
    }

    /// Performs a GET request and returns the body as text.
    pub async fn get_text(&self, ctx: &Context, url: &str) -> Result<String> {
        let response = self.get(ctx, url).await?;
        Ok(response.text().to_string())
    }

    /// Performs a GET request and deserializes the JSON body.
    pub async fn get_json<T>(&self, ctx: &Context, url: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.get(ctx, url).await?.decode()
    }

    /// Posts a form-encoded body.
    pub async fn post_form<K, V, I>(&self, ctx: &Context, url: &str, fields: I) -> Result<Response>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        debug!(url, "POST");
        self.execute(ctx, Request::post(url).form(fields)).await
    }
}
