//! Error types and result handling for Hondana operations.
//!
//! Every failure that crosses a component boundary is an [`Error`]: a tracked
//! value that carries a [`Category`], an optional human-oriented message, the
//! underlying cause, a free-form context map and a call chain of [`Frame`]s
//! recorded as the error travels outward.
//!
//! # Categories
//!
//! Categories are a closed set used to drive retry decisions and user
//! guidance:
//!
//! - **Network**: connection issues, transport failures, 5xx after retries
//! - **Provider**: a provider misbehaved or is misconfigured
//! - **Parser**: HTML/JSON that does not have the expected shape
//! - **NotFound**: missing manga, chapters, providers or pages
//! - **RateLimit**: the remote side throttled us (HTTP 429)
//! - **Auth**: HTTP 401/403
//! - **FileSystem**: directory creation, writes and renames
//! - **Download**: one or more pages of a chapter failed
//! - **Timeout**: deadline expiry and cancellation (they collapse into one)
//! - **Panic**: a worker task panicked
//!
//! # Examples
//!
//! ```rust
//! use hondana::error::{Category, Error, ResultExt, Sentinel};
//!
//! fn lookup(id: &str) -> hondana::Result<String> {
//!     Err(Error::from_sentinel(Sentinel::NotFound, format!("manga {id}")))
//! }
//!
//! let err = lookup("abc")
//!     .with_context("provider", "mgd")
//!     .op("get_manga")
//!     .unwrap_err();
//!
//! assert_eq!(err.category(), Category::NotFound);
//! assert!(err.is(Sentinel::NotFound));
//! assert_eq!(err.context().get("provider").map(String::as_str), Some("mgd"));
//! assert!(err.to_string().starts_with("[NOT_FOUND]"));
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Type alias for Results with Hondana errors.
///
/// All public APIs in Hondana return this Result type.
///
/// ```rust
/// use hondana::{Error, Result};
///
/// fn example_with_error() -> Result<()> {
///     Err(Error::parse("Something went wrong"))
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// Context key under which HTTP status codes are recorded.
pub const STATUS_KEY: &str = "status";

/// The closed set of error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Network,
    Provider,
    Parser,
    NotFound,
    RateLimit,
    Auth,
    FileSystem,
    Download,
    Timeout,
    Panic,
}

impl Category {
    /// Upper-case tag used as the prefix of user-visible messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Network => "NETWORK",
            Category::Provider => "PROVIDER",
            Category::Parser => "PARSER",
            Category::NotFound => "NOT_FOUND",
            Category::RateLimit => "RATE_LIMIT",
            Category::Auth => "AUTH",
            Category::FileSystem => "FILESYSTEM",
            Category::Download => "DOWNLOAD",
            Category::Timeout => "TIMEOUT",
            Category::Panic => "PANIC",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known error values that callers can test for with [`Error::is`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request")]
    BadRequest,
    #[error("rate limited")]
    RateLimit,
    #[error("server error")]
    ServerError,
    #[error("parse error")]
    Parse,
}

impl Sentinel {
    /// The category an error built from this sentinel is filed under.
    pub fn category(self) -> Category {
        match self {
            Sentinel::NotFound => Category::NotFound,
            Sentinel::Unauthorized => Category::Auth,
            Sentinel::BadRequest => Category::Provider,
            Sentinel::RateLimit => Category::RateLimit,
            Sentinel::ServerError => Category::Network,
            Sentinel::Parse => Category::Parser,
        }
    }
}

pub const ERR_NOT_FOUND: Sentinel = Sentinel::NotFound;
pub const ERR_UNAUTHORIZED: Sentinel = Sentinel::Unauthorized;
pub const ERR_BAD_REQUEST: Sentinel = Sentinel::BadRequest;
pub const ERR_RATE_LIMIT: Sentinel = Sentinel::RateLimit;
pub const ERR_SERVER_ERROR: Sentinel = Sentinel::ServerError;
pub const ERR_PARSE: Sentinel = Sentinel::Parse;

/// The underlying cause wrapped by a tracked [`Error`].
#[derive(Error, Debug)]
pub enum Cause {
    /// Transport errors from the HTTP client (reqwest).
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// File system and IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization and deserialization errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// URLs that could not be parsed or joined.
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// Errors from tokio tasks.
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Sentinel(#[from] Sentinel),

    /// Any other error type.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("{0}")]
    Message(String),

    /// An already-tracked error with an extra message layer on top.
    #[error("{}", .0.describe())]
    Wrapped(Box<Error>),

    /// Several errors reported together.
    #[error("{}", describe_all(.0))]
    Joined(Vec<Error>),
}

fn describe_all(errors: &[Error]) -> String {
    errors
        .iter()
        .map(Error::describe)
        .collect::<Vec<_>>()
        .join("; ")
}

/// One step of a call chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub file: &'static str,
    pub line: u32,
    pub operation: String,
    pub context: BTreeMap<String, String>,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.operation, self.file, self.line)?;
        for (key, value) in &self.context {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Inner {
    message: Option<String>,
    category: Category,
    cause: Cause,
    context: BTreeMap<String, String>,
    frames: Vec<Frame>,
}

/// A tracked, categorized error.
///
/// Build one with the category constructors ([`Error::network`],
/// [`Error::parse`], ...), from a [`Sentinel`], or by converting any of the
/// wrapped error types with `?`. Converting an `Error` into an `Error` is the
/// identity, so re-tracking never loses the call chain.
pub struct Error {
    inner: Box<Inner>,
}

impl Error {
    fn build(category: Category, message: Option<String>, cause: Cause) -> Self {
        Self {
            inner: Box::new(Inner {
                message,
                category,
                cause,
                context: BTreeMap::new(),
                frames: Vec::new(),
            }),
        }
    }

    /// Creates an error of the given category from a plain message.
    pub fn new(category: Category, msg: impl Into<String>) -> Self {
        Self::build(category, None, Cause::Message(msg.into()))
    }

    /// Creates an error from a sentinel with an explanatory message.
    pub fn from_sentinel(sentinel: Sentinel, msg: impl Into<String>) -> Self {
        Self::build(
            sentinel.category(),
            Some(msg.into()),
            Cause::Sentinel(sentinel),
        )
    }

    /// Tracks an arbitrary error.
    ///
    /// If the boxed error already is a tracked [`Error`] it is returned as-is,
    /// chain and context included.
    pub fn track(
        err: Box<dyn std::error::Error + Send + Sync + 'static>,
        category: Category,
    ) -> Self {
        match err.downcast::<Error>() {
            Ok(tracked) => *tracked,
            Err(other) => Self::build(category, None, Cause::Other(other)),
        }
    }

    /// Joins several errors into one.
    ///
    /// Returns `None` for an empty set and the error itself for a set of one.
    /// The joined error takes the category of its first member.
    pub fn join(mut errors: Vec<Error>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => {
                let category = errors[0].category();
                Some(Self::build(category, None, Cause::Joined(errors)))
            }
        }
    }

    /// Creates a parser error with the given message.
    ///
    /// ```rust
    /// use hondana::Error;
    ///
    /// let error = Error::parse(format!("Expected {} chapters, found {}", 10, 5));
    /// ```
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::from_sentinel(Sentinel::Parse, msg)
    }

    /// Creates a not-found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::from_sentinel(Sentinel::NotFound, msg)
    }

    /// Creates a provider error tagged with the provider id.
    ///
    /// ```rust
    /// use hondana::Error;
    ///
    /// let error = Error::provider("mgd", "API endpoint not configured");
    /// assert!(error.to_string().contains("mgd"));
    /// ```
    pub fn provider(provider_id: impl Into<String>, msg: impl Into<String>) -> Self {
        let provider_id = provider_id.into();
        Self::new(
            Category::Provider,
            format!("{}: {}", provider_id, msg.into()),
        )
        .with_context("provider", provider_id)
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(Category::Network, msg)
    }

    /// Creates a rate limit error, optionally carrying the `Retry-After` delay.
    pub fn rate_limit(retry_after: Option<u64>) -> Self {
        let err = Self::from_sentinel(Sentinel::RateLimit, "too many requests");
        match retry_after {
            Some(secs) => err.with_context("retry_after", secs),
            None => err,
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(Category::Timeout, msg)
    }

    /// The error reported when a context is cancelled or its deadline passes.
    pub fn cancelled() -> Self {
        Self::timeout("operation cancelled or deadline exceeded")
    }

    pub fn filesystem(msg: impl Into<String>) -> Self {
        Self::new(Category::FileSystem, msg)
    }

    pub fn download(msg: impl Into<String>) -> Self {
        Self::new(Category::Download, msg)
    }

    /// Creates an error for a non-success HTTP status.
    pub fn from_status(status: u16, url: &str) -> Self {
        let sentinel = match status {
            404 => Sentinel::NotFound,
            401 | 403 => Sentinel::Unauthorized,
            429 => Sentinel::RateLimit,
            500..=599 => Sentinel::ServerError,
            _ => Sentinel::BadRequest,
        };
        Self::from_sentinel(sentinel, format!("HTTP {status} for {url}"))
            .with_context(STATUS_KEY, status)
            .with_context("url", url)
    }

    pub fn category(&self) -> Category {
        self.inner.category
    }

    /// The outermost message layer, if any.
    pub fn message(&self) -> Option<&str> {
        self.inner.message.as_deref()
    }

    pub fn cause(&self) -> &Cause {
        &self.inner.cause
    }

    /// Attaches a key/value pair to the error's context.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.inner.context.insert(key.into(), value.to_string());
        self
    }

    /// Re-files the error under another category.
    pub fn categorize(mut self, category: Category) -> Self {
        self.inner.category = category;
        self
    }

    /// Adds a message layer on top of this error.
    ///
    /// The wrapped error stays reachable, so [`Error::is`] and
    /// [`Error::context`] still see through the new layer.
    pub fn wrap(self, msg: impl Into<String>) -> Self {
        let category = self.category();
        Self::build(category, Some(msg.into()), Cause::Wrapped(Box::new(self)))
    }

    /// Records a call frame for `operation` at the caller's location.
    #[track_caller]
    pub fn op(self, operation: impl Into<String>) -> Self {
        self.op_with(operation, BTreeMap::new())
    }

    /// Records a call frame carrying its own context.
    #[track_caller]
    pub fn op_with(
        mut self,
        operation: impl Into<String>,
        context: BTreeMap<String, String>,
    ) -> Self {
        let location = Location::caller();
        self.inner.frames.push(Frame {
            file: location.file(),
            line: location.line(),
            operation: operation.into(),
            context,
        });
        self
    }

    /// Frames recorded on this error and every error it wraps, innermost first.
    pub fn call_chain(&self) -> Vec<&Frame> {
        let mut frames = match &self.inner.cause {
            Cause::Wrapped(inner) => inner.call_chain(),
            _ => Vec::new(),
        };
        frames.extend(self.inner.frames.iter());
        frames
    }

    /// The members of a joined error; empty for any other error.
    pub fn errors(&self) -> &[Error] {
        match &self.inner.cause {
            Cause::Joined(errors) => errors,
            _ => &[],
        }
    }

    /// Walks the wrapping chain looking for `sentinel`.
    pub fn is(&self, sentinel: Sentinel) -> bool {
        match &self.inner.cause {
            Cause::Sentinel(s) => *s == sentinel,
            Cause::Json(_) | Cause::Url(_) => sentinel == Sentinel::Parse,
            Cause::Wrapped(inner) => inner.is(sentinel),
            Cause::Joined(errors) => errors.iter().any(|e| e.is(sentinel)),
            _ => false,
        }
    }

    /// Union of this error's context with the context of every frame in its
    /// call chain. Inner values win over outer ones on key collisions.
    pub fn context(&self) -> BTreeMap<String, String> {
        let mut merged = BTreeMap::new();
        self.collect_context(&mut merged);
        merged
    }

    fn collect_context(&self, merged: &mut BTreeMap<String, String>) {
        // Outermost first so that later (inner) inserts overwrite.
        for frame in self.inner.frames.iter().rev() {
            merged.extend(frame.context.clone());
        }
        merged.extend(self.inner.context.clone());
        if let Cause::Wrapped(inner) = &self.inner.cause {
            inner.collect_context(merged);
        }
    }

    /// The HTTP status recorded in the context, if any.
    pub fn status_code(&self) -> Option<u16> {
        self.context().get(STATUS_KEY).and_then(|s| s.parse().ok())
    }

    /// Whether retrying the failed operation can reasonably succeed.
    ///
    /// True for Network, Timeout and RateLimit errors, unless a recorded
    /// status code says the failure was a non-429 client error.
    pub fn is_retryable(&self) -> bool {
        let transient = matches!(
            self.category(),
            Category::Network | Category::Timeout | Category::RateLimit
        );
        transient
            && match self.status_code() {
                None => true,
                Some(status) => status >= 500 || status == 429,
            }
    }

    /// Whether this error came from cancellation or an expired deadline.
    pub fn is_cancelled(&self) -> bool {
        self.category() == Category::Timeout
    }

    /// The message chain without the category prefix.
    pub fn describe(&self) -> String {
        match &self.inner.message {
            Some(msg) => format!("{}: {}", msg, self.inner.cause),
            None => self.inner.cause.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category(), self.describe())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.inner.cause {
            Cause::Http(e) => Some(e),
            Cause::Io(e) => Some(e),
            Cause::Json(e) => Some(e),
            Cause::Url(e) => Some(e),
            Cause::Join(e) => Some(e),
            Cause::Sentinel(e) => Some(e),
            Cause::Other(e) => Some(e.as_ref()),
            Cause::Wrapped(e) => Some(e.as_ref()),
            Cause::Message(_) | Cause::Joined(_) => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let category = if err.is_timeout() {
            Category::Timeout
        } else {
            Category::Network
        };
        let status = err.status().map(|s| s.as_u16());
        let url = err.url().map(|u| u.to_string());
        let mut tracked = Self::build(category, None, Cause::Http(err));
        if let Some(status) = status {
            tracked = tracked.with_context(STATUS_KEY, status);
        }
        if let Some(url) = url {
            tracked = tracked.with_context("url", url);
        }
        tracked
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::build(Category::FileSystem, None, Cause::Io(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::build(Category::Parser, None, Cause::Json(err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::build(Category::Parser, None, Cause::Url(err))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        let category = if err.is_panic() {
            Category::Panic
        } else {
            Category::Timeout
        };
        Self::build(category, None, Cause::Join(err))
    }
}

impl From<Sentinel> for Error {
    fn from(sentinel: Sentinel) -> Self {
        Self::build(sentinel.category(), None, Cause::Sentinel(sentinel))
    }
}

/// Context helpers for any `Result` whose error converts into [`Error`].
pub trait ResultExt<T> {
    /// Attaches a key/value pair to the error, if any.
    fn with_context(self, key: &str, value: impl ToString) -> Result<T>;

    /// Records a call frame for `operation` at the caller's location.
    #[track_caller]
    fn op(self, operation: &str) -> Result<T>;

    /// Adds a message layer to the error, if any.
    fn wrap_err(self, msg: impl Into<String>) -> Result<T>;

    /// Re-files the error, if any, under `category`.
    fn categorize(self, category: Category) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn with_context(self, key: &str, value: impl ToString) -> Result<T> {
        self.map_err(|e| e.into().with_context(key, value.to_string()))
    }

    #[track_caller]
    fn op(self, operation: &str) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(e) => Err(e.into().op(operation)),
        }
    }

    fn wrap_err(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().wrap(msg))
    }

    fn categorize(self, category: Category) -> Result<T> {
        self.map_err(|e| e.into().categorize(category))
    }
}

/// Remediation hints for an error, most relevant first.
///
/// Hints come from the category plus substring hints found in the error's
/// message chain.
pub fn suggestions(err: &Error) -> Vec<&'static str> {
    let text = err.describe().to_lowercase();
    let mut hints = Vec::new();

    let substring_hints: [(&str, &'static str); 7] = [
        (
            "no such host",
            "Check the provider's domain; it may have moved or DNS is unavailable",
        ),
        (
            "connection refused",
            "The server refused the connection; try again later",
        ),
        (
            "timeout",
            "The request timed out; retry or raise the timeout",
        ),
        (
            "tls",
            "A TLS handshake failed; check system certificates or proxies",
        ),
        (
            "permission",
            "Check write permissions on the output directory",
        ),
        ("no space", "Free up disk space on the output volume"),
        (
            "no such file",
            "Make sure the output directory path exists and is spelled correctly",
        ),
    ];
    for (needle, hint) in substring_hints {
        if text.contains(needle) {
            hints.push(hint);
        }
    }

    let by_category: &[&'static str] = match err.category() {
        Category::Network => &[
            "Check your internet connection",
            "The provider may be down; try another provider",
        ],
        Category::Provider => &["The provider may have changed its site; try another provider"],
        Category::Parser => &["The provider's response format changed; try another provider"],
        Category::NotFound => &[
            "Verify the identifier with `search` or `info`",
            "Identifiers look like <provider>:<id>",
        ],
        Category::RateLimit => &["Wait a moment before retrying", "Lower --concurrent"],
        Category::Auth => &["This content requires access the provider does not grant"],
        Category::FileSystem => &["Check the output directory"],
        Category::Download => &["Re-run the download; finished pages are skipped"],
        Category::Timeout => &["Retry the operation", "Narrow the search with --provider"],
        Category::Panic => &["This is a bug; please report it with --debug output"],
    };
    for hint in by_category {
        if !hints.contains(hint) {
            hints.push(hint);
        }
    }

    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_survives_wrapping() {
        let err = Error::not_found("chapter 12")
            .wrap("loading chapter")
            .wrap("download");

        assert!(err.is(Sentinel::NotFound));
        assert!(!err.is(Sentinel::Parse));
        assert_eq!(err.category(), Category::NotFound);
        assert_eq!(
            err.to_string(),
            "[NOT_FOUND] download: loading chapter: chapter 12: not found"
        );
    }

    #[test]
    fn test_tracking_is_idempotent() {
        let original = Error::network("boom").with_context("k", "v").op("fetch");
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(original);
        let tracked = Error::track(boxed, Category::Parser);

        assert_eq!(tracked.category(), Category::Network);
        assert_eq!(tracked.call_chain().len(), 1);
        assert_eq!(tracked.context().get("k").map(String::as_str), Some("v"));
    }

    #[test]
    fn test_foreign_errors_are_tracked_under_given_category() {
        let boxed: Box<dyn std::error::Error + Send + Sync> = "oops".into();
        let tracked = Error::track(boxed, Category::Provider);
        assert_eq!(tracked.category(), Category::Provider);
        assert_eq!(tracked.describe(), "oops");
    }

    #[test]
    fn test_inner_context_wins() {
        let mut frame_ctx = BTreeMap::new();
        frame_ctx.insert("page".to_string(), "outer".to_string());
        frame_ctx.insert("frame_only".to_string(), "yes".to_string());

        let err = Error::parse("bad")
            .with_context("page", "inner")
            .op_with("decode", frame_ctx)
            .wrap("outer layer")
            .with_context("layer", "outer");

        let ctx = err.context();
        assert_eq!(ctx.get("page").map(String::as_str), Some("inner"));
        assert_eq!(ctx.get("frame_only").map(String::as_str), Some("yes"));
        assert_eq!(ctx.get("layer").map(String::as_str), Some("outer"));
    }

    #[test]
    fn test_retryability() {
        assert!(Error::network("reset").is_retryable());
        assert!(Error::cancelled().is_retryable());
        assert!(Error::from_status(503, "u").categorize(Category::Network).is_retryable());
        assert!(Error::from_status(429, "u").is_retryable());
        assert!(!Error::from_status(404, "u").is_retryable());
        assert!(
            !Error::network("client")
                .with_context(STATUS_KEY, 400)
                .is_retryable()
        );
        assert!(!Error::parse("nope").is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert!(Error::from_status(404, "u").is(Sentinel::NotFound));
        assert_eq!(Error::from_status(401, "u").category(), Category::Auth);
        assert_eq!(Error::from_status(403, "u").category(), Category::Auth);
        assert_eq!(Error::from_status(429, "u").category(), Category::RateLimit);
        assert!(Error::from_status(418, "u").is(Sentinel::BadRequest));
        assert!(Error::from_status(502, "u").is(Sentinel::ServerError));
        assert_eq!(Error::from_status(502, "u").status_code(), Some(502));
    }

    #[test]
    fn test_join() {
        assert!(Error::join(vec![]).is_none());

        let single = Error::join(vec![Error::parse("a")]).unwrap();
        assert_eq!(single.category(), Category::Parser);

        let joined = Error::join(vec![Error::network("a"), Error::not_found("b")]).unwrap();
        assert_eq!(joined.errors().len(), 2);
        assert!(joined.is(Sentinel::NotFound));
        assert_eq!(joined.category(), Category::Network);

        let reversed = Error::join(vec![Error::not_found("b"), Error::network("a")]).unwrap();
        assert_eq!(reversed.category(), Category::NotFound);
        assert!(reversed.is(Sentinel::NotFound));
    }

    #[test]
    fn test_result_ext_records_frames() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::other("disk"));
        let err = res
            .with_context("path", "/tmp/x")
            .op("write_page")
            .unwrap_err();

        assert_eq!(err.category(), Category::FileSystem);
        let chain = err.call_chain();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].operation, "write_page");
        assert!(chain[0].file.ends_with("error.rs"));
    }

    #[test]
    fn test_suggestions() {
        let err = Error::network("dns error: no such host");
        let hints = suggestions(&err);
        assert!(hints[0].contains("domain"));
        assert!(hints.contains(&"Check your internet connection"));

        let hints = suggestions(&Error::filesystem("permission denied"));
        assert!(hints[0].contains("permissions"));
    }
}
