//! Per-domain minimum-interval rate limiting.
//!
//! Every request goes through [`RateLimiter::wait`] for its host before it is
//! sent. Requests to the same domain serialize behind that domain's lock;
//! requests to different domains never wait on each other.
//!
//! ```rust
//! use hondana::Context;
//! use hondana::net::rate_limit::RateLimiter;
//! use std::time::Duration;
//!
//! # async fn example() -> hondana::Result<()> {
//! let limiter = RateLimiter::new();
//! let ctx = Context::background();
//!
//! limiter.set_default("api.mangadex.org", Duration::from_millis(250));
//! limiter.wait(&ctx, "api.mangadex.org", Duration::ZERO).await?;
//! # Ok(())
//! # }
//! ```

use crate::context::Context;
use crate::error::Result;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

static GLOBAL: Lazy<Arc<RateLimiter>> = Lazy::new(|| Arc::new(RateLimiter::new()));

/// The process-wide limiter shared by every [`HttpClient`](super::HttpClient)
/// that was not given its own.
pub fn global() -> Arc<RateLimiter> {
    Arc::clone(&GLOBAL)
}

#[derive(Debug, Default)]
struct Gate {
    last: Mutex<Option<Instant>>,
    default_interval: parking_lot::Mutex<Duration>,
}

/// Per-domain minimum-interval gate.
///
/// The domain map sits behind a read-write lock; each domain's last-request
/// timestamp sits behind its own async lock, held while the caller sleeps.
#[derive(Debug, Default)]
pub struct RateLimiter {
    domains: RwLock<HashMap<String, Arc<Gate>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, domain: &str) -> Option<Arc<Gate>> {
        self.domains.read().get(domain).cloned()
    }

    fn gate(&self, domain: &str) -> Arc<Gate> {
        if let Some(gate) = self.existing(domain) {
            return gate;
        }
        Arc::clone(self.domains.write().entry(domain.to_string()).or_default())
    }

    /// Configures the interval used when callers pass a zero interval.
    pub fn set_default(&self, domain: &str, interval: Duration) {
        *self.gate(domain).default_interval.lock() = interval;
    }

    /// The configured default interval for `domain`, zero when unset.
    pub fn default_for(&self, domain: &str) -> Duration {
        self.existing(domain)
            .map(|gate| *gate.default_interval.lock())
            .unwrap_or_default()
    }

    /// Blocks until at least the effective interval has passed since the last
    /// request to `domain`, then records the current time.
    ///
    /// The effective interval is `interval` when non-zero, otherwise the
    /// domain's default. With neither, the call returns immediately. A wait
    /// interrupted by `ctx` fails with a Timeout error and leaves the
    /// recorded timestamp untouched.
    pub async fn wait(&self, ctx: &Context, domain: &str, interval: Duration) -> Result<()> {
        let gate = if interval.is_zero() {
            match self.existing(domain) {
                Some(gate) => gate,
                None => return Ok(()),
            }
        } else {
            self.gate(domain)
        };

        let effective = if interval.is_zero() {
            *gate.default_interval.lock()
        } else {
            interval
        };
        if effective.is_zero() {
            return Ok(());
        }

        let mut last = ctx.run(async { Ok(gate.last.lock().await) }).await?;
        if let Some(previous) = *last {
            let ready = previous + effective;
            let now = Instant::now();
            if ready > now {
                ctx.sleep(ready - now).await?;
            }
        }
        *last = Some(Instant::now());
        Ok(())
    }

    /// Forgets the timestamp and default interval of `domain`.
    pub fn reset(&self, domain: &str) {
        self.domains.write().remove(domain);
    }

    pub fn reset_all(&self) {
        self.domains.write().clear();
    }
}
