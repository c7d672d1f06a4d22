//! Cooperative cancellation and deadlines.
//!
//! A [`Context`] is passed into every operation that can suspend: HTTP
//! requests, rate-limit waits, pagination throttles and download workers.
//! Cancelling it, or letting its deadline pass, makes every suspension point
//! observing it return a [`Category::Timeout`](crate::error::Category) error.
//!
//! ```rust
//! use hondana::Context;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let ctx = Context::background().with_timeout(Duration::from_secs(30));
//! let child = ctx.with_cancel();
//!
//! ctx.cancel();
//! assert!(child.is_done());
//! # }
//! ```

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation signal plus optional deadline, cheap to clone.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derives a child whose deadline is the earlier of the parent's and
    /// `now + timeout`. Cancelling the parent cancels the child.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing <= candidate => existing,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Derives a child that can be cancelled on its own.
    pub fn with_cancel(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Whether the context was cancelled or its deadline has passed.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fails with a Timeout error once the context is done.
    pub fn check(&self) -> Result<()> {
        if self.is_done() {
            Err(Error::cancelled())
        } else {
            Ok(())
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Runs `fut` until it completes or the context is done, whichever
    /// comes first. A done context wins ties.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.done() => Err(Error::cancelled()),
            out = fut => out,
        }
    }

    /// Sleeps for `duration`, waking early with a Timeout error if the
    /// context is done first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        if duration.is_zero() {
            return self.check();
        }
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Category;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_sleep() {
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let start = Instant::now();
        let err = ctx.sleep(Duration::from_secs(10)).await.unwrap_err();

        assert_eq!(err.category(), Category::Timeout);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_cancel_propagates_to_children() {
        let parent = Context::background();
        let child = parent.with_timeout(Duration::from_secs(60));
        parent.cancel();

        assert!(child.is_done());
        assert!(child.check().is_err());
        let res = child.run(async { Ok(1) }).await;
        assert!(res.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_child_keeps_earlier_deadline() {
        let parent = Context::background().with_timeout(Duration::from_secs(5));
        let child = parent.with_timeout(Duration::from_secs(50));
        assert_eq!(parent.deadline(), child.deadline());
    }

    #[tokio::test]
    async fn test_run_passes_value_through() {
        let ctx = Context::background();
        assert_eq!(ctx.run(async { Ok(7) }).await.unwrap(), 7);
    }
}
