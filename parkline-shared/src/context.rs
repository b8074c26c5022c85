/// Per-call cancellation and deadlines
///
/// Every store round trip takes a [`CallContext`] from its caller. The
/// context carries a `CancellationToken` and an optional timeout; the call
/// is abandoned as soon as either fires.
///
/// # Example
///
/// ```no_run
/// use parkline_shared::context::CallContext;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let shutdown = CancellationToken::new();
/// let ctx = CallContext::new(shutdown.child_token()).with_timeout(Duration::from_secs(2));
///
/// let value = ctx.run(async { 42 }).await;
/// assert_eq!(value.unwrap(), 42);
/// # }
/// ```

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a call did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    /// The caller's token was cancelled
    #[error("call cancelled")]
    Cancelled,

    /// The caller's deadline passed
    #[error("call timed out after {0:?}")]
    TimedOut(Duration),
}

/// Cancellation token plus optional deadline for one call
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl CallContext {
    /// Creates a context bound to `cancel`, without a deadline
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            timeout: None,
        }
    }

    /// Context that is never cancelled and has no deadline
    ///
    /// Only the transport's own timeout applies.
    pub fn background() -> Self {
        Self::default()
    }

    /// Sets a deadline for calls made with this context
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The token calls observe
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Configured deadline, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Drives `fut` until it completes, the token fires or the deadline passes
    pub async fn run<F, T>(&self, fut: F) -> Result<T, Interrupted>
    where
        F: Future<Output = T>,
    {
        if self.cancel.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }

        let bounded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| Interrupted::TimedOut(limit)),
                None => Ok(fut.await),
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            result = bounded => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = CallContext::background();
        assert_eq!(ctx.run(async { "done" }).await, Ok("done"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = CallContext::new(token);

        assert_eq!(ctx.run(async { 1 }).await, Err(Interrupted::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires() {
        let ctx = CallContext::background().with_timeout(Duration::from_millis(50));
        let slow = tokio::time::sleep(Duration::from_secs(10));

        assert_eq!(
            ctx.run(slow).await,
            Err(Interrupted::TimedOut(Duration::from_millis(50)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_running() {
        let token = CancellationToken::new();
        let ctx = CallContext::new(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let result = ctx.run(tokio::time::sleep(Duration::from_secs(60))).await;
        assert_eq!(result, Err(Interrupted::Cancelled));
        canceller.await.unwrap();
    }
}
