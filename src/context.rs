//! Call Context
//!
//! A cancellable, deadline-aware handle that governs one discovery or scrape
//! call tree. Every remote call goes through [`CallContext::bounded`], which
//! races the call against its per-call timeout, the tree-wide deadline and
//! the cancellation token.

use crate::error::{ExporterError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context with no deadline, cancelled only explicitly.
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Derive a context sharing this deadline whose cancellation also
    /// follows the parent's.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a context bound to an existing token, e.g. the server's
    /// shutdown token.
    pub fn from_token(cancel: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { cancel, deadline }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with [`ExporterError::Cancelled`] once cancelled or past the deadline.
    pub fn check(&self) -> Result<()> {
        if self.is_done() {
            Err(ExporterError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Wait until the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }

    /// Run one remote call under `timeout`.
    ///
    /// Hitting the per-call timeout yields [`ExporterError::Timeout`]; hitting
    /// the context deadline or cancellation yields [`ExporterError::Cancelled`].
    pub async fn bounded<T, F>(&self, operation: &str, timeout: Duration, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        let call_limit = Instant::now() + timeout;
        let (limit, limited_by_deadline) = match self.deadline {
            Some(deadline) if deadline < call_limit => (deadline, true),
            _ => (call_limit, false),
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(ExporterError::Cancelled),
            outcome = tokio::time::timeout_at(limit, call) => match outcome {
                Ok(result) => result,
                Err(_) if limited_by_deadline => Err(ExporterError::Cancelled),
                Err(_) => Err(ExporterError::Timeout(format!(
                    "{} did not complete within {:?}",
                    operation, timeout
                ))),
            },
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_returns_call_result() {
        let ctx = CallContext::new();
        let value = ctx
            .bounded("noop", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn per_call_timeout_is_a_timeout() {
        let ctx = CallContext::new();
        let err = ctx
            .bounded("slow", Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExporterError::Timeout(_)));
    }

    #[tokio::test]
    async fn deadline_is_a_cancellation() {
        let ctx = CallContext::with_timeout(Duration::from_millis(10));
        let err = ctx
            .bounded("slow", Duration::from_secs(5), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test]
    async fn cancelled_parent_cancels_child() {
        let parent = CallContext::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.check().unwrap_err().is_cancellation());
    }
}
