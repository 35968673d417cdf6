use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ArchiveError, Result};

/// Cancellation scope for a single request.
///
/// Cloned into the producer task; the handler keeps its own copy so it can
/// cancel the producer when the response delivery is abandoned.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fail with [`ArchiveError::Cancelled`] once cancelled or past the deadline.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(ArchiveError::Cancelled {
                reason: "cancelled",
            });
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ArchiveError::Cancelled {
                    reason: "deadline exceeded",
                });
            }
        }
        Ok(())
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn cancelled(&self) -> ArchiveError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => ArchiveError::Cancelled { reason: "cancelled" },
                _ = tokio::time::sleep_until(deadline) => ArchiveError::Cancelled {
                    reason: "deadline exceeded",
                },
            },
            None => {
                self.token.cancelled().await;
                ArchiveError::Cancelled {
                    reason: "cancelled",
                }
            }
        }
    }

    /// Drive `fut` to completion unless the context ends first, in which
    /// case `fut` is dropped mid-flight.
    pub async fn run_until_cancelled<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            err = self.cancelled() => Err(err),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_context_is_live() {
        assert!(RequestContext::new().check().is_ok());
    }

    #[test]
    fn test_cancel_is_seen_by_clones() {
        let ctx = RequestContext::new();
        let clone = ctx.clone();
        ctx.cancel();
        assert!(matches!(
            clone.check(),
            Err(ArchiveError::Cancelled { reason: "cancelled" })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));
        assert!(ctx.check().is_ok());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(matches!(
            ctx.check(),
            Err(ArchiveError::Cancelled {
                reason: "deadline exceeded"
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_pending_call() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));
        let started = Instant::now();
        let err = ctx
            .run_until_cancelled(std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::Cancelled {
                reason: "deadline exceeded"
            }
        ));
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_call() {
        let ctx = RequestContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move { canceller.cancel() });
        let err = ctx
            .run_until_cancelled(std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Cancelled { reason: "cancelled" }));
    }

    #[tokio::test]
    async fn test_finished_call_is_returned() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));
        assert_eq!(ctx.run_until_cancelled(async { 7 }).await.unwrap(), 7);
    }
}
