//! Per-call cancellation and deadline context.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why an operation stopped before its query completed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    #[error("operation cancelled by caller")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation signal and optional deadline supplied by the caller of a
/// repository operation.
///
/// Cloning shares the cancellation token, so cancelling any clone (or the token
/// passed to [`RequestContext::with_cancellation`]) interrupts every operation
/// running under it.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drive `fut` until it completes, the token is cancelled or the deadline passes.
    ///
    /// On interruption `fut` is dropped, which aborts any in-flight statement.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Interrupted>
    where
        F: Future,
    {
        if self.cancel.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            _ = deadline => Err(Interrupted::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}
