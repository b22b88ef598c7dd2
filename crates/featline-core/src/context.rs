//! Call-scoped context passed into every online store read
//!
//! A `CallContext` fixes the request time once for the whole call and carries
//! the caller's deadline and cancellation token. Store readers receive it
//! explicitly; nothing is read from ambient state.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct CallContext {
    request_time: DateTime<Utc>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CallContext {
    /// Context with the request time set to now, no deadline, and a fresh token
    pub fn new() -> Self {
        Self {
            request_time: Utc::now(),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Context whose token is a child of `parent`: cancelling the parent
    /// (e.g. on server shutdown) cancels this call too.
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self {
            cancel: parent.child_token(),
            ..Self::new()
        }
    }

    pub fn with_request_time(mut self, request_time: DateTime<Utc>) -> Self {
        self.request_time = request_time;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The single instant every ttl check in this call is evaluated against
    pub fn request_time(&self) -> DateTime<Utc> {
        self.request_time
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

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails fast if the call is already cancelled or past its deadline
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if matches!(self.deadline, Some(d) if Instant::now() >= d) {
            return Err(Error::DeadlineExceeded);
        }
        Ok(())
    }

    /// Runs `fut` until it completes, the token fires, or the deadline passes.
    ///
    /// On cancellation or deadline the future is dropped, which aborts any
    /// I/O it had in flight.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = deadline => Err(Error::DeadlineExceeded),
            result = fut => result,
        }
    }
}
