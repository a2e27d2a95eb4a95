//! Per-operation cancellation and deadline scope.

use crate::error::{StorageError, StorageResult};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus optional deadline, passed to every blob store
/// operation.
///
/// Operations race their I/O against the token and the deadline. When either
/// fires first, the in-flight future is dropped (closing its connection or
/// file handle) and the operation fails with [`StorageError::Cancelled`].
///
/// Cloning shares the token: cancelling a clone cancels the original.
#[derive(Clone, Debug, Default)]
pub struct OpContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Scope operations to an externally owned token.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            deadline: None,
        }
    }

    /// Tighten the deadline to `deadline` if it is earlier than the current one.
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

    /// A context that is cancelled with this one but can also be cancelled
    /// on its own.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail fast if the context is already done.
    pub fn check(&self) -> StorageResult<()> {
        if self.cancel.is_cancelled() {
            return Err(StorageError::Cancelled("operation cancelled".to_string()));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(StorageError::Cancelled("deadline exceeded".to_string()));
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the context is cancelled first.
    pub async fn run<F, T>(&self, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(StorageError::Cancelled("operation cancelled".to_string()))
            }
            _ = sleep_until(self.deadline) => {
                Err(StorageError::Cancelled("deadline exceeded".to_string()))
            }
            res = fut => res,
        }
    }

    /// Wrap a stream so that each item is awaited under this context.
    ///
    /// On cancellation the stream yields one `Cancelled` error and ends.
    pub fn guard_stream<'a, T>(
        &self,
        stream: Pin<Box<dyn Stream<Item = StorageResult<T>> + Send + 'a>>,
    ) -> Pin<Box<dyn Stream<Item = StorageResult<T>> + Send + 'a>>
    where
        T: Send + 'a,
    {
        let cx = self.clone();
        Box::pin(async_stream::stream! {
            let mut inner = stream;
            loop {
                match cx.run(async { Ok(inner.next().await) }).await {
                    Ok(Some(item)) => yield item,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        })
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
