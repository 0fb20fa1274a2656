//! Cancellation token and time bounds for async transport work.
//!
//! A [`CancelToken`] is an atomic flag plus an `embassy-sync` [`Signal`]
//! that wakes whoever is parked in [`CancelToken::cancelled`].  Clones
//! share state.  Cancellation is sticky: once cancelled, a token stays
//! cancelled.
//!
//! The signal holds a single waker, so a token is awaited from one task
//! at a time.  Futures joined inside that task share its waker and may
//! all wait on the same token.

use core::future::Future;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;

use crate::error::TransportError;

struct Inner {
    cancelled: AtomicBool,
    signal: Signal<CriticalSectionRawMutex, ()>,
}

/// Shared, clonable cancellation flag.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                signal: Signal::new(),
            }),
        }
    }

    /// Request cancellation.  Returns `true` for the call that flipped it.
    pub fn cancel(&self) -> bool {
        let first = !self.inner.cancelled.swap(true, Ordering::AcqRel);
        if first {
            self.inner.signal.signal(());
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.inner.signal.wait().await;
            // Hand the wakeup on to any other waiter.
            self.inner.signal.signal(());
        }
    }

    /// Run `fut` unless the token fires first.
    pub async fn run_until_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.is_cancelled() {
            return None;
        }
        future::or(async { Some(fut.await) }, async {
            self.cancelled().await;
            None
        })
        .await
    }
}

/// Bound `fut` by `limit`.
pub async fn with_timeout<F: Future>(limit: Duration, fut: F) -> Result<F::Output, TransportError> {
    future::or(async { Ok(fut.await) }, async {
        async_io_mini::Timer::after(limit).await;
        Err(TransportError::Timeout)
    })
    .await
}

/// Bound `fut` by `limit` and by `cancel`; flattens transport results.
pub async fn bounded<T, F>(limit: Duration, cancel: &CancelToken, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match cancel.run_until_cancelled(with_timeout(limit, fut)).await {
        Some(Ok(inner)) => inner,
        Some(Err(timeout)) => Err(timeout),
        None => Err(TransportError::Cancelled),
    }
}

/// Sleep for `duration`; returns `false` if `cancel` fired first.
pub async fn sleep_unless_cancelled(duration: Duration, cancel: &CancelToken) -> bool {
    cancel
        .run_until_cancelled(async_io_mini::Timer::after(duration))
        .await
        .is_some()
}
