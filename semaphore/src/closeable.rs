//! Closeable counting semaphore
//!
//! [`Closeable`] hands out a fixed number of permits. Callers can take a permit
//! without waiting, wait indefinitely, wait until a signal of their choosing
//! fires, or wait until a [`Context`] is done. Every waiting mode also races the
//! close broadcast: once [`Closeable::close`] runs, all pending and future
//! acquisitions fail with [`SemaphoreError::Closed`].
//!
//! Permits are not tied to a guard object. A caller that acquired a permit must
//! hand it back with [`Closeable::release`], which lets the permit cross task
//! and thread boundaries (for example, admission on accept and release on
//! disconnect).

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::context::Context;
use crate::error::{Result, SemaphoreError};

/// A counting semaphore that can be closed exactly once.
///
/// All four acquisition modes share one wait queue. Ordering among several
/// waiters is not part of the contract; each [`release`](Closeable::release)
/// wakes at most one of them.
#[derive(Debug)]
pub struct Closeable {
    /// Wait queue and available permit count
    permits: Semaphore,

    /// Fixed number of permits
    capacity: usize,

    /// Permits currently handed out to callers
    held: AtomicUsize,

    /// Close broadcast, cancelled once by `close`
    closed: CancellationToken,
}

impl Closeable {
    /// Create an open semaphore with `capacity` permits available.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity >= 1,
            "closeable semaphore capacity must be at least 1, got {capacity}"
        );

        Self {
            permits: Semaphore::new(capacity),
            capacity,
            held: AtomicUsize::new(0),
            closed: CancellationToken::new(),
        }
    }

    /// Create a closeable binary lock, equivalent to `Closeable::new(1)`
    pub fn mutex() -> Self {
        Self::new(1)
    }

    /// Take a permit if one is free, without waiting.
    ///
    /// Always returns `false` once the semaphore is closed.
    pub fn try_acquire(&self) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }

        match self.permits.try_acquire() {
            Ok(permit) => {
                self.take(permit);
                true
            }
            Err(_) => false,
        }
    }

    /// Wait until a permit is free or the semaphore closes.
    ///
    /// # Errors
    ///
    /// Returns [`SemaphoreError::Closed`] if the semaphore is closed at call
    /// time or closes while waiting.
    pub async fn acquire(&self) -> Result<()> {
        self.acquire_until(std::future::pending()).await
    }

    /// Wait until a permit is free, the semaphore closes, or `timeout` fires.
    ///
    /// The semaphore does not own any timer. `timeout` can be a
    /// [`tokio::time::sleep`], a oneshot receiver or any other future; its
    /// output is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SemaphoreError::Timeout`] if `timeout` completes first and
    /// [`SemaphoreError::Closed`] if the semaphore closes first. A timed out
    /// caller never holds a permit.
    pub async fn acquire_wait<F>(&self, timeout: F) -> Result<()>
    where
        F: Future,
    {
        self.acquire_until(async {
            timeout.await;
            SemaphoreError::Timeout
        })
        .await
    }

    /// Wait until a permit is free, the semaphore closes, or `ctx` is done.
    ///
    /// # Errors
    ///
    /// Returns [`SemaphoreError::Context`] carrying the context's own error
    /// ([`ContextError::Canceled`](crate::ContextError::Canceled) or
    /// [`ContextError::DeadlineExceeded`](crate::ContextError::DeadlineExceeded))
    /// if the context finishes first, and [`SemaphoreError::Closed`] if the
    /// semaphore closes first.
    pub async fn acquire_ctx(&self, ctx: &Context) -> Result<()> {
        self.acquire_until(async { SemaphoreError::Context(ctx.done().await) })
            .await
    }

    /// Wait for a permit from a thread that is not driving an async runtime.
    ///
    /// Blocks the current thread. Must not be called from inside a tokio
    /// worker, where it would stall the scheduler.
    pub fn blocking_acquire(&self) -> Result<()> {
        futures::executor::block_on(self.acquire())
    }

    /// Hand a permit back, waking at most one waiter.
    ///
    /// Releasing after close is accepted so that holders can unwind normally.
    ///
    /// # Errors
    ///
    /// Returns [`SemaphoreError::ReleaseExceedsCapacity`] when no permit is
    /// currently held; the available count is left unchanged.
    pub fn release(&self) -> Result<()> {
        self.held
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |held| {
                held.checked_sub(1)
            })
            .map_err(|_| {
                tracing::warn!(
                    "Rejected release with no outstanding permits (capacity {})",
                    self.capacity
                );
                SemaphoreError::ReleaseExceedsCapacity {
                    capacity: self.capacity,
                }
            })?;

        self.permits.add_permits(1);
        Ok(())
    }

    /// Close the semaphore.
    ///
    /// Every pending acquisition fails with [`SemaphoreError::Closed`], as does
    /// every later one. Permits already held stay held. Closing twice is a
    /// no-op and the [`closed`](Closeable::closed) broadcast fires only once.
    pub fn close(&self) -> Result<()> {
        if self.closed.is_cancelled() {
            tracing::debug!("Semaphore already closed");
            return Ok(());
        }

        self.permits.close();
        self.closed.cancel();

        tracing::debug!(
            "Semaphore closed with {}/{} permits held",
            self.held.load(Ordering::Acquire),
            self.capacity
        );
        Ok(())
    }

    /// A future that completes once the semaphore has closed.
    ///
    /// Each call returns an independent future, so any number of tasks can wait
    /// on the same close.
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.closed.clone().cancelled_owned()
    }

    /// Whether [`close`](Closeable::close) has run
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// The fixed number of permits
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of permits that could be acquired right now
    pub fn available_permits(&self) -> usize {
        if self.is_closed() {
            0
        } else {
            self.permits.available_permits()
        }
    }

    /// Number of permits currently held by callers
    pub fn held_permits(&self) -> usize {
        self.held.load(Ordering::Acquire)
    }

    /// Shared wait loop behind every blocking acquisition mode.
    ///
    /// Priority when several outcomes are ready at once: closed, then
    /// `interrupt`, then the permit. A permit that was assigned to this waiter
    /// but not yet taken goes back to the pool when the acquire future drops.
    async fn acquire_until<F>(&self, interrupt: F) -> Result<()>
    where
        F: Future<Output = SemaphoreError>,
    {
        if self.closed.is_cancelled() {
            return Err(SemaphoreError::Closed);
        }

        tokio::select! {
            biased;

            _ = self.closed.cancelled() => Err(SemaphoreError::Closed),

            err = interrupt => {
                tracing::debug!("Semaphore wait interrupted: {}", err);
                Err(err)
            }

            acquired = self.permits.acquire() => match acquired {
                Ok(permit) => {
                    self.take(permit);
                    Ok(())
                }
                Err(_) => Err(SemaphoreError::Closed),
            },
        }
    }

    /// Detach a permit from its guard and count it as held
    fn take(&self, permit: SemaphorePermit<'_>) {
        self.held.fetch_add(1, Ordering::AcqRel);
        permit.forget();
    }
}
