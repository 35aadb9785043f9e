//! # Fleet Gateway Semaphore
//!
//! A closeable counting semaphore used to bound and coordinate access to shared,
//! limited resources in the gateway, such as admission of new device
//! connections or serialized writes to one connection.
//!
//! ## Acquisition modes
//!
//! - [`Closeable::try_acquire`]: take a permit only if one is free right now
//! - [`Closeable::acquire`]: wait for a permit or for the semaphore to close
//! - [`Closeable::acquire_wait`]: as `acquire`, but also give up when a
//!   caller-supplied timeout future fires
//! - [`Closeable::acquire_ctx`]: as `acquire`, but also give up when a
//!   [`Context`] is cancelled or its deadline passes
//!
//! ## Closing
//!
//! [`Closeable::close`] is one-way. Every waiter is released with
//! [`SemaphoreError::Closed`], later acquisitions fail immediately, and every
//! future returned by [`Closeable::closed`] completes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use semaphore::{Closeable, Context};
//! use std::time::Duration;
//!
//! let gate = Closeable::new(128);
//!
//! // Bound the wait with a timer the caller owns
//! gate.acquire_wait(tokio::time::sleep(Duration::from_secs(5))).await?;
//!
//! // ... use the gated resource ...
//!
//! gate.release()?;
//!
//! // Or bound it with a cancellable context
//! let ctx = Context::with_timeout(Duration::from_secs(1));
//! gate.acquire_ctx(&ctx).await?;
//! gate.release()?;
//! ```

pub mod closeable;
pub mod context;
pub mod error;

pub use closeable::Closeable;
pub use context::Context;
pub use error::{ContextError, Result, SemaphoreError};
