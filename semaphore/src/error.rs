//! Error types for the semaphore crate.

/// Reasons a [`Context`](crate::Context) is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ContextError {
    /// The context was cancelled explicitly
    #[error("context canceled")]
    Canceled,

    /// The context's deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Errors returned by [`Closeable`](crate::Closeable) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SemaphoreError {
    /// The semaphore was closed before a permit could be obtained
    #[error("the semaphore has been closed")]
    Closed,

    /// The caller-supplied timeout fired before a permit could be obtained
    #[error("timed out while waiting for a semaphore permit")]
    Timeout,

    /// The caller's context finished before a permit could be obtained.
    ///
    /// Displays as the context's own error so callers can tell a cancellation
    /// from an expired deadline.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// More permits were released than are currently held
    #[error("release would exceed the semaphore capacity of {capacity}")]
    ReleaseExceedsCapacity {
        /// The semaphore's fixed capacity
        capacity: usize,
    },
}

impl SemaphoreError {
    /// Returns `true` when the gated resource is permanently unavailable.
    pub fn is_closed(&self) -> bool {
        matches!(self, SemaphoreError::Closed)
    }
}

/// Convenience type alias for Results using SemaphoreError.
pub type Result<T> = std::result::Result<T, SemaphoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semaphore_error_display() {
        assert_eq!(
            SemaphoreError::Closed.to_string(),
            "the semaphore has been closed"
        );
        assert_eq!(
            SemaphoreError::Timeout.to_string(),
            "timed out while waiting for a semaphore permit"
        );
        assert_eq!(
            SemaphoreError::ReleaseExceedsCapacity { capacity: 3 }.to_string(),
            "release would exceed the semaphore capacity of 3"
        );
    }

    #[test]
    fn test_context_error_is_not_rewrapped() {
        let error: SemaphoreError = ContextError::Canceled.into();
        assert_eq!(error.to_string(), ContextError::Canceled.to_string());
        assert_eq!(error, SemaphoreError::Context(ContextError::Canceled));

        let error: SemaphoreError = ContextError::DeadlineExceeded.into();
        assert_eq!(error.to_string(), "context deadline exceeded");
    }

    #[test]
    fn test_is_closed() {
        assert!(SemaphoreError::Closed.is_closed());
        assert!(!SemaphoreError::Timeout.is_closed());
        assert!(!SemaphoreError::Context(ContextError::Canceled).is_closed());
    }
}
