//! Error types for the cache loaders.
//!
//! Failures of the caller-supplied fetch functions never escape `get` or
//! `fetch_all`. They are wrapped in a [`CacheError`], handed to the
//! configured [`ErrorHandler`], and then normalized away.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Error type returned by caller-supplied fetch functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type passed to an [`ErrorHandler`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// A per-key fetch failed. The caller sees a miss.
    #[error("fetch failed: {source}")]
    Fetch {
        #[source]
        source: BoxError,
    },

    /// A bulk fetch failed. The previously cached contents are kept.
    #[error("bulk fetch failed: {source}")]
    BatchFetch {
        #[source]
        source: BoxError,
    },

    /// An in-flight operation was dropped before it settled.
    #[error("in-flight {0} was abandoned before completing")]
    Abandoned(&'static str),
}

/// Callback invoked synchronously whenever a fetch fails.
///
/// The default handler logs the error through `tracing` and returns.
#[derive(Clone)]
pub struct ErrorHandler(Arc<dyn Fn(&CacheError) + Send + Sync>);

impl ErrorHandler {
    /// Wrap a closure as an error handler.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&CacheError) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// A handler that discards every error.
    pub fn ignore() -> Self {
        Self::new(|_| {})
    }

    /// Invoke the handler.
    pub fn handle(&self, error: &CacheError) {
        (self.0)(error)
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(|error| tracing::error!(error = %error, "cache fetch failed"))
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorHandler")
    }
}

/// A specialized Result type for fetch functions.
pub type FetchResult<T> = Result<T, BoxError>;
