pub mod paginate;
pub mod rate_limit;
pub mod slack;

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;

pub use paginate::{PAGE_LIMIT, Paginator};
pub use rate_limit::{Clock, RateLimiter, RetryPolicy, TokioClock};
pub use slack::{SlackApi, SlackClient};

/// The one request path every engine component goes through.
///
/// Calls are funnelled through a shared [`RateLimiter`], so concurrent workers
/// honour the same backoff deadline, and are abandoned as soon as the
/// cancellation token fires.
#[derive(Clone)]
pub struct Requester {
    api: Arc<dyn SlackApi>,
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
}

impl Requester {
    pub fn new(
        api: Arc<dyn SlackApi>,
        limiter: Arc<RateLimiter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            limiter,
            cancel,
        }
    }

    pub async fn request(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ApiError> {
        if self.cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        tokio::select! {
            result = self.limiter.call(method, || self.api.call(method, params)) => result,
            _ = self.cancel.cancelled() => Err(ApiError::Cancelled),
        }
    }

    /// Cursor pagination over `method`, yielding the array found under `field`.
    pub fn paginate<'a>(&'a self, method: &'a str, field: &'a str) -> Paginator<'a> {
        Paginator::new(self, method, field)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
