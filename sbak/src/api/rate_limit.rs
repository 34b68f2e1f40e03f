use async_trait::async_trait;
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::ApiError;

/// How long to back off after an HTTP 429.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Used when the response has no usable `Retry-After` header.
    pub default_wait: Duration,
    /// Upper bound on a single wait, whatever the server asks for.
    pub max_wait: Duration,
    /// Give up after this many rate limited attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            default_wait: Duration::from_secs(5),
            max_wait: Duration::from_secs(300),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn wait_for(&self, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or(self.default_wait).min(self.max_wait)
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Retries rate limited calls after the server-requested delay.
///
/// The backoff deadline is shared: once any caller is told to wait, every
/// caller going through the same limiter waits until the deadline passes
/// before issuing its next request. Errors other than
/// [`ApiError::RateLimited`] are returned untouched on the first occurrence.
pub struct RateLimiter {
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    resume_at: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_clock(policy, Arc::new(TokioClock))
    }

    pub fn with_clock(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            resume_at: Mutex::new(None),
        }
    }

    pub async fn call<T, F, Fut>(&self, method: &str, mut request: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempts = 0;

        loop {
            self.wait_for_clearance().await;

            match request().await {
                Err(ApiError::RateLimited { retry_after, .. }) => {
                    attempts += 1;
                    if self.policy.exhausted(attempts) {
                        return Err(ApiError::RetriesExhausted {
                            method: method.to_string(),
                            attempts,
                        });
                    }

                    let wait = self.policy.wait_for(retry_after);
                    warn!(
                        "{} rate limited, retrying in {}s (attempt {})",
                        method,
                        wait.as_secs(),
                        attempts
                    );
                    self.hold_off(wait).await;
                }
                other => return other,
            }
        }
    }

    async fn wait_for_clearance(&self) {
        let resume_at = *self.resume_at.lock().await;

        if let Some(resume_at) = resume_at {
            let now = self.clock.now();
            if resume_at > now {
                debug!("waiting {:?} for rate limit to clear", resume_at - now);
                self.clock.sleep(resume_at - now).await;
            }
        }
    }

    async fn hold_off(&self, wait: Duration) {
        let until = self.clock.now() + wait;
        let mut resume_at = self.resume_at.lock().await;
        if resume_at.is_none_or(|current| current < until) {
            *resume_at = Some(until);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    struct ManualClock {
        origin: Instant,
        elapsed: StdMutex<Duration>,
        sleeps: StdMutex<Vec<Duration>>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                origin: Instant::now(),
                elapsed: StdMutex::new(Duration::ZERO),
                sleeps: StdMutex::new(Vec::new()),
            }
        }

        fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.origin + *self.elapsed.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            *self.elapsed.lock().unwrap() += duration;
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    fn rate_limited(seconds: Option<u64>) -> Result<u32, ApiError> {
        Err(ApiError::RateLimited {
            method: "conversations.history".to_string(),
            retry_after: seconds.map(Duration::from_secs),
        })
    }

    #[tokio::test]
    async fn honours_retry_after_then_falls_back_to_default() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(RetryPolicy::default(), clock.clone());
        let mut responses = VecDeque::from([rate_limited(Some(2)), rate_limited(None), Ok(7)]);
        let mut calls = 0;

        let result = limiter
            .call("conversations.history", || {
                calls += 1;
                let next = responses.pop_front().unwrap();
                async move { next }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(2), Duration::from_secs(5)]
        );
    }

    #[tokio::test]
    async fn other_errors_propagate_without_retry() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(RetryPolicy::default(), clock.clone());
        let mut calls = 0;

        let result: Result<u32, ApiError> = limiter
            .call("conversations.info", || {
                calls += 1;
                async {
                    Err(ApiError::Slack {
                        method: "conversations.info".to_string(),
                        error: "channel_not_found".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(ApiError::Slack { .. })));
        assert_eq!(calls, 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let clock = Arc::new(ManualClock::new());
        let policy = RetryPolicy {
            max_attempts: Some(3),
            ..RetryPolicy::default()
        };
        let limiter = RateLimiter::with_clock(policy, clock.clone());

        let result = limiter
            .call("users.list", || async { rate_limited(Some(1)) })
            .await;

        assert!(matches!(
            result,
            Err(ApiError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn caps_wait_at_max_wait() {
        let clock = Arc::new(ManualClock::new());
        let policy = RetryPolicy {
            max_wait: Duration::from_secs(10),
            ..RetryPolicy::default()
        };
        let limiter = RateLimiter::with_clock(policy, clock.clone());
        let mut responses = VecDeque::from([rate_limited(Some(3600)), Ok(1)]);

        limiter
            .call("users.list", || {
                let next = responses.pop_front().unwrap();
                async move { next }
            })
            .await
            .unwrap();

        assert_eq!(clock.sleeps(), vec![Duration::from_secs(10)]);
    }

    #[tokio::test]
    async fn backoff_deadline_is_shared_between_callers() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(RetryPolicy::default(), clock.clone());

        limiter.hold_off(Duration::from_secs(4)).await;
        limiter
            .call("conversations.members", || async { Ok(1) })
            .await
            .unwrap();

        assert_eq!(clock.sleeps(), vec![Duration::from_secs(4)]);
    }

    #[test]
    fn policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.wait_for(None), Duration::from_secs(5));
        assert_eq!(policy.wait_for(Some(Duration::from_secs(2))), Duration::from_secs(2));
    }
}
