use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::errors::{Error, ErrorKind};
use crate::protocol::RequestKey;

/// What the caller of the retry loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    GiveUp,
}

/// Given attempt count, error, elapsed time, and request key, decides
/// retry vs. give up and computes backoff (§4.2). One instance is shared
/// by every request path; each path layers its own broker-selection logic
/// on top of the same loop.
pub struct RetryPolicy {
    retries: u32,
    conn_dead_retries: u32,
    backoff: Arc<dyn Fn(u32) -> Duration + Send + Sync>,
    retry_timeout: Arc<dyn Fn(&RequestKey) -> Duration + Send + Sync>,
}

impl RetryPolicy {
    pub fn new(
        retries: u32,
        conn_dead_retries: u32,
        backoff: Arc<dyn Fn(u32) -> Duration + Send + Sync>,
        retry_timeout: Arc<dyn Fn(&RequestKey) -> Duration + Send + Sync>,
    ) -> Self {
        RetryPolicy {
            retries,
            conn_dead_retries,
            backoff,
            retry_timeout,
        }
    }

    /// Pure decision: should attempt `n` (0-indexed, the attempt that just
    /// failed with `err`) be followed by another attempt?
    pub fn should_retry(&self, n: u32, err: &Error, elapsed: Duration, key: &RequestKey) -> bool {
        let budget = (self.retry_timeout)(key);
        if budget > Duration::ZERO && elapsed > budget {
            return false;
        }
        if err.is_connection_dead() {
            return n < self.conn_dead_retries;
        }
        matches!(err.kind(), ErrorKind::KafkaError(_) | ErrorKind::TransportError(_))
            && err.is_retriable()
            && n < self.retries
    }

    /// First half of the decide-then-wait step for attempt `n`: decides
    /// whether to retry and, if so, computes the backoff to wait out. Kept
    /// synchronous (and so free of any non-`Sync` `&Error` borrow across an
    /// `.await`) so callers running inside a spawned task stay `Send`.
    pub fn decide_backoff(&self, n: u32, err: &Error, started_at: Instant, key: &RequestKey) -> Option<Duration> {
        if !self.should_retry(n, err, started_at.elapsed(), key) {
            return None;
        }
        let backoff = (self.backoff)(n);
        debug!(
            "retry attempt {} scheduled for {:?} after {:?} backoff: {}",
            n + 1,
            key,
            backoff,
            err
        );
        Some(backoff)
    }

    /// Second half: races the backoff timer against caller cancellation and
    /// client close; returns `GiveUp` the instant either fires, even if the
    /// backoff hasn't elapsed (§4.2, §5 "Cancellation always wins").
    pub async fn wait_backoff(
        &self,
        backoff: Duration,
        caller_ctx: &CancellationToken,
        root_ctx: &CancellationToken,
    ) -> RetryDecision {
        tokio::select! {
            _ = sleep(backoff) => RetryDecision::Retry,
            _ = caller_ctx.cancelled() => RetryDecision::GiveUp,
            _ = root_ctx.cancelled() => RetryDecision::GiveUp,
        }
    }
}

/// `retry_backoff` default: exponential with a 5s ceiling, matching the
/// "configurable `fn(attempt) -> duration`" contract (§6) with a sane
/// out-of-the-box value.
pub fn default_backoff(attempt: u32) -> Duration {
    let millis = 100u64.saturating_mul(1u64 << attempt.min(6));
    Duration::from_millis(millis.min(5_000))
}

/// `retry_timeout` default: unbounded (`0`) for every request key.
pub fn unbounded_retry_timeout(_key: &RequestKey) -> Duration {
    Duration::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::protocol::ApiKeys;

    fn policy(retries: u32, conn_dead_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            retries,
            conn_dead_retries,
            Arc::new(|n| Duration::from_millis(n as u64)),
            Arc::new(unbounded_retry_timeout),
        )
    }

    #[test]
    fn connection_dead_uses_its_own_budget() {
        let p = policy(0, 3);
        let err: Error = ErrorKind::ConnectionDead(1).into();
        assert!(p.should_retry(2, &err, Duration::ZERO, &RequestKey::ApiKey(ApiKeys::Metadata)));
        assert!(!p.should_retry(3, &err, Duration::ZERO, &RequestKey::ApiKey(ApiKeys::Metadata)));
    }

    #[test]
    fn retriable_kafka_error_respects_retries_budget() {
        use crate::errors::KafkaCode;
        let p = policy(2, 0);
        let err: Error = ErrorKind::KafkaError(KafkaCode::RequestTimedOut).into();
        assert!(p.should_retry(1, &err, Duration::ZERO, &RequestKey::ApiKey(ApiKeys::Fetch)));
        assert!(!p.should_retry(2, &err, Duration::ZERO, &RequestKey::ApiKey(ApiKeys::Fetch)));
    }

    #[test]
    fn non_retriable_kafka_error_never_retries() {
        use crate::errors::KafkaCode;
        let p = policy(5, 5);
        let err: Error = ErrorKind::KafkaError(KafkaCode::InvalidTopic).into();
        assert!(!p.should_retry(0, &err, Duration::ZERO, &RequestKey::ApiKey(ApiKeys::Metadata)));
    }

    #[test]
    fn elapsed_beyond_budget_fails_even_if_otherwise_retriable() {
        use crate::errors::KafkaCode;
        let p = RetryPolicy::new(
            10,
            10,
            Arc::new(|_| Duration::from_millis(1)),
            Arc::new(|_: &RequestKey| Duration::from_secs(1)),
        );
        let err: Error = ErrorKind::KafkaError(KafkaCode::RequestTimedOut).into();
        assert!(!p.should_retry(
            0,
            &err,
            Duration::from_secs(2),
            &RequestKey::ApiKey(ApiKeys::Metadata)
        ));
    }
}
