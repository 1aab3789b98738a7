use std::time::Duration;

use parking_lot::Mutex;

use crate::protocol::Request;

/// Uniform write timeout; only the read timeout varies by request kind (§4.1).
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

const BASE_READ_TIMEOUT: Duration = Duration::from_secs(5);
const SASL_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Computes `(read, write)` timeouts for a typed request and remembers the
/// most recently observed `JoinGroup` rebalance timeout for the following
/// `SyncGroup` (§4.1). Scoped per `Client`, not process-global (§9).
pub struct TimeoutPolicy {
    cached_rebalance_timeout: Mutex<Option<Duration>>,
    conn_timeout_overhead: Duration,
}

impl TimeoutPolicy {
    pub fn new(conn_timeout_overhead: Duration) -> Self {
        TimeoutPolicy {
            cached_rebalance_timeout: Mutex::new(None),
            conn_timeout_overhead,
        }
    }

    /// Returns `(read_timeout, write_timeout)` for `req`, caching the
    /// rebalance timeout as a side effect when `req` is a `JoinGroup`.
    pub fn compute(&self, req: &Request) -> (Duration, Duration) {
        let write = WRITE_TIMEOUT + self.conn_timeout_overhead;
        let read = match req {
            Request::SaslHandshake { .. } | Request::SaslAuthenticate { .. } => {
                SASL_READ_TIMEOUT
            }
            Request::JoinGroup {
                rebalance_timeout_ms,
                ..
            } => {
                let timeout = BASE_READ_TIMEOUT + Duration::from_millis(*rebalance_timeout_ms as u64);
                *self.cached_rebalance_timeout.lock() = Some(timeout);
                timeout
            }
            Request::SyncGroup { .. } => {
                let cached = *self.cached_rebalance_timeout.lock();
                cached.unwrap_or(BASE_READ_TIMEOUT)
            }
            _ => req
                .embedded_timeout()
                .map(|t| BASE_READ_TIMEOUT + t)
                .unwrap_or(BASE_READ_TIMEOUT),
        };
        (read, write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequiredAcks;

    #[test]
    fn sasl_gets_thirty_seconds() {
        let policy = TimeoutPolicy::new(Duration::ZERO);
        let (read, _) = policy.compute(&Request::SaslHandshake {
            mechanism: "PLAIN".into(),
        });
        assert_eq!(read, SASL_READ_TIMEOUT);
    }

    #[test]
    fn join_group_caches_rebalance_timeout_for_sync_group() {
        let policy = TimeoutPolicy::new(Duration::ZERO);
        let (read, _) = policy.compute(&Request::JoinGroup {
            group: "g".into(),
            session_timeout_ms: 10_000,
            rebalance_timeout_ms: 60_000,
            member_id: String::new(),
            protocol_type: "consumer".into(),
        });
        assert_eq!(read, BASE_READ_TIMEOUT + Duration::from_millis(60_000));

        let (sync_read, _) = policy.compute(&Request::SyncGroup {
            group: "g".into(),
            generation_id: 1,
            member_id: "m".into(),
        });
        assert_eq!(sync_read, BASE_READ_TIMEOUT + Duration::from_millis(60_000));
    }

    #[test]
    fn sync_group_without_prior_join_defaults_to_five_seconds() {
        let policy = TimeoutPolicy::new(Duration::ZERO);
        let (read, _) = policy.compute(&Request::SyncGroup {
            group: "g".into(),
            generation_id: 1,
            member_id: "m".into(),
        });
        assert_eq!(read, BASE_READ_TIMEOUT);
    }

    #[test]
    fn produce_read_timeout_exceeds_embedded_timeout() {
        let policy = TimeoutPolicy::new(Duration::ZERO);
        let req = Request::Produce {
            acks: RequiredAcks::All,
            timeout_ms: 2_000,
            topic_partitions: vec![],
        };
        let (read, _) = policy.compute(&req);
        assert!(read > Duration::from_millis(2_000));
    }
}
