use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::protocol::{Request, Response};

/// A broker id. Real Kafka-assigned ids are non-negative. Seed brokers
/// occupy reserved ids `< -1` (§6 "Reserved broker IDs"); `-1` is the
/// distinct "controller unknown" sentinel and is never assigned to a broker.
pub type BrokerId = i32;

/// The controller-unknown sentinel.
pub const UNKNOWN_CONTROLLER_ID: BrokerId = -1;

/// The default Kafka broker port, used when a seed address omits one.
pub const DEFAULT_BROKER_PORT: u16 = 9092;

/// The id assigned to the `i`-th seed broker, monotonically decreasing from
/// a fixed sentinel `<= -2` so seed ids never collide with a real broker id
/// or with `UNKNOWN_CONTROLLER_ID`.
pub fn unknown_seed_id(i: usize) -> BrokerId {
    -2 - (i as BrokerId)
}

/// True for any id in the reserved seed range.
pub fn is_seed_id(id: BrokerId) -> bool {
    id < -1
}

/// `host[:port]` -> `(host, port)`, applying the default port and the
/// `localhost` -> `127.0.0.1` normalization (§3, §6).
pub fn parse_host_port(addr: &str) -> Result<(String, u16)> {
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("invalid port in seed address `{}`", addr))?;
            Ok((normalize_host(host), port))
        }
        None => Ok((normalize_host(addr), DEFAULT_BROKER_PORT)),
    }
}

fn normalize_host(host: &str) -> String {
    if host == "localhost" {
        "127.0.0.1".to_owned()
    } else {
        host.to_owned()
    }
}

/// The capability this core consumes from the per-broker connection manager
/// (out of scope for this crate): issue one typed request and await its
/// typed response or a transport error, and an idempotent shutdown hook.
///
/// Implementations must be safe to call from many concurrent tasks; the
/// Router, Metadata Service, and Coordinator Cache all hold shared `Broker`
/// handles and call `wait_resp` concurrently.
#[async_trait]
pub trait BrokerConnection: Send + Sync + fmt::Debug {
    /// Issue `req` and await its response, honoring `ctx` for cancellation.
    async fn wait_resp(&self, ctx: CancellationToken, req: Request) -> Result<Response>;

    /// Tear the connection down for good. Idempotent: the connection manager
    /// must tolerate being asked to stop more than once (address changes,
    /// cluster removal, and client close can all race to call this).
    fn stop_forever(&self);

    /// Wake any producer/consumer queue parked waiting on this broker, so it
    /// observes cancellation instead of blocking in backoff. Idempotent;
    /// brokers with no attached queues use the default no-op.
    fn wake_queues(&self) {}
}

/// A live broker entry in the registry: identity, address, and the
/// connection capability (§3 "Broker").
#[derive(Clone)]
pub struct Broker {
    id: BrokerId,
    host: String,
    port: u16,
    conn: Arc<dyn BrokerConnection>,
}

impl Broker {
    pub fn new(id: BrokerId, host: impl Into<String>, port: u16, conn: Arc<dyn BrokerConnection>) -> Self {
        Broker {
            id,
            host: host.into(),
            port,
            conn,
        }
    }

    pub fn id(&self) -> BrokerId {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_seed(&self) -> bool {
        is_seed_id(self.id)
    }

    /// Two brokers are the "same address" when host and port match; used by
    /// `update_brokers` to decide replace-vs-keep for an existing id.
    pub fn same_address(&self, host: &str, port: u16) -> bool {
        self.host == host && self.port == port
    }

    pub async fn wait_resp(&self, ctx: CancellationToken, req: Request) -> Result<Response> {
        self.conn.wait_resp(ctx, req).await
    }

    pub fn stop_forever(&self) {
        self.conn.stop_forever();
    }

    pub fn wake_queues(&self) {
        self.conn.wake_queues();
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Broker")
            .field("id", &self.id)
            .field("addr", &self.addr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_without_port() {
        let (host, port) = parse_host_port("kafka-1").unwrap();
        assert_eq!(host, "kafka-1");
        assert_eq!(port, DEFAULT_BROKER_PORT);
    }

    #[test]
    fn parses_host_with_port() {
        let (host, port) = parse_host_port("kafka-1:9093").unwrap();
        assert_eq!(host, "kafka-1");
        assert_eq!(port, 9093);
    }

    #[test]
    fn normalizes_localhost() {
        let (host, _) = parse_host_port("localhost").unwrap();
        assert_eq!(host, "127.0.0.1");
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(parse_host_port("10.0.0.5:abc").is_err());
    }

    #[test]
    fn seed_ids_are_reserved_and_distinct_from_controller_sentinel() {
        assert!(is_seed_id(unknown_seed_id(0)));
        assert!(is_seed_id(unknown_seed_id(1)));
        assert_ne!(unknown_seed_id(0), unknown_seed_id(1));
        assert!(!is_seed_id(UNKNOWN_CONTROLLER_ID));
    }
}
