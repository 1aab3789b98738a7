use std::sync::Arc;
use std::time::Duration;

use crate::client::broker::{parse_host_port, unknown_seed_id};
use crate::client::retry::{default_backoff, unbounded_retry_timeout};
use crate::compression::Compression;
use crate::errors::{ErrorKind, Result};
use crate::protocol::RequestKey;

/// Default metadata refresh tick, matching the teacher's
/// `DEFAULT_METADATA_MAX_AGE_MILLS` role but renamed to describe what it
/// actually drives here: the background refresh loop's periodic trigger.
pub const DEFAULT_METADATA_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Configuration accepted by `new_client` (§6). Constructed via
/// `ClientBuilder`; `Client::new` is the only place a `ConfigError` can
/// originate.
pub struct ClientConfig {
    pub seed_brokers: Vec<String>,
    pub allow_auto_topic_creation: bool,
    pub conn_timeout_overhead: Duration,
    pub metadata_refresh_interval: Duration,
    pub retries: u32,
    pub conn_dead_retries: u32,
    pub retry_backoff: Arc<dyn Fn(u32) -> Duration + Send + Sync>,
    pub retry_timeout: Arc<dyn Fn(&RequestKey) -> Duration + Send + Sync>,
    /// Codecs the caller is willing to produce with, in preference order
    /// (§6, §4.7 "compression codec is initialized eagerly"). The codec
    /// collaborator (out of scope, §1) does the actual encoding; this core
    /// only carries the preference through construction.
    pub compression: Vec<Compression>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            seed_brokers: Vec::new(),
            allow_auto_topic_creation: true,
            conn_timeout_overhead: Duration::ZERO,
            metadata_refresh_interval: DEFAULT_METADATA_REFRESH_INTERVAL,
            retries: 3,
            conn_dead_retries: 3,
            retry_backoff: Arc::new(default_backoff),
            retry_timeout: Arc::new(unbounded_retry_timeout),
            compression: vec![Compression::None],
        }
    }
}

/// A parsed, validated seed address paired with its reserved broker id.
#[derive(Debug)]
pub struct ParsedSeed {
    pub id: crate::client::broker::BrokerId,
    pub host: String,
    pub port: u16,
}

impl ClientConfig {
    /// Parses `seed_brokers` into `(id, host, port)` triples in input order,
    /// assigning `unknown_seed_id(i)` monotonically (§4.7, §6, scenario 1).
    pub fn parse_seeds(&self) -> Result<Vec<ParsedSeed>> {
        if self.seed_brokers.is_empty() {
            return Err(ErrorKind::ConfigError("no seed brokers configured".into()).into());
        }
        self.seed_brokers
            .iter()
            .enumerate()
            .map(|(i, addr)| {
                let (host, port) = parse_host_port(addr)?;
                Ok(ParsedSeed {
                    id: unknown_seed_id(i),
                    host,
                    port,
                })
            })
            .collect()
    }
}

/// Builder for `ClientConfig`, mirroring the fluent construction style the
/// teacher's own `ClientBuilder` exposed.
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new(seed_brokers: Vec<String>) -> Self {
        ClientBuilder {
            config: ClientConfig {
                seed_brokers,
                ..ClientConfig::default()
            },
        }
    }

    pub fn allow_auto_topic_creation(mut self, allow: bool) -> Self {
        self.config.allow_auto_topic_creation = allow;
        self
    }

    pub fn conn_timeout_overhead(mut self, overhead: Duration) -> Self {
        self.config.conn_timeout_overhead = overhead;
        self
    }

    pub fn metadata_refresh_interval(mut self, interval: Duration) -> Self {
        self.config.metadata_refresh_interval = interval;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    pub fn conn_dead_retries(mut self, retries: u32) -> Self {
        self.config.conn_dead_retries = retries;
        self
    }

    pub fn retry_backoff(mut self, f: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        self.config.retry_backoff = Arc::new(f);
        self
    }

    pub fn retry_timeout(
        mut self,
        f: impl Fn(&RequestKey) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.config.retry_timeout = Arc::new(f);
        self
    }

    pub fn compression(mut self, codecs: Vec<Compression>) -> Self {
        self.config.compression = codecs;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_parsing_rejects_malformed_entries_and_assigns_reserved_ids() {
        let config = ClientBuilder::new(vec![
            "localhost".to_owned(),
            "kafka-1:9093".to_owned(),
            "10.0.0.5:abc".to_owned(),
        ])
        .build();
        let err = config.parse_seeds().unwrap_err();
        assert!(err.to_string().contains("invalid port"));
    }

    #[test]
    fn compression_defaults_to_none_and_builder_overrides_it() {
        let default_config = ClientConfig::default();
        assert_eq!(default_config.compression, vec![Compression::None]);

        let config = ClientBuilder::new(vec!["localhost".to_owned()])
            .compression(vec![Compression::Lz4, Compression::Gzip])
            .build();
        assert_eq!(config.compression, vec![Compression::Lz4, Compression::Gzip]);
    }

    #[test]
    fn valid_seeds_parse_with_defaults_and_reserved_ids() {
        let config = ClientBuilder::new(vec!["localhost".to_owned(), "kafka-1:9093".to_owned()])
            .build();
        let seeds = config.parse_seeds().unwrap();
        assert_eq!(seeds[0].host, "127.0.0.1");
        assert_eq!(seeds[0].port, 9092);
        assert_eq!(seeds[0].id, unknown_seed_id(0));
        assert_eq!(seeds[1].host, "kafka-1");
        assert_eq!(seeds[1].port, 9093);
        assert_eq!(seeds[1].id, unknown_seed_id(1));
    }
}
