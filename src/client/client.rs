use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::broker::{Broker, BrokerId};
use crate::client::config::ClientConfig;
use crate::client::coordinator::CoordinatorCache;
use crate::client::hooks::{ConsumerHooks, NoopHooks, ProducerHooks};
use crate::client::metadata::{ConnectionFactory, MetadataService};
use crate::client::registry::BrokerRegistry;
use crate::client::retry::RetryPolicy;
use crate::client::router::Router;
use crate::client::timeout::TimeoutPolicy;
use crate::compression::Compression;
use crate::errors::{ErrorKind, Result};
use crate::protocol::{Request, Response};

/// Signaled once `close()` has run to completion; `Client::closed()` lets a
/// caller await it without driving the shutdown sequence itself.
pub struct ClosedReceiver(Arc<Notify>);

impl ClosedReceiver {
    pub async fn wait(&self) {
        self.0.notified().await;
    }
}

/// The Kafka client request-routing core (§3 "Client"). Owns configuration,
/// the root cancellation handle, the broker registry, the metadata service,
/// and the coordinator cache; `close()` is idempotent.
pub struct Client {
    config: ClientConfig,
    root_ctx: CancellationToken,
    registry: Arc<BrokerRegistry>,
    metadata: Arc<MetadataService>,
    coordinators: Arc<CoordinatorCache>,
    router: Router,
    producer_hooks: Arc<dyn ProducerHooks>,
    consumer_hooks: Arc<dyn ConsumerHooks>,
    /// The codec preference from `ClientConfig`, initialized eagerly at
    /// construction and retained for the produce pipeline to consult (§4.7,
    /// §6); this core never encodes with it itself.
    compression: Vec<Compression>,
    closed: Mutex<bool>,
    closed_notify: Arc<Notify>,
    refresh_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Construction from seeds (§4.7): parse `seed_brokers`, build seed
    /// `Broker`s under reserved negative ids, and spawn the metadata
    /// refresh loop. `conn_factory` is the out-of-scope per-broker
    /// connection manager this core is agnostic to.
    pub fn new(config: ClientConfig, conn_factory: ConnectionFactory) -> Result<Arc<Self>> {
        Self::with_hooks(config, conn_factory, Arc::new(NoopHooks), Arc::new(NoopHooks))
    }

    pub fn with_hooks(
        config: ClientConfig,
        conn_factory: ConnectionFactory,
        producer_hooks: Arc<dyn ProducerHooks>,
        consumer_hooks: Arc<dyn ConsumerHooks>,
    ) -> Result<Arc<Self>> {
        let seeds = config.parse_seeds()?;
        let compression = config.compression.clone();
        info!(
            "constructing client from {} seed broker(s), compression preference {:?}",
            seeds.len(),
            compression
        );
        let seed_brokers: Vec<Broker> = seeds
            .into_iter()
            .map(|s| Broker::new(s.id, s.host.clone(), s.port, (conn_factory)(s.id, &s.host, s.port)))
            .collect();

        let root_ctx = CancellationToken::new();
        let registry = Arc::new(BrokerRegistry::new(seed_brokers));
        let retry = Arc::new(RetryPolicy::new(
            config.retries,
            config.conn_dead_retries,
            config.retry_backoff.clone(),
            config.retry_timeout.clone(),
        ));
        let timeout = Arc::new(TimeoutPolicy::new(config.conn_timeout_overhead));
        let metadata = MetadataService::new(
            registry.clone(),
            retry.clone(),
            root_ctx.clone(),
            config.metadata_refresh_interval,
            config.allow_auto_topic_creation,
            conn_factory,
        );
        let coordinators = Arc::new(CoordinatorCache::new(
            registry.clone(),
            metadata.clone(),
            retry.clone(),
            root_ctx.clone(),
        ));
        let router = Router::new(
            registry.clone(),
            metadata.clone(),
            coordinators.clone(),
            retry,
            timeout,
            root_ctx.clone(),
        );

        let refresh_loop = tokio::spawn({
            let metadata = metadata.clone();
            async move { metadata.run_refresh_loop().await }
        });

        Ok(Arc::new(Client {
            config,
            root_ctx,
            registry,
            metadata,
            coordinators,
            router,
            producer_hooks,
            consumer_hooks,
            compression,
            closed: Mutex::new(false),
            closed_notify: Arc::new(Notify::new()),
            refresh_loop: Mutex::new(Some(refresh_loop)),
        }))
    }

    /// `Client.request(ctx, typed_request)` (§6).
    pub async fn request(&self, ctx: &CancellationToken, req: Request) -> Result<Response> {
        if *self.closed.lock() {
            return Err(ErrorKind::ClientClosed.into());
        }
        self.router.route(ctx, req).await
    }

    /// `Client.broker(id)` (§6) — a caller-obtained direct-broker handle.
    pub fn broker(self: &Arc<Self>, id: BrokerId) -> BrokerHandle {
        BrokerHandle {
            broker_id: id,
            client: self.clone(),
        }
    }

    /// `Client.discovered_brokers()` (§6) — excludes seeds.
    pub fn discovered_brokers(self: &Arc<Self>) -> Vec<BrokerHandle> {
        self.registry
            .discovered_brokers()
            .into_iter()
            .map(|b| self.broker(b.id()))
            .collect()
    }

    /// `Client.seed_brokers()` (§6) — reserved negative ids, in original
    /// seed order.
    pub fn seed_brokers(self: &Arc<Self>) -> Vec<BrokerHandle> {
        let mut seeds = self.registry.seed_brokers();
        seeds.sort_by_key(|b| std::cmp::Reverse(b.id()));
        seeds.into_iter().map(|b| self.broker(b.id())).collect()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The codec preference the produce pipeline collaborator should use
    /// (§4.7 "compression codec is initialized eagerly").
    pub fn compression(&self) -> &[Compression] {
        &self.compression
    }

    pub fn closed_signal(&self) -> ClosedReceiver {
        ClosedReceiver(self.closed_notify.clone())
    }

    /// `close()` (§4.7), idempotent: the strict 6-step shutdown ordering
    /// that avoids lost wakeups.
    pub async fn close(&self) {
        debug!("close() invoked");
        // Step 1: mark dead under the consumer's lock; idempotent return.
        if !self.consumer_hooks.mark_dead_and_drain() {
            debug!("close() already in progress or complete, ignoring");
            return;
        }
        {
            let mut closed = self.closed.lock();
            if *closed {
                return;
            }
            *closed = true;
        }

        // Step 2 happened inside mark_dead_and_drain (empty partition set).
        // Step 3: cancel the root context.
        self.root_ctx.cancel();

        // Step 4: stop every broker and wake sink/source queues so parked
        // producer/consumer tasks observe cancellation, not backoff.
        self.registry.shutdown();
        self.producer_hooks.wake_sinks();
        self.consumer_hooks.wake_sources();

        // Step 5: wait for the metadata loop to join.
        self.metadata.wait_done().await;
        if let Some(handle) = self.refresh_loop.lock().take() {
            let _ = handle.await;
        }

        // Step 6: fail all buffered records with broker_dead.
        self.producer_hooks.fail_all_records();

        info!("client closed");
        self.closed_notify.notify_waiters();
    }
}

/// `BrokerHandle` (§4.8): `{broker_id, client}`. `request` tries the
/// registry once; on miss, performs one metadata reload and tries again;
/// a second miss is `unknown_broker` with no further retries.
#[derive(Clone)]
pub struct BrokerHandle {
    broker_id: BrokerId,
    client: Arc<Client>,
}

impl BrokerHandle {
    pub fn id(&self) -> BrokerId {
        self.broker_id
    }

    pub async fn request(&self, ctx: &CancellationToken, req: Request) -> Result<Response> {
        if let Ok(broker) = self.client.registry.broker_or_err(self.broker_id) {
            return broker.wait_resp(ctx.clone(), req).await;
        }

        let _ = self.client.metadata.fetch_metadata(ctx, true, vec![]).await;

        match self.client.registry.broker_or_err(self.broker_id) {
            Ok(broker) => broker.wait_resp(ctx.clone(), req).await,
            Err(_) => Err(ErrorKind::UnknownBroker(self.broker_id).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::client::broker::unknown_seed_id;
    use crate::client::config::ClientBuilder;

    /// Every request fails with a dead connection; paired with
    /// `retries(0).conn_dead_retries(0)` in tests that drive a real request
    /// path, so failures surface immediately instead of retrying.
    #[derive(Debug)]
    struct FailingConn;

    #[async_trait]
    impl crate::client::BrokerConnection for FailingConn {
        async fn wait_resp(&self, _ctx: CancellationToken, _req: Request) -> Result<Response> {
            Err(ErrorKind::ConnectionDead(0).into())
        }
        fn stop_forever(&self) {}
    }

    fn conn_factory() -> ConnectionFactory {
        Arc::new(|_id, _host, _port| Arc::new(FailingConn) as Arc<dyn crate::client::BrokerConnection>)
    }

    /// Records the order every shutdown hook fires in, shared between the
    /// producer and consumer hook slots via a single underlying `Arc`.
    struct RecordingHooks {
        log: Mutex<Vec<&'static str>>,
    }

    impl RecordingHooks {
        fn new() -> Arc<Self> {
            Arc::new(RecordingHooks { log: Mutex::new(Vec::new()) })
        }
    }

    impl ProducerHooks for RecordingHooks {
        fn wake_sinks(&self) {
            self.log.lock().push("wake_sinks");
        }
        fn fail_all_records(&self) {
            self.log.lock().push("fail_all_records");
        }
    }

    impl ConsumerHooks for RecordingHooks {
        fn mark_dead_and_drain(&self) -> bool {
            let mut log = self.log.lock();
            if log.contains(&"mark_dead_and_drain") {
                return false;
            }
            log.push("mark_dead_and_drain");
            true
        }
        fn wake_sources(&self) {
            self.log.lock().push("wake_sources");
        }
    }

    #[tokio::test]
    async fn construction_exposes_seeds_and_compression_preference_with_no_discovered_brokers() {
        let config = ClientBuilder::new(vec!["kafka-1:9092".to_owned(), "kafka-2:9093".to_owned()])
            .compression(vec![Compression::Lz4, Compression::Gzip])
            .build();
        let client = Client::new(config, conn_factory()).unwrap();

        assert_eq!(client.compression(), &[Compression::Lz4, Compression::Gzip]);
        assert!(client.discovered_brokers().is_empty());
        let seeds = client.seed_brokers();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].id(), unknown_seed_id(0));
        assert_eq!(seeds[1].id(), unknown_seed_id(1));

        client.close().await;
    }

    #[tokio::test]
    async fn close_runs_hooks_in_the_documented_order_and_is_idempotent() {
        let config = ClientBuilder::new(vec!["kafka-1:9092".to_owned()]).build();
        let hooks = RecordingHooks::new();
        let client = Client::with_hooks(
            config,
            conn_factory(),
            hooks.clone() as Arc<dyn ProducerHooks>,
            hooks.clone() as Arc<dyn ConsumerHooks>,
        )
        .unwrap();

        client.close().await;
        assert_eq!(
            *hooks.log.lock(),
            vec!["mark_dead_and_drain", "wake_sinks", "wake_sources", "fail_all_records"],
        );

        // A second close() must be a no-op: mark_dead_and_drain's guard
        // returns false and nothing else runs again.
        client.close().await;
        assert_eq!(
            *hooks.log.lock(),
            vec!["mark_dead_and_drain", "wake_sinks", "wake_sources", "fail_all_records"],
        );
    }

    #[tokio::test]
    async fn request_after_close_fails_with_client_closed() {
        let config = ClientBuilder::new(vec!["kafka-1:9092".to_owned()]).build();
        let client = Client::new(config, conn_factory()).unwrap();
        client.close().await;

        let err = client
            .request(&CancellationToken::new(), Request::Unknown(999))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ClientClosed));
    }

    #[tokio::test]
    async fn closed_signal_resolves_once_close_completes() {
        let config = ClientBuilder::new(vec!["kafka-1:9092".to_owned()]).build();
        let client = Client::new(config, conn_factory()).unwrap();

        let signal = client.closed_signal();
        let waiter = tokio::spawn(async move { signal.wait().await });
        // Give the spawned task a chance to register as a waiter before
        // close() notifies, since `Notify::notify_waiters` only wakes
        // waiters already parked at call time.
        tokio::task::yield_now().await;

        client.close().await;
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn broker_handle_on_unknown_id_fails_after_one_metadata_reload_attempt() {
        let config = ClientBuilder::new(vec!["kafka-1:9092".to_owned()])
            .retries(0)
            .conn_dead_retries(0)
            .build();
        let client = Client::new(config, conn_factory()).unwrap();

        let handle = client.broker(12345);
        let err = handle
            .request(&CancellationToken::new(), Request::Unknown(1))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnknownBroker(12345)));

        client.close().await;
    }
}
