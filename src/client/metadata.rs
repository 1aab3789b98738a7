use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::client::broker::{Broker, BrokerConnection, BrokerId, UNKNOWN_CONTROLLER_ID};
use crate::client::registry::{broker_from_metadata, BrokerRegistry};
use crate::client::retry::RetryPolicy;
use crate::errors::Result;
use crate::protocol::{ErrorCode, PartitionId, Request, RequestKey, Response};

/// Dials (or looks up a pooled connection for) a broker discovered through a
/// metadata response. The dialing mechanics are an external collaborator
/// (§1); the Metadata Service only needs this one factory seam to turn a
/// `(id, host, port)` into a `Broker` capability.
pub type ConnectionFactory = Arc<dyn Fn(BrokerId, &str, u16) -> Arc<dyn BrokerConnection> + Send + Sync>;

/// One partition's leader and load error as last observed for a topic.
#[derive(Debug, Clone, Default)]
pub struct PartitionView {
    pub leader: BrokerId,
    pub load_error: Option<ErrorCode>,
}

/// A topic's partitions and top-level load error, as published in a
/// `TopicsSnapshot` (§3).
#[derive(Debug, Clone, Default)]
pub struct TopicPartitions {
    pub partitions: HashMap<PartitionId, PartitionView>,
    pub load_error: Option<ErrorCode>,
}

/// An immutable, atomically-published view of cluster topic metadata.
/// Readers are lock-free; writers take a mutex, clone, mutate, and
/// atomic-swap the pointer (§3, §9 "must be preserved verbatim").
#[derive(Debug, Clone, Default)]
pub struct TopicsSnapshot {
    pub topics: HashMap<String, TopicPartitions>,
}

/// Issues metadata requests, updates the broker registry and controller id,
/// and serves the topics snapshot plus a background refresh loop (§4.4).
pub struct MetadataService {
    registry: Arc<BrokerRegistry>,
    retry: Arc<RetryPolicy>,
    controller_id: AtomicI32,
    snapshot: ArcSwap<TopicsSnapshot>,
    write_lock: Mutex<()>,
    refresh_notify: Notify,
    priority_notify: Notify,
    // A oneshot, not a `Notify`: `notify_waiters()` only wakes waiters
    // already registered when it's called, so a `close()` task that hasn't
    // yet reached `wait_done()` when the refresh loop exits would hang
    // forever. A oneshot send is buffered regardless of receive order.
    done_tx: Mutex<Option<oneshot::Sender<()>>>,
    done_rx: Mutex<Option<oneshot::Receiver<()>>>,
    root_ctx: CancellationToken,
    refresh_interval: Duration,
    allow_auto_topic_creation: bool,
    conn_factory: ConnectionFactory,
}

impl MetadataService {
    pub fn new(
        registry: Arc<BrokerRegistry>,
        retry: Arc<RetryPolicy>,
        root_ctx: CancellationToken,
        refresh_interval: Duration,
        allow_auto_topic_creation: bool,
        conn_factory: ConnectionFactory,
    ) -> Arc<Self> {
        let (done_tx, done_rx) = oneshot::channel();
        Arc::new(MetadataService {
            registry,
            retry,
            controller_id: AtomicI32::new(UNKNOWN_CONTROLLER_ID),
            snapshot: ArcSwap::from_pointee(TopicsSnapshot::default()),
            write_lock: Mutex::new(()),
            refresh_notify: Notify::new(),
            priority_notify: Notify::new(),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx: Mutex::new(Some(done_rx)),
            root_ctx,
            refresh_interval,
            allow_auto_topic_creation,
            conn_factory,
        })
    }

    pub fn controller_id(&self) -> BrokerId {
        self.controller_id.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Arc<TopicsSnapshot> {
        self.snapshot.load_full()
    }

    /// Triggers an out-of-band refresh (e.g. an unknown-topic buffer wakeup)
    /// without waiting for the periodic tick.
    pub fn trigger_refresh(&self) {
        self.refresh_notify.notify_one();
    }

    /// Triggers an immediate, higher-priority refresh (used by the Router's
    /// controller bootstrap, §4.5 step 1).
    pub fn trigger_priority_refresh(&self) {
        self.priority_notify.notify_one();
    }

    /// Ensures `topics` are present in the snapshot (inserting empty entries
    /// if missing) under the write lock, then publishes (§4.6 case f step 1).
    pub fn ensure_topics_present(&self, topics: &[String]) {
        let _guard = self.write_lock.lock();
        let mut next = (*self.snapshot.load_full()).clone();
        let mut changed = false;
        for topic in topics {
            if !next.topics.contains_key(topic) {
                next.topics.insert(topic.clone(), TopicPartitions::default());
                changed = true;
            }
        }
        if changed {
            self.snapshot.store(Arc::new(next));
        }
    }

    /// `fetch_metadata(ctx, all, topics)` (§4.4). `all = true` requests the
    /// wire-level nil topic list; `all = false` with an empty `topics`
    /// requests no topics at all — the two cases are distinct.
    pub async fn fetch_metadata(
        &self,
        ctx: &CancellationToken,
        all: bool,
        topics: Vec<String>,
    ) -> Result<crate::protocol::MetadataResponse> {
        let req = Request::Metadata {
            topics: if all { None } else { Some(topics) },
            allow_auto_topic_creation: self.allow_auto_topic_creation,
        };
        let key = RequestKey::ApiKey(req.api_key());
        let started = std::time::Instant::now();
        let mut attempt = 0u32;
        loop {
            let broker = self.registry.any_broker()?;
            match broker.wait_resp(ctx.clone(), req.clone()).await {
                Ok(Response::Metadata(meta)) => {
                    self.apply_metadata(&meta);
                    return Ok(meta);
                }
                Ok(_) => {
                    return Err(crate::errors::ErrorKind::UnexpectedResponse(req.api_key()).into());
                }
                Err(err) => {
                    use crate::client::retry::RetryDecision;
                    let decision = match self.retry.decide_backoff(attempt, &err, started, &key) {
                        None => RetryDecision::GiveUp,
                        Some(backoff) => {
                            self.retry
                                .wait_backoff(backoff, ctx, &self.root_ctx)
                                .await
                        }
                    };
                    match decision {
                        RetryDecision::Retry => {
                            attempt += 1;
                            continue;
                        }
                        RetryDecision::GiveUp => return Err(err),
                    }
                }
            }
        }
    }

    fn apply_metadata(&self, meta: &crate::protocol::MetadataResponse) {
        if meta.controller_id >= 0 {
            self.controller_id.store(meta.controller_id, Ordering::SeqCst);
        }

        let fresh: Vec<Broker> = meta
            .brokers
            .iter()
            .map(|b| broker_from_metadata(b, (self.conn_factory)(b.id, &b.host, b.port)))
            .collect();
        self.registry.update_brokers(fresh);

        let _guard = self.write_lock.lock();
        let mut next = (*self.snapshot.load_full()).clone();
        for topic in &meta.topics {
            let mut view = TopicPartitions::default();
            if topic.error_code != 0 {
                view.load_error = Some(topic.error_code);
            }
            for partition in &topic.partitions {
                view.partitions.insert(
                    partition.partition,
                    PartitionView {
                        leader: partition.leader,
                        load_error: if partition.error_code != 0 {
                            Some(partition.error_code)
                        } else {
                            None
                        },
                    },
                );
            }
            next.topics.insert(topic.topic.clone(), view);
        }
        self.snapshot.store(Arc::new(next));
    }

    /// Blocks until every topic in `topics` has at least one partition or a
    /// load error, polling the refresh loop every 5s; exits early on `ctx`
    /// cancellation (§4.6 case f step 2, §8 boundary case).
    pub async fn wait_for_topics(&self, ctx: &CancellationToken, topics: &[String]) -> bool {
        loop {
            let snap = self.snapshot();
            let satisfied = topics.iter().all(|t| {
                snap.topics
                    .get(t)
                    .map(|tp| !tp.partitions.is_empty() || tp.load_error.is_some())
                    .unwrap_or(false)
            });
            if satisfied {
                return true;
            }
            self.trigger_refresh();
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(5)) => continue,
                _ = ctx.cancelled() => return false,
                _ = self.root_ctx.cancelled() => return false,
            }
        }
    }

    /// The background refresh loop: waits on the normal trigger, the
    /// priority trigger, or the periodic tick, whichever fires first;
    /// signals `done` on shutdown (§4.4, §4.7 step 5).
    pub async fn run_refresh_loop(self: Arc<Self>) {
        let mut tick = interval(self.refresh_interval);
        loop {
            tokio::select! {
                _ = self.refresh_notify.notified() => {
                    trace!("metadata refresh triggered");
                }
                _ = self.priority_notify.notified() => {
                    debug!("metadata priority refresh triggered");
                }
                _ = tick.tick() => {
                    trace!("metadata periodic refresh tick");
                }
                _ = self.root_ctx.cancelled() => {
                    break;
                }
            }
            if self.root_ctx.is_cancelled() {
                break;
            }
            if let Err(err) = self.fetch_metadata(&self.root_ctx, true, vec![]).await {
                warn!("background metadata refresh failed: {}", err);
            }
        }
        if let Some(tx) = self.done_tx.lock().take() {
            let _ = tx.send(());
        }
    }

    /// Blocks until `run_refresh_loop` has observed shutdown and returned
    /// (§4.7 step 5). Idempotent: a second call (there shouldn't be one,
    /// `close()` guards against re-entry) returns immediately.
    pub async fn wait_done(&self) {
        let rx = self.done_rx.lock().take();
        if let Some(rx) = rx {
            let _ = rx.await;
        }
    }

    /// Forces an initial broker load when the controller id hasn't been
    /// resolved yet (§4.5 step 1, §4.6 case c). Returns the resolved id or
    /// `UnknownController` if it's still unresolved afterward.
    pub async fn ensure_controller_known(&self, ctx: &CancellationToken) -> Result<BrokerId> {
        if self.controller_id() == UNKNOWN_CONTROLLER_ID {
            self.fetch_metadata(ctx, true, vec![]).await?;
        }
        let id = self.controller_id();
        if id == UNKNOWN_CONTROLLER_ID {
            Err(crate::errors::ErrorKind::UnknownController.into())
        } else {
            Ok(id)
        }
    }
}
