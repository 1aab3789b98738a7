use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, trace};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::client::broker::{Broker, BrokerId};
use crate::client::metadata::MetadataService;
use crate::client::registry::BrokerRegistry;
use crate::client::retry::{RetryDecision, RetryPolicy};
use crate::errors::{Error, ErrorKind, KafkaCode, Result};
use crate::protocol::{CoordinatorKey, CoordinatorKind, Request, RequestKey, Response};

/// Caches `(name, kind) -> broker_id` for group and transaction
/// coordinators (§4.5). A plain mutex with short critical sections, per §5.
pub struct CoordinatorCache {
    cache: Mutex<HashMap<CoordinatorKey, BrokerId>>,
    registry: Arc<BrokerRegistry>,
    metadata: Arc<MetadataService>,
    retry: Arc<RetryPolicy>,
    root_ctx: CancellationToken,
}

impl CoordinatorCache {
    pub fn new(
        registry: Arc<BrokerRegistry>,
        metadata: Arc<MetadataService>,
        retry: Arc<RetryPolicy>,
        root_ctx: CancellationToken,
    ) -> Self {
        CoordinatorCache {
            cache: Mutex::new(HashMap::new()),
            registry,
            metadata,
            retry,
            root_ctx,
        }
    }

    /// Purges the cache entries for `names` under `kind` (§4.6.1).
    pub fn evict(&self, kind: CoordinatorKind, names: &[String]) {
        let mut cache = self.cache.lock();
        for name in names {
            cache.remove(&CoordinatorKey::new(name.clone(), kind));
        }
    }

    /// `load_coordinator(ctx, key)` (§4.5).
    pub async fn load_coordinator(&self, ctx: &CancellationToken, key: &CoordinatorKey) -> Result<Broker> {
        // Step 1: force an initial broker load so FindCoordinator's NodeID
        // can actually be resolved against the registry.
        let _ = self.metadata.ensure_controller_known(ctx).await;

        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            if let Some(id) = self.cache.lock().get(key).copied() {
                trace!("load_coordinator: cache hit for {:?} -> broker #{}", key, id);
                return self
                    .registry
                    .broker_or_err(id)
                    .map_err(|_| ErrorKind::UnknownCoordinator(id, key.clone()).into());
            }

            let broker = self.registry.any_broker()?;
            let req = Request::FindCoordinator {
                key: key.name.clone(),
                kind: key.kind,
            };
            let req_key = RequestKey::ApiKey(req.api_key());
            let result = broker.wait_resp(ctx.clone(), req.clone()).await;

            let err = match result {
                Ok(Response::FindCoordinator(resp)) => {
                    let code = KafkaCode::from(resp.error_code);
                    if code == KafkaCode::None {
                        self.cache.lock().insert(key.clone(), resp.node_id);
                        return self.registry.broker_or_err(resp.node_id).map_err(|_| {
                            ErrorKind::UnknownCoordinator(resp.node_id, key.clone()).into()
                        });
                    }
                    Error::from(ErrorKind::KafkaError(code))
                }
                Ok(_) => Error::from(ErrorKind::UnexpectedResponse(req.api_key())),
                Err(err) => err,
            };

            let decision = match self.retry.decide_backoff(attempt, &err, started, &req_key) {
                None => RetryDecision::GiveUp,
                Some(backoff) => self.retry.wait_backoff(backoff, ctx, &self.root_ctx).await,
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

    /// `load_coordinators(kind, names...)`: concurrent fan-out, one task per
    /// name; cancels the shared sub-context on the first error so siblings
    /// still in flight (possibly parked in `RetryPolicy` backoff) observe
    /// it and short-circuit rather than running to completion. Returns the
    /// partial map and the first error, if any.
    ///
    /// `FuturesUnordered` is driven to completion one resolved task at a
    /// time, unlike `join_all` (which only yields once every task has
    /// already finished) — that's what makes the cancel-on-first-error
    /// actually race ahead of the remaining siblings instead of firing
    /// after they've all already returned.
    ///
    /// The upstream source stores `errQuit` only when it is already set,
    /// which inverts first-error semantics and leaves it permanently unset
    /// in practice; per the intuitive reading, we record the first error
    /// actually observed instead (see DESIGN.md).
    pub async fn load_coordinators(
        &self,
        ctx: &CancellationToken,
        kind: CoordinatorKind,
        names: &[String],
    ) -> (HashMap<String, BrokerId>, Option<Error>) {
        let sub_ctx = ctx.child_token();
        let mut tasks: FuturesUnordered<_> = names
            .iter()
            .map(|name| {
                let key = CoordinatorKey::new(name.clone(), kind);
                let sub_ctx = sub_ctx.clone();
                async move {
                    let result = self.load_coordinator(&sub_ctx, &key).await;
                    (key.name, result)
                }
            })
            .collect();

        let mut resolved = HashMap::new();
        let mut first_error: Option<Error> = None;
        while let Some((name, result)) = tasks.next().await {
            match result {
                Ok(broker) => {
                    resolved.insert(name, broker.id());
                }
                Err(err) => {
                    if first_error.is_none() {
                        debug!("load_coordinators: first error for {}: {}", name, err);
                        first_error = Some(err);
                        sub_ctx.cancel();
                    }
                }
            }
        }
        (resolved, first_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evict_removes_only_named_keys_under_kind() {
        let registry = Arc::new(BrokerRegistry::new(vec![]));
        let metadata = MetadataService::new(
            registry.clone(),
            Arc::new(RetryPolicy::new(
                0,
                0,
                Arc::new(|_| std::time::Duration::ZERO),
                Arc::new(crate::client::retry::unbounded_retry_timeout),
            )),
            CancellationToken::new(),
            std::time::Duration::from_secs(300),
            false,
            Arc::new(|_, _, _| unimplemented!()),
        );
        let cache = CoordinatorCache::new(
            registry,
            metadata,
            Arc::new(RetryPolicy::new(
                0,
                0,
                Arc::new(|_| std::time::Duration::ZERO),
                Arc::new(crate::client::retry::unbounded_retry_timeout),
            )),
            CancellationToken::new(),
        );
        cache
            .cache
            .lock()
            .insert(CoordinatorKey::group("g1"), 1);
        cache
            .cache
            .lock()
            .insert(CoordinatorKey::group("g2"), 2);
        cache.evict(CoordinatorKind::Group, &["g1".to_owned()]);
        assert!(!cache.cache.lock().contains_key(&CoordinatorKey::group("g1")));
        assert!(cache.cache.lock().contains_key(&CoordinatorKey::group("g2")));
    }
}
