use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::client::broker::{Broker, BrokerId};
use crate::client::coordinator::CoordinatorCache;
use crate::client::metadata::MetadataService;
use crate::client::registry::BrokerRegistry;
use crate::client::retry::{RetryDecision, RetryPolicy};
use crate::client::timeout::TimeoutPolicy;
use crate::errors::{Error, ErrorKind, KafkaCode, Result};
use crate::protocol::{
    CoordinatorKey, CoordinatorKind, DeleteGroupsResponse, DescribeGroupsResponse,
    ListGroupsEntry, ListGroupsResponse, ListOffsetsResponse, PartitionResult,
    RepresentativeErrorCode, Request, RequestKey, Response, TopicResult,
};

/// Typed dispatch over the request taxonomy (§4.6): inspects a request and
/// routes it to any-broker, the controller, a coordinator, or a
/// per-partition/per-broker fan-out, merging fan-out responses.
pub struct Router {
    registry: Arc<BrokerRegistry>,
    metadata: Arc<MetadataService>,
    coordinators: Arc<CoordinatorCache>,
    retry: Arc<RetryPolicy>,
    timeout: Arc<TimeoutPolicy>,
    root_ctx: CancellationToken,
}

impl Router {
    pub fn new(
        registry: Arc<BrokerRegistry>,
        metadata: Arc<MetadataService>,
        coordinators: Arc<CoordinatorCache>,
        retry: Arc<RetryPolicy>,
        timeout: Arc<TimeoutPolicy>,
        root_ctx: CancellationToken,
    ) -> Self {
        Router {
            registry,
            metadata,
            coordinators,
            retry,
            timeout,
            root_ctx,
        }
    }

    pub async fn route(&self, ctx: &CancellationToken, req: Request) -> Result<Response> {
        // §4.1: timeouts are computed (and, for JoinGroup, cached) up front;
        // they're handed to the Broker capability, which applies them — the
        // router itself only layers the retry-window timeout on top.
        let _ = self.timeout.compute(&req);

        match &req {
            // (b) Metadata request — hijacked, no second retry layer.
            Request::Metadata {
                topics,
                allow_auto_topic_creation: _,
            } => {
                let all = topics.is_none();
                let names = topics.clone().unwrap_or_default();
                self.metadata
                    .fetch_metadata(ctx, all, names)
                    .await
                    .map(Response::Metadata)
            }

            // (c) Admin request — resolve controller, issue with retry.
            _ if req.is_admin() => self.route_to_controller(ctx, req.clone()).await,

            // (d) Group-coordinator, single-group shape.
            Request::OffsetCommit { group, .. }
            | Request::OffsetFetch { group, .. }
            | Request::JoinGroup { group, .. }
            | Request::SyncGroup { group, .. }
            | Request::Heartbeat { group, .. }
            | Request::LeaveGroup { group, .. } => {
                let key = CoordinatorKey::group(group.clone());
                self.handle_coordinator_simple(ctx, key, req.clone()).await
            }

            // (d) Group-coordinator, multi-group shape.
            Request::DescribeGroups { groups } => {
                self.route_describe_groups(ctx, groups.clone()).await
            }
            Request::DeleteGroups { groups } => self.route_delete_groups(ctx, groups.clone()).await,

            // (e) Transaction-coordinator requests.
            Request::InitProducerId {
                transactional_id: None,
                ..
            } => {
                // Any-broker path, but still through the post-processing
                // wrapper with an empty names list (no cache eviction
                // possible for an unnamed transaction).
                self.handle_coordinator_any_broker(ctx, req.clone()).await
            }
            Request::InitProducerId {
                transactional_id: Some(id),
                ..
            } => {
                let key = CoordinatorKey::transaction(id.clone());
                self.handle_coordinator_simple(ctx, key, req.clone()).await
            }
            Request::AddPartitionsToTxn { .. }
            | Request::AddOffsetsToTxn { .. }
            | Request::EndTxn { .. }
            | Request::TxnOffsetCommit { .. } => {
                // AddOffsetsToTxn/TxnOffsetCommit key on the owning group,
                // AddPartitionsToTxn/EndTxn on the transactional id — both
                // per `Request::key()` (§4.6 case e).
                let key = match req.key() {
                    RequestKey::Coordinator(kind, name) => CoordinatorKey::new(name, kind),
                    RequestKey::ApiKey(_) | RequestKey::Raw(_) => {
                        unreachable!("txn requests always key on a coordinator")
                    }
                };
                self.handle_coordinator_simple(ctx, key, req.clone()).await
            }

            // (f) ListOffsets / OffsetForLeaderEpoch — per-partition fan-out.
            Request::ListOffsets { .. } | Request::OffsetForLeaderEpoch { .. } => {
                self.route_partition_fan_out(ctx, req.clone()).await
            }

            // (g) ListGroups — broadcast to every non-seed broker.
            Request::ListGroups => self.route_list_groups(ctx).await,

            // (h) Unknown typed request — no dispatch rule exists for it.
            Request::Unknown(raw_api_key) => Err(ErrorKind::ClientTooOld(*raw_api_key).into()),

            // (a) Any-broker (default).
            _ => self.route_any_broker(ctx, req.clone()).await,
        }
    }

    async fn issue_with_retry(
        &self,
        ctx: &CancellationToken,
        broker: &Broker,
        req: Request,
    ) -> Result<Response> {
        let key = req.key();
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            match broker.wait_resp(ctx.clone(), req.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
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

    /// (a) Any-broker default path. `Request::Unknown` is intercepted by
    /// `route()`'s case (h) before it ever reaches here, so every request
    /// arriving at this path is a known, routable shape.
    async fn route_any_broker(&self, ctx: &CancellationToken, req: Request) -> Result<Response> {
        let broker = self.registry.any_broker()?;
        self.issue_with_retry(ctx, &broker, req).await
    }

    /// (c) Admin requests.
    async fn route_to_controller(&self, ctx: &CancellationToken, req: Request) -> Result<Response> {
        let controller_id = self.metadata.ensure_controller_known(ctx).await?;
        let broker = self.registry.broker_or_err(controller_id)?;
        self.issue_with_retry(ctx, &broker, req).await
    }

    /// `handle_coordinator_simple(kind, name)` (§4.6 case d/e).
    async fn handle_coordinator_simple(
        &self,
        ctx: &CancellationToken,
        key: CoordinatorKey,
        req: Request,
    ) -> Result<Response> {
        let broker = self.coordinators.load_coordinator(ctx, &key).await?;
        let resp = self.issue_with_retry(ctx, &broker, req).await?;
        self.post_process_coordinator_response(key.kind, &[key.name], resp)
    }

    /// `InitProducerID` with no transactional id: any-broker, but still
    /// through the post-processing wrapper with an empty names list.
    async fn handle_coordinator_any_broker(
        &self,
        ctx: &CancellationToken,
        req: Request,
    ) -> Result<Response> {
        let broker = self.registry.any_broker()?;
        let resp = self.issue_with_retry(ctx, &broker, req).await?;
        self.post_process_coordinator_response(CoordinatorKind::Transaction, &[], resp)
    }

    /// §4.6.1: extract the representative error code; on a
    /// cache-invalidating code, evict and surface the mapped error.
    fn post_process_coordinator_response(
        &self,
        kind: CoordinatorKind,
        names: &[String],
        resp: Response,
    ) -> Result<Response> {
        let code = KafkaCode::from(resp.representative_error_code());
        if code.evicts_coordinator() {
            self.coordinators.evict(kind, names);
            return Err(ErrorKind::KafkaError(code).into());
        }
        Ok(resp)
    }

    /// (d) Multi-group `DescribeGroups`.
    async fn route_describe_groups(
        &self,
        ctx: &CancellationToken,
        groups: Vec<String>,
    ) -> Result<Response> {
        let (by_broker, first_err) = self.group_names_by_broker(ctx, &groups).await;
        if by_broker.is_empty() {
            return Err(first_err.unwrap_or_else(|| ErrorKind::UnknownController.into()));
        }

        let results = join_all(by_broker.into_iter().map(|(broker, names)| {
            let req = Request::DescribeGroups { groups: names };
            async move { self.issue_with_retry(ctx, &broker, req).await }
        }))
        .await;

        let mut merged = DescribeGroupsResponse::default();
        let mut any_ok = false;
        let mut first_error = first_err;
        for result in results {
            match result {
                Ok(Response::DescribeGroups(r)) => {
                    any_ok = true;
                    merged.version = r.version;
                    merged.throttle_ms = r.throttle_ms;
                    merged.groups.extend(r.groups);
                }
                Ok(_) => {}
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        if any_ok {
            Ok(Response::DescribeGroups(merged))
        } else {
            Err(first_error.unwrap_or_else(|| ErrorKind::ClientClosed.into()))
        }
    }

    /// (d) Multi-group `DeleteGroups`.
    async fn route_delete_groups(
        &self,
        ctx: &CancellationToken,
        groups: Vec<String>,
    ) -> Result<Response> {
        let (by_broker, first_err) = self.group_names_by_broker(ctx, &groups).await;
        if by_broker.is_empty() {
            return Err(first_err.unwrap_or_else(|| ErrorKind::UnknownController.into()));
        }

        let results = join_all(by_broker.into_iter().map(|(broker, names)| {
            let req = Request::DeleteGroups { groups: names };
            async move { self.issue_with_retry(ctx, &broker, req).await }
        }))
        .await;

        let mut merged = DeleteGroupsResponse::default();
        let mut any_ok = false;
        let mut first_error = first_err;
        for result in results {
            match result {
                Ok(Response::DeleteGroups(r)) => {
                    any_ok = true;
                    merged.groups.extend(r.groups);
                }
                Ok(_) => {}
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        if any_ok {
            Ok(Response::DeleteGroups(merged))
        } else {
            Err(first_error.unwrap_or_else(|| ErrorKind::ClientClosed.into()))
        }
    }

    async fn group_names_by_broker(
        &self,
        ctx: &CancellationToken,
        groups: &[String],
    ) -> (Vec<(Broker, Vec<String>)>, Option<Error>) {
        let (resolved, first_err) = self
            .coordinators
            .load_coordinators(ctx, CoordinatorKind::Group, groups)
            .await;

        let mut by_broker: HashMap<BrokerId, (Broker, Vec<String>)> = HashMap::new();
        for (name, broker_id) in resolved {
            if let Ok(broker) = self.registry.broker_or_err(broker_id) {
                by_broker
                    .entry(broker_id)
                    .or_insert_with(|| (broker, Vec::new()))
                    .1
                    .push(name);
            }
        }
        (by_broker.into_values().collect(), first_err)
    }

    /// (f) `ListOffsets` / `OffsetForLeaderEpoch`.
    async fn route_partition_fan_out(&self, ctx: &CancellationToken, req: Request) -> Result<Response> {
        let selectors = match &req {
            Request::ListOffsets { partitions, .. } => partitions.clone(),
            Request::OffsetForLeaderEpoch { partitions } => partitions.clone(),
            _ => unreachable!(),
        };

        let topics: Vec<String> = {
            let mut seen = std::collections::HashSet::new();
            selectors
                .iter()
                .filter(|s| seen.insert(s.topic.clone()))
                .map(|s| s.topic.to_string())
                .collect()
        };
        self.metadata.ensure_topics_present(&topics);

        if !self.metadata.wait_for_topics(ctx, &topics).await {
            return Err(ErrorKind::Canceled("waiting for topic metadata").into());
        }

        let snapshot = self.metadata.snapshot();
        let mut by_broker: HashMap<BrokerId, Vec<crate::protocol::TopicPartitionSelector>> =
            HashMap::new();
        let mut synthesized: HashMap<String, Vec<PartitionResult>> = HashMap::new();

        for selector in &selectors {
            let topic_view = snapshot.topics.get(selector.topic.as_ref());
            match topic_view {
                None => {
                    synthesized
                        .entry(selector.topic.to_string())
                        .or_default()
                        .push(PartitionResult {
                            partition: selector.partition,
                            error_code: KafkaCode::UnknownTopicOrPartition as i16,
                            offsets: vec![],
                        });
                }
                Some(tp) => match tp.partitions.get(&selector.partition) {
                    // (i) unknown partition: the topic loaded, but this
                    // partition id isn't one of its partitions.
                    None => {
                        synthesized
                            .entry(selector.topic.to_string())
                            .or_default()
                            .push(PartitionResult {
                                partition: selector.partition,
                                error_code: KafkaCode::UnknownTopicOrPartition as i16,
                                offsets: vec![],
                            });
                    }
                    // (ii) the partition loaded but carries a load error, or
                    // its reported leader isn't a broker we know about.
                    Some(pv) if pv.load_error.is_some() || !self.registry_has(pv.leader) => {
                        let code = pv.load_error.unwrap_or(KafkaCode::Unknown as i16);
                        synthesized
                            .entry(selector.topic.to_string())
                            .or_default()
                            .push(PartitionResult {
                                partition: selector.partition,
                                error_code: code,
                                offsets: vec![],
                            });
                    }
                    Some(pv) => {
                        by_broker.entry(pv.leader).or_default().push(selector.clone());
                    }
                },
            }
        }

        let (replica_id, isolation_level, offset) = match &req {
            Request::ListOffsets {
                replica_id,
                isolation_level,
                offset,
                ..
            } => (*replica_id, *isolation_level, Some(*offset)),
            _ => (-1, 0, None),
        };

        let is_list_offsets = matches!(req, Request::ListOffsets { .. });
        let results = join_all(by_broker.into_iter().map(|(broker_id, partitions)| {
            let req = if is_list_offsets {
                Request::ListOffsets {
                    replica_id,
                    isolation_level,
                    offset: offset.unwrap(),
                    partitions,
                }
            } else {
                Request::OffsetForLeaderEpoch { partitions }
            };
            async move {
                let broker = self.registry.broker_or_err(broker_id)?;
                self.issue_with_retry(ctx, &broker, req).await
            }
        }))
        .await;

        let mut accumulator: HashMap<String, Vec<PartitionResult>> = synthesized;
        let mut any_ok = false;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(Response::ListOffsets(r)) | Ok(Response::OffsetForLeaderEpoch(r)) => {
                    any_ok = true;
                    for topic in r.topics {
                        accumulator
                            .entry(topic.topic)
                            .or_default()
                            .extend(topic.partitions);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        let merged = ListOffsetsResponse {
            throttle_ms: 0,
            topics: accumulator
                .into_iter()
                .map(|(topic, partitions)| TopicResult { topic, partitions })
                .collect(),
        };

        if any_ok || !merged.topics.is_empty() {
            Ok(if is_list_offsets {
                Response::ListOffsets(merged)
            } else {
                Response::OffsetForLeaderEpoch(merged)
            })
        } else {
            Err(first_error.unwrap_or_else(|| ErrorKind::ClientClosed.into()))
        }
    }

    fn registry_has(&self, id: BrokerId) -> bool {
        self.registry.broker_or_err(id).is_ok()
    }

    /// (g) `ListGroups`: broadcast to every non-seed broker.
    async fn route_list_groups(&self, ctx: &CancellationToken) -> Result<Response> {
        let _ = self.metadata.ensure_controller_known(ctx).await;
        let brokers = self.registry.discovered_brokers();
        if brokers.is_empty() {
            return Err(ErrorKind::UnknownController.into());
        }

        let results = join_all(brokers.into_iter().map(|broker| {
            let req = Request::ListGroups;
            async move { self.issue_with_retry(ctx, &broker, req).await }
        }))
        .await;

        let mut groups: Vec<ListGroupsEntry> = Vec::new();
        let mut error_code = 0i16;
        let mut any_ok = false;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(Response::ListGroups(r)) => {
                    any_ok = true;
                    groups.extend(r.groups);
                    if error_code == 0 {
                        error_code = r.error_code;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        if any_ok {
            Ok(Response::ListGroups(ListGroupsResponse { error_code, groups }))
        } else {
            Err(first_error.unwrap_or_else(|| ErrorKind::ClientClosed.into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use super::*;
    use async_trait::async_trait;

    use crate::protocol::{FetchOffset, GroupResult};

    /// A `BrokerConnection` whose response to any request is decided by a
    /// shared closure, so every broker in a fan-out can answer consistently
    /// by inspecting the request itself (which group/coordinator it's for)
    /// rather than by which physical broker happened to receive it.
    struct ScriptedConn<F>(F);

    impl<F> fmt::Debug for ScriptedConn<F> {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.debug_struct("ScriptedConn").finish()
        }
    }

    #[async_trait]
    impl<F> crate::client::BrokerConnection for ScriptedConn<F>
    where
        F: Fn(&Request) -> Result<Response> + Send + Sync,
    {
        async fn wait_resp(&self, _ctx: CancellationToken, req: Request) -> Result<Response> {
            (self.0)(&req)
        }
        fn stop_forever(&self) {}
    }

    fn scripted_broker(
        id: BrokerId,
        f: impl Fn(&Request) -> Result<Response> + Send + Sync + 'static,
    ) -> Broker {
        Broker::new(id, format!("broker-{}", id), 9092, Arc::new(ScriptedConn(f)))
    }

    fn router_with(registry: Arc<BrokerRegistry>) -> Router {
        let root_ctx = CancellationToken::new();
        let retry = Arc::new(RetryPolicy::new(
            0,
            0,
            Arc::new(|_| std::time::Duration::ZERO),
            Arc::new(crate::client::retry::unbounded_retry_timeout),
        ));
        let metadata = MetadataService::new(
            registry.clone(),
            retry.clone(),
            root_ctx.clone(),
            std::time::Duration::from_secs(300),
            false,
            Arc::new(|_, _, _| unimplemented!("no connection factory needed in these tests")),
        );
        let coordinators = Arc::new(CoordinatorCache::new(
            registry.clone(),
            metadata.clone(),
            retry.clone(),
            root_ctx.clone(),
        ));
        let timeout = Arc::new(TimeoutPolicy::new(std::time::Duration::ZERO));
        Router::new(registry, metadata, coordinators, retry, timeout, root_ctx)
    }

    #[tokio::test]
    async fn unknown_request_is_rejected_as_client_too_old() {
        let registry = Arc::new(BrokerRegistry::new(vec![scripted_broker(1, |_| {
            panic!("should never reach a broker")
        })]));
        let router = router_with(registry);
        let ctx = CancellationToken::new();

        let err = router.route(&ctx, Request::Unknown(12345)).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ClientTooOld(12345)));
    }

    /// Both group names resolve to different coordinators; each broker
    /// answers `FindCoordinator` by inspecting the requested group (so the
    /// fan-out's random `any_broker` pick doesn't matter) and then answers
    /// `DescribeGroups` for the groups actually routed to it.
    fn describe_groups_script(req: &Request) -> Result<Response> {
        match req {
            // load_coordinator best-effort-refreshes the controller first
            // and ignores the result; answer with a harmless error rather
            // than hitting the catch-all panic below.
            Request::Metadata { .. } => Err(ErrorKind::UnknownController.into()),
            Request::FindCoordinator { key, kind } if *kind == CoordinatorKind::Group => {
                let node_id = if key == "g1" { 1 } else { 2 };
                Ok(Response::FindCoordinator(crate::protocol::FindCoordinatorResponse {
                    error_code: 0,
                    node_id,
                    host: "coordinator".into(),
                    port: 9092,
                }))
            }
            Request::DescribeGroups { groups } => {
                Ok(Response::DescribeGroups(DescribeGroupsResponse {
                    version: 1,
                    throttle_ms: 0,
                    groups: groups
                        .iter()
                        .map(|g| GroupResult {
                            group: g.clone(),
                            error_code: 0,
                        })
                        .collect(),
                }))
            }
            other => panic!("unexpected request in test: {:?}", other),
        }
    }

    #[tokio::test]
    async fn describe_groups_merges_results_across_distinct_coordinators() {
        let registry = Arc::new(BrokerRegistry::new(vec![
            scripted_broker(1, describe_groups_script),
            scripted_broker(2, describe_groups_script),
        ]));
        let router = router_with(registry);
        let ctx = CancellationToken::new();

        let resp = router
            .route(
                &ctx,
                Request::DescribeGroups {
                    groups: vec!["g1".into(), "g2".into()],
                },
            )
            .await
            .unwrap();

        match resp {
            Response::DescribeGroups(r) => {
                let mut names: Vec<&str> = r.groups.iter().map(|g| g.group.as_str()).collect();
                names.sort();
                assert_eq!(names, vec!["g1", "g2"]);
            }
            _ => panic!("expected DescribeGroups response"),
        }
    }

    /// `FindCoordinator` resolves purely on the requested group name (so it
    /// doesn't matter which broker's rotation slot answers it); `broker_id`
    /// pins whether *this* broker's own `DescribeGroups` handler succeeds.
    fn partial_failure_script(broker_id: BrokerId) -> impl Fn(&Request) -> Result<Response> {
        move |req| match req {
            Request::Metadata { .. } => Err(ErrorKind::UnknownController.into()),
            Request::FindCoordinator { key, kind } if *kind == CoordinatorKind::Group => {
                let node_id = if key == "ok-group" { 1 } else { 2 };
                Ok(Response::FindCoordinator(crate::protocol::FindCoordinatorResponse {
                    error_code: 0,
                    node_id,
                    host: "coordinator".into(),
                    port: 9092,
                }))
            }
            Request::DescribeGroups { .. } if broker_id == 2 => {
                Err(ErrorKind::ConnectionDead(2).into())
            }
            Request::DescribeGroups { groups } => {
                Ok(Response::DescribeGroups(DescribeGroupsResponse {
                    version: 1,
                    throttle_ms: 0,
                    groups: groups
                        .iter()
                        .map(|g| GroupResult {
                            group: g.clone(),
                            error_code: 0,
                        })
                        .collect(),
                }))
            }
            other => panic!("unexpected request in test: {:?}", other),
        }
    }

    #[tokio::test]
    async fn describe_groups_fan_out_partial_failure_still_returns_ok_with_what_succeeded() {
        let registry = Arc::new(BrokerRegistry::new(vec![
            scripted_broker(1, partial_failure_script(1)),
            scripted_broker(2, partial_failure_script(2)),
        ]));
        let router = router_with(registry);
        let ctx = CancellationToken::new();

        let resp = router
            .route(
                &ctx,
                Request::DescribeGroups {
                    groups: vec!["ok-group".into(), "dead-group".into()],
                },
            )
            .await
            .unwrap();

        match resp {
            Response::DescribeGroups(r) => {
                assert_eq!(r.groups.len(), 1);
                assert_eq!(r.groups[0].group, "ok-group");
            }
            _ => panic!("expected a partial DescribeGroups response"),
        }
    }

    #[tokio::test]
    async fn list_groups_merges_partial_failure_as_ok_when_any_broker_succeeds() {
        let registry = Arc::new(BrokerRegistry::new(vec![
            scripted_broker(1, |_| {
                Ok(Response::ListGroups(ListGroupsResponse {
                    error_code: 0,
                    groups: vec![ListGroupsEntry {
                        group: "g1".into(),
                        protocol_type: "consumer".into(),
                    }],
                }))
            }),
            scripted_broker(2, |_| Err(ErrorKind::ConnectionDead(2).into())),
        ]));
        let router = router_with(registry);
        let ctx = CancellationToken::new();

        let resp = router.route(&ctx, Request::ListGroups).await.unwrap();
        match resp {
            Response::ListGroups(r) => {
                assert_eq!(r.groups.len(), 1);
                assert_eq!(r.groups[0].group, "g1");
            }
            _ => panic!("expected ListGroups response"),
        }
    }

    #[tokio::test]
    async fn list_groups_fails_when_every_broker_fails() {
        let registry = Arc::new(BrokerRegistry::new(vec![scripted_broker(1, |_| {
            Err(ErrorKind::ConnectionDead(1).into())
        })]));
        let router = router_with(registry);
        let ctx = CancellationToken::new();

        let err = router.route(&ctx, Request::ListGroups).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ConnectionDead(1)));
    }

    /// Only answers `Metadata`, reporting `topic` as loaded (nonzero
    /// top-level error, to rule it out as the source of the partition's
    /// error code) but with no partitions, so the router's post-metadata
    /// partition lookup for `topic` always misses.
    fn topic_loaded_with_no_partitions(topic: &'static str) -> impl Fn(&Request) -> Result<Response> {
        move |req| match req {
            Request::Metadata { topics, .. } => {
                Ok(Response::Metadata(crate::protocol::MetadataResponse {
                    brokers: vec![],
                    controller_id: -1,
                    topics: topics
                        .clone()
                        .unwrap_or_default()
                        .into_iter()
                        .filter(|t| t == topic)
                        .map(|t| crate::protocol::TopicMetadata {
                            topic: t,
                            error_code: 5,
                            partitions: vec![],
                        })
                        .collect(),
                }))
            }
            other => panic!("unexpected request in test: {:?}", other),
        }
    }

    #[tokio::test]
    async fn partition_fan_out_classifies_missing_partition_as_unknown_topic_or_partition_even_with_a_topic_level_error() {
        let registry = Arc::new(BrokerRegistry::new(vec![scripted_broker(
            1,
            topic_loaded_with_no_partitions("missing-topic"),
        )]));
        let router = router_with(registry);
        let ctx = CancellationToken::new();

        // Pre-load the topic (with its own, distinct load error, error code
        // 5) so `wait_for_topics` is satisfied immediately instead of
        // polling a refresh loop that was never spawned in this test.
        router
            .metadata
            .fetch_metadata(&ctx, false, vec!["missing-topic".to_owned()])
            .await
            .unwrap();

        let req = Request::ListOffsets {
            replica_id: -1,
            isolation_level: 0,
            offset: FetchOffset::Latest,
            partitions: vec![crate::protocol::TopicPartitionSelector {
                topic: std::borrow::Cow::Owned("missing-topic".to_owned()),
                partition: 0,
            }],
        };

        let resp = router.route(&ctx, req).await.unwrap();
        match resp {
            Response::ListOffsets(r) => {
                let topic = r.topics.iter().find(|t| t.topic == "missing-topic").unwrap();
                // Bucket (i): the requested partition isn't one of the
                // topic's partitions, so this must be
                // `UnknownTopicOrPartition`, not the topic's own load error
                // (5) or the generic `Unknown` fallback.
                assert_eq!(
                    topic.partitions[0].error_code,
                    KafkaCode::UnknownTopicOrPartition as i16
                );
            }
            _ => panic!("expected ListOffsets response"),
        }
    }

    #[tokio::test]
    async fn partition_fan_out_honors_cancellation_while_waiting_for_topic_metadata() {
        let registry = Arc::new(BrokerRegistry::new(vec![scripted_broker(1, |req| match req {
            Request::Metadata { .. } => Err(ErrorKind::UnknownController.into()),
            other => panic!("unexpected request in test: {:?}", other),
        })]));
        let router = router_with(registry);
        let ctx = CancellationToken::new();
        // A topic that's never going to load would otherwise leave
        // `wait_for_topics` polling forever; canceling up front exercises
        // the boundary case where the caller gives up while waiting.
        ctx.cancel();

        let req = Request::ListOffsets {
            replica_id: -1,
            isolation_level: 0,
            offset: FetchOffset::Latest,
            partitions: vec![crate::protocol::TopicPartitionSelector {
                topic: std::borrow::Cow::Owned("never-seen-topic".to_owned()),
                partition: 0,
            }],
        };

        let err = router.route(&ctx, req).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Canceled(_)));
    }
}
