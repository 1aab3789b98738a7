use std::borrow::Cow;
use std::time::Duration;

use super::{ApiKeys, FetchOffset, GenerationId, PartitionId, RequiredAcks};

/// Which kind of coordinator a name resolves to (§3 "Coordinator Key and Cache").
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CoordinatorKind {
    Group,
    Transaction,
}

/// `(name, kind)` — the key the Coordinator Cache is indexed by (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoordinatorKey {
    pub name: String,
    pub kind: CoordinatorKind,
}

impl CoordinatorKey {
    pub fn new(name: impl Into<String>, kind: CoordinatorKind) -> Self {
        CoordinatorKey {
            name: name.into(),
            kind,
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, CoordinatorKind::Group)
    }

    pub fn transaction(name: impl Into<String>) -> Self {
        Self::new(name, CoordinatorKind::Transaction)
    }
}

/// The key the Retry Policy's per-key `retry_timeout` is looked up by, and
/// the key the Coordinator Cache is indexed by (when applicable). Distinct
/// request instances of the same shape share a key so that a caller-side
/// retry budget configured for "OffsetCommit" applies uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestKey {
    ApiKey(ApiKeys),
    Coordinator(CoordinatorKind, String),
    /// `Request::Unknown`'s raw wire api key; never routed, never retried,
    /// but still a valid hashable key so a caller-side lookup doesn't panic.
    Raw(i16),
}

/// The typed request taxonomy the Router dispatches on (§4.6). Each variant
/// carries exactly the fields routing needs; payload bodies that the wire
/// codec would otherwise carry (record batches, fetch data, …) are
/// deliberately omitted — they belong to the produce/consume pipelines this
/// core is agnostic to.
#[derive(Debug, Clone)]
pub enum Request {
    Metadata {
        /// `None` means "all topics" (wire-level nil topic list); `Some(vec![])`
        /// means "no topics" — the two are distinct and both preserved end to end.
        topics: Option<Vec<String>>,
        allow_auto_topic_creation: bool,
    },
    ApiVersions,
    SaslHandshake {
        mechanism: String,
    },
    SaslAuthenticate {
        bytes: Vec<u8>,
    },
    Produce {
        acks: RequiredAcks,
        timeout_ms: i32,
        topic_partitions: Vec<(String, Vec<PartitionId>)>,
    },
    Fetch {
        max_wait_ms: i32,
        topic_partitions: Vec<(String, Vec<PartitionId>)>,
    },
    ListOffsets {
        replica_id: i32,
        isolation_level: u8,
        offset: FetchOffset,
        partitions: Vec<TopicPartitionSelector>,
    },
    OffsetForLeaderEpoch {
        partitions: Vec<TopicPartitionSelector>,
    },
    FindCoordinator {
        key: String,
        kind: CoordinatorKind,
    },
    JoinGroup {
        group: String,
        session_timeout_ms: i32,
        rebalance_timeout_ms: i32,
        member_id: String,
        protocol_type: String,
    },
    SyncGroup {
        group: String,
        generation_id: GenerationId,
        member_id: String,
    },
    Heartbeat {
        group: String,
        generation_id: GenerationId,
        member_id: String,
    },
    LeaveGroup {
        group: String,
        member_id: String,
    },
    OffsetCommit {
        group: String,
        offsets: Vec<(String, Vec<PartitionId>)>,
    },
    OffsetFetch {
        group: String,
        version: i16,
        topics: Vec<(String, Vec<PartitionId>)>,
    },
    DescribeGroups {
        groups: Vec<String>,
    },
    DeleteGroups {
        groups: Vec<String>,
    },
    ListGroups,
    InitProducerId {
        transactional_id: Option<String>,
        transaction_timeout_ms: i32,
    },
    AddPartitionsToTxn {
        transactional_id: String,
        topic_partitions: Vec<(String, Vec<PartitionId>)>,
    },
    AddOffsetsToTxn {
        transactional_id: String,
        group: String,
    },
    EndTxn {
        transactional_id: String,
        committed: bool,
    },
    TxnOffsetCommit {
        transactional_id: String,
        group: String,
        offsets: Vec<(String, Vec<PartitionId>)>,
    },
    CreateTopics {
        topics: Vec<String>,
        timeout_ms: i32,
    },
    DeleteTopics {
        topics: Vec<String>,
        timeout_ms: i32,
    },
    DeleteRecords {
        timeout_ms: i32,
        partitions: Vec<TopicPartitionSelector>,
    },
    CreatePartitions {
        timeout_ms: i32,
    },
    ElectLeaders {
        timeout_ms: i32,
    },
    AlterPartitionReassignments {
        timeout_ms: i32,
    },
    ListPartitionReassignments {
        timeout_ms: i32,
    },
    /// An api key the router has no dispatch rule for (§4.6 case h): a wire
    /// version newer than this build knows about, surfaced by the codec
    /// collaborator instead of decoded into one of the variants above.
    Unknown(i16),
}

/// A single requested partition within a fan-out request (ListOffsets,
/// OffsetForLeaderEpoch, DeleteRecords).
#[derive(Debug, Clone)]
pub struct TopicPartitionSelector {
    pub topic: Cow<'static, str>,
    pub partition: PartitionId,
}

impl Request {
    pub fn api_key(&self) -> ApiKeys {
        match *self {
            Request::Metadata { .. } => ApiKeys::Metadata,
            Request::ApiVersions => ApiKeys::ApiVersions,
            Request::SaslHandshake { .. } => ApiKeys::SaslHandshake,
            Request::SaslAuthenticate { .. } => ApiKeys::SaslAuthenticate,
            Request::Produce { .. } => ApiKeys::Produce,
            Request::Fetch { .. } => ApiKeys::Fetch,
            Request::ListOffsets { .. } => ApiKeys::ListOffsets,
            Request::OffsetForLeaderEpoch { .. } => ApiKeys::OffsetForLeaderEpoch,
            Request::FindCoordinator { .. } => ApiKeys::FindCoordinator,
            Request::JoinGroup { .. } => ApiKeys::JoinGroup,
            Request::SyncGroup { .. } => ApiKeys::SyncGroup,
            Request::Heartbeat { .. } => ApiKeys::Heartbeat,
            Request::LeaveGroup { .. } => ApiKeys::LeaveGroup,
            Request::OffsetCommit { .. } => ApiKeys::OffsetCommit,
            Request::OffsetFetch { .. } => ApiKeys::OffsetFetch,
            Request::DescribeGroups { .. } => ApiKeys::DescribeGroups,
            Request::DeleteGroups { .. } => ApiKeys::DeleteGroups,
            Request::ListGroups => ApiKeys::ListGroups,
            Request::InitProducerId { .. } => ApiKeys::InitProducerId,
            Request::AddPartitionsToTxn { .. } => ApiKeys::AddPartitionsToTxn,
            Request::AddOffsetsToTxn { .. } => ApiKeys::AddOffsetsToTxn,
            Request::EndTxn { .. } => ApiKeys::EndTxn,
            Request::TxnOffsetCommit { .. } => ApiKeys::TxnOffsetCommit,
            Request::CreateTopics { .. } => ApiKeys::CreateTopics,
            Request::DeleteTopics { .. } => ApiKeys::DeleteTopics,
            Request::DeleteRecords { .. } => ApiKeys::DeleteRecords,
            Request::CreatePartitions { .. } => ApiKeys::CreatePartitions,
            Request::ElectLeaders { .. } => ApiKeys::ElectLeaders,
            Request::AlterPartitionReassignments { .. } => ApiKeys::AlterPartitionReassignments,
            Request::ListPartitionReassignments { .. } => ApiKeys::ListPartitionReassignments,
            Request::Unknown(_) => unreachable!(
                "api_key() is undefined for Request::Unknown; the router dispatches it via \
                 Request::key()/route() before any code calls api_key()"
            ),
        }
    }

    /// The key under which the per-key `retry_timeout` and (for
    /// coordinator-routed requests) the Coordinator Cache are consulted.
    pub fn key(&self) -> RequestKey {
        match self {
            Request::OffsetCommit { group, .. }
            | Request::OffsetFetch { group, .. }
            | Request::JoinGroup { group, .. }
            | Request::SyncGroup { group, .. }
            | Request::Heartbeat { group, .. }
            | Request::LeaveGroup { group, .. } => {
                RequestKey::Coordinator(CoordinatorKind::Group, group.clone())
            }
            Request::AddOffsetsToTxn { group, .. } | Request::TxnOffsetCommit { group, .. } => {
                RequestKey::Coordinator(CoordinatorKind::Group, group.clone())
            }
            Request::AddPartitionsToTxn {
                transactional_id, ..
            }
            | Request::EndTxn {
                transactional_id, ..
            } => RequestKey::Coordinator(CoordinatorKind::Transaction, transactional_id.clone()),
            Request::InitProducerId {
                transactional_id: Some(id),
                ..
            } => RequestKey::Coordinator(CoordinatorKind::Transaction, id.clone()),
            Request::Unknown(raw) => RequestKey::Raw(*raw),
            other => RequestKey::ApiKey(other.api_key()),
        }
    }

    /// `TimeoutMillis`/`MaxWaitMillis`/`RebalanceTimeoutMillis`, when present,
    /// as consumed by the Timeout Policy (§4.1).
    pub fn embedded_timeout(&self) -> Option<Duration> {
        match *self {
            Request::Produce { timeout_ms, .. } => Some(Duration::from_millis(timeout_ms as u64)),
            Request::Fetch { max_wait_ms, .. } => {
                Some(Duration::from_millis(max_wait_ms as u64))
            }
            Request::JoinGroup {
                rebalance_timeout_ms,
                ..
            } => Some(Duration::from_millis(rebalance_timeout_ms as u64)),
            Request::CreateTopics { timeout_ms, .. }
            | Request::DeleteTopics { timeout_ms, .. }
            | Request::DeleteRecords { timeout_ms, .. }
            | Request::CreatePartitions { timeout_ms }
            | Request::ElectLeaders { timeout_ms }
            | Request::AlterPartitionReassignments { timeout_ms }
            | Request::ListPartitionReassignments { timeout_ms } => {
                Some(Duration::from_millis(timeout_ms as u64))
            }
            _ => None,
        }
    }

    /// Whether this is one of the "admin request with a `TimeoutMillis`
    /// field" cases routed through the controller (§4.6 case c).
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Request::CreateTopics { .. }
                | Request::DeleteTopics { .. }
                | Request::DeleteRecords { .. }
                | Request::CreatePartitions { .. }
                | Request::ElectLeaders { .. }
                | Request::AlterPartitionReassignments { .. }
                | Request::ListPartitionReassignments { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_shaped_requests_key_on_group_name() {
        let req = Request::OffsetCommit {
            group: "g".to_owned(),
            offsets: vec![],
        };
        assert_eq!(
            req.key(),
            RequestKey::Coordinator(CoordinatorKind::Group, "g".to_owned())
        );
    }

    #[test]
    fn init_producer_id_without_txn_id_keys_on_api_key() {
        let req = Request::InitProducerId {
            transactional_id: None,
            transaction_timeout_ms: 1_000,
        };
        assert_eq!(req.key(), RequestKey::ApiKey(ApiKeys::InitProducerId));
    }

    #[test]
    fn unknown_request_keys_on_its_raw_api_key_and_has_no_embedded_timeout() {
        let req = Request::Unknown(999);
        assert_eq!(req.key(), RequestKey::Raw(999));
        assert_eq!(req.embedded_timeout(), None);
        assert!(!req.is_admin());
    }

    #[test]
    fn embedded_timeout_present_for_produce() {
        let req = Request::Produce {
            acks: RequiredAcks::All,
            timeout_ms: 1500,
            topic_partitions: vec![],
        };
        assert_eq!(
            req.embedded_timeout(),
            Some(Duration::from_millis(1500))
        );
    }
}
