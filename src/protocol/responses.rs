use super::{ErrorCode, GenerationId, Offset, PartitionId};
use crate::client::BrokerId;

/// A broker entry as reported by a `Metadata` response.
#[derive(Debug, Clone)]
pub struct BrokerMetadata {
    pub id: BrokerId,
    pub host: String,
    pub port: u16,
}

/// One partition's leader (and load error, if any) within a topic's
/// metadata, as reported by a `Metadata` response.
#[derive(Debug, Clone)]
pub struct PartitionMetadata {
    pub partition: PartitionId,
    pub leader: BrokerId,
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone)]
pub struct TopicMetadata {
    pub topic: String,
    pub error_code: ErrorCode,
    pub partitions: Vec<PartitionMetadata>,
}

#[derive(Debug, Clone)]
pub struct MetadataResponse {
    pub brokers: Vec<BrokerMetadata>,
    pub controller_id: BrokerId,
    pub topics: Vec<TopicMetadata>,
}

#[derive(Debug, Clone)]
pub struct PartitionResult {
    pub partition: PartitionId,
    pub error_code: ErrorCode,
    pub offsets: Vec<Offset>,
}

#[derive(Debug, Clone)]
pub struct TopicResult {
    pub topic: String,
    pub partitions: Vec<PartitionResult>,
}

#[derive(Debug, Clone, Default)]
pub struct ListOffsetsResponse {
    pub throttle_ms: i32,
    pub topics: Vec<TopicResult>,
}

#[derive(Debug, Clone)]
pub struct FindCoordinatorResponse {
    pub error_code: ErrorCode,
    pub node_id: BrokerId,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct GroupResult {
    pub group: String,
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone, Default)]
pub struct DescribeGroupsResponse {
    pub version: i16,
    pub throttle_ms: i32,
    pub groups: Vec<GroupResult>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteGroupsResponse {
    pub groups: Vec<GroupResult>,
}

#[derive(Debug, Clone)]
pub struct ListGroupsEntry {
    pub group: String,
    pub protocol_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListGroupsResponse {
    pub error_code: ErrorCode,
    pub groups: Vec<ListGroupsEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct SimpleErrorResponse {
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone)]
pub struct JoinGroupResponse {
    pub error_code: ErrorCode,
    pub generation_id: GenerationId,
    pub protocol: String,
    pub leader_id: String,
    pub member_id: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SyncGroupResponse {
    pub error_code: ErrorCode,
    pub assignment: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ProducePartitionResult {
    pub partition: PartitionId,
    pub error_code: ErrorCode,
    pub offset: Offset,
}

#[derive(Debug, Clone, Default)]
pub struct ProduceTopicResult {
    pub topic: String,
    pub partitions: Vec<ProducePartitionResult>,
}

#[derive(Debug, Clone, Default)]
pub struct ProduceResponse {
    pub topics: Vec<ProduceTopicResult>,
}

/// The typed response taxonomy, mirroring `Request`.
#[derive(Debug, Clone)]
pub enum Response {
    Metadata(MetadataResponse),
    ApiVersions(SimpleErrorResponse),
    SaslHandshake(SimpleErrorResponse),
    SaslAuthenticate(SimpleErrorResponse),
    Produce(ProduceResponse),
    Fetch(SimpleErrorResponse),
    ListOffsets(ListOffsetsResponse),
    OffsetForLeaderEpoch(ListOffsetsResponse),
    FindCoordinator(FindCoordinatorResponse),
    JoinGroup(JoinGroupResponse),
    SyncGroup(SyncGroupResponse),
    Heartbeat(SimpleErrorResponse),
    LeaveGroup(SimpleErrorResponse),
    OffsetCommit(ListOffsetsResponse),
    OffsetFetch {
        top_level_error_code: Option<ErrorCode>,
        topics: Vec<TopicResult>,
    },
    DescribeGroups(DescribeGroupsResponse),
    DeleteGroups(DeleteGroupsResponse),
    ListGroups(ListGroupsResponse),
    InitProducerId(SimpleErrorResponse),
    AddPartitionsToTxn(SimpleErrorResponse),
    AddOffsetsToTxn(SimpleErrorResponse),
    EndTxn(SimpleErrorResponse),
    TxnOffsetCommit(ListOffsetsResponse),
    CreateTopics(SimpleErrorResponse),
    DeleteTopics(SimpleErrorResponse),
    DeleteRecords(ListOffsetsResponse),
    CreatePartitions(SimpleErrorResponse),
    ElectLeaders(SimpleErrorResponse),
    AlterPartitionReassignments(SimpleErrorResponse),
    ListPartitionReassignments(SimpleErrorResponse),
}

/// The single error code §4.6.1 extracts from a coordinator response to
/// decide whether to purge the cache entry: the first partition's error
/// code for partition-keyed responses, the top-level code otherwise.
pub trait RepresentativeErrorCode {
    fn representative_error_code(&self) -> ErrorCode;
}

impl RepresentativeErrorCode for Response {
    fn representative_error_code(&self) -> ErrorCode {
        match self {
            Response::JoinGroup(r) => r.error_code,
            Response::SyncGroup(r) => r.error_code,
            Response::Heartbeat(r)
            | Response::LeaveGroup(r)
            | Response::InitProducerId(r)
            | Response::AddPartitionsToTxn(r)
            | Response::AddOffsetsToTxn(r)
            | Response::EndTxn(r)
            | Response::ApiVersions(r)
            | Response::SaslHandshake(r)
            | Response::SaslAuthenticate(r)
            | Response::Fetch(r)
            | Response::CreateTopics(r)
            | Response::DeleteTopics(r)
            | Response::CreatePartitions(r)
            | Response::ElectLeaders(r)
            | Response::AlterPartitionReassignments(r)
            | Response::ListPartitionReassignments(r) => r.error_code,
            Response::OffsetCommit(r) | Response::TxnOffsetCommit(r) | Response::DeleteRecords(r) => r
                .topics
                .first()
                .and_then(|t| t.partitions.first())
                .map(|p| p.error_code)
                .unwrap_or(0),
            // OffsetFetch: top-level code at wire version >= 2, else the
            // first partition's error code (§4.6.1).
            Response::OffsetFetch {
                top_level_error_code,
                topics,
            } => top_level_error_code.unwrap_or_else(|| {
                topics
                    .first()
                    .and_then(|t| t.partitions.first())
                    .map(|p| p.error_code)
                    .unwrap_or(0)
            }),
            Response::FindCoordinator(r) => r.error_code,
            Response::ListGroups(r) => r.error_code,
            _ => 0,
        }
    }
}
