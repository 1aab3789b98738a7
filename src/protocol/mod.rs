//! Shared protocol primitives consumed by the routing core.
//!
//! The wire codec itself — encoding, decoding, versioning, compression — is
//! an external collaborator (see the crate-level documentation); this module
//! only carries the small vocabulary of types the Router, Retry Policy, and
//! Timeout Policy need to make routing decisions: API key identities, the
//! taxonomy of typed requests/responses, and the coordinator key type.

mod requests;
mod responses;

pub use self::requests::{
    CoordinatorKey, CoordinatorKind, Request, RequestKey, TopicPartitionSelector,
};
pub use self::responses::{
    BrokerMetadata, DeleteGroupsResponse, DescribeGroupsResponse, FindCoordinatorResponse,
    GroupResult, JoinGroupResponse, ListGroupsEntry, ListGroupsResponse, ListOffsetsResponse,
    MetadataResponse, PartitionMetadata, PartitionResult, ProducePartitionResult,
    ProduceResponse, ProduceTopicResult, RepresentativeErrorCode, Response, SimpleErrorResponse,
    SyncGroupResponse, TopicMetadata, TopicResult,
};

/// Correlation id assigned to an in-flight request by the client, echoed
/// back by the broker in its response header.
pub type CorrelationId = i32;

/// A Kafka partition id.
pub type PartitionId = i32;

/// A log offset within a partition.
pub type Offset = i64;

/// A consumer group generation id.
pub type GenerationId = i32;

/// The raw wire-level error code carried in a response.
pub type ErrorCode = i16;

/// The following are the numeric codes that the ApiKey in the request can
/// take for each of the below request types.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ApiKeys {
    Produce = 0,
    Fetch = 1,
    ListOffsets = 2,
    Metadata = 3,
    LeaderAndIsr = 4,
    StopReplica = 5,
    UpdateMetadata = 6,
    ControlledShutdown = 7,
    OffsetCommit = 8,
    OffsetFetch = 9,
    FindCoordinator = 10,
    JoinGroup = 11,
    Heartbeat = 12,
    LeaveGroup = 13,
    SyncGroup = 14,
    DescribeGroups = 15,
    ListGroups = 16,
    SaslHandshake = 17,
    ApiVersions = 18,
    CreateTopics = 19,
    DeleteTopics = 20,
    DeleteRecords = 21,
    InitProducerId = 22,
    OffsetForLeaderEpoch = 23,
    AddPartitionsToTxn = 24,
    AddOffsetsToTxn = 25,
    EndTxn = 26,
    TxnOffsetCommit = 28,
    SaslAuthenticate = 36,
    CreatePartitions = 37,
    DeleteGroups = 42,
    ElectLeaders = 43,
    AlterPartitionReassignments = 45,
    ListPartitionReassignments = 46,
}

/// Possible choices on acknowledgement requirements when producing records.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i16)]
pub enum RequiredAcks {
    /// Fire-and-forget: don't wait for any acknowledgement.
    None = 0,
    /// Wait for the leader to write the messages to its local log.
    One = 1,
    /// Wait for all in-sync replicas to acknowledge.
    All = -1,
}

/// Target for a `ListOffsets` request: either a timestamp to search for, or
/// one of the two well-known sentinel offsets.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FetchOffset {
    Earliest,
    Latest,
    ByTime(i64),
}
