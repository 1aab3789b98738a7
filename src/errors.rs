//! Errors reported by a remote Kafka server and by the routing core itself.
//!
//! We use numeric codes to indicate what problem occurred on the server.
//! These can be translated by the client into exceptions or
//! whatever the appropriate error handling mechanism in the client language.
//!
//! See also [Kafka Errors](http://kafka.apache.org/protocol.html)

use crate::client::BrokerId;
use crate::protocol::{ApiKeys as ApiKey, CoordinatorKey};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KafkaCode {
    /// The server experienced an unexpected error when processing the request
    Unknown = -1,
    None = 0,
    /// The requested offset is outside the range of offsets
    /// maintained by the server for the given topic/partition
    OffsetOutOfRange = 1,
    /// This indicates that a message contents does not match its CRC
    CorruptMessage = 2,
    /// This request is for a topic or partition that does not exist
    /// on this broker.
    UnknownTopicOrPartition = 3,
    /// The message has a negative size
    InvalidMessageSize = 4,
    /// This error is thrown if we are in the middle of a leadership
    /// election and there is currently no leader for this partition
    /// and hence it is unavailable for writes.
    LeaderNotAvailable = 5,
    /// This error is thrown if the client attempts to send messages
    /// to a replica that is not the leader for some partition. It
    /// indicates that the clients metadata is out of date.
    NotLeaderForPartition = 6,
    /// This error is thrown if the request exceeds the user-specified
    /// time limit in the request.
    RequestTimedOut = 7,
    /// This is not a client facing error and is used mostly by tools
    /// when a broker is not alive.
    BrokerNotAvailable = 8,
    /// If replica is expected on a broker, but is not (this can be
    /// safely ignored).
    ReplicaNotAvailable = 9,
    /// The server has a configurable maximum message size to avoid
    /// unbounded memory allocation. This error is thrown if the
    /// client attempt to produce a message larger than this maximum.
    MessageSizeTooLarge = 10,
    /// Internal error code for broker-to-broker communication.
    StaleControllerEpoch = 11,
    /// If you specify a string larger than configured maximum for
    /// offset metadata
    OffsetMetadataTooLarge = 12,
    /// The server disconnected before a response was received.
    NetworkException = 13,
    /// The coordinator is still loading and hasn't finished (group or txn).
    CoordinatorLoadInProgress = 14,
    /// The coordinator for the requested group/txn is not available.
    CoordinatorNotAvailable = 15,
    /// The broker returns this error code if it receives a request
    /// for a group/txn that it is not the coordinator for.
    NotCoordinator = 16,
    /// For a request which attempts to access an invalid topic
    /// (e.g. one which has an illegal name), or if an attempt is made
    /// to write to an internal topic (such as the consumer offsets
    /// topic).
    InvalidTopic = 17,
    /// If a message batch in a produce request exceeds the maximum
    /// configured segment size.
    RecordListTooLarge = 18,
    /// Returned from a produce request when the number of in-sync
    /// replicas is lower than the configured minimum and requiredAcks is
    /// -1.
    NotEnoughReplicas = 19,
    /// Returned from a produce request when the message was written
    /// to the log, but with fewer in-sync replicas than required.
    NotEnoughReplicasAfterAppend = 20,
    /// Returned from a produce request if the requested requiredAcks is
    /// invalid (anything other than -1, 1, or 0).
    InvalidRequiredAcks = 21,
    /// Returned from group membership requests (such as heartbeats) when
    /// the generation id provided in the request is not the current
    /// generation.
    IllegalGeneration = 22,
    /// Returned in join group when the member provides a protocol type or
    /// set of protocols which is not compatible with the current group.
    InconsistentGroupProtocol = 23,
    /// Returned in join group when the groupId is empty or null.
    InvalidGroupId = 24,
    /// Returned from group requests (offset commits/fetches, heartbeats,
    /// etc) when the memberId is not in the current generation.
    UnknownMemberId = 25,
    /// Return in join group when the requested session timeout is outside
    /// of the allowed range on the broker
    InvalidSessionTimeout = 26,
    /// Returned in heartbeat requests when the coordinator has begun
    /// rebalancing the group. This indicates to the client that it
    /// should rejoin the group.
    RebalanceInProgress = 27,
    /// This error indicates that an offset commit was rejected because of
    /// oversize metadata.
    InvalidCommitOffsetSize = 28,
    /// Returned by the broker when the client is not authorized to access
    /// the requested topic.
    TopicAuthorizationFailed = 29,
    /// Returned by the broker when the client is not authorized to access
    /// a particular groupId.
    GroupAuthorizationFailed = 30,
    /// Returned by the broker when the client is not authorized to use an
    /// inter-broker or administrative API.
    ClusterAuthorizationFailed = 31,
    /// The timestamp of the message is out of acceptable range.
    InvalidTimestamp = 32,
    /// The broker does not support the requested SASL mechanism.
    UnsupportedSaslMechanism = 33,
    /// Request is not valid given the current SASL state.
    IllegalSaslState = 34,
    /// The version of API is not supported.
    UnsupportedVersion = 35,
    /// Topic with this name already exists.
    TopicAlreadyExists = 36,
    /// Number of partitions is invalid.
    InvalidPartitions = 37,
    /// Replication-factor is invalid.
    InvalidReplicationFactor = 38,
    /// Replica assignment is invalid.
    InvalidReplicaAssignment = 39,
    /// Configuration is invalid.
    InvalidConfig = 40,
    /// This is not the correct controller for this cluster.
    NotController = 41,
    /// This most likely occurs because of a request being malformed by the client library
    /// or the message was sent to an incompatible broker. See the broker logs for more details.
    InvalidRequest = 42,
    /// The message format version on the broker does not support the request.
    UnsupportedForMessageFormat = 43,
    /// Request parameters do not satisfy the configured policy.
    PolicyViolation = 44,
}

impl From<i16> for KafkaCode {
    fn from(v: i16) -> Self {
        match v {
            -1 => KafkaCode::Unknown,
            0 => KafkaCode::None,
            1 => KafkaCode::OffsetOutOfRange,
            2 => KafkaCode::CorruptMessage,
            3 => KafkaCode::UnknownTopicOrPartition,
            4 => KafkaCode::InvalidMessageSize,
            5 => KafkaCode::LeaderNotAvailable,
            6 => KafkaCode::NotLeaderForPartition,
            7 => KafkaCode::RequestTimedOut,
            8 => KafkaCode::BrokerNotAvailable,
            9 => KafkaCode::ReplicaNotAvailable,
            10 => KafkaCode::MessageSizeTooLarge,
            11 => KafkaCode::StaleControllerEpoch,
            12 => KafkaCode::OffsetMetadataTooLarge,
            13 => KafkaCode::NetworkException,
            14 => KafkaCode::CoordinatorLoadInProgress,
            15 => KafkaCode::CoordinatorNotAvailable,
            16 => KafkaCode::NotCoordinator,
            17 => KafkaCode::InvalidTopic,
            18 => KafkaCode::RecordListTooLarge,
            19 => KafkaCode::NotEnoughReplicas,
            20 => KafkaCode::NotEnoughReplicasAfterAppend,
            21 => KafkaCode::InvalidRequiredAcks,
            22 => KafkaCode::IllegalGeneration,
            23 => KafkaCode::InconsistentGroupProtocol,
            24 => KafkaCode::InvalidGroupId,
            25 => KafkaCode::UnknownMemberId,
            26 => KafkaCode::InvalidSessionTimeout,
            27 => KafkaCode::RebalanceInProgress,
            28 => KafkaCode::InvalidCommitOffsetSize,
            29 => KafkaCode::TopicAuthorizationFailed,
            30 => KafkaCode::GroupAuthorizationFailed,
            31 => KafkaCode::ClusterAuthorizationFailed,
            32 => KafkaCode::InvalidTimestamp,
            33 => KafkaCode::UnsupportedSaslMechanism,
            34 => KafkaCode::IllegalSaslState,
            35 => KafkaCode::UnsupportedVersion,
            36 => KafkaCode::TopicAlreadyExists,
            37 => KafkaCode::InvalidPartitions,
            38 => KafkaCode::InvalidReplicationFactor,
            39 => KafkaCode::InvalidReplicaAssignment,
            40 => KafkaCode::InvalidConfig,
            41 => KafkaCode::NotController,
            42 => KafkaCode::InvalidRequest,
            43 => KafkaCode::UnsupportedForMessageFormat,
            44 => KafkaCode::PolicyViolation,
            _ => KafkaCode::Unknown,
        }
    }
}

impl KafkaCode {
    /// Whether the Kafka protocol classifies this error as safe to retry.
    ///
    /// Mirrors the broker's `retriable` classification; codes not listed
    /// here are treated as non-retriable.
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            KafkaCode::CorruptMessage
                | KafkaCode::UnknownTopicOrPartition
                | KafkaCode::LeaderNotAvailable
                | KafkaCode::NotLeaderForPartition
                | KafkaCode::RequestTimedOut
                | KafkaCode::NetworkException
                | KafkaCode::CoordinatorLoadInProgress
                | KafkaCode::CoordinatorNotAvailable
                | KafkaCode::NotCoordinator
                | KafkaCode::NotEnoughReplicas
                | KafkaCode::NotEnoughReplicasAfterAppend
                | KafkaCode::RebalanceInProgress
                | KafkaCode::StaleControllerEpoch
                | KafkaCode::NotController
        )
    }

    /// Coordinator-cache-invalidating error codes (§4.6.1).
    pub fn evicts_coordinator(self) -> bool {
        matches!(
            self,
            KafkaCode::CoordinatorNotAvailable
                | KafkaCode::CoordinatorLoadInProgress
                | KafkaCode::NotCoordinator
        )
    }
}

error_chain! {
    errors {
        /// A protocol error code reported by a broker.
        KafkaError(code: KafkaCode) {
            description("kafka protocol error")
            display("kafka protocol error: {:?}", code)
        }

        /// The connection to a broker was torn down; distinct from other
        /// transport failures because it has its own retry budget
        /// (`conn_dead_retries`, see the Retry Policy).
        ConnectionDead(broker: BrokerId) {
            description("connection to broker is dead")
            display("connection to broker #{} is dead", broker)
        }

        /// Any other transport-level failure (dial failure, read/write error,
        /// framing error surfaced by the codec collaborator).
        TransportError(reason: String) {
            description("transport error")
            display("transport error: {}", reason)
        }

        /// A broker id is not present in the registry.
        UnknownBroker(id: BrokerId) {
            description("unknown broker")
            display("unknown broker #{}", id)
        }

        /// The controller id has not yet been resolved by the metadata service.
        UnknownController {
            description("unknown controller")
            display("controller is not yet known")
        }

        /// A coordinator was resolved to a broker id the registry doesn't know.
        UnknownCoordinator(id: BrokerId, key: CoordinatorKey) {
            description("unknown coordinator")
            display("coordinator for {:?} resolved to unknown broker #{}", key, id)
        }

        /// The router received a `Request::Unknown` it has no dispatch rule
        /// for (§4.6 case h): a wire api key newer than this build knows.
        ClientTooOld(raw_api_key: i16) {
            description("client too old")
            display("client does not know how to route api key {}", raw_api_key)
        }

        /// The client has been closed; no further requests are served.
        ClientClosed {
            description("client closed")
            display("client has been closed")
        }

        /// A context (caller or root) was cancelled while waiting.
        Canceled(reason: &'static str) {
            description("canceled")
            display("canceled: {}", reason)
        }

        /// Returned only from client construction.
        ConfigError(reason: String) {
            description("configuration error")
            display("configuration error: {}", reason)
        }

        /// A response of an unexpected shape arrived for a request kind.
        UnexpectedResponse(api_key: ApiKey) {
            description("unexpected response")
            display("unexpected response for request kind {:?}", api_key)
        }
    }
}

impl Error {
    /// True if the Retry Policy should treat this as a retriable error
    /// under the general `retries` budget (the `connection_dead` sentinel
    /// has its own, separate budget; see `is_connection_dead`).
    pub fn is_retriable(&self) -> bool {
        match self.kind() {
            ErrorKind::TransportError(_) => true,
            ErrorKind::KafkaError(code) => code.is_retriable(),
            _ => false,
        }
    }

    pub fn is_connection_dead(&self) -> bool {
        matches!(self.kind(), ErrorKind::ConnectionDead(_))
    }

    pub fn kafka_code(&self) -> Option<KafkaCode> {
        match self.kind() {
            ErrorKind::KafkaError(code) => Some(*code),
            _ => None,
        }
    }
}
