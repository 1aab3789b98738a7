#![recursion_limit = "128"]

#[macro_use]
extern crate error_chain;

mod client;
mod compression;
pub mod errors;
mod protocol;

pub use client::{
    is_seed_id, unknown_seed_id, Broker, BrokerConnection, BrokerHandle, BrokerId, Client,
    ClientBuilder, ClientConfig, ClosedReceiver, ConsumerHooks, ProducerHooks,
    DEFAULT_BROKER_PORT, UNKNOWN_CONTROLLER_ID,
};
pub use compression::Compression;
pub use errors::{Error, ErrorKind, KafkaCode};
pub use protocol::{
    ApiKeys, CoordinatorKey, CoordinatorKind, FetchOffset, Request, RequestKey,
    RequiredAcks, Response,
};
