mod broker;
mod client;
mod config;
mod coordinator;
mod hooks;
mod metadata;
mod registry;
mod retry;
mod router;
mod timeout;

pub use self::broker::{
    is_seed_id, parse_host_port, unknown_seed_id, Broker, BrokerConnection, BrokerId,
    DEFAULT_BROKER_PORT, UNKNOWN_CONTROLLER_ID,
};
pub use self::client::{BrokerHandle, Client, ClosedReceiver};
pub use self::config::{ClientBuilder, ClientConfig};
pub use self::coordinator::CoordinatorCache;
pub use self::hooks::{ConsumerHooks, ProducerHooks};
pub use self::metadata::{MetadataService, TopicsSnapshot};
pub use self::registry::BrokerRegistry;
pub use self::retry::RetryPolicy;
pub use self::router::Router;
pub use self::timeout::TimeoutPolicy;
