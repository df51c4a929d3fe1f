/*
[INPUT]:  Topic subscriptions, client configuration, transport
[OUTPUT]: Multiplexed connections and classified real-time events
[POS]:    WebSocket layer - real-time data streams
[UPDATE]: When adding new channels or changing connection logic
*/

pub mod client;
pub mod connection;
pub mod message;
pub mod registry;
pub mod topic;
pub mod transport;

pub use client::{BitmartWebSocket, ConnectHandle};
pub use connection::{ConnectionState, TopicSnapshot};
pub use message::{
    SubscriptionAck, WsClientEvent, WsEvent, WsException, WsRequest, is_pong, ping_frame,
    resolve_event, subscription_ack,
};
pub use registry::{SubscriptionRegistry, batch_topics, build_requests};
pub use topic::{
    TopicGroups, classify_market, group_topics_by_key, is_private_channel, key_for_topic,
    resolve_key,
};
pub use transport::{TungsteniteTransport, WsConnection, WsTransport};
