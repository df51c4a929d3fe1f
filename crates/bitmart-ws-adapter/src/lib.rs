/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public BitMart WebSocket adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod config;
pub mod error;
pub mod types;
pub mod ws;

// Re-export commonly used types from auth
pub use auth::{
    AuthAck,
    Credentials,
    MessageSigner,
    SignMessageFn,
    WsAuthenticator,
    WsSignature,
};

pub use config::WsClientConfig;
pub use error::{BitmartError, Result};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    BitmartWebSocket,
    ConnectHandle,
    ConnectionState,
    TopicSnapshot,
    TungsteniteTransport,
    WsClientEvent,
    WsConnection,
    WsEvent,
    WsException,
    WsTransport,
};
