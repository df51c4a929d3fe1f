/*
[INPUT]:  API credentials and clock
[OUTPUT]: Timed signatures and auth frames for private connections
[POS]:    Auth layer - handles BitMart WebSocket authentication
[UPDATE]: When auth flow or signature methods change
*/

pub mod authenticator;
pub mod signer;

pub use authenticator::{AuthAck, Credentials, WsAuthenticator, WsSignature, auth_ack, sign};
pub use signer::{MessageSigner, SignMessageFn, hmac_sha256_base64};
