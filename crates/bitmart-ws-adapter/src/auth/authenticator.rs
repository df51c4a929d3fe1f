/*
[INPUT]:  Credentials, current time in millis, receive window, message signer
[OUTPUT]: WsSignature (expiry + signature) and market-specific auth frames
[POS]:    Auth layer - orchestrates private connection authentication
[UPDATE]: When the auth message template or frame layout changes
*/

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{BitmartError, Result};
use crate::types::Market;

use super::MessageSigner;

const AUTH_PATH: &str = "GET/user/verify";
const FUTURES_ACCESS_DEVICE: &str = "web";

pub const API_KEY_ENV: &str = "BITMART_API_KEY";
pub const API_SECRET_ENV: &str = "BITMART_API_SECRET";
pub const API_MEMO_ENV: &str = "BITMART_API_MEMO";

/// API credentials shared with the REST client
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    /// Memo chosen when the API key was created
    pub api_memo: String,
}

impl Credentials {
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        api_memo: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            api_memo: api_memo.into(),
        }
    }

    /// Read credentials from `BITMART_API_KEY`, `BITMART_API_SECRET` and `BITMART_API_MEMO`.
    ///
    /// Returns `None` unless all three are set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var(API_KEY_ENV).ok()?;
        let api_secret = std::env::var(API_SECRET_ENV).ok()?;
        let api_memo = std::env::var(API_MEMO_ENV).ok()?;
        Some(Self::new(api_key, api_secret, api_memo))
    }

    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty() && !self.api_memo.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .field("api_memo", &"***")
            .finish()
    }
}

/// Signature for one connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsSignature {
    /// Unix seconds
    pub expires_at: i64,
    pub signature: String,
}

/// Outcome of an auth frame as reported by the exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthAck {
    Accepted,
    Rejected(String),
}

/// Sign the auth message `"{expiresAt}GET/user/verify"`.
///
/// `expiresAt = floor((now + recv_window) / 1000)`.
pub fn sign(
    credentials: Option<&Credentials>,
    now_millis: i64,
    recv_window_ms: u64,
    signer: &MessageSigner,
) -> Result<WsSignature> {
    let credentials = credentials
        .filter(|c| c.is_complete())
        .ok_or(BitmartError::MissingCredentials)?;

    let window = i64::try_from(recv_window_ms)
        .map_err(|_| BitmartError::Config(format!("recv window too large: {recv_window_ms}")))?;
    let expires_at = now_millis.saturating_add(window).div_euclid(1000);
    let message = format!("{expires_at}{AUTH_PATH}");
    let signature = signer.sign(&message, &credentials.api_secret)?;

    Ok(WsSignature {
        expires_at,
        signature,
    })
}

/// Builds auth frames for private connections
#[derive(Debug, Clone)]
pub struct WsAuthenticator {
    credentials: Option<Credentials>,
    recv_window_ms: u64,
    signer: MessageSigner,
}

impl WsAuthenticator {
    pub fn new(credentials: Option<Credentials>, recv_window_ms: u64, signer: MessageSigner) -> Self {
        Self {
            credentials,
            recv_window_ms,
            signer,
        }
    }

    /// Whether any credentials were supplied. Incomplete ones still count and fail at sign time.
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn sign(&self, now_millis: i64) -> Result<WsSignature> {
        sign(
            self.credentials.as_ref(),
            now_millis,
            self.recv_window_ms,
            &self.signer,
        )
    }

    /// Serialized auth frame for a market, signed fresh for this attempt
    pub fn auth_frame(&self, market: Market, now_millis: i64) -> Result<String> {
        let WsSignature {
            expires_at,
            signature,
        } = self.sign(now_millis)?;
        let api_key = self
            .credentials
            .as_ref()
            .map(|c| c.api_key.as_str())
            .ok_or(BitmartError::MissingCredentials)?;

        let frame = match market {
            Market::Spot => json!({
                "op": "login",
                "args": [api_key, expires_at.to_string(), signature],
            }),
            Market::Futures => json!({
                "action": "access",
                "args": [api_key, expires_at.to_string(), signature, FUTURES_ACCESS_DEVICE],
            }),
        };
        Ok(frame.to_string())
    }
}

/// Recognise an auth acknowledgement; `None` for any other frame.
pub fn auth_ack(frame: &Value) -> Option<AuthAck> {
    let event = frame.get("event").and_then(Value::as_str);
    let action = frame.get("action").and_then(Value::as_str);

    match (event, action) {
        (Some("login"), _) => match frame.get("errorCode") {
            Some(code) => Some(AuthAck::Rejected(error_message(frame, code))),
            None => Some(AuthAck::Accepted),
        },
        (Some("error"), _) => {
            let code = frame.get("errorCode").unwrap_or(&Value::Null);
            Some(AuthAck::Rejected(error_message(frame, code)))
        }
        (_, Some("access")) => {
            if frame.get("success").and_then(Value::as_bool) == Some(true) {
                Some(AuthAck::Accepted)
            } else {
                let message = frame
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("access denied")
                    .to_string();
                Some(AuthAck::Rejected(message))
            }
        }
        _ => None,
    }
}

fn error_message(frame: &Value, code: &Value) -> String {
    let message = frame
        .get("errorMessage")
        .and_then(Value::as_str)
        .unwrap_or("login rejected");
    format!("{message} (code {code})")
}
