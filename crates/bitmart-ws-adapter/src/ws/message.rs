/*
[INPUT]:  Raw inbound text frames; outbound subscription intents
[OUTPUT]: Classified WsEvent values, heartbeat detection, request frames
[POS]:    WebSocket layer - frame codec and event resolution
[UPDATE]: When adding message types or changing frame format
*/

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{BitmartError, Result};
use crate::types::{ConnectionKey, Market, WsOperation};

const UNHANDLED_EVENT_LOG_LIMIT: usize = 10;
const PARSE_FAIL_LOG_LIMIT: usize = 3;
const RAW_LOG_MAX_BYTES: usize = 1024;

static UNHANDLED_EVENT_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);
static PARSE_FAIL_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

const RESPONSE_EVENTS: [&str; 2] = ["subscribe", "unsubscribe"];

/// Outbound subscribe/unsubscribe request.
///
/// Spot keys the operation as `op`, futures as `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WsRequest {
    Spot { op: WsOperation, args: Vec<String> },
    Futures { action: WsOperation, args: Vec<String> },
}

impl WsRequest {
    pub fn new(market: Market, operation: WsOperation, topics: Vec<String>) -> Self {
        match market {
            Market::Spot => WsRequest::Spot {
                op: operation,
                args: topics,
            },
            Market::Futures => WsRequest::Futures {
                action: operation,
                args: topics,
            },
        }
    }

    pub fn operation(&self) -> WsOperation {
        match self {
            WsRequest::Spot { op, .. } => *op,
            WsRequest::Futures { action, .. } => *action,
        }
    }

    pub fn topics(&self) -> &[String] {
        match self {
            WsRequest::Spot { args, .. } | WsRequest::Futures { args, .. } => args,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Application level ping for a market
pub fn ping_frame(market: Market) -> String {
    match market {
        Market::Spot => "ping".to_string(),
        Market::Futures => serde_json::json!({ "action": "ping" }).to_string(),
    }
}

/// `"pong"` literal or `{"data":"pong"}`
pub fn is_pong(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed == "pong" {
        return true;
    }
    if !trimmed.starts_with('{') {
        return false;
    }
    serde_json::from_str::<Value>(trimmed)
        .map(|value| is_pong_value(&value))
        .unwrap_or(false)
}

fn is_pong_value(value: &Value) -> bool {
    value.as_str() == Some("pong") || value.get("data").and_then(Value::as_str) == Some("pong")
}

/// Frame that could not be classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsException {
    pub message: String,
    pub error: String,
    /// Original payload, untouched
    pub raw: String,
}

/// Classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum WsEvent {
    /// Reply to a subscribe/unsubscribe request
    Response(Value),
    /// Market data or account push
    Update(Value),
    Exception(WsException),
}

impl WsEvent {
    pub fn is_response(&self) -> bool {
        matches!(self, WsEvent::Response(_))
    }

    pub fn is_update(&self) -> bool {
        matches!(self, WsEvent::Update(_))
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, WsEvent::Exception(_))
    }
}

/// Event delivered to the caller, tagged with its connection
#[derive(Debug, Clone, PartialEq)]
pub struct WsClientEvent {
    pub key: ConnectionKey,
    pub event: WsEvent,
}

/// Classify one raw text frame. Never fails; unparseable input becomes an exception event.
pub fn resolve_event(raw: &str) -> WsEvent {
    match serde_json::from_str::<Value>(raw) {
        Ok(parsed) => classify_value(parsed, raw),
        Err(err) => {
            let err = BitmartError::FrameParse(err);
            log_parse_fail_once(&err, raw);
            WsEvent::Exception(WsException {
                message: "Failed to parse event data".to_string(),
                error: err.to_string(),
                raw: raw.to_string(),
            })
        }
    }
}

/// Classify an already parsed frame
pub fn classify_value(parsed: Value, raw: &str) -> WsEvent {
    if let Some(event) = parsed.get("event").and_then(Value::as_str) {
        if RESPONSE_EVENTS.contains(&event) {
            return WsEvent::Response(parsed);
        }
        log_unhandled_event_once(event, raw);
    }

    WsEvent::Update(parsed)
}

/// Subscription acknowledgement extracted from a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionAck {
    pub operation: WsOperation,
    pub topics: Vec<String>,
}

/// Recognise a subscribe/unsubscribe ack by `event` (spot) or `action` (futures).
///
/// Topics are read from `topic`, `topics`, `group` or `args`. Acks carrying
/// `success: false` or an `errorCode` are not treated as confirmations.
pub fn subscription_ack(frame: &Value) -> Option<SubscriptionAck> {
    let name = frame
        .get("event")
        .or_else(|| frame.get("action"))
        .and_then(Value::as_str)?;
    let operation = match name {
        "subscribe" => WsOperation::Subscribe,
        "unsubscribe" => WsOperation::Unsubscribe,
        _ => return None,
    };

    if frame.get("success").and_then(Value::as_bool) == Some(false) || frame.get("errorCode").is_some()
    {
        return None;
    }

    let mut topics = Vec::new();
    for field in ["topic", "group"] {
        if let Some(topic) = frame.get(field).and_then(Value::as_str) {
            topics.push(topic.to_string());
        }
    }
    for field in ["topics", "args"] {
        if let Some(list) = frame.get(field).and_then(Value::as_array) {
            topics.extend(list.iter().filter_map(Value::as_str).map(str::to_string));
        }
    }

    Some(SubscriptionAck { operation, topics })
}

fn log_unhandled_event_once(event: &str, raw: &str) {
    let count = UNHANDLED_EVENT_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count >= UNHANDLED_EVENT_LOG_LIMIT {
        return;
    }

    warn!(
        sample_index = count + 1,
        sample_limit = UNHANDLED_EVENT_LOG_LIMIT,
        event,
        "ws unhandled event type, defaulting to update"
    );
    let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
    debug!(event, message = %preview, "ws unhandled event payload");
}

fn log_parse_fail_once(err: &BitmartError, raw: &str) {
    let count = PARSE_FAIL_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < PARSE_FAIL_LOG_LIMIT {
        warn!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error = %err,
            bytes = raw.len(),
            "ws message parse failed"
        );
        let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
        debug!(error = %err, message = %preview, "ws message parse failed");
    }
}

pub(crate) fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}
