/*
[INPUT]:  Test configuration and scripted socket requirements
[OUTPUT]: Shared test utilities, in-memory transport and fixtures
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for bitmart-ws-adapter tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bitmart_ws_adapter::{
    ConnectionKey, ConnectionState, Credentials, MessageSigner, Result, WsClientConfig,
    WsConnection, WsTransport,
};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;
use url::Url;

pub const STEP_TIMEOUT: Duration = Duration::from_secs(2);
pub const TEST_SIGNATURE: &str = "test-signature";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with quick reconnects and heartbeats effectively disabled
pub fn test_config() -> WsClientConfig {
    let mut config = WsClientConfig {
        heartbeat_interval_ms: 60_000,
        pong_timeout_ms: 1_000,
        auth_timeout_ms: 1_000,
        reconnect_base_delay_ms: 10,
        reconnect_max_delay_ms: 50,
        ..WsClientConfig::default()
    };
    for key in ConnectionKey::ALL {
        config = config.with_url_override(key, format!("ws://mock.invalid/{key}"));
    }
    config
}

pub fn test_credentials() -> Credentials {
    Credentials::new("test-key", "test-secret", "test-memo")
}

pub fn fixed_signer() -> MessageSigner {
    MessageSigner::custom(|_, _| Ok(TEST_SIGNATURE.to_string()))
}

/// Server side of one accepted connection
#[derive(Debug)]
pub struct MockSocket {
    pub key: ConnectionKey,
    pub url: Url,
    outbound: mpsc::Receiver<String>,
    inbound: mpsc::Sender<String>,
}

impl MockSocket {
    /// Next frame sent by the client, heartbeats included
    pub async fn next_raw(&mut self) -> Option<String> {
        tokio::time::timeout(STEP_TIMEOUT, self.outbound.recv())
            .await
            .expect("timed out waiting for client frame")
    }

    /// Next non-heartbeat frame sent by the client, parsed as JSON
    pub async fn next_json(&mut self) -> Value {
        loop {
            let raw = self.next_raw().await.expect("client closed the socket");
            if is_ping(&raw) {
                continue;
            }
            return serde_json::from_str(&raw).expect("client frame is JSON");
        }
    }

    /// Assert the client sends nothing but heartbeats for `window`
    pub async fn expect_quiet(&mut self, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, self.outbound.recv()).await {
                Err(_) => return,
                Ok(Some(raw)) if is_ping(&raw) => continue,
                Ok(Some(raw)) => panic!("unexpected client frame: {raw}"),
                Ok(None) => return,
            }
        }
    }

    /// Resolves once the client has closed its side
    pub async fn closed_by_client(&mut self) -> bool {
        loop {
            match tokio::time::timeout(STEP_TIMEOUT, self.outbound.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }

    pub async fn push(&self, frame: impl Into<String>) {
        self.inbound
            .send(frame.into())
            .await
            .expect("client dropped the socket");
    }

    pub async fn push_json(&self, frame: Value) {
        self.push(frame.to_string()).await;
    }

    /// Simulate the exchange closing the connection
    pub fn drop_connection(self) {
        drop(self);
    }
}

fn is_ping(raw: &str) -> bool {
    raw == "ping" || raw == r#"{"action":"ping"}"#
}

/// In-memory transport handing every accepted socket to the test
#[derive(Debug, Default)]
pub struct MockTransport {
    sockets_tx: Mutex<Option<mpsc::UnboundedSender<MockSocket>>>,
    connects: Mutex<HashMap<ConnectionKey, usize>>,
    total_connects: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, MockSockets) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            sockets_tx: Mutex::new(Some(tx)),
            ..Self::default()
        });
        (
            transport,
            MockSockets {
                rx,
                parked: Vec::new(),
            },
        )
    }

    pub fn connect_count(&self, key: ConnectionKey) -> usize {
        self.connects
            .lock()
            .unwrap()
            .get(&key)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_connects(&self) -> usize {
        self.total_connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WsTransport for MockTransport {
    async fn connect(&self, key: ConnectionKey, url: &Url) -> Result<WsConnection> {
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);

        *self.connects.lock().unwrap().entry(key).or_default() += 1;
        self.total_connects.fetch_add(1, Ordering::SeqCst);

        let socket = MockSocket {
            key,
            url: url.clone(),
            outbound: out_rx,
            inbound: in_tx,
        };
        if let Some(tx) = self.sockets_tx.lock().unwrap().as_ref() {
            let _ = tx.send(socket);
        }

        Ok(WsConnection::new(out_tx, in_rx))
    }
}

/// Transport whose connects never complete
#[derive(Debug, Default)]
pub struct HangingTransport {
    attempts: AtomicUsize,
}

impl HangingTransport {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WsTransport for HangingTransport {
    async fn connect(&self, _key: ConnectionKey, _url: &Url) -> Result<WsConnection> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Test side queue of accepted sockets
pub struct MockSockets {
    rx: mpsc::UnboundedReceiver<MockSocket>,
    parked: Vec<MockSocket>,
}

impl MockSockets {
    /// Next accepted socket for `key`; sockets of other keys are kept for later.
    pub async fn next_for(&mut self, key: ConnectionKey) -> MockSocket {
        if let Some(pos) = self.parked.iter().position(|s| s.key == key) {
            return self.parked.remove(pos);
        }

        loop {
            let socket = tokio::time::timeout(STEP_TIMEOUT, self.rx.recv())
                .await
                .expect("timed out waiting for a connection")
                .expect("transport dropped");
            if socket.key == key {
                return socket;
            }
            self.parked.push(socket);
        }
    }

    /// Assert no new connection arrives for `key` during `window`
    pub async fn expect_no_connection(&mut self, key: ConnectionKey, window: Duration) {
        assert!(
            !self.parked.iter().any(|s| s.key == key),
            "unexpected parked connection for {key}"
        );
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Err(_) | Ok(None) => return,
                Ok(Some(socket)) if socket.key == key => {
                    panic!("unexpected connection for {key}")
                }
                Ok(Some(socket)) => self.parked.push(socket),
            }
        }
    }
}

pub async fn wait_for_state<F>(rx: &mut watch::Receiver<ConnectionState>, predicate: F) -> ConnectionState
where
    F: FnMut(&ConnectionState) -> bool,
{
    let state = tokio::time::timeout(STEP_TIMEOUT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for connection state")
        .expect("connection worker gone");
    *state
}
