/*
[INPUT]:  Flat topic lists, connect/shutdown requests, client configuration
[OUTPUT]: Per-key commands, connection handles, classified events via channel
[POS]:    WebSocket layer - public facade over the four logical connections
[UPDATE]: When adding caller-level operations or changing routing
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WsClientConfig;
use crate::error::{BitmartError, Result};
use crate::types::ConnectionKey;

use super::connection::{ConnectionCommand, ConnectionState, ConnectionWorker, TopicSnapshot};
use super::message::WsClientEvent;
use super::topic::group_topics_by_key;
use super::transport::{TungsteniteTransport, WsTransport};

#[derive(Debug)]
struct KeyHandle {
    cmd_tx: mpsc::UnboundedSender<ConnectionCommand>,
    state_rx: watch::Receiver<ConnectionState>,
}

/// Resolves once a connection reaches `Open`
#[derive(Debug)]
pub struct ConnectHandle {
    key: ConnectionKey,
    ready: oneshot::Receiver<Result<()>>,
}

impl ConnectHandle {
    pub fn key(&self) -> ConnectionKey {
        self.key
    }

    pub async fn wait(self) -> Result<()> {
        self.ready.await.map_err(|_| BitmartError::Shutdown)?
    }
}

/// Multiplexed WebSocket client for BitMart spot and futures streams.
///
/// Topics are routed to one of four logical connections (spot/futures x
/// public/private). Each connection is driven by its own worker task, which
/// connects lazily, authenticates private keys, resubscribes after every
/// reconnect and forwards classified frames to the receiver returned by
/// [`BitmartWebSocket::take_receiver`].
#[derive(Debug)]
pub struct BitmartWebSocket {
    handles: BTreeMap<ConnectionKey, KeyHandle>,
    event_rx: Option<mpsc::UnboundedReceiver<WsClientEvent>>,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl BitmartWebSocket {
    /// Create a client using the tokio-tungstenite transport.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: WsClientConfig) -> Result<Self> {
        Self::with_transport(config, Arc::new(TungsteniteTransport::new()))
    }

    pub fn with_transport(config: WsClientConfig, transport: Arc<dyn WsTransport>) -> Result<Self> {
        config.validate()?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(BitmartError::Config(
                "BitmartWebSocket requires a Tokio runtime".to_string(),
            ));
        }

        let config = Arc::new(config);
        let shutdown = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut handles = BTreeMap::new();
        let mut workers = Vec::with_capacity(ConnectionKey::ALL.len());

        for key in ConnectionKey::ALL {
            let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
            let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
            let worker = ConnectionWorker::new(
                key,
                config.clone(),
                transport.clone(),
                cmd_rx,
                state_tx,
                event_tx.clone(),
                shutdown.clone(),
            );
            workers.push(tokio::spawn(worker.run()));
            handles.insert(key, KeyHandle { cmd_tx, state_rx });
        }

        Ok(Self {
            handles,
            event_rx: Some(event_rx),
            shutdown,
            workers,
        })
    }

    /// Get the event receiver
    pub fn take_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<WsClientEvent>> {
        self.event_rx.take()
    }

    /// Request subscription to one or more topics.
    ///
    /// - Topics are routed to the correct connection, which connects (and authenticates) on demand.
    /// - Topics are resubscribed automatically after reconnects.
    /// - Unroutable topics are rejected with [`BitmartError::RejectedTopics`]; the rest still go through.
    pub fn subscribe_topics<I, S>(&self, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dispatch_topics(topics, ConnectionCommand::Subscribe)
    }

    /// Unsubscribe from one or more topics.
    ///
    /// Removed topics are dropped from the desired set and will not be resubscribed.
    pub fn unsubscribe_topics<I, S>(&self, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dispatch_topics(topics, ConnectionCommand::Unsubscribe)
    }

    /// Connect one logical connection without waiting for a topic
    pub fn connect(&self, key: ConnectionKey) -> Result<ConnectHandle> {
        let (ready, rx) = oneshot::channel();
        self.send_command(key, ConnectionCommand::Connect { ready })?;
        Ok(ConnectHandle { key, ready: rx })
    }

    /// Connect all four connections eagerly, one handle per key
    pub fn connect_all(&self) -> Result<Vec<ConnectHandle>> {
        ConnectionKey::ALL
            .into_iter()
            .map(|key| self.connect(key))
            .collect()
    }

    pub fn connection_state(&self, key: ConnectionKey) -> ConnectionState {
        self.handle(key)
            .map(|handle| *handle.state_rx.borrow())
            .unwrap_or(ConnectionState::Closed)
    }

    /// Subscribe to connection state changes of one key
    pub fn subscribe_connection_state(
        &self,
        key: ConnectionKey,
    ) -> Result<watch::Receiver<ConnectionState>> {
        Ok(self.handle(key)?.state_rx.clone())
    }

    pub async fn desired_topics(&self, key: ConnectionKey) -> Result<Vec<String>> {
        Ok(self.topic_snapshot(key).await?.desired)
    }

    pub async fn confirmed_topics(&self, key: ConnectionKey) -> Result<Vec<String>> {
        Ok(self.topic_snapshot(key).await?.confirmed)
    }

    /// Consistent view of a key's registry, served by its worker
    pub async fn topic_snapshot(&self, key: ConnectionKey) -> Result<TopicSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send_command(key, ConnectionCommand::Snapshot { reply })?;
        rx.await.map_err(|_| BitmartError::Shutdown)
    }

    /// Cancel pending reconnects and close every connection
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Shutting down WebSocket connections");
        }
        self.shutdown.cancel();
    }

    /// Shut down and wait until every worker has reached `Closed`
    pub async fn shutdown_and_wait(&mut self) {
        self.shutdown();
        for worker in self.workers.drain(..) {
            if let Err(err) = worker.await {
                warn!(error = %err, "Connection worker panicked");
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn dispatch_topics<I, S>(&self, topics: I, command: fn(Vec<String>) -> ConnectionCommand) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.is_shutdown() {
            return Err(BitmartError::Shutdown);
        }

        let groups = group_topics_by_key(topics);
        for (key, topics) in &groups.by_key {
            debug!(%key, topic_count = topics.len(), "Routing topics");
            self.send_command(*key, command(topics.clone()))?;
        }

        match groups.into_rejection() {
            Some(err) => {
                warn!(error = %err, "Topics rejected before routing");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn send_command(&self, key: ConnectionKey, command: ConnectionCommand) -> Result<()> {
        if self.is_shutdown() {
            return Err(BitmartError::Shutdown);
        }
        self.handle(key)?
            .cmd_tx
            .send(command)
            .map_err(|_| BitmartError::Shutdown)
    }

    fn handle(&self, key: ConnectionKey) -> Result<&KeyHandle> {
        self.handles.get(&key).ok_or_else(|| BitmartError::UnresolvedEndpoint {
            key,
            reason: "no connection worker".to_string(),
        })
    }
}

impl Drop for BitmartWebSocket {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
