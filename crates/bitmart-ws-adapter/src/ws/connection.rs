/*
[INPUT]:  Commands from the facade, sockets from the transport, shutdown token
[OUTPUT]: Connection state notifications and classified events per key
[POS]:    WebSocket layer - per-key lifecycle (connect, auth, heartbeat, reconnect)
[UPDATE]: When changing reconnection backoff, heartbeat or auth handshake
*/

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::auth::{AuthAck, WsAuthenticator, auth_ack};
use crate::config::WsClientConfig;
use crate::error::{BitmartError, Result};
use crate::types::{ConnectionKey, WsOperation};

use super::message::{
    WsClientEvent, WsEvent, is_pong, ping_frame, resolve_event, subscription_ack,
};
use super::registry::{SubscriptionRegistry, build_requests};
use super::transport::{WsConnection, WsTransport};

/// Lifecycle of one logical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Open,
    ReconnectPending { attempt: u32 },
    /// Terminal
    Closed,
}

/// Desired and confirmed topics at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSnapshot {
    pub desired: Vec<String>,
    pub confirmed: Vec<String>,
}

#[derive(Debug)]
pub(crate) enum ConnectionCommand {
    Connect { ready: oneshot::Sender<Result<()>> },
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    Snapshot { reply: oneshot::Sender<TopicSnapshot> },
}

#[derive(Debug)]
enum StreamExit {
    Disconnected(String),
    Shutdown,
}

/// Registry, connect intent and pending connect handles of one key
#[derive(Debug, Default)]
struct KeyTopics {
    registry: SubscriptionRegistry,
    wants_connection: bool,
    ready_waiters: Vec<oneshot::Sender<Result<()>>>,
}

impl KeyTopics {
    /// Apply a caller command to local state.
    ///
    /// Returns the request to send when the socket is `open`; callers without
    /// an open socket drop it and rely on the resubscribe at `open`.
    fn apply(
        &mut self,
        key: ConnectionKey,
        cmd: ConnectionCommand,
        open: bool,
    ) -> Option<(WsOperation, Vec<String>)> {
        match cmd {
            ConnectionCommand::Subscribe(topics) => {
                let added = self.registry.add_desired(&topics);
                if added.is_empty() {
                    return None;
                }
                self.wants_connection = true;
                debug!(%key, topic_count = added.len(), "Topics added");
                Some((WsOperation::Subscribe, added))
            }
            ConnectionCommand::Unsubscribe(topics) => {
                let removed = self.registry.remove_desired(&topics);
                if removed.is_empty() {
                    return None;
                }
                debug!(%key, topic_count = removed.len(), "Topics removed");
                Some((WsOperation::Unsubscribe, removed))
            }
            ConnectionCommand::Connect { ready } => {
                self.wants_connection = true;
                if open {
                    let _ = ready.send(Ok(()));
                } else {
                    self.ready_waiters.push(ready);
                }
                None
            }
            ConnectionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
                None
            }
        }
    }

    fn snapshot(&self) -> TopicSnapshot {
        TopicSnapshot {
            desired: self.registry.desired().to_vec(),
            confirmed: self.registry.confirmed(),
        }
    }

    fn resolve_waiters(&mut self, result: impl Fn() -> Result<()>) {
        for waiter in self.ready_waiters.drain(..) {
            let _ = waiter.send(result());
        }
    }
}

/// Single writer for one key's registry, socket and state.
pub(crate) struct ConnectionWorker {
    key: ConnectionKey,
    config: Arc<WsClientConfig>,
    authenticator: WsAuthenticator,
    transport: Arc<dyn WsTransport>,
    topics: KeyTopics,
    cmd_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: mpsc::UnboundedSender<WsClientEvent>,
    shutdown: CancellationToken,
}

impl ConnectionWorker {
    pub(crate) fn new(
        key: ConnectionKey,
        config: Arc<WsClientConfig>,
        transport: Arc<dyn WsTransport>,
        cmd_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        state_tx: watch::Sender<ConnectionState>,
        event_tx: mpsc::UnboundedSender<WsClientEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        let authenticator = WsAuthenticator::new(
            config.credentials.clone(),
            config.recv_window_ms,
            config.sign_message.clone(),
        );

        Self {
            key,
            config,
            authenticator,
            transport,
            topics: KeyTopics::default(),
            cmd_rx,
            state_tx,
            event_tx,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        let mut attempt: u32 = 0;

        'run: loop {
            if shutdown.is_cancelled() {
                break 'run;
            }

            if !self.topics.wants_connection {
                self.set_state(ConnectionState::Disconnected);
                tokio::select! {
                    _ = shutdown.cancelled() => break 'run,
                    cmd = self.cmd_rx.recv() => {
                        match cmd {
                            Some(cmd) => {
                                self.topics.apply(self.key, cmd, false);
                            }
                            None => break 'run,
                        }
                    }
                }
                continue;
            }

            self.set_state(ConnectionState::Connecting);
            let established = {
                let connect = establish(
                    self.key,
                    &self.config,
                    &self.authenticator,
                    self.transport.as_ref(),
                    &self.state_tx,
                );
                tokio::pin!(connect);

                // keep serving the caller while the socket and auth are pending
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break 'run,
                        established = &mut connect => break established,
                        cmd = self.cmd_rx.recv() => {
                            match cmd {
                                Some(cmd) => {
                                    self.topics.apply(self.key, cmd, false);
                                }
                                None => break 'run,
                            }
                        }
                    }
                }
            };

            match established {
                Ok((mut conn, early_frames)) => {
                    attempt = 0;
                    for raw in &early_frames {
                        self.dispatch_frame(raw);
                    }
                    let exit = match self.on_open(&conn).await {
                        Ok(()) => self.stream_loop(&mut conn).await,
                        Err(err) => StreamExit::Disconnected(err.to_string()),
                    };
                    match exit {
                        StreamExit::Shutdown => {
                            conn.close();
                            break 'run;
                        }
                        StreamExit::Disconnected(reason) => {
                            warn!(key = %self.key, %reason, "WebSocket disconnected");
                            conn.close();
                        }
                    }
                }
                Err(BitmartError::MissingCredentials) => {
                    error!(key = %self.key, "Cannot authenticate private connection: missing api key, secret or memo");
                    self.topics
                        .resolve_waiters(|| Err(BitmartError::MissingCredentials));
                }
                Err(err) => {
                    warn!(key = %self.key, error = %err, "WebSocket connect failed");
                }
            }

            attempt = attempt.saturating_add(1);
            self.topics.registry.reset_confirmed();
            self.set_state(ConnectionState::ReconnectPending { attempt });

            let backoff = self.backoff_duration(attempt);
            info!(key = %self.key, attempt, ?backoff, "Reconnecting after backoff");
            let sleep = tokio::time::sleep(backoff);
            tokio::pin!(sleep);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break 'run,
                    _ = &mut sleep => break,
                    cmd = self.cmd_rx.recv() => {
                        match cmd {
                            Some(cmd) => {
                                self.topics.apply(self.key, cmd, false);
                            }
                            None => break 'run,
                        }
                    }
                }
            }
        }

        self.finish();
    }

    /// Enter `Open`: honour queued commands, then resend every desired topic.
    async fn on_open(&mut self, conn: &WsConnection) -> Result<()> {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            self.topics.apply(self.key, cmd, false);
        }

        self.set_state(ConnectionState::Open);
        self.topics.resolve_waiters(|| Ok(()));

        let topics = self.topics.registry.resubscribe_snapshot();
        info!(key = %self.key, topic_count = topics.len(), "WebSocket open, resubscribing");
        self.send_requests(conn, WsOperation::Subscribe, &topics).await
    }

    async fn stream_loop(&mut self, conn: &mut WsConnection) -> StreamExit {
        let shutdown = self.shutdown.clone();
        let market = self.key.market();
        let interval = self.config.heartbeat_interval();
        let pong_timeout = self.config.pong_timeout();

        let mut heartbeat = tokio::time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pong_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(key = %self.key, "Shutdown requested");
                    return StreamExit::Shutdown;
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if let Err(err) = self.apply_command(cmd, &*conn).await {
                                return StreamExit::Disconnected(err.to_string());
                            }
                        }
                        None => return StreamExit::Shutdown,
                    }
                }
                frame = conn.recv() => {
                    match frame {
                        Some(raw) if is_pong(&raw) => {
                            trace!(key = %self.key, "pong");
                            pong_deadline = None;
                        }
                        Some(raw) => self.dispatch_frame(&raw),
                        None => return StreamExit::Disconnected("socket closed".to_string()),
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(err) = conn.send(ping_frame(market)).await {
                        return StreamExit::Disconnected(err.to_string());
                    }
                    if pong_deadline.is_none() {
                        pong_deadline = Some(Instant::now() + pong_timeout);
                    }
                }
                _ = wait_for_deadline(pong_deadline) => {
                    return StreamExit::Disconnected("pong timeout".to_string());
                }
            }
        }
    }

    /// Apply a caller command on an open socket, flushing requests immediately.
    async fn apply_command(&mut self, cmd: ConnectionCommand, conn: &WsConnection) -> Result<()> {
        if let Some((operation, topics)) = self.topics.apply(self.key, cmd, true) {
            self.send_requests(conn, operation, &topics).await?;
        }
        Ok(())
    }

    async fn send_requests(
        &self,
        conn: &WsConnection,
        operation: WsOperation,
        topics: &[String],
    ) -> Result<()> {
        let frames = build_requests(
            self.key.market(),
            operation,
            topics,
            self.config.max_topics_for(self.key),
        )?;
        for frame in frames {
            conn.send(frame).await?;
        }
        if !topics.is_empty() {
            info!(
                key = %self.key,
                action = operation.as_str(),
                topic_count = topics.len(),
                "ws subscription sent"
            );
        }
        Ok(())
    }

    fn dispatch_frame(&mut self, raw: &str) {
        let event = resolve_event(raw);
        if let WsEvent::Response(value) | WsEvent::Update(value) = &event
            && let Some(ack) = subscription_ack(value)
        {
            let topics = ack.topics.iter().map(String::as_str);
            match ack.operation {
                WsOperation::Subscribe => {
                    self.topics.registry.mark_confirmed(topics);
                }
                WsOperation::Unsubscribe => self.topics.registry.mark_unconfirmed(topics),
            }
        }

        let _ = self.event_tx.send(WsClientEvent {
            key: self.key,
            event,
        });
    }

    fn backoff_duration(&self, attempt: u32) -> Duration {
        backoff_duration(
            attempt,
            self.config.reconnect_base_delay_ms,
            self.config.reconnect_max_delay_ms,
        )
    }

    fn set_state(&self, state: ConnectionState) {
        set_state(self.key, &self.state_tx, state);
    }

    fn finish(&mut self) {
        self.set_state(ConnectionState::Closed);
        self.topics.resolve_waiters(|| Err(BitmartError::Shutdown));
        info!(key = %self.key, "Connection worker stopped");
    }
}

fn set_state(key: ConnectionKey, state_tx: &watch::Sender<ConnectionState>, state: ConnectionState) {
    let previous = state_tx.send_replace(state);
    if previous != state {
        debug!(%key, ?previous, ?state, "Connection state changed");
    }
}

/// Connect and, for private keys with credentials, authenticate.
///
/// Frames that arrive before the auth ack are returned for dispatch.
async fn establish(
    key: ConnectionKey,
    config: &WsClientConfig,
    authenticator: &WsAuthenticator,
    transport: &dyn WsTransport,
    state_tx: &watch::Sender<ConnectionState>,
) -> Result<(WsConnection, Vec<String>)> {
    let url = config.url_for(key)?;
    let needs_auth = key.is_private() && authenticator.has_credentials();
    if needs_auth {
        // incomplete credentials fail here, before any socket is opened
        authenticator.sign(Utc::now().timestamp_millis())?;
    }

    let mut conn = tokio::time::timeout(config.connect_timeout(), transport.connect(key, &url))
        .await
        .map_err(|_| BitmartError::Timeout {
            duration_ms: config.connect_timeout_ms,
        })??;
    if !needs_auth {
        return Ok((conn, Vec::new()));
    }

    set_state(key, state_tx, ConnectionState::Authenticating);
    let early_frames = await_auth_ack(key, config, authenticator, &mut conn).await?;
    info!(%key, "WebSocket authenticated");
    Ok((conn, early_frames))
}

async fn await_auth_ack(
    key: ConnectionKey,
    config: &WsClientConfig,
    authenticator: &WsAuthenticator,
    conn: &mut WsConnection,
) -> Result<Vec<String>> {
    let frame = authenticator.auth_frame(key.market(), Utc::now().timestamp_millis())?;
    conn.send(frame).await?;

    let deadline = tokio::time::sleep(config.auth_timeout());
    tokio::pin!(deadline);
    let mut early_frames = Vec::new();

    loop {
        tokio::select! {
            _ = &mut deadline => {
                return Err(BitmartError::Timeout {
                    duration_ms: config.auth_timeout_ms,
                });
            }
            frame = conn.recv() => {
                let Some(raw) = frame else {
                    return Err(BitmartError::transport("socket closed before auth ack"));
                };
                if is_pong(&raw) {
                    continue;
                }
                let ack = serde_json::from_str::<serde_json::Value>(&raw)
                    .ok()
                    .and_then(|value| auth_ack(&value));
                match ack {
                    Some(AuthAck::Accepted) => return Ok(early_frames),
                    Some(AuthAck::Rejected(message)) => {
                        return Err(BitmartError::Authentication { message });
                    }
                    None => early_frames.push(raw),
                }
            }
        }
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Exponential backoff starting at `base_ms`, capped at `max_ms`.
pub(crate) fn backoff_duration(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exp = attempt.saturating_sub(1).min(32);
    let delay = base_ms.saturating_mul(1u64 << exp);
    Duration::from_millis(delay.min(max_ms))
}
