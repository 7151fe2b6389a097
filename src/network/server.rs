//! WebSocket Gateway
//!
//! Async WebSocket server in front of the bridge. Clients authenticate with
//! a JWT, then submit emulator events, manage room membership and follow
//! room broadcasts over the same connection.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::bridge::Bridge;
use crate::core::ids::{ActorId, RoomId};
use crate::events::schema::RawEvent;
use crate::network::auth::{validate_token, AuthConfig};
use crate::network::protocol::{
    AuthResult, ClientMessage, ErrorCode, EventAccepted, ServerError, ServerMessage,
};
use crate::rooms::room::JoinOutcome;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Time allowed for the WebSocket handshake.
    pub handshake_timeout: Duration,
    /// Connections silent for longer than this are closed.
    pub idle_timeout: Duration,
    /// How often idle connections are swept.
    pub sweep_interval: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
            max_connections: 1000,
            handshake_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Handshake did not finish in time.
    #[error("WebSocket handshake timed out")]
    HandshakeTimeout,
}

/// Connected client state.
struct ConnectedClient {
    /// Actor after successful auth.
    actor_id: Option<ActorId>,
    /// Last inbound frame.
    last_activity: Instant,
    /// Broadcast forwarders, one per followed room.
    subscriptions: BTreeMap<RoomId, JoinHandle<()>>,
    /// Fired by the idle sweep to close the connection.
    close_tx: Option<oneshot::Sender<()>>,
}

impl ConnectedClient {
    fn drop_subscriptions(&mut self) {
        for (_, handle) in std::mem::take(&mut self.subscriptions) {
            handle.abort();
        }
    }
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// Everything a connection task needs.
#[derive(Clone)]
struct Context {
    bridge: Bridge,
    auth: Arc<AuthConfig>,
    version: Arc<str>,
    clients: Clients,
}

/// The WebSocket gateway.
pub struct GatewayServer {
    config: GatewayConfig,
    context: Context,
    shutdown_tx: broadcast::Sender<()>,
}

impl GatewayServer {
    /// Create a gateway over a wired bridge.
    pub fn new(config: GatewayConfig, auth: AuthConfig, bridge: Bridge) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let context = Context {
            bridge,
            auth: Arc::new(auth),
            version: Arc::from(config.version.as_str()),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
        };

        Self {
            config,
            context,
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self), fields(addr = %self.config.bind_addr))]
    pub async fn run(&self) -> Result<(), GatewayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        info!("Gateway listening on {}", listener.local_addr()?);

        let sweep_handle = tokio::spawn(Self::run_cleanup_loop(
            self.context.clients.clone(),
            self.config.sweep_interval,
            self.config.idle_timeout,
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.context.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        sweep_handle.abort();
        Ok(())
    }

    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let context = self.context.clone();
        let handshake_timeout = self.config.handshake_timeout;
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            if let Err(e) = Self::serve_connection(stream, addr, context, handshake_timeout, shutdown_rx).await {
                warn!("Connection {} ended with error: {}", addr, e);
            }
        });
    }

    async fn serve_connection(
        stream: TcpStream,
        addr: SocketAddr,
        context: Context,
        handshake_timeout: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), GatewayError> {
        let ws_stream = timeout(handshake_timeout, accept_async(stream))
            .await
            .map_err(|_| GatewayError::HandshakeTimeout)??;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
        let (close_tx, mut close_rx) = oneshot::channel::<()>();

        context.clients.write().await.insert(
            addr,
            ConnectedClient {
                actor_id: None,
                last_activity: Instant::now(),
                subscriptions: BTreeMap::new(),
                close_tx: Some(close_tx),
            },
        );

        let sender_task = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                let text = match msg.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let client_msg = match ClientMessage::from_json(&text) {
                                Ok(m) => m,
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", addr, e);
                                    let _ = msg_tx
                                        .send(ServerMessage::error(ErrorCode::InvalidInput, "Invalid message format"))
                                        .await;
                                    continue;
                                }
                            };

                            if let Some(client) = context.clients.write().await.get_mut(&addr) {
                                client.last_activity = Instant::now();
                            }

                            let reply = Self::handle_client_message(addr, client_msg, &context, &msg_tx).await;
                            if msg_tx.send(reply).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            let _ = msg_tx
                                .send(ServerMessage::error(ErrorCode::InvalidInput, "Binary frames are not supported"))
                                .await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", addr);
                            break;
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error for {}: {}", addr, e);
                            break;
                        }
                        // Pings are answered by tungstenite.
                        _ => {}
                    }
                }
                _ = &mut close_rx => {
                    let _ = msg_tx.send(ServerMessage::Shutdown {
                        reason: "Idle timeout".to_string(),
                    }).await;
                    break;
                }
                _ = shutdown_rx.recv() => {
                    let _ = msg_tx.send(ServerMessage::Shutdown {
                        reason: "Server shutting down".to_string(),
                    }).await;
                    break;
                }
            }
        }

        if let Some(mut client) = context.clients.write().await.remove(&addr) {
            client.drop_subscriptions();
        }

        // Let the sender task flush the final frame.
        drop(msg_tx);
        if timeout(Duration::from_secs(1), sender_task).await.is_err() {
            debug!("Sender for {} did not drain in time", addr);
        }

        debug!("Client {} cleaned up", addr);
        Ok(())
    }

    // =========================================================================
    // MESSAGE HANDLERS
    // =========================================================================

    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        context: &Context,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> ServerMessage {
        match msg {
            ClientMessage::Auth { token } => Self::handle_auth(addr, &token, context).await,
            ClientMessage::Ping { timestamp } => ServerMessage::Pong {
                timestamp,
                server_time: unix_millis(),
            },
            other => {
                let actor = context.clients.read().await.get(&addr).and_then(|c| c.actor_id);
                match actor {
                    Some(actor) => Self::handle_actor_message(addr, actor, other, context, sender).await,
                    None => ServerMessage::error(ErrorCode::NotAuthenticated, "Must authenticate first"),
                }
            }
        }
    }

    async fn handle_actor_message(
        addr: SocketAddr,
        actor: ActorId,
        msg: ClientMessage,
        context: &Context,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> ServerMessage {
        match msg {
            ClientMessage::SubmitEvent { emulator, event } => {
                Self::handle_submit(actor, emulator.as_deref(), event, context).await
            }
            ClientMessage::CreateRoom { name, max_players } => {
                match context.bridge.rooms().create_room(&name, max_players, actor).await {
                    Ok(room_id) => ServerMessage::RoomCreated { room_id },
                    Err(e) => ServerMessage::Error(ServerError::from(&e)),
                }
            }
            ClientMessage::JoinRoom { room_id } => {
                let room_id = match parse_room(&room_id) {
                    Ok(id) => id,
                    Err(reply) => return reply,
                };
                Self::handle_join(actor, room_id, context).await
            }
            ClientMessage::LeaveRoom { room_id } => {
                let room_id = match parse_room(&room_id) {
                    Ok(id) => id,
                    Err(reply) => return reply,
                };
                match context.bridge.rooms().leave_room(&room_id, actor).await {
                    Ok(removed) => {
                        if let Some(client) = context.clients.write().await.get_mut(&addr) {
                            if let Some(handle) = client.subscriptions.remove(&room_id) {
                                handle.abort();
                            }
                        }
                        ServerMessage::RoomLeft { room_id, removed }
                    }
                    Err(e) => ServerMessage::Error(ServerError::from(&e)),
                }
            }
            ClientMessage::Heartbeat { room_id } => {
                let room_id = match parse_room(&room_id) {
                    Ok(id) => id,
                    Err(reply) => return reply,
                };
                match context.bridge.rooms().update_presence(&room_id, actor).await {
                    Ok(member) => ServerMessage::HeartbeatAck { room_id, member },
                    Err(e) => ServerMessage::Error(ServerError::from(&e)),
                }
            }
            ClientMessage::SubscribeRoom { room_id } => {
                let room_id = match parse_room(&room_id) {
                    Ok(id) => id,
                    Err(reply) => return reply,
                };
                Self::handle_subscribe(addr, room_id, context, sender).await
            }
            ClientMessage::Auth { .. } | ClientMessage::Ping { .. } => {
                ServerMessage::error(ErrorCode::InvalidInput, "Unexpected message")
            }
        }
    }

    async fn handle_auth(addr: SocketAddr, token: &str, context: &Context) -> ServerMessage {
        match validate_token(token, &context.auth) {
            Ok(claims) => {
                let actor = claims.actor_id();
                if let Some(client) = context.clients.write().await.get_mut(&addr) {
                    client.actor_id = Some(actor);
                }
                info!(actor = %actor, "Client {} authenticated", addr);
                ServerMessage::AuthResult(AuthResult {
                    success: true,
                    actor_id: Some(actor),
                    error: None,
                    server_version: context.version.to_string(),
                })
            }
            Err(e) => {
                debug!("Authentication failed for {}: {}", addr, e);
                ServerMessage::Error(ServerError::from(&e))
            }
        }
    }

    async fn handle_submit(
        actor: ActorId,
        emulator: Option<&str>,
        event: serde_json::Value,
        context: &Context,
    ) -> ServerMessage {
        let Some(raw) = RawEvent::from_value(event) else {
            return ServerMessage::error(ErrorCode::InvalidPayload, "event must be a JSON object");
        };

        match context.bridge.coordinator().ingest(actor, raw, emulator).await {
            Ok(receipt) => ServerMessage::EventAccepted(EventAccepted::from(&receipt)),
            Err(e) => {
                if e.is_infrastructure() {
                    error!(actor = %actor, error = %e, "Event ingestion failed");
                }
                ServerMessage::Error(ServerError::from(&e))
            }
        }
    }

    async fn handle_join(actor: ActorId, room_id: RoomId, context: &Context) -> ServerMessage {
        let rooms = context.bridge.rooms();
        let outcome = match rooms.join_room(&room_id, actor).await {
            Ok(outcome) => outcome,
            Err(e) => return ServerMessage::Error(ServerError::from(&e)),
        };

        match rooms.get_room_players(&room_id).await {
            Ok(players) => ServerMessage::RoomJoined {
                room_id,
                already_member: outcome == JoinOutcome::AlreadyMember,
                players,
            },
            Err(e) => ServerMessage::Error(ServerError::from(&e)),
        }
    }

    async fn handle_subscribe(
        addr: SocketAddr,
        room_id: RoomId,
        context: &Context,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> ServerMessage {
        match context.bridge.rooms().get_room(&room_id, true).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return ServerMessage::error(ErrorCode::RoomNotFound, format!("room {} not found", room_id));
            }
            Err(e) => return ServerMessage::Error(ServerError::from(&e)),
        }

        let mut receiver = context.bridge.broadcaster().subscribe(&room_id);
        let forward_to = sender.clone();
        let forwarded_room = room_id.clone();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => {
                        if forward_to.send(ServerMessage::RoomBroadcast(message)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(room = %forwarded_room, skipped, "Subscriber lagging, broadcasts dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        if let Some(client) = context.clients.write().await.get_mut(&addr) {
            if let Some(previous) = client.subscriptions.insert(room_id.clone(), handle) {
                previous.abort();
            }
        } else {
            handle.abort();
        }

        ServerMessage::Subscribed { room_id }
    }

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================

    async fn run_cleanup_loop(clients: Clients, every: Duration, idle_timeout: Duration) {
        let mut ticker = interval(every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let now = Instant::now();
            let mut clients = clients.write().await;
            for (addr, client) in clients.iter_mut() {
                if now.duration_since(client.last_activity) > idle_timeout {
                    if let Some(close_tx) = client.close_tx.take() {
                        info!("Closing idle client {}", addr);
                        let _ = close_tx.send(());
                    }
                }
            }
        }
    }

    /// Shutdown the gateway and every open connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Handle that triggers shutdown from another task.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Active connection count.
    pub async fn connection_count(&self) -> usize {
        self.context.clients.read().await.len()
    }
}

fn parse_room(raw: &str) -> Result<RoomId, ServerMessage> {
    RoomId::parse(raw)
        .ok_or_else(|| ServerMessage::error(ErrorCode::InvalidInput, format!("malformed room id: {}", raw)))
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
