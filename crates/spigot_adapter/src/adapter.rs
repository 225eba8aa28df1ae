//! The Spigot adapter: accept loop, per-peer sessions and event dispatch.
//!
//! Each accepted socket goes through the upgrade handshake, is registered
//! under the identity from its identity header and then runs a receive loop
//! that decodes frames and hands events to the host runtime. Dispatches run
//! on their own tasks so a slow handler never stalls the socket.
//!
//! # Session lifecycle
//!
//! * **Handshake**: wrong path is refused with 404, a missing identity or a
//!   duplicate is closed with 1008, a full registry with 1013
//! * **Open**: registered, `bot_connect` fired, writer task draining the
//!   outbound queue
//! * **Closing**: the writer sends a close frame, the entry is removed and
//!   `bot_disconnect` fires exactly once

use crate::bot::{Bot, HostRuntime};
use crate::collator::Collator;
use crate::config::AdapterConfig;
use crate::connection::handshake::inspect_request;
use crate::connection::{ConnectionRegistry, PeerHandle};
use crate::decoder::EventDecoder;
use crate::error::AdapterError;
use crate::schema::SchemaRegistry;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

/// Name under which the adapter registers with the bot framework.
pub const ADAPTER_NAME: &str = "Spigot";

type WsSink<S> = SplitSink<WebSocketStream<S>, Message>;
type WsReceiver<S> = SplitStream<WebSocketStream<S>>;

/// WebSocket server bridging Spigot plugins to a [`HostRuntime`].
pub struct SpigotAdapter {
    config: AdapterConfig,
    runtime: Arc<dyn HostRuntime>,
    decoder: Arc<EventDecoder>,
    connections: ConnectionRegistry,

    /// Connection handlers spawned by the accept loop
    sessions: TaskTracker,

    /// Event dispatches handed to the host runtime
    dispatches: TaskTracker,

    cancellation: CancellationToken,
}

impl SpigotAdapter {
    /// Creates an adapter with the default event models.
    pub fn new(config: AdapterConfig, runtime: Arc<dyn HostRuntime>) -> Self {
        Self::with_schema(config, SchemaRegistry::with_defaults(), runtime)
    }

    /// Creates an adapter whose collator indexes `schema`.
    pub fn with_schema(
        config: AdapterConfig,
        schema: SchemaRegistry,
        runtime: Arc<dyn HostRuntime>,
    ) -> Self {
        let collator = Collator::new(ADAPTER_NAME, &schema, &config.discriminator_fields);
        let decoder = EventDecoder::new(Arc::new(collator));

        Self {
            config,
            runtime,
            decoder: Arc::new(decoder),
            connections: ConnectionRegistry::new(),
            sessions: TaskTracker::new(),
            dispatches: TaskTracker::new(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn get_name() -> &'static str {
        ADAPTER_NAME
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Registry of the currently open sessions.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn decoder(&self) -> &EventDecoder {
        &self.decoder
    }

    /// Binds the configured address.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(&self) -> Result<TcpListener, AdapterError> {
        let addr = self.config.bind_address;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| AdapterError::Network(format!("Socket creation failed: {e}")))?;
        socket.set_reuse_address(true).ok();

        socket
            .bind(&addr.into())
            .map_err(|e| AdapterError::Network(format!("Bind failed: {e}")))?;
        socket
            .listen(1024)
            .map_err(|e| AdapterError::Network(format!("Listen failed: {e}")))?;

        let std_listener: StdTcpListener = socket.into();
        std_listener
            .set_nonblocking(true)
            .map_err(|e| AdapterError::Network(format!("Failed to set non-blocking: {e}")))?;

        TcpListener::from_std(std_listener)
            .map_err(|e| AdapterError::Network(format!("Tokio listener creation failed: {e}")))
    }

    /// Binds and spawns [`run`](Self::run), returning the bound address.
    pub fn start(
        self: &Arc<Self>,
    ) -> Result<(SocketAddr, JoinHandle<Result<(), AdapterError>>), AdapterError> {
        let listener = self.bind()?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AdapterError::Network(format!("Failed to read local address: {e}")))?;
        let server = tokio::spawn(self.clone().run(listener));
        Ok((local_addr, server))
    }

    /// Accepts peers on `listener` until [`shutdown`](Self::shutdown) is called.
    ///
    /// On return every session has been closed and, when configured, every
    /// in-flight dispatch has finished or the grace period has run out.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> Result<(), AdapterError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| AdapterError::Network(format!("Failed to read local address: {e}")))?;
        info!(
            "🌐 Spigot adapter listening on ws://{}{}",
            local_addr, self.config.ws_path
        );

        loop {
            tokio::select! {
                _ = self.cancellation.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("Accepted TCP connection from {}", addr);
                        let adapter = self.clone();
                        self.sessions.spawn(adapter.handle_connection(stream, addr));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }

        drop(listener);
        self.drain().await;
        Ok(())
    }

    /// Signals the accept loop and every open session to stop.
    pub fn shutdown(&self) {
        info!("🛑 Shutting down Spigot adapter...");
        self.cancellation.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Outbound API calls are not supported; the call is accepted and dropped.
    pub async fn call_api(&self, bot: &Bot, api: &str, data: Map<String, Value>) {
        trace!(
            bot = %bot.self_name(),
            "Ignoring API call {} with {} field(s)",
            api,
            data.len()
        );
    }

    async fn drain(&self) {
        self.sessions.close();
        self.dispatches.close();
        let grace = self.config.shutdown_grace();

        if timeout(grace, self.sessions.wait()).await.is_err() {
            warn!(
                "{} session(s) still running after {:?}",
                self.sessions.len(),
                grace
            );
        }

        if self.config.drain_dispatch_on_shutdown
            && timeout(grace, self.dispatches.wait()).await.is_err()
        {
            warn!(
                "{} event dispatch(es) still running after {:?}",
                self.dispatches.len(),
                grace
            );
        }

        info!("✅ Spigot adapter stopped");
    }

    /// Runs one peer connection from handshake to cleanup.
    ///
    /// Generic over the transport so it can be driven by in-memory streams.
    pub async fn handle_connection<S>(self: Arc<Self>, stream: S, addr: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut identity = None;
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            identity = inspect_request(request, &self.config)?;
            Ok(response)
        };

        let ws = match accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake failed for {}: {}", addr, e);
                return;
            }
        };

        let Some(self_name) = identity else {
            self.reject(ws, addr, AdapterError::MissingIdentity).await;
            return;
        };

        if self.connections.contains(&self_name) {
            self.reject(ws, addr, AdapterError::DuplicateIdentity(self_name))
                .await;
            return;
        }

        if self.connections.len() >= self.config.max_connections {
            self.reject(ws, addr, AdapterError::ConnectionLimit(self.config.max_connections))
                .await;
            return;
        }

        let (outbound, queue) = mpsc::unbounded_channel();
        let handle = Arc::new(PeerHandle::new(self_name.clone(), addr, outbound));

        // Two peers can pass the check above together; only one registers.
        if let Err(e) = self.connections.register(handle.clone()) {
            self.reject(ws, addr, e).await;
            return;
        }

        let bot = Arc::new(Bot::new(self_name.clone(), self.runtime.clone()));
        let guard = SessionGuard {
            connections: self.connections.clone(),
            handle: handle.clone(),
            bot: bot.clone(),
            runtime: self.runtime.clone(),
        };

        info!(bot = %self_name, "Bot connected from {}", addr);
        self.runtime.bot_connect(bot.clone());

        let (sink, receiver) = ws.split();
        let mut writer = tokio::spawn(write_loop(sink, queue));

        match self.receive_loop(receiver, &bot).await {
            Some(AdapterError::PeerClosed(_)) => {
                warn!(bot = %self_name, "WebSocket connection closed by peer");
            }
            Some(e) => error!(bot = %self_name, "{}", e),
            None => debug!(bot = %self_name, "Closing session for shutdown"),
        }

        handle.close();
        if timeout(self.config.close_timeout(), &mut writer).await.is_err() {
            debug!(bot = %self_name, "Close handshake timed out");
            writer.abort();
        }

        drop(guard);
    }

    /// Reads frames until the session ends.
    ///
    /// Returns the terminal error, or `None` when stopped by shutdown.
    async fn receive_loop<S>(
        &self,
        mut receiver: WsReceiver<S>,
        bot: &Arc<Bot>,
    ) -> Option<AdapterError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer = || bot.self_name().to_string();

        loop {
            let frame = tokio::select! {
                _ = self.cancellation.cancelled() => return None,
                frame = receiver.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => self.dispatch(bot, text.as_str()),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => self.dispatch(bot, text),
                    Err(e) => error!(
                        bot = %bot.self_name(),
                        "{}",
                        AdapterError::FrameDecode {
                            peer: peer(),
                            reason: format!("binary frame is not UTF-8: {e}"),
                        }
                    ),
                },
                Some(Ok(Message::Close(_))) | None => return Some(AdapterError::PeerClosed(peer())),
                // Ping and pong are answered by the transport.
                Some(Ok(_)) => {}
                Some(Err(
                    WsError::ConnectionClosed
                    | WsError::AlreadyClosed
                    | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake),
                )) => return Some(AdapterError::PeerClosed(peer())),
                Some(Err(source)) => {
                    return Some(AdapterError::UnexpectedTransport {
                        peer: peer(),
                        source,
                    })
                }
            }
        }
    }

    /// Decodes one frame and spawns its dispatch.
    fn dispatch(&self, bot: &Arc<Bot>, text: &str) {
        match self.decoder.decode_text(text, bot.self_name()) {
            Ok(Some(event)) => {
                let bot = bot.clone();
                self.dispatches.spawn(async move {
                    bot.handle_event(event).await;
                });
            }
            Ok(None) => {}
            Err(e) => error!(bot = %bot.self_name(), "{}", e),
        }
    }

    /// Closes a freshly upgraded socket with the close code for `reason`.
    async fn reject<S>(&self, mut ws: WebSocketStream<S>, addr: SocketAddr, reason: AdapterError)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        warn!("Rejecting connection from {}: {}", addr, reason);

        let text = match &reason {
            AdapterError::MissingIdentity => {
                format!("Missing {} Header", self.config.identity_header)
            }
            AdapterError::DuplicateIdentity(_) => {
                format!("Duplicate {}", self.config.identity_header)
            }
            AdapterError::ConnectionLimit(_) => "Too many connections".to_string(),
            other => other.to_string(),
        };
        let frame = CloseFrame {
            code: reason
                .close_code()
                .map(CloseCode::from)
                .unwrap_or(CloseCode::Policy),
            reason: text.into(),
        };

        if let Err(e) = ws.close(Some(frame)).await {
            debug!("Failed to send close frame to {}: {}", addr, e);
            return;
        }

        // Wait for the peer's close reply so the reason is delivered.
        let _ = timeout(self.config.close_timeout(), async {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;
    }
}

/// Forwards queued frames to the socket, stopping after a close frame.
async fn write_loop<S>(mut sink: WsSink<S>, mut queue: mpsc::UnboundedReceiver<Message>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(message) = queue.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            debug!("WebSocket send failed: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
}

/// Removes a session's registry entry and reports the disconnect on drop.
struct SessionGuard {
    connections: ConnectionRegistry,
    handle: Arc<PeerHandle>,
    bot: Arc<Bot>,
    runtime: Arc<dyn HostRuntime>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.connections
            .unregister_connection(self.handle.self_name(), self.handle.connection_id());
        info!(bot = %self.bot.self_name(), "Bot disconnected");
        self.runtime.bot_disconnect(self.bot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventModel, PlayerJoinEvent};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::client_async;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::HeaderValue;

    #[derive(Debug, PartialEq)]
    enum Record {
        Connect(String),
        Disconnect(String),
        Event(String, &'static str),
    }

    struct RecordingRuntime {
        records: mpsc::UnboundedSender<Record>,
    }

    #[async_trait]
    impl HostRuntime for RecordingRuntime {
        fn bot_connect(&self, bot: Arc<Bot>) {
            let _ = self.records.send(Record::Connect(bot.self_name().to_string()));
        }

        fn bot_disconnect(&self, bot: Arc<Bot>) {
            let _ = self.records.send(Record::Disconnect(bot.self_name().to_string()));
        }

        async fn handle_event(&self, bot: Arc<Bot>, event: Arc<dyn Event>) {
            let _ = self
                .records
                .send(Record::Event(bot.self_name().to_string(), event.model_name()));
        }
    }

    fn adapter(config: AdapterConfig) -> (Arc<SpigotAdapter>, mpsc::UnboundedReceiver<Record>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(RecordingRuntime { records: tx });
        (Arc::new(SpigotAdapter::new(config, runtime)), rx)
    }

    async fn connect(
        adapter: &Arc<SpigotAdapter>,
        identity: Option<&'static str>,
    ) -> (WebSocketStream<DuplexStream>, JoinHandle<()>) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let addr = "127.0.0.1:40000".parse().unwrap();
        let server = tokio::spawn(adapter.clone().handle_connection(server_io, addr));

        let mut request = "ws://localhost/spigot/ws".into_client_request().unwrap();
        if let Some(identity) = identity {
            request
                .headers_mut()
                .insert("X-Self-Name", HeaderValue::from_static(identity));
        }
        let (ws, _) = client_async(request, client_io).await.unwrap();
        (ws, server)
    }

    async fn next_close(ws: &mut WebSocketStream<DuplexStream>) -> CloseFrame {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for close frame");
        match frame {
            Some(Ok(Message::Close(Some(frame)))) => frame,
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    async fn next_record(records: &mut mpsc::UnboundedReceiver<Record>) -> Record {
        timeout(Duration::from_secs(5), records.recv())
            .await
            .expect("timed out waiting for runtime callback")
            .expect("runtime dropped")
    }

    #[test]
    fn test_adapter_name() {
        assert_eq!(SpigotAdapter::get_name(), "Spigot");
    }

    #[tokio::test]
    async fn test_missing_identity_is_closed_with_policy_violation() {
        let (adapter, mut records) = adapter(AdapterConfig::default());
        let (mut ws, server) = connect(&adapter, None).await;

        let frame = next_close(&mut ws).await;
        assert_eq!(frame.code, CloseCode::Policy);
        assert_eq!(frame.reason.as_str(), "Missing X-Self-Name Header");

        drop(ws);
        timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
        assert!(adapter.connections().is_empty());
        assert!(records.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_session_dispatches_events_and_disconnects_once() {
        let (adapter, mut records) = adapter(AdapterConfig::default());
        let (mut ws, server) = connect(&adapter, Some(r"\u4e2d")).await;

        assert_eq!(next_record(&mut records).await, Record::Connect("中".to_string()));
        assert!(adapter.connections().contains("中"));

        let payload = json!({
            "post_type": "notice",
            "event_name": "PlayerJoinEvent",
            "player": { "nickname": "Steve" }
        });
        ws.send(Message::Text(payload.to_string().into())).await.unwrap();

        assert_eq!(
            next_record(&mut records).await,
            Record::Event("中".to_string(), PlayerJoinEvent::MODEL_NAME)
        );

        ws.close(None).await.unwrap();
        timeout(Duration::from_secs(5), server).await.unwrap().unwrap();

        assert_eq!(
            next_record(&mut records).await,
            Record::Disconnect("中".to_string())
        );
        assert!(records.try_recv().is_err());
        assert!(adapter.connections().is_empty());
    }

    #[tokio::test]
    async fn test_connection_limit_closes_with_try_again_later() {
        let config = AdapterConfig {
            max_connections: 1,
            ..Default::default()
        };
        let (adapter, mut records) = adapter(config);
        let (_first, _first_server) = connect(&adapter, Some("Bot1")).await;
        assert_eq!(next_record(&mut records).await, Record::Connect("Bot1".to_string()));

        let (mut second, _) = connect(&adapter, Some("Bot2")).await;
        let frame = next_close(&mut second).await;
        assert_eq!(frame.code, CloseCode::Again);
        assert_eq!(frame.reason.as_str(), "Too many connections");
        assert_eq!(adapter.connections().identities(), vec!["Bot1".to_string()]);
    }

    #[tokio::test]
    async fn test_shutdown_closes_open_sessions() {
        let (adapter, mut records) = adapter(AdapterConfig::default());
        let (mut ws, server) = connect(&adapter, Some("Bot1")).await;
        assert_eq!(next_record(&mut records).await, Record::Connect("Bot1".to_string()));

        adapter.shutdown();
        assert!(adapter.is_shutting_down());

        match timeout(Duration::from_secs(5), ws.next()).await.unwrap() {
            Some(Ok(Message::Close(_))) => {}
            other => panic!("expected close frame, got {other:?}"),
        }
        drop(ws);

        timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
        assert_eq!(
            next_record(&mut records).await,
            Record::Disconnect("Bot1".to_string())
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicates_register_once() {
        for _ in 0..10 {
            let (adapter, mut records) = adapter(AdapterConfig::default());
            let ((first, first_server), (second, second_server)) = tokio::join!(
                connect(&adapter, Some("Bot1")),
                connect(&adapter, Some("Bot1"))
            );

            let mut clients = [first, second];
            let mut rejected = 0;
            for ws in clients.iter_mut() {
                match timeout(Duration::from_millis(250), ws.next()).await {
                    Ok(Some(Ok(Message::Close(Some(frame))))) => {
                        assert_eq!(frame.code, CloseCode::Policy);
                        assert_eq!(frame.reason.as_str(), "Duplicate X-Self-Name");
                        rejected += 1;
                    }
                    Ok(other) => panic!("expected close frame or silence, got {other:?}"),
                    Err(_) => {}
                }
            }
            assert_eq!(rejected, 1);
            assert_eq!(next_record(&mut records).await, Record::Connect("Bot1".to_string()));
            assert_eq!(adapter.connections().identities(), vec!["Bot1".to_string()]);

            adapter.shutdown();
            drop(clients);
            timeout(Duration::from_secs(5), first_server).await.unwrap().unwrap();
            timeout(Duration::from_secs(5), second_server).await.unwrap().unwrap();

            assert_eq!(
                next_record(&mut records).await,
                Record::Disconnect("Bot1".to_string())
            );
            assert!(records.try_recv().is_err());
            assert!(adapter.connections().is_empty());
        }
    }

    #[tokio::test]
    async fn test_call_api_is_inert() {
        let (adapter, mut records) = adapter(AdapterConfig::default());
        let bot = Bot::new("Bot1".to_string(), adapter.runtime.clone());
        adapter.call_api(&bot, "send_message", Map::new()).await;
        assert!(records.try_recv().is_err());
    }
}
