/// Real-time transport: one WebSocket connection per chat session
use crate::config::Config;
use crate::error::{Result, VibeError};
use crate::transport::protocol::{
    encode_event, ClientEvent, EventKind, Packet, ServerEvent, CONNECT_FRAME, PONG_FRAME,
};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Identifies a registered handler for [`TransportClient::off`]
pub type HandlerId = u64;

type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Connection state of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected (initial failure, server close, or local disconnect)
    Disconnected,
    /// WebSocket being established
    Connecting,
    /// Engine.IO open received, namespace connect pending
    Handshaking,
    /// Namespace connected, outbound events flow
    Connected,
    /// Server acknowledged `setup`
    Ready,
}

/// State shared between the client handle and its IO task
struct Shared {
    state: RwLock<ConnectionState>,
    handlers: RwLock<HashMap<EventKind, Vec<(HandlerId, Handler)>>>,
    next_handler: AtomicU64,
}

impl Shared {
    fn new(state: ConnectionState) -> Self {
        Self {
            state: RwLock::new(state),
            handlers: RwLock::new(HashMap::new()),
            next_handler: AtomicU64::new(1),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *current != state {
            debug!("Transport state {:?} -> {:?}", *current, state);
            *current = state;
        }
    }

    /// Run every handler registered for the event's kind, in registration order
    fn dispatch(&self, event: &ServerEvent) {
        if *event == ServerEvent::Connected {
            self.set_state(ConnectionState::Ready);
        }

        // Clone out of the lock so handlers may call on/off
        let handlers: Vec<Handler> = {
            let map = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            map.get(&event.kind())
                .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };

        for handler in handlers {
            handler(event);
        }
    }
}

/// Handle to the real-time channel
///
/// Outbound events are queued and flushed once the namespace is connected,
/// so callers may emit right after [`TransportClient::connect`] returns.
pub struct TransportClient {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    close: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TransportClient {
    /// Open the WebSocket, retrying with jittered backoff
    pub async fn connect(config: &Config) -> Result<Self> {
        let url = config.socket_url.as_str();
        let max_attempts = config.max_connection_attempts.max(1);
        let shared = Arc::new(Shared::new(ConnectionState::Connecting));

        let mut attempt = 0;
        let ws = loop {
            attempt += 1;
            let failure = match timeout(config.connection_timeout, connect_async(url)).await {
                Ok(Ok((ws, _response))) => break ws,
                Ok(Err(e)) => e.to_string(),
                Err(_) => "connection attempt timed out".to_string(),
            };

            warn!(
                "Connection attempt {}/{} to {} failed: {}",
                attempt, max_attempts, url, failure
            );
            if attempt >= max_attempts {
                shared.set_state(ConnectionState::Disconnected);
                return Err(VibeError::Connection(format!(
                    "Failed to connect to {} after {} attempts: {}",
                    url, attempt, failure
                )));
            }

            let base = config.retry_interval.as_millis() as u64;
            let jitter = rand::thread_rng().gen_range(0..=base / 2);
            sleep(Duration::from_millis(base + jitter)).await;
        };

        info!("Transport connected to {}", url);

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let close = Arc::new(Notify::new());
        let task = tokio::spawn(run_io(ws, shared.clone(), outbound_rx, close.clone()));

        Ok(Self {
            shared,
            outbound,
            close,
            task: Mutex::new(Some(task)),
        })
    }

    /// In-memory transport with no server behind it.
    ///
    /// The returned peer plays the server: it sees every emitted event and
    /// can deliver inbound ones after the client has been handed off.
    pub fn loopback() -> (Self, LoopbackPeer) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(ConnectionState::Connected));
        let client = Self {
            shared: shared.clone(),
            outbound,
            close: Arc::new(Notify::new()),
            task: Mutex::new(None),
        };
        let peer = LoopbackPeer {
            shared,
            outbound: outbound_rx,
        };
        (client, peer)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// True once the server acknowledged `setup`
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Queue an event for the server
    pub fn emit(&self, event: ClientEvent) -> Result<()> {
        if self.state() == ConnectionState::Disconnected {
            return Err(VibeError::NotConnected);
        }
        debug!("emit {}", event);
        self.outbound
            .send(event)
            .map_err(|_| VibeError::NotConnected)
    }

    /// Register a handler for one kind of inbound event
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let id = self.shared.next_handler.fetch_add(1, Ordering::Relaxed);
        let mut map = self.shared.handlers.write().unwrap_or_else(|e| e.into_inner());
        map.entry(kind).or_default().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler; returns whether it was registered
    pub fn off(&self, id: HandlerId) -> bool {
        let mut map = self.shared.handlers.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = false;
        for list in map.values_mut() {
            let before = list.len();
            list.retain(|(hid, _)| *hid != id);
            removed |= list.len() != before;
        }
        removed
    }

    /// Feed an inbound event through the dispatch path
    pub fn deliver(&self, event: ServerEvent) {
        self.shared.dispatch(&event);
    }

    /// Close the connection; the server drops our presence registration.
    ///
    /// Events emitted before this call are still written before the close
    /// frame.
    pub fn disconnect(&self) {
        if self.state() == ConnectionState::Disconnected {
            return;
        }
        info!("Transport disconnecting");
        self.close.notify_one();
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Wait for the IO task to finish (after `disconnect` or a server close)
    pub async fn closed(&self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        // After `disconnect` the IO task is flushing and exits on its own
        if self.state() == ConnectionState::Disconnected {
            return;
        }
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}

/// Server side of a [`TransportClient::loopback`] pair
pub struct LoopbackPeer {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedReceiver<ClientEvent>,
}

impl LoopbackPeer {
    /// Push an inbound event through the client's handlers
    pub fn deliver(&self, event: ServerEvent) {
        self.shared.dispatch(&event);
    }

    pub fn try_recv(&mut self) -> std::result::Result<ClientEvent, mpsc::error::TryRecvError> {
        self.outbound.try_recv()
    }

    /// Next emitted event; `None` once the client is gone
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.outbound.recv().await
    }

    /// Everything emitted so far
    pub fn drain(&mut self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.outbound.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }
}

/// Pump frames in both directions until either side closes
async fn run_io(
    ws: WsStream,
    shared: Arc<Shared>,
    mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    close: Arc<Notify>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut namespace_open = false;

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match Packet::decode(&text) {
                    Ok(Packet::Open(_)) => {
                        shared.set_state(ConnectionState::Handshaking);
                        if sink.send(WsMessage::Text(CONNECT_FRAME.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Ok(Packet::Ping) => {
                        if sink.send(WsMessage::Text(PONG_FRAME.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Ok(Packet::Pong) => {}
                    Ok(Packet::Connect) => {
                        namespace_open = true;
                        shared.set_state(ConnectionState::Connected);
                    }
                    Ok(Packet::ConnectError(reason)) => {
                        error!("Server refused namespace: {}", reason);
                        break;
                    }
                    Ok(Packet::Disconnect) | Ok(Packet::Close) => {
                        info!("Server closed the session");
                        break;
                    }
                    Ok(Packet::Event(event)) => shared.dispatch(&event),
                    Err(e) => warn!("Dropping malformed frame: {}", e),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Transport closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Transport read error: {}", e);
                    break;
                }
            },
            event = outbound.recv(), if namespace_open => match event {
                Some(event) => match encode_event(&event) {
                    Ok(frame) => {
                        if let Err(e) = sink.send(WsMessage::Text(frame)).await {
                            warn!("Transport write error: {}", e);
                            break;
                        }
                    }
                    Err(e) => error!("Failed to encode {}: {}", event, e),
                },
                None => break,
            },
            _ = close.notified() => {
                // Flush what was emitted before the disconnect
                if namespace_open {
                    while let Ok(event) = outbound.try_recv() {
                        match encode_event(&event) {
                            Ok(frame) => {
                                if sink.send(WsMessage::Text(frame)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => error!("Failed to encode {}: {}", event, e),
                        }
                    }
                }
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }

    shared.set_state(ConnectionState::Disconnected);
}
