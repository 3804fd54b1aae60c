/// Chat session controller
///
/// One task owns every piece of session state and processes user commands,
/// transport events, finished network calls and the typing timer one at a
/// time. Front-ends talk to it through a [`ChatSessionHandle`] and render
/// the [`SessionView`] it publishes.
use crate::api::ChatBackend;
use crate::config::Config;
use crate::error::{Result, VibeError};
use crate::session::presence::{PresenceState, PresenceTracker};
use crate::session::receipts::ReadReceiptSynchronizer;
use crate::session::registrar::Registrar;
use crate::session::room::RoomMembership;
use crate::session::stream::{HistoryOutcome, LoadState, LoadTicket, MessageStream};
use crate::session::typing::TypingDebouncer;
use crate::transport::{ClientEvent, EventKind, HandlerId, ServerEvent, TransportClient};
use crate::types::{Conversation, Message, User};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything a front-end needs to render the active conversation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub conversation_id: Option<String>,
    pub messages: Vec<Message>,
    pub load_state: LoadState,
    pub partner: Option<User>,
    pub presence: PresenceState,
    /// Text being composed
    pub draft: String,
    /// Server acknowledged `setup`
    pub ready: bool,
    /// Partner currently sees us typing
    pub local_typing: bool,
}

enum Command {
    Open(String),
    Input(String),
    Send(oneshot::Sender<Result<Message>>),
    Shutdown,
}

/// Network calls finishing in the background
enum Completion {
    History {
        ticket: LoadTicket,
        result: Result<Vec<Message>>,
    },
    Partner {
        conversation_id: String,
        result: Result<Conversation>,
    },
    Sent {
        content: String,
        result: Result<Message>,
        reply: oneshot::Sender<Result<Message>>,
    },
}

pub struct ChatSession {
    id: String,
    me: User,
    page_size: u32,
    transport: TransportClient,
    backend: Arc<dyn ChatBackend>,
    registrar: Registrar,
    room: RoomMembership,
    presence: PresenceTracker,
    typing: TypingDebouncer,
    stream: MessageStream,
    receipts: ReadReceiptSynchronizer,
    draft: String,
    completions: mpsc::UnboundedSender<Completion>,
    view: watch::Sender<SessionView>,
}

impl ChatSession {
    /// Start a session on an already opened transport.
    ///
    /// The session owns the transport from here on and disconnects it on
    /// shutdown.
    pub fn spawn(
        config: &Config,
        me: User,
        transport: TransportClient,
        backend: Arc<dyn ChatBackend>,
    ) -> Result<(ChatSessionHandle, JoinHandle<()>)> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let handler_ids: Vec<HandlerId> = EventKind::ALL
            .iter()
            .map(|kind| {
                let tx = inbound_tx.clone();
                transport.on(*kind, move |event: &ServerEvent| {
                    let _ = tx.send(event.clone());
                })
            })
            .collect();

        let mut registrar = Registrar::new(me.clone());
        registrar.announce(&transport)?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(SessionView::default());

        let session = Self {
            id: Uuid::new_v4().to_string(),
            me,
            page_size: config.history_page_size,
            receipts: ReadReceiptSynchronizer::new(backend.clone()),
            transport,
            backend,
            registrar,
            room: RoomMembership::new(),
            presence: PresenceTracker::new(),
            typing: TypingDebouncer::new(config.typing_quiet_interval),
            stream: MessageStream::new(),
            draft: String::new(),
            completions: completions_tx,
            view: view_tx,
        };

        let task = tokio::spawn(session.run(commands_rx, inbound_rx, completions_rx, handler_ids));
        let handle = ChatSessionHandle {
            commands: commands_tx,
            view: view_rx,
        };
        Ok((handle, task))
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut inbound: mpsc::UnboundedReceiver<ServerEvent>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
        handler_ids: Vec<HandlerId>,
    ) {
        info!("Session {} started for {}", self.id, self.registrar.user().username);
        self.publish();

        loop {
            let deadline = self.typing.deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = inbound.recv() => self.handle_event(event),
                Some(done) = completions.recv() => self.handle_completion(done),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_quiet_timer();
                }
            }
            self.publish();
        }

        if let Some(room) = self.room.active().map(String::from) {
            if self.typing.force_stop() {
                self.emit(ClientEvent::StopTyping(room));
            }
        }
        for id in handler_ids {
            self.transport.off(id);
        }
        self.transport.disconnect();
        self.transport.closed().await;
        self.publish();
        info!("Session {} closed", self.id);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open(conversation_id) => self.open(conversation_id),
            Command::Input(text) => self.input(text),
            Command::Send(reply) => self.send(reply),
            Command::Shutdown => {}
        }
    }

    fn emit(&self, event: ClientEvent) {
        if let Err(e) = self.transport.emit(event) {
            // Presence goes stale silently while the transport is down
            debug!("Session {} could not emit: {}", self.id, e);
        }
    }

    /// Activate a conversation: join, hydrate history, resolve the partner
    fn open(&mut self, conversation_id: String) {
        if let Some(previous) = self.room.active().map(String::from) {
            if self.typing.force_stop() {
                self.emit(ClientEvent::StopTyping(previous));
            }
        }

        info!("Session {} opening conversation {}", self.id, conversation_id);
        self.presence.reset(&conversation_id);
        let ticket = self.stream.begin_load(&conversation_id);
        if let Err(e) = self.room.activate(&conversation_id, &self.transport) {
            warn!("Join of {} failed: {}", conversation_id, e);
        }

        let backend = self.backend.clone();
        let tx = self.completions.clone();
        let page_size = self.page_size;
        tokio::spawn(async move {
            let result = backend
                .fetch_messages(&ticket.conversation_id, 1, page_size)
                .await;
            let _ = tx.send(Completion::History { ticket, result });
        });

        let backend = self.backend.clone();
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let result = backend.get_chat(&conversation_id).await;
            let _ = tx.send(Completion::Partner {
                conversation_id,
                result,
            });
        });
    }

    /// Draft changed (one keystroke)
    fn input(&mut self, text: String) {
        self.draft = text;

        let Some(room) = self.room.active().map(String::from) else {
            return;
        };
        if !self.transport.is_ready() {
            return;
        }
        if self.typing.keystroke(Instant::now()) {
            self.emit(ClientEvent::Typing(room));
        }
    }

    fn on_quiet_timer(&mut self) {
        if self.typing.poll_expired(Instant::now()) {
            if let Some(room) = self.room.active().map(String::from) {
                self.emit(ClientEvent::StopTyping(room));
            }
        }
    }

    fn send(&mut self, reply: oneshot::Sender<Result<Message>>) {
        let Some(room) = self.room.active().map(String::from) else {
            let _ = reply.send(Err(VibeError::NoActiveConversation));
            return;
        };
        if self.draft.trim().is_empty() {
            let _ = reply.send(Err(VibeError::EmptyMessage));
            return;
        }

        // Stop typing goes out before the send call, whatever the timer says
        self.typing.force_stop();
        self.emit(ClientEvent::StopTyping(room.clone()));

        let content = self.draft.clone();
        let backend = self.backend.clone();
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let result = backend.send_message(&room, &content).await;
            let _ = tx.send(Completion::Sent {
                content,
                result,
                reply,
            });
        });
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected => {
                info!("Session {} transport ready", self.id);
                if let Err(e) = self.room.on_ready(&self.transport) {
                    warn!("Deferred join failed: {}", e);
                }
            }
            ServerEvent::UserStatus(status) => {
                self.presence.on_status(&status);
            }
            ServerEvent::Typing(room) => {
                self.presence.on_typing(&room);
            }
            ServerEvent::StopTyping(room) => {
                self.presence.on_stop_typing(&room);
            }
            ServerEvent::MessageReceived(msg) => {
                let conversation_id = msg.conversation_id().to_string();
                if self.stream.append_incoming(msg) {
                    self.receipts.mark_read(&conversation_id);
                }
            }
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::History { ticket, result } => {
                match self.stream.apply_history(&ticket, result) {
                    HistoryOutcome::Applied(count) => {
                        debug!("Loaded {} messages for {}", count, ticket.conversation_id);
                        self.receipts.mark_read(&ticket.conversation_id);
                    }
                    HistoryOutcome::Stale => {}
                    HistoryOutcome::Failed => {
                        warn!("History load for {} failed", ticket.conversation_id);
                    }
                }
            }
            Completion::Partner {
                conversation_id,
                result,
            } => {
                if self.stream.conversation_id() != Some(conversation_id.as_str()) {
                    debug!("Discarding stale conversation {}", conversation_id);
                    return;
                }
                match result {
                    Ok(conversation) => {
                        if let Some(partner) = conversation.partner(&self.me.id) {
                            self.presence.set_partner(partner.clone());
                        }
                    }
                    Err(e) => warn!("Fetching conversation {} failed: {}", conversation_id, e),
                }
            }
            Completion::Sent {
                content,
                result,
                reply,
            } => match result {
                Ok(msg) => {
                    self.emit(ClientEvent::NewMessage(msg.clone()));
                    self.stream.append_outgoing(msg.clone());
                    if self.draft == content {
                        self.draft.clear();
                    }
                    let _ = reply.send(Ok(msg));
                }
                Err(e) => {
                    // Draft stays so the user can retry
                    warn!("Send failed: {}", e);
                    let _ = reply.send(Err(e));
                }
            },
        }
    }

    fn publish(&self) {
        let view = SessionView {
            conversation_id: self.stream.conversation_id().map(String::from),
            messages: self.stream.messages().to_vec(),
            load_state: self.stream.load_state().clone(),
            partner: self.presence.partner().cloned(),
            presence: self.presence.state(),
            draft: self.draft.clone(),
            ready: self.transport.is_ready(),
            local_typing: self.typing.is_signaling(),
        };
        self.view.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }
}

/// Cloneable front-end handle to a running [`ChatSession`]
#[derive(Clone)]
pub struct ChatSessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<SessionView>,
}

impl ChatSessionHandle {
    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| VibeError::SessionClosed)
    }

    /// Make `conversation_id` the active conversation
    pub fn open(&self, conversation_id: impl Into<String>) -> Result<()> {
        self.command(Command::Open(conversation_id.into()))
    }

    /// Replace the draft; counts as a keystroke for the typing signal
    pub fn input(&self, text: impl Into<String>) -> Result<()> {
        self.command(Command::Input(text.into()))
    }

    /// Send the current draft and wait for the backend round trip
    pub async fn send(&self) -> Result<Message> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Send(tx))?;
        rx.await.map_err(|_| VibeError::SessionClosed)?
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<Message> {
        self.input(text)?;
        self.send().await
    }

    /// Latest published state
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Receiver that wakes on every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Stop the session and disconnect its transport
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}
