//! Session client: protocol state machine on top of a managed connection.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::connection::{ConnectionManager, ReconnectPolicy, TransportEvent};
use super::frame::OutboundCommand;
use super::protocol::{Session, SessionEvent, SessionMachine, SessionState};
use super::transport::{Connector, WebSocketConnector};
use crate::config::SessionConfig;
use crate::error::ConduitError;
use crate::progress::ProgressTimeline;
use crate::types::ImageAttachment;

/// Long-lived, resumable session with a remote agent runtime.
///
/// Frames are applied in arrival order from a single task: whoever polls
/// [`next_event`](Self::next_event). After a reconnect the active chat is
/// resumed automatically; after a manual [`disconnect`](Self::disconnect)
/// it is not.
///
/// Commands are accepted only once the client itself has applied the
/// matching `Connected` event, so a resume request always precedes any
/// new command on a fresh link.
pub struct SessionClient {
    machine: SessionMachine,
    connection: ConnectionManager,
    events_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    pending: VecDeque<SessionEvent>,
    online: bool,
}

impl SessionClient {
    pub fn new(connector: Arc<dyn Connector>, config: &SessionConfig) -> Self {
        let mut machine = SessionMachine::new(config.correlation);
        if let Some(workspace) = &config.workspace {
            machine = machine.with_session(Session {
                workspace_ref: Some(workspace.clone()),
                ..Session::default()
            });
        }
        let connection = ConnectionManager::new(connector, ReconnectPolicy::from(config))
            .with_heartbeat_interval(config.heartbeat_interval());
        Self {
            machine,
            connection,
            events_rx: None,
            pending: VecDeque::new(),
            online: false,
        }
    }

    /// Client over a WebSocket connection described by `config`.
    pub fn from_config(config: &SessionConfig) -> Result<Self, ConduitError> {
        let connector = WebSocketConnector::from_config(config)?;
        Ok(Self::new(Arc::new(connector), config))
    }

    /// Continue a persisted session; its id is resumed on connect.
    pub fn with_session(mut self, session: Session) -> Self {
        self.machine = self.machine.with_session(session);
        self
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn session(&self) -> &Session {
        self.machine.session()
    }

    pub fn progress(&self) -> &ProgressTimeline {
        self.machine.progress()
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    /// True once a `Connected` event has been applied and the link is up.
    pub fn is_connected(&self) -> bool {
        self.is_ready()
    }

    pub async fn connect(&mut self) -> Result<(), ConduitError> {
        let events_rx = self.connection.connect().await?;
        self.events_rx = Some(events_rx);
        Ok(())
    }

    /// Manual disconnect: abandons the in-flight turn, clears any pending
    /// approval and suppresses both reconnecting and auto-resume.
    pub async fn disconnect(&mut self) -> Result<(), ConduitError> {
        self.machine.detach();
        self.pending.clear();
        self.events_rx = None;
        self.online = false;
        self.connection.disconnect().await
    }

    /// Start a turn. `Ok(false)` when a turn is already in flight.
    pub fn send_message(
        &mut self,
        content: impl Into<String>,
        images: &[ImageAttachment],
    ) -> Result<bool, ConduitError> {
        self.ensure_online()?;
        match self.machine.send_message(content, images) {
            Some(command) => {
                if let Err(error) = self.connection.send(&command) {
                    self.machine.on_disconnect();
                    return Err(error);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// `Ok(false)` when no approval is pending.
    pub fn approve(&mut self) -> Result<bool, ConduitError> {
        self.ensure_online()?;
        let command = self.machine.approve();
        self.resolve_approval(command, true)
    }

    /// Clears the pending approval locally even when the denial cannot be
    /// delivered.
    pub fn deny(&mut self) -> Result<bool, ConduitError> {
        self.sync_events();
        let command = self.machine.deny();
        if !self.is_ready() {
            if command.is_some() {
                tracing::warn!("denial not delivered, session is offline");
                self.pending
                    .push_back(SessionEvent::ApprovalResolved { approved: false });
            }
            return Ok(command.is_some());
        }
        self.resolve_approval(command, false)
    }

    /// Resume `chat_id`, or the most recent chat when `None`.
    pub fn resume(&mut self, chat_id: Option<String>) -> Result<bool, ConduitError> {
        self.ensure_online()?;
        let command = self.machine.resume(chat_id);
        self.send_optional(command)
    }

    pub fn new_chat(&mut self) -> Result<(), ConduitError> {
        self.ensure_online()?;
        let command = self.machine.new_chat();
        self.connection.send(&command)
    }

    /// Wait for the next session event. `None` once the connection is closed
    /// for good and every buffered event has been returned.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let transport_event = self.events_rx.as_mut()?.recv().await;
            match transport_event {
                Some(event) => self.apply(event),
                None => {
                    self.events_rx = None;
                    return None;
                }
            }
        }
    }

    fn apply(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(text) => {
                self.pending.extend(self.machine.handle_text(&text));
            }
            TransportEvent::Connected { reconnect } => {
                let resume = self.machine.on_connected();
                let resumed = resume.is_some();
                if let Some(command) = resume {
                    if let Err(error) = self.connection.send(&command) {
                        tracing::warn!(error = %error, "failed to request session resume");
                        self.pending.push_back(SessionEvent::ConnectionError {
                            message: error.to_string(),
                        });
                    }
                }
                self.online = true;
                tracing::info!(reconnect, resumed, "session connected");
                self.pending.push_back(SessionEvent::Connected { resumed });
            }
            TransportEvent::Disconnected { reason } => {
                self.online = false;
                self.machine.on_disconnect();
                self.pending.push_back(SessionEvent::Disconnected { reason });
            }
            TransportEvent::Reconnecting { attempt, delay } => {
                self.pending.push_back(SessionEvent::Reconnecting {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
            }
            TransportEvent::ReconnectFailed { attempt, error } => {
                self.pending.push_back(SessionEvent::ConnectionError {
                    message: format!("reconnect attempt {attempt} failed: {error}"),
                });
            }
            TransportEvent::Closed { reason } => {
                self.online = false;
                self.machine.on_disconnect();
                self.pending.push_back(SessionEvent::Closed { reason });
            }
        }
    }

    /// Apply transport events that are already queued without waiting.
    fn sync_events(&mut self) {
        loop {
            let Some(events_rx) = self.events_rx.as_mut() else {
                return;
            };
            match events_rx.try_recv() {
                Ok(event) => self.apply(event),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.events_rx = None;
                    return;
                }
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.online && self.connection.is_online()
    }

    fn ensure_online(&mut self) -> Result<(), ConduitError> {
        self.sync_events();
        if self.is_ready() {
            Ok(())
        } else {
            Err(ConduitError::InvalidState("Session is not connected".into()))
        }
    }

    fn resolve_approval(
        &mut self,
        command: Option<OutboundCommand>,
        approved: bool,
    ) -> Result<bool, ConduitError> {
        if command.is_some() {
            self.pending
                .push_back(SessionEvent::ApprovalResolved { approved });
        }
        self.send_optional(command)
    }

    fn send_optional(&self, command: Option<OutboundCommand>) -> Result<bool, ConduitError> {
        match command {
            Some(command) => self.connection.send(&command).map(|()| true),
            None => Ok(false),
        }
    }
}
