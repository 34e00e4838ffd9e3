//! Connection lifecycle: connect, heartbeat, fixed-delay reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use super::frame::OutboundCommand;
use super::transport::{Connector, FrameTransport};
use crate::config::{SessionConfig, DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_RECONNECT_DELAY_MS};
use crate::error::{ConduitError, ErrorCategory};
use crate::util::jittered;

/// Fixed-delay reconnect policy, optionally capped and jittered.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<usize>,
    /// Fraction of `delay` to randomize.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS))
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
            jitter: 0.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn allows(&self, attempt: usize) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }

    pub fn next_delay(&self) -> Duration {
        jittered(self.delay, self.jitter)
    }
}

impl From<&SessionConfig> for ReconnectPolicy {
    fn from(config: &SessionConfig) -> Self {
        Self {
            delay: config.reconnect_delay(),
            max_attempts: config.max_reconnect_attempts,
            jitter: config.reconnect_jitter,
        }
    }
}

/// Lifecycle notifications from the connection supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected { reconnect: bool },
    Frame(String),
    Disconnected { reason: String },
    Reconnecting { attempt: usize, delay: Duration },
    ReconnectFailed { attempt: usize, error: String },
    /// Terminal. `reason` is `None` after a manual disconnect.
    Closed { reason: Option<String> },
}

struct ConnectionRuntime {
    shutdown_tx: watch::Sender<bool>,
    commands_tx: mpsc::UnboundedSender<String>,
    online: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Owns one logical connection and transparently re-establishes it after
/// unexpected closes. A manual [`disconnect`](Self::disconnect) stops the
/// supervisor so no retry follows.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    heartbeat_interval: Duration,
    runtime: Option<ConnectionRuntime>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        Self {
            connector,
            policy,
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            runtime: None,
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Whether the supervisor is running (connected or waiting to reconnect).
    pub fn is_active(&self) -> bool {
        self.runtime
            .as_ref()
            .is_some_and(|runtime| !runtime.task.is_finished())
    }

    /// Whether a transport is currently open.
    pub fn is_online(&self) -> bool {
        self.runtime
            .as_ref()
            .is_some_and(|runtime| runtime.online.load(Ordering::SeqCst))
    }

    /// Open the first transport and start supervising it.
    ///
    /// A failure here is returned to the caller; only connections that were
    /// established once are retried automatically.
    pub async fn connect(
        &mut self,
    ) -> Result<mpsc::UnboundedReceiver<TransportEvent>, ConduitError> {
        if self.is_active() {
            return Err(ConduitError::InvalidState(
                "Session connection is already open".into(),
            ));
        }
        self.runtime = None;

        let transport = self.connector.connect().await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let online = Arc::new(AtomicBool::new(true));
        let _ = events_tx.send(TransportEvent::Connected { reconnect: false });

        let supervisor = Supervisor {
            connector: Arc::clone(&self.connector),
            policy: self.policy.clone(),
            heartbeat_interval: self.heartbeat_interval,
            events_tx,
            commands_rx,
            shutdown_rx,
            online: Arc::clone(&online),
        };
        let task = tokio::spawn(supervisor.run(transport));

        self.runtime = Some(ConnectionRuntime {
            shutdown_tx,
            commands_tx,
            online,
            task,
        });
        Ok(events_rx)
    }

    /// Queue a command on the open transport.
    pub fn send(&self, command: &OutboundCommand) -> Result<(), ConduitError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| ConduitError::InvalidState("Session is not connected".into()))?;
        if !runtime.online.load(Ordering::SeqCst) {
            return Err(ConduitError::Transport(
                "Session connection is down; waiting to reconnect".into(),
            ));
        }
        runtime
            .commands_tx
            .send(command.to_json()?)
            .map_err(|_| ConduitError::Transport("Session connection task has stopped".into()))
    }

    /// Close the transport and stop supervising. No reconnect follows.
    pub async fn disconnect(&mut self) -> Result<(), ConduitError> {
        if let Some(runtime) = self.runtime.take() {
            let _ = runtime.shutdown_tx.send(true);
            runtime.task.await.map_err(|error| {
                ConduitError::Transport(format!("Session connection task failed: {error}"))
            })?;
        }
        Ok(())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = runtime.shutdown_tx.send(true);
            runtime.task.abort();
        }
    }
}

enum ConnectionOutcome {
    Shutdown,
    Disconnected(String),
}

struct Supervisor {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    heartbeat_interval: Duration,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    commands_rx: mpsc::UnboundedReceiver<String>,
    shutdown_rx: watch::Receiver<bool>,
    online: Arc<AtomicBool>,
}

impl Supervisor {
    async fn run(mut self, mut transport: Box<dyn FrameTransport>) {
        let close_reason = loop {
            let reason = match self.run_active_connection(transport.as_mut()).await {
                ConnectionOutcome::Shutdown => break None,
                ConnectionOutcome::Disconnected(reason) => reason,
            };
            self.online.store(false, Ordering::SeqCst);
            tracing::warn!(reason = %reason, "session connection lost");
            let _ = self.events_tx.send(TransportEvent::Disconnected { reason });

            match self.reconnect().await {
                Ok(Some(reconnected)) => {
                    transport = reconnected;
                    let dropped = self.drain_stale_commands();
                    if dropped > 0 {
                        tracing::debug!(dropped, "discarded commands queued before reconnect");
                    }
                    self.online.store(true, Ordering::SeqCst);
                    let _ = self
                        .events_tx
                        .send(TransportEvent::Connected { reconnect: true });
                }
                Ok(None) => break None,
                Err(reason) => break Some(reason),
            }
        };

        self.online.store(false, Ordering::SeqCst);
        let _ = self.events_tx.send(TransportEvent::Closed {
            reason: close_reason,
        });
    }

    /// `Ok(None)` on shutdown, `Err` once retrying is pointless.
    async fn reconnect(&mut self) -> Result<Option<Box<dyn FrameTransport>>, String> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            if !self.policy.allows(attempt) {
                return Err(format!(
                    "Session reconnect attempts exhausted after {} tries",
                    attempt - 1
                ));
            }

            let delay = self.policy.next_delay();
            let _ = self
                .events_tx
                .send(TransportEvent::Reconnecting { attempt, delay });
            let sleep = time::sleep(delay);
            tokio::pin!(sleep);
            tokio::select! {
                _ = &mut sleep => {}
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        return Ok(None);
                    }
                }
            }
            if *self.shutdown_rx.borrow() {
                return Ok(None);
            }

            match self.connector.connect().await {
                Ok(transport) => {
                    tracing::info!(attempt, "session reconnected");
                    return Ok(Some(transport));
                }
                Err(error) => {
                    tracing::warn!(attempt, error = %error, "session reconnect failed");
                    let _ = self.events_tx.send(TransportEvent::ReconnectFailed {
                        attempt,
                        error: error.to_string(),
                    });
                    if is_fatal(&error) {
                        return Err(error.to_string());
                    }
                }
            }
        }
    }

    async fn run_active_connection(
        &mut self,
        transport: &mut dyn FrameTransport,
    ) -> ConnectionOutcome {
        let mut heartbeat = time::interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        if let Err(error) = transport.close().await {
                            tracing::debug!(error = %error, "session close failed");
                        }
                        return ConnectionOutcome::Shutdown;
                    }
                }
                command = self.commands_rx.recv() => {
                    let Some(command) = command else {
                        let _ = transport.close().await;
                        return ConnectionOutcome::Shutdown;
                    };
                    if let Err(error) = transport.send(command).await {
                        return ConnectionOutcome::Disconnected(error.to_string());
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(error) = transport.heartbeat().await {
                        return ConnectionOutcome::Disconnected(error.to_string());
                    }
                }
                frame = transport.receive() => {
                    match frame {
                        Some(Ok(text)) => {
                            let _ = self.events_tx.send(TransportEvent::Frame(text));
                        }
                        Some(Err(error)) => {
                            return ConnectionOutcome::Disconnected(error.to_string());
                        }
                        None => {
                            return ConnectionOutcome::Disconnected(
                                "connection closed by peer".into(),
                            );
                        }
                    }
                }
            }
        }
    }

    fn drain_stale_commands(&mut self) -> usize {
        let mut dropped = 0;
        while self.commands_rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

/// Errors a retry cannot fix.
fn is_fatal(error: &ConduitError) -> bool {
    matches!(
        error.category(),
        ErrorCategory::Authentication | ErrorCategory::Configuration
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_policy_always_allows() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay, Duration::from_secs(5));
        assert!(policy.allows(1));
        assert!(policy.allows(10_000));
    }

    #[test]
    fn capped_policy_stops_after_max() {
        let policy = ReconnectPolicy::fixed(Duration::from_millis(10)).with_max_attempts(2);
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
    }

    #[test]
    fn policy_reads_session_config() {
        let config = SessionConfig {
            reconnect_delay_ms: 250,
            max_reconnect_attempts: Some(4),
            reconnect_jitter: 0.0,
            ..SessionConfig::default()
        };
        let policy = ReconnectPolicy::from(&config);
        assert_eq!(policy.next_delay(), Duration::from_millis(250));
        assert_eq!(policy.max_attempts, Some(4));
    }

    #[test]
    fn auth_failures_are_fatal() {
        assert!(is_fatal(&ConduitError::Authentication("401".into())));
        assert!(!is_fatal(&ConduitError::Transport("refused".into())));
    }
}
