//! One supervised Claude CLI process

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::command::{CommandBuilder, LaunchSpec};
use super::events::{EventHandler, EventKind, Observers, SessionEvent, Sink, SubscriptionId};
use super::process::{self, ProcessSignal};
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::types::identifiers::{SessionId, TenantId};
use crate::types::options::SessionOptions;
use crate::types::records::{ProtocolRecord, UserTurn};
use crate::types::session::{SessionInfo, SessionStatus};

/// Mutable session state, guarded by one lock
pub(super) struct SessionState {
    pub status: SessionStatus,
    /// Id from the first `system/init` record
    pub reported_id: Option<SessionId>,
    /// Queue feeding the stdin writer task; `None` once not writable
    pub stdin_tx: Option<mpsc::UnboundedSender<UserTurn>>,
    /// Signal queue to the supervisor task; `None` once the process is detached
    pub signal_tx: Option<mpsc::UnboundedSender<ProcessSignal>>,
    /// Armed grace timer
    pub grace: Option<CancellationToken>,
    pub stop_requested: bool,
    pub forced_terminations: u32,
}

impl SessionState {
    /// Apply a transition unless the session is already stopped
    fn transition(&mut self, next: SessionStatus) {
        if !self.status.is_terminal() {
            self.status = next;
        }
    }
}

pub(crate) struct SessionInner {
    pub(super) provisional_id: SessionId,
    pub(super) tenant_id: TenantId,
    pub(super) launch: LaunchSpec,
    pub(super) created_at: DateTime<Utc>,
    pub(super) cli_path: PathBuf,
    pub(super) stop_grace: Duration,
    pub(super) state: Mutex<SessionState>,
    observers: Mutex<Observers>,
}

impl SessionInner {
    pub(super) fn current_id(&self) -> SessionId {
        self.state
            .lock()
            .reported_id
            .clone()
            .unwrap_or_else(|| self.provisional_id.clone())
    }

    /// Deliver `event` to every handler registered for its kind
    ///
    /// Must be called without the state lock held.
    pub(super) fn emit(&self, event: SessionEvent) {
        let sinks = self.observers.lock().sinks_for(event.kind());
        let mut closed = false;
        for sink in sinks {
            closed |= !sink.deliver(&event);
        }
        if closed {
            self.observers.lock().prune_closed();
        }
    }

    /// Route one decoded record to its events
    pub(super) fn dispatch(&self, record: ProtocolRecord) {
        match record {
            ProtocolRecord::SystemInit(init) => {
                let first = {
                    let mut state = self.state.lock();
                    if state.reported_id.is_some() {
                        false
                    } else {
                        state.reported_id = Some(init.session_id.clone());
                        true
                    }
                };
                if first {
                    log::info!(
                        "[{}] CLI reported session id {}",
                        self.provisional_id,
                        init.session_id
                    );
                    self.emit(SessionEvent::SystemInit(init));
                } else {
                    log::debug!(
                        "[{}] Ignoring repeated system init ({})",
                        self.provisional_id,
                        init.session_id
                    );
                }
            }
            ProtocolRecord::Assistant(turn) => {
                if let Some(text) = turn.text() {
                    self.emit(SessionEvent::Response {
                        text,
                        turn: turn.clone(),
                    });
                }
                if turn.needs_attention() {
                    self.emit(SessionEvent::AttentionNeeded(turn));
                }
            }
            ProtocolRecord::Result(result) => {
                self.state.lock().transition(SessionStatus::Ready);
                self.emit(SessionEvent::Result(result));
            }
        }
    }

    /// Report an advisory error without changing status
    pub(super) fn report(&self, err: RelayError) {
        log::warn!("[{}] {}", self.provisional_id, err);
        self.emit(SessionEvent::Error(Arc::new(err)));
    }

    /// Report a subprocess-level fault and move to `Error`
    pub(super) fn fail(&self, err: RelayError) {
        self.state.lock().transition(SessionStatus::Error);
        self.report(err);
    }

    /// Stop accepting input after the writer task died
    pub(super) fn close_stdin(&self) {
        self.state.lock().stdin_tx = None;
    }

    /// Cancel a pending grace timer; called the moment exit is observed
    pub(super) fn disarm_grace(&self) {
        if let Some(token) = self.state.lock().grace.as_ref() {
            token.cancel();
        }
    }

    /// Count a forced kill unless exit already disarmed `token`
    pub(super) fn record_forced_termination(&self, token: &CancellationToken) -> bool {
        let mut state = self.state.lock();
        if token.is_cancelled() {
            return false;
        }
        state.forced_terminations += 1;
        true
    }

    /// Process exit observed: detach the handle and emit `exit`
    pub(super) fn on_exit(&self, code: Option<i32>) {
        {
            let mut state = self.state.lock();
            state.status = SessionStatus::Stopped;
            state.stdin_tx = None;
            state.signal_tx = None;
            if let Some(token) = state.grace.as_ref() {
                token.cancel();
            }
        }
        log::info!("[{}] CLI exited with code {:?}", self.provisional_id, code);
        self.emit(SessionEvent::Exit(code));
    }
}

/// Handle to one Claude CLI subprocess and its status
///
/// Cheap to clone; all clones refer to the same session. Public operations
/// are synchronous. I/O runs on tokio tasks spawned by [`AgentSession::start`],
/// which therefore must be called from within a tokio runtime.
#[derive(Clone)]
pub struct AgentSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("id", &self.id())
            .field("tenant_id", &self.inner.tenant_id)
            .field("status", &self.status())
            .finish()
    }
}

impl AgentSession {
    /// Create a session for `tenant_id`; nothing is spawned until [`start`](Self::start)
    ///
    /// Missing model and permission mode are filled from `config`. The
    /// provisional id is the resume id when resuming, otherwise a fresh UUID.
    #[must_use]
    pub fn new(tenant_id: TenantId, options: SessionOptions, config: &RelayConfig) -> Self {
        let provisional_id = options.resume.clone().unwrap_or_else(SessionId::generate);
        let launch = LaunchSpec {
            project_path: options.project_path,
            model: options
                .model
                .unwrap_or_else(|| config.default_model.clone()),
            permission_mode: options
                .permission_mode
                .unwrap_or(config.default_permission_mode),
            resume: options.resume,
        };

        Self {
            inner: Arc::new(SessionInner {
                provisional_id,
                tenant_id,
                launch,
                created_at: Utc::now(),
                cli_path: config.cli_path.clone(),
                stop_grace: config.stop_grace,
                state: Mutex::new(SessionState {
                    status: SessionStatus::Starting,
                    reported_id: None,
                    stdin_tx: None,
                    signal_tx: None,
                    grace: None,
                    stop_requested: false,
                    forced_terminations: 0,
                }),
                observers: Mutex::new(Observers::default()),
            }),
        }
    }

    /// Spawn the CLI and wire its pipes
    ///
    /// # Errors
    /// Returns `RelayError::Process` if the session was already started or the
    /// process cannot be spawned. A spawn failure also moves the session to
    /// `Error` and emits an `error` event.
    pub fn start(&self) -> Result<()> {
        if self.inner.state.lock().status != SessionStatus::Starting {
            return Err(RelayError::process(format!(
                "Session {} was already started",
                self.id()
            )));
        }

        let mut cmd = CommandBuilder::new(&self.inner.cli_path, &self.inner.launch).build();
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = if self.inner.launch.project_path.exists() {
                    format!("Failed to start Claude Code: {e}")
                } else {
                    format!(
                        "Working directory does not exist: {}",
                        self.inner.launch.project_path.display()
                    )
                };
                self.inner.fail(RelayError::process(message.clone()));
                return Err(RelayError::process(message));
            }
        };

        let handles = match process::attach(Arc::clone(&self.inner), child) {
            Ok(handles) => handles,
            Err(e) => {
                let message = e.to_string();
                self.inner.fail(e);
                return Err(RelayError::process(message));
            }
        };

        {
            let mut state = self.inner.state.lock();
            state.stdin_tx = Some(handles.stdin_tx);
            state.signal_tx = Some(handles.signal_tx);
            state.transition(SessionStatus::Ready);
        }

        log::info!(
            "[{}] Started Claude CLI for tenant {} in {}",
            self.inner.provisional_id,
            self.inner.tenant_id,
            self.inner.launch.project_path.display()
        );
        Ok(())
    }

    /// Queue one user turn for the CLI and mark the session busy
    ///
    /// No acknowledgement is awaited; replies arrive as events.
    ///
    /// # Errors
    /// Returns `RelayError::InactiveSession` if stdin is not writable
    pub fn send(&self, text: &str) -> Result<()> {
        let mut state = self.inner.state.lock();
        let sent = match state.stdin_tx.as_ref() {
            Some(tx) if !tx.is_closed() => tx.send(UserTurn::new(text)).is_ok(),
            _ => false,
        };
        if !sent {
            drop(state);
            return Err(RelayError::inactive_session(self.id().to_string()));
        }
        state.transition(SessionStatus::Busy);
        Ok(())
    }

    /// Ask the CLI to terminate
    ///
    /// Closes stdin, sends a polite terminate and arms the grace timer; if the
    /// process has not exited when it fires, it is killed. Status becomes
    /// `Stopped` immediately. Repeated calls are no-ops and never re-arm the
    /// timer.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        state.status = SessionStatus::Stopped;
        if state.stop_requested {
            return;
        }
        state.stop_requested = true;
        state.stdin_tx = None;

        let Some(signal_tx) = state.signal_tx.clone() else {
            log::debug!("[{}] Stop requested with no live process", self.inner.provisional_id);
            return;
        };
        let token = CancellationToken::new();
        state.grace = Some(token.clone());
        drop(state);

        log::info!("[{}] Stopping Claude CLI", self.inner.provisional_id);
        if signal_tx.send(ProcessSignal::Terminate).is_err() {
            log::debug!("[{}] Supervisor already gone", self.inner.provisional_id);
        }
        process::arm_grace_timer(&self.inner, signal_tx, token, self.inner.stop_grace);
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.inner.state.lock().status
    }

    /// Snapshot of the session
    #[must_use]
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id(),
            tenant_id: self.inner.tenant_id,
            project_path: self.inner.launch.project_path.clone(),
            model: self.inner.launch.model.clone(),
            permission_mode: self.inner.launch.permission_mode,
            status: self.status(),
            created_at: self.inner.created_at,
            is_resumed: self.is_resumed(),
        }
    }

    /// Current identity: the CLI-reported id once known, else the provisional id
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.inner.current_id()
    }

    /// Id assigned at creation
    #[must_use]
    pub fn provisional_id(&self) -> &SessionId {
        &self.inner.provisional_id
    }

    /// Id from the CLI's `system/init` record, if received
    #[must_use]
    pub fn reported_id(&self) -> Option<SessionId> {
        self.inner.state.lock().reported_id.clone()
    }

    /// Owning tenant
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.inner.tenant_id
    }

    /// Whether this session resumed an earlier CLI session
    #[must_use]
    pub fn is_resumed(&self) -> bool {
        self.inner.launch.resume.is_some()
    }

    /// Number of forced kills issued after the grace period
    #[must_use]
    pub fn forced_terminations(&self) -> u32 {
        self.inner.state.lock().forced_terminations
    }

    /// Register `handler` for events of `kind`
    ///
    /// Handlers run on the session's I/O task in registration order. Events
    /// emitted before registration are not replayed.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.on_handler(kind, Arc::new(handler))
    }

    /// Register a shared handler for events of `kind`
    pub fn on_handler(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        self.inner.observers.lock().add(kind, Sink::Handler(handler))
    }

    /// Remove a handler
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.observers.lock().remove(id)
    }

    /// Channel receiving every event of the given kinds, in order
    ///
    /// The subscription ends when the receiver is dropped.
    pub fn subscribe(&self, kinds: &[EventKind]) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut observers = self.inner.observers.lock();
        observers.prune_closed();
        for kind in kinds {
            observers.add(*kind, Sink::Channel(tx.clone()));
        }
        rx
    }

    /// Number of registered handlers and channel subscriptions
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn is(&self, weak: &Weak<SessionInner>) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.inner), weak.as_ptr())
    }
}
