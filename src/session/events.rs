//! Session events and the per-session observer list

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::RelayError;
use crate::types::records::{AssistantTurn, SystemInit, TurnResult};

/// Kinds of events a session emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// First `system/init` record
    SystemInit,
    /// Assistant turn with at least one text block
    Response,
    /// Assistant turn invoking the ask-user tool
    AttentionNeeded,
    /// End-of-turn result
    Result,
    /// Decode failure, stderr output, or subprocess fault
    Error,
    /// Process exit
    Exit,
}

impl EventKind {
    /// Every event kind
    pub const ALL: [Self; 6] = [
        Self::SystemInit,
        Self::Response,
        Self::AttentionNeeded,
        Self::Result,
        Self::Error,
        Self::Exit,
    ];

    /// Event name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SystemInit => "system-init",
            Self::Response => "response",
            Self::AttentionNeeded => "attention-needed",
            Self::Result => "result",
            Self::Error => "error",
            Self::Exit => "exit",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted by an agent session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The CLI announced its session
    SystemInit(SystemInit),
    /// Assistant text, concatenated across text blocks
    Response {
        /// Text blocks joined in order
        text: String,
        /// The full record
        turn: AssistantTurn,
    },
    /// The assistant is asking the user a question
    AttentionNeeded(AssistantTurn),
    /// The turn finished
    Result(TurnResult),
    /// Advisory error; the session keeps running
    Error(Arc<RelayError>),
    /// The process exited; `None` when killed by a signal
    Exit(Option<i32>),
}

impl SessionEvent {
    /// Kind of this event
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::SystemInit(_) => EventKind::SystemInit,
            Self::Response { .. } => EventKind::Response,
            Self::AttentionNeeded(_) => EventKind::AttentionNeeded,
            Self::Result(_) => EventKind::Result,
            Self::Error(_) => EventKind::Error,
            Self::Exit(_) => EventKind::Exit,
        }
    }
}

/// Callback invoked for each matching event
pub type EventHandler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Handle for removing a registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Where a registered observer delivers events
#[derive(Clone)]
pub(crate) enum Sink {
    Handler(EventHandler),
    Channel(mpsc::UnboundedSender<SessionEvent>),
}

impl Sink {
    /// Deliver `event`; `false` once a channel's receiver is gone
    pub(crate) fn deliver(&self, event: &SessionEvent) -> bool {
        match self {
            Self::Handler(handler) => {
                handler(event);
                true
            }
            Self::Channel(tx) => tx.send(event.clone()).is_ok(),
        }
    }

    fn is_closed(&self) -> bool {
        matches!(self, Self::Channel(tx) if tx.is_closed())
    }
}

/// Registered observers in registration order
#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    entries: Vec<(SubscriptionId, EventKind, Sink)>,
}

impl Observers {
    pub(crate) fn add(&mut self, kind: EventKind, sink: Sink) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, kind, sink));
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _, _)| *entry_id != id);
        self.entries.len() != before
    }

    /// Drop channels whose receiver has been dropped
    pub(crate) fn prune_closed(&mut self) {
        self.entries.retain(|(_, _, sink)| !sink.is_closed());
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot of observers for `kind`, so they run without the lock held
    pub(crate) fn sinks_for(&self, kind: EventKind) -> Vec<Sink> {
        self.entries
            .iter()
            .filter(|(_, entry_kind, _)| *entry_kind == kind)
            .map(|(_, _, sink)| sink.clone())
            .collect()
    }
}
