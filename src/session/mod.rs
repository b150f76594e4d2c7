//! Agent sessions
//!
//! An [`AgentSession`] owns one Claude CLI subprocess: it spawns it, feeds
//! user turns to stdin, decodes stdout into events and terminates it with a
//! bounded grace period.
//!
//! # Module Structure
//!
//! - `agent_session` - `AgentSession` public API and state machine
//! - `command` - CLI argument building
//! - `events` - Event types and observer list
//! - `process` - Pipe and supervisor tasks

mod agent_session;
mod command;
mod events;
mod process;

pub use agent_session::AgentSession;
pub(crate) use agent_session::SessionInner;
pub use events::{EventHandler, EventKind, SessionEvent, SubscriptionId};
