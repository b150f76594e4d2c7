//! # Claude Session Relay
//!
//! Supervises long-lived Claude Code CLI processes on behalf of many tenants
//! (for example chats), speaking the CLI's line-delimited `stream-json`
//! protocol over stdin and stdout.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kodegen_claude_relay::{EventKind, RelayConfig, SessionEvent, SessionOptions, SessionRegistry, TenantId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SessionRegistry::new(RelayConfig::from_env()?);
//!     let tenant = TenantId::new(42);
//!
//!     let session = registry.create(tenant, SessionOptions::new("/path/to/project"))?;
//!     session.on(EventKind::Response, |event| {
//!         if let SessionEvent::Response { text, .. } = event {
//!             println!("Claude: {text}");
//!         }
//!     });
//!
//!     registry.send(tenant, "What does this project do?")?;
//!     # registry.stop_all_and_clear();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`]: line codec for `stream-json` records
//! - [`session`]: one supervised CLI process and its events
//! - [`registry`]: sessions keyed by id, per-tenant active pointers
//! - [`history`]: read-only view of the CLI's local session history
//! - [`config`]: relay configuration and environment loading
//! - [`types`]: identifiers, records, options and snapshots
//! - [`error`]: error types
//!
//! ## Requirements
//!
//! - Claude Code: `npm install -g @anthropic-ai/claude-code`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod history;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod types;

pub use config::{RelayConfig, RelayConfigBuilder};
pub use error::{ErrorKind, RelayError, Result};
pub use history::{HistoryEntry, HistoryStore, Resolution, ResolvedSession};
pub use protocol::{RecordCodec, decode, encode_user_turn};
pub use registry::SessionRegistry;
pub use session::{AgentSession, EventHandler, EventKind, SessionEvent, SubscriptionId};
pub use types::identifiers::{SessionId, TenantId, ToolName};
pub use types::options::{PermissionMode, SessionOptions, SessionOptionsBuilder};
pub use types::records::{AssistantTurn, ContentBlock, ProtocolRecord, SystemInit, TurnResult};
pub use types::session::{SessionInfo, SessionStatus};

/// Version of the relay
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
