//! Type definitions for the Claude session relay
//!
//! - [`identifiers`] - Type-safe ID wrappers (`SessionId`, `TenantId`, `ToolName`)
//! - [`records`] - `stream-json` protocol records
//! - [`options`] - Per-session launch options
//! - [`session`] - Session status and info snapshots

pub mod identifiers;
pub mod options;
pub mod records;
pub mod session;

// Re-export commonly used types
pub use identifiers::{SessionId, TenantId, ToolName};
pub use options::{PermissionMode, SessionOptions, SessionOptionsBuilder};
pub use records::{
    ASK_USER_TOOL, AssistantMessage, AssistantTurn, ContentBlock, ProtocolRecord,
    ResultOutcome, SystemInit, TurnResult, UserMessageContent, UserTurn,
};
pub use session::{SessionInfo, SessionStatus};
