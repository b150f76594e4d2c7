//! Session status and snapshot types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::identifiers::{SessionId, TenantId};
use super::options::PermissionMode;

/// Lifecycle status of an agent session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Constructed, subprocess not spawned yet
    Starting,
    /// Waiting for input
    Ready,
    /// A user turn is in flight
    Busy,
    /// Terminal: stop requested or process exited
    Stopped,
    /// Subprocess-level I/O fault observed
    Error,
}

impl SessionStatus {
    /// Whether no further transitions are possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Busy => "busy",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Current identity (CLI-reported once known)
    pub session_id: SessionId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Working directory of the CLI
    pub project_path: PathBuf,
    /// Model requested at launch
    pub model: String,
    /// Permission mode requested at launch
    pub permission_mode: PermissionMode,
    /// Current status
    pub status: SessionStatus,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Whether this session resumed an earlier CLI session
    pub is_resumed: bool,
}
