//! Session options and configuration
//!
//! Per-session launch options, including a builder pattern for easy
//! configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::identifiers::SessionId;
use crate::error::RelayError;

// ============================================================================
// Permission Mode
// ============================================================================

/// Permission modes for tool execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PermissionMode {
    /// Skip all permission prompts (`--dangerously-skip-permissions`)
    #[default]
    #[serde(rename = "dangerously-skip-permissions")]
    SkipPermissions,
    /// Default mode - CLI prompts for dangerous tools
    #[serde(rename = "default")]
    Default,
    /// Auto-accept file edits
    #[serde(rename = "acceptEdits")]
    AcceptEdits,
    /// Plan mode
    #[serde(rename = "plan")]
    Plan,
    /// Allow all tools
    #[serde(rename = "bypassPermissions")]
    BypassPermissions,
}

impl PermissionMode {
    /// Wire name of the mode
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SkipPermissions => "dangerously-skip-permissions",
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::Plan => "plan",
            Self::BypassPermissions => "bypassPermissions",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dangerously-skip-permissions" => Ok(Self::SkipPermissions),
            "default" => Ok(Self::Default),
            "acceptEdits" => Ok(Self::AcceptEdits),
            "plan" => Ok(Self::Plan),
            "bypassPermissions" => Ok(Self::BypassPermissions),
            other => Err(RelayError::config(format!(
                "Invalid permission mode: \"{other}\""
            ))),
        }
    }
}

// ============================================================================
// Session Options
// ============================================================================

/// Options for launching one CLI session
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Working directory for the CLI process
    pub project_path: PathBuf,
    /// AI model to use (registry default when `None`)
    pub model: Option<String>,
    /// Session ID to resume from
    pub resume: Option<SessionId>,
    /// Permission mode (registry default when `None`)
    pub permission_mode: Option<PermissionMode>,
}

impl SessionOptions {
    /// Create options for a fresh session in `project_path`
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: project_path.into(),
            ..Default::default()
        }
    }

    /// Create a new builder for `SessionOptions`
    pub fn builder(project_path: impl Into<PathBuf>) -> SessionOptionsBuilder {
        SessionOptionsBuilder {
            options: Self::new(project_path),
        }
    }
}

// ============================================================================
// Builder for SessionOptions
// ============================================================================

/// Builder for `SessionOptions`
#[derive(Debug)]
pub struct SessionOptionsBuilder {
    options: SessionOptions,
}

impl SessionOptionsBuilder {
    /// Set model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    /// Resume an existing CLI session
    #[must_use]
    pub fn resume(mut self, session_id: impl Into<SessionId>) -> Self {
        self.options.resume = Some(session_id.into());
        self
    }

    /// Set permission mode
    #[must_use]
    pub const fn permission_mode(mut self, mode: PermissionMode) -> Self {
        self.options.permission_mode = Some(mode);
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> SessionOptions {
        self.options
    }
}
