//! Relay configuration
//!
//! [`RelayConfig`] carries everything the registry needs to launch sessions:
//! the CLI location, the capacity bound, launch defaults and the stop grace
//! period. It can be assembled with a builder or loaded from environment
//! variables.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RelayError, Result};
use crate::types::options::PermissionMode;

/// Default model when none is configured
pub const DEFAULT_MODEL: &str = "sonnet";

/// Models accepted as a default
pub const VALID_MODELS: &[&str] = &["sonnet", "opus", "haiku"];

/// Default capacity bound
pub const DEFAULT_MAX_SESSIONS: usize = 5;

/// Default grace period between terminate and kill
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Configuration for the session registry
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Path to the Claude CLI binary
    pub cli_path: PathBuf,
    /// Maximum number of concurrently registered sessions
    pub max_sessions: usize,
    /// Model used when a session does not name one
    pub default_model: String,
    /// Permission mode used when a session does not name one
    pub default_permission_mode: PermissionMode,
    /// Time allowed between terminate and forced kill
    pub stop_grace: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            cli_path: PathBuf::from("claude"),
            max_sessions: DEFAULT_MAX_SESSIONS,
            default_model: DEFAULT_MODEL.to_string(),
            default_permission_mode: PermissionMode::default(),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

impl RelayConfig {
    /// Create a new builder for `RelayConfig`
    #[must_use]
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::default()
    }

    /// Load configuration from the process environment
    ///
    /// # Errors
    /// Returns `RelayError::Config` if any variable is invalid
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_env_map(&vars)
    }

    /// Load configuration from an explicit variable map
    ///
    /// Reads `CLAUDE_CLI_PATH`, `MAX_SESSIONS`, `DEFAULT_MODEL`,
    /// `DEFAULT_PERMISSION_MODE` and `STOP_GRACE_MS`. Empty values count as
    /// unset.
    ///
    /// # Errors
    /// Returns `RelayError::Config` if any variable is invalid
    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let mut builder = Self::builder();

        builder = match get("CLAUDE_CLI_PATH") {
            Some(path) => builder.cli_path(path),
            None => builder.cli_path(Self::find_cli().unwrap_or_else(|_| PathBuf::from("claude"))),
        };

        if let Some(raw) = get("MAX_SESSIONS") {
            let max = raw
                .parse::<usize>()
                .map_err(|_| RelayError::config(format!("Invalid MAX_SESSIONS: \"{raw}\"")))?;
            builder = builder.max_sessions(max);
        }

        if let Some(model) = get("DEFAULT_MODEL") {
            builder = builder.default_model(model);
        }

        if let Some(mode) = get("DEFAULT_PERMISSION_MODE") {
            builder = builder.default_permission_mode(mode.parse()?);
        }

        if let Some(raw) = get("STOP_GRACE_MS") {
            let ms = raw
                .parse::<u64>()
                .map_err(|_| RelayError::config(format!("Invalid STOP_GRACE_MS: \"{raw}\"")))?;
            builder = builder.stop_grace(Duration::from_millis(ms));
        }

        builder.build()
    }

    /// Find the Claude CLI binary
    ///
    /// # Errors
    /// Returns `RelayError::Config` if the CLI cannot be found in PATH or
    /// common install locations
    pub fn find_cli() -> Result<PathBuf> {
        if let Ok(path) = which::which("claude") {
            return Ok(path);
        }

        let home = env::var("HOME").unwrap_or_else(|_| String::from("/root"));
        let locations = [
            PathBuf::from(&home).join(".npm-global/bin/claude"),
            PathBuf::from("/usr/local/bin/claude"),
            PathBuf::from(&home).join(".local/bin/claude"),
            PathBuf::from(&home).join("node_modules/.bin/claude"),
            PathBuf::from(&home).join(".yarn/bin/claude"),
        ];

        locations
            .into_iter()
            .find(|path| path.is_file())
            .ok_or_else(|| {
                RelayError::config(
                    "Claude Code not found. Install with: npm install -g @anthropic-ai/claude-code, \
                     or set CLAUDE_CLI_PATH",
                )
            })
    }
}

// ============================================================================
// Builder for RelayConfig
// ============================================================================

/// Builder for `RelayConfig`
#[derive(Debug, Default)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    /// Set CLI path
    #[must_use]
    pub fn cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cli_path = path.into();
        self
    }

    /// Set maximum sessions
    #[must_use]
    pub const fn max_sessions(mut self, max: usize) -> Self {
        self.config.max_sessions = max;
        self
    }

    /// Set default model
    #[must_use]
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = model.into();
        self
    }

    /// Set default permission mode
    #[must_use]
    pub const fn default_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.config.default_permission_mode = mode;
        self
    }

    /// Set stop grace period
    #[must_use]
    pub const fn stop_grace(mut self, grace: Duration) -> Self {
        self.config.stop_grace = grace;
        self
    }

    /// Validate and build the configuration
    ///
    /// # Errors
    /// Returns `RelayError::Config` if `max_sessions` is zero or the default
    /// model is not one of [`VALID_MODELS`]
    pub fn build(self) -> Result<RelayConfig> {
        if self.config.max_sessions < 1 {
            return Err(RelayError::config(format!(
                "Invalid MAX_SESSIONS: \"{}\"",
                self.config.max_sessions
            )));
        }
        if !VALID_MODELS.contains(&self.config.default_model.as_str()) {
            return Err(RelayError::config(format!(
                "Invalid DEFAULT_MODEL: \"{}\". Must be one of: {}",
                self.config.default_model,
                VALID_MODELS.join(", ")
            )));
        }
        Ok(self.config)
    }
}
