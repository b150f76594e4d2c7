//! CLI command building for agent sessions

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::types::identifiers::SessionId;
use crate::types::options::PermissionMode;

/// Resolved launch parameters for one CLI process
#[derive(Debug, Clone)]
pub(crate) struct LaunchSpec {
    pub project_path: PathBuf,
    pub model: String,
    pub permission_mode: PermissionMode,
    pub resume: Option<SessionId>,
}

/// Command builder for the Claude CLI
pub(crate) struct CommandBuilder<'a> {
    cli_path: &'a Path,
    launch: &'a LaunchSpec,
}

impl<'a> CommandBuilder<'a> {
    pub(crate) fn new(cli_path: &'a Path, launch: &'a LaunchSpec) -> Self {
        Self { cli_path, launch }
    }

    /// Arguments in launch order
    pub(crate) fn args(&self) -> Vec<String> {
        // Streaming records in both directions
        let mut args: Vec<String> = [
            "-p",
            "--input-format",
            "stream-json",
            "--output-format",
            "stream-json",
            "--verbose",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect();

        if let Some(ref session_id) = self.launch.resume {
            args.push("--resume".to_string());
            args.push(session_id.as_str().to_string());
        }

        if !self.launch.model.is_empty() {
            args.push("--model".to_string());
            args.push(self.launch.model.clone());
        }

        match self.launch.permission_mode {
            PermissionMode::SkipPermissions => {
                args.push("--dangerously-skip-permissions".to_string());
            }
            mode => {
                args.push("--permission-mode".to_string());
                args.push(mode.as_str().to_string());
            }
        }

        args
    }

    /// Build the complete command with piped stdio
    pub(crate) fn build(&self) -> Command {
        let mut cmd = Command::new(self.cli_path);
        cmd.args(self.args())
            .current_dir(&self.launch.project_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // Piped rather than inherited so the child never touches our terminal
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}
