//! Shared helpers for integration tests
//!
//! Sessions are driven by small shell scripts standing in for the Claude
//! CLI. Each script lives in its own temp directory next to the files it
//! writes (`args.txt`, `stdin.log`).

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kodegen_claude_relay::{RelayConfig, SessionEvent};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

/// Upper bound for any single wait in tests
pub const WAIT: Duration = Duration::from_secs(10);

/// Echoes the launch args, announces itself (reusing `--resume` ids) and
/// answers every stdin line with `[text a, tool_use Bash, text b]` plus a
/// result. Exits at stdin EOF.
pub const ECHO_CLI: &str = r#"#!/bin/sh
dir=$(dirname "$0")
printf '%s\n' "$@" > "$dir/args.txt"
SID="cli-$$"
prev=""
for a in "$@"; do
  if [ "$prev" = "--resume" ]; then SID="$a"; fi
  prev="$a"
done
printf '{"type":"system","subtype":"init","session_id":"%s","tools":["Bash"],"model":"sonnet","cwd":"%s"}\n' "$SID" "$PWD"
while IFS= read -r line; do
  printf '%s\n' "$line" >> "$dir/stdin.log"
  printf '{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"a"},{"type":"tool_use","id":"t1","name":"Bash","input":{}},{"type":"text","text":"b"}]}}\n'
  printf '{"type":"result","subtype":"success","session_id":"%s","total_cost_usd":0.01,"duration_ms":5,"num_turns":1,"result":"ab"}\n' "$SID"
done
"#;

/// Ignores SIGTERM so only a forced kill ends it
pub const STUBBORN_CLI: &str = r#"#!/bin/sh
trap '' TERM
printf '{"type":"system","subtype":"init","session_id":"stubborn-1"}\n'
exec sleep 30
"#;

/// Writes one record split across two chunks, a bad line, stderr noise and
/// an ask-user turn, then waits for stdin EOF
pub const CHATTY_CLI: &str = r#"#!/bin/sh
printf '{"type":"system","subtype":"init",'
sleep 0.2
printf '"session_id":"chatty-1"}\n'
printf 'this is not json\n'
printf 'warning: something odd\n' >&2
printf '{"type":"assistant","message":{"content":[{"type":"tool_use","id":"q1","name":"AskUserQuestion","input":{"question":"Which file?"}}]}}\n'
printf '{"type":"system","subtype":"init","session_id":"chatty-2"}\n'
cat > /dev/null
"#;

/// Answers every stdin line with a turn that both says something and asks
/// the user a question, then a result
pub const ASKING_CLI: &str = r#"#!/bin/sh
printf '{"type":"system","subtype":"init","session_id":"asking-1"}\n'
while IFS= read -r line; do
  printf '{"type":"assistant","message":{"content":[{"type":"text","text":"q"},{"type":"tool_use","id":"q1","name":"AskUserQuestion","input":{"question":"Which file?"}}]}}\n'
  printf '{"type":"result","subtype":"success","session_id":"asking-1","cost_usd":null,"duration_ms":3,"num_turns":1}\n'
done
"#;

/// A fake CLI installed in a temp directory
pub struct FakeCli {
    dir: TempDir,
    path: PathBuf,
}

impl FakeCli {
    /// Write `script` to a fresh temp directory and make it executable
    pub fn new(script: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claude");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory usable as a project path
    pub fn project_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Config pointing at this CLI
    pub fn config(&self, max_sessions: usize, stop_grace: Duration) -> RelayConfig {
        RelayConfig::builder()
            .cli_path(&self.path)
            .max_sessions(max_sessions)
            .stop_grace(stop_grace)
            .build()
            .unwrap()
    }

    /// Arguments of the most recent launch
    pub fn args(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("args.txt"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Lines the CLI has read from stdin
    pub fn stdin_log(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("stdin.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Next event from `rx`, failing the test after [`WAIT`]
pub async fn next_event(rx: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Skip events until one satisfies `pred`
pub async fn wait_for<F>(rx: &mut UnboundedReceiver<SessionEvent>, pred: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

/// Poll `cond` until it holds, failing the test after [`WAIT`]
pub async fn eventually<F>(cond: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "condition never held");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
