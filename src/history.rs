//! Read-only view over the Claude CLI's local session history
//!
//! The CLI appends one line per prompt to `~/.claude/history.jsonl` and keeps
//! a transcript per session under `~/.claude/projects/<encoded path>/`. This
//! module lists those sessions and resolves partial ids typed by a user.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{RelayError, Result};
use crate::types::identifiers::SessionId;

const HISTORY_FILE: &str = "history.jsonl";
const PROJECTS_DIR: &str = "projects";

/// How many recent sessions partial ids are matched against
const RESOLVE_WINDOW: usize = 100;

/// One session known to the CLI
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// CLI session id
    pub session_id: SessionId,
    /// Working directory the session ran in
    pub project_path: PathBuf,
    /// `None` when absent or unparseable
    pub timestamp: Option<DateTime<Utc>>,
    /// `"unknown"` when not recorded
    pub model: String,
    /// First prompt or summary text
    pub summary: Option<String>,
}

/// A session id and the directory it ran in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    /// Full session id
    pub session_id: SessionId,
    /// Directory to resume in
    pub project_path: PathBuf,
}

/// Outcome of resolving a user-supplied session id
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The input was a complete id
    Exact(ResolvedSession),
    /// The input was a prefix of exactly one recent session
    Unique(ResolvedSession),
    /// The input was a prefix of several recent sessions, newest first
    Ambiguous(Vec<HistoryEntry>),
    /// No recent session matched
    NotFound,
}

/// History rooted at a Claude config directory
#[derive(Debug, Clone)]
pub struct HistoryStore {
    claude_dir: PathBuf,
}

impl HistoryStore {
    /// Store rooted at `claude_dir` (normally `~/.claude`)
    pub fn new(claude_dir: impl Into<PathBuf>) -> Self {
        Self {
            claude_dir: claude_dir.into(),
        }
    }

    /// Store at `$HOME/.claude`
    ///
    /// # Errors
    /// Returns `RelayError::History` if `HOME` is not set
    pub fn default_location() -> Result<Self> {
        let home = std::env::var_os("HOME")
            .ok_or_else(|| RelayError::history("HOME is not set"))?;
        Ok(Self::new(PathBuf::from(home).join(".claude")))
    }

    /// Most recent sessions from `history.jsonl`, newest first
    ///
    /// The file holds one line per prompt, so entries are deduplicated by
    /// session id keeping the last line seen. Malformed lines are skipped and
    /// a missing file yields an empty list.
    ///
    /// # Errors
    /// Returns `RelayError::History` if the file exists but cannot be read
    pub async fn recent_sessions(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let path = self.claude_dir.join(HISTORY_FILE);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RelayError::history(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let mut latest: HashMap<SessionId, (usize, HistoryEntry)> = HashMap::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(value) = serde_json::from_str::<Value>(line) else {
                log::debug!("Skipping malformed history line {}", line_no + 1);
                continue;
            };
            if let Some(entry) = parse_history_line(&value) {
                latest.insert(entry.session_id.clone(), (line_no, entry));
            }
        }

        let mut entries: Vec<(usize, HistoryEntry)> = latest.into_values().collect();
        // Line order keeps the sort deterministic when timestamps tie
        entries.sort_by_key(|(line_no, _)| *line_no);
        let mut entries: Vec<HistoryEntry> = entries.into_iter().map(|(_, e)| e).collect();
        sort_newest_first(&mut entries);
        entries.truncate(limit);
        Ok(entries)
    }

    /// Sessions recorded for one project directory, newest first
    ///
    /// Each `<session id>.jsonl` transcript contributes one entry built from
    /// its first line. Transcripts that cannot be parsed are still listed
    /// with minimal information.
    ///
    /// # Errors
    /// Returns `RelayError::History` if the project directory exists but
    /// cannot be listed
    pub async fn sessions_for_project(&self, project_path: &Path) -> Result<Vec<HistoryEntry>> {
        let dir = self
            .claude_dir
            .join(PROJECTS_DIR)
            .join(encode_project_path(project_path));

        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RelayError::history(format!(
                    "Failed to list {}: {e}",
                    dir.display()
                )));
            }
        };

        let mut entries = Vec::new();
        while let Some(dirent) = read_dir.next_entry().await? {
            let path = dirent.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let session_id = SessionId::new(stem);

            let first = read_first_line(&path)
                .await
                .and_then(|line| serde_json::from_str::<Value>(&line).ok());

            let entry = match first {
                Some(value) => HistoryEntry {
                    session_id,
                    project_path: project_path.to_path_buf(),
                    timestamp: parse_timestamp(value.get("timestamp").or_else(|| value.get("created_at"))),
                    model: string_field(&value, &["model"]).unwrap_or_else(|| "unknown".to_string()),
                    summary: string_field(&value, &["summary", "query"]),
                },
                None => {
                    log::debug!("Transcript {} unreadable, listing with minimal info", path.display());
                    HistoryEntry {
                        session_id,
                        project_path: project_path.to_path_buf(),
                        timestamp: None,
                        model: "unknown".to_string(),
                        summary: None,
                    }
                }
            };
            entries.push(entry);
        }

        entries.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        sort_newest_first(&mut entries);
        Ok(entries)
    }

    /// Resolve a full or partial session id against recent history
    ///
    /// A full-looking id (contains `-` and is longer than 20 characters)
    /// that history does not know resolves to itself in the current
    /// directory, so sessions from other machines can still be resumed.
    ///
    /// # Errors
    /// Propagates read errors from [`recent_sessions`](Self::recent_sessions)
    pub async fn resolve(&self, partial: &str) -> Result<Resolution> {
        let partial = partial.trim();
        if partial.is_empty() {
            return Ok(Resolution::NotFound);
        }

        let sessions = self.recent_sessions(RESOLVE_WINDOW).await?;

        if let Some(entry) = sessions.iter().find(|s| s.session_id.as_str() == partial) {
            return Ok(Resolution::Exact(ResolvedSession {
                session_id: entry.session_id.clone(),
                project_path: entry.project_path.clone(),
            }));
        }

        if partial.contains('-') && partial.len() > 20 {
            let cwd = std::env::current_dir()?;
            return Ok(Resolution::Exact(ResolvedSession {
                session_id: SessionId::new(partial),
                project_path: cwd,
            }));
        }

        let mut matches: Vec<HistoryEntry> = sessions
            .into_iter()
            .filter(|s| s.session_id.as_str().starts_with(partial))
            .collect();

        Ok(match matches.len() {
            0 => Resolution::NotFound,
            1 => {
                let entry = matches.remove(0);
                Resolution::Unique(ResolvedSession {
                    session_id: entry.session_id,
                    project_path: entry.project_path,
                })
            }
            _ => Resolution::Ambiguous(matches),
        })
    }
}

/// Directory name the CLI uses for a project path
/// First line of a transcript without loading the rest of it
async fn read_first_line(path: &Path) -> Option<String> {
    let file = tokio::fs::File::open(path).await.ok()?;
    BufReader::new(file).lines().next_line().await.ok().flatten()
}

fn encode_project_path(project_path: &Path) -> String {
    let encoded = project_path.to_string_lossy().replace('/', "-");
    encoded.strip_prefix('-').unwrap_or(&encoded).to_string()
}

fn parse_history_line(value: &Value) -> Option<HistoryEntry> {
    let session_id = string_field(value, &["sessionId", "session_id"])?;
    if session_id.is_empty() {
        return None;
    }
    Some(HistoryEntry {
        session_id: SessionId::new(session_id),
        project_path: PathBuf::from(
            string_field(value, &["project", "project_path", "projectPath", "cwd"])
                .unwrap_or_default(),
        ),
        timestamp: parse_timestamp(value.get("timestamp").or_else(|| value.get("created_at"))),
        model: string_field(value, &["model"]).unwrap_or_else(|| "unknown".to_string()),
        summary: string_field(value, &["display", "summary", "query"]),
    })
}

/// First present field among `keys`, with numbers rendered as strings
fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Epoch milliseconds or an RFC 3339 string
fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        _ => None,
    }
}

/// Stable sort, entries without a timestamp last
fn sort_newest_first(entries: &mut [HistoryEntry]) {
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}
