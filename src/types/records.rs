//! Protocol record type definitions
//!
//! Typed forms of the `stream-json` lines the Claude Code CLI writes to
//! stdout, plus the single outbound user-turn record written to its stdin.

use serde::{Deserialize, Serialize};

use super::identifiers::{SessionId, ToolName};

/// Tool the CLI invokes when it needs an answer from the human
pub const ASK_USER_TOOL: &str = "AskUserQuestion";

// ============================================================================
// Inbound Records
// ============================================================================

/// `{"type":"system","subtype":"init",...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInit {
    /// Session id assigned by the CLI
    pub session_id: SessionId,
    /// Tools available to the agent
    #[serde(default)]
    pub tools: Vec<ToolName>,
    /// Model name
    #[serde(default)]
    pub model: String,
    /// Working directory of the CLI
    #[serde(default)]
    pub cwd: String,
}

/// Content block types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content block
    Text {
        /// Text content
        text: String,
    },
    /// Tool use request
    ToolUse {
        /// Tool use ID
        #[serde(default)]
        id: String,
        /// Tool name
        #[serde(alias = "tool_name")]
        name: ToolName,
        /// Tool input parameters
        #[serde(default, alias = "tool_input")]
        input: serde_json::Value,
    },
    /// Tool execution result
    ToolResult {
        /// ID of the tool use this is a result for
        #[serde(default)]
        tool_use_id: String,
        /// Result content
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<serde_json::Value>,
        /// Whether this is an error result
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// Block type this crate does not know about (thinking, images, ...)
    #[serde(other)]
    Unknown,
}

/// Assistant message payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Message id
    #[serde(default)]
    pub id: String,
    /// Model that generated the message
    #[serde(default)]
    pub model: String,
    /// Ordered content blocks
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    /// Why generation stopped
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// `{"type":"assistant","message":{...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantTurn {
    /// Message payload
    pub message: AssistantMessage,
    /// Session ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl AssistantTurn {
    /// Concatenation of all text blocks in order, or `None` if there are none
    #[must_use]
    pub fn text(&self) -> Option<String> {
        let mut found = false;
        let mut out = String::new();
        for block in &self.message.content {
            if let ContentBlock::Text { text } = block {
                found = true;
                out.push_str(text);
            }
        }
        found.then_some(out)
    }

    /// Whether the turn invokes the ask-user tool
    #[must_use]
    pub fn needs_attention(&self) -> bool {
        self.message.content.iter().any(|block| {
            matches!(block, ContentBlock::ToolUse { name, .. } if name.as_str() == ASK_USER_TOOL)
        })
    }
}

/// Final outcome of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOutcome {
    /// Turn completed
    Success,
    /// Turn failed
    Error,
}

/// `{"type":"result",...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTurnResult")]
pub struct TurnResult {
    /// Outcome of the turn
    #[serde(rename = "subtype")]
    pub outcome: ResultOutcome,
    /// Session ID
    pub session_id: Option<SessionId>,
    /// Total cost in USD
    pub cost_usd: f64,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// API call duration in milliseconds
    pub duration_api_ms: u64,
    /// Number of conversation turns
    pub num_turns: u32,
    /// Result text
    pub result: Option<String>,
    /// Error text
    pub error: Option<String>,
}

/// Wire shape of a result record before the outcome is derived
///
/// Every field is optional and `null` reads as absent, so a result record
/// always completes the turn.
#[derive(Deserialize)]
struct RawTurnResult {
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    is_error: Option<bool>,
    #[serde(default)]
    session_id: Option<SessionId>,
    #[serde(default)]
    cost_usd: Option<f64>,
    #[serde(default)]
    total_cost_usd: Option<f64>,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    duration_api_ms: Option<u64>,
    #[serde(default)]
    num_turns: Option<u32>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl From<RawTurnResult> for TurnResult {
    fn from(raw: RawTurnResult) -> Self {
        let failed = raw.is_error.unwrap_or(false)
            || raw.subtype.as_deref().is_some_and(|s| s.starts_with("error"));
        Self {
            outcome: if failed {
                ResultOutcome::Error
            } else {
                ResultOutcome::Success
            },
            session_id: raw.session_id,
            cost_usd: raw.cost_usd.or(raw.total_cost_usd).unwrap_or(0.0),
            duration_ms: raw.duration_ms.unwrap_or(0),
            duration_api_ms: raw.duration_api_ms.unwrap_or(0),
            num_turns: raw.num_turns.unwrap_or(0),
            result: raw.result,
            error: raw.error,
        }
    }
}

/// One decoded line of CLI output
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolRecord {
    /// Session announcement
    SystemInit(SystemInit),
    /// Assistant reply
    Assistant(AssistantTurn),
    /// End-of-turn summary
    Result(TurnResult),
}

// ============================================================================
// Outbound Records
// ============================================================================

/// User message content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessageContent {
    /// Message role (always "user")
    pub role: String,
    /// Message text
    pub content: String,
}

/// `{"type":"user","message":{"role":"user","content":...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "user")]
pub struct UserTurn {
    /// Message content
    pub message: UserMessageContent,
}

impl UserTurn {
    /// Build a user turn carrying `text`
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            message: UserMessageContent {
                role: "user".to_string(),
                content: text.into(),
            },
        }
    }
}
