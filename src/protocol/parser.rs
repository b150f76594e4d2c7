//! Line parser for Claude Code `stream-json` output

use serde_json::Value;

use crate::error::{RelayError, Result};
use crate::types::records::{AssistantTurn, ProtocolRecord, SystemInit, TurnResult, UserTurn};

/// Maximum number of characters of a bad line quoted in the error message
const PREVIEW_CHARS: usize = 100;

/// Decode one line of CLI output into a typed record
///
/// Blank lines and records with a `type` this crate does not handle, including
/// a `type` that is not a string, decode to `Ok(None)`, so newer CLI versions can add record kinds without breaking
/// existing sessions.
///
/// # Errors
/// Returns `RelayError::Protocol` carrying the trimmed line when it is not
/// JSON, has no `type` tag, is a `system` record with a subtype other than
/// `init`, is an `assistant` record without a `message` object, or is a known
/// record whose fields do not match.
pub fn decode(line: &str) -> Result<Option<ProtocolRecord>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(trimmed).map_err(|_| {
        RelayError::protocol(format!("Invalid JSON: {}", preview(trimmed)), trimmed)
    })?;

    let Some(kind) = value.get("type") else {
        return Err(RelayError::protocol("Missing 'type' field", trimmed));
    };
    let Some(kind) = kind.as_str().map(str::to_owned) else {
        log::trace!("Ignoring stream-json record with non-string type {kind}");
        return Ok(None);
    };

    match kind.as_str() {
        "system" => decode_system_init(value, trimmed).map(Some),
        "assistant" => decode_assistant(value, trimmed).map(Some),
        "result" => decode_result(value, trimmed).map(Some),
        other => {
            log::trace!("Ignoring stream-json record of type '{other}'");
            Ok(None)
        }
    }
}

fn decode_system_init(value: Value, raw: &str) -> Result<ProtocolRecord> {
    let subtype = value.get("subtype").and_then(Value::as_str).unwrap_or("");
    if subtype != "init" {
        return Err(RelayError::protocol(
            format!("Unknown system subtype: {subtype}"),
            raw,
        ));
    }

    serde_json::from_value::<SystemInit>(value)
        .map(ProtocolRecord::SystemInit)
        .map_err(|e| RelayError::protocol(format!("Invalid system init: {e}"), raw))
}

fn decode_assistant(value: Value, raw: &str) -> Result<ProtocolRecord> {
    if !value.get("message").is_some_and(Value::is_object) {
        return Err(RelayError::protocol(
            "Missing 'message' field in assistant event",
            raw,
        ));
    }

    serde_json::from_value::<AssistantTurn>(value)
        .map(ProtocolRecord::Assistant)
        .map_err(|e| RelayError::protocol(format!("Invalid assistant message: {e}"), raw))
}

fn decode_result(value: Value, raw: &str) -> Result<ProtocolRecord> {
    serde_json::from_value::<TurnResult>(value)
        .map(ProtocolRecord::Result)
        .map_err(|e| RelayError::protocol(format!("Invalid result message: {e}"), raw))
}

/// Serialize a record for the CLI's stdin, newline-terminated
///
/// # Errors
/// Returns `RelayError::Json` if serialization fails
pub fn encode_record(turn: &UserTurn) -> Result<String> {
    let mut line = serde_json::to_string(turn)?;
    line.push('\n');
    Ok(line)
}

/// Encode outbound user text as one `stream-json` line
///
/// # Errors
/// Returns `RelayError::Json` if serialization fails
pub fn encode_user_turn(text: &str) -> Result<String> {
    encode_record(&UserTurn::new(text))
}

fn preview(line: &str) -> String {
    line.chars().take(PREVIEW_CHARS).collect()
}
