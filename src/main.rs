// Console front-end for the Claude session relay
//
// Reads commands and prompts from stdin for a single local tenant and prints
// session events to stdout. Configuration comes from the environment.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use kodegen_claude_relay::{
    AgentSession, EventKind, HistoryStore, RelayConfig, Resolution, SessionEvent, SessionId,
    SessionOptions, SessionRegistry, TenantId,
};

const CONSOLE_TENANT: TenantId = TenantId::new(0);

const HELP: &str = "\
Commands:
  /new [path]       start a session (default: current directory)
  /resume <id>      resume a session by full or partial id
  /switch <id>      make another running session active
  /stop [id]        stop a session (default: the active one)
  /list             list running sessions
  /history [n]      list recent sessions from CLI history
  /status           show the active session
  /quit             stop everything and exit
Anything else is sent to the active session.";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RelayConfig::from_env().context("Failed to load configuration")?;
    log::info!(
        "Relay v{} using {} (max {} sessions)",
        kodegen_claude_relay::VERSION,
        config.cli_path.display(),
        config.max_sessions
    );

    let registry = SessionRegistry::new(config);
    let history = HistoryStore::default_location()?;

    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match handle_line(&registry, &history, line.trim()).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("Error: {e:#}"),
                }
            }
        }
    }

    registry.stop_all_and_clear();
    Ok(())
}

/// Run one console line; `Ok(false)` means quit
async fn handle_line(registry: &SessionRegistry, history: &HistoryStore, line: &str) -> Result<bool> {
    if line.is_empty() {
        return Ok(true);
    }
    let (command, arg) = match line.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };

    match command {
        "/new" => {
            let path = if arg.is_empty() {
                std::env::current_dir()?
            } else {
                PathBuf::from(arg)
            };
            let session = registry.create(CONSOLE_TENANT, SessionOptions::new(path))?;
            print_events(&session);
            println!("Started {}", session.id());
        }
        "/resume" => {
            let (session_id, path) = match history.resolve(arg).await? {
                Resolution::Exact(found) | Resolution::Unique(found) => {
                    (found.session_id, found.project_path)
                }
                Resolution::Ambiguous(candidates) => {
                    println!("\"{arg}\" matches several sessions:");
                    for entry in candidates {
                        println!("  {}  {}", entry.session_id, entry.project_path.display());
                    }
                    return Ok(true);
                }
                Resolution::NotFound => {
                    println!("No session matching \"{arg}\"");
                    return Ok(true);
                }
            };
            let session = registry.resume(CONSOLE_TENANT, session_id, path)?;
            print_events(&session);
            println!("Resumed {}", session.id());
        }
        "/switch" => {
            registry.switch(CONSOLE_TENANT, &SessionId::new(arg))?;
            println!("Switched to {arg}");
        }
        "/stop" => {
            let id = if arg.is_empty() {
                registry
                    .get_active(CONSOLE_TENANT)
                    .map(|s| s.id())
                    .context("No active session")?
            } else {
                SessionId::new(arg)
            };
            registry.stop(&id)?;
            println!("Stopping {id}");
        }
        "/list" => {
            let sessions = registry.list_active();
            if sessions.is_empty() {
                println!("No running sessions");
            }
            for info in sessions {
                println!(
                    "  {}  {}  {}  {}",
                    info.session_id,
                    info.status,
                    info.model,
                    info.project_path.display()
                );
            }
        }
        "/history" => {
            let limit = if arg.is_empty() { 10 } else { arg.parse().context("Invalid count")? };
            for entry in history.recent_sessions(limit).await? {
                let when = entry
                    .timestamp
                    .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "  {}  {:16}  {}  {}",
                    entry.session_id,
                    when,
                    entry.project_path.display(),
                    entry.summary.unwrap_or_default()
                );
            }
        }
        "/status" => match registry.get_active(CONSOLE_TENANT) {
            Some(session) => {
                let info = session.info();
                println!(
                    "{} [{}] {} in {} ({}/{} sessions)",
                    info.session_id,
                    info.status,
                    info.model,
                    info.project_path.display(),
                    registry.len(),
                    registry.max_sessions()
                );
            }
            None => println!("No active session"),
        },
        "/quit" | "/exit" => return Ok(false),
        "/help" => println!("{HELP}"),
        _ if command.starts_with('/') => println!("Unknown command {command}. Try /help"),
        _ => registry.send(CONSOLE_TENANT, line)?,
    }
    Ok(true)
}

/// Print a session's events as they arrive
fn print_events(session: &AgentSession) {
    let id = session.provisional_id().clone();
    session.on(EventKind::Response, |event| {
        if let SessionEvent::Response { text, .. } = event {
            println!("{text}");
        }
    });
    session.on(EventKind::AttentionNeeded, |_| {
        println!("[Claude is asking a question]");
    });
    session.on(EventKind::Result, |event| {
        if let SessionEvent::Result(result) = event {
            log::debug!("Turn finished ({:?}, ${:.4})", result.outcome, result.cost_usd);
        }
    });
    session.on(EventKind::Error, |event| {
        if let SessionEvent::Error(err) = event {
            println!("[error] {err}");
        }
    });
    session.on(EventKind::Exit, move |event| {
        if let SessionEvent::Exit(code) = event {
            println!("[{id} exited with {code:?}]");
        }
    });
}
