//! Tests for `AgentSession`
//!
//! Lifecycle, event dispatch and termination against fake CLI scripts

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{ASKING_CLI, CHATTY_CLI, ECHO_CLI, FakeCli, STUBBORN_CLI, init_logging, next_event, wait_for};
use kodegen_claude_relay::{
    AgentSession, ErrorKind, EventKind, PermissionMode, SessionEvent, SessionOptions,
    SessionStatus, TenantId,
};
use tokio_test::{assert_err, assert_ok};

const TENANT: TenantId = TenantId::new(7);
const GRACE: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_turn_emits_response_then_result() {
    init_logging();
    let cli = FakeCli::new(ECHO_CLI);
    let session = AgentSession::new(
        TENANT,
        SessionOptions::new(cli.project_dir()),
        &cli.config(5, GRACE),
    );
    let mut rx = session.subscribe(&EventKind::ALL);
    assert_eq!(session.status(), SessionStatus::Starting);

    assert_ok!(session.start());
    assert_eq!(session.status(), SessionStatus::Ready);

    let SessionEvent::SystemInit(init) = next_event(&mut rx).await else {
        panic!("expected system-init first");
    };
    assert!(init.session_id.as_str().starts_with("cli-"));
    assert_eq!(session.id(), init.session_id);
    assert_ne!(session.provisional_id(), &init.session_id);

    assert_ok!(session.send("hello"));
    assert_eq!(session.status(), SessionStatus::Busy);

    let SessionEvent::Response { text, .. } = next_event(&mut rx).await else {
        panic!("expected response");
    };
    assert_eq!(text, "ab");
    assert!(matches!(next_event(&mut rx).await, SessionEvent::Result(_)));
    assert_eq!(session.status(), SessionStatus::Ready);

    let logged = cli.stdin_log();
    assert_eq!(logged.len(), 1);
    let sent: serde_json::Value = serde_json::from_str(&logged[0]).unwrap();
    assert_eq!(sent["type"], "user");
    assert_eq!(sent["message"]["content"], "hello");

    session.stop();
    wait_for(&mut rx, |e| e.kind() == EventKind::Exit).await;
    assert_eq!(session.status(), SessionStatus::Stopped);
    assert_eq!(session.forced_terminations(), 0);
}

#[tokio::test]
async fn test_launch_arguments() {
    init_logging();
    let cli = FakeCli::new(ECHO_CLI);
    let options = SessionOptions::builder(cli.project_dir())
        .model("opus")
        .permission_mode(PermissionMode::Plan)
        .resume("prior-session")
        .build();
    let session = AgentSession::new(TENANT, options, &cli.config(5, GRACE));
    let mut rx = session.subscribe(&[EventKind::SystemInit]);
    assert_ok!(session.start());

    let SessionEvent::SystemInit(init) = next_event(&mut rx).await else {
        unreachable!();
    };
    assert_eq!(init.session_id.as_str(), "prior-session");
    assert!(session.is_resumed());
    assert_eq!(session.provisional_id().as_str(), "prior-session");

    let args = cli.args();
    assert_eq!(
        args,
        vec![
            "-p",
            "--input-format",
            "stream-json",
            "--output-format",
            "stream-json",
            "--verbose",
            "--resume",
            "prior-session",
            "--model",
            "opus",
            "--permission-mode",
            "plan",
        ]
    );
    session.stop();
}

#[tokio::test]
async fn test_defaults_come_from_config() {
    init_logging();
    let cli = FakeCli::new(ECHO_CLI);
    let session = AgentSession::new(
        TENANT,
        SessionOptions::new(cli.project_dir()),
        &cli.config(5, GRACE),
    );
    let info = session.info();
    assert_eq!(info.model, "sonnet");
    assert_eq!(info.permission_mode, PermissionMode::SkipPermissions);
    assert_eq!(info.tenant_id, TENANT);
    assert!(!info.is_resumed);
}

#[tokio::test]
async fn test_split_record_bad_line_and_attention() {
    init_logging();
    let cli = FakeCli::new(CHATTY_CLI);
    let session = AgentSession::new(
        TENANT,
        SessionOptions::new(cli.project_dir()),
        &cli.config(5, GRACE),
    );
    let mut rx = session.subscribe(&EventKind::ALL);
    assert_ok!(session.start());

    let mut inits = Vec::new();
    let mut protocol_errors = 0;
    let mut stderr_errors = 0;
    loop {
        match next_event(&mut rx).await {
            SessionEvent::SystemInit(init) => inits.push(init.session_id),
            SessionEvent::Error(err) => match err.kind() {
                ErrorKind::Protocol => {
                    assert_eq!(err.raw_line(), Some("this is not json"));
                    protocol_errors += 1;
                }
                ErrorKind::Process => {
                    assert!(err.to_string().contains("something odd"));
                    stderr_errors += 1;
                }
                other => panic!("unexpected error kind {other:?}"),
            },
            SessionEvent::AttentionNeeded(_) => break,
            SessionEvent::Response { .. } => panic!("no text blocks were sent"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(inits.len(), 1);
    assert_eq!(inits[0].as_str(), "chatty-1");
    assert_eq!(protocol_errors, 1);
    assert!(stderr_errors <= 1);

    // The repeated init is ignored and errors never end the session
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(session.id().as_str(), "chatty-1");
    assert_ne!(session.status(), SessionStatus::Stopped);

    session.stop();
    wait_for(&mut rx, |e| e.kind() == EventKind::Exit).await;
}

#[tokio::test]
async fn test_text_and_question_in_one_turn() {
    init_logging();
    let cli = FakeCli::new(ASKING_CLI);
    let session = AgentSession::new(
        TENANT,
        SessionOptions::new(cli.project_dir()),
        &cli.config(5, GRACE),
    );
    let mut rx = session.subscribe(&EventKind::ALL);
    assert_ok!(session.start());
    assert!(matches!(next_event(&mut rx).await, SessionEvent::SystemInit(_)));

    assert_ok!(session.send("which one?"));
    let mut responses = Vec::new();
    let mut questions = 0;
    loop {
        match next_event(&mut rx).await {
            SessionEvent::Response { text, .. } => responses.push(text),
            SessionEvent::AttentionNeeded(turn) => {
                assert!(turn.needs_attention());
                questions += 1;
            }
            SessionEvent::Result(_) => break,
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(responses, vec!["q".to_string()]);
    assert_eq!(questions, 1);
    assert_eq!(session.status(), SessionStatus::Ready);

    session.stop();
    wait_for(&mut rx, |e| e.kind() == EventKind::Exit).await;
}

#[tokio::test]
async fn test_dropped_subscriptions_are_released() {
    init_logging();
    let cli = FakeCli::new(ECHO_CLI);
    let session = AgentSession::new(
        TENANT,
        SessionOptions::new(cli.project_dir()),
        &cli.config(5, GRACE),
    );
    let mut results = session.subscribe(&[EventKind::Result]);
    let dropped = session.subscribe(&[EventKind::Response, EventKind::Result]);
    assert_eq!(session.observer_count(), 3);
    drop(dropped);

    assert_ok!(session.start());
    assert_ok!(session.send("hello"));
    assert!(matches!(next_event(&mut results).await, SessionEvent::Result(_)));
    assert_eq!(session.observer_count(), 1);

    session.stop();
}

#[tokio::test]
async fn test_send_after_stop_is_rejected() {
    init_logging();
    let cli = FakeCli::new(ECHO_CLI);
    let session = AgentSession::new(
        TENANT,
        SessionOptions::new(cli.project_dir()),
        &cli.config(5, GRACE),
    );

    let err = assert_err!(session.send("too early"));
    assert_eq!(err.kind(), ErrorKind::InactiveSession);

    let mut rx = session.subscribe(&[EventKind::Exit]);
    assert_ok!(session.start());
    session.stop();
    session.stop();

    let err = assert_err!(session.send("too late"));
    assert_eq!(err.kind(), ErrorKind::InactiveSession);

    next_event(&mut rx).await;
    assert_eq!(session.status(), SessionStatus::Stopped);
    assert_eq!(session.forced_terminations(), 0);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    init_logging();
    let cli = FakeCli::new(ECHO_CLI);
    let session = AgentSession::new(
        TENANT,
        SessionOptions::new(cli.project_dir()),
        &cli.config(5, GRACE),
    );
    assert_ok!(session.start());
    let err = assert_err!(session.start());
    assert_eq!(err.kind(), ErrorKind::Process);
    session.stop();
}

#[tokio::test]
async fn test_missing_working_directory() {
    init_logging();
    let cli = FakeCli::new(ECHO_CLI);
    let missing = cli.project_dir().join("does-not-exist");
    let session = AgentSession::new(TENANT, SessionOptions::new(&missing), &cli.config(5, GRACE));
    let mut rx = session.subscribe(&[EventKind::Error]);

    let err = assert_err!(session.start());
    assert_eq!(err.kind(), ErrorKind::Process);
    assert!(err.to_string().contains("Working directory does not exist"));
    assert_eq!(session.status(), SessionStatus::Error);
    assert!(matches!(next_event(&mut rx).await, SessionEvent::Error(_)));
}

#[tokio::test]
async fn test_missing_cli_binary() {
    init_logging();
    let cli = FakeCli::new(ECHO_CLI);
    let config = kodegen_claude_relay::RelayConfig::builder()
        .cli_path(cli.project_dir().join("no-such-claude"))
        .build()
        .unwrap();
    let session = AgentSession::new(TENANT, SessionOptions::new(cli.project_dir()), &config);

    let err = assert_err!(session.start());
    assert!(err.to_string().contains("Failed to start Claude Code"));
}

#[tokio::test]
async fn test_stubborn_process_is_killed_once() {
    init_logging();
    let cli = FakeCli::new(STUBBORN_CLI);
    let session = AgentSession::new(
        TENANT,
        SessionOptions::new(cli.project_dir()),
        &cli.config(5, Duration::from_millis(300)),
    );
    let mut rx = session.subscribe(&[EventKind::SystemInit, EventKind::Exit]);
    assert_ok!(session.start());

    // The trap must be installed before we signal
    assert!(matches!(next_event(&mut rx).await, SessionEvent::SystemInit(_)));

    session.stop();
    session.stop();
    let SessionEvent::Exit(code) = next_event(&mut rx).await else {
        panic!("expected exit");
    };
    assert_eq!(code, None);
    assert_eq!(session.forced_terminations(), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(session.forced_terminations(), 1);
}

#[tokio::test]
async fn test_handlers_can_be_removed() {
    init_logging();
    let cli = FakeCli::new(ECHO_CLI);
    let session = AgentSession::new(
        TENANT,
        SessionOptions::new(cli.project_dir()),
        &cli.config(5, GRACE),
    );

    let responses = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&responses);
    let id = session.on(EventKind::Response, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let mut rx = session.subscribe(&[EventKind::Result, EventKind::Exit]);

    assert_ok!(session.start());
    assert_ok!(session.send("one"));
    assert!(matches!(next_event(&mut rx).await, SessionEvent::Result(_)));
    assert_eq!(responses.load(Ordering::SeqCst), 1);

    assert!(session.off(id));
    assert!(!session.off(id));
    assert_ok!(session.send("two"));
    assert!(matches!(next_event(&mut rx).await, SessionEvent::Result(_)));
    assert_eq!(responses.load(Ordering::SeqCst), 1);

    session.stop();
    next_event(&mut rx).await;
}
