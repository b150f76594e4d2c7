//! Tests for `HistoryStore`
//!
//! Reading `history.jsonl`, project transcripts and partial-id resolution

use std::fs;
use std::path::{Path, PathBuf};

use kodegen_claude_relay::{HistoryStore, Resolution};
use tempfile::TempDir;

fn store_with_history(lines: &[&str]) -> (TempDir, HistoryStore) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("history.jsonl"), lines.join("\n")).unwrap();
    let store = HistoryStore::new(dir.path());
    (dir, store)
}

#[tokio::test]
async fn test_recent_sessions_sorted_newest_first() {
    let (_dir, store) = store_with_history(&[
        r#"{"session_id":"s1","project_path":"/proj1","timestamp":"2025-01-10T10:00:00Z","model":"sonnet"}"#,
        r#"{"session_id":"s2","project_path":"/proj2","timestamp":"2025-01-20T10:00:00Z","model":"opus"}"#,
        r#"{"session_id":"s3","project_path":"/proj3","timestamp":"2025-01-15T10:00:00Z","model":"haiku"}"#,
    ]);

    let sessions = store.recent_sessions(20).await.unwrap();
    let ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
    assert_eq!(ids, vec!["s2", "s3", "s1"]);
    assert_eq!(sessions[0].project_path, PathBuf::from("/proj2"));
    assert_eq!(sessions[0].model, "opus");

    let limited = store.recent_sessions(2).await.unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[1].session_id.as_str(), "s3");
}

#[tokio::test]
async fn test_malformed_lines_are_skipped() {
    let (_dir, store) = store_with_history(&[
        r#"{"session_id":"good","project":"/p","timestamp":1736935200000}"#,
        "{not json",
        r#"["an","array"]"#,
        "",
        r#"{"display":"no id here"}"#,
    ]);

    let sessions = store.recent_sessions(20).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id.as_str(), "good");
    assert_eq!(sessions[0].model, "unknown");
    assert!(sessions[0].timestamp.is_some());
}

#[tokio::test]
async fn test_duplicate_ids_keep_latest_line() {
    let (_dir, store) = store_with_history(&[
        r#"{"sessionId":"dup","cwd":"/a","timestamp":1000,"display":"first prompt"}"#,
        r#"{"sessionId":"other","cwd":"/b","timestamp":1500}"#,
        r#"{"sessionId":"dup","cwd":"/a","timestamp":2000,"display":"second prompt"}"#,
    ]);

    let sessions = store.recent_sessions(20).await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].session_id.as_str(), "dup");
    assert_eq!(sessions[0].summary.as_deref(), Some("second prompt"));
}

#[tokio::test]
async fn test_missing_history_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::new(dir.path());
    assert!(store.recent_sessions(20).await.unwrap().is_empty());
    assert!(store.sessions_for_project(Path::new("/nowhere")).await.unwrap().is_empty());
    assert_eq!(store.resolve("abc").await.unwrap(), Resolution::NotFound);
}

#[tokio::test]
async fn test_sessions_for_project() {
    let dir = tempfile::tempdir().unwrap();
    let project_dir = dir.path().join("projects").join("home-user-myproject");
    fs::create_dir_all(&project_dir).unwrap();
    fs::write(
        project_dir.join("sess-old.jsonl"),
        "{\"timestamp\":\"2025-01-01T00:00:00Z\",\"model\":\"haiku\",\"summary\":\"old\"}\n{}\n",
    )
    .unwrap();
    fs::write(
        project_dir.join("sess-new.jsonl"),
        "{\"timestamp\":\"2025-02-01T00:00:00Z\",\"model\":\"opus\"}\n",
    )
    .unwrap();
    fs::write(project_dir.join("sess-broken.jsonl"), "garbage").unwrap();
    fs::write(project_dir.join("notes.txt"), "ignored").unwrap();

    let store = HistoryStore::new(dir.path());
    let sessions = store
        .sessions_for_project(Path::new("/home/user/myproject"))
        .await
        .unwrap();

    let ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
    assert_eq!(ids, vec!["sess-new", "sess-old", "sess-broken"]);
    assert_eq!(sessions[1].summary.as_deref(), Some("old"));
    assert_eq!(sessions[2].model, "unknown");
    assert!(sessions[2].timestamp.is_none());
    assert_eq!(sessions[0].project_path, PathBuf::from("/home/user/myproject"));
}

#[tokio::test]
async fn test_only_first_transcript_line_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let project_dir = dir.path().join("projects").join("srv-app");
    fs::create_dir_all(&project_dir).unwrap();

    let mut transcript = b"{\"model\":\"opus\",\"summary\":\"first\"}\n".to_vec();
    transcript.extend_from_slice(&[0xff, 0xfe, b'\n']);
    transcript.extend(std::iter::repeat_n(b'x', 64 * 1024));
    fs::write(project_dir.join("long-session.jsonl"), transcript).unwrap();

    let store = HistoryStore::new(dir.path());
    let sessions = store.sessions_for_project(Path::new("/srv/app")).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].model, "opus");
    assert_eq!(sessions[0].summary.as_deref(), Some("first"));
}

#[tokio::test]
async fn test_resolve_partial_ids() {
    let (_dir, store) = store_with_history(&[
        r#"{"session_id":"abc12345-0000-0000-0000-000000000001","project":"/one","timestamp":1000}"#,
        r#"{"session_id":"abd99999-0000-0000-0000-000000000002","project":"/two","timestamp":2000}"#,
        r#"{"session_id":"xyz00000-0000-0000-0000-000000000003","project":"/three","timestamp":3000}"#,
    ]);

    let Resolution::Unique(found) = store.resolve("xyz").await.unwrap() else {
        panic!("expected a unique match");
    };
    assert_eq!(found.session_id.as_str(), "xyz00000-0000-0000-0000-000000000003");
    assert_eq!(found.project_path, PathBuf::from("/three"));

    let Resolution::Ambiguous(candidates) = store.resolve("ab").await.unwrap() else {
        panic!("expected an ambiguous match");
    };
    let ids: Vec<&str> = candidates.iter().map(|c| c.session_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "abd99999-0000-0000-0000-000000000002",
            "abc12345-0000-0000-0000-000000000001"
        ]
    );

    assert_eq!(store.resolve("zzz").await.unwrap(), Resolution::NotFound);
    assert_eq!(store.resolve("  ").await.unwrap(), Resolution::NotFound);
}

#[tokio::test]
async fn test_resolve_full_ids() {
    let (_dir, store) = store_with_history(&[
        r#"{"session_id":"abc12345-0000-0000-0000-000000000001","project":"/one","timestamp":1000}"#,
    ]);

    let Resolution::Exact(found) = store
        .resolve("abc12345-0000-0000-0000-000000000001")
        .await
        .unwrap()
    else {
        panic!("expected an exact match");
    };
    assert_eq!(found.project_path, PathBuf::from("/one"));

    // Unknown but complete-looking ids resolve to the current directory
    let Resolution::Exact(found) = store
        .resolve("ffffffff-1111-2222-3333-444444444444")
        .await
        .unwrap()
    else {
        panic!("expected an exact match");
    };
    assert_eq!(found.session_id.as_str(), "ffffffff-1111-2222-3333-444444444444");
    assert_eq!(found.project_path, std::env::current_dir().unwrap());
}
