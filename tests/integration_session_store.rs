//! Session store behaviour over real storage backends

mod common;

use std::sync::Arc;

use chrono::{Duration, Local};
use serial_test::serial;
use tempfile::TempDir;

use common::{
    local_session_store, remote_file, seed_bare_remote, temp_config_file, RecordingVectorStores,
};
use nebenchat::session::{ChatTurn, HistoryDocument, NoVectorStores, SessionStore};
use nebenchat::storage::{FileStorage, GitStorage};
use nebenchat::{cli::Cli, commands, Config, NebenchatError};

fn turn(now: chrono::DateTime<Local>, message: &str) -> ChatTurn {
    ChatTurn::text(now, "gpt-5", message, format!("re: {message}"), "")
}

#[test]
fn test_turns_within_idle_window_share_one_session() {
    let (store, storage, _tmp) = local_session_store(Arc::new(NoVectorStores));
    let start = Local::now() - Duration::minutes(30);

    let first = store
        .record_turn_at("neben", turn(start, "hello there"), false, start)
        .unwrap();
    let later = start + Duration::minutes(5);
    let second = store
        .record_turn_at("neben", turn(later, "and again"), false, later)
        .unwrap();

    assert_eq!(first.session_id, second.session_id);
    assert_eq!(second.exchanges.len(), 2);
    assert_eq!(second.summary, "hello there");
    assert!(storage.exists("chat_history_neben.json").unwrap());

    let reloaded = store.sessions("neben").unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0].exchanges[1].user_message, "and again");
}

#[test]
fn test_idle_gap_opens_new_session() {
    let (store, _storage, _tmp) = local_session_store(Arc::new(NoVectorStores));
    let start = Local::now() - Duration::hours(2);

    let first = store
        .record_turn_at("neben", turn(start, "morning"), false, start)
        .unwrap();
    let later = start + Duration::minutes(11);
    let second = store
        .record_turn_at("neben", turn(later, "afternoon"), false, later)
        .unwrap();

    assert_ne!(first.session_id, second.session_id);
    let sessions = store.sessions("neben").unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[1].session_id, second.session_id);
}

#[test]
fn test_eviction_keeps_newest_sessions_and_releases_their_stores() {
    let recorder = Arc::new(RecordingVectorStores::default());
    let (store, _storage, _tmp) = local_session_store(recorder.clone());
    let start = Local::now() - Duration::days(1);

    let mut ids = Vec::new();
    for i in 0..12 {
        let now = start + Duration::minutes(i);
        let session = store
            .record_turn_at("neben", turn(now, &format!("S{}", i + 1)), true, now)
            .unwrap();
        if i < 2 {
            store
                .ensure_vector_store("neben", &session.session_id)
                .unwrap();
        }
        ids.push(session.session_id);
    }

    let sessions = store.sessions("neben").unwrap();
    assert_eq!(sessions.len(), 10);
    let kept: Vec<String> = sessions.iter().map(|s| s.session_id.clone()).collect();
    assert_eq!(kept, ids[2..].to_vec());
    assert_eq!(sessions[0].summary, "S3");
    assert_eq!(recorder.released(), vec!["vs-1".to_string(), "vs-2".to_string()]);
}

#[test]
fn test_evicted_session_uploads_are_deleted() {
    let (store, _storage, tmp) = local_session_store(Arc::new(NoVectorStores));
    let start = Local::now() - Duration::days(1);

    let upload = tmp
        .path()
        .join("uploads")
        .join(format!("neben_{}_notes.txt", start.timestamp()));
    std::fs::create_dir_all(upload.parent().unwrap()).unwrap();
    std::fs::write(&upload, "notes").unwrap();

    let first = ChatTurn::with_attachment(start, "gpt-5", "", "notes.txt", "read it", "");
    store.record_turn_at("neben", first, true, start).unwrap();
    assert!(upload.exists());

    for i in 1..=10 {
        let now = start + Duration::minutes(i);
        store
            .record_turn_at("neben", turn(now, "filler"), true, now)
            .unwrap();
    }

    assert!(!upload.exists());
    assert_eq!(store.sessions("neben").unwrap().len(), 10);
}

#[test]
fn test_legacy_document_on_disk_is_upgraded_and_rewritten() {
    let (store, storage, _tmp) = local_session_store(Arc::new(NoVectorStores));
    let legacy = r#"[
        {"timestamp": "2024-03-01T09:00:00", "model": "gpt-4o", "user_message": "first question",
         "ai_response": "first answer", "ai_response_html": "<p>first answer</p>"},
        {"timestamp": "2024-03-01T09:20:00", "model": "gpt-4o", "user_message": "second question",
         "ai_response": "second answer", "ai_response_html": "<p>second answer</p>"}
    ]"#;
    storage.write("chat_history_neben.json", legacy).unwrap();

    let sessions = store.sessions("neben").unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].session_id.starts_with("legacy-"));
    assert_eq!(sessions[0].exchanges.len(), 2);
    assert_eq!(sessions[0].summary, "first question");

    // The next write persists the upgraded shape
    let now = Local::now();
    store
        .record_turn_at("neben", turn(now, "back again"), true, now)
        .unwrap();
    let written = storage.read("chat_history_neben.json").unwrap();
    let document = HistoryDocument::parse(&written).unwrap();
    assert!(!document.is_legacy());
    assert_eq!(document.upgrade().len(), 2);
}

#[test]
fn test_corrupt_document_reads_as_empty_history() {
    let (store, storage, _tmp) = local_session_store(Arc::new(NoVectorStores));
    storage
        .write("chat_history_neben.json", "{not json")
        .unwrap();
    assert!(store.sessions("neben").unwrap().is_empty());
}

#[test]
fn test_revert_and_clear_round_trip() {
    let recorder = Arc::new(RecordingVectorStores::default());
    let (store, storage, _tmp) = local_session_store(recorder.clone());
    let start = Local::now() - Duration::hours(1);

    let first = store
        .record_turn_at("neben", turn(start, "first"), true, start)
        .unwrap();
    store
        .ensure_vector_store("neben", &first.session_id)
        .unwrap();
    let later = start + Duration::minutes(1);
    store
        .record_turn_at("neben", turn(later, "second"), true, later)
        .unwrap();

    let reverted = store.revert("neben", &first.session_id).unwrap();
    let (current, _) = store.current("neben").unwrap();
    assert_eq!(current.unwrap().session_id, reverted.session_id);

    assert!(matches!(
        store.revert("neben", "missing"),
        Err(NebenchatError::SessionNotFound(_))
    ));

    store.clear("neben").unwrap();
    assert!(!storage.exists("chat_history_neben.json").unwrap());
    assert_eq!(recorder.released(), vec!["vs-1".to_string()]);
}

#[test]
fn test_users_are_isolated() {
    let (store, _storage, _tmp) = local_session_store(Arc::new(NoVectorStores));
    let now = Local::now();
    store
        .record_turn_at("alice", turn(now, "from alice"), false, now)
        .unwrap();

    assert!(store.sessions("bob").unwrap().is_empty());
    assert!(matches!(
        store.sessions("../alice"),
        Err(NebenchatError::InvalidPath(_))
    ));
}

#[test]
#[serial]
fn test_open_session_store_from_config_file() {
    let data = TempDir::new().unwrap();
    let yaml = format!(
        "storage:\n  backend: local\n  local_root: {}\n  history_dir: history\nsessions:\n  max_sessions: 2\n",
        data.path().display()
    );
    let (_dir, path) = temp_config_file(&yaml);

    let config = Config::load(path.to_str().unwrap(), &Cli::default()).unwrap();
    config.validate().unwrap();
    let store = commands::open_session_store(&config).unwrap();
    assert_eq!(store.policy().max_sessions, 2);

    let start = Local::now() - Duration::hours(1);
    for i in 0..3 {
        let now = start + Duration::minutes(i);
        store
            .record_turn_at("neben", turn(now, "hi"), true, now)
            .unwrap();
    }

    assert!(data.path().join("history/chat_history_neben.json").exists());
    assert_eq!(store.sessions("neben").unwrap().len(), 2);
}

#[test]
fn test_session_store_over_git_pushes_history() {
    let (remote, url) = seed_bare_remote();
    let scratch = TempDir::new().unwrap();
    let storage: Arc<dyn FileStorage> =
        Arc::new(GitStorage::clone_into(&url, "main", None, scratch.path()).unwrap());
    let store = SessionStore::new(storage, Arc::new(NoVectorStores)).with_history_dir("history");

    let now = Local::now();
    let session = store
        .record_turn_at("neben", turn(now, "stored in git"), false, now)
        .unwrap();

    let pushed = remote_file(remote.path(), "history/chat_history_neben.json")
        .expect("history pushed to remote");
    assert!(pushed.contains(&session.session_id));
    assert!(pushed.contains("stored in git"));
}
