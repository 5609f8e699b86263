//! Integration test: load, reload and reopen semantics.
//!
//! Validates that:
//! - A completed load flips `is_empty` / `has_data` and survives reopen
//! - Reloading the same (url, eTag) pair is a byte-for-byte no-op
//! - Reloading a new dataset replaces, never merges
//! - A failed load (bad input or constraint violation) leaves the
//!   previous dataset fully intact
//! - Damaged store directories fail `open` with the right error

use emojidb::{
    get_emoji_by_group, get_emoji_by_search_query, get_emoji_by_unicode, has_data, is_empty,
    load_data, Connection, EmojiRecord, LoadError, OpenError,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const URL_A: &str = "https://cdn.example.com/emoji/a.json";
const URL_B: &str = "https://cdn.example.com/emoji/b.json";

const DATASET_A: &str = r#"[
    { "emoji": "😀", "annotation": "grinning face", "group": 0, "order": 1, "shortcodes": ["grinning"], "tags": ["smile"] },
    { "emoji": "😢", "annotation": "crying face", "group": 0, "order": 2, "shortcodes": ["cry"] },
    { "emoji": "🐶", "annotation": "dog face", "group": 3, "order": 1, "shortcodes": ["dog"] }
]"#;

const DATASET_B: &str = r#"[
    { "emoji": "😀", "annotation": "grinning face", "group": 0, "order": 1, "shortcodes": ["grinning"] },
    { "emoji": "🚀", "annotation": "rocket", "group": 7, "order": 1, "shortcodes": ["rocket"] }
]"#;

fn snapshot_files(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with("snap_"))
        .collect();
    names.sort();
    names
}

fn unicodes(records: &[EmojiRecord]) -> Vec<&str> {
    records.iter().map(|r| r.unicode.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Tests: Load + Reload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn load_flips_staleness_flags() {
    let dir = TempDir::new().unwrap();
    let conn = Connection::open(dir.path()).await.unwrap();

    assert!(is_empty(&conn).await.unwrap(), "fresh store must be empty");
    assert!(!has_data(&conn, URL_A, "v1").await.unwrap());

    load_data(&conn, DATASET_A.as_bytes(), URL_A, "v1").await.unwrap();

    assert!(!is_empty(&conn).await.unwrap());
    assert!(has_data(&conn, URL_A, "v1").await.unwrap());
    assert!(!has_data(&conn, URL_A, "v2").await.unwrap(), "eTag mismatch is stale");
    assert!(!has_data(&conn, URL_B, "v1").await.unwrap(), "url mismatch is stale");
}

#[tokio::test]
async fn fresh_store_answers_queries_with_nothing() {
    let dir = TempDir::new().unwrap();
    let conn = Connection::open(dir.path()).await.unwrap();

    assert!(get_emoji_by_group(&conn, 0).await.unwrap().is_empty());
    assert!(get_emoji_by_search_query(&conn, "smile").await.unwrap().is_empty());
    assert!(get_emoji_by_unicode(&conn, "😀").await.unwrap().is_none());
}

#[tokio::test]
async fn identical_reload_is_byte_for_byte_noop() {
    let dir = TempDir::new().unwrap();
    let conn = Connection::open(dir.path()).await.unwrap();

    load_data(&conn, DATASET_A.as_bytes(), URL_A, "v1").await.unwrap();
    let files_before = snapshot_files(&dir);
    assert_eq!(files_before.len(), 1, "one live snapshot after first load");
    let bytes_before = std::fs::read(dir.path().join(&files_before[0])).unwrap();
    let records_before = get_emoji_by_group(&conn, 0).await.unwrap();

    load_data(&conn, DATASET_A.as_bytes(), URL_A, "v1").await.unwrap();

    let files_after = snapshot_files(&dir);
    assert_eq!(files_before, files_after, "no new snapshot may be written");
    let bytes_after = std::fs::read(dir.path().join(&files_after[0])).unwrap();
    assert_eq!(bytes_before, bytes_after, "snapshot must be untouched");
    assert_eq!(records_before, get_emoji_by_group(&conn, 0).await.unwrap());
}

#[tokio::test]
async fn reload_replaces_never_merges() {
    let dir = TempDir::new().unwrap();
    let conn = Connection::open(dir.path()).await.unwrap();

    load_data(&conn, DATASET_A.as_bytes(), URL_A, "v1").await.unwrap();
    load_data(&conn, DATASET_B.as_bytes(), URL_B, "v2").await.unwrap();

    assert!(has_data(&conn, URL_B, "v2").await.unwrap());
    assert!(!has_data(&conn, URL_A, "v1").await.unwrap());

    // Records exclusive to A are gone, including their index entries.
    assert!(get_emoji_by_unicode(&conn, "🐶").await.unwrap().is_none());
    assert!(get_emoji_by_group(&conn, 3).await.unwrap().is_empty());
    assert!(get_emoji_by_search_query(&conn, "cry").await.unwrap().is_empty());

    assert_eq!(unicodes(&get_emoji_by_group(&conn, 7).await.unwrap()), vec!["🚀"]);
    assert!(get_emoji_by_unicode(&conn, "😀").await.unwrap().is_some());
}

#[tokio::test]
async fn stale_snapshots_are_swept_after_commit() {
    let dir = TempDir::new().unwrap();
    let conn = Connection::open(dir.path()).await.unwrap();

    load_data(&conn, DATASET_A.as_bytes(), URL_A, "v1").await.unwrap();
    load_data(&conn, DATASET_B.as_bytes(), URL_B, "v2").await.unwrap();

    assert_eq!(snapshot_files(&dir).len(), 1, "only the live snapshot remains");
}

// ---------------------------------------------------------------------------
// Tests: Failed loads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_dataset_preserves_previous() {
    let dir = TempDir::new().unwrap();
    let conn = Connection::open(dir.path()).await.unwrap();
    load_data(&conn, DATASET_A.as_bytes(), URL_A, "v1").await.unwrap();

    let err = load_data(&conn, b"[{\"emoji\":", URL_B, "v2").await.unwrap_err();
    assert!(matches!(err, LoadError::Transform(_)), "got {err:?}");

    assert!(has_data(&conn, URL_A, "v1").await.unwrap(), "old dataset still current");
    assert_eq!(get_emoji_by_group(&conn, 0).await.unwrap().len(), 2);
}

#[tokio::test]
async fn constraint_violation_aborts_whole_load() {
    let dir = TempDir::new().unwrap();
    let conn = Connection::open(dir.path()).await.unwrap();
    load_data(&conn, DATASET_A.as_bytes(), URL_A, "v1").await.unwrap();

    // Well-formed JSON, but the two records collide on unicode. The
    // transform passes; the transaction must abort mid-insert.
    let duplicate = r#"[
        { "emoji": "🚀", "annotation": "rocket", "group": 7, "order": 1 },
        { "emoji": "🚀", "annotation": "rocket again", "group": 7, "order": 2 }
    ]"#;
    let err = load_data(&conn, duplicate.as_bytes(), URL_B, "v2").await.unwrap_err();
    assert!(matches!(err, LoadError::Transaction(_)), "got {err:?}");

    // The aborted load deleted nothing and wrote nothing.
    assert!(has_data(&conn, URL_A, "v1").await.unwrap());
    assert!(get_emoji_by_unicode(&conn, "🚀").await.unwrap().is_none());
    assert_eq!(get_emoji_by_group(&conn, 0).await.unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Tests: Reopen + damaged directories
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dataset_survives_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let conn = Connection::open(dir.path()).await.unwrap();
        load_data(&conn, DATASET_A.as_bytes(), URL_A, "v1").await.unwrap();
        // Connection dropped; only the files remain.
    }

    {
        let conn = Connection::open(dir.path()).await.unwrap();
        assert!(has_data(&conn, URL_A, "v1").await.unwrap());
        let group0 = get_emoji_by_group(&conn, 0).await.unwrap();
        assert_eq!(unicodes(&group0), vec!["😀", "😢"]);
        let hit = get_emoji_by_unicode(&conn, "🐶").await.unwrap().unwrap();
        assert_eq!(hit.annotation, "dog face");
    }
}

#[tokio::test]
async fn corrupt_pointer_fails_open() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("current.json"), b"not json at all").unwrap();

    let err = Connection::open(dir.path()).await.unwrap_err();
    assert!(matches!(err, OpenError::CorruptPointer(_)), "got {err:?}");
}

#[tokio::test]
async fn newer_schema_fails_open() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("current.json"),
        r#"{"schema_version": 99, "version": 3, "file": "snap_000003.bin"}"#,
    )
    .unwrap();

    let err = Connection::open(dir.path()).await.unwrap_err();
    assert!(
        matches!(err, OpenError::SchemaVersion { found: 99, expected: 1 }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn missing_snapshot_fails_open() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("current.json"),
        r#"{"schema_version": 1, "version": 3, "file": "snap_000003.bin"}"#,
    )
    .unwrap();

    let err = Connection::open(dir.path()).await.unwrap_err();
    assert!(matches!(err, OpenError::Io(_)), "got {err:?}");
}

#[tokio::test]
async fn truncated_snapshot_fails_open() {
    let dir = TempDir::new().unwrap();
    {
        let conn = Connection::open(dir.path()).await.unwrap();
        load_data(&conn, DATASET_A.as_bytes(), URL_A, "v1").await.unwrap();
    }
    let snap = snapshot_files(&dir).pop().unwrap();
    std::fs::write(dir.path().join(&snap), b"EMDB").unwrap();

    let err = Connection::open(dir.path()).await.unwrap_err();
    assert!(matches!(err, OpenError::CorruptSnapshot(_)), "got {err:?}");
}
