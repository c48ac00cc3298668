use mitrekb_core::db::migrations::latest_version;
use mitrekb_core::db::{open_db, open_db_in_memory, DbError};

#[test]
fn fresh_database_migrates_to_latest_version() {
    let conn = open_db_in_memory().unwrap();
    let version: u32 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, latest_version());
}

#[test]
fn schema_contains_all_store_tables() {
    let conn = open_db_in_memory().unwrap();

    let expected = [
        "techniques",
        "technique_tactics",
        "technique_platforms",
        "groups",
        "software",
        "campaigns",
        "technique_references",
        "group_references",
        "software_references",
        "campaign_references",
        "relationships",
        "group_techniques",
        "software_techniques",
        "campaign_techniques",
        "group_campaigns",
    ];
    for table in expected {
        let count: u32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1;",
                [table],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1, "missing table {table}");
    }
}

#[test]
fn foreign_keys_are_enabled() {
    let conn = open_db_in_memory().unwrap();
    let enabled: u32 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);
}

#[test]
fn reopening_a_migrated_file_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kb.sqlite3");

    drop(open_db(&path).unwrap());
    let conn = open_db(&path).unwrap();
    let version: u32 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, latest_version());
}

#[test]
fn database_from_the_future_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kb.sqlite3");

    drop(open_db(&path).unwrap());
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("PRAGMA user_version = 9999;").unwrap();
    }

    let err = open_db(&path).unwrap_err();
    assert!(matches!(
        err,
        DbError::UnsupportedSchemaVersion {
            db_version: 9999,
            ..
        }
    ));
}
