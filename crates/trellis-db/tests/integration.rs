use trellis_db::{migrate, open_pool, schema_version, DbSettings, SCHEMA_VERSION};

#[test]
fn file_backed_pool_shares_schema_across_connections() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("trellis.db");
    let settings = DbSettings::file(path.to_str().expect("temp path should be utf-8"));

    let pool = open_pool(&settings).expect("failed to open pool");
    let a = pool.get().expect("failed to get first connection");
    let mut b = pool.get().expect("failed to get second connection");

    let mode: String = a
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .expect("failed to query journal_mode");
    assert_eq!(mode, "wal");

    a.execute(
        "INSERT INTO events (event_id, room_id, format_version, canonical_json) VALUES ('$x', '!r', 1, '{}')",
        [],
    )
    .expect("failed to insert event");

    let count: i64 = b
        .query_row("SELECT COUNT(*) FROM events WHERE room_id = '!r'", [], |row| row.get(0))
        .expect("failed to count events");
    assert_eq!(count, 1);

    assert_eq!(migrate(&mut b).expect("failed to re-run migrate"), 0);
}

#[test]
fn reopening_keeps_schema_version() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("trellis.db");
    let settings = DbSettings::file(path.to_str().expect("temp path should be utf-8"));

    drop(open_pool(&settings).expect("failed to open pool"));

    let pool = open_pool(&settings).expect("failed to reopen pool");
    let conn = pool.get().expect("failed to get connection");
    assert_eq!(schema_version(&conn).expect("failed to read version"), SCHEMA_VERSION);
}
