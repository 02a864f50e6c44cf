use feast_core::db::migrations::latest_version;
use feast_core::db::{database_directory, open_store, open_store_in_memory, DbError};
use feast_core::{DatabaseManager, StoreOptions, StoreStartError};
use rusqlite::Connection;

#[test]
fn open_store_in_memory_applies_all_migrations() {
    let store = open_store_in_memory().unwrap();

    assert_eq!(schema_version(&store.conn), latest_version());
    assert!(!store.migration_performed);
    assert_column_exists(&store.conn, "restaurants", "identifier");
    assert_column_exists(&store.conn, "restaurants", "latitude");
}

#[test]
fn database_directory_is_created_and_reused() {
    let base = tempfile::tempdir().unwrap();

    let first = database_directory(base.path());
    assert!(first.is_dir());
    assert!(first.ends_with("Database"));

    let second = database_directory(base.path());
    assert_eq!(first, second);
}

#[test]
fn reopening_current_store_is_not_a_migration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Feast.sqlite");

    let first = open_store(&path).unwrap();
    assert!(!first.migration_performed);
    drop(first);

    let second = open_store(&path).unwrap();
    assert!(!second.migration_performed);
    assert_eq!(schema_version(&second.conn), latest_version());
}

#[test]
fn opening_v1_store_migrates_and_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Feast.sqlite");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE restaurants (
            object_id INTEGER PRIMARY KEY,
            identifier TEXT NOT NULL,
            idx INTEGER NOT NULL DEFAULT 0,
            name TEXT NOT NULL
        );
        INSERT INTO restaurants (object_id, identifier, idx, name) VALUES (1, 'r1', 0, 'Cafe A');
        PRAGMA user_version = 1;",
    )
    .unwrap();
    drop(conn);

    let store = open_store(&path).unwrap();
    assert!(store.migration_performed);
    assert_eq!(schema_version(&store.conn), latest_version());
    assert_column_exists(&store.conn, "restaurants", "longitude");

    let name: String = store
        .conn
        .query_row("SELECT name FROM restaurants WHERE identifier = 'r1';", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(name, "Cafe A");
}

#[test]
fn newer_schema_has_no_migration_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Feast.sqlite");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 99;").unwrap();
    drop(conn);

    match open_store(&path).unwrap_err() {
        DbError::MissingSourceModel {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 99);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn first_launch_creates_directory_and_store() {
    let base = tempfile::tempdir().unwrap();
    let database_dir = base.path().join("Database");
    assert!(!database_dir.exists());

    let (manager, migration_performed) = DatabaseManager::try_start(StoreOptions::new(base.path()))
        .await
        .unwrap();

    assert!(!migration_performed);
    assert!(database_dir.is_dir());
    assert_eq!(manager.store_path(), database_dir.join("Feast.sqlite"));
    assert!(manager.store_path().is_file());
    assert!(manager.restaurants().await.unwrap().is_empty());
}

#[tokio::test]
async fn try_start_surfaces_open_failures() {
    let base = tempfile::tempdir().unwrap();
    let options = StoreOptions::new(base.path()).with_store_name("Future");

    let conn = Connection::open(options.resolve_store_path()).unwrap();
    conn.execute_batch("PRAGMA user_version = 42;").unwrap();
    drop(conn);

    let err = match DatabaseManager::try_start(options).await {
        Ok(_) => panic!("store with unknown schema must not open"),
        Err(err) => err,
    };
    assert!(matches!(
        err,
        StoreStartError::Open(DbError::MissingSourceModel { db_version: 42, .. })
    ));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_column_exists(conn: &Connection, table: &str, column: &str) {
    let exists: i64 = conn
        .query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM pragma_table_info('{table}') WHERE name = ?1);"),
            [column],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "column {table}.{column} does not exist");
}
