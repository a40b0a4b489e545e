use migration::{reconcile, DbState, EngineConfig, Outcome};
use test_support::{sqlite_db, MigrationDir};

use crate::support::{applied, create_run_log, log_insert, run_log, set_of};

#[tokio::test]
async fn fresh_db_runs_every_file_in_lexical_order() {
    let db = sqlite_db().await;
    create_run_log(&db).await;
    let dir = MigrationDir::with_files(&[
        ("2018-01-15-a.sql", &log_insert("2018-01-15-a")),
        ("0000-0037.sql", &log_insert("0000-0037")),
        ("0000-0001.sql", &log_insert("0000-0001")),
    ]);

    let report = reconcile(&db.conn, &set_of(&dir), &EngineConfig::default())
        .await
        .expect("reconcile fresh db");

    assert_eq!(report.initial_state, DbState::Fresh);
    assert_eq!(report.replayed, ["0000-0001", "0000-0037"]);
    assert_eq!(report.applied, ["2018-01-15-a"]);
    assert!(report.recorded.is_empty());
    assert_eq!(report.outcome(), Outcome::Applied(3));
    assert_eq!(
        run_log(&db).await,
        ["0000-0001", "0000-0037", "2018-01-15-a"]
    );
    assert_eq!(
        report.executed().collect::<Vec<_>>(),
        ["0000-0001", "0000-0037", "2018-01-15-a"]
    );
}

#[tokio::test]
async fn fresh_db_records_all_names_in_string_keyed_table() {
    let db = sqlite_db().await;
    let dir = MigrationDir::with_files(&[
        ("0000-0000.sql", "CREATE TABLE t0 (id INTEGER);"),
        ("0000-0001.sql", "CREATE TABLE t1 (id INTEGER);"),
        ("2018-01-15-a.sql", "CREATE TABLE ta (id INTEGER);"),
    ]);

    reconcile(&db.conn, &set_of(&dir), &EngineConfig::default())
        .await
        .expect("reconcile fresh db");

    for table in ["t0", "t1", "ta"] {
        assert!(db.table_exists(table).await, "{table} should exist");
    }
    assert_eq!(
        applied(&db).await,
        ["0000-0000", "0000-0001", "2018-01-15-a"]
    );
    let version_type = db
        .column_type("schema_migrations", "version")
        .await
        .expect("version column");
    assert!(
        version_type.to_lowercase().contains("char") || version_type.eq_ignore_ascii_case("text"),
        "unexpected version type {version_type}"
    );
}

#[tokio::test]
async fn second_run_is_up_to_date_and_changes_nothing() {
    let db = sqlite_db().await;
    let dir = MigrationDir::with_files(&[
        ("0000-0001.sql", "CREATE TABLE legacy_one (id INTEGER);"),
        ("2018-01-15-a.sql", "CREATE TABLE standard_a (id INTEGER);"),
    ]);
    let set = set_of(&dir);
    let config = EngineConfig::default();

    let first = reconcile(&db.conn, &set, &config).await.expect("first run");
    assert_eq!(first.outcome(), Outcome::Applied(2));
    let after_first = applied(&db).await;

    let second = reconcile(&db.conn, &set, &config).await.expect("second run");
    assert_eq!(second.initial_state, DbState::Current);
    assert_eq!(second.outcome(), Outcome::UpToDate);
    assert!(second.applied.is_empty());
    assert_eq!(applied(&db).await, after_first);
}

#[tokio::test]
async fn file_is_executed_as_one_statement_batch() {
    let db = sqlite_db().await;
    let dir = MigrationDir::with_files(&[(
        "2018-02-01-seed.sql",
        "CREATE TABLE colours (name TEXT NOT NULL);\n\
         INSERT INTO colours (name) VALUES ('red');\n\
         INSERT INTO colours (name) VALUES ('blue');\n",
    )]);

    reconcile(&db.conn, &set_of(&dir), &EngineConfig::default())
        .await
        .expect("reconcile");

    assert_eq!(
        db.strings("SELECT name FROM colours ORDER BY name", "name").await,
        ["blue", "red"]
    );
}

#[tokio::test]
async fn fresh_db_without_legacy_files_replays_nothing() {
    let db = sqlite_db().await;
    let dir = MigrationDir::with_files(&[("2019-03-01-Init.sql", "CREATE TABLE init (id INTEGER);")]);

    let report = reconcile(&db.conn, &set_of(&dir), &EngineConfig::default())
        .await
        .expect("reconcile");

    assert!(report.replayed.is_empty());
    assert_eq!(report.applied, ["2019-03-01-init"]);
    assert_eq!(applied(&db).await, ["2019-03-01-init"]);
}

#[tokio::test]
async fn custom_table_name_is_used_for_tracking() {
    let db = sqlite_db().await;
    let dir = MigrationDir::with_files(&[("2018-01-15-a.sql", "CREATE TABLE ta (id INTEGER);")]);
    let config = EngineConfig::new("app_migrations").expect("valid table name");

    reconcile(&db.conn, &set_of(&dir), &config)
        .await
        .expect("reconcile");

    assert!(db.table_exists("app_migrations").await);
    assert!(!db.table_exists("schema_migrations").await);
    assert_eq!(
        db.strings(r#"SELECT "version" FROM "app_migrations""#, "version")
            .await,
        ["2018-01-15-a"]
    );
}
