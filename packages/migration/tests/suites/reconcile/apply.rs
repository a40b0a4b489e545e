use migration::engine::apply_migration;
use migration::{
    migrate, reconcile, DbState, EngineConfig, MigrationCommand, MigrationError, MigrationSet,
    MigrationSummary, Outcome,
};
use test_support::{sqlite_db, MigrationDir};

use crate::support::{applied, set_of};

const BROKEN_B: &str = "CREATE TABLE beta (id INTEGER);\nINSERT INTO no_such_table (id) VALUES (1);\n";

fn three_pending() -> MigrationDir {
    MigrationDir::with_files(&[
        ("2018-01-01-a.sql", "CREATE TABLE alpha (id INTEGER);"),
        ("2018-01-02-b.sql", BROKEN_B),
        ("2018-01-03-c.sql", "CREATE TABLE gamma (id INTEGER);"),
    ])
}

#[tokio::test]
async fn failure_keeps_earlier_commits_and_stops_the_run() {
    let db = sqlite_db().await;
    let dir = three_pending();

    let err = reconcile(&db.conn, &set_of(&dir), &EngineConfig::default())
        .await
        .expect_err("second migration must fail");

    match &err {
        MigrationError::MigrationApplyFailed { file, .. } => {
            assert!(file.ends_with("2018-01-02-b.sql"), "wrong file: {}", file.display());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("2018-01-02-b.sql"));
    assert_eq!(
        err.file().and_then(|f| f.file_name()).and_then(|n| n.to_str()),
        Some("2018-01-02-b.sql")
    );

    assert_eq!(applied(&db).await, ["2018-01-01-a"]);
    assert!(db.table_exists("alpha").await);
    assert!(!db.table_exists("beta").await, "failed migration must roll back");
    assert!(!db.table_exists("gamma").await, "later migrations must not run");
}

#[tokio::test]
async fn rerun_after_fix_applies_only_the_remaining_migrations() {
    let db = sqlite_db().await;
    let dir = three_pending();
    let config = EngineConfig::default();

    reconcile(&db.conn, &set_of(&dir), &config)
        .await
        .expect_err("first run fails");

    dir.write("2018-01-02-b.sql", "CREATE TABLE beta (id INTEGER);");
    let report = reconcile(&db.conn, &set_of(&dir), &config)
        .await
        .expect("second run succeeds");

    assert_eq!(report.initial_state, DbState::Current);
    assert_eq!(report.applied, ["2018-01-02-b", "2018-01-03-c"]);
    assert_eq!(
        applied(&db).await,
        ["2018-01-01-a", "2018-01-02-b", "2018-01-03-c"]
    );
    for table in ["alpha", "beta", "gamma"] {
        assert!(db.table_exists(table).await, "{table} should exist");
    }
}

#[tokio::test]
async fn recorded_migrations_are_never_reexecuted() {
    let db = sqlite_db().await;
    let dir = MigrationDir::with_files(&[("2018-01-01-a.sql", "CREATE TABLE alpha (id INTEGER);")]);
    let config = EngineConfig::default();
    reconcile(&db.conn, &set_of(&dir), &config)
        .await
        .expect("first run");

    // Rewriting an applied file must not matter; it is skipped by name.
    dir.write("2018-01-01-a.sql", "NOT VALID SQL AT ALL");
    let report = reconcile(&db.conn, &set_of(&dir), &config)
        .await
        .expect("second run");

    assert_eq!(report.outcome(), Outcome::UpToDate);
}

#[tokio::test]
async fn unreadable_file_fails_with_read_error() {
    let db = sqlite_db().await;
    let dir = MigrationDir::with_files(&[("2018-01-01-a.sql", "CREATE TABLE alpha (id INTEGER);")]);
    let set = set_of(&dir);
    std::fs::remove_file(dir.path().join("2018-01-01-a.sql")).expect("remove file");

    let err = reconcile(&db.conn, &set, &EngineConfig::default())
        .await
        .expect_err("missing file must fail");

    assert!(matches!(err, MigrationError::MigrationReadFailed { .. }), "{err}");
    assert!(applied(&db).await.is_empty());
}

#[tokio::test]
async fn apply_migration_records_the_lowercased_name() {
    let db = sqlite_db().await;
    let dir = MigrationDir::with_files(&[("2018-06-01-AddIndex.sql", "CREATE TABLE indexed (id INTEGER);")]);
    let config = EngineConfig::default();
    db.exec(r#"CREATE TABLE "schema_migrations" ("version" varchar NOT NULL PRIMARY KEY)"#)
        .await;

    let set = MigrationSet::discover(dir.path()).expect("discover");
    let file = set.iter().next().expect("one file");
    apply_migration(&db.conn, file, &config)
        .await
        .expect("apply one migration");

    assert_eq!(applied(&db).await, ["2018-06-01-addindex"]);
}

#[tokio::test]
async fn migrate_up_returns_the_reconcile_report() {
    let db = sqlite_db().await;
    let dir = MigrationDir::with_files(&[("0000-0001.sql", "CREATE TABLE one (id INTEGER);")]);

    let summary = migrate(
        &db.conn,
        &set_of(&dir),
        MigrationCommand::Up,
        &EngineConfig::default(),
    )
    .await
    .expect("migrate up");

    match summary {
        MigrationSummary::Up(report) => {
            assert_eq!(report.replayed, ["0000-0001"]);
            assert_eq!(report.outcome(), Outcome::Applied(1));
        }
        other => panic!("unexpected summary: {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_insert_of_same_name_fails_on_primary_key() {
    let db = sqlite_db().await;
    let dir = MigrationDir::with_files(&[("2018-01-01-a.sql", "CREATE TABLE alpha (id INTEGER);")]);
    let set = set_of(&dir);
    let config = EngineConfig::default();
    reconcile(&db.conn, &set, &config).await.expect("first run");

    // Simulates a second process that read the applied set before the first committed.
    db.exec("DROP TABLE alpha").await;
    let file = set.iter().next().expect("one file");
    let err = apply_migration(&db.conn, file, &config)
        .await
        .expect_err("duplicate name must fail");

    assert!(matches!(err, MigrationError::MigrationApplyFailed { .. }));
    assert!(!db.table_exists("alpha").await, "duplicate insert must roll back the body");
}
