use migration::{status, DbState, EngineConfig, SwitchoverCheck};
use test_support::{sqlite_db, MigrationDir};

use crate::support::{seed_legacy, set_of};

fn files() -> MigrationDir {
    MigrationDir::with_files(&[
        ("0000-0001.sql", "CREATE TABLE one (id INTEGER);"),
        ("0000-0002.sql", "CREATE TABLE two (id INTEGER);"),
        ("2018-01-15-a.sql", "CREATE TABLE ta (id INTEGER);"),
        ("2018-01-16-b.sql", "CREATE TABLE tb (id INTEGER);"),
    ])
}

#[tokio::test]
async fn fresh_status_lists_everything_and_writes_nothing() {
    let db = sqlite_db().await;
    let dir = files();

    let report = status(&db.conn, &set_of(&dir), &EngineConfig::default())
        .await
        .expect("status");

    assert_eq!(report.state, DbState::Fresh);
    assert_eq!(
        report.pending,
        ["0000-0001", "0000-0002", "2018-01-15-a", "2018-01-16-b"]
    );
    assert_eq!(report.switchover, None);
    assert!(!db.table_exists("schema_migrations").await);
}

#[tokio::test]
async fn legacy_status_reports_switchover_readiness() {
    let db = sqlite_db().await;
    seed_legacy(&db, &[1, 2]).await;
    let dir = files();

    let report = status(&db.conn, &set_of(&dir), &EngineConfig::default())
        .await
        .expect("status");

    assert_eq!(report.state, DbState::Legacy);
    assert_eq!(report.pending, ["2018-01-15-a", "2018-01-16-b"]);
    let check = report.switchover.expect("switchover check");
    assert_eq!(
        check,
        SwitchoverCheck {
            applied: 2,
            available: 2
        }
    );
    assert!(check.ready());
}

#[tokio::test]
async fn legacy_status_flags_mismatch_without_touching_table() {
    let db = sqlite_db().await;
    seed_legacy(&db, &[1]).await;
    let dir = files();

    let report = status(&db.conn, &set_of(&dir), &EngineConfig::default())
        .await
        .expect("status");

    let check = report.switchover.expect("switchover check");
    assert!(!check.ready());
    assert_eq!(
        db.ints("SELECT version FROM schema_migrations", "version")
            .await,
        [1]
    );
}

#[tokio::test]
async fn current_status_lists_only_unrecorded_files() {
    let db = sqlite_db().await;
    db.exec(r#"CREATE TABLE "schema_migrations" ("version" varchar NOT NULL PRIMARY KEY)"#)
        .await;
    db.exec(
        r#"INSERT INTO "schema_migrations" ("version") VALUES ('0000-0001'), ('0000-0002'), ('2018-01-15-a')"#,
    )
    .await;
    let dir = files();

    let report = status(&db.conn, &set_of(&dir), &EngineConfig::default())
        .await
        .expect("status");

    assert_eq!(report.state, DbState::Current);
    assert_eq!(report.pending, ["2018-01-16-b"]);
    assert!(!db.table_exists("tb").await);
}
