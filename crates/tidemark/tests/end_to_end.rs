//! End-to-end run of `migrate|schema|data` against an in-memory target.

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{FakeConnector, FakeDatabase};
use tidemark::core::{DbColumnSchema, DbTableSchema};
use tidemark::{Config, MigrationCommand, Migrator};

const PERSON_ID: &str = "3f0e6c1a-8d2b-4c55-9a43-1b7f2f7c9e10";

fn write(root: &Path, name: &str, body: &str) {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(
        root,
        "Migrations/0001-tables.sql",
        "CREATE TABLE \"Ref\".\"Color\" (\"ColorId\" serial PRIMARY KEY);\nCREATE TABLE \"Demo\".\"Person\" (\"PersonId\" uuid PRIMARY KEY);",
    );
    write(
        root,
        "Migrations/9999-grants.post.deploy.sql",
        "GRANT SELECT ON ALL TABLES IN SCHEMA \"Demo\" TO reporting;",
    );

    write(
        root,
        "Schema/Demo/vPerson.sql",
        "CREATE OR REPLACE VIEW \"Demo\".\"vPerson\" AS SELECT * FROM \"Demo\".\"Person\";",
    );
    write(
        root,
        "Schema/Demo/fn_person_name.sql",
        "-- lookup\nCREATE OR REPLACE FUNCTION \"Demo\".fn_person_name(id uuid) RETURNS text AS $$ SELECT \"Name\" FROM \"Demo\".\"Person\" WHERE \"PersonId\" = id $$ LANGUAGE sql;",
    );
    write(
        root,
        "Schema/Ref/vColor.sql",
        "CREATE OR REPLACE VIEW \"Ref\".\"vColor\" AS SELECT * FROM \"Ref\".\"Color\";",
    );

    write(
        root,
        "Data/01-colors.yaml",
        "Ref:\n  Color:\n    - Red: Red color\n    - Blue: Blue color\n",
    );
    write(
        root,
        "Data/02-people.yaml",
        &format!(
            "Demo:\n  Person:\n    - PersonId: {PERSON_ID}\n      Name: Ada\n      Color: Red\n      Pet:\n        - Name: Rex\n"
        ),
    );

    dir
}

fn tables() -> Vec<DbTableSchema> {
    vec![
        DbTableSchema::new("Ref", "Color")
            .with_column(DbColumnSchema::new("ColorId", "integer").primary_key().identity())
            .with_column(DbColumnSchema::new("Code", "character varying"))
            .with_column(DbColumnSchema::new("Text", "character varying"))
            .with_column(DbColumnSchema::new("IsActive", "boolean"))
            .with_column(DbColumnSchema::new("SortOrder", "integer")),
        DbTableSchema::new("Demo", "Person")
            .with_column(DbColumnSchema::new("PersonId", "uuid").primary_key())
            .with_column(DbColumnSchema::new("Name", "text"))
            .with_column(DbColumnSchema::new("ColorId", "integer").references("Ref", "Color", "ColorId")),
        DbTableSchema::new("Demo", "Pet")
            .with_column(DbColumnSchema::new("PetId", "uuid").primary_key())
            .with_column(DbColumnSchema::new("PersonId", "uuid").references("Demo", "Person", "PersonId"))
            .with_column(DbColumnSchema::new("Name", "text")),
    ]
}

fn migrator(dir: &tempfile::TempDir, db: &Arc<FakeDatabase>) -> Migrator {
    let mut config = Config::from_yaml(
        "provider: postgres\nconnection_string: \"host=localhost dbname=demo\"\nschema_order: [Ref, Demo]\n",
    )
    .unwrap();
    config.output_dir = dir.path().to_path_buf();
    Migrator::new(config, Arc::new(FakeConnector { db: db.clone() }))
}

#[tokio::test]
async fn test_migrate_schema_data_on_empty_database() {
    let dir = project();
    let db = Arc::new(FakeDatabase::new(tables()));
    let migrator = migrator(&dir, &db);

    let command: MigrationCommand = "migrate|schema|data".parse().unwrap();
    let report = migrator.migrate(command).await.unwrap();

    let phases: Vec<_> = report.phases.iter().map(|p| p.phase.as_str()).collect();
    assert_eq!(phases, vec!["migrate", "schema", "data"]);

    // Journal table created before any script runs
    let journal_create = db.position("CREATE TABLE IF NOT EXISTS \"public\".\"SchemaJournal\"").unwrap();
    let tables_script = db.position("CREATE TABLE \"Ref\".\"Color\"").unwrap();
    let grants = db.position("GRANT SELECT").unwrap();
    assert!(journal_create < tables_script && tables_script < grants);

    // Only the non-repeatable script is journaled
    assert_eq!(db.journal(), vec!["Migrations/0001-tables.sql".to_string()]);

    // Schema objects: schema priority, then type order, none dropped
    let v_color = db.position("VIEW \"Ref\".\"vColor\"").unwrap();
    let function = db.position("FUNCTION \"Demo\".fn_person_name").unwrap();
    let v_person = db.position("VIEW \"Demo\".\"vPerson\"").unwrap();
    assert!(grants < v_color && v_color < function && function < v_person);
    assert_eq!(db.count("DROP "), 0);
    assert_eq!(report.phases[1].summary, "0 dropped, 3 created");

    // Reference data, then the parent, then the child with the parent's key
    let colors = db.position("INSERT INTO \"Ref\".\"Color\"").unwrap();
    let person = db.position("INSERT INTO \"Demo\".\"Person\"").unwrap();
    let pet = db.position("INSERT INTO \"Demo\".\"Pet\"").unwrap();
    assert!(v_person < colors && colors < person && person < pet);

    let executed = db.executed();
    assert!(executed[colors].contains("'Red'") && executed[colors].contains("'Red color'"));
    assert!(executed[person].contains("(SELECT \"ColorId\" FROM \"Ref\".\"Color\" WHERE \"Code\" = 'Red')"));
    assert!(executed[pet].contains(&format!("'{PERSON_ID}'")));
    assert!(executed[pet].contains("'Rex'"));
    assert_eq!(report.phases[2].summary, "4 row(s) in 3 table(s)");
}

#[tokio::test]
async fn test_rerun_only_replays_run_always_scripts() {
    let dir = project();
    let db = Arc::new(FakeDatabase::new(tables()));

    migrator(&dir, &db).migrate(MigrationCommand::MIGRATE).await.unwrap();
    let report = migrator(&dir, &db).migrate(MigrationCommand::MIGRATE).await.unwrap();

    assert_eq!(report.phases[0].summary, "1 executed, 1 skipped");
    assert_eq!(db.count("CREATE TABLE \"Ref\".\"Color\""), 1);
    assert_eq!(db.count("GRANT SELECT"), 2);
    assert_eq!(db.journal().len(), 1);
}

#[tokio::test]
async fn test_unknown_schema_object_type_executes_nothing() {
    let dir = project();
    write(
        dir.path(),
        "Schema/Demo/seq.sql",
        "CREATE SEQUENCE \"Demo\".\"PersonNumber\";",
    );
    let db = Arc::new(FakeDatabase::new(tables()));

    let err = migrator(&dir, &db)
        .migrate(MigrationCommand::SCHEMA)
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("Schema/Demo/seq.sql"));
    assert_eq!(db.count("vColor"), 0);
    assert_eq!(db.count("vPerson"), 0);
}
