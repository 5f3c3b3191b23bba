mod support;

use quota_db::MIGRATIONS;
use support::setup_db;

#[test]
fn migrations_are_idempotent() {
    let mut fixture = setup_db();
    // Running the full set again must not fail or lose data.
    fixture.db.migrate().expect("second migrate");
}

#[test]
fn migration_names_are_ordered() {
    let names: Vec<&str> = MIGRATIONS.iter().map(|(name, _)| *name).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}
