use predicates::prelude::*;

mod common;
use common::TestProject;

#[test]
fn up_dry_run_runs_offline_and_writes_a_report() {
    let project = TestProject::new();
    project.write_config();

    project
        .command()
        .args(["up", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dry-run: no changes will be made"))
        .stdout(predicate::str::contains("[1/9]"))
        .stdout(predicate::str::contains("[9/9]"))
        .stdout(predicate::str::contains("would"));

    // the report is written even for a dry run
    let report = std::fs::read_to_string(project.path().join(".groundwork/report.json")).unwrap();
    assert!(report.contains("\"status\": \"success\""));
    assert!(report.contains("\"dry_run\": true"));

    // no registry was created
    assert!(!project.path().join(".groundwork/accounts.json").exists());
}

#[test]
fn up_dry_run_reads_an_existing_registry() {
    let project = TestProject::new();
    project.write_config();
    project.write_registry();

    project
        .command()
        .args(["up", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 recorded in registry"));
}

#[test]
fn down_dry_run_previews_the_teardown() {
    let project = TestProject::new();
    project.write_config();
    project.write_registry();

    project
        .command()
        .args(["down", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("would drain and remove 3 state backends"))
        .stdout(predicate::str::contains("pass --close-accounts"));

    // the registry survives a dry run
    assert!(project.path().join(".groundwork/accounts.json").exists());
}

#[test]
fn down_dry_run_without_registry_fails_with_remediation() {
    let project = TestProject::new();
    project.write_config();

    project
        .command()
        .args(["down", "--dry-run"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("account registry not found"));
}
