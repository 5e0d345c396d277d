use predicates::prelude::*;

mod common;
use common::TestProject;

#[test]
fn version_runs_without_config() {
    let project = TestProject::new();
    project
        .command()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("groundwork"));
}

#[test]
fn missing_config_is_a_clear_error() {
    let project = TestProject::new();
    project
        .command()
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("project root not found"))
        .stderr(predicate::str::contains("groundwork.json"));
}

#[test]
fn status_before_provisioning_points_at_up() {
    let project = TestProject::new();
    project.write_config();

    project
        .command()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("not provisioned"))
        .stdout(predicate::str::contains("no descriptor"));
}

#[test]
fn status_shows_recorded_accounts() {
    let project = TestProject::new();
    project.write_config();
    project.write_registry();

    project
        .command()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("222222222222"))
        .stdout(predicate::str::contains("444444444444"));
}

#[test]
fn down_refuses_without_confirmation() {
    let project = TestProject::new();
    project.write_config();
    project.write_registry();

    project
        .command()
        .arg("down")
        .assert()
        .success()
        .stdout(predicate::str::contains("pass --yes"));

    // nothing ran, so no report was written
    assert!(!project.path().join(".groundwork/report.json").exists());
}

#[test]
fn invalid_config_is_rejected() {
    let project = TestProject::new();
    std::fs::write(
        project.path().join("groundwork.json"),
        r#"{"project": "atlas", "region": "eu-west-1", "account_email": "ops@example.com", "repository": "no-slash"}"#,
    )
    .unwrap();

    project
        .command()
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("owner/repo"));
}
