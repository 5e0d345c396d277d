use assert_cmd::Command;
use std::path::Path;
use tempfile::TempDir;

/// Temporary project directory with a `groundwork.json` and optional
/// pre-seeded local state.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_config(&self) {
        let config = serde_json::json!({
            "project": "atlas",
            "region": "eu-west-1",
            "account_email": "ops@example.com",
            "repository": "example/atlas"
        });
        std::fs::write(
            self.dir.path().join("groundwork.json"),
            serde_json::to_string_pretty(&config).unwrap(),
        )
        .unwrap();
    }

    pub fn write_registry(&self) {
        let state_dir = self.dir.path().join(".groundwork");
        std::fs::create_dir_all(&state_dir).unwrap();
        let registry = serde_json::json!({
            "version": 1,
            "project": "atlas",
            "management_account_id": "111111111111",
            "accounts": {
                "dev": "222222222222",
                "staging": "333333333333",
                "prod": "444444444444"
            },
            "updated_at": "2026-08-07T12:00:00Z"
        });
        std::fs::write(
            state_dir.join("accounts.json"),
            serde_json::to_string_pretty(&registry).unwrap(),
        )
        .unwrap();
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("ground").unwrap();
        cmd.current_dir(self.dir.path());
        cmd.env_remove("GROUNDWORK_PROJECT_ROOT");
        cmd
    }
}
