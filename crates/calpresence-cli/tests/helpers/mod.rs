use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Runs the binary inside a scratch directory so no stray
/// `calpresence.toml` is picked up.
pub struct CliTestHarness {
    temp_dir: TempDir,
}

impl CliTestHarness {
    pub fn new() -> Self {
        Self {
            temp_dir: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("calpresence").expect("Failed to find calpresence binary");
        cmd.current_dir(self.temp_dir.path())
            .env("CALPRESENCE_DEFAULT_TIMEZONE", "UTC")
            .env("RUST_LOG", "warn")
            .env_remove("TZ");
        cmd
    }

    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write a file into the scratch directory and return its path.
    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, contents).expect("Failed to write test file");
        path
    }

    pub fn run_success(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().success()
    }

    pub fn run_failure(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().failure()
    }
}

/// A snapshot with one meeting on 2025-03-10 from 09:00 to 10:00 UTC.
pub fn single_meeting_snapshot(changes: &str) -> String {
    format!(
        r#"{{
  "default_folder": "calendar",
  "items": [
    {{ "id": "review", "properties": {{
        "start": "2025-03-10 09:00:00", "end": "2025-03-10 10:00:00",
        "busy_status": 2, "response_status": 3,
        "parent_folder_id": "calendar", "subject": "Design review" }} }}
  ],
  "changes": [{}]
}}"#,
        changes
    )
}
