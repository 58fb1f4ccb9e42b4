//! Black-box tests for the `calpresence` binary.

use calpresence_core::testing::PatternBuilder;
use chrono::Weekday;
use predicates::prelude::*;

mod helpers;
use helpers::{single_meeting_snapshot, CliTestHarness};

#[test]
fn test_cli_help_and_version() {
    let harness = CliTestHarness::new();

    harness
        .run_success(&["--help"])
        .stdout(predicate::str::contains("Outlook recurrence"))
        .stdout(predicate::str::contains("watch"));

    harness
        .run_success(&["--version"])
        .stdout(predicate::str::contains("calpresence"));

    harness
        .run_failure(&["invalid-command"])
        .stderr(predicate::str::contains("error"));
}

mod decode {
    use super::*;

    #[test]
    fn test_decode_weekly_blob() {
        let harness = CliTestHarness::new();
        let blob = PatternBuilder::weekly(2025, 3, 3, &[Weekday::Mon, Weekday::Wed])
            .end_by(2025, 6, 30)
            .build_hex();

        harness
            .run_success(&["decode", &blob, "--timezone", "Eastern Standard Time"])
            .stdout(predicate::str::contains("pattern: weekly on Mon,Wed"))
            .stdout(predicate::str::contains("time zone: America/New_York"))
            .stdout(predicate::str::contains("ends: on 2025-06-30"));
    }

    #[test]
    fn test_decode_blob_from_file() {
        let harness = CliTestHarness::new();
        let blob = PatternBuilder::month_end(2025, 1, 31).build_hex();
        let path = harness.write_file("blob.hex", &blob);

        harness
            .run_success(&["decode", &format!("@{}", path.display())])
            .stdout(predicate::str::contains("monthly on the last day"))
            .stdout(predicate::str::contains("ends: never"));
    }

    #[test]
    fn test_decode_unknown_zone_warns() {
        let harness = CliTestHarness::new();
        let blob = PatternBuilder::daily(2025, 1, 1).build_hex();

        harness
            .run_success(&["decode", &blob, "--timezone", "Atlantis Standard Time"])
            .stdout(predicate::str::contains("not recognised"));
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        let harness = CliTestHarness::new();

        harness
            .run_failure(&["decode", "not-hex"])
            .stderr(predicate::str::contains("not valid hex"));

        harness
            .run_failure(&["decode", "0430"])
            .stderr(predicate::str::contains("Recurrence blob rejected"));

        let blob = PatternBuilder::daily(2025, 1, 1).build_hex();
        harness
            .run_failure(&["decode", &blob, "--busy", "sometimes"])
            .stderr(predicate::str::contains("Invalid input"));
    }
}

mod preview {
    use super::*;

    #[test]
    fn test_preview_lists_next_occurrences() {
        let harness = CliTestHarness::new();
        let blob = PatternBuilder::daily(2025, 3, 1).build_hex();

        harness
            .run_success(&[
                "preview",
                &blob,
                "--timezone",
                "UTC",
                "--now",
                "2025-03-10T08:00:00Z",
                "--count",
                "3",
            ])
            .stdout(predicate::str::contains("2025-03-10 09:00 UTC"))
            .stdout(predicate::str::contains("2025-03-12 09:00 UTC"))
            .stdout(predicate::str::contains("2025-03-13 09:00 UTC").not());
    }

    #[test]
    fn test_preview_of_finished_series() {
        let harness = CliTestHarness::new();
        let blob = PatternBuilder::daily(2024, 1, 1).end_by(2024, 1, 5).build_hex();

        harness
            .run_success(&["preview", &blob, "--now", "2025-03-10T08:00:00Z"])
            .stdout(predicate::str::contains("No upcoming occurrences."));
    }

    #[test]
    fn test_preview_rejects_zero_count() {
        let harness = CliTestHarness::new();
        let blob = PatternBuilder::daily(2025, 3, 1).build_hex();

        harness
            .run_failure(&["preview", &blob, "--count", "0"])
            .stderr(predicate::str::contains("--count must be at least 1"));
    }
}

mod timezones {
    use super::*;

    #[test]
    fn test_search_filters_map() {
        let harness = CliTestHarness::new();

        harness
            .run_success(&["timezones", "--search", "tokyo"])
            .stdout(predicate::str::contains("Tokyo Standard Time"))
            .stdout(predicate::str::contains("Asia/Tokyo"))
            .stdout(predicate::str::contains("Pacific Standard Time").not());
    }

    #[test]
    fn test_resolve_display_name() {
        let harness = CliTestHarness::new();

        harness
            .run_success(&["timezones", "--resolve", "(UTC-05:00) Eastern Time (US & Canada)"])
            .stdout(predicate::str::contains("America/New_York"))
            .stdout(predicate::str::contains("exact"));
    }

    #[test]
    fn test_search_and_resolve_conflict() {
        let harness = CliTestHarness::new();
        harness.run_failure(&["timezones", "--search", "a", "--resolve", "b"]);
    }
}

mod watch {
    use super::*;

    #[test]
    fn test_watch_reports_meeting_in_progress() {
        let harness = CliTestHarness::new();
        let path = harness.write_file("snapshot.json", &single_meeting_snapshot(""));

        harness
            .run_success(&[
                "watch",
                path.to_str().unwrap(),
                "--for",
                "1",
                "--at",
                "2025-03-10T09:30:00Z",
            ])
            .stdout(predicate::str::contains("=== calendar presence ==="))
            .stdout(predicate::str::contains("in meeting: true"))
            .stdout(predicate::str::contains("active meeting count: 1"))
            .stdout(predicate::str::contains("meeting review"));
    }

    #[test]
    fn test_watch_applies_timed_deletion() {
        let harness = CliTestHarness::new();
        let changes = r#"{ "after_secs": 1, "id": "review", "change": "deleted" }"#;
        let path = harness.write_file("snapshot.json", &single_meeting_snapshot(changes));

        harness
            .run_success(&[
                "watch",
                path.to_str().unwrap(),
                "--for",
                "2",
                "--at",
                "2025-03-10T09:30:00Z",
            ])
            .stdout(predicate::str::contains("in meeting: false"))
            .stdout(predicate::str::contains("meeting review").not());
    }

    #[test]
    fn test_watch_ignores_other_folders() {
        let harness = CliTestHarness::new();
        let snapshot = single_meeting_snapshot("").replace(
            "\"parent_folder_id\": \"calendar\"",
            "\"parent_folder_id\": \"shared\"",
        );
        let path = harness.write_file("snapshot.json", &snapshot);

        harness
            .run_success(&[
                "watch",
                path.to_str().unwrap(),
                "--for",
                "1",
                "--at",
                "2025-03-10T09:30:00Z",
            ])
            .stdout(predicate::str::contains("in meeting: false"));
    }

    #[test]
    fn test_watch_reports_bad_snapshot() {
        let harness = CliTestHarness::new();
        let path = harness.write_file("broken.json", "{ not json");

        harness
            .run_failure(&["watch", path.to_str().unwrap(), "--for", "0"])
            .stderr(predicate::str::contains("Failed to load snapshot"));

        harness
            .run_failure(&["watch", harness.dir().join("missing.json").to_str().unwrap()])
            .stderr(predicate::str::contains("Failed to load snapshot"));
    }
}

#[test]
fn test_config_file_sets_default_zone() {
    let harness = CliTestHarness::new();
    harness.write_file("calpresence.toml", "log_filter = \"error\"\n");
    let blob = PatternBuilder::daily(2025, 3, 1).build_hex();

    harness
        .command()
        .env("CALPRESENCE_DEFAULT_TIMEZONE", "Asia/Tokyo")
        .args(["preview", &blob, "--timezone", "UTC", "--now", "2025-03-10T08:00:00Z", "-c", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2025-03-10 18:00 JST"));
}
