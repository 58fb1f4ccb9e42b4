use calpresence_core::clock::{Clock, TokioClock};
use calpresence_core::config::TrackerConfig;
use calpresence_core::error::SourceError;
use calpresence_core::handler::CalendarDataHandler;
use calpresence_core::models::{FolderKind, ItemChange};
use calpresence_core::source::{CalendarSource, NoopAnalytics};
use calpresence_core::testing::{snapshot, MemorySource, PatternBuilder, RecordingStatus};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

struct Harness {
    handler: Arc<CalendarDataHandler>,
    source: Arc<MemorySource>,
    status: Arc<RecordingStatus>,
    clock: Arc<TokioClock>,
}

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// Monday 2025-03-10, 08:00 UTC.
fn anchor() -> DateTime<Utc> {
    utc(2025, 3, 10, 8, 0)
}

fn harness() -> Harness {
    let source = Arc::new(MemorySource::new());
    let status = Arc::new(RecordingStatus::new());
    let clock = Arc::new(TokioClock::starting_at(anchor()));
    let handler = CalendarDataHandler::new(
        source.clone(),
        status.clone(),
        Arc::new(NoopAnalytics),
        clock.clone(),
        TrackerConfig::default(),
    )
    .expect("handler should build");
    Harness {
        handler,
        source,
        status,
        clock,
    }
}

impl Harness {
    async fn advance_to(&self, target: DateTime<Utc>) {
        let delta = (target - self.clock.now()).to_std().unwrap_or_default();
        tokio::time::sleep(delta).await;
    }

    async fn settle(&self) {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    fn daily_at(&self, id: &str, start_minutes: u32, end_minutes: u32) {
        let blob = PatternBuilder::daily(2025, 3, 10)
            .times(start_minutes, end_minutes)
            .build();
        let start = anchor().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
            + chrono::Duration::minutes(i64::from(start_minutes));
        let end = start + chrono::Duration::minutes(i64::from(end_minutes - start_minutes));
        let props = snapshot(
            &start.format("%Y-%m-%d %H:%M:%S").to_string(),
            &end.format("%Y-%m-%d %H:%M:%S").to_string(),
        )
        .recurrence(&blob)
        .pattern_text("every day")
        .subject(id)
        .build();
        self.source.insert(id, props);
    }
}

mod presence {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_recurring_meetings() {
        let h = harness();
        h.daily_at("standup", 9 * 60, 10 * 60);
        h.daily_at("review", 9 * 60 + 30, 10 * 60 + 30);
        h.handler.add_notification("standup", ItemChange::Inserted);
        h.handler.add_notification("review", ItemChange::Inserted);
        h.settle().await;
        assert_eq!(h.handler.meeting_ids(), vec!["review", "standup"]);

        h.advance_to(utc(2025, 3, 10, 9, 15)).await;
        assert_eq!(h.handler.tracker().count(), 1);
        assert!(h.handler.presence());

        h.advance_to(utc(2025, 3, 10, 9, 45)).await;
        assert_eq!(h.handler.tracker().count(), 2);
        assert!(h.handler.presence());

        h.advance_to(utc(2025, 3, 10, 10, 15)).await;
        assert_eq!(h.handler.tracker().count(), 1);
        assert!(h.handler.presence());

        h.advance_to(utc(2025, 3, 10, 10, 45)).await;
        assert_eq!(h.handler.tracker().count(), 0);
        assert!(!h.handler.presence());
        assert_eq!(h.status.history(), vec![true, false]);

        // Both series roll over to the next day.
        h.advance_to(utc(2025, 3, 11, 9, 45)).await;
        assert_eq!(h.handler.tracker().count(), 2);
        assert!(h.handler.presence());
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_occurrence_gets_new_scheduler() {
        let h = harness();
        h.daily_at("standup", 9 * 60, 10 * 60);
        h.handler.add_notification("standup", ItemChange::Inserted);
        h.settle().await;

        let first = h.handler.meeting("standup").unwrap().scheduler().unwrap();
        assert_eq!(first.start_time(), utc(2025, 3, 10, 9, 0));

        h.advance_to(utc(2025, 3, 10, 10, 5)).await;
        let second = h.handler.meeting("standup").unwrap().scheduler().unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(second.start_time(), utc(2025, 3, 11, 9, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_is_idempotent() {
        let h = harness();
        h.source.insert("short", snapshot("2025-03-10 08:10:00", "2025-03-10 08:20:00").build());
        h.source.insert("long", snapshot("2025-03-10 08:00:00", "2025-03-10 12:00:00").build());
        h.handler.add_notification("short", ItemChange::Inserted);
        h.handler.add_notification("long", ItemChange::Inserted);
        h.settle().await;

        h.advance_to(utc(2025, 3, 10, 8, 30)).await;
        let first = h.handler.evaluate_meeting_presence();
        let presence_after_first = h.handler.presence();
        let second = h.handler.evaluate_meeting_presence();

        assert_eq!(first, vec!["short".to_string()]);
        assert!(second.is_empty());
        assert_eq!(h.handler.presence(), presence_after_first);
        assert!(presence_after_first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_left_until_next_meeting() {
        let h = harness();
        h.source.insert("first", snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00").build());
        h.source.insert("second", snapshot("2025-03-10 10:30:00", "2025-03-10 11:00:00").build());
        h.handler.add_notification("first", ItemChange::Inserted);
        h.handler.add_notification("second", ItemChange::Inserted);

        h.advance_to(utc(2025, 3, 10, 9, 30)).await;
        assert!(h.handler.presence());

        h.handler.mark_meetings_left();
        assert!(!h.handler.presence());
        h.handler.evaluate_meeting_presence();
        assert!(!h.handler.presence());

        h.advance_to(utc(2025, 3, 10, 10, 45)).await;
        assert!(h.handler.presence());
    }

    #[tokio::test(start_paused = true)]
    async fn test_left_flag_survives_update_of_running_meeting() {
        let h = harness();
        h.source.insert("first", snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00").build());
        h.source.insert("second", snapshot("2025-03-10 10:30:00", "2025-03-10 11:00:00").build());
        h.handler.add_notification("first", ItemChange::Inserted);
        h.handler.add_notification("second", ItemChange::Inserted);

        h.advance_to(utc(2025, 3, 10, 9, 30)).await;
        h.handler.mark_meetings_left();
        assert!(!h.handler.presence());

        h.source.insert(
            "first",
            snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00")
                .subject("Renamed by organiser")
                .build(),
        );
        h.handler.add_notification("first", ItemChange::Updated);
        h.settle().await;

        assert!(!h.handler.presence());
        assert_eq!(h.status.history(), vec![true, false]);
        let updated = h.handler.meeting("first").expect("meeting still tracked");
        assert_eq!(updated.subject.as_deref(), Some("Renamed by organiser"));
        assert!(updated.is_marked_left());

        h.advance_to(utc(2025, 3, 10, 10, 45)).await;
        assert!(h.handler.presence());
    }

    #[tokio::test(start_paused = true)]
    async fn test_left_flag_cleared_when_update_moves_meeting_later() {
        let h = harness();
        h.source.insert("first", snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00").build());
        h.handler.add_notification("first", ItemChange::Inserted);

        h.advance_to(utc(2025, 3, 10, 9, 30)).await;
        h.handler.mark_meetings_left();

        h.source.insert("first", snapshot("2025-03-10 11:00:00", "2025-03-10 12:00:00").build());
        h.handler.add_notification("first", ItemChange::Updated);
        h.settle().await;
        assert!(!h.handler.meeting("first").expect("tracked").is_marked_left());

        h.advance_to(utc(2025, 3, 10, 11, 15)).await;
        assert!(h.handler.presence());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_meeting_not_tracked() {
        let h = harness();
        h.source.insert("blip", snapshot("2025-03-10 09:00:00", "2025-03-10 09:00:09").build());
        h.handler.add_notification("blip", ItemChange::Inserted);
        h.settle().await;
        assert!(h.handler.meeting_ids().is_empty());
    }
}

mod filtering {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::declined(snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00").response(4).build())]
    #[case::not_responded(snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00").response(5).build())]
    #[case::tentative_busy(snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00").busy(1).build())]
    #[case::free(snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00").busy(0).build())]
    #[case::already_over(snapshot("2025-03-10 06:00:00", "2025-03-10 07:00:00").build())]
    #[case::other_folder(snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00").folder("shared-calendar").build())]
    #[tokio::test(start_paused = true)]
    async fn test_ignored_items(#[case] props: Vec<calpresence_core::models::PropertyValue>) {
        let h = harness();
        h.source.insert("item", props);
        h.handler.add_notification("item", ItemChange::Inserted);
        h.settle().await;
        assert!(h.handler.meeting_ids().is_empty());
        assert!(h.status.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_series_ignored() {
        let h = harness();
        let blob = PatternBuilder::daily(2025, 3, 1).end_by(2025, 3, 5).build();
        h.source.insert(
            "old-series",
            snapshot("2025-03-01 09:00:00", "2025-03-01 10:00:00").recurrence(&blob).build(),
        );
        h.handler.add_notification("old-series", ItemChange::Inserted);
        h.settle().await;
        assert!(h.handler.meeting_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_blob_tracked_as_one_off() {
        let h = harness();
        h.source.insert(
            "broken",
            snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00")
                .recurrence_hex("04300430")
                .build(),
        );
        h.handler.add_notification("broken", ItemChange::Inserted);
        h.settle().await;
        let meeting = h.handler.meeting("broken").unwrap();
        assert!(!meeting.is_recurring());
    }
}

mod notifications {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_update_replaces_meeting_without_flicker() {
        let h = harness();
        h.source.insert("m", snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00").build());
        h.handler.add_notification("m", ItemChange::Inserted);

        h.advance_to(utc(2025, 3, 10, 9, 30)).await;
        assert_eq!(h.handler.tracker().count(), 1);

        h.source.insert("m", snapshot("2025-03-10 09:00:00", "2025-03-10 11:00:00").build());
        h.handler.add_notification("m", ItemChange::Updated);
        h.settle().await;
        assert_eq!(h.handler.tracker().count(), 1);

        h.advance_to(utc(2025, 3, 10, 10, 30)).await;
        assert_eq!(h.handler.tracker().count(), 1);
        assert!(h.handler.presence());

        h.advance_to(utc(2025, 3, 10, 11, 5)).await;
        assert_eq!(h.handler.tracker().count(), 0);
        assert_eq!(h.status.history(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_in_progress_meeting() {
        let h = harness();
        h.source.insert("m", snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00").build());
        h.handler.add_notification("m", ItemChange::Inserted);
        h.advance_to(utc(2025, 3, 10, 9, 30)).await;
        assert!(h.handler.presence());

        h.source.remove("m");
        h.handler.add_notification("m", ItemChange::Deleted);
        h.settle().await;

        assert!(h.handler.meeting_ids().is_empty());
        assert_eq!(h.handler.tracker().count(), 0);
        assert!(!h.handler.presence());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotated_id_retires_old_entry() {
        let h = harness();
        let props = snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00")
            .subject("Planning")
            .build();
        h.source.insert("old-id", props.clone());
        h.handler.add_notification("old-id", ItemChange::Inserted);
        h.settle().await;

        h.source.remove("old-id");
        h.source.insert("new-id", props);
        h.handler.add_notification("new-id", ItemChange::Updated);
        h.settle().await;

        assert_eq!(h.handler.meeting_ids(), vec!["new-id"]);
        h.advance_to(utc(2025, 3, 10, 9, 30)).await;
        assert_eq!(h.handler.tracker().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_io_failures_retried_with_backoff() {
        let h = harness();
        h.source.insert("m", snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00").build());
        h.source.fail_next(2);
        h.handler.add_notification("m", ItemChange::Inserted);

        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        assert_eq!(h.source.fetch_count(), 3);
        assert_eq!(h.handler.meeting_ids(), vec!["m"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_item_is_noop() {
        let h = harness();
        h.handler.add_notification("ghost", ItemChange::Deleted);
        h.settle().await;
        assert!(h.handler.meeting_ids().is_empty());
        assert_eq!(h.source.fetch_count(), 1);
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_start_syncs_all_items() {
        let h = harness();
        h.daily_at("standup", 9 * 60, 10 * 60);
        h.source.insert("lunch", snapshot("2025-03-10 12:00:00", "2025-03-10 13:00:00").build());
        h.handler.start();
        h.handler.start();
        h.settle().await;
        assert_eq!(h.handler.meeting_ids(), vec!["lunch", "standup"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_evaluation_drops_finished() {
        let h = harness();
        h.source.insert("early", snapshot("2025-03-10 08:05:00", "2025-03-10 08:15:00").build());
        h.handler.start();
        h.settle().await;
        assert_eq!(h.handler.meeting_ids(), vec!["early"]);

        h.advance_to(utc(2025, 3, 10, 8, 21)).await;
        assert!(h.handler.meeting_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_everything() {
        let h = harness();
        h.source.insert("m", snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00").build());
        h.handler.start();
        h.advance_to(utc(2025, 3, 10, 9, 30)).await;
        assert!(h.handler.presence());

        h.handler.stop();
        assert!(!h.handler.presence());
        assert!(h.handler.meeting_ids().is_empty());
        assert_eq!(h.handler.tracker().count(), 0);
        assert_eq!(h.status.history().last(), Some(&false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dump_lists_meetings() {
        let h = harness();
        h.daily_at("standup", 9 * 60, 10 * 60);
        h.handler.add_notification("standup", ItemChange::Inserted);
        h.settle().await;

        let dump = h.handler.dump_state();
        assert!(dump.contains("=== calendar presence ==="));
        assert!(dump.contains("meeting standup"));
        assert!(dump.contains("[scheduled]"));
        assert!(dump.contains("rule: daily every 1"));
    }
}

#[test]
fn test_memory_source_failures() {
    let source = MemorySource::new();
    source.insert("a", snapshot("2025-03-10 09:00:00", "2025-03-10 10:00:00").build());
    source.fail_next(1);

    let failed = tokio_test::block_on(source.fetch_item("a"));
    assert_err!(&failed);
    assert_eq!(failed, Err(SourceError::Io("connection reset".into())));
    let fetched = tokio_test::block_on(source.fetch_item("a"));
    assert_ok!(&fetched);

    let ids = tokio_test::block_on(source.list_item_ids(FolderKind::Calendar)).unwrap();
    assert_eq!(ids, vec!["a"]);
}
