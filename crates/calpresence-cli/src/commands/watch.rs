use crate::cli::WatchCommand;
use crate::config::Config;
use crate::parser::parse_reference_time;
use crate::snapshot::{LoggingStatus, ShiftedClock, SnapshotFile, SnapshotSource};
use crate::timezone::LogAnalytics;
use crate::views::table::display_transitions;
use anyhow::{Context, Result};
use calpresence_core::clock::Clock;
use calpresence_core::handler::CalendarDataHandler;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::info;

pub async fn watch_command(command: WatchCommand, config: &Config) -> Result<()> {
    let snapshot = SnapshotFile::load(&command.snapshot)
        .with_context(|| format!("Failed to load snapshot '{}'", command.snapshot.display()))?;

    let start = match command.at.as_deref() {
        Some(text) => parse_reference_time(text, config.default_zone())?,
        None => Utc::now(),
    };
    let clock = ShiftedClock::starting_at(start);

    let source = Arc::new(SnapshotSource::new(&snapshot)?);
    let status = Arc::new(LoggingStatus::new(clock));
    let handler = CalendarDataHandler::new(
        source.clone(),
        status.clone(),
        Arc::new(LogAnalytics),
        Arc::new(clock),
        config.tracker.clone(),
    )?;

    info!(
        items = snapshot.items.len(),
        changes = snapshot.changes.len(),
        start = %clock.now(),
        "Replaying calendar snapshot"
    );
    handler.start();

    let began = Instant::now();
    let deadline = began + Duration::from_secs(command.duration_secs);
    for change in &snapshot.changes {
        let at = began + Duration::from_secs(change.after_secs);
        if at > deadline {
            break;
        }
        sleep_until(at).await;
        source.apply(change).await?;
        handler.add_notification(change.id.clone(), change.change);
    }
    sleep_until(deadline).await;

    print!("{}", handler.dump_state());
    handler.stop();
    display_transitions(&status.transitions(), config.default_zone());
    Ok(())
}
