use crate::cli::PreviewCommand;
use crate::config::Config;
use crate::parser::parse_reference_time;
use crate::timezone::resolve_zone_arg;
use crate::util::read_blob_arg;
use crate::views::table::display_occurrences;
use anyhow::Result;
use calpresence_core::error::CoreError;
use calpresence_core::models::BusyStatus;
use calpresence_core::recurrence::RecurringPattern;
use chrono::Utc;

pub async fn preview_command(command: PreviewCommand, config: &Config) -> Result<()> {
    if command.count == 0 {
        return Err(CoreError::InvalidInput("--count must be at least 1".to_string()).into());
    }

    let bytes = read_blob_arg(&command.blob)?;
    let lookup = resolve_zone_arg(command.timezone.as_deref(), config.default_zone());
    let pattern =
        RecurringPattern::decode(&bytes, lookup.zone, BusyStatus::Busy).map_err(CoreError::from)?;

    let now = match command.now.as_deref() {
        Some(text) => parse_reference_time(text, config.default_zone())?,
        None => Utc::now(),
    };

    let occurrences = pattern.occurrences(now, command.count);
    println!("{} (zone {})", pattern.kind, pattern.time_zone);
    display_occurrences(&occurrences, now, config.default_zone());
    Ok(())
}
