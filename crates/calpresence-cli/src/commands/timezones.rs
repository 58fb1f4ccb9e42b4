use crate::cli::TimezonesCommand;
use crate::config::Config;
use crate::timezone::{format_in_zone, resolve_zone_arg, windows_zones};
use crate::views::table::display_zone_map;
use anyhow::Result;
use chrono::Utc;
use owo_colors::OwoColorize;

pub async fn timezones_command(command: TimezonesCommand, config: &Config) -> Result<()> {
    if let Some(name) = command.resolve.as_deref() {
        let lookup = resolve_zone_arg(Some(name), config.default_zone());
        let kind = if lookup.exact {
            "exact".green().to_string()
        } else {
            "fallback".yellow().to_string()
        };
        println!("{} -> {} ({})", name, lookup.zone, kind);
        println!("local time: {}", format_in_zone(Utc::now(), lookup.zone));
        return Ok(());
    }

    let entries = windows_zones(command.search.as_deref());
    display_zone_map(&entries);
    Ok(())
}
