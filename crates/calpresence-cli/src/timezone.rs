use calpresence_core::source::AnalyticsSink;
use calpresence_core::timezone::{TimeZoneList, ZoneLookup, WINDOWS_ZONES};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::warn;

/// Analytics sink that reports unknown zone names to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAnalytics;

impl AnalyticsSink for LogAnalytics {
    fn unknown_time_zone(&self, name: &str, fallback: &str) {
        warn!(zone_name = %name, fallback = %fallback, "analytics: unknown time zone");
    }
}

/// Resolve an optional zone argument; `None` means the configured default.
pub fn resolve_zone_arg(name: Option<&str>, default_zone: Tz) -> ZoneLookup {
    match name {
        Some(name) => TimeZoneList::new(default_zone, Arc::new(LogAnalytics)).resolve(name),
        None => ZoneLookup {
            zone: default_zone,
            exact: true,
        },
    }
}

/// Windows key names and their IANA zones, filtered by a case-insensitive
/// substring of either side.
pub fn windows_zones(search: Option<&str>) -> Vec<(&'static str, &'static str)> {
    let needle = search.map(str::to_lowercase);
    WINDOWS_ZONES
        .iter()
        .filter(|(windows, iana)| match &needle {
            Some(needle) => {
                windows.to_lowercase().contains(needle) || iana.to_lowercase().contains(needle)
            }
            None => true,
        })
        .copied()
        .collect()
}

/// `2025-03-10 09:00 EDT (-04:00)`
pub fn format_in_zone(instant: DateTime<Utc>, tz: Tz) -> String {
    let local = instant.with_timezone(&tz);
    format!("{} ({})", local.format("%Y-%m-%d %H:%M %Z"), local.format("%:z"))
}
