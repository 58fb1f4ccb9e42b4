use anyhow::Result;
use calpresence_core::error::CoreError;
use chrono::{DateTime, Utc};
use chrono_english::{parse_date_string, Dialect};
use chrono_tz::Tz;

/// Parse a reference time such as `now`, `next monday 9am` or
/// `2025-03-10 14:00`, interpreted in `tz`.
pub fn parse_reference_time(text: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let trimmed = text.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(instant.with_timezone(&Utc));
    }
    let base = Utc::now().with_timezone(&tz);
    parse_date_string(trimmed, base, Dialect::Uk)
        .map(|local| local.with_timezone(&Utc))
        .map_err(|e| {
            CoreError::InvalidInput(format!("Failed to parse time '{}': {}", text, e)).into()
        })
}
