use crate::cli::DecodeCommand;
use crate::config::Config;
use crate::timezone::resolve_zone_arg;
use crate::util::{parse_busy, read_blob_arg};
use anyhow::Result;
use calpresence_core::error::CoreError;
use calpresence_core::recurrence::{RecurringPattern, SeriesEnd};
use owo_colors::OwoColorize;

pub async fn decode_command(command: DecodeCommand, config: &Config) -> Result<()> {
    let bytes = read_blob_arg(&command.blob)?;
    let busy = parse_busy(&command.busy)?;
    let lookup = resolve_zone_arg(command.timezone.as_deref(), config.default_zone());

    let pattern =
        RecurringPattern::decode(&bytes, lookup.zone, busy).map_err(CoreError::from)?;

    print!("{}", describe(&pattern));
    if !lookup.exact {
        println!(
            "{} zone '{}' is not recognised, using {}",
            "Warning:".yellow().bold(),
            command.timezone.as_deref().unwrap_or_default(),
            lookup.zone
        );
    }
    Ok(())
}

pub fn describe(pattern: &RecurringPattern) -> String {
    let mut lines = vec![
        format!("pattern: {}", pattern.kind),
        format!("frequency: {}", pattern.frequency),
        format!("pattern type: {:#06x}", pattern.pattern_type),
        format!("calendar type: {:#06x}", pattern.calendar_type),
        format!("period: {}", pattern.period),
        format!("first day of week: {}", pattern.first_dow),
        format!("time zone: {}", pattern.time_zone),
        format!("start date: {}", pattern.start_date),
    ];
    lines.push(match pattern.series_end {
        SeriesEnd::Never => "ends: never".to_string(),
        SeriesEnd::AfterDate => format!("ends: on {}", pattern.end_date),
        SeriesEnd::AfterCount(count) => {
            format!("ends: after {} occurrences (last {})", count, pattern.end_date)
        }
    });
    lines.push(format!(
        "time: {:02}:{:02} for {} minutes",
        pattern.start_offset / 60,
        pattern.start_offset % 60,
        pattern.duration_minutes()
    ));

    if !pattern.deleted.is_empty() {
        let dates: Vec<String> = pattern.deleted.iter().map(|d| d.to_string()).collect();
        lines.push(format!("deleted: {}", dates.join(", ")));
    }
    for exception in &pattern.exceptions {
        let mut line = format!(
            "exception: {} moved to {} - {} ({:?})",
            exception.original_start, exception.start, exception.end, exception.busy_status
        );
        if let Some(subject) = &exception.subject {
            line.push_str(&format!(" \"{}\"", subject));
        }
        lines.push(line);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use calpresence_core::models::BusyStatus;
    use calpresence_core::testing::PatternBuilder;
    use chrono::Weekday;

    #[test]
    fn test_describe_weekly_series() {
        let blob = PatternBuilder::weekly(2025, 3, 3, &[Weekday::Mon, Weekday::Wed])
            .end_by(2025, 6, 30)
            .delete(2025, 3, 5)
            .build();
        let pattern = RecurringPattern::decode(&blob, chrono_tz::UTC, BusyStatus::Busy).unwrap();
        let text = describe(&pattern);

        assert!(text.contains("pattern: weekly on Mon,Wed"));
        assert!(text.contains("ends: on 2025-06-30"));
        assert!(text.contains("time: 09:00 for 60 minutes"));
        assert!(text.contains("deleted: 2025-03-05"));
    }

    #[test]
    fn test_describe_never_ending_daily() {
        let blob = PatternBuilder::daily(2025, 1, 1).end_type(0x2023).build();
        let pattern = RecurringPattern::decode(&blob, chrono_tz::UTC, BusyStatus::Busy).unwrap();
        assert!(describe(&pattern).contains("ends: never"));
    }
}
