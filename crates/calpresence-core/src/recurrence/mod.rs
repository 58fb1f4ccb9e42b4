//! Outlook recurrence patterns.
//!
//! [`RecurringPattern`] is decoded from the binary `PidLidAppointmentRecur`
//! property and answers one question for the presence tracker: when does the
//! next instance of this series happen?
//!
//! All dates inside the blob are minutes since 1601-01-01 expressed in the
//! zone the meeting was created in. Occurrences are computed on local dates
//! and converted to UTC one at a time with the offset in force on that date,
//! so a weekly 09:00 meeting stays at 09:00 local across DST changes.

mod decode;
mod occurrence;

use crate::error::{CoreError, PatternError};
use crate::models::BusyStatus;
use crate::timezone::local_to_utc;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::fmt;

/// Upper bound for the instance and exception counts of a single blob.
pub const MAX_INSTANCE_COUNT: u32 = 16384;

pub(crate) const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurFrequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Other(u16),
}

impl From<u16> for RecurFrequency {
    fn from(value: u16) -> Self {
        match value {
            0x200A => RecurFrequency::Daily,
            0x200B => RecurFrequency::Weekly,
            0x200C => RecurFrequency::Monthly,
            0x200D => RecurFrequency::Yearly,
            other => RecurFrequency::Other(other),
        }
    }
}

impl fmt::Display for RecurFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecurFrequency::Daily => write!(f, "daily"),
            RecurFrequency::Weekly => write!(f, "weekly"),
            RecurFrequency::Monthly => write!(f, "monthly"),
            RecurFrequency::Yearly => write!(f, "yearly"),
            RecurFrequency::Other(v) => write!(f, "other({:#06x})", v),
        }
    }
}

/// Seven-bit day mask, Sunday in bit 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekdayMask(u8);

impl WeekdayMask {
    pub fn from_bits(bits: u32) -> Self {
        Self((bits & 0x7F) as u8)
    }

    pub fn from_days(days: &[Weekday]) -> Self {
        let bits = days
            .iter()
            .fold(0u8, |acc, day| acc | (1 << day.num_days_from_sunday()));
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_sunday()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn days(self) -> Vec<Weekday> {
        let mut day = Weekday::Sun;
        let mut days = Vec::new();
        for _ in 0..7 {
            if self.contains(day) {
                days.push(day);
            }
            day = day.succ();
        }
        days
    }
}

impl fmt::Display for WeekdayMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.days().iter().map(|d| d.to_string()).collect();
        write!(f, "{}", names.join(","))
    }
}

/// The rule that produces occurrence dates. Hijri variants are folded into
/// their Gregorian counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Daily,
    Weekly { days: WeekdayMask },
    Monthly { day: u32 },
    MonthEnd,
    /// `nth` of 1-4 picks that qualifying day; 5 (or more) picks the last.
    MonthNth { days: WeekdayMask, nth: u32 },
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternKind::Daily => write!(f, "daily"),
            PatternKind::Weekly { days } => write!(f, "weekly on {}", days),
            PatternKind::Monthly { day } => write!(f, "monthly on day {}", day),
            PatternKind::MonthEnd => write!(f, "monthly on the last day"),
            PatternKind::MonthNth { days, nth } if *nth >= 5 => {
                write!(f, "monthly on the last {}", days)
            }
            PatternKind::MonthNth { days, nth } => write!(f, "monthly on {} #{}", days, nth),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesEnd {
    AfterDate,
    AfterCount(u32),
    Never,
}

/// One modified instance of the series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    /// Local start in the creation zone.
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub original_start: NaiveDateTime,
    pub override_flags: u16,
    pub subject: Option<String>,
    pub meeting_type: Option<u32>,
    pub reminder_delta: Option<u32>,
    pub reminder_set: Option<bool>,
    pub location: Option<String>,
    /// Falls back to the meeting's own busy status when not overridden.
    pub busy_status: BusyStatus,
    pub attachment: Option<bool>,
    pub sub_type: Option<bool>,
    pub appointment_color: Option<u32>,
}

/// A concrete instance of the series in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// True when the times come from a modified instance.
    pub from_exception: bool,
}

/// Decoded recurrence rule. Immutable once decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringPattern {
    pub reader_version: u16,
    pub writer_version: u16,
    pub writer_version2: u32,
    pub frequency: RecurFrequency,
    pub pattern_type: u16,
    pub calendar_type: u16,
    pub kind: PatternKind,
    /// Days, weeks or months between occurrences depending on `kind`.
    pub period: u32,
    pub first_dow: Weekday,
    pub series_end: SeriesEnd,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Minutes after local midnight.
    pub start_offset: u32,
    pub end_offset: u32,
    pub deleted: BTreeSet<NaiveDate>,
    pub modified: Vec<NaiveDate>,
    pub exceptions: Vec<ExceptionInfo>,
    pub time_zone: Tz,
    pub default_busy: BusyStatus,
}

impl RecurringPattern {
    /// Decode a raw blob. Errors mean the item should be treated as a
    /// one-off meeting.
    pub fn decode(
        bytes: &[u8],
        time_zone: Tz,
        default_busy: BusyStatus,
    ) -> Result<Self, PatternError> {
        decode::decode(bytes, time_zone, default_busy)
    }

    /// Decode the hex form used in calendar property snapshots.
    pub fn from_hex(
        hex_blob: &str,
        time_zone: Tz,
        default_busy: BusyStatus,
    ) -> Result<Self, CoreError> {
        let bytes = hex::decode(hex_blob.trim())?;
        Ok(Self::decode(&bytes, time_zone, default_busy)?)
    }

    pub fn never_ends(&self) -> bool {
        self.series_end == SeriesEnd::Never
    }

    /// Length of one instance in minutes.
    pub fn duration_minutes(&self) -> i64 {
        (i64::from(self.end_offset) - i64::from(self.start_offset)).max(0)
    }

    /// The instance scheduled on a local date, ignoring deletions.
    pub fn occurrence_on(&self, date: NaiveDate) -> Occurrence {
        let midnight = date.and_time(chrono::NaiveTime::MIN);
        let start_local = midnight + chrono::Duration::minutes(i64::from(self.start_offset));
        let start = local_to_utc(start_local, self.time_zone);
        Occurrence {
            start,
            end: start + chrono::Duration::minutes(self.duration_minutes()),
            from_exception: false,
        }
    }

    /// The next instance whose end is after `now`, or `None` when the series
    /// has no more instances.
    pub fn next_meeting(&self, now: DateTime<Utc>) -> Option<Occurrence> {
        let computed = self.next_computed(now);
        let chosen = match self.pending_exception(now) {
            Some(exception) => Some(exception),
            None => computed,
        }?;

        let start_date = chosen.start.with_timezone(&self.time_zone).date_naive();
        if !self.never_ends() && start_date > self.end_date {
            return None;
        }
        Some(chosen)
    }

    /// Up to `count` successive instances after `now`.
    pub fn occurrences(&self, now: DateTime<Utc>, count: usize) -> Vec<Occurrence> {
        let mut result = Vec::with_capacity(count.min(64));
        let mut cursor = now;
        while result.len() < count {
            match self.next_meeting(cursor) {
                Some(occurrence) if occurrence.end > cursor => {
                    cursor = occurrence.end;
                    result.push(occurrence);
                }
                _ => break,
            }
        }
        result
    }

    /// Busy exceptions still in the future; the one ending first wins.
    fn pending_exception(&self, now: DateTime<Utc>) -> Option<Occurrence> {
        self.exceptions
            .iter()
            .filter(|ex| ex.busy_status == BusyStatus::Busy && ex.start < ex.end)
            .map(|ex| Occurrence {
                start: local_to_utc(ex.start, self.time_zone),
                end: local_to_utc(ex.end, self.time_zone),
                from_exception: true,
            })
            .filter(|occ| occ.end > now)
            .min_by_key(|occ| occ.end)
    }

    fn is_deleted(&self, date: NaiveDate) -> bool {
        self.deleted.contains(&date)
    }

    fn month_index(date: NaiveDate) -> i64 {
        i64::from(date.year()) * 12 + i64::from(date.month0())
    }
}

impl fmt::Display for RecurringPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "frequency: {} (pattern type {:#06x})", self.frequency, self.pattern_type)?;
        writeln!(f, "rule: {} every {}", self.kind, self.period)?;
        writeln!(f, "first day of week: {}", self.first_dow)?;
        writeln!(f, "time zone: {}", self.time_zone)?;
        writeln!(
            f,
            "series: {} to {} ({:?})",
            self.start_date, self.end_date, self.series_end
        )?;
        writeln!(
            f,
            "time of day: +{}min to +{}min",
            self.start_offset, self.end_offset
        )?;
        writeln!(f, "deleted instances: {}", self.deleted.len())?;
        for date in &self.deleted {
            writeln!(f, "  - {}", date)?;
        }
        writeln!(f, "modified instances: {}", self.modified.len())?;
        write!(f, "exceptions: {}", self.exceptions.len())?;
        for ex in &self.exceptions {
            write!(
                f,
                "\n  * {} -> {} (was {}), busy {:?}, flags {:#06x}",
                ex.start, ex.end, ex.original_start, ex.busy_status, ex.override_flags
            )?;
            if let Some(subject) = &ex.subject {
                write!(f, ", subject '{}'", subject)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PatternBuilder;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_weekday_mask_round_trip() {
        let mask = WeekdayMask::from_days(&[Weekday::Mon, Weekday::Wed]);
        assert_eq!(mask.bits(), 0b0001010);
        assert!(mask.contains(Weekday::Mon));
        assert!(!mask.contains(Weekday::Sun));
        assert_eq!(mask.days(), vec![Weekday::Mon, Weekday::Wed]);
        assert_eq!(mask.to_string(), "Mon,Wed");
    }

    #[test]
    fn test_from_hex_accepts_snapshot_form() {
        let bytes = PatternBuilder::daily(2025, 1, 6).build();
        let hex_blob = hex::encode_upper(&bytes);
        let pattern = RecurringPattern::from_hex(&hex_blob, chrono_tz::UTC, BusyStatus::Busy).unwrap();
        assert_eq!(pattern.kind, PatternKind::Daily);
        assert_eq!(pattern.frequency, RecurFrequency::Daily);
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        let result = RecurringPattern::from_hex("zz", chrono_tz::UTC, BusyStatus::Busy);
        assert!(matches!(result, Err(CoreError::Hex(_))));
    }

    #[test]
    fn test_occurrences_preview() {
        let bytes = PatternBuilder::daily(2025, 1, 6).times(9 * 60, 9 * 60 + 30).build();
        let pattern = RecurringPattern::decode(&bytes, chrono_tz::UTC, BusyStatus::Busy).unwrap();
        let list = pattern.occurrences(utc(2025, 1, 6, 12, 0), 3);
        let starts: Vec<_> = list.iter().map(|o| o.start).collect();
        assert_eq!(
            starts,
            vec![utc(2025, 1, 7, 9, 0), utc(2025, 1, 8, 9, 0), utc(2025, 1, 9, 9, 0)]
        );
    }

    #[test]
    fn test_display_lists_exceptions() {
        let bytes = PatternBuilder::weekly(2025, 1, 6, &[Weekday::Mon])
            .exception((2025, 1, 13, 600), (2025, 1, 13, 660), (2025, 1, 13, 540))
            .build();
        let pattern = RecurringPattern::decode(&bytes, chrono_tz::UTC, BusyStatus::Busy).unwrap();
        let text = pattern.to_string();
        assert!(text.contains("weekly on Mon every 1"));
        assert!(text.contains("exceptions: 1"));
    }
}
