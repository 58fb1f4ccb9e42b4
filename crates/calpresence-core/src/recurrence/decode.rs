//! Little-endian reader for the `PidLidAppointmentRecur` blob.

use super::{
    ExceptionInfo, PatternKind, RecurFrequency, RecurringPattern, SeriesEnd, WeekdayMask,
    MAX_INSTANCE_COUNT, MINUTES_PER_DAY,
};
use crate::error::PatternError;
use crate::models::BusyStatus;
use crate::timezone::minutes_to_local;
use chrono::{NaiveDate, NaiveDateTime, Weekday};
use chrono_tz::Tz;
use std::collections::BTreeSet;

const PATTERN_DAY: u16 = 0x0000;
const PATTERN_WEEK: u16 = 0x0001;
const PATTERN_MONTH: u16 = 0x0002;
const PATTERN_MONTH_NTH: u16 = 0x0003;
const PATTERN_MONTH_END: u16 = 0x0004;
const PATTERN_HJ_MONTH: u16 = 0x000A;
const PATTERN_HJ_MONTH_NTH: u16 = 0x000B;
const PATTERN_HJ_MONTH_END: u16 = 0x000C;

const END_AFTER_DATE: u32 = 0x2021;
const END_AFTER_COUNT: u32 = 0x2022;
const END_NEVER: u32 = 0x2023;
const END_NEVER_QUIRK: u32 = 0xFFFF_FFFF;

const ARO_SUBJECT: u16 = 0x0001;
const ARO_MEETINGTYPE: u16 = 0x0002;
const ARO_REMINDERDELTA: u16 = 0x0004;
const ARO_REMINDER: u16 = 0x0008;
const ARO_LOCATION: u16 = 0x0010;
const ARO_BUSYSTATUS: u16 = 0x0020;
const ARO_ATTACHMENT: u16 = 0x0040;
const ARO_SUBTYPE: u16 = 0x0080;
const ARO_APPTCOLOR: u16 = 0x0100;

/// Every day of the week.
const ALL_DAYS_MASK: u32 = 0x7F;
const LAST_WEEK_OF_MONTH: u32 = 5;

struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.offset)
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], PatternError> {
        if self.remaining() < needed {
            return Err(PatternError::Truncated {
                offset: self.offset,
                needed,
            });
        }
        let slice = &self.bytes[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, PatternError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, PatternError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn counted(&mut self, field: &'static str) -> Result<u32, PatternError> {
        let count = self.u32()?;
        check_count(field, count)?;
        Ok(count)
    }

    /// ANSI string stored as two u16 lengths followed by the bytes.
    fn short_string(&mut self) -> Result<String, PatternError> {
        let _length = self.u16()?;
        let length = self.u16()?;
        let raw = self.take(usize::from(length))?;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }
}

fn check_count(field: &'static str, count: u32) -> Result<(), PatternError> {
    if count > MAX_INSTANCE_COUNT {
        return Err(PatternError::CountTooLarge {
            field,
            count,
            limit: MAX_INSTANCE_COUNT,
        });
    }
    Ok(())
}

fn local(minutes: u32) -> Result<NaiveDateTime, PatternError> {
    minutes_to_local(minutes).ok_or(PatternError::DateOutOfRange(minutes))
}

fn local_date(minutes: u32) -> Result<NaiveDate, PatternError> {
    local(minutes).map(|dt| dt.date())
}

fn weekday_from_index(index: u32) -> Weekday {
    match index {
        1 => Weekday::Mon,
        2 => Weekday::Tue,
        3 => Weekday::Wed,
        4 => Weekday::Thu,
        5 => Weekday::Fri,
        6 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

pub(super) fn decode(
    bytes: &[u8],
    time_zone: Tz,
    default_busy: BusyStatus,
) -> Result<RecurringPattern, PatternError> {
    let mut r = ByteReader::new(bytes);

    let reader_version = r.u16()?;
    let writer_version = r.u16()?;
    let frequency = RecurFrequency::from(r.u16()?);
    let pattern_type = r.u16()?;
    let calendar_type = r.u16()?;
    let _first_date_time = r.u32()?;
    let raw_period = r.u32()?;
    let _sliding_flag = r.u32()?;

    if raw_period == 0 || raw_period > i32::MAX as u32 {
        return Err(PatternError::InvalidPeriod(raw_period));
    }

    let kind = match pattern_type {
        PATTERN_DAY => PatternKind::Daily,
        PATTERN_WEEK => PatternKind::Weekly {
            days: WeekdayMask::from_bits(r.u32()?),
        },
        PATTERN_MONTH | PATTERN_HJ_MONTH => PatternKind::Monthly { day: r.u32()? },
        PATTERN_MONTH_END | PATTERN_HJ_MONTH_END => {
            let _day = r.u32()?;
            PatternKind::MonthEnd
        }
        PATTERN_MONTH_NTH | PATTERN_HJ_MONTH_NTH => {
            let mask = r.u32()?;
            let nth = r.u32()?;
            // Outlook writes "last day of every month" as every-day/5th.
            if mask & ALL_DAYS_MASK == ALL_DAYS_MASK && nth == LAST_WEEK_OF_MONTH {
                PatternKind::MonthEnd
            } else {
                PatternKind::MonthNth {
                    days: WeekdayMask::from_bits(mask),
                    nth,
                }
            }
        }
        other => return Err(PatternError::UnknownPatternType(other)),
    };

    // Daily periods are stored in minutes; everything else in weeks/months.
    let period = match kind {
        PatternKind::Daily => (raw_period / MINUTES_PER_DAY).max(1),
        _ => raw_period,
    };

    let end_type = r.u32()?;
    let occurrence_count = r.u32()?;
    let first_dow = weekday_from_index(r.u32()?);

    let deleted_count = r.counted("deleted instance")?;
    let mut deleted = BTreeSet::new();
    for _ in 0..deleted_count {
        deleted.insert(local_date(r.u32()?)?);
    }

    let modified_count = r.counted("modified instance")?;
    let mut modified = Vec::with_capacity((modified_count as usize).min(r.remaining() / 4));
    for _ in 0..modified_count {
        modified.push(local_date(r.u32()?)?);
    }

    let start_date = local_date(r.u32()?)?;
    let end_date = local_date(r.u32()?)?;

    let series_end = match end_type {
        END_NEVER | END_NEVER_QUIRK => SeriesEnd::Never,
        END_AFTER_COUNT => SeriesEnd::AfterCount(occurrence_count),
        END_AFTER_DATE => SeriesEnd::AfterDate,
        other => {
            tracing::debug!(end_type = other, "Unknown recurrence end type, bounding by end date");
            SeriesEnd::AfterDate
        }
    };

    let _reader_version2 = r.u32()?;
    let writer_version2 = r.u32()?;
    let start_offset = r.u32()?;
    let end_offset = r.u32()?;

    let exception_count = u32::from(r.u16()?);
    check_count("exception", exception_count)?;
    let mut exceptions = Vec::with_capacity((exception_count as usize).min(r.remaining() / 14));
    for _ in 0..exception_count {
        exceptions.push(read_exception(&mut r, default_busy)?);
    }

    Ok(RecurringPattern {
        reader_version,
        writer_version,
        writer_version2,
        frequency,
        pattern_type,
        calendar_type,
        kind,
        period,
        first_dow,
        series_end,
        start_date,
        end_date,
        start_offset,
        end_offset,
        deleted,
        modified,
        exceptions,
        time_zone,
        default_busy,
    })
}

/// Walks one ExceptionInfo record. Optional fields appear strictly in
/// override-flag order.
fn read_exception(
    r: &mut ByteReader<'_>,
    default_busy: BusyStatus,
) -> Result<ExceptionInfo, PatternError> {
    let start = local(r.u32()?)?;
    let end = local(r.u32()?)?;
    let original_start = local(r.u32()?)?;
    let flags = r.u16()?;

    let mut exception = ExceptionInfo {
        start,
        end,
        original_start,
        override_flags: flags,
        subject: None,
        meeting_type: None,
        reminder_delta: None,
        reminder_set: None,
        location: None,
        busy_status: default_busy,
        attachment: None,
        sub_type: None,
        appointment_color: None,
    };

    if flags & ARO_SUBJECT != 0 {
        exception.subject = Some(r.short_string()?);
    }
    if flags & ARO_MEETINGTYPE != 0 {
        exception.meeting_type = Some(r.u32()?);
    }
    if flags & ARO_REMINDERDELTA != 0 {
        exception.reminder_delta = Some(r.u32()?);
    }
    if flags & ARO_REMINDER != 0 {
        exception.reminder_set = Some(r.u32()? != 0);
    }
    if flags & ARO_LOCATION != 0 {
        exception.location = Some(r.short_string()?);
    }
    if flags & ARO_BUSYSTATUS != 0 {
        exception.busy_status = BusyStatus::from(i64::from(r.u32()?));
    }
    if flags & ARO_ATTACHMENT != 0 {
        exception.attachment = Some(r.u32()? != 0);
    }
    if flags & ARO_SUBTYPE != 0 {
        exception.sub_type = Some(r.u32()? != 0);
    }
    if flags & ARO_APPTCOLOR != 0 {
        exception.appointment_color = Some(r.u32()?);
    }

    Ok(exception)
}
