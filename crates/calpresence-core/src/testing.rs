//! Builders and in-memory collaborators for tests and benches. Compiled for
//! unit tests and behind the `testing` feature.
//!
//! [`PatternBuilder`] writes recurrence blobs in the exact byte layout the
//! decoder reads, [`SnapshotBuilder`] produces property snapshots, and
//! [`MemorySource`] / [`RecordingStatus`] stand in for the calendar server and
//! the global status service.

use crate::error::SourceError;
use crate::models::{BusyStatus, FolderKind, MeetingProperty, PropertyValue};
use crate::timezone::local_to_minutes;
use crate::tracker::GlobalStatusService;
use crate::source::CalendarSource;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Folder id reported by [`MemorySource`] and used by [`snapshot`].
pub const TEST_CALENDAR_FOLDER: &str = "calendar-folder";

/// `(year, month, day, minutes after midnight)` in the creation zone.
pub type LocalStamp = (i32, u32, u32, u32);

fn stamp_minutes(stamp: LocalStamp) -> u32 {
    let (y, m, d, minutes) = stamp;
    let date = NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN);
    let local = date.and_time(NaiveTime::MIN) + chrono::Duration::minutes(i64::from(minutes));
    local_minutes(local)
}

fn date_minutes(y: i32, m: u32, d: u32) -> u32 {
    stamp_minutes((y, m, d, 0))
}

fn local_minutes(local: NaiveDateTime) -> u32 {
    u32::try_from(local_to_minutes(local)).unwrap_or(0)
}

struct ExceptionSpec {
    start: u32,
    end: u32,
    original_start: u32,
    subject: Option<String>,
    location: Option<String>,
    busy: Option<BusyStatus>,
}

/// Writes `PidLidAppointmentRecur` blobs. Defaults to a never-ending series
/// running 09:00 to 10:00.
pub struct PatternBuilder {
    frequency: u16,
    pattern_type: u16,
    period: u32,
    specific: Vec<u32>,
    end_type: u32,
    occurrence_count: u32,
    first_dow: u32,
    deleted: Vec<u32>,
    deleted_count: Option<u32>,
    modified: Vec<u32>,
    start_date: u32,
    end_date: u32,
    start_offset: u32,
    end_offset: u32,
    exceptions: Vec<ExceptionSpec>,
}

impl PatternBuilder {
    fn new(frequency: u16, pattern_type: u16, period: u32, specific: Vec<u32>, start: (i32, u32, u32)) -> Self {
        Self {
            frequency,
            pattern_type,
            period,
            specific,
            end_type: 0x2023,
            occurrence_count: 10,
            first_dow: 0,
            deleted: Vec::new(),
            deleted_count: None,
            modified: Vec::new(),
            start_date: date_minutes(start.0, start.1, start.2),
            end_date: date_minutes(4500, 8, 31),
            start_offset: 9 * 60,
            end_offset: 10 * 60,
            exceptions: Vec::new(),
        }
    }

    pub fn daily(y: i32, m: u32, d: u32) -> Self {
        Self::new(0x200A, 0x0000, 24 * 60, Vec::new(), (y, m, d))
    }

    pub fn weekly(y: i32, m: u32, d: u32, days: &[Weekday]) -> Self {
        let mask = crate::recurrence::WeekdayMask::from_days(days);
        Self::new(0x200B, 0x0001, 1, vec![u32::from(mask.bits())], (y, m, d))
    }

    pub fn monthly(y: i32, m: u32, d: u32, day_of_month: u32) -> Self {
        Self::new(0x200C, 0x0002, 1, vec![day_of_month], (y, m, d))
    }

    pub fn month_end(y: i32, m: u32, d: u32) -> Self {
        Self::new(0x200C, 0x0004, 1, vec![31], (y, m, d))
    }

    pub fn month_nth(y: i32, m: u32, d: u32, mask: u32, nth: u32) -> Self {
        Self::new(0x200C, 0x0003, 1, vec![mask, nth], (y, m, d))
    }

    /// Raw period as stored in the blob; daily patterns count minutes.
    pub fn period(mut self, period: u32) -> Self {
        self.period = period;
        self
    }

    pub fn pattern_type(mut self, pattern_type: u16) -> Self {
        self.pattern_type = pattern_type;
        self
    }

    pub fn end_type(mut self, end_type: u32) -> Self {
        self.end_type = end_type;
        self
    }

    pub fn end_by(mut self, y: i32, m: u32, d: u32) -> Self {
        self.end_type = 0x2021;
        self.end_date = date_minutes(y, m, d);
        self
    }

    pub fn end_after(mut self, count: u32, last: (i32, u32, u32)) -> Self {
        self.end_type = 0x2022;
        self.occurrence_count = count;
        self.end_date = date_minutes(last.0, last.1, last.2);
        self
    }

    pub fn first_dow(mut self, day: Weekday) -> Self {
        self.first_dow = day.num_days_from_sunday();
        self
    }

    pub fn delete(mut self, y: i32, m: u32, d: u32) -> Self {
        self.deleted.push(date_minutes(y, m, d));
        self
    }

    /// Overrides the written deleted-instance count without adding dates.
    pub fn raw_deleted_count(mut self, count: u32) -> Self {
        self.deleted_count = Some(count);
        self
    }

    pub fn modify(mut self, y: i32, m: u32, d: u32) -> Self {
        self.modified.push(date_minutes(y, m, d));
        self
    }

    /// Start and end as minutes after local midnight.
    pub fn times(mut self, start_offset: u32, end_offset: u32) -> Self {
        self.start_offset = start_offset;
        self.end_offset = end_offset;
        self
    }

    pub fn exception(self, start: LocalStamp, end: LocalStamp, original_start: LocalStamp) -> Self {
        self.exception_with_fields(start, end, original_start, None, None, None)
    }

    pub fn exception_with_fields(
        mut self,
        start: LocalStamp,
        end: LocalStamp,
        original_start: LocalStamp,
        subject: Option<&str>,
        location: Option<&str>,
        busy: Option<BusyStatus>,
    ) -> Self {
        self.exceptions.push(ExceptionSpec {
            start: stamp_minutes(start),
            end: stamp_minutes(end),
            original_start: stamp_minutes(original_start),
            subject: subject.map(str::to_string),
            location: location.map(str::to_string),
            busy,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        put_u16(&mut out, 0x3004);
        put_u16(&mut out, 0x3004);
        put_u16(&mut out, self.frequency);
        put_u16(&mut out, self.pattern_type);
        put_u16(&mut out, 0);
        put_u32(&mut out, 0);
        put_u32(&mut out, self.period);
        put_u32(&mut out, 0);
        for value in &self.specific {
            put_u32(&mut out, *value);
        }
        put_u32(&mut out, self.end_type);
        put_u32(&mut out, self.occurrence_count);
        put_u32(&mut out, self.first_dow);

        put_u32(&mut out, self.deleted_count.unwrap_or(self.deleted.len() as u32));
        for date in &self.deleted {
            put_u32(&mut out, *date);
        }
        put_u32(&mut out, self.modified.len() as u32);
        for date in &self.modified {
            put_u32(&mut out, *date);
        }
        put_u32(&mut out, self.start_date);
        put_u32(&mut out, self.end_date);
        put_u32(&mut out, 0x3006);
        put_u32(&mut out, 0x3009);
        put_u32(&mut out, self.start_offset);
        put_u32(&mut out, self.end_offset);

        put_u16(&mut out, self.exceptions.len() as u16);
        for ex in &self.exceptions {
            put_u32(&mut out, ex.start);
            put_u32(&mut out, ex.end);
            put_u32(&mut out, ex.original_start);
            let mut flags = 0u16;
            if ex.subject.is_some() {
                flags |= 0x0001;
            }
            if ex.location.is_some() {
                flags |= 0x0010;
            }
            if ex.busy.is_some() {
                flags |= 0x0020;
            }
            put_u16(&mut out, flags);
            if let Some(subject) = &ex.subject {
                put_short_string(&mut out, subject);
            }
            if let Some(location) = &ex.location {
                put_short_string(&mut out, location);
            }
            if let Some(busy) = ex.busy {
                put_u32(&mut out, busy_code(busy));
            }
        }
        out
    }

    pub fn build_hex(&self) -> String {
        hex::encode_upper(self.build())
    }
}

fn busy_code(busy: BusyStatus) -> u32 {
    match busy {
        BusyStatus::Free => 0,
        BusyStatus::Tentative => 1,
        BusyStatus::Busy => 2,
        BusyStatus::OutOfOffice => 3,
        BusyStatus::WorkingElsewhere => 4,
        BusyStatus::Unknown(v) => v as u32,
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_short_string(out: &mut Vec<u8>, value: &str) {
    let len = value.len() as u16;
    put_u16(out, len + 1);
    put_u16(out, len);
    out.extend_from_slice(value.as_bytes());
}

/// Start a property snapshot for a busy, accepted meeting in the test
/// calendar folder. Times are GMT strings.
pub fn snapshot(start: &str, end: &str) -> SnapshotBuilder {
    let mut values = vec![PropertyValue::Empty; MeetingProperty::ALL.len()];
    values[MeetingProperty::Start.index()] = PropertyValue::Str(start.to_string());
    values[MeetingProperty::End.index()] = PropertyValue::Str(end.to_string());
    values[MeetingProperty::BusyStatus.index()] = PropertyValue::Long(2);
    values[MeetingProperty::ResponseStatus.index()] = PropertyValue::Long(3);
    values[MeetingProperty::ParentFolderId.index()] = PropertyValue::Str(TEST_CALENDAR_FOLDER.to_string());
    SnapshotBuilder { values }
}

pub struct SnapshotBuilder {
    values: Vec<PropertyValue>,
}

impl SnapshotBuilder {
    fn set(mut self, property: MeetingProperty, value: PropertyValue) -> Self {
        self.values[property.index()] = value;
        self
    }

    pub fn busy(self, code: i64) -> Self {
        self.set(MeetingProperty::BusyStatus, PropertyValue::Long(code))
    }

    pub fn response(self, code: i64) -> Self {
        self.set(MeetingProperty::ResponseStatus, PropertyValue::Long(code))
    }

    pub fn recurrence(self, blob: &[u8]) -> Self {
        self.recurrence_hex(&hex::encode_upper(blob))
    }

    pub fn recurrence_hex(self, blob: &str) -> Self {
        self.set(MeetingProperty::RecurrenceBlob, PropertyValue::Str(blob.to_string()))
    }

    pub fn pattern_text(self, text: &str) -> Self {
        self.set(MeetingProperty::PatternText, PropertyValue::Str(text.to_string()))
    }

    pub fn time_zone(self, name: &str) -> Self {
        self.set(MeetingProperty::TimeZoneName, PropertyValue::Str(name.to_string()))
    }

    pub fn folder(self, folder: &str) -> Self {
        self.set(MeetingProperty::ParentFolderId, PropertyValue::Str(folder.to_string()))
    }

    pub fn subject(self, subject: &str) -> Self {
        self.set(MeetingProperty::Subject, PropertyValue::Str(subject.to_string()))
    }

    pub fn build(self) -> Vec<PropertyValue> {
        self.values
    }
}

/// Calendar source backed by an in-memory map.
#[derive(Debug, Default)]
pub struct MemorySource {
    items: Mutex<BTreeMap<String, Vec<PropertyValue>>>,
    folder: Mutex<Option<String>>,
    failures: AtomicUsize,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        let source = Self::default();
        *source.folder.lock() = Some(TEST_CALENDAR_FOLDER.to_string());
        source
    }

    pub fn insert(&self, id: &str, properties: Vec<PropertyValue>) {
        self.items.lock().insert(id.to_string(), properties);
    }

    pub fn remove(&self, id: &str) {
        self.items.lock().remove(id);
    }

    pub fn set_default_folder(&self, folder: Option<&str>) {
        *self.folder.lock() = folder.map(str::to_string);
    }

    /// Make the next `count` fetches fail with a retryable I/O error.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalendarSource for MemorySource {
    async fn fetch_item(&self, id: &str) -> Result<Option<Vec<PropertyValue>>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let pending = self.failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures.store(pending - 1, Ordering::SeqCst);
            return Err(SourceError::Io("connection reset".to_string()));
        }
        Ok(self.items.lock().get(id).cloned())
    }

    async fn list_item_ids(&self, _folder: FolderKind) -> Result<Vec<String>, SourceError> {
        Ok(self.items.lock().keys().cloned().collect())
    }

    async fn default_folder_id(&self) -> Result<Option<String>, SourceError> {
        Ok(self.folder.lock().clone())
    }
}

/// Status service that records every presence change it is given.
#[derive(Debug, Default)]
pub struct RecordingStatus {
    history: Mutex<Vec<bool>>,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<bool> {
        self.history.lock().clone()
    }

    pub fn current(&self) -> bool {
        self.history.lock().last().copied().unwrap_or(false)
    }
}

impl GlobalStatusService for RecordingStatus {
    fn set_in_meeting(&self, in_meeting: bool) {
        self.history.lock().push(in_meeting);
    }
}
