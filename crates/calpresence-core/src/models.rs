use crate::error::PropertyError;
use crate::recurrence::{Occurrence, RecurringPattern};
use crate::scheduler::MeetingScheduler;
use crate::timezone::TimeZoneList;
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyStatus {
    Free,
    Tentative,
    Busy,
    OutOfOffice,
    WorkingElsewhere,
    Unknown(i64),
}

impl From<i64> for BusyStatus {
    fn from(value: i64) -> Self {
        match value {
            0 => BusyStatus::Free,
            1 => BusyStatus::Tentative,
            2 => BusyStatus::Busy,
            3 => BusyStatus::OutOfOffice,
            4 => BusyStatus::WorkingElsewhere,
            other => BusyStatus::Unknown(other),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid busy status: {0}")]
pub struct ParseBusyStatusError(String);

impl FromStr for BusyStatus {
    type Err = ParseBusyStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(BusyStatus::Free),
            "tentative" => Ok(BusyStatus::Tentative),
            "busy" => Ok(BusyStatus::Busy),
            "oof" | "outofoffice" => Ok(BusyStatus::OutOfOffice),
            "elsewhere" | "workingelsewhere" => Ok(BusyStatus::WorkingElsewhere),
            other => other
                .parse::<i64>()
                .map(BusyStatus::from)
                .map_err(|_| ParseBusyStatusError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    None,
    Organized,
    Tentative,
    Accepted,
    Declined,
    NotResponded,
    Unknown(i64),
}

impl From<i64> for ResponseStatus {
    fn from(value: i64) -> Self {
        match value {
            0 => ResponseStatus::None,
            1 => ResponseStatus::Organized,
            2 => ResponseStatus::Tentative,
            3 => ResponseStatus::Accepted,
            4 => ResponseStatus::Declined,
            5 => ResponseStatus::NotResponded,
            other => ResponseStatus::Unknown(other),
        }
    }
}

impl ResponseStatus {
    /// Only meetings the user has not declined or left unanswered count.
    pub fn is_attending(self) -> bool {
        matches!(
            self,
            ResponseStatus::None | ResponseStatus::Accepted | ResponseStatus::Organized
        )
    }
}

/// One value of a calendar item property snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Long(i64),
    Bool(bool),
    Str(String),
    Empty,
}

impl PropertyValue {
    fn as_str(&self, name: &'static str) -> Result<Option<&str>, PropertyError> {
        match self {
            PropertyValue::Str(s) if s.trim().is_empty() => Ok(None),
            PropertyValue::Str(s) => Ok(Some(s.as_str())),
            PropertyValue::Empty => Ok(None),
            _ => Err(PropertyError::WrongType { name }),
        }
    }

    fn as_long(&self, name: &'static str) -> Result<Option<i64>, PropertyError> {
        match self {
            PropertyValue::Long(v) => Ok(Some(*v)),
            PropertyValue::Empty => Ok(None),
            PropertyValue::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| PropertyError::WrongType { name }),
            PropertyValue::Bool(_) => Err(PropertyError::WrongType { name }),
        }
    }
}

/// Position of each property in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingProperty {
    Start = 0,
    End = 1,
    BusyStatus = 2,
    ResponseStatus = 3,
    RecurrenceBlob = 4,
    PatternText = 5,
    TimeZoneName = 6,
    ParentFolderId = 7,
    Subject = 8,
}

impl MeetingProperty {
    /// Properties every snapshot must carry; `Subject` is optional.
    pub const REQUIRED: usize = 8;

    pub const ALL: [MeetingProperty; 9] = [
        MeetingProperty::Start,
        MeetingProperty::End,
        MeetingProperty::BusyStatus,
        MeetingProperty::ResponseStatus,
        MeetingProperty::RecurrenceBlob,
        MeetingProperty::PatternText,
        MeetingProperty::TimeZoneName,
        MeetingProperty::ParentFolderId,
        MeetingProperty::Subject,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            MeetingProperty::Start => "start",
            MeetingProperty::End => "end",
            MeetingProperty::BusyStatus => "busy_status",
            MeetingProperty::ResponseStatus => "response_status",
            MeetingProperty::RecurrenceBlob => "recurrence_blob",
            MeetingProperty::PatternText => "pattern_text",
            MeetingProperty::TimeZoneName => "time_zone",
            MeetingProperty::ParentFolderId => "parent_folder_id",
            MeetingProperty::Subject => "subject",
        }
    }
}

/// Kind of change reported for a calendar item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemChange {
    Inserted,
    Updated,
    Deleted,
}

impl fmt::Display for ItemChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemChange::Inserted => write!(f, "inserted"),
            ItemChange::Updated => write!(f, "updated"),
            ItemChange::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderKind {
    Calendar,
}

const GMT_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"];

/// Parse a GMT date-time string from a snapshot.
pub fn parse_gmt(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim().trim_end_matches(" GMT").trim_end_matches('Z');
    if let Ok(dt) = DateTime::parse_from_rfc3339(value.trim()) {
        return Some(dt.with_timezone(&Utc));
    }
    GMT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// A calendar item being tracked, built from a property snapshot.
///
/// Updates from the calendar source replace the whole value; only the
/// "left" flag and the scheduler slot change in place.
pub struct Meeting {
    pub id: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub busy_status: BusyStatus,
    pub response_status: ResponseStatus,
    pub pattern: Option<RecurringPattern>,
    pub pattern_text: Option<String>,
    pub time_zone: Tz,
    pub time_zone_name: Option<String>,
    pub parent_folder_id: Option<String>,
    pub subject: Option<String>,
    marked_as_left: AtomicBool,
    scheduler: Mutex<Option<Arc<MeetingScheduler>>>,
}

impl fmt::Debug for Meeting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meeting")
            .field("id", &self.id)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("busy_status", &self.busy_status)
            .field("response_status", &self.response_status)
            .field("recurring", &self.pattern.is_some())
            .field("marked_as_left", &self.is_marked_left())
            .finish()
    }
}

impl Meeting {
    pub fn from_properties(
        id: impl Into<String>,
        properties: &[PropertyValue],
        zones: &TimeZoneList,
    ) -> Result<Self, PropertyError> {
        let id = id.into();
        if properties.len() < MeetingProperty::REQUIRED {
            return Err(PropertyError::MissingProperties {
                expected: MeetingProperty::REQUIRED,
                found: properties.len(),
            });
        }
        let get = |p: MeetingProperty| properties.get(p.index()).unwrap_or(&PropertyValue::Empty);

        let date = |p: MeetingProperty| -> Result<Option<DateTime<Utc>>, PropertyError> {
            match get(p).as_str(p.name())? {
                None => Ok(None),
                Some(text) => parse_gmt(text).map(Some).ok_or_else(|| PropertyError::BadDate {
                    name: p.name(),
                    value: text.to_string(),
                }),
            }
        };
        let text = |p: MeetingProperty| -> Result<Option<String>, PropertyError> {
            Ok(get(p).as_str(p.name())?.map(str::to_string))
        };

        let start = date(MeetingProperty::Start)?;
        let end = date(MeetingProperty::End)?;
        let busy_status = get(MeetingProperty::BusyStatus)
            .as_long(MeetingProperty::BusyStatus.name())?
            .map(BusyStatus::from)
            .unwrap_or(BusyStatus::Free);
        let response_status = get(MeetingProperty::ResponseStatus)
            .as_long(MeetingProperty::ResponseStatus.name())?
            .map(ResponseStatus::from)
            .unwrap_or(ResponseStatus::None);
        let time_zone_name = text(MeetingProperty::TimeZoneName)?;
        let time_zone = match &time_zone_name {
            Some(name) => zones.resolve(name).zone,
            None => zones.default_zone(),
        };

        let pattern = match text(MeetingProperty::RecurrenceBlob)? {
            None => None,
            Some(blob) => match RecurringPattern::from_hex(&blob, time_zone, busy_status) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(meeting_id = %id, error = ?e, "Unreadable recurrence pattern, treating as one-off");
                    None
                }
            },
        };

        Ok(Self {
            id,
            start,
            end,
            busy_status,
            response_status,
            pattern,
            pattern_text: text(MeetingProperty::PatternText)?,
            time_zone,
            time_zone_name,
            parent_folder_id: text(MeetingProperty::ParentFolderId)?,
            subject: text(MeetingProperty::Subject)?,
            marked_as_left: AtomicBool::new(false),
            scheduler: Mutex::new(None),
        })
    }

    pub fn is_recurring(&self) -> bool {
        self.pattern.is_some()
    }

    /// The instance relevant at `now`: the running one, or the next one.
    pub fn window_at(&self, now: DateTime<Utc>) -> Option<Occurrence> {
        match &self.pattern {
            Some(pattern) => pattern.next_meeting(now),
            None => match (self.start, self.end) {
                (Some(start), Some(end)) if end > now => Some(Occurrence {
                    start,
                    end,
                    from_exception: false,
                }),
                _ => None,
            },
        }
    }

    pub fn is_happening(&self, now: DateTime<Utc>) -> bool {
        self.window_at(now).map_or(false, |w| w.start <= now)
    }

    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        self.window_at(now).is_none()
    }

    /// Whether the snapshot describes the same calendar entry, used when the
    /// source rotates identifiers.
    pub fn same_item_as(&self, other: &Meeting) -> bool {
        self.parent_folder_id == other.parent_folder_id
            && self.start == other.start
            && self.end == other.end
            && self.pattern_text == other.pattern_text
            && self.subject == other.subject
    }

    pub fn is_marked_left(&self) -> bool {
        self.marked_as_left.load(Ordering::SeqCst)
    }

    pub fn set_marked_left(&self, left: bool) {
        self.marked_as_left.store(left, Ordering::SeqCst);
    }

    /// Keep the left flag of the snapshot this one replaces while the
    /// instance the user left is still the relevant one.
    pub fn inherit_left_flag(&self, previous: &Meeting, now: DateTime<Utc>) {
        if !previous.is_marked_left() {
            return;
        }
        let same_window = match (previous.window_at(now), self.window_at(now)) {
            (Some(old), Some(new)) => old.start == new.start && old.end == new.end,
            _ => false,
        };
        if same_window || self.is_happening(now) {
            self.set_marked_left(true);
        }
    }

    pub fn scheduler(&self) -> Option<Arc<MeetingScheduler>> {
        self.scheduler.lock().clone()
    }

    /// Install a scheduler, returning the one it replaces.
    pub fn replace_scheduler(&self, scheduler: Option<Arc<MeetingScheduler>>) -> Option<Arc<MeetingScheduler>> {
        std::mem::replace(&mut *self.scheduler.lock(), scheduler)
    }
}

impl fmt::Display for Meeting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_time = |t: Option<DateTime<Utc>>| {
            t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        writeln!(f, "meeting {}", self.id)?;
        if let Some(subject) = &self.subject {
            writeln!(f, "  subject: {}", subject)?;
        }
        writeln!(f, "  start: {}", fmt_time(self.start))?;
        writeln!(f, "  end: {}", fmt_time(self.end))?;
        writeln!(f, "  busy: {:?}, response: {:?}", self.busy_status, self.response_status)?;
        writeln!(
            f,
            "  zone: {} ({})",
            self.time_zone,
            self.time_zone_name.as_deref().unwrap_or("-")
        )?;
        writeln!(f, "  folder: {}", self.parent_folder_id.as_deref().unwrap_or("-"))?;
        writeln!(f, "  marked as left: {}", self.is_marked_left())?;
        match self.scheduler() {
            Some(scheduler) => writeln!(f, "  scheduler: {}", scheduler.dump())?,
            None => writeln!(f, "  scheduler: none")?,
        }
        match &self.pattern {
            Some(pattern) => {
                if let Some(text) = &self.pattern_text {
                    writeln!(f, "  pattern: {}", text)?;
                }
                for line in pattern.to_string().lines() {
                    writeln!(f, "    {}", line)?;
                }
                Ok(())
            }
            None => writeln!(f, "  pattern: none"),
        }
    }
}
