//! Calendar snapshot files replayed by `calpresence watch`.
//!
//! ```json
//! {
//!   "default_folder": "calendar",
//!   "items": [
//!     { "id": "standup", "properties": {
//!         "start": "2025-03-10 09:00:00", "end": "2025-03-10 09:15:00",
//!         "busy_status": 2, "response_status": 3,
//!         "parent_folder_id": "calendar", "subject": "Standup" } }
//!   ],
//!   "changes": [
//!     { "after_secs": 2, "id": "standup", "change": "deleted" }
//!   ]
//! }
//! ```
//!
//! Property names follow [`MeetingProperty::name`]; missing properties are
//! sent as empty values.

use async_trait::async_trait;
use calpresence_core::clock::Clock;
use calpresence_core::error::SourceError;
use calpresence_core::models::{FolderKind, ItemChange, MeetingProperty, PropertyValue};
use calpresence_core::source::CalendarSource;
use calpresence_core::tracker::GlobalStatusService;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to read snapshot file")]
    Io(#[from] std::io::Error),

    #[error("Invalid snapshot JSON")]
    Json(#[from] serde_json::Error),

    #[error("Change #{index} for '{id}' is {change} but carries no properties")]
    MissingProperties {
        index: usize,
        id: String,
        change: ItemChange,
    },

    #[error("Unknown property '{name}' on item '{id}'")]
    UnknownProperty { id: String, name: String },
}

pub type Properties = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotItem {
    pub id: String,
    pub properties: Properties,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotChange {
    #[serde(default)]
    pub after_secs: u64,
    pub id: String,
    pub change: ItemChange,
    #[serde(default)]
    pub properties: Option<Properties>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub default_folder: Option<String>,
    #[serde(default)]
    pub items: Vec<SnapshotItem>,
    #[serde(default)]
    pub changes: Vec<SnapshotChange>,
}

impl SnapshotFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, SnapshotError> {
        let mut snapshot: SnapshotFile = serde_json::from_str(text)?;
        snapshot.validate()?;
        snapshot.changes.sort_by_key(|change| change.after_secs);
        Ok(snapshot)
    }

    fn validate(&self) -> Result<(), SnapshotError> {
        for item in &self.items {
            ordered_properties(&item.id, &item.properties)?;
        }
        for (index, change) in self.changes.iter().enumerate() {
            match (&change.properties, change.change) {
                (Some(properties), _) => {
                    ordered_properties(&change.id, properties)?;
                }
                (None, ItemChange::Deleted) => {}
                (None, other) => {
                    return Err(SnapshotError::MissingProperties {
                        index,
                        id: change.id.clone(),
                        change: other,
                    })
                }
            }
        }
        Ok(())
    }
}

/// Named properties in snapshot order.
pub fn ordered_properties(
    id: &str,
    properties: &Properties,
) -> Result<Vec<PropertyValue>, SnapshotError> {
    if let Some(unknown) = properties
        .keys()
        .find(|name| !MeetingProperty::ALL.iter().any(|p| p.name() == name.as_str()))
    {
        return Err(SnapshotError::UnknownProperty {
            id: id.to_string(),
            name: unknown.clone(),
        });
    }
    Ok(MeetingProperty::ALL
        .iter()
        .map(|p| properties.get(p.name()).cloned().unwrap_or(PropertyValue::Empty))
        .collect())
}

/// Calendar source backed by a loaded snapshot.
#[derive(Debug, Default)]
pub struct SnapshotSource {
    items: RwLock<HashMap<String, Vec<PropertyValue>>>,
    default_folder: Option<String>,
}

impl SnapshotSource {
    pub fn new(snapshot: &SnapshotFile) -> Result<Self, SnapshotError> {
        let mut items = HashMap::new();
        for item in &snapshot.items {
            items.insert(item.id.clone(), ordered_properties(&item.id, &item.properties)?);
        }
        Ok(Self {
            items: RwLock::new(items),
            default_folder: snapshot.default_folder.clone(),
        })
    }

    /// Apply a timed change to the stored items.
    pub async fn apply(&self, change: &SnapshotChange) -> Result<(), SnapshotError> {
        let mut items = self.items.write().await;
        match (&change.properties, change.change) {
            (_, ItemChange::Deleted) => {
                items.remove(&change.id);
            }
            (Some(properties), _) => {
                items.insert(change.id.clone(), ordered_properties(&change.id, properties)?);
            }
            (None, other) => {
                return Err(SnapshotError::MissingProperties {
                    index: 0,
                    id: change.id.clone(),
                    change: other,
                })
            }
        }
        debug!(id = %change.id, change = %change.change, "Applied snapshot change");
        Ok(())
    }
}

#[async_trait]
impl CalendarSource for SnapshotSource {
    async fn fetch_item(&self, id: &str) -> Result<Option<Vec<PropertyValue>>, SourceError> {
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn list_item_ids(&self, _folder: FolderKind) -> Result<Vec<String>, SourceError> {
        let mut ids: Vec<String> = self.items.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn default_folder_id(&self) -> Result<Option<String>, SourceError> {
        Ok(self.default_folder.clone())
    }
}

/// Clock that runs in real time from a chosen starting instant.
#[derive(Debug, Clone, Copy)]
pub struct ShiftedClock {
    offset: Duration,
}

impl ShiftedClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            offset: start - Utc::now(),
        }
    }
}

impl Clock for ShiftedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now() + self.offset
    }
}

/// Status service that logs and records every presence report.
#[derive(Debug)]
pub struct LoggingStatus<C> {
    clock: C,
    transitions: Mutex<Vec<(DateTime<Utc>, bool)>>,
}

impl<C: Clock> LoggingStatus<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            transitions: Mutex::new(Vec::new()),
        }
    }

    /// Reports that changed the presence value.
    pub fn transitions(&self) -> Vec<(DateTime<Utc>, bool)> {
        self.transitions.lock().clone()
    }
}

impl<C: Clock> GlobalStatusService for LoggingStatus<C> {
    fn set_in_meeting(&self, in_meeting: bool) {
        let mut transitions = self.transitions.lock();
        let changed = transitions.last().map_or(true, |(_, last)| *last != in_meeting);
        if changed {
            info!(in_meeting, "Global status updated");
            transitions.push((self.clock.now(), in_meeting));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calpresence_core::clock::SystemClock;

    const SNAPSHOT: &str = r#"{
        "default_folder": "calendar",
        "items": [
            { "id": "b", "properties": { "start": "2025-03-10 09:00:00", "end": "2025-03-10 10:00:00",
              "busy_status": 2, "response_status": 3, "parent_folder_id": "calendar" } },
            { "id": "a", "properties": { "start": "2025-03-10 11:00:00", "end": "2025-03-10 12:00:00",
              "busy_status": 2, "response_status": 3, "recurrence_blob": null } }
        ],
        "changes": [
            { "after_secs": 5, "id": "a", "change": "deleted" },
            { "after_secs": 1, "id": "c", "change": "inserted", "properties": { "subject": "New" } }
        ]
    }"#;

    #[test]
    fn test_parse_sorts_changes() {
        let snapshot = SnapshotFile::parse(SNAPSHOT).unwrap();
        assert_eq!(snapshot.items.len(), 2);
        let order: Vec<u64> = snapshot.changes.iter().map(|c| c.after_secs).collect();
        assert_eq!(order, vec![1, 5]);
    }

    #[test]
    fn test_properties_are_ordered_and_padded() {
        let snapshot = SnapshotFile::parse(SNAPSHOT).unwrap();
        let values = ordered_properties("b", &snapshot.items[0].properties).unwrap();
        assert_eq!(values.len(), MeetingProperty::ALL.len());
        assert_eq!(values[MeetingProperty::BusyStatus.index()], PropertyValue::Long(2));
        assert_eq!(
            values[MeetingProperty::ParentFolderId.index()],
            PropertyValue::Str("calendar".to_string())
        );
        assert_eq!(values[MeetingProperty::Subject.index()], PropertyValue::Empty);
    }

    #[test]
    fn test_unknown_property_is_rejected() {
        let text = r#"{ "items": [ { "id": "x", "properties": { "colour": "red" } } ] }"#;
        assert!(matches!(
            SnapshotFile::parse(text),
            Err(SnapshotError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_update_without_properties_is_rejected() {
        let text = r#"{ "changes": [ { "id": "x", "change": "updated" } ] }"#;
        assert!(matches!(
            SnapshotFile::parse(text),
            Err(SnapshotError::MissingProperties { .. })
        ));
    }

    #[tokio::test]
    async fn test_source_serves_and_applies_changes() {
        let snapshot = SnapshotFile::parse(SNAPSHOT).unwrap();
        let source = SnapshotSource::new(&snapshot).unwrap();

        assert_eq!(source.list_item_ids(FolderKind::Calendar).await.unwrap(), vec!["a", "b"]);
        assert_eq!(
            source.default_folder_id().await.unwrap().as_deref(),
            Some("calendar")
        );

        for change in &snapshot.changes {
            source.apply(change).await.unwrap();
        }
        assert!(source.fetch_item("a").await.unwrap().is_none());
        assert!(source.fetch_item("c").await.unwrap().is_some());
    }

    #[test]
    fn test_shifted_clock_starts_at_requested_time() {
        let start = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = ShiftedClock::starting_at(start);
        let drift = clock.now() - start;
        assert!(drift >= Duration::zero() && drift < Duration::seconds(5));
    }

    #[test]
    fn test_logging_status_records_changes_only() {
        let status = LoggingStatus::new(SystemClock);
        status.set_in_meeting(false);
        status.set_in_meeting(true);
        status.set_in_meeting(true);
        status.set_in_meeting(false);
        let values: Vec<bool> = status.transitions().iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![false, true, false]);
    }
}
