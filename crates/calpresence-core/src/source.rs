use crate::error::SourceError;
use crate::models::{FolderKind, PropertyValue};
use async_trait::async_trait;

/// Provider of calendar item property snapshots (the Outlook RPC client).
///
/// Implementations return the properties in [`crate::models::MeetingProperty`]
/// order, or `None` when the item no longer exists.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn fetch_item(&self, id: &str) -> Result<Option<Vec<PropertyValue>>, SourceError>;

    /// Identifiers of every item currently in the given folder.
    async fn list_item_ids(&self, folder: FolderKind) -> Result<Vec<String>, SourceError>;

    /// Identifier of the user's default calendar folder, if known.
    async fn default_folder_id(&self) -> Result<Option<String>, SourceError>;
}

/// Receiver of analytics events raised while tracking meetings.
pub trait AnalyticsSink: Send + Sync {
    fn unknown_time_zone(&self, name: &str, fallback: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAnalytics;

impl AnalyticsSink for NoopAnalytics {
    fn unknown_time_zone(&self, _name: &str, _fallback: &str) {}
}
