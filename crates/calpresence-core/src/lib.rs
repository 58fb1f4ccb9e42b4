//! # Calpresence Core Library
//!
//! Tracks whether the user is currently in an Outlook meeting, driven by
//! calendar items and their recurrence patterns.
//!
//! ## Features
//!
//! - **Recurrence Decoding**: Reads the binary `PidLidAppointmentRecur`
//!   property, including deleted instances and modified exceptions
//! - **Occurrence Computation**: Finds the next instance of daily, weekly,
//!   monthly, month-end and nth-weekday series, DST-correct per date
//! - **Timezone Mapping**: Resolves Windows and Outlook display zone names to
//!   IANA zones with tolerant fallbacks
//! - **Presence Tracking**: Schedules start/end jobs per occurrence and keeps
//!   an active-meeting count that drives the global "in a meeting" status
//!
//! ## Core Modules
//!
//! - [`recurrence`]: Pattern decoding and next-occurrence math
//! - [`timezone`]: Zone name mapping and MAPI date conversion
//! - [`handler`]: Notification processing and presence evaluation
//! - [`scheduler`]: Per-occurrence start/end jobs
//! - [`timer`]: Sequential deadline executor
//! - [`tracker`]: Active-meeting counter
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! The handler needs a [`source::CalendarSource`] for item snapshots and a
//! [`tracker::GlobalStatusService`] to report presence to.
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use calpresence_core::{
//!     clock::SystemClock,
//!     config::TrackerConfig,
//!     error::SourceError,
//!     handler::CalendarDataHandler,
//!     models::{FolderKind, ItemChange, PropertyValue},
//!     source::{CalendarSource, NoopAnalytics},
//!     tracker::GlobalStatusService,
//! };
//! use std::sync::Arc;
//!
//! struct OutlookClient;
//!
//! #[async_trait]
//! impl CalendarSource for OutlookClient {
//!     async fn fetch_item(&self, _id: &str) -> Result<Option<Vec<PropertyValue>>, SourceError> {
//!         Ok(None)
//!     }
//!
//!     async fn list_item_ids(&self, _folder: FolderKind) -> Result<Vec<String>, SourceError> {
//!         Ok(Vec::new())
//!     }
//!
//!     async fn default_folder_id(&self) -> Result<Option<String>, SourceError> {
//!         Ok(None)
//!     }
//! }
//!
//! struct StatusBar;
//!
//! impl GlobalStatusService for StatusBar {
//!     fn set_in_meeting(&self, in_meeting: bool) {
//!         println!("in a meeting: {}", in_meeting);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let handler = CalendarDataHandler::new(
//!         Arc::new(OutlookClient),
//!         Arc::new(StatusBar),
//!         Arc::new(NoopAnalytics),
//!         Arc::new(SystemClock),
//!         TrackerConfig::default(),
//!     )?;
//!
//!     handler.start();
//!     handler.add_notification("item-1", ItemChange::Updated);
//!     println!("{}", handler.dump_state());
//!     handler.stop();
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod clock;
pub mod config;
pub mod dump;
pub mod error;
pub mod handler;
pub mod models;
pub mod recurrence;
pub mod scheduler;
pub mod source;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod timer;
pub mod timezone;
pub mod tracker;
