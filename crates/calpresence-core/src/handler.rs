//! Calendar change handling and presence evaluation.
//!
//! [`CalendarDataHandler`] receives item-change notifications from the
//! calendar source, keeps the set of tracked meetings, and owns the
//! per-session [`PresenceTracker`] and [`Timer`]. Every notification is
//! processed on the timer, never on the caller, so processing is serialized
//! with the start/end jobs of the schedulers.

use crate::backoff::ServerBackoff;
use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::dump::StateDumper;
use crate::error::{CoreError, SourceError};
use crate::models::{BusyStatus, FolderKind, ItemChange, Meeting, PropertyValue};
use crate::recurrence::Occurrence;
use crate::scheduler::{MeetingScheduler, SchedulerContext};
use crate::source::{AnalyticsSink, CalendarSource};
use crate::timer::{Job, JobFuture, Timer};
use crate::timezone::TimeZoneList;
use crate::tracker::{GlobalStatusService, PresenceTracker};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
enum HandlerTask {
    InitialSync,
    Notification { id: String, change: ItemChange },
    Evaluate,
}

fn dispatch(handler: Arc<CalendarDataHandler>, task: HandlerTask) -> JobFuture {
    Box::pin(async move {
        match task {
            HandlerTask::InitialSync => handler.initial_sync().await,
            HandlerTask::Notification { id, change } => handler.process_notification(id, change).await,
            HandlerTask::Evaluate => {
                handler.evaluate_meeting_presence();
                handler.schedule_evaluation();
            }
        }
    })
}

fn job(handler: &Arc<CalendarDataHandler>, task: HandlerTask) -> Job {
    let handler = handler.clone();
    Job::new(move || dispatch(handler, task))
}

pub struct CalendarDataHandler {
    source: Arc<dyn CalendarSource>,
    tracker: Arc<PresenceTracker>,
    timer: Arc<Timer>,
    ctx: Arc<SchedulerContext>,
    backoff: ServerBackoff,
    zones: TimeZoneList,
    meetings: DashMap<String, Arc<Meeting>>,
    default_folder: Mutex<Option<String>>,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl std::fmt::Debug for CalendarDataHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendarDataHandler")
            .field("meetings", &self.meetings.len())
            .field("tracker", &self.tracker)
            .field("timer", &self.timer)
            .finish()
    }
}

impl CalendarDataHandler {
    /// Build a handler and its timer. Must be called inside a tokio runtime.
    pub fn new(
        source: Arc<dyn CalendarSource>,
        status: Arc<dyn GlobalStatusService>,
        analytics: Arc<dyn AnalyticsSink>,
        clock: Arc<dyn Clock>,
        config: TrackerConfig,
    ) -> Result<Arc<Self>, CoreError> {
        let default_zone = config.default_zone()?;
        let cancel = CancellationToken::new();
        let timer = Arc::new(Timer::spawn(clock.clone(), cancel.clone()));
        let tracker = Arc::new(PresenceTracker::new(status));
        let ctx = Arc::new(SchedulerContext {
            timer: timer.clone(),
            tracker: tracker.clone(),
            clock: clock.clone(),
            config: config.clone(),
        });

        Ok(Arc::new(Self {
            source,
            tracker,
            timer,
            ctx,
            backoff: ServerBackoff::new(config.backoff_base(), config.backoff_max_doublings),
            zones: TimeZoneList::new(default_zone, analytics),
            meetings: DashMap::new(),
            default_folder: Mutex::new(None),
            clock,
            config,
            cancel,
            started: AtomicBool::new(false),
        }))
    }

    /// Queue an initial sync of every calendar item and start the periodic
    /// presence evaluation. Calling it again has no effect.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Starting calendar presence tracking");
        self.timer.schedule(self.clock.now(), job(self, HandlerTask::InitialSync));
        self.schedule_evaluation();
    }

    /// Cancel every scheduler, stop the timer and report "not in a meeting".
    pub fn stop(&self) {
        info!("Stopping calendar presence tracking");
        self.cancel.cancel();
        for entry in self.meetings.iter() {
            if let Some(scheduler) = entry.value().replace_scheduler(None) {
                scheduler.cancel_now();
            }
        }
        self.meetings.clear();
        self.timer.shutdown();
        self.tracker.reset();
    }

    /// Record a change of calendar item `id`. Processing happens later on
    /// the timer.
    pub fn add_notification(self: &Arc<Self>, id: impl Into<String>, change: ItemChange) {
        let id = id.into();
        debug!(meeting_id = %id, %change, "Queued calendar notification");
        self.timer.schedule(
            self.clock.now(),
            job(self, HandlerTask::Notification { id, change }),
        );
    }

    #[instrument(skip(self), fields(meeting_id = %id))]
    async fn process_notification(self: &Arc<Self>, id: String, change: ItemChange) {
        let existing = self.meetings.remove(&id).map(|(_, meeting)| meeting);
        if let Some(meeting) = &existing {
            retire(meeting);
        }

        let properties = match self.fetch_with_retry(&id).await {
            Ok(properties) => properties,
            Err(SourceError::Interrupted) => {
                debug!("Interrupted while fetching item, dropping notification");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch calendar item, dropping notification");
                return;
            }
        };

        let Some(properties) = properties else {
            if existing.is_some() {
                info!("Calendar item removed, no longer tracking");
            } else {
                debug!("Unknown calendar item no longer exists");
            }
            return;
        };

        let meeting = match Meeting::from_properties(id.clone(), &properties, &self.zones) {
            Ok(meeting) => meeting,
            Err(e) => {
                warn!(error = %e, "Malformed calendar item properties");
                return;
            }
        };

        if !self.in_default_folder(&meeting).await {
            debug!(folder = ?meeting.parent_folder_id, "Item is not in the default calendar folder");
            return;
        }

        let now = self.clock.now();
        if let Some(previous) = &existing {
            meeting.inherit_left_flag(previous, now);
        } else if matches!(change, ItemChange::Updated | ItemChange::Deleted) {
            let stale = self.retire_duplicates_of(&meeting);
            if !stale.is_empty() {
                let ids: Vec<&str> = stale.iter().map(|m| m.id.as_str()).collect();
                info!(stale = ?ids, "Calendar item changed id, retired old entries");
            }
            for previous in &stale {
                meeting.inherit_left_flag(previous, now);
            }
        }

        self.handle_new_meeting(Arc::new(meeting));
    }

    /// Start tracking `meeting` if it is a busy, attended meeting that has
    /// not finished. Returns true when it was stored.
    #[instrument(skip_all, fields(meeting_id = %meeting.id))]
    pub fn handle_new_meeting(&self, meeting: Arc<Meeting>) -> bool {
        if !meeting.response_status.is_attending() {
            debug!(response = ?meeting.response_status, "Not attending, ignoring");
            return false;
        }
        if meeting.busy_status != BusyStatus::Busy {
            debug!(busy = ?meeting.busy_status, "Not busy, ignoring");
            return false;
        }
        let (Some(start), Some(end)) = (meeting.start, meeting.end) else {
            debug!("Meeting has no dates, ignoring");
            return false;
        };

        let now = self.clock.now();
        let occurrence = match &meeting.pattern {
            None if end <= now => {
                debug!("Meeting already over, ignoring");
                return false;
            }
            None => Occurrence {
                start,
                end,
                from_exception: false,
            },
            Some(pattern) => match pattern.next_meeting(now) {
                Some(occurrence) => occurrence,
                None => {
                    debug!("Recurring meeting has no further occurrences, ignoring");
                    return false;
                }
            },
        };

        match MeetingScheduler::schedule(&self.ctx, &meeting, occurrence) {
            Some(_) => {
                self.meetings.insert(meeting.id.clone(), meeting);
                true
            }
            None => false,
        }
    }

    /// Drop finished meetings and recompute presence from the meetings that
    /// are happening now. Returns the ids that were dropped.
    #[instrument(skip(self))]
    pub fn evaluate_meeting_presence(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut removed = Vec::new();
        self.meetings.retain(|id, meeting| {
            if meeting.is_finished(now) {
                removed.push(id.clone());
                false
            } else {
                true
            }
        });

        let happening = self
            .meetings
            .iter()
            .any(|entry| entry.value().is_happening(now) && !entry.value().is_marked_left());
        if happening != self.tracker.in_meeting() {
            self.tracker.set_presence(happening);
        }

        if !removed.is_empty() {
            debug!(?removed, "Dropped finished meetings");
        }
        removed
    }

    /// The user left the meetings in progress. Presence stays off until
    /// another meeting starts.
    pub fn mark_meetings_left(&self) {
        let now = self.clock.now();
        for entry in self.meetings.iter() {
            if entry.value().is_happening(now) {
                entry.value().set_marked_left(true);
            }
        }
        info!("Marked current meetings as left");
        self.tracker.set_presence(false);
    }

    pub fn meeting_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.meetings.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn meeting(&self, id: &str) -> Option<Arc<Meeting>> {
        self.meetings.get(id).map(|entry| entry.value().clone())
    }

    pub fn presence(&self) -> bool {
        self.tracker.in_meeting()
    }

    pub fn tracker(&self) -> &PresenceTracker {
        &self.tracker
    }

    pub fn dump_state(&self) -> String {
        crate::dump::dump_all(&[self])
    }

    fn schedule_evaluation(self: &Arc<Self>) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.timer
            .schedule_after(self.config.evaluation_interval(), job(self, HandlerTask::Evaluate));
    }

    async fn initial_sync(self: &Arc<Self>) {
        let ids = loop {
            match self.source.list_item_ids(FolderKind::Calendar).await {
                Ok(ids) => {
                    self.backoff.on_success();
                    break ids;
                }
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "Listing calendar items failed, retrying");
                    if self.backoff.wait(&self.cancel).await.is_err() {
                        return;
                    }
                    self.backoff.on_error();
                }
                Err(e) => {
                    warn!(error = %e, "Listing calendar items failed");
                    return;
                }
            }
        };
        info!(count = ids.len(), "Initial calendar sync");
        for id in ids {
            self.add_notification(id, ItemChange::Inserted);
        }
    }

    async fn fetch_with_retry(&self, id: &str) -> Result<Option<Vec<PropertyValue>>, SourceError> {
        loop {
            match self.source.fetch_item(id).await {
                Ok(properties) => {
                    self.backoff.on_success();
                    return Ok(properties);
                }
                Err(e) if e.is_retryable() => {
                    warn!(meeting_id = id, error = %e, "Fetching calendar item failed, retrying");
                    self.backoff.wait(&self.cancel).await?;
                    self.backoff.on_error();
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn in_default_folder(&self, meeting: &Meeting) -> bool {
        let Some(folder) = &meeting.parent_folder_id else {
            return true;
        };
        match self.default_folder_id().await {
            Some(default) => &default == folder,
            None => true,
        }
    }

    async fn default_folder_id(&self) -> Option<String> {
        if let Some(id) = &self.config.default_folder_id {
            return Some(id.clone());
        }
        let cached = self.default_folder.lock().clone();
        if cached.is_some() {
            return cached;
        }
        match self.source.default_folder_id().await {
            Ok(Some(id)) => {
                *self.default_folder.lock() = Some(id.clone());
                Some(id)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Could not determine default calendar folder");
                None
            }
        }
    }

    /// Remove tracked meetings that describe the same calendar entry as
    /// `fresh` under a different id.
    fn retire_duplicates_of(&self, fresh: &Meeting) -> Vec<Arc<Meeting>> {
        let ids: Vec<String> = self
            .meetings
            .iter()
            .filter(|entry| entry.key() != &fresh.id && entry.value().same_item_as(fresh))
            .map(|entry| entry.key().clone())
            .collect();
        let mut stale = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some((_, meeting)) = self.meetings.remove(id) {
                retire(&meeting);
                stale.push(meeting);
            }
        }
        stale
    }
}

fn retire(meeting: &Meeting) {
    if let Some(scheduler) = meeting.replace_scheduler(None) {
        scheduler.cancel();
    }
}

impl StateDumper for CalendarDataHandler {
    fn name(&self) -> &str {
        "calendar presence"
    }

    fn dump(&self) -> String {
        let mut out = String::new();
        let timer = self.timer.state();
        let _ = writeln!(
            out,
            "timer: running={} pending={} next={}",
            timer.running,
            timer.pending,
            timer
                .next_deadline
                .map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        out.push_str(&self.tracker.dump());
        let unmapped = self.zones.unmapped_names();
        if !unmapped.is_empty() {
            let _ = writeln!(out, "unmapped time zones: {}", unmapped.join(", "));
        }
        let _ = writeln!(out, "tracked meetings: {}", self.meetings.len());
        for id in self.meeting_ids() {
            if let Some(meeting) = self.meeting(&id) {
                out.push_str(&meeting.to_string());
            }
        }
        out
    }
}
