//! Per-occurrence start/end scheduling.
//!
//! A [`MeetingScheduler`] covers exactly one occurrence of one meeting. When
//! a recurring occurrence ends, a fresh scheduler is created for the next
//! one and installed on the meeting.

use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::models::Meeting;
use crate::recurrence::Occurrence;
use crate::timer::{Job, Timer};
use crate::tracker::PresenceTracker;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared collaborators of every scheduler in a session.
#[derive(Debug)]
pub struct SchedulerContext {
    pub timer: Arc<Timer>,
    pub tracker: Arc<PresenceTracker>,
    pub clock: Arc<dyn Clock>,
    pub config: TrackerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Start,
    End,
    Cancel,
    ScheduleNext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Unscheduled,
    Scheduled,
    Started,
    Ended,
    Cancelled,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::Unscheduled => "unscheduled",
            SchedulerState::Scheduled => "scheduled",
            SchedulerState::Started => "started",
            SchedulerState::Ended => "ended",
            SchedulerState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Progress {
    state: SchedulerState,
    start_ran: bool,
    end_ran: bool,
    /// The end actually decremented the tracker.
    end_counted: bool,
    cancelled: bool,
}

pub struct MeetingScheduler {
    id: Uuid,
    meeting_id: String,
    meeting: Weak<Meeting>,
    occurrence: Occurrence,
    ctx: Arc<SchedulerContext>,
    progress: Mutex<Progress>,
}

impl fmt::Debug for MeetingScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeetingScheduler")
            .field("id", &self.id)
            .field("meeting_id", &self.meeting_id)
            .field("occurrence", &self.occurrence)
            .field("progress", &*self.progress.lock())
            .finish()
    }
}

/// Entry point of every scheduler job.
fn dispatch(scheduler: Arc<MeetingScheduler>, kind: TaskKind) {
    match kind {
        TaskKind::Start => scheduler.run_start(),
        TaskKind::End => scheduler.run_end(),
        TaskKind::Cancel => scheduler.run_cancel(),
        TaskKind::ScheduleNext => scheduler.run_schedule_next(),
    }
}

fn job(scheduler: &Arc<MeetingScheduler>, kind: TaskKind) -> Job {
    let scheduler = scheduler.clone();
    Job::sync(move || dispatch(scheduler, kind))
}

impl MeetingScheduler {
    /// Register start and end jobs for `occurrence` and install the new
    /// scheduler on `meeting`.
    ///
    /// Returns `None` without side effects when the occurrence is inverted,
    /// already over or shorter than the configured minimum.
    pub fn schedule(
        ctx: &Arc<SchedulerContext>,
        meeting: &Arc<Meeting>,
        occurrence: Occurrence,
    ) -> Option<Arc<MeetingScheduler>> {
        let now = ctx.clock.now();
        if occurrence.start > occurrence.end {
            warn!(meeting_id = %meeting.id, start = %occurrence.start, end = %occurrence.end, "Meeting starts after it ends, not scheduling");
            return None;
        }
        if occurrence.end <= now {
            debug!(meeting_id = %meeting.id, end = %occurrence.end, "Meeting already over, not scheduling");
            return None;
        }
        if occurrence.end - occurrence.start < ctx.config.min_meeting_duration() {
            debug!(meeting_id = %meeting.id, "Meeting too short to track, not scheduling");
            return None;
        }

        let scheduler = Arc::new(MeetingScheduler {
            id: Uuid::now_v7(),
            meeting_id: meeting.id.clone(),
            meeting: Arc::downgrade(meeting),
            occurrence,
            ctx: ctx.clone(),
            progress: Mutex::new(Progress {
                state: SchedulerState::Unscheduled,
                start_ran: false,
                end_ran: false,
                end_counted: false,
                cancelled: false,
            }),
        });

        if occurrence.start > now {
            meeting.set_marked_left(false);
        }

        {
            let mut progress = scheduler.progress.lock();
            ctx.timer.schedule(occurrence.start, job(&scheduler, TaskKind::Start));
            ctx.timer.schedule(occurrence.end, job(&scheduler, TaskKind::End));
            progress.state = SchedulerState::Scheduled;
        }

        info!(
            meeting_id = %meeting.id,
            scheduler_id = %scheduler.id,
            start = %occurrence.start,
            end = %occurrence.end,
            exception = occurrence.from_exception,
            "Scheduled meeting"
        );

        if let Some(previous) = meeting.replace_scheduler(Some(scheduler.clone())) {
            if !Arc::ptr_eq(&previous, &scheduler) {
                previous.cancel();
            }
        }
        Some(scheduler)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    pub fn occurrence(&self) -> Occurrence {
        self.occurrence
    }

    pub fn state(&self) -> SchedulerState {
        self.progress.lock().state
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.occurrence.start
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.occurrence.end
    }

    /// Queue cancellation on the timer. Jobs already queued see the flag
    /// once it runs.
    pub fn cancel(self: &Arc<Self>) {
        let now = self.ctx.clock.now();
        self.ctx.timer.schedule(now, job(self, TaskKind::Cancel));
    }

    /// Cancel on the calling thread; used when the timer is being shut down.
    pub fn cancel_now(&self) {
        self.run_cancel();
    }

    fn run_start(&self) {
        let mut progress = self.progress.lock();
        if progress.cancelled || progress.state != SchedulerState::Scheduled {
            return;
        }
        progress.state = SchedulerState::Started;
        progress.start_ran = true;

        let marked_left = self
            .meeting
            .upgrade()
            .map_or(false, |meeting| meeting.is_marked_left());
        self.ctx.tracker.meeting_started(&self.meeting_id, marked_left);
    }

    fn run_end(self: &Arc<Self>) {
        let mut progress = self.progress.lock();
        if progress.cancelled || progress.end_ran {
            return;
        }
        progress.end_ran = true;
        progress.state = SchedulerState::Ended;
        if !progress.start_ran {
            warn!(meeting_id = %self.meeting_id, scheduler_id = %self.id, "Meeting ended before it started");
        }
        progress.end_counted = self.ctx.tracker.meeting_ended(&self.meeting_id).is_some();

        let Some(meeting) = self.meeting.upgrade() else {
            return;
        };
        meeting.set_marked_left(false);

        let now = self.ctx.clock.now();
        let has_next = meeting
            .pattern
            .as_ref()
            .and_then(|pattern| pattern.next_meeting(now))
            .is_some();
        if has_next {
            self.ctx
                .timer
                .schedule_after(self.ctx.config.follow_up_delay(), job(self, TaskKind::ScheduleNext));
        }
    }

    fn run_schedule_next(&self) {
        if self.progress.lock().cancelled {
            return;
        }
        let Some(meeting) = self.meeting.upgrade() else {
            return;
        };
        let now = self.ctx.clock.now();
        let next = meeting.pattern.as_ref().and_then(|pattern| pattern.next_meeting(now));
        match next {
            Some(occurrence) => {
                if MeetingScheduler::schedule(&self.ctx, &meeting, occurrence).is_none() {
                    debug!(meeting_id = %self.meeting_id, "Next occurrence not schedulable");
                }
            }
            None => debug!(meeting_id = %self.meeting_id, "Series has no further occurrences"),
        }
    }

    fn run_cancel(&self) {
        let mut progress = self.progress.lock();
        if progress.cancelled {
            return;
        }
        progress.cancelled = true;
        progress.state = SchedulerState::Cancelled;

        if progress.start_ran && !progress.end_ran {
            debug!(meeting_id = %self.meeting_id, "Cancelled while in progress, reversing start");
            self.ctx.tracker.reverse_start(&self.meeting_id);
        }
        if progress.end_ran && !progress.start_ran {
            warn!(meeting_id = %self.meeting_id, scheduler_id = %self.id, "Cancelled after an end with no start");
            if progress.end_counted {
                self.ctx.tracker.reverse_end(&self.meeting_id);
            }
        }
    }

    pub fn dump(&self) -> String {
        let progress = self.progress.lock();
        format!(
            "{} [{}] {} -> {}{} start_ran={} end_ran={} cancelled={}",
            self.id,
            progress.state,
            self.occurrence.start.format("%Y-%m-%d %H:%M:%S"),
            self.occurrence.end.format("%Y-%m-%d %H:%M:%S"),
            if self.occurrence.from_exception { " (exception)" } else { "" },
            progress.start_ran,
            progress.end_ran,
            progress.cancelled,
        )
    }
}
