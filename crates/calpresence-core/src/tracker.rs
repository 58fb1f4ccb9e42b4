use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Receiver of the user's overall "in a meeting" status.
pub trait GlobalStatusService: Send + Sync {
    fn set_in_meeting(&self, in_meeting: bool);
}

#[derive(Debug, Default)]
struct TrackerState {
    count: u32,
    active: BTreeSet<String>,
    in_meeting: bool,
}

/// Counts meetings in progress and drives the global status from that
/// count. All changes happen under one monitor.
pub struct PresenceTracker {
    status: Arc<dyn GlobalStatusService>,
    state: Mutex<TrackerState>,
}

impl std::fmt::Debug for PresenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceTracker").field("state", &*self.state.lock()).finish()
    }
}

impl PresenceTracker {
    pub fn new(status: Arc<dyn GlobalStatusService>) -> Self {
        Self {
            status,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// A meeting started. Presence turns on unless the user already left
    /// this meeting.
    pub fn meeting_started(&self, id: &str, marked_left: bool) {
        let mut state = self.state.lock();
        state.count += 1;
        state.active.insert(id.to_string());
        debug!(meeting_id = id, count = state.count, "Meeting started");

        if marked_left {
            debug!(meeting_id = id, "Meeting marked as left, presence unchanged");
            return;
        }
        if state.count == 1 || !state.in_meeting {
            self.apply(&mut state, true);
        }
    }

    /// A meeting ended. Returns the remaining count, or `None` when the
    /// counter was already zero.
    pub fn meeting_ended(&self, id: &str) -> Option<u32> {
        let mut state = self.state.lock();
        state.active.remove(id);
        if state.count == 0 {
            warn!(meeting_id = id, "Meeting ended with no active meetings, count stays at zero");
            return None;
        }
        state.count -= 1;
        debug!(meeting_id = id, count = state.count, "Meeting ended");
        if state.count == 0 {
            self.apply(&mut state, false);
        }
        Some(state.count)
    }

    /// Undo a start whose meeting was cancelled while in progress.
    pub fn reverse_start(&self, id: &str) {
        let mut state = self.state.lock();
        state.active.remove(id);
        if state.count == 0 {
            warn!(meeting_id = id, "Reversing a start with no active meetings");
            return;
        }
        state.count -= 1;
        if state.count == 0 && state.in_meeting {
            self.apply(&mut state, false);
        }
    }

    /// Undo an end that was counted without a matching start.
    pub fn reverse_end(&self, id: &str) {
        let mut state = self.state.lock();
        state.count += 1;
        debug!(meeting_id = id, count = state.count, "Reversed meeting end");
    }

    pub fn set_presence(&self, in_meeting: bool) {
        let mut state = self.state.lock();
        self.apply(&mut state, in_meeting);
    }

    /// Forget every meeting and report "not in a meeting".
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.count = 0;
        state.active.clear();
        self.apply(&mut state, false);
    }

    pub fn count(&self) -> u32 {
        self.state.lock().count
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.state.lock().active.iter().cloned().collect()
    }

    pub fn in_meeting(&self) -> bool {
        self.state.lock().in_meeting
    }

    pub fn dump(&self) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        let _ = writeln!(out, "in meeting: {}", state.in_meeting);
        let _ = writeln!(out, "active meeting count: {}", state.count);
        for id in &state.active {
            let _ = writeln!(out, "  - {}", id);
        }
        out
    }

    fn apply(&self, state: &mut TrackerState, in_meeting: bool) {
        if state.in_meeting != in_meeting {
            info!(in_meeting, "Presence changed");
        }
        state.in_meeting = in_meeting;
        self.status.set_in_meeting(in_meeting);
    }
}
