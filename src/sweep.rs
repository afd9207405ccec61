//! The two periodic sweeps are the sole sources of time-driven mutation:
//! waking elapsed snoozes and firing scheduled messages. The app loop owns
//! the intervals; the decision logic lives here so boundary conditions are
//! unit-testable without timers.

use chrono::{DateTime, Utc};

use crate::core::types::{AppState, ScheduledMessage};

/// Scheduled messages whose deadline has arrived. The caller removes each
/// via `FireScheduled` and then creates a thread titled with the prompt.
pub fn due_messages(state: &AppState, now: DateTime<Utc>) -> Vec<ScheduledMessage> {
    state
        .scheduled_messages
        .iter()
        .filter(|m| m.scheduled_at <= now)
        .cloned()
        .collect()
}
