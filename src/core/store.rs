use chrono::{DateTime, Utc};

use super::types::{
    AppState, ScheduledMessage, Thread, ThreadStatus, ThreadType, EXIT_CODE_KILLED,
};

/// Every mutation of [`AppState`] goes through one of these. Dispatched by
/// UI intents, the sweep loops, and the output pipeline; applied in dispatch
/// order. Referencing a missing thread/channel id is a silent no-op by
/// design, not an error.
#[derive(Debug, Clone)]
pub enum Action {
    CreateThread {
        id: String,
        channel_id: String,
        title: String,
        thread_type: ThreadType,
        pty_id: Option<String>,
    },
    SelectThread {
        thread_id: String,
    },
    SelectChannel {
        channel_id: String,
    },
    SetThreadStatus {
        thread_id: String,
        status: ThreadStatus,
        snooze_until: Option<DateTime<Utc>>,
    },
    MarkActivity {
        thread_id: String,
    },
    SetOutputPreview {
        thread_id: String,
        preview: String,
    },
    MarkAllRead,
    WakeSnoozed,
    KillThreadPty {
        thread_id: String,
    },
    SetPtyExited {
        thread_id: String,
        exit_code: i32,
    },
    SetPtyRunning {
        thread_id: String,
    },
    RenameThread {
        thread_id: String,
        title: String,
    },
    SetThreadBranch {
        thread_id: String,
        branch: Option<String>,
    },
    ScheduleMessage {
        message: ScheduledMessage,
    },
    CancelScheduled {
        message_id: String,
    },
    FireScheduled {
        message_id: String,
    },
    DeleteThread {
        thread_id: String,
    },
}

impl AppState {
    /// Apply one action at time `now`. Returns whether anything changed;
    /// `false` is the identity no-op callers use for cheap change detection
    /// (notably `WakeSnoozed`, which the snooze sweep fires every tick).
    ///
    /// No I/O, no timers, no hidden clock reads: persistence and sweeps are
    /// external callers.
    pub fn apply(&mut self, action: Action, now: DateTime<Utc>) -> bool {
        match action {
            Action::CreateThread {
                id,
                channel_id,
                title,
                thread_type,
                pty_id,
            } => {
                let thread = Thread {
                    id: id.clone(),
                    channel_id: channel_id.clone(),
                    thread_type,
                    status: ThreadStatus::Active,
                    created_at: now,
                    last_activity_at: now,
                    last_read_at: Some(now),
                    snooze_until: None,
                    snooze_due: false,
                    title,
                    auto_titled: true,
                    last_output_preview: None,
                    pty_id,
                    pty_running: thread_type == ThreadType::Terminal,
                    pty_exit_code: None,
                    has_unread: false,
                    branch: None,
                };
                self.threads.push(thread);
                self.selected_thread_id = Some(id);
                self.selected_channel_id = Some(channel_id);
                true
            }
            Action::SelectThread { thread_id } => {
                // Unknown ids still move selection; validation is the
                // caller's responsibility.
                if let Some(t) = self.thread_mut(&thread_id) {
                    t.last_read_at = Some(now);
                    t.has_unread = false;
                    t.snooze_due = false;
                }
                self.selected_thread_id = Some(thread_id);
                true
            }
            Action::SelectChannel { channel_id } => {
                self.selected_channel_id = Some(channel_id);
                self.selected_thread_id = None;
                true
            }
            Action::SetThreadStatus {
                thread_id,
                status,
                snooze_until,
            } => match self.thread_mut(&thread_id) {
                Some(t) => {
                    t.status = status;
                    t.snooze_until = if status == ThreadStatus::Snoozed {
                        snooze_until
                    } else {
                        None
                    };
                    t.snooze_due = false;
                    true
                }
                None => false,
            },
            Action::MarkActivity { thread_id } => {
                let selected = self.is_selected(&thread_id);
                match self.thread_mut(&thread_id) {
                    Some(t) => {
                        t.last_activity_at = now;
                        t.has_unread = t.derive_unread(selected);
                        true
                    }
                    None => false,
                }
            }
            Action::SetOutputPreview { thread_id, preview } => {
                match self.thread_mut(&thread_id) {
                    Some(t) => {
                        // Already length-capped by the output pipeline.
                        t.last_output_preview = Some(preview);
                        true
                    }
                    None => false,
                }
            }
            Action::MarkAllRead => {
                let mut changed = false;
                for t in &mut self.threads {
                    if t.has_unread || t.snooze_due {
                        t.has_unread = false;
                        t.snooze_due = false;
                        t.last_read_at = Some(now);
                        changed = true;
                    }
                }
                changed
            }
            Action::WakeSnoozed => {
                let mut changed = false;
                for t in &mut self.threads {
                    if t.status == ThreadStatus::Snoozed
                        && !t.snooze_due
                        && t.snooze_until.is_some_and(|until| now >= until)
                    {
                        t.snooze_due = true;
                        changed = true;
                    }
                }
                changed
            }
            Action::KillThreadPty { thread_id } => match self.thread_mut(&thread_id) {
                Some(t) => {
                    t.pty_id = None;
                    t.pty_running = false;
                    t.pty_exit_code = Some(EXIT_CODE_KILLED);
                    t.status = ThreadStatus::Inactive;
                    t.snooze_until = None;
                    t.snooze_due = false;
                    true
                }
                None => false,
            },
            Action::SetPtyExited {
                thread_id,
                exit_code,
            } => match self.thread_mut(&thread_id) {
                Some(t) => {
                    t.pty_running = false;
                    t.pty_exit_code = Some(exit_code);
                    true
                }
                None => false,
            },
            Action::SetPtyRunning { thread_id } => match self.thread_mut(&thread_id) {
                Some(t) => {
                    t.pty_running = true;
                    t.pty_exit_code = None;
                    true
                }
                None => false,
            },
            Action::RenameThread { thread_id, title } => match self.thread_mut(&thread_id) {
                Some(t) => {
                    t.title = title;
                    t.auto_titled = false;
                    true
                }
                None => false,
            },
            Action::SetThreadBranch { thread_id, branch } => match self.thread_mut(&thread_id) {
                Some(t) => {
                    t.branch = branch;
                    true
                }
                None => false,
            },
            Action::ScheduleMessage { message } => {
                self.scheduled_messages.push(message);
                true
            }
            Action::CancelScheduled { message_id } | Action::FireScheduled { message_id } => {
                // Firing only removes the record; the caller is responsible
                // for dispatching the follow-up CreateThread.
                let before = self.scheduled_messages.len();
                self.scheduled_messages.retain(|m| m.id != message_id);
                self.scheduled_messages.len() != before
            }
            Action::DeleteThread { thread_id } => {
                let before = self.threads.len();
                self.threads.retain(|t| t.id != thread_id);
                if self.selected_thread_id.as_deref() == Some(thread_id.as_str()) {
                    self.selected_thread_id = None;
                }
                self.threads.len() != before
            }
        }
    }
}
