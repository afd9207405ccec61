use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A folder-scoped grouping node. Channels form a tree mirroring the
/// project directory layout; the tree is immutable except for full
/// replacement after a rescan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub children: Vec<Channel>,
}

impl Channel {
    /// Depth-first lookup by id.
    pub fn find(&self, id: &str) -> Option<&Channel> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    Active,
    Snoozed,
    Inactive,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadType {
    /// Backed by a live PTY session.
    Terminal,
    /// Shares the status/snooze/unread lifecycle but never gets a session.
    Chat,
}

/// Exit code recorded when the user force-kills a thread's process.
pub const EXIT_CODE_KILLED: i32 = -1;
/// Sentinel exit code for threads restored from persistence: not running,
/// real exit unknown, an explicit restart is required.
pub const EXIT_CODE_HYDRATED: i32 = 0;

/// One unit of work context, optionally backed by a live terminal session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub channel_id: String,
    pub thread_type: ThreadType,
    pub status: ThreadStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub last_read_at: Option<DateTime<Utc>>,
    pub snooze_until: Option<DateTime<Utc>>,
    /// Snooze deadline elapsed but the wake has not been acknowledged yet.
    /// Distinct from `status`, which stays `Snoozed` until the user acts.
    #[serde(default)]
    pub snooze_due: bool,
    pub title: String,
    /// Whether `title` was machine-generated and may still be auto-replaced
    /// by the output pipeline.
    #[serde(default)]
    pub auto_titled: bool,
    pub last_output_preview: Option<String>,
    pub pty_id: Option<String>,
    #[serde(default)]
    pub pty_running: bool,
    pub pty_exit_code: Option<i32>,
    #[serde(default)]
    pub has_unread: bool,
    /// Informational git branch attachment; the session lifecycle does not
    /// depend on it.
    pub branch: Option<String>,
}

impl Thread {
    /// The unread derivation rule: activity newer than the last read, except
    /// the selected thread is never unread.
    pub fn derive_unread(&self, selected: bool) -> bool {
        if selected {
            return false;
        }
        match self.last_read_at {
            Some(read) => self.last_activity_at > read,
            None => true,
        }
    }
}

/// A prompt queued to become a new thread at a future time. Created by user
/// intent, destroyed on fire or cancel, never mutated otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: String,
    pub channel_id: String,
    pub prompt: String,
    pub scheduled_at: DateTime<Utc>,
}

/// The authoritative in-memory model. Mutated only through
/// [`AppState::apply`](crate::core::store) in dispatch order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppState {
    pub root_path: Option<String>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub threads: Vec<Thread>,
    #[serde(default)]
    pub scheduled_messages: Vec<ScheduledMessage>,
    #[serde(skip)]
    pub selected_channel_id: Option<String>,
    #[serde(skip)]
    pub selected_thread_id: Option<String>,
}

impl AppState {
    pub fn thread(&self, id: &str) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn thread_mut(&mut self, id: &str) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|t| t.id == id)
    }

    pub fn channel(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find_map(|c| c.find(id))
    }

    pub fn is_selected(&self, thread_id: &str) -> bool {
        self.selected_thread_id.as_deref() == Some(thread_id)
    }
}
