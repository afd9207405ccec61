//! Best-effort state persistence. Malformed or missing snapshots are
//! treated as "no saved state", never as a startup failure; saves are
//! debounced by the app loop and their errors only logged.

use anyhow::Result;
use std::path::Path;

use crate::core::types::{AppState, EXIT_CODE_HYDRATED};

/// Load a snapshot. Every restored thread is forced into the
/// not-running-pending-restart shape: no PTY handle, sentinel exit code,
/// nothing unread. Sessions are only re-created on explicit restart.
pub fn load(path: &Path) -> AppState {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!("No saved state at {:?}: {}", path, e);
            return AppState::default();
        }
    };

    let mut state: AppState = match serde_json::from_str(&content) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!("Discarding malformed saved state at {:?}: {}", path, e);
            return AppState::default();
        }
    };

    hydrate(&mut state);
    state
}

fn hydrate(state: &mut AppState) {
    for thread in &mut state.threads {
        thread.pty_running = false;
        thread.pty_id = None;
        thread.pty_exit_code = Some(EXIT_CODE_HYDRATED);
        thread.has_unread = false;
    }
}

pub fn save(path: &Path, state: &AppState) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(state)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::Action;
    use crate::core::types::ThreadType;
    use chrono::Utc;
    use std::path::PathBuf;

    fn temp_state_file() -> PathBuf {
        std::env::temp_dir().join(format!("threadmux-persist-test-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn round_trip_forces_hydration_fields() {
        let now = Utc::now();
        let mut state = AppState::default();
        for id in ["a", "b"] {
            state.apply(
                Action::CreateThread {
                    id: id.into(),
                    channel_id: "ch1".into(),
                    title: "untitled".into(),
                    thread_type: ThreadType::Terminal,
                    pty_id: Some(format!("pty-{id}")),
                },
                now,
            );
        }
        // Simulate live activity before the save.
        state.apply(Action::SelectChannel { channel_id: "ch1".into() }, now);
        state.apply(Action::MarkActivity { thread_id: "a".into() }, now + chrono::Duration::seconds(5));
        assert!(state.thread("a").unwrap().has_unread);

        let path = temp_state_file();
        save(&path, &state).unwrap();
        let restored = load(&path);
        std::fs::remove_file(&path).ok();

        assert_eq!(restored.threads.len(), 2);
        for thread in &restored.threads {
            assert!(!thread.pty_running);
            assert_eq!(thread.pty_id, None);
            assert_eq!(thread.pty_exit_code, Some(EXIT_CODE_HYDRATED));
            assert!(!thread.has_unread);
        }
    }

    #[test]
    fn missing_file_yields_empty_state() {
        let state = load(Path::new("/nonexistent/threadmux-state.json"));
        assert!(state.threads.is_empty());
        assert!(state.channels.is_empty());
    }

    #[test]
    fn malformed_json_yields_empty_state() {
        let path = temp_state_file();
        std::fs::write(&path, "{not json").unwrap();
        let state = load(&path);
        std::fs::remove_file(&path).ok();
        assert!(state.threads.is_empty());
    }
}
