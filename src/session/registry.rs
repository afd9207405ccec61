//! Maps thread ids to live session instances (process + terminal surface +
//! bookkeeping) and owns every per-session timer. The registry is the sole
//! owner of process handles and surfaces; the state store never sees them.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::config::SessionConfig;
use crate::core::store::Action;
use crate::core::types::AppState;

use super::output::{self, LineScanner};
use super::pty::{PtyProcess, SessionEvent, EXIT_CODE_SPAWN_FAILED};
use super::surface::{TerminalSurface, Vt100Surface};

/// Per-thread session lifecycle:
/// `absent -> spawning -> running -> {exited, killed} -> restarting -> running`.
/// Terminal states are reclaimed only by explicit teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    Spawning,
    Running,
    Exited,
    Killed,
}

struct SessionEntry {
    process: Option<PtyProcess>,
    surface: Box<dyn TerminalSurface>,
    scanner: LineScanner,
    phase: SessionPhase,
    /// Bumped on every spawn; events from an older generation are stale.
    generation: u64,
    visible: bool,
    pending_prompt: Option<String>,
    auto_run_started: bool,
    prompt_sent: bool,
    auto_title_done: bool,
    auto_run_timer: Option<JoinHandle<()>>,
    prompt_timer: Option<JoinHandle<()>>,
    preview_timer: Option<JoinHandle<()>>,
}

impl SessionEntry {
    fn surface_only() -> Self {
        SessionEntry {
            process: None,
            surface: Box::new(Vt100Surface::default()),
            scanner: LineScanner::new(),
            phase: SessionPhase::Exited,
            generation: 0,
            visible: false,
            pending_prompt: None,
            auto_run_started: false,
            prompt_sent: false,
            auto_title_done: false,
            auto_run_timer: None,
            prompt_timer: None,
            preview_timer: None,
        }
    }

    /// Cancel every pending timer. Must run before teardown or restart so a
    /// stale firing can never reach a disposed or reassigned session id.
    fn cancel_timers(&mut self) {
        for timer in [
            self.auto_run_timer.take(),
            self.prompt_timer.take(),
            self.preview_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            timer.abort();
        }
    }
}

pub struct SessionRegistry {
    config: SessionConfig,
    entries: HashMap<String, SessionEntry>,
    actions: mpsc::UnboundedSender<Action>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionRegistry {
    pub fn new(
        config: SessionConfig,
        actions: mpsc::UnboundedSender<Action>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        SessionRegistry {
            config,
            entries: HashMap::new(),
            actions,
            events,
        }
    }

    fn dispatch(&self, action: Action) {
        if self.actions.send(action).is_err() {
            tracing::warn!("Store dispatch channel closed; dropping action");
        }
    }

    /// Allocate a surface and start the shell for `thread_id` in `cwd`.
    /// A second request for an id that is already spawning or running is
    /// ignored; one in-flight instantiate per id, never two processes.
    pub fn instantiate(&mut self, thread_id: &str, cwd: &Path, pending_prompt: Option<String>) {
        if let Some(entry) = self.entries.get(thread_id) {
            if entry.process.is_some() {
                tracing::warn!(
                    "Ignoring instantiate for {}: session already {:?}",
                    thread_id,
                    entry.phase
                );
                return;
            }
        }

        let mut entry = self
            .entries
            .remove(thread_id)
            .unwrap_or_else(SessionEntry::surface_only);
        entry.phase = SessionPhase::Spawning;
        entry.generation += 1;
        entry.pending_prompt = pending_prompt;
        entry.auto_run_started = false;
        entry.prompt_sent = false;

        let generation = entry.generation;
        let (rows, cols) = entry.surface.size();
        match PtyProcess::spawn(
            thread_id,
            generation,
            &self.config.shell,
            rows,
            cols,
            cwd,
            self.events.clone(),
        ) {
            Ok(process) => {
                entry.process = Some(process);
                entry.phase = SessionPhase::Running;

                if self.config.auto_run_command.is_some() {
                    entry.auto_run_timer = Some(self.arm_timer(
                        thread_id,
                        generation,
                        Duration::from_millis(self.config.settle_delay_ms),
                        |id, generation| SessionEvent::AutoRunDue {
                            thread_id: id,
                            generation,
                        },
                    ));
                }
                if entry.pending_prompt.is_some() {
                    entry.prompt_timer = Some(self.arm_timer(
                        thread_id,
                        generation,
                        Duration::from_millis(
                            self.config.settle_delay_ms + self.config.prompt_delay_ms,
                        ),
                        |id, generation| SessionEvent::PromptDue {
                            thread_id: id,
                            generation,
                        },
                    ));
                }
            }
            Err(e) => {
                // Surfaced as an immediate exit, handled like any other.
                tracing::error!("Failed to spawn session for {}: {}", thread_id, e);
                entry.phase = SessionPhase::Exited;
                let _ = self.events.send(SessionEvent::Exited {
                    thread_id: thread_id.to_string(),
                    generation,
                    exit_code: EXIT_CODE_SPAWN_FAILED,
                });
            }
        }

        self.entries.insert(thread_id.to_string(), entry);
    }

    fn arm_timer(
        &self,
        thread_id: &str,
        generation: u64,
        delay: Duration,
        make_event: fn(String, u64) -> SessionEvent,
    ) -> JoinHandle<()> {
        let events = self.events.clone();
        let id = thread_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(make_event(id, generation));
        })
    }

    /// Surface-only entry for a thread restored from persistence: no process
    /// until the user explicitly restarts, so N restored threads never mean
    /// N silent spawns at startup.
    pub fn ensure_surface(&mut self, thread_id: &str) {
        self.entries
            .entry(thread_id.to_string())
            .or_insert_with(SessionEntry::surface_only);
    }

    pub fn has_session(&self, thread_id: &str) -> bool {
        self.entries.contains_key(thread_id)
    }

    /// Route one asynchronous session event. Events for ids with no entry
    /// are stale (teardown raced a timer or reader) and are dropped, as are
    /// events whose generation no longer matches the entry's current spawn.
    pub fn handle_event(&mut self, event: SessionEvent, state: &AppState) {
        match event {
            SessionEvent::Output {
                thread_id,
                generation,
                bytes,
            } => self.ingest(&thread_id, generation, &bytes, state),
            SessionEvent::Exited {
                thread_id,
                generation,
                exit_code,
            } => {
                let Some(entry) = self.entries.get_mut(&thread_id) else {
                    tracing::debug!("Dropping exit event for unknown session {}", thread_id);
                    return;
                };
                if entry.generation != generation {
                    // A waiter from a process the restart already replaced;
                    // the entry's process handle belongs to a newer spawn.
                    tracing::debug!(
                        "Dropping stale exit (gen {}) for session {}",
                        generation,
                        thread_id
                    );
                    return;
                }
                entry.process = None;
                if entry.phase == SessionPhase::Killed {
                    // KillThreadPty already recorded the killed sentinel;
                    // the real wait status must not overwrite it.
                    return;
                }
                entry.phase = SessionPhase::Exited;
                self.dispatch(Action::SetPtyExited {
                    thread_id,
                    exit_code,
                });
            }
            SessionEvent::AutoRunDue {
                thread_id,
                generation,
            } => {
                let command = self.config.auto_run_command.clone();
                let Some(entry) = self.entries.get_mut(&thread_id) else {
                    return;
                };
                if entry.generation != generation {
                    return;
                }
                entry.auto_run_timer = None;
                if entry.auto_run_started {
                    return;
                }
                if let (Some(cmd), Some(process)) = (command, entry.process.as_mut()) {
                    if let Err(e) = process.write(format!("{cmd}\n").as_bytes()) {
                        tracing::warn!("Auto-run write to {} failed: {}", thread_id, e);
                    } else {
                        entry.auto_run_started = true;
                    }
                }
            }
            SessionEvent::PromptDue {
                thread_id,
                generation,
            } => {
                let Some(entry) = self.entries.get_mut(&thread_id) else {
                    return;
                };
                if entry.generation != generation {
                    return;
                }
                entry.prompt_timer = None;
                if entry.prompt_sent {
                    return;
                }
                if let (Some(prompt), Some(process)) =
                    (entry.pending_prompt.clone(), entry.process.as_mut())
                {
                    if let Err(e) = process.write(format!("{prompt}\n").as_bytes()) {
                        tracing::warn!("Prompt write to {} failed: {}", thread_id, e);
                    } else {
                        entry.prompt_sent = true;
                    }
                }
            }
            SessionEvent::PreviewDue {
                thread_id,
                generation,
            } => {
                let Some(entry) = self.entries.get_mut(&thread_id) else {
                    return;
                };
                if entry.generation != generation {
                    return;
                }
                entry.preview_timer = None;
                if let Some(preview) = output::preview_of(&entry.scanner) {
                    self.dispatch(Action::SetOutputPreview { thread_id, preview });
                }
            }
        }
    }

    fn ingest(&mut self, thread_id: &str, generation: u64, bytes: &[u8], state: &AppState) {
        let auto_run_command = self.config.auto_run_command.clone();
        let preview_delay = Duration::from_millis(self.config.preview_debounce_ms);

        let derived_title;
        let arm_preview;
        {
            let Some(entry) = self.entries.get_mut(thread_id) else {
                tracing::debug!("Dropping output for unknown session {}", thread_id);
                return;
            };
            if entry.generation != generation {
                tracing::debug!(
                    "Dropping stale output (gen {}) for session {}",
                    generation,
                    thread_id
                );
                return;
            }

            entry.surface.write(bytes);
            let new_lines = entry.scanner.ingest(&String::from_utf8_lossy(bytes));

            // Auto-title: first qualifying line after the auto-run command
            // has gone out, at most once per session, and only while the
            // thread still carries its machine-generated title.
            let auto_titled = state.thread(thread_id).is_some_and(|t| t.auto_titled);
            derived_title = if auto_titled && entry.auto_run_started && !entry.auto_title_done {
                let title = output::derive_title(
                    new_lines.iter().map(String::as_str),
                    auto_run_command.as_deref(),
                );
                if title.is_some() {
                    entry.auto_title_done = true;
                }
                title
            } else {
                None
            };

            arm_preview = entry.preview_timer.is_none();
        }

        if let Some(title) = derived_title {
            self.dispatch(Action::RenameThread {
                thread_id: thread_id.to_string(),
                title,
            });
        }

        // Single in-flight preview debounce per session.
        if arm_preview {
            let timer = self.arm_timer(thread_id, generation, preview_delay, |id, generation| {
                SessionEvent::PreviewDue {
                    thread_id: id,
                    generation,
                }
            });
            if let Some(entry) = self.entries.get_mut(thread_id) {
                entry.preview_timer = Some(timer);
            }
        }

        if !state.is_selected(thread_id) {
            self.dispatch(Action::MarkActivity {
                thread_id: thread_id.to_string(),
            });
        }
    }

    /// Make a session visible. Re-propagates geometry to the process so it
    /// always tracks the visible buffer.
    pub fn show(&mut self, thread_id: &str) {
        if let Some(entry) = self.entries.get_mut(thread_id) {
            entry.visible = true;
            let (rows, cols) = entry.surface.size();
            if let Some(process) = &entry.process {
                if let Err(e) = process.resize(rows, cols) {
                    tracing::debug!("Resize on show failed for {}: {}", thread_id, e);
                }
            }
        }
    }

    pub fn hide(&mut self, thread_id: &str) {
        if let Some(entry) = self.entries.get_mut(thread_id) {
            entry.visible = false;
        }
    }

    /// Buffer geometry changed; mirror it to the process if one is alive
    /// and the session is visible. Hidden sessions pick the new geometry up
    /// on the next `show`.
    pub fn resize(&mut self, thread_id: &str, rows: u16, cols: u16) {
        if let Some(entry) = self.entries.get_mut(thread_id) {
            entry.surface.resize(rows, cols);
            if !entry.visible {
                return;
            }
            if let Some(process) = &entry.process {
                if let Err(e) = process.resize(rows, cols) {
                    tracing::debug!("Resize propagation failed for {}: {}", thread_id, e);
                }
            }
        }
    }

    /// Forward user keystrokes. Silently dropped when no process is alive.
    pub fn write_input(&mut self, thread_id: &str, bytes: &[u8]) {
        if let Some(entry) = self.entries.get_mut(thread_id) {
            if let Some(process) = entry.process.as_mut() {
                if let Err(e) = process.write(bytes) {
                    tracing::warn!("Input write to {} failed: {}", thread_id, e);
                }
            }
        }
    }

    /// Force-terminate a session's process. The surface (and its scrollback)
    /// survives so the thread can be inspected or restarted.
    pub fn kill(&mut self, thread_id: &str) {
        if let Some(entry) = self.entries.get_mut(thread_id) {
            entry.cancel_timers();
            if let Some(mut process) = entry.process.take() {
                process.kill();
            }
            entry.phase = SessionPhase::Killed;
            entry
                .surface
                .write(b"\r\n\x1b[31m[process terminated]\x1b[0m\r\n");
        }
    }

    /// Tear down the old process state and spawn a fresh shell in `cwd`.
    pub fn restart(&mut self, thread_id: &str, cwd: &Path) {
        let Some(entry) = self.entries.get_mut(thread_id) else {
            return;
        };
        entry.cancel_timers();
        if let Some(mut process) = entry.process.take() {
            process.kill();
        }
        // Killed phase would suppress the stale waiter's exit dispatch.
        entry.phase = SessionPhase::Killed;
        entry.surface.clear();
        entry.scanner.clear();
        entry.auto_run_started = false;
        entry.prompt_sent = false;
        entry.auto_title_done = false;

        self.dispatch(Action::SetPtyRunning {
            thread_id: thread_id.to_string(),
        });
        self.instantiate(thread_id, cwd, None);
    }

    /// Dispose one session entirely: timers, process, surface, entry.
    pub fn teardown(&mut self, thread_id: &str) {
        if let Some(mut entry) = self.entries.remove(thread_id) {
            entry.cancel_timers();
            if let Some(mut process) = entry.process.take() {
                process.kill();
            }
        }
    }

    pub fn teardown_all(&mut self) {
        let ids: Vec<String> = self.entries.keys().cloned().collect();
        tracing::info!("Tearing down {} sessions", ids.len());
        for id in ids {
            self.teardown(&id);
        }
    }

    /// Visible screen contents of a session's surface, for snapshots.
    pub fn surface_contents(&self, thread_id: &str) -> Option<String> {
        self.entries.get(thread_id).map(|e| e.surface.contents())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ThreadType;
    use chrono::Utc;

    fn test_config() -> SessionConfig {
        SessionConfig {
            shell: "/bin/sh".to_string(),
            auto_run_command: Some("claude".to_string()),
            settle_delay_ms: 500,
            prompt_delay_ms: 2500,
            preview_debounce_ms: 2000,
        }
    }

    struct Harness {
        registry: SessionRegistry,
        actions_rx: mpsc::UnboundedReceiver<Action>,
        events_rx: mpsc::UnboundedReceiver<SessionEvent>,
        state: AppState,
    }

    fn harness() -> Harness {
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let registry = SessionRegistry::new(test_config(), actions_tx, events_tx);

        let mut state = AppState::default();
        state.apply(
            Action::CreateThread {
                id: "t1".into(),
                channel_id: "ch1".into(),
                title: "untitled".into(),
                thread_type: ThreadType::Terminal,
                pty_id: None,
            },
            Utc::now(),
        );
        // Leave the thread unselected so output marks activity.
        state.apply(
            Action::SelectChannel {
                channel_id: "ch1".into(),
            },
            Utc::now(),
        );

        Harness {
            registry,
            actions_rx,
            events_rx,
            state,
        }
    }

    fn output_event(bytes: &str) -> SessionEvent {
        // Surface-only entries sit at generation 0.
        SessionEvent::Output {
            thread_id: "t1".into(),
            generation: 0,
            bytes: bytes.as_bytes().to_vec(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn output_marks_activity_and_debounces_preview() {
        let mut h = harness();
        h.registry.ensure_surface("t1");

        h.registry.handle_event(output_event("building...\n"), &h.state);

        match h.actions_rx.try_recv().unwrap() {
            Action::MarkActivity { thread_id } => assert_eq!(thread_id, "t1"),
            other => panic!("expected MarkActivity, got {other:?}"),
        }

        // Nothing published until the debounce elapses.
        assert!(h.actions_rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(2100)).await;

        let due = h.events_rx.recv().await.unwrap();
        assert!(matches!(due, SessionEvent::PreviewDue { .. }));
        h.registry.handle_event(due, &h.state);

        match h.actions_rx.try_recv().unwrap() {
            Action::SetOutputPreview { thread_id, preview } => {
                assert_eq!(thread_id, "t1");
                assert_eq!(preview, "building...");
            }
            other => panic!("expected SetOutputPreview, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_preview_timer_is_in_flight() {
        let mut h = harness();
        h.registry.ensure_surface("t1");

        h.registry.handle_event(output_event("one\n"), &h.state);
        h.registry.handle_event(output_event("two\n"), &h.state);
        tokio::time::sleep(Duration::from_millis(2100)).await;

        let due = h.events_rx.recv().await.unwrap();
        assert!(matches!(due, SessionEvent::PreviewDue { .. }));
        // The second chunk must not have armed a second timer.
        assert!(h.events_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_preview_timer_after_teardown_dispatches_nothing() {
        let mut h = harness();
        h.registry.ensure_surface("t1");
        h.registry.handle_event(output_event("output\n"), &h.state);
        while h.actions_rx.try_recv().is_ok() {}

        h.registry.teardown("t1");
        tokio::time::sleep(Duration::from_millis(3000)).await;

        // The timer was aborted: no event fired, no action dispatched.
        assert!(h.events_rx.try_recv().is_err());
        assert!(h.actions_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn auto_title_fires_once_on_first_qualifying_line() {
        let mut h = harness();
        h.registry.ensure_surface("t1");
        h.registry
            .entries
            .get_mut("t1")
            .unwrap()
            .auto_run_started = true;

        h.registry.handle_event(
            output_event("$ \nclaude\nBuilding the login page...\nnext line\n"),
            &h.state,
        );

        let mut titles = Vec::new();
        while let Ok(action) = h.actions_rx.try_recv() {
            if let Action::RenameThread { title, .. } = action {
                titles.push(title);
            }
        }
        assert_eq!(titles, vec!["Building the login page...".to_string()]);

        // Later qualifying lines must not retitle.
        h.registry
            .handle_event(output_event("Another qualifying line\n"), &h.state);
        while let Ok(action) = h.actions_rx.try_recv() {
            assert!(!matches!(action, Action::RenameThread { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn events_for_unknown_sessions_are_dropped() {
        let mut h = harness();
        h.registry.handle_event(output_event("orphan\n"), &h.state);
        h.registry.handle_event(
            SessionEvent::PreviewDue {
                thread_id: "t1".into(),
                generation: 0,
            },
            &h.state,
        );
        assert!(h.actions_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn kill_renders_notice_and_drops_exit_dispatch() {
        let mut h = harness();
        h.registry.ensure_surface("t1");
        h.registry.kill("t1");

        assert!(h
            .registry
            .surface_contents("t1")
            .unwrap()
            .contains("[process terminated]"));

        // A late waiter exit for a killed session must not overwrite the
        // killed sentinel in the store.
        h.registry.handle_event(
            SessionEvent::Exited {
                thread_id: "t1".into(),
                generation: 0,
                exit_code: 137,
            },
            &h.state,
        );
        assert!(h.actions_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_exit_and_output_from_before_restart_are_dropped() {
        let mut h = harness();
        h.registry.config.auto_run_command = None;
        h.registry.instantiate("t1", &std::env::temp_dir(), None);
        h.registry.restart("t1", &std::env::temp_dir());
        while h.actions_rx.try_recv().is_ok() {}

        // The first spawn's waiter reports its exit only after the restart
        // has already installed the second process (generation 2).
        h.registry.handle_event(
            SessionEvent::Exited {
                thread_id: "t1".into(),
                generation: 1,
                exit_code: 1,
            },
            &h.state,
        );
        h.registry.handle_event(
            SessionEvent::Output {
                thread_id: "t1".into(),
                generation: 1,
                bytes: b"leftover from the old reader\n".to_vec(),
            },
            &h.state,
        );

        let entry = h.registry.entries.get("t1").unwrap();
        assert!(entry.process.is_some());
        assert_eq!(entry.phase, SessionPhase::Running);
        assert!(!h
            .registry
            .surface_contents("t1")
            .unwrap()
            .contains("leftover"));
        while let Ok(action) = h.actions_rx.try_recv() {
            assert!(!matches!(action, Action::SetPtyExited { .. }));
        }

        h.registry.teardown_all();
    }

    #[tokio::test]
    async fn hidden_sessions_defer_process_resize_until_shown() {
        let mut h = harness();
        h.registry.ensure_surface("t1");
        assert!(!h.registry.entries.get("t1").unwrap().visible);

        // The surface tracks geometry even while hidden.
        h.registry.resize("t1", 40, 100);
        assert_eq!(h.registry.entries.get("t1").unwrap().surface.size(), (40, 100));

        h.registry.show("t1");
        assert!(h.registry.entries.get("t1").unwrap().visible);
        h.registry.hide("t1");
        assert!(!h.registry.entries.get("t1").unwrap().visible);
    }

    #[tokio::test]
    async fn double_instantiate_is_ignored() {
        let mut h = harness();
        // A quiet long-running process; /bin/sh with no input just idles.
        h.registry.config.auto_run_command = None;
        h.registry.instantiate("t1", &std::env::temp_dir(), None);
        assert!(h.registry.has_session("t1"));
        let running = h.registry.entries.get("t1").unwrap().process.is_some();

        h.registry.instantiate("t1", &std::env::temp_dir(), None);
        assert_eq!(h.registry.entries.len(), 1);
        assert_eq!(
            h.registry.entries.get("t1").unwrap().process.is_some(),
            running
        );

        h.registry.teardown_all();
        assert!(!h.registry.has_session("t1"));
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_failure_surfaces_as_exit_event() {
        let mut h = harness();
        h.registry.config.shell = "/nonexistent/shell-binary".to_string();
        h.registry.instantiate("t1", &std::env::temp_dir(), None);

        let mut saw_exit = false;
        while let Ok(event) = h.events_rx.try_recv() {
            if let SessionEvent::Exited { exit_code, .. } = event {
                // Either the spawn itself failed, or the PTY handed us a
                // child that immediately exited with the shell-not-found
                // convention; both surface as a sentinel exit.
                assert_ne!(exit_code, 0);
                saw_exit = true;
            }
        }
        if !saw_exit {
            // Some platforms report the failure through the waiter task
            // instead; give it a moment on real time.
            tokio::time::resume();
            tokio::time::sleep(Duration::from_millis(500)).await;
            while let Ok(event) = h.events_rx.try_recv() {
                if let SessionEvent::Exited { exit_code, .. } = event {
                    assert_ne!(exit_code, 0);
                    saw_exit = true;
                }
            }
        }
        assert!(saw_exit);
    }
}
