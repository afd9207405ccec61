//! The app loop: a single task owning the authoritative state, the session
//! registry, the sweep intervals and the save debounce. Every mutation
//! happens synchronously inside this task, in dispatch order; PTY I/O and
//! timers arrive as discrete events on the same select loop.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::core::config::Config;
use crate::core::store::Action;
use crate::core::types::{AppState, ScheduledMessage, ThreadType};
use crate::session::pty::SessionEvent;
use crate::session::registry::SessionRegistry;
use crate::{persist, sweep};

/// Commands accepted by the app actor. Intents that need session
/// coordination get their own variant; pure state changes ride through
/// `Dispatch`.
pub enum AppCommand {
    /// Apply a store action with no session side effects.
    Dispatch(Action),
    CreateThread {
        channel_id: String,
        prompt: Option<String>,
        response_tx: oneshot::Sender<String>,
    },
    SelectThread {
        thread_id: String,
    },
    RestartThread {
        thread_id: String,
    },
    KillThread {
        thread_id: String,
    },
    DeleteThread {
        thread_id: String,
    },
    WriteInput {
        thread_id: String,
        bytes: Vec<u8>,
    },
    ResizeThread {
        thread_id: String,
        rows: u16,
        cols: u16,
    },
    Snapshot {
        response_tx: oneshot::Sender<AppState>,
    },
    SurfaceContents {
        thread_id: String,
        response_tx: oneshot::Sender<Option<String>>,
    },
    Shutdown {
        response_tx: oneshot::Sender<()>,
    },
}

/// Cloneable handle for talking to the app actor.
#[derive(Clone)]
pub struct AppHandle {
    command_tx: mpsc::UnboundedSender<AppCommand>,
}

impl AppHandle {
    /// Spawn the app actor over an already-loaded state.
    pub fn new(config: Config, state: AppState) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let registry = SessionRegistry::new(config.session.clone(), actions_tx, events_tx);
        let state_file = config.state_file();
        let actor = App {
            config,
            state,
            registry,
            command_rx,
            actions_rx,
            events_rx,
            state_file,
            save_deadline: None,
            visible_thread: None,
        };
        tokio::spawn(actor.run());

        Self { command_tx }
    }

    fn send(&self, command: AppCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| anyhow!("App actor is not running"))
    }

    pub fn dispatch(&self, action: Action) -> Result<()> {
        self.send(AppCommand::Dispatch(action))
    }

    /// Create a terminal thread in a channel, optionally with a prompt to
    /// auto-type once the session has settled. Returns the new thread id.
    pub async fn create_thread(
        &self,
        channel_id: String,
        prompt: Option<String>,
    ) -> Result<String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(AppCommand::CreateThread {
            channel_id,
            prompt,
            response_tx,
        })?;
        response_rx
            .await
            .map_err(|_| anyhow!("App actor did not respond"))
    }

    pub fn select_thread(&self, thread_id: String) -> Result<()> {
        self.send(AppCommand::SelectThread { thread_id })
    }

    pub fn restart_thread(&self, thread_id: String) -> Result<()> {
        self.send(AppCommand::RestartThread { thread_id })
    }

    pub fn kill_thread(&self, thread_id: String) -> Result<()> {
        self.send(AppCommand::KillThread { thread_id })
    }

    pub fn delete_thread(&self, thread_id: String) -> Result<()> {
        self.send(AppCommand::DeleteThread { thread_id })
    }

    pub fn write_input(&self, thread_id: String, bytes: Vec<u8>) -> Result<()> {
        self.send(AppCommand::WriteInput { thread_id, bytes })
    }

    pub fn resize_thread(&self, thread_id: String, rows: u16, cols: u16) -> Result<()> {
        self.send(AppCommand::ResizeThread {
            thread_id,
            rows,
            cols,
        })
    }

    /// Attach (or detach with `None`) a git branch to a thread. Purely
    /// informational; pairs with the probe helpers in [`crate::git`].
    pub fn set_thread_branch(&self, thread_id: String, branch: Option<String>) -> Result<()> {
        self.dispatch(Action::SetThreadBranch { thread_id, branch })
    }

    pub fn schedule_message(
        &self,
        channel_id: String,
        prompt: String,
        scheduled_at: chrono::DateTime<Utc>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.dispatch(Action::ScheduleMessage {
            message: ScheduledMessage {
                id: id.clone(),
                channel_id,
                prompt,
                scheduled_at,
            },
        })?;
        Ok(id)
    }

    /// Read-only copy of the current state.
    pub async fn snapshot(&self) -> Result<AppState> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(AppCommand::Snapshot { response_tx })?;
        response_rx
            .await
            .map_err(|_| anyhow!("App actor did not respond"))
    }

    pub async fn surface_contents(&self, thread_id: String) -> Result<Option<String>> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(AppCommand::SurfaceContents {
            thread_id,
            response_tx,
        })?;
        response_rx
            .await
            .map_err(|_| anyhow!("App actor did not respond"))
    }

    /// Save state, tear down all sessions, stop the actor.
    pub async fn shutdown(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self.send(AppCommand::Shutdown { response_tx }).is_ok() {
            let _ = response_rx.await;
        }
    }
}

struct App {
    config: Config,
    state: AppState,
    registry: SessionRegistry,
    command_rx: mpsc::UnboundedReceiver<AppCommand>,
    actions_rx: mpsc::UnboundedReceiver<Action>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    state_file: PathBuf,
    save_deadline: Option<tokio::time::Instant>,
    visible_thread: Option<String>,
}

impl App {
    async fn run(mut self) {
        let mut snooze_tick =
            tokio::time::interval(Duration::from_millis(self.config.sweep.snooze_interval_ms));
        let mut fire_tick =
            tokio::time::interval(Duration::from_millis(self.config.sweep.fire_interval_ms));

        loop {
            let save_at = self
                .save_deadline
                .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                Some(command) = self.command_rx.recv() => {
                    match command {
                        AppCommand::Shutdown { response_tx } => {
                            self.save_now();
                            self.registry.teardown_all();
                            let _ = response_tx.send(());
                            tracing::info!("App loop shutting down");
                            break;
                        }
                        other => self.handle_command(other),
                    }
                }
                Some(action) = self.actions_rx.recv() => {
                    self.apply(action);
                }
                Some(event) = self.events_rx.recv() => {
                    self.registry.handle_event(event, &self.state);
                }
                _ = snooze_tick.tick() => {
                    self.apply(Action::WakeSnoozed);
                }
                _ = fire_tick.tick() => {
                    self.fire_due_messages();
                }
                _ = tokio::time::sleep_until(save_at), if self.save_deadline.is_some() => {
                    self.save_now();
                }
            }
        }
    }

    /// Apply one action to the store; any change arms the save debounce.
    fn apply(&mut self, action: Action) {
        if self.state.apply(action, Utc::now()) {
            self.schedule_save();
        }
    }

    fn schedule_save(&mut self) {
        if self.save_deadline.is_none() {
            self.save_deadline = Some(
                tokio::time::Instant::now()
                    + Duration::from_millis(self.config.sweep.save_debounce_ms),
            );
        }
    }

    fn save_now(&mut self) {
        self.save_deadline = None;
        if let Err(e) = persist::save(&self.state_file, &self.state) {
            tracing::warn!("Failed to save state: {}", e);
        }
    }

    fn handle_command(&mut self, command: AppCommand) {
        match command {
            AppCommand::Dispatch(action) => self.apply(action),
            AppCommand::CreateThread {
                channel_id,
                prompt,
                response_tx,
            } => {
                let id = self.create_thread(channel_id, prompt);
                let _ = response_tx.send(id);
            }
            AppCommand::SelectThread { thread_id } => self.select_thread(thread_id),
            AppCommand::RestartThread { thread_id } => self.restart_thread(&thread_id),
            AppCommand::KillThread { thread_id } => {
                self.apply(Action::KillThreadPty {
                    thread_id: thread_id.clone(),
                });
                self.registry.kill(&thread_id);
            }
            AppCommand::DeleteThread { thread_id } => {
                // The store never cascades session cleanup; the registry
                // disposes resources on its own when the thread goes away.
                self.registry.teardown(&thread_id);
                if self.visible_thread.as_deref() == Some(thread_id.as_str()) {
                    self.visible_thread = None;
                }
                self.apply(Action::DeleteThread { thread_id });
            }
            AppCommand::WriteInput { thread_id, bytes } => {
                self.registry.write_input(&thread_id, &bytes);
            }
            AppCommand::ResizeThread {
                thread_id,
                rows,
                cols,
            } => {
                self.registry.resize(&thread_id, rows, cols);
            }
            AppCommand::Snapshot { response_tx } => {
                let _ = response_tx.send(self.state.clone());
            }
            AppCommand::SurfaceContents {
                thread_id,
                response_tx,
            } => {
                let _ = response_tx.send(self.registry.surface_contents(&thread_id));
            }
            AppCommand::Shutdown { .. } => unreachable!("handled in run loop"),
        }
    }

    fn thread_cwd(&self, channel_id: &str) -> PathBuf {
        self.state
            .channel(channel_id)
            .map(|c| PathBuf::from(&c.path))
            .or_else(|| self.state.root_path.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| std::env::temp_dir())
    }

    fn create_thread(&mut self, channel_id: String, prompt: Option<String>) -> String {
        let id = Uuid::new_v4().to_string();
        let title = prompt.clone().unwrap_or_else(|| "untitled".to_string());
        let cwd = self.thread_cwd(&channel_id);

        self.apply(Action::CreateThread {
            id: id.clone(),
            channel_id,
            title,
            thread_type: ThreadType::Terminal,
            pty_id: Some(Uuid::new_v4().to_string()),
        });
        self.registry.instantiate(&id, &cwd, prompt);
        self.set_visible(Some(id.clone()));
        id
    }

    fn select_thread(&mut self, thread_id: String) {
        self.apply(Action::SelectThread {
            thread_id: thread_id.clone(),
        });

        let is_terminal = self
            .state
            .thread(&thread_id)
            .is_some_and(|t| t.thread_type == ThreadType::Terminal);
        if is_terminal {
            // Threads restored from persistence get a surface on first
            // selection but no process until an explicit restart.
            if !self.registry.has_session(&thread_id) {
                self.registry.ensure_surface(&thread_id);
            }
            self.set_visible(Some(thread_id));
        } else {
            self.set_visible(None);
        }
    }

    fn set_visible(&mut self, thread_id: Option<String>) {
        if self.visible_thread == thread_id {
            return;
        }
        if let Some(old) = self.visible_thread.take() {
            self.registry.hide(&old);
        }
        if let Some(id) = &thread_id {
            self.registry.show(id);
        }
        self.visible_thread = thread_id;
    }

    fn restart_thread(&mut self, thread_id: &str) {
        let channel_id = match self.state.thread(thread_id) {
            Some(t) if t.thread_type == ThreadType::Terminal => t.channel_id.clone(),
            Some(_) => return,
            None => {
                tracing::warn!("Restart requested for unknown thread {}", thread_id);
                return;
            }
        };
        let cwd = self.thread_cwd(&channel_id);
        self.registry.ensure_surface(thread_id);
        self.registry.restart(thread_id, &cwd);
    }

    /// Fire sweep: remove each due scheduled message and create a thread
    /// titled with its prompt, the prompt queued as auto-typed input.
    fn fire_due_messages(&mut self) {
        let due = sweep::due_messages(&self.state, Utc::now());
        for message in due {
            tracing::info!(
                "Firing scheduled message {} into channel {}",
                message.id,
                message.channel_id
            );
            self.apply(Action::FireScheduled {
                message_id: message.id,
            });
            self.create_thread(message.channel_id, Some(message.prompt));
        }
    }
}
