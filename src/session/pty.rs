//! PTY process handle: spawn, byte I/O, resize, kill. Output and exit are
//! delivered as discrete [`SessionEvent`]s into the app loop; nothing here
//! blocks the control task.

use anyhow::Result;
use portable_pty::{ChildKiller, CommandBuilder, NativePtySystem, PtySize, PtySystem};
use std::io::{Read, Write};
use std::path::Path;
use tokio::sync::mpsc;

/// Sentinel exit code used when the process could not be spawned at all;
/// handled identically to a normal exit.
pub const EXIT_CODE_SPAWN_FAILED: i32 = 127;

/// Asynchronous events produced by live sessions and their timers. All of
/// them funnel into the app loop's single event channel, so state mutation
/// stays in dispatch order.
///
/// Every event carries the spawn generation it originated from. A restart
/// bumps the generation, so readers, waiters and timers of a killed process
/// can never be mistaken for the current one.
#[derive(Debug)]
pub enum SessionEvent {
    /// Raw output bytes from the process.
    Output {
        thread_id: String,
        generation: u64,
        bytes: Vec<u8>,
    },
    /// The process exited (or failed to spawn).
    Exited {
        thread_id: String,
        generation: u64,
        exit_code: i32,
    },
    /// The auto-run settle delay elapsed.
    AutoRunDue { thread_id: String, generation: u64 },
    /// The pending-prompt delay elapsed.
    PromptDue { thread_id: String, generation: u64 },
    /// The preview debounce elapsed.
    PreviewDue { thread_id: String, generation: u64 },
}

/// A live PTY-backed process. Owned exclusively by the session registry.
pub struct PtyProcess {
    master: Box<dyn portable_pty::MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
}

impl PtyProcess {
    /// Spawn `shell` in `cwd` at the given geometry. A blocking reader task
    /// forwards output chunks and a waiter task reports the exit code, both
    /// as [`SessionEvent`]s tagged with `thread_id` and `generation`.
    pub fn spawn(
        thread_id: &str,
        generation: u64,
        shell: &str,
        rows: u16,
        cols: u16,
        cwd: &Path,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self> {
        let pty_system = NativePtySystem::default();
        let pair = pty_system.openpty(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.cwd(cwd);
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        cmd.env("COLUMNS", cols.to_string());
        cmd.env("LINES", rows.to_string());

        tracing::info!("Spawning shell '{}' for thread {} in {:?}", shell, thread_id, cwd);
        let mut child = pair.slave.spawn_command(cmd)?;
        let killer = child.clone_killer();

        let mut reader = pair.master.try_clone_reader()?;
        let writer = pair.master.take_writer()?;

        // Blocking read loop; EOF or a hard error ends it. The waiter task
        // below is the one that reports the exit.
        let reader_id = thread_id.to_string();
        let reader_tx = event_tx.clone();
        tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        tracing::debug!("PTY reader for {} reached EOF", reader_id);
                        break;
                    }
                    Ok(n) => {
                        let event = SessionEvent::Output {
                            thread_id: reader_id.clone(),
                            generation,
                            bytes: buf[..n].to_vec(),
                        };
                        if reader_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::debug!("PTY reader for {} stopped: {}", reader_id, e);
                        break;
                    }
                }
            }
        });

        let waiter_id = thread_id.to_string();
        tokio::task::spawn_blocking(move || {
            let exit_code = match child.wait() {
                Ok(status) => status.exit_code() as i32,
                Err(e) => {
                    tracing::warn!("Failed to wait on process for {}: {}", waiter_id, e);
                    EXIT_CODE_SPAWN_FAILED
                }
            };
            let _ = event_tx.send(SessionEvent::Exited {
                thread_id: waiter_id,
                generation,
                exit_code,
            });
        });

        Ok(PtyProcess {
            master: pair.master,
            writer,
            killer,
        })
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        self.master.resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })?;
        Ok(())
    }

    /// Force-terminate the process. The waiter task still delivers the exit
    /// event afterwards.
    pub fn kill(&mut self) {
        if let Err(e) = self.killer.kill() {
            tracing::debug!("Kill failed (process likely already gone): {}", e);
        }
    }
}
