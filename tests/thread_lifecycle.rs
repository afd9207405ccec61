//! End-to-end lifecycle scenarios against the full app loop with real PTY
//! sessions (plain /bin/sh, no auto-run command).

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use threadmux::core::config::{Config, SessionConfig, SweepConfig};
use threadmux::core::types::{AppState, Channel, ThreadStatus};
use threadmux::{persist, AppHandle};

fn test_config(data_dir: PathBuf) -> Config {
    Config {
        session: SessionConfig {
            shell: "/bin/sh".to_string(),
            auto_run_command: None,
            settle_delay_ms: 50,
            prompt_delay_ms: 100,
            preview_debounce_ms: 200,
        },
        sweep: SweepConfig {
            snooze_interval_ms: 100,
            fire_interval_ms: 100,
            save_debounce_ms: 100,
        },
        data_dir,
    }
}

fn test_state(channel_path: &std::path::Path) -> AppState {
    AppState {
        root_path: Some(channel_path.to_string_lossy().to_string()),
        channels: vec![Channel {
            id: "ch1".to_string(),
            name: "workspace".to_string(),
            path: channel_path.to_string_lossy().to_string(),
            children: Vec::new(),
        }],
        ..AppState::default()
    }
}

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("threadmux-{tag}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn terminal_thread_runs_produces_output_and_dies_on_kill() {
    let data_dir = unique_temp_dir("data");
    let workdir = unique_temp_dir("work");
    let handle = AppHandle::new(test_config(data_dir.clone()), test_state(&workdir));

    let id = handle
        .create_thread("ch1".to_string(), None)
        .await
        .unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    let thread = snapshot.thread(&id).expect("thread was created");
    assert_eq!(thread.status, ThreadStatus::Active);
    assert!(thread.pty_running);
    assert_eq!(snapshot.selected_thread_id.as_deref(), Some(id.as_str()));
    assert_eq!(snapshot.selected_channel_id.as_deref(), Some("ch1"));

    // Drive the shell and watch the output pipeline end to end.
    handle
        .write_input(id.clone(), b"printf 'marker-xyz\\n'\n".to_vec())
        .unwrap();
    wait_for("marker in surface contents", || {
        let handle = handle.clone();
        let id = id.clone();
        async move {
            handle
                .surface_contents(id)
                .await
                .unwrap()
                .is_some_and(|c| c.contains("marker-xyz"))
        }
    })
    .await;

    // The debounced preview lands in the store shortly after.
    wait_for("output preview", || {
        let handle = handle.clone();
        let id = id.clone();
        async move {
            let snapshot = handle.snapshot().await.unwrap();
            snapshot
                .thread(&id)
                .and_then(|t| t.last_output_preview.clone())
                .is_some()
        }
    })
    .await;

    // The selected thread never shows unread, whatever its activity.
    let snapshot = handle.snapshot().await.unwrap();
    assert!(!snapshot.thread(&id).unwrap().has_unread);

    handle.kill_thread(id.clone()).unwrap();
    wait_for("thread to report killed", || {
        let handle = handle.clone();
        let id = id.clone();
        async move {
            let snapshot = handle.snapshot().await.unwrap();
            let t = snapshot.thread(&id).unwrap();
            t.status == ThreadStatus::Inactive && t.pty_exit_code == Some(-1) && !t.pty_running
        }
    })
    .await;

    handle.shutdown().await;
    std::fs::remove_dir_all(&data_dir).ok();
    std::fs::remove_dir_all(&workdir).ok();
}

#[tokio::test]
async fn overdue_scheduled_message_fires_into_a_new_titled_thread() {
    let data_dir = unique_temp_dir("data");
    let workdir = unique_temp_dir("work");
    let handle = AppHandle::new(test_config(data_dir.clone()), test_state(&workdir));

    handle
        .schedule_message(
            "ch1".to_string(),
            "fix the flaky test".to_string(),
            Utc::now() - chrono::Duration::milliseconds(1),
        )
        .unwrap();

    wait_for("scheduled message to fire", || {
        let handle = handle.clone();
        async move {
            let snapshot = handle.snapshot().await.unwrap();
            snapshot.scheduled_messages.is_empty()
                && snapshot
                    .threads
                    .iter()
                    .any(|t| t.title == "fix the flaky test")
        }
    })
    .await;

    // Exactly one thread was created for the message.
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(
        snapshot
            .threads
            .iter()
            .filter(|t| t.title == "fix the flaky test")
            .count(),
        1
    );

    handle.shutdown().await;
    std::fs::remove_dir_all(&data_dir).ok();
    std::fs::remove_dir_all(&workdir).ok();
}

#[tokio::test]
async fn shutdown_saves_state_that_hydrates_cleanly() {
    let data_dir = unique_temp_dir("data");
    let workdir = unique_temp_dir("work");
    let config = test_config(data_dir.clone());
    let state_file = config.state_file();
    let handle = AppHandle::new(config, test_state(&workdir));

    let id = handle
        .create_thread("ch1".to_string(), None)
        .await
        .unwrap();
    handle.shutdown().await;

    let restored = persist::load(&state_file);
    let thread = restored.thread(&id).expect("thread survived the round trip");
    assert!(!thread.pty_running);
    assert_eq!(thread.pty_id, None);
    assert_eq!(thread.pty_exit_code, Some(0));
    assert!(!thread.has_unread);

    std::fs::remove_dir_all(&data_dir).ok();
    std::fs::remove_dir_all(&workdir).ok();
}
