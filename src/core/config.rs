use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub session: SessionConfig,
    pub sweep: SweepConfig,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Shell spawned for each terminal thread. Defaults to `$SHELL`.
    pub shell: String,
    /// Command written into a fresh session once the shell has settled.
    pub auto_run_command: Option<String>,
    /// Settle delay before the auto-run command is written (ms). Best-effort
    /// readiness heuristic, not true readiness detection.
    pub settle_delay_ms: u64,
    /// Further delay before a pending prompt is written (ms).
    pub prompt_delay_ms: u64,
    /// Debounce for publishing output previews (ms).
    pub preview_debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Interval of the snooze-wake sweep (ms).
    pub snooze_interval_ms: u64,
    /// Interval of the scheduled-message fire sweep (ms).
    pub fire_interval_ms: u64,
    /// Save debounce after a changing dispatch (ms).
    pub save_debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = directories::ProjectDirs::from("dev", "threadmux", "threadmux")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".threadmux"));

        Config {
            session: SessionConfig {
                shell: std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string()),
                auto_run_command: Some("claude".to_string()),
                settle_delay_ms: 500,
                prompt_delay_ms: 2500,
                preview_debounce_ms: 2000,
            },
            sweep: SweepConfig {
                snooze_interval_ms: 1000,
                fire_interval_ms: 1000,
                save_debounce_ms: 1000,
            },
            data_dir,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "threadmux", "threadmux") {
            let config_file = config_dir.config_dir().join("config.toml");
            if config_file.exists() {
                let content = std::fs::read_to_string(&config_file)?;
                match toml::from_str::<Config>(&content) {
                    Ok(config) => return Ok(config),
                    Err(e) => tracing::warn!("Ignoring malformed config file: {}", e),
                }
            }
        }
        Ok(Config::default())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "threadmux", "threadmux") {
            std::fs::create_dir_all(config_dir.config_dir())?;
            let config_file = config_dir.config_dir().join("config.toml");
            let content = toml::to_string_pretty(self)?;
            std::fs::write(config_file, content)?;
        }
        Ok(())
    }

    /// Location of the persisted state snapshot.
    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }
}
