// threadmux
// Session lifecycle manager for parallel interactive terminal threads

pub mod app;
pub mod cli;
pub mod core;
pub mod git;
pub mod persist;
pub mod scan;
pub mod session;
pub mod sweep;

// Re-export commonly used types
pub use app::AppHandle;
pub use crate::core::{
    Action, AppState, Channel, Config, ScheduledMessage, Thread, ThreadStatus, ThreadType,
};
pub use session::{SessionEvent, SessionRegistry};

// Error handling
pub use anyhow::{Error, Result};
