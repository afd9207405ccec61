pub mod config;
pub mod store;
pub mod types;

pub use config::Config;
pub use store::Action;
pub use types::{
    AppState, Channel, ScheduledMessage, Thread, ThreadStatus, ThreadType, EXIT_CODE_HYDRATED,
    EXIT_CODE_KILLED,
};
