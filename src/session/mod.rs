pub mod output;
pub mod pty;
pub mod registry;
pub mod surface;

pub use pty::{PtyProcess, SessionEvent, EXIT_CODE_SPAWN_FAILED};
pub use registry::SessionRegistry;
pub use surface::{TerminalSurface, Vt100Surface};
