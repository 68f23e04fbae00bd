mod idle_window;
mod scheduler;
mod shutdown;

pub use idle_window::{IdleEvent, IdleWindow};
pub use scheduler::{IdleScheduler, PollOutcome};
pub use shutdown::ShutdownGuard;
