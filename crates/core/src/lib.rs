pub mod cognition;
pub mod companion;
pub mod config;
pub mod dialogue;
pub mod identity;
pub mod io;
pub mod memory;
pub mod persist;
pub mod runtime;
pub mod types;

pub use companion::{Collaborators, Companion, SessionStart, TurnReply};
pub use config::PalCfg;
