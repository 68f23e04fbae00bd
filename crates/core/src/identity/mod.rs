pub mod inner_life;
pub mod skills;
pub mod stats;
mod store;

pub use store::{IdentityStore, SharedIdentity};
