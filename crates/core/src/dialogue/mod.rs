pub mod conversation;
pub mod feedback;
mod topic_tracking;

pub use conversation::{TopicEvent, TopicHints};
pub use feedback::Classification;
pub use topic_tracking::{SharedTopics, TopicLedger, TopicStore};
