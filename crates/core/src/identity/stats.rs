//! Interaction counters derived from raw message text.
//!
//! Each pattern set is matched by substring against the lowercased user
//! message; a set either hits or it doesn't, so one message bumps each
//! counter at most once.

use chrono::{DateTime, Local, Utc};

use crate::types::{Identity, Stats};

const CORRECTION_PATTERNS: &[&str] = &[
    "no,",
    "no ",
    "actually",
    "that's wrong",
    "that's not right",
    "not quite",
    "incorrect",
    "you're wrong",
    "thats wrong",
];

const EMOTIONAL_PATTERNS: &[&str] = &[
    "i feel",
    "i'm feeling",
    "i felt",
    "feeling",
    "sad",
    "happy",
    "angry",
    "frustrated",
    "anxious",
    "worried",
    "scared",
    "excited",
    "depressed",
    "stressed",
    "overwhelmed",
    "lonely",
    "hurt",
];

const REMINDER_PATTERNS: &[&str] = &["remind me", "remember to", "don't let me forget", "make sure i"];

const THOUGHT_DUMP_PATTERNS: &[&str] = &[
    "i've been thinking",
    "on my mind",
    "i need to vent",
    "just thinking",
    "random thought",
    "brain dump",
    "let me just",
];

const TASK_PATTERNS: &[&str] = &["can you", "could you", "please", "i need you to", "help me"];

/// Messages at or under this many words that aren't questions count as answers.
const ANSWER_MAX_WORDS: usize = 10;

/// Which pattern sets a user message hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageKinds {
    pub correction: bool,
    pub emotional_share: bool,
    pub reminder_request: bool,
    pub thought_dump: bool,
    pub task_request: bool,
    pub possible_answer: bool,
}

fn any_in(lower: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| lower.contains(p))
}

pub fn classify(message: &str) -> MessageKinds {
    let lower = message.to_lowercase();
    MessageKinds {
        correction: any_in(&lower, CORRECTION_PATTERNS),
        emotional_share: any_in(&lower, EMOTIONAL_PATTERNS),
        reminder_request: any_in(&lower, REMINDER_PATTERNS),
        thought_dump: any_in(&lower, THOUGHT_DUMP_PATTERNS),
        task_request: any_in(&lower, TASK_PATTERNS),
        possible_answer: message.split_whitespace().count() <= ANSWER_MAX_WORDS
            && !message.trim_end().ends_with('?'),
    }
}

fn touch(stats: &mut Stats, now: DateTime<Utc>) {
    stats.last_interaction = Some(now);
    let day = now.with_timezone(&Local).date_naive().to_string();
    stats.unique_days.insert(day);
}

/// Record one exchange. Returns the classification that drove the counters.
pub fn track(identity: &mut Identity, user_message: &str, reply: &str, now: DateTime<Utc>) -> MessageKinds {
    let kinds = classify(user_message);
    let stats = &mut identity.stats;

    stats.messages_exchanged += 1;
    if kinds.correction {
        stats.corrections += 1;
    }
    if kinds.emotional_share {
        stats.emotional_shares += 1;
    }
    if kinds.reminder_request {
        stats.reminders_requested += 1;
    }
    if kinds.thought_dump {
        stats.thought_dumps += 1;
    }
    if kinds.task_request {
        stats.tasks_given += 1;
    }
    if reply.trim().ends_with('?') {
        stats.questions_asked += 1;
    }
    if kinds.possible_answer {
        stats.questions_answered += 1;
    }
    touch(stats, now);

    tracing::debug!(
        messages = stats.messages_exchanged,
        correction = kinds.correction,
        emotional = kinds.emotional_share,
        "exchange tracked"
    );
    kinds
}

pub fn track_memory_stored(identity: &mut Identity, now: DateTime<Utc>) {
    identity.stats.memories_stored += 1;
    touch(&mut identity.stats, now);
}

pub fn track_check_in(identity: &mut Identity, now: DateTime<Utc>) {
    identity.stats.check_ins += 1;
    touch(&mut identity.stats, now);
}

pub fn track_reminder_delivered(identity: &mut Identity, now: DateTime<Utc>) {
    identity.stats.reminders_delivered += 1;
    touch(&mut identity.stats, now);
}

pub fn track_task_completed(identity: &mut Identity, now: DateTime<Utc>) {
    identity.stats.tasks_completed += 1;
    touch(&mut identity.stats, now);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_pattern_sets() {
        let k = classify("No, actually I feel sad. Can you remind me later?");
        assert!(k.correction);
        assert!(k.emotional_share);
        assert!(k.reminder_request);
        assert!(k.task_request);
        assert!(!k.thought_dump);
        assert!(!k.possible_answer);

        let k = classify("I've been thinking about the garden");
        assert!(k.thought_dump);
        assert!(k.possible_answer);
    }

    #[test]
    fn long_messages_are_not_answers() {
        let k = classify("one two three four five six seven eight nine ten eleven");
        assert!(!k.possible_answer);
        assert!(classify("it is a dog").possible_answer);
    }

    #[test]
    fn track_counts_once_per_set() {
        let mut identity = Identity::default();
        let now = Utc::now();
        track(&mut identity, "sad sad sad, so sad", "Sad? What is sad?", now);

        let s = &identity.stats;
        assert_eq!(s.messages_exchanged, 1);
        assert_eq!(s.emotional_shares, 1);
        assert_eq!(s.questions_asked, 1);
        assert_eq!(s.questions_answered, 1);
        assert_eq!(s.last_interaction, Some(now));
        assert_eq!(s.unique_day_count(), 1);
    }

    #[test]
    fn same_day_counted_once() {
        let mut identity = Identity::default();
        let now = Utc::now();
        track(&mut identity, "hi", "Hi.", now);
        track(&mut identity, "hello", "Hello.", now);
        track_check_in(&mut identity, now);
        assert_eq!(identity.stats.unique_day_count(), 1);
        assert_eq!(identity.stats.messages_exchanged, 2);
        assert_eq!(identity.stats.check_ins, 1);
    }

    #[test]
    fn helper_trackers() {
        let mut identity = Identity::default();
        let now = Utc::now();
        track_memory_stored(&mut identity, now);
        track_reminder_delivered(&mut identity, now);
        track_task_completed(&mut identity, now);
        assert_eq!(identity.stats.memories_stored, 1);
        assert_eq!(identity.stats.reminders_delivered, 1);
        assert_eq!(identity.stats.tasks_completed, 1);
    }
}
