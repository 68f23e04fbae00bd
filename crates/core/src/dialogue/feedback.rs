/// Phrases that confirm the agent understood.
const CONFIRMATION_PHRASES: &[&str] = &[
    "yes",
    "yeah",
    "yep",
    "correct",
    "right",
    "exactly",
    "mhm",
    "uh huh",
    "that's right",
    "you got it",
    "bingo",
    "yup",
    "ya",
    "sure",
    "ok",
    "okay",
];
/// Phrases that push back on what the agent said.
const CORRECTION_PHRASES: &[&str] = &[
    "no",
    "nope",
    "nah",
    "not really",
    "wrong",
    "that's not right",
    "not quite",
    "actually",
    "that's wrong",
    "incorrect",
];
/// Phrases that steer away from the current topic.
const TOPIC_CHANGE_PHRASES: &[&str] = &[
    "let's move on",
    "anyway",
    "something else",
    "different question",
    "change the subject",
    "new topic",
    "forget that",
    "never mind",
];
/// Replies that brush a question off without answering it.
const DISMISSIVE_REPLIES: &[&str] = &["idk", "i don't know", "dunno", "not sure", "maybe", "idc", "whatever"];

/// How a user message relates to the running topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Confirmation,
    Correction,
    TopicChange,
    /// None of the fixed phrases; topic detection decides.
    Other,
}

/// True when `lower` is the phrase itself or starts with it followed by
/// a space or comma.
fn starts_with_phrase(lower: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| {
        lower == *p
            || lower
                .strip_prefix(p)
                .is_some_and(|rest| rest.starts_with(' ') || rest.starts_with(','))
    })
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

pub fn is_confirmation(text: &str) -> bool {
    starts_with_phrase(&normalize(text), CONFIRMATION_PHRASES)
}

pub fn is_correction(text: &str) -> bool {
    starts_with_phrase(&normalize(text), CORRECTION_PHRASES)
}

pub fn is_topic_change(text: &str) -> bool {
    starts_with_phrase(&normalize(text), TOPIC_CHANGE_PHRASES)
}

/// First match wins: confirmation, correction, topic change.
pub fn classify(text: &str) -> Classification {
    if is_confirmation(text) {
        Classification::Confirmation
    } else if is_correction(text) {
        Classification::Correction
    } else if is_topic_change(text) {
        Classification::TopicChange
    } else {
        Classification::Other
    }
}

/// The user shrugged a question off ("idk", "dunno", or barely anything).
pub fn is_dismissive(text: &str) -> bool {
    let lower = normalize(text);
    DISMISSIVE_REPLIES.contains(&lower.as_str()) || text.chars().count() < 3
}
