//! Thought queue and dream journal.
//!
//! Both are bounded. On overflow, entries that were already surfaced
//! (thoughts) or shared (dreams) are evicted oldest first; pending entries
//! are only dropped when nothing else is left to evict.

use chrono::{DateTime, Duration, Utc};

use crate::cognition::DreamSynthesizer;
use crate::dialogue::feedback;
use crate::types::{Dream, InnerLife, Thought, ThoughtKind};

pub const MAX_THOUGHTS: usize = 20;
pub const MAX_DREAMS: usize = 10;
pub const DREAM_COOLDOWN_MINUTES: i64 = 30;
/// Memories handed to the dream synthesizer at most.
pub const DREAM_MEMORY_WINDOW: usize = 10;

/// Drop entries until `items.len() <= cap`, preferring those `done` marks.
fn evict<T>(items: &mut Vec<T>, cap: usize, done: impl Fn(&T) -> bool) {
    while items.len() > cap {
        let victim = items.iter().position(&done).unwrap_or(0);
        items.remove(victim);
    }
}

pub fn enforce_caps(inner: &mut InnerLife) {
    evict(&mut inner.thought_queue, MAX_THOUGHTS, |t| t.surfaced);
    evict(&mut inner.dream_journal, MAX_DREAMS, |d| d.shared);
}

/// Queue a thought unless an equal one (ignoring case) is already there.
/// Returns whether it was added.
pub fn add_thought(inner: &mut InnerLife, text: &str, kind: ThoughtKind, now: DateTime<Utc>) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    let lower = text.to_lowercase();
    if inner.thought_queue.iter().any(|t| t.text.to_lowercase() == lower) {
        return false;
    }
    inner.thought_queue.push(Thought {
        text: text.to_owned(),
        kind,
        formed_at: now,
        surfaced: false,
    });
    evict(&mut inner.thought_queue, MAX_THOUGHTS, |t| t.surfaced);
    tracing::debug!(kind = kind.as_str(), queued = inner.thought_queue.len(), "thought queued");
    true
}

pub fn unsurfaced_thoughts(inner: &InnerLife) -> impl Iterator<Item = &Thought> {
    inner.thought_queue.iter().filter(|t| !t.surfaced)
}

pub fn oldest_unsurfaced_thought(inner: &InnerLife) -> Option<&str> {
    unsurfaced_thoughts(inner).next().map(|t| t.text.as_str())
}

/// Mark the `index`-th pending thought (clamped, oldest is 0) as surfaced
/// and return its text.
pub fn surface_thought(inner: &mut InnerLife, index: usize) -> Option<String> {
    let pending: Vec<usize> = inner
        .thought_queue
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.surfaced)
        .map(|(i, _)| i)
        .collect();
    let last = pending.len().checked_sub(1)?;
    let thought = &mut inner.thought_queue[pending[index.min(last)]];
    thought.surfaced = true;
    Some(thought.text.clone())
}

pub fn can_dream(inner: &InnerLife, now: DateTime<Utc>) -> bool {
    match inner.last_dream_time {
        None => true,
        Some(last) => now.signed_duration_since(last) >= Duration::minutes(DREAM_COOLDOWN_MINUTES),
    }
}

/// Commit a synthesized dream to the journal.
pub fn record_dream(inner: &mut InnerLife, text: &str, now: DateTime<Utc>) {
    inner.dream_journal.push(Dream {
        text: text.to_owned(),
        formed_at: now,
        shared: false,
    });
    evict(&mut inner.dream_journal, MAX_DREAMS, |d| d.shared);
    inner.last_dream_time = Some(now);
    inner.dreams_since_last_conversation += 1;
    tracing::info!(journal = inner.dream_journal.len(), "dream recorded");
}

/// Check, synthesize and record in one go. Returns the dream text when one
/// formed. Callers holding a lock should use `can_dream`/`record_dream`
/// around an unlocked synthesis instead.
pub async fn generate_dream(
    inner: &mut InnerLife,
    memories: &[String],
    synth: &dyn DreamSynthesizer,
    now: DateTime<Utc>,
) -> Option<String> {
    if !can_dream(inner, now) || memories.is_empty() {
        return None;
    }
    let window = &memories[..memories.len().min(DREAM_MEMORY_WINDOW)];
    let text = match synth.synthesize(window).await {
        Ok(Some(text)) if !text.trim().is_empty() => text.trim().to_owned(),
        Ok(_) => return None,
        Err(e) => {
            tracing::warn!(error = %e, "dream synthesis failed");
            return None;
        }
    };
    record_dream(inner, &text, now);
    Some(text)
}

pub fn unshared_dreams(inner: &InnerLife) -> impl Iterator<Item = &Dream> {
    inner.dream_journal.iter().filter(|d| !d.shared)
}

pub fn most_recent_unshared_dream(inner: &InnerLife) -> Option<&str> {
    unshared_dreams(inner).last().map(|d| d.text.as_str())
}

/// Mark the most recent unshared dream as shared and return it.
pub fn share_dream(inner: &mut InnerLife) -> Option<String> {
    let dream = inner.dream_journal.iter_mut().rev().find(|d| !d.shared)?;
    dream.shared = true;
    Some(dream.text.clone())
}

pub fn reset_dreams_since_conversation(inner: &mut InnerLife) {
    inner.dreams_since_last_conversation = 0;
}

pub fn format_for_prompt(inner: &InnerLife) -> String {
    let thoughts: Vec<String> = unsurfaced_thoughts(inner)
        .take(5)
        .map(|t| format!("\"{}\"", t.text))
        .collect();
    let dream = most_recent_unshared_dream(inner);
    if thoughts.is_empty() && dream.is_none() {
        return String::new();
    }

    let mut lines = vec!["INNER LIFE:".to_string()];
    if !thoughts.is_empty() {
        lines.push(format!("- Pending thoughts: [{}]", thoughts.join(", ")));
    }
    if let Some(dream) = dream {
        lines.push(format!("- Recent dream: \"{dream}\""));
    }
    lines.push("- You can bring these up naturally in conversation if relevant".into());
    lines.join("\n")
}

/// The question the agent asked last, if the user brushed it off.
pub fn detect_unanswered_question(reply: &str, user_message: &str) -> Option<String> {
    let parts: Vec<&str> = reply.split('?').collect();
    if parts.len() < 2 {
        return None;
    }
    let before = parts[parts.len() - 2];
    let question = before.rsplit('.').next().unwrap_or(before).trim();
    if question.is_empty() || !feedback::is_dismissive(user_message) {
        return None;
    }
    Some(format!("{question}?"))
}

const DETAIL_KEYWORDS: &[(&str, &str)] = &[
    ("girlfriend", "{o} mentioned a girlfriend but I don't know her name"),
    ("boyfriend", "{o} mentioned a boyfriend but I don't know his name"),
    ("wife", "{o} mentioned a wife but I don't know her name"),
    ("husband", "{o} mentioned a husband but I don't know his name"),
    ("friend", "{o} has a friend I don't know about"),
    ("job", "What exactly does {o} do for work?"),
    ("work", "I wonder what {o}'s work is like"),
    ("pet", "{o} has a pet I should ask about"),
    ("dog", "I want to know more about {o}'s dog"),
    ("cat", "I want to know more about {o}'s cat"),
];

/// A curiosity thought for the first person or thing the user mentioned
/// in passing. Keywords match whole words, plural `s` allowed.
pub fn extract_unmentioned_detail(user_message: &str, owner: &str) -> Option<String> {
    let lower = user_message.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_end_matches("'s"))
        .filter(|w| !w.is_empty())
        .collect();

    DETAIL_KEYWORDS.iter().find_map(|(keyword, template)| {
        let hit = words
            .iter()
            .any(|w| *w == *keyword || w.strip_suffix('s') == Some(*keyword));
        hit.then(|| template.replace("{o}", owner))
    })
}
