//! Per-turn topic continuity and pending-question tracking.
//!
//! An update is split in two so the classifier network calls never run
//! under the identity lock: [`gather_hints`] talks to the classifier,
//! [`apply`] is pure and cheap.

use chrono::{DateTime, Utc};

use super::feedback::{self, Classification};
use crate::cognition::TopicClassifier;
use crate::types::{ConversationState, Stats, TopicPhase};

const MAX_LAST_RESPONSES: usize = 3;
const MAX_RESPONSE_CHARS: usize = 100;

/// What happened to the running topic this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicEvent {
    Confirmed,
    Corrected,
    Changed,
    /// Classifier kept (or could not name) the topic.
    Continued,
    /// Classifier named a different topic.
    Introduced,
    /// Resolved this turn, but the reply asked about something new.
    Reopened,
}

impl TopicPhase {
    pub fn next(self, event: TopicEvent) -> TopicPhase {
        use TopicEvent::*;
        match (self, event) {
            (_, Confirmed | Changed) => TopicPhase::Resolved,
            (_, Corrected | Continued | Introduced) => TopicPhase::Open,
            (TopicPhase::Resolved, Reopened) => TopicPhase::Open,
            (TopicPhase::Open, Reopened) => TopicPhase::Open,
        }
    }
}

/// Classifier output computed ahead of [`apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicHints {
    /// Topic named for an unclassified message.
    pub detected: Option<String>,
    /// Topic of the reply's question after a confirmation or topic change.
    pub reopened: Option<String>,
}

/// Result of one applied turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnUpdate {
    pub classification: Classification,
    pub events: Vec<TopicEvent>,
    pub question: Option<String>,
}

fn is_question_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split on whitespace that follows sentence punctuation.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() && prev.is_some_and(is_question_end) {
            out.push(text[start..i].trim());
            start = i;
        }
        prev = Some(c);
    }
    out.push(text[start..].trim());
    out.retain(|s| !s.is_empty());
    out
}

/// The last sentence of `reply` that ends with `?`.
pub fn extract_question(reply: &str) -> Option<String> {
    sentences(reply)
        .into_iter()
        .rev()
        .find(|s| s.ends_with('?'))
        .map(str::to_owned)
}

/// Text before the first `.` then the first `?`, trimmed and capped.
pub fn leading_clause(reply: &str) -> String {
    let clause = reply.split('.').next().unwrap_or("");
    let clause = clause.split('?').next().unwrap_or("").trim();
    clause.chars().take(MAX_RESPONSE_CHARS).collect()
}

fn wants_reopen_probe(classification: Classification, reply: &str) -> bool {
    matches!(classification, Classification::Confirmation | Classification::TopicChange)
        && extract_question(reply).is_some()
}

/// Ask the classifier everything `apply` may need. Failures leave the
/// corresponding hint empty, which keeps the prior topic.
pub async fn gather_hints(
    classifier: &dyn TopicClassifier,
    current_topic: Option<&str>,
    user_message: &str,
    reply: &str,
) -> TopicHints {
    let classification = feedback::classify(user_message);
    let mut hints = TopicHints::default();

    if classification == Classification::Other {
        match classifier.classify(user_message, reply, current_topic).await {
            Ok(topic) => hints.detected = topic,
            Err(e) => tracing::warn!(error = %e, "topic classification failed, keeping topic"),
        }
    }
    if wants_reopen_probe(classification, reply) {
        match classifier.classify("", reply, None).await {
            Ok(topic) => hints.reopened = topic,
            Err(e) => tracing::warn!(error = %e, "reopen classification failed"),
        }
    }
    hints
}

fn archive_current(state: &mut ConversationState) {
    if let Some(topic) = &state.current_topic
        && !state.topics_discussed.contains(topic)
    {
        state.topics_discussed.push(topic.clone());
    }
}

fn transition(state: &mut ConversationState, event: TopicEvent, events: &mut Vec<TopicEvent>) {
    state.topic_phase = state.topic_phase.next(event);
    events.push(event);
}

/// Fold one exchange into the conversation state.
pub fn apply(state: &mut ConversationState, user_message: &str, reply: &str, hints: &TopicHints) -> TurnUpdate {
    let classification = feedback::classify(user_message);
    let mut events = Vec::with_capacity(2);

    match classification {
        Classification::TopicChange => {
            archive_current(state);
            state.current_topic = None;
            transition(state, TopicEvent::Changed, &mut events);
        }
        Classification::Confirmation => {
            archive_current(state);
            transition(state, TopicEvent::Confirmed, &mut events);
        }
        Classification::Correction => transition(state, TopicEvent::Corrected, &mut events),
        Classification::Other => match &hints.detected {
            Some(topic) if state.current_topic.as_ref() != Some(topic) => {
                archive_current(state);
                state.current_topic = Some(topic.clone());
                transition(state, TopicEvent::Introduced, &mut events);
            }
            _ => transition(state, TopicEvent::Continued, &mut events),
        },
    }

    let question = extract_question(reply);

    if state.is_resolved()
        && question.is_some()
        && let Some(topic) = &hints.reopened
    {
        state.current_topic = Some(topic.clone());
        transition(state, TopicEvent::Reopened, &mut events);
    }

    match &question {
        Some(q) => {
            let lower = q.to_lowercase();
            if !state
                .questions_asked_this_session
                .iter()
                .any(|asked| asked.to_lowercase() == lower)
            {
                state.questions_asked_this_session.push(q.clone());
            }
            state.pending_question = Some(q.clone());
            state.pending_question_topic = state.current_topic.clone();
        }
        None => {
            state.pending_question = None;
            state.pending_question_topic = None;
        }
    }

    let clause = leading_clause(reply);
    if !clause.is_empty() {
        state.last_responses.push_back(clause);
        while state.last_responses.len() > MAX_LAST_RESPONSES {
            state.last_responses.pop_front();
        }
    }

    tracing::debug!(
        ?classification,
        ?events,
        topic = state.current_topic.as_deref().unwrap_or(""),
        "conversation updated"
    );
    TurnUpdate { classification, events, question }
}

/// Convenience: gather hints then apply.
pub async fn update(
    state: &mut ConversationState,
    user_message: &str,
    reply: &str,
    classifier: &dyn TopicClassifier,
) -> TurnUpdate {
    let hints = gather_hints(classifier, state.current_topic.as_deref(), user_message, reply).await;
    apply(state, user_message, reply, &hints)
}

/// Take the question asked last turn, leaving none pending.
pub fn take_pending(state: &mut ConversationState) -> Option<(String, Option<String>)> {
    let question = state.pending_question.take()?;
    Some((question, state.pending_question_topic.take()))
}

pub fn pending_question(state: &ConversationState) -> Option<(&str, Option<&str>)> {
    let q = state.pending_question.as_deref()?;
    Some((q, state.pending_question_topic.as_deref()))
}

/// Forget the session; the discussed-topic history survives.
pub fn reset_session(state: &mut ConversationState) {
    state.current_topic = None;
    state.topic_phase = TopicPhase::Open;
    state.questions_asked_this_session.clear();
    state.last_responses.clear();
    state.pending_question = None;
    state.pending_question_topic = None;
}

/// A window too large to represent can never elapse.
pub fn should_reset_session(stats: &Stats, now: DateTime<Utc>, idle_hours: u64) -> bool {
    let Some(last) = stats.last_interaction else {
        return true;
    };
    let Some(window) = i64::try_from(idle_hours).ok().and_then(chrono::Duration::try_hours) else {
        return false;
    };
    now.signed_duration_since(last) >= window
}

fn join_last(items: &[String], n: usize, sep: &str) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    Some(items[items.len().saturating_sub(n)..].join(sep))
}

pub fn format_for_prompt(state: &ConversationState) -> String {
    let topic = state.current_topic.as_deref().unwrap_or("none yet");
    let resolved = if state.is_resolved() { "yes" } else { "no" };
    let discussed = join_last(&state.topics_discussed, 5, ", ").unwrap_or_else(|| "nothing yet".into());
    let questions = join_last(&state.questions_asked_this_session, 5, "; ").unwrap_or_else(|| "none yet".into());
    let responses = if state.last_responses.is_empty() {
        "none".to_string()
    } else {
        state.last_responses.iter().cloned().collect::<Vec<_>>().join("; ")
    };

    format!(
        "CURRENT CONVERSATION STATE:
- Topic: {topic}
- Resolved: {resolved}
- Already discussed: {discussed}
- Questions already asked: {questions}
- Don't repeat: {responses}

TOPIC RULES:
- Stay on the current topic until it's resolved or the user changes it
- Don't re-ask questions from the \"already asked\" list
- Don't repeat phrases from \"don't repeat\" list
- If topic is resolved, you can ask about something new"
    )
}
