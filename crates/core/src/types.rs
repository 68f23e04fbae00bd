use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persist::lenient;

/// Facial mood tag carried by the companion between turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Mood {
    Confused,
    #[default]
    Curious,
    Happy,
    Sad,
    Worried,
    Excited,
    Thinking,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confused => "confused",
            Self::Curious => "curious",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Worried => "worried",
            Self::Excited => "excited",
            Self::Thinking => "thinking",
        }
    }

    /// Unknown tags read as `Confused`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "curious" => Self::Curious,
            "happy" => Self::Happy,
            "sad" => Self::Sad,
            "worried" => Self::Worried,
            "excited" => Self::Excited,
            "thinking" => Self::Thinking,
            _ => Self::Confused,
        }
    }
}

impl From<String> for Mood {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Mood> for String {
    fn from(m: Mood) -> Self {
        m.as_str().to_owned()
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interaction counters. Counters only ever grow within a process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub messages_exchanged: u64,
    pub memories_stored: u64,
    pub emotional_shares: u64,
    pub questions_asked: u64,
    pub questions_answered: u64,
    pub corrections: u64,
    pub reminders_requested: u64,
    pub reminders_delivered: u64,
    pub thought_dumps: u64,
    pub check_ins: u64,
    pub tasks_given: u64,
    pub tasks_completed: u64,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub first_met: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub last_interaction: Option<DateTime<Utc>>,
    /// Local calendar days (`YYYY-MM-DD`) with at least one exchange.
    pub unique_days: BTreeSet<String>,
}

impl Stats {
    /// Look a counter up by its snake_case name. `None` for unknown names.
    pub fn counter(&self, name: &str) -> Option<u64> {
        let value = match name {
            "messages_exchanged" => self.messages_exchanged,
            "memories_stored" => self.memories_stored,
            "emotional_shares" => self.emotional_shares,
            "questions_asked" => self.questions_asked,
            "questions_answered" => self.questions_answered,
            "corrections" => self.corrections,
            "reminders_requested" => self.reminders_requested,
            "reminders_delivered" => self.reminders_delivered,
            "thought_dumps" => self.thought_dumps,
            "check_ins" => self.check_ins,
            "tasks_given" => self.tasks_given,
            "tasks_completed" => self.tasks_completed,
            _ => return None,
        };
        Some(value)
    }

    pub fn unique_day_count(&self) -> usize {
        self.unique_days.len()
    }
}

/// Progress of one skill. Locked skills sit at level 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillState {
    pub unlocked: bool,
    pub level: u32,
    pub uses: u32,
}

/// Whether the current topic is still being explored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicPhase {
    #[default]
    Open,
    Resolved,
}

/// Per-session dialogue state plus the long-lived topic history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationState {
    pub current_topic: Option<String>,
    pub topic_phase: TopicPhase,
    pub topics_discussed: Vec<String>,
    pub questions_asked_this_session: Vec<String>,
    /// Leading clauses of the last few replies, oldest first.
    pub last_responses: VecDeque<String>,
    pub pending_question: Option<String>,
    pub pending_question_topic: Option<String>,
}

impl ConversationState {
    pub fn is_resolved(&self) -> bool {
        self.topic_phase == TopicPhase::Resolved
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ThoughtKind {
    #[default]
    Question,
    Curiosity,
    Unresolved,
}

impl ThoughtKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Curiosity => "curiosity",
            Self::Unresolved => "unresolved",
        }
    }

    /// Unknown kinds read as `Question`.
    pub fn parse(s: &str) -> Self {
        match s {
            "curiosity" => Self::Curiosity,
            "unresolved" => Self::Unresolved,
            _ => Self::Question,
        }
    }
}

impl From<String> for ThoughtKind {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<ThoughtKind> for String {
    fn from(k: ThoughtKind) -> Self {
        k.as_str().to_owned()
    }
}

/// A queued internal thought waiting to be surfaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    #[serde(alias = "thought")]
    pub text: String,
    #[serde(alias = "type", default)]
    pub kind: ThoughtKind,
    #[serde(default = "Utc::now", deserialize_with = "lenient::timestamp_or_now")]
    pub formed_at: DateTime<Utc>,
    #[serde(default)]
    pub surfaced: bool,
}

/// A journal entry synthesized from recent memories during idle time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dream {
    #[serde(alias = "dream")]
    pub text: String,
    #[serde(default = "Utc::now", deserialize_with = "lenient::timestamp_or_now")]
    pub formed_at: DateTime<Utc>,
    #[serde(default)]
    pub shared: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InnerLife {
    pub thought_queue: Vec<Thought>,
    pub dream_journal: Vec<Dream>,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub last_dream_time: Option<DateTime<Utc>>,
    pub dreams_since_last_conversation: u32,
}

/// The companion's durable self. Persisted as one snapshot document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    pub name: String,
    pub owner_name: Option<String>,
    pub mood: Mood,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub born: Option<DateTime<Utc>>,
    pub first_boot: bool,
    pub stats: Stats,
    pub skills: BTreeMap<String, SkillState>,
    pub conversation_state: ConversationState,
    pub inner_life: InnerLife,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: "Pal".into(),
            owner_name: None,
            mood: Mood::default(),
            born: None,
            first_boot: true,
            stats: Stats::default(),
            skills: BTreeMap::new(),
            conversation_state: ConversationState::default(),
            inner_life: InnerLife::default(),
        }
    }
}

/// How well the companion understands a topic. Ordered; never regresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Understanding {
    #[default]
    Surface,
    Basic,
    Familiar,
    Knowledgeable,
}

impl Understanding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Surface => "surface",
            Self::Basic => "basic",
            Self::Familiar => "familiar",
            Self::Knowledgeable => "knowledgeable",
        }
    }

    /// Unknown levels read as `Surface`.
    pub fn parse(s: &str) -> Self {
        match s {
            "basic" => Self::Basic,
            "familiar" => Self::Familiar,
            "knowledgeable" => Self::Knowledgeable,
            _ => Self::Surface,
        }
    }
}

impl From<String> for Understanding {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Understanding> for String {
    fn from(u: Understanding) -> Self {
        u.as_str().to_owned()
    }
}

/// Durable record of one discussion subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicCard {
    pub display_name: String,
    #[serde(deserialize_with = "lenient::timestamp_or_now")]
    pub first_mentioned: DateTime<Utc>,
    #[serde(deserialize_with = "lenient::timestamp_or_now")]
    pub last_discussed: DateTime<Utc>,
    pub times_discussed: u32,
    /// Linked memory ids, insertion ordered, no duplicates.
    pub memories: Vec<String>,
    pub understanding: Understanding,
    /// Open questions, insertion ordered, no duplicates.
    pub unresolved: Vec<String>,
}

impl Default for TopicCard {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            display_name: String::new(),
            first_mentioned: now,
            last_discussed: now,
            times_discussed: 1,
            memories: Vec::new(),
            understanding: Understanding::Surface,
            unresolved: Vec::new(),
        }
    }
}

/// Notification pushed from the idle scheduler to the foreground loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Thought(String),
    Dream(String),
}
