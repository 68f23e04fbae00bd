//! The foreground session: one object holding the shared identity, the
//! topic ledger, the collaborators and the idle scheduler.
//!
//! Collaborator calls (memory search, reply generation, fact extraction,
//! topic classification) all run before the identity lock is taken; the
//! locked section only folds their results into state and persists.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pal_llm::LlmProvider;
use tokio::sync::Mutex;

use crate::cognition::{
    DreamSynthesizer, FactExtractor, LlmDreamSynthesizer, LlmFactExtractor, LlmReplyGenerator, LlmTopicClassifier,
    MemoryStore, ReplyGenerator, TopicClassifier,
};
use crate::config::PalCfg;
use crate::dialogue::{SharedTopics, TopicLedger, TopicStore, conversation, feedback};
use crate::identity::{IdentityStore, SharedIdentity, inner_life, skills, stats};
use crate::io::output::NotifySender;
use crate::memory;
use crate::persist::StoreError;
use crate::runtime::IdleScheduler;
use crate::types::{Identity, Mood, ThoughtKind};

pub const IDENTITY_FILE: &str = "identity.json";
pub const TOPICS_FILE: &str = "topics.json";
pub const MEMORIES_FILE: &str = "memories.json";
pub const CONFIG_FILE: &str = "config.json";

const APOLOGY: &str = "I... something's wrong. I can't... think.";
const NO_THOUGHTS: &str = "I haven't had any thoughts yet... I'm still new.";
const DREAM_SHARE_INTRO: &str = "I had a thought while you were gone...";

const THOUGHT_QUESTIONS: &[&str] = &[
    "what have you been thinking",
    "what are you thinking",
    "did you dream",
    "any dreams",
    "what's on your mind",
    "been thinking about",
    "thinking about anything",
    "have any thoughts",
];

/// Whether the owner is asking what the companion has been thinking or
/// dreaming about.
pub fn is_asking_about_thoughts(message: &str) -> bool {
    let lower = message.to_lowercase();
    THOUGHT_QUESTIONS.iter().any(|p| lower.contains(p))
}

/// The swappable collaborators a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub replies: Arc<dyn ReplyGenerator>,
    pub classifier: Arc<dyn TopicClassifier>,
    pub dreamer: Arc<dyn DreamSynthesizer>,
    pub facts: Arc<dyn FactExtractor>,
    pub memory: Arc<dyn MemoryStore>,
}

impl Collaborators {
    /// LLM-backed collaborators. Replies use the main provider; the cheap
    /// calls (topics, facts, dreams) prefer the lite one.
    pub fn from_llm(
        cfg: &PalCfg,
        llm: Option<Arc<dyn LlmProvider>>,
        lite_llm: Option<Arc<dyn LlmProvider>>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        let lite = lite_llm.or_else(|| llm.clone());
        Self {
            replies: Arc::new(LlmReplyGenerator::new(llm, cfg.reply_max_tokens, cfg.reply_temperature)),
            classifier: Arc::new(LlmTopicClassifier::new(lite.clone())),
            dreamer: Arc::new(LlmDreamSynthesizer::new(lite.clone())),
            facts: Arc::new(LlmFactExtractor::new(lite)),
            memory,
        }
    }
}

/// What the companion says when a session opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub mood: Mood,
    pub lines: Vec<String>,
}

/// Outcome of one foreground turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub text: String,
    pub mood: Mood,
    pub mood_changed: bool,
    /// First-use notices for skills unlocked this turn.
    pub notices: Vec<String>,
}

impl TurnReply {
    fn plain(text: impl Into<String>, mood: Mood) -> Self {
        Self { text: text.into(), mood, mood_changed: false, notices: Vec::new() }
    }
}

pub struct Companion {
    cfg: Arc<PalCfg>,
    identity: SharedIdentity,
    identity_store: IdentityStore,
    topics: SharedTopics,
    topic_store: TopicStore,
    collab: Collaborators,
    scheduler: IdleScheduler,
}

impl Companion {
    /// Load (or create) the identity and topic ledger under `data_dir` and
    /// wire the idle scheduler to `notify_tx`. The scheduler is not started.
    pub fn open(
        cfg: Arc<PalCfg>,
        data_dir: &Path,
        collab: Collaborators,
        notify_tx: NotifySender,
        now: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        let identity_store = IdentityStore::new(data_dir.join(IDENTITY_FILE));
        let identity = identity_store.load_shared(now)?;
        let topic_store = TopicStore::new(data_dir.join(TOPICS_FILE));
        let topics = Arc::new(Mutex::new(topic_store.load_or_create()?));
        let scheduler = IdleScheduler::new(
            &cfg,
            identity.clone(),
            identity_store.clone(),
            collab.memory.clone(),
            collab.dreamer.clone(),
            notify_tx,
        );
        Ok(Self { cfg, identity, identity_store, topics, topic_store, collab, scheduler })
    }

    pub fn identity(&self) -> SharedIdentity {
        self.identity.clone()
    }

    pub fn topics(&self) -> SharedTopics {
        self.topics.clone()
    }

    pub fn scheduler(&self) -> &IdleScheduler {
        &self.scheduler
    }

    pub async fn is_first_boot(&self) -> bool {
        self.identity.lock().await.first_boot
    }

    pub async fn owner(&self) -> String {
        self.identity.lock().await.owner().to_owned()
    }

    /// First-boot ritual: learn the owner's name and remember meeting them.
    pub async fn birth(&self, owner_name: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let name = owner_name.trim();
        let memory = format!("{name} is here. They were here when I started existing.");
        let stored = match self.collab.memory.store(&memory, "about_owner", "told").await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "could not store first memory");
                false
            }
        };

        let mut identity = self.identity.lock().await;
        identity.set_owner_name(name);
        if stored {
            stats::track_memory_stored(&mut identity, now);
        }
        identity.complete_birth(now);
        identity.update_mood(Mood::Confused);
        tracing::info!(owner = identity.owner(), "born");
        self.identity_store.save(&identity)
    }

    /// Skip the ritual, for testing setups.
    pub async fn skip_birth(&self, owner_name: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut identity = self.identity.lock().await;
        if !identity.first_boot {
            return Ok(());
        }
        identity.set_owner_name(owner_name);
        identity.complete_birth(now);
        identity.update_mood(Mood::Curious);
        self.identity_store.save(&identity)
    }

    /// Open a session: reset stale session state, greet, share a dream after
    /// a long absence, then start the idle scheduler.
    pub async fn begin_session(&self, now: DateTime<Utc>) -> Result<SessionStart, StoreError> {
        let mut identity = self.identity.lock().await;
        let hours_away = identity.hours_since_last_interaction(now);
        let share_dream = hours_away.is_some_and(|h| h >= self.cfg.dream_share_hours as f64);

        if conversation::should_reset_session(&identity.stats, now, self.cfg.session_reset_hours) {
            conversation::reset_session(&mut identity.conversation_state);
        }
        inner_life::reset_dreams_since_conversation(&mut identity.inner_life);

        let mut lines = vec![identity.greeting(now)];
        stats::track_check_in(&mut identity, now);

        if share_dream && let Some(dream) = inner_life::share_dream(&mut identity.inner_life) {
            lines.push(DREAM_SHARE_INTRO.to_owned());
            lines.push(dream);
        }
        self.identity_store.save(&identity)?;
        let mood = identity.mood;
        drop(identity);

        tracing::info!(hours_away = hours_away.unwrap_or(0.0), "session started");
        self.scheduler.touch_at(now);
        self.scheduler.start();
        Ok(SessionStart { mood, lines })
    }

    pub async fn handle_turn(&self, text: &str) -> TurnReply {
        self.handle_turn_at(text, Utc::now()).await
    }

    /// One exchange with the owner.
    pub async fn handle_turn_at(&self, text: &str, now: DateTime<Utc>) -> TurnReply {
        self.scheduler.touch_at(now);
        let text = text.trim();

        if is_asking_about_thoughts(text) {
            return self.answer_about_thoughts().await;
        }

        let memories = match self.collab.memory.search(text, self.cfg.memory_search_limit).await {
            Ok(memories) => memories,
            Err(e) => {
                tracing::warn!(error = %e, "memory search failed");
                Vec::new()
            }
        };
        let memory_context = memory::format_for_prompt(&memories);

        let snapshot: Identity = self.identity.lock().await.clone();
        let reply = match self.collab.replies.generate(text, &memory_context, &snapshot).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "reply generation failed");
                return TurnReply::plain(APOLOGY, Mood::Confused);
            }
        };
        let owner = snapshot.owner();

        let facts = match self.collab.facts.extract(text, owner).await {
            Ok(facts) => facts,
            Err(e) => {
                tracing::warn!(error = %e, "fact extraction failed");
                Vec::new()
            }
        };
        let mut stored_ids = Vec::with_capacity(facts.len());
        for fact in &facts {
            match self.collab.memory.store(&fact.content, &fact.kind, "told").await {
                Ok(id) => stored_ids.push(id),
                Err(e) => tracing::warn!(error = %e, "could not store fact"),
            }
        }

        let hints = conversation::gather_hints(
            self.collab.classifier.as_ref(),
            snapshot.conversation_state.current_topic.as_deref(),
            text,
            &reply.text,
        )
        .await;

        let mut identity = self.identity.lock().await;
        let mut topics = self.topics.lock().await;

        for _ in &stored_ids {
            stats::track_memory_stored(&mut identity, now);
        }
        stats::track(&mut identity, text, &reply.text, now);
        consume_pending(&mut identity, &mut topics, text, now);

        conversation::apply(&mut identity.conversation_state, text, &reply.text, &hints);
        if let Some(topic) = identity.conversation_state.current_topic.clone() {
            topics.discuss(&topic, now);
            for id in &stored_ids {
                topics.link_memory(&topic, id, now);
            }
        }

        if let Some(question) = inner_life::detect_unanswered_question(&reply.text, text) {
            inner_life::add_thought(&mut identity.inner_life, &question, ThoughtKind::Question, now);
        }
        if let Some(detail) = inner_life::extract_unmentioned_detail(text, owner) {
            inner_life::add_thought(&mut identity.inner_life, &detail, ThoughtKind::Curiosity, now);
        }

        if !memories.is_empty() {
            skills::use_skill(&mut identity, "recall");
        }
        let notices = skills::check_unlocks(&mut identity, &topics)
            .iter()
            .filter_map(|name| skills::skill_notice(name))
            .map(|notice| format!("...{notice}"))
            .collect();

        let mood_changed = identity.update_mood(reply.mood);
        self.persist(&identity, &topics);

        TurnReply { text: reply.text, mood: reply.mood, mood_changed, notices }
    }

    /// Close the session: stop the scheduler, forget session state, persist.
    pub async fn end_session(&self) -> Result<(), StoreError> {
        self.scheduler.stop().await;
        let mut identity = self.identity.lock().await;
        conversation::reset_session(&mut identity.conversation_state);
        self.identity_store.save(&identity)?;
        self.topic_store.save(&*self.topics.lock().await)?;
        tracing::info!("session ended");
        Ok(())
    }

    /// Asking what the companion is thinking moves the conversation on, so
    /// any question still waiting on the owner is dropped.
    async fn answer_about_thoughts(&self) -> TurnReply {
        let mut identity = self.identity.lock().await;
        let mood = identity.mood;
        let dropped = conversation::take_pending(&mut identity.conversation_state).is_some();
        let dream = inner_life::share_dream(&mut identity.inner_life);
        if (dropped || dream.is_some())
            && let Err(e) = self.identity_store.save(&identity)
        {
            tracing::error!(error = %e, "failed to persist thoughts turn");
        }
        match dream {
            Some(dream) => TurnReply::plain(format!("I was thinking... {dream}"), mood),
            None => TurnReply::plain(NO_THOUGHTS, mood),
        }
    }

    fn persist(&self, identity: &Identity, topics: &TopicLedger) {
        if let Err(e) = self.identity_store.save(identity) {
            tracing::error!(error = %e, "failed to persist identity");
        }
        if let Err(e) = self.topic_store.save(topics) {
            tracing::error!(error = %e, "failed to persist topics");
        }
    }
}

/// Settle the question asked last turn against the owner's answer.
fn consume_pending(identity: &mut Identity, topics: &mut TopicLedger, user_message: &str, now: DateTime<Utc>) {
    let Some((question, topic)) = conversation::take_pending(&mut identity.conversation_state) else {
        return;
    };
    if feedback::is_dismissive(user_message) {
        if let Some(topic) = &topic {
            topics.add_unresolved(topic, &question, now);
        }
        inner_life::add_thought(&mut identity.inner_life, &question, ThoughtKind::Unresolved, now);
        tracing::debug!(question = %question, "question left unresolved");
    } else if let Some(topic) = &topic
        && topics.resolve(topic, &question)
    {
        tracing::debug!(question = %question, topic = %topic, "question resolved");
    }
}
