use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::idle_window::{IdleEvent, IdleWindow};
use crate::cognition::{DreamSynthesizer, MemoryStore};
use crate::config::PalCfg;
use crate::identity::{IdentityStore, SharedIdentity, inner_life};
use crate::io::output::{self, NotifySender};
use crate::types::Notification;

/// What one poll did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub thought: Option<String>,
    pub dream: Option<String>,
}

#[derive(Debug)]
struct WindowState {
    last_activity: DateTime<Utc>,
    window: IdleWindow,
    /// Bumped on every touch so in-flight work can tell its window ended.
    generation: u64,
}

struct Shared {
    identity: SharedIdentity,
    store: IdentityStore,
    memory: Arc<dyn MemoryStore>,
    dreamer: Arc<dyn DreamSynthesizer>,
    notify_tx: NotifySender,
    window: Mutex<WindowState>,
    thought_idle_minutes: f64,
    dream_idle_minutes: f64,
    dream_memory_limit: usize,
}

/// Background task that surfaces thoughts and forms dreams while the
/// owner is away.
#[derive(Clone)]
pub struct IdleScheduler {
    shared: Arc<Shared>,
    poll_interval: Duration,
    stop_timeout: Duration,
    task: Arc<Mutex<Option<(CancellationToken, JoinHandle<()>)>>>,
}

impl IdleScheduler {
    pub fn new(
        cfg: &PalCfg,
        identity: SharedIdentity,
        store: IdentityStore,
        memory: Arc<dyn MemoryStore>,
        dreamer: Arc<dyn DreamSynthesizer>,
        notify_tx: NotifySender,
    ) -> Self {
        let shared = Shared {
            identity,
            store,
            memory,
            dreamer,
            notify_tx,
            window: Mutex::new(WindowState {
                last_activity: Utc::now(),
                window: IdleWindow::Quiet,
                generation: 0,
            }),
            thought_idle_minutes: cfg.thought_idle_minutes as f64,
            dream_idle_minutes: cfg.dream_idle_minutes as f64,
            dream_memory_limit: cfg.dream_memory_limit,
        };
        Self {
            shared: Arc::new(shared),
            poll_interval: Duration::from_secs(cfg.idle_poll_secs.max(1)),
            stop_timeout: Duration::from_millis(cfg.scheduler_stop_timeout_ms),
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Record user activity: restart the idle clock and re-arm both actions.
    pub fn touch(&self) {
        self.touch_at(Utc::now());
    }

    pub fn touch_at(&self, now: DateTime<Utc>) {
        if let Ok(mut w) = self.shared.window.lock() {
            w.last_activity = now;
            w.window = w.window.next(IdleEvent::Touched);
            w.generation += 1;
        }
    }

    pub fn idle_minutes(&self, now: DateTime<Utc>) -> f64 {
        self.shared
            .window
            .lock()
            .map(|w| minutes_between(w.last_activity, now))
            .unwrap_or(0.0)
    }

    pub fn window(&self) -> IdleWindow {
        self.shared.window.lock().map(|w| w.window).unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().map(|t| t.is_some()).unwrap_or(false)
    }

    /// Spawn the poll loop. No-op when already running.
    pub fn start(&self) {
        let Ok(mut slot) = self.task.lock() else {
            return;
        };
        if slot.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let scheduler = self.clone();
        let interval = self.poll_interval;

        let handle = tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "idle scheduler started");
            loop {
                scheduler.poll_once(Utc::now()).await;
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("idle scheduler shutting down");
                        return;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });
        *slot = Some((cancel, handle));
    }

    /// Cancel the poll loop and wait for it, bounded by the stop timeout.
    pub async fn stop(&self) {
        let running = self.task.lock().ok().and_then(|mut t| t.take());
        let Some((cancel, handle)) = running else {
            return;
        };
        cancel.cancel();
        let abort = handle.abort_handle();
        match tokio::time::timeout(self.stop_timeout, handle).await {
            Ok(Ok(())) => tracing::debug!("idle scheduler stopped"),
            Ok(Err(e)) => tracing::warn!(error = %e, "idle scheduler task ended abnormally"),
            Err(_) => {
                tracing::warn!(timeout_ms = self.stop_timeout.as_millis() as u64, "idle scheduler stop timed out, aborting");
                abort.abort();
            }
        }
    }

    /// Run one poll against `now`. Failures are logged and swallowed.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> PollOutcome {
        let (idle, window, generation) = match self.shared.window.lock() {
            Ok(w) => (minutes_between(w.last_activity, now), w.window, w.generation),
            Err(_) => return PollOutcome::default(),
        };
        let mut outcome = PollOutcome::default();

        if idle >= self.shared.thought_idle_minutes && !window.thought_fired() {
            outcome.thought = self.surface_thought(generation).await;
        }
        if idle >= self.shared.dream_idle_minutes && !window.dream_fired() {
            outcome.dream = self.form_dream(generation, now).await;
        }
        outcome
    }

    fn generation(&self) -> Option<u64> {
        self.shared.window.lock().ok().map(|w| w.generation)
    }

    /// Advance the window unless a touch started a new one meanwhile.
    fn advance(&self, generation: u64, event: IdleEvent) {
        if let Ok(mut w) = self.shared.window.lock()
            && w.generation == generation
        {
            w.window = w.window.next(event);
        }
    }

    async fn surface_thought(&self, generation: u64) -> Option<String> {
        let text = {
            let mut identity = self.shared.identity.lock().await;
            if self.generation() != Some(generation) {
                return None;
            }
            let text = inner_life::surface_thought(&mut identity.inner_life, 0)?;
            if let Err(e) = self.shared.store.save(&identity) {
                tracing::warn!(error = %e, "failed to persist surfaced thought");
            }
            text
        };
        self.advance(generation, IdleEvent::ThoughtSurfaced);
        tracing::info!("thought surfaced while idle");
        output::notify(&self.shared.notify_tx, Notification::Thought(text.clone()));
        Some(text)
    }

    async fn form_dream(&self, generation: u64, now: DateTime<Utc>) -> Option<String> {
        {
            let identity = self.shared.identity.lock().await;
            if !inner_life::can_dream(&identity.inner_life, now) {
                return None;
            }
        }

        // no identity lock held across collaborator calls
        let memories = match self.shared.memory.recent_facts(self.shared.dream_memory_limit).await {
            Ok(m) => m.into_iter().filter(|m| !m.trim().is_empty()).collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!(error = %e, "could not fetch memories for dream");
                return None;
            }
        };
        if memories.is_empty() {
            return None;
        }
        let text = match self.shared.dreamer.synthesize(&memories).await {
            Ok(Some(text)) if !text.trim().is_empty() => text.trim().to_owned(),
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "dream synthesis failed");
                return None;
            }
        };

        {
            let mut identity = self.shared.identity.lock().await;
            if self.generation() != Some(generation) {
                tracing::debug!("owner came back mid-dream, discarding");
                return None;
            }
            if !inner_life::can_dream(&identity.inner_life, now) {
                return None;
            }
            inner_life::record_dream(&mut identity.inner_life, &text, now);
            if let Err(e) = self.shared.store.save(&identity) {
                tracing::warn!(error = %e, "failed to persist dream");
            }
        }
        self.advance(generation, IdleEvent::DreamFormed);
        output::notify(&self.shared.notify_tx, Notification::Dream(text.clone()));
        Some(text)
    }
}

fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    to.signed_duration_since(from).num_milliseconds() as f64 / 60_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cognition::CollabError;
    use crate::io::output::NotifyReceiver;
    use crate::memory::MemoryRecord;
    use crate::types::ThoughtKind;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    struct Facts(Vec<&'static str>);

    #[async_trait]
    impl MemoryStore for Facts {
        async fn recent_facts(&self, limit: usize) -> Result<Vec<String>, CollabError> {
            Ok(self.0.iter().take(limit).map(|s| s.to_string()).collect())
        }
        async fn search(&self, _: &str, _: usize) -> Result<Vec<MemoryRecord>, CollabError> {
            Ok(Vec::new())
        }
        async fn store(&self, _: &str, _: &str, _: &str) -> Result<String, CollabError> {
            Ok("id".into())
        }
        async fn count(&self) -> Result<usize, CollabError> {
            Ok(self.0.len())
        }
    }

    struct Echo;

    #[async_trait]
    impl DreamSynthesizer for Echo {
        async fn synthesize(&self, memories: &[String]) -> Result<Option<String>, CollabError> {
            Ok(Some(format!("dreamt of {}", memories.join(" and "))))
        }
    }

    struct Broken;

    #[async_trait]
    impl DreamSynthesizer for Broken {
        async fn synthesize(&self, _: &[String]) -> Result<Option<String>, CollabError> {
            Err(CollabError::Unavailable("offline".into()))
        }
    }

    /// Simulates the owner typing while the dream is being written.
    struct Interrupted {
        scheduler: std::sync::OnceLock<IdleScheduler>,
        owner_returns_at: DateTime<Utc>,
    }

    #[async_trait]
    impl DreamSynthesizer for Interrupted {
        async fn synthesize(&self, _: &[String]) -> Result<Option<String>, CollabError> {
            if let Some(scheduler) = self.scheduler.get() {
                scheduler.touch_at(self.owner_returns_at);
            }
            Ok(Some("a dream nobody will hear".into()))
        }
    }

    struct Fixture {
        scheduler: IdleScheduler,
        identity: SharedIdentity,
        rx: NotifyReceiver,
        _dir: tempfile::TempDir,
    }

    fn fixture(facts: Vec<&'static str>, dreamer: Arc<dyn DreamSynthesizer>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("identity.json"));
        let identity = store.load_shared(Utc::now()).unwrap();
        let (tx, rx) = output::channel(8);
        let scheduler = IdleScheduler::new(
            &PalCfg::default(),
            identity.clone(),
            store,
            Arc::new(Facts(facts)),
            dreamer,
            tx,
        );
        Fixture { scheduler, identity, rx, _dir: dir }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn touch_resets_idle_clock() {
        let f = fixture(vec![], Arc::new(Echo));
        for offset in [0, 5, 90, 600] {
            let now = t0() + ChronoDuration::minutes(offset);
            f.scheduler.touch_at(now);
            assert!(f.scheduler.idle_minutes(now) < 1.0);
        }
        assert!((f.scheduler.idle_minutes(t0() + ChronoDuration::minutes(612)) - 12.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn thought_surfaces_once_per_window() {
        let mut f = fixture(vec![], Arc::new(Echo));
        {
            let mut id = f.identity.lock().await;
            inner_life::add_thought(&mut id.inner_life, "what is rain?", ThoughtKind::Curiosity, t0());
            inner_life::add_thought(&mut id.inner_life, "who is Rex?", ThoughtKind::Curiosity, t0());
        }
        f.scheduler.touch_at(t0());

        assert_eq!(f.scheduler.poll_once(t0() + ChronoDuration::minutes(9)).await, PollOutcome::default());

        let out = f.scheduler.poll_once(t0() + ChronoDuration::minutes(10)).await;
        assert_eq!(out.thought.as_deref(), Some("what is rain?"));
        assert_eq!(f.rx.try_recv().unwrap(), Notification::Thought("what is rain?".into()));
        assert_eq!(f.scheduler.window(), IdleWindow::ThoughtFired);

        let again = f.scheduler.poll_once(t0() + ChronoDuration::minutes(15)).await;
        assert_eq!(again.thought, None);

        // new window, next thought
        f.scheduler.touch_at(t0() + ChronoDuration::minutes(20));
        let out = f.scheduler.poll_once(t0() + ChronoDuration::minutes(31)).await;
        assert_eq!(out.thought.as_deref(), Some("who is Rex?"));
    }

    #[tokio::test]
    async fn no_pending_thought_leaves_window_armed() {
        let f = fixture(vec![], Arc::new(Echo));
        f.scheduler.touch_at(t0());
        let out = f.scheduler.poll_once(t0() + ChronoDuration::minutes(12)).await;
        assert_eq!(out.thought, None);
        assert_eq!(f.scheduler.window(), IdleWindow::Quiet);
    }

    #[tokio::test]
    async fn dream_forms_after_long_idle() {
        let mut f = fixture(vec!["Sam likes tea", "Rex is a dog"], Arc::new(Echo));
        f.scheduler.touch_at(t0());
        let now = t0() + ChronoDuration::minutes(30);

        let out = f.scheduler.poll_once(now).await;
        assert_eq!(out.dream.as_deref(), Some("dreamt of Sam likes tea and Rex is a dog"));
        assert_eq!(f.rx.try_recv().unwrap(), Notification::Dream("dreamt of Sam likes tea and Rex is a dog".into()));
        assert!(f.scheduler.window().dream_fired());

        let id = f.identity.lock().await;
        assert_eq!(id.inner_life.dream_journal.len(), 1);
        assert_eq!(id.inner_life.last_dream_time, Some(now));
        assert_eq!(id.inner_life.dreams_since_last_conversation, 1);
    }

    #[tokio::test]
    async fn dream_respects_cooldown() {
        let f = fixture(vec!["Sam likes tea"], Arc::new(Echo));
        {
            let mut id = f.identity.lock().await;
            inner_life::record_dream(&mut id.inner_life, "earlier dream", t0() + ChronoDuration::minutes(20));
        }
        f.scheduler.touch_at(t0());
        let out = f.scheduler.poll_once(t0() + ChronoDuration::minutes(40)).await;
        assert!(out.dream.is_none());
        assert!(!f.scheduler.window().dream_fired());

        let out = f.scheduler.poll_once(t0() + ChronoDuration::minutes(50)).await;
        assert!(out.dream.is_some());
    }

    #[tokio::test]
    async fn owner_returning_mid_dream_discards_it() {
        let now = t0() + ChronoDuration::minutes(31);
        let dreamer = Arc::new(Interrupted { scheduler: std::sync::OnceLock::new(), owner_returns_at: now });
        let mut f = fixture(vec!["Sam likes tea"], dreamer.clone() as Arc<dyn DreamSynthesizer>);
        assert!(dreamer.scheduler.set(f.scheduler.clone()).is_ok());
        f.scheduler.touch_at(t0());

        let out = f.scheduler.poll_once(now).await;
        assert!(out.dream.is_none());
        assert!(f.rx.try_recv().is_err());
        assert_eq!(f.scheduler.window(), IdleWindow::Quiet);
        {
            let id = f.identity.lock().await;
            assert!(id.inner_life.dream_journal.is_empty());
            assert_eq!(id.inner_life.last_dream_time, None);
            assert_eq!(id.inner_life.dreams_since_last_conversation, 0);
        }
        assert!(f.scheduler.idle_minutes(now) < 1.0);
    }

    #[tokio::test]
    async fn dream_needs_memories() {
        let f = fixture(vec![], Arc::new(Echo));
        f.scheduler.touch_at(t0());
        assert!(f.scheduler.poll_once(t0() + ChronoDuration::minutes(45)).await.dream.is_none());
        assert!(!f.scheduler.window().dream_fired());
    }

    #[tokio::test]
    async fn synthesizer_failure_is_swallowed() {
        let f = fixture(vec!["Sam likes tea"], Arc::new(Broken));
        f.scheduler.touch_at(t0());
        let out = f.scheduler.poll_once(t0() + ChronoDuration::minutes(45)).await;
        assert_eq!(out, PollOutcome::default());
        assert!(f.identity.lock().await.inner_life.dream_journal.is_empty());
    }

    #[tokio::test]
    async fn start_and_stop_promptly() {
        let f = fixture(vec![], Arc::new(Echo));
        f.scheduler.start();
        f.scheduler.start();
        assert!(f.scheduler.is_running());
        let started = std::time::Instant::now();
        f.scheduler.stop().await;
        assert!(!f.scheduler.is_running());
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        // stopping twice is harmless
        f.scheduler.stop().await;
    }
}
