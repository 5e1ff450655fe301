//! Session Store
//!
//! Concurrency-safe registry of at most one live session per user. Every
//! session owns a timer task; the timer, completion, and cancellation all
//! race through the same lock, so a terminal session is removed exactly once
//! and never mutated again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, SessionError};
use crate::form::CompletedForm;
use crate::session::{Prompt, Session, SessionId, Stage, Turn, UserId};

/// A persisted record of a completed intake form
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormRecord {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub submitted_at: chrono::DateTime<Utc>,
}

impl FormRecord {
    pub fn from_completed(user_id: UserId, form: &CompletedForm) -> Self {
        Self {
            user_id,
            name: form.name.clone(),
            email: form.email.clone(),
            phone: form.phone.clone(),
            submitted_at: Utc::now(),
        }
    }
}

/// Storage for completed forms
pub trait FormStore: Send + Sync {
    /// Persist a completed form
    fn insert(&self, record: FormRecord) -> Result<()>;
}

/// In-memory form store (for development/testing)
#[derive(Default)]
pub struct MemoryFormStore {
    records: Mutex<Vec<FormRecord>>,
}

impl MemoryFormStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FormRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl FormStore for MemoryFormStore {
    fn insert(&self, record: FormRecord) -> Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// Notification obligation surfaced when a session times out
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiredSession {
    pub user_id: UserId,
}

/// Receiver half of the expiry channel
pub type ExpiryReceiver = mpsc::UnboundedReceiver<ExpiredSession>;

struct ActiveSession {
    session: Session,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    active: HashMap<UserId, ActiveSession>,
    /// One-shot markers for sessions that ended by timeout or cancellation,
    /// so a late message gets a precise rejection instead of silence.
    terminal: HashMap<UserId, Stage>,
}

/// Registry of live intake sessions, one per user.
pub struct SessionStore {
    registry: Arc<Mutex<Registry>>,
    timeout: Duration,
    forms: Arc<dyn FormStore>,
    expiry_tx: mpsc::UnboundedSender<ExpiredSession>,
}

impl SessionStore {
    /// Create a store with the given session timeout.
    ///
    /// Returns the store and the receiver on which timed-out sessions are
    /// reported so the caller can notify the user.
    pub fn new(timeout: Duration, forms: Arc<dyn FormStore>) -> (Self, ExpiryReceiver) {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        let store = Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            timeout,
            forms,
            expiry_tx,
        };
        (store, expiry_rx)
    }

    /// Start a session for `user_id`.
    ///
    /// Fails with [`SessionError::Conflict`] while a live session exists.
    pub fn begin(&self, user_id: UserId) -> Result<Prompt> {
        let mut registry = self.registry.lock().unwrap();
        registry.terminal.remove(&user_id);

        if registry.active.contains_key(&user_id) {
            return Err(SessionError::Conflict(user_id.0));
        }

        let timeout = chrono::Duration::from_std(self.timeout)
            .map_err(|e| SessionError::Config(e.to_string()))?;
        let session = Session::new(user_id, timeout);
        let timer = self.spawn_timer(user_id, session.id.clone());

        tracing::debug!(user = %user_id, session = %session.id, "Session started");
        registry.active.insert(user_id, ActiveSession { session, timer });

        Ok(Prompt::AskName)
    }

    /// Feed one inbound message to the user's session.
    ///
    /// On completion the collected form is persisted, the timer cancelled,
    /// and the session removed from the store.
    pub fn advance(&self, user_id: UserId, input: &str) -> Result<Turn> {
        let mut registry = self.registry.lock().unwrap();

        if let Some(stage) = registry.terminal.remove(&user_id) {
            return Err(match stage {
                Stage::Expired => SessionError::Expired(user_id.0),
                _ => SessionError::Cancelled(user_id.0),
            });
        }

        let entry = registry
            .active
            .get_mut(&user_id)
            .ok_or(SessionError::NoActiveSession(user_id.0))?;

        let turn = entry.session.apply(input);

        if let Turn::Completed(ref form) = turn {
            let entry = registry
                .active
                .remove(&user_id)
                .unwrap_or_else(|| unreachable!("entry held above"));
            entry.timer.abort();
            let record = FormRecord::from_completed(user_id, form);
            // The session is out of the registry; persistence must not hold
            // up other users' sessions or pending timers.
            drop(registry);
            tracing::info!(user = %user_id, "Intake form completed");
            self.forms.insert(record)?;
        }

        Ok(turn)
    }

    /// Cancel the user's session, releasing its timer.
    pub fn cancel(&self, user_id: UserId) -> Result<()> {
        let mut registry = self.registry.lock().unwrap();
        let entry = registry
            .active
            .remove(&user_id)
            .ok_or(SessionError::NoActiveSession(user_id.0))?;
        entry.timer.abort();
        registry.terminal.insert(user_id, Stage::Cancelled);

        tracing::debug!(user = %user_id, "Session cancelled");
        Ok(())
    }

    /// Whether a live session exists for this user.
    pub fn is_active(&self, user_id: UserId) -> bool {
        self.registry.lock().unwrap().active.contains_key(&user_id)
    }

    fn spawn_timer(&self, user_id: UserId, session_id: SessionId) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let expiry_tx = self.expiry_tx.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let mut registry = registry.lock().unwrap();
            // The session may have completed, been cancelled, or been
            // replaced since this timer was armed. The token match makes the
            // expiry a no-op in all of those cases.
            let expired = matches!(
                registry.active.get(&user_id),
                Some(entry) if entry.session.id == session_id
            );
            if !expired {
                return;
            }

            registry.active.remove(&user_id);
            registry.terminal.insert(user_id, Stage::Expired);
            drop(registry);

            tracing::info!(user = %user_id, session = %session_id, "Session expired");
            let _ = expiry_tx.send(ExpiredSession { user_id });
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(timeout: Duration) -> (SessionStore, ExpiryReceiver, Arc<MemoryFormStore>) {
        let forms = Arc::new(MemoryFormStore::new());
        let (store, rx) = SessionStore::new(timeout, forms.clone());
        (store, rx, forms)
    }

    #[tokio::test]
    async fn test_three_messages_complete_one_session() {
        let (store, _rx, forms) = store(Duration::from_secs(60));
        let user = UserId(1);

        assert_eq!(store.begin(user).unwrap(), Prompt::AskName);
        store.advance(user, "Maria Silva").unwrap();
        store.advance(user, "maria@example.com").unwrap();
        let turn = store.advance(user, "+5511987654321").unwrap();

        assert!(matches!(turn, Turn::Completed(_)));
        assert!(!store.is_active(user));

        let records = forms.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Maria Silva");
        assert_eq!(records[0].email, "maria@example.com");
        assert_eq!(records[0].phone, "+5511987654321");
    }

    #[tokio::test]
    async fn test_begin_twice_is_a_conflict() {
        let (store, _rx, _forms) = store(Duration::from_secs(60));
        let user = UserId(2);

        store.begin(user).unwrap();
        store.advance(user, "Maria").unwrap();

        let err = store.begin(user).unwrap_err();
        assert!(matches!(err, SessionError::Conflict(2)));

        // Original session is unaffected by the rejected begin.
        let turn = store.advance(user, "maria@example.com").unwrap();
        assert_eq!(turn, Turn::Prompt(Prompt::AskPhone));
    }

    #[tokio::test]
    async fn test_advance_without_session_fails() {
        let (store, _rx, _forms) = store(Duration::from_secs(60));
        let err = store.advance(UserId(3), "hello").unwrap_err();
        assert!(matches!(err, SessionError::NoActiveSession(3)));
    }

    #[tokio::test]
    async fn test_timeout_expires_and_rejects_late_input() {
        let (store, mut rx, forms) = store(Duration::from_millis(30));
        let user = UserId(4);

        store.begin(user).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let expired = rx.recv().await.unwrap();
        assert_eq!(expired.user_id, user);
        assert!(!store.is_active(user));

        let err = store.advance(user, "Maria").unwrap_err();
        assert!(matches!(err, SessionError::Expired(4)));
        assert!(forms.records().is_empty());

        // The expired marker is one-shot; afterwards it's a plain miss.
        let err = store.advance(user, "Maria").unwrap_err();
        assert!(matches!(err, SessionError::NoActiveSession(4)));
    }

    #[tokio::test]
    async fn test_completion_beats_the_timer() {
        let (store, mut rx, _forms) = store(Duration::from_millis(50));
        let user = UserId(5);

        store.begin(user).unwrap();
        store.advance(user, "Maria").unwrap();
        store.advance(user, "maria@example.com").unwrap();
        let turn = store.advance(user, "+5511987654321").unwrap();
        assert!(matches!(turn, Turn::Completed(_)));

        // A new session begun immediately must not be killed by the old
        // session's timer.
        store.begin(user).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.is_active(user));

        tokio::time::sleep(Duration::from_millis(60)).await;
        let expired = rx.recv().await.unwrap();
        assert_eq!(expired.user_id, user);
    }

    /// Form store whose insert blocks, standing in for a slow database.
    struct SlowFormStore {
        delay: Duration,
    }

    impl FormStore for SlowFormStore {
        fn insert(&self, _record: FormRecord) -> crate::Result<()> {
            std::thread::sleep(self.delay);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_form_persistence_does_not_block_other_sessions() {
        let forms = Arc::new(SlowFormStore {
            delay: Duration::from_millis(400),
        });
        let (store, _rx) = SessionStore::new(Duration::from_secs(60), forms);
        let store = Arc::new(store);
        let (a, b) = (UserId(7), UserId(8));

        store.begin(a).unwrap();
        store.advance(a, "Maria").unwrap();
        store.advance(a, "maria@example.com").unwrap();
        store.begin(b).unwrap();

        // Complete A's session on another thread; its insert sleeps.
        let slow = Arc::clone(&store);
        let completing = tokio::task::spawn_blocking(move || slow.advance(a, "+5511987654321"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // B's turn must go through while A's form is still persisting.
        let started = std::time::Instant::now();
        let turn = store.advance(b, "Bruno").unwrap();
        assert_eq!(turn, Turn::Prompt(Prompt::AskEmail));
        assert!(
            started.elapsed() < Duration::from_millis(200),
            "advance for another user waited {:?} behind form persistence",
            started.elapsed()
        );

        let turn = completing.await.unwrap().unwrap();
        assert!(matches!(turn, Turn::Completed(_)));
    }

    #[tokio::test]
    async fn test_cancel_releases_session() {
        let (store, _rx, _forms) = store(Duration::from_secs(60));
        let user = UserId(6);

        store.begin(user).unwrap();
        store.cancel(user).unwrap();
        assert!(!store.is_active(user));

        let err = store.advance(user, "Maria").unwrap_err();
        assert!(matches!(err, SessionError::Cancelled(6)));

        // Cancelling again is a miss, and a fresh begin works.
        assert!(store.cancel(user).is_err());
        store.begin(user).unwrap();
    }
}
