use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use solace_types::models::{ChatMessage, Language};

/// Mutable per-conversation context.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub current_mood: Option<u8>,
    pub language: Language,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// One active chat session and its ordered message history.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub conversation_id: String,
    pub session_id: String,
    pub user_id: Uuid,
    pub messages: Vec<ChatMessage>,
    pub context: SessionContext,
}

impl ConversationSession {
    /// Append in order and mark the session active.
    pub fn append(&mut self, message: ChatMessage) {
        self.context.last_activity = message.timestamp.max(self.context.last_activity);
        self.messages.push(message);
    }

    pub fn is_idle(&self, max_idle: chrono::Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.context.last_activity) >= max_idle
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("conversation not found")]
    NotFound,
    #[error("conversation belongs to another user")]
    Forbidden,
}

/// A stored session. The owner is fixed at creation, so ownership checks
/// never wait on the session lock.
pub struct SessionSlot {
    owner: Uuid,
    session: Mutex<ConversationSession>,
}

impl SessionSlot {
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    /// Exclusive access for one exchange. Writers to the same conversation
    /// queue here; other conversations are unaffected.
    pub async fn lock(&self) -> MutexGuard<'_, ConversationSession> {
        self.session.lock().await
    }
}

/// Process-local store of active conversations, keyed by conversation id.
#[derive(Clone, Default)]
pub struct ConversationStore {
    sessions: Arc<RwLock<HashMap<String, Arc<SessionSlot>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, empty conversation. Returns `(session_id, conversation_id)`.
    pub async fn create(&self, user_id: Uuid, language: Language) -> (String, String) {
        let now = Utc::now();
        let session_id = Uuid::new_v4().to_string();
        let random = Uuid::new_v4().simple().to_string();
        let conversation_id = format!(
            "conv_{}_{}_{}",
            user_id.simple(),
            now.timestamp_millis(),
            &random[..8]
        );

        let session = ConversationSession {
            conversation_id: conversation_id.clone(),
            session_id: session_id.clone(),
            user_id,
            messages: Vec::new(),
            context: SessionContext {
                current_mood: None,
                language,
                started_at: now,
                last_activity: now,
            },
        };

        self.sessions.write().await.insert(
            conversation_id.clone(),
            Arc::new(SessionSlot {
                owner: user_id,
                session: Mutex::new(session),
            }),
        );

        debug!(conversation_id = %conversation_id, user_id = %user_id, "Conversation created");
        (session_id, conversation_id)
    }

    /// Snapshot of a conversation, without any ownership check.
    pub async fn get(&self, conversation_id: &str) -> Option<ConversationSession> {
        let slot = self.slot(conversation_id).await?;
        let session = slot.lock().await;
        Some(session.clone())
    }

    /// Fetch-and-authorize in one step.
    pub async fn get_owned(
        &self,
        conversation_id: &str,
        user_id: Uuid,
    ) -> Result<Arc<SessionSlot>, StoreError> {
        let slot = self.slot(conversation_id).await.ok_or(StoreError::NotFound)?;
        if slot.owner != user_id {
            return Err(StoreError::Forbidden);
        }
        Ok(slot)
    }

    pub async fn append_message(
        &self,
        conversation_id: &str,
        message: ChatMessage,
    ) -> Result<(), StoreError> {
        let slot = self.slot(conversation_id).await.ok_or(StoreError::NotFound)?;
        slot.lock().await.append(message);
        Ok(())
    }

    /// Whether `slot` is still the stored entry for `conversation_id`.
    pub async fn is_current(&self, conversation_id: &str, slot: &Arc<SessionSlot>) -> bool {
        self.sessions
            .read()
            .await
            .get(conversation_id)
            .is_some_and(|stored| Arc::ptr_eq(stored, slot))
    }

    /// Remove a conversation. Returns `false` if it did not exist.
    pub async fn delete(&self, conversation_id: &str) -> bool {
        self.sessions.write().await.remove(conversation_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop conversations idle for at least `max_idle`. Sessions that are
    /// mid-exchange (locked) are left alone.
    pub async fn sweep_idle(&self, max_idle: chrono::Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, slot| match slot.session.try_lock() {
            Ok(session) => !session.is_idle(max_idle, now),
            Err(_) => true,
        });
        before - sessions.len()
    }

    async fn slot(&self, conversation_id: &str) -> Option<Arc<SessionSlot>> {
        self.sessions.read().await.get(conversation_id).cloned()
    }
}

/// Background task that prunes idle conversations.
pub async fn run_sweep_loop(store: ConversationStore, max_idle: chrono::Duration, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        let removed = store.sweep_idle(max_idle).await;
        if removed > 0 {
            let active = store.len().await;
            info!(removed, active, "Swept idle conversations");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solace_types::models::{MessageKind, Role};

    #[tokio::test]
    async fn create_get_delete() {
        let store = ConversationStore::new();
        let user = Uuid::new_v4();

        let (session_id, conversation_id) = store.create(user, Language::Es).await;
        assert!(conversation_id.contains(&user.simple().to_string()));

        let session = store.get(&conversation_id).await.unwrap();
        assert_eq!(session.session_id, session_id);
        assert_eq!(session.user_id, user);
        assert!(session.messages.is_empty());

        assert!(store.delete(&conversation_id).await);
        assert!(store.get(&conversation_id).await.is_none());
        assert!(!store.delete(&conversation_id).await);
    }

    #[tokio::test]
    async fn identifiers_are_unique() {
        let store = ConversationStore::new();
        let user = Uuid::new_v4();
        let (s1, c1) = store.create(user, Language::Es).await;
        let (s2, c2) = store.create(user, Language::Es).await;
        assert_ne!(s1, s2);
        assert_ne!(c1, c2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn ownership_is_checked() {
        let store = ConversationStore::new();
        let owner = Uuid::new_v4();
        let (_, conversation_id) = store.create(owner, Language::Es).await;

        assert!(store.get_owned(&conversation_id, owner).await.is_ok());
        assert_eq!(
            store.get_owned(&conversation_id, Uuid::new_v4()).await.err(),
            Some(StoreError::Forbidden)
        );
        assert_eq!(
            store.get_owned("conv_missing", owner).await.err(),
            Some(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn append_preserves_order() {
        let store = ConversationStore::new();
        let (_, id) = store.create(Uuid::new_v4(), Language::Es).await;

        for i in 0..5 {
            store.append_message(&id, ChatMessage::user(format!("m{}", i))).await.unwrap();
        }
        let contents: Vec<_> = store
            .get(&id)
            .await
            .unwrap()
            .messages
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, ["m0", "m1", "m2", "m3", "m4"]);

        assert_eq!(
            store.append_message("nope", ChatMessage::user("x")).await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn concurrent_exchanges_do_not_interleave() {
        let store = ConversationStore::new();
        let user = Uuid::new_v4();
        let (_, id) = store.create(user, Language::Es).await;

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                let slot = store.get_owned(&id, user).await.unwrap();
                let mut session = slot.lock().await;
                session.append(ChatMessage::user(format!("q{}", i)));
                tokio::task::yield_now().await;
                session.append(ChatMessage::assistant(format!("a{}", i), MessageKind::Text));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let messages = store.get(&id).await.unwrap().messages;
        assert_eq!(messages.len(), 16);
        for pair in messages.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[0].content[1..], pair[1].content[1..]);
        }
    }

    #[tokio::test]
    async fn sweep_removes_only_idle_unlocked_sessions() {
        let store = ConversationStore::new();
        let (_, idle) = store.create(Uuid::new_v4(), Language::Es).await;
        let (_, busy) = store.create(Uuid::new_v4(), Language::Es).await;
        let (_, fresh) = store.create(Uuid::new_v4(), Language::Es).await;

        let long_ago = Utc::now() - chrono::Duration::hours(5);
        for id in [&idle, &busy] {
            let slot = store.slot(id).await.unwrap();
            slot.lock().await.context.last_activity = long_ago;
        }

        let busy_slot = store.slot(&busy).await.unwrap();
        let _guard = busy_slot.lock().await;

        let removed = store.sweep_idle(chrono::Duration::hours(2)).await;
        assert_eq!(removed, 1);
        assert!(store.slot(&idle).await.is_none());
        assert!(store.slot(&busy).await.is_some());
        assert!(store.slot(&fresh).await.is_some());
    }

    #[tokio::test]
    async fn swept_slot_is_no_longer_current() {
        let store = ConversationStore::new();
        let user = Uuid::new_v4();
        let (_, id) = store.create(user, Language::Es).await;

        let slot = store.get_owned(&id, user).await.unwrap();
        assert!(store.is_current(&id, &slot).await);

        slot.lock().await.context.last_activity = Utc::now() - chrono::Duration::hours(5);
        assert_eq!(store.sweep_idle(chrono::Duration::hours(2)).await, 1);
        assert!(!store.is_current(&id, &slot).await);

        // A new conversation under another id does not revive the old handle.
        let (_, other) = store.create(user, Language::Es).await;
        assert!(!store.is_current(&other, &slot).await);
    }
}
