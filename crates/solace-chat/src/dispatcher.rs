use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use solace_types::api::{ChatContext, HistoryTurn};
use solace_types::models::{ChatMessage, Language, MessageKind, ResourceBundle, Role};

use crate::completion::{CompletionClient, system_prompt};
use crate::conversation::{ConversationSession, ConversationStore, SessionSlot, StoreError};
use crate::crisis::{CrisisDetector, CrisisSeverity};
use crate::resources::resources_for;
use crate::suggestions::suggest;
use crate::usage::UsageStore;

/// Longest accepted user message, in characters, on every chat route.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Prior turns sent to the model with each new message.
pub const HISTORY_WINDOW: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DispatchError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ChatOutcome {
    /// Normal exchange; `fallback` is set when the model was unavailable.
    Reply {
        message: ChatMessage,
        suggestions: Vec<String>,
        fallback: bool,
    },
    /// Crisis language detected; the model was not consulted.
    Crisis {
        severity: CrisisSeverity,
        message: ChatMessage,
        resources: ResourceBundle,
    },
}

impl ChatOutcome {
    pub fn message(&self) -> &ChatMessage {
        match self {
            Self::Reply { message, .. } | Self::Crisis { message, .. } => message,
        }
    }

    pub fn is_crisis(&self) -> bool {
        matches!(self, Self::Crisis { .. })
    }
}

#[derive(Debug, Clone)]
pub struct SessionStarted {
    pub session_id: String,
    pub conversation_id: String,
    pub welcome: ChatMessage,
}

#[derive(Debug, Clone)]
pub struct SessionEnded {
    pub conversation_id: String,
    pub session_id: String,
    pub message_count: usize,
    pub duration_minutes: i64,
}

/// Routes user messages through crisis screening, the conversation store
/// and the completion client.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    conversations: ConversationStore,
    completion: CompletionClient,
    detector: CrisisDetector,
    usage: Arc<dyn UsageStore>,
}

impl Dispatcher {
    pub fn new(
        conversations: ConversationStore,
        completion: CompletionClient,
        detector: CrisisDetector,
        usage: Arc<dyn UsageStore>,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                conversations,
                completion,
                detector,
                usage,
            }),
        }
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.inner.conversations
    }

    /// Open a conversation with a welcome message. The caller is responsible
    /// for the weekly quota check.
    pub async fn start_session(
        &self,
        user_id: Uuid,
        language: Language,
    ) -> Result<SessionStarted, DispatchError> {
        let (session_id, conversation_id) =
            self.inner.conversations.create(user_id, language).await;

        let welcome = ChatMessage::assistant(welcome_text(language), MessageKind::Welcome)
            .with_suggestions(suggest("", language));
        self.inner
            .conversations
            .append_message(&conversation_id, welcome.clone())
            .await?;

        if let Err(e) = self.inner.usage.record_session_start(user_id, Utc::now()) {
            warn!(user_id = %user_id, error = %e, "Failed to persist session start");
        }

        info!(user_id = %user_id, conversation_id = %conversation_id, "Chat session started");
        Ok(SessionStarted {
            session_id,
            conversation_id,
            welcome,
        })
    }

    /// One exchange inside an open conversation.
    pub async fn send_message(
        &self,
        user_id: Uuid,
        conversation_id: &str,
        text: &str,
        context: Option<&ChatContext>,
    ) -> Result<ChatOutcome, DispatchError> {
        let text = validate_message(text)?;
        validate_context(context)?;
        let slot = self
            .inner
            .conversations
            .get_owned(conversation_id, user_id)
            .await?;

        let severity = self.inner.detector.detect(text);
        if severity.is_crisis() {
            let language = self.resolve_language(user_id, context);
            return Ok(self.crisis_response(user_id, Some(conversation_id), severity, language));
        }

        // Held for the whole exchange so turns cannot interleave.
        let mut session = slot.lock().await;
        self.ensure_current(conversation_id, &slot).await?;
        if let Some(ctx) = context {
            if let Some(mood) = ctx.mood {
                session.context.current_mood = Some(mood);
            }
            if let Some(language) = ctx.language {
                session.context.language = language;
            }
        }
        let language = session.context.language;
        let window = history_window(&session.messages);
        let prompt = system_prompt(language, session.context.current_mood);

        session.append(ChatMessage::user(text));
        let result = self
            .inner
            .completion
            .complete(&prompt, &window, text, language)
            .await;

        let fallback = result.is_fallback();
        let kind = if fallback { MessageKind::Fallback } else { MessageKind::Text };
        let suggestions = suggest(text, language);
        let reply = ChatMessage::assistant(result.text, kind).with_suggestions(suggestions.clone());
        session.append(reply.clone());
        drop(session);

        self.record_exchange(user_id);

        Ok(ChatOutcome::Reply {
            message: reply,
            suggestions,
            fallback,
        })
    }

    /// Stateless exchange: the client supplies its own prior turns.
    pub async fn quick_chat(
        &self,
        user_id: Uuid,
        text: &str,
        history: &[HistoryTurn],
        context: Option<&ChatContext>,
    ) -> Result<ChatOutcome, DispatchError> {
        let text = validate_message(text)?;
        validate_context(context)?;
        let language = self.resolve_language(user_id, context);

        let severity = self.inner.detector.detect(text);
        if severity.is_crisis() {
            return Ok(self.crisis_response(user_id, None, severity, language));
        }

        let turns: Vec<ChatMessage> = history
            .iter()
            .filter(|t| t.role != Role::System && !t.content.trim().is_empty())
            .map(|t| {
                let content: String = t.content.chars().take(MAX_MESSAGE_CHARS).collect();
                ChatMessage::new(t.role, content, Some(MessageKind::Text))
            })
            .collect();
        let window = history_window(&turns);
        let prompt = system_prompt(language, context.and_then(|c| c.mood));

        let result = self
            .inner
            .completion
            .complete(&prompt, &window, text, language)
            .await;

        let fallback = result.is_fallback();
        let kind = if fallback { MessageKind::Fallback } else { MessageKind::Text };
        let suggestions = suggest(text, language);
        let reply = ChatMessage::assistant(result.text, kind).with_suggestions(suggestions.clone());

        self.record_exchange(user_id);

        Ok(ChatOutcome::Reply {
            message: reply,
            suggestions,
            fallback,
        })
    }

    pub async fn end_session(
        &self,
        user_id: Uuid,
        conversation_id: &str,
    ) -> Result<SessionEnded, DispatchError> {
        let slot = self
            .inner
            .conversations
            .get_owned(conversation_id, user_id)
            .await?;

        let ended = {
            let session = slot.lock().await;
            self.ensure_current(conversation_id, &slot).await?;
            SessionEnded {
                conversation_id: session.conversation_id.clone(),
                session_id: session.session_id.clone(),
                message_count: session.messages.len(),
                duration_minutes: Utc::now()
                    .signed_duration_since(session.context.started_at)
                    .num_minutes(),
            }
        };
        self.inner.conversations.delete(conversation_id).await;

        info!(
            user_id = %user_id,
            conversation_id = %conversation_id,
            messages = ended.message_count,
            "Chat session ended"
        );
        Ok(ended)
    }

    /// Snapshot of a conversation the caller owns.
    pub async fn history(
        &self,
        user_id: Uuid,
        conversation_id: &str,
    ) -> Result<ConversationSession, DispatchError> {
        let slot = self
            .inner
            .conversations
            .get_owned(conversation_id, user_id)
            .await?;
        let session = slot.lock().await;
        self.ensure_current(conversation_id, &slot).await?;
        Ok(session.clone())
    }

    fn crisis_response(
        &self,
        user_id: Uuid,
        conversation_id: Option<&str>,
        severity: CrisisSeverity,
        language: Language,
    ) -> ChatOutcome {
        warn!(
            user_id = %user_id,
            conversation_id = conversation_id.unwrap_or("-"),
            severity = severity.as_str(),
            "Crisis language detected, returning support resources"
        );
        if let Err(e) = self.inner.usage.record_crisis(user_id, severity, Utc::now()) {
            warn!(user_id = %user_id, error = %e, "Failed to record crisis event");
        }

        let resources = resources_for(language, severity);
        let message = ChatMessage::assistant(resources.message.clone(), MessageKind::CrisisAlert);
        ChatOutcome::Crisis {
            severity,
            message,
            resources,
        }
    }

    /// Called with the session lock held: a sweep or end-of-session may
    /// have removed the conversation while we waited for the lock.
    async fn ensure_current(
        &self,
        conversation_id: &str,
        slot: &Arc<SessionSlot>,
    ) -> Result<(), StoreError> {
        if self.inner.conversations.is_current(conversation_id, slot).await {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    fn record_exchange(&self, user_id: Uuid) {
        if let Err(e) = self.inner.usage.record_exchange(user_id, Utc::now()) {
            warn!(user_id = %user_id, error = %e, "Failed to persist usage stats");
        }
    }

    /// Request context first, then the stored preference, then the default.
    fn resolve_language(&self, user_id: Uuid, context: Option<&ChatContext>) -> Language {
        if let Some(language) = context.and_then(|c| c.language) {
            return language;
        }
        match self.inner.usage.preferred_language(user_id) {
            Ok(language) => language.unwrap_or_default(),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to load language preference");
                Language::default()
            }
        }
    }
}

fn validate_message(text: &str) -> Result<&str, DispatchError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DispatchError::invalid("message", "Message cannot be empty"));
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err(DispatchError::invalid(
            "message",
            format!("Message cannot exceed {} characters", MAX_MESSAGE_CHARS),
        ));
    }
    Ok(trimmed)
}

fn validate_context(context: Option<&ChatContext>) -> Result<(), DispatchError> {
    match context.and_then(|c| c.mood) {
        Some(mood) if !(1..=10).contains(&mood) => Err(DispatchError::invalid(
            "context.mood",
            "Mood must be between 1 and 10",
        )),
        _ => Ok(()),
    }
}

/// Most recent non-system turns, oldest first.
fn history_window(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let turns: Vec<&ChatMessage> = messages.iter().filter(|m| m.role != Role::System).collect();
    let start = turns.len().saturating_sub(HISTORY_WINDOW);
    turns[start..].iter().map(|m| (*m).clone()).collect()
}

fn welcome_text(language: Language) -> &'static str {
    match language {
        Language::Es => {
            "¡Hola! Soy tu acompañante de bienestar. Este es un espacio seguro para hablar de \
             cómo te sientes. ¿Qué tal estás hoy?"
        }
        Language::En => {
            "Hi! I'm your wellbeing companion. This is a safe space to talk about how you \
             feel. How are you doing today?"
        }
    }
}
