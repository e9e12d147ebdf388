// Completion client for the upstream language model

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use solace_types::models::{ChatMessage, Language, Role};

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion service is not configured")]
    NotConfigured,
    #[error("completion request failed: {0}")]
    Transport(String),
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed completion response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

/// Fully assembled prompt: system instructions, windowed history, then the
/// new user message.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<PromptMessage>,
}

impl CompletionRequest {
    pub fn build(system_prompt: &str, history: &[ChatMessage], new_message: &str) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(PromptMessage {
            role: Role::System,
            content: system_prompt.to_string(),
        });
        messages.extend(
            history
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| PromptMessage {
                    role: m.role,
                    content: m.content.clone(),
                }),
        );
        messages.push(PromptMessage {
            role: Role::User,
            content: new_message.to_string(),
        });
        Self { messages }
    }
}

/// A single upstream call. Implementations must not retry.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

// -- HTTP backend (OpenAI-compatible chat completions) --

#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 500,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct HttpCompletionBackend {
    client: Client,
    config: HttpBackendConfig,
}

impl HttpCompletionBackend {
    pub fn new(config: HttpBackendConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let api_key = self.config.api_key.as_deref().ok_or(CompletionError::NotConfigured)?;

        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: &request.messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        debug!(model = %self.config.model, turns = request.messages.len(), "Sending completion request");

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout(self.config.timeout)
                } else {
                    CompletionError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CompletionError::Malformed("no choices in response".into()))
    }
}

// -- Client with fallback --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Model,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub text: String,
    pub source: ReplySource,
}

impl CompletionResult {
    pub fn is_fallback(&self) -> bool {
        self.source == ReplySource::Fallback
    }
}

const FALLBACK_ES: &[&str] = &[
    "Gracias por compartir esto conmigo. Estoy aquí para escucharte. ¿Puedes contarme un poco más sobre cómo te sientes?",
    "Entiendo que esto puede ser difícil. Tómate tu tiempo. ¿Qué es lo que más pesa en tu mente ahora mismo?",
    "Lo que sientes es importante. ¿Qué crees que te ayudaría un poco en este momento?",
    "Estoy contigo. A veces poner en palabras lo que sentimos ya es un paso. ¿Quieres seguir hablando de ello?",
];

const FALLBACK_EN: &[&str] = &[
    "Thank you for sharing this with me. I'm here to listen. Can you tell me a bit more about how you're feeling?",
    "I understand this can be hard. Take your time. What is weighing on your mind the most right now?",
    "What you feel matters. What do you think might help you a little right now?",
    "I'm with you. Sometimes putting feelings into words is already a step. Would you like to keep talking about it?",
];

/// Pool of canned replies used when the model is unavailable.
pub fn fallback_pool(language: Language) -> &'static [&'static str] {
    match language {
        Language::Es => FALLBACK_ES,
        Language::En => FALLBACK_EN,
    }
}

/// Deterministic pick from the pool, keyed on the number of prior turns.
pub fn fallback_reply(language: Language, prior_turns: usize) -> &'static str {
    let pool = fallback_pool(language);
    pool[prior_turns % pool.len()]
}

/// System instructions for the wellness assistant.
pub fn system_prompt(language: Language, mood: Option<u8>) -> String {
    let mut prompt = match language {
        Language::Es => String::from(
            "Eres un asistente de bienestar emocional empático y cálido. Escucha con atención, \
             valida las emociones de la persona y ofrece estrategias prácticas y breves. No eres \
             un profesional de la salud: no diagnostiques ni recetes medicación, y anima a buscar \
             ayuda profesional cuando sea apropiado. Responde siempre en español, en pocos párrafos.",
        ),
        Language::En => String::from(
            "You are an empathetic, warm emotional-wellbeing assistant. Listen carefully, \
             validate the person's feelings and offer brief, practical strategies. You are not a \
             health professional: do not diagnose or prescribe medication, and encourage \
             professional help when appropriate. Always answer in English, in a few short paragraphs.",
        ),
    };

    if let Some(mood) = mood {
        let line = match language {
            Language::Es => format!(" La persona indica un estado de ánimo de {}/10.", mood),
            Language::En => format!(" The person reports a mood of {}/10.", mood),
        };
        prompt.push_str(&line);
    }

    prompt
}

/// Wraps a backend with a timeout and fallback substitution. `complete`
/// never fails; upstream problems are logged and replaced with a canned reply.
#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        new_message: &str,
        language: Language,
    ) -> CompletionResult {
        let request = CompletionRequest::build(system_prompt, history, new_message);

        let outcome = match tokio::time::timeout(self.timeout, self.backend.complete(&request)).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(self.timeout)),
        };

        let outcome = outcome.and_then(|text| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Err(CompletionError::Malformed("empty completion".into()))
            } else {
                Ok(trimmed.to_string())
            }
        });

        match outcome {
            Ok(text) => CompletionResult {
                text,
                source: ReplySource::Model,
            },
            Err(e) => {
                warn!(error = %e, "Completion failed, substituting fallback reply");
                CompletionResult {
                    text: fallback_reply(language, history.len()).to_string(),
                    source: ReplySource::Fallback,
                }
            }
        }
    }
}
