use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Author of a turn as the completion endpoint sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            content: content.into(),
        }
    }
}

/// Failure classes a backend reports for a single model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The model identifier does not exist for this key.
    ModelNotFound,
    /// The endpoint rejected the request for this model.
    InvalidModel,
    /// Rate limit or daily quota hit.
    QuotaExhausted,
    /// Network failure, 5xx, or an unusable reply.
    Unavailable,
    /// The credential itself was rejected; no other model will accept it.
    Unauthorized,
}

impl ProviderErrorKind {
    /// Whether the next candidate model is worth trying.
    pub fn try_next_model(self) -> bool {
        !matches!(self, ProviderErrorKind::Unauthorized)
    }
}

#[derive(Debug, Error)]
#[error("{kind:?} from {model}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub model: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, model: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            message: message.into(),
        }
    }
}

/// Errors the conversation-level client can return. Remote failures are
/// turned into notice text instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("history is empty, nothing to send")]
    EmptyHistory,
    #[error("last history entry must be a user turn")]
    NoPendingPrompt,
}

/// One stateless call against one model.
#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    pub api_key: &'a str,
    pub model: &'a str,
    pub system_instruction: &'a str,
    pub contents: &'a [ChatTurn],
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<String, ProviderError>;

    fn name(&self) -> &str;
}

/// What the conversation controller talks to.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn get_response(&self, history: &[ChatTurn]) -> Result<String, CompletionError>;
}
