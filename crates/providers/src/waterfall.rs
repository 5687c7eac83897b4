use crate::credential::ApiKey;
use crate::persona::{
    EXHAUSTED_NOTICE, FALLBACK_MODELS, MISSING_CREDENTIAL_NOTICE, REJECTED_CREDENTIAL_NOTICE,
    SYSTEM_INSTRUCTION,
};
use crate::session::ChatSession;
use crate::traits::*;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Walks the model list in order and returns the first reply.
///
/// Every remote failure ends up as notice text; the caller only sees an
/// error when the history itself is unusable.
pub struct WaterfallClient {
    backend: Arc<dyn ModelBackend>,
    api_key: Option<ApiKey>,
    models: Vec<String>,
    system_instruction: String,
}

impl WaterfallClient {
    pub fn new(backend: Arc<dyn ModelBackend>, api_key: Option<ApiKey>) -> Self {
        Self {
            backend,
            api_key,
            models: FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}

#[async_trait]
impl CompletionClient for WaterfallClient {
    async fn get_response(&self, history: &[ChatTurn]) -> Result<String, CompletionError> {
        let (prompt, prior) = history.split_last().ok_or(CompletionError::EmptyHistory)?;
        if prompt.role != TurnRole::User {
            return Err(CompletionError::NoPendingPrompt);
        }

        let Some(api_key) = &self.api_key else {
            error!("Mission Control: API key not detected or invalid");
            return Ok(MISSING_CREDENTIAL_NOTICE.to_string());
        };

        info!("Mission Control: API key detected, initiating comms");

        for model in &self.models {
            info!("Attempting connection with {}", model);

            let mut session = ChatSession::start(
                self.backend.as_ref(),
                api_key.expose(),
                model,
                &self.system_instruction,
                prior.to_vec(),
            );

            match session.send_message(&prompt.content).await {
                Ok(text) => {
                    info!("Link established: {} is live", model);
                    return Ok(text);
                }
                Err(e) if e.kind.try_next_model() => {
                    warn!("{} rejected: {}", model, e);
                }
                Err(e) => {
                    error!("{} rejected credential, aborting fallback: {}", model, e);
                    return Ok(REJECTED_CREDENTIAL_NOTICE.to_string());
                }
            }
        }

        error!("All {} models exhausted", self.models.len());
        Ok(EXHAUSTED_NOTICE.to_string())
    }
}
