use crate::traits::{ChatTurn, GenerateRequest, ModelBackend, ProviderError};

/// A conversation pinned to one model. Each successful `send_message`
/// appends both the prompt and the reply to the session history.
pub struct ChatSession<'a> {
    backend: &'a dyn ModelBackend,
    api_key: &'a str,
    model: &'a str,
    system_instruction: &'a str,
    history: Vec<ChatTurn>,
}

impl<'a> ChatSession<'a> {
    pub fn start(
        backend: &'a dyn ModelBackend,
        api_key: &'a str,
        model: &'a str,
        system_instruction: &'a str,
        history: Vec<ChatTurn>,
    ) -> Self {
        Self {
            backend,
            api_key,
            model,
            system_instruction,
            history,
        }
    }

    pub fn model(&self) -> &str {
        self.model
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub async fn send_message(&mut self, prompt: &str) -> Result<String, ProviderError> {
        let mut contents = self.history.clone();
        contents.push(ChatTurn::user(prompt));

        let reply = self
            .backend
            .generate(GenerateRequest {
                api_key: self.api_key,
                model: self.model,
                system_instruction: self.system_instruction,
                contents: &contents,
            })
            .await?;

        contents.push(ChatTurn::model(reply.clone()));
        self.history = contents;
        Ok(reply)
    }
}
