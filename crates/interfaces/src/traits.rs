use async_trait::async_trait;

/// Text surface the operator talks through.
#[async_trait]
pub trait Interface: Send + Sync {
    /// Next line of operator input, trimmed. `None` on end of input.
    async fn receive_input(&self) -> Option<String>;
    async fn send_output(&self, message: &str);
    /// Ask a yes/no question before a destructive action.
    async fn confirm(&self, question: &str) -> bool;
    async fn show_status(&self, status: &str);
}
