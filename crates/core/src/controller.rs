//! Conversation state, the single-flight send path and write-through
//! persistence.

use crate::metrics::Metrics;
use parking_lot::Mutex;
use rogue_mentor_memory::{Message, Role, SessionState, StateStore};
use rogue_mentor_providers::{ChatTurn, CompletionClient};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shown in place of a reply when the completion client errors.
pub const TRANSMISSION_ERROR: &str =
    "⚠️ TRANSMISSION ERROR: Unable to process. Retry your query, Operator.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// Input was empty after trimming.
    Empty,
    /// Another exchange is still in flight.
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Replied(Message),
    Failed(Message),
    Ignored(Rejected),
}

impl SendOutcome {
    /// The assistant message appended by this send, if any.
    pub fn message(&self) -> Option<&Message> {
        match self {
            SendOutcome::Replied(message) | SendOutcome::Failed(message) => Some(message),
            SendOutcome::Ignored(_) => None,
        }
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ConversationController {
    client: Arc<dyn CompletionClient>,
    store: Arc<dyn StateStore>,
    state: Mutex<SessionState>,
    busy: AtomicBool,
    metrics: Arc<Metrics>,
}

impl ConversationController {
    /// Build a controller around the state currently in `store`.
    pub async fn load(client: Arc<dyn CompletionClient>, store: Arc<dyn StateStore>) -> Self {
        let state = store.load().await;
        info!(
            "Loaded session: {} messages, {} xp, {}/{} missions",
            state.messages.len(),
            state.xp,
            state.missions_completed,
            state.total_missions
        );
        Self::with_state(client, store, state)
    }

    pub fn with_state(
        client: Arc<dyn CompletionClient>,
        store: Arc<dyn StateStore>,
        state: SessionState,
    ) -> Self {
        Self {
            client,
            store,
            state: Mutex::new(state.normalized()),
            busy: AtomicBool::new(false),
            metrics: Metrics::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Content of the newest message when it came from the assistant.
    pub fn last_response(&self) -> Option<String> {
        self.state
            .lock()
            .last_message()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
    }

    /// Run one exchange. Concurrent sends are dropped, not queued.
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring empty message");
            self.metrics.inc_rejected_sends();
            return SendOutcome::Ignored(Rejected::Empty);
        }

        let Some(_guard) = self.try_acquire() else {
            warn!("Exchange already in flight, dropping message");
            self.metrics.inc_rejected_sends();
            return SendOutcome::Ignored(Rejected::Busy);
        };

        let history = {
            let mut state = self.state.lock();
            state.messages.push(Message::user(text));
            to_turns(&state.messages)
        };
        self.persist().await;

        self.metrics.inc_exchanges();
        info!("Sending exchange with {} turns", history.len());

        match self.client.get_response(&history).await {
            Ok(reply) => {
                let message = Message::assistant(reply);
                {
                    let mut state = self.state.lock();
                    state.messages.push(message.clone());
                    state.record_exchange();
                    debug!(
                        "Progress: {} xp, {}/{} missions",
                        state.xp, state.missions_completed, state.total_missions
                    );
                }
                self.persist().await;
                SendOutcome::Replied(message)
            }
            Err(e) => {
                error!("Completion failed: {}", e);
                self.metrics.inc_failed_exchanges();
                let message = Message::assistant(TRANSMISSION_ERROR);
                self.state.lock().messages.push(message.clone());
                self.persist().await;
                SendOutcome::Failed(message)
            }
        }
    }

    /// Reset messages and progress to a fresh session.
    pub async fn clear_history(&self) {
        info!("Purging conversation archive");
        *self.state.lock() = SessionState::default();
        if let Err(e) = self.store.clear().await {
            error!("Failed to clear stored session: {}", e);
        }
        self.persist().await;
    }

    fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(&self.busy))
    }

    async fn persist(&self) {
        let snapshot = self.snapshot();
        if let Err(e) = self.store.save(&snapshot).await {
            error!("Failed to persist session: {}", e);
        }
    }
}

fn to_turns(messages: &[Message]) -> Vec<ChatTurn> {
    messages
        .iter()
        .map(|m| match m.role {
            Role::User => ChatTurn::user(m.content.clone()),
            Role::Assistant => ChatTurn::model(m.content.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rogue_mentor_memory::MemoryStateStore;
    use rogue_mentor_providers::CompletionError;

    struct Echo;

    #[async_trait::async_trait]
    impl CompletionClient for Echo {
        async fn get_response(&self, history: &[ChatTurn]) -> Result<String, CompletionError> {
            let last = history.last().ok_or(CompletionError::EmptyHistory)?;
            Ok(format!("ACK {} ({} turns)", last.content, history.len()))
        }
    }

    fn controller() -> ConversationController {
        ConversationController::with_state(
            Arc::new(Echo),
            Arc::new(MemoryStateStore::new()),
            SessionState::default(),
        )
    }

    #[tokio::test]
    async fn test_reply_appends_and_awards_xp() {
        let controller = controller();

        let outcome = controller.send_message("  status report  ").await;
        assert_eq!(outcome.message().unwrap().content, "ACK status report (1 turns)");

        let state = controller.snapshot();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].content, "status report");
        assert_eq!(state.xp, 5);
        assert_eq!(controller.last_response().unwrap(), "ACK status report (1 turns)");
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_history_roles_map_to_turns() {
        let turns = to_turns(&[Message::user("a"), Message::assistant("b")]);
        assert_eq!(turns, vec![ChatTurn::user("a"), ChatTurn::model("b")]);
    }

    #[tokio::test]
    async fn test_last_response_requires_assistant_tail() {
        let controller = controller();
        assert!(controller.last_response().is_none());

        controller.state.lock().messages.push(Message::user("pending"));
        assert!(controller.last_response().is_none());
    }
}
