use crate::types::SessionState;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Key the conversation blob is stored under.
pub const DEFAULT_STATE_KEY: &str = "rogue_mentor_state";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable key/value storage for the session blob.
///
/// `load` never fails: a missing or unreadable blob yields the default
/// state. Writes and removals report errors so callers can log them.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> SessionState;

    async fn save(&self, state: &SessionState) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

/// One JSON file per key inside `base_path`.
pub struct FileStateStore {
    base_path: PathBuf,
    key: String,
}

impl FileStateStore {
    pub fn new<P: AsRef<Path>>(base_path: P, key: impl Into<String>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            key: key.into(),
        }
    }

    pub async fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.base_path).await?;
        tracing::info!("State store initialized at {:?}", self.base_path);
        Ok(())
    }

    pub fn path(&self) -> PathBuf {
        self.base_path.join(format!("{}.json", self.key))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> SessionState {
        let path = self.path();

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No stored state under '{}', starting fresh", self.key);
                return SessionState::default();
            }
            Err(e) => {
                tracing::error!("Failed to load state: {}", e);
                return SessionState::default();
            }
        };

        match serde_json::from_str::<SessionState>(&content) {
            Ok(state) => {
                tracing::info!(
                    "Loaded state '{}' ({} messages)",
                    self.key,
                    state.messages.len()
                );
                state.normalized()
            }
            Err(e) => {
                tracing::error!("Stored state '{}' is corrupted, using defaults: {}", self.key, e);
                SessionState::default()
            }
        }
    }

    async fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        let path = self.path();

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        let content = serde_json::to_string(state)?;

        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, &path).await?;

        tracing::debug!("Saved state '{}'", self.key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let path = self.path();
        if path.exists() {
            fs::remove_file(&path).await?;
            tracing::info!("Cleared state '{}'", self.key);
        }
        Ok(())
    }
}

/// Process-local store, used for ephemeral sessions and tests.
#[derive(Default)]
pub struct MemoryStateStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw blob access, lets tests plant corrupted data.
    pub fn insert_raw(&self, key: &str, blob: impl Into<String>) {
        self.blobs.lock().insert(key.to_string(), blob.into());
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.blobs.lock().get(key).cloned()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> SessionState {
        let blob = self.blobs.lock().get(DEFAULT_STATE_KEY).cloned();
        blob.and_then(|blob| serde_json::from_str::<SessionState>(&blob).ok())
            .map(SessionState::normalized)
            .unwrap_or_default()
    }

    async fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        let blob = serde_json::to_string(state)?;
        self.blobs.lock().insert(DEFAULT_STATE_KEY.to_string(), blob);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.blobs.lock().remove(DEFAULT_STATE_KEY);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[tokio::test]
    async fn test_state_lifecycle() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path(), DEFAULT_STATE_KEY);

        store.initialize().await.unwrap();

        let mut state = store.load().await;
        assert_eq!(state, SessionState::default());

        state.messages.push(Message::user("status report"));
        state.xp = 15;
        store.save(&state).await.unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].content, "status report");
        assert_eq!(loaded.xp, 15);

        store.clear().await.unwrap();
        assert_eq!(store.load().await, SessionState::default());
    }

    #[tokio::test]
    async fn test_corrupted_blob_yields_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path(), DEFAULT_STATE_KEY);
        store.initialize().await.unwrap();

        std::fs::write(store.path(), "{\"messages\": [ not json").unwrap();

        assert_eq!(store.load().await, SessionState::default());
    }

    #[tokio::test]
    async fn test_clear_missing_file_is_ok() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path(), "absent");
        store.initialize().await.unwrap();

        assert!(store.clear().await.is_ok());
    }

    #[tokio::test]
    async fn test_reads_model_role_blob() {
        let store = MemoryStateStore::new();
        store.insert_raw(
            DEFAULT_STATE_KEY,
            r#"{"messages":[{"id":"1-a","role":"model","content":"Operator.","timestamp":1}],"xp":250,"missionsCompleted":1,"totalMissions":10}"#,
        );

        let state = store.load().await;
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.xp, 100);
        assert_eq!(state.missions_completed, 1);
    }

    #[tokio::test]
    async fn test_memory_store_corrupted_blob() {
        let store = MemoryStateStore::new();
        store.insert_raw(DEFAULT_STATE_KEY, "garbage");
        assert_eq!(store.load().await, SessionState::default());
    }
}
