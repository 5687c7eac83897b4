//! Speech-to-text capture.
//!
//! Platform recognizers report lifecycle events on a per-session channel;
//! [`SpeechCapture`] folds them through [`next_state`] and surfaces only
//! finalized transcripts.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

pub type SessionId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Started,
    Result { transcript: String, is_final: bool },
    Error(RecognitionErrorKind),
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    NoSpeech,
    Aborted,
    NotAllowed,
    AudioCapture,
    Network,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMemo {
    Unknown,
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    AwaitingPermission,
    Listening,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("speech recognition is not available on this platform")]
    Unsupported,
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("failed to start recognition: {0}")]
    StartFailed(String),
}

#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    pub lang: String,
    pub continuous: bool,
    pub interim_results: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            lang: "en-US".to_string(),
            continuous: false,
            interim_results: false,
        }
    }
}

pub type EventSink = mpsc::UnboundedSender<RecognitionEvent>;

/// Native recognizer seam.
///
/// After `start` succeeds the engine must eventually send `Ended` (or an
/// `Error`) for that session, including after `stop`.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    fn is_available(&self) -> bool;

    async fn request_permission(&self) -> PermissionStatus;

    fn start(
        &self,
        session: SessionId,
        config: &RecognitionConfig,
        sink: EventSink,
    ) -> Result<(), CaptureError>;

    /// Finish the session, delivering whatever was heard.
    fn stop(&self, session: SessionId);

    /// Drop the session without a result.
    fn abort(&self, session: SessionId);
}

#[async_trait]
impl<T: RecognitionEngine + ?Sized> RecognitionEngine for std::sync::Arc<T> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    async fn request_permission(&self) -> PermissionStatus {
        (**self).request_permission().await
    }

    fn start(
        &self,
        session: SessionId,
        config: &RecognitionConfig,
        sink: EventSink,
    ) -> Result<(), CaptureError> {
        (**self).start(session, config, sink)
    }

    fn stop(&self, session: SessionId) {
        (**self).stop(session)
    }

    fn abort(&self, session: SessionId) {
        (**self).abort(session)
    }
}

/// Pure transition table of the capture state machine.
pub fn next_state(state: CaptureState, event: &RecognitionEvent) -> CaptureState {
    match event {
        RecognitionEvent::Started => CaptureState::Listening,
        RecognitionEvent::Result { is_final: false, .. } => state,
        RecognitionEvent::Result { is_final: true, .. }
        | RecognitionEvent::Error(_)
        | RecognitionEvent::Ended => CaptureState::Idle,
    }
}

struct ActiveSession {
    id: SessionId,
    sink: EventSink,
}

pub struct SpeechCapture<E> {
    engine: E,
    config: RecognitionConfig,
    state: watch::Sender<CaptureState>,
    permission: Mutex<PermissionMemo>,
    active: Mutex<Option<ActiveSession>>,
    next_session: AtomicU64,
    last_error: Mutex<Option<RecognitionErrorKind>>,
}

impl<E: RecognitionEngine> SpeechCapture<E> {
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, RecognitionConfig::default())
    }

    pub fn with_config(engine: E, config: RecognitionConfig) -> Self {
        let (state, _) = watch::channel(CaptureState::Idle);
        Self {
            engine,
            config,
            state,
            permission: Mutex::new(PermissionMemo::Unknown),
            active: Mutex::new(None),
            next_session: AtomicU64::new(1),
            last_error: Mutex::new(None),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.engine.is_available()
    }

    pub fn state(&self) -> CaptureState {
        *self.state.borrow()
    }

    pub fn is_listening(&self) -> bool {
        self.state() == CaptureState::Listening
    }

    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    pub fn permission(&self) -> PermissionMemo {
        *self.permission.lock()
    }

    pub fn last_error(&self) -> Option<RecognitionErrorKind> {
        self.last_error.lock().clone()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Forget a recorded denial so the next `listen` prompts again.
    pub fn reset_permission(&self) {
        *self.permission.lock() = PermissionMemo::Unknown;
    }

    /// Capture one utterance.
    ///
    /// Returns `Ok(None)` when the session ends without a final transcript
    /// (no speech, aborted, engine error); the cause is kept in
    /// [`last_error`](Self::last_error).
    pub async fn listen(&self) -> Result<Option<String>, CaptureError> {
        if !self.engine.is_available() {
            warn!("Speech recognition not supported");
            return Err(CaptureError::Unsupported);
        }

        self.ensure_permission().await?;

        // A new session always replaces the previous one.
        self.abort();

        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        let (sink, mut events) = mpsc::unbounded_channel();
        *self.active.lock() = Some(ActiveSession {
            id,
            sink: sink.clone(),
        });
        *self.last_error.lock() = None;

        debug!("Starting recognition session {}", id);
        if let Err(e) = self.engine.start(id, &self.config, sink) {
            error!("Failed to start recognition: {}", e);
            self.finish(id);
            return Err(e);
        }

        while let Some(event) = events.recv().await {
            if !self.is_current(id) {
                debug!("Session {} superseded, dropping {:?}", id, event);
                return Ok(None);
            }

            self.state.send_replace(next_state(self.state(), &event));

            match event {
                RecognitionEvent::Started => info!("Listening started"),
                RecognitionEvent::Result {
                    transcript,
                    is_final: false,
                } => debug!("Interim transcript ignored: {}", transcript),
                RecognitionEvent::Result {
                    transcript,
                    is_final: true,
                } => {
                    info!("Final transcript received");
                    self.engine.stop(id);
                    self.finish(id);
                    return Ok(Some(transcript));
                }
                RecognitionEvent::Error(kind) => {
                    match &kind {
                        RecognitionErrorKind::NoSpeech => info!("No speech detected"),
                        RecognitionErrorKind::Aborted => info!("Recognition was aborted"),
                        RecognitionErrorKind::NotAllowed => {
                            error!("Microphone access denied");
                            *self.permission.lock() = PermissionMemo::Denied;
                        }
                        other => error!("Speech recognition error: {:?}", other),
                    }
                    *self.last_error.lock() = Some(kind);
                    self.finish(id);
                    return Ok(None);
                }
                RecognitionEvent::Ended => {
                    info!("Listening ended");
                    self.finish(id);
                    return Ok(None);
                }
            }
        }

        self.finish(id);
        Ok(None)
    }

    /// Ask the engine to end the current session and deliver its result.
    pub fn stop_listening(&self) {
        let id = self.active.lock().as_ref().map(|s| s.id);
        if let Some(id) = id {
            debug!("Stopping recognition session {}", id);
            self.engine.stop(id);
        }
    }

    /// Drop the current session, if any. Safe to call at any time.
    pub fn abort(&self) {
        let session = self.active.lock().take();
        if let Some(session) = session {
            let _ = session
                .sink
                .send(RecognitionEvent::Error(RecognitionErrorKind::Aborted));
            self.engine.abort(session.id);
            debug!("Aborted recognition session {}", session.id);
        }
        self.state.send_replace(CaptureState::Idle);
    }

    async fn ensure_permission(&self) -> Result<(), CaptureError> {
        let memo = self.permission();
        match memo {
            PermissionMemo::Granted => Ok(()),
            PermissionMemo::Denied => {
                warn!("Microphone permission previously denied");
                Err(CaptureError::PermissionDenied)
            }
            PermissionMemo::Unknown => {
                info!("Requesting microphone permission");
                self.state.send_replace(CaptureState::AwaitingPermission);
                match self.engine.request_permission().await {
                    PermissionStatus::Granted => {
                        *self.permission.lock() = PermissionMemo::Granted;
                        Ok(())
                    }
                    PermissionStatus::Denied => {
                        error!("Cannot start listening, microphone permission denied");
                        *self.permission.lock() = PermissionMemo::Denied;
                        self.state.send_replace(CaptureState::Idle);
                        Err(CaptureError::PermissionDenied)
                    }
                }
            }
        }
    }

    fn is_current(&self, id: SessionId) -> bool {
        matches!(&*self.active.lock(), Some(session) if session.id == id)
    }

    fn finish(&self, id: SessionId) {
        let mut active = self.active.lock();
        if matches!(&*active, Some(session) if session.id == id) {
            *active = None;
            self.state.send_replace(CaptureState::Idle);
        }
    }
}
