//! Hands-free loop: listen, send, speak.

use crate::controller::{ConversationController, Rejected, SendOutcome};
use crate::metrics::Metrics;
use rogue_mentor_interfaces::{
    CaptureError, PlaybackOutcome, RecognitionEngine, SpeechCapture, SpeechPlayback,
    SynthesisEngine,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Idle,
    Listening,
    Processing,
    Speaking,
}

impl CallStatus {
    pub fn status_text(self) -> &'static str {
        match self {
            CallStatus::Idle => "TAP TO SPEAK",
            CallStatus::Listening => "LISTENING...",
            CallStatus::Processing => "PROCESSING...",
            CallStatus::Speaking => "TRANSMITTING...",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_text())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    MicTapped,
    TranscriptReady,
    /// Capture ended without a transcript.
    ListenEnded,
    ResponseSpoken,
    ResponseSilent,
    ResponseFailed,
    PlaybackEnded,
    StopRequested,
    AutoSpeakDisabled,
}

/// Call-mode transition table. Events that do not apply leave the state
/// unchanged.
pub fn transition(state: CallStatus, event: CallEvent) -> CallStatus {
    use CallEvent::*;
    use CallStatus::*;

    match (state, event) {
        (_, StopRequested) => Idle,
        (Idle | Listening | Speaking, MicTapped) => Listening,
        (Idle | Listening, TranscriptReady) => Processing,
        (Listening, ListenEnded) => Idle,
        (Idle | Processing, ResponseSpoken) => Speaking,
        (Processing, ResponseSilent | ResponseFailed) => Idle,
        (Speaking, PlaybackEnded | AutoSpeakDisabled) => Idle,
        (state, _) => state,
    }
}

pub struct CallModeCoordinator<R, S> {
    controller: Arc<ConversationController>,
    capture: Arc<SpeechCapture<R>>,
    playback: Arc<SpeechPlayback<S>>,
    status: watch::Sender<CallStatus>,
    auto_speak: AtomicBool,
    metrics: Arc<Metrics>,
}

impl<R: RecognitionEngine, S: SynthesisEngine> CallModeCoordinator<R, S> {
    pub fn new(
        controller: Arc<ConversationController>,
        capture: Arc<SpeechCapture<R>>,
        playback: Arc<SpeechPlayback<S>>,
        auto_speak: bool,
    ) -> Self {
        let (status, _) = watch::channel(CallStatus::Idle);
        let metrics = controller.metrics();
        Self {
            controller,
            capture,
            playback,
            status,
            auto_speak: AtomicBool::new(auto_speak),
            metrics,
        }
    }

    pub fn status(&self) -> CallStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallStatus> {
        self.status.subscribe()
    }

    pub fn auto_speak(&self) -> bool {
        self.auto_speak.load(Ordering::SeqCst)
    }

    pub fn controller(&self) -> &Arc<ConversationController> {
        &self.controller
    }

    pub fn capture(&self) -> &Arc<SpeechCapture<R>> {
        &self.capture
    }

    pub fn playback(&self) -> &Arc<SpeechPlayback<S>> {
        &self.playback
    }

    /// Turning auto-speak off silences any reply being read out.
    pub fn set_auto_speak(&self, enabled: bool) {
        self.auto_speak.store(enabled, Ordering::SeqCst);
        info!("Auto-speak {}", if enabled { "enabled" } else { "disabled" });

        if !enabled {
            if self.playback.is_speaking() {
                self.metrics.inc_playback_cancellations();
            }
            self.playback.stop();
            self.apply(CallEvent::AutoSpeakDisabled);
        }
    }

    /// Listen for one utterance and run it through the exchange.
    /// `None` when nothing was captured or an exchange is already running.
    pub async fn tap_mic(&self) -> Option<SendOutcome> {
        let transcript = self.capture_transcript().await.ok().flatten()?;
        Some(self.handle_transcript(&transcript).await)
    }

    /// Silence playback and capture one final transcript. The status is
    /// left at Listening when a transcript comes back, ready for
    /// [`submit`](Self::submit).
    pub async fn capture_transcript(&self) -> Result<Option<String>, CaptureError> {
        if self.status() == CallStatus::Processing {
            debug!("Mic tapped while processing, ignoring");
            return Ok(None);
        }

        if self.playback.is_speaking() {
            self.metrics.inc_playback_cancellations();
        }
        self.playback.stop();
        self.apply(CallEvent::MicTapped);

        let result = self.capture.listen().await;
        let captured = match &result {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!("No transcript captured");
                false
            }
            Err(e) => {
                warn!("Voice capture unavailable: {}", e);
                false
            }
        };

        // A newer capture session may own the mic by now.
        if !captured && !self.capture.is_listening() {
            self.apply(CallEvent::ListenEnded);
        }
        result
    }

    /// Send a recognized transcript and, with auto-speak on, read the
    /// reply aloud.
    pub async fn handle_transcript(&self, transcript: &str) -> SendOutcome {
        let outcome = self.submit(transcript).await;
        self.deliver(&outcome).await;
        outcome
    }

    /// Run the exchange only. Pair with [`deliver`](Self::deliver).
    pub async fn submit(&self, text: &str) -> SendOutcome {
        self.apply(CallEvent::TranscriptReady);
        self.controller.send_message(text).await
    }

    /// Whether [`deliver`](Self::deliver) will read this outcome aloud.
    pub fn will_speak(&self, outcome: &SendOutcome) -> bool {
        matches!(outcome, SendOutcome::Replied(_))
            && self.auto_speak()
            && self.playback.is_supported()
    }

    /// Finish an exchange: speak the reply or return to idle.
    pub async fn deliver(&self, outcome: &SendOutcome) -> Option<PlaybackOutcome> {
        match outcome {
            SendOutcome::Replied(message) if self.will_speak(outcome) => {
                self.speak_response(&message.content).await
            }
            SendOutcome::Failed(_) => {
                self.apply(CallEvent::ResponseFailed);
                None
            }
            // The exchange in flight owns the status.
            SendOutcome::Ignored(Rejected::Busy) => None,
            _ => {
                self.apply(CallEvent::ResponseSilent);
                None
            }
        }
    }

    /// Read `text` aloud, replacing anything already playing.
    pub async fn speak_response(&self, text: &str) -> Option<PlaybackOutcome> {
        self.apply(CallEvent::ResponseSpoken);
        self.metrics.inc_utterances();

        let outcome = match self.playback.speak(text).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("Playback failed: {}", e);
                None
            }
        };

        // A newer utterance owns playback and keeps the Speaking status.
        if self.playback.is_speaking() {
            debug!("Reply playback superseded");
            return outcome;
        }

        self.apply(CallEvent::PlaybackEnded);
        outcome
    }

    /// Abort capture and playback and return to idle.
    pub fn stop(&self) {
        self.capture.abort();
        if self.playback.is_speaking() {
            self.metrics.inc_playback_cancellations();
        }
        self.playback.stop();
        self.apply(CallEvent::StopRequested);
    }

    fn apply(&self, event: CallEvent) {
        self.status.send_if_modified(|status| {
            let next = transition(*status, event);
            if next == *status {
                return false;
            }
            debug!("Call status {:?} -> {:?} on {:?}", status, next, event);
            *status = next;
            true
        });
    }
}
