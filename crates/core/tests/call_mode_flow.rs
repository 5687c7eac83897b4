//! Call-mode sequencing across capture, exchange and playback.

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rogue_mentor_core::*;
use rogue_mentor_interfaces::*;
use rogue_mentor_memory::MemoryStateStore;
use rogue_mentor_providers::{ChatTurn, CompletionClient, CompletionError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Replies immediately unless gated.
struct Mentor {
    gated: bool,
    entered: Notify,
    release: Notify,
}

impl Mentor {
    fn new(gated: bool) -> Arc<Self> {
        Arc::new(Self {
            gated,
            entered: Notify::new(),
            release: Notify::new(),
        })
    }
}

#[async_trait]
impl CompletionClient for Mentor {
    async fn get_response(&self, history: &[ChatTurn]) -> Result<String, CompletionError> {
        if self.gated {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let last = history.last().ok_or(CompletionError::EmptyHistory)?;
        Ok(format!("Leverage is information. You said: {}", last.content))
    }
}

/// Delivers one queued transcript per session; `None` means silence.
#[derive(Default)]
struct ScriptedRecognizer {
    unavailable: bool,
    transcripts: Mutex<VecDeque<Option<String>>>,
    aborted: AtomicUsize,
}

#[async_trait]
impl RecognitionEngine for ScriptedRecognizer {
    fn is_available(&self) -> bool {
        !self.unavailable
    }

    async fn request_permission(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    fn start(
        &self,
        _session: SessionId,
        _config: &RecognitionConfig,
        sink: EventSink,
    ) -> Result<(), CaptureError> {
        let _ = sink.send(RecognitionEvent::Started);
        match self.transcripts.lock().pop_front().flatten() {
            Some(transcript) => {
                let _ = sink.send(RecognitionEvent::Result {
                    transcript,
                    is_final: true,
                });
            }
            None => {
                let _ = sink.send(RecognitionEvent::Error(RecognitionErrorKind::NoSpeech));
            }
        }
        let _ = sink.send(RecognitionEvent::Ended);
        Ok(())
    }

    fn stop(&self, _session: SessionId) {}

    fn abort(&self, _session: SessionId) {
        self.aborted.fetch_add(1, Ordering::SeqCst);
    }
}

/// Holds each utterance until cancelled when `hold` is set.
struct Synth {
    hold: AtomicBool,
    spoken: Mutex<Vec<String>>,
    cancels: AtomicUsize,
    queue: Mutex<CancellationToken>,
}

impl Synth {
    fn new(hold: bool) -> Arc<Self> {
        Arc::new(Self {
            hold: AtomicBool::new(hold),
            spoken: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
            queue: Mutex::new(CancellationToken::new()),
        })
    }
}

#[async_trait]
impl SynthesisEngine for Synth {
    fn is_available(&self) -> bool {
        true
    }

    fn voices(&self) -> Vec<Voice> {
        Vec::new()
    }

    async fn speak(&self, utterance: Utterance) -> Result<(), PlaybackError> {
        let cancelled = self.queue.lock().clone();
        self.spoken.lock().push(utterance.text);
        if self.hold.load(Ordering::SeqCst) {
            cancelled.cancelled().await;
        }
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        let previous = std::mem::replace(&mut *self.queue.lock(), CancellationToken::new());
        previous.cancel();
    }
}

type Coordinator = CallModeCoordinator<Arc<ScriptedRecognizer>, Arc<Synth>>;

async fn coordinator(
    client: Arc<Mentor>,
    recognizer: Arc<ScriptedRecognizer>,
    synth: Arc<Synth>,
    auto_speak: bool,
) -> Arc<Coordinator> {
    let controller =
        ConversationController::load(client, Arc::new(MemoryStateStore::new())).await;
    Arc::new(CallModeCoordinator::new(
        Arc::new(controller),
        Arc::new(SpeechCapture::new(recognizer)),
        Arc::new(SpeechPlayback::new(synth, "en-US")),
        auto_speak,
    ))
}

async fn wait_for_status(coordinator: &Coordinator, status: CallStatus) {
    let mut rx = coordinator.subscribe();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == status))
        .await
        .expect("status never reached")
        .unwrap();
}

#[tokio::test]
async fn test_transcript_processes_then_idles_without_auto_speak() {
    let client = Mentor::new(true);
    let synth = Synth::new(false);
    let coordinator =
        coordinator(client.clone(), Arc::default(), synth.clone(), false).await;

    let exchange = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.handle_transcript("find leverage").await })
    };

    client.entered.notified().await;
    assert_eq!(coordinator.status(), CallStatus::Processing);
    assert_eq!(coordinator.status().status_text(), "PROCESSING...");

    client.release.notify_one();
    let outcome = exchange.await.unwrap();

    assert!(matches!(outcome, SendOutcome::Replied(_)));
    assert_eq!(coordinator.status(), CallStatus::Idle);
    assert!(synth.spoken.lock().is_empty());
    assert_eq!(coordinator.controller().messages()[0].content, "find leverage");
}

#[tokio::test]
async fn test_disabling_auto_speak_cancels_audio_at_once() {
    let synth = Synth::new(true);
    let coordinator = coordinator(Mentor::new(false), Arc::default(), synth.clone(), true).await;

    let exchange = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.handle_transcript("brief me").await })
    };

    wait_for_status(&coordinator, CallStatus::Speaking).await;
    assert!(coordinator.playback().is_speaking());

    coordinator.set_auto_speak(false);
    assert_eq!(coordinator.status(), CallStatus::Idle);
    assert!(!coordinator.playback().is_speaking());
    assert!(!coordinator.auto_speak());

    let outcome = exchange.await.unwrap();
    assert!(matches!(outcome, SendOutcome::Replied(_)));
    assert_eq!(coordinator.status(), CallStatus::Idle);
    assert_eq!(synth.spoken.lock().len(), 1);

    let metrics = coordinator.controller().metrics().snapshot();
    assert_eq!(metrics.utterances, 1);
    assert_eq!(metrics.playback_cancellations, 1);
}

#[tokio::test]
async fn test_tap_mic_runs_full_cycle() {
    let recognizer = Arc::new(ScriptedRecognizer::default());
    recognizer
        .transcripts
        .lock()
        .push_back(Some("status report".to_string()));
    let synth = Synth::new(false);
    let coordinator = coordinator(Mentor::new(false), recognizer, synth.clone(), true).await;

    let outcome = coordinator.tap_mic().await.unwrap();

    let reply = outcome.message().unwrap().content.clone();
    assert_eq!(reply, "Leverage is information. You said: status report");
    assert_eq!(*synth.spoken.lock(), vec![reply]);
    assert_eq!(coordinator.status(), CallStatus::Idle);
}

#[tokio::test]
async fn test_tap_mic_without_speech_returns_to_idle() {
    let recognizer = Arc::new(ScriptedRecognizer::default());
    recognizer.transcripts.lock().push_back(None);
    let coordinator = coordinator(Mentor::new(false), recognizer, Synth::new(false), true).await;

    assert!(coordinator.tap_mic().await.is_none());
    assert_eq!(coordinator.status(), CallStatus::Idle);
    assert!(coordinator.controller().messages().is_empty());
    assert_eq!(
        coordinator.capture().last_error(),
        Some(RecognitionErrorKind::NoSpeech)
    );
}

#[tokio::test]
async fn test_tap_mic_without_recognizer() {
    let recognizer = Arc::new(ScriptedRecognizer {
        unavailable: true,
        ..Default::default()
    });
    let coordinator = coordinator(Mentor::new(false), recognizer, Synth::new(false), true).await;

    assert!(coordinator.tap_mic().await.is_none());
    assert_eq!(coordinator.status(), CallStatus::Idle);
}

#[tokio::test]
async fn test_tap_mic_interrupts_playback() {
    let recognizer = Arc::new(ScriptedRecognizer::default());
    recognizer.transcripts.lock().push_back(None);
    let synth = Synth::new(true);
    let coordinator = coordinator(Mentor::new(false), recognizer, synth.clone(), true).await;

    let speaking = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.speak_response("long briefing").await })
    };
    wait_for_status(&coordinator, CallStatus::Speaking).await;

    coordinator.tap_mic().await;

    assert_eq!(speaking.await.unwrap(), Some(PlaybackOutcome::Cancelled));
    assert!(!coordinator.playback().is_speaking());
    assert_eq!(coordinator.status(), CallStatus::Idle);
}

#[tokio::test]
async fn test_stop_silences_everything() {
    let synth = Synth::new(true);
    let coordinator = coordinator(Mentor::new(false), Arc::default(), synth.clone(), true).await;

    let speaking = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.speak_response("hold the line").await })
    };
    wait_for_status(&coordinator, CallStatus::Speaking).await;

    coordinator.stop();
    assert_eq!(coordinator.status(), CallStatus::Idle);
    assert_eq!(speaking.await.unwrap(), Some(PlaybackOutcome::Cancelled));

    coordinator.stop();
    assert_eq!(coordinator.status(), CallStatus::Idle);
}

#[tokio::test]
async fn test_superseded_reply_keeps_speaking_status() {
    let synth = Synth::new(true);
    let coordinator = coordinator(Mentor::new(false), Arc::default(), synth.clone(), true).await;

    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.speak_response("one").await })
    };
    wait_for_status(&coordinator, CallStatus::Speaking).await;

    let second = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.speak_response("two").await })
    };

    assert_eq!(first.await.unwrap(), Some(PlaybackOutcome::Cancelled));
    assert_eq!(coordinator.status(), CallStatus::Speaking);
    assert!(coordinator.playback().is_speaking());
    assert_eq!(*synth.spoken.lock(), vec!["one", "two"]);

    coordinator.stop();
    assert_eq!(second.await.unwrap(), Some(PlaybackOutcome::Cancelled));
    assert_eq!(coordinator.status(), CallStatus::Idle);
}

#[tokio::test]
async fn test_capture_leaves_listening_for_submit() {
    let recognizer = Arc::new(ScriptedRecognizer::default());
    recognizer
        .transcripts
        .lock()
        .push_back(Some("what now".to_string()));
    let synth = Synth::new(false);
    let coordinator = coordinator(Mentor::new(false), recognizer, synth.clone(), false).await;

    let transcript = coordinator.capture_transcript().await.unwrap().unwrap();
    assert_eq!(transcript, "what now");
    assert_eq!(coordinator.status(), CallStatus::Listening);

    let outcome = coordinator.submit(&transcript).await;
    assert_eq!(coordinator.status(), CallStatus::Processing);
    assert!(!coordinator.will_speak(&outcome));

    assert_eq!(coordinator.deliver(&outcome).await, None);
    assert_eq!(coordinator.status(), CallStatus::Idle);
    assert!(synth.spoken.lock().is_empty());
}
