//! Text-to-speech playback with a single active utterance.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Speaking rate relative to the platform default.
pub const SPEECH_RATE: f32 = 0.9;
/// Pitch relative to the platform default.
pub const SPEECH_PITCH: f32 = 0.8;

const PREFERRED_VOICE_TOKENS: &[&str] = &["male", "daniel", "james", "david"];
const REJECTED_VOICE_TOKENS: &[&str] = &["female"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    pub lang: String,
    /// Engine-specific handle that selects exactly this voice.
    pub id: Option<String>,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<Voice>,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("speech synthesis is not available on this platform")]
    Unsupported,
    #[error("speech synthesis failed: {0}")]
    Engine(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    Cancelled,
}

/// Native synthesizer seam. The engine has one global queue; `cancel`
/// empties it and ends whatever is playing.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    fn is_available(&self) -> bool;

    fn voices(&self) -> Vec<Voice>;

    /// Resolves once the utterance has been spoken or cancelled.
    async fn speak(&self, utterance: Utterance) -> Result<(), PlaybackError>;

    fn cancel(&self);
}

#[async_trait]
impl<T: SynthesisEngine + ?Sized> SynthesisEngine for std::sync::Arc<T> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn voices(&self) -> Vec<Voice> {
        (**self).voices()
    }

    async fn speak(&self, utterance: Utterance) -> Result<(), PlaybackError> {
        (**self).speak(utterance).await
    }

    fn cancel(&self) {
        (**self).cancel()
    }
}

/// Pick a voice: a name match on the preferred tokens, then the UI
/// language, then whatever comes first. `None` leaves the platform default.
pub fn select_voice(voices: &[Voice], locale: &str) -> Option<Voice> {
    let preferred = voices.iter().find(|voice| {
        let name = voice.name.to_lowercase();
        PREFERRED_VOICE_TOKENS.iter().any(|t| name.contains(t))
            && !REJECTED_VOICE_TOKENS.iter().any(|t| name.contains(t))
    });

    let language = locale
        .split(|c| c == '-' || c == '_')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    let by_language = || {
        voices
            .iter()
            .find(|voice| !language.is_empty() && voice.lang.to_lowercase().starts_with(&language))
    };

    preferred
        .or_else(by_language)
        .or_else(|| voices.first())
        .cloned()
}

pub struct SpeechPlayback<E> {
    engine: E,
    locale: String,
    active: Mutex<Option<(u64, CancellationToken)>>,
    next_id: AtomicU64,
    speaking: watch::Sender<bool>,
}

impl<E: SynthesisEngine> SpeechPlayback<E> {
    pub fn new(engine: E, locale: impl Into<String>) -> Self {
        let (speaking, _) = watch::channel(false);
        Self {
            engine,
            locale: locale.into(),
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
            speaking,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.engine.is_available()
    }

    pub fn is_speaking(&self) -> bool {
        *self.speaking.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.speaking.subscribe()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn utterance(&self, text: &str) -> Utterance {
        Utterance {
            text: text.to_string(),
            voice: select_voice(&self.engine.voices(), &self.locale),
            lang: self.locale.clone(),
            rate: SPEECH_RATE,
            pitch: SPEECH_PITCH,
        }
    }

    /// Speak `text`, cancelling anything already playing first.
    pub async fn speak(&self, text: &str) -> Result<PlaybackOutcome, PlaybackError> {
        if !self.engine.is_available() {
            warn!("Speech synthesis not supported");
            return Err(PlaybackError::Unsupported);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        let previous = self.active.lock().replace((id, token.clone()));
        if let Some((previous_id, previous_token)) = previous {
            debug!("Cancelling utterance {} for {}", previous_id, id);
            previous_token.cancel();
        }
        self.engine.cancel();

        let utterance = self.utterance(text);
        self.speaking.send_replace(true);

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Ok(PlaybackOutcome::Cancelled),
            result = self.engine.speak(utterance) => result.map(|_| PlaybackOutcome::Finished),
        };

        {
            let mut active = self.active.lock();
            if matches!(&*active, Some((current, _)) if *current == id) {
                *active = None;
                self.speaking.send_replace(false);
            }
        }

        if let Err(e) = &outcome {
            error!("Speech synthesis error: {}", e);
        }
        outcome
    }

    /// Silence playback. Idempotent.
    pub fn stop(&self) {
        if let Some((id, token)) = self.active.lock().take() {
            debug!("Stopping utterance {}", id);
            token.cancel();
        }
        self.engine.cancel();
        self.speaking.send_replace(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voices() -> Vec<Voice> {
        vec![
            Voice::new("Google français", "fr-FR"),
            Voice::new("Samantha", "en-US"),
            Voice::new("Microsoft Zira Female", "en-US"),
            Voice::new("Daniel", "en-GB"),
        ]
    }

    #[test]
    fn test_prefers_named_voice() {
        let voice = select_voice(&voices(), "en-US").unwrap();
        assert_eq!(voice.name, "Daniel");
    }

    #[test]
    fn test_female_does_not_match_male_token() {
        let list = vec![
            Voice::new("English Female", "en-US"),
            Voice::new("Alex", "en-US"),
        ];
        assert_eq!(select_voice(&list, "en-US").unwrap().name, "English Female");

        let list = vec![Voice::new("Other", "de-DE"), Voice::new("Female", "de-DE")];
        assert_eq!(select_voice(&list, "en-US").unwrap().name, "Other");
    }

    #[test]
    fn test_falls_back_to_locale_then_first() {
        let list = vec![Voice::new("Amelie", "fr-CA"), Voice::new("Samantha", "en-US")];
        assert_eq!(select_voice(&list, "en-US").unwrap().name, "Samantha");
        assert_eq!(select_voice(&list, "ja-JP").unwrap().name, "Amelie");
        assert!(select_voice(&[], "en-US").is_none());
    }
}
