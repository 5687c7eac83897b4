//! Operator-facing surfaces: the text terminal plus voice capture and
//! playback over pluggable speech engines.

pub mod capture;
pub mod engines;
pub mod playback;
pub mod terminal;
pub mod traits;

pub use capture::{
    next_state, CaptureError, CaptureState, EventSink, PermissionMemo, PermissionStatus,
    RecognitionConfig, RecognitionEngine, RecognitionErrorKind, RecognitionEvent, SessionId,
    SpeechCapture,
};
pub use engines::{CommandRecognizer, CommandSynthesizer};
pub use playback::{
    select_voice, PlaybackError, PlaybackOutcome, SpeechPlayback, SynthesisEngine, Utterance,
    Voice, SPEECH_PITCH, SPEECH_RATE,
};
pub use terminal::TerminalInterface;
pub use traits::Interface;
