//! Speech engines backed by external programs.
//!
//! `CommandSynthesizer` drives an espeak-ng compatible CLI. `CommandRecognizer`
//! runs a capture program that records one utterance and prints the
//! transcript on stdout.

use crate::capture::*;
use crate::playback::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// espeak-ng default words per minute.
const BASE_WORDS_PER_MINUTE: f32 = 175.0;
/// espeak-ng default pitch on its 0-99 scale.
const BASE_PITCH: f32 = 50.0;

pub struct CommandSynthesizer {
    program: Option<PathBuf>,
    base_args: Vec<String>,
    voices: Vec<Voice>,
    queue: Mutex<CancellationToken>,
}

impl CommandSynthesizer {
    /// Resolve `program` on `PATH` and read its voice list.
    pub fn detect(program: &str) -> Self {
        Self::with_args(program, Vec::new())
    }

    pub fn with_args(program: &str, base_args: Vec<String>) -> Self {
        let program = match which::which(program) {
            Ok(path) => {
                info!("Speech synthesizer found at {}", path.display());
                Some(path)
            }
            Err(_) => {
                warn!("Speech synthesizer '{}' not found, playback disabled", program);
                None
            }
        };

        let voices = program
            .as_ref()
            .map(|path| list_voices(path, &base_args))
            .unwrap_or_default();

        Self {
            program,
            base_args,
            voices,
            queue: Mutex::new(CancellationToken::new()),
        }
    }

    fn args_for(&self, utterance: &Utterance) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.push("-s".to_string());
        args.push(((BASE_WORDS_PER_MINUTE * utterance.rate).round() as u32).to_string());
        args.push("-p".to_string());
        args.push(((BASE_PITCH * utterance.pitch).round() as u32).to_string());
        if let Some(voice) = &utterance.voice {
            args.push("-v".to_string());
            args.push(voice.id.clone().unwrap_or_else(|| voice.lang.clone()));
        }
        args
    }
}

fn list_voices(program: &PathBuf, base_args: &[String]) -> Vec<Voice> {
    let output = std::process::Command::new(program)
        .args(base_args)
        .arg("--voices")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();

    match output {
        Ok(output) if output.status.success() => {
            parse_voice_table(&String::from_utf8_lossy(&output.stdout))
        }
        _ => Vec::new(),
    }
}

/// Parse `espeak-ng --voices` output:
/// `Pty Language Age/Gender VoiceName File Other Languages`.
pub fn parse_voice_table(table: &str) -> Vec<Voice> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            let voice = Voice::new(fields[3].replace('_', " "), fields[1]);
            Some(match fields.get(4) {
                Some(file) => voice.with_id(*file),
                None => voice,
            })
        })
        .collect()
}

#[async_trait]
impl SynthesisEngine for CommandSynthesizer {
    fn is_available(&self) -> bool {
        self.program.is_some()
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    async fn speak(&self, utterance: Utterance) -> Result<(), PlaybackError> {
        let program = self.program.as_ref().ok_or(PlaybackError::Unsupported)?;
        let cancelled = self.queue.lock().clone();

        let mut child = Command::new(program)
            .args(self.args_for(&utterance))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::Engine(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            // The synthesizer may exit before reading everything.
            let _ = stdin.write_all(utterance.text.as_bytes()).await;
        }

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| PlaybackError::Engine(e.to_string()))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(PlaybackError::Engine(format!("synthesizer exited with {}", status)))
                }
            }
            _ = cancelled.cancelled() => {
                debug!("Synthesizer cancelled");
                let _ = child.start_kill();
                Ok(())
            }
        }
    }

    fn cancel(&self) {
        let previous = std::mem::replace(&mut *self.queue.lock(), CancellationToken::new());
        previous.cancel();
    }
}

struct RecognizerSession {
    stop: CancellationToken,
    abort: CancellationToken,
}

pub struct CommandRecognizer {
    program: Option<PathBuf>,
    args: Vec<String>,
    sessions: Arc<Mutex<HashMap<SessionId, RecognizerSession>>>,
}

impl CommandRecognizer {
    /// `command` is split on whitespace; the first word is resolved on `PATH`.
    pub fn detect(command: Option<&str>) -> Self {
        let mut words = command.unwrap_or_default().split_whitespace();
        let program = words.next().and_then(|name| match which::which(name) {
            Ok(path) => {
                info!("Speech recognizer found at {}", path.display());
                Some(path)
            }
            Err(_) => {
                warn!("Speech recognizer '{}' not found, voice input disabled", name);
                None
            }
        });

        Self {
            program,
            args: words.map(str::to_string).collect(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl RecognitionEngine for CommandRecognizer {
    fn is_available(&self) -> bool {
        self.program.is_some()
    }

    async fn request_permission(&self) -> PermissionStatus {
        // Device access is granted to the capture program by the OS.
        PermissionStatus::Granted
    }

    fn start(
        &self,
        session: SessionId,
        config: &RecognitionConfig,
        sink: EventSink,
    ) -> Result<(), CaptureError> {
        let program = self.program.as_ref().ok_or(CaptureError::Unsupported)?;

        let mut child = Command::new(program)
            .args(&self.args)
            .env("RECOGNITION_LANG", &config.lang)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::StartFailed(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::StartFailed("no stdout".to_string()))?;

        let stop = CancellationToken::new();
        let abort = CancellationToken::new();
        self.sessions.lock().insert(
            session,
            RecognizerSession {
                stop: stop.clone(),
                abort: abort.clone(),
            },
        );

        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            let _ = sink.send(RecognitionEvent::Started);

            let mut lines = BufReader::new(stdout).lines();
            let mut heard: Vec<String> = Vec::new();
            let mut stopped = false;
            let mut read_error = None;

            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            let line = line.trim();
                            if !line.is_empty() {
                                heard.push(line.to_string());
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            read_error = Some(e.to_string());
                            break;
                        }
                    },
                    _ = stop.cancelled() => {
                        stopped = true;
                        let _ = child.start_kill();
                        break;
                    }
                    _ = abort.cancelled() => {
                        let _ = child.start_kill();
                        let _ = sink.send(RecognitionEvent::Error(RecognitionErrorKind::Aborted));
                        let _ = sink.send(RecognitionEvent::Ended);
                        sessions.lock().remove(&session);
                        return;
                    }
                }
            }

            let status = child.wait().await;
            sessions.lock().remove(&session);

            if !heard.is_empty() {
                let _ = sink.send(RecognitionEvent::Result {
                    transcript: heard.join(" "),
                    is_final: true,
                });
            } else if let Some(e) = read_error {
                let _ = sink.send(RecognitionEvent::Error(RecognitionErrorKind::Other(e)));
            } else if !stopped && !matches!(&status, Ok(s) if s.success()) {
                let _ = sink.send(RecognitionEvent::Error(RecognitionErrorKind::AudioCapture));
            } else {
                let _ = sink.send(RecognitionEvent::Error(RecognitionErrorKind::NoSpeech));
            }
            let _ = sink.send(RecognitionEvent::Ended);
        });

        Ok(())
    }

    fn stop(&self, session: SessionId) {
        if let Some(s) = self.sessions.lock().get(&session) {
            s.stop.cancel();
        }
    }

    fn abort(&self, session: SessionId) {
        if let Some(s) = self.sessions.lock().remove(&session) {
            s.abort.cancel();
        }
    }
}
