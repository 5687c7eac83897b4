//! Terminal session loop driving the controller and the voice adapters.

use crate::panels;
use rogue_mentor_core::{CallModeCoordinator, CallStatus, Rejected, SendOutcome};
use rogue_mentor_interfaces::{CaptureError, Interface, RecognitionEngine, SynthesisEngine};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Send(String),
    Mic,
    Speak,
    Stop,
    /// `None` reports the current setting.
    AutoSpeak(Option<bool>),
    Call,
    Archive,
    Purge,
    Intel(Option<usize>),
    Identity,
    Status,
    Help,
    Exit,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if matches!(line, "exit" | "quit") {
        return Command::Exit;
    }
    if !line.starts_with('/') {
        return Command::Send(line.to_string());
    }

    let mut words = line.split_whitespace();
    let name = words.next().unwrap_or_default();
    let arg = words.next();

    match (name, arg) {
        ("/mic", None) => Command::Mic,
        ("/speak", None) => Command::Speak,
        ("/stop", None) => Command::Stop,
        ("/autospeak", None) => Command::AutoSpeak(None),
        ("/autospeak", Some("on")) => Command::AutoSpeak(Some(true)),
        ("/autospeak", Some("off")) => Command::AutoSpeak(Some(false)),
        ("/call", None) => Command::Call,
        ("/archive", None) => Command::Archive,
        ("/purge", None) => Command::Purge,
        ("/intel", None) => Command::Intel(None),
        ("/intel", Some(n)) => match n.parse() {
            Ok(n) => Command::Intel(Some(n)),
            Err(_) => Command::Unknown(line.to_string()),
        },
        ("/identity", None) => Command::Identity,
        ("/status", None) => Command::Status,
        ("/help", None) => Command::Help,
        ("/exit" | "/quit", None) => Command::Exit,
        _ => Command::Unknown(line.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

pub struct Repl<R, S, I> {
    coordinator: Arc<CallModeCoordinator<R, S>>,
    interface: Arc<I>,
    uplink: String,
}

impl<R, S, I> Repl<R, S, I>
where
    R: RecognitionEngine + 'static,
    S: SynthesisEngine + 'static,
    I: Interface + 'static,
{
    /// `uplink` describes the completion backend for `/status`.
    pub fn new(
        coordinator: Arc<CallModeCoordinator<R, S>>,
        interface: Arc<I>,
        uplink: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            interface,
            uplink: uplink.into(),
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        self.banner().await;

        loop {
            let Some(line) = self.interface.receive_input().await else {
                break;
            };
            if self.handle(parse_command(&line)).await == Flow::Exit {
                break;
            }
        }

        self.coordinator.stop();
        self.interface.send_output("👋 Signing off, Operator.").await;
        Ok(())
    }

    async fn banner(&self) {
        self.interface
            .send_output("╔══════════════════════════════════════════════════════════════════╗")
            .await;
        self.interface
            .send_output("║                         ROGUE MENTOR                             ║")
            .await;
        self.interface
            .send_output("║  Type a message, /help for commands, exit to quit                ║")
            .await;
        self.interface
            .send_output("╚══════════════════════════════════════════════════════════════════╝")
            .await;

        let messages = self.coordinator.controller().messages();
        for message in panels::recent(&messages, panels::RECENT_MESSAGES) {
            self.interface
                .send_output(&panels::format_message(message))
                .await;
        }
    }

    async fn handle(&self, command: Command) -> Flow {
        match command {
            Command::Empty => {}
            Command::Send(text) => self.exchange(&text).await,
            Command::Mic => self.voice_input().await,
            Command::Speak => self.speak_last().await,
            Command::Stop => {
                self.coordinator.stop();
                self.interface.show_status("Audio stopped.").await;
            }
            Command::AutoSpeak(setting) => self.auto_speak(setting).await,
            Command::Call => self.call_mode().await,
            Command::Archive => {
                let snapshot = self.coordinator.controller().snapshot();
                self.interface.send_output(&panels::archive(&snapshot)).await;
            }
            Command::Purge => self.purge().await,
            Command::Intel(None) => self.interface.send_output(&panels::intel()).await,
            Command::Intel(Some(number)) => match panels::sample_prompt(number) {
                Some(prompt) => {
                    self.interface.send_output(&format!("OP ▸ {}", prompt)).await;
                    self.exchange(prompt).await;
                }
                None => {
                    self.interface
                        .show_status(&format!(
                            "No intel entry {}. Choose 1-{}.",
                            number,
                            panels::SAMPLE_PROMPTS.len()
                        ))
                        .await
                }
            },
            Command::Identity => self.interface.send_output(&panels::identity()).await,
            Command::Status => self.status().await,
            Command::Help => self.interface.send_output(&self.help()).await,
            Command::Exit => return Flow::Exit,
            Command::Unknown(line) => {
                self.interface
                    .show_status(&format!("Unknown command: {}. Type /help.", line))
                    .await
            }
        }
        Flow::Continue
    }

    async fn exchange(&self, text: &str) {
        exchange(&self.coordinator, &self.interface, text).await;
    }

    fn speak_in_background(&self, text: String) {
        let coordinator = Arc::clone(&self.coordinator);
        tokio::spawn(async move {
            coordinator.speak_response(&text).await;
        });
    }

    async fn voice_input(&self) {
        if !self.coordinator.capture().is_supported() {
            self.voice_unavailable().await;
            return;
        }

        self.interface
            .show_status(CallStatus::Listening.status_text())
            .await;
        match self.coordinator.capture_transcript().await {
            Ok(Some(transcript)) => {
                self.interface.send_output(&format!("OP ▸ {}", transcript)).await;
                self.exchange(&transcript).await;
            }
            Ok(None) => {
                let cause = self
                    .coordinator
                    .capture()
                    .last_error()
                    .map(|e| format!(" ({:?})", e))
                    .unwrap_or_default();
                self.interface
                    .show_status(&format!("No transcript captured{}.", cause))
                    .await;
            }
            Err(CaptureError::PermissionDenied) => {
                self.interface
                    .show_status("Microphone access denied. Voice input is locked.")
                    .await
            }
            Err(e) => self.interface.show_status(&format!("Voice input failed: {}", e)).await,
        }
    }

    async fn voice_unavailable(&self) {
        self.interface
            .show_status("Voice input is not available. Set [speech] recognizer in config.toml.")
            .await;
    }

    async fn speak_last(&self) {
        if !self.coordinator.playback().is_supported() {
            self.interface
                .show_status("Speech synthesis is not available on this system.")
                .await;
            return;
        }
        match self.coordinator.controller().last_response() {
            Some(reply) => self.speak_in_background(reply),
            None => self.interface.show_status("No transmission to read.").await,
        }
    }

    async fn auto_speak(&self, setting: Option<bool>) {
        match setting {
            Some(true) if !self.coordinator.playback().is_supported() => {
                self.interface
                    .show_status("Speech synthesis is not available on this system.")
                    .await;
            }
            Some(enabled) => {
                self.coordinator.set_auto_speak(enabled);
                self.interface
                    .show_status(&format!("Auto-speak {}.", on_off(enabled)))
                    .await;
            }
            None => {
                self.interface
                    .show_status(&format!("Auto-speak is {}.", on_off(self.coordinator.auto_speak())))
                    .await;
            }
        }
    }

    async fn purge(&self) {
        let controller = self.coordinator.controller();
        if controller.messages().is_empty() {
            self.interface.show_status("Archive is already empty.").await;
            return;
        }
        if self
            .interface
            .confirm("Purge the entire mission archive and reset progress?")
            .await
        {
            self.coordinator.stop();
            controller.clear_history().await;
            self.interface.show_status("ARCHIVE PURGED.").await;
        } else {
            self.interface.show_status("Purge cancelled.").await;
        }
    }

    /// Keys are read while a turn listens, thinks or speaks, so `s` and
    /// `q` cut playback short.
    async fn call_mode(&self) {
        if !self.coordinator.capture().is_supported() {
            self.voice_unavailable().await;
            return;
        }

        self.interface
            .send_output("═══ CALL MODE ═══  Enter = tap mic, s = stop, a = auto-speak, q = hang up")
            .await;
        self.interface
            .show_status(self.coordinator.status().status_text())
            .await;

        let watcher = {
            let mut status = self.coordinator.subscribe();
            let interface = Arc::clone(&self.interface);
            tokio::spawn(async move {
                while status.changed().await.is_ok() {
                    let current = *status.borrow_and_update();
                    interface.show_status(current.status_text()).await;
                }
            })
        };

        let mut turns: Vec<JoinHandle<()>> = Vec::new();
        while let Some(line) = self.interface.receive_input().await {
            turns.retain(|turn| !turn.is_finished());
            match line.trim().to_ascii_lowercase().as_str() {
                "" => {
                    let coordinator = Arc::clone(&self.coordinator);
                    let interface = Arc::clone(&self.interface);
                    turns.push(tokio::spawn(call_turn(coordinator, interface)));
                }
                "s" => {
                    self.coordinator.stop();
                    self.interface.show_status("Audio stopped.").await;
                }
                "a" => self.auto_speak(Some(!self.coordinator.auto_speak())).await,
                "q" => break,
                other => {
                    self.interface
                        .show_status(&format!("Unknown key '{}'. Enter, s, a or q.", other))
                        .await
                }
            }
        }

        self.coordinator.stop();
        for turn in turns {
            if let Err(e) = turn.await {
                warn!("Call turn ended abnormally: {}", e);
            }
        }
        // A turn still thinking at hang-up may have started speaking since.
        self.coordinator.stop();
        watcher.abort();
        self.interface.send_output("Call ended.").await;
    }

    async fn status(&self) {
        let controller = self.coordinator.controller();
        let state = controller.snapshot();
        let metrics = controller.metrics().snapshot();

        let lines = [
            "📊 Status:".to_string(),
            format!("  Uplink: {}", self.uplink),
            format!("  Transmissions: {}", state.messages.len()),
            format!(
                "  XP: {}%  LEVEL {}  Missions: {}/{}",
                state.xp,
                state.level(),
                state.missions_completed,
                state.total_missions
            ),
            format!("  Busy: {}", controller.is_busy()),
            format!("  Call: {}", self.coordinator.status()),
            format!(
                "  Voice input: {}",
                available(self.coordinator.capture().is_supported())
            ),
            format!(
                "  Voice output: {}",
                available(self.coordinator.playback().is_supported())
            ),
            format!("  Auto-speak: {}", on_off(self.coordinator.auto_speak())),
            format!(
                "  Exchanges: {} ({:.0}% ok), rejected sends: {}",
                metrics.exchanges,
                metrics.exchange_success_rate() * 100.0,
                metrics.rejected_sends
            ),
            format!(
                "  Utterances: {}, cancelled: {}",
                metrics.utterances, metrics.playback_cancellations
            ),
        ];
        self.interface.send_output(&lines.join("\n")).await;
    }

    fn help(&self) -> String {
        let voice_in = self.coordinator.capture().is_supported();
        let voice_out = self.coordinator.playback().is_supported();

        let mut lines = vec!["📖 Commands:"];
        if voice_in {
            lines.push("  /mic             Speak one message");
            lines.push("  /call            Call mode (Enter tap, s stop, a auto-speak, q hang up)");
        }
        if voice_out {
            lines.push("  /speak           Read the last response aloud");
            lines.push("  /stop            Stop audio");
            lines.push("  /autospeak on|off  Read every response aloud");
        }
        lines.extend([
            "  /archive         Mission archive and progress",
            "  /purge           Purge the archive",
            "  /intel [n]       Field manual, or deploy query n",
            "  /identity        Identity protocols",
            "  /status          Session status",
            "  /help            This list",
            "  exit             Quit",
        ]);
        lines.join("\n")
    }
}

/// Send `text`, print the result and hand a speakable reply to playback
/// without holding up the prompt.
async fn exchange<R, S, I>(
    coordinator: &Arc<CallModeCoordinator<R, S>>,
    interface: &Arc<I>,
    text: &str,
) where
    R: RecognitionEngine + 'static,
    S: SynthesisEngine + 'static,
    I: Interface + 'static,
{
    interface
        .show_status(CallStatus::Processing.status_text())
        .await;

    let outcome = coordinator.submit(text).await;
    match &outcome {
        SendOutcome::Replied(message) | SendOutcome::Failed(message) => {
            interface.send_output(&panels::format_message(message)).await
        }
        SendOutcome::Ignored(Rejected::Busy) => {
            interface
                .show_status("Transmission already in progress, stand by.")
                .await
        }
        SendOutcome::Ignored(Rejected::Empty) => {}
    }

    if coordinator.will_speak(&outcome) {
        let coordinator = Arc::clone(coordinator);
        tokio::spawn(async move {
            coordinator.deliver(&outcome).await;
        });
    } else {
        coordinator.deliver(&outcome).await;
    }
}

/// One call-mode tap: listen, send, print, then speak the reply.
async fn call_turn<R, S, I>(coordinator: Arc<CallModeCoordinator<R, S>>, interface: Arc<I>)
where
    R: RecognitionEngine + 'static,
    S: SynthesisEngine + 'static,
    I: Interface + 'static,
{
    let transcript = match coordinator.capture_transcript().await {
        Ok(Some(transcript)) => transcript,
        Ok(None) => {
            interface.show_status("Nothing captured.").await;
            return;
        }
        Err(e) => {
            interface.show_status(&format!("Voice input failed: {}", e)).await;
            return;
        }
    };

    interface.send_output(&format!("OP ▸ {}", transcript)).await;
    let outcome = coordinator.submit(&transcript).await;
    if let Some(reply) = outcome.message() {
        interface.send_output(&panels::format_message(reply)).await;
    }
    coordinator.deliver(&outcome).await;
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn available(supported: bool) -> &'static str {
    if supported {
        "available"
    } else {
        "unavailable"
    }
}
