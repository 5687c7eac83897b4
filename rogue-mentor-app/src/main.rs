use anyhow::{Context, Result};
use rogue_mentor_app::config::Config;
use rogue_mentor_app::repl::Repl;
use rogue_mentor_core::{CallModeCoordinator, ConversationController};
use rogue_mentor_interfaces::{
    CommandRecognizer, CommandSynthesizer, RecognitionConfig, SpeechCapture, SpeechPlayback,
    TerminalInterface,
};
use rogue_mentor_memory::FileStateStore;
use rogue_mentor_providers::{ApiKey, GeminiBackend, WaterfallClient, API_KEY_ENV};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the REPL.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rogue_mentor=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && args[1] == "config" && args.get(2).map(|s| s.as_str()) == Some("reset") {
        return handle_config_reset();
    }

    let config = match Config::load_or_create().and_then(|cfg| cfg.validate().map(|_| cfg)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {:#}", e);
            eprintln!("💡 Tip: Run 'rogue-mentor config reset' to restore defaults");
            return Err(e);
        }
    };

    let store = Arc::new(FileStateStore::new(&config.storage_dir, &config.storage_key));
    store
        .initialize()
        .await
        .with_context(|| format!("Failed to prepare {}", config.storage_dir.display()))?;

    let api_key = ApiKey::from_env();
    if api_key.is_none() {
        eprintln!("⚠️  {} is not set; replies will be a diagnostic notice", API_KEY_ENV);
    }
    let client = WaterfallClient::new(Arc::new(GeminiBackend::new(config.api_base_url())), api_key);
    let uplink = format!(
        "{} via {} [{}], key {}",
        client.backend_name(),
        config.api_base_url(),
        client.models().join(" → "),
        if client.is_configured() { "configured" } else { "missing" }
    );

    let controller = Arc::new(ConversationController::load(Arc::new(client), store).await);

    let recognition = RecognitionConfig {
        lang: config.locale.clone(),
        ..RecognitionConfig::default()
    };
    let capture = SpeechCapture::with_config(
        CommandRecognizer::detect(config.speech.recognizer.as_deref()),
        recognition,
    );
    let playback = SpeechPlayback::new(
        CommandSynthesizer::detect(&config.speech.synthesizer),
        config.locale.clone(),
    );
    let auto_speak = config.auto_speak && playback.is_supported();

    let coordinator = Arc::new(CallModeCoordinator::new(
        controller,
        Arc::new(capture),
        Arc::new(playback),
        auto_speak,
    ));

    let repl = Repl::new(coordinator, Arc::new(TerminalInterface::default()), uplink);
    repl.run().await
}

fn handle_config_reset() -> Result<()> {
    println!("Resetting configuration...");
    Config::delete()?;
    let config = Config::default();
    config.save()?;
    println!("✅ Defaults written to {}", Config::path().display());
    Ok(())
}
