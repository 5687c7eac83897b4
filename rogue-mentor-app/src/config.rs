use anyhow::{bail, Context, Result};
use rogue_mentor_memory::DEFAULT_STATE_KEY;
use rogue_mentor_providers::gemini::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides the data directory holding `config.toml` and the state.
pub const HOME_ENV: &str = "ROGUE_MENTOR_HOME";
/// Overrides `api_base_url`, mostly for pointing at a local stub.
pub const API_BASE_ENV: &str = "ROGUE_MENTOR_API_BASE";

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_dir: PathBuf,
    pub storage_key: String,
    pub locale: String,
    pub auto_speak: bool,
    pub api_base_url: String,
    pub speech: SpeechSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// espeak-ng compatible synthesizer looked up on `PATH`.
    pub synthesizer: String,
    /// Capture command printing one transcript to stdout. Voice input is
    /// disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recognizer: Option<String>,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            synthesizer: "espeak-ng".to_string(),
            recognizer: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_home(&home_dir())
    }
}

/// `$ROGUE_MENTOR_HOME`, else `<data dir>/rogue-mentor`.
pub fn home_dir() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    dirs::data_dir()
        .map(|dir| dir.join("rogue-mentor"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

impl Config {
    pub fn with_home(home: &Path) -> Self {
        Self {
            storage_dir: home.join("state"),
            storage_key: DEFAULT_STATE_KEY.to_string(),
            locale: "en-US".to_string(),
            auto_speak: false,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            speech: SpeechSettings::default(),
        }
    }

    pub fn path() -> PathBuf {
        home_dir().join(CONFIG_FILE)
    }

    pub fn exists() -> bool {
        Self::path().exists()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Load the config, writing defaults on first run.
    pub fn load_or_create() -> Result<Self> {
        if Self::exists() {
            return Self::load();
        }
        let config = Self::default();
        config.save()?;
        tracing::info!("Wrote default configuration to {}", Self::path().display());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn delete() -> Result<()> {
        let path = Self::path();
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage_key.trim().is_empty() {
            bail!("storage_key must not be empty");
        }
        if self.locale.trim().is_empty() {
            bail!("locale must not be empty");
        }
        let base = self.api_base_url();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            bail!("api_base_url must be an http(s) URL, got '{}'", base);
        }
        Ok(())
    }

    pub fn api_base_url(&self) -> String {
        std::env::var(API_BASE_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.api_base_url.clone())
    }
}
