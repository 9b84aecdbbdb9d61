use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Provider {
    #[serde(rename = "OpenAI")]
    #[value(name = "openai")]
    OpenAi,
    Gemini,
    Claude,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "OpenAI"),
            Self::Gemini => write!(f, "Gemini"),
            Self::Claude => write!(f, "Claude"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub provider: Provider,
    pub model: String,
    pub temperature: f32,
    pub api_base: String,
    pub request_timeout_secs: u64,
    pub pacing_ms: u64,
    pub archive_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            api_base: "https://api.openai.com/v1".to_string(),
            request_timeout_secs: 60,
            pacing_ms: 50,
            archive_name: "renamed_files.zip".to_string(),
        }
    }
}

impl Settings {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// API key handed to the naming service. Only checked for presence.
#[derive(Clone, Default)]
pub struct Credential(Option<String>);

impl Credential {
    pub fn new(key: Option<String>) -> Self {
        Self(key.filter(|k| !k.trim().is_empty()))
    }

    pub fn is_usable(&self) -> bool {
        self.0.is_some()
    }

    pub fn secret(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(_) => write!(f, "Credential(***)"),
            None => write!(f, "Credential(none)"),
        }
    }
}

pub fn settings_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "structor", "structor")
        .map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
}

pub fn load_settings() -> Result<Settings, AppError> {
    match settings_path() {
        Some(path) => load_settings_from(&path),
        None => Ok(Settings::default()),
    }
}

pub fn load_settings_from(path: &Path) -> Result<Settings, AppError> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}
