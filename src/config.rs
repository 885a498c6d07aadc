//! Configuration loading and saving.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Gemini API key. Overridden by the GEMINI_API_KEY env variable.
    #[serde(default)]
    pub gemini_api_key: String,
    /// Default source language (ISO 639-1).
    #[serde(default = "default_source_lang")]
    pub source_lang: String,
    /// Default target language (ISO 639-1).
    #[serde(default = "default_target_lang")]
    pub target_lang: String,
    /// Synthesized voice for model speech.
    #[serde(default = "default_voice")]
    pub voice_name: String,
}

fn default_source_lang() -> String {
    "en".to_string()
}

fn default_target_lang() -> String {
    "es".to_string()
}

fn default_voice() -> String {
    "Aoede".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            source_lang: default_source_lang(),
            target_lang: default_target_lang(),
            voice_name: default_voice(),
        }
    }
}

/// Get the config file path
pub fn get_config_path() -> PathBuf {
    let config_dir = dirs::config_dir().unwrap_or_default().join("voicebridge");
    let _ = std::fs::create_dir_all(&config_dir);
    config_dir.join("config.json")
}

/// Load config from disk, falling back to defaults on any failure
pub fn load_config() -> Config {
    let path = get_config_path();

    if !path.exists() {
        return Config::default();
    }

    let data = match std::fs::read_to_string(&path) {
        Ok(d) => d,
        Err(_) => return Config::default(),
    };

    match serde_json::from_str(&data) {
        Ok(c) => c,
        Err(_) => Config::default(),
    }
}

/// Save config to disk
pub fn save_config(config: &Config) {
    let path = get_config_path();
    if let Ok(json) = serde_json::to_string_pretty(config) {
        if let Err(e) = std::fs::write(&path, json) {
            eprintln!("[Config] Failed to save config: {}", e);
        }
    }
}

/// Resolve the API key: env variable wins over the config file.
pub fn resolve_api_key(config: &Config) -> String {
    std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| config.gemini_api_key.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fills_missing_fields() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.source_lang, "en");
        assert_eq!(config.target_lang, "es");
        assert_eq!(config.voice_name, "Aoede");
        assert!(config.gemini_api_key.is_empty());
    }

    #[test]
    fn roundtrips_through_json() {
        let mut config = Config::default();
        config.gemini_api_key = "key".to_string();
        config.target_lang = "ja".to_string();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.gemini_api_key, "key");
        assert_eq!(back.target_lang, "ja");
    }
}
