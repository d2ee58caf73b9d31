use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, Context};
use log::{info, warn, error};

use crate::audio::{AudioConfigRequest, DEFAULT_BIT_RATE, DEFAULT_SAMPLE_RATE};
use crate::error::ConfigError;

/// Persistent session settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub audio: AudioSettings,
    pub capture: CaptureSettings,
    pub playback: PlaybackSettings,
    pub security: SecuritySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: u32,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Attach noise suppression and gain control on start
    pub magic_mic: bool,
    pub realtime_priority: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Generate a key at startup; off means plaintext until a key is set
    pub encryption_enabled: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            bit_rate: DEFAULT_BIT_RATE,
            input_device: None,
            output_device: None,
        }
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            encryption_enabled: true,
        }
    }
}

impl Settings {
    pub fn audio_request(&self) -> AudioConfigRequest {
        AudioConfigRequest {
            sample_rate: Some(self.audio.sample_rate),
            channels: Some(self.audio.channels),
            bit_rate: Some(self.audio.bit_rate),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Load from the platform config directory, creating defaults if absent
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    pub fn with_path(config_path: PathBuf) -> Result<Self> {
        let settings = Self::load_or_create(&config_path)?;
        Ok(Self {
            config_path,
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn update(&mut self, settings: Settings) -> Result<()> {
        self.settings = settings;
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        Self::save_to_path(&self.settings, &self.config_path)
    }

    fn load_or_create(config_path: &Path) -> Result<Settings> {
        if !config_path.exists() {
            info!("No configuration file found. Creating default configuration.");
            let defaults = Settings::default();
            Self::save_to_path(&defaults, config_path)?;
            return Ok(defaults);
        }

        info!("Loading configuration from: {:?}", config_path);
        let text = fs::read_to_string(config_path)
            .context("Failed to read configuration file")?;

        match Settings::from_toml(&text) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!("Failed to parse configuration file: {}. Using defaults.", e);
                let defaults = Settings::default();
                if let Err(save_err) = Self::save_to_path(&defaults, config_path) {
                    error!("Failed to save default configuration: {}", save_err);
                }
                Ok(defaults)
            }
        }
    }

    fn save_to_path(settings: &Settings, path: &Path) -> Result<()> {
        let text = settings.to_toml()
            .context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        fs::write(path, text)
            .context("Failed to write configuration file")?;

        info!("Configuration saved to: {:?}", path);
        Ok(())
    }

    fn default_config_path() -> Result<PathBuf> {
        let config_dir = if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("voxseal")
        } else {
            let home_dir = dirs::home_dir()
                .context("Could not determine home directory")?;
            home_dir.join(".voxseal")
        };

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("voxseal-test-{}", uuid::Uuid::new_v4()))
            .join("config.toml")
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.audio.sample_rate, 48000);
        assert_eq!(settings.audio.channels, 1);
        assert!(settings.security.encryption_enabled);
        assert!(!settings.capture.magic_mic);
        assert!(settings.playback.enabled);
    }

    #[test]
    fn test_settings_serialization() {
        let mut settings = Settings::default();
        settings.audio.sample_rate = 16000;
        settings.capture.magic_mic = true;

        let text = settings.to_toml().unwrap();
        let parsed = Settings::from_toml(&text).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed = Settings::from_toml("[capture]\nmagic_mic = true\n").unwrap();
        assert!(parsed.capture.magic_mic);
        assert_eq!(parsed.audio.sample_rate, 48000);
        assert!(parsed.security.encryption_enabled);
    }

    #[test]
    fn test_audio_request_conversion() {
        let mut settings = Settings::default();
        settings.audio.channels = 2;
        let config = settings.audio_request().resolve().unwrap();
        assert_eq!(config.channel_count(), 2);
        assert_eq!(config.bit_rate(), 64000);
    }

    #[test]
    fn test_manager_creates_and_reloads() {
        let path = temp_config_path();
        let mut manager = ConfigManager::with_path(path.clone()).unwrap();
        assert!(path.exists());
        assert_eq!(manager.settings(), &Settings::default());

        let mut settings = Settings::default();
        settings.audio.sample_rate = 16000;
        manager.update(settings.clone()).unwrap();

        let reloaded = ConfigManager::with_path(path.clone()).unwrap();
        assert_eq!(reloaded.settings(), &settings);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let path = temp_config_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "this is [not toml").unwrap();

        let manager = ConfigManager::with_path(path.clone()).unwrap();
        assert_eq!(manager.settings(), &Settings::default());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
