//! # Configuration Management Module
//!
//! Questo modulo gestisce il file di configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` (matrice di compatibilità, preset, estensioni)
//! - Definisce `TranscoderConfig` con le impostazioni del processo esterno
//! - Carica/salva la configurazione da/verso file JSON
//! - Valida la coerenza interna prima di costruire il `FormatCatalog`
//!
//! ## Ordine di ricerca (`Config::load`):
//! 1. Path esplicito (`--config`): se manca o è malformato l'avvio fallisce
//! 2. `./config.json`
//! 3. `<config dir utente>/file-converter/config.json`
//! 4. Catalogo di default incorporato
//!
//! Le chiavi PascalCase del vecchio formato (`AllowedFormats`, `VideoFormats`,
//! `QualityPresets`, `Preset`, `Crf`) sono accettate come alias.

use crate::catalog::{normalize_extension, EncoderSpeed};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name looked up in the working directory and the user config directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Preset name used whenever a request names no preset or an unknown one
pub const DEFAULT_PRESET: &str = "Medium";

/// Highest constant-rate-factor accepted by the encoder
pub const MAX_CRF: u8 = 51;

/// Configuration consumed at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Input extension -> allowed output extensions
    #[serde(alias = "AllowedFormats")]
    pub allowed_outputs: BTreeMap<String, Vec<String>>,
    /// Preset name -> encoder speed profile and CRF
    #[serde(alias = "QualityPresets")]
    pub quality_presets: BTreeMap<String, PresetConfig>,
    /// Extensions handled as video
    #[serde(alias = "VideoFormats")]
    pub video_extensions: Vec<String>,
    /// Extensions handled as audio
    #[serde(alias = "AudioFormats", default)]
    pub audio_extensions: Vec<String>,
    /// External transcoder settings
    #[serde(default)]
    pub transcoder: TranscoderConfig,
}

/// One entry of the quality preset table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetConfig {
    #[serde(alias = "Preset", alias = "preset")]
    pub encoder_speed_profile: EncoderSpeed,
    #[serde(alias = "Crf")]
    pub crf: u8,
}

/// Settings for the external transcoding process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscoderConfig {
    /// Explicit encoder binary; relative paths are resolved against the executable directory
    pub program: Option<PathBuf>,
    /// Video codec used for video -> video transcodes
    pub video_codec: String,
    /// Kill the encoder after this many seconds (None = wait forever)
    pub timeout_secs: Option<u64>,
    /// Leave a partially written destination on disk after a failure
    pub keep_partial_output: bool,
    /// Number of trailing stderr lines kept for error messages
    pub diagnostic_lines: usize,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: None,
            video_codec: "libx264".to_string(),
            timeout_secs: None,
            keep_partial_output: false,
            diagnostic_lines: 32,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        fn formats(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
            pairs
                .iter()
                .map(|(input, outputs)| {
                    (input.to_string(), outputs.iter().map(|o| o.to_string()).collect())
                })
                .collect()
        }

        let allowed_outputs = formats(&[
            (".docx", &[".pdf", ".txt", ".docx"]),
            (".txt", &[".pdf", ".docx", ".txt"]),
            (".pdf", &[".docx", ".txt", ".pdf"]),
            (".jpg", &[".png", ".bmp", ".gif", ".jpg"]),
            (".jpeg", &[".png", ".bmp", ".gif", ".jpeg"]),
            (".png", &[".jpg", ".bmp", ".gif", ".png"]),
            (".bmp", &[".jpg", ".png", ".gif", ".bmp"]),
            (".gif", &[".jpg", ".png", ".gif", ".bmp"]),
            (".mp3", &[".wav", ".mp3"]),
            (".wav", &[".mp3", ".wav"]),
            (".mp4", &[".mkv", ".mp4", ".mp3"]),
            (".mkv", &[".mp4", ".mkv", ".mp3"]),
        ]);

        let quality_presets = [
            ("Low", EncoderSpeed::Veryfast, 30),
            ("Medium", EncoderSpeed::Medium, 23),
            ("High", EncoderSpeed::Slow, 18),
            ("Very High", EncoderSpeed::Veryslow, 15),
        ]
        .into_iter()
        .map(|(name, encoder_speed_profile, crf)| {
            (name.to_string(), PresetConfig { encoder_speed_profile, crf })
        })
        .collect();

        Self {
            allowed_outputs,
            quality_presets,
            video_extensions: vec![".mp4".to_string(), ".mkv".to_string()],
            audio_extensions: vec![".mp3".to_string(), ".wav".to_string()],
            transcoder: TranscoderConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.allowed_outputs.is_empty() {
            return Err(anyhow::anyhow!("allowedOutputs must list at least one input format"));
        }

        for (input, outputs) in &self.allowed_outputs {
            if normalize_extension(input).len() < 2 {
                return Err(anyhow::anyhow!("Invalid input extension in allowedOutputs: {:?}", input));
            }
            if let Some(bad) = outputs.iter().find(|o| normalize_extension(o).len() < 2) {
                return Err(anyhow::anyhow!("Invalid output extension {:?} for {}", bad, input));
            }
        }

        for (name, preset) in &self.quality_presets {
            if preset.crf > MAX_CRF {
                return Err(anyhow::anyhow!(
                    "CRF for preset {:?} must be between 0 and {} (got {})",
                    name,
                    MAX_CRF,
                    preset.crf
                ));
            }
        }

        if !self.quality_presets.contains_key(DEFAULT_PRESET) {
            return Err(anyhow::anyhow!("qualityPresets must define a {:?} preset", DEFAULT_PRESET));
        }

        let video: BTreeSet<String> = self.video_extensions.iter().map(|e| normalize_extension(e)).collect();
        let audio: BTreeSet<String> = self.audio_extensions.iter().map(|e| normalize_extension(e)).collect();
        if let Some(shared) = video.intersection(&audio).next() {
            return Err(anyhow::anyhow!(
                "Extension {} is listed as both video and audio",
                shared
            ));
        }

        for ext in video.iter().chain(audio.iter()) {
            let known = self
                .allowed_outputs
                .keys()
                .any(|input| normalize_extension(input) == *ext);
            if !known {
                warn!("Media extension {} has no allowedOutputs entry and will be rejected", ext);
            }
        }

        if self.transcoder.video_codec.trim().is_empty() {
            return Err(anyhow::anyhow!("transcoder.videoCodec must not be empty"));
        }

        if self.transcoder.timeout_secs == Some(0) {
            return Err(anyhow::anyhow!("transcoder.timeoutSecs must be greater than 0"));
        }

        Ok(())
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Malformed config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Inconsistent config file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Resolve and load the configuration for this run
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            info!("Loading configuration from {}", path.display());
            return Self::from_file(path).await;
        }

        for candidate in Self::default_locations() {
            if candidate.is_file() {
                info!("Loading configuration from {}", candidate.display());
                return Self::from_file(&candidate).await;
            }
            debug!("No config at {}", candidate.display());
        }

        debug!("Using built-in format catalog");
        Ok(Self::default())
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            locations.push(dir.join("file-converter").join(CONFIG_FILE_NAME));
        }
        locations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.quality_presets.get_mut("High").unwrap().crf = 52;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.quality_presets.remove("Medium");
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.audio_extensions.push(".MKV".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.transcoder.timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.allowed_outputs.len(), 12);
        assert_eq!(config.allowed_outputs[".mp4"], vec![".mkv", ".mp4", ".mp3"]);
        assert_eq!(config.quality_presets["Low"].crf, 30);
        assert_eq!(config.quality_presets["Very High"].encoder_speed_profile, EncoderSpeed::Veryslow);
        assert_eq!(config.transcoder.video_codec, "libx264");
        assert!(config.transcoder.timeout_secs.is_none());
    }

    #[test]
    fn test_legacy_pascal_case_keys() {
        let json = r#"{
            "AllowedFormats": { ".MP4": [".mkv"], ".mkv": [".mp4"] },
            "QualityPresets": { "Medium": { "Preset": "medium", "Crf": 23 } },
            "VideoFormats": [".mp4", ".mkv"]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.audio_extensions.is_empty());
        assert_eq!(config.quality_presets["Medium"].crf, 23);
        assert_eq!(config.transcoder, TranscoderConfig::default());
    }

    #[test]
    fn test_unknown_speed_profile_is_rejected() {
        let json = r#"{
            "allowedOutputs": { ".mp4": [".mkv"] },
            "qualityPresets": { "Medium": { "encoderSpeedProfile": "ludicrous", "crf": 23 } },
            "videoExtensions": [".mp4"]
        }"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let mut original = Config::default();
        original.transcoder.timeout_secs = Some(90);
        original.transcoder.program = Some(PathBuf::from("bin/ffmpeg"));
        original.save_to_file(&config_path).await.unwrap();

        let loaded = Config::load(Some(&config_path)).await.unwrap();
        assert_eq!(loaded.transcoder.timeout_secs, Some(90));
        assert_eq!(loaded.transcoder.program, Some(PathBuf::from("bin/ffmpeg")));
        assert_eq!(loaded.allowed_outputs, original.allowed_outputs);
    }

    #[tokio::test]
    async fn test_explicit_missing_or_malformed_file_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.json");
        tokio_test::assert_err!(Config::load(Some(&missing)).await);

        let broken = temp_dir.path().join("broken.json");
        tokio::fs::write(&broken, "{ not json").await.unwrap();
        tokio_test::assert_err!(Config::load(Some(&broken)).await);
    }
}
