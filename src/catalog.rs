//! # Format Catalog Module
//!
//! Catalogo in sola lettura costruito una volta all'avvio dalla `Config`.
//!
//! ## Contenuto:
//! - Matrice di compatibilità: estensione input -> estensioni output ammesse
//!   (ogni input ammette sempre se stesso)
//! - Insiemi di estensioni video e audio (disgiunti)
//! - Preset di qualità: profilo di velocità dell'encoder + CRF (0-51)
//!
//! Tutte le estensioni sono minuscole e con il punto iniziale; i chiamanti
//! normalizzano con `normalize_extension` prima di ogni lookup.

use crate::config::{Config, DEFAULT_PRESET, MAX_CRF};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

/// Encoder speed/compression tradeoff passed as `-preset`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderSpeed {
    Veryfast,
    Fast,
    Medium,
    Slow,
    Veryslow,
}

impl EncoderSpeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Veryfast => "veryfast",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Veryslow => "veryslow",
        }
    }
}

impl fmt::Display for EncoderSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved quality preset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityPreset {
    pub name: String,
    pub speed: EncoderSpeed,
    /// Constant rate factor, lower = better quality and bigger files
    pub crf: u8,
}

/// Lower-case an extension and make sure it starts with a dot
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

/// Normalized extension of a path, if it has one
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(normalize_extension)
}

/// Read-only format tables shared by every conversion
#[derive(Debug, Clone)]
pub struct FormatCatalog {
    allowed_outputs: HashMap<String, BTreeSet<String>>,
    video_extensions: BTreeSet<String>,
    audio_extensions: BTreeSet<String>,
    quality_presets: HashMap<String, QualityPreset>,
    default_preset: QualityPreset,
}

impl FormatCatalog {
    /// Build the catalog from a validated configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let mut allowed_outputs: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (input, outputs) in &config.allowed_outputs {
            let input = normalize_extension(input);
            let targets = allowed_outputs.entry(input.clone()).or_default();
            targets.extend(outputs.iter().map(|o| normalize_extension(o)));
            targets.insert(input);
        }

        let quality_presets: HashMap<String, QualityPreset> = config
            .quality_presets
            .iter()
            .map(|(name, preset)| {
                (
                    name.clone(),
                    QualityPreset {
                        name: name.clone(),
                        speed: preset.encoder_speed_profile,
                        crf: preset.crf.min(MAX_CRF),
                    },
                )
            })
            .collect();

        let default_preset = quality_presets
            .get(DEFAULT_PRESET)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Missing {:?} quality preset", DEFAULT_PRESET))?;

        Ok(Self {
            allowed_outputs,
            video_extensions: config.video_extensions.iter().map(|e| normalize_extension(e)).collect(),
            audio_extensions: config.audio_extensions.iter().map(|e| normalize_extension(e)).collect(),
            quality_presets,
            default_preset,
        })
    }

    /// Whether the input extension is registered at all
    pub fn contains(&self, ext: &str) -> bool {
        self.allowed_outputs.contains_key(ext)
    }

    /// Registered input extensions, sorted
    pub fn input_formats(&self) -> Vec<&str> {
        let mut inputs: Vec<&str> = self.allowed_outputs.keys().map(String::as_str).collect();
        inputs.sort_unstable();
        inputs
    }

    /// Allowed targets for an input extension
    pub fn allowed_outputs(&self, ext: &str) -> Option<&BTreeSet<String>> {
        self.allowed_outputs.get(ext)
    }

    /// Whether `input -> output` is in the compatibility matrix
    pub fn allows(&self, input: &str, output: &str) -> bool {
        self.allowed_outputs
            .get(input)
            .map(|targets| targets.contains(output))
            .unwrap_or(false)
    }

    pub fn is_video(&self, ext: &str) -> bool {
        self.video_extensions.contains(ext)
    }

    pub fn is_audio(&self, ext: &str) -> bool {
        self.audio_extensions.contains(ext)
    }

    pub fn is_media(&self, ext: &str) -> bool {
        self.is_video(ext) || self.is_audio(ext)
    }

    /// Resolve a preset by name; absent or unknown names fall back to "Medium"
    pub fn resolve_preset(&self, name: Option<&str>) -> &QualityPreset {
        name.and_then(|n| self.quality_presets.get(n))
            .unwrap_or(&self.default_preset)
    }

    /// Preset names, lowest quality first
    pub fn preset_names(&self) -> Vec<&str> {
        let mut presets: Vec<&QualityPreset> = self.quality_presets.values().collect();
        presets.sort_by(|a, b| b.crf.cmp(&a.crf).then_with(|| a.name.cmp(&b.name)));
        presets.into_iter().map(|p| p.name.as_str()).collect()
    }
}

impl Default for FormatCatalog {
    fn default() -> Self {
        // The built-in config always validates
        Self::from_config(&Config::default()).expect("built-in catalog is consistent")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("MP4"), ".mp4");
        assert_eq!(normalize_extension(".PnG"), ".png");
        assert_eq!(normalize_extension(" .txt "), ".txt");
        assert_eq!(extension_of(&PathBuf::from("/a/b/Clip.MKV")), Some(".mkv".to_string()));
        assert_eq!(extension_of(&PathBuf::from("/a/b/README")), None);
    }

    #[test]
    fn test_every_input_allows_itself() {
        let mut config = Config::default();
        config.allowed_outputs.insert("GIF".to_string(), vec![".png".to_string()]);
        let catalog = FormatCatalog::from_config(&config).unwrap();

        assert!(catalog.allows(".gif", ".gif"));
        assert!(catalog.allows(".gif", ".png"));
        assert!(catalog.allows(".mkv", ".mkv"));
        assert!(!catalog.allows(".mp3", ".mp4"));
        assert!(!catalog.allows(".xyz", ".xyz"));
    }

    #[test]
    fn test_media_sets() {
        let catalog = FormatCatalog::default();
        assert!(catalog.is_video(".mp4"));
        assert!(catalog.is_audio(".wav"));
        assert!(!catalog.is_media(".png"));
    }

    #[test]
    fn test_preset_fallback_to_medium() {
        let catalog = FormatCatalog::default();

        let high = catalog.resolve_preset(Some("High"));
        assert_eq!((high.speed, high.crf), (EncoderSpeed::Slow, 18));

        for name in [None, Some("Ultra"), Some("")] {
            let preset = catalog.resolve_preset(name);
            assert_eq!(preset.name, "Medium");
            assert_eq!((preset.speed, preset.crf), (EncoderSpeed::Medium, 23));
        }
    }

    #[test]
    fn test_preset_names_order() {
        let catalog = FormatCatalog::default();
        assert_eq!(catalog.preset_names(), vec!["Low", "Medium", "High", "Very High"]);
    }
}
