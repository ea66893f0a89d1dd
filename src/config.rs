use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use bandscope::audio::smoothing::SmoothingFactors;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub performance: PerformanceSection,
    #[serde(default)]
    pub equalizer: EqualizerSection,
    #[serde(default)]
    pub smoothing: SmoothingFactors,
}

#[derive(Debug, Deserialize)]
pub struct PerformanceSection {
    #[serde(default = "default_mode")]
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct EqualizerSection {
    #[serde(default = "default_hardware_bands")]
    pub hardware_bands: usize,
    /// Band index (as a string key) to level in millibels
    #[serde(default)]
    pub levels: HashMap<String, i32>,
    #[serde(default)]
    pub treble: Option<i32>,
    #[serde(default)]
    pub bass_boost: i32,
    #[serde(default)]
    pub virtualizer: i32,
    #[serde(default)]
    pub reverb: i32,
}

impl Default for PerformanceSection {
    fn default() -> Self {
        Self {
            mode: default_mode(),
        }
    }
}

impl Default for EqualizerSection {
    fn default() -> Self {
        Self {
            hardware_bands: default_hardware_bands(),
            levels: HashMap::new(),
            treble: None,
            bass_boost: 0,
            virtualizer: 0,
            reverb: 0,
        }
    }
}

impl EqualizerSection {
    /// Levels keyed by band index, sorted by index. Keys that are not
    /// indices are logged and dropped.
    pub fn band_levels(&self) -> Vec<(usize, i32)> {
        let mut levels: Vec<(usize, i32)> = self
            .levels
            .iter()
            .filter_map(|(key, &level)| match key.trim().parse() {
                Ok(index) => Some((index, level)),
                Err(_) => {
                    log::warn!("Ignoring equalizer level for non-numeric band '{}'", key);
                    None
                }
            })
            .collect();
        levels.sort_unstable();
        levels
    }
}

fn default_mode() -> String { "medium".into() }
fn default_hardware_bands() -> usize { 5 }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.performance.mode, "medium");
        assert_eq!(config.equalizer.hardware_bands, 5);
        assert_eq!(config.smoothing, SmoothingFactors::default());
    }

    #[test]
    fn sections_parse() {
        let config: Config = toml::from_str(
            r#"
            [performance]
            mode = "high"

            [equalizer]
            hardware_bands = 10
            treble = -300
            bass_boost = 500
            levels = { "0" = 200, "12" = -150, "bass" = 9 }

            [smoothing]
            bars = 0.6
            "#,
        )
        .unwrap();
        assert_eq!(config.performance.mode, "high");
        assert_eq!(config.equalizer.hardware_bands, 10);
        assert_eq!(config.equalizer.treble, Some(-300));
        assert_eq!(config.equalizer.bass_boost, 500);
        assert_eq!(config.equalizer.band_levels(), vec![(0, 200), (12, -150)]);
        assert_eq!(config.smoothing.bars, 0.6);
        assert_eq!(config.smoothing.waveform, 0.3);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path =
            std::env::temp_dir().join(format!("bandscope-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[equalizer\nhardware_bands = ").unwrap();
        let result = load_config(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
