use serde::{Deserialize, Serialize};

/// Capture sizes the capture transport accepts.
pub const ALLOWED_CAPTURE_SIZES: [usize; 5] = [128, 256, 512, 1024, 2048];
/// Lowest capture rate, in the transport's millihertz unit.
pub const MIN_CAPTURE_RATE: u32 = 1000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceMode {
    Low,
    #[default]
    Medium,
    High,
}

impl PerformanceMode {
    /// Case-insensitive; anything unknown falls back to `Medium`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            other => {
                log::warn!("Unknown performance mode '{}', using medium", other);
                Self::Medium
            }
        }
    }
}

/// Fixed per mode; changing mode means re-attaching the capture source.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PerformanceConfig {
    pub capture_rate: u32,
    pub capture_size: usize,
    pub animation_fps: u32,
    pub enable_sub_bass: bool,
    pub sub_bass_layers: u32,
    pub enable_image_pulse: bool,
    pub enable_glow: bool,
    pub bass_boost_factor: f32,
    pub waveform_points: usize,
}

impl PerformanceConfig {
    pub fn for_mode(mode: PerformanceMode) -> Self {
        match mode {
            PerformanceMode::Low => Self {
                capture_rate: 10000,
                capture_size: 512,
                animation_fps: 30,
                enable_sub_bass: false,
                sub_bass_layers: 1,
                enable_image_pulse: false,
                enable_glow: false,
                bass_boost_factor: 1.5,
                waveform_points: 64,
            },
            PerformanceMode::Medium => Self {
                capture_rate: 20000,
                capture_size: 1024,
                animation_fps: 45,
                enable_sub_bass: true,
                sub_bass_layers: 2,
                enable_image_pulse: true,
                enable_glow: false,
                bass_boost_factor: 2.0,
                waveform_points: 128,
            },
            PerformanceMode::High => Self {
                capture_rate: 30000,
                capture_size: 1024,
                animation_fps: 60,
                enable_sub_bass: true,
                sub_bass_layers: 3,
                enable_image_pulse: true,
                enable_glow: true,
                bass_boost_factor: 2.2,
                waveform_points: 128,
            },
        }
    }

    /// First allowed capture size at or above the requested one.
    pub fn effective_capture_size(&self) -> usize {
        ALLOWED_CAPTURE_SIZES
            .iter()
            .copied()
            .find(|&size| size >= self.capture_size)
            .unwrap_or(ALLOWED_CAPTURE_SIZES[ALLOWED_CAPTURE_SIZES.len() - 1])
    }

    /// Requested rate clamped into what the source can deliver.
    pub fn effective_capture_rate(&self, max_rate: u32) -> u32 {
        self.capture_rate.clamp(MIN_CAPTURE_RATE, max_rate.max(MIN_CAPTURE_RATE))
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self::for_mode(PerformanceMode::default())
    }
}
