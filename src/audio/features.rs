use serde::Serialize;

pub const BASS_BUCKETS: usize = 10;
pub const TREBLE_BUCKETS: usize = 10;
pub const FREQUENCY_BANDS: usize = 20;
pub const SUB_BASS_POINTS: usize = 64;

/// One capture callback's worth of visual series, every value in `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpectrumFrame {
    /// Waveform samples mapped from signed bytes to `[0, 1]`
    pub waveform: Vec<f32>,
    /// Magnitude per bin, normalized to the frame's peak
    pub full_spectrum: Vec<f32>,
    pub bass_buckets: [f32; BASS_BUCKETS],
    pub treble_buckets: [f32; TREBLE_BUCKETS],
    pub frequency_bands: [f32; FREQUENCY_BANDS],
    /// 20-100 Hz envelope stretched over [`SUB_BASS_POINTS`] points
    pub sub_bass_wave: Vec<f32>,
}

impl SpectrumFrame {
    /// All-zero frame with `waveform_points` waveform samples.
    pub fn silent(waveform_points: usize) -> Self {
        Self {
            waveform: vec![0.0; waveform_points],
            full_spectrum: Vec::new(),
            bass_buckets: [0.0; BASS_BUCKETS],
            treble_buckets: [0.0; TREBLE_BUCKETS],
            frequency_bands: [0.0; FREQUENCY_BANDS],
            sub_bass_wave: vec![0.0; SUB_BASS_POINTS],
        }
    }
}

impl Default for SpectrumFrame {
    fn default() -> Self {
        Self::silent(0)
    }
}

/// Output of the magnitude path alone.
#[derive(Clone, Debug, PartialEq)]
pub struct MagnitudeFeatures {
    pub full_spectrum: Vec<f32>,
    pub bass_buckets: [f32; BASS_BUCKETS],
    pub treble_buckets: [f32; TREBLE_BUCKETS],
    pub frequency_bands: [f32; FREQUENCY_BANDS],
    /// `None` when sub-bass extraction is switched off
    pub sub_bass_wave: Option<Vec<f32>>,
}

/// Bass-driven pulse for an image or glow: the mean bass bucket raised to
/// 1.5, eased towards each new frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BassPulse {
    pub level: f32,
}

impl BassPulse {
    pub fn update(&mut self, bass_buckets: &[f32]) -> f32 {
        let target = if bass_buckets.is_empty() {
            0.0
        } else {
            (bass_buckets.iter().sum::<f32>() / bass_buckets.len() as f32).powf(1.5)
        };
        self.level = self.level * 0.6 + target * 0.4;
        self.level
    }

    pub fn scale(&self) -> f32 {
        1.0 + self.level * 0.4
    }

    pub fn glow(&self) -> f32 {
        self.level * 0.8
    }
}
