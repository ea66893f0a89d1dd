use serde::{Deserialize, Serialize};

use super::features::SpectrumFrame;

/// Exponential frame-over-frame easing of a series.
pub struct SignalSmoother;

impl SignalSmoother {
    /// `previous * (1 - factor) + current * factor` per element. Elements
    /// `previous` does not cover pass through from `current`; the output is
    /// always as long as `current`.
    pub fn smooth(previous: &[f32], current: &[f32], factor: f32) -> Vec<f32> {
        current
            .iter()
            .enumerate()
            .map(|(i, &cur)| match previous.get(i) {
                Some(&prev) => blend(prev, cur, factor),
                None => cur,
            })
            .collect()
    }

    fn smooth_array<const N: usize>(
        previous: &[f32; N],
        current: &[f32; N],
        factor: f32,
    ) -> [f32; N] {
        let mut out = *current;
        for (o, &prev) in out.iter_mut().zip(previous) {
            *o = blend(prev, *o, factor);
        }
        out
    }
}

/// `factor == 1.0` yields `current` exactly.
fn blend(prev: f32, cur: f32, factor: f32) -> f32 {
    prev * (1.0 - factor) + cur * factor
}

/// Per-series factors, each in `(0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingFactors {
    pub waveform: f32,
    pub bars: f32,
    pub sub_bass: f32,
}

impl Default for SmoothingFactors {
    fn default() -> Self {
        Self {
            waveform: 0.3,
            bars: 0.4,
            sub_bass: 0.35,
        }
    }
}

impl SmoothingFactors {
    /// Pull out-of-range factors back into `(0, 1]`.
    pub fn sanitized(self) -> Self {
        let fix = |f: f32, fallback: f32| {
            if f.is_finite() && f > 0.0 {
                f.min(1.0)
            } else {
                log::warn!("Smoothing factor {} out of range, using {}", f, fallback);
                fallback
            }
        };
        let defaults = Self::default();
        Self {
            waveform: fix(self.waveform, defaults.waveform),
            bars: fix(self.bars, defaults.bars),
            sub_bass: fix(self.sub_bass, defaults.sub_bass),
        }
    }

    /// Ease every series of `previous` towards `current`. Waveform and
    /// sub-bass use their own factors; spectrum and buckets use `bars`.
    pub fn apply(&self, previous: &SpectrumFrame, current: &SpectrumFrame) -> SpectrumFrame {
        SpectrumFrame {
            waveform: SignalSmoother::smooth(&previous.waveform, &current.waveform, self.waveform),
            full_spectrum: SignalSmoother::smooth(
                &previous.full_spectrum,
                &current.full_spectrum,
                self.bars,
            ),
            bass_buckets: SignalSmoother::smooth_array(
                &previous.bass_buckets,
                &current.bass_buckets,
                self.bars,
            ),
            treble_buckets: SignalSmoother::smooth_array(
                &previous.treble_buckets,
                &current.treble_buckets,
                self.bars,
            ),
            frequency_bands: SignalSmoother::smooth_array(
                &previous.frequency_bands,
                &current.frequency_bands,
                self.bars,
            ),
            sub_bass_wave: SignalSmoother::smooth(
                &previous.sub_bass_wave,
                &current.sub_bass_wave,
                self.sub_bass,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halfway_blend() {
        assert_eq!(
            SignalSmoother::smooth(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0], 0.5),
            vec![0.5, 0.5, 0.5]
        );
    }

    #[test]
    fn full_factor_takes_current() {
        let cur = [0.2, 0.7, 0.9];
        assert_eq!(SignalSmoother::smooth(&[0.9, 0.1, 0.4], &cur, 1.0), cur.to_vec());
    }

    #[test]
    fn full_factor_takes_current_for_arrays() {
        let previous = SpectrumFrame::silent(3);
        let mut current = SpectrumFrame::silent(3);
        current.bass_buckets = [0.2; 10];
        current.frequency_bands = [0.7; 20];
        let factors = SmoothingFactors {
            waveform: 1.0,
            bars: 1.0,
            sub_bass: 1.0,
        };
        let out = factors.apply(&previous, &current);
        assert_eq!(out, current);
    }

    #[test]
    fn shorter_previous_passes_current_through() {
        let out = SignalSmoother::smooth(&[0.0], &[1.0, 0.25, 0.75], 0.5);
        assert_eq!(out, vec![0.5, 0.25, 0.75]);
    }

    #[test]
    fn longer_previous_is_truncated() {
        let out = SignalSmoother::smooth(&[0.0, 0.0, 0.0, 0.0], &[1.0], 0.5);
        assert_eq!(out, vec![0.5]);
    }

    #[test]
    fn bad_factors_fall_back() {
        let factors = SmoothingFactors {
            waveform: 0.0,
            bars: 3.0,
            sub_bass: f32::NAN,
        }
        .sanitized();
        assert_eq!(factors.waveform, 0.3);
        assert_eq!(factors.bars, 1.0);
        assert_eq!(factors.sub_bass, 0.35);
    }

    #[test]
    fn frame_smoothing_uses_series_factors() {
        let previous = SpectrumFrame::silent(2);
        let mut current = SpectrumFrame::silent(2);
        current.waveform = vec![1.0, 1.0];
        current.bass_buckets = [1.0; 10];
        current.sub_bass_wave = vec![1.0; 64];
        let out = SmoothingFactors::default().apply(&previous, &current);
        assert!((out.waveform[0] - 0.3).abs() < 1e-6);
        assert!((out.bass_buckets[9] - 0.4).abs() < 1e-6);
        assert!((out.sub_bass_wave[63] - 0.35).abs() < 1e-6);
    }
}
