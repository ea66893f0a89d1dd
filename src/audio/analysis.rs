//! Per-callback transform from raw capture bytes to visual series.
//!
//! Stateless: every call works only on its inputs. The magnitude path reads
//! interleaved signed 8-bit real/imaginary pairs, the waveform path signed
//! 8-bit samples. Short or empty buffers degrade to zeros, never to errors.

use super::features::{
    MagnitudeFeatures, SpectrumFrame, BASS_BUCKETS, FREQUENCY_BANDS, SUB_BASS_POINTS,
    TREBLE_BUCKETS,
};
use super::performance::PerformanceConfig;
use crate::error::AnalysisIssue;

/// Bins beyond this are ignored.
pub const MAX_BINS: usize = 512;
const SUB_BASS_MIN_HZ: f32 = 20.0;
const SUB_BASS_MAX_HZ: f32 = 100.0;

// Visual tuning, kept as found.
const BASS_RANGE_FRACTION: f32 = 0.1;
const MIN_BASS_RANGE: usize = 10;
const TREBLE_START_FRACTION: f32 = 0.5;
const TREBLE_GAIN: f32 = 1.3;
const BAND_GAIN: f32 = 1.4;
const SUB_BASS_GAIN: f32 = 3.0;

pub struct SpectrumAnalyzer;

impl SpectrumAnalyzer {
    /// Analyze whichever buffers a callback delivered. A missing buffer
    /// yields zeros for the series it would have produced.
    pub fn analyze(
        waveform: Option<&[u8]>,
        magnitude: Option<&[u8]>,
        sampling_rate: u32,
        config: &PerformanceConfig,
    ) -> SpectrumFrame {
        let mut frame = SpectrumFrame::silent(config.waveform_points);
        if let Some(bytes) = waveform {
            frame.waveform = analyze_waveform(bytes, config.waveform_points);
        }
        if let Some(bytes) = magnitude {
            let features = analyze_magnitude(
                bytes,
                sampling_rate,
                config.effective_capture_size(),
                config,
            );
            frame.full_spectrum = features.full_spectrum;
            frame.bass_buckets = features.bass_buckets;
            frame.treble_buckets = features.treble_buckets;
            frame.frequency_bands = features.frequency_bands;
            if let Some(wave) = features.sub_bass_wave {
                frame.sub_bass_wave = wave;
            }
        }
        frame
    }
}

fn byte_to_unit(byte: u8) -> f32 {
    (byte as i8 as f32 + 128.0) / 256.0
}

/// Linear interpolation of `values` onto `points` evenly spaced positions.
/// Both ends map onto both ends; a single point takes the first value.
pub fn resample_linear(values: &[f32], points: usize) -> Vec<f32> {
    if values.is_empty() {
        return vec![0.0; points];
    }
    match points {
        0 => Vec::new(),
        1 => vec![values[0]],
        _ => {
            let last = values.len() - 1;
            (0..points)
                .map(|i| {
                    let position = i as f32 * last as f32 / (points - 1) as f32;
                    let lower = (position as usize).min(last);
                    let upper = (lower + 1).min(last);
                    let fraction = position - lower as f32;
                    values[lower] * (1.0 - fraction) + values[upper] * fraction
                })
                .collect()
        }
    }
}

/// Waveform bytes to `points` samples in `[0, 1]`. `points` is clamped to
/// `[1, waveform.len()]`; an empty buffer gives `points` zeros.
pub fn analyze_waveform(waveform: &[u8], points: usize) -> Vec<f32> {
    if waveform.is_empty() {
        log::debug!("{}", AnalysisIssue::MalformedBuffer { len: 0 });
        return vec![0.0; points];
    }

    let points = points.clamp(1, waveform.len());
    if points == 1 {
        return vec![byte_to_unit(waveform[0])];
    }

    let samples: Vec<f32> = waveform.iter().map(|&b| byte_to_unit(b)).collect();
    if points == samples.len() {
        samples
    } else {
        resample_linear(&samples, points)
    }
}

/// Magnitude per bin, divided by the frame's largest magnitude.
pub fn normalized_magnitudes(fft: &[u8]) -> Vec<f32> {
    let bins = (fft.len() / 2).min(MAX_BINS);
    let mut magnitudes: Vec<f32> = fft
        .chunks_exact(2)
        .take(bins)
        .map(|pair| {
            let re = pair[0] as i8 as f32;
            let im = pair[1] as i8 as f32;
            (re * re + im * im).sqrt()
        })
        .collect();

    let peak = magnitudes.iter().copied().fold(0.0f32, f32::max);
    let peak = if peak > 0.0 { peak } else { 1.0 };
    for m in magnitudes.iter_mut() {
        *m = (*m / peak).clamp(0.0, 1.0);
    }
    magnitudes
}

/// Mean of each tenth of the lowest bins, scaled by the bass boost.
pub fn bass_buckets(magnitudes: &[f32], boost: f32) -> [f32; BASS_BUCKETS] {
    let mut buckets = [0.0; BASS_BUCKETS];
    if magnitudes.is_empty() {
        return buckets;
    }
    let last = magnitudes.len() - 1;
    let range = ((magnitudes.len() as f32 * BASS_RANGE_FRACTION) as usize).max(MIN_BASS_RANGE);

    for (i, bucket) in buckets.iter_mut().enumerate() {
        let start = (i * range / BASS_BUCKETS).min(last);
        let end = ((i + 1) * range / BASS_BUCKETS).min(last);
        let slice = &magnitudes[start..end.max(start)];
        let mean = if slice.is_empty() {
            0.0
        } else {
            slice.iter().sum::<f32>() / slice.len() as f32
        };
        *bucket = (mean * boost).clamp(0.0, 1.0);
    }
    buckets
}

/// Single bins sampled across the upper half of the spectrum.
pub fn treble_buckets(magnitudes: &[f32]) -> [f32; TREBLE_BUCKETS] {
    let mut buckets = [0.0; TREBLE_BUCKETS];
    if magnitudes.is_empty() {
        return buckets;
    }
    let bins = magnitudes.len();
    let start = (bins as f32 * TREBLE_START_FRACTION) as usize;
    for (i, bucket) in buckets.iter_mut().enumerate() {
        let index = (start + i * (bins - start) / TREBLE_BUCKETS).min(bins - 1);
        *bucket = (magnitudes[index] * TREBLE_GAIN).clamp(0.0, 1.0);
    }
    buckets
}

/// Single bins sampled across the whole spectrum.
pub fn frequency_bands(magnitudes: &[f32]) -> [f32; FREQUENCY_BANDS] {
    let mut bands = [0.0; FREQUENCY_BANDS];
    if magnitudes.is_empty() {
        return bands;
    }
    let bins = magnitudes.len();
    for (i, band) in bands.iter_mut().enumerate() {
        let index = (i * bins / FREQUENCY_BANDS).min(bins - 1);
        *band = (magnitudes[index] * BAND_GAIN).clamp(0.0, 1.0);
    }
    bands
}

/// Inclusive bin range covering 20-100 Hz, or the low-bin fallback when
/// that window is empty at this resolution.
pub fn sub_bass_window(
    bins: usize,
    sampling_rate: u32,
    capture_size: usize,
) -> Result<(usize, usize), AnalysisIssue> {
    if bins == 0 || capture_size == 0 {
        return Err(AnalysisIssue::DegenerateFrequencyWindow);
    }
    let bin_hz = sampling_rate as f32 / capture_size as f32;
    if !bin_hz.is_finite() || bin_hz <= 0.0 {
        return Err(AnalysisIssue::DegenerateFrequencyWindow);
    }

    let last = bins - 1;
    let min_bin = ((SUB_BASS_MIN_HZ / bin_hz).ceil() as usize).max(1).min(last);
    let max_bin = ((SUB_BASS_MAX_HZ / bin_hz).floor() as usize).min(last);
    if max_bin < min_bin {
        return Err(AnalysisIssue::DegenerateFrequencyWindow);
    }
    Ok((min_bin, max_bin))
}

pub fn sub_bass_wave(magnitudes: &[f32], sampling_rate: u32, capture_size: usize) -> Vec<f32> {
    if magnitudes.is_empty() {
        return vec![0.0; SUB_BASS_POINTS];
    }
    let (min_bin, max_bin) = sub_bass_window(magnitudes.len(), sampling_rate, capture_size)
        .unwrap_or_else(|issue| {
            log::debug!("{}", issue);
            (0, 1.min(magnitudes.len() - 1))
        });

    let window = &magnitudes[min_bin..=max_bin];
    let shape = if window.len() == 1 {
        vec![window[0]; SUB_BASS_POINTS]
    } else {
        resample_linear(window, SUB_BASS_POINTS)
    };
    shape
        .into_iter()
        .map(|m| (m * SUB_BASS_GAIN).clamp(0.0, 1.0))
        .collect()
}

/// The full magnitude path for one FFT capture.
pub fn analyze_magnitude(
    fft: &[u8],
    sampling_rate: u32,
    capture_size: usize,
    config: &PerformanceConfig,
) -> MagnitudeFeatures {
    let magnitudes = normalized_magnitudes(fft);
    if magnitudes.is_empty() {
        log::debug!("{}", AnalysisIssue::MalformedBuffer { len: fft.len() });
    }

    let sub_bass = config
        .enable_sub_bass
        .then(|| sub_bass_wave(&magnitudes, sampling_rate, capture_size));

    MagnitudeFeatures {
        bass_buckets: bass_buckets(&magnitudes, config.bass_boost_factor),
        treble_buckets: treble_buckets(&magnitudes),
        frequency_bands: frequency_bands(&magnitudes),
        sub_bass_wave: sub_bass,
        full_spectrum: magnitudes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::performance::PerformanceMode;

    const EPS: f32 = 1e-6;

    /// Interleaved (re, im) bytes.
    fn fft_bytes(pairs: &[(i8, i8)]) -> Vec<u8> {
        pairs.iter().flat_map(|&(re, im)| [re as u8, im as u8]).collect()
    }

    fn pseudo_random_bytes(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                (state >> 16) as u8
            })
            .collect()
    }

    #[test]
    fn waveform_maps_bytes_to_unit_range() {
        let bytes = [0x80u8, 0x00, 0x7f];
        let out = analyze_waveform(&bytes, 3);
        assert_eq!(out, vec![0.0, 0.5, 255.0 / 256.0]);
    }

    #[test]
    fn waveform_point_count_is_clamped_to_input() {
        let out = analyze_waveform(&[0u8; 16], 128);
        assert_eq!(out.len(), 16);
        let out = analyze_waveform(&[0u8; 16], 0);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn waveform_single_point_uses_first_byte() {
        let out = analyze_waveform(&[0x80, 0x7f, 0x7f], 1);
        assert_eq!(out, vec![0.0]);
    }

    #[test]
    fn empty_waveform_is_zeros() {
        assert_eq!(analyze_waveform(&[], 64), vec![0.0; 64]);
    }

    #[test]
    fn waveform_downsampling_interpolates() {
        // -128, 0, 127 -> 0.0, 0.5, ~1.0; two points hit the ends.
        let out = analyze_waveform(&[0x80, 0x00, 0x7f], 2);
        assert_eq!(out, vec![0.0, 255.0 / 256.0]);
        let out = analyze_waveform(&[0x80, 0x00, 0x00, 0x7f], 3);
        // Middle point falls halfway between the two zero samples.
        assert!((out[1] - 0.5).abs() < EPS);
    }

    #[test]
    fn resampling_is_idempotent_at_same_length() {
        let bytes = pseudo_random_bytes(1024, 7);
        let samples: Vec<f32> = bytes.iter().map(|&b| byte_to_unit(b)).collect();
        for k in [2usize, 3, 64, 100, 128, 1000] {
            let once = resample_linear(&samples, k);
            let twice = resample_linear(&once, k);
            assert_eq!(once.len(), k);
            for (a, b) in once.iter().zip(&twice) {
                assert!((a - b).abs() < EPS, "k={} {} vs {}", k, a, b);
            }
        }
    }

    #[test]
    fn magnitudes_are_normalized_to_peak() {
        for (len, seed) in [(2usize, 1u32), (64, 2), (1024, 3), (3000, 4), (33, 5)] {
            let bytes = pseudo_random_bytes(len, seed);
            let mags = normalized_magnitudes(&bytes);
            assert_eq!(mags.len(), (len / 2).min(MAX_BINS));
            assert!(mags.iter().all(|&m| (0.0..=1.0).contains(&m)));
            let nonzero = bytes.chunks_exact(2).take(MAX_BINS).any(|p| p != [0, 0]);
            if nonzero {
                assert!(mags.iter().any(|&m| m == 1.0));
            }
        }
    }

    #[test]
    fn all_zero_magnitudes_stay_zero() {
        let mags = normalized_magnitudes(&[0u8; 64]);
        assert_eq!(mags, vec![0.0; 32]);
    }

    #[test]
    fn magnitude_uses_signed_components() {
        let mags = normalized_magnitudes(&fft_bytes(&[(3, -4), (-6, 8)]));
        assert!((mags[0] - 0.5).abs() < EPS);
        assert!((mags[1] - 1.0).abs() < EPS);
    }

    #[test]
    fn bass_buckets_average_and_boost() {
        // 100 bins -> bass range 10, one bin per bucket.
        let mut mags = vec![0.0f32; 100];
        mags[0] = 0.2;
        mags[3] = 0.8;
        let buckets = bass_buckets(&mags, 2.0);
        assert!((buckets[0] - 0.4).abs() < EPS);
        assert_eq!(buckets[3], 1.0);
        assert_eq!(buckets[1], 0.0);
    }

    #[test]
    fn bass_range_grows_with_bin_count() {
        // 512 bins -> range 51, buckets of five bins.
        let mut mags = vec![0.0f32; 512];
        for m in mags.iter_mut().take(5) {
            *m = 0.5;
        }
        let buckets = bass_buckets(&mags, 1.0);
        assert!((buckets[0] - 0.5).abs() < EPS);
        assert_eq!(buckets[1], 0.0);
    }

    #[test]
    fn bass_buckets_on_tiny_spectrum() {
        // Fewer bins than buckets: clamped ranges collapse to empty.
        let buckets = bass_buckets(&[1.0, 1.0, 1.0], 1.0);
        assert_eq!(buckets[0], 1.0);
        assert!(buckets[5..].iter().all(|&b| b == 0.0));
    }

    #[test]
    fn treble_and_band_sampling_positions() {
        let mags: Vec<f32> = (0..100).map(|i| i as f32 / 200.0).collect();
        let treble = treble_buckets(&mags);
        // start 50, step 5: bins 50, 55, ..., 95
        for (i, t) in treble.iter().enumerate() {
            let expected = ((50 + i * 5) as f32 / 200.0 * 1.3).min(1.0);
            assert!((t - expected).abs() < EPS);
        }
        let bands = frequency_bands(&mags);
        for (i, b) in bands.iter().enumerate() {
            let expected = ((i * 5) as f32 / 200.0 * 1.4).min(1.0);
            assert!((b - expected).abs() < EPS);
        }
    }

    #[test]
    fn sub_bass_window_at_common_rate() {
        let bin_hz = 44100.0f32 / 1024.0;
        assert!((bin_hz - 43.07).abs() < 0.01);
        assert_eq!(sub_bass_window(512, 44100, 1024), Ok((1, 2)));
    }

    #[test]
    fn sub_bass_window_falls_back_when_degenerate() {
        assert_eq!(
            sub_bass_window(512, 0, 1024),
            Err(AnalysisIssue::DegenerateFrequencyWindow)
        );
        // 48 kHz over 128 samples: 375 Hz per bin, nothing inside 20-100 Hz.
        assert_eq!(
            sub_bass_window(64, 48000, 128),
            Err(AnalysisIssue::DegenerateFrequencyWindow)
        );
        let mut mags = vec![0.0f32; 64];
        mags[0] = 0.1;
        mags[1] = 0.3;
        let wave = sub_bass_wave(&mags, 48000, 128);
        assert_eq!(wave.len(), SUB_BASS_POINTS);
        assert!((wave[0] - 0.3).abs() < EPS);
        assert!((wave[63] - 0.9).abs() < EPS);
    }

    #[test]
    fn two_bin_spectrum_fills_sub_bass_from_one_bin() {
        let mags = normalized_magnitudes(&fft_bytes(&[(10, 0), (5, 0)]));
        let wave = sub_bass_wave(&mags, 44100, 1024);
        assert_eq!(wave.len(), SUB_BASS_POINTS);
        assert!(wave.iter().all(|&w| w == 1.0));

        let mags = normalized_magnitudes(&fft_bytes(&[(100, 0), (10, 0)]));
        let wave = sub_bass_wave(&mags, 44100, 1024);
        assert!(wave.iter().all(|&w| (w - 0.3).abs() < EPS));
    }

    #[test]
    fn sub_bass_interpolates_across_window() {
        let mut mags = vec![0.0f32; 512];
        mags[1] = 0.0;
        mags[2] = 0.3;
        let wave = sub_bass_wave(&mags, 44100, 1024);
        assert!(wave[0].abs() < EPS);
        assert!((wave[63] - 0.9).abs() < EPS);
        assert!(wave.windows(2).all(|w| w[0] <= w[1] + EPS));
    }

    #[test]
    fn disabled_sub_bass_is_skipped() {
        let config = PerformanceConfig::for_mode(PerformanceMode::Low);
        let features = analyze_magnitude(&pseudo_random_bytes(1024, 9), 44100, 512, &config);
        assert!(features.sub_bass_wave.is_none());
        assert_eq!(features.full_spectrum.len(), 512);
    }

    #[test]
    fn malformed_buffers_give_zero_frames() {
        let config = PerformanceConfig::default();
        let frame = SpectrumAnalyzer::analyze(Some(&[][..]), Some(&[7u8][..]), 44100, &config);
        assert_eq!(frame.waveform, vec![0.0; config.waveform_points]);
        assert!(frame.full_spectrum.is_empty());
        assert!(frame.bass_buckets.iter().all(|&b| b == 0.0));
        assert!(frame.sub_bass_wave.iter().all(|&b| b == 0.0));
        assert_eq!(frame.sub_bass_wave.len(), SUB_BASS_POINTS);
    }

    #[test]
    fn full_frame_values_stay_in_unit_range() {
        let config = PerformanceConfig::for_mode(PerformanceMode::High);
        let wave = pseudo_random_bytes(1024, 11);
        let fft = pseudo_random_bytes(1024, 12);
        let frame = SpectrumAnalyzer::analyze(Some(wave.as_slice()), Some(fft.as_slice()), 44100, &config);
        assert_eq!(frame.waveform.len(), 128);
        assert_eq!(frame.full_spectrum.len(), 512);
        let all = frame
            .waveform
            .iter()
            .chain(&frame.full_spectrum)
            .chain(&frame.bass_buckets)
            .chain(&frame.treble_buckets)
            .chain(&frame.frequency_bands)
            .chain(&frame.sub_bass_wave);
        for v in all {
            assert!((0.0..=1.0).contains(v));
        }
    }
}
