//! In-process effect unit: a small bank of peaking biquads plus a bass shelf.
//! Stands in for a platform equalizer so level edits show up in the
//! captured spectrum.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};
use parking_lot::Mutex;
use std::sync::Arc;

use super::effect::{
    EffectCapability, EffectProvider, ReverbPreset, MAX_BASS_STRENGTH, MAX_VIRTUALIZER_STRENGTH,
};
use crate::error::{EffectError, EffectResult};

/// The usual five-band layout of a platform equalizer.
pub const PLATFORM_CENTERS_HZ: [f32; 5] = [60.0, 230.0, 910.0, 3600.0, 14000.0];
const LEVEL_RANGE_MB: (i32, i32) = (-1500, 1500);
const BASS_SHELF_HZ: f32 = 80.0;
/// Shelf gain at full bass strength.
const BASS_SHELF_MAX_DB: f32 = 12.0;

type Filter = DirectForm2Transposed<f32>;

/// `None` when the coefficients cannot be built (e.g. a center above
/// Nyquist); the stage is then skipped.
fn make_filter(filter: Type<f32>, sample_rate: f32, freq: f32, q: f32) -> Option<Filter> {
    match Coefficients::<f32>::from_params(filter, sample_rate.hz(), freq.hz(), q) {
        Ok(coefficients) => Some(DirectForm2Transposed::<f32>::new(coefficients)),
        Err(e) => {
            log::debug!("No filter at {} Hz: {:?}", freq, e);
            None
        }
    }
}

/// Q from the octave distance to the next band up.
fn band_q(center: f32, next: Option<f32>) -> f32 {
    match next {
        Some(next) => {
            let ratio = (next / center).sqrt();
            let bandwidth = (ratio - 1.0 / ratio) / std::f32::consts::SQRT_2;
            if bandwidth > 0.0 {
                1.0 / bandwidth
            } else {
                1.0
            }
        }
        None => 1.0,
    }
}

struct EqState {
    levels: Vec<i32>,
    bass_strength: u16,
    virtualizer_strength: u16,
    reverb: ReverbPreset,
    filters: Vec<Option<Filter>>,
    bass_shelf: Option<Filter>,
    dirty: bool,
}

pub struct SoftwareEqualizer {
    session: i32,
    sample_rate: f32,
    centers_hz: Vec<f32>,
    state: Mutex<EqState>,
}

impl SoftwareEqualizer {
    pub fn new(session: i32, sample_rate: u32, band_count: usize) -> Self {
        let centers_hz = layout(band_count);
        let bands = centers_hz.len();
        Self {
            session,
            sample_rate: sample_rate.max(1) as f32,
            centers_hz,
            state: Mutex::new(EqState {
                levels: vec![0; bands],
                bass_strength: 0,
                virtualizer_strength: 0,
                reverb: ReverbPreset::None,
                filters: vec![None; bands],
                bass_shelf: None,
                dirty: false,
            }),
        }
    }

    pub fn session(&self) -> i32 {
        self.session
    }

    pub fn levels(&self) -> Vec<i32> {
        self.lock().levels.clone()
    }

    pub fn bass_strength(&self) -> u16 {
        self.lock().bass_strength
    }

    pub fn virtualizer_strength(&self) -> u16 {
        self.lock().virtualizer_strength
    }

    pub fn reverb_preset(&self) -> ReverbPreset {
        self.lock().reverb
    }

    /// Run mono samples through the band filters and the bass shelf.
    pub fn process(&self, samples: &mut [f32]) {
        let mut state = self.lock();
        if state.dirty {
            self.rebuild(&mut state);
        }
        for sample in samples.iter_mut() {
            let mut value = *sample;
            if let Some(shelf) = state.bass_shelf.as_mut() {
                value = shelf.run(value);
            }
            for filter in state.filters.iter_mut().flatten() {
                value = filter.run(value);
            }
            *sample = value;
        }
    }

    fn rebuild(&self, state: &mut EqState) {
        let nyquist = self.sample_rate / 2.0;
        state.filters = self
            .centers_hz
            .iter()
            .enumerate()
            .map(|(i, &center)| {
                let gain_db = state.levels[i] as f32 / 100.0;
                if gain_db.abs() < 0.01 || center >= nyquist {
                    return None;
                }
                let q = band_q(center, self.centers_hz.get(i + 1).copied());
                make_filter(Type::PeakingEQ(gain_db), self.sample_rate, center, q)
            })
            .collect();

        let shelf_db = BASS_SHELF_MAX_DB * state.bass_strength as f32 / MAX_BASS_STRENGTH as f32;
        state.bass_shelf = if shelf_db < 0.01 {
            None
        } else {
            make_filter(
                Type::LowShelf(shelf_db),
                self.sample_rate,
                BASS_SHELF_HZ,
                Q_BUTTERWORTH_F32,
            )
        };
        state.dirty = false;
    }

    fn lock(&self) -> parking_lot::MutexGuard<'_, EqState> {
        self.state.lock()
    }

    fn check_band(&self, band: usize) -> EffectResult<f32> {
        self.centers_hz.get(band).copied().ok_or(EffectError::InvalidBand(band))
    }
}

/// Physical band centers for `count` bands: the platform layout for five,
/// otherwise log-spaced over the same span.
fn layout(count: usize) -> Vec<f32> {
    match count {
        0 => Vec::new(),
        1 => vec![1000.0],
        5 => PLATFORM_CENTERS_HZ.to_vec(),
        n => {
            let lo = PLATFORM_CENTERS_HZ[0].ln();
            let hi = PLATFORM_CENTERS_HZ[4].ln();
            (0..n)
                .map(|i| (lo + (hi - lo) * i as f32 / (n - 1) as f32).exp().round())
                .collect()
        }
    }
}

impl EffectCapability for SoftwareEqualizer {
    fn band_count(&self) -> usize {
        self.centers_hz.len()
    }

    fn center_frequency(&self, band: usize) -> EffectResult<u32> {
        Ok((self.check_band(band)? * 1000.0) as u32)
    }

    fn frequency_range(&self, band: usize) -> EffectResult<(u32, u32)> {
        let center = self.check_band(band)?;
        let low = match band.checked_sub(1).and_then(|i| self.centers_hz.get(i)) {
            Some(prev) => (prev * center).sqrt(),
            None => center / 2.0,
        };
        let high = match self.centers_hz.get(band + 1) {
            Some(next) => (center * next).sqrt(),
            None => (center * 2.0).min(self.sample_rate / 2.0).max(center),
        };
        Ok(((low * 1000.0) as u32, (high * 1000.0) as u32))
    }

    fn band_level_range(&self) -> (i32, i32) {
        LEVEL_RANGE_MB
    }

    fn set_band_level(&self, band: usize, level: i32) -> EffectResult<()> {
        self.check_band(band)?;
        let mut state = self.lock();
        state.levels[band] = level.clamp(LEVEL_RANGE_MB.0, LEVEL_RANGE_MB.1);
        state.dirty = true;
        Ok(())
    }

    fn set_bass_strength(&self, strength: u16) -> EffectResult<()> {
        let mut state = self.lock();
        state.bass_strength = strength.min(MAX_BASS_STRENGTH);
        state.dirty = true;
        Ok(())
    }

    fn set_virtualizer_strength(&self, strength: u16) -> EffectResult<()> {
        self.lock().virtualizer_strength = strength.min(MAX_VIRTUALIZER_STRENGTH);
        Ok(())
    }

    fn set_reverb_preset(&self, preset: ReverbPreset) -> EffectResult<()> {
        self.lock().reverb = preset;
        Ok(())
    }
}

/// Opens [`SoftwareEqualizer`]s. Session 0 is the global output mix, which an
/// in-process effect cannot reach.
pub struct SoftwareProvider {
    sample_rate: u32,
    band_count: usize,
    opened: Mutex<Option<Arc<SoftwareEqualizer>>>,
}

impl SoftwareProvider {
    pub fn new(sample_rate: u32, band_count: usize) -> Self {
        Self {
            sample_rate,
            band_count,
            opened: Mutex::new(None),
        }
    }

    /// The most recently opened unit, for feeding audio through it.
    pub fn current(&self) -> Option<Arc<SoftwareEqualizer>> {
        self.opened.lock().clone()
    }
}

impl EffectProvider for SoftwareProvider {
    fn open(&self, session: i32) -> EffectResult<Arc<dyn EffectCapability>> {
        if session == 0 {
            return Err(EffectError::PermissionDenied { session });
        }
        if session < 0 {
            return Err(EffectError::Unavailable(format!("no audio session {}", session)));
        }
        let unit = Arc::new(SoftwareEqualizer::new(session, self.sample_rate, self.band_count));
        *self.opened.lock() = Some(Arc::clone(&unit));
        log::debug!("Opened software equalizer for session {}", session);
        Ok(unit)
    }
}
