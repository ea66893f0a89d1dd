//! The full band list presented to the user: hardware bands first, then
//! virtual bands synthesized on a log grid until the target count is reached.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use super::effect::{read_hardware_bands, EffectCapability};
use super::frequency::{bandwidth_for, generate_log_frequencies};
use super::{
    EqualizerBand, HardwareBand, MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ, TARGET_BAND_COUNT,
};
use crate::error::{BandError, EffectError, EffectResult};
use crate::snapshot::Snapshot;

/// What happened to a level write beyond the in-memory catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelWrite {
    /// Virtual band; stored in the catalog only.
    Virtual,
    /// Hardware band; the effect unit accepted the level.
    Forwarded,
    /// Hardware band; the effect unit rejected the write or is gone. The
    /// catalog keeps the new level regardless.
    NotForwarded(EffectError),
}

pub struct BandCatalog {
    bands: Snapshot<Vec<EqualizerBand>>,
    treble_level: AtomicI32,
    effect: Option<Arc<dyn EffectCapability>>,
    /// Held from the catalog update through the effect write, so the unit
    /// sees level writes in catalog order.
    writer: Mutex<()>,
}

/// Hardware bands verbatim, then virtual bands from the 20 Hz..20 kHz log
/// grid skipping centers already used by hardware. May come up short of the
/// target when the grid collides; that is accepted as is.
pub fn build_bands(hardware: &[HardwareBand]) -> Vec<EqualizerBand> {
    let mut bands: Vec<EqualizerBand> = hardware
        .iter()
        .enumerate()
        .map(|(position, hw)| {
            if hw.index != position {
                log::warn!(
                    "Hardware band reported index {} at position {}; using position",
                    hw.index, position
                );
            }
            EqualizerBand {
                index: position,
                ..EqualizerBand::from(*hw)
            }
        })
        .collect();

    let missing = TARGET_BAND_COUNT.saturating_sub(bands.len());
    if missing == 0 {
        return bands;
    }

    let used: HashSet<u32> = bands.iter().map(|b| b.center_hz).collect();
    let available: Vec<u32> =
        generate_log_frequencies(TARGET_BAND_COUNT, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ)
            .into_iter()
            .filter(|f| !used.contains(f))
            .collect();

    if available.len() < missing {
        log::debug!(
            "Only {} synthetic frequencies free for {} virtual bands",
            available.len(),
            missing
        );
    }

    let first_virtual = bands.len();
    bands.extend(available.into_iter().take(missing).enumerate().map(|(i, center)| {
        let half_width = bandwidth_for(center) / 2;
        EqualizerBand {
            index: first_virtual + i,
            center_hz: center,
            min_hz: center.saturating_sub(half_width).max(MIN_FREQUENCY_HZ),
            max_hz: center + half_width,
            level: 0,
            is_virtual: true,
        }
    }));

    bands
}

impl BandCatalog {
    /// A catalog with no effect unit behind it. Hardware-backed writes are
    /// kept in memory and reported as not forwarded.
    pub fn detached(hardware: &[HardwareBand]) -> Self {
        Self::with_effect(None, hardware)
    }

    /// Read the band layout from `effect` and build the catalog around it.
    pub fn attach(effect: Arc<dyn EffectCapability>) -> EffectResult<Self> {
        let hardware = read_hardware_bands(effect.as_ref())?;
        log::info!(
            "Equalizer exposes {} hardware bands, presenting {}",
            hardware.len(),
            TARGET_BAND_COUNT.max(hardware.len())
        );
        Ok(Self::with_effect(Some(effect), &hardware))
    }

    fn with_effect(effect: Option<Arc<dyn EffectCapability>>, hardware: &[HardwareBand]) -> Self {
        Self {
            bands: Snapshot::new(build_bands(hardware)),
            treble_level: AtomicI32::new(0),
            effect,
            writer: Mutex::new(()),
        }
    }

    /// Rebuild the band list, e.g. after the effect was re-initialized.
    /// Levels go back to 0.
    pub fn build(&self, hardware: &[HardwareBand]) {
        let _writer = self.writer.lock();
        self.bands.store(build_bands(hardware));
        self.treble_level.store(0, Ordering::Release);
    }

    pub fn bands(&self) -> Arc<Vec<EqualizerBand>> {
        self.bands.load()
    }

    /// The catalog sorted by center frequency for display. Indices are
    /// unchanged, so hardware bands interleave with virtual ones.
    pub fn bands_by_frequency(&self) -> Vec<EqualizerBand> {
        let mut sorted = self.bands.load().as_ref().clone();
        sorted.sort_by_key(|b| (b.center_hz, b.index));
        sorted
    }

    pub fn len(&self) -> usize {
        self.bands.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn version(&self) -> u64 {
        self.bands.version()
    }

    pub fn hardware_band_count(&self) -> usize {
        self.bands.load().iter().filter(|b| !b.is_virtual).count()
    }

    /// Set a band level, absorbing every failure. Out of range indices are
    /// logged and ignored.
    pub fn set_level(&self, index: usize, level: i32) {
        if let Err(err) = self.try_set_level(index, level) {
            log::warn!("Ignoring band level write: {}", err);
        }
    }

    pub fn try_set_level(&self, index: usize, level: i32) -> Result<LevelWrite, BandError> {
        let _writer = self.writer.lock();
        let is_virtual = self.bands.try_update(|bands| {
            let band = bands.get(index).ok_or(BandError::OutOfRangeIndex {
                index,
                len: bands.len(),
            })?;
            let is_virtual = band.is_virtual;
            let mut next = bands.clone();
            next[index].level = level;
            Ok((next, is_virtual))
        })?;

        let outcome = if is_virtual {
            LevelWrite::Virtual
        } else {
            self.forward(index, level)
        };

        self.derive_treble_level();
        Ok(outcome)
    }

    fn forward(&self, index: usize, level: i32) -> LevelWrite {
        let Some(effect) = self.effect.as_ref() else {
            log::debug!("No effect attached; band {} level kept in catalog only", index);
            return LevelWrite::NotForwarded(EffectError::Released);
        };
        match effect.set_band_level(index, level) {
            Ok(()) => LevelWrite::Forwarded,
            Err(err) => {
                log::error!("Effect rejected level {} for band {}: {}", level, index, err);
                LevelWrite::NotForwarded(err)
            }
        }
    }

    /// Average level of the treble bands (center >= 4 kHz), rounded. Also
    /// cached as the current treble level.
    pub fn derive_treble_level(&self) -> i32 {
        let bands = self.bands.load();
        let (sum, count) = bands
            .iter()
            .filter(|b| b.is_treble())
            .fold((0i64, 0i64), |(sum, count), b| (sum + b.level as i64, count + 1));
        let level = if count == 0 {
            0
        } else {
            (sum as f64 / count as f64).round() as i32
        };
        self.treble_level.store(level, Ordering::Release);
        level
    }

    /// Put every treble band at exactly `level`.
    pub fn apply_treble_level(&self, level: i32) {
        self.treble_level.store(level, Ordering::Release);
        let treble: Vec<usize> = self
            .bands
            .load()
            .iter()
            .filter(|b| b.is_treble())
            .map(|b| b.index)
            .collect();
        for index in treble {
            self.set_level(index, level);
        }
    }

    /// Last derived or applied treble level.
    pub fn treble_level(&self) -> i32 {
        self.treble_level.load(Ordering::Acquire)
    }
}
