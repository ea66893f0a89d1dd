pub mod catalog;
pub mod effect;
pub mod engine;
pub mod frequency;
pub mod software;

use serde::Serialize;

/// Number of bands presented regardless of the hardware band count.
pub const TARGET_BAND_COUNT: usize = 20;
pub const MIN_FREQUENCY_HZ: u32 = 20;
pub const MAX_FREQUENCY_HZ: u32 = 20000;
/// Bands centered at or above this frequency follow the treble control.
pub const TREBLE_THRESHOLD_HZ: u32 = 4000;

/// One controllable slot in the catalog. `level` is in effect units
/// (millibels for the usual equalizer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EqualizerBand {
    pub index: usize,
    pub center_hz: u32,
    pub min_hz: u32,
    pub max_hz: u32,
    pub level: i32,
    pub is_virtual: bool,
}

/// Band metadata as reported by the effect unit, already scaled to Hz.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HardwareBand {
    pub index: usize,
    pub center_hz: u32,
    pub min_hz: u32,
    pub max_hz: u32,
}

impl EqualizerBand {
    pub fn is_treble(&self) -> bool {
        self.center_hz >= TREBLE_THRESHOLD_HZ
    }
}

impl From<HardwareBand> for EqualizerBand {
    fn from(hw: HardwareBand) -> Self {
        Self {
            index: hw.index,
            center_hz: hw.center_hz,
            min_hz: hw.min_hz,
            max_hz: hw.max_hz,
            level: 0,
            is_virtual: false,
        }
    }
}
