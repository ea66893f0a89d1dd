//! The effect unit the catalog and engine talk to. Implementations report
//! failures as [`EffectError`] values; nothing here panics or unwinds.

use std::sync::Arc;

use serde::Serialize;

use super::HardwareBand;
use crate::error::{EffectError, EffectResult};

pub const MAX_BASS_STRENGTH: u16 = 1000;
pub const MAX_VIRTUALIZER_STRENGTH: u16 = 1000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ReverbPreset {
    #[default]
    None,
    SmallRoom,
    MediumRoom,
    LargeRoom,
    MediumHall,
    LargeHall,
    Plate,
}

impl ReverbPreset {
    /// Map a 0..=100 reverb amount to the nearest preset.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Self::None,
            1..=24 => Self::SmallRoom,
            25..=49 => Self::MediumRoom,
            50..=74 => Self::LargeRoom,
            _ => Self::Plate,
        }
    }
}

pub trait EffectCapability: Send + Sync {
    fn band_count(&self) -> usize;

    /// Center frequency of a physical band in millihertz.
    fn center_frequency(&self, band: usize) -> EffectResult<u32>;

    /// `(min, max)` of a physical band in millihertz.
    fn frequency_range(&self, band: usize) -> EffectResult<(u32, u32)>;

    /// Inclusive level bounds accepted by `set_band_level`, in millibels.
    fn band_level_range(&self) -> (i32, i32) {
        (-1500, 1500)
    }

    fn set_band_level(&self, band: usize, level: i32) -> EffectResult<()>;

    fn set_bass_strength(&self, strength: u16) -> EffectResult<()>;

    fn set_virtualizer_strength(&self, strength: u16) -> EffectResult<()>;

    fn set_reverb_preset(&self, preset: ReverbPreset) -> EffectResult<()>;
}

/// Opens an effect unit for an audio session.
pub trait EffectProvider {
    fn open(&self, session: i32) -> EffectResult<Arc<dyn EffectCapability>>;
}

impl<P: EffectProvider + ?Sized> EffectProvider for Arc<P> {
    fn open(&self, session: i32) -> EffectResult<Arc<dyn EffectCapability>> {
        (**self).open(session)
    }
}

/// Read the physical band layout, converting millihertz to Hz.
pub fn read_hardware_bands(effect: &dyn EffectCapability) -> EffectResult<Vec<HardwareBand>> {
    (0..effect.band_count())
        .map(|index| {
            let center = effect.center_frequency(index)?;
            let (min, max) = effect.frequency_range(index)?;
            Ok(HardwareBand {
                index,
                center_hz: center / 1000,
                min_hz: min / 1000,
                max_hz: max / 1000,
            })
        })
        .collect::<Result<Vec<_>, EffectError>>()
}
