//! Session-level effect control: attaching the effect unit for an audio
//! session, the band catalog that lives with it, and the simple
//! pass-through effects (bass boost, virtualizer, reverb, 8D panning).

use parking_lot::RwLock;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::catalog::BandCatalog;
use super::effect::{
    EffectCapability, EffectProvider, ReverbPreset, MAX_BASS_STRENGTH, MAX_VIRTUALIZER_STRENGTH,
};
use super::EqualizerBand;
use crate::error::EffectError;

/// The global output mix.
pub const SYSTEM_AUDIO_SESSION: i32 = 0;
const ROTATION_STEP: f32 = 0.1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    SystemAudio,
    #[default]
    FilePlayback,
}

struct Attached {
    session: i32,
    effect: Arc<dyn EffectCapability>,
    catalog: Arc<BandCatalog>,
}

pub struct EffectEngine {
    provider: Box<dyn EffectProvider + Send + Sync>,
    attached: RwLock<Option<Attached>>,
    mode: RwLock<AudioMode>,
    initialization_failed: AtomicBool,
    bass_boost: AtomicU16,
    virtualizer: AtomicU16,
    reverb_level: AtomicU8,
    rotation: RwLock<Option<f32>>,
}

impl EffectEngine {
    pub fn new(provider: impl EffectProvider + Send + Sync + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            attached: RwLock::new(None),
            mode: RwLock::new(AudioMode::FilePlayback),
            initialization_failed: AtomicBool::new(false),
            bass_boost: AtomicU16::new(0),
            virtualizer: AtomicU16::new(0),
            reverb_level: AtomicU8::new(0),
            rotation: RwLock::new(None),
        }
    }

    pub fn mode(&self) -> AudioMode {
        *self.mode.read()
    }

    fn set_mode(&self, mode: AudioMode) {
        *self.mode.write() = mode;
    }

    /// Whether the last attach failed, e.g. system audio without the needed
    /// privileges. The caller decides how to tell the user.
    pub fn initialization_failed(&self) -> bool {
        self.initialization_failed.load(Ordering::Acquire)
    }

    pub fn session(&self) -> Option<i32> {
        self.attached
            .read()
            .as_ref()
            .map(|a| a.session)
    }

    /// Switch between the system mix and a playback session. A file session
    /// of 0 means the player has not produced one yet; nothing is attached.
    pub fn switch_mode(&self, mode: AudioMode, session: i32) {
        self.set_mode(mode);
        let target = match mode {
            AudioMode::SystemAudio => SYSTEM_AUDIO_SESSION,
            AudioMode::FilePlayback => {
                if session == SYSTEM_AUDIO_SESSION {
                    log::warn!("File playback needs a media session; waiting for one");
                    self.initialization_failed.store(false, Ordering::Release);
                    return;
                }
                session
            }
        };

        if self.session() != Some(target) {
            self.release();
            self.attach(target);
        }
    }

    fn attach(&self, session: i32) {
        if session == SYSTEM_AUDIO_SESSION {
            log::warn!("Attaching effects to the system mix (session 0); this needs elevated access");
        }

        let attached = self.provider.open(session).and_then(|effect| {
            let catalog = BandCatalog::attach(Arc::clone(&effect))?;
            Ok(Attached {
                session,
                effect,
                catalog: Arc::new(catalog),
            })
        });

        match attached {
            Ok(attached) => {
                self.restore_effects(attached.effect.as_ref());
                *self.attached.write() = Some(attached);
                self.initialization_failed.store(false, Ordering::Release);
                log::info!("Audio effects attached to session {}", session);
            }
            Err(err @ EffectError::PermissionDenied { .. }) => {
                log::error!("Cannot attach effects to session {}: {}", session, err);
                self.initialization_failed.store(true, Ordering::Release);
                if self.mode() == AudioMode::SystemAudio {
                    log::warn!("Falling back to file playback mode");
                    self.set_mode(AudioMode::FilePlayback);
                }
            }
            Err(err) => {
                log::error!("Error initializing audio effects for session {}: {}", session, err);
                self.initialization_failed.store(true, Ordering::Release);
            }
        }
    }

    /// Push the engine's current pass-through settings to a fresh unit.
    fn restore_effects(&self, effect: &dyn EffectCapability) {
        let writes = [
            effect.set_bass_strength(self.bass_boost()),
            effect.set_virtualizer_strength(self.virtualizer()),
            effect.set_reverb_preset(self.reverb_preset()),
        ];
        for err in writes.into_iter().filter_map(Result::err) {
            log::warn!("Could not restore effect setting: {}", err);
        }
    }

    /// Drop the effect unit and its catalog.
    pub fn release(&self) {
        if let Some(old) = self.attached.write().take() {
            log::debug!("Released audio effects for session {}", old.session);
        }
    }

    pub fn catalog(&self) -> Option<Arc<BandCatalog>> {
        self.attached
            .read()
            .as_ref()
            .map(|a| Arc::clone(&a.catalog))
    }

    fn effect(&self) -> Option<Arc<dyn EffectCapability>> {
        self.attached
            .read()
            .as_ref()
            .map(|a| Arc::clone(&a.effect))
    }

    pub fn bands(&self) -> Vec<EqualizerBand> {
        self.catalog()
            .map(|c| c.bands().as_ref().clone())
            .unwrap_or_default()
    }

    /// Clamp to the unit's level range, then write through the catalog.
    pub fn set_band_level(&self, index: usize, level: i32) {
        let (Some(effect), Some(catalog)) = (self.effect(), self.catalog()) else {
            log::warn!("No equalizer attached; ignoring level for band {}", index);
            return;
        };
        let (min, max) = effect.band_level_range();
        catalog.set_level(index, level.clamp(min, max));
    }

    pub fn set_treble(&self, level: i32) {
        let (Some(effect), Some(catalog)) = (self.effect(), self.catalog()) else {
            log::warn!("No equalizer attached; ignoring treble level");
            return;
        };
        let (min, max) = effect.band_level_range();
        catalog.apply_treble_level(level.clamp(min, max));
    }

    pub fn treble_level(&self) -> i32 {
        self.catalog().map(|c| c.treble_level()).unwrap_or(0)
    }

    pub fn set_bass_boost(&self, strength: i32) {
        let strength = strength.clamp(0, MAX_BASS_STRENGTH as i32) as u16;
        self.bass_boost.store(strength, Ordering::Release);
        if let Some(Err(err)) = self.effect().map(|e| e.set_bass_strength(strength)) {
            log::error!("Error setting bass boost: {}", err);
        }
    }

    pub fn bass_boost(&self) -> u16 {
        self.bass_boost.load(Ordering::Acquire)
    }

    pub fn set_virtualizer(&self, strength: i32) {
        let strength = strength.clamp(0, MAX_VIRTUALIZER_STRENGTH as i32) as u16;
        self.virtualizer.store(strength, Ordering::Release);
        if let Some(Err(err)) = self.effect().map(|e| e.set_virtualizer_strength(strength)) {
            log::error!("Error setting 3D effect: {}", err);
        }
    }

    pub fn virtualizer(&self) -> u16 {
        self.virtualizer.load(Ordering::Acquire)
    }

    /// Reverb amount 0..=100, mapped onto a preset.
    pub fn set_reverb(&self, level: i32) {
        let level = level.clamp(0, 100) as u8;
        self.reverb_level.store(level, Ordering::Release);
        let preset = ReverbPreset::from_level(level);
        if let Some(Err(err)) = self.effect().map(|e| e.set_reverb_preset(preset)) {
            log::error!("Error setting reverb: {}", err);
        }
    }

    pub fn reverb_level(&self) -> u8 {
        self.reverb_level.load(Ordering::Acquire)
    }

    pub fn reverb_preset(&self) -> ReverbPreset {
        ReverbPreset::from_level(self.reverb_level())
    }

    pub fn set_8d(&self, enabled: bool) {
        *self.rotation.write() =
            if enabled { Some(0.0) } else { None };
    }

    pub fn is_8d_enabled(&self) -> bool {
        self.rotation.read().is_some()
    }

    /// Rotate interleaved stereo PCM around the listener. Each call advances
    /// the rotation by one step. A trailing unpaired sample is silenced.
    pub fn process_8d(&self, frames: &mut [i16]) {
        let angle = {
            let mut rotation = self.rotation.write();
            let Some(angle) = rotation.as_mut() else {
                return;
            };
            *angle += ROTATION_STEP;
            if *angle > 2.0 * PI {
                *angle -= 2.0 * PI;
            }
            *angle
        };

        let left_gain = (angle.cos() + 1.0) / 2.0;
        let right_gain = (angle.sin() + 1.0) / 2.0;
        let mut pairs = frames.chunks_exact_mut(2);
        for pair in &mut pairs {
            pair[0] = (pair[0] as f32 * left_gain) as i16;
            pair[1] = (pair[1] as f32 * right_gain) as i16;
        }
        for odd in pairs.into_remainder() {
            *odd = 0;
        }
    }
}
