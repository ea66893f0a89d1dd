use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use super::analysis::{analyze_magnitude, analyze_waveform};
use super::capture::{CaptureListener, CaptureSettings, CaptureSource};
use super::features::SpectrumFrame;
use super::performance::PerformanceConfig;
use crate::error::CaptureError;
use crate::snapshot::Snapshot;

/// Rate assumed until the source reports a valid one.
pub const DEFAULT_SAMPLING_RATE: u32 = 44100;

#[derive(Default)]
struct SourceSlot {
    source: Option<Box<dyn CaptureSource>>,
    session: Option<i32>,
}

/// Keeps the latest [`SpectrumFrame`] for a capture session and owns the
/// source delivering it. Capture callbacks write, the renderer reads through
/// [`Visualizer::frame`].
pub struct Visualizer {
    config: RwLock<PerformanceConfig>,
    settings: RwLock<Option<CaptureSettings>>,
    sampling_rate: AtomicU32,
    initialization_failed: AtomicBool,
    frame: Snapshot<SpectrumFrame>,
    slot: Mutex<SourceSlot>,
}

impl Visualizer {
    pub fn new(config: PerformanceConfig) -> Self {
        Self {
            frame: Snapshot::new(SpectrumFrame::silent(config.waveform_points)),
            config: RwLock::new(config),
            settings: RwLock::new(None),
            sampling_rate: AtomicU32::new(DEFAULT_SAMPLING_RATE),
            initialization_failed: AtomicBool::new(false),
            slot: Mutex::new(SourceSlot::default()),
        }
    }

    /// Hand over the capture source. Any previous source is released.
    pub fn set_source(&self, source: Box<dyn CaptureSource>) {
        let mut slot = self.lock_slot();
        if let Some(mut old) = slot.source.take() {
            old.release();
        }
        slot.source = Some(source);
        slot.session = None;
        *self.settings.write() = None;
    }

    /// Attach to `session`, releasing any current attachment first. Failure
    /// is reported through [`Visualizer::initialization_failed`].
    pub fn attach(&self, session: i32) -> bool {
        let mut slot = self.lock_slot();
        self.attach_locked(&mut slot, session)
    }

    fn attach_locked(&self, slot: &mut SourceSlot, session: i32) -> bool {
        let Some(source) = slot.source.as_mut() else {
            log::error!("No capture source to attach to session {}", session);
            self.initialization_failed.store(true, Ordering::Release);
            return false;
        };
        if slot.session.take().is_some() {
            source.release();
        }

        let config = self.config();
        let settings = CaptureSettings::from_config(&config, source.max_capture_rate());
        match source.attach(session, settings) {
            Ok(()) => {
                log::info!(
                    "Capture attached to session {} (size {}, rate {} mHz)",
                    session,
                    settings.capture_size,
                    settings.capture_rate
                );
                slot.session = Some(session);
                *self.settings.write() = Some(settings);
                self.initialization_failed.store(false, Ordering::Release);
                true
            }
            Err(e) => {
                log::error!("Capture attach to session {} failed: {}", session, e);
                *self.settings.write() = None;
                self.initialization_failed.store(true, Ordering::Release);
                false
            }
        }
    }

    pub fn release(&self) {
        let mut slot = self.lock_slot();
        if slot.session.take().is_some() {
            if let Some(source) = slot.source.as_mut() {
                source.release();
            }
        }
        *self.settings.write() = None;
    }

    /// Pull one period from the source into the current frame.
    pub fn pump(&self) -> Result<bool, CaptureError> {
        let mut slot = self.lock_slot();
        if slot.session.is_none() {
            return Err(CaptureError::Released);
        }
        let source = slot.source.as_mut().ok_or(CaptureError::Released)?;
        source.deliver_next(self)
    }

    /// Capture size and rate only change on attach, so a new config tears
    /// down the current attachment and builds it again.
    pub fn update_performance_config(&self, config: PerformanceConfig) {
        *self.config.write() = config;
        let mut slot = self.lock_slot();
        if let Some(session) = slot.session {
            log::info!("Performance config changed, reattaching session {}", session);
            self.attach_locked(&mut slot, session);
        }
    }

    pub fn config(&self) -> PerformanceConfig {
        *self.config.read()
    }

    pub fn capture_settings(&self) -> Option<CaptureSettings> {
        *self.settings.read()
    }

    pub fn session(&self) -> Option<i32> {
        self.lock_slot().session
    }

    pub fn frame(&self) -> Arc<SpectrumFrame> {
        self.frame.load()
    }

    pub fn version(&self) -> u64 {
        self.frame.version()
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate.load(Ordering::Acquire)
    }

    pub fn initialization_failed(&self) -> bool {
        self.initialization_failed.load(Ordering::Acquire)
    }

    fn lock_slot(&self) -> parking_lot::MutexGuard<'_, SourceSlot> {
        self.slot.lock()
    }

    fn note_sampling_rate(&self, rate: u32) -> u32 {
        if rate > 0 {
            self.sampling_rate.store(rate, Ordering::Release);
            rate
        } else {
            let kept = self.sampling_rate();
            log::debug!("Ignoring sampling rate {}, keeping {}", rate, kept);
            kept
        }
    }
}

impl CaptureListener for Visualizer {
    fn on_waveform(&self, waveform: &[u8], sampling_rate: u32) {
        self.note_sampling_rate(sampling_rate);
        let points = self.config().waveform_points;
        let series = analyze_waveform(waveform, points);
        self.frame.update(|frame| {
            let mut next = frame.clone();
            next.waveform = series;
            (next, ())
        });
    }

    fn on_magnitude(&self, fft: &[u8], sampling_rate: u32) {
        let rate = self.note_sampling_rate(sampling_rate);
        let config = self.config();
        let capture_size = self
            .capture_settings()
            .map_or_else(|| config.effective_capture_size(), |s| s.capture_size);
        let features = analyze_magnitude(fft, rate, capture_size, &config);
        self.frame.update(|frame| {
            let next = SpectrumFrame {
                waveform: frame.waveform.clone(),
                full_spectrum: features.full_spectrum,
                bass_buckets: features.bass_buckets,
                treble_buckets: features.treble_buckets,
                frequency_bands: features.frequency_bands,
                sub_bass_wave: features
                    .sub_bass_wave
                    .unwrap_or_else(|| frame.sub_bass_wave.clone()),
            };
            (next, ())
        });
    }
}

impl Drop for Visualizer {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::SUB_BASS_POINTS;
    use crate::audio::performance::PerformanceMode;
    use std::collections::VecDeque;

    struct Period {
        waveform: Vec<u8>,
        fft: Vec<u8>,
        rate: u32,
    }

    /// Capture source replaying a fixed script and logging lifecycle calls.
    struct ScriptedSource {
        periods: VecDeque<Period>,
        events: Arc<Mutex<Vec<String>>>,
        deny_session: Option<i32>,
    }

    impl ScriptedSource {
        fn new(periods: Vec<Period>) -> (Self, Arc<Mutex<Vec<String>>>) {
            let events = Arc::new(Mutex::new(Vec::new()));
            let source = Self {
                periods: periods.into(),
                events: Arc::clone(&events),
                deny_session: None,
            };
            (source, events)
        }
    }

    impl CaptureSource for ScriptedSource {
        fn max_capture_rate(&self) -> u32 {
            20000
        }

        fn attach(&mut self, session: i32, settings: CaptureSettings) -> Result<(), CaptureError> {
            if self.deny_session == Some(session) {
                return Err(CaptureError::PermissionDenied { session });
            }
            self.events.lock().push(format!(
                "attach {} {} {}",
                session, settings.capture_size, settings.capture_rate
            ));
            Ok(())
        }

        fn release(&mut self) {
            self.events.lock().push("release".into());
        }

        fn deliver_next(&mut self, listener: &dyn CaptureListener) -> Result<bool, CaptureError> {
            match self.periods.pop_front() {
                Some(period) => {
                    listener.on_waveform(&period.waveform, period.rate);
                    listener.on_magnitude(&period.fft, period.rate);
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    /// FFT bytes with every bin at the same magnitude.
    fn flat_fft(bins: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(bins * 2);
        for _ in 0..bins {
            bytes.push(60u8);
            bytes.push(0u8);
        }
        bytes
    }

    fn period(rate: u32) -> Period {
        Period {
            waveform: vec![0u8; 128],
            fft: flat_fft(512),
            rate,
        }
    }

    #[test]
    fn frames_follow_deliveries() {
        let visualizer = Visualizer::new(PerformanceConfig::default());
        let (source, _) = ScriptedSource::new(vec![period(48000)]);
        visualizer.set_source(Box::new(source));
        assert!(visualizer.attach(5));

        let before = visualizer.version();
        assert!(visualizer.pump().unwrap());
        assert!(visualizer.version() > before);
        assert!(!visualizer.pump().unwrap());

        let frame = visualizer.frame();
        assert_eq!(frame.waveform.len(), 128);
        assert!(frame.waveform.iter().all(|&v| (v - 0.5).abs() < 1e-6));
        assert_eq!(frame.full_spectrum.len(), 512);
        assert_eq!(frame.sub_bass_wave.len(), SUB_BASS_POINTS);
        assert_eq!(visualizer.sampling_rate(), 48000);
    }

    #[test]
    fn invalid_sampling_rate_keeps_last_one() {
        let visualizer = Visualizer::new(PerformanceConfig::default());
        let (source, _) = ScriptedSource::new(vec![period(0), period(32000), period(0)]);
        visualizer.set_source(Box::new(source));
        visualizer.attach(1);

        visualizer.pump().unwrap();
        assert_eq!(visualizer.sampling_rate(), DEFAULT_SAMPLING_RATE);
        visualizer.pump().unwrap();
        visualizer.pump().unwrap();
        assert_eq!(visualizer.sampling_rate(), 32000);
    }

    #[test]
    fn disabled_sub_bass_keeps_previous_wave() {
        let visualizer = Visualizer::new(PerformanceConfig::default());
        let (source, _) = ScriptedSource::new(vec![period(44100), period(44100)]);
        visualizer.set_source(Box::new(source));
        visualizer.attach(1);
        visualizer.pump().unwrap();
        let wave = visualizer.frame().sub_bass_wave.clone();
        assert!(wave.iter().any(|&v| v > 0.0));

        let mut config = PerformanceConfig::default();
        config.enable_sub_bass = false;
        visualizer.update_performance_config(config);
        visualizer.pump().unwrap();
        assert_eq!(visualizer.frame().sub_bass_wave, wave);
    }

    #[test]
    fn config_change_reattaches_sequentially() {
        let visualizer = Visualizer::new(PerformanceConfig::default());
        let (source, events) = ScriptedSource::new(Vec::new());
        visualizer.set_source(Box::new(source));
        visualizer.attach(3);
        visualizer.update_performance_config(PerformanceConfig::for_mode(PerformanceMode::Low));

        assert_eq!(
            *events.lock(),
            vec!["attach 3 1024 20000", "release", "attach 3 512 10000"]
        );
        assert_eq!(
            visualizer.capture_settings(),
            Some(CaptureSettings {
                capture_size: 512,
                capture_rate: 10000
            })
        );
    }

    #[test]
    fn rate_is_clamped_to_source_maximum() {
        let visualizer = Visualizer::new(PerformanceConfig::for_mode(PerformanceMode::High));
        let (source, events) = ScriptedSource::new(Vec::new());
        visualizer.set_source(Box::new(source));
        visualizer.attach(2);
        assert_eq!(*events.lock(), vec!["attach 2 1024 20000"]);
    }

    #[test]
    fn config_change_while_detached_does_not_attach() {
        let visualizer = Visualizer::new(PerformanceConfig::default());
        let (source, events) = ScriptedSource::new(Vec::new());
        visualizer.set_source(Box::new(source));
        visualizer.update_performance_config(PerformanceConfig::for_mode(PerformanceMode::High));
        assert!(events.lock().is_empty());
        assert!(visualizer.config().enable_glow);
    }

    #[test]
    fn failed_attach_raises_flag() {
        let visualizer = Visualizer::new(PerformanceConfig::default());
        let (mut source, _) = ScriptedSource::new(Vec::new());
        source.deny_session = Some(0);
        visualizer.set_source(Box::new(source));

        assert!(!visualizer.attach(0));
        assert!(visualizer.initialization_failed());
        assert_eq!(visualizer.pump(), Err(CaptureError::Released));

        assert!(visualizer.attach(4));
        assert!(!visualizer.initialization_failed());
        assert_eq!(visualizer.session(), Some(4));
    }

    #[test]
    fn attach_without_source_fails() {
        let visualizer = Visualizer::new(PerformanceConfig::default());
        assert!(!visualizer.attach(1));
        assert!(visualizer.initialization_failed());
    }
}
