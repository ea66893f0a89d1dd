//! Capture transport: something that hands out waveform and FFT byte
//! buffers at a fixed cadence for one audio session.

use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use super::performance::{PerformanceConfig, ALLOWED_CAPTURE_SIZES, MIN_CAPTURE_RATE};
use crate::error::CaptureError;

/// Highest rate a file capture will deliver at, in millihertz.
pub const FILE_MAX_CAPTURE_RATE: u32 = 20000;

/// Receives one capture period's buffers. `sampling_rate` is in Hz; `0`
/// means the source could not tell.
pub trait CaptureListener {
    fn on_waveform(&self, waveform: &[u8], sampling_rate: u32);
    fn on_magnitude(&self, fft: &[u8], sampling_rate: u32);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureSettings {
    pub capture_size: usize,
    /// Millihertz, like the transport reports it
    pub capture_rate: u32,
}

impl CaptureSettings {
    pub fn from_config(config: &PerformanceConfig, max_capture_rate: u32) -> Self {
        Self {
            capture_size: config.effective_capture_size(),
            capture_rate: config.effective_capture_rate(max_capture_rate),
        }
    }
}

pub trait CaptureSource: Send {
    fn max_capture_rate(&self) -> u32;
    fn attach(&mut self, session: i32, settings: CaptureSettings) -> Result<(), CaptureError>;
    fn release(&mut self);
    /// Deliver the next period to `listener`. `Ok(false)` once the source
    /// has nothing more to give.
    fn deliver_next(&mut self, listener: &dyn CaptureListener) -> Result<bool, CaptureError>;
}

struct CapturePeriod {
    waveform: Vec<u8>,
    fft: Vec<u8>,
}

struct Attachment {
    session: i32,
    settings: CaptureSettings,
    periods: Vec<CapturePeriod>,
    cursor: usize,
}

/// Capture over decoded mono samples. Periods are computed up front on
/// attach, one per hop of `sample_rate / capture_rate` samples.
pub struct FileCapture {
    samples: Vec<f32>,
    sample_rate: u32,
    attachment: Option<Attachment>,
}

impl FileCapture {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            attachment: None,
        }
    }

    /// Replace the audio behind the capture, e.g. after the equalizer
    /// processed it. Takes effect on the next attach.
    pub fn set_samples(&mut self, samples: Vec<f32>) {
        self.samples = samples;
    }

    pub fn session(&self) -> Option<i32> {
        self.attachment.as_ref().map(|a| a.session)
    }

    pub fn settings(&self) -> Option<CaptureSettings> {
        self.attachment.as_ref().map(|a| a.settings)
    }

    pub fn period_count(&self) -> usize {
        self.attachment.as_ref().map_or(0, |a| a.periods.len())
    }

    /// Samples between period starts for the given rate.
    pub fn hop_size(&self, capture_rate: u32) -> usize {
        let rate = capture_rate.max(MIN_CAPTURE_RATE) as u64;
        ((self.sample_rate as u64 * 1000) / rate).max(1) as usize
    }

    fn build_periods(&self, settings: CaptureSettings) -> Vec<CapturePeriod> {
        let size = settings.capture_size;
        let hop = self.hop_size(settings.capture_rate);
        let count = self.samples.len().div_ceil(hop);
        let hann = hann_window(size);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(size);
        // Full-scale sine under a Hann window peaks at size / 4.
        let scale = 127.0 / (size as f32 / 4.0);

        (0..count)
            .into_par_iter()
            .map(|period| {
                let start = period * hop;
                let end = (start + size).min(self.samples.len());
                let window = &self.samples[start..end];

                let mut waveform = vec![0u8; size];
                for (byte, &sample) in waveform.iter_mut().zip(window) {
                    *byte = (sample.clamp(-1.0, 1.0) * 127.0).round() as i8 as u8;
                }

                let mut buffer = vec![Complex::new(0.0f32, 0.0); size];
                for (i, &sample) in window.iter().enumerate() {
                    buffer[i] = Complex::new(sample * hann[i], 0.0);
                }
                fft.process(&mut buffer);

                let mut bytes = Vec::with_capacity(size);
                for bin in &buffer[..size / 2] {
                    bytes.push(to_signed_byte(bin.re * scale));
                    bytes.push(to_signed_byte(bin.im * scale));
                }

                CapturePeriod {
                    waveform,
                    fft: bytes,
                }
            })
            .collect()
    }
}

impl CaptureSource for FileCapture {
    fn max_capture_rate(&self) -> u32 {
        FILE_MAX_CAPTURE_RATE
    }

    fn attach(&mut self, session: i32, settings: CaptureSettings) -> Result<(), CaptureError> {
        if session == 0 {
            return Err(CaptureError::PermissionDenied { session });
        }
        if session < 0 {
            return Err(CaptureError::InvalidSession(session));
        }
        if !ALLOWED_CAPTURE_SIZES.contains(&settings.capture_size) {
            return Err(CaptureError::Unsupported(format!(
                "capture size {}",
                settings.capture_size
            )));
        }
        if self.sample_rate == 0 {
            return Err(CaptureError::Unsupported("unknown sample rate".into()));
        }

        let periods = self.build_periods(settings);
        log::debug!(
            "File capture attached to session {}: {} periods of {} samples",
            session,
            periods.len(),
            settings.capture_size
        );
        self.attachment = Some(Attachment {
            session,
            settings,
            periods,
            cursor: 0,
        });
        Ok(())
    }

    fn release(&mut self) {
        if let Some(attachment) = self.attachment.take() {
            log::debug!("File capture released from session {}", attachment.session);
        }
    }

    fn deliver_next(&mut self, listener: &dyn CaptureListener) -> Result<bool, CaptureError> {
        let attachment = self.attachment.as_mut().ok_or(CaptureError::Released)?;
        let Some(period) = attachment.periods.get(attachment.cursor) else {
            return Ok(false);
        };
        listener.on_waveform(&period.waveform, self.sample_rate);
        listener.on_magnitude(&period.fft, self.sample_rate);
        attachment.cursor += 1;
        Ok(true)
    }
}

fn to_signed_byte(value: f32) -> u8 {
    value.round().clamp(-128.0, 127.0) as i8 as u8
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect {
        waveforms: Mutex<Vec<Vec<u8>>>,
        ffts: Mutex<Vec<Vec<u8>>>,
    }

    impl CaptureListener for Collect {
        fn on_waveform(&self, waveform: &[u8], _sampling_rate: u32) {
            self.waveforms.lock().push(waveform.to_vec());
        }

        fn on_magnitude(&self, fft: &[u8], _sampling_rate: u32) {
            self.ffts.lock().push(fft.to_vec());
        }
    }

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn settings(size: usize, rate: u32) -> CaptureSettings {
        CaptureSettings {
            capture_size: size,
            capture_rate: rate,
        }
    }

    #[test]
    fn system_session_is_denied() {
        let mut capture = FileCapture::new(vec![0.0; 4096], 44100);
        assert_eq!(
            capture.attach(0, settings(1024, 20000)),
            Err(CaptureError::PermissionDenied { session: 0 })
        );
        assert_eq!(
            capture.attach(-3, settings(1024, 20000)),
            Err(CaptureError::InvalidSession(-3))
        );
        assert!(capture.session().is_none());
    }

    #[test]
    fn rejects_unknown_capture_size() {
        let mut capture = FileCapture::new(vec![0.0; 4096], 44100);
        assert!(matches!(
            capture.attach(1, settings(1000, 20000)),
            Err(CaptureError::Unsupported(_))
        ));
    }

    #[test]
    fn delivers_until_exhausted() {
        // 20 callbacks per second over one second of audio.
        let mut capture = FileCapture::new(vec![0.0; 8000], 8000);
        capture.attach(1, settings(256, 20000)).unwrap();
        assert_eq!(capture.hop_size(20000), 400);
        assert_eq!(capture.period_count(), 20);

        let listener = Collect::default();
        let mut delivered = 0;
        while capture.deliver_next(&listener).unwrap() {
            delivered += 1;
        }
        assert_eq!(delivered, 20);
        assert_eq!(listener.waveforms.lock().len(), 20);
        let ffts = listener.ffts.lock();
        assert!(ffts.iter().all(|fft| fft.len() == 256));
    }

    #[test]
    fn released_source_refuses_delivery() {
        let mut capture = FileCapture::new(vec![0.0; 2048], 44100);
        capture.attach(7, settings(128, 10000)).unwrap();
        capture.release();
        assert_eq!(
            capture.deliver_next(&Collect::default()),
            Err(CaptureError::Released)
        );
    }

    #[test]
    fn sine_peaks_in_its_bin() {
        let sample_rate = 8192;
        let size = 1024;
        // 8 Hz per bin, so 800 Hz lands on bin 100.
        let mut capture = FileCapture::new(sine(800.0, sample_rate, size), sample_rate);
        capture.attach(1, settings(size, 20000)).unwrap();
        let listener = Collect::default();
        assert!(capture.deliver_next(&listener).unwrap());

        let ffts = listener.ffts.lock();
        let fft = &ffts[0];
        let magnitude = |bin: usize| {
            let re = fft[2 * bin] as i8 as f32;
            let im = fft[2 * bin + 1] as i8 as f32;
            (re * re + im * im).sqrt()
        };
        let peak = (0..size / 2)
            .max_by(|&a, &b| magnitude(a).total_cmp(&magnitude(b)))
            .unwrap();
        assert_eq!(peak, 100);
        assert!(magnitude(100) > 100.0);
    }

    #[test]
    fn waveform_bytes_are_signed() {
        let mut capture = FileCapture::new(vec![1.0, -1.0, 0.0, 0.5], 1000);
        capture.attach(1, settings(128, 1000)).unwrap();
        let listener = Collect::default();
        capture.deliver_next(&listener).unwrap();
        let waveforms = listener.waveforms.lock();
        let first: Vec<i8> = waveforms[0][..4].iter().map(|&b| b as i8).collect();
        assert_eq!(first, vec![127, -127, 0, 64]);
    }
}
