//! Equalizer band model and spectrum analysis core.
//!
//! [`equalizer`] presents a fixed-size logarithmic band view over an effect
//! unit that may expose far fewer physical bands. [`audio`] turns raw capture
//! buffers into normalized visual series and smooths them frame over frame.

pub mod audio;
pub mod encode;
pub mod equalizer;
pub mod error;
pub mod snapshot;

pub use audio::analysis::SpectrumAnalyzer;
pub use audio::features::SpectrumFrame;
pub use audio::performance::{PerformanceConfig, PerformanceMode};
pub use audio::smoothing::SignalSmoother;
pub use equalizer::catalog::BandCatalog;
pub use equalizer::frequency::{bandwidth_for, generate_log_frequencies};
pub use equalizer::EqualizerBand;
