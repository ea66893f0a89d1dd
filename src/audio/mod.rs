pub mod analysis;
pub mod capture;
pub mod decode;
pub mod features;
pub mod performance;
pub mod smoothing;
pub mod visualizer;
