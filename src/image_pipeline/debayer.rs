//! Debayering module for converting Bayer pattern stereo frames to RGB

pub mod cpu_debayer;
pub mod types;

pub use cpu_debayer::CpuDebayer;
pub use types::RgbImageData;
