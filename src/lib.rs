//! Stereo gantry frames to geo-referenced field mosaics.

pub mod image_pipeline;
pub mod logger;
