//! Pipeline orchestration
//!
//! Per-frame conversion (raw Bayer frame to GeoTIFF) and the field run that
//! strings frames, mosaic, resolution tiers and tile pyramids together.

mod bin_to_geotiff;
mod config;
mod field_mosaic;

#[cfg(test)]
mod tests;

pub use bin_to_geotiff::BinToGeoTiffPipeline;
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use field_mosaic::{Capture, FieldMosaicPipeline, MOSAIC_MANIFEST, RUN_REPORT, discover_captures};
