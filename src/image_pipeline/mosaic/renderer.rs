use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::geo::{GeoBounds, GeoTransform};
use crate::image_pipeline::mosaic::sampler::MosaicSampler;
use crate::image_pipeline::mosaic::types::VirtualMosaic;
use crate::image_pipeline::tiff::{GeoTiffStripWriter, RasterWriteOptions};

/// Output scale as a percentage of the finest member resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionTier {
    Thumbnail,
    Medium,
    Full,
}

impl ResolutionTier {
    pub const ALL: [ResolutionTier; 3] = [ResolutionTier::Thumbnail, ResolutionTier::Medium, ResolutionTier::Full];

    pub fn percent(&self) -> u32 {
        match self {
            ResolutionTier::Thumbnail => 2,
            ResolutionTier::Medium => 10,
            ResolutionTier::Full => 100,
        }
    }

    /// File name suffix, e.g. `fullfield_thumb.tif`.
    pub fn suffix(&self) -> &'static str {
        match self {
            ResolutionTier::Thumbnail => "thumb",
            ResolutionTier::Medium => "10pct",
            ResolutionTier::Full => "full",
        }
    }
}

/// Fixed clip rectangle for field products.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldWindow(pub GeoBounds);

impl Default for FieldWindow {
    /// The stereo RGB field window used for every season's products.
    fn default() -> Self {
        FieldWindow(GeoBounds {
            lat_min: 33.0745861,
            lat_max: 33.0764277,
            lng_min: -111.9750277,
            lng_max: -111.9748097,
        })
    }
}

impl FieldWindow {
    pub fn bounds(&self) -> &GeoBounds {
        &self.0
    }
}

/// Rasterizes a [`VirtualMosaic`] clipped to a [`FieldWindow`].
///
/// Sampling is nearest neighbour on output pixel centers, so the same mosaic
/// and parameters always produce the same pixels. Uncovered pixels are black.
pub struct ResolutionRenderer {
    options: RasterWriteOptions,
    rows_per_strip: usize,
    cache_capacity: usize,
}

impl ResolutionRenderer {
    pub fn new(options: RasterWriteOptions, cache_capacity: usize) -> Self {
        Self {
            options,
            rows_per_strip: 64,
            cache_capacity,
        }
    }

    pub fn with_rows_per_strip(mut self, rows: usize) -> Self {
        self.rows_per_strip = rows.max(1);
        self
    }

    /// Output dimensions (cols, rows) for `window` at `tier`.
    pub fn output_size(&self, mosaic: &VirtualMosaic, window: &FieldWindow, tier: ResolutionTier) -> Result<(usize, usize)> {
        let (x_res, y_res) = mosaic
            .finest_resolution()
            .ok_or_else(|| PipelineError::EmptyInput("mosaic has no readable members".to_string()))?;
        let scale = tier.percent() as f64 / 100.0;
        let cols = ((window.bounds().lng_span() / x_res).round() * scale).round() as usize;
        let rows = ((window.bounds().lat_span() / y_res).round() * scale).round() as usize;
        Ok((cols.max(1), rows.max(1)))
    }

    /// Renders one tier to `output`, returning bytes written.
    #[instrument(skip(self, mosaic, window), fields(tier = ?tier, output = %output.display()))]
    pub fn render(&self, mosaic: &VirtualMosaic, window: &FieldWindow, tier: ResolutionTier, output: &Path) -> Result<u64> {
        let bounds = window.bounds();
        bounds.validate()?;
        if !mosaic.sources.iter().any(|s| s.bounds.intersects(bounds)) {
            return Err(PipelineError::OutsideWindow(format!(
                "no mosaic member overlaps the field window ({} members)",
                mosaic.sources.len()
            )));
        }

        let (cols, rows) = self.output_size(mosaic, window, tier)?;
        let grid = GeoTransform::from_bounds(bounds, cols, rows);
        let sampler = MosaicSampler::new(mosaic, self.cache_capacity);
        info!(cols, rows, percent = tier.percent(), "Rendering field raster");

        let bytes = GeoTiffStripWriter::new(self.rows_per_strip).write_rgb(
            output,
            cols,
            rows,
            bounds,
            &self.options,
            |first_row, count, strip| {
                // one row per task keeps the per-worker RGBA scratch small
                strip
                    .par_chunks_mut(cols * 3)
                    .enumerate()
                    .for_each(|(r, rgb_row)| {
                        let mut rgba = vec![0u8; cols * 4];
                        sampler.render_rgba(&grid, first_row + r, 1, cols, &mut rgba);
                        for (dst, src) in rgb_row.chunks_exact_mut(3).zip(rgba.chunks_exact(4)) {
                            dst.copy_from_slice(&src[..3]);
                        }
                    });
                debug_assert!(count * cols * 3 == strip.len());
                Ok(())
            },
        )?;

        info!(bytes, "Field raster written");
        Ok(bytes)
    }
}
