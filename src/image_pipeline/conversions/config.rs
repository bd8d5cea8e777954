//! Run configuration for the field mosaic pipeline

use std::path::PathBuf;

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::geo::{GeoCalibration, GeoreferenceMethod};
use crate::image_pipeline::mosaic::{FieldWindow, ResolutionTier};
use crate::image_pipeline::raw::SensorSide;
use crate::image_pipeline::telemetry::FrameShape;
use crate::image_pipeline::tiff::RasterWriteOptions;
use crate::image_pipeline::tiles::TileFormat;

/// Everything one field/day run needs. Build with [`PipelineConfig::builder`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding one subdirectory per capture
    pub input_dir: PathBuf,
    /// Products are written below `output_root/scan_date`
    pub output_root: PathBuf,
    pub scan_date: String,
    /// Which camera of the stereo pair feeds the mosaic
    pub mosaic_side: SensorSide,
    /// Frame size used when metadata does not declare one
    pub frame_shape: FrameShape,
    pub method: GeoreferenceMethod,
    pub calibration: GeoCalibration,
    /// Number of round-robin splits for darker-pixel merging
    pub split_count: usize,
    /// Build the tile pyramid through the darker-pixel merge
    pub darker: bool,
    pub tiers: Vec<ResolutionTier>,
    /// Build a tile pyramid from the full mosaic
    pub tiles: bool,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_format: TileFormat,
    pub field_window: FieldWindow,
    /// Replace outputs that already exist instead of reusing them
    pub overwrite: bool,
    /// Decoded source rasters kept in memory while sampling
    pub cache_capacity: usize,
    pub write_options: RasterWriteOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_root: PathBuf::from("out"),
            scan_date: String::new(),
            mosaic_side: SensorSide::Left,
            frame_shape: FrameShape::STEREO_TOP,
            method: GeoreferenceMethod::default(),
            calibration: GeoCalibration::default(),
            split_count: 2,
            darker: false,
            tiers: ResolutionTier::ALL.to_vec(),
            tiles: false,
            min_zoom: 18,
            max_zoom: 28,
            tile_format: TileFormat::default(),
            field_window: FieldWindow::default(),
            overwrite: false,
            cache_capacity: 64,
            write_options: RasterWriteOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// `output_root/scan_date`, or the root itself when no date is set.
    pub fn output_dir(&self) -> PathBuf {
        if self.scan_date.is_empty() {
            self.output_root.clone()
        } else {
            self.output_root.join(&self.scan_date)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.split_count == 0 {
            return Err(PipelineError::InvalidConfig("split count must be at least 1".to_string()));
        }
        if self.min_zoom > self.max_zoom {
            return Err(PipelineError::InvalidConfig(format!(
                "min zoom {} exceeds max zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.cache_capacity == 0 {
            return Err(PipelineError::InvalidConfig("cache capacity must be at least 1".to_string()));
        }
        if self.scan_date.contains(['/', '\\']) {
            return Err(PipelineError::InvalidConfig(format!(
                "scan date {:?} must not contain path separators",
                self.scan_date
            )));
        }
        self.field_window.bounds().validate()?;
        self.calibration.validate()
    }
}

/// Builder for PipelineConfig
#[derive(Default)]
pub struct PipelineConfigBuilder {
    input_dir: Option<PathBuf>,
    output_root: Option<PathBuf>,
    scan_date: Option<String>,
    mosaic_side: Option<SensorSide>,
    frame_shape: Option<FrameShape>,
    method: Option<GeoreferenceMethod>,
    calibration: Option<GeoCalibration>,
    split_count: Option<usize>,
    darker: Option<bool>,
    tiers: Option<Vec<ResolutionTier>>,
    tiles: Option<bool>,
    zoom_range: Option<(u8, u8)>,
    tile_format: Option<TileFormat>,
    field_window: Option<FieldWindow>,
    overwrite: Option<bool>,
    cache_capacity: Option<usize>,
    write_options: Option<RasterWriteOptions>,
}

impl PipelineConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.input_dir = Some(dir.into());
        self
    }

    pub fn output_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_root = Some(dir.into());
        self
    }

    pub fn scan_date(mut self, date: impl Into<String>) -> Self {
        self.scan_date = Some(date.into());
        self
    }

    pub fn mosaic_side(mut self, side: SensorSide) -> Self {
        self.mosaic_side = Some(side);
        self
    }

    pub fn frame_shape(mut self, shape: FrameShape) -> Self {
        self.frame_shape = Some(shape);
        self
    }

    pub fn method(mut self, method: GeoreferenceMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn calibration(mut self, calibration: GeoCalibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn split_count(mut self, count: usize) -> Self {
        self.split_count = Some(count);
        self
    }

    pub fn darker(mut self, enable: bool) -> Self {
        self.darker = Some(enable);
        self
    }

    pub fn tiers(mut self, tiers: Vec<ResolutionTier>) -> Self {
        self.tiers = Some(tiers);
        self
    }

    pub fn tiles(mut self, enable: bool) -> Self {
        self.tiles = Some(enable);
        self
    }

    pub fn zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.zoom_range = Some((min_zoom, max_zoom));
        self
    }

    pub fn tile_format(mut self, format: TileFormat) -> Self {
        self.tile_format = Some(format);
        self
    }

    pub fn field_window(mut self, window: FieldWindow) -> Self {
        self.field_window = Some(window);
        self
    }

    pub fn overwrite(mut self, enable: bool) -> Self {
        self.overwrite = Some(enable);
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    pub fn write_options(mut self, options: RasterWriteOptions) -> Self {
        self.write_options = Some(options);
        self
    }

    pub fn build(self) -> PipelineConfig {
        let default = PipelineConfig::default();
        let (min_zoom, max_zoom) = self.zoom_range.unwrap_or((default.min_zoom, default.max_zoom));
        PipelineConfig {
            input_dir: self.input_dir.unwrap_or(default.input_dir),
            output_root: self.output_root.unwrap_or(default.output_root),
            scan_date: self.scan_date.unwrap_or(default.scan_date),
            mosaic_side: self.mosaic_side.unwrap_or(default.mosaic_side),
            frame_shape: self.frame_shape.unwrap_or(default.frame_shape),
            method: self.method.unwrap_or(default.method),
            calibration: self.calibration.unwrap_or(default.calibration),
            split_count: self.split_count.unwrap_or(default.split_count),
            darker: self.darker.unwrap_or(default.darker),
            tiers: self.tiers.unwrap_or(default.tiers),
            tiles: self.tiles.unwrap_or(default.tiles),
            min_zoom,
            max_zoom,
            tile_format: self.tile_format.unwrap_or(default.tile_format),
            field_window: self.field_window.unwrap_or(default.field_window),
            overwrite: self.overwrite.unwrap_or(default.overwrite),
            cache_capacity: self.cache_capacity.unwrap_or(default.cache_capacity),
            write_options: self.write_options.unwrap_or(default.write_options),
        }
    }
}
