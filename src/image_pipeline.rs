//! Image processing pipeline module
//!
//! Raw stereo frames are debayered, georeferenced and written as GeoTIFFs,
//! indexed into a virtual mosaic, then rendered at fixed resolution tiers or
//! cut into a tile pyramid (optionally through the darker-pixel shade merge).

pub mod common;
pub mod conversions;
pub mod debayer;
pub mod geo;
pub mod mosaic;
pub mod raster;
pub mod raw;
pub mod shade;
pub mod telemetry;
pub mod tiff;
pub mod tiles;

pub use common::{BatchReport, PipelineError, Result, SkippedEntry};

pub use raw::{BinFrameReader, RawFrame, RawFrameReader, SensorSide};

pub use debayer::{CpuDebayer, RgbImageData};

pub use telemetry::{FrameShape, FrameTelemetry, TelemetryParser};

pub use geo::{FrameGeoreferencer, GeoBounds, GeoCalibration, GeoTransform, GeoreferenceMethod};

pub use raster::{PixelBuffer, PixelData, RasterImage};

pub use tiff::{
    GeoTiffReader,
    GeoTiffWriter,
    RasterWriteOptions,
    RasterWriteOptionsBuilder,
    RasterWriter,
    TiffCompression,
};

pub use mosaic::{FieldWindow, MosaicIndexBuilder, ResolutionRenderer, ResolutionTier, VirtualMosaic};

pub use tiles::{TileCoordinate, TileFormat, TilePyramidBuilder, TileSet};

pub use shade::{MergeDecision, ShadeMergeEngine, SplitAssignment};

pub use conversions::{
    BinToGeoTiffPipeline,
    FieldMosaicPipeline,
    PipelineConfig,
    PipelineConfigBuilder,
};
