//! GeoTIFF module
//!
//! Writing and reading of north-up EPSG:4326 GeoTIFFs, either from an
//! in-memory raster or streamed strip by strip.

mod geotiff_reader;
mod geotiff_writer;
mod strip_writer;
pub mod types;
mod writer;

pub use geotiff_reader::{GeoTiffReader, RasterHeader};
pub use geotiff_writer::{GeoTiffWriter, write_raster_file};
pub use strip_writer::GeoTiffStripWriter;
pub use types::{RasterWriteOptions, RasterWriteOptionsBuilder, TiffCompression};
pub use writer::RasterWriter;
