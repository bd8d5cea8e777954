//! In-memory georeferenced rasters.

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::debayer::RgbImageData;
use crate::image_pipeline::geo::{GeoBounds, GeoTransform};

/// WGS84 geographic, the only reference system the pipeline writes.
pub const EPSG_WGS84: u16 = 4326;

#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    U8(Vec<u8>),
    F32(Vec<f32>),
}

impl PixelData {
    pub fn len(&self) -> usize {
        match self {
            PixelData::U8(v) => v.len(),
            PixelData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dense row-major `rows x cols x bands` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    rows: usize,
    cols: usize,
    bands: usize,
    data: PixelData,
}

impl PixelBuffer {
    /// Accepts `[rows, cols]` or `[rows, cols, bands]`.
    pub fn from_shape(shape: &[usize], data: PixelData) -> Result<Self> {
        let (rows, cols, bands) = match *shape {
            [rows, cols] => (rows, cols, 1),
            [rows, cols, bands] => (rows, cols, bands),
            _ => {
                return Err(PipelineError::InvalidShape(format!(
                    "pixel buffer needs 2 or 3 dimensions, got {shape:?}"
                )));
            }
        };
        if rows == 0 || cols == 0 || bands == 0 {
            return Err(PipelineError::InvalidShape(format!("empty pixel buffer {shape:?}")));
        }
        if rows * cols * bands != data.len() {
            return Err(PipelineError::InvalidShape(format!(
                "shape {shape:?} needs {} samples, buffer holds {}",
                rows * cols * bands,
                data.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            bands,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn data(&self) -> &PixelData {
        &self.data
    }

    pub fn into_data(self) -> PixelData {
        self.data
    }

    /// Sample as f64, for comparisons against a declared nodata value.
    pub fn value(&self, row: usize, col: usize, band: usize) -> f64 {
        let i = (row * self.cols + col) * self.bands + band;
        match &self.data {
            PixelData::U8(v) => v[i] as f64,
            PixelData::F32(v) => v[i] as f64,
        }
    }
}

/// Pixels plus their footprint; always EPSG:4326.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub pixels: PixelBuffer,
    pub bounds: GeoBounds,
    pub epsg: u16,
}

impl RasterImage {
    pub fn new(pixels: PixelBuffer, bounds: GeoBounds) -> Result<Self> {
        bounds.validate()?;
        Ok(Self {
            pixels,
            bounds,
            epsg: EPSG_WGS84,
        })
    }

    pub fn from_rgb(image: RgbImageData, bounds: GeoBounds) -> Result<Self> {
        let pixels = PixelBuffer::from_shape(&[image.height, image.width, 3], PixelData::U8(image.data))?;
        Self::new(pixels, bounds)
    }

    pub fn geotransform(&self) -> GeoTransform {
        GeoTransform::from_bounds(&self.bounds, self.pixels.cols(), self.pixels.rows())
    }

    /// Pixel whose cell holds the point; west and north edges are inclusive.
    pub fn pixel_at(&self, lat: f64, lng: f64) -> Option<(usize, usize)> {
        let gt = self.geotransform();
        let col = ((lng - gt.origin_lng()) / gt.x_res()).floor();
        let row = ((gt.origin_lat() - lat) / gt.y_res()).floor();
        if !(col >= 0.0 && row >= 0.0) {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        (row < self.pixels.rows() && col < self.pixels.cols()).then_some((row, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_dimensional_buffer_is_rejected() {
        let err = PixelBuffer::from_shape(&[4], PixelData::U8(vec![0; 4])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidShape(_)));
    }

    #[test]
    fn mismatched_length_is_rejected() {
        let err = PixelBuffer::from_shape(&[2, 2, 3], PixelData::U8(vec![0; 11])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidShape(_)));
    }

    #[test]
    fn two_dimensional_buffer_is_single_band() {
        let buffer = PixelBuffer::from_shape(&[2, 3], PixelData::F32(vec![0.5; 6])).unwrap();
        assert_eq!(buffer.bands(), 1);
        assert_eq!(buffer.value(1, 2, 0), 0.5);
    }

    #[test]
    fn pixel_lookup_follows_north_up_layout() {
        let pixels = PixelBuffer::from_shape(&[10, 20], PixelData::U8(vec![0; 200])).unwrap();
        let bounds = GeoBounds::from_corners(0.0, 1.0, 0.0, 2.0).unwrap();
        let raster = RasterImage::new(pixels, bounds).unwrap();
        assert_eq!(raster.pixel_at(0.95, 0.05), Some((0, 0)));
        assert_eq!(raster.pixel_at(0.05, 1.95), Some((9, 19)));
        assert_eq!(raster.pixel_at(1.0, 0.0), Some((0, 0)));
        assert_eq!(raster.pixel_at(-0.01, 1.0), None);
        assert_eq!(raster.pixel_at(0.5, 2.0), None);
    }
}
