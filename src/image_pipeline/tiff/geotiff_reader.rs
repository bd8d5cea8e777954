use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::geo::{GeoBounds, GeoTransform};
use crate::image_pipeline::raster::{PixelBuffer, PixelData, RasterImage};

/// Everything about a GeoTIFF except its pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterHeader {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub bounds: GeoBounds,
    pub nodata: Option<f64>,
    pub metadata: BTreeMap<String, String>,
}

impl RasterHeader {
    pub fn geotransform(&self) -> GeoTransform {
        GeoTransform::from_bounds(&self.bounds, self.width, self.height)
    }
}

/// Reads north-up GeoTIFFs carrying pixel-scale and tiepoint tags.
pub struct GeoTiffReader;

impl GeoTiffReader {
    pub fn read_header(path: &Path) -> Result<RasterHeader> {
        let mut decoder = open(path)?;
        header(&mut decoder).map_err(|e| with_path(e, path))
    }

    pub fn read_raster(path: &Path) -> Result<RasterImage> {
        let mut decoder = open(path)?;
        let header = header(&mut decoder).map_err(|e| with_path(e, path))?;
        let data = match decoder.read_image().map_err(|e| decode_err(path, e))? {
            DecodingResult::U8(v) => PixelData::U8(v),
            DecodingResult::F32(v) => PixelData::F32(v),
            _ => {
                return Err(PipelineError::UnsupportedFormat(format!(
                    "{}: only 8-bit and 32-bit float samples are supported",
                    path.display()
                )));
            }
        };
        let pixels = PixelBuffer::from_shape(&[header.height, header.width, header.bands], data)
            .map_err(|e| with_path(e, path))?;
        RasterImage::new(pixels, header.bounds)
    }
}

fn decode_err(path: &Path, e: tiff::TiffError) -> PipelineError {
    PipelineError::DecodeError(format!("{}: {}", path.display(), e))
}

fn with_path(e: PipelineError, path: &Path) -> PipelineError {
    match e {
        PipelineError::DecodeError(msg) => PipelineError::DecodeError(format!("{}: {}", path.display(), msg)),
        other => other,
    }
}

fn open(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path)
        .map_err(|e| PipelineError::InputNotFound(format!("{}: {}", path.display(), e)))?;
    let decoder = Decoder::new(BufReader::new(file)).map_err(|e| decode_err(path, e))?;
    Ok(decoder.with_limits(Limits::unlimited()))
}

fn header(decoder: &mut Decoder<BufReader<File>>) -> Result<RasterHeader> {
    let tiff_err = |e: tiff::TiffError| PipelineError::DecodeError(e.to_string());

    let (width, height) = decoder.dimensions().map_err(tiff_err)?;
    let bands = match decoder.colortype().map_err(tiff_err)? {
        ColorType::Gray(_) => 1,
        ColorType::RGB(_) => 3,
        ColorType::RGBA(_) => 4,
        other => {
            return Err(PipelineError::UnsupportedFormat(format!("color type {other:?}")));
        }
    };

    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|e| PipelineError::DecodeError(format!("no pixel scale: {e}")))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|e| PipelineError::DecodeError(format!("no tiepoint: {e}")))?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(PipelineError::DecodeError("malformed georeferencing tags".to_string()));
    }

    // tiepoint maps raster (i, j) to model (x, y); shift back to pixel (0, 0)
    let origin_lng = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_lat = tiepoint[4] + tiepoint[1] * scale[1];
    let geotransform = GeoTransform([origin_lng, scale[0], 0.0, origin_lat, 0.0, -scale[1]]);
    let bounds = geotransform.to_bounds(width as usize, height as usize)?;

    let nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '\0').parse::<f64>().ok());
    let metadata = decoder
        .get_tag_ascii_string(Tag::ImageDescription)
        .ok()
        .and_then(|s| serde_json::from_str(s.trim_end_matches('\0')).ok())
        .unwrap_or_default();

    Ok(RasterHeader {
        width: width as usize,
        height: height as usize,
        bands,
        bounds,
        nodata,
        metadata,
    })
}
