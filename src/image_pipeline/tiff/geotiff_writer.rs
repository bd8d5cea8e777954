use std::io::{Cursor, Seek, Write};
use std::path::Path;

use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind, TiffValue};
use tiff::tags::{Predictor, Tag};
use tracing::debug;

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::geo::GeoTransform;
use crate::image_pipeline::raster::{PixelData, RasterImage};
use crate::image_pipeline::tiff::types::RasterWriteOptions;
use crate::image_pipeline::tiff::writer::RasterWriter;

/// GeoKey directory declaring a geographic, pixel-is-area raster in `epsg`.
fn geo_key_directory(epsg: u16) -> [u16; 16] {
    [
        1, 1, 0, 3, // header: version 1.1.0, three keys
        1024, 0, 1, 2, // GTModelTypeGeoKey: geographic
        1025, 0, 1, 1, // GTRasterTypeGeoKey: pixel is area
        2048, 0, 1, epsg, // GeographicTypeGeoKey
    ]
}

pub(crate) fn encode_err(e: tiff::TiffError) -> PipelineError {
    PipelineError::EncodeError(e.to_string())
}

/// Writes the georeferencing, nodata and description tags of one image.
pub(crate) fn write_geo_tags<W: Write + Seek, K: TiffKind>(
    directory: &mut DirectoryEncoder<'_, W, K>,
    geotransform: &GeoTransform,
    epsg: u16,
    options: &RasterWriteOptions,
) -> Result<()> {
    let scale = [geotransform.x_res(), geotransform.y_res(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, geotransform.origin_lng(), geotransform.origin_lat(), 0.0];
    directory
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])
        .map_err(encode_err)?;
    directory
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
        .map_err(encode_err)?;
    directory
        .write_tag(Tag::GeoKeyDirectoryTag, &geo_key_directory(epsg)[..])
        .map_err(encode_err)?;

    if let Some(nodata) = options.nodata {
        directory
            .write_tag(Tag::GdalNodata, nodata.to_string().as_str())
            .map_err(encode_err)?;
    }
    if !options.metadata.is_empty() {
        let description = serde_json::to_string(&options.metadata)
            .map_err(|e| PipelineError::EncodeError(format!("metadata: {e}")))?;
        directory
            .write_tag(Tag::ImageDescription, description.as_str())
            .map_err(encode_err)?;
    }
    Ok(())
}

fn configure<W: Write + Seek, K: TiffKind>(
    encoder: TiffEncoder<W, K>,
    options: &RasterWriteOptions,
    byte_samples: bool,
) -> TiffEncoder<W, K> {
    let encoder = encoder.with_compression(options.compression.to_tiff());
    match options.predictor {
        Some(2) if byte_samples => encoder.with_predictor(Predictor::Horizontal),
        _ => encoder,
    }
}

fn encode_image<W, K, C>(
    encoder: &mut TiffEncoder<W, K>,
    image: &RasterImage,
    data: &[C::Inner],
    options: &RasterWriteOptions,
) -> Result<()>
where
    W: Write + Seek,
    K: TiffKind,
    C: ColorType,
    [C::Inner]: TiffValue,
{
    let mut tiff_image = encoder
        .new_image::<C>(image.pixels.cols() as u32, image.pixels.rows() as u32)
        .map_err(encode_err)?;
    write_geo_tags(tiff_image.encoder(), &image.geotransform(), image.epsg, options)?;
    tiff_image.write_data(data).map_err(encode_err)
}

/// Writes a whole in-memory raster as a GeoTIFF, one band per channel.
///
/// 1, 3 and 4 band rasters map to gray, RGB and RGBA. `float_samples`
/// widens 8-bit input to 32-bit float; float input is always written as float.
pub struct GeoTiffWriter;

impl RasterWriter for GeoTiffWriter {
    fn write_raster(&self, image: &RasterImage, output: &mut dyn Write, options: &RasterWriteOptions) -> Result<()> {
        let bands = image.pixels.bands();
        debug!(
            "Encoding GeoTIFF: {}x{}x{}",
            image.pixels.cols(),
            image.pixels.rows(),
            bands
        );

        let widened;
        let (bytes, floats) = match image.pixels.data() {
            PixelData::U8(data) if !options.float_samples => (Some(data.as_slice()), None),
            PixelData::U8(data) => {
                widened = data.iter().map(|&v| v as f32).collect::<Vec<f32>>();
                (None, Some(widened.as_slice()))
            }
            PixelData::F32(data) => (None, Some(data.as_slice())),
        };

        let mut buffer = Vec::new();
        {
            let encoder = TiffEncoder::new(Cursor::new(&mut buffer)).map_err(encode_err)?;
            let mut encoder = configure(encoder, options, bytes.is_some());

            match (bytes, floats, bands) {
                (Some(data), _, 1) => encode_image::<_, _, colortype::Gray8>(&mut encoder, image, data, options)?,
                (Some(data), _, 3) => encode_image::<_, _, colortype::RGB8>(&mut encoder, image, data, options)?,
                (Some(data), _, 4) => encode_image::<_, _, colortype::RGBA8>(&mut encoder, image, data, options)?,
                (None, Some(data), 1) => {
                    encode_image::<_, _, colortype::Gray32Float>(&mut encoder, image, data, options)?
                }
                (None, Some(data), 3) => {
                    encode_image::<_, _, colortype::RGB32Float>(&mut encoder, image, data, options)?
                }
                (None, Some(data), 4) => {
                    encode_image::<_, _, colortype::RGBA32Float>(&mut encoder, image, data, options)?
                }
                _ => {
                    return Err(PipelineError::UnsupportedFormat(format!(
                        "{bands}-band rasters are not supported"
                    )));
                }
            }
        }

        output.write_all(&buffer)?;

        debug!("GeoTIFF encoding complete");
        Ok(())
    }
}

/// Encodes `image` with `writer` and stores it at `path`, replacing any
/// existing file. Returns the number of bytes written.
pub fn write_raster_file<W: RasterWriter + ?Sized>(
    writer: &W,
    image: &RasterImage,
    path: &Path,
    options: &RasterWriteOptions,
) -> Result<u64> {
    let mut buffer = Vec::new();
    writer.write_raster(image, &mut buffer, options)?;
    std::fs::write(path, &buffer)
        .map_err(|e| PipelineError::OutputWriteError(format!("{}: {}", path.display(), e)))?;
    Ok(buffer.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::geo::GeoBounds;
    use crate::image_pipeline::raster::PixelBuffer;
    use crate::image_pipeline::tiff::geotiff_reader::GeoTiffReader;
    use crate::image_pipeline::tiff::types::TiffCompression;

    fn rgb_raster() -> RasterImage {
        let data: Vec<u8> = (0..6 * 4 * 3).map(|v| v as u8).collect();
        let pixels = PixelBuffer::from_shape(&[4, 6, 3], PixelData::U8(data)).unwrap();
        let bounds = GeoBounds::from_corners(33.0745861, 33.0764277, -111.9750277, -111.9748097).unwrap();
        RasterImage::new(pixels, bounds).unwrap()
    }

    #[test]
    fn round_trip_preserves_bounds_and_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.tif");
        let image = rgb_raster();
        let options = RasterWriteOptions::builder().metadata("side", "left").build();

        let bytes = write_raster_file(&GeoTiffWriter, &image, &path, &options).unwrap();
        assert_eq!(bytes, std::fs::metadata(&path).unwrap().len());

        let header = GeoTiffReader::read_header(&path).unwrap();
        assert_eq!((header.width, header.height, header.bands), (6, 4, 3));
        assert!((header.bounds.lat_min - image.bounds.lat_min).abs() < 1e-9);
        assert!((header.bounds.lat_max - image.bounds.lat_max).abs() < 1e-9);
        assert!((header.bounds.lng_min - image.bounds.lng_min).abs() < 1e-9);
        assert!((header.bounds.lng_max - image.bounds.lng_max).abs() < 1e-9);
        assert_eq!(header.nodata, Some(-99.0));
        assert_eq!(header.metadata.get("side").map(String::as_str), Some("left"));

        let back = GeoTiffReader::read_raster(&path).unwrap();
        assert_eq!(back.pixels.data(), image.pixels.data());
    }

    #[test]
    fn float_samples_widen_byte_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.tif");
        let options = RasterWriteOptions::builder()
            .float_samples(true)
            .compression(TiffCompression::None)
            .build();
        write_raster_file(&GeoTiffWriter, &rgb_raster(), &path, &options).unwrap();

        let back = GeoTiffReader::read_raster(&path).unwrap();
        match back.pixels.data() {
            PixelData::F32(v) => assert_eq!(v[5], 5.0),
            other => panic!("expected float samples, got {other:?}"),
        }
    }

    #[test]
    fn two_band_raster_is_unsupported() {
        let pixels = PixelBuffer::from_shape(&[2, 2, 2], PixelData::U8(vec![0; 8])).unwrap();
        let bounds = GeoBounds::from_corners(0.0, 1.0, 0.0, 1.0).unwrap();
        let image = RasterImage::new(pixels, bounds).unwrap();
        let err = GeoTiffWriter
            .write_raster(&image, &mut Vec::new(), &RasterWriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
    }

    #[test]
    fn unwritable_path_is_an_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("frame.tif");
        let err = write_raster_file(&GeoTiffWriter, &rgb_raster(), &path, &RasterWriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::OutputWriteError(_)));
    }
}
