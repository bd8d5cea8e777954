use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use tiff::encoder::compression::CompressionAlgorithm;
use tiff::encoder::{Rational, TiffEncoder, TiffKind};
use tiff::tags::{PhotometricInterpretation, Predictor, ResolutionUnit, SampleFormat, Tag};
use tracing::debug;

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::geo::{GeoBounds, GeoTransform};
use crate::image_pipeline::raster::EPSG_WGS84;
use crate::image_pipeline::tiff::geotiff_writer::{encode_err, write_geo_tags};
use crate::image_pipeline::tiff::types::RasterWriteOptions;

/// Classic TIFF offsets are 32-bit.
const CLASSIC_TIFF_LIMIT: u64 = u32::MAX as u64;

const RGB_SAMPLES: usize = 3;

/// Streams an RGB GeoTIFF to disk one strip at a time, so rasters larger
/// than memory can be produced. Switches to BigTIFF when the uncompressed
/// pixel data would not fit a classic TIFF.
///
/// `ImageEncoder::write_strip` only compresses inside `write_data`, so the
/// image directory is written here and every strip is compressed on its own.
pub struct GeoTiffStripWriter {
    rows_per_strip: usize,
}

impl Default for GeoTiffStripWriter {
    fn default() -> Self {
        Self { rows_per_strip: 64 }
    }
}

impl GeoTiffStripWriter {
    pub fn new(rows_per_strip: usize) -> Self {
        Self {
            rows_per_strip: rows_per_strip.max(1),
        }
    }

    /// `render(first_row, rows, buffer)` fills `rows` interleaved RGB rows.
    pub fn write_rgb<F>(
        &self,
        path: &Path,
        cols: usize,
        rows: usize,
        bounds: &GeoBounds,
        options: &RasterWriteOptions,
        render: F,
    ) -> Result<u64>
    where
        F: FnMut(usize, usize, &mut [u8]) -> Result<()>,
    {
        if cols == 0 || rows == 0 {
            return Err(PipelineError::InvalidShape(format!("empty raster {cols}x{rows}")));
        }
        let output_err = |e: std::io::Error| PipelineError::OutputWriteError(format!("{}: {}", path.display(), e));

        let file = File::create(path).map_err(output_err)?;
        let mut writer = BufWriter::new(file);
        let geotransform = GeoTransform::from_bounds(bounds, cols, rows);
        let big = (cols as u64) * (rows as u64) * RGB_SAMPLES as u64 > CLASSIC_TIFF_LIMIT;
        debug!(cols, rows, big, compression = ?options.compression, path = %path.display(), "Streaming GeoTIFF");

        if big {
            let encoder = TiffEncoder::new_big(&mut writer).map_err(encode_err)?;
            self.stream(encoder, cols, rows, &geotransform, options, render)?;
        } else {
            let encoder = TiffEncoder::new(&mut writer).map_err(encode_err)?;
            self.stream(encoder, cols, rows, &geotransform, options, render)?;
        }

        writer.flush().map_err(output_err)?;
        let len = writer.stream_position().map_err(output_err)?;
        Ok(len)
    }

    fn stream<W, K, F>(
        &self,
        mut encoder: TiffEncoder<W, K>,
        cols: usize,
        rows: usize,
        geotransform: &GeoTransform,
        options: &RasterWriteOptions,
        mut render: F,
    ) -> Result<()>
    where
        W: Write + Seek,
        K: TiffKind,
        F: FnMut(usize, usize, &mut [u8]) -> Result<()>,
    {
        let width = u32::try_from(cols).map_err(|_| PipelineError::InvalidShape(format!("{cols} columns")))?;
        let height = u32::try_from(rows).map_err(|_| PipelineError::InvalidShape(format!("{rows} rows")))?;
        let predictor = match options.predictor {
            Some(2) => Predictor::Horizontal,
            _ => Predictor::None,
        };

        let mut directory = encoder.image_directory().map_err(encode_err)?;
        directory.write_tag(Tag::ImageWidth, width).map_err(encode_err)?;
        directory.write_tag(Tag::ImageLength, height).map_err(encode_err)?;
        directory
            .write_tag(Tag::Compression, options.compression.method().to_u16())
            .map_err(encode_err)?;
        directory
            .write_tag(Tag::Predictor, predictor.to_u16())
            .map_err(encode_err)?;
        directory
            .write_tag(Tag::BitsPerSample, &[8u16; RGB_SAMPLES][..])
            .map_err(encode_err)?;
        directory
            .write_tag(Tag::SampleFormat, &[SampleFormat::Uint.to_u16(); RGB_SAMPLES][..])
            .map_err(encode_err)?;
        directory
            .write_tag(Tag::PhotometricInterpretation, PhotometricInterpretation::RGB.to_u16())
            .map_err(encode_err)?;
        directory
            .write_tag(Tag::SamplesPerPixel, RGB_SAMPLES as u16)
            .map_err(encode_err)?;
        directory
            .write_tag(Tag::RowsPerStrip, self.rows_per_strip as u32)
            .map_err(encode_err)?;
        directory
            .write_tag(Tag::XResolution, Rational { n: 1, d: 1 })
            .map_err(encode_err)?;
        directory
            .write_tag(Tag::YResolution, Rational { n: 1, d: 1 })
            .map_err(encode_err)?;
        directory
            .write_tag(Tag::ResolutionUnit, ResolutionUnit::None.to_u16())
            .map_err(encode_err)?;
        write_geo_tags(&mut directory, geotransform, EPSG_WGS84, options)?;

        let row_bytes = cols * RGB_SAMPLES;
        let mut buffer = vec![0u8; row_bytes * self.rows_per_strip];
        let mut packed = Vec::new();
        let mut offsets = Vec::with_capacity(rows.div_ceil(self.rows_per_strip));
        let mut byte_counts = Vec::with_capacity(offsets.capacity());
        let mut row = 0;
        while row < rows {
            let count = self.rows_per_strip.min(rows - row);
            let strip = &mut buffer[..count * row_bytes];
            strip.fill(0);
            render(row, count, strip)?;
            if predictor == Predictor::Horizontal {
                strip.chunks_exact_mut(row_bytes).for_each(horizontal_difference);
            }

            packed.clear();
            options
                .compression
                .compressor()
                .write_to(&mut packed, strip)
                .map_err(|e| PipelineError::EncodeError(format!("strip at row {row}: {e}")))?;
            let offset = directory.write_data(packed.as_slice()).map_err(encode_err)?;
            offsets.push(K::convert_offset(offset).map_err(encode_err)?);
            byte_counts.push(K::convert_offset(packed.len() as u64).map_err(encode_err)?);
            row += count;
        }

        directory
            .write_tag(Tag::StripOffsets, K::convert_slice(&offsets))
            .map_err(encode_err)?;
        directory
            .write_tag(Tag::StripByteCounts, K::convert_slice(&byte_counts))
            .map_err(encode_err)?;
        directory.finish().map_err(encode_err)
    }
}

/// TIFF predictor 2 on one interleaved RGB row, in place.
fn horizontal_difference(row: &mut [u8]) {
    for i in (RGB_SAMPLES..row.len()).rev() {
        row[i] = row[i].wrapping_sub(row[i - RGB_SAMPLES]);
    }
}
