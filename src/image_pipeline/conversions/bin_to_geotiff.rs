use std::io::Write;
use std::path::Path;

use tracing::{debug, info, instrument};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::timing::{PipelineTimings, Timer};
use crate::image_pipeline::conversions::config::PipelineConfig;
use crate::image_pipeline::debayer::CpuDebayer;
use crate::image_pipeline::geo::{FrameGeoreferencer, GeoBounds};
use crate::image_pipeline::raster::RasterImage;
use crate::image_pipeline::raw::{BinFrameReader, RawFrameReader, SensorSide};
use crate::image_pipeline::telemetry::{FrameShape, FrameTelemetry};
use crate::image_pipeline::tiff::{GeoTiffWriter, RasterWriteOptions, RasterWriter};

/// Raw Bayer frame plus telemetry in, one georeferenced RGB GeoTIFF out.
pub struct BinToGeoTiffPipeline<R: RawFrameReader, W: RasterWriter> {
    reader: R,
    writer: W,
    debayer: CpuDebayer,
    georeferencer: FrameGeoreferencer,
    options: RasterWriteOptions,
    fallback_shape: FrameShape,
}

impl BinToGeoTiffPipeline<BinFrameReader, GeoTiffWriter> {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_custom(
            BinFrameReader,
            GeoTiffWriter,
            FrameGeoreferencer::new(config.calibration.clone(), config.method),
            config.write_options.clone(),
        )
        .with_fallback_shape(config.frame_shape)
    }
}

impl<R: RawFrameReader, W: RasterWriter> BinToGeoTiffPipeline<R, W> {
    pub fn with_custom(reader: R, writer: W, georeferencer: FrameGeoreferencer, options: RasterWriteOptions) -> Self {
        Self {
            reader,
            writer,
            debayer: CpuDebayer::new(),
            georeferencer,
            options,
            fallback_shape: FrameShape::STEREO_TOP,
        }
    }

    /// Frame size assumed when the metadata does not declare one.
    pub fn with_fallback_shape(mut self, shape: FrameShape) -> Self {
        self.fallback_shape = shape;
        self
    }

    pub fn georeferencer(&self) -> &FrameGeoreferencer {
        &self.georeferencer
    }

    pub fn options(&self) -> &RasterWriteOptions {
        &self.options
    }

    fn frame_options(&self, telemetry: &FrameTelemetry, side: SensorSide) -> RasterWriteOptions {
        let mut entries = vec![
            ("sensor_side", side.as_str().to_string()),
            ("georeference_method", self.georeferencer.method().as_str().to_string()),
            ("calibration", self.georeferencer.calibration().version.clone()),
        ];
        if let Some(time) = &telemetry.capture_time {
            entries.push(("capture_time", time.clone()));
        }
        self.options.with_metadata(entries)
    }

    /// Decodes, georeferences and encodes one frame into `output`.
    /// Returns the frame's footprint.
    #[instrument(skip(self, input_data, telemetry, output), fields(input_size = input_data.len(), side = %side))]
    pub fn convert(
        &self,
        input_data: &[u8],
        telemetry: &FrameTelemetry,
        side: SensorSide,
        output: &mut dyn Write,
    ) -> Result<GeoBounds> {
        let mut timings = PipelineTimings::new();
        let shape = telemetry.shape(side).unwrap_or(self.fallback_shape);

        let timer = Timer::start("decode_raw");
        let raw = self.reader.read_frame(input_data, shape)?;
        timings.record(timer);

        let timer = Timer::start("debayer");
        let rgb = self.debayer.process(&raw);
        drop(raw);
        timings.record(timer);

        let timer = Timer::start("georeference");
        let bounds = self.georeferencer.bounds(telemetry, side)?;
        timings.record(timer);

        let timer = Timer::start("encode_geotiff");
        let (width, height) = (rgb.width, rgb.height);
        let image = RasterImage::from_rgb(rgb, bounds)?;
        self.writer
            .write_raster(&image, output, &self.frame_options(telemetry, side))?;
        timings.record(timer);

        debug!(
            width,
            height,
            elapsed_ms = timings.total_duration().as_secs_f64() * 1000.0,
            "Frame converted"
        );
        Ok(bounds)
    }

    /// Reads `input_path`, converts it and writes the GeoTIFF to
    /// `output_path`. Returns bytes written.
    #[instrument(skip(self, input_path, telemetry, output_path))]
    pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        telemetry: &FrameTelemetry,
        side: SensorSide,
        output_path: Q,
    ) -> Result<u64> {
        let input_path = input_path.as_ref();
        let output_path = output_path.as_ref();

        info!(
            input = %input_path.display(),
            output = %output_path.display(),
            "Converting frame"
        );

        let input_data = {
            let _span = tracing::info_span!("read_input_file").entered();
            std::fs::read(input_path)
                .map_err(|e| PipelineError::InputNotFound(format!("{}: {}", input_path.display(), e)))?
        };

        let mut encoded = Vec::new();
        self.convert(&input_data, telemetry, side, &mut encoded)
            .map_err(|e| match e {
                PipelineError::InvalidShape(msg) => {
                    PipelineError::InvalidShape(format!("{}: {}", input_path.display(), msg))
                }
                other => other,
            })?;
        drop(input_data);

        {
            let _span = tracing::info_span!("write_output_file").entered();
            if let Some(parent) = output_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PipelineError::OutputWriteError(format!("{}: {}", parent.display(), e))
                })?;
            }
            std::fs::write(output_path, &encoded).map_err(|e| {
                PipelineError::OutputWriteError(format!("{}: {}", output_path.display(), e))
            })?;
        }

        Ok(encoded.len() as u64)
    }
}
