use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::report::BatchReport;
use crate::image_pipeline::common::timing::{PipelineTimings, Timer};
use crate::image_pipeline::conversions::bin_to_geotiff::BinToGeoTiffPipeline;
use crate::image_pipeline::conversions::config::PipelineConfig;
use crate::image_pipeline::mosaic::{MosaicIndexBuilder, ResolutionRenderer, VirtualMosaic, write_list_file};
use crate::image_pipeline::raw::{BinFrameReader, RawFrameReader, SensorSide};
use crate::image_pipeline::shade::{ShadeMergeEngine, TIF_LIST};
use crate::image_pipeline::telemetry::TelemetryParser;
use crate::image_pipeline::tiff::{GeoTiffWriter, RasterWriter};
use crate::image_pipeline::tiles::{TilePyramidBuilder, TileSet};

/// Virtual mosaic manifest written next to the frame list.
pub const MOSAIC_MANIFEST: &str = "virtual_mosaic.json";
/// Batch report of the last run.
pub const RUN_REPORT: &str = "run_report.json";

const METADATA_SUFFIX: &str = "_metadata.json";

/// One capture directory: a metadata record and the raw frames of each side.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub name: String,
    pub metadata: PathBuf,
    pub left: Option<PathBuf>,
    pub right: Option<PathBuf>,
}

impl Capture {
    pub fn frame(&self, side: SensorSide) -> Option<&Path> {
        match side {
            SensorSide::Left => self.left.as_deref(),
            SensorSide::Right => self.right.as_deref(),
        }
    }

    /// `<stem>_<side>.tif`, stem taken from the raw frame's file name.
    pub fn output_name(&self, side: SensorSide) -> String {
        let stem = self
            .frame(side)
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_suffix(&format!("_{side}")))
            .unwrap_or(self.name.as_str());
        format!("{stem}_{side}.tif")
    }
}

/// Scans `input_dir` for capture subdirectories, sorted by name.
/// Directories without a `*_metadata.json` file are ignored.
pub fn discover_captures(input_dir: &Path) -> Result<Vec<Capture>> {
    let entries = std::fs::read_dir(input_dir)
        .map_err(|e| PipelineError::InputNotFound(format!("{}: {}", input_dir.display(), e)))?;

    let mut captures = Vec::new();
    for entry in entries {
        let dir = entry?.path();
        if !dir.is_dir() {
            continue;
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        files.sort();

        let ends_with = |path: &Path, suffix: &str| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(suffix))
        };
        let Some(metadata) = files.iter().find(|p| ends_with(p, METADATA_SUFFIX)).cloned() else {
            debug!(dir = %dir.display(), "No metadata, not a capture");
            continue;
        };
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        captures.push(Capture {
            name,
            metadata,
            left: files.iter().find(|p| ends_with(p, "_left.bin")).cloned(),
            right: files.iter().find(|p| ends_with(p, "_right.bin")).cloned(),
        });
    }
    captures.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(captures)
}

/// Per-capture outcome folded into the run report.
struct CaptureOutcome {
    report: BatchReport,
    mosaic_frame: Option<PathBuf>,
}

/// Frames → per-frame GeoTIFFs → virtual mosaic → resolution tiers and,
/// optionally, a tile pyramid (plain or darker-pixel merged).
///
/// Output layout under `output_root/scan_date`:
///
/// ```text
/// {capture}/{stem}_{left,right}.tif
/// tif_list.txt
/// virtual_mosaic.json
/// fullfield_{thumb,10pct,full}.tif
/// tiles_{side}/{z}/{x}/{y}.{ext}             (tiles without darker)
/// {group}/tiles_{side}/..., unite/tiles_{side}/...   (darker)
/// run_report.json
/// ```
pub struct FieldMosaicPipeline<R: RawFrameReader + Sync, W: RasterWriter + Sync> {
    config: PipelineConfig,
    frames: BinToGeoTiffPipeline<R, W>,
}

impl FieldMosaicPipeline<BinFrameReader, GeoTiffWriter> {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let frames = BinToGeoTiffPipeline::new(&config);
        Self::with_frame_pipeline(config, frames)
    }
}

impl<R: RawFrameReader + Sync, W: RasterWriter + Sync> FieldMosaicPipeline<R, W> {
    pub fn with_frame_pipeline(config: PipelineConfig, frames: BinToGeoTiffPipeline<R, W>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, frames })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[instrument(skip(self), fields(input = %self.config.input_dir.display(), date = %self.config.scan_date))]
    pub fn run(&self) -> Result<BatchReport> {
        let output_dir = self.config.output_dir();
        std::fs::create_dir_all(&output_dir)
            .map_err(|e| PipelineError::OutputWriteError(format!("{}: {}", output_dir.display(), e)))?;
        let mut timings = PipelineTimings::new();

        let timer = Timer::start("convert_frames");
        let (mut report, mosaic_frames) = self.convert_frames(&output_dir)?;
        timings.record(timer);
        if mosaic_frames.is_empty() {
            return Err(PipelineError::EmptyInput(format!(
                "no {} frames converted from {}",
                self.config.mosaic_side,
                self.config.input_dir.display()
            )));
        }

        let timer = Timer::start("build_mosaic");
        let mosaic = self.build_mosaic(&output_dir, &mosaic_frames)?;
        report.skipped += mosaic.skip_count();
        report.skipped_entries.extend(mosaic.missing.iter().cloned());
        timings.record(timer);

        let timer = Timer::start("render_tiers");
        report.merge(self.render_tiers(&mosaic, &output_dir)?);
        timings.record(timer);

        if self.config.darker {
            let timer = Timer::start("shade_merge");
            let engine = ShadeMergeEngine::new(
                self.config.split_count,
                self.config.mosaic_side,
                self.config.tile_format,
                self.pyramid()?,
            )?;
            report.merge(engine.run(&mosaic_frames, &output_dir)?);
            timings.record(timer);
        } else if self.config.tiles {
            let timer = Timer::start("tile_pyramid");
            let tiles = TileSet::new(
                output_dir.join(format!("tiles_{}", self.config.mosaic_side)),
                self.config.tile_format,
            );
            report.merge(self.pyramid()?.build(&mosaic, &tiles)?);
            timings.record(timer);
        }

        self.save_report(&output_dir, &report);
        timings.log_summary();
        info!(
            processed = report.processed,
            reused = report.reused,
            skipped = report.skipped,
            bytes = report.bytes_written,
            "Field run complete"
        );
        Ok(report)
    }

    fn pyramid(&self) -> Result<TilePyramidBuilder> {
        Ok(TilePyramidBuilder::new(self.config.min_zoom, self.config.max_zoom)?
            .overwrite(self.config.overwrite)
            .cache_capacity(self.config.cache_capacity))
    }

    /// Converts every capture in parallel. Returns the report and the
    /// GeoTIFFs of the mosaic side in capture order, reused ones included.
    pub fn convert_frames(&self, output_dir: &Path) -> Result<(BatchReport, Vec<PathBuf>)> {
        let captures = discover_captures(&self.config.input_dir)?;
        info!(captures = captures.len(), "Discovered captures");

        let outcomes: Vec<CaptureOutcome> = captures
            .par_iter()
            .map(|capture| self.convert_capture(capture, output_dir))
            .collect();

        let mut report = BatchReport::new();
        let mut mosaic_frames = Vec::new();
        for outcome in outcomes {
            report.merge(outcome.report);
            mosaic_frames.extend(outcome.mosaic_frame);
        }
        Ok((report, mosaic_frames))
    }

    fn convert_capture(&self, capture: &Capture, output_dir: &Path) -> CaptureOutcome {
        let mut report = BatchReport::new();
        let mut mosaic_frame = None;

        let telemetry = match TelemetryParser::parse_file(&capture.metadata) {
            Ok(telemetry) => telemetry,
            Err(e) => {
                warn!(capture = %capture.name, error = %e, "Skipping capture");
                report.record_skip(&capture.metadata, &e);
                return CaptureOutcome { report, mosaic_frame };
            }
        };

        for side in SensorSide::BOTH {
            let Some(input) = capture.frame(side) else {
                if side == self.config.mosaic_side {
                    let e = PipelineError::InputNotFound(format!("{}: no {side} frame", capture.name));
                    warn!(capture = %capture.name, error = %e, "Skipping frame");
                    report.record_skip(capture.metadata.with_file_name(format!("{}_{side}.bin", capture.name)), &e);
                }
                continue;
            };
            let output = output_dir.join(&capture.name).join(capture.output_name(side));

            if !self.config.overwrite && output.is_file() {
                debug!(output = %output.display(), "Reusing existing frame");
                report.record_reused();
            } else {
                match self.frames.convert_file(input, &telemetry, side, &output) {
                    Ok(bytes) => {
                        report.processed += 1;
                        report.bytes_written += bytes;
                    }
                    Err(e) => {
                        warn!(input = %input.display(), error = %e, "Skipping frame");
                        report.record_skip(input, &e);
                        continue;
                    }
                }
            }
            if side == self.config.mosaic_side {
                mosaic_frame = Some(output);
            }
        }
        CaptureOutcome { report, mosaic_frame }
    }

    /// Writes the frame list and manifest, then indexes the frames.
    pub fn build_mosaic(&self, output_dir: &Path, frames: &[PathBuf]) -> Result<VirtualMosaic> {
        let list = output_dir.join(TIF_LIST);
        write_list_file(&list, frames)?;
        let mosaic = MosaicIndexBuilder::default().build_from_list_file(&list)?;
        mosaic.save_manifest(&output_dir.join(MOSAIC_MANIFEST))?;
        Ok(mosaic)
    }

    /// Renders `fullfield_{suffix}.tif` for every configured tier.
    pub fn render_tiers(&self, mosaic: &VirtualMosaic, output_dir: &Path) -> Result<BatchReport> {
        let renderer = ResolutionRenderer::new(self.config.write_options.clone(), self.config.cache_capacity);
        let mut report = BatchReport::new();
        for tier in &self.config.tiers {
            let output = output_dir.join(format!("fullfield_{}.tif", tier.suffix()));
            if !self.config.overwrite && output.is_file() {
                report.record_reused();
                continue;
            }
            match renderer.render(mosaic, &self.config.field_window, *tier, &output) {
                Ok(_) => report.record_output(&output),
                Err(e) if e.is_unit_local() => {
                    warn!(tier = ?tier, error = %e, "Skipping tier");
                    report.record_skip(&output, &e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    fn save_report(&self, output_dir: &Path, report: &BatchReport) {
        let path = output_dir.join(RUN_REPORT);
        let written = serde_json::to_vec_pretty(report)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(&path, json).map_err(|e| e.to_string()));
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "Could not save run report");
        }
    }
}
