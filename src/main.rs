use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use fieldmosaic_rs::image_pipeline::{
    FieldMosaicPipeline, GeoCalibration, GeoreferenceMethod, PipelineConfig, RasterWriteOptions, ResolutionTier,
    SensorSide, TiffCompression, TileFormat,
};
use fieldmosaic_rs::logger;

use tracing::{error, info};

#[derive(Parser)]
#[command(name = "fieldmosaic")]
#[command(about = "Stereo gantry frames to georeferenced GeoTIFFs, field mosaics and tile pyramids")]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert every capture of a scan date to per-frame GeoTIFFs.
    Convert(RunArgs),

    /// Convert frames, build the virtual mosaic and render field products.
    Mosaic(MosaicArgs),
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Directory with one subdirectory per capture.
    #[arg(long)]
    input: PathBuf,

    /// Output root; products go to <output>/<date>.
    #[arg(long)]
    output: PathBuf,

    /// Scan date, e.g. 2017-05-27.
    #[arg(long, default_value = "")]
    date: String,

    /// How frame footprints are converted to WGS84.
    #[arg(long, value_enum, default_value_t = GeoreferenceMethod::Affine)]
    method: GeoreferenceMethod,

    /// JSON file overriding the default calibration constants.
    #[arg(long)]
    calibration: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = TiffCompression::Lzw)]
    compression: TiffCompression,

    /// Replace existing outputs instead of reusing them.
    #[arg(long)]
    overwrite: bool,
}

#[derive(Debug, Clone, Args)]
struct MosaicArgs {
    #[command(flatten)]
    run: RunArgs,

    /// Camera feeding the mosaic.
    #[arg(long, default_value = "left")]
    side: SensorSide,

    /// Resolution tiers to render (repeatable).
    #[arg(long = "tier", value_enum)]
    tiers: Vec<ResolutionTier>,

    /// Build a tile pyramid from the mosaic.
    #[arg(long)]
    tiles: bool,

    /// Build the tile pyramid through the darker-pixel split merge.
    #[arg(long)]
    darker: bool,

    /// Number of round-robin splits for --darker.
    #[arg(long, default_value = "2")]
    splits: usize,

    #[arg(long, default_value = "18")]
    min_zoom: u8,

    #[arg(long, default_value = "28")]
    max_zoom: u8,

    #[arg(long, value_enum, default_value_t = TileFormat::Png)]
    tile_format: TileFormat,

    /// Decoded frames kept in memory while sampling.
    #[arg(long, default_value = "64")]
    cache: usize,
}

fn build_config(run: &RunArgs) -> anyhow::Result<PipelineConfig> {
    let calibration = match &run.calibration {
        Some(path) => GeoCalibration::from_json_file(path)
            .with_context(|| format!("loading calibration {}", path.display()))?,
        None => GeoCalibration::default(),
    };
    Ok(PipelineConfig::builder()
        .input_dir(&run.input)
        .output_root(&run.output)
        .scan_date(run.date.clone())
        .method(run.method)
        .calibration(calibration)
        .overwrite(run.overwrite)
        .write_options(RasterWriteOptions::builder().compression(run.compression).build())
        .build())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init_with_level(if cli.verbose { "debug" } else { "info" });

    info!("Starting fieldmosaic...");

    let result = match cli.command {
        Commands::Convert(run) => {
            let config = build_config(&run)?;
            let output_dir = config.output_dir();
            let pipeline = FieldMosaicPipeline::new(config)?;
            pipeline.convert_frames(&output_dir).map(|(report, _)| report)
        }
        Commands::Mosaic(args) => {
            let mut config = build_config(&args.run)?;
            config.mosaic_side = args.side;
            if !args.tiers.is_empty() {
                config.tiers = args.tiers;
            }
            config.tiles = args.tiles;
            config.darker = args.darker;
            config.split_count = args.splits;
            config.min_zoom = args.min_zoom;
            config.max_zoom = args.max_zoom;
            config.tile_format = args.tile_format;
            config.cache_capacity = args.cache;

            info!("Compression: {:?}", config.write_options.compression);
            info!("Georeference method: {}", config.method.as_str());
            FieldMosaicPipeline::new(config)?.run()
        }
    };

    match result {
        Ok(report) => {
            info!(
                "Run complete: {} written, {} reused, {} skipped, {} bytes",
                report.processed, report.reused, report.skipped, report.bytes_written
            );
            for entry in &report.skipped_entries {
                info!("Skipped {}: {}", entry.path.display(), entry.reason);
            }
            Ok(())
        }
        Err(e) => {
            error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}
