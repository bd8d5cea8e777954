use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::conversions::{BinToGeoTiffPipeline, FieldMosaicPipeline, PipelineConfig, discover_captures};
use crate::image_pipeline::geo::{FrameGeoreferencer, GeoBounds, GeoCalibration, GeoreferenceMethod};
use crate::image_pipeline::mosaic::{FieldWindow, ResolutionTier};
use crate::image_pipeline::raster::RasterImage;
use crate::image_pipeline::raw::{RawFrame, RawFrameReader, SensorSide};
use crate::image_pipeline::telemetry::{FrameShape, FrameTelemetry, TelemetryParser, Vec3};
use crate::image_pipeline::tiff::{RasterWriteOptions, RasterWriter, TiffCompression};
use crate::image_pipeline::tiles::TileFormat;

struct MockReader {
    should_fail: bool,
    shapes: Arc<Mutex<Vec<FrameShape>>>,
}

impl RawFrameReader for MockReader {
    fn read_frame(&self, _data: &[u8], shape: FrameShape) -> Result<RawFrame> {
        self.shapes.lock().unwrap().push(shape);
        if self.should_fail {
            return Err(PipelineError::InvalidShape("Mock short frame".to_string()));
        }
        Ok(RawFrame {
            width: 8,
            height: 4,
            data: vec![128; 32],
        })
    }
}

#[derive(Debug, Clone)]
struct Written {
    cols: usize,
    rows: usize,
    bounds: GeoBounds,
    options: RasterWriteOptions,
}

struct MockWriter {
    should_fail: bool,
    written: Arc<Mutex<Vec<Written>>>,
}

impl RasterWriter for MockWriter {
    fn write_raster(&self, image: &RasterImage, _output: &mut dyn Write, options: &RasterWriteOptions) -> Result<()> {
        if self.should_fail {
            return Err(PipelineError::EncodeError("Mock encode error".to_string()));
        }
        self.written.lock().unwrap().push(Written {
            cols: image.pixels.cols(),
            rows: image.pixels.rows(),
            bounds: image.bounds,
            options: options.clone(),
        });
        Ok(())
    }
}

fn telemetry() -> FrameTelemetry {
    let mut t = FrameTelemetry::new(Vec3::new(10.0, 5.0, 1.5), Vec3::new(0.877, 2.276, 0.0));
    t.capture_time = Some("2017-05-27T11:00:00".to_string());
    t
}

fn mock_pipeline(
    reader_fails: bool,
    writer_fails: bool,
) -> (
    BinToGeoTiffPipeline<MockReader, MockWriter>,
    Arc<Mutex<Vec<FrameShape>>>,
    Arc<Mutex<Vec<Written>>>,
) {
    let shapes = Arc::new(Mutex::new(Vec::new()));
    let written = Arc::new(Mutex::new(Vec::new()));
    let pipeline = BinToGeoTiffPipeline::with_custom(
        MockReader { should_fail: reader_fails, shapes: shapes.clone() },
        MockWriter { should_fail: writer_fails, written: written.clone() },
        FrameGeoreferencer::new(GeoCalibration::default(), GeoreferenceMethod::Spherical),
        RasterWriteOptions::default(),
    );
    (pipeline, shapes, written)
}

#[test]
fn test_config_builder() {
    let config = PipelineConfig::builder()
        .input_dir("/data/raw/2017-05-27")
        .scan_date("2017-05-27")
        .split_count(3)
        .darker(true)
        .zoom_range(19, 24)
        .tile_format(TileFormat::Jpeg)
        .write_options(RasterWriteOptions::builder().compression(TiffCompression::DeflateFast).build())
        .build();

    assert_eq!(config.split_count, 3);
    assert!(config.darker);
    assert_eq!((config.min_zoom, config.max_zoom), (19, 24));
    assert_eq!(config.tile_format, TileFormat::Jpeg);
    assert_eq!(config.write_options.compression, TiffCompression::DeflateFast);
    assert_eq!(config.mosaic_side, SensorSide::Left);
    assert_eq!(config.tiers, ResolutionTier::ALL.to_vec());
    assert_eq!(config.output_dir(), Path::new("out").join("2017-05-27"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation() {
    let zero_splits = PipelineConfig::builder().split_count(0).build();
    assert!(matches!(zero_splits.validate(), Err(PipelineError::InvalidConfig(_))));

    let inverted = PipelineConfig::builder().zoom_range(22, 20).build();
    assert!(matches!(inverted.validate(), Err(PipelineError::InvalidConfig(_))));

    let nested_date = PipelineConfig::builder().scan_date("2017/05").build();
    assert!(matches!(
        FieldMosaicPipeline::new(nested_date),
        Err(PipelineError::InvalidConfig(_))
    ));
}

#[test]
fn test_successful_conversion() {
    let (pipeline, shapes, written) = mock_pipeline(false, false);

    let mut output = Vec::new();
    let bounds = pipeline
        .convert(b"fake bin data", &telemetry(), SensorSide::Left, &mut output)
        .unwrap();

    let written = written.lock().unwrap();
    assert_eq!(written.len(), 1);
    // debayer output is rotated a quarter turn
    assert_eq!((written[0].cols, written[0].rows), (4, 8));
    assert_eq!(written[0].bounds, bounds);
    assert!(bounds.lat_min < bounds.lat_max && bounds.lng_min < bounds.lng_max);

    let metadata = &written[0].options.metadata;
    assert_eq!(metadata.get("sensor_side").map(String::as_str), Some("left"));
    assert_eq!(metadata.get("georeference_method").map(String::as_str), Some("spherical"));
    assert_eq!(metadata.get("capture_time").map(String::as_str), Some("2017-05-27T11:00:00"));
    assert_eq!(shapes.lock().unwrap()[0], FrameShape::STEREO_TOP);
}

#[test]
fn test_declared_shape_wins_over_fallback() {
    let (pipeline, shapes, _) = mock_pipeline(false, false);
    let pipeline = pipeline.with_fallback_shape(FrameShape { width: 64, height: 64 });
    let mut t = telemetry();
    t.right_shape = Some(FrameShape { width: 16, height: 12 });

    pipeline.convert(b"", &t, SensorSide::Right, &mut Vec::new()).unwrap();
    pipeline.convert(b"", &t, SensorSide::Left, &mut Vec::new()).unwrap();

    let shapes = shapes.lock().unwrap();
    assert_eq!(shapes[0], FrameShape { width: 16, height: 12 });
    assert_eq!(shapes[1], FrameShape { width: 64, height: 64 });
}

#[test]
fn test_stereo_sides_are_offset_along_x() {
    let (pipeline, _, _) = mock_pipeline(false, false);
    let left = pipeline.convert(b"", &telemetry(), SensorSide::Left, &mut Vec::new()).unwrap();
    let right = pipeline.convert(b"", &telemetry(), SensorSide::Right, &mut Vec::new()).unwrap();
    // left camera sits 0.34 m further north
    assert!(left.lat_min > right.lat_min);
    assert!((left.lng_min - right.lng_min).abs() < 1e-12);
}

#[test]
fn test_reader_failure() {
    let (pipeline, _, written) = mock_pipeline(true, false);
    let result = pipeline.convert(b"short", &telemetry(), SensorSide::Left, &mut Vec::new());

    assert!(matches!(result.unwrap_err(), PipelineError::InvalidShape(_)));
    assert!(written.lock().unwrap().is_empty());
}

#[test]
fn test_writer_failure() {
    let (pipeline, _, _) = mock_pipeline(false, true);
    let result = pipeline.convert(b"fake bin data", &telemetry(), SensorSide::Left, &mut Vec::new());

    assert!(matches!(result.unwrap_err(), PipelineError::EncodeError(_)));
}

#[test]
fn test_missing_input_file() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, _, _) = mock_pipeline(false, false);
    let result = pipeline.convert_file(
        dir.path().join("absent_left.bin"),
        &telemetry(),
        SensorSide::Left,
        dir.path().join("absent_left.tif"),
    );
    assert!(matches!(result.unwrap_err(), PipelineError::InputNotFound(_)));
}

fn metadata_json(x: f64) -> String {
    format!(
        r#"{{
            "gantry_variable_metadata": {{
                "time": "2017-05-27T11:00:00",
                "position_m": {{ "x": {x}, "y": 5.0, "z": 1.5 }}
            }},
            "sensor_fixed_metadata": {{
                "location_in_camera_box_m": {{ "x": 0.877, "y": 2.276, "z": 0.0 }},
                "field_of_view_at_2m_m": {{ "x": 1.015, "y": 0.749 }}
            }},
            "sensor_variable_metadata": {{
                "image_format": {{ "left": "BayerGR8", "right": "BayerGR8" }},
                "width_image_pixels": {{ "left": 8, "right": 8 }},
                "height_image_pixels": {{ "left": 8, "right": 8 }}
            }}
        }}"#
    )
}

fn write_capture(input: &Path, name: &str, metadata: &str) {
    let dir = input.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{name}_metadata.json")), metadata).unwrap();
    std::fs::write(dir.join(format!("{name}_left.bin")), [90u8; 64]).unwrap();
    std::fs::write(dir.join(format!("{name}_right.bin")), [90u8; 64]).unwrap();
}

#[test]
fn test_discovery_ignores_directories_without_metadata() {
    let dir = tempfile::tempdir().unwrap();
    write_capture(dir.path(), "2017-05-27__11-00-02", &metadata_json(11.0));
    write_capture(dir.path(), "2017-05-27__11-00-01", &metadata_json(10.0));
    std::fs::create_dir_all(dir.path().join("logs")).unwrap();

    let captures = discover_captures(dir.path()).unwrap();
    assert_eq!(captures.len(), 2);
    assert_eq!(captures[0].name, "2017-05-27__11-00-01");
    assert_eq!(captures[0].output_name(SensorSide::Right), "2017-05-27__11-00-01_right.tif");
}

#[test]
fn test_field_run_skips_corrupt_capture_and_resumes() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_capture(input.path(), "a", &metadata_json(10.0));
    write_capture(input.path(), "b", &metadata_json(11.0));
    write_capture(input.path(), "c", "{ not json");

    let geo = FrameGeoreferencer::new(GeoCalibration::default(), GeoreferenceMethod::Affine);
    let extent = [10.0, 11.0]
        .iter()
        .map(|&x| {
            let t = TelemetryParser::parse_str(&metadata_json(x)).unwrap();
            geo.bounds(&t, SensorSide::Left).unwrap()
        })
        .reduce(|a, b| a.union(&b))
        .unwrap();

    let config = PipelineConfig::builder()
        .input_dir(input.path())
        .output_root(output.path())
        .scan_date("2017-05-27")
        .tiers(vec![ResolutionTier::Thumbnail])
        .field_window(FieldWindow(extent))
        .build();
    let pipeline = FieldMosaicPipeline::new(config.clone()).unwrap();

    let report = pipeline.run().unwrap();
    assert_eq!(report.processed, 5);
    assert_eq!(report.skipped, 1);
    assert!(report.skipped_entries[0].path.ends_with("c_metadata.json"));

    let out_dir = config.output_dir();
    assert!(out_dir.join("a").join("a_right.tif").is_file());
    assert!(out_dir.join("fullfield_thumb.tif").is_file());
    assert!(out_dir.join("virtual_mosaic.json").is_file());
    let list = std::fs::read_to_string(out_dir.join("tif_list.txt")).unwrap();
    assert_eq!(list.lines().count(), 2);
    assert!(list.lines().all(|l| l.ends_with("_left.tif")));

    let again = pipeline.run().unwrap();
    assert_eq!((again.processed, again.reused), (0, 5));
}

#[test]
fn test_field_run_outside_window_still_builds_tiles() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_capture(input.path(), "a", &metadata_json(10.0));
    write_capture(input.path(), "b", &metadata_json(11.0));

    let elsewhere = GeoBounds::from_corners(10.0, 10.001, 20.0, 20.001).unwrap();
    let config = PipelineConfig::builder()
        .input_dir(input.path())
        .output_root(output.path())
        .scan_date("2017-05-27")
        .tiers(vec![ResolutionTier::Thumbnail])
        .field_window(FieldWindow(elsewhere))
        .tiles(true)
        .zoom_range(20, 21)
        .build();

    let report = FieldMosaicPipeline::new(config.clone()).unwrap().run().unwrap();
    assert_eq!(report.skipped, 1);
    assert!(report.skipped_entries[0].path.ends_with("fullfield_thumb.tif"));

    let out_dir = config.output_dir();
    assert!(!out_dir.join("fullfield_thumb.tif").exists());
    assert!(out_dir.join("run_report.json").is_file());
    let tiles = crate::image_pipeline::tiles::TileSet::new(out_dir.join("tiles_left"), TileFormat::Png);
    assert!(!tiles.tiles_at(21).unwrap().is_empty());
    assert!(!tiles.tiles_at(20).unwrap().is_empty());
}
