//! Typed telemetry extraction from capture metadata JSON.
//!
//! Field names drifted across seasons (`"position x [m]"` vs `"position X [m]"`,
//! flat LemnaTec keys vs nested `position_m.x`), so every field is resolved
//! through an explicit list of variants compared case-insensitively.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::raw::types::SensorSide;
use crate::image_pipeline::telemetry::types::{FrameShape, FrameTelemetry, Vec3};

const LEMNATEC_RECORD: &str = "lemnatec_measurement_metadata";

const GANTRY_SECTIONS: &[&str] = &["gantry_system_variable_metadata", "gantry_variable_metadata"];
const SENSOR_FIXED_SECTIONS: &[&str] = &["sensor_fixed_metadata"];
const SENSOR_VARIABLE_SECTIONS: &[&str] = &["sensor_variable_metadata"];

const GANTRY_FLAT: [&[&str]; 3] = [
    &["position x [m]", "position_x_m"],
    &["position y [m]", "position_y_m"],
    &["position z [m]", "position_z_m"],
];
const GANTRY_NESTED: &[&str] = &["position_m", "position [m]"];

const CAMERA_FLAT: [&[&str]; 3] = [
    &["location in camera box x [m]"],
    &["location in camera box y [m]"],
    &["location in camera box z [m]"],
];
const CAMERA_NESTED: &[&str] = &["location_in_camera_box_m", "location in camera box [m]"];

const FOV_STRING: &[&str] = &[
    "field of view at 2m in x- y- direction [m]",
    "field of view at 2m in x-y direction [m]",
];
const FOV_NESTED: &[&str] = &["field_of_view_at_2m_m", "field of view at 2m [m]"];

const TIME_KEYS: &[&str] = &["time", "timestamp"];
const WIDTH_KEYS: &[&str] = &["width_image_pixels", "width image pixels"];
const HEIGHT_KEYS: &[&str] = &["height_image_pixels", "height image pixels"];
const FORMAT_KEYS: &[&str] = &["image_format", "image format"];

/// The only raw layout the stereo sensor produces.
const SUPPORTED_IMAGE_FORMAT: &str = "BayerGR8";

pub struct TelemetryParser;

impl TelemetryParser {
    pub fn parse_file(path: &Path) -> Result<FrameTelemetry> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::InputNotFound(format!("{}: {}", path.display(), e)))?;
        Self::parse_str(&text)
            .map_err(|e| match e {
                PipelineError::CorruptMetadata(msg) => {
                    PipelineError::CorruptMetadata(format!("{}: {}", path.display(), msg))
                }
                other => other,
            })
    }

    pub fn parse_str(text: &str) -> Result<FrameTelemetry> {
        let root: Value = serde_json::from_str(text)
            .map_err(|e| PipelineError::CorruptMetadata(format!("invalid JSON: {e}")))?;
        Self::parse_value(&root)
    }

    pub fn parse_value(root: &Value) -> Result<FrameTelemetry> {
        let record = locate_record(root)?;

        let gantry = section(record, root, GANTRY_SECTIONS)
            .ok_or_else(|| missing("gantry variable metadata"))?;
        let sensor_fixed = section(record, root, SENSOR_FIXED_SECTIONS)
            .ok_or_else(|| missing("sensor fixed metadata"))?;

        let gantry_position = vec3_field(gantry, GANTRY_FLAT, GANTRY_NESTED, false, "gantry position")?;
        // older captures predate the z offset of the camera box
        let camera_box_offset =
            vec3_field(sensor_fixed, CAMERA_FLAT, CAMERA_NESTED, true, "camera box location")?;

        let mut telemetry = FrameTelemetry::new(gantry_position, camera_box_offset);
        telemetry.field_of_view = field_of_view(sensor_fixed)?;
        telemetry.capture_time = lookup(gantry, TIME_KEYS).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        });

        if let Some(sensor_variable) = section(record, root, SENSOR_VARIABLE_SECTIONS) {
            telemetry.left_shape = frame_shape(sensor_variable, SensorSide::Left)?;
            telemetry.right_shape = frame_shape(sensor_variable, SensorSide::Right)?;
        }

        debug!(
            x = telemetry.gantry_position.x,
            y = telemetry.gantry_position.y,
            z = telemetry.gantry_position.z,
            "Parsed telemetry"
        );
        Ok(telemetry)
    }
}

fn missing(field: &str) -> PipelineError {
    PipelineError::CorruptMetadata(format!("missing {field}"))
}

/// Case-insensitive key lookup on a JSON object.
fn get_ci<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .as_object()?
        .iter()
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

fn lookup<'a>(value: &'a Value, variants: &[&str]) -> Option<&'a Value> {
    variants.iter().find_map(|key| get_ci(value, key))
}

/// Finds the LemnaTec measurement record. Accepts the bare record, a wrapper
/// object, or a dataset metadata list of `{ "content": {...} }` entries.
fn locate_record(root: &Value) -> Result<&Value> {
    if let Value::Array(entries) = root {
        return entries
            .iter()
            .filter_map(|entry| get_ci(entry, "content"))
            .find(|content| get_ci(content, LEMNATEC_RECORD).is_some() || lookup(content, GANTRY_SECTIONS).is_some())
            .map(|content| get_ci(content, LEMNATEC_RECORD).unwrap_or(content))
            .ok_or_else(|| missing("LemnaTec measurement record in metadata list"));
    }
    if !root.is_object() {
        return Err(PipelineError::CorruptMetadata("metadata root is not an object".into()));
    }
    Ok(get_ci(root, LEMNATEC_RECORD).unwrap_or(root))
}

fn section<'a>(record: &'a Value, root: &'a Value, names: &[&str]) -> Option<&'a Value> {
    lookup(record, names).or_else(|| lookup(root, names))
}

fn number(value: &Value, field: &str) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| PipelineError::CorruptMetadata(format!("{field}: not a number: {value}")))
}

fn vec3_field(
    section: &Value,
    flat: [&[&str]; 3],
    nested: &[&str],
    z_optional: bool,
    what: &str,
) -> Result<Vec3> {
    let (x, y, z) = if let Some(inner) = lookup(section, nested) {
        (get_ci(inner, "x"), get_ci(inner, "y"), get_ci(inner, "z"))
    } else {
        (lookup(section, flat[0]), lookup(section, flat[1]), lookup(section, flat[2]))
    };

    let x = number(x.ok_or_else(|| missing(&format!("{what} x")))?, what)?;
    let y = number(y.ok_or_else(|| missing(&format!("{what} y")))?, what)?;
    let z = match z {
        Some(value) => number(value, what)?,
        None if z_optional => 0.0,
        None => return Err(missing(&format!("{what} z"))),
    };
    Ok(Vec3::new(x, y, z))
}

/// Parses either `{"x": .., "y": ..}` or the legacy `"[1.015 0.749]"` string.
fn field_of_view(sensor_fixed: &Value) -> Result<Option<(f64, f64)>> {
    if let Some(inner) = lookup(sensor_fixed, FOV_NESTED) {
        let x = get_ci(inner, "x").ok_or_else(|| missing("field of view x"))?;
        let y = get_ci(inner, "y").ok_or_else(|| missing("field of view y"))?;
        return Ok(Some((number(x, "field of view x")?, number(y, "field of view y")?)));
    }
    let Some(value) = lookup(sensor_fixed, FOV_STRING) else {
        return Ok(None);
    };
    let parts: Vec<f64> = match value {
        Value::String(s) => s
            .replace(['[', ']', ','], " ")
            .split_whitespace()
            .map(|p| p.parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| PipelineError::CorruptMetadata(format!("field of view {s:?}: {e}")))?,
        Value::Array(items) => items
            .iter()
            .map(|item| number(item, "field of view"))
            .collect::<Result<_>>()?,
        other => {
            return Err(PipelineError::CorruptMetadata(format!("field of view: {other}")));
        }
    };
    match parts.as_slice() {
        [x, y] => Ok(Some((*x, *y))),
        _ => Err(PipelineError::CorruptMetadata(format!(
            "field of view: expected 2 values, got {}",
            parts.len()
        ))),
    }
}

fn frame_shape(sensor_variable: &Value, side: SensorSide) -> Result<Option<FrameShape>> {
    let side_value = |keys: &[&str]| lookup(sensor_variable, keys).and_then(|v| get_ci(v, side.as_str()));

    if let Some(format) = side_value(FORMAT_KEYS).and_then(Value::as_str) {
        if !format.eq_ignore_ascii_case(SUPPORTED_IMAGE_FORMAT) {
            return Err(PipelineError::CorruptMetadata(format!(
                "unknown {side} image format: {format}"
            )));
        }
    }

    match (side_value(WIDTH_KEYS), side_value(HEIGHT_KEYS)) {
        (Some(w), Some(h)) => {
            let width = number(w, "image width")?;
            let height = number(h, "image height")?;
            if width < 1.0 || height < 1.0 || width.fract() != 0.0 || height.fract() != 0.0 {
                return Err(PipelineError::CorruptMetadata(format!(
                    "corrupt {side} image dimension {width}x{height}"
                )));
            }
            let shape = FrameShape {
                width: width as usize,
                height: height as usize,
            };
            if shape.pixel_count().is_none() {
                return Err(PipelineError::CorruptMetadata(format!(
                    "{side} image dimension {width}x{height} overflows"
                )));
            }
            Ok(Some(shape))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"{
        "lemnatec_measurement_metadata": {
            "gantry_system_variable_metadata": {
                "time": "08/17/2016 11:28:17",
                "position X [m]": "204.345",
                "Position y [m]": "20.988",
                "position z [m]": "0.55"
            },
            "sensor_fixed_metadata": {
                "location in camera box x [m]": "0.877",
                "location in camera box y [m]": "2.276",
                "field of view at 2m in X- Y- direction [m]": "[1.015 0.749]"
            }
        }
    }"#;

    #[test]
    fn parses_legacy_record_with_mixed_case_keys() {
        let t = TelemetryParser::parse_str(LEGACY).unwrap();
        assert_eq!(t.gantry_position, Vec3::new(204.345, 20.988, 0.55));
        assert_eq!(t.camera_box_offset, Vec3::new(0.877, 2.276, 0.0));
        assert_eq!(t.field_of_view, Some((1.015, 0.749)));
        assert_eq!(t.capture_time.as_deref(), Some("08/17/2016 11:28:17"));
        assert!(t.left_shape.is_none());
    }

    #[test]
    fn parses_nested_layout_with_shapes() {
        let json = r#"{
            "gantry_variable_metadata": {
                "time": "2017-05-27T11:00:00",
                "position_m": { "x": 10.0, "y": 5.0, "z": 1.5 }
            },
            "sensor_fixed_metadata": {
                "location_in_camera_box_m": { "x": 0.1, "y": 0.2, "z": 0.6 },
                "field_of_view_at_2m_m": { "x": "1.015", "y": 0.749 }
            },
            "sensor_variable_metadata": {
                "image_format": { "left": "BayerGR8", "right": "BayerGR8" },
                "width_image_pixels": { "left": "3296", "right": 3296 },
                "height_image_pixels": { "left": "2472", "right": 2472 }
            }
        }"#;
        let t = TelemetryParser::parse_str(json).unwrap();
        assert_eq!(t.camera_height(), 1.5 + 0.6);
        assert_eq!(t.left_shape, Some(FrameShape::STEREO_TOP));
        assert_eq!(t.right_shape, Some(FrameShape::STEREO_TOP));
        assert_eq!(t.field_of_view, Some((1.015, 0.749)));
    }

    #[test]
    fn finds_record_inside_dataset_metadata_list() {
        let json = format!(r#"[{{"agent": {{}}, "content": {{"status": "x"}}}}, {{"content": {LEGACY}}}]"#);
        let t = TelemetryParser::parse_str(&json).unwrap();
        assert_eq!(t.gantry_position.x, 204.345);
    }

    #[test]
    fn missing_gantry_position_is_corrupt_metadata() {
        let json = r#"{ "gantry_system_variable_metadata": { "position x [m]": 1 },
                        "sensor_fixed_metadata": {} }"#;
        let err = TelemetryParser::parse_str(json).unwrap_err();
        assert!(matches!(err, PipelineError::CorruptMetadata(_)), "{err}");
    }

    #[test]
    fn unknown_image_format_is_rejected() {
        let json = r#"{
            "gantry_system_variable_metadata": {
                "position x [m]": 1, "position y [m]": 2, "position z [m]": 3 },
            "sensor_fixed_metadata": {
                "location in camera box x [m]": 0, "location in camera box y [m]": 0 },
            "sensor_variable_metadata": { "image_format": { "left": "RGB8" } }
        }"#;
        assert!(matches!(
            TelemetryParser::parse_str(json),
            Err(PipelineError::CorruptMetadata(_))
        ));
    }

    #[test]
    fn non_numeric_position_is_rejected() {
        let json = r#"{
            "gantry_system_variable_metadata": {
                "position x [m]": "north", "position y [m]": 2, "position z [m]": 3 },
            "sensor_fixed_metadata": {
                "location in camera box x [m]": 0, "location in camera box y [m]": 0 }
        }"#;
        assert!(matches!(
            TelemetryParser::parse_str(json),
            Err(PipelineError::CorruptMetadata(_))
        ));
    }

    #[test]
    fn overflowing_image_dimensions_are_corrupt_metadata() {
        let json = r#"{
            "gantry_system_variable_metadata": {
                "position x [m]": 1, "position y [m]": 2, "position z [m]": 3 },
            "sensor_fixed_metadata": {
                "location in camera box x [m]": 0, "location in camera box y [m]": 0 },
            "sensor_variable_metadata": {
                "width_image_pixels": { "left": 4294967296 },
                "height_image_pixels": { "left": 4294967296 } }
        }"#;
        assert!(matches!(
            TelemetryParser::parse_str(json),
            Err(PipelineError::CorruptMetadata(_))
        ));
    }
}
