//! Empirically fit, dataset-specific constants used to georeference frames.
//!
//! Everything here was fit against one field (the UA-MAC gantry) and one
//! season of stereo RGB captures. Newer fits ship as a new `version` loaded
//! from JSON rather than by editing these defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::image_pipeline::common::error::{PipelineError, Result};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Local gantry (x, y) to projected (easting, northing) fit:
///
/// ```text
/// easting  = ax + bx * x + cx * y
/// northing = ay + by * x + cy * y
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineFit {
    pub ax: f64,
    pub bx: f64,
    pub cx: f64,
    pub ay: f64,
    pub by: f64,
    pub cy: f64,
}

impl AffineFit {
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.ax + self.bx * x + self.cx * y,
            self.ay + self.by * x + self.cy * y,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoCalibration {
    pub version: String,
    /// South-east corner of the field; gantry positions grow to the north-west.
    pub reference_corner: LatLng,
    pub earth_radius_m: f64,
    /// Distance from the camera-box center to each stereo camera along x
    /// (left is +, right is -).
    pub stereo_offset_m: f64,
    /// Added to camera height so that images within a column line up.
    pub height_offset_m: f64,
    /// Predicted canopy height as a fraction of camera height.
    pub canopy_height_slope: f64,
    /// Height at which the field-of-view constants were measured.
    pub reference_height_m: f64,
    /// Field of view at the reference height, (x, y) in meters. When set it
    /// overrides the value carried in frame metadata.
    pub fov_at_reference_m: Option<[f64; 2]>,
    pub affine: AffineFit,
    /// Corrective shift subtracted from affine-derived latitudes.
    pub lat_shift_deg: f64,
    /// Corrective shift added to affine-derived longitudes.
    pub lon_shift_deg: f64,
}

impl Default for GeoCalibration {
    fn default() -> Self {
        Self {
            version: "2017-05-25".to_string(),
            reference_corner: LatLng {
                lat: 33.07451869,
                lng: -111.97477775,
            },
            earth_radius_m: 6_378_137.0,
            stereo_offset_m: 0.17,
            height_offset_m: 1.64,
            canopy_height_slope: 0.574,
            reference_height_m: 2.0,
            fov_at_reference_m: Some([1.015, 0.749]),
            affine: AffineFit {
                ax: 409_012.2032,
                bx: 0.009,
                cx: -0.9986,
                ay: 3_659_974.971,
                by: 1.0002,
                cy: 0.0078,
            },
            lat_shift_deg: 0.000_015_258_894,
            lon_shift_deg: 0.000_020_308_287,
        }
    }
}

impl GeoCalibration {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::InputNotFound(format!("{}: {}", path.display(), e)))?;
        let calibration: GeoCalibration = serde_json::from_str(&text)
            .map_err(|e| PipelineError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        calibration.validate()?;
        Ok(calibration)
    }

    pub fn validate(&self) -> Result<()> {
        if self.earth_radius_m <= 0.0 || self.reference_height_m <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "calibration {}: earth radius and reference height must be positive",
                self.version
            )));
        }
        if let Some([x, y]) = self.fov_at_reference_m {
            if x <= 0.0 || y <= 0.0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "calibration {}: field of view must be positive, got [{x}, {y}]",
                    self.version
                )));
            }
        }
        Ok(())
    }

    /// UTM zone holding the reference corner.
    pub fn utm_zone(&self) -> u8 {
        (((self.reference_corner.lng + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u8
    }
}
