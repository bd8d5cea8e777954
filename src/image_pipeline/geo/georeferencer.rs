//! Frame footprint computation from gantry telemetry.
//!
//! Gantry coordinates have their origin at the field's south-east corner and
//! grow to the north-west: +x is north (latitude), +y is west (longitude).

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::geo::bounds::GeoBounds;
use crate::image_pipeline::geo::calibration::GeoCalibration;
use crate::image_pipeline::geo::utm::UtmZone;
use crate::image_pipeline::raw::types::SensorSide;
use crate::image_pipeline::telemetry::types::{FrameTelemetry, Vec3};

/// How a ground rectangle in gantry meters becomes WGS84 bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GeoreferenceMethod {
    /// Meters to degrees on a spherical earth, offset from the reference corner.
    Spherical,
    /// Fitted local-grid to UTM affine, then UTM to lat/lon with corrective shifts.
    #[default]
    Affine,
}

impl GeoreferenceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeoreferenceMethod::Spherical => "spherical",
            GeoreferenceMethod::Affine => "affine",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameGeoreferencer {
    calibration: GeoCalibration,
    method: GeoreferenceMethod,
    utm: UtmZone,
}

impl FrameGeoreferencer {
    pub fn new(calibration: GeoCalibration, method: GeoreferenceMethod) -> Self {
        let utm = UtmZone::north(calibration.utm_zone());
        Self {
            calibration,
            method,
            utm,
        }
    }

    pub fn calibration(&self) -> &GeoCalibration {
        &self.calibration
    }

    pub fn method(&self) -> GeoreferenceMethod {
        self.method
    }

    /// Ground footprint (x, y) in meters at the frame's camera height.
    ///
    /// The calibrated field of view wins over the one recorded in metadata;
    /// metadata is only consulted when the calibration carries none.
    pub fn effective_fov(&self, telemetry: &FrameTelemetry) -> Result<(f64, f64)> {
        let (base_x, base_y) = match (self.calibration.fov_at_reference_m, telemetry.field_of_view) {
            (Some([x, y]), recorded) => {
                if let Some(recorded) = recorded {
                    if recorded != (x, y) {
                        warn!(
                            recorded_x = recorded.0,
                            recorded_y = recorded.1,
                            calibration = %self.calibration.version,
                            "Ignoring field of view from metadata in favour of calibration"
                        );
                    }
                }
                (x, y)
            }
            (None, Some(recorded)) => recorded,
            (None, None) => {
                return Err(PipelineError::CorruptMetadata(
                    "no field of view in metadata or calibration".to_string(),
                ));
            }
        };
        if base_x <= 0.0 || base_y <= 0.0 {
            return Err(PipelineError::CorruptMetadata(format!(
                "non-positive field of view ({base_x}, {base_y})"
            )));
        }

        let camera_height = telemetry.camera_height();
        let canopy_height = self.calibration.canopy_height_slope * camera_height;
        let adjusted_altitude = camera_height + self.calibration.height_offset_m - canopy_height;
        let scale = adjusted_altitude / self.calibration.reference_height_m;
        if !(scale > 0.0) {
            return Err(PipelineError::CorruptMetadata(format!(
                "camera height {camera_height} m gives a non-positive footprint"
            )));
        }

        Ok((base_x * scale, base_y * scale))
    }

    /// Camera center for one side of the stereo pair.
    pub fn camera_position(&self, telemetry: &FrameTelemetry, side: SensorSide) -> Vec3 {
        let center = telemetry.camera_center();
        Vec3::new(
            center.x + side.baseline_sign() * self.calibration.stereo_offset_m,
            center.y,
            center.z,
        )
    }

    pub fn bounds(&self, telemetry: &FrameTelemetry, side: SensorSide) -> Result<GeoBounds> {
        let position = self.camera_position(telemetry, side);
        let fov = self.effective_fov(telemetry)?;
        let bounds = match self.method {
            GeoreferenceMethod::Spherical => self.spherical_bounds(position, fov)?,
            GeoreferenceMethod::Affine => self.affine_bounds(position, fov)?,
        };
        debug!(
            side = %side,
            method = self.method.as_str(),
            lat_min = bounds.lat_min,
            lat_max = bounds.lat_max,
            lng_min = bounds.lng_min,
            lng_max = bounds.lng_max,
            "Georeferenced frame"
        );
        Ok(bounds)
    }

    pub fn spherical_bounds(&self, position: Vec3, fov: (f64, f64)) -> Result<GeoBounds> {
        let corner = self.calibration.reference_corner;
        let radius = self.calibration.earth_radius_m;
        let lng_scale = radius * corner.lat.to_radians().cos();

        let north_min = position.x - fov.0 / 2.0;
        let north_max = position.x + fov.0 / 2.0;
        let west_min = position.y - fov.1 / 2.0;
        let west_max = position.y + fov.1 / 2.0;

        GeoBounds::from_corners(
            corner.lat + (north_min / radius).to_degrees(),
            corner.lat + (north_max / radius).to_degrees(),
            corner.lng - (west_min / lng_scale).to_degrees(),
            corner.lng - (west_max / lng_scale).to_degrees(),
        )
    }

    pub fn affine_bounds(&self, position: Vec3, fov: (f64, f64)) -> Result<GeoBounds> {
        let y_west = position.y + fov.1 / 2.0;
        let y_east = position.y - fov.1 / 2.0;
        let x_north = position.x + fov.0 / 2.0;
        let x_south = position.x - fov.0 / 2.0;

        let (e_nw, n_nw) = self.calibration.affine.apply(x_north, y_west);
        let (e_se, n_se) = self.calibration.affine.apply(x_south, y_east);
        let (lat_nw, lng_nw) = self.utm.to_lat_lng(e_nw, n_nw)?;
        let (lat_se, lng_se) = self.utm.to_lat_lng(e_se, n_se)?;

        let lat_shift = self.calibration.lat_shift_deg;
        let lon_shift = self.calibration.lon_shift_deg;
        GeoBounds::from_corners(
            lat_se - lat_shift,
            lat_nw - lat_shift,
            lng_nw + lon_shift,
            lng_se + lon_shift,
        )
    }
}
