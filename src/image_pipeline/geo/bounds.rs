//! WGS84 bounding boxes and the affine geotransform derived from them.

use serde::{Deserialize, Serialize};

use crate::image_pipeline::common::error::{PipelineError, Result};

/// Geographic footprint in decimal degrees (EPSG:4326).
///
/// Always satisfies `lat_min < lat_max` and `lng_min < lng_max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

impl GeoBounds {
    /// Builds bounds from two latitudes and two longitudes in any order.
    pub fn from_corners(lat_a: f64, lat_b: f64, lng_a: f64, lng_b: f64) -> Result<Self> {
        let bounds = Self {
            lat_min: lat_a.min(lat_b),
            lat_max: lat_a.max(lat_b),
            lng_min: lng_a.min(lng_b),
            lng_max: lng_a.max(lng_b),
        };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<()> {
        let finite = [self.lat_min, self.lat_max, self.lng_min, self.lng_max]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.lat_min >= self.lat_max || self.lng_min >= self.lng_max {
            return Err(PipelineError::InvalidShape(format!(
                "degenerate bounds lat [{}, {}] lng [{}, {}]",
                self.lat_min, self.lat_max, self.lng_min, self.lng_max
            )));
        }
        Ok(())
    }

    pub fn lat_span(&self) -> f64 {
        self.lat_max - self.lat_min
    }

    pub fn lng_span(&self) -> f64 {
        self.lng_max - self.lng_min
    }

    /// Open-interval overlap test; rasters that merely touch do not intersect.
    pub fn intersects(&self, other: &GeoBounds) -> bool {
        self.lng_min < other.lng_max
            && other.lng_min < self.lng_max
            && self.lat_min < other.lat_max
            && other.lat_min < self.lat_max
    }

    /// Half-open containment: west and south edges inclusive.
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.lat_min && lat < self.lat_max && lng >= self.lng_min && lng < self.lng_max
    }

    pub fn union(&self, other: &GeoBounds) -> GeoBounds {
        GeoBounds {
            lat_min: self.lat_min.min(other.lat_min),
            lat_max: self.lat_max.max(other.lat_max),
            lng_min: self.lng_min.min(other.lng_min),
            lng_max: self.lng_max.max(other.lng_max),
        }
    }

    pub fn intersection(&self, other: &GeoBounds) -> Option<GeoBounds> {
        if !self.intersects(other) {
            return None;
        }
        Some(GeoBounds {
            lat_min: self.lat_min.max(other.lat_min),
            lat_max: self.lat_max.min(other.lat_max),
            lng_min: self.lng_min.max(other.lng_min),
            lng_max: self.lng_max.min(other.lng_max),
        })
    }
}

/// GDAL-style six-term affine geotransform, north-up (no rotation terms).
///
/// `[origin_lng, x_res, 0, origin_lat, 0, -y_res]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    pub fn from_bounds(bounds: &GeoBounds, cols: usize, rows: usize) -> Self {
        let x_res = bounds.lng_span() / cols as f64;
        let y_res = bounds.lat_span() / rows as f64;
        GeoTransform([bounds.lng_min, x_res, 0.0, bounds.lat_max, 0.0, -y_res])
    }

    pub fn origin_lng(&self) -> f64 {
        self.0[0]
    }

    pub fn origin_lat(&self) -> f64 {
        self.0[3]
    }

    pub fn x_res(&self) -> f64 {
        self.0[1]
    }

    /// Positive pixel height in degrees.
    pub fn y_res(&self) -> f64 {
        -self.0[5]
    }

    pub fn to_bounds(&self, cols: usize, rows: usize) -> Result<GeoBounds> {
        GeoBounds::from_corners(
            self.origin_lat() - self.y_res() * rows as f64,
            self.origin_lat(),
            self.origin_lng(),
            self.origin_lng() + self.x_res() * cols as f64,
        )
    }
}
