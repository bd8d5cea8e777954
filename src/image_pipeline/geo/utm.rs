use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::image_pipeline::common::error::{PipelineError, Result};

const WGS84_LONGLAT: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// A northern- or southern-hemisphere UTM zone on the WGS84 datum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmZone {
    pub zone: u8,
    pub north: bool,
}

impl UtmZone {
    pub fn north(zone: u8) -> Self {
        Self { zone, north: true }
    }

    fn proj_string(&self) -> String {
        let south = if self.north { "" } else { " +south" };
        format!("+proj=utm +zone={}{} +datum=WGS84 +units=m +no_defs", self.zone, south)
    }

    /// Converts a projected coordinate in this zone to (lat, lng) degrees.
    pub fn to_lat_lng(&self, easting: f64, northing: f64) -> Result<(f64, f64)> {
        let source = Proj::from_proj_string(&self.proj_string())
            .map_err(|e| PipelineError::Projection(format!("UTM zone {}: {e:?}", self.zone)))?;
        let target = Proj::from_proj_string(WGS84_LONGLAT)
            .map_err(|e| PipelineError::Projection(format!("WGS84: {e:?}")))?;

        let mut point = (easting, northing, 0.0);
        transform(&source, &target, &mut point)
            .map_err(|e| PipelineError::Projection(format!("transform failed: {e:?}")))?;

        // geographic output comes back in radians
        Ok((point.1.to_degrees(), point.0.to_degrees()))
    }
}
