//! Georeferencing: calibration constants, projections and frame footprints.

pub mod bounds;
pub mod calibration;
mod georeferencer;
mod utm;

pub use bounds::{GeoBounds, GeoTransform};
pub use calibration::{AffineFit, GeoCalibration, LatLng};
pub use georeferencer::{FrameGeoreferencer, GeoreferenceMethod};
pub use utm::UtmZone;
