//! Capture telemetry: typed gantry and camera metadata per stereo frame.

mod parser;
pub mod types;

pub use parser::TelemetryParser;
pub use types::{FrameShape, FrameTelemetry, Vec3};
