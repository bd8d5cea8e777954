//! Gantry/camera telemetry for one stereo capture.

use crate::image_pipeline::raw::types::SensorSide;

/// A position or offset in meters, gantry coordinates (x north, y west, z up).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl std::ops::Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

/// Raw frame dimensions in pixels, as declared by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    pub width: usize,
    pub height: usize,
}

impl FrameShape {
    /// The stereo RGB sensor's native frame size.
    pub const STEREO_TOP: FrameShape = FrameShape { width: 3296, height: 2472 };

    /// `None` when the declared dimensions overflow `usize`.
    pub fn pixel_count(&self) -> Option<usize> {
        self.width.checked_mul(self.height)
    }
}

/// Telemetry parsed from a capture's metadata record. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTelemetry {
    pub gantry_position: Vec3,
    pub camera_box_offset: Vec3,
    /// Field of view at the reference height as recorded in the metadata.
    pub field_of_view: Option<(f64, f64)>,
    pub capture_time: Option<String>,
    pub left_shape: Option<FrameShape>,
    pub right_shape: Option<FrameShape>,
}

impl FrameTelemetry {
    pub fn new(gantry_position: Vec3, camera_box_offset: Vec3) -> Self {
        Self {
            gantry_position,
            camera_box_offset,
            field_of_view: None,
            capture_time: None,
            left_shape: None,
            right_shape: None,
        }
    }

    /// Camera-box center: gantry position plus the box offset.
    pub fn camera_center(&self) -> Vec3 {
        self.gantry_position + self.camera_box_offset
    }

    /// Camera height above the field datum.
    pub fn camera_height(&self) -> f64 {
        self.gantry_position.z + self.camera_box_offset.z
    }

    /// Frame shape declared for one side, if the metadata carried it.
    pub fn shape(&self, side: SensorSide) -> Option<FrameShape> {
        match side {
            SensorSide::Left => self.left_shape,
            SensorSide::Right => self.right_shape,
        }
    }
}
