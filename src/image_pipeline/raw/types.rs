//! Raw stereo frame types

use std::fmt;

/// One headerless Bayer dump from a stereo camera, GBRG order.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Width of the frame in pixels
    pub width: usize,
    /// Height of the frame in pixels
    pub height: usize,
    /// Row-major single channel samples, exactly `width * height` bytes
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn sample(&self, row: usize, col: usize) -> u8 {
        self.data[row * self.width + col]
    }
}

/// Which camera of the stereo pair captured a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorSide {
    Left,
    Right,
}

impl SensorSide {
    pub const BOTH: [SensorSide; 2] = [SensorSide::Left, SensorSide::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorSide::Left => "left",
            SensorSide::Right => "right",
        }
    }

    /// Direction of the stereo baseline shift along the scan (x) axis.
    pub fn baseline_sign(&self) -> f64 {
        match self {
            SensorSide::Left => 1.0,
            SensorSide::Right => -1.0,
        }
    }
}

impl fmt::Display for SensorSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SensorSide {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(SensorSide::Left),
            "right" => Ok(SensorSide::Right),
            other => Err(format!("unknown sensor side: {other}")),
        }
    }
}
