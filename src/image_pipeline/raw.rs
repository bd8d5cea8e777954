//! Raw frame reading module
//!
//! Stereo frames arrive as headerless Bayer dumps whose dimensions come from
//! the capture metadata, so readers take the expected shape alongside the bytes.

mod bin_reader;
mod reader;
pub mod types;

pub use bin_reader::BinFrameReader;
pub use reader::RawFrameReader;
pub use types::{RawFrame, SensorSide};
