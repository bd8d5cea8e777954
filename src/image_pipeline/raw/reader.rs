use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::raw::types::RawFrame;
use crate::image_pipeline::telemetry::FrameShape;

pub trait RawFrameReader {
    fn read_frame(&self, data: &[u8], shape: FrameShape) -> Result<RawFrame>;
}
