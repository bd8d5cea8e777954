use tracing::debug;

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::raw::reader::RawFrameReader;
use crate::image_pipeline::raw::types::RawFrame;
use crate::image_pipeline::telemetry::FrameShape;

/// Reads the gantry's flat `.bin` dumps: no header, one byte per sample.
pub struct BinFrameReader;

impl RawFrameReader for BinFrameReader {
    fn read_frame(&self, data: &[u8], shape: FrameShape) -> Result<RawFrame> {
        if shape.width == 0 || shape.height == 0 {
            return Err(PipelineError::InvalidShape(format!(
                "frame dimensions must be non-zero, got {}x{}",
                shape.width, shape.height
            )));
        }
        let expected = shape.pixel_count().ok_or_else(|| {
            PipelineError::InvalidShape(format!("{}x{} frame overflows", shape.width, shape.height))
        })?;
        if data.len() != expected {
            return Err(PipelineError::InvalidShape(format!(
                "expected {} bytes for a {}x{} frame, got {}",
                expected,
                shape.width,
                shape.height,
                data.len()
            )));
        }

        debug!("Read raw frame {}x{}", shape.width, shape.height);
        Ok(RawFrame {
            width: shape.width,
            height: shape.height,
            data: data.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exact_byte_count() {
        let frame = BinFrameReader
            .read_frame(&[7u8; 12], FrameShape { width: 4, height: 3 })
            .unwrap();
        assert_eq!((frame.width, frame.height), (4, 3));
        assert_eq!(frame.sample(2, 3), 7);
    }

    #[test]
    fn rejects_truncated_dump() {
        let err = BinFrameReader
            .read_frame(&[0u8; 11], FrameShape { width: 4, height: 3 })
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidShape(_)));
    }

    #[test]
    fn rejects_zero_dimension() {
        let err = BinFrameReader
            .read_frame(&[], FrameShape { width: 0, height: 3 })
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidShape(_)));
    }

    #[test]
    fn rejects_overflowing_dimensions() {
        let err = BinFrameReader
            .read_frame(&[0u8; 4], FrameShape { width: usize::MAX, height: 2 })
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidShape(_)));
    }
}
