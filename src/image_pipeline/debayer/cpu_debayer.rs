use rayon::prelude::*;
use tracing::debug;

use crate::image_pipeline::debayer::types::RgbImageData;
use crate::image_pipeline::raw::types::RawFrame;

/// Bilinear GBRG demosaic followed by the 90° counter-clockwise turn that
/// matches the stereo cameras' mounting.
///
/// Each channel is scattered onto a sparse grid by its 2x2 phase and then
/// convolved with a fixed kernel whose weights are in quarters:
///
/// ```text
/// green      red / blue
/// 0 1 0      1 2 1
/// 1 4 1      2 4 2
/// 0 1 0      1 2 1
/// ```
///
/// Borders replicate the nearest sparse sample.
pub struct CpuDebayer;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Channel {
    Red = 0,
    Green = 1,
    Blue = 2,
}

const GREEN_KERNEL: [[u32; 3]; 3] = [[0, 1, 0], [1, 4, 1], [0, 1, 0]];
const RED_BLUE_KERNEL: [[u32; 3]; 3] = [[1, 2, 1], [2, 4, 2], [1, 2, 1]];
const KERNEL_DIVISOR: u32 = 4;

/// GBRG: G B / R G reading rows top-down is G R on even rows, B G on odd.
fn phase(row: usize, col: usize) -> Channel {
    match (row % 2, col % 2) {
        (0, 1) => Channel::Red,
        (1, 0) => Channel::Blue,
        _ => Channel::Green,
    }
}

impl CpuDebayer {
    pub fn new() -> Self {
        Self
    }

    /// Callers validate `raw.data.len() == width * height` before decoding.
    pub fn process(&self, raw: &RawFrame) -> RgbImageData {
        let (width, height) = (raw.width, raw.height);
        debug!("Starting CPU debayering for frame {}x{}", width, height);

        // rotated output is `width` rows of `height` pixels
        let out_width = height;
        let out_height = width;
        let mut data = vec![0u8; out_width * out_height * 3];

        data.par_chunks_mut(out_width * 3)
            .enumerate()
            .for_each(|(out_row, row_buf)| {
                let src_col = width - 1 - out_row;
                for (src_row, pixel) in row_buf.chunks_exact_mut(3).enumerate() {
                    pixel[0] = interpolate(raw, src_row, src_col, Channel::Red);
                    pixel[1] = interpolate(raw, src_row, src_col, Channel::Green);
                    pixel[2] = interpolate(raw, src_row, src_col, Channel::Blue);
                }
            });

        RgbImageData {
            width: out_width,
            height: out_height,
            data,
        }
    }
}

impl Default for CpuDebayer {
    fn default() -> Self {
        Self::new()
    }
}

fn interpolate(raw: &RawFrame, row: usize, col: usize, channel: Channel) -> u8 {
    let kernel = match channel {
        Channel::Green => &GREEN_KERNEL,
        Channel::Red | Channel::Blue => &RED_BLUE_KERNEL,
    };

    let mut sum = 0u32;
    for (dr, kernel_row) in kernel.iter().enumerate() {
        let r = clamp_index(row, dr, raw.height);
        for (dc, &weight) in kernel_row.iter().enumerate() {
            if weight == 0 {
                continue;
            }
            let c = clamp_index(col, dc, raw.width);
            if phase(r, c) == channel {
                sum += weight * raw.sample(r, c) as u32;
            }
        }
    }
    ((sum + KERNEL_DIVISOR / 2) / KERNEL_DIVISOR).min(255) as u8
}

/// `base + offset - 1`, clamped into `0..len`.
fn clamp_index(base: usize, offset: usize, len: usize) -> usize {
    (base + offset).saturating_sub(1).min(len - 1)
}
