// Grid sampler: one truncating box average per grid cell.
//
// The grid is anchored at (0,0) and steps by `spacing`. Cells on the right and
// bottom edges are clipped to the image, never padded, so every pixel belongs
// to exactly one cell.

use crate::error::{Error, Result};
use crate::types::{PixelBuffer, Rgb};

/// One sampled cell in source-buffer pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridCell {
    pub center_x: i32,
    pub center_y: i32,
    pub color: Rgb,
}

/// Exact output length of [`sample`]: `ceil(w/s) * ceil(h/s)`.
pub fn cell_count(width: u32, height: u32, spacing: u32) -> usize {
    if spacing == 0 {
        return 0;
    }
    width.div_ceil(spacing) as usize * height.div_ceil(spacing) as usize
}

/// Average RGB per grid cell, row-major (top-to-bottom, left-to-right).
///
/// `buffer` is tightly packed RGBA; alpha is ignored. Zero spacing or an empty
/// image would produce cells with no pixels and is rejected.
pub fn sample(buffer: &[u8], width: u32, height: u32, spacing: u32) -> Result<Vec<GridCell>> {
    let mut out = Vec::with_capacity(cell_count(width, height, spacing));
    sample_with(buffer, width, height, spacing, |cell| out.push(cell))?;
    Ok(out)
}

pub fn sample_buffer(buffer: &PixelBuffer, spacing: u32) -> Result<Vec<GridCell>> {
    sample(buffer.as_bytes(), buffer.width(), buffer.height(), spacing)
}

/// Streaming form of [`sample`]: hands each cell to `emit` in grid order,
/// without allocating.
pub fn sample_with<F>(buffer: &[u8], width: u32, height: u32, spacing: u32, mut emit: F) -> Result<()>
where
    F: FnMut(GridCell),
{
    if spacing == 0 || width == 0 || height == 0 {
        return Err(Error::DegenerateCell {
            width: width as i64,
            height: height as i64,
            spacing: spacing as i64,
        });
    }
    let (w, h, s) = (width as usize, height as usize, spacing as usize);
    let stride = w * 4;
    if buffer.len() < stride * h {
        return Err(Error::InvalidParameter {
            name: "pixel buffer length",
            value: buffer.len() as f64,
            min: (stride * h) as f64,
            max: f64::MAX,
        });
    }
    let half = (spacing / 2) as i32;

    for gy in (0..h).step_by(s) {
        let y_end = (gy + s).min(h);
        for gx in (0..w).step_by(s) {
            let x_end = (gx + s).min(w);

            let (mut r_sum, mut g_sum, mut b_sum) = (0u64, 0u64, 0u64);
            for sy in gy..y_end {
                let row = &buffer[sy * stride + gx * 4..sy * stride + x_end * 4];
                for px in row.chunks_exact(4) {
                    r_sum += px[0] as u64;
                    g_sum += px[1] as u64;
                    b_sum += px[2] as u64;
                }
            }
            // Non-zero: gx < w and gy < h, so both extents hold at least one pixel.
            let count = ((x_end - gx) * (y_end - gy)) as u64;

            emit(GridCell {
                center_x: gx as i32 + half,
                center_y: gy as i32 + half,
                color: Rgb::new((r_sum / count) as u8, (g_sum / count) as u8, (b_sum / count) as u8),
            });
        }
    }
    Ok(())
}

/// Mean RGB over every `step`-th pixel, in buffer order. Cheap estimate of
/// the dominant tone; returns zeros for an empty buffer.
pub fn coarse_average(buffer: &[u8], step: usize) -> [f64; 3] {
    let step = step.max(1);
    let (mut r, mut g, mut b, mut n) = (0u64, 0u64, 0u64, 0u64);
    for px in buffer.chunks_exact(4).step_by(step) {
        r += px[0] as u64;
        g += px[1] as u64;
        b += px[2] as u64;
        n += 1;
    }
    let n = n.max(1) as f64;
    [r as f64 / n, g as f64 / n, b as f64 / n]
}
