//! Flat-memory boundary for the grid sampler.
//!
//! The sampler can run against a single byte arena, the way a low-level module
//! with its own linear memory would be driven from a host:
//!
//! ```text
//! [0, w*h*4)                      RGBA input pixels
//! [w*h*4, w*h*4 + cells*20)       cell records
//! ```
//!
//! Each cell record is five little-endian `i32`s: `center_x, center_y, r, g, b`
//! (20 bytes). [`encode_cells`] and [`decode_cells`] are the same contract
//! without the arena.

use crate::error::{Error, Result};
use crate::sampler::{self, GridCell};
use crate::types::Rgb;

pub const CELL_RECORD_BYTES: usize = 20;
/// The arena grows in pages of this many bytes.
pub const PAGE_BYTES: usize = 64 * 1024;

pub fn encode_cell(cell: &GridCell, out: &mut [u8]) {
    let fields = [
        cell.center_x,
        cell.center_y,
        cell.color.r as i32,
        cell.color.g as i32,
        cell.color.b as i32,
    ];
    for (slot, v) in out.chunks_exact_mut(4).zip(fields) {
        slot.copy_from_slice(&v.to_le_bytes());
    }
}

pub fn encode_cells(cells: &[GridCell]) -> Vec<u8> {
    let mut out = vec![0u8; cells.len() * CELL_RECORD_BYTES];
    for (cell, rec) in cells.iter().zip(out.chunks_exact_mut(CELL_RECORD_BYTES)) {
        encode_cell(cell, rec);
    }
    out
}

/// Parse 20-byte cell records. Trailing partial records and channel values
/// outside 0..=255 are rejected.
pub fn decode_cells(bytes: &[u8]) -> Result<Vec<GridCell>> {
    if bytes.len() % CELL_RECORD_BYTES != 0 {
        return Err(Error::InvalidParameter {
            name: "cell record bytes",
            value: bytes.len() as f64,
            min: 0.0,
            max: (bytes.len() - bytes.len() % CELL_RECORD_BYTES) as f64,
        });
    }
    bytes.chunks_exact(CELL_RECORD_BYTES).map(decode_cell).collect()
}

fn decode_cell(rec: &[u8]) -> Result<GridCell> {
    let mut f = [0i32; 5];
    for (v, b) in f.iter_mut().zip(rec.chunks_exact(4)) {
        *v = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    }
    let channel = |name: &'static str, v: i32| -> Result<u8> {
        u8::try_from(v).map_err(|_| Error::InvalidParameter { name, value: v as f64, min: 0.0, max: 255.0 })
    };
    Ok(GridCell {
        center_x: f[0],
        center_y: f[1],
        color: Rgb::new(channel("r", f[2])?, channel("g", f[3])?, channel("b", f[4])?),
    })
}

/// Owns the byte arena. Kept alive across renders so the arena only grows.
pub struct CellKernel {
    memory: Vec<u8>,
    limit: usize,
    pixel_bytes: usize,
    cell_count: usize,
}

impl Default for CellKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl CellKernel {
    pub fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// Arena that refuses to grow past `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self { memory: Vec::new(), limit, pixel_bytes: 0, cell_count: 0 }
    }

    /// Bytes needed for an image and its worst-case cell list.
    pub fn required_bytes(width: u32, height: u32, spacing: u32) -> usize {
        width as usize * height as usize * 4 + sampler::cell_count(width, height, spacing) * CELL_RECORD_BYTES
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Grow (page-wise) until `bytes` fit.
    fn ensure(&mut self, bytes: usize) -> Result<()> {
        if bytes <= self.memory.len() {
            return Ok(());
        }
        let pages = (bytes - self.memory.len()).div_ceil(PAGE_BYTES);
        let target = self.memory.len() + pages * PAGE_BYTES;
        if target > self.limit {
            return Err(Error::MemoryGrowth { requested: target });
        }
        self.memory
            .try_reserve_exact(target - self.memory.len())
            .map_err(|_| Error::MemoryGrowth { requested: target })?;
        self.memory.resize(target, 0);
        log::debug!("kernel arena grown to {} pages", target / PAGE_BYTES);
        Ok(())
    }

    /// Copy the input pixels to the start of the arena, growing it to hold
    /// the cells `compute_cells` will write for this `spacing`.
    pub fn load_pixels(&mut self, width: u32, height: u32, spacing: u32, pixels: &[u8]) -> Result<()> {
        let pixel_bytes = width as usize * height as usize * 4;
        if pixels.len() != pixel_bytes {
            return Err(Error::InvalidParameter {
                name: "pixel buffer length",
                value: pixels.len() as f64,
                min: pixel_bytes as f64,
                max: pixel_bytes as f64,
            });
        }
        self.ensure(Self::required_bytes(width, height, spacing))?;
        self.memory[..pixel_bytes].copy_from_slice(pixels);
        self.pixel_bytes = pixel_bytes;
        self.cell_count = 0;
        Ok(())
    }

    /// Sample the loaded pixels into the cell region. Returns the cell count.
    pub fn compute_cells(&mut self, width: u32, height: u32, spacing: u32) -> Result<usize> {
        let pixel_bytes = width as usize * height as usize * 4;
        if pixel_bytes != self.pixel_bytes {
            return Err(Error::InvalidParameter {
                name: "kernel dimensions",
                value: pixel_bytes as f64,
                min: self.pixel_bytes as f64,
                max: self.pixel_bytes as f64,
            });
        }
        self.ensure(Self::required_bytes(width, height, spacing))?;

        let (pixels, cells) = self.memory.split_at_mut(pixel_bytes);
        let mut count = 0usize;
        sampler::sample_with(pixels, width, height, spacing, |cell| {
            let at = count * CELL_RECORD_BYTES;
            encode_cell(&cell, &mut cells[at..at + CELL_RECORD_BYTES]);
            count += 1;
        })?;
        self.cell_count = count;
        Ok(count)
    }

    /// The cell records written by the last `compute_cells`, as bytes.
    pub fn cell_bytes(&self) -> &[u8] {
        &self.memory[self.pixel_bytes..self.pixel_bytes + self.cell_count * CELL_RECORD_BYTES]
    }

    pub fn cells(&self) -> Result<Vec<GridCell>> {
        decode_cells(self.cell_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout_is_little_endian_i32s() {
        let cell = GridCell { center_x: 258, center_y: -1, color: Rgb::new(1, 2, 255) };
        let bytes = encode_cells(&[cell]);
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[0..4], &[2, 1, 0, 0]);
        assert_eq!(&bytes[4..8], &[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(&bytes[16..20], &[255, 0, 0, 0]);
        assert_eq!(decode_cells(&bytes).unwrap(), vec![cell]);
    }

    #[test]
    fn decode_rejects_partial_records_and_bad_channels() {
        assert!(decode_cells(&[0u8; 19]).is_err());
        let mut bytes = encode_cells(&[GridCell { center_x: 0, center_y: 0, color: Rgb::default() }]);
        bytes[8..12].copy_from_slice(&300i32.to_le_bytes());
        assert!(decode_cells(&bytes).is_err());
    }

    #[test]
    fn arena_matches_direct_sampling() {
        let (w, h, s) = (23u32, 11u32, 5u32);
        let pixels: Vec<u8> = (0..(w * h * 4)).map(|i| (i * 7 % 256) as u8).collect();

        let mut kernel = CellKernel::new();
        kernel.load_pixels(w, h, s, &pixels).unwrap();
        let n = kernel.compute_cells(w, h, s).unwrap();

        let direct = sampler::sample(&pixels, w, h, s).unwrap();
        assert_eq!(n, direct.len());
        assert_eq!(kernel.cells().unwrap(), direct);
        assert_eq!(kernel.memory().len() % PAGE_BYTES, 0);
        assert_eq!(&kernel.memory()[..pixels.len()], &pixels[..]);
    }

    #[test]
    fn growth_past_limit_fails() {
        let mut kernel = CellKernel::with_limit(PAGE_BYTES);
        let pixels = vec![0u8; 200 * 200 * 4];
        assert!(matches!(
            kernel.load_pixels(200, 200, 1, &pixels),
            Err(Error::MemoryGrowth { .. })
        ));
    }

    #[test]
    fn reuse_shrinks_cell_view() {
        let mut kernel = CellKernel::new();
        let big = vec![9u8; 40 * 40 * 4];
        kernel.load_pixels(40, 40, 1, &big).unwrap();
        assert_eq!(kernel.compute_cells(40, 40, 1).unwrap(), 1600);
        let small = vec![9u8; 4 * 4 * 4];
        kernel.load_pixels(4, 4, 2, &small).unwrap();
        assert_eq!(kernel.compute_cells(4, 4, 2).unwrap(), 4);
        assert_eq!(kernel.cells().unwrap().len(), 4);
    }
}
