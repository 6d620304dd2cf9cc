// Core pixel containers shared by the sampler, the renderers and the window.

use image::RgbaImage;

use crate::error::{Error, Result};

/// What minifb displays: one `0x00RRGGBB` word per pixel.
#[derive(Clone)]
pub struct FrameBuffer {
    pub width: usize,      // how wide the frame is on screen (pixels)
    pub height: usize,     // how tall the frame is on screen (pixels)
    pub pixels: Vec<u32>,  // each entry is 0x00RRGGBB for minifb
}

impl FrameBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, pixels: vec![0u32; width * height] }
    }
}

/// Immutable RGBA bitmap, row-major, 4 bytes per pixel (R,G,B,A).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGBA bytes; the length must be exactly `width * height * 4`.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(Error::InvalidParameter {
                name: "pixel buffer length",
                value: data.len() as f64,
                min: expected as f64,
                max: expected as f64,
            });
        }
        Ok(Self { width, height, data })
    }

    /// A buffer where every pixel is `rgba`.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgba);
        }
        Self { width, height, data }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// RGB at (x,y); coordinates are clamped into the buffer.
    pub fn rgb_at(&self, x: i64, y: i64) -> Rgb {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        let off = (y * self.width as usize + x) * 4;
        Rgb::new(self.data[off], self.data[off + 1], self.data[off + 2])
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self { width, height, data: img.into_raw() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb { r: 255, g: 255, b: 255 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Blend a (possibly fractional) average color toward white:
    /// `round(avg + (255 - avg) * amount)` per channel.
    pub fn wash(avg: [f64; 3], amount: f64) -> Self {
        let ch = |a: f64| (a + (255.0 - a) * amount).round().clamp(0.0, 255.0) as u8;
        Self::new(ch(avg[0]), ch(avg[1]), ch(avg[2]))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Pack as 0x00RRGGBB.
    #[inline]
    pub fn to_u32(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }
}

/// RGBA canvas with straight (non-premultiplied) alpha and source-over blending.
/// Both the opaque output and the transparent brush paint layer use it.
#[derive(Clone, Debug, PartialEq)]
pub struct Surface {
    width: usize,
    height: usize,
    pixels: Vec<[u8; 4]>,
}

impl Surface {
    /// Fully transparent surface.
    pub fn transparent(width: usize, height: usize) -> Self {
        Self { width, height, pixels: vec![[0, 0, 0, 0]; width * height] }
    }

    /// Opaque surface filled with `color`.
    pub fn filled(width: usize, height: usize, color: Rgb) -> Self {
        Self { width, height, pixels: vec![[color.r, color.g, color.b, 255]; width * height] }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn fill(&mut self, color: Rgb) {
        for p in &mut self.pixels {
            *p = [color.r, color.g, color.b, 255];
        }
    }

    pub fn clear(&mut self) {
        for p in &mut self.pixels {
            *p = [0, 0, 0, 0];
        }
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        self.pixels[y * self.width + x]
    }

    /// Source-over blend of `color` at `alpha` into (x,y); out-of-bounds is ignored.
    #[inline]
    pub fn blend(&mut self, x: i32, y: i32, color: Rgb, alpha: f32) {
        if x < 0 || y < 0 {
            return;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return;
        }
        let dst = &mut self.pixels[y * self.width + x];
        *dst = over([color.r, color.g, color.b], alpha, *dst);
    }

    /// Blend a horizontal span `[x0, x1)` on row `y`.
    pub fn blend_span(&mut self, x0: i32, x1: i32, y: i32, color: Rgb, alpha: f32) {
        if y < 0 || y as usize >= self.height {
            return;
        }
        let x0 = x0.max(0);
        let x1 = x1.min(self.width as i32);
        for x in x0..x1 {
            self.blend(x, y, color, alpha);
        }
    }

    /// Destination-out: make every pixel within `radius` of (cx,cy) transparent.
    pub fn clear_disc(&mut self, cx: f32, cy: f32, radius: f32) {
        if radius <= 0.0 {
            return;
        }
        let r2 = radius * radius;
        let y0 = ((cy - radius).floor() as i32).max(0);
        let y1 = ((cy + radius).ceil() as i32).min(self.height as i32 - 1);
        let x0 = ((cx - radius).floor() as i32).max(0);
        let x1 = ((cx + radius).ceil() as i32).min(self.width as i32 - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= r2 {
                    self.pixels[y as usize * self.width + x as usize] = [0, 0, 0, 0];
                }
            }
        }
    }

    /// Composite `top` over this surface, scaling its alpha by `alpha`.
    /// Both surfaces must share dimensions; the overlapping region is used otherwise.
    pub fn draw_surface(&mut self, top: &Surface, alpha: f32) {
        let w = self.width.min(top.width);
        let h = self.height.min(top.height);
        for y in 0..h {
            for x in 0..w {
                let src = top.pixels[y * top.width + x];
                if src[3] == 0 {
                    continue;
                }
                let a = src[3] as f32 / 255.0 * alpha;
                let dst = &mut self.pixels[y * self.width + x];
                *dst = over([src[0], src[1], src[2]], a, *dst);
            }
        }
    }

    /// Copy an RGBA pixel buffer of the same size in as an opaque image.
    pub fn from_pixel_buffer(buf: &PixelBuffer) -> Self {
        let pixels = buf
            .as_bytes()
            .chunks_exact(4)
            .map(|p| [p[0], p[1], p[2], p[3]])
            .collect();
        Self { width: buf.width() as usize, height: buf.height() as usize, pixels }
    }

    /// Pack into the window buffer (alpha dropped). Sizes must match.
    pub fn write_frame(&self, fb: &mut FrameBuffer) {
        let w = self.width.min(fb.width);
        let h = self.height.min(fb.height);
        for y in 0..h {
            for x in 0..w {
                let [r, g, b, _] = self.pixels[y * self.width + x];
                fb.pixels[y * fb.width + x] = Rgb::new(r, g, b).to_u32();
            }
        }
    }

    pub fn to_image(&self) -> RgbaImage {
        let raw: Vec<u8> = self.pixels.iter().flat_map(|p| p.iter().copied()).collect();
        // The raw length is width * height * 4 by construction.
        RgbaImage::from_raw(self.width as u32, self.height as u32, raw)
            .unwrap_or_else(|| RgbaImage::new(self.width as u32, self.height as u32))
    }
}

/// Straight-alpha source-over of one RGB color onto a destination pixel.
#[inline]
fn over(src: [u8; 3], src_a: f32, dst: [u8; 4]) -> [u8; 4] {
    let sa = src_a.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return dst;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return [0, 0, 0, 0];
    }
    let mix = |s: u8, d: u8| {
        let v = (s as f32 * sa + d as f32 * da * (1.0 - sa)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };
    [
        mix(src[0], dst[0]),
        mix(src[1], dst[1]),
        mix(src[2], dst[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wash_matches_documented_example() {
        let c = Rgb::wash([100.0, 100.0, 100.0], 0.85);
        assert_eq!(c, Rgb::new(232, 232, 232));
    }

    #[test]
    fn opaque_blend_replaces_destination() {
        let mut s = Surface::filled(2, 2, Rgb::WHITE);
        s.blend(1, 1, Rgb::new(10, 20, 30), 1.0);
        assert_eq!(s.pixel(1, 1), [10, 20, 30, 255]);
        assert_eq!(s.pixel(0, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn blend_onto_transparent_keeps_source_color() {
        let mut s = Surface::transparent(1, 1);
        s.blend(0, 0, Rgb::new(200, 100, 50), 0.5);
        let p = s.pixel(0, 0);
        assert_eq!(&p[..3], &[200, 100, 50]);
        assert_eq!(p[3], 128);
    }

    #[test]
    fn clear_disc_only_touches_inside() {
        let mut s = Surface::filled(20, 20, Rgb::new(1, 2, 3));
        s.clear_disc(10.0, 10.0, 3.0);
        assert_eq!(s.pixel(10, 10)[3], 0);
        assert_eq!(s.pixel(0, 0)[3], 255);
        assert_eq!(s.pixel(15, 10)[3], 255);
    }

    #[test]
    fn pixel_buffer_rejects_bad_length() {
        assert!(PixelBuffer::new(2, 2, vec![0; 15]).is_err());
        assert!(PixelBuffer::new(2, 2, vec![0; 16]).is_ok());
    }
}
