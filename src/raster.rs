// Raster pipeline: cover-fit -> sample -> stylize -> shuffle -> paint.
//
// A render is all-or-nothing: either a complete `RasterOutput` comes back or
// an error does, and `RenderSession` only ever commits complete, current ones.

use std::path::Path;

use image::RgbaImage;
use image::imageops::{self, FilterType};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::cell::{CellStyle, StyledCell, stylize};
use crate::error::{Error, Result};
use crate::kernel::CellKernel;
use crate::params::RenderParams;
use crate::sampler::GridCell;
use crate::shape::ShapeRenderer;
use crate::types::{PixelBuffer, Rgb, Surface};

/// How far the backdrop is pulled from the mean cell color toward white.
pub const BACKGROUND_WASH: f64 = 0.85;

pub fn load_image(path: impl AsRef<Path>) -> Result<RgbaImage> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|e| Error::image_load(path, e))?;
    Ok(img.into_rgba8())
}

pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage> {
    let img = image::load_from_memory(bytes).map_err(|e| Error::image_load("<memory>", e))?;
    Ok(img.into_rgba8())
}

/// Scale + crop window that makes an image cover a target rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoverFit {
    pub scale: f64,
    pub scaled_width: f64,
    pub scaled_height: f64,
    /// Crop offset clamped to `[0, scaled - target]`.
    pub crop_x: f64,
    pub crop_y: f64,
}

impl CoverFit {
    pub fn compute(img_w: u32, img_h: u32, target_w: u32, target_h: u32, crop_x: f32, crop_y: f32) -> Self {
        let (iw, ih) = (img_w.max(1) as f64, img_h.max(1) as f64);
        let (tw, th) = (target_w as f64, target_h as f64);
        let scale = (tw / iw).max(th / ih);
        let scaled_width = iw * scale;
        let scaled_height = ih * scale;
        Self {
            scale,
            scaled_width,
            scaled_height,
            crop_x: (crop_x as f64).clamp(0.0, (scaled_width - tw).max(0.0)),
            crop_y: (crop_y as f64).clamp(0.0, (scaled_height - th).max(0.0)),
        }
    }
}

/// Whole source pixels `[start, end)` covering the scaled span
/// `[offset, offset + len)`, plus where that span starts once scaled back up.
fn source_span(offset: f64, len: u32, scale: f64, size: u32) -> (u32, u32, u32) {
    let start = ((offset / scale).floor().max(0.0) as u32).min(size - 1);
    let end = (((offset + len as f64) / scale).ceil() as u32).clamp(start + 1, size);
    let inner = (offset - start as f64 * scale).round().max(0.0) as u32;
    (start, end, inner)
}

/// The `target_w` x `target_h` window of `image` after cover-fit scaling.
/// Only the source pixels under the window are resampled, so the cost follows
/// the target size whatever the scale.
pub fn cover_crop(image: &RgbaImage, fit: &CoverFit, target_w: u32, target_h: u32) -> PixelBuffer {
    let (iw, ih) = image.dimensions();
    let (x0, x1, inner_x) = source_span(fit.crop_x, target_w, fit.scale, iw.max(1));
    let (y0, y1, inner_y) = source_span(fit.crop_y, target_h, fit.scale, ih.max(1));

    let window = imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image();
    let rw = ((window.width() as f64 * fit.scale).round() as u32).max(inner_x + target_w);
    let rh = ((window.height() as f64 * fit.scale).round() as u32).max(inner_y + target_h);
    let scaled = if (rw, rh) == window.dimensions() {
        window
    } else {
        imageops::resize(&window, rw, rh, FilterType::Triangle)
    };
    PixelBuffer::from(imageops::crop_imm(&scaled, inner_x, inner_y, target_w, target_h).to_image())
}

/// Mean color of the cells, washed toward white.
pub fn background_color(cells: &[GridCell], wash: f64) -> Rgb {
    let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
    for c in cells {
        r += c.color.r as u64;
        g += c.color.g as u64;
        b += c.color.b as u64;
    }
    let n = cells.len().max(1) as f64;
    Rgb::wash([r as f64 / n, g as f64 / n, b as f64 / n], wash)
}

/// A finished render.
#[derive(Clone, Debug)]
pub struct RasterOutput {
    pub surface: Surface,
    pub background: Rgb,
    /// In draw order (shuffled).
    pub cells: Vec<StyledCell>,
    pub params: RenderParams,
}

impl RasterOutput {
    pub fn width(&self) -> u32 {
        self.surface.width() as u32
    }

    pub fn height(&self) -> u32 {
        self.surface.height() as u32
    }
}

/// Owns the sampler arena and the shape renderer; both are reused between
/// renders.
#[derive(Default)]
pub struct RasterPipeline {
    kernel: CellKernel,
    shapes: ShapeRenderer,
}

impl RasterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kernel(kernel: CellKernel) -> Self {
        Self { kernel, shapes: ShapeRenderer::new() }
    }

    pub fn shapes(&self) -> &ShapeRenderer {
        &self.shapes
    }

    /// Sample the padded working surface. The extra `spacing` on each axis
    /// keeps the last partial row/column from leaving an empty strip.
    pub fn sample_cells(&mut self, image: &RgbaImage, params: &RenderParams) -> Result<Vec<GridCell>> {
        let p = params.clamped();
        let pad = p.spacing;
        let (ew, eh) = (p.output_width + pad, p.output_height + pad);
        let (iw, ih) = image.dimensions();
        if iw == 0 || ih == 0 {
            return Err(Error::image_load("<image>", "image has no pixels"));
        }

        let fit = CoverFit::compute(iw, ih, ew, eh, p.crop_x, p.crop_y);
        let working = cover_crop(image, &fit, ew, eh);

        self.kernel.load_pixels(ew, eh, p.spacing, working.as_bytes())?;
        let n = self.kernel.compute_cells(ew, eh, p.spacing)?;
        log::debug!("sampled {n} cells from {ew}x{eh} working surface (scale {:.3})", fit.scale);
        self.kernel.cells()
    }

    pub fn render<R: Rng + ?Sized>(&mut self, image: &RgbaImage, params: &RenderParams, rng: &mut R) -> Result<RasterOutput> {
        let p = params.clamped();
        let grid = self.sample_cells(image, &p)?;

        let style = CellStyle::from(&p);
        let mut cells = stylize(&grid, &style, rng);
        // Draw order only; geometry stays where the sampler put it.
        cells.shuffle(rng);

        let background = background_color(&grid, BACKGROUND_WASH);
        let surface = self.paint(&cells, background, p.output_width, p.output_height);
        log::info!(
            "rendered {} {} cells at {}x{}",
            cells.len(),
            p.shape,
            p.output_width,
            p.output_height
        );
        Ok(RasterOutput { surface, background, cells, params: p })
    }

    pub fn render_path<R: Rng + ?Sized>(&mut self, path: impl AsRef<Path>, params: &RenderParams, rng: &mut R) -> Result<RasterOutput> {
        let image = load_image(path)?;
        self.render(&image, params, rng)
    }

    /// Fill with `background`, then draw `cells` in order.
    pub fn paint(&self, cells: &[StyledCell], background: Rgb, width: u32, height: u32) -> Surface {
        let mut surface = Surface::filled(width as usize, height as usize, background);
        for c in cells {
            self.shapes.draw_cell(&mut surface, c);
        }
        surface
    }
}

/// Proof that a render was requested; only the newest one may commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTicket {
    generation: u64,
}

/// Tracks the current render generation and the last committed output.
#[derive(Default)]
pub struct RenderSession {
    generation: u64,
    processing: bool,
    committed: Option<RasterOutput>,
}

impl RenderSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a render. Any ticket handed out earlier becomes stale.
    pub fn begin(&mut self) -> RenderTicket {
        self.generation += 1;
        self.processing = true;
        RenderTicket { generation: self.generation }
    }

    pub fn is_current(&self, ticket: &RenderTicket) -> bool {
        ticket.generation == self.generation
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn committed(&self) -> Option<&RasterOutput> {
        self.committed.as_ref()
    }

    /// Settle a render. Returns `Ok(true)` if it was committed and `Ok(false)`
    /// if a newer request superseded it. Errors leave the committed output as
    /// it was.
    pub fn finish(&mut self, ticket: RenderTicket, result: Result<RasterOutput>) -> Result<bool> {
        if !self.is_current(&ticket) {
            log::warn!("dropping stale render (generation {} < {})", ticket.generation, self.generation);
            return Ok(false);
        }
        self.processing = false;
        let output = result?;
        self.committed = Some(output);
        Ok(true)
    }

    /// Load, render and commit in one go.
    pub fn render_path<R: Rng + ?Sized>(
        &mut self,
        pipeline: &mut RasterPipeline,
        path: impl AsRef<Path>,
        params: &RenderParams,
        rng: &mut R,
    ) -> Result<bool> {
        let ticket = self.begin();
        let result = pipeline.render_path(path, params, rng);
        if let Err(e) = &result {
            log::warn!("render failed: {e}");
        }
        self.finish(ticket, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ShapeKind;
    use crate::sampler;
    use image::Rgba;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn solid_image(w: u32, h: u32, rgb: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([rgb[0], rgb[1], rgb[2], 255]))
    }

    fn small_params() -> RenderParams {
        RenderParams {
            output_width: 100,
            output_height: 100,
            spacing: 10,
            dot_radius: 8.0,
            jitter: 2.0,
            opacity: 1.0,
            ..RenderParams::default()
        }
    }

    #[test]
    fn cover_fit_never_letterboxes() {
        let fit = CoverFit::compute(100, 50, 100, 100, 0.0, 0.0);
        assert_eq!(fit.scale, 2.0);
        assert_eq!((fit.scaled_width, fit.scaled_height), (200.0, 100.0));
    }

    #[test]
    fn cover_fit_clamps_crop() {
        let fit = CoverFit::compute(100, 50, 100, 100, 500.0, -20.0);
        assert_eq!(fit.crop_x, 100.0);
        assert_eq!(fit.crop_y, 0.0);
        let inside = CoverFit::compute(100, 50, 100, 100, 42.0, 0.0);
        assert_eq!(inside.crop_x, 42.0);
    }

    #[test]
    fn cover_crop_takes_the_requested_window() {
        // Left half black, right half white; cropping to the right shows white.
        let mut img = solid_image(20, 10, [0, 0, 0]);
        for y in 0..10 {
            for x in 10..20 {
                img.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let fit = CoverFit::compute(20, 10, 10, 10, 100.0, 0.0);
        let buf = cover_crop(&img, &fit, 10, 10);
        assert_eq!((buf.width(), buf.height()), (10, 10));
        assert_eq!(buf.rgb_at(5, 5), Rgb::WHITE);
    }

    #[test]
    fn cover_crop_of_a_sliver_only_resamples_the_window() {
        // 1000x10 strip, red then blue. Covering 400x400 scales it by 40, so
        // the full scaled image would be 40000 px wide; only 400 are kept.
        let mut img = solid_image(1000, 10, [255, 0, 0]);
        for y in 0..10 {
            for x in 500..1000 {
                img.put_pixel(x, y, Rgba([0, 0, 255, 255]));
            }
        }
        let left = CoverFit::compute(1000, 10, 400, 400, 0.0, 0.0);
        assert_eq!(left.scale, 40.0);
        let buf = cover_crop(&img, &left, 400, 400);
        assert_eq!((buf.width(), buf.height()), (400, 400));
        assert_eq!(buf.rgb_at(0, 0), Rgb::new(255, 0, 0));
        assert_eq!(buf.rgb_at(399, 399), Rgb::new(255, 0, 0));

        let right = CoverFit::compute(1000, 10, 400, 400, 1e9, 0.0);
        assert_eq!(right.crop_x, 39600.0);
        let buf = cover_crop(&img, &right, 400, 400);
        assert_eq!((buf.width(), buf.height()), (400, 400));
        assert_eq!(buf.rgb_at(200, 200), Rgb::new(0, 0, 255));
    }

    #[test]
    fn cover_crop_window_matches_a_full_resize() {
        // Integer scale with a blocky source: window-first and resize-first agree.
        let img = RgbaImage::from_fn(8, 4, |x, y| Rgba([(x * 30) as u8, (y * 60) as u8, 7, 255]));
        let fit = CoverFit::compute(8, 4, 8, 8, 4.0, 0.0);
        assert_eq!((fit.scale, fit.crop_x), (2.0, 4.0));
        let buf = cover_crop(&img, &fit, 8, 8);
        // Output (x, y) sits over source (x/2 + 2, y/2); sample block centers.
        for (ox, oy) in [(0u32, 0u32), (3, 2), (6, 7)] {
            let expected = img.get_pixel(ox / 2 + 2, oy / 2);
            let got = buf.rgb_at(ox as i64, oy as i64);
            let diff = |a: u8, b: u8| (a as i32 - b as i32).abs();
            assert!(diff(got.r, expected[0]) <= 30 && diff(got.g, expected[1]) <= 60, "{ox},{oy}: {got:?}");
        }
    }

    #[test]
    fn background_blend_formula() {
        let cells = [GridCell { center_x: 0, center_y: 0, color: Rgb::new(100, 0, 255) }];
        assert_eq!(background_color(&cells, BACKGROUND_WASH), Rgb::new(232, 217, 255));
    }

    #[test]
    fn render_samples_padded_surface() {
        let mut pipeline = RasterPipeline::new();
        let mut rng = StdRng::seed_from_u64(5);
        let img = solid_image(64, 48, [40, 80, 120]);
        let params = RenderParams { jitter: 0.0, ..small_params() };
        let out = pipeline.render(&img, &params, &mut rng).unwrap();

        // (100 + 10) / 10 = 11 cells per axis.
        assert_eq!(out.cells.len(), 121);
        assert!(out.cells.iter().all(|c| c.color == Rgb::new(40, 80, 120)));
        assert_eq!(out.background, Rgb::wash([40.0, 80.0, 120.0], BACKGROUND_WASH));
        assert_eq!((out.width(), out.height()), (100, 100));
        assert_eq!(out.surface.pixel(50, 50), [40, 80, 120, 255]);
    }

    #[test]
    fn shuffle_is_a_permutation_of_the_grid() {
        let mut pipeline = RasterPipeline::new();
        let mut rng = StdRng::seed_from_u64(11);
        let img = solid_image(30, 30, [200, 10, 10]);
        let params = small_params();
        let out = pipeline.render(&img, &params, &mut rng).unwrap();

        let grid = pipeline.sample_cells(&img, &params).unwrap();
        let mut expected: Vec<_> = grid.iter().map(|c| (c.center_x, c.center_y)).collect();
        let drawn: Vec<_> = out.cells.iter().map(|c| (c.center_x, c.center_y)).collect();
        assert_ne!(drawn, expected, "draw order should not be the scan order");

        let mut sorted = drawn.clone();
        sorted.sort_unstable();
        expected.sort_unstable();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn params_are_clamped_before_use() {
        let mut pipeline = RasterPipeline::new();
        let mut rng = StdRng::seed_from_u64(3);
        let img = solid_image(10, 10, [0, 0, 0]);
        let wild = RenderParams { spacing: 0, output_width: 1, output_height: 1, shape: ShapeKind::Mixed, ..small_params() };
        let out = pipeline.render(&img, &wild, &mut rng).unwrap();
        assert_eq!((out.width(), out.height()), (100, 100));
        assert_eq!(out.cells.len(), sampler::cell_count(101, 101, 1));
        assert!(out.cells.iter().all(|c| c.shape != ShapeKind::Mixed));
    }

    #[test]
    fn kernel_growth_failure_surfaces() {
        let mut pipeline = RasterPipeline::with_kernel(CellKernel::with_limit(1024));
        let mut rng = StdRng::seed_from_u64(3);
        let img = solid_image(10, 10, [0, 0, 0]);
        let err = pipeline.render(&img, &small_params(), &mut rng).unwrap_err();
        assert!(matches!(err, Error::MemoryGrowth { .. }));
    }

    #[test_log::test]
    fn session_ignores_stale_renders() {
        let mut pipeline = RasterPipeline::new();
        let mut rng = StdRng::seed_from_u64(8);
        let img = solid_image(20, 20, [1, 2, 3]);
        let mut session = RenderSession::new();

        let old = session.begin();
        let new = session.begin();
        let fresh = pipeline.render(&img, &small_params(), &mut rng);
        assert!(session.finish(new, fresh).unwrap());
        assert!(!session.is_processing());

        let stale = pipeline.render(&img, &RenderParams { dot_radius: 3.0, ..small_params() }, &mut rng);
        assert!(!session.finish(old, stale).unwrap());
        assert_eq!(session.committed().unwrap().params.dot_radius, 8.0);
    }

    #[test_log::test]
    fn failed_load_keeps_previous_output() {
        let mut pipeline = RasterPipeline::new();
        let mut rng = StdRng::seed_from_u64(8);
        let mut session = RenderSession::new();

        let t = session.begin();
        let ok = pipeline.render(&solid_image(20, 20, [9, 9, 9]), &small_params(), &mut rng);
        session.finish(t, ok).unwrap();

        let err = session.render_path(&mut pipeline, "/definitely/not/here.png", &small_params(), &mut rng);
        assert!(matches!(err, Err(Error::ImageLoad { .. })));
        assert!(!session.is_processing());
        assert_eq!(session.committed().unwrap().cells[0].color, Rgb::new(9, 9, 9));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode_image(b"not an image"), Err(Error::ImageLoad { .. })));
    }
}
