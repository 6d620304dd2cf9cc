// Interactive spray brush.
// While the pointer is down, every tick either sprays a handful of shapes
// around it (colors picked from the source image underneath) or erases a disc.
// Painted shapes are kept as styled cells so the vector export always matches
// what is on screen.

use std::f32::consts::TAU;

use image::RgbaImage;
use rand::Rng;

use crate::cell::{CellStyle, StyledCell};
use crate::error::{Error, Result};
use crate::params::{BrushParams, BrushTool, OUTPUT_SIZE_RANGE};
use crate::raster::{BACKGROUND_WASH, CoverFit, cover_crop};
use crate::sampler;
use crate::shape::{ShapeRenderer, disc_area};
use crate::types::{PixelBuffer, Rgb, Surface};

/// Alpha of the faint source copy drawn under the paint.
pub const GUIDE_ALPHA: f32 = 0.2;
/// Background estimate reads every n-th pixel.
pub const BACKGROUND_SAMPLE_STEP: usize = 8;
/// Brush disc area (px^2) per shape sprayed in one tick.
pub const AREA_PER_SHAPE: f32 = 3000.0;

/// Shapes sprayed per tick: proportional to the brush area, at least one.
pub fn shapes_per_tick(brush_radius: f32) -> usize {
    ((disc_area(brush_radius) / AREA_PER_SHAPE).ceil() as usize).max(1)
}

/// Uniform point inside a disc. The square root keeps density even across
/// the area instead of piling up at the center.
pub fn sample_disc<R: Rng + ?Sized>(rng: &mut R, cx: f32, cy: f32, radius: f32) -> (f32, f32) {
    let angle = rng.r#gen::<f32>() * TAU;
    let r = radius * rng.r#gen::<f32>().sqrt();
    (cx + r * angle.cos(), cy + r * angle.sin())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Pointer is up; nothing happened.
    Idle,
    Painted(usize),
    Erased(usize),
}

pub struct BrushPipeline {
    width: u32,
    height: u32,
    source: PixelBuffer,
    guide: Surface,
    paint: Surface,
    background: Rgb,
    cells: Vec<StyledCell>,
    show_guide: bool,
    pointer: Option<(f32, f32)>,
    shapes: ShapeRenderer,
}

impl BrushPipeline {
    /// Set up canvases for `image` cover-fit to `width` x `height`.
    pub fn new(image: &RgbaImage, width: u32, height: u32, crop_x: f32, crop_y: f32) -> Result<Self> {
        let (width, height) = clamp_size(width, height);
        let (source, background) = prepare_source(image, width, height, crop_x, crop_y)?;
        Ok(Self {
            width,
            height,
            guide: Surface::from_pixel_buffer(&source),
            source,
            paint: Surface::transparent(width as usize, height as usize),
            background,
            cells: Vec::new(),
            show_guide: true,
            pointer: None,
            shapes: ShapeRenderer::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn background(&self) -> Rgb {
        self.background
    }

    pub fn cells(&self) -> &[StyledCell] {
        &self.cells
    }

    pub fn paint_layer(&self) -> &Surface {
        &self.paint
    }

    pub fn show_guide(&self) -> bool {
        self.show_guide
    }

    pub fn set_show_guide(&mut self, show: bool) {
        self.show_guide = show;
    }

    pub fn press(&mut self, x: f32, y: f32) {
        self.pointer = Some((x, y));
    }

    /// Track the pointer; ignored while it is up.
    pub fn move_to(&mut self, x: f32, y: f32) {
        if self.pointer.is_some() {
            self.pointer = Some((x, y));
        }
    }

    pub fn release(&mut self) {
        self.pointer = None;
    }

    pub fn is_pressed(&self) -> bool {
        self.pointer.is_some()
    }

    /// One animation tick. Settings are read from `params` every call.
    pub fn tick<R: Rng + ?Sized>(&mut self, params: &BrushParams, rng: &mut R) -> TickOutcome {
        let Some((x, y)) = self.pointer else {
            return TickOutcome::Idle;
        };
        let p = params.clamped();
        match p.tool {
            BrushTool::Paint => TickOutcome::Painted(self.paint_at(x, y, &p, rng)),
            BrushTool::Erase => TickOutcome::Erased(self.erase_at(x, y, p.eraser_radius)),
        }
    }

    /// Spray around (x, y). Returns the number of shapes added.
    pub fn paint_at<R: Rng + ?Sized>(&mut self, x: f32, y: f32, params: &BrushParams, rng: &mut R) -> usize {
        let style = CellStyle::from(params);
        let count = shapes_per_tick(params.brush_radius);
        for _ in 0..count {
            let (px, py) = sample_disc(rng, x, y, params.brush_radius);
            let cx = px.round() as i32;
            let cy = py.round() as i32;
            let color = self.source.rgb_at(cx as i64, cy as i64);
            let cell = style.style(
                px,
                py,
                (cx.clamp(0, self.width as i32 - 1), cy.clamp(0, self.height as i32 - 1)),
                color,
                rng,
            );
            self.shapes.draw_cell(&mut self.paint, &cell);
            self.cells.push(cell);
        }
        count
    }

    /// Clear the paint inside `radius` and drop every cell whose position is
    /// within it (squared distance `<= radius^2`). Returns cells removed.
    pub fn erase_at(&mut self, x: f32, y: f32, radius: f32) -> usize {
        self.paint.clear_disc(x, y, radius);
        let r2 = radius * radius;
        let before = self.cells.len();
        self.cells.retain(|c| {
            let (dx, dy) = (c.x - x, c.y - y);
            dx * dx + dy * dy > r2
        });
        before - self.cells.len()
    }

    pub fn clear(&mut self) {
        self.paint.clear();
        self.cells.clear();
    }

    /// What the user sees: background, optional guide, paint.
    pub fn composite(&self) -> Surface {
        let mut out = Surface::filled(self.width as usize, self.height as usize, self.background);
        if self.show_guide {
            out.draw_surface(&self.guide, GUIDE_ALPHA);
        }
        out.draw_surface(&self.paint, 1.0);
        out
    }

    /// Background and paint only, for raster export.
    pub fn flatten(&self) -> Surface {
        let mut out = Surface::filled(self.width as usize, self.height as usize, self.background);
        out.draw_surface(&self.paint, 1.0);
        out
    }

    /// Move to a new canvas size. Cells are rescaled proportionally and
    /// repainted on a fresh layer; nothing is re-derived from the source
    /// except the guide and background.
    pub fn resize(&mut self, image: &RgbaImage, width: u32, height: u32, crop_x: f32, crop_y: f32) -> Result<()> {
        let (width, height) = clamp_size(width, height);
        let (source, background) = prepare_source(image, width, height, crop_x, crop_y)?;
        let sx = width as f32 / self.width as f32;
        let sy = height as f32 / self.height as f32;

        self.width = width;
        self.height = height;
        self.guide = Surface::from_pixel_buffer(&source);
        self.source = source;
        self.background = background;
        self.paint = Surface::transparent(width as usize, height as usize);
        for cell in &mut self.cells {
            cell.rescale(sx, sy);
            self.shapes.draw_cell(&mut self.paint, cell);
        }
        log::info!("brush canvas resized to {width}x{height}, {} cells repainted", self.cells.len());
        Ok(())
    }
}

fn clamp_size(width: u32, height: u32) -> (u32, u32) {
    (
        width.clamp(OUTPUT_SIZE_RANGE.0, OUTPUT_SIZE_RANGE.1),
        height.clamp(OUTPUT_SIZE_RANGE.0, OUTPUT_SIZE_RANGE.1),
    )
}

/// Source at output resolution plus the washed background estimated from it.
fn prepare_source(image: &RgbaImage, width: u32, height: u32, crop_x: f32, crop_y: f32) -> Result<(PixelBuffer, Rgb)> {
    let (iw, ih) = image.dimensions();
    if iw == 0 || ih == 0 {
        return Err(Error::image_load("<image>", "image has no pixels"));
    }
    let fit = CoverFit::compute(iw, ih, width, height, crop_x, crop_y);
    let source = cover_crop(image, &fit, width, height);
    let avg = sampler::coarse_average(source.as_bytes(), BACKGROUND_SAMPLE_STEP);
    Ok((source, Rgb::wash(avg, BACKGROUND_WASH)))
}
