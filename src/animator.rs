// Ambient background: an endless reveal / hold / erase cycle over a set of
// pictures. Driven one frame at a time by the caller; nothing here sleeps or
// spawns.
//
// Dots live in "source space" (the centered window of the picture scaled to
// cover the canvas at load time) and are mapped onto the canvas through a
// centered cover transform, so a resize mid-cycle just re-maps and redraws.

use std::time::Duration;

use image::RgbaImage;
use rand::Rng;

use crate::error::{Error, Result};
use crate::kernel::CellKernel;
use crate::params::AnimatorConfig;
use crate::raster::{CoverFit, background_color, cover_crop};
use crate::shape::fill_disc;
use crate::source::{ImageSource, pick_next};
use crate::types::{Rgb, Surface};

/// Canvas wash toward white.
pub const CANVAS_WASH: f64 = 0.9;
/// Accent (UI chrome) wash, a shade darker than the canvas.
pub const ACCENT_WASH: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    RevealingIn,
    Holding,
    ErasingOut,
}

/// What one call to [`Animator::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Suspended; nothing changed.
    Parked,
    /// Cancelled; the animator will never draw again.
    Stopped,
    /// Ran one frame and is now in this phase.
    Advanced(Phase),
}

/// One dot in source space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dot {
    pub x: f32,
    pub y: f32,
    pub color: Rgb,
}

/// A picture turned into dots, ready to animate.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub dots: Vec<Dot>,
    pub source_width: u32,
    pub source_height: u32,
    pub background: Rgb,
    pub accent: Rgb,
}

/// Source-space to canvas mapping: uniform scale, centered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl CoverTransform {
    pub fn new(source: (u32, u32), canvas: (usize, usize)) -> Self {
        let (sw, sh) = (source.0.max(1) as f32, source.1.max(1) as f32);
        let (cw, ch) = (canvas.0 as f32, canvas.1 as f32);
        let scale = (cw / sw).max(ch / sh);
        Self {
            scale,
            offset_x: (cw - sw * scale) / 2.0,
            offset_y: (ch - sh * scale) / 2.0,
        }
    }

    #[inline]
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale + self.offset_x, y * self.scale + self.offset_y)
    }
}

/// Scale `image` to cover a `canvas_w` x `canvas_h` canvas, keep the centered
/// window, sample it on the grid, jitter every dot and order them by distance
/// from a random origin.
pub fn prepare<R: Rng + ?Sized>(
    kernel: &mut CellKernel,
    image: &RgbaImage,
    canvas_w: usize,
    canvas_h: usize,
    config: &AnimatorConfig,
    rng: &mut R,
) -> Result<Prepared> {
    let (iw, ih) = image.dimensions();
    if iw == 0 || ih == 0 {
        return Err(Error::image_load("<image>", "image has no pixels"));
    }
    let (sw, sh) = (canvas_w.max(1) as u32, canvas_h.max(1) as u32);
    let cover = CoverFit::compute(iw, ih, sw, sh, 0.0, 0.0);
    let centered = CoverFit::compute(
        iw,
        ih,
        sw,
        sh,
        ((cover.scaled_width - sw as f64) / 2.0) as f32,
        ((cover.scaled_height - sh as f64) / 2.0) as f32,
    );
    let visible = cover_crop(image, &centered, sw, sh);

    kernel.load_pixels(sw, sh, config.spacing, visible.as_bytes())?;
    kernel.compute_cells(sw, sh, config.spacing)?;
    let grid = kernel.cells()?;

    let jitter = config.jitter;
    let mut dots: Vec<Dot> = grid
        .iter()
        .map(|c| Dot {
            x: c.center_x as f32 + (rng.r#gen::<f32>() - 0.5) * 2.0 * jitter,
            y: c.center_y as f32 + (rng.r#gen::<f32>() - 0.5) * 2.0 * jitter,
            color: c.color,
        })
        .collect();

    let ox = rng.r#gen::<f32>() * sw as f32;
    let oy = rng.r#gen::<f32>() * sh as f32;
    let dist = |d: &Dot| (d.x - ox).powi(2) + (d.y - oy).powi(2);
    dots.sort_by(|a, b| dist(a).total_cmp(&dist(b)));

    Ok(Prepared {
        dots,
        source_width: sw,
        source_height: sh,
        background: background_color(&grid, CANVAS_WASH),
        accent: background_color(&grid, ACCENT_WASH),
    })
}

pub struct Animator<S: ImageSource> {
    config: AnimatorConfig,
    source: S,
    kernel: CellKernel,
    canvas: Surface,
    phase: Phase,
    current: Option<Prepared>,
    drawn: usize,
    held: Duration,
    last_index: Option<usize>,
    suspended: bool,
    cancelled: bool,
    cycles: u64,
}

impl<S: ImageSource> Animator<S> {
    /// Fails with `ImageLoad` when the source has no pictures at all.
    pub fn new(source: S, config: AnimatorConfig, width: usize, height: usize) -> Result<Self> {
        if source.is_empty() {
            return Err(Error::image_load("<source>", "no pictures to show"));
        }
        Ok(Self {
            config: config.clamped(),
            source,
            kernel: CellKernel::new(),
            canvas: Surface::filled(width.max(1), height.max(1), Rgb::WHITE),
            phase: Phase::Loading,
            current: None,
            drawn: 0,
            held: Duration::ZERO,
            last_index: None,
            suspended: false,
            cancelled: false,
            cycles: 0,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn canvas(&self) -> &Surface {
        &self.canvas
    }

    pub fn drawn(&self) -> usize {
        self.drawn
    }

    pub fn total(&self) -> usize {
        self.current.as_ref().map_or(0, |p| p.dots.len())
    }

    pub fn background(&self) -> Rgb {
        self.current.as_ref().map_or(Rgb::WHITE, |p| p.background)
    }

    pub fn accent(&self) -> Rgb {
        self.current.as_ref().map_or(Rgb::WHITE, |p| p.accent)
    }

    /// Index of the picture on screen (or last attempted).
    pub fn current_index(&self) -> Option<usize> {
        self.last_index
    }

    /// Completed reveal/hold/erase cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn toggle_suspended(&mut self) {
        self.suspended = !self.suspended;
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Run one frame. `dt` is the wall time since the previous frame and
    /// only matters while holding.
    pub fn step<R: Rng + ?Sized>(&mut self, dt: Duration, rng: &mut R) -> Result<Step> {
        if self.cancelled {
            return Ok(Step::Stopped);
        }
        if self.suspended {
            return Ok(Step::Parked);
        }
        match self.phase {
            Phase::Loading => self.load_next(rng)?,
            Phase::RevealingIn => self.reveal(),
            Phase::Holding => {
                self.held += dt;
                if self.held >= self.config.hold {
                    self.phase = Phase::ErasingOut;
                }
            }
            Phase::ErasingOut => self.erase(),
        }
        Ok(Step::Advanced(self.phase))
    }

    fn load_next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        let Some(index) = pick_next(self.source.len(), self.last_index, rng) else {
            return Err(Error::image_load("<source>", "no pictures to show"));
        };
        self.last_index = Some(index);

        let (w, h) = (self.canvas.width(), self.canvas.height());
        let prepared = self
            .source
            .load(index)
            .and_then(|img| prepare(&mut self.kernel, &img, w, h, &self.config, rng));
        match prepared {
            Ok(p) => {
                log::info!("showing {} ({} dots)", self.source.name(index), p.dots.len());
                self.canvas.fill(p.background);
                self.current = Some(p);
                self.drawn = 0;
                self.held = Duration::ZERO;
                self.phase = Phase::RevealingIn;
            }
            // Stay in Loading; the next frame picks a different picture.
            Err(e) => log::warn!("skipping {}: {e}", self.source.name(index)),
        }
        Ok(())
    }

    fn reveal(&mut self) {
        let Some(p) = &self.current else {
            self.phase = Phase::Loading;
            return;
        };
        let t = CoverTransform::new((p.source_width, p.source_height), (self.canvas.width(), self.canvas.height()));
        let end = (self.drawn + self.config.dots_per_frame).min(p.dots.len());
        for dot in &p.dots[self.drawn..end] {
            let (x, y) = t.apply(dot.x, dot.y);
            fill_disc(&mut self.canvas, x, y, self.config.dot_radius, dot.color, self.config.opacity);
        }
        self.drawn = end;
        if self.drawn == p.dots.len() {
            self.held = Duration::ZERO;
            self.phase = Phase::Holding;
        }
    }

    fn erase(&mut self) {
        self.drawn -= self.config.erase_per_frame.min(self.drawn);
        self.redraw();
        if self.drawn == 0 {
            self.cycles += 1;
            log::debug!("cycle {} finished", self.cycles);
            self.phase = Phase::Loading;
        }
    }

    /// Background plus the first `drawn` dots, from scratch.
    fn redraw(&mut self) {
        let Some(p) = &self.current else {
            return;
        };
        self.canvas.fill(p.background);
        let t = CoverTransform::new((p.source_width, p.source_height), (self.canvas.width(), self.canvas.height()));
        for dot in &p.dots[..self.drawn] {
            let (x, y) = t.apply(dot.x, dot.y);
            fill_disc(&mut self.canvas, x, y, self.config.dot_radius, dot.color, self.config.opacity);
        }
    }

    /// New canvas size. The drawn dots are re-mapped, not re-sampled.
    pub fn resize(&mut self, width: usize, height: usize) {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.canvas.width(), self.canvas.height()) {
            return;
        }
        self.canvas = Surface::filled(width, height, self.background());
        self.redraw();
    }
}
