// The tuning surface: one immutable snapshot per render.
//
// The core clamps at the boundary: `clamped()` is applied by every pipeline
// entry point, and `validate()` is there for callers that would rather reject.

use std::time::Duration;

use rand::Rng;

use crate::cell::ShapeKind;
use crate::error::{Error, Result};

pub const DOT_RADIUS_RANGE: (f32, f32) = (1.0, 100.0);
pub const SPACING_RANGE: (u32, u32) = (1, 100);
pub const JITTER_RANGE: (f32, f32) = (0.0, 20.0);
pub const OPACITY_RANGE: (f32, f32) = (0.1, 1.0);
pub const ROTATION_JITTER_RANGE: (f32, f32) = (0.0, 180.0);
pub const STROKE_LENGTH_RANGE: (f32, f32) = (1.0, 5.0);
pub const OUTPUT_SIZE_RANGE: (u32, u32) = (100, 4000);
pub const BRUSH_RADIUS_RANGE: (f32, f32) = (10.0, 200.0);
pub const ERASER_RADIUS_RANGE: (f32, f32) = (5.0, 200.0);

/// Render Parameters. Any change means a full re-render; nothing is patched
/// incrementally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    pub dot_radius: f32,
    pub spacing: u32,
    pub jitter: f32,
    pub opacity: f32,
    pub output_width: u32,
    pub output_height: u32,
    pub crop_x: f32,
    pub crop_y: f32,
    pub shape: ShapeKind,
    pub stroke_length: f32,
    pub rotation_jitter_degrees: f32,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            dot_radius: 16.0,
            spacing: 15,
            jitter: 6.0,
            opacity: 0.7,
            output_width: 800,
            output_height: 600,
            crop_x: 0.0,
            crop_y: 0.0,
            shape: ShapeKind::Circle,
            stroke_length: 2.0,
            rotation_jitter_degrees: 0.0,
        }
    }
}

impl RenderParams {
    /// Every field forced into its documented range. Crop offsets only lose
    /// their negative part here; the upper bound depends on the image and is
    /// applied by the cover fit.
    pub fn clamped(&self) -> Self {
        Self {
            dot_radius: clamp_f(self.dot_radius, DOT_RADIUS_RANGE),
            spacing: self.spacing.clamp(SPACING_RANGE.0, SPACING_RANGE.1),
            jitter: clamp_f(self.jitter, JITTER_RANGE),
            opacity: clamp_f(self.opacity, OPACITY_RANGE),
            output_width: self.output_width.clamp(OUTPUT_SIZE_RANGE.0, OUTPUT_SIZE_RANGE.1),
            output_height: self.output_height.clamp(OUTPUT_SIZE_RANGE.0, OUTPUT_SIZE_RANGE.1),
            crop_x: non_negative(self.crop_x),
            crop_y: non_negative(self.crop_y),
            shape: self.shape,
            stroke_length: clamp_f(self.stroke_length, STROKE_LENGTH_RANGE),
            rotation_jitter_degrees: clamp_f(self.rotation_jitter_degrees, ROTATION_JITTER_RANGE),
        }
    }

    /// Reject the first field outside its range.
    pub fn validate(&self) -> Result<()> {
        check_f("dot_radius", self.dot_radius, DOT_RADIUS_RANGE)?;
        check_u("spacing", self.spacing, SPACING_RANGE)?;
        check_f("jitter", self.jitter, JITTER_RANGE)?;
        check_f("opacity", self.opacity, OPACITY_RANGE)?;
        check_u("output_width", self.output_width, OUTPUT_SIZE_RANGE)?;
        check_u("output_height", self.output_height, OUTPUT_SIZE_RANGE)?;
        check_f("crop_x", self.crop_x, (0.0, f32::MAX))?;
        check_f("crop_y", self.crop_y, (0.0, f32::MAX))?;
        check_f("stroke_length", self.stroke_length, STROKE_LENGTH_RANGE)?;
        check_f("rotation_jitter_degrees", self.rotation_jitter_degrees, ROTATION_JITTER_RANGE)?;
        Ok(())
    }

    pub fn rotation_jitter_radians(&self) -> f32 {
        self.rotation_jitter_degrees.to_radians()
    }

    /// Retarget to a new output size. Dot radius, spacing and jitter scale by
    /// the square root of the area ratio so density looks the same; crop resets.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        let width = width.clamp(OUTPUT_SIZE_RANGE.0, OUTPUT_SIZE_RANGE.1);
        let height = height.clamp(OUTPUT_SIZE_RANGE.0, OUTPUT_SIZE_RANGE.1);
        let old_area = self.output_width.max(1) as f64 * self.output_height.max(1) as f64;
        let factor = ((width as f64 * height as f64) / old_area).sqrt() as f32;

        let spacing = (self.spacing as f32 * factor)
            .clamp(SPACING_RANGE.0 as f32, SPACING_RANGE.1 as f32)
            .round() as u32;

        Self {
            dot_radius: clamp_f(self.dot_radius * factor, DOT_RADIUS_RANGE).round(),
            spacing,
            jitter: clamp_f(self.jitter * factor, JITTER_RANGE).round(),
            output_width: width,
            output_height: height,
            crop_x: 0.0,
            crop_y: 0.0,
            ..*self
        }
    }

    /// Draw every tunable uniformly inside its range; output size and crop stay.
    pub fn randomized<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let opacity = grid_pick(rng, OPACITY_RANGE, 0.05);
        Self {
            shape: ShapeKind::ALL[rng.gen_range(0..ShapeKind::ALL.len())],
            dot_radius: rng.gen_range(1..=100) as f32,
            spacing: rng.gen_range(SPACING_RANGE.0..=SPACING_RANGE.1),
            jitter: rng.gen_range(0..=20) as f32,
            opacity: (opacity * 1000.0).round() / 1000.0,
            rotation_jitter_degrees: rng.gen_range(0..=180) as f32,
            stroke_length: grid_pick(rng, STROKE_LENGTH_RANGE, 0.5),
            ..*self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrushTool {
    #[default]
    Paint,
    Erase,
}

/// Live settings of the spray brush. Read once per tick, never cached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushParams {
    pub brush_radius: f32,
    pub eraser_radius: f32,
    pub tool: BrushTool,
    pub dot_radius: f32,
    pub opacity: f32,
    pub jitter: f32,
    pub rotation_jitter_degrees: f32,
    pub shape: ShapeKind,
    pub stroke_length: f32,
}

impl Default for BrushParams {
    fn default() -> Self {
        let r = RenderParams::default();
        Self {
            brush_radius: 50.0,
            eraser_radius: 30.0,
            tool: BrushTool::Paint,
            dot_radius: r.dot_radius,
            opacity: r.opacity,
            jitter: r.jitter,
            rotation_jitter_degrees: r.rotation_jitter_degrees,
            shape: r.shape,
            stroke_length: r.stroke_length,
        }
    }
}

impl BrushParams {
    /// Shape styling taken from a render snapshot.
    pub fn from_render(params: &RenderParams) -> Self {
        Self {
            dot_radius: params.dot_radius,
            opacity: params.opacity,
            jitter: params.jitter,
            rotation_jitter_degrees: params.rotation_jitter_degrees,
            shape: params.shape,
            stroke_length: params.stroke_length,
            ..Self::default()
        }
    }

    pub fn clamped(&self) -> Self {
        Self {
            brush_radius: clamp_f(self.brush_radius, BRUSH_RADIUS_RANGE),
            eraser_radius: clamp_f(self.eraser_radius, ERASER_RADIUS_RANGE),
            tool: self.tool,
            dot_radius: clamp_f(self.dot_radius, DOT_RADIUS_RANGE),
            opacity: clamp_f(self.opacity, OPACITY_RANGE),
            jitter: clamp_f(self.jitter, JITTER_RANGE),
            rotation_jitter_degrees: clamp_f(self.rotation_jitter_degrees, ROTATION_JITTER_RANGE),
            shape: self.shape,
            stroke_length: clamp_f(self.stroke_length, STROKE_LENGTH_RANGE),
        }
    }

    pub fn rotation_jitter_radians(&self) -> f32 {
        self.rotation_jitter_degrees.to_radians()
    }
}

/// Timing and look of the ambient background cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimatorConfig {
    pub dot_radius: f32,
    pub spacing: u32,
    pub jitter: f32,
    pub opacity: f32,
    pub dots_per_frame: usize,
    pub hold: Duration,
    pub erase_per_frame: usize,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            dot_radius: 18.0,
            spacing: 18, // tighter than 2x radius, so dots overlap
            jitter: 8.0,
            opacity: 0.7,
            dots_per_frame: 10,
            hold: Duration::from_millis(3000),
            erase_per_frame: 60,
        }
    }
}

impl AnimatorConfig {
    pub fn clamped(&self) -> Self {
        Self {
            dot_radius: clamp_f(self.dot_radius, DOT_RADIUS_RANGE),
            spacing: self.spacing.clamp(SPACING_RANGE.0, SPACING_RANGE.1),
            jitter: clamp_f(self.jitter, JITTER_RANGE),
            opacity: clamp_f(self.opacity, OPACITY_RANGE),
            dots_per_frame: self.dots_per_frame.max(1),
            hold: self.hold,
            erase_per_frame: self.erase_per_frame.max(1),
        }
    }
}

fn clamp_f(v: f32, (min, max): (f32, f32)) -> f32 {
    if v.is_nan() { min } else { v.clamp(min, max) }
}

fn non_negative(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.max(0.0) }
}

fn check_f(name: &'static str, v: f32, (min, max): (f32, f32)) -> Result<()> {
    if v.is_nan() || v < min || v > max {
        return Err(Error::InvalidParameter { name, value: v as f64, min: min as f64, max: max as f64 });
    }
    Ok(())
}

fn check_u(name: &'static str, v: u32, (min, max): (u32, u32)) -> Result<()> {
    if v < min || v > max {
        return Err(Error::InvalidParameter { name, value: v as f64, min: min as f64, max: max as f64 });
    }
    Ok(())
}

/// Uniform pick from `min, min+step, ..., max`.
fn grid_pick<R: Rng + ?Sized>(rng: &mut R, (min, max): (f32, f32), step: f32) -> f32 {
    let steps = ((max - min) / step).round() as u32;
    min + rng.gen_range(0..=steps) as f32 * step
}
