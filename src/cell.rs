// Rendering-ready cells: a sampled color plus per-instance styling.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::params::{BrushParams, RenderParams};
use crate::sampler::GridCell;
use crate::shape::SILHOUETTE_COUNT;
use crate::types::Rgb;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ShapeKind {
    #[default]
    Circle,
    Square,
    Triangle,
    Line,
    Brushstroke,
    /// Selection policy only: each cell draws from [`ShapeKind::MIXED_POOL`].
    Mixed,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 6] = [
        ShapeKind::Circle,
        ShapeKind::Square,
        ShapeKind::Triangle,
        ShapeKind::Line,
        ShapeKind::Brushstroke,
        ShapeKind::Mixed,
    ];

    pub const MIXED_POOL: [ShapeKind; 4] = [
        ShapeKind::Circle,
        ShapeKind::Square,
        ShapeKind::Triangle,
        ShapeKind::Brushstroke,
    ];

    /// The concrete shape for one cell. Never returns `Mixed`.
    pub fn pick<R: Rng + ?Sized>(self, rng: &mut R) -> ShapeKind {
        match self {
            ShapeKind::Mixed => Self::MIXED_POOL[rng.gen_range(0..Self::MIXED_POOL.len())],
            other => other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShapeKind::Circle => "circle",
            ShapeKind::Square => "square",
            ShapeKind::Triangle => "triangle",
            ShapeKind::Line => "line",
            ShapeKind::Brushstroke => "brushstroke",
            ShapeKind::Mixed => "mixed",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShapeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown shape `{s}` (expected one of circle, square, triangle, line, brushstroke, mixed)"))
    }
}

/// A grid cell with its rendering attributes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StyledCell {
    pub center_x: i32,
    pub center_y: i32,
    pub color: Rgb,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub shape: ShapeKind,
    pub brush_index: usize,
    pub dot_radius: f32,
    pub opacity: f32,
    pub stroke_length: f32,
}

impl StyledCell {
    /// Scale position by (sx, sy) and the radius by the geometric mean,
    /// rounded and kept at least 1.
    pub fn rescale(&mut self, sx: f32, sy: f32) {
        self.x *= sx;
        self.y *= sy;
        self.dot_radius = (self.dot_radius * (sx * sy).sqrt()).round().max(1.0);
    }
}

/// The styling knobs shared by the raster and brush pipelines.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellStyle {
    pub dot_radius: f32,
    pub opacity: f32,
    pub jitter: f32,
    pub rotation_jitter: f32, // radians
    pub shape: ShapeKind,
    pub stroke_length: f32,
}

impl From<&RenderParams> for CellStyle {
    fn from(p: &RenderParams) -> Self {
        Self {
            dot_radius: p.dot_radius,
            opacity: p.opacity,
            jitter: p.jitter,
            rotation_jitter: p.rotation_jitter_radians(),
            shape: p.shape,
            stroke_length: p.stroke_length,
        }
    }
}

impl From<&BrushParams> for CellStyle {
    fn from(p: &BrushParams) -> Self {
        Self {
            dot_radius: p.dot_radius,
            opacity: p.opacity,
            jitter: p.jitter,
            rotation_jitter: p.rotation_jitter_radians(),
            shape: p.shape,
            stroke_length: p.stroke_length,
        }
    }
}

/// Uniform in `[-amount, +amount]`.
#[inline]
fn symmetric<R: Rng + ?Sized>(rng: &mut R, amount: f32) -> f32 {
    (rng.r#gen::<f32>() - 0.5) * 2.0 * amount
}

impl CellStyle {
    /// Style one cell anchored at (`ax`, `ay`). Draw order from `rng`:
    /// jitter x, jitter y, rotation, shape (only for `Mixed`), silhouette.
    pub fn style<R: Rng + ?Sized>(&self, ax: f32, ay: f32, center: (i32, i32), color: Rgb, rng: &mut R) -> StyledCell {
        let x = ax + symmetric(rng, self.jitter);
        let y = ay + symmetric(rng, self.jitter);
        let rotation = symmetric(rng, self.rotation_jitter);
        let shape = self.shape.pick(rng);
        let brush_index = rng.gen_range(0..SILHOUETTE_COUNT);
        StyledCell {
            center_x: center.0,
            center_y: center.1,
            color,
            x,
            y,
            rotation,
            shape,
            brush_index,
            dot_radius: self.dot_radius,
            opacity: self.opacity,
            stroke_length: self.stroke_length,
        }
    }

    pub fn style_grid<R: Rng + ?Sized>(&self, cell: &GridCell, rng: &mut R) -> StyledCell {
        self.style(
            cell.center_x as f32,
            cell.center_y as f32,
            (cell.center_x, cell.center_y),
            cell.color,
            rng,
        )
    }
}

/// Style every cell independently, preserving order.
pub fn stylize<R: Rng + ?Sized>(cells: &[GridCell], style: &CellStyle, rng: &mut R) -> Vec<StyledCell> {
    cells.iter().map(|c| style.style_grid(c, rng)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn grid(n: i32) -> Vec<GridCell> {
        (0..n)
            .map(|i| GridCell { center_x: i * 10, center_y: i * 3, color: Rgb::new(i as u8, 0, 0) })
            .collect()
    }

    fn style(shape: ShapeKind, jitter: f32, rot_deg: f32) -> CellStyle {
        CellStyle {
            dot_radius: 5.0,
            opacity: 0.5,
            jitter,
            rotation_jitter: rot_deg.to_radians(),
            shape,
            stroke_length: 2.0,
        }
    }

    #[test]
    fn jitter_and_rotation_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let cells = grid(500);
        let out = stylize(&cells, &style(ShapeKind::Square, 4.0, 30.0), &mut rng);
        assert_eq!(out.len(), cells.len());
        for (g, s) in cells.iter().zip(&out) {
            assert!((s.x - g.center_x as f32).abs() <= 4.0);
            assert!((s.y - g.center_y as f32).abs() <= 4.0);
            assert!(s.rotation.abs() <= 30f32.to_radians() + 1e-6);
            assert_eq!(s.color, g.color);
            assert_eq!(s.shape, ShapeKind::Square);
            assert!(s.brush_index < SILHOUETTE_COUNT);
        }
    }

    #[test]
    fn zero_jitter_keeps_grid_centers() {
        let mut rng = StdRng::seed_from_u64(2);
        let out = stylize(&grid(20), &style(ShapeKind::Circle, 0.0, 0.0), &mut rng);
        for s in &out {
            assert_eq!(s.x, s.center_x as f32);
            assert_eq!(s.y, s.center_y as f32);
            assert_eq!(s.rotation, 0.0);
        }
    }

    #[test]
    fn mixed_never_leaks_into_cells() {
        let mut rng = StdRng::seed_from_u64(3);
        let out = stylize(&grid(400), &style(ShapeKind::Mixed, 1.0, 0.0), &mut rng);
        assert!(out.iter().all(|c| ShapeKind::MIXED_POOL.contains(&c.shape)));
        for kind in ShapeKind::MIXED_POOL {
            assert!(out.iter().any(|c| c.shape == kind), "{kind} never picked");
        }
    }

    #[test]
    fn same_seed_same_styling() {
        let cells = grid(50);
        let s = style(ShapeKind::Mixed, 6.0, 45.0);
        let a = stylize(&cells, &s, &mut StdRng::seed_from_u64(99));
        let b = stylize(&cells, &s, &mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn shape_names_round_trip_through_from_str() {
        for k in ShapeKind::ALL {
            assert_eq!(k.to_string().parse::<ShapeKind>().unwrap(), k);
        }
        assert!("hexagon".parse::<ShapeKind>().is_err());
    }

    #[test]
    fn rescale_uses_geometric_mean_for_radius() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut c = style(ShapeKind::Circle, 0.0, 0.0).style(10.0, 20.0, (10, 20), Rgb::WHITE, &mut rng);
        c.dot_radius = 10.0;
        c.rescale(2.0, 0.5);
        assert_eq!((c.x, c.y, c.dot_radius), (20.0, 10.0, 10.0));
        c.dot_radius = 1.0;
        c.rescale(0.1, 0.1);
        assert_eq!(c.dot_radius, 1.0);
    }
}
