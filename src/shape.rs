// Software shape renderer.
// Every shape is filled once at the cell's opacity, with no outline. A shape
// is placed by a local frame (translate, rotate, optional scale) that lives
// only for the duration of one draw call.

use std::cell::OnceCell;
use std::f32::consts::PI;

use crate::cell::{ShapeKind, StyledCell};
use crate::types::{Rgb, Surface};

/// Pre-authored brushstroke silhouettes in normalized units (SVG path data).
pub const BRUSHSTROKE_PATHS: [&str; 3] = [
    "M-0.417,-0.042 Q0,-0.083 0.375,-0.042 L0.333,0.083 Q-0.042,0.125 -0.458,0.083 Z",
    "M-0.458,-0.067 Q0,-0.125 0.417,-0.067 L0.4,0 Q-0.017,-0.058 -0.475,0 Z",
    "M-0.375,0.042 Q0.042,0.1 0.333,0.042 L0.317,0.125 Q0.025,0.183 -0.392,0.125 Z",
];
pub const SILHOUETTE_COUNT: usize = BRUSHSTROKE_PATHS.len();

/// Silhouettes are scaled by `(BRUSH_SCALE_X * size, BRUSH_SCALE_Y * size)`.
pub const BRUSH_SCALE_X: f32 = 4.0;
pub const BRUSH_SCALE_Y: f32 = 10.0;

/// Half-height of a `line` bar relative to its size.
pub const LINE_HALF_HEIGHT: f32 = 0.3;

const QUAD_SEGMENTS: usize = 8;

/// Translate + rotate + scale, applied to local points in that order:
/// scale first, then rotate, then translate.
#[derive(Clone, Copy, Debug)]
pub struct Frame {
    pub x: f32,
    pub y: f32,
    cos: f32,
    sin: f32,
    sx: f32,
    sy: f32,
}

impl Frame {
    pub fn new(x: f32, y: f32, rotation: f32) -> Self {
        Self { x, y, cos: rotation.cos(), sin: rotation.sin(), sx: 1.0, sy: 1.0 }
    }

    pub fn scaled(self, sx: f32, sy: f32) -> Self {
        Self { sx, sy, ..self }
    }

    #[inline]
    pub fn apply(&self, (px, py): (f32, f32)) -> (f32, f32) {
        let (px, py) = (px * self.sx, py * self.sy);
        (
            self.x + px * self.cos - py * self.sin,
            self.y + px * self.sin + py * self.cos,
        )
    }
}

/// Local-space outline of the polygonal shapes, centered on the origin.
/// `None` for circles, brushstrokes and `Mixed`.
pub fn local_outline(shape: ShapeKind, size: f32, stroke_length: f32) -> Option<Vec<(f32, f32)>> {
    match shape {
        ShapeKind::Square => Some(vec![(-size, -size), (size, -size), (size, size), (-size, size)]),
        ShapeKind::Triangle => {
            let half_base = size * 3f32.sqrt() / 2.0;
            Some(vec![(0.0, -size), (-half_base, size), (half_base, size)])
        }
        ShapeKind::Line => {
            let hw = size * stroke_length;
            let hh = size * LINE_HALF_HEIGHT;
            Some(vec![(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)])
        }
        _ => None,
    }
}

/// Flatten the small SVG path subset used by the silhouettes
/// (absolute `M`, `L`, `Q`, `Z`) into a closed polygon.
pub fn flatten_path(d: &str) -> Vec<(f32, f32)> {
    let mut points = Vec::new();
    let mut cursor = (0.0f32, 0.0f32);
    let mut start = cursor;

    for (cmd, args) in path_commands(d) {
        match cmd {
            'M' if args.len() >= 2 => {
                cursor = (args[0], args[1]);
                start = cursor;
                points.push(cursor);
            }
            'L' => {
                for p in args.chunks_exact(2) {
                    cursor = (p[0], p[1]);
                    points.push(cursor);
                }
            }
            'Q' => {
                for q in args.chunks_exact(4) {
                    let (c, end) = ((q[0], q[1]), (q[2], q[3]));
                    for i in 1..=QUAD_SEGMENTS {
                        let t = i as f32 / QUAD_SEGMENTS as f32;
                        let u = 1.0 - t;
                        points.push((
                            u * u * cursor.0 + 2.0 * u * t * c.0 + t * t * end.0,
                            u * u * cursor.1 + 2.0 * u * t * c.1 + t * t * end.1,
                        ));
                    }
                    cursor = end;
                }
            }
            'Z' | 'z' => cursor = start,
            _ => {}
        }
    }
    points
}

/// Split path data into `(command, numbers)` pairs.
fn path_commands(d: &str) -> Vec<(char, Vec<f32>)> {
    let mut out: Vec<(char, Vec<f32>)> = Vec::new();
    let mut num = String::new();

    let flush = |num: &mut String, out: &mut Vec<(char, Vec<f32>)>| {
        if !num.is_empty() {
            if let (Ok(v), Some(last)) = (num.parse::<f32>(), out.last_mut()) {
                last.1.push(v);
            }
            num.clear();
        }
    };

    for ch in d.chars() {
        match ch {
            c if c.is_ascii_alphabetic() => {
                flush(&mut num, &mut out);
                out.push((c, Vec::new()));
            }
            '-' => {
                flush(&mut num, &mut out);
                num.push('-');
            }
            c if c.is_ascii_digit() || c == '.' => num.push(c),
            _ => flush(&mut num, &mut out),
        }
    }
    flush(&mut num, &mut out);
    out
}

/// Even-odd scanline fill, sampling at pixel centers.
pub fn fill_polygon(surface: &mut Surface, vertices: &[(f32, f32)], color: Rgb, alpha: f32) {
    if vertices.len() < 3 {
        return;
    }

    let mut min_y = f32::MAX;
    let mut max_y = f32::MIN;
    for (_, y) in vertices {
        min_y = min_y.min(*y);
        max_y = max_y.max(*y);
    }
    let min_y = (min_y.floor() as i32).max(0);
    let max_y = (max_y.ceil() as i32).min(surface.height() as i32 - 1);

    let mut intersections: Vec<f32> = Vec::with_capacity(vertices.len());
    let n = vertices.len();

    for y in min_y..=max_y {
        intersections.clear();
        let yf = y as f32 + 0.5;

        for i in 0..n {
            let (x1, y1) = vertices[i];
            let (x2, y2) = vertices[(i + 1) % n];
            if (y1 <= yf && y2 > yf) || (y2 <= yf && y1 > yf) {
                intersections.push(x1 + (yf - y1) / (y2 - y1) * (x2 - x1));
            }
        }

        intersections.sort_unstable_by(|a, b| a.total_cmp(b));
        for pair in intersections.chunks_exact(2) {
            let x0 = (pair[0] - 0.5).ceil() as i32;
            let x1 = (pair[1] - 0.5).ceil() as i32;
            surface.blend_span(x0, x1, y, color, alpha);
        }
    }
}

/// Disk of `radius` around (cx, cy), sampling at pixel centers.
pub fn fill_disc(surface: &mut Surface, cx: f32, cy: f32, radius: f32, color: Rgb, alpha: f32) {
    if radius <= 0.0 {
        return;
    }
    let y0 = ((cy - radius - 0.5).ceil() as i32).max(0);
    let y1 = ((cy + radius - 0.5).floor() as i32).min(surface.height() as i32 - 1);
    for y in y0..=y1 {
        let dy = y as f32 + 0.5 - cy;
        let span = radius * radius - dy * dy;
        if span < 0.0 {
            continue;
        }
        let dx = span.sqrt();
        let x0 = (cx - dx - 0.5).ceil() as i32;
        let x1 = (cx + dx - 0.5).floor() as i32 + 1;
        surface.blend_span(x0, x1, y, color, alpha);
    }
}

/// Draws shapes. Owns the parsed brushstroke silhouettes, built on first use.
#[derive(Default)]
pub struct ShapeRenderer {
    silhouettes: OnceCell<Vec<Vec<(f32, f32)>>>,
}

impl ShapeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn silhouette(&self, brush_index: usize) -> &[(f32, f32)] {
        let all = self
            .silhouettes
            .get_or_init(|| BRUSHSTROKE_PATHS.iter().map(|d| flatten_path(d)).collect());
        &all[brush_index % SILHOUETTE_COUNT]
    }

    /// Draw one shape centered at (x, y), rotated by `rotation` radians.
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &self,
        surface: &mut Surface,
        shape: ShapeKind,
        x: f32,
        y: f32,
        size: f32,
        rotation: f32,
        stroke_length: f32,
        brush_index: usize,
        color: Rgb,
        opacity: f32,
    ) {
        let frame = Frame::new(x, y, rotation);
        match shape {
            ShapeKind::Circle => fill_disc(surface, x, y, size, color, opacity),
            ShapeKind::Square | ShapeKind::Triangle | ShapeKind::Line => {
                if let Some(outline) = local_outline(shape, size, stroke_length) {
                    let world: Vec<_> = outline.into_iter().map(|p| frame.apply(p)).collect();
                    fill_polygon(surface, &world, color, opacity);
                }
            }
            ShapeKind::Brushstroke => {
                let frame = frame.scaled(BRUSH_SCALE_X * size, BRUSH_SCALE_Y * size);
                let world: Vec<_> = self.silhouette(brush_index).iter().map(|&p| frame.apply(p)).collect();
                fill_polygon(surface, &world, color, opacity);
            }
            ShapeKind::Mixed => {
                log::warn!("`mixed` reached the renderer; it is a selection policy, skipping");
            }
        }
    }

    pub fn draw_cell(&self, surface: &mut Surface, cell: &StyledCell) {
        self.draw(
            surface,
            cell.shape,
            cell.x,
            cell.y,
            cell.dot_radius,
            cell.rotation,
            cell.stroke_length,
            cell.brush_index,
            cell.color,
            cell.opacity,
        );
    }
}

/// Area a circle of `radius` covers, for density heuristics.
pub fn disc_area(radius: f32) -> f32 {
    PI * radius * radius
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = Rgb::new(255, 0, 0);

    fn covered(s: &Surface) -> usize {
        let mut n = 0;
        for y in 0..s.height() {
            for x in 0..s.width() {
                if s.pixel(x, y)[..3] == [255, 0, 0] {
                    n += 1;
                }
            }
        }
        n
    }

    #[test]
    fn square_covers_two_size_by_two_size() {
        let r = ShapeRenderer::new();
        let mut s = Surface::filled(40, 40, Rgb::WHITE);
        r.draw(&mut s, ShapeKind::Square, 20.0, 20.0, 5.0, 0.0, 1.0, 0, RED, 1.0);
        assert_eq!(covered(&s), 100);
        assert_eq!(s.pixel(15, 15)[..3], [255, 0, 0]);
        assert_eq!(s.pixel(24, 24)[..3], [255, 0, 0]);
        assert_eq!(s.pixel(25, 25)[..3], [255, 255, 255]);
    }

    #[test]
    fn circle_area_is_close_to_pi_r_squared() {
        let r = ShapeRenderer::new();
        let mut s = Surface::filled(64, 64, Rgb::WHITE);
        r.draw(&mut s, ShapeKind::Circle, 32.0, 32.0, 10.0, 1.3, 1.0, 0, RED, 1.0);
        let area = covered(&s) as f32;
        assert!((area - disc_area(10.0)).abs() < 20.0, "area {area}");
    }

    #[test]
    fn rotation_does_not_leak_between_draws() {
        let r = ShapeRenderer::new();
        let mut a = Surface::filled(40, 40, Rgb::WHITE);
        r.draw(&mut a, ShapeKind::Square, 10.0, 10.0, 4.0, 0.7, 1.0, 0, RED, 1.0);
        r.draw(&mut a, ShapeKind::Square, 30.0, 30.0, 4.0, 0.0, 1.0, 0, RED, 1.0);

        let mut b = Surface::filled(40, 40, Rgb::WHITE);
        r.draw(&mut b, ShapeKind::Square, 30.0, 30.0, 4.0, 0.0, 1.0, 0, RED, 1.0);
        for y in 20..40 {
            for x in 20..40 {
                assert_eq!(a.pixel(x, y), b.pixel(x, y));
            }
        }
    }

    #[test]
    fn quarter_turn_line_is_vertical() {
        let r = ShapeRenderer::new();
        let mut s = Surface::filled(60, 60, Rgb::WHITE);
        r.draw(&mut s, ShapeKind::Line, 30.0, 30.0, 10.0, PI / 2.0, 2.0, 0, RED, 1.0);
        assert_eq!(s.pixel(30, 11)[..3], [255, 0, 0]);
        assert_eq!(s.pixel(30, 48)[..3], [255, 0, 0]);
        assert_eq!(s.pixel(11, 30)[..3], [255, 255, 255]);
    }

    #[test]
    fn triangle_apex_points_up() {
        let outline = local_outline(ShapeKind::Triangle, 2.0, 1.0).unwrap();
        assert_eq!(outline[0], (0.0, -2.0));
        let base = outline[2].0 - outline[1].0;
        assert!((base - 2.0 * 3f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn silhouettes_parse_and_are_wider_than_tall_when_scaled() {
        let r = ShapeRenderer::new();
        for i in 0..SILHOUETTE_COUNT {
            let pts = r.silhouette(i);
            // M + Q(8) + L + Q(8)
            assert_eq!(pts.len(), 18);
            let (min_x, max_x) = pts.iter().fold((f32::MAX, f32::MIN), |(a, b), p| (a.min(p.0), b.max(p.0)));
            let (min_y, max_y) = pts.iter().fold((f32::MAX, f32::MIN), |(a, b), p| (a.min(p.1), b.max(p.1)));
            let w = (max_x - min_x) * BRUSH_SCALE_X;
            let h = (max_y - min_y) * BRUSH_SCALE_Y;
            assert!(w > h, "silhouette {i}: {w} x {h}");
        }
        assert_eq!(r.silhouette(4), r.silhouette(1));
    }

    #[test]
    fn brushstroke_draws_something_translucent() {
        let r = ShapeRenderer::new();
        let mut s = Surface::filled(100, 100, Rgb::WHITE);
        r.draw(&mut s, ShapeKind::Brushstroke, 50.0, 50.0, 10.0, 0.0, 1.0, 0, Rgb::new(0, 0, 0), 0.5);
        let p = s.pixel(50, 52);
        assert_eq!(p, [128, 128, 128, 255]);
    }

    #[test]
    fn path_commands_split_signed_numbers() {
        let cmds = path_commands("M-0.5,-1 L2 3Z");
        assert_eq!(cmds, vec![('M', vec![-0.5, -1.0]), ('L', vec![2.0, 3.0]), ('Z', vec![])]);
    }

    #[test]
    fn shapes_clip_at_surface_edges() {
        let r = ShapeRenderer::new();
        let mut s = Surface::filled(10, 10, Rgb::WHITE);
        r.draw(&mut s, ShapeKind::Circle, 0.0, 0.0, 30.0, 0.0, 1.0, 0, RED, 1.0);
        r.draw(&mut s, ShapeKind::Square, -5.0, 12.0, 8.0, 0.3, 1.0, 0, RED, 1.0);
        assert_eq!(covered(&s), 100);
    }
}
