// SVG export of styled cells.
// Cells are bucketed by quantized color and style so that each bucket becomes
// one element: a compound path for polygons, a group of circles, or a group
// of `<use>` references to shared brushstroke symbols.

use std::collections::{BTreeSet, HashMap};
use std::path::Path as FsPath;

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Circle, Definitions, Group, Path, Rectangle, Symbol, Use};

use crate::cell::{ShapeKind, StyledCell};
use crate::error::Result;
use crate::shape::{BRUSH_SCALE_X, BRUSH_SCALE_Y, BRUSHSTROKE_PATHS, Frame, SILHOUETTE_COUNT, local_outline};
use crate::types::Rgb;

const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// Channel quantization step for grouping.
pub const QUANT_STEP: f32 = 16.0;

/// Nearest multiple of 16. 248..=255 would land on 256, so the top bucket is
/// pinned to 255.
pub fn quantize(c: u8) -> u8 {
    ((c as f32 / QUANT_STEP).round() * QUANT_STEP).min(255.0) as u8
}

pub fn quantize_rgb(c: Rgb) -> Rgb {
    Rgb::new(quantize(c.r), quantize(c.g), quantize(c.b))
}

/// Cells sharing one quantized color and style.
#[derive(Debug, Clone)]
pub struct VectorGroup {
    pub hex: String,
    pub shape: ShapeKind,
    pub dot_radius: f32,
    pub opacity: f32,
    pub stroke_length: f32,
    pub cells: Vec<StyledCell>,
}

#[derive(Hash, PartialEq, Eq)]
struct GroupKey {
    hex: String,
    shape: ShapeKind,
    dot_radius: u32,
    opacity: u32,
    stroke_length: u32,
}

/// Bucket cells by `(quantized hex, shape, radius, opacity, stroke length)`.
/// Groups come out in order of first appearance.
pub fn group_cells(cells: &[StyledCell]) -> Vec<VectorGroup> {
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<VectorGroup> = Vec::new();
    for cell in cells {
        let hex = quantize_rgb(cell.color).to_hex();
        let key = GroupKey {
            hex: hex.clone(),
            shape: cell.shape,
            dot_radius: cell.dot_radius.to_bits(),
            opacity: cell.opacity.to_bits(),
            stroke_length: cell.stroke_length.to_bits(),
        };
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(VectorGroup {
                hex,
                shape: cell.shape,
                dot_radius: cell.dot_radius,
                opacity: cell.opacity,
                stroke_length: cell.stroke_length,
                cells: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].cells.push(*cell);
    }
    groups
}

fn symbol_id(brush_index: usize, dot_radius: f32) -> String {
    format!("b{}_r{}", brush_index % SILHOUETTE_COUNT, dot_radius)
}

/// One `<symbol>` per silhouette/radius pair that some cell actually uses.
fn brush_symbols(groups: &[VectorGroup]) -> Definitions {
    let used: BTreeSet<(usize, u32)> = groups
        .iter()
        .filter(|g| g.shape == ShapeKind::Brushstroke)
        .flat_map(|g| g.cells.iter().map(|c| (c.brush_index % SILHOUETTE_COUNT, g.dot_radius.to_bits())))
        .collect();

    used.into_iter().fold(Definitions::new(), |defs, (idx, bits)| {
        let dr = f32::from_bits(bits);
        let path = Path::new()
            .set("d", BRUSHSTROKE_PATHS[idx])
            .set("transform", format!("scale({}, {})", BRUSH_SCALE_X * dr, BRUSH_SCALE_Y * dr));
        // Silhouettes are centered on the origin; without `overflow` a symbol
        // clips everything left of and above its `<use>` anchor.
        defs.add(
            Symbol::new()
                .set("id", symbol_id(idx, dr))
                .set("overflow", "visible")
                .add(path),
        )
    })
}

/// All members of a polygon group as rotated subpaths of one path, with
/// vertices rounded to whole pixels.
fn polygon_data(group: &VectorGroup) -> Data {
    let mut data = Data::new();
    for c in &group.cells {
        let Some(outline) = local_outline(group.shape, group.dot_radius, group.stroke_length) else {
            continue;
        };
        let frame = Frame::new(c.x, c.y, c.rotation);
        for (i, p) in outline.into_iter().enumerate() {
            let (x, y) = frame.apply(p);
            let at = (x.round(), y.round());
            data = if i == 0 { data.move_to(at) } else { data.line_to(at) };
        }
        data = data.close();
    }
    data
}

fn circle_group(group: &VectorGroup) -> Group {
    group.cells.iter().fold(styled_group(group), |g, c| {
        g.add(
            Circle::new()
                .set("cx", c.x.round())
                .set("cy", c.y.round())
                .set("r", group.dot_radius),
        )
    })
}

fn brush_group(group: &VectorGroup) -> Group {
    group.cells.iter().fold(styled_group(group), |g, c| {
        let degrees = c.rotation.to_degrees().round() as i32;
        let mut transform = format!("translate({},{})", c.x.round(), c.y.round());
        if degrees != 0 {
            transform.push_str(&format!(" rotate({degrees})"));
        }
        let target = format!("#{}", symbol_id(c.brush_index, group.dot_radius));
        g.add(
            Use::new()
                .set("href", target.as_str())
                .set("xlink:href", target)
                .set("transform", transform),
        )
    })
}

fn styled_group(group: &VectorGroup) -> Group {
    Group::new()
        .set("fill", group.hex.as_str())
        .set("fill-opacity", group.opacity)
}

/// Build the SVG document: symbol definitions, the background rectangle,
/// then one element per group.
pub fn document(cells: &[StyledCell], background: Rgb, width: u32, height: u32) -> Document {
    let groups = group_cells(cells);

    let mut doc = Document::new()
        .set("xmlns:xlink", XLINK_NS)
        .set("width", width)
        .set("height", height)
        .set("viewBox", (0, 0, width, height))
        .add(brush_symbols(&groups))
        .add(
            Rectangle::new()
                .set("width", width)
                .set("height", height)
                .set("fill", background.to_hex()),
        );

    for group in &groups {
        doc = match group.shape {
            ShapeKind::Square | ShapeKind::Triangle | ShapeKind::Line => doc.add(
                Path::new()
                    .set("fill", group.hex.as_str())
                    .set("fill-opacity", group.opacity)
                    .set("d", polygon_data(group)),
            ),
            ShapeKind::Circle => doc.add(circle_group(group)),
            ShapeKind::Brushstroke => doc.add(brush_group(group)),
            ShapeKind::Mixed => {
                log::warn!("skipping {} cells with unresolved `mixed` shape", group.cells.len());
                doc
            }
        };
    }
    log::debug!("vector export: {} cells in {} groups", cells.len(), groups.len());
    doc
}

/// The document as a string.
pub fn export(cells: &[StyledCell], background: Rgb, width: u32, height: u32) -> String {
    document(cells, background, width, height).to_string()
}

pub fn save(path: impl AsRef<FsPath>, cells: &[StyledCell], background: Rgb, width: u32, height: u32) -> Result<()> {
    let path = path.as_ref();
    svg::save(path, &document(cells, background, width, height))?;
    log::info!("wrote {} ({} cells)", path.display(), cells.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellStyle;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn cell(x: f32, y: f32, shape: ShapeKind, color: Rgb, brush_index: usize) -> StyledCell {
        StyledCell {
            center_x: x as i32,
            center_y: y as i32,
            color,
            x,
            y,
            rotation: 0.0,
            shape,
            brush_index,
            dot_radius: 4.0,
            opacity: 0.5,
            stroke_length: 2.0,
        }
    }

    fn random_cells(n: usize, seed: u64) -> Vec<StyledCell> {
        let mut rng = StdRng::seed_from_u64(seed);
        let style = CellStyle {
            dot_radius: 5.0,
            opacity: 0.7,
            jitter: 3.0,
            rotation_jitter: 1.0,
            shape: ShapeKind::Mixed,
            stroke_length: 2.0,
        };
        (0..n)
            .map(|i| {
                let color = Rgb::new((i * 37 % 256) as u8, (i * 11 % 256) as u8, (i * 5 % 256) as u8);
                style.style((i % 40) as f32 * 10.0, (i / 40) as f32 * 10.0, (0, 0), color, &mut rng)
            })
            .collect()
    }

    /// Circles + uses + polygon subpaths. Every subpath starts with `M`;
    /// symbol paths also contain one each.
    fn primitive_count(svg: &str) -> usize {
        svg.matches("<circle").count() + svg.matches("<use").count() + svg.matches('M').count()
            - svg.matches("<symbol").count()
    }

    #[test]
    fn quantize_rounds_to_sixteen_and_saturates() {
        assert_eq!(quantize(0), 0);
        assert_eq!(quantize(7), 0);
        assert_eq!(quantize(8), 16);
        assert_eq!(quantize(100), 96);
        assert_eq!(quantize(247), 240);
        assert_eq!(quantize(250), 255);
        assert_eq!(quantize_rgb(Rgb::new(255, 9, 30)).to_hex(), "#ff1020");
    }

    #[test]
    fn every_cell_lands_in_exactly_one_group() {
        let cells = random_cells(600, 1);
        let groups = group_cells(&cells);
        assert_eq!(groups.iter().map(|g| g.cells.len()).sum::<usize>(), cells.len());
        for g in &groups {
            for c in &g.cells {
                assert_eq!(quantize_rgb(c.color).to_hex(), g.hex);
                assert_eq!(c.shape, g.shape);
            }
        }
    }

    #[test]
    fn near_colors_share_a_group() {
        let a = cell(0.0, 0.0, ShapeKind::Square, Rgb::new(100, 100, 100), 0);
        let b = cell(9.0, 0.0, ShapeKind::Square, Rgb::new(97, 102, 99), 0);
        let c = cell(9.0, 0.0, ShapeKind::Triangle, Rgb::new(97, 102, 99), 0);
        let groups = group_cells(&[a, b, c]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].cells.len(), 2);
        assert_eq!(groups[0].hex, "#606060");
    }

    #[test]
    fn primitive_count_matches_cell_count() {
        let cells = random_cells(300, 2);
        let svg = export(&cells, Rgb::new(230, 230, 230), 400, 80);
        assert_eq!(primitive_count(&svg), cells.len());
    }

    #[test]
    fn background_comes_before_any_shape() {
        let cells = vec![cell(5.0, 5.0, ShapeKind::Circle, Rgb::new(1, 2, 3), 0)];
        let svg = export(&cells, Rgb::new(232, 217, 255), 100, 50);
        let rect = svg.find("<rect").unwrap();
        assert!(svg[rect..].contains("fill=\"#e8d9ff\""));
        assert!(rect < svg.find("<circle").unwrap());
        assert!(svg.contains("viewBox=\"0 0 100 50\""));
    }

    #[test]
    fn only_used_brush_symbols_are_defined() {
        let mut big = cell(10.0, 10.0, ShapeKind::Brushstroke, Rgb::new(50, 50, 50), 2);
        big.dot_radius = 6.0;
        let cells = vec![
            cell(0.0, 0.0, ShapeKind::Brushstroke, Rgb::new(50, 50, 50), 1),
            cell(3.0, 0.0, ShapeKind::Brushstroke, Rgb::new(200, 50, 50), 1),
            big,
        ];
        let svg = export(&cells, Rgb::WHITE, 100, 100);
        assert_eq!(svg.matches("<symbol").count(), 2);
        assert!(svg.contains("id=\"b1_r4\""));
        assert!(svg.contains("id=\"b2_r6\""));
        assert!(!svg.contains("b0_"));
        assert!(svg.contains("scale(24, 60)"));
        assert_eq!(svg.matches("<use").count(), 3);
        assert!(svg.contains("href=\"#b1_r4\""));
    }

    #[test]
    fn brush_symbols_are_not_clipped_at_the_anchor() {
        let cells = vec![
            cell(50.0, 50.0, ShapeKind::Brushstroke, Rgb::new(0, 0, 0), 0),
            cell(20.0, 70.0, ShapeKind::Brushstroke, Rgb::new(0, 0, 0), 2),
        ];
        let svg = export(&cells, Rgb::WHITE, 100, 100);
        let symbols: Vec<&str> = svg.split("<symbol").skip(1).collect();
        assert_eq!(symbols.len(), 2);
        for sym in symbols {
            let open_tag = &sym[..sym.find('>').unwrap()];
            assert!(open_tag.contains("overflow=\"visible\""), "{open_tag}");
        }
    }

    #[test]
    fn uses_carry_an_xlink_fallback() {
        let svg = export(&[cell(5.0, 5.0, ShapeKind::Brushstroke, Rgb::WHITE, 1)], Rgb::WHITE, 10, 10);
        assert!(svg.contains("xmlns:xlink=\"http://www.w3.org/1999/xlink\""));
        assert!(svg.contains(" href=\"#b1_r4\""));
        assert!(svg.contains("xlink:href=\"#b1_r4\""));
    }

    #[test]
    fn rotation_shows_up_in_degrees() {
        let mut c = cell(20.0, 30.0, ShapeKind::Brushstroke, Rgb::WHITE, 0);
        c.rotation = std::f32::consts::FRAC_PI_2;
        let svg = export(&[c], Rgb::WHITE, 100, 100);
        assert!(svg.contains("translate(20,30) rotate(90)"));
    }

    #[test]
    fn polygon_vertices_are_rotated_and_rounded() {
        let mut c = cell(10.0, 10.0, ShapeKind::Square, Rgb::WHITE, 0);
        c.rotation = std::f32::consts::FRAC_PI_4;
        let svg = export(&[c], Rgb::WHITE, 100, 100);
        let at = svg.find(" d=\"").unwrap() + 4;
        let d = &svg[at..at + svg[at..].find('"').unwrap()];
        let nums: Vec<f32> = d
            .split(|ch: char| !(ch.is_ascii_digit() || ch == '.' || ch == '-'))
            .filter(|t| !t.is_empty())
            .map(|t| t.parse().unwrap())
            .collect();
        // Corner (-4,-4) turned 45 degrees lands at (10, 10 - 4*sqrt 2).
        assert_eq!(nums.len(), 8);
        assert_eq!(nums[0].abs(), 10.0);
        assert_eq!(nums[1], 4.0);
        assert!(nums.iter().all(|v| v.fract() == 0.0));
    }
}
