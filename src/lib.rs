//! Pointillist image stylizer.
//!
//! A picture is averaged over a regular grid, every grid cell becomes a small
//! translucent shape (circle, square, triangle, line or brushstroke), and the
//! result is painted onto a washed-out background. The same cells drive three
//! front ends:
//!
//! * [`raster::RasterPipeline`]: one-shot render of a whole picture,
//! * [`brush::BrushPipeline`]: interactive spray painting sampled from a picture,
//! * [`animator::Animator`]: an endless reveal / hold / erase background cycle.
//!
//! [`vector::export`] turns any list of styled cells into a self-contained SVG.

pub mod animator;
pub mod brush;
pub mod cell;
pub mod draw;
pub mod error;
pub mod kernel;
pub mod params;
pub mod raster;
pub mod sampler;
pub mod shape;
pub mod source;
pub mod types;
pub mod vector;

pub use cell::{ShapeKind, StyledCell};
pub use error::{Error, Result};
pub use params::{AnimatorConfig, BrushParams, BrushTool, RenderParams};
pub use types::{FrameBuffer, PixelBuffer, Rgb, Surface};
