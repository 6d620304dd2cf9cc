// What you SEE:
// • `render`: nothing on screen; a PNG or SVG of the stylized picture is written.
// • `brush`: a window with a faint copy of the picture. Hold Left Mouse to
//   spray shapes colored from the picture underneath. E toggles the eraser,
//   G the guide, [ and ] resize the brush, C clears, S/P write SVG/PNG. ESC quits.
// • `ambient`: a window that endlessly reveals, holds and erases pictures from
//   a folder as dots. Space pauses/resumes. ESC quits.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use minifb::Key;
use rand::SeedableRng;
use rand::rngs::StdRng;

use pointillist::animator::{Animator, Phase};
use pointillist::brush::BrushPipeline;
use pointillist::draw::{Drawer, draw_crosshair, draw_ring, draw_text_5x7};
use pointillist::params::BRUSH_RADIUS_RANGE;
use pointillist::raster::{self, RasterPipeline, RenderSession};
use pointillist::source::DirectorySource;
use pointillist::{
    AnimatorConfig, BrushParams, BrushTool, Error, FrameBuffer, RenderParams, Rgb, ShapeKind, StyledCell, Surface,
    vector,
};

#[derive(Parser)]
#[command(name = "pointillist", version, about = "Turn pictures into pointillist paintings")]
struct Cli {
    /// Seed for every random draw (jitter, rotation, shapes, order).
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a picture once and write it as PNG or SVG.
    Render(RenderArgs),
    /// Spray-paint interactively from a picture.
    Brush(BrushArgs),
    /// Cycle through a folder of pictures as an animated background.
    Ambient(AmbientArgs),
}

#[derive(Args)]
struct StyleArgs {
    #[arg(long, default_value_t = 16.0)]
    dot_radius: f32,
    #[arg(long, default_value_t = 15)]
    spacing: u32,
    #[arg(long, default_value_t = 6.0)]
    jitter: f32,
    #[arg(long, default_value_t = 0.7)]
    opacity: f32,
    #[arg(long, default_value_t = 800)]
    width: u32,
    #[arg(long, default_value_t = 600)]
    height: u32,
    #[arg(long, default_value_t = 0.0)]
    crop_x: f32,
    #[arg(long, default_value_t = 0.0)]
    crop_y: f32,
    /// circle, square, triangle, line, brushstroke or mixed
    #[arg(long, default_value_t = ShapeKind::Circle)]
    shape: ShapeKind,
    #[arg(long, default_value_t = 2.0)]
    stroke_length: f32,
    /// Maximum rotation either way, in degrees.
    #[arg(long, default_value_t = 0.0)]
    rotation_jitter: f32,
}

impl StyleArgs {
    /// Snapshot the flags, clamping anything out of range (with a warning).
    fn params(&self) -> RenderParams {
        let p = RenderParams {
            dot_radius: self.dot_radius,
            spacing: self.spacing,
            jitter: self.jitter,
            opacity: self.opacity,
            output_width: self.width,
            output_height: self.height,
            crop_x: self.crop_x,
            crop_y: self.crop_y,
            shape: self.shape,
            stroke_length: self.stroke_length,
            rotation_jitter_degrees: self.rotation_jitter,
        };
        if let Err(e) = p.validate() {
            log::warn!("{e}; clamping");
        }
        p.clamped()
    }
}

#[derive(Args)]
struct RenderArgs {
    image: PathBuf,
    /// Output file; `.svg` writes a vector document, anything else a raster.
    #[arg(short, long)]
    output: PathBuf,
    /// Ignore the style flags and roll every parameter at random.
    #[arg(long)]
    randomize: bool,
    /// Render at WxH instead, scaling dot radius, spacing and jitter so the
    /// picture keeps the look tuned at --width x --height.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    resize: Option<(u32, u32)>,
    #[command(flatten)]
    style: StyleArgs,
}

/// `640x480` -> (640, 480).
fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("`{s}` is not WIDTHxHEIGHT"))?;
    let dim = |v: &str| v.trim().parse::<u32>().map_err(|e| format!("`{v}` in `{s}`: {e}"));
    Ok((dim(w)?, dim(h)?))
}

#[derive(Args)]
struct BrushArgs {
    image: PathBuf,
    #[arg(long, default_value_t = 50.0)]
    brush_radius: f32,
    #[arg(long, default_value_t = 30.0)]
    eraser_radius: f32,
    /// Exports go to `<out>.svg` / `<out>.png`.
    #[arg(short, long, default_value = "pointillist")]
    out: PathBuf,
    #[command(flatten)]
    style: StyleArgs,
}

#[derive(Args)]
struct AmbientArgs {
    dir: PathBuf,
    #[arg(long, default_value_t = 1024)]
    width: usize,
    #[arg(long, default_value_t = 768)]
    height: usize,
    #[arg(long, default_value_t = 18.0)]
    dot_radius: f32,
    #[arg(long, default_value_t = 18)]
    spacing: u32,
    #[arg(long, default_value_t = 8.0)]
    jitter: f32,
    #[arg(long, default_value_t = 0.7)]
    opacity: f32,
    #[arg(long, default_value_t = 10)]
    dots_per_frame: usize,
    #[arg(long, default_value_t = 3000)]
    hold_ms: u64,
    #[arg(long, default_value_t = 60)]
    erase_per_frame: usize,
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    match cli.command {
        Command::Render(args) => run_render(args, &mut rng),
        Command::Brush(args) => run_brush(args, &mut rng),
        Command::Ambient(args) => run_ambient(args, &mut rng),
    }
}

/// Write `surface` as a raster, or `cells` as SVG when the path ends in `.svg`.
fn save_output(path: &Path, surface: &Surface, cells: &[StyledCell], background: Rgb) -> Result<(), Error> {
    let is_svg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"));
    if is_svg {
        vector::save(path, cells, background, surface.width() as u32, surface.height() as u32)
    } else {
        surface.to_image().save(path)?;
        log::info!("wrote {}", path.display());
        Ok(())
    }
}

/// Flags -> parameters: optional retarget to a new size, then optional dice roll.
fn render_params(args: &RenderArgs, rng: &mut StdRng) -> RenderParams {
    let mut params = args.style.params();
    if let Some((w, h)) = args.resize {
        params = params.resized(w, h);
        log::info!(
            "resized to {}x{}: dot radius {}, spacing {}, jitter {}",
            params.output_width,
            params.output_height,
            params.dot_radius,
            params.spacing,
            params.jitter
        );
    }
    if args.randomize {
        params = params.randomized(rng);
        log::info!("randomized: {params:?}");
    }
    params
}

fn run_render(args: RenderArgs, rng: &mut StdRng) -> Result<(), Error> {
    let params = render_params(&args, rng);

    let mut pipeline = RasterPipeline::new();
    let mut session = RenderSession::new();
    session.render_path(&mut pipeline, &args.image, &params, rng)?;
    match session.committed() {
        Some(out) => save_output(&args.output, &out.surface, &out.cells, out.background),
        None => Ok(()),
    }
}

/* ------------------------------ Brush window ------------------------------ */

fn run_brush(args: BrushArgs, rng: &mut StdRng) -> Result<(), Error> {
    let params = args.style.params();
    let image = raster::load_image(&args.image)?;
    let mut brush = BrushPipeline::new(
        &image,
        params.output_width,
        params.output_height,
        params.crop_x,
        params.crop_y,
    )?;
    let mut settings = BrushParams {
        brush_radius: args.brush_radius,
        eraser_radius: args.eraser_radius,
        ..BrushParams::from_render(&params)
    }
    .clamped();

    let (w, h) = (brush.width() as usize, brush.height() as usize);
    let mut drawer = Drawer::new("Pointillist - Brush", w, h)?;
    let mut screen = FrameBuffer::new(w, h);

    /* --- HUD / FPS --- */
    let mut last_fps_time = Instant::now();
    let mut frames_this_second: u32 = 0;
    let mut hud_fps_text = String::from("FPS: 0.0");

    while drawer.is_open() && !drawer.esc_pressed() {
        let now = Instant::now();

        /* 1) Keys */
        if drawer.pressed_once(Key::E) {
            settings.tool = match settings.tool {
                BrushTool::Paint => BrushTool::Erase,
                BrushTool::Erase => BrushTool::Paint,
            };
        }
        if drawer.pressed_once(Key::G) {
            brush.set_show_guide(!brush.show_guide()); // visual: faint picture appears/disappears
        }
        if drawer.pressed_once(Key::C) {
            brush.clear(); // visual: canvas back to plain background
        }
        if drawer.pressed_once(Key::LeftBracket) {
            settings.brush_radius = (settings.brush_radius - 5.0).max(BRUSH_RADIUS_RANGE.0);
        }
        if drawer.pressed_once(Key::RightBracket) {
            settings.brush_radius = (settings.brush_radius + 5.0).min(BRUSH_RADIUS_RANGE.1);
        }
        if drawer.pressed_once(Key::S) {
            let flat = brush.flatten();
            report(save_output(&args.out.with_extension("svg"), &flat, brush.cells(), brush.background()));
        }
        if drawer.pressed_once(Key::P) {
            let flat = brush.flatten();
            report(save_output(&args.out.with_extension("png"), &flat, brush.cells(), brush.background()));
        }

        /* 2) Pointer: spray (or erase) while the left button is held */
        let mouse = drawer.mouse_pos();
        match (drawer.left_mouse_down(), mouse) {
            (true, Some((mx, my))) if brush.is_pressed() => brush.move_to(mx, my),
            (true, Some((mx, my))) => brush.press(mx, my),
            _ => brush.release(),
        }
        brush.tick(&settings, rng);

        /* 3) Compose: background, guide, paint, then overlays */
        brush.composite().write_frame(&mut screen);
        if let Some((mx, my)) = mouse {
            let (cx, cy) = (mx as i32, my as i32);
            let (radius, color) = match settings.tool {
                BrushTool::Paint => (settings.brush_radius, 0x00_33_33_33),
                BrushTool::Erase => (settings.eraser_radius, 0x00_CC_33_33),
            };
            draw_ring(&mut screen, cx, cy, radius as i32, color);
            draw_crosshair(&mut screen, cx, cy, 8, color);
        }

        let mode = match settings.tool {
            BrushTool::Paint => "PAINT",
            BrushTool::Erase => "ERASE",
        };
        let guide = if brush.show_guide() { "ON" } else { "OFF" };
        let hud = format!(
            "{mode} {} | GUIDE {guide} | CELLS {} | {hud_fps_text}",
            settings.brush_radius as i32,
            brush.cells().len()
        );
        draw_text_5x7(&mut screen, 8, 8, &hud, 0x00_FF_FF_FF);

        drawer.present(&screen)?;

        tick_fps(now, &mut last_fps_time, &mut frames_this_second, &mut hud_fps_text);
    }

    Ok(())
}

/// Exports from inside the window loop must not end the session.
fn report(result: Result<(), Error>) {
    if let Err(e) = result {
        log::error!("export failed: {e}");
    }
}

/* ----------------------------- Ambient window ----------------------------- */

fn run_ambient(args: AmbientArgs, rng: &mut StdRng) -> Result<(), Error> {
    let config = AnimatorConfig {
        dot_radius: args.dot_radius,
        spacing: args.spacing,
        jitter: args.jitter,
        opacity: args.opacity,
        dots_per_frame: args.dots_per_frame,
        hold: Duration::from_millis(args.hold_ms),
        erase_per_frame: args.erase_per_frame,
    };
    let source = DirectorySource::open(&args.dir)?;
    let mut drawer = Drawer::resizable("Pointillist - Ambient", args.width, args.height)?;
    let (mut w, mut h) = drawer.size();
    let mut animator = Animator::new(source, config, w, h)?;
    let mut screen = FrameBuffer::new(w, h);

    let mut last_frame_time = Instant::now();
    let mut last_fps_time = Instant::now();
    let mut frames_this_second: u32 = 0;
    let mut hud_fps_text = String::from("FPS: 0.0");

    while drawer.is_open() && !drawer.esc_pressed() {
        let now = Instant::now();
        let dt = now - last_frame_time;
        last_frame_time = now;

        if drawer.pressed_once(Key::Space) {
            animator.toggle_suspended();
        }

        /* Window resized: re-map the dots onto the new canvas */
        let size = drawer.size();
        if size != (w, h) && size.0 > 0 && size.1 > 0 {
            (w, h) = size;
            animator.resize(w, h);
            screen = FrameBuffer::new(w, h);
        }

        animator.step(dt, rng)?;
        animator.canvas().write_frame(&mut screen);

        let phase = match animator.phase() {
            Phase::Loading => "LOADING",
            Phase::RevealingIn => "REVEAL",
            Phase::Holding => "HOLD",
            Phase::ErasingOut => "ERASE",
        };
        let paused = if animator.is_suspended() { " | PAUSED" } else { "" };
        let hud = format!(
            "{phase} {}/{}{paused} | {hud_fps_text}",
            animator.drawn(),
            animator.total()
        );
        draw_text_5x7(&mut screen, 8, 8, &hud, animator.accent().to_u32());

        drawer.present(&screen)?;

        tick_fps(now, &mut last_fps_time, &mut frames_this_second, &mut hud_fps_text);
    }

    animator.cancel();
    log::info!("ambient stopped after {} cycles", animator.cycles());
    Ok(())
}

/// FPS counter: logs and refreshes the HUD text once per second.
fn tick_fps(now: Instant, last: &mut Instant, frames: &mut u32, text: &mut String) {
    *frames += 1;
    if now.duration_since(*last) >= Duration::from_secs(1) {
        let secs = now.duration_since(*last).as_secs_f32();
        let fps = *frames as f32 / secs;
        log::debug!("FPS: {fps:.1}");
        *text = format!("FPS: {fps:.1}");
        *frames = 0;
        *last = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_args(extra: &[&str]) -> RenderArgs {
        let argv = ["pointillist", "render", "in.png", "-o", "out.svg"].into_iter().chain(extra.iter().copied());
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Render(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn size_flag_parses() {
        assert_eq!(parse_size("640x480"), Ok((640, 480)));
        assert_eq!(parse_size("10X20"), Ok((10, 20)));
        assert!(parse_size("640").is_err());
        assert!(parse_size("ax5").is_err());
    }

    #[test]
    fn resize_flag_rescales_the_tuned_look() {
        let mut rng = StdRng::seed_from_u64(0);
        let p = render_params(&render_args(&["--resize", "400x300", "--crop-x", "12"]), &mut rng);
        // Area is a quarter of 800x600, so lengths halve.
        assert_eq!((p.output_width, p.output_height), (400, 300));
        assert_eq!((p.dot_radius, p.spacing, p.jitter), (8.0, 8, 3.0));
        assert_eq!(p.crop_x, 0.0);

        let plain = render_params(&render_args(&[]), &mut rng);
        assert_eq!(plain, RenderParams::default());
    }
}
