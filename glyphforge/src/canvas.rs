//! Canvas sizing, text placement, and final composition.
//!
//! Backgrounds are cropped, never resized. A background that cannot cover the
//! canvas falls back to the plan's solid color, and the failure is surfaced
//! so the scheduler can penalize the file.

use image::RgbaImage;
use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::Distribution as _;

use crate::config::PlacementStrategy;
use crate::foundation::core::CharacterBox;
use crate::foundation::error::{ForgeError, ForgeResult};
use crate::plan::Plan;

pub struct ComposeResult {
    pub image: RgbaImage,
    pub boxes: Vec<CharacterBox>,
    /// `BackgroundTooSmall` raised while validating the plan's background
    /// file. The canvas already fell back to the solid color; the scheduler
    /// translates this into a health penalty.
    pub background_error: Option<ForgeError>,
}

/// Random canvas size that fits the text with padding, capped by the
/// megapixel budget and a 5x multiplier per axis.
pub fn generate_canvas_size(
    rng: &mut StdRng,
    text_w: u32,
    text_h: u32,
    min_padding: u32,
    max_megapixels: f64,
) -> (u32, u32) {
    let min_w = text_w + 2 * min_padding;
    let min_h = text_h + 2 * min_padding;
    let max_pixels = (max_megapixels * 1_000_000.0).max(f64::from(min_w) * f64::from(min_h));

    let max_multiplier = (max_pixels / (f64::from(min_w) * f64::from(min_h)))
        .sqrt()
        .min(5.0)
        .max(1.0);

    let wm = rng.gen_range(1.0..=max_multiplier);
    let hm = rng.gen_range(1.0..=max_multiplier);
    let mut w = (f64::from(min_w) * wm) as u32;
    let mut h = (f64::from(min_h) * hm) as u32;

    if f64::from(w) * f64::from(h) > max_pixels {
        let scale = (max_pixels / (f64::from(w) * f64::from(h))).sqrt();
        w = (f64::from(w) * scale) as u32;
        h = (f64::from(h) * scale) as u32;
    }
    (w.max(min_w), h.max(min_h))
}

/// Placement offset for the text surface on the canvas.
pub fn choose_placement(
    rng: &mut StdRng,
    canvas_w: u32,
    canvas_h: u32,
    text_w: u32,
    text_h: u32,
    min_padding: u32,
    strategy: PlacementStrategy,
) -> (u32, u32) {
    let min_x = min_padding as f64;
    let min_y = min_padding as f64;
    let max_x = (canvas_w.saturating_sub(text_w + min_padding) as f64).max(min_x);
    let max_y = (canvas_h.saturating_sub(text_h + min_padding) as f64).max(min_y);

    match strategy {
        PlacementStrategy::Center => (
            canvas_w.saturating_sub(text_w) / 2,
            canvas_h.saturating_sub(text_h) / 2,
        ),
        PlacementStrategy::UniformRandom => (
            rng.gen_range(min_x..=max_x) as u32,
            rng.gen_range(min_y..=max_y) as u32,
        ),
        PlacementStrategy::WeightedRandom => {
            let cx = (f64::from(canvas_w) - f64::from(text_w)) / 2.0;
            let cy = (f64::from(canvas_h) - f64::from(text_h)) / 2.0;
            (
                triangular(rng, min_x, max_x, cx) as u32,
                triangular(rng, min_y, max_y, cy) as u32,
            )
        }
    }
}

fn triangular(rng: &mut StdRng, min: f64, max: f64, mode: f64) -> f64 {
    if max <= min {
        return min;
    }
    let mode = mode.clamp(min, max);
    match rand_distr::Triangular::new(min, max, mode) {
        Ok(dist) => dist.sample(rng),
        Err(_) => rng.gen_range(min..=max),
    }
}

/// Composite the augmented text surface onto the canvas at the plan's
/// placement offset, rebasing every box.
pub fn compose(
    text_surface: &RgbaImage,
    boxes: Vec<CharacterBox>,
    plan: &Plan,
) -> ForgeResult<ComposeResult> {
    let mut rng = plan.stream_rng("canvas");
    let (cw, ch) = (
        plan.canvas_width.max(text_surface.width()),
        plan.canvas_height.max(text_surface.height()),
    );

    let mut background_error = None;
    let mut canvas = match &plan.background_path {
        Some(path) => match crop_background(path, cw, ch, text_surface, &mut rng) {
            Ok(cropped) => cropped,
            Err(e) => {
                background_error = Some(e);
                solid_canvas(cw, ch, plan)
            }
        },
        None => solid_canvas(cw, ch, plan),
    };

    let (px, py) = (
        plan.placement_x.min(cw.saturating_sub(text_surface.width())),
        plan.placement_y.min(ch.saturating_sub(text_surface.height())),
    );
    image::imageops::overlay(&mut canvas, text_surface, i64::from(px), i64::from(py));

    let mut placed = Vec::with_capacity(boxes.len());
    for mut b in boxes {
        b.translate(px as i32, py as i32);
        b.clip_to(cw, ch);
        placed.push(b);
    }

    Ok(ComposeResult {
        image: canvas,
        boxes: placed,
        background_error,
    })
}

fn solid_canvas(w: u32, h: u32, plan: &Plan) -> RgbaImage {
    let c = plan.background_color;
    RgbaImage::from_pixel(w, h, image::Rgba([c.r, c.g, c.b, 255]))
}

fn crop_background(
    path: &std::path::Path,
    canvas_w: u32,
    canvas_h: u32,
    text_surface: &RgbaImage,
    rng: &mut StdRng,
) -> ForgeResult<RgbaImage> {
    let id = path.to_string_lossy().into_owned();
    let loaded = image::open(path)
        .map_err(|e| ForgeError::BackgroundTooSmall {
            path: id.clone(),
            message: format!("decode failed: {e}"),
            severe: true,
        })?
        .to_rgba8();
    let (bw, bh) = loaded.dimensions();

    if bw < text_surface.width() || bh < text_surface.height() {
        return Err(ForgeError::BackgroundTooSmall {
            path: id,
            message: format!(
                "{bw}x{bh} cannot cover the {}x{} text extent",
                text_surface.width(),
                text_surface.height()
            ),
            severe: true,
        });
    }
    if bw < canvas_w || bh < canvas_h {
        return Err(ForgeError::BackgroundTooSmall {
            path: id,
            message: format!("{bw}x{bh} smaller than the {canvas_w}x{canvas_h} canvas"),
            severe: false,
        });
    }

    let x0 = if bw > canvas_w {
        rng.gen_range(0..=bw - canvas_w)
    } else {
        0
    };
    let y0 = if bh > canvas_h {
        rng.gen_range(0..=bh - canvas_h)
    } else {
        0
    };
    Ok(image::imageops::crop_imm(&loaded, x0, y0, canvas_w, canvas_h).to_image())
}
