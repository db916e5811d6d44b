//! Per-surface pixel effects, applied in a fixed order on the text surface.
//!
//! Effects are tagged variants applied by one dispatch routine; adding an
//! effect means adding a variant and a match arm. Bounding boxes are never
//! mutated here — everything operates in the text-surface frame.

use image::{Rgba, RgbaImage};
use rand::rngs::StdRng;

use crate::config::{MorphMode, ReliefKind};
use crate::foundation::core::{Rgb, blur_channel};
use crate::foundation::error::ForgeResult;
use crate::plan::Plan;

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    InkBleed { radius: f64, color: Rgb },
    Shadow { depth: f64, azimuth: f64, elevation: f64 },
    Relief { kind: ReliefKind, depth: f64, azimuth: f64, elevation: f64 },
    Noise { density: f64 },
    Blur { sigma: f64 },
    BrightnessContrast { brightness: f64, contrast: f64 },
    Morphology { kernel: u32, mode: MorphMode },
    Cutout { size: u32, fill: Rgb },
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InkBleed { .. } => "ink_bleed",
            Self::Shadow { .. } => "shadow",
            Self::Relief { .. } => "relief",
            Self::Noise { .. } => "noise",
            Self::Blur { .. } => "blur",
            Self::BrightnessContrast { .. } => "brightness_contrast",
            Self::Morphology { .. } => "morphology",
            Self::Cutout { .. } => "cutout",
        }
    }
}

/// Build the active effect list for a plan, in chain order. No-op parameters
/// produce no entry, so the applied-augmentation manifest stays honest.
pub fn effects_from_plan(plan: &Plan) -> Vec<Effect> {
    let e = &plan.effects;
    let ink_color = plan.glyph_colors.first().copied().unwrap_or(Rgb::BLACK);
    let mut out = Vec::new();

    if e.ink_bleed_radius > 0.0 {
        out.push(Effect::InkBleed {
            radius: e.ink_bleed_radius,
            color: ink_color,
        });
    }
    if e.shadow_depth > 0.0 {
        out.push(Effect::Shadow {
            depth: e.shadow_depth,
            azimuth: e.light_azimuth,
            elevation: e.light_elevation,
        });
    }
    if e.relief != ReliefKind::None && e.relief_depth > 0.0 {
        out.push(Effect::Relief {
            kind: e.relief,
            depth: e.relief_depth,
            azimuth: e.light_azimuth,
            elevation: e.light_elevation,
        });
    }
    if e.noise_density > 0.0 {
        out.push(Effect::Noise {
            density: e.noise_density,
        });
    }
    if e.blur_sigma > 0.01 {
        out.push(Effect::Blur {
            sigma: e.blur_sigma,
        });
    }
    if e.brightness != 1.0 || e.contrast != 1.0 {
        out.push(Effect::BrightnessContrast {
            brightness: e.brightness,
            contrast: e.contrast,
        });
    }
    if e.morph_kernel >= 3 {
        out.push(Effect::Morphology {
            kernel: e.morph_kernel,
            mode: e.morph_mode,
        });
    }
    if e.cutout_size > 0 {
        out.push(Effect::Cutout {
            size: e.cutout_size,
            fill: plan.background_color,
        });
    }
    out
}

/// Apply the plan's effect chain in order; returns the applied names for the
/// label manifest.
pub fn apply_all(surface: &mut RgbaImage, plan: &Plan) -> ForgeResult<Vec<String>> {
    let mut rng = plan.stream_rng("effects");
    let effects = effects_from_plan(plan);
    let mut applied = Vec::with_capacity(effects.len());
    for effect in &effects {
        apply(surface, effect, &mut rng)?;
        applied.push(effect.name().to_owned());
    }
    Ok(applied)
}

fn apply(surface: &mut RgbaImage, effect: &Effect, rng: &mut StdRng) -> ForgeResult<()> {
    match *effect {
        Effect::InkBleed { radius, color } => ink_bleed(surface, radius, color),
        Effect::Shadow {
            depth,
            azimuth,
            elevation,
        } => shadow(surface, depth, azimuth, elevation),
        Effect::Relief {
            kind,
            depth,
            azimuth,
            elevation,
        } => relief(surface, kind, depth, azimuth, elevation),
        Effect::Noise { density } => {
            noise(surface, density, rng);
            Ok(())
        }
        Effect::Blur { sigma } => {
            *surface = imageproc::filter::gaussian_blur_f32(surface, sigma as f32);
            Ok(())
        }
        Effect::BrightnessContrast {
            brightness,
            contrast,
        } => {
            brightness_contrast(surface, brightness, contrast);
            Ok(())
        }
        Effect::Morphology { kernel, mode } => {
            morphology(surface, kernel, mode);
            Ok(())
        }
        Effect::Cutout { size, fill } => {
            cutout(surface, size, fill, rng);
            Ok(())
        }
    }
}

fn alpha_of(surface: &RgbaImage) -> Vec<u8> {
    surface.pixels().map(|p| p.0[3]).collect()
}

/// Gaussian blur of the alpha channel, re-composited under the original ink.
fn ink_bleed(surface: &mut RgbaImage, radius: f64, color: Rgb) -> ForgeResult<()> {
    let (w, h) = surface.dimensions();
    let alpha = alpha_of(surface);
    let r = radius.ceil().max(1.0) as u32;
    let sigma = (radius / 2.0).max(0.5) as f32;
    let blurred = blur_channel(&alpha, w, h, r, sigma)?;

    for (i, px) in surface.pixels_mut().enumerate() {
        let bled = blurred[i];
        if bled > px.0[3] {
            if px.0[3] == 0 {
                // Halo gains the dominant ink color at the bled coverage.
                *px = Rgba([color.r, color.g, color.b, bled]);
            } else {
                px.0[3] = bled;
            }
        }
    }
    Ok(())
}

/// Blurred, offset copy of the alpha under the text, shaded by the light
/// direction. Lower elevation throws a longer shadow, capped at 3x.
fn shadow(surface: &mut RgbaImage, depth: f64, azimuth: f64, elevation: f64) -> ForgeResult<()> {
    let (w, h) = surface.dimensions();
    let az = azimuth.to_radians();
    let elev = elevation.clamp(1.0, 89.0).to_radians();

    let offset = depth * 10.0 * (1.0 / elev.tan()).min(3.0);
    let dx = (offset * az.sin()).round() as i64;
    let dy = (offset * az.cos()).round() as i64;

    let alpha = alpha_of(surface);
    let blur_r = (1.0 + depth * 3.0).round() as u32;
    let blurred = blur_channel(&alpha, w, h, blur_r, (1.0 + depth * 3.0) as f32 / 2.0)?;

    let gray = (150.0 - depth * 100.0).clamp(0.0, 255.0) as u8;
    let mut composed = RgbaImage::new(w, h);
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let (sx, sy) = (x - dx, y - dy);
            if (0..w as i64).contains(&sx) && (0..h as i64).contains(&sy) {
                let a = blurred[(sy * w as i64 + sx) as usize];
                if a > 0 {
                    composed.put_pixel(x as u32, y as u32, Rgba([gray, gray, gray, a]));
                }
            }
        }
    }
    image::imageops::overlay(&mut composed, surface, 0, 0);
    *surface = composed;
    Ok(())
}

/// Embossed/engraved relief: the text mask shifted toward and away from the
/// light, blurred, and composited as white highlight and black shade.
/// Engraving inverts the light direction. Raised relief reuses the shadow
/// kernel with its own depth.
fn relief(
    surface: &mut RgbaImage,
    kind: ReliefKind,
    depth: f64,
    azimuth: f64,
    elevation: f64,
) -> ForgeResult<()> {
    let azimuth = match kind {
        ReliefKind::Raised => return shadow(surface, depth, azimuth, elevation),
        ReliefKind::Engraved => (azimuth + 180.0) % 360.0,
        _ => azimuth,
    };

    let (w, h) = surface.dimensions();
    let az = azimuth.to_radians();
    let el = elevation.to_radians();
    let offset = 2.0 + (depth * 3.0).round();
    let hx = (offset * az.sin() * el.cos()).round() as i64;
    let hy = (offset * az.cos() * el.cos()).round() as i64;

    let alpha = alpha_of(surface);
    let shifted = |dx: i64, dy: i64| -> ForgeResult<Vec<u8>> {
        let mut out = vec![0u8; (w * h) as usize];
        for y in 0..h as i64 {
            for x in 0..w as i64 {
                let (sx, sy) = (x - dx, y - dy);
                if (0..w as i64).contains(&sx) && (0..h as i64).contains(&sy) {
                    out[(y * w as i64 + x) as usize] = alpha[(sy * w as i64 + sx) as usize];
                }
            }
        }
        blur_channel(&out, w, h, 2, 1.5)
    };

    let highlight = shifted(hx, hy)?;
    let shade = shifted(-hx, -hy)?;

    let original = surface.clone();
    for (i, px) in surface.pixels_mut().enumerate() {
        let sh = (f64::from(shade[i]) * depth) as u8;
        if sh > 0 {
            *px = over(*px, Rgba([0, 0, 0, sh]));
        }
        let hl = (f64::from(highlight[i]) * depth * 0.7) as u8;
        if hl > 0 {
            *px = over(*px, Rgba([255, 255, 255, hl]));
        }
    }
    image::imageops::overlay(surface, &original, 0, 0);
    Ok(())
}

/// Straight-alpha source-over blend of one pixel.
fn over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = u32::from(src.0[3]);
    if sa == 0 {
        return dst;
    }
    let da = u32::from(dst.0[3]);
    let inv = 255 - sa;
    let out_a = sa + da * inv / 255;
    if out_a == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let sc = u32::from(src.0[c]);
        let dc = u32::from(dst.0[c]);
        out[c] = ((sc * sa + dc * da * inv / 255) / out_a) as u8;
    }
    out[3] = out_a as u8;
    Rgba(out)
}

/// Salt-and-pepper noise: exactly `floor(density * W * H)` distinct pixels,
/// half set to black and half to white.
fn noise(surface: &mut RgbaImage, density: f64, rng: &mut StdRng) {
    let (w, h) = surface.dimensions();
    let total = (w * h) as usize;
    let count = ((density * total as f64).floor() as usize).min(total);
    if count == 0 {
        return;
    }

    let picks = rand::seq::index::sample(rng, total, count);
    for (i, idx) in picks.iter().enumerate() {
        let v = if i < count / 2 { 0u8 } else { 255u8 };
        let (x, y) = ((idx % w as usize) as u32, (idx / w as usize) as u32);
        surface.put_pixel(x, y, Rgba([v, v, v, 255]));
    }
}

fn brightness_contrast(surface: &mut RgbaImage, brightness: f64, contrast: f64) {
    for px in surface.pixels_mut() {
        for c in 0..3 {
            let v = f64::from(px.0[c]);
            let adjusted = ((v - 128.0) * contrast + 128.0) * brightness;
            px.0[c] = adjusted.clamp(0.0, 255.0) as u8;
        }
    }
}

/// Square-window min/max filter on the alpha channel: erode thins strokes,
/// dilate fattens them.
fn morphology(surface: &mut RgbaImage, kernel: u32, mode: MorphMode) {
    let (w, h) = surface.dimensions();
    let alpha = alpha_of(surface);
    let r = (kernel / 2) as i64;

    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let mut acc = match mode {
                MorphMode::Erode => u8::MAX,
                MorphMode::Dilate => 0,
            };
            for dy in -r..=r {
                for dx in -r..=r {
                    let (sx, sy) = ((x + dx).clamp(0, w as i64 - 1), (y + dy).clamp(0, h as i64 - 1));
                    let a = alpha[(sy * w as i64 + sx) as usize];
                    acc = match mode {
                        MorphMode::Erode => acc.min(a),
                        MorphMode::Dilate => acc.max(a),
                    };
                }
            }
            let px = surface.get_pixel_mut(x as u32, y as u32);
            if mode == MorphMode::Dilate && px.0[3] == 0 && acc > 0 {
                // Newly covered pixels need ink, not colored transparency.
                *px = Rgba([0, 0, 0, acc]);
            } else {
                px.0[3] = acc;
            }
        }
    }
}

fn cutout(surface: &mut RgbaImage, size: u32, fill: Rgb, rng: &mut StdRng) {
    use rand::Rng;
    let (w, h) = surface.dimensions();
    let size = size.min(w).min(h);
    if size == 0 {
        return;
    }
    let x0 = rng.gen_range(0..=w - size);
    let y0 = rng.gen_range(0..=h - size);
    for y in y0..y0 + size {
        for x in x0..x0 + size {
            surface.put_pixel(x, y, Rgba([fill.r, fill.g, fill.b, 255]));
        }
    }
}
