//! Curved-baseline rendering: arc and sine, all four directions.
//!
//! Each glyph is rasterized onto a padded square tile, rotated to follow the
//! baseline tangent, and composited at the curve coordinates. Its box is the
//! axis-aligned hull of the rotated ink-box corners, which is allowed to be
//! slightly loose.

use std::f64::consts::PI;

use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use smallvec::SmallVec;

use crate::config::CurveType;
use crate::foundation::core::{CharacterBox, Direction};
use crate::plan::Plan;
use crate::shape::font::FontMetrics;
use crate::shape::{LineLayout, MARGIN, color_at, glyph_tile};

pub(crate) fn render(
    line: &LineLayout,
    metrics: &FontMetrics,
    plan: &Plan,
    color_start: usize,
) -> (RgbaImage, Vec<CharacterBox>) {
    let total = f64::from(line.total_advance);
    if total < 2.0 {
        return super::straight::render(line, metrics, plan, color_start);
    }

    let geometry = CurveGeometry::new(line, metrics, plan, total);
    if plan.direction.is_horizontal() {
        render_horizontal(line, plan, color_start, &geometry)
    } else {
        render_vertical(line, plan, color_start, &geometry)
    }
}

/// Shared curve math for one line.
struct CurveGeometry {
    length: f64,
    intensity: f64,
    phase: f64,
    concave: bool,
    curve_type: CurveType,
    /// Arc radius, `max(L / 2i, L)`.
    radius: f64,
    /// Sine amplitude, `max_char_height * i * 1.5`.
    amplitude: f64,
    /// Worst-case deflection away from the midline.
    max_deflection: f64,
    /// Rotated-glyph slack: the diagonal of the largest glyph cell.
    diag: f64,
}

impl CurveGeometry {
    fn new(line: &LineLayout, metrics: &FontMetrics, plan: &Plan, total: f64) -> Self {
        let intensity = plan.curve_intensity.clamp(1e-6, 1.0);
        let radius = (total / (2.0 * intensity)).max(total);
        let amplitude = f64::from(line.max_ink_h.max(1)) * intensity * 1.5;

        let max_deflection = match plan.curve_type {
            CurveType::Arc => {
                let theta_max = (total / 2.0) / radius;
                radius * (1.0 - theta_max.cos())
            }
            // Sine swings a full amplitude to each side of the midline.
            CurveType::Sine => 2.0 * amplitude,
            CurveType::None => 0.0,
        };

        let cell_w = f64::from(line.max_ink_w.max(1));
        let cell_h = f64::from(line.max_ink_h.max(1)).max(f64::from(metrics.height()));
        let diag = (cell_w * cell_w + cell_h * cell_h).sqrt();

        Self {
            length: total,
            intensity,
            phase: plan.curve_phase,
            concave: plan.curve_concave,
            curve_type: plan.curve_type,
            radius,
            amplitude,
            max_deflection,
            diag,
        }
    }

    /// Deflection from the midline and tangent angle at arc position
    /// `s` (measured from the curve midpoint). Deflection is always >= 0;
    /// direction-specific signs are applied by the caller.
    fn sample(&self, s: f64) -> (f64, f64) {
        match self.curve_type {
            CurveType::Arc => {
                let theta = s / self.radius;
                (self.radius * (1.0 - theta.cos()), theta)
            }
            CurveType::Sine => {
                let x = s + self.length / 2.0;
                let freq = 1.0 + self.intensity;
                let mut phase = self.phase;
                if self.concave {
                    phase += PI;
                }
                let arg = 2.0 * PI * freq * x / self.length + phase;
                let offset = self.amplitude * arg.sin();
                let slope = self.amplitude * 2.0 * PI * freq / self.length * arg.cos();
                (offset, slope.atan())
            }
            CurveType::None => (0.0, 0.0),
        }
    }
}

fn render_horizontal(
    line: &LineLayout,
    plan: &Plan,
    color_start: usize,
    geo: &CurveGeometry,
) -> (RgbaImage, Vec<CharacterBox>) {
    let margin = f64::from(MARGIN);
    let width = (geo.length + 2.0 * margin).ceil().max(1.0) as u32;
    let height = (geo.max_deflection + geo.diag + 2.0 * margin)
        .ceil()
        .max(1.0) as u32;

    // Arc smiles anchor near the bottom so the raised ends stay inside the
    // surface; frowns anchor near the top. The sine midline is centered.
    let mid_y = match geo.curve_type {
        CurveType::Sine => f64::from(height) / 2.0,
        _ if geo.concave => f64::from(height) - margin - geo.diag / 2.0,
        _ => margin + geo.diag / 2.0,
    };

    let mut surface = RgbaImage::new(width, height);
    let mut boxes = Vec::with_capacity(line.glyphs.len());
    let mut cursor = 0.0f64;

    for (i, g) in line.glyphs.iter().enumerate() {
        let adv = f64::from(g.advance);
        let center = cursor + adv / 2.0;
        let s = center - geo.length / 2.0;
        let (deflection, tangent) = geo.sample(s);

        let y_center = match geo.curve_type {
            CurveType::Sine => mid_y + deflection,
            _ if geo.concave => mid_y - deflection,
            _ => mid_y + deflection,
        };
        let x_center = margin + center;

        // RTL runs on the mirrored baseline with negated tangent.
        let rot = if plan.direction == Direction::RightToLeft {
            tangent
        } else {
            -tangent
        };

        place_glyph(
            &mut surface,
            &mut boxes,
            g,
            color_at(&plan.glyph_colors, color_start + i),
            x_center,
            y_center,
            rot as f32,
        );
        cursor += adv;
    }

    (surface, boxes)
}

fn render_vertical(
    line: &LineLayout,
    plan: &Plan,
    color_start: usize,
    geo: &CurveGeometry,
) -> (RgbaImage, Vec<CharacterBox>) {
    let margin = f64::from(MARGIN);
    let width = (geo.max_deflection + geo.diag + 2.0 * margin)
        .ceil()
        .max(1.0) as u32;
    let height = (geo.length + 2.0 * margin).ceil().max(1.0) as u32;

    let bottom_to_top = plan.direction == Direction::BottomToTop;
    // Deflection pushes rightward when (concave XOR bottom-to-top); anchor the
    // midline on the opposite edge so ink stays inside the surface.
    let deflect_right = geo.concave != bottom_to_top;
    let mid_x = match geo.curve_type {
        CurveType::Sine => f64::from(width) / 2.0,
        _ if deflect_right => margin + geo.diag / 2.0,
        _ => f64::from(width) - margin - geo.diag / 2.0,
    };

    let mut surface = RgbaImage::new(width, height);
    let mut boxes = Vec::with_capacity(line.glyphs.len());
    let mut cursor = 0.0f64;

    for (i, g) in line.glyphs.iter().enumerate() {
        let adv = f64::from(g.advance);
        let center = cursor + adv / 2.0;
        let s = center - geo.length / 2.0;
        let (deflection, tangent) = geo.sample(s);

        let x_center = match geo.curve_type {
            CurveType::Sine => {
                if bottom_to_top {
                    mid_x - deflection
                } else {
                    mid_x + deflection
                }
            }
            _ if deflect_right => mid_x + deflection,
            _ => mid_x - deflection,
        };
        let y_center = if bottom_to_top {
            f64::from(height) - margin - center
        } else {
            margin + center
        };

        place_glyph(
            &mut surface,
            &mut boxes,
            g,
            color_at(&plan.glyph_colors, color_start + i),
            x_center,
            y_center,
            -tangent as f32,
        );
        cursor += adv;
    }

    (surface, boxes)
}

/// Rotate one glyph tile and composite it centered at `(x_center, y_center)`.
fn place_glyph(
    surface: &mut RgbaImage,
    boxes: &mut Vec<CharacterBox>,
    g: &crate::shape::PlacedGlyph,
    color: crate::foundation::core::Rgb,
    x_center: f64,
    y_center: f64,
    rot: f32,
) {
    let (cell_w, cell_h) = if g.raster.is_blank() {
        (f64::from(g.advance).max(1.0), f64::from(g.advance).max(1.0))
    } else {
        (f64::from(g.raster.width), f64::from(g.raster.height))
    };

    if !g.raster.is_blank() {
        let pad = ((cell_w * cell_w + cell_h * cell_h).sqrt().ceil() as u32 + 2).max(1);
        let mut padded = RgbaImage::new(pad, pad);
        let tile = glyph_tile(&g.raster, color);
        image::imageops::overlay(
            &mut padded,
            &tile,
            i64::from((pad - g.raster.width) / 2),
            i64::from((pad - g.raster.height) / 2),
        );
        let rotated = rotate_about_center(&padded, rot, Interpolation::Bilinear, Rgba([0; 4]));
        image::imageops::overlay(
            surface,
            &rotated,
            (x_center - f64::from(pad) / 2.0).round() as i64,
            (y_center - f64::from(pad) / 2.0).round() as i64,
        );
    }

    let mut b = CharacterBox::new(g.ch, 0, 0, 1, 1);
    b.set_from_hull(&rotated_cell_corners(
        x_center, y_center, cell_w, cell_h, rot,
    ));
    boxes.push(b);
}

fn rotated_cell_corners(
    cx: f64,
    cy: f64,
    w: f64,
    h: f64,
    rot: f32,
) -> SmallVec<[(f32, f32); 4]> {
    let (sin, cos) = f64::from(rot).sin_cos();
    [(-w / 2.0, -h / 2.0), (w / 2.0, -h / 2.0), (w / 2.0, h / 2.0), (-w / 2.0, h / 2.0)]
        .iter()
        .map(|&(dx, dy)| {
            let rx = dx * cos - dy * sin;
            let ry = dx * sin + dy * cos;
            ((cx + rx) as f32, (cy + ry) as f32)
        })
        .collect()
}
