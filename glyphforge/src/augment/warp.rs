//! Displacement fields and bilinear remapping for the nonlinear warps.
//!
//! Fields are stored as per-pixel offsets in sampling direction: output pixel
//! `(x, y)` reads the input at `(x + dx, y + dy)`.

use image::{Rgba, RgbaImage};
use rand::Rng;
use rand::rngs::StdRng;

use crate::foundation::core::CharacterBox;

/// Elastic field: white noise in [-1, 1], Gaussian-smoothed with width
/// `sigma`, scaled by `alpha`.
pub(crate) fn elastic_field(
    (w, h): (u32, u32),
    alpha: f64,
    sigma: f64,
    rng: &mut StdRng,
) -> (Vec<f32>, Vec<f32>) {
    let n = (w * h) as usize;
    let mut dx: Vec<f32> = (0..n).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let mut dy: Vec<f32> = (0..n).map(|_| rng.gen_range(-1.0f32..1.0)).collect();

    smooth_field(&mut dx, w, h, sigma as f32);
    smooth_field(&mut dy, w, h, sigma as f32);

    for v in dx.iter_mut().chain(dy.iter_mut()) {
        *v *= alpha as f32;
    }
    (dx, dy)
}

/// Grid field: a `steps x steps` lattice of random offsets in
/// `[-limit, limit]`, interpolated bicubically over the pixel grid.
pub(crate) fn grid_field(
    (w, h): (u32, u32),
    steps: u32,
    limit: f64,
    rng: &mut StdRng,
) -> (Vec<f32>, Vec<f32>) {
    let s = steps as usize;
    let limit = limit as f32;
    let node_dx: Vec<f32> = (0..s * s).map(|_| rng.gen_range(-limit..=limit)).collect();
    let node_dy: Vec<f32> = (0..s * s).map(|_| rng.gen_range(-limit..=limit)).collect();

    let n = (w * h) as usize;
    let mut dx = vec![0f32; n];
    let mut dy = vec![0f32; n];
    for y in 0..h {
        for x in 0..w {
            let gx = x as f32 / (w.max(2) - 1) as f32 * (s - 1) as f32;
            let gy = y as f32 / (h.max(2) - 1) as f32 * (s - 1) as f32;
            let i = (y * w + x) as usize;
            dx[i] = bicubic(&node_dx, s, gx, gy);
            dy[i] = bicubic(&node_dy, s, gx, gy);
        }
    }
    (dx, dy)
}

/// Radial barrel distortion with a single coefficient `k`:
/// sampling radius `r_in = r_out * (1 + k * r_out^2)` in normalized coords.
pub(crate) fn optical_field((w, h): (u32, u32), k: f64) -> (Vec<f32>, Vec<f32>) {
    let n = (w * h) as usize;
    let mut dx = vec![0f32; n];
    let mut dy = vec![0f32; n];
    let (cx, cy) = (f64::from(w) / 2.0, f64::from(h) / 2.0);

    for y in 0..h {
        for x in 0..w {
            let xn = (f64::from(x) - cx) / cx.max(1.0);
            let yn = (f64::from(y) - cy) / cy.max(1.0);
            let r2 = xn * xn + yn * yn;
            let factor = 1.0 + k * r2;
            let sx = cx + xn * factor * cx.max(1.0);
            let sy = cy + yn * factor * cy.max(1.0);
            let i = (y * w + x) as usize;
            dx[i] = (sx - f64::from(x)) as f32;
            dy[i] = (sy - f64::from(y)) as f32;
        }
    }
    (dx, dy)
}

/// Bilinear remap of the whole surface through a displacement field, with a
/// transparent border.
pub(crate) fn remap(src: &RgbaImage, dx: &[f32], dy: &[f32]) -> RgbaImage {
    let (w, h) = src.dimensions();
    let mut out = RgbaImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let i = (y * w + x) as usize;
            let px = sample_bilinear(src, x as f32 + dx[i], y as f32 + dy[i]);
            out.put_pixel(x, y, px);
        }
    }
    out
}

/// Recompute one character box under a displacement field.
///
/// The glyph's pre-warp region is isolated, remapped through the same field
/// (sampling only inside the region, as if it were cropped out), and the new
/// ink box is read back. `None` means the ink vanished.
pub(crate) fn recompute_box(
    original: &RgbaImage,
    b: &CharacterBox,
    dx: &[f32],
    dy: &[f32],
) -> Option<CharacterBox> {
    let (w, h) = original.dimensions();
    let x0 = b.x0.clamp(0, w as i32);
    let y0 = b.y0.clamp(0, h as i32);
    let x1 = b.x1.clamp(0, w as i32);
    let y1 = b.y1.clamp(0, h as i32);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let mut min_x = i32::MAX;
    let mut min_y = i32::MAX;
    let mut max_x = i32::MIN;
    let mut max_y = i32::MIN;

    for y in y0..y1 {
        for x in x0..x1 {
            let i = (y as u32 * w + x as u32) as usize;
            let sx = x as f32 + dx[i];
            let sy = y as f32 + dy[i];
            // Sampling outside the glyph's own region reads neighbors'
            // ink; the crop contract treats that as empty.
            if sx < x0 as f32 || sx >= x1 as f32 || sy < y0 as f32 || sy >= y1 as f32 {
                continue;
            }
            let alpha = sample_bilinear(original, sx, sy).0[3];
            if alpha > 0 {
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }

    if min_x > max_x || min_y > max_y {
        return None;
    }
    let mut updated = b.clone();
    updated.x0 = min_x;
    updated.y0 = min_y;
    updated.x1 = max_x + 1;
    updated.y1 = max_y + 1;
    Some(updated)
}

fn sample_bilinear(src: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let (w, h) = src.dimensions();
    if x < -1.0 || y < -1.0 || x > w as f32 || y > h as f32 {
        return Rgba([0; 4]);
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let pixel = |ix: f32, iy: f32| -> [f32; 4] {
        if ix < 0.0 || iy < 0.0 || ix >= w as f32 || iy >= h as f32 {
            [0.0; 4]
        } else {
            let p = src.get_pixel(ix as u32, iy as u32).0;
            [
                f32::from(p[0]),
                f32::from(p[1]),
                f32::from(p[2]),
                f32::from(p[3]),
            ]
        }
    };

    let p00 = pixel(x0, y0);
    let p10 = pixel(x0 + 1.0, y0);
    let p01 = pixel(x0, y0 + 1.0);
    let p11 = pixel(x0 + 1.0, y0 + 1.0);

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// Separable Gaussian smoothing of a float field, reflective edges.
fn smooth_field(field: &mut [f32], w: u32, h: u32, sigma: f32) {
    if sigma <= 0.0 {
        return;
    }
    let radius = (sigma * 3.0).ceil().max(1.0) as i32;
    let mut kernel = Vec::with_capacity((2 * radius + 1) as usize);
    let denom = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;
    for i in -radius..=radius {
        let v = (-(i as f32).powi(2) / denom).exp();
        kernel.push(v);
        sum += v;
    }
    for v in &mut kernel {
        *v /= sum;
    }

    let (wi, hi) = (w as i32, h as i32);
    let mut tmp = vec![0f32; field.len()];
    for y in 0..hi {
        for x in 0..wi {
            let mut acc = 0.0;
            for (ki, kv) in kernel.iter().enumerate() {
                let sx = (x + ki as i32 - radius).clamp(0, wi - 1);
                acc += kv * field[(y * wi + sx) as usize];
            }
            tmp[(y * wi + x) as usize] = acc;
        }
    }
    for y in 0..hi {
        for x in 0..wi {
            let mut acc = 0.0;
            for (ki, kv) in kernel.iter().enumerate() {
                let sy = (y + ki as i32 - radius).clamp(0, hi - 1);
                acc += kv * tmp[(sy * wi + x) as usize];
            }
            field[(y * wi + x) as usize] = acc;
        }
    }
}

/// Catmull-Rom bicubic interpolation over a square node lattice.
fn bicubic(nodes: &[f32], size: usize, gx: f32, gy: f32) -> f32 {
    let clamp_node = |ix: i32, iy: i32| -> f32 {
        let cx = ix.clamp(0, size as i32 - 1) as usize;
        let cy = iy.clamp(0, size as i32 - 1) as usize;
        nodes[cy * size + cx]
    };

    let x0 = gx.floor() as i32;
    let y0 = gy.floor() as i32;
    let fx = gx - x0 as f32;
    let fy = gy - y0 as f32;

    let mut rows = [0f32; 4];
    for (r, row) in rows.iter_mut().enumerate() {
        let iy = y0 - 1 + r as i32;
        let p = [
            clamp_node(x0 - 1, iy),
            clamp_node(x0, iy),
            clamp_node(x0 + 1, iy),
            clamp_node(x0 + 2, iy),
        ];
        *row = catmull_rom(p, fx);
    }
    catmull_rom(rows, fy)
}

fn catmull_rom(p: [f32; 4], t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p[1])
        + (-p[0] + p[2]) * t
        + (2.0 * p[0] - 5.0 * p[1] + 4.0 * p[2] - p[3]) * t2
        + (-p[0] + 3.0 * p[1] - 3.0 * p[2] + p[3]) * t3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(5)
    }

    #[test]
    fn zero_field_remap_is_identity() {
        let mut img = RgbaImage::new(8, 8);
        img.put_pixel(3, 4, Rgba([10, 20, 30, 255]));
        let n = 64;
        let out = remap(&img, &vec![0.0; n], &vec![0.0; n]);
        assert_eq!(out.as_raw(), img.as_raw());
    }

    #[test]
    fn constant_field_translates_content() {
        let mut img = RgbaImage::new(8, 8);
        img.put_pixel(4, 4, Rgba([255, 0, 0, 255]));
        let n = 64;
        // Sampling at +2 in x pulls content 2 px to the left.
        let out = remap(&img, &vec![2.0; n], &vec![0.0; n]);
        assert_eq!(out.get_pixel(2, 4).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(4, 4).0[3], 0);
    }

    #[test]
    fn elastic_field_strength_scales_with_alpha() {
        let dims = (16, 16);
        let (dx, _) = elastic_field(dims, 4.0, 2.0, &mut rng());
        let max = dx.iter().fold(0f32, |m, v| m.max(v.abs()));
        assert!(max > 0.0 && max <= 4.0);
    }

    #[test]
    fn grid_field_respects_limit() {
        let (dx, dy) = grid_field((20, 20), 4, 1.5, &mut rng());
        // Catmull-Rom can overshoot node values slightly; allow a margin.
        for v in dx.iter().chain(dy.iter()) {
            assert!(v.abs() <= 1.5 * 1.4, "offset {v} exceeds limit overshoot");
        }
    }

    #[test]
    fn optical_field_is_zero_at_center() {
        let (dx, dy) = optical_field((21, 21), 0.3);
        let center = (10 * 21 + 10) as usize;
        assert!(dx[center].abs() < 0.51);
        assert!(dy[center].abs() < 0.51);
    }

    #[test]
    fn recompute_box_tracks_translated_ink() {
        let mut img = RgbaImage::new(20, 20);
        for y in 8..12 {
            for x in 8..12 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let b = CharacterBox::new('x', 4, 4, 16, 16);
        let n = 400;
        let updated = recompute_box(&img, &b, &vec![1.5; n], &vec![0.0; n]).unwrap();
        // Ink observed shifted left by ~2 px inside the region.
        assert!(updated.x0 <= 7 && updated.x1 <= 12);
        assert!(updated.width() >= 3);
    }

    #[test]
    fn recompute_box_reports_vanished_ink() {
        let img = RgbaImage::new(20, 20);
        let b = CharacterBox::new('x', 2, 2, 10, 10);
        let n = 400;
        assert!(recompute_box(&img, &b, &vec![0.0; n], &vec![0.0; n]).is_none());
    }
}
