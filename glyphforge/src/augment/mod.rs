//! Geometric augmentations that jointly transform pixels and character
//! boxes.
//!
//! Stage order is fixed: rotation, perspective, elastic, grid, optical.
//! Rotation and perspective map boxes corner-wise through the same matrix as
//! the pixels; the nonlinear warps recompute each box by remapping the
//! glyph's own region and re-reading the ink box.

mod warp;

use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use rand::Rng;
use rand::rngs::StdRng;
use smallvec::SmallVec;

use crate::foundation::core::CharacterBox;
use crate::foundation::error::ForgeResult;
use crate::plan::{AugmentPlan, Plan};

/// What the augmenter did to one image, recorded in the label.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AugmentOutcome {
    pub applied: Vec<String>,
    /// Visual-order indices of glyphs whose ink vanished under a warp.
    pub occluded: Vec<usize>,
}

/// Axis-aligned hull of a `w x h` rectangle rotated by `deg`.
pub(crate) fn rotated_hull_dims(w: u32, h: u32, deg: f64) -> (u32, u32) {
    let theta = deg.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let (wf, hf) = (f64::from(w), f64::from(h));
    (
        (wf * cos + hf * sin).ceil().max(1.0) as u32,
        (wf * sin + hf * cos).ceil().max(1.0) as u32,
    )
}

/// Worst-case post-augmentation extent for a text surface; the planner sizes
/// the canvas against this.
pub fn expanded_dims(w: u32, h: u32, augment: &AugmentPlan) -> (u32, u32) {
    if augment.rotation_deg != 0.0 {
        rotated_hull_dims(w, h, augment.rotation_deg)
    } else {
        (w, h)
    }
}

/// Run the plan's augmentation stages over the surface and its boxes.
pub fn apply_all(
    surface: RgbaImage,
    boxes: Vec<CharacterBox>,
    plan: &Plan,
) -> ForgeResult<(RgbaImage, Vec<CharacterBox>, AugmentOutcome)> {
    let mut rng = plan.stream_rng("augment");
    let mut outcome = AugmentOutcome::default();
    let a = &plan.augment;

    let mut surface = surface;
    let mut boxes = boxes;

    if a.rotation_deg != 0.0 {
        (surface, boxes) = rotate(surface, boxes, a.rotation_deg);
        outcome.applied.push("rotation".to_owned());
    }

    if a.perspective > 0.0 {
        if let Some((s, b)) = perspective(&surface, &boxes, a.perspective, &mut rng) {
            surface = s;
            boxes = b;
            outcome.applied.push("perspective".to_owned());
        }
    }

    if a.elastic_alpha > 0.0 {
        let (dx, dy) = warp::elastic_field(
            surface.dimensions(),
            a.elastic_alpha,
            a.elastic_sigma,
            &mut rng,
        );
        let dropped = remap_stage(&mut surface, &mut boxes, &dx, &dy);
        outcome.occluded.extend(dropped);
        outcome.applied.push("elastic".to_owned());
    }

    if a.grid_steps >= 2 && a.grid_limit > 0.0 {
        let (dx, dy) = warp::grid_field(
            surface.dimensions(),
            a.grid_steps,
            a.grid_limit,
            &mut rng,
        );
        let dropped = remap_stage(&mut surface, &mut boxes, &dx, &dy);
        outcome.occluded.extend(dropped);
        outcome.applied.push("grid".to_owned());
    }

    if a.optical != 0.0 {
        let (dx, dy) = warp::optical_field(surface.dimensions(), a.optical);
        let dropped = remap_stage(&mut surface, &mut boxes, &dx, &dy);
        outcome.occluded.extend(dropped);
        outcome.applied.push("optical".to_owned());
    }

    // Every surviving box lies inside the image or is clipped and flagged.
    let (w, h) = surface.dimensions();
    let mut kept = Vec::with_capacity(boxes.len());
    for (i, mut b) in boxes.into_iter().enumerate() {
        if b.clip_to(w, h) {
            kept.push(b);
        } else {
            outcome.occluded.push(i);
        }
    }
    outcome.occluded.sort_unstable();
    outcome.occluded.dedup();

    Ok((surface, kept, outcome))
}

/// Rotate about the surface center, expanding the canvas to the hull.
fn rotate(
    surface: RgbaImage,
    mut boxes: Vec<CharacterBox>,
    deg: f64,
) -> (RgbaImage, Vec<CharacterBox>) {
    let (w, h) = surface.dimensions();
    let (new_w, new_h) = rotated_hull_dims(w, h, deg);
    let theta = deg.to_radians() as f32;

    let forward = Projection::translate(new_w as f32 / 2.0, new_h as f32 / 2.0)
        * Projection::rotate(theta)
        * Projection::translate(-(w as f32) / 2.0, -(h as f32) / 2.0);

    let mut out = RgbaImage::new(new_w, new_h);
    warp_into(
        &surface,
        &forward.invert(),
        Interpolation::Bilinear,
        Rgba([0; 4]),
        &mut out,
    );

    for b in &mut boxes {
        let corners: SmallVec<[(f32, f32); 4]> =
            b.corners().iter().map(|&p| forward * p).collect();
        b.set_from_hull(&corners);
    }
    (out, boxes)
}

/// Random projective warp: image corners pulled inward by up to
/// `magnitude * min(W, H) / 2` pixels each.
fn perspective(
    surface: &RgbaImage,
    boxes: &[CharacterBox],
    magnitude: f64,
    rng: &mut StdRng,
) -> Option<(RgbaImage, Vec<CharacterBox>)> {
    let (w, h) = surface.dimensions();
    let (wf, hf) = (w as f32, h as f32);
    let max_offset = (magnitude * f64::from(w.min(h)) / 2.0) as f32;
    if max_offset < 1.0 {
        return None;
    }

    let mut pull = || rng.gen_range(0.0..max_offset);
    let src = [(0.0, 0.0), (wf, 0.0), (wf, hf), (0.0, hf)];
    let dst = [
        (pull(), pull()),
        (wf - pull(), pull()),
        (wf - pull(), hf - pull()),
        (pull(), hf - pull()),
    ];

    let forward = Projection::from_control_points(src, dst)?;

    let mut out = RgbaImage::new(w, h);
    warp_into(
        surface,
        &forward.invert(),
        Interpolation::Bilinear,
        Rgba([0; 4]),
        &mut out,
    );

    let mut new_boxes = boxes.to_vec();
    for b in &mut new_boxes {
        let corners: SmallVec<[(f32, f32); 4]> =
            b.corners().iter().map(|&p| forward * p).collect();
        b.set_from_hull(&corners);
    }
    Some((out, new_boxes))
}

/// Remap pixels through a displacement field and robustly recompute every
/// box from its own remapped ink. Returns indices of boxes whose ink
/// vanished.
fn remap_stage(
    surface: &mut RgbaImage,
    boxes: &mut Vec<CharacterBox>,
    dx: &[f32],
    dy: &[f32],
) -> Vec<usize> {
    let original = surface.clone();
    *surface = warp::remap(&original, dx, dy);

    let mut dropped = Vec::new();
    let mut survivors = Vec::with_capacity(boxes.len());
    for (i, b) in boxes.iter().enumerate() {
        match warp::recompute_box(&original, b, dx, dy) {
            Some(updated) => survivors.push(updated),
            None => dropped.push(i),
        }
    }
    *boxes = survivors;
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::Direction;
    use crate::testkit::{BlockFont, test_plan};

    fn shaped(text: &str) -> (RgbaImage, Vec<CharacterBox>) {
        let plan = test_plan(text, Direction::LeftToRight);
        let out = crate::shape::render(&plan, &BlockFont::default()).unwrap();
        (out.surface, out.boxes)
    }

    #[test]
    fn no_op_augment_is_identity() {
        let (surface, boxes) = shaped("Hi");
        let plan = test_plan("Hi", Direction::LeftToRight);
        let (s, b, outcome) = apply_all(surface.clone(), boxes.clone(), &plan).unwrap();
        assert_eq!(s.as_raw(), surface.as_raw());
        assert_eq!(b, boxes);
        assert!(outcome.applied.is_empty());
        assert!(outcome.occluded.is_empty());
    }

    #[test]
    fn rotation_90_swaps_hull_dimensions() {
        assert_eq!(rotated_hull_dims(100, 40, 90.0), (40, 100));
        let (w, h) = rotated_hull_dims(100, 40, 45.0);
        assert!(w > 90 && h > 90);
    }

    #[test]
    fn rotation_keeps_boxes_inside_expanded_surface() {
        let (surface, boxes) = shaped("Hello");
        let mut plan = test_plan("Hello", Direction::LeftToRight);
        plan.augment.rotation_deg = 30.0;
        let (s, b, outcome) = apply_all(surface, boxes, &plan).unwrap();

        assert_eq!(outcome.applied, vec!["rotation"]);
        assert_eq!(b.len(), 5);
        for bx in &b {
            assert!(bx.x0 >= 0 && bx.y0 >= 0);
            assert!(bx.x1 <= s.width() as i32 && bx.y1 <= s.height() as i32);
        }
    }

    #[test]
    fn rotation_moves_ink_with_boxes() {
        let (surface, boxes) = shaped("g");
        let mut plan = test_plan("g", Direction::LeftToRight);
        plan.augment.rotation_deg = 17.0;
        let (s, b, _) = apply_all(surface, boxes, &plan).unwrap();

        // All ink must fall inside the transformed box.
        let bx = &b[0];
        for (x, y, px) in s.enumerate_pixels() {
            if px.0[3] > 8 {
                assert!(
                    (x as i32) >= bx.x0 - 1
                        && (x as i32) <= bx.x1 + 1
                        && (y as i32) >= bx.y0 - 1
                        && (y as i32) <= bx.y1 + 1,
                    "ink at ({x}, {y}) outside box {bx:?}"
                );
            }
        }
    }

    #[test]
    fn perspective_is_deterministic_for_a_seed() {
        let (surface, boxes) = shaped("Hello");
        let mut plan = test_plan("Hello", Direction::LeftToRight);
        plan.augment.perspective = 0.2;
        let (s1, b1, _) = apply_all(surface.clone(), boxes.clone(), &plan).unwrap();
        let (s2, b2, _) = apply_all(surface, boxes, &plan).unwrap();
        assert_eq!(s1.as_raw(), s2.as_raw());
        assert_eq!(b1, b2);
    }

    #[test]
    fn elastic_recomputes_boxes_from_ink() {
        let (surface, boxes) = shaped("Hello");
        let mut plan = test_plan("Hello", Direction::LeftToRight);
        plan.augment.elastic_alpha = 3.0;
        plan.augment.elastic_sigma = 5.0;
        let (s, b, outcome) = apply_all(surface, boxes, &plan).unwrap();

        assert_eq!(outcome.applied, vec!["elastic"]);
        assert_eq!(b.len() + outcome.occluded.len(), 5);
        for bx in &b {
            assert!(bx.width() > 0 && bx.height() > 0);
            assert!(bx.x1 <= s.width() as i32 && bx.y1 <= s.height() as i32);
        }
    }

    #[test]
    fn grid_and_optical_report_their_stages() {
        let (surface, boxes) = shaped("Hello");
        let mut plan = test_plan("Hello", Direction::LeftToRight);
        plan.augment.grid_steps = 4;
        plan.augment.grid_limit = 2.0;
        plan.augment.optical = 0.15;
        let (_, _, outcome) = apply_all(surface, boxes, &plan).unwrap();
        assert_eq!(outcome.applied, vec!["grid", "optical"]);
    }
}
