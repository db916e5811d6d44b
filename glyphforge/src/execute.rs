//! Deterministic plan execution.
//!
//! Layout, shaping, effects, augmentation and canvas composition run in a
//! fixed order, each consuming only parameters recorded in the plan and RNG
//! streams derived from the plan seed. Executing the same plan twice in one
//! process is byte-identical.

use image::RgbaImage;

use crate::augment::AugmentOutcome;
use crate::foundation::core::CharacterBox;
use crate::foundation::error::{ForgeError, ForgeResult};
use crate::plan::Plan;
use crate::shape::FontSource;

pub struct GenerationOutput {
    pub image: RgbaImage,
    pub boxes: Vec<CharacterBox>,
    pub lines: Vec<String>,
    pub effects_applied: Vec<String>,
    pub augmentations: AugmentOutcome,
    /// `BackgroundTooSmall` observed during composition, if any. The image
    /// already used the solid fallback; the scheduler penalizes the file.
    pub background_error: Option<ForgeError>,
}

/// Run the full pipeline for one plan.
pub fn generate_from_plan(plan: &Plan, fonts: &dyn FontSource) -> ForgeResult<GenerationOutput> {
    let engine = fonts.open(&plan.font_path)?;

    let shaped = crate::shape::render(plan, engine.as_ref())?;
    let mut surface = shaped.surface;

    let effects_applied = crate::effects::apply_all(&mut surface, plan)?;
    let (surface, boxes, augmentations) =
        crate::augment::apply_all(surface, shaped.boxes, plan)?;
    let composed = crate::canvas::compose(&surface, boxes, plan)?;

    let lines = crate::layout::break_into_lines(&plan.text, plan.num_lines, plan.line_break);

    Ok(GenerationOutput {
        image: composed.image,
        boxes: composed.boxes,
        lines,
        effects_applied,
        augmentations,
        background_error: composed.background_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CurveType;
    use crate::foundation::core::Direction;
    use crate::shape::bidi;
    use crate::testkit::{BlockFontSource, test_plan};

    #[test]
    fn executing_twice_is_byte_identical() {
        let mut plan = test_plan("Hello determinism", Direction::LeftToRight);
        plan.effects.noise_density = 0.01;
        plan.effects.blur_sigma = 0.6;
        plan.augment.rotation_deg = 7.0;

        let fonts = BlockFontSource::new();
        let a = generate_from_plan(&plan, &fonts).unwrap();
        let b = generate_from_plan(&plan, &fonts).unwrap();
        assert_eq!(a.image.as_raw(), b.image.as_raw());
        assert_eq!(a.boxes, b.boxes);
        assert_eq!(a.effects_applied, b.effects_applied);
    }

    #[test]
    fn simple_ltr_scenario_produces_ordered_contiguous_boxes() {
        let plan = test_plan("Hello", Direction::LeftToRight);
        let out = generate_from_plan(&plan, &BlockFontSource::new()).unwrap();

        assert_eq!(out.image.dimensions(), (300, 150));
        assert_eq!(out.boxes.len(), 5);
        for (i, b) in out.boxes.iter().enumerate() {
            assert_eq!(b.line_index, 0);
            if i > 0 {
                assert!(b.x0 > out.boxes[i - 1].x0);
                // Contiguous up to the advance-vs-ink gap of the font.
                assert!(b.x0 <= out.boxes[i - 1].x1 + 4);
            }
        }
    }

    #[test]
    fn bbox_count_matches_visual_text_without_warps() {
        for text in ["Hello", "a b c", "שלום"] {
            for dir in [Direction::LeftToRight, Direction::RightToLeft] {
                let plan = test_plan(text, dir);
                let out = generate_from_plan(&plan, &BlockFontSource::new()).unwrap();
                let visual = bidi::to_visual(text, dir);
                assert_eq!(out.boxes.len(), visual.chars().count(), "{text} {dir:?}");
            }
        }
    }

    #[test]
    fn rtl_rightmost_box_leads_the_list() {
        let plan = test_plan("שלום", Direction::RightToLeft);
        let out = generate_from_plan(&plan, &BlockFontSource::new()).unwrap();
        // Visual order means the list is still left-to-right in pixels, but
        // the characters are reordered; the first logical char ends up last.
        let rendered: String = out.boxes.iter().map(|b| b.ch).collect();
        assert_eq!(rendered, bidi::to_visual("שלום", Direction::RightToLeft));
    }

    #[test]
    fn multiline_output_reports_resolved_lines() {
        let mut plan = test_plan("Hello world testing", Direction::LeftToRight);
        plan.num_lines = 2;
        plan.canvas_width = 400;
        plan.canvas_height = 300;
        let out = generate_from_plan(&plan, &BlockFontSource::new()).unwrap();

        assert_eq!(out.lines, vec!["Hello world", "testing"]);
        assert!(out.boxes.iter().any(|b| b.line_index == 1));
    }

    #[test]
    fn curve_parameters_flow_through() {
        let mut plan = test_plan("東京都", Direction::TopToBottom);
        plan.curve_type = CurveType::Arc;
        plan.curve_intensity = 0.4;
        plan.curve_concave = true;
        plan.canvas_width = 400;
        plan.canvas_height = 400;

        let out = generate_from_plan(&plan, &BlockFontSource::new()).unwrap();
        assert_eq!(out.boxes.len(), 3);
        let ys: Vec<i32> = out.boxes.iter().map(|b| (b.y0 + b.y1) / 2).collect();
        assert!(ys[0] < ys[1] && ys[1] < ys[2]);
    }
}
