//! Label records written alongside each image.
//!
//! The record embeds the full plan (the ground truth that produced the image)
//! plus the observed geometry. The schema is additive-only: every curve and
//! color key is present in every record, zeroed when unused, so downstream
//! consumers never branch on configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::augment::AugmentOutcome;
use crate::execute::GenerationOutput;
use crate::foundation::core::CharacterBox;
use crate::foundation::error::{ForgeError, ForgeResult};
use crate::plan::Plan;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    #[serde(flatten)]
    pub plan: Plan,
    /// Text after line breaking, one entry per rendered line.
    pub lines: Vec<String>,
    pub canvas_size: [u32; 2],
    pub text_placement: [u32; 2],
    pub effects_applied: Vec<String>,
    pub augmentations: AugmentOutcome,
    pub bboxes: Vec<CharacterBox>,
}

impl GenerationRecord {
    pub fn new(plan: &Plan, output: &GenerationOutput) -> Self {
        Self {
            plan: plan.clone(),
            lines: output.lines.clone(),
            canvas_size: [output.image.width(), output.image.height()],
            text_placement: [plan.placement_x, plan.placement_y],
            effects_applied: output.effects_applied.clone(),
            augmentations: output.augmentations.clone(),
            bboxes: output.boxes.clone(),
        }
    }

    /// The embedded plan; re-executing it reproduces the image.
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn to_json(&self) -> ForgeResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ForgeError::invariant(format!("label serialization: {e}")))
    }

    pub fn write_to(&self, path: &Path) -> ForgeResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> ForgeResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| ForgeError::invariant(format!("label parse '{}': {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execute::generate_from_plan;
    use crate::foundation::core::Direction;
    use crate::testkit::{BlockFontSource, test_plan};

    fn record_for(text: &str) -> GenerationRecord {
        let plan = test_plan(text, Direction::LeftToRight);
        let out = generate_from_plan(&plan, &BlockFontSource::new()).unwrap();
        GenerationRecord::new(&plan, &out)
    }

    #[test]
    fn schema_has_every_required_key_even_when_unused() {
        let record = record_for("Hello");
        let json: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();

        for key in [
            "text",
            "lines",
            "num_lines",
            "line_spacing",
            "line_break_mode",
            "text_alignment",
            "direction",
            "font_path",
            "font_size",
            "curve_type",
            "curve_intensity",
            "curve_phase",
            "curve_concave",
            "color_mode",
            "glyph_colors",
            "background_color",
            "canvas_size",
            "text_placement",
            "effects_applied",
            "augmentations",
            "bboxes",
            "seed",
        ] {
            assert!(json.get(key).is_some(), "missing key '{key}'");
        }

        // Curve keys are zeroed, not absent, when curve_type is none.
        assert_eq!(json["curve_type"], "none");
        assert_eq!(json["curve_intensity"], 0.0);
        assert_eq!(json["curve_phase"], 0.0);
        assert_eq!(json["curve_concave"], false);
    }

    #[test]
    fn every_bbox_carries_line_index() {
        let record = record_for("Hello");
        let json: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        for b in json["bboxes"].as_array().unwrap() {
            assert_eq!(b["line_index"], 0);
            for key in ["char", "x0", "y0", "x1", "y1"] {
                assert!(b.get(key).is_some(), "bbox missing '{key}'");
            }
        }
    }

    #[test]
    fn roundtrip_through_disk_preserves_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image_00000.json");

        let record = record_for("Hello world");
        record.write_to(&path).unwrap();
        let back = GenerationRecord::read_from(&path).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn reexecuting_the_embedded_plan_reproduces_the_output() {
        let record = record_for("Hello again");
        let fonts = BlockFontSource::new();
        let again = generate_from_plan(record.plan(), &fonts).unwrap();
        assert_eq!(again.boxes, record.bboxes);
        assert_eq!(
            [again.image.width(), again.image.height()],
            record.canvas_size
        );
    }
}
