//! Deterministic synthetic fixtures for tests.
//!
//! `BlockFont` renders every character as a filled rectangle with fixed
//! metrics, which makes pixel-exact assertions possible without shipping font
//! binaries.

#![doc(hidden)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{
    AugmentSettings, BatchSpec, CanvasSettings, ColorSettings, CurveSettings, EffectSettings,
    LineSettings, ParamRange, SourceSelector,
};
use crate::foundation::core::{Direction, Rgb, TextAlignment};
use crate::foundation::error::{ForgeError, ForgeResult};
use crate::foundation::math::derive_image_seed;
use crate::plan::{AugmentPlan, EffectPlan, Plan};
use crate::shape::{FontEngine, FontMetrics, FontSource, RasterGlyph};

/// Synthetic engine: every glyph is a solid block, metrics scale linearly.
#[derive(Clone, Debug, Default)]
pub struct BlockFont {
    pub id: String,
    /// Characters this font pretends not to cover.
    pub missing: HashSet<char>,
}

impl BlockFont {
    pub fn named(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            missing: HashSet::new(),
        }
    }

    pub fn without(id: &str, missing: &[char]) -> Self {
        Self {
            id: id.to_owned(),
            missing: missing.iter().copied().collect(),
        }
    }
}

impl FontEngine for BlockFont {
    fn id(&self) -> &str {
        &self.id
    }

    fn metrics(&self, size: f32) -> FontMetrics {
        FontMetrics {
            ascent: size * 0.8,
            descent: size * 0.2,
        }
    }

    fn has_glyph(&self, ch: char) -> bool {
        !self.missing.contains(&ch)
    }

    fn glyph(&self, size: f32, ch: char) -> ForgeResult<RasterGlyph> {
        if self.missing.contains(&ch) {
            return Err(ForgeError::GlyphMiss {
                font: self.id.clone(),
                ch,
            });
        }
        if ch.is_whitespace() {
            return Ok(RasterGlyph::empty(size * 0.45));
        }

        let width = (size * 0.6).ceil().max(1.0) as u32;
        let height = (size * 0.7).ceil().max(1.0) as u32;
        Ok(RasterGlyph {
            width,
            height,
            mask: vec![255u8; (width * height) as usize],
            left: 0,
            top: -(height as i32),
            advance: size * 0.7,
        })
    }
}

/// Source that hands out [`BlockFont`]s for any path. Paths registered as bad
/// produce engines whose every glyph call fails, which exercises the
/// retry/health paths without real broken font files.
#[derive(Clone, Debug, Default)]
pub struct BlockFontSource {
    pub bad_paths: HashSet<PathBuf>,
}

impl BlockFontSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bad_path(path: impl Into<PathBuf>) -> Self {
        let mut bad_paths = HashSet::new();
        bad_paths.insert(path.into());
        Self { bad_paths }
    }
}

impl FontSource for BlockFontSource {
    fn open(&self, path: &Path) -> ForgeResult<Arc<dyn FontEngine>> {
        let id = path.to_string_lossy().into_owned();
        if self.bad_paths.contains(path) {
            return Ok(Arc::new(BrokenFont { id }));
        }
        Ok(Arc::new(BlockFont::named(&id)))
    }
}

/// Engine whose every glyph call reports a rasterizer failure.
#[derive(Clone, Debug)]
pub struct BrokenFont {
    pub id: String,
}

impl FontEngine for BrokenFont {
    fn id(&self) -> &str {
        &self.id
    }

    fn metrics(&self, size: f32) -> FontMetrics {
        FontMetrics {
            ascent: size * 0.8,
            descent: size * 0.2,
        }
    }

    fn has_glyph(&self, _ch: char) -> bool {
        true
    }

    fn glyph(&self, _size: f32, _ch: char) -> ForgeResult<RasterGlyph> {
        Err(ForgeError::RenderPanic {
            font: self.id.clone(),
            message: "synthetic rasterizer failure".to_owned(),
        })
    }
}

/// A minimal valid spec with effects and augmentations disabled.
pub fn minimal_spec(name: &str) -> BatchSpec {
    BatchSpec {
        name: name.to_owned(),
        proportion: 1.0,
        direction: Direction::LeftToRight,
        corpus: SourceSelector {
            pattern: "*.txt".to_owned(),
            weights: Default::default(),
        },
        fonts: SourceSelector {
            pattern: "*.ttf".to_owned(),
            weights: Default::default(),
        },
        background: None,
        solid_background_fallback: true,
        min_text_length: 5,
        max_text_length: 25,
        font_size: ParamRange::new(28.0, 40.0),
        lines: LineSettings::default(),
        curve: CurveSettings::default(),
        color: ColorSettings::default(),
        effects: EffectSettings::default(),
        augment: AugmentSettings::default(),
        canvas: CanvasSettings::default(),
    }
}

/// A fully concrete plan with every effect and augmentation disabled.
pub fn test_plan(text: &str, direction: Direction) -> Plan {
    Plan {
        spec_name: "test".to_owned(),
        image_index: 0,
        seed: derive_image_seed(0, 0, "test"),
        text: text.to_owned(),
        font_path: PathBuf::from("block.ttf"),
        font_size: 32,
        direction,
        num_lines: 1,
        line_break: crate::config::BreakMode::Word,
        line_spacing: 1.2,
        alignment: TextAlignment::Center,
        curve_type: crate::config::CurveType::None,
        curve_intensity: 0.0,
        curve_phase: 0.0,
        curve_concave: false,
        overlap_intensity: 0.0,
        color_mode: crate::config::ColorMode::Uniform,
        glyph_colors: vec![Rgb::BLACK; text.chars().count().max(1)],
        background_color: Rgb::WHITE,
        background_path: None,
        effects: EffectPlan {
            ink_bleed_radius: 0.0,
            shadow_depth: 0.0,
            relief: crate::config::ReliefKind::None,
            relief_depth: 0.0,
            light_azimuth: 135.0,
            light_elevation: 45.0,
            noise_density: 0.0,
            blur_sigma: 0.0,
            brightness: 1.0,
            contrast: 1.0,
            morph_kernel: 0,
            morph_mode: crate::config::MorphMode::Erode,
            cutout_size: 0,
        },
        augment: AugmentPlan {
            rotation_deg: 0.0,
            perspective: 0.0,
            elastic_alpha: 0.0,
            elastic_sigma: 4.0,
            grid_steps: 0,
            grid_limit: 0.0,
            optical: 0.0,
        },
        canvas_width: 300,
        canvas_height: 150,
        placement_x: 50,
        placement_y: 50,
        canvas_min_padding: 10,
        placement_strategy: crate::config::PlacementStrategy::Center,
    }
}
