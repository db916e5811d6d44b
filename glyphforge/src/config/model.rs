//! Typed configuration model.
//!
//! The YAML loader produces this structure; after `validate_config` passes it
//! is read-only for the rest of the run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::foundation::core::{Direction, Rgb, TextAlignment};
use crate::foundation::error::ForgeResult;
use crate::sample::Distribution;

/// A `{min, max, distribution}` sampling triple.
///
/// The distribution is kept as its config-file spelling so the validator can
/// report every unrecognized name in one batched pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_distribution")]
    pub distribution: String,
}

fn default_distribution() -> String {
    "uniform".to_owned()
}

impl ParamRange {
    pub fn fixed(v: f64) -> Self {
        Self {
            min: v,
            max: v,
            distribution: default_distribution(),
        }
    }

    pub fn zero() -> Self {
        Self::fixed(0.0)
    }

    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            distribution: default_distribution(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.min == 0.0 && self.max == 0.0
    }

    pub fn resolve(&self) -> ForgeResult<Distribution> {
        self.distribution.parse()
    }
}

/// File selector: glob pattern plus optional per-pattern weights.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSelector {
    pub pattern: String,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakMode {
    #[default]
    Word,
    Character,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveType {
    #[default]
    None,
    Arc,
    Sine,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    #[default]
    Uniform,
    PerGlyph,
    Gradient,
    Random,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    #[default]
    WeightedRandom,
    UniformRandom,
    Center,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReliefKind {
    #[default]
    None,
    Raised,
    Embossed,
    Engraved,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MorphMode {
    #[default]
    Erode,
    Dilate,
}

/// Background color: a fixed RGB or the `auto` keyword (contrast-solved).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BackgroundColor {
    Fixed(Rgb),
    Keyword(String),
}

impl Default for BackgroundColor {
    fn default() -> Self {
        Self::Keyword("auto".to_owned())
    }
}

impl BackgroundColor {
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Keyword(k) if k == "auto")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSettings {
    pub min_lines: u32,
    pub max_lines: u32,
    pub break_mode: BreakMode,
    pub spacing: ParamRange,
    pub alignment: TextAlignment,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            min_lines: 1,
            max_lines: 1,
            break_mode: BreakMode::Word,
            spacing: ParamRange::fixed(1.2),
            alignment: TextAlignment::Center,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveSettings {
    pub curve_type: CurveType,
    pub intensity: ParamRange,
    pub phase: ParamRange,
    pub concave_probability: f64,
}

impl Default for CurveSettings {
    fn default() -> Self {
        Self {
            curve_type: CurveType::None,
            intensity: ParamRange::zero(),
            phase: ParamRange::zero(),
            concave_probability: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorSettings {
    pub mode: ColorMode,
    pub palette: String,
    pub custom_colors: Option<Vec<Rgb>>,
    pub background: BackgroundColor,
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            mode: ColorMode::Uniform,
            palette: "realistic_dark".to_owned(),
            custom_colors: None,
            background: BackgroundColor::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectSettings {
    pub overlap: ParamRange,
    pub ink_bleed: ParamRange,
    pub shadow: ParamRange,
    pub relief: ReliefKind,
    pub relief_depth: ParamRange,
    pub light_azimuth: ParamRange,
    pub light_elevation: ParamRange,
    pub noise: ParamRange,
    pub blur: ParamRange,
    pub brightness: ParamRange,
    pub contrast: ParamRange,
    pub morph_kernel: ParamRange,
    pub morph_mode: MorphMode,
    pub cutout: ParamRange,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            overlap: ParamRange::zero(),
            ink_bleed: ParamRange::zero(),
            shadow: ParamRange::zero(),
            relief: ReliefKind::None,
            relief_depth: ParamRange::fixed(0.5),
            light_azimuth: ParamRange::fixed(135.0),
            light_elevation: ParamRange::fixed(45.0),
            noise: ParamRange::zero(),
            blur: ParamRange::zero(),
            brightness: ParamRange::fixed(1.0),
            contrast: ParamRange::fixed(1.0),
            morph_kernel: ParamRange::zero(),
            morph_mode: MorphMode::Erode,
            cutout: ParamRange::zero(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentSettings {
    pub rotation: ParamRange,
    pub perspective: ParamRange,
    pub elastic_alpha: ParamRange,
    pub elastic_sigma: ParamRange,
    pub grid_steps: ParamRange,
    pub grid_limit: ParamRange,
    pub optical: ParamRange,
}

impl Default for AugmentSettings {
    fn default() -> Self {
        Self {
            rotation: ParamRange::zero(),
            perspective: ParamRange::zero(),
            elastic_alpha: ParamRange::zero(),
            elastic_sigma: ParamRange::fixed(4.0),
            grid_steps: ParamRange::zero(),
            grid_limit: ParamRange::zero(),
            optical: ParamRange::zero(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasSettings {
    pub min_padding: u32,
    pub max_megapixels: f64,
    pub placement: PlacementStrategy,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            min_padding: 10,
            max_megapixels: 12.0,
            placement: PlacementStrategy::WeightedRandom,
        }
    }
}

/// One generation profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchSpec {
    pub name: String,
    pub proportion: f64,
    #[serde(default = "default_direction")]
    pub direction: Direction,
    pub corpus: SourceSelector,
    pub fonts: SourceSelector,
    #[serde(default)]
    pub background: Option<SourceSelector>,
    #[serde(default = "default_true")]
    pub solid_background_fallback: bool,
    #[serde(default = "default_min_text_length")]
    pub min_text_length: u32,
    #[serde(default = "default_max_text_length")]
    pub max_text_length: u32,
    #[serde(default = "default_font_size")]
    pub font_size: ParamRange,
    #[serde(default)]
    pub lines: LineSettings,
    #[serde(default)]
    pub curve: CurveSettings,
    #[serde(default)]
    pub color: ColorSettings,
    #[serde(default)]
    pub effects: EffectSettings,
    #[serde(default)]
    pub augment: AugmentSettings,
    #[serde(default)]
    pub canvas: CanvasSettings,
}

fn default_direction() -> Direction {
    Direction::LeftToRight
}

fn default_true() -> bool {
    true
}

fn default_min_text_length() -> u32 {
    5
}

fn default_max_text_length() -> u32 {
    25
}

fn default_font_size() -> ParamRange {
    ParamRange::new(28.0, 40.0)
}

/// The whole batch configuration: image count, master seed, ordered specs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub total_images: u64,
    #[serde(default)]
    pub seed: Option<u64>,
    pub specs: Vec<BatchSpec>,
}

impl BatchConfig {
    /// Stable content hash, stored in the checkpoint to detect config drift
    /// across resumed runs.
    pub fn content_hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let digest = Sha256::digest(json.as_bytes());
        format!("{digest:x}")
    }
}
