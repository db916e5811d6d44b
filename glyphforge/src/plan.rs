//! The concrete parameter vector for one image, and the planner that samples
//! it.
//!
//! A `Plan` is pure data: the sole input to the executor, the sole ground
//! truth in the label file, and the only object that crosses the worker
//! boundary.

use std::path::{Path, PathBuf};

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::config::{
    BackgroundColor, BatchSpec, BreakMode, ColorMode, CurveType, MorphMode, ParamRange,
    PlacementStrategy, ReliefKind,
};
use crate::foundation::core::{Direction, Rgb, TextAlignment};
use crate::foundation::error::{ForgeError, ForgeResult};
use crate::foundation::math::{derive_image_seed, derive_stream_seed};
use crate::shape::FontEngine;

/// Concrete effect parameters. Zero values disable the corresponding pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectPlan {
    pub ink_bleed_radius: f64,
    pub shadow_depth: f64,
    pub relief: ReliefKind,
    pub relief_depth: f64,
    pub light_azimuth: f64,
    pub light_elevation: f64,
    pub noise_density: f64,
    pub blur_sigma: f64,
    pub brightness: f64,
    pub contrast: f64,
    pub morph_kernel: u32,
    pub morph_mode: MorphMode,
    pub cutout_size: u32,
}

/// Concrete geometric-augmentation parameters. Zero disables a stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AugmentPlan {
    pub rotation_deg: f64,
    pub perspective: f64,
    pub elastic_alpha: f64,
    pub elastic_sigma: f64,
    pub grid_steps: u32,
    pub grid_limit: f64,
    pub optical: f64,
}

/// The full parameter vector for one image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub spec_name: String,
    pub image_index: u64,
    pub seed: u64,

    pub text: String,
    pub font_path: PathBuf,
    pub font_size: u32,
    pub direction: Direction,

    pub num_lines: u32,
    #[serde(rename = "line_break_mode")]
    pub line_break: BreakMode,
    pub line_spacing: f64,
    #[serde(rename = "text_alignment")]
    pub alignment: TextAlignment,

    pub curve_type: CurveType,
    pub curve_intensity: f64,
    pub curve_phase: f64,
    pub curve_concave: bool,

    pub overlap_intensity: f64,

    pub color_mode: ColorMode,
    pub glyph_colors: Vec<Rgb>,
    pub background_color: Rgb,
    pub background_path: Option<PathBuf>,

    pub effects: EffectPlan,
    pub augment: AugmentPlan,

    pub canvas_width: u32,
    pub canvas_height: u32,
    pub placement_x: u32,
    pub placement_y: u32,
    pub canvas_min_padding: u32,
    pub placement_strategy: PlacementStrategy,
}

impl Plan {
    /// RNG for a named pipeline stage, derived only from the per-image seed.
    pub fn stream_rng(&self, stream: &str) -> StdRng {
        StdRng::seed_from_u64(derive_stream_seed(self.seed, stream))
    }
}

// Built-in palettes.
const REALISTIC_DARK: &[Rgb] = &[
    Rgb { r: 0, g: 0, b: 0 },
    Rgb { r: 25, g: 25, b: 112 },
    Rgb { r: 139, g: 69, b: 19 },
    Rgb { r: 47, g: 79, b: 79 },
    Rgb { r: 0, g: 0, b: 128 },
    Rgb { r: 85, g: 107, b: 47 },
];

const REALISTIC_LIGHT: &[Rgb] = &[
    Rgb { r: 255, g: 255, b: 255 },
    Rgb { r: 245, g: 245, b: 220 },
    Rgb { r: 240, g: 248, b: 255 },
    Rgb { r: 255, g: 250, b: 240 },
    Rgb { r: 250, g: 250, b: 210 },
];

const VIBRANT: &[Rgb] = &[
    Rgb { r: 255, g: 0, b: 0 },
    Rgb { r: 0, g: 255, b: 0 },
    Rgb { r: 0, g: 0, b: 255 },
    Rgb { r: 255, g: 165, b: 0 },
    Rgb { r: 255, g: 0, b: 255 },
    Rgb { r: 0, g: 255, b: 255 },
    Rgb { r: 255, g: 255, b: 0 },
    Rgb { r: 128, g: 0, b: 128 },
];

const PASTELS: &[Rgb] = &[
    Rgb { r: 255, g: 182, b: 193 },
    Rgb { r: 173, g: 216, b: 230 },
    Rgb { r: 221, g: 160, b: 221 },
    Rgb { r: 255, g: 218, b: 185 },
    Rgb { r: 216, g: 191, b: 216 },
    Rgb { r: 152, g: 251, b: 152 },
    Rgb { r: 255, g: 255, b: 224 },
];

pub fn palette_by_name(name: &str) -> Option<&'static [Rgb]> {
    match name {
        "realistic_dark" => Some(REALISTIC_DARK),
        "realistic_light" => Some(REALISTIC_LIGHT),
        "vibrant" => Some(VIBRANT),
        "pastels" => Some(PASTELS),
        _ => None,
    }
}

/// Sample the full parameter vector for one task.
///
/// This is a pure function of its arguments plus the master seed: the RNG is
/// derived from `(master_seed, image_index, spec.name)` and consumed in a
/// fixed order, so re-planning the same task always yields the same `Plan`.
pub fn build_plan(
    spec: &BatchSpec,
    text: &str,
    font_path: &Path,
    image_index: u64,
    master_seed: u64,
    engine: &dyn FontEngine,
    background_path: Option<PathBuf>,
) -> ForgeResult<Plan> {
    let seed = derive_image_seed(master_seed, image_index, &spec.name);
    let mut rng = StdRng::seed_from_u64(derive_stream_seed(seed, "plan"));

    let font_size = draw_int(&mut rng, &spec.font_size)?.clamp(4, 512) as u32;
    let num_lines = rng.gen_range(spec.lines.min_lines..=spec.lines.max_lines);
    let line_spacing = draw(&mut rng, &spec.lines.spacing)?;

    let (curve_intensity, curve_phase, curve_concave) = match spec.curve.curve_type {
        CurveType::None => (0.0, 0.0, false),
        _ => {
            let intensity = draw(&mut rng, &spec.curve.intensity)?.clamp(0.0, 1.0);
            let phase = draw(&mut rng, &spec.curve.phase)?;
            let concave = rng.gen_bool(spec.curve.concave_probability.clamp(0.0, 1.0));
            (intensity, phase, concave)
        }
    };

    let overlap_intensity = draw(&mut rng, &spec.effects.overlap)?.clamp(0.0, 1.0);

    let glyph_colors = resolve_colors(spec, text, &mut rng);
    let background_color = match &spec.color.background {
        BackgroundColor::Fixed(rgb) => *rgb,
        BackgroundColor::Keyword(_) => glyph_colors
            .first()
            .copied()
            .unwrap_or(Rgb::BLACK)
            .contrasting(),
    };

    let effects = EffectPlan {
        ink_bleed_radius: draw(&mut rng, &spec.effects.ink_bleed)?.max(0.0),
        shadow_depth: draw(&mut rng, &spec.effects.shadow)?.clamp(0.0, 1.0),
        relief: spec.effects.relief,
        relief_depth: draw(&mut rng, &spec.effects.relief_depth)?.clamp(0.0, 1.0),
        light_azimuth: draw(&mut rng, &spec.effects.light_azimuth)?,
        light_elevation: draw(&mut rng, &spec.effects.light_elevation)?.clamp(0.0, 90.0),
        noise_density: draw(&mut rng, &spec.effects.noise)?.clamp(0.0, 1.0),
        blur_sigma: draw(&mut rng, &spec.effects.blur)?.max(0.0),
        brightness: draw(&mut rng, &spec.effects.brightness)?.max(0.0),
        contrast: draw(&mut rng, &spec.effects.contrast)?.max(0.0),
        morph_kernel: odd_kernel(draw_int(&mut rng, &spec.effects.morph_kernel)?),
        morph_mode: spec.effects.morph_mode,
        cutout_size: draw_int(&mut rng, &spec.effects.cutout)?.max(0) as u32,
    };

    let augment = AugmentPlan {
        rotation_deg: draw(&mut rng, &spec.augment.rotation)?,
        perspective: draw(&mut rng, &spec.augment.perspective)?.clamp(0.0, 1.0),
        elastic_alpha: draw(&mut rng, &spec.augment.elastic_alpha)?.max(0.0),
        elastic_sigma: draw(&mut rng, &spec.augment.elastic_sigma)?.max(0.1),
        grid_steps: draw_int(&mut rng, &spec.augment.grid_steps)?.max(0) as u32,
        grid_limit: draw(&mut rng, &spec.augment.grid_limit)?.max(0.0),
        optical: draw(&mut rng, &spec.augment.optical)?,
    };

    let mut plan = Plan {
        spec_name: spec.name.clone(),
        image_index,
        seed,
        text: text.to_owned(),
        font_path: font_path.to_path_buf(),
        font_size,
        direction: spec.direction,
        num_lines,
        line_break: spec.lines.break_mode,
        line_spacing,
        alignment: spec.lines.alignment,
        curve_type: spec.curve.curve_type,
        curve_intensity,
        curve_phase,
        curve_concave,
        overlap_intensity,
        color_mode: spec.color.mode,
        glyph_colors,
        background_color,
        background_path,
        effects,
        augment,
        canvas_width: 0,
        canvas_height: 0,
        placement_x: 0,
        placement_y: 0,
        canvas_min_padding: spec.canvas.min_padding,
        placement_strategy: spec.canvas.placement,
    };

    // Canvas geometry needs the augmented text extent, which is a pure
    // function of the plan so far.
    let (text_w, text_h) = crate::shape::measure(&plan, engine)?;
    let (aug_w, aug_h) = crate::augment::expanded_dims(text_w, text_h, &plan.augment);
    let (canvas_w, canvas_h) = crate::canvas::generate_canvas_size(
        &mut rng,
        aug_w,
        aug_h,
        spec.canvas.min_padding,
        spec.canvas.max_megapixels,
    );
    let (px, py) = crate::canvas::choose_placement(
        &mut rng,
        canvas_w,
        canvas_h,
        aug_w,
        aug_h,
        spec.canvas.min_padding,
        spec.canvas.placement,
    );

    plan.canvas_width = canvas_w;
    plan.canvas_height = canvas_h;
    plan.placement_x = px;
    plan.placement_y = py;
    Ok(plan)
}

/// Vectorized planning: one plan per task, independent of call order.
pub fn plan_batch(
    tasks: &[(&BatchSpec, String, PathBuf, u64)],
    master_seed: u64,
    engine: &dyn FontEngine,
) -> ForgeResult<Vec<Plan>> {
    tasks
        .iter()
        .map(|(spec, text, font, index)| {
            build_plan(spec, text, font, *index, master_seed, engine, None)
        })
        .collect()
}

fn resolve_colors(spec: &BatchSpec, text: &str, rng: &mut StdRng) -> Vec<Rgb> {
    let palette: Vec<Rgb> = spec
        .color
        .custom_colors
        .clone()
        .or_else(|| palette_by_name(&spec.color.palette).map(|p| p.to_vec()))
        .unwrap_or_else(|| REALISTIC_DARK.to_vec());

    let n = text.chars().count().max(1);
    let mode = match spec.color.mode {
        ColorMode::Random => {
            if rng.gen_bool(0.5) {
                ColorMode::Uniform
            } else {
                ColorMode::PerGlyph
            }
        }
        other => other,
    };

    match mode {
        ColorMode::Uniform => {
            let color = palette[rng.gen_range(0..palette.len())];
            vec![color; n]
        }
        ColorMode::PerGlyph => (0..n)
            .map(|_| palette[rng.gen_range(0..palette.len())])
            .collect(),
        ColorMode::Gradient => {
            if palette.len() < 2 {
                return vec![palette[0]; n];
            }
            let (a, b) = (palette[0], palette[1]);
            (0..n)
                .map(|i| {
                    let t = i as f64 / (n - 1).max(1) as f64;
                    Rgb {
                        r: lerp_u8(a.r, b.r, t),
                        g: lerp_u8(a.g, b.g, t),
                        b: lerp_u8(a.b, b.b, t),
                    }
                })
                .collect()
        }
        ColorMode::Random => unreachable!("resolved above"),
    }
}

fn lerp_u8(a: u8, b: u8, t: f64) -> u8 {
    (f64::from(a) + t * (f64::from(b) - f64::from(a))).round() as u8
}

fn draw(rng: &mut StdRng, range: &ParamRange) -> ForgeResult<f64> {
    crate::sample::sample(rng, range.min, range.max, range.resolve()?)
}

fn draw_int(rng: &mut StdRng, range: &ParamRange) -> ForgeResult<i64> {
    crate::sample::sample_int(rng, range.min, range.max, range.resolve()?)
}

fn odd_kernel(k: i64) -> u32 {
    if k < 3 {
        0
    } else if k % 2 == 0 {
        (k - 1) as u32
    } else {
        k as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{BlockFont, minimal_spec};

    #[test]
    fn planning_is_a_pure_function_of_inputs() {
        let spec = minimal_spec("latin");
        let engine = BlockFont::default();
        let a = build_plan(&spec, "Hello", Path::new("f.ttf"), 3, 99, &engine, None).unwrap();
        let b = build_plan(&spec, "Hello", Path::new("f.ttf"), 3, 99, &engine, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn plans_differ_by_index_and_seed() {
        let spec = minimal_spec("latin");
        let engine = BlockFont::default();
        let a = build_plan(&spec, "Hello", Path::new("f.ttf"), 3, 99, &engine, None).unwrap();
        let b = build_plan(&spec, "Hello", Path::new("f.ttf"), 4, 99, &engine, None).unwrap();
        let c = build_plan(&spec, "Hello", Path::new("f.ttf"), 3, 100, &engine, None).unwrap();
        assert_ne!(a.seed, b.seed);
        assert_ne!(a.seed, c.seed);
    }

    #[test]
    fn curve_disabled_zeroes_all_curve_parameters() {
        let spec = minimal_spec("latin");
        let engine = BlockFont::default();
        let plan = build_plan(&spec, "Hi", Path::new("f.ttf"), 0, 1, &engine, None).unwrap();
        assert_eq!(plan.curve_type, CurveType::None);
        assert_eq!(plan.curve_intensity, 0.0);
        assert_eq!(plan.curve_phase, 0.0);
        assert!(!plan.curve_concave);
    }

    #[test]
    fn canvas_fits_text_with_padding() {
        let spec = minimal_spec("latin");
        let engine = BlockFont::default();
        let plan = build_plan(&spec, "Hello world", Path::new("f.ttf"), 0, 7, &engine, None)
            .unwrap();
        let (tw, th) = crate::shape::measure(&plan, &engine).unwrap();
        assert!(plan.canvas_width >= tw + 2 * plan.canvas_min_padding);
        assert!(plan.canvas_height >= th + 2 * plan.canvas_min_padding);
        assert!(plan.placement_x >= plan.canvas_min_padding);
        assert!(plan.placement_y >= plan.canvas_min_padding);
    }

    #[test]
    fn glyph_colors_cover_every_character() {
        let mut spec = minimal_spec("latin");
        spec.color.mode = ColorMode::Gradient;
        let engine = BlockFont::default();
        let plan = build_plan(&spec, "abcdef", Path::new("f.ttf"), 0, 7, &engine, None).unwrap();
        assert_eq!(plan.glyph_colors.len(), 6);
        assert_ne!(plan.glyph_colors[0], plan.glyph_colors[5]);
    }

    #[test]
    fn auto_background_contrasts_with_text() {
        let spec = minimal_spec("latin");
        let engine = BlockFont::default();
        let plan = build_plan(&spec, "Hi", Path::new("f.ttf"), 0, 7, &engine, None).unwrap();
        // realistic_dark palette text on auto background -> light background.
        assert!(plan.background_color.luminance() > 0.5);
    }

    #[test]
    fn odd_kernel_rounding() {
        assert_eq!(odd_kernel(0), 0);
        assert_eq!(odd_kernel(2), 0);
        assert_eq!(odd_kernel(3), 3);
        assert_eq!(odd_kernel(4), 3);
        assert_eq!(odd_kernel(7), 7);
    }

    #[test]
    fn known_palettes_resolve() {
        for name in ["realistic_dark", "realistic_light", "vibrant", "pastels"] {
            assert!(palette_by_name(name).is_some());
        }
        assert!(palette_by_name("neon").is_none());
    }
}
