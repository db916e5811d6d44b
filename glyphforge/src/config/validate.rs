//! Static configuration validation.
//!
//! Runs once before the scheduler starts and reports every problem it can
//! find in one pass, tagged with a `$`-rooted path into the config document.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::config::model::{BatchConfig, BatchSpec, CurveType, ParamRange};
use crate::config::{anchored_pattern, resolve_glob};
use crate::plan::palette_by_name;

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Batched validation report; any entry aborts startup.
#[derive(Debug, Clone)]
pub struct ConfigReport {
    pub errors: Vec<ConfigError>,
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigReport {}

/// Directories the CLI supplies; relative selector patterns resolve under
/// these.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResourceRoots<'a> {
    pub font_dir: Option<&'a Path>,
    pub corpus_dir: Option<&'a Path>,
    pub background_dir: Option<&'a Path>,
}

pub fn validate_config(cfg: &BatchConfig, roots: ResourceRoots<'_>) -> Result<(), ConfigReport> {
    let mut errors = Vec::new();

    if cfg.total_images == 0 {
        push(&mut errors, "$.total_images", "must be > 0");
    }
    if cfg.specs.is_empty() {
        push(&mut errors, "$.specs", "at least one spec is required");
    }

    let mut names = HashSet::new();
    let mut proportion_sum = 0.0;
    for (i, spec) in cfg.specs.iter().enumerate() {
        let base = format!("$.specs[{i}]");
        if spec.name.trim().is_empty() {
            push(&mut errors, format!("{base}.name"), "must be non-empty");
        } else if !names.insert(spec.name.clone()) {
            push(
                &mut errors,
                format!("{base}.name"),
                format!("duplicate spec name \"{}\"", spec.name),
            );
        }

        if !(spec.proportion > 0.0 && spec.proportion <= 1.0) {
            push(
                &mut errors,
                format!("{base}.proportion"),
                "must be in (0, 1]",
            );
        }
        proportion_sum += spec.proportion;

        validate_spec(spec, &base, roots, &mut errors);
    }

    if !cfg.specs.is_empty() && (proportion_sum - 1.0).abs() > 1e-3 {
        push(
            &mut errors,
            "$.specs",
            format!("proportions sum to {proportion_sum:.4}, expected 1.0 +/- 1e-3"),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigReport { errors })
    }
}

fn validate_spec(
    spec: &BatchSpec,
    base: &str,
    roots: ResourceRoots<'_>,
    errors: &mut Vec<ConfigError>,
) {
    if spec.min_text_length == 0 || spec.min_text_length > spec.max_text_length {
        push(
            errors,
            format!("{base}.min_text_length"),
            format!(
                "text length bounds [{}, {}] must satisfy 0 < min <= max",
                spec.min_text_length, spec.max_text_length
            ),
        );
    }
    if spec.lines.min_lines == 0 || spec.lines.min_lines > spec.lines.max_lines {
        push(
            errors,
            format!("{base}.lines"),
            format!(
                "line bounds [{}, {}] must satisfy 0 < min <= max",
                spec.lines.min_lines, spec.lines.max_lines
            ),
        );
    }

    if !spec.lines.alignment.valid_for(spec.direction) {
        push(
            errors,
            format!("{base}.lines.alignment"),
            format!(
                "alignment {:?} is not valid for direction {:?}",
                spec.lines.alignment, spec.direction
            ),
        );
    }

    if spec.curve.curve_type == CurveType::None {
        if !spec.curve.intensity.is_zero() {
            push(
                errors,
                format!("{base}.curve.intensity"),
                "must be zero when curve_type is none",
            );
        }
        if !spec.curve.phase.is_zero() {
            push(
                errors,
                format!("{base}.curve.phase"),
                "must be zero when curve_type is none",
            );
        }
    }
    if !(0.0..=1.0).contains(&spec.curve.concave_probability) {
        push(
            errors,
            format!("{base}.curve.concave_probability"),
            "must be in [0, 1]",
        );
    }

    if spec.color.custom_colors.is_none() && palette_by_name(&spec.color.palette).is_none() {
        push(
            errors,
            format!("{base}.color.palette"),
            format!("unknown palette \"{}\"", spec.color.palette),
        );
    }
    if let Some(colors) = &spec.color.custom_colors {
        if colors.is_empty() {
            push(
                errors,
                format!("{base}.color.custom_colors"),
                "must contain at least one color when present",
            );
        }
    }
    if let crate::config::BackgroundColor::Keyword(k) = &spec.color.background {
        if k != "auto" {
            push(
                errors,
                format!("{base}.color.background"),
                format!("unknown keyword \"{k}\" (expected \"auto\" or an RGB value)"),
            );
        }
    }

    for (name, range) in spec_ranges(spec) {
        validate_range(range, &format!("{base}.{name}"), errors);
    }

    // Resource globs must resolve before generation starts.
    check_glob(
        &anchored_pattern(roots.corpus_dir, &spec.corpus.pattern),
        &format!("{base}.corpus.pattern"),
        errors,
    );
    check_glob(
        &anchored_pattern(roots.font_dir, &spec.fonts.pattern),
        &format!("{base}.fonts.pattern"),
        errors,
    );
    if let Some(bg) = &spec.background {
        check_glob(
            &anchored_pattern(roots.background_dir, &bg.pattern),
            &format!("{base}.background.pattern"),
            errors,
        );
    }
}

fn spec_ranges(spec: &BatchSpec) -> Vec<(&'static str, &ParamRange)> {
    let e = &spec.effects;
    let a = &spec.augment;
    vec![
        ("font_size", &spec.font_size),
        ("lines.spacing", &spec.lines.spacing),
        ("curve.intensity", &spec.curve.intensity),
        ("curve.phase", &spec.curve.phase),
        ("effects.overlap", &e.overlap),
        ("effects.ink_bleed", &e.ink_bleed),
        ("effects.shadow", &e.shadow),
        ("effects.relief_depth", &e.relief_depth),
        ("effects.light_azimuth", &e.light_azimuth),
        ("effects.light_elevation", &e.light_elevation),
        ("effects.noise", &e.noise),
        ("effects.blur", &e.blur),
        ("effects.brightness", &e.brightness),
        ("effects.contrast", &e.contrast),
        ("effects.morph_kernel", &e.morph_kernel),
        ("effects.cutout", &e.cutout),
        ("augment.rotation", &a.rotation),
        ("augment.perspective", &a.perspective),
        ("augment.elastic_alpha", &a.elastic_alpha),
        ("augment.elastic_sigma", &a.elastic_sigma),
        ("augment.grid_steps", &a.grid_steps),
        ("augment.grid_limit", &a.grid_limit),
        ("augment.optical", &a.optical),
    ]
}

fn validate_range(range: &ParamRange, path: &str, errors: &mut Vec<ConfigError>) {
    if !range.min.is_finite() || !range.max.is_finite() {
        push(errors, path, "bounds must be finite");
    } else if range.min > range.max {
        push(
            errors,
            path,
            format!("min {} > max {}", range.min, range.max),
        );
    }
    if range.resolve().is_err() {
        push(
            errors,
            path,
            format!(
                "unknown distribution \"{}\" (expected one of {})",
                range.distribution,
                crate::sample::Distribution::ALL_NAMES.join(", ")
            ),
        );
    }
}

fn check_glob(pattern: &str, path: &str, errors: &mut Vec<ConfigError>) {
    match resolve_glob(pattern) {
        Ok(files) if files.is_empty() => push(
            errors,
            path,
            format!("glob '{pattern}' matches no files"),
        ),
        Ok(_) => {}
        Err(e) => push(errors, path, e.to_string()),
    }
}

fn push(errors: &mut Vec<ConfigError>, path: impl Into<String>, message: impl Into<String>) {
    errors.push(ConfigError {
        path: path.into(),
        message: message.into(),
    });
}
