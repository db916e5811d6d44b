mod load;
mod model;
mod validate;

pub use load::load_config;
pub use model::{
    AugmentSettings, BackgroundColor, BatchConfig, BatchSpec, BreakMode, CanvasSettings,
    ColorMode, ColorSettings, CurveSettings, CurveType, EffectSettings, LineSettings, MorphMode,
    ParamRange, PlacementStrategy, ReliefKind, SourceSelector,
};
pub use validate::{ConfigError, ConfigReport, ResourceRoots, validate_config};

use std::path::{Path, PathBuf};

use crate::foundation::error::{ForgeError, ForgeResult};

/// Expand a glob pattern to a sorted list of plain files.
pub fn resolve_glob(pattern: &str) -> ForgeResult<Vec<PathBuf>> {
    let entries = glob::glob(pattern)
        .map_err(|e| ForgeError::config(format!("bad glob '{pattern}': {e}")))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Anchor a possibly-relative selector pattern under a base directory.
pub fn anchored_pattern(base: Option<&Path>, pattern: &str) -> String {
    match base {
        Some(dir) if !Path::new(pattern).is_absolute() => {
            dir.join(pattern).to_string_lossy().into_owned()
        }
        _ => pattern.to_owned(),
    }
}

/// Selection weight for a file under a selector's pattern->weight map.
/// The first matching pattern wins; unmatched files weigh 1.0.
pub fn selector_weight(
    path: &Path,
    weights: &std::collections::BTreeMap<String, f64>,
) -> f64 {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    for (pattern, w) in weights {
        if let Ok(p) = glob::Pattern::new(pattern) {
            if p.matches(&name) || p.matches(&path.to_string_lossy()) {
                return *w;
            }
        }
    }
    1.0
}
