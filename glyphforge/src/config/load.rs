use std::path::Path;

use crate::config::model::BatchConfig;
use crate::foundation::error::{ForgeError, ForgeResult};

const SPEC_KEYS: &[&str] = &[
    "name",
    "proportion",
    "direction",
    "corpus",
    "fonts",
    "background",
    "solid_background_fallback",
    "min_text_length",
    "max_text_length",
    "font_size",
    "lines",
    "curve",
    "color",
    "effects",
    "augment",
    "canvas",
];

const TOP_KEYS: &[&str] = &["total_images", "seed", "specs"];

/// Keys from the retired RGB-range color dialect. These are rejected outright
/// so the two dialects can never be mixed.
const REJECTED_COLOR_KEYS: &[&str] = &["text_color_min", "text_color_max"];

/// Load and deserialize a YAML batch configuration.
///
/// `strict` additionally rejects unknown keys at the top and spec level. The
/// retired color-range dialect is rejected in both modes.
pub fn load_config(path: &Path, strict: bool) -> ForgeResult<BatchConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ForgeError::resource_missing(format!("config '{}': {e}", path.display()))
    })?;
    let value: serde_yaml::Value = serde_yaml::from_str(&raw)
        .map_err(|e| ForgeError::config(format!("config '{}': {e}", path.display())))?;

    check_keys(&value, strict)?;

    serde_yaml::from_value(value)
        .map_err(|e| ForgeError::config(format!("config '{}': {e}", path.display())))
}

fn check_keys(value: &serde_yaml::Value, strict: bool) -> ForgeResult<()> {
    let Some(top) = value.as_mapping() else {
        return Err(ForgeError::config("config root must be a mapping"));
    };

    if strict {
        for key in mapping_keys(top) {
            if !TOP_KEYS.contains(&key.as_str()) {
                return Err(ForgeError::config(format!("unknown key '{key}'")));
            }
        }
    }

    if let Some(specs) = top.get("specs").and_then(|v| v.as_sequence()) {
        for (i, spec) in specs.iter().enumerate() {
            let Some(map) = spec.as_mapping() else {
                continue;
            };
            for key in mapping_keys(map) {
                if REJECTED_COLOR_KEYS.contains(&key.as_str()) {
                    return Err(ForgeError::config(format!(
                        "specs[{i}]: '{key}' belongs to the retired RGB-range color dialect; \
                         use 'color.palette' / 'color.custom_colors' instead"
                    )));
                }
                if strict && !SPEC_KEYS.contains(&key.as_str()) {
                    return Err(ForgeError::config(format!(
                        "specs[{i}]: unknown key '{key}'"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn mapping_keys(map: &serde_yaml::Mapping) -> impl Iterator<Item = String> + '_ {
    map.keys()
        .filter_map(|k| k.as_str().map(|s| s.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    const OK: &str = r#"
total_images: 4
seed: 9
specs:
  - name: latin
    proportion: 1.0
    corpus: { pattern: "*.txt" }
    fonts: { pattern: "*.ttf" }
"#;

    #[test]
    fn loads_valid_yaml() {
        let (_dir, path) = write_config(OK);
        let cfg = load_config(&path, false).unwrap();
        assert_eq!(cfg.total_images, 4);
        assert_eq!(cfg.seed, Some(9));
        assert_eq!(cfg.specs.len(), 1);
    }

    #[test]
    fn strict_mode_rejects_unknown_spec_keys() {
        let (_dir, path) = write_config(
            r#"
total_images: 1
specs:
  - name: x
    proportion: 1.0
    corpus: { pattern: "*.txt" }
    fonts: { pattern: "*.ttf" }
    mystery_knob: 3
"#,
        );
        assert!(load_config(&path, false).is_ok());
        let err = load_config(&path, true).unwrap_err();
        assert!(err.to_string().contains("mystery_knob"));
    }

    #[test]
    fn retired_color_dialect_is_rejected_even_when_lenient() {
        let (_dir, path) = write_config(
            r#"
total_images: 1
specs:
  - name: x
    proportion: 1.0
    corpus: { pattern: "*.txt" }
    fonts: { pattern: "*.ttf" }
    text_color_min: [0, 0, 0]
"#,
        );
        let err = load_config(&path, false).unwrap_err();
        assert!(err.to_string().contains("retired RGB-range color dialect"));
    }

    #[test]
    fn missing_file_is_resource_missing() {
        let err = load_config(Path::new("/nonexistent/batch.yaml"), false).unwrap_err();
        assert!(matches!(err, ForgeError::ResourceMissing(_)));
    }
}
