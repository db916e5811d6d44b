//! Shared fixtures for scheduler-level tests.

use std::path::PathBuf;

use glyphforge::config::BatchConfig;

pub struct Fixture {
    pub root: tempfile::TempDir,
    pub font_dir: PathBuf,
    pub corpus_dir: PathBuf,
}

impl Fixture {
    /// Create corpus and font directories with the given font file names.
    /// Font files are stubs; tests pair them with a synthetic font source.
    pub fn new(fonts: &[&str]) -> Self {
        let root = tempfile::tempdir().unwrap();
        let font_dir = root.path().join("fonts");
        let corpus_dir = root.path().join("corpus");
        std::fs::create_dir_all(&font_dir).unwrap();
        std::fs::create_dir_all(&corpus_dir).unwrap();

        for name in fonts {
            std::fs::write(font_dir.join(name), b"stub").unwrap();
        }
        let text = "the quick brown fox jumps over the lazy dog and keeps on running "
            .repeat(40);
        std::fs::write(corpus_dir.join("corpus.txt"), text).unwrap();

        Self {
            root,
            font_dir,
            corpus_dir,
        }
    }

    pub fn output_dir(&self, name: &str) -> PathBuf {
        let dir = self.root.path().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn font_path(&self, name: &str) -> PathBuf {
        self.font_dir.join(name)
    }
}

pub fn config_yaml(total: u64, seed: u64, spec_names: &[&str]) -> BatchConfig {
    let proportion = 1.0 / spec_names.len() as f64;
    let mut specs = String::new();
    for name in spec_names {
        specs.push_str(&format!(
            r#"
  - name: {name}
    proportion: {proportion}
    corpus: {{ pattern: "*.txt" }}
    fonts: {{ pattern: "*.ttf" }}
    min_text_length: 5
    max_text_length: 12
"#
        ));
    }
    serde_yaml::from_str(&format!(
        "total_images: {total}\nseed: {seed}\nspecs:{specs}"
    ))
    .unwrap()
}
