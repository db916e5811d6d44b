//! Outline-font engine contract and its `ab_glyph` implementation.
//!
//! The shaper only ever talks to [`FontEngine`]; rasterizer details stay on
//! this side of the seam so tests can substitute a synthetic engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ab_glyph::{Font as _, ScaleFont as _};

use crate::foundation::error::{ForgeError, ForgeResult};

/// Vertical metrics at a given pixel size. Both values are positive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FontMetrics {
    pub ascent: f32,
    pub descent: f32,
}

impl FontMetrics {
    pub fn height(self) -> f32 {
        self.ascent + self.descent
    }
}

/// One rasterized glyph: a coverage mask plus pen-relative placement.
///
/// `left`/`top` offset the mask origin from the pen position on the baseline;
/// `top` is negative for glyphs that extend above it (most do).
#[derive(Clone, Debug)]
pub struct RasterGlyph {
    pub width: u32,
    pub height: u32,
    pub mask: Vec<u8>,
    pub left: i32,
    pub top: i32,
    pub advance: f32,
}

impl RasterGlyph {
    pub fn empty(advance: f32) -> Self {
        Self {
            width: 0,
            height: 0,
            mask: Vec::new(),
            left: 0,
            top: 0,
            advance,
        }
    }

    /// True when the glyph carries no ink (whitespace and friends).
    pub fn is_blank(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// The external rasterizer contract. No per-glyph allocation beyond the
/// returned mask.
pub trait FontEngine: Send + Sync {
    /// Identifier used for error attribution and health bookkeeping.
    fn id(&self) -> &str;
    fn metrics(&self, size: f32) -> FontMetrics;
    fn has_glyph(&self, ch: char) -> bool;
    fn glyph(&self, size: f32, ch: char) -> ForgeResult<RasterGlyph>;
}

/// Opens font engines by path. Implementations cache loaded fonts.
pub trait FontSource: Send + Sync {
    fn open(&self, path: &Path) -> ForgeResult<Arc<dyn FontEngine>>;
}

/// `ab_glyph`-backed engine over a font file.
#[derive(Debug)]
pub struct OutlineFontEngine {
    font: ab_glyph::FontVec,
    id: String,
}

impl OutlineFontEngine {
    pub fn open(path: &Path) -> ForgeResult<Self> {
        let id = path.to_string_lossy().into_owned();
        let data = std::fs::read(path).map_err(|e| ForgeError::RenderPanic {
            font: id.clone(),
            message: format!("read failed: {e}"),
        })?;
        let font = ab_glyph::FontVec::try_from_vec(data).map_err(|e| ForgeError::RenderPanic {
            font: id.clone(),
            message: format!("parse failed: {e}"),
        })?;
        Ok(Self { font, id })
    }
}

impl FontEngine for OutlineFontEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn metrics(&self, size: f32) -> FontMetrics {
        let scaled = self.font.as_scaled(ab_glyph::PxScale::from(size));
        FontMetrics {
            ascent: scaled.ascent(),
            descent: -scaled.descent(),
        }
    }

    fn has_glyph(&self, ch: char) -> bool {
        self.font.glyph_id(ch).0 != 0
    }

    fn glyph(&self, size: f32, ch: char) -> ForgeResult<RasterGlyph> {
        let gid = self.font.glyph_id(ch);
        if gid.0 == 0 {
            return Err(ForgeError::GlyphMiss {
                font: self.id.clone(),
                ch,
            });
        }

        let scale = ab_glyph::PxScale::from(size);
        let scaled = self.font.as_scaled(scale);
        let advance = scaled.h_advance(gid);

        let glyph = gid.with_scale_and_position(scale, ab_glyph::point(0.0, 0.0));
        match self.font.outline_glyph(glyph) {
            Some(outlined) => {
                let bounds = outlined.px_bounds();
                let width = bounds.width().ceil().max(0.0) as u32;
                let height = bounds.height().ceil().max(0.0) as u32;
                if width == 0 || height == 0 {
                    return Ok(RasterGlyph::empty(advance));
                }
                let mut mask = vec![0u8; (width * height) as usize];
                outlined.draw(|x, y, c| {
                    if x < width && y < height {
                        let v = (c * 255.0).round().clamp(0.0, 255.0) as u8;
                        mask[(y * width + x) as usize] = v;
                    }
                });
                Ok(RasterGlyph {
                    width,
                    height,
                    mask,
                    left: bounds.min.x.floor() as i32,
                    top: bounds.min.y.floor() as i32,
                    advance,
                })
            }
            // Covered but inkless (space and other whitespace).
            None => Ok(RasterGlyph::empty(advance)),
        }
    }
}

/// Filesystem source with a process-wide engine cache.
#[derive(Default)]
pub struct DiskFontSource {
    cache: Mutex<HashMap<PathBuf, Arc<OutlineFontEngine>>>,
}

impl DiskFontSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FontSource for DiskFontSource {
    fn open(&self, path: &Path) -> ForgeResult<Arc<dyn FontEngine>> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| ForgeError::invariant("font cache mutex poisoned"))?;
        if let Some(engine) = cache.get(path) {
            return Ok(engine.clone() as Arc<dyn FontEngine>);
        }
        let engine = Arc::new(OutlineFontEngine::open(path)?);
        cache.insert(path.to_path_buf(), engine.clone());
        Ok(engine as Arc<dyn FontEngine>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_font_penalizes_the_font() {
        let err = OutlineFontEngine::open(Path::new("/nonexistent/font.ttf")).unwrap_err();
        assert!(matches!(err, ForgeError::RenderPanic { .. }));
        assert_eq!(err.implicated_font(), Some("/nonexistent/font.ttf"));
    }

    #[test]
    fn garbage_bytes_are_a_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ttf");
        std::fs::write(&path, b"definitely not a font").unwrap();
        let err = OutlineFontEngine::open(&path).unwrap_err();
        assert!(matches!(err, ForgeError::RenderPanic { .. }));
        assert_eq!(err.kind(), "rasterizer_panic");
    }

    #[test]
    fn disk_source_propagates_open_errors() {
        let source = DiskFontSource::new();
        assert!(source.open(Path::new("/nonexistent/font.ttf")).is_err());
    }
}
