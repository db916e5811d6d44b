//! Glyph shaping: text string to transparent RGBA surface plus per-character
//! boxes.
//!
//! The kernels render in visual order (after bidi reordering), support the
//! four writing directions, optional per-glyph overlap and curved baselines,
//! and emit one `CharacterBox` per visual character. All randomness comes
//! from the plan's `"shape"` stream, so measuring and rendering the same plan
//! walk identical RNG sequences.

pub mod bidi;
mod curved;
pub mod font;
mod straight;

pub use font::{
    DiskFontSource, FontEngine, FontMetrics, FontSource, OutlineFontEngine, RasterGlyph,
};

use image::{Rgba, RgbaImage};
use rand::Rng;
use rand::rngs::StdRng;

use crate::config::CurveType;
use crate::foundation::core::{CharacterBox, Rgb};
use crate::foundation::error::ForgeResult;
use crate::layout;
use crate::plan::Plan;

/// Transparent border around rendered text surfaces.
pub(crate) const MARGIN: i32 = 10;

/// Spacing-reduction cap: full overlap still leaves 20% of the advance so
/// characters never collapse onto one another.
const MAX_OVERLAP_REDUCTION: f64 = 0.8;

/// Shaper output: a transparent surface and visual-order character boxes.
pub struct ShapeOutput {
    pub surface: RgbaImage,
    pub boxes: Vec<CharacterBox>,
}

pub(crate) struct PlacedGlyph {
    pub ch: char,
    pub raster: RasterGlyph,
    /// Cursor advance after overlap reduction and jitter, floored at 1 px.
    pub advance: f32,
}

pub(crate) struct LineLayout {
    pub glyphs: Vec<PlacedGlyph>,
    pub total_advance: f32,
    pub max_ink_w: u32,
    pub max_ink_h: u32,
}

/// Surface dimensions for a plan, used by the planner for canvas sizing.
pub fn measure(plan: &Plan, engine: &dyn FontEngine) -> ForgeResult<(u32, u32)> {
    let out = render(plan, engine)?;
    Ok(out.surface.dimensions())
}

/// Render the plan's text into a transparent surface.
pub fn render(plan: &Plan, engine: &dyn FontEngine) -> ForgeResult<ShapeOutput> {
    if plan.text.is_empty() {
        return Ok(ShapeOutput {
            surface: RgbaImage::new(10, 10),
            boxes: Vec::new(),
        });
    }

    let mut rng = plan.stream_rng("shape");
    let size = plan.font_size as f32;
    let metrics = engine.metrics(size);

    let lines = layout::break_into_lines(&plan.text, plan.num_lines, plan.line_break);
    let visual_lines: Vec<String> = lines
        .iter()
        .map(|line| bidi::to_visual(line, plan.direction))
        .collect();

    let mut layouts = Vec::with_capacity(visual_lines.len());
    for line in &visual_lines {
        layouts.push(layout_line(line, engine, size, &metrics, plan, &mut rng)?);
    }

    let mut color_cursor = 0usize;
    let mut rendered: Vec<(RgbaImage, Vec<CharacterBox>)> = Vec::with_capacity(layouts.len());
    for line_layout in &layouts {
        let count = line_layout.glyphs.len();
        let piece = render_line(line_layout, &metrics, plan, color_cursor)?;
        color_cursor += count;
        rendered.push(piece);
    }

    if rendered.len() == 1 {
        let (surface, boxes) = rendered.swap_remove(0);
        return finish(surface, boxes);
    }

    // Multi-line: composite each line surface at its layout offset.
    let line_sizes: Vec<(u32, u32)> = rendered
        .iter()
        .map(|(img, _)| img.dimensions())
        .collect();
    let line_advance = if plan.direction.is_horizontal() {
        (metrics.height() * plan.line_spacing as f32).ceil().max(1.0) as u32
    } else {
        (size * 0.6 * plan.line_spacing as f32 * 2.0).ceil().max(1.0) as u32
    };
    let positions = layout::line_positions(
        &line_sizes,
        line_advance,
        plan.alignment,
        plan.direction,
    )?;

    let total_w = rendered
        .iter()
        .zip(&positions)
        .map(|((img, _), &(dx, _))| dx.max(0) as u32 + img.width())
        .max()
        .unwrap_or(1);
    let total_h = rendered
        .iter()
        .zip(&positions)
        .map(|((img, _), &(_, dy))| dy.max(0) as u32 + img.height())
        .max()
        .unwrap_or(1);

    let mut surface = RgbaImage::new(total_w.max(1), total_h.max(1));
    let mut boxes = Vec::new();
    for (line_index, ((img, line_boxes), &(dx, dy))) in
        rendered.into_iter().zip(&positions).enumerate()
    {
        image::imageops::overlay(&mut surface, &img, i64::from(dx), i64::from(dy));
        for mut b in line_boxes {
            b.translate(dx, dy);
            b.line_index = line_index as u32;
            boxes.push(b);
        }
    }
    finish(surface, boxes)
}

fn finish(surface: RgbaImage, boxes: Vec<CharacterBox>) -> ForgeResult<ShapeOutput> {
    for b in &boxes {
        if b.x1 <= b.x0 || b.y1 <= b.y0 {
            return Err(crate::foundation::error::ForgeError::invariant(format!(
                "degenerate character box for '{}': ({}, {}, {}, {})",
                b.ch, b.x0, b.y0, b.x1, b.y1
            )));
        }
    }
    Ok(ShapeOutput { surface, boxes })
}

fn render_line(
    line: &LineLayout,
    metrics: &FontMetrics,
    plan: &Plan,
    color_start: usize,
) -> ForgeResult<(RgbaImage, Vec<CharacterBox>)> {
    // Negligible curvature renders exactly like the straight kernel.
    let effectively_straight =
        plan.curve_type == CurveType::None || plan.curve_intensity < 1e-6;
    if effectively_straight {
        Ok(straight::render(line, metrics, plan, color_start))
    } else {
        Ok(curved::render(line, metrics, plan, color_start))
    }
}

fn layout_line(
    visual: &str,
    engine: &dyn FontEngine,
    size: f32,
    metrics: &FontMetrics,
    plan: &Plan,
    rng: &mut StdRng,
) -> ForgeResult<LineLayout> {
    let overlap = plan.overlap_intensity.clamp(0.0, 1.0);
    let mut glyphs = Vec::with_capacity(visual.chars().count());
    let mut total = 0f32;
    let mut max_w = 0u32;
    let mut max_h = 0u32;

    for ch in visual.chars() {
        let raster = engine.glyph(size, ch)?;
        let base = if plan.direction.is_horizontal() {
            raster.advance
        } else if raster.is_blank() {
            metrics.height() * 0.3
        } else {
            raster.height as f32
        };

        let mut advance = base * (1.0 - MAX_OVERLAP_REDUCTION * overlap) as f32;
        if overlap > 0.0 {
            let jitter = rng.gen_range(-0.1..0.1) * overlap * f64::from(base);
            advance += jitter as f32;
        }
        let advance = advance.max(1.0);

        max_w = max_w.max(raster.width);
        max_h = max_h.max(raster.height);
        total += advance;
        glyphs.push(PlacedGlyph {
            ch,
            raster,
            advance,
        });
    }

    Ok(LineLayout {
        glyphs,
        total_advance: total,
        max_ink_w: max_w,
        max_ink_h: max_h,
    })
}

pub(crate) fn color_at(colors: &[Rgb], idx: usize) -> Rgb {
    if colors.is_empty() {
        Rgb::BLACK
    } else {
        colors[idx % colors.len()]
    }
}

/// Rasterize one glyph mask into a colored RGBA tile.
pub(crate) fn glyph_tile(raster: &RasterGlyph, color: Rgb) -> RgbaImage {
    let mut tile = RgbaImage::new(raster.width.max(1), raster.height.max(1));
    for y in 0..raster.height {
        for x in 0..raster.width {
            let coverage = raster.mask[(y * raster.width + x) as usize];
            if coverage > 0 {
                tile.put_pixel(x, y, Rgba([color.r, color.g, color.b, coverage]));
            }
        }
    }
    tile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CurveType;
    use crate::foundation::core::Direction;
    use crate::testkit::{BlockFont, test_plan};

    fn mid_x(b: &CharacterBox) -> f64 {
        f64::from(b.x0 + b.x1) / 2.0
    }

    fn mid_y(b: &CharacterBox) -> f64 {
        f64::from(b.y0 + b.y1) / 2.0
    }

    #[test]
    fn empty_text_yields_stub_surface_and_no_boxes() {
        let plan = test_plan("", Direction::LeftToRight);
        let out = render(&plan, &BlockFont::default()).unwrap();
        assert_eq!(out.surface.dimensions(), (10, 10));
        assert!(out.boxes.is_empty());
    }

    #[test]
    fn straight_ltr_emits_one_box_per_char_in_order() {
        let plan = test_plan("Hello", Direction::LeftToRight);
        let out = render(&plan, &BlockFont::default()).unwrap();
        assert_eq!(out.boxes.len(), 5);
        let chars: String = out.boxes.iter().map(|b| b.ch).collect();
        assert_eq!(chars, "Hello");
        for w in out.boxes.windows(2) {
            assert!(w[1].x0 > w[0].x0, "boxes must advance left to right");
        }
        assert!(out.boxes.iter().all(|b| b.line_index == 0));
        assert!(out.boxes.iter().all(|b| b.width() > 0 && b.height() > 0));
    }

    #[test]
    fn spaces_still_get_boxes() {
        let plan = test_plan("a b", Direction::LeftToRight);
        let out = render(&plan, &BlockFont::default()).unwrap();
        assert_eq!(out.boxes.len(), 3);
        assert_eq!(out.boxes[1].ch, ' ');
        assert!(out.boxes[1].width() > 0);
    }

    #[test]
    fn rtl_boxes_are_in_visual_order() {
        let plan = test_plan("שלום", Direction::RightToLeft);
        let out = render(&plan, &BlockFont::default()).unwrap();
        let rendered: String = out.boxes.iter().map(|b| b.ch).collect();
        let visual = bidi::to_visual("שלום", Direction::RightToLeft);
        assert_eq!(rendered, visual);
        assert_eq!(out.boxes.len(), 4);
    }

    #[test]
    fn ttb_boxes_descend() {
        let plan = test_plan("東京都", Direction::TopToBottom);
        let out = render(&plan, &BlockFont::default()).unwrap();
        assert_eq!(out.boxes.len(), 3);
        for w in out.boxes.windows(2) {
            assert!(mid_y(&w[1]) > mid_y(&w[0]), "TTB midpoints must descend");
        }
    }

    #[test]
    fn btt_boxes_ascend() {
        let plan = test_plan("abc", Direction::BottomToTop);
        let out = render(&plan, &BlockFont::default()).unwrap();
        for w in out.boxes.windows(2) {
            assert!(mid_y(&w[1]) < mid_y(&w[0]), "BTT midpoints must ascend");
        }
    }

    #[test]
    fn overlap_shrinks_the_surface() {
        let wide = test_plan("mmmm", Direction::LeftToRight);
        let mut tight = wide.clone();
        tight.overlap_intensity = 0.8;

        let engine = BlockFont::default();
        let w0 = render(&wide, &engine).unwrap().surface.width();
        let w1 = render(&tight, &engine).unwrap().surface.width();
        assert!(w1 < w0, "overlap {w1} should be narrower than {w0}");
    }

    #[test]
    fn multiline_assigns_line_indices_and_stacks() {
        let mut plan = test_plan("Hello world testing", Direction::LeftToRight);
        plan.num_lines = 2;
        let out = render(&plan, &BlockFont::default()).unwrap();

        let line0: Vec<_> = out.boxes.iter().filter(|b| b.line_index == 0).collect();
        let line1: Vec<_> = out.boxes.iter().filter(|b| b.line_index == 1).collect();
        assert!(!line0.is_empty() && !line1.is_empty());
        assert_eq!(line0.len() + line1.len(), out.boxes.len());

        let max_y0 = line0.iter().map(|b| b.y1).max().unwrap();
        let min_y1 = line1.iter().map(|b| b.y0).min().unwrap();
        assert!(min_y1 >= max_y0, "line 1 must sit strictly below line 0");

        // Center alignment keeps line midlines close.
        let c0: f64 = line0.iter().map(|b| mid_x(b)).sum::<f64>() / line0.len() as f64;
        let c1: f64 = line1.iter().map(|b| mid_x(b)).sum::<f64>() / line1.len() as f64;
        assert!((c0 - c1).abs() < f64::from(out.surface.width()) / 3.0);
    }

    #[test]
    fn ttb_arc_concave_bends_midpoints_inward() {
        let mut plan = test_plan("東京都", Direction::TopToBottom);
        plan.curve_type = CurveType::Arc;
        plan.curve_intensity = 0.4;
        plan.curve_concave = true;
        let out = render(&plan, &BlockFont::default()).unwrap();

        assert_eq!(out.boxes.len(), 3);
        for w in out.boxes.windows(2) {
            assert!(mid_y(&w[1]) > mid_y(&w[0]));
        }
        let (first, mid, last) = (mid_x(&out.boxes[0]), mid_x(&out.boxes[1]), mid_x(&out.boxes[2]));
        assert!(
            mid < first && mid < last,
            "concave TTB arc: middle x {mid} must be left of ends {first}/{last}"
        );
    }

    #[test]
    fn ltr_arc_concave_raises_the_ends() {
        let mut plan = test_plan("mmmmmmm", Direction::LeftToRight);
        plan.curve_type = CurveType::Arc;
        plan.curve_intensity = 0.5;
        plan.curve_concave = true;
        let out = render(&plan, &BlockFont::default()).unwrap();

        let n = out.boxes.len();
        let (first, mid, last) = (
            mid_y(&out.boxes[0]),
            mid_y(&out.boxes[n / 2]),
            mid_y(&out.boxes[n - 1]),
        );
        assert!(
            mid > first && mid > last,
            "smile: middle y {mid} must be below ends {first}/{last}"
        );
    }

    #[test]
    fn sine_oscillates_vertically() {
        let mut plan = test_plan("mmmmmmmmmmmm", Direction::LeftToRight);
        plan.curve_type = CurveType::Sine;
        plan.curve_intensity = 0.6;
        let out = render(&plan, &BlockFont::default()).unwrap();

        let ys: Vec<f64> = out.boxes.iter().map(mid_y).collect();
        let spread = ys.iter().cloned().fold(f64::MIN, f64::max)
            - ys.iter().cloned().fold(f64::MAX, f64::min);
        assert!(spread > 3.0, "sine baseline should deflect, spread {spread}");
    }

    #[test]
    fn zero_intensity_curve_matches_straight_kernel() {
        let straight = test_plan("Hello", Direction::LeftToRight);
        let mut arc = straight.clone();
        arc.curve_type = CurveType::Arc;
        arc.curve_intensity = 0.0;

        let engine = BlockFont::default();
        let a = render(&straight, &engine).unwrap();
        let b = render(&arc, &engine).unwrap();
        assert_eq!(a.surface.as_raw(), b.surface.as_raw());
        assert_eq!(a.boxes, b.boxes);
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut plan = test_plan("Hello there", Direction::LeftToRight);
        plan.overlap_intensity = 0.4;
        let engine = BlockFont::default();
        let a = render(&plan, &engine).unwrap();
        let b = render(&plan, &engine).unwrap();
        assert_eq!(a.surface.as_raw(), b.surface.as_raw());
        assert_eq!(a.boxes, b.boxes);
    }
}
