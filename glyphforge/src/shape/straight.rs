//! Straight-baseline rendering for all four directions.

use image::RgbaImage;

use crate::foundation::core::{CharacterBox, Direction};
use crate::plan::Plan;
use crate::shape::font::FontMetrics;
use crate::shape::{LineLayout, MARGIN, color_at, glyph_tile};

pub(crate) fn render(
    line: &LineLayout,
    metrics: &FontMetrics,
    plan: &Plan,
    color_start: usize,
) -> (RgbaImage, Vec<CharacterBox>) {
    if plan.direction.is_horizontal() {
        render_horizontal(line, metrics, plan, color_start)
    } else {
        render_vertical(line, metrics, plan, color_start)
    }
}

fn render_horizontal(
    line: &LineLayout,
    metrics: &FontMetrics,
    plan: &Plan,
    color_start: usize,
) -> (RgbaImage, Vec<CharacterBox>) {
    let width = (line.total_advance.ceil() as i32 + 2 * MARGIN).max(1) as u32;
    let height = (metrics.height().ceil() as i32 + 2 * MARGIN).max(1) as u32;
    let baseline = MARGIN + metrics.ascent.round() as i32;

    let mut surface = RgbaImage::new(width, height);
    let mut boxes = Vec::with_capacity(line.glyphs.len());
    let mut cursor = MARGIN as f32;

    for (i, g) in line.glyphs.iter().enumerate() {
        if g.raster.is_blank() {
            boxes.push(CharacterBox::new(
                g.ch,
                cursor.floor() as i32,
                baseline - metrics.ascent.ceil() as i32,
                (cursor + g.advance).ceil() as i32,
                baseline + metrics.descent.ceil() as i32,
            ));
        } else {
            let x = cursor.round() as i32 + g.raster.left;
            let y = baseline + g.raster.top;
            let tile = glyph_tile(&g.raster, color_at(&plan.glyph_colors, color_start + i));
            image::imageops::overlay(&mut surface, &tile, i64::from(x), i64::from(y));
            boxes.push(CharacterBox::new(
                g.ch,
                x,
                y,
                x + g.raster.width as i32,
                y + g.raster.height as i32,
            ));
        }
        cursor += g.advance;
    }

    (surface, boxes)
}

fn render_vertical(
    line: &LineLayout,
    _metrics: &FontMetrics,
    plan: &Plan,
    color_start: usize,
) -> (RgbaImage, Vec<CharacterBox>) {
    let width = (line.max_ink_w.max(1) as i32 + 2 * MARGIN).max(1) as u32;
    let height = (line.total_advance.ceil() as i32 + 2 * MARGIN).max(1) as u32;

    let mut surface = RgbaImage::new(width, height);
    let mut boxes = Vec::with_capacity(line.glyphs.len());

    // TTB walks down from the top margin; BTT walks up from the bottom.
    let bottom_to_top = plan.direction == Direction::BottomToTop;
    let mut cursor = if bottom_to_top {
        height as f32 - MARGIN as f32
    } else {
        MARGIN as f32
    };

    for (i, g) in line.glyphs.iter().enumerate() {
        if bottom_to_top {
            cursor -= g.advance;
        }
        let y = cursor.round() as i32;

        if g.raster.is_blank() {
            let cell_h = g.advance.ceil().max(1.0) as i32;
            boxes.push(CharacterBox::new(
                g.ch,
                MARGIN,
                y,
                (width as i32 - MARGIN).max(MARGIN + 1),
                y + cell_h,
            ));
        } else {
            let x = (width as i32 - g.raster.width as i32) / 2;
            let tile = glyph_tile(&g.raster, color_at(&plan.glyph_colors, color_start + i));
            image::imageops::overlay(&mut surface, &tile, i64::from(x), i64::from(y));
            boxes.push(CharacterBox::new(
                g.ch,
                x,
                y,
                x + g.raster.width as i32,
                y + g.raster.height.max(1) as i32,
            ));
        }

        if !bottom_to_top {
            cursor += g.advance;
        }
    }

    (surface, boxes)
}
