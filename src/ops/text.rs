use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use image::{Rgba, RgbaImage};
use std::path::Path;

use crate::canvas::{blend_pixel, BlendMode};
use crate::error::{EngineError, EngineResult};

/// Horizontal advance of one character when no font is available, as a
/// fraction of the font size.
const FALLBACK_ADVANCE: f32 = 0.6;

/// Parse font bytes (TTF/OTF) into a shareable font handle.
pub fn font_from_bytes(data: Vec<u8>) -> EngineResult<FontArc> {
    FontArc::try_from_vec(data).map_err(|e| EngineError::Font {
        message: e.to_string(),
    })
}

/// Load a font file from disk.
pub fn load_font(path: &Path) -> EngineResult<FontArc> {
    let data = std::fs::read(path)?;
    let font = font_from_bytes(data)?;
    log::debug!("Loaded label font from {}", path.display());
    Ok(font)
}

/// Lay out a single line of text left-aligned at x=0.
/// Returns `(glyphs, total_width, ascent)`; each glyph is `(id, x, baseline_y)`.
pub fn layout_text(
    font: &FontArc,
    text: &str,
    font_size: f32,
) -> (Vec<(GlyphId, f32, f32)>, f32, f32) {
    let scaled = font.as_scaled(font_size);
    let ascent = scaled.ascent();

    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x, ascent));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    (glyphs, cursor_x, ascent)
}

/// Rendered width of `text`, estimated from the character count when no
/// font is loaded.
pub fn text_width(font: Option<&FontArc>, text: &str, font_size: f32) -> f32 {
    match font {
        Some(font) => layout_text(font, text, font_size).1,
        None => text.chars().count() as f32 * font_size * FALLBACK_ADVANCE,
    }
}

/// Draw one line of text onto `img` with its top edge at `y_top`.
///
/// Glyph coverage is blended source-over with `color`; pixels that fall
/// outside the image are dropped.
pub fn draw_text(
    img: &mut RgbaImage,
    font: &FontArc,
    text: &str,
    font_size: f32,
    x: f32,
    y_top: f32,
    color: Rgba<u8>,
) {
    let (w, h) = img.dimensions();
    let (glyphs, _, _) = layout_text(font, text, font_size);

    for (glyph_id, gx, gy) in glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(x + gx, y_top + gy));
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|px, py, cov| {
            let cx = bounds.min.x as i32 + px as i32;
            let cy = bounds.min.y as i32 + py as i32;
            if cx < 0 || cy < 0 || cx as u32 >= w || cy as u32 >= h {
                return;
            }
            let a = (color[3] as f32 * cov.clamp(0.0, 1.0)).round() as u8;
            if a == 0 {
                return;
            }
            let dst = img.get_pixel_mut(cx as u32, cy as u32);
            *dst = blend_pixel(*dst, Rgba([color[0], color[1], color[2], a]), BlendMode::Normal, 1.0);
        });
    }
}
