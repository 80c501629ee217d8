use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::{blend_pixel, BlendMode};

/// Outline shapes the drawing overlay and annotations can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
}

/// A shape placed on the canvas, in canvas pixel units.
#[derive(Clone, Debug)]
pub struct PlacedShape {
    pub kind: ShapeKind,
    pub cx: f32,
    pub cy: f32,
    /// Half-width.
    pub hw: f32,
    /// Half-height.
    pub hh: f32,
    pub outline_width: f32,
    pub color: Rgba<u8>,
    pub anti_alias: bool,
}

impl PlacedShape {
    /// Shape spanning the drag from `start` to `end` (either corner order).
    ///
    /// Returns `None` for a zero-area drag, so a click without movement
    /// leaves nothing behind.
    pub fn from_drag(
        kind: ShapeKind,
        start: (f32, f32),
        end: (f32, f32),
        outline_width: f32,
        color: Rgba<u8>,
    ) -> Option<Self> {
        let hw = (end.0 - start.0).abs() * 0.5;
        let hh = (end.1 - start.1).abs() * 0.5;
        if hw < 0.5 && hh < 0.5 {
            return None;
        }
        Some(Self {
            kind,
            cx: (start.0 + end.0) * 0.5,
            cy: (start.1 + end.1) * 0.5,
            hw,
            hh,
            outline_width: outline_width.max(1.0),
            color,
            anti_alias: true,
        })
    }
}

// ============================================================================
// SDF functions: signed distance, negative inside
// ============================================================================

/// SDF for a box centred at origin with half-extents (hx, hy).
#[inline]
fn sdf_box(px: f32, py: f32, hx: f32, hy: f32) -> f32 {
    let dx = px.abs() - hx;
    let dy = py.abs() - hy;
    let outside = (dx.max(0.0) * dx.max(0.0) + dy.max(0.0) * dy.max(0.0)).sqrt();
    let inside = dx.max(dy).min(0.0);
    outside + inside
}

/// SDF for an ellipse (approximation).
#[inline]
fn sdf_ellipse(px: f32, py: f32, rx: f32, ry: f32) -> f32 {
    // Degenerate ellipses collapse to a line segment
    if rx < 1e-3 || ry < 1e-3 {
        return sdf_box(px, py, rx, ry);
    }
    let nx = px / rx;
    let ny = py / ry;
    let len = (nx * nx + ny * ny).sqrt();
    if len < 1e-8 {
        return -rx.min(ry);
    }
    let scale = (rx * rx * ny * ny + ry * ry * nx * nx).sqrt() / (rx * ry * len);
    (len - 1.0) / scale
}

pub fn shape_sdf(kind: ShapeKind, px: f32, py: f32, hx: f32, hy: f32) -> f32 {
    match kind {
        ShapeKind::Rectangle => sdf_box(px, py, hx, hy),
        ShapeKind::Ellipse => sdf_ellipse(px, py, hx, hy),
    }
}

/// Rasterize the outline of `placed` onto `img`, composited source-over.
///
/// The stroke is centred on the shape's edge: a pixel is covered when its
/// centre lies within `outline_width / 2` of the boundary.
pub fn rasterize_outline(img: &mut RgbaImage, placed: &PlacedShape) {
    let (canvas_w, canvas_h) = img.dimensions();
    let pad = placed.outline_width + 2.0;

    let x0 = ((placed.cx - placed.hw - pad).floor() as i64).max(0);
    let y0 = ((placed.cy - placed.hh - pad).floor() as i64).max(0);
    let x1 = ((placed.cx + placed.hw + pad).ceil() as i64).min(canvas_w as i64);
    let y1 = ((placed.cy + placed.hh + pad).ceil() as i64).min(canvas_h as i64);
    if x1 <= x0 || y1 <= y0 {
        return;
    }

    let row_bytes = canvas_w as usize * 4;
    let outline_half = placed.outline_width * 0.5;
    let color = placed.color;
    let aa = placed.anti_alias;
    let buf: &mut [u8] = img;

    buf.par_chunks_mut(row_bytes)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(row, row_buf)| {
            let py = row as f32 + 0.5 - placed.cy;
            for col in x0 as usize..x1 as usize {
                let px = col as f32 + 0.5 - placed.cx;
                let d = shape_sdf(placed.kind, px, py, placed.hw, placed.hh);
                let band = d.abs() - outline_half;
                let coverage = if aa {
                    smoothstep(0.5, -0.5, band)
                } else if band < 0.0 {
                    1.0
                } else {
                    0.0
                };
                if coverage > 0.001 {
                    let a = (color[3] as f32 * coverage).round().min(255.0) as u8;
                    let idx = col * 4;
                    let dst = Rgba([
                        row_buf[idx],
                        row_buf[idx + 1],
                        row_buf[idx + 2],
                        row_buf[idx + 3],
                    ]);
                    let out = blend_pixel(
                        dst,
                        Rgba([color[0], color[1], color[2], a]),
                        BlendMode::Normal,
                        1.0,
                    );
                    row_buf[idx..idx + 4].copy_from_slice(&out.0);
                }
            }
        });
}

/// Solid axis-aligned rectangle `[x0, x1) x [y0, y1)`, clipped to the image
/// and composited source-over.
pub fn fill_rect(img: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    let x0 = x0.clamp(0, w as i64) as u32;
    let x1 = x1.clamp(0, w as i64) as u32;
    let y0 = y0.clamp(0, h as i64) as u32;
    let y1 = y1.clamp(0, h as i64) as u32;
    for y in y0..y1 {
        for x in x0..x1 {
            let dst = img.get_pixel_mut(x, y);
            *dst = blend_pixel(*dst, color, BlendMode::Normal, 1.0);
        }
    }
}

/// Smoothstep between edge0 and edge1.
#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
