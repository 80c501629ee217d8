//! Alpha-channel compositing: masked extraction and removal, pairwise alpha
//! blending, and flattening a layer stack with per-layer blend modes.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::{blank, blend_pixel, ensure_same_size, mul_div_255, scale_alpha, unit_to_u8, Layer};
use crate::components::layers::LayerStore;
use crate::error::EngineResult;
use crate::ops::mask;

/// Keep the parts of `image` selected by `mask` ("destination-in").
///
/// `out.a = image.a * mask.r / 255`; colour channels are unchanged. With
/// `invert` the mask is inverted first.
pub fn extract(image: &RgbaImage, mask: &RgbaImage, invert: bool) -> EngineResult<RgbaImage> {
    ensure_same_size(image, mask)?;
    let inverted;
    let mask = if invert {
        inverted = mask::invert(mask);
        &inverted
    } else {
        mask
    };
    Ok(scale_alpha_by_mask(image, mask, |m| m))
}

/// Clear the parts of `image` selected by `mask` ("destination-out").
///
/// `out.a = image.a * (255 - mask.r) / 255`.
pub fn remove(image: &RgbaImage, mask: &RgbaImage) -> EngineResult<RgbaImage> {
    ensure_same_size(image, mask)?;
    Ok(scale_alpha_by_mask(image, mask, |m| 255 - m))
}

fn scale_alpha_by_mask(image: &RgbaImage, mask: &RgbaImage, f: impl Fn(u8) -> u8 + Sync) -> RgbaImage {
    let mut out = image.clone();
    let dst: &mut [u8] = &mut out;
    dst.par_chunks_exact_mut(4)
        .zip(mask.as_raw().par_chunks_exact(4))
        .for_each(|(p, m)| p[3] = mul_div_255(p[3], f(m[0])));
    out
}

/// Source-over `foreground` onto `background` at `(offset_x, offset_y)`.
///
/// The foreground's alpha is scaled by `opacity` first:
/// `a = opacity * fg.a / 255`, `rgb = fg.rgb * a + bg.rgb * (1 - a)`,
/// `alpha = a * 255 + bg.a * (1 - a)`. The result has the background's
/// size; parts of the foreground outside it are clipped.
pub fn blend_pair(
    background: &RgbaImage,
    foreground: &RgbaImage,
    offset_x: i32,
    offset_y: i32,
    opacity: f32,
) -> RgbaImage {
    let mut out = background.clone();
    let opacity = opacity.clamp(0.0, 1.0);
    let (bw, bh) = background.dimensions();
    let (fw, fh) = foreground.dimensions();

    // Overlap in background coordinates
    let x0 = offset_x.max(0) as i64;
    let y0 = offset_y.max(0) as i64;
    let x1 = (offset_x as i64 + fw as i64).min(bw as i64);
    let y1 = (offset_y as i64 + fh as i64).min(bh as i64);
    if x1 <= x0 || y1 <= y0 || opacity <= 0.0 {
        return out;
    }

    let row_bytes = bw as usize * 4;
    let dst: &mut [u8] = &mut out;
    dst.par_chunks_mut(row_bytes)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(y, row)| {
            let fy = (y as i64 - offset_y as i64) as u32;
            for x in x0 as usize..x1 as usize {
                let fx = (x as i64 - offset_x as i64) as u32;
                let fg = foreground.get_pixel(fx, fy);
                let a = opacity * fg[3] as f32 / 255.0;
                if a <= 0.0 {
                    continue;
                }
                let idx = x * 4;
                for c in 0..3 {
                    let v = fg[c] as f32 * a + row[idx + c] as f32 * (1.0 - a);
                    row[idx + c] = v.round().clamp(0.0, 255.0) as u8;
                }
                let bg_a = row[idx + 3] as f32 / 255.0;
                row[idx + 3] = unit_to_u8(a + bg_a * (1.0 - a));
            }
        });
    out
}

/// Flatten layers, in the given order, into one raster.
///
/// Invisible layers, layers whose pixels failed to decode and empty (zero
/// width or height) rasters are skipped. The first remaining layer defines
/// the output size; each later layer is
/// composited at the origin with its blend mode and opacity and clipped to
/// that size. No visible layers yields a 0x0 raster.
pub fn flatten<'a, I>(layers: I) -> RgbaImage
where
    I: IntoIterator<Item = &'a Layer>,
{
    let mut acc: Option<RgbaImage> = None;

    for layer in layers.into_iter().filter(|l| l.visible) {
        let Some(raster) = layer.raster() else {
            log::warn!("Skipping layer '{}' ({}): pixels unavailable", layer.name, layer.id);
            continue;
        };
        if raster.width() == 0 || raster.height() == 0 {
            log::debug!("Skipping empty layer '{}' ({})", layer.name, layer.id);
            continue;
        }
        match acc.as_mut() {
            None => acc = Some(scale_alpha(raster, layer.opacity)),
            Some(base) => composite_onto(base, raster, layer),
        }
    }

    acc.unwrap_or_else(|| blank(0, 0))
}

/// Flatten the store's visible layers bottom to top.
pub fn flatten_store(store: &LayerStore) -> RgbaImage {
    flatten(store.visible_layers_bottom_to_top())
}

fn composite_onto(base: &mut RgbaImage, top: &RgbaImage, layer: &Layer) {
    let (bw, bh) = base.dimensions();
    let (tw, th) = top.dimensions();
    if bw == 0 || bh == 0 {
        return;
    }
    if (tw, th) != (bw, bh) {
        log::debug!(
            "Layer '{}' is {}x{}, clipping to {}x{}",
            layer.name, tw, th, bw, bh
        );
    }
    let mode = layer.blend_mode;
    let opacity = layer.opacity;
    let cols = bw.min(tw) as usize;
    let row_bytes = bw as usize * 4;
    let dst: &mut [u8] = base;

    dst.par_chunks_mut(row_bytes)
        .take(bh.min(th) as usize)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..cols {
                let idx = x * 4;
                let b = Rgba([row[idx], row[idx + 1], row[idx + 2], row[idx + 3]]);
                let t = *top.get_pixel(x as u32, y as u32);
                let out = blend_pixel(b, t, mode, opacity);
                row[idx..idx + 4].copy_from_slice(&out.0);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{BlendMode, LayerKind};

    fn opaque(w: u32, h: u32, c: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([c[0], c[1], c[2], 255]))
    }

    fn gradient_mask(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            let v = ((x * 13 + y * 29) % 256) as u8;
            Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn extract_and_remove_are_complementary() {
        let img = opaque(32, 32, [10, 20, 30]);
        let m = gradient_mask(32, 32);
        let kept = extract(&img, &m, false).unwrap();
        let cleared = remove(&img, &m).unwrap();
        for (a, b) in kept.pixels().zip(cleared.pixels()) {
            assert_eq!(a[3] as u16 + b[3] as u16, 255);
            assert_eq!(&a.0[..3], &[10, 20, 30]);
        }
    }

    #[test]
    fn inverted_extract_equals_remove() {
        let img = opaque(8, 8, [1, 2, 3]);
        let m = gradient_mask(8, 8);
        assert_eq!(extract(&img, &m, true).unwrap(), remove(&img, &m).unwrap());
    }

    #[test]
    fn extract_rejects_mismatch() {
        assert!(extract(&opaque(4, 4, [0; 3]), &gradient_mask(5, 4), false).is_err());
        assert!(remove(&opaque(4, 4, [0; 3]), &gradient_mask(4, 5)).is_err());
    }

    #[test]
    fn blend_pair_formula() {
        let bg = opaque(4, 4, [0, 0, 0]);
        let fg = opaque(2, 2, [200, 100, 50]);
        let out = blend_pair(&bg, &fg, 1, 1, 0.5);
        assert_eq!(*out.get_pixel(1, 1), Rgba([100, 50, 25, 255]));
        assert_eq!(*out.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(*out.get_pixel(3, 3), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn blend_pair_clips_negative_offsets() {
        let bg = RgbaImage::new(4, 4);
        let fg = opaque(4, 4, [255, 255, 255]);
        let out = blend_pair(&bg, &fg, -2, -2, 1.0);
        assert_eq!(*out.get_pixel(1, 1), Rgba([255, 255, 255, 255]));
        assert_eq!(out.get_pixel(2, 2)[3], 0);
        assert_eq!(blend_pair(&bg, &fg, 10, 0, 1.0), bg);
    }

    #[test]
    fn flatten_single_opaque_layer_is_identity() {
        let raster = gradient_mask(16, 16);
        let layer = Layer::new("only", LayerKind::Image, raster.clone());
        assert_eq!(flatten([&layer]), raster);
    }

    #[test]
    fn flatten_empty_is_blank() {
        let mut hidden = Layer::new("h", LayerKind::Image, opaque(2, 2, [1, 1, 1]));
        hidden.visible = false;
        assert_eq!(flatten([&hidden]).dimensions(), (0, 0));
        assert_eq!(flatten(std::iter::empty::<&Layer>()).dimensions(), (0, 0));
    }

    #[test]
    fn flatten_skips_empty_rasters() {
        let empty = Layer::new("empty", LayerKind::Image, RgbaImage::new(0, 4));
        let base = Layer::new("base", LayerKind::Image, opaque(4, 4, [9, 8, 7]));
        let out = flatten([&empty, &base]);
        assert_eq!(out.dimensions(), (4, 4));
        assert_eq!(*out.get_pixel(3, 3), Rgba([9, 8, 7, 255]));

        let previous = Layer::new("previous", LayerKind::Image, flatten(std::iter::empty::<&Layer>()));
        assert_eq!(flatten([&base, &previous]), out);
        assert_eq!(flatten([&previous]).dimensions(), (0, 0));
    }

    #[test]
    fn flatten_applies_blend_mode() {
        let base = Layer::new("base", LayerKind::Image, opaque(2, 2, [200, 200, 200]));
        let mut top = Layer::new("top", LayerKind::Image, opaque(2, 2, [128, 128, 128]));
        top.blend_mode = BlendMode::Multiply;
        let out = flatten([&base, &top]);
        assert_eq!(*out.get_pixel(0, 0), Rgba([100, 100, 100, 255]));
    }

    #[test]
    fn first_layer_opacity_applies() {
        let mut base = Layer::new("base", LayerKind::Image, opaque(1, 1, [9, 9, 9]));
        base.opacity = 0.5;
        assert_eq!(flatten([&base]).get_pixel(0, 0)[3], 128);
    }
}
