//! Boolean algebra over selection masks.
//!
//! A mask is an RGBA raster with R = G = B holding the selection value
//! (0 = excluded, 255 = included) and A = 255. Every operation returns a new
//! raster; inputs are never touched. Pairwise operations require congruent
//! operands and fail with `DimensionMismatch` otherwise.

use std::fmt;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::canvas::ensure_same_size;
use crate::error::{EngineError, EngineResult};
use crate::ops::annotate::NormalizedBox;

/// Pairwise mask operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskOp {
    /// max(a, b)
    #[default]
    Union,
    /// min(a, b)
    Intersection,
    /// max(0, a - b)
    Subtract,
    /// |a - b|
    Xor,
}

impl MaskOp {
    pub fn all() -> &'static [MaskOp] {
        &[MaskOp::Union, MaskOp::Intersection, MaskOp::Subtract, MaskOp::Xor]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MaskOp::Union => "union",
            MaskOp::Intersection => "intersection",
            MaskOp::Subtract => "subtract",
            MaskOp::Xor => "xor",
        }
    }

    #[inline]
    fn channel(self, a: u8, b: u8) -> u8 {
        match self {
            MaskOp::Union => a.max(b),
            MaskOp::Intersection => a.min(b),
            MaskOp::Subtract => a.saturating_sub(b),
            MaskOp::Xor => a.abs_diff(b),
        }
    }

    /// Apply this operation to two congruent masks.
    pub fn apply(self, a: &RgbaImage, b: &RgbaImage) -> EngineResult<RgbaImage> {
        ensure_same_size(a, b)?;
        let mut out = a.clone();
        let dst: &mut [u8] = &mut out;
        dst.par_chunks_exact_mut(4)
            .zip(b.as_raw().par_chunks_exact(4))
            .for_each(|(p, q)| {
                p[0] = self.channel(p[0], q[0]);
                p[1] = self.channel(p[1], q[1]);
                p[2] = self.channel(p[2], q[2]);
            });
        Ok(out)
    }
}

impl fmt::Display for MaskOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaskOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "union" | "add" => Ok(MaskOp::Union),
            "intersection" | "intersect" => Ok(MaskOp::Intersection),
            "subtract" => Ok(MaskOp::Subtract),
            "xor" => Ok(MaskOp::Xor),
            other => Err(format!("unknown mask operation '{}'", other)),
        }
    }
}

pub fn union(a: &RgbaImage, b: &RgbaImage) -> EngineResult<RgbaImage> {
    MaskOp::Union.apply(a, b)
}

pub fn intersection(a: &RgbaImage, b: &RgbaImage) -> EngineResult<RgbaImage> {
    MaskOp::Intersection.apply(a, b)
}

pub fn subtract(a: &RgbaImage, b: &RgbaImage) -> EngineResult<RgbaImage> {
    MaskOp::Subtract.apply(a, b)
}

pub fn xor(a: &RgbaImage, b: &RgbaImage) -> EngineResult<RgbaImage> {
    MaskOp::Xor.apply(a, b)
}

/// `255 - value` on R, G and B; alpha untouched.
pub fn invert(a: &RgbaImage) -> RgbaImage {
    let mut out = a.clone();
    let dst: &mut [u8] = &mut out;
    dst.par_chunks_exact_mut(4).for_each(|p| {
        p[0] = 255 - p[0];
        p[1] = 255 - p[1];
        p[2] = 255 - p[2];
    });
    out
}

/// Left-fold `op` over `masks`, seeded with the first one.
pub fn combine(masks: &[RgbaImage], op: MaskOp) -> EngineResult<RgbaImage> {
    let (first, rest) = masks.split_first().ok_or(EngineError::EmptyMaskSet)?;
    let mut acc = first.clone();
    for mask in rest {
        acc = op.apply(&acc, mask)?;
    }
    Ok(acc)
}

// ============================================================================
// MASK CONSTRUCTION
// ============================================================================

/// Expand a single-channel image into the RGBA mask representation.
pub fn from_gray(gray: &GrayImage) -> RgbaImage {
    let (w, h) = gray.dimensions();
    let mut out = RgbaImage::new(w, h);
    let dst: &mut [u8] = &mut out;
    dst.par_chunks_exact_mut(4)
        .zip(gray.as_raw().par_iter())
        .for_each(|(p, &v)| p.copy_from_slice(&[v, v, v, 255]));
    out
}

/// Selection values of a mask (its R channel).
pub fn to_gray(mask: &RgbaImage) -> GrayImage {
    let (w, h) = mask.dimensions();
    let values: Vec<u8> = mask.as_raw().par_chunks_exact(4).map(|p| p[0]).collect();
    GrayImage::from_raw(w, h, values).unwrap_or_else(|| GrayImage::new(w, h))
}

/// Normalise any decoded raster into a mask by taking its luminance.
pub fn to_mask(img: &RgbaImage) -> RgbaImage {
    let luma = DynamicImage::ImageRgba8(img.clone()).to_luma8();
    from_gray(&luma)
}

/// Resize a mask to `width` x `height`. Pairwise operations never do this
/// implicitly; callers that want to fit a mask onto an image ask for it.
pub fn resize_mask(mask: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    let gray = to_gray(mask);
    from_gray(&imageops::resize(&gray, width, height, FilterType::Lanczos3))
}

/// White inside `bbox` (normalised 0–1000 space), black elsewhere.
pub fn mask_from_box(width: u32, height: u32, bbox: &NormalizedBox) -> RgbaImage {
    let (x0, y0, x1, y1) = bbox.to_pixel_bounds(width, height);
    let mut gray = GrayImage::new(width, height);
    for y in y0..y1 {
        for x in x0..x1 {
            gray.put_pixel(x, y, Luma([255]));
        }
    }
    from_gray(&gray)
}

/// Place a box-sized segmentation mask onto a full-size black canvas.
///
/// The small mask is resized to the box's pixel size, binarised at the
/// midpoint (>127) and pasted at the box's top-left corner.
pub fn expand_segment_mask(
    small: &RgbaImage,
    width: u32,
    height: u32,
    bbox: &NormalizedBox,
) -> RgbaImage {
    let (x0, y0, x1, y1) = bbox.to_pixel_bounds(width, height);
    let box_w = x1.saturating_sub(x0).max(1);
    let box_h = y1.saturating_sub(y0).max(1);

    let gray = DynamicImage::ImageRgba8(small.clone()).to_luma8();
    let resized = imageops::resize(&gray, box_w, box_h, FilterType::Lanczos3);

    let mut full = GrayImage::new(width, height);
    for (lx, ly, px) in resized.enumerate_pixels() {
        let gx = x0 + lx;
        let gy = y0 + ly;
        if gx < width && gy < height && px[0] > 127 {
            full.put_pixel(gx, gy, Luma([255]));
        }
    }
    from_gray(&full)
}

/// Build a mask from raw per-pixel values in row-major order.
///
/// Values that are all within 0.0..=1.0 are treated as fractions and scaled
/// to 0..=255; anything else is clamped into that range.
pub fn mask_from_values(values: &[f32], width: u32, height: u32) -> EngineResult<RgbaImage> {
    let expected = width as usize * height as usize;
    if values.len() != expected {
        return Err(EngineError::mismatch(
            (width, height),
            (values.len() as u32, 1),
        ));
    }
    let fractional = values.iter().all(|v| *v <= 1.0);
    let scale = if fractional { 255.0 } else { 1.0 };
    let data: Vec<u8> = values
        .iter()
        .map(|v| (v * scale).round().clamp(0.0, 255.0) as u8)
        .collect();
    let gray = GrayImage::from_raw(width, height, data)
        .ok_or_else(|| EngineError::mismatch((width, height), (values.len() as u32, 1)))?;
    Ok(from_gray(&gray))
}

/// Uniform mask filled with `value`.
pub fn solid_mask(width: u32, height: u32, value: u8) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([value, value, value, 255]))
}
