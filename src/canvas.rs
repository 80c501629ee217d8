use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// A pixel with zero alpha.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

// ============================================================================
// RASTER HELPERS
// ============================================================================

/// Fully transparent raster of the given size.
pub fn blank(width: u32, height: u32) -> RgbaImage {
    RgbaImage::new(width, height)
}

/// Fails with `DimensionMismatch` unless `b` has exactly the size of `a`.
pub fn ensure_same_size(a: &RgbaImage, b: &RgbaImage) -> EngineResult<()> {
    if a.dimensions() != b.dimensions() {
        return Err(EngineError::mismatch(a.dimensions(), b.dimensions()));
    }
    Ok(())
}

/// True when at least one pixel has non-zero alpha.
pub fn has_visible_pixels(img: &RgbaImage) -> bool {
    img.as_raw().par_chunks_exact(4).any(|px| px[3] > 0)
}

/// `a * b / 255` rounded to the nearest integer.
#[inline]
pub fn mul_div_255(a: u8, b: u8) -> u8 {
    ((a as u32 * b as u32 + 127) / 255) as u8
}

/// Round and clamp a unit-range channel value back into 0..=255.
#[inline]
pub fn unit_to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Copy of `img` with every alpha value multiplied by `opacity`.
pub fn scale_alpha(img: &RgbaImage, opacity: f32) -> RgbaImage {
    let opacity = opacity.clamp(0.0, 1.0);
    let mut out = img.clone();
    if opacity >= 1.0 {
        return out;
    }
    let dst: &mut [u8] = &mut out;
    dst.par_chunks_exact_mut(4).for_each(|px| {
        px[3] = (px[3] as f32 * opacity).round().clamp(0.0, 255.0) as u8;
    });
    out
}

// ============================================================================
// BLEND MODES
// ============================================================================

/// Per-channel formula used when a layer is composited onto the layers below it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
}

impl BlendMode {
    /// Returns all blend modes in display order
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Difference,
            BlendMode::Exclusion,
        ]
    }

    /// Stable name used in project files.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color-dodge",
            BlendMode::ColorBurn => "color-burn",
            BlendMode::HardLight => "hard-light",
            BlendMode::SoftLight => "soft-light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
        }
    }

    /// Parse a stored name, falling back to Normal for anything unknown.
    pub fn from_name_lossy(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            log::warn!("unknown blend mode '{}', using normal", name);
            BlendMode::Normal
        })
    }

    /// Apply the separable blend function B(backdrop, source) to one channel.
    fn channel(self, cb: f32, cs: f32) -> f32 {
        match self {
            BlendMode::Normal => cs,
            BlendMode::Multiply => cb * cs,
            BlendMode::Screen => cb + cs - cb * cs,
            BlendMode::Overlay => hard_light_channel(cs, cb),
            BlendMode::Darken => cb.min(cs),
            BlendMode::Lighten => cb.max(cs),
            BlendMode::ColorDodge => color_dodge_channel(cb, cs),
            BlendMode::ColorBurn => color_burn_channel(cb, cs),
            BlendMode::HardLight => hard_light_channel(cb, cs),
            BlendMode::SoftLight => soft_light_channel(cb, cs),
            BlendMode::Difference => (cb - cs).abs(),
            BlendMode::Exclusion => cb + cs - 2.0 * cb * cs,
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        BlendMode::all()
            .iter()
            .copied()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| format!("unknown blend mode '{}'", s))
    }
}

fn hard_light_channel(cb: f32, cs: f32) -> f32 {
    if cs <= 0.5 {
        cb * 2.0 * cs
    } else {
        let s = 2.0 * cs - 1.0;
        cb + s - cb * s
    }
}

fn color_dodge_channel(cb: f32, cs: f32) -> f32 {
    if cb <= 0.0 {
        0.0
    } else if cs >= 1.0 {
        1.0
    } else {
        (cb / (1.0 - cs)).min(1.0)
    }
}

fn color_burn_channel(cb: f32, cs: f32) -> f32 {
    if cb >= 1.0 {
        1.0
    } else if cs <= 0.0 {
        0.0
    } else {
        1.0 - ((1.0 - cb) / cs).min(1.0)
    }
}

/// W3C Soft Light formula.
fn soft_light_channel(cb: f32, cs: f32) -> f32 {
    if cs <= 0.5 {
        cb - (1.0 - 2.0 * cs) * cb * (1.0 - cb)
    } else {
        let d = if cb <= 0.25 {
            ((16.0 * cb - 12.0) * cb + 4.0) * cb
        } else {
            cb.sqrt()
        };
        cb + (2.0 * cs - 1.0) * (d - cb)
    }
}

/// Composite `top` over `base` with `mode`, scaling the top alpha by `opacity`.
///
/// The blended colour is mixed with the raw source colour by the backdrop
/// alpha before source-over, so blending onto transparency yields the source.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    // Fast path: fully transparent top pixel, nothing to blend
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }

    // Fast path: Normal blend, full opacity, fully opaque top pixel: overwrite
    if mode == BlendMode::Normal && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);
    let base_a = base[3] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity;

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return TRANSPARENT;
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let cb = base[c] as f32 / 255.0;
        let cs = top[c] as f32 / 255.0;
        let mixed = (1.0 - base_a) * cs + base_a * mode.channel(cb, cs);
        let co = mixed * top_a + cb * base_a * (1.0 - top_a);
        out[c] = unit_to_u8(co / out_a);
    }
    out[3] = unit_to_u8(out_a);
    Rgba(out)
}

// ============================================================================
// LAYERS
// ============================================================================

/// Stable, opaque layer identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    pub fn new() -> Self {
        LayerId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerId {
    fn from(s: &str) -> Self {
        LayerId(s.to_string())
    }
}

impl From<String> for LayerId {
    fn from(s: String) -> Self {
        LayerId(s)
    }
}

/// Layer type tag as written in project files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    #[default]
    Image,
    Mask,
    Generated,
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Image => "image",
            LayerKind::Mask => "mask",
            LayerKind::Generated => "generated",
        }
    }
}

/// Decoded pixels of a layer, or the reason they could not be decoded.
///
/// Committed rasters are shared and never patched in place; replacing a
/// layer's pixels swaps the whole `Arc`.
#[derive(Clone, Debug)]
pub enum LayerPixels {
    Ready(Arc<RgbaImage>),
    /// Keeps the original encoded payload so saving round-trips it untouched.
    Broken { encoded: String, reason: String },
}

impl LayerPixels {
    pub fn ready(img: RgbaImage) -> Self {
        LayerPixels::Ready(Arc::new(img))
    }

    pub fn raster(&self) -> Option<&RgbaImage> {
        match self {
            LayerPixels::Ready(img) => Some(img),
            LayerPixels::Broken { .. } => None,
        }
    }

    pub fn is_broken(&self) -> bool {
        matches!(self, LayerPixels::Broken { .. })
    }
}

/// Type-specific payload of a layer. Mask layers hold a selection raster
/// (R=G=B luminance, 0 = excluded, 255 = included).
#[derive(Clone, Debug)]
pub enum LayerContent {
    Image(LayerPixels),
    Mask(LayerPixels),
    Generated(LayerPixels),
}

impl LayerContent {
    pub fn new(kind: LayerKind, pixels: LayerPixels) -> Self {
        match kind {
            LayerKind::Image => LayerContent::Image(pixels),
            LayerKind::Mask => LayerContent::Mask(pixels),
            LayerKind::Generated => LayerContent::Generated(pixels),
        }
    }

    pub fn kind(&self) -> LayerKind {
        match self {
            LayerContent::Image(_) => LayerKind::Image,
            LayerContent::Mask(_) => LayerKind::Mask,
            LayerContent::Generated(_) => LayerKind::Generated,
        }
    }

    pub fn pixels(&self) -> &LayerPixels {
        match self {
            LayerContent::Image(p) | LayerContent::Mask(p) | LayerContent::Generated(p) => p,
        }
    }

    /// Same variant, new pixels.
    pub fn with_pixels(&self, pixels: LayerPixels) -> Self {
        LayerContent::new(self.kind(), pixels)
    }
}

/// One element of the composition stack.
#[derive(Clone, Debug)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    /// Multiplies the per-pixel alpha during flattening (0.0..=1.0).
    pub opacity: f32,
    pub blend_mode: BlendMode,
    /// Flattened from lowest to highest; values need not be contiguous.
    pub order: i64,
    pub content: LayerContent,
}

impl Layer {
    pub fn new(name: impl Into<String>, kind: LayerKind, raster: RgbaImage) -> Self {
        Self::with_pixels(name, kind, LayerPixels::ready(raster))
    }

    pub fn with_pixels(name: impl Into<String>, kind: LayerKind, pixels: LayerPixels) -> Self {
        Self {
            id: LayerId::new(),
            name: name.into(),
            visible: true,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            order: 0,
            content: LayerContent::new(kind, pixels),
        }
    }

    pub fn kind(&self) -> LayerKind {
        self.content.kind()
    }

    pub fn pixels(&self) -> &LayerPixels {
        self.content.pixels()
    }

    /// Decoded raster, or `None` for a broken layer.
    pub fn raster(&self) -> Option<&RgbaImage> {
        self.content.pixels().raster()
    }

    /// Decoded raster or a `LayerUnavailable` error naming this layer.
    pub fn require_raster(&self) -> EngineResult<&RgbaImage> {
        self.raster().ok_or_else(|| EngineError::LayerUnavailable {
            id: self.id.to_string(),
        })
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.raster().map(|r| r.dimensions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_mode_names_roundtrip() {
        for mode in BlendMode::all() {
            assert_eq!(mode.as_str().parse::<BlendMode>().unwrap(), *mode);
        }
        assert_eq!("Color_Dodge".parse::<BlendMode>().unwrap(), BlendMode::ColorDodge);
        assert_eq!(BlendMode::from_name_lossy("vivid-light"), BlendMode::Normal);
    }

    #[test]
    fn blend_mode_serde_uses_kebab_case() {
        let json = serde_json::to_string(&BlendMode::SoftLight).unwrap();
        assert_eq!(json, "\"soft-light\"");
    }

    #[test]
    fn transparent_top_keeps_base() {
        let base = Rgba([10, 20, 30, 200]);
        for mode in BlendMode::all() {
            assert_eq!(blend_pixel(base, TRANSPARENT, *mode, 1.0), base);
        }
    }

    #[test]
    fn blend_onto_transparent_yields_source() {
        let top = Rgba([200, 100, 50, 255]);
        for mode in BlendMode::all() {
            assert_eq!(blend_pixel(TRANSPARENT, top, *mode, 1.0), top, "{:?}", mode);
        }
    }

    #[test]
    fn multiply_and_screen_on_opaque() {
        let base = Rgba([255, 128, 0, 255]);
        let top = Rgba([128, 128, 128, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::Multiply, 1.0), Rgba([128, 64, 0, 255]));
        assert_eq!(blend_pixel(base, top, BlendMode::Screen, 1.0), Rgba([255, 192, 128, 255]));
        assert_eq!(blend_pixel(base, top, BlendMode::Difference, 1.0), Rgba([127, 0, 128, 255]));
    }

    fn blend_opaque(base: [u8; 3], top: [u8; 3], mode: BlendMode) -> [u8; 3] {
        let out = blend_pixel(
            Rgba([base[0], base[1], base[2], 255]),
            Rgba([top[0], top[1], top[2], 255]),
            mode,
            1.0,
        );
        assert_eq!(out[3], 255);
        [out[0], out[1], out[2]]
    }

    #[test]
    fn darken_lighten_exclusion_on_opaque() {
        let (b, t) = ([10, 200, 100], [50, 150, 100]);
        assert_eq!(blend_opaque(b, t, BlendMode::Darken), [10, 150, 100]);
        assert_eq!(blend_opaque(b, t, BlendMode::Lighten), [50, 200, 100]);
        assert_eq!(blend_opaque([255, 0, 51], [128, 128, 102], BlendMode::Exclusion), [127, 128, 112]);
    }

    #[test]
    fn overlay_and_hard_light_branch_on_half() {
        // overlay switches on the backdrop, hard light on the source
        assert_eq!(blend_opaque([64, 192, 255], [128, 128, 0], BlendMode::Overlay), [64, 192, 255]);
        assert_eq!(blend_opaque([100, 100, 255], [64, 192, 0], BlendMode::HardLight), [50, 178, 0]);
    }

    #[test]
    fn dodge_and_burn_edges() {
        // black backdrop stays black even under a white source
        assert_eq!(blend_opaque([0, 100, 51], [255, 255, 102], BlendMode::ColorDodge), [0, 255, 85]);
        // white backdrop stays white even under a black source
        assert_eq!(blend_opaque([255, 100, 204], [0, 0, 153], BlendMode::ColorBurn), [255, 0, 170]);
    }

    #[test]
    fn soft_light_branches() {
        // dark source; light source over a deep shadow (polynomial); light source over a midtone (sqrt)
        assert_eq!(blend_opaque([51, 32, 200], [0, 255, 255], BlendMode::SoftLight), [10, 88, 226]);
    }

    #[test]
    fn half_opacity_normal_mixes() {
        let base = Rgba([0, 0, 0, 255]);
        let top = Rgba([255, 255, 255, 255]);
        assert_eq!(blend_pixel(base, top, BlendMode::Normal, 0.5), Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn complementary_alpha_products_sum() {
        for a in [0u8, 1, 77, 128, 200, 255] {
            for m in [0u8, 3, 127, 128, 254, 255] {
                assert_eq!(mul_div_255(a, m) as u32 + mul_div_255(a, 255 - m) as u32, a as u32);
            }
        }
    }

    #[test]
    fn layer_content_keeps_kind() {
        let layer = Layer::new("m", LayerKind::Mask, blank(2, 2));
        let swapped = layer.content.with_pixels(LayerPixels::ready(blank(3, 3)));
        assert_eq!(swapped.kind(), LayerKind::Mask);
        assert_eq!(swapped.pixels().raster().unwrap().dimensions(), (3, 3));
    }
}
