//! Detection overlays: bounding boxes and labels drawn onto a copy of a
//! raster, plus the metadata records the detection/segmentation service
//! hands back.

use ab_glyph::FontArc;
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::io::decode_base64_image;
use crate::ops::shapes::{fill_rect, rasterize_outline, PlacedShape, ShapeKind};
use crate::ops::text::{draw_text, text_width};

/// Side length of the normalised box coordinate space.
pub const NORMALIZED_EXTENT: f32 = 1000.0;

/// Box colours, cycled by detection index.
pub const PALETTE: [Rgba<u8>; 6] = [
    Rgba([255, 0, 0, 255]),
    Rgba([0, 255, 0, 255]),
    Rgba([0, 0, 255, 255]),
    Rgba([255, 255, 0, 255]),
    Rgba([255, 0, 255, 255]),
    Rgba([0, 255, 255, 255]),
];

/// Bounding box in 0–1000 space, serialised as `[y1, x1, y2, x2]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct NormalizedBox {
    pub y1: f32,
    pub x1: f32,
    pub y2: f32,
    pub x2: f32,
}

impl NormalizedBox {
    pub fn new(y1: f32, x1: f32, y2: f32, x2: f32) -> Self {
        Self { y1, x1, y2, x2 }
    }

    /// Corners in pixel space as `(px1, py1, px2, py2)`.
    pub fn to_pixels(&self, width: u32, height: u32) -> (f32, f32, f32, f32) {
        let w = width as f32;
        let h = height as f32;
        (
            self.x1 / NORMALIZED_EXTENT * w,
            self.y1 / NORMALIZED_EXTENT * h,
            self.x2 / NORMALIZED_EXTENT * w,
            self.y2 / NORMALIZED_EXTENT * h,
        )
    }

    /// Truncated, clamped integer bounds `(x0, y0, x1, y1)` with `x0 <= x1`.
    pub fn to_pixel_bounds(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let (px1, py1, px2, py2) = self.to_pixels(width, height);
        let clamp_x = |v: f32| (v.max(0.0) as u32).min(width);
        let clamp_y = |v: f32| (v.max(0.0) as u32).min(height);
        let (x0, x1) = (clamp_x(px1.min(px2)), clamp_x(px1.max(px2)));
        let (y0, y1) = (clamp_y(py1.min(py2)), clamp_y(py1.max(py2)));
        (x0, y0, x1, y1)
    }
}

impl From<[f32; 4]> for NormalizedBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<NormalizedBox> for [f32; 4] {
    fn from(b: NormalizedBox) -> Self {
        [b.y1, b.x1, b.y2, b.x2]
    }
}

/// One detection result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub label: String,
    #[serde(rename = "box")]
    pub bbox: NormalizedBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl DetectionBox {
    /// `label`, suffixed with the rounded confidence percentage when known.
    pub fn caption(&self) -> String {
        match self.confidence {
            Some(c) => format!("{} {}%", self.label, (c * 100.0).round() as i64),
            None => self.label.clone(),
        }
    }
}

/// Segmentation record as delivered over the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub label: String,
    #[serde(rename = "box")]
    pub bbox: NormalizedBox,
    /// Encoded box-sized mask.
    #[serde(alias = "mask")]
    pub mask_base64: String,
}

/// Segmentation result with its mask decoded.
#[derive(Clone, Debug)]
pub struct Segment {
    pub label: String,
    pub bbox: NormalizedBox,
    /// Box-sized mask; see `ops::mask::expand_segment_mask`.
    pub mask: RgbaImage,
}

impl Segment {
    pub fn decode(record: &SegmentRecord) -> EngineResult<Self> {
        Ok(Self {
            label: record.label.clone(),
            bbox: record.bbox,
            mask: decode_base64_image(&record.mask_base64)?,
        })
    }
}

/// Drawing parameters for [`annotate`].
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationStyle {
    pub stroke_width: f32,
    pub font_size: f32,
    pub padding: f32,
    pub text_color: Rgba<u8>,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            stroke_width: 3.0,
            font_size: 16.0,
            padding: 4.0,
            text_color: Rgba([255, 255, 255, 255]),
        }
    }
}

/// Draw every box in `boxes` onto a copy of `image`.
///
/// Box `i` is stroked in `PALETTE[i % 6]`; its caption sits on a filled
/// background of the same colour directly above the top edge. Without a
/// font the background is still drawn, sized from an estimated width.
pub fn annotate(
    image: &RgbaImage,
    boxes: &[DetectionBox],
    style: &AnnotationStyle,
    font: Option<&FontArc>,
) -> RgbaImage {
    let mut out = image.clone();
    let (w, h) = out.dimensions();

    for (i, det) in boxes.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let (px1, py1, px2, py2) = det.bbox.to_pixels(w, h);

        if let Some(shape) = PlacedShape::from_drag(
            ShapeKind::Rectangle,
            (px1, py1),
            (px2, py2),
            style.stroke_width,
            color,
        ) {
            rasterize_outline(&mut out, &shape);
        }

        let caption = det.caption();
        let label_w = text_width(font, &caption, style.font_size) + style.padding * 2.0;
        let label_h = style.font_size + style.padding * 2.0;
        let left = px1.min(px2);
        let top = (py1.min(py2) - label_h).max(0.0);

        fill_rect(
            &mut out,
            left.floor() as i64,
            top.floor() as i64,
            (left + label_w).ceil() as i64,
            (top + label_h).ceil() as i64,
            color,
        );
        if let Some(font) = font {
            draw_text(
                &mut out,
                font,
                &caption,
                style.font_size,
                left + style.padding,
                top + style.padding,
                style.text_color,
            );
        }
    }

    log::debug!("Annotated {} detection(s) on {}x{} image", boxes.len(), w, h);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_mask_field_accepts_both_names() {
        let encoded = crate::io::encode_base64_png(&RgbaImage::from_pixel(3, 2, Rgba([255, 255, 255, 255]))).unwrap();
        for key in ["mask", "mask_base64"] {
            let json = format!(r#"{{"label":"dog","box":[0,0,500,500],"{}":"{}"}}"#, key, encoded);
            let record: SegmentRecord = serde_json::from_str(&json).unwrap();
            let segment = Segment::decode(&record).unwrap();
            assert_eq!(segment.label, "dog");
            assert_eq!(segment.mask.dimensions(), (3, 2));
        }
    }

    #[test]
    fn box_parses_from_array() {
        let det: DetectionBox =
            serde_json::from_str(r#"{"label":"cat","box":[100,200,300,400],"confidence":0.876}"#).unwrap();
        assert_eq!(det.bbox, NormalizedBox::new(100.0, 200.0, 300.0, 400.0));
        assert_eq!(det.caption(), "cat 88%");
        let json = serde_json::to_string(&det.bbox).unwrap();
        assert_eq!(json, "[100.0,200.0,300.0,400.0]");
    }

    #[test]
    fn caption_without_confidence() {
        let det: DetectionBox = serde_json::from_str(r#"{"label":"dog","box":[0,0,1,1]}"#).unwrap();
        assert_eq!(det.caption(), "dog");
    }

    #[test]
    fn pixel_mapping() {
        let b = NormalizedBox::new(250.0, 500.0, 750.0, 1000.0);
        assert_eq!(b.to_pixels(200, 100), (100.0, 25.0, 200.0, 75.0));
        assert_eq!(b.to_pixel_bounds(200, 100), (100, 25, 200, 75));
    }

    #[test]
    fn annotate_leaves_input_untouched() {
        let img = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        let boxes = vec![
            DetectionBox { label: "a".into(), bbox: NormalizedBox::new(400.0, 100.0, 900.0, 900.0), confidence: None },
            DetectionBox { label: "b".into(), bbox: NormalizedBox::new(500.0, 500.0, 600.0, 600.0), confidence: Some(0.5) },
        ];
        let out = annotate(&img, &boxes, &AnnotationStyle::default(), None);
        assert_eq!(*img.get_pixel(10, 40), Rgba([0, 0, 0, 255]));
        // Left edge of the first box is red, the second box's edge green
        assert_eq!(*out.get_pixel(10, 70), PALETTE[0]);
        assert_eq!(*out.get_pixel(50, 55), PALETTE[1]);
        // Label background directly above the first box
        assert_eq!(*out.get_pixel(12, 35), PALETTE[0]);
        // Interior untouched
        assert_eq!(*out.get_pixel(30, 80), Rgba([0, 0, 0, 255]));
    }
}
