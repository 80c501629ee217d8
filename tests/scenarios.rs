//! End-to-end behaviour of the compositing core through the public API.

use image::{Rgba, RgbaImage};
use layerkit::canvas::{BlendMode, Layer, LayerKind};
use layerkit::components::layers::{LayerPatch, LayerStore};
use layerkit::components::tools::{CommitOutcome, DrawingOverlay, Tool};
use layerkit::error::EngineError;
use layerkit::io::{decode_pair, encode_base64_png};
use layerkit::ops::compositor::{extract, flatten, flatten_store, remove};
use layerkit::ops::mask::{self, MaskOp};
use layerkit::viewport::{CoordinateMapper, SurfaceRect, Viewport};

fn region_mask(size: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| {
        let v = if x >= x0 && x < x1 && y >= y0 && y < y1 { 255 } else { 0 };
        Rgba([v, v, v, 255])
    })
}

/// Deterministic pseudo-random mask.
fn noise_mask(w: u32, h: u32, seed: u32) -> RgbaImage {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    RgbaImage::from_fn(w, h, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let v = (state >> 24) as u8;
        Rgba([v, v, v, 255])
    })
}

#[test]
fn disjoint_quadrants_on_512_canvas() {
    let a = region_mask(512, 0, 0, 256, 256);
    let b = region_mask(512, 256, 256, 512, 512);

    let inter = mask::intersection(&a, &b).unwrap();
    assert!(inter.pixels().all(|p| p[0] == 0 && p[1] == 0 && p[2] == 0));

    let uni = mask::union(&a, &b).unwrap();
    for (x, y, p) in uni.enumerate_pixels() {
        let inside = (x < 256 && y < 256) || (x >= 256 && y >= 256);
        assert_eq!(p[0] == 255, inside, "pixel ({}, {})", x, y);
    }

    assert_eq!(mask::xor(&a, &b).unwrap(), uni);
    assert_eq!(mask::subtract(&a, &b).unwrap(), a);
    assert_eq!(mask::combine(&[a.clone(), b.clone()], MaskOp::Union).unwrap(), uni);
}

#[test]
fn mask_algebra_laws_hold_on_noise() {
    for seed in 1..6 {
        let a = noise_mask(37, 23, seed);
        let b = noise_mask(37, 23, seed + 100);
        for op in MaskOp::all() {
            if *op != MaskOp::Subtract {
                assert_eq!(op.apply(&a, &b).unwrap(), op.apply(&b, &a).unwrap(), "{}", op);
            }
        }
        let zero = mask::solid_mask(37, 23, 0);
        assert_eq!(mask::subtract(&a, &a).unwrap(), zero);
        assert_eq!(mask::xor(&a, &a).unwrap(), zero);
        assert_eq!(mask::union(&a, &a).unwrap(), a);
        assert_eq!(mask::intersection(&a, &a).unwrap(), a);
        assert_eq!(mask::invert(&mask::invert(&a)), a);
    }
}

#[test]
fn mismatched_masks_are_rejected() {
    let a = mask::solid_mask(10, 10, 255);
    let b = mask::solid_mask(10, 11, 255);
    assert!(matches!(
        mask::intersection(&a, &b),
        Err(EngineError::DimensionMismatch { .. })
    ));
    // Explicit resize makes them compatible
    let fitted = mask::resize_mask(&b, 10, 10);
    assert!(mask::intersection(&a, &fitted).is_ok());
}

#[test]
fn rectangle_drag_on_200_overlay() {
    let mut store = LayerStore::new();
    let mut overlay = DrawingOverlay::new(200, 200);
    overlay.set_tool(Tool::Rectangle);
    overlay.pointer_down((10.0, 10.0), &store);
    overlay.pointer_move((100.0, 100.0));

    let buffer = overlay.buffer();
    assert_eq!(buffer.get_pixel(50, 50)[3], 0);
    assert!(buffer.get_pixel(10, 50)[3] > 0);

    // Everything drawn lies within the stroke band around the border
    for (x, y, p) in buffer.enumerate_pixels() {
        if p[3] > 0 {
            let (fx, fy) = (x as f32 + 0.5, y as f32 + 0.5);
            let near_vertical = (fx - 10.0).abs() <= 2.5 || (fx - 100.0).abs() <= 2.5;
            let near_horizontal = (fy - 10.0).abs() <= 2.5 || (fy - 100.0).abs() <= 2.5;
            assert!(near_vertical || near_horizontal, "stray pixel at ({}, {})", x, y);
        }
    }

    assert!(matches!(overlay.pointer_up(&mut store), CommitOutcome::Created(_)));
    assert_eq!(store.len(), 1);
}

#[test]
fn reorder_b_above_c_swaps_exactly_two() {
    let mut store = LayerStore::new();
    let a = store.add(Layer::new("A", LayerKind::Image, RgbaImage::new(2, 2)));
    let b = store.add(Layer::new("B", LayerKind::Image, RgbaImage::new(2, 2)));
    let c = store.add(Layer::new("C", LayerKind::Image, RgbaImage::new(2, 2)));
    let before: Vec<i64> = [&a, &b, &c].iter().map(|id| store.get(id).unwrap().order).collect();
    assert_eq!(before, vec![0, 1, 2]);

    store.reorder(&[a.clone(), c.clone(), b.clone()]);
    let after: Vec<i64> = [&a, &b, &c].iter().map(|id| store.get(id).unwrap().order).collect();

    let changed = before.iter().zip(&after).filter(|(x, y)| x != y).count();
    assert_eq!(changed, 2);
    assert_eq!(after[0], before[0]);
    assert_eq!((after[1], after[2]), (before[2], before[1]));
}

#[test]
fn identity_mapping_equals_raw_offset() {
    let viewport = Viewport::new();
    let container = SurfaceRect::new(0.0, 0.0, 640.0, 480.0);
    let rect = viewport.displayed_rect(&container, 320, 200);
    assert_eq!((rect.width, rect.height), (320.0, 200.0));

    let mapper = CoordinateMapper::new(320, 200);
    for (sx, sy) in [(rect.left, rect.top), (rect.left + 17.0, rect.top + 3.0), (rect.left + 319.0, rect.top + 199.0)] {
        assert_eq!(
            mapper.to_canvas(&rect, sx, sy),
            Some((sx - rect.left, sy - rect.top))
        );
    }
}

#[test]
fn extract_and_remove_split_alpha() {
    let image = RgbaImage::from_fn(40, 30, |x, y| Rgba([x as u8, y as u8, 99, 255]));
    for seed in 1..4 {
        let m = noise_mask(40, 30, seed);
        let kept = extract(&image, &m, false).unwrap();
        let cleared = remove(&image, &m).unwrap();
        for ((k, c), src) in kept.pixels().zip(cleared.pixels()).zip(image.pixels()) {
            assert_eq!(k[3] as u32 + c[3] as u32, src[3] as u32);
            assert_eq!(k.0[..3], src.0[..3]);
        }
    }
}

#[test]
fn single_layer_flatten_is_exact() {
    let raster = RgbaImage::from_fn(31, 17, |x, y| Rgba([(x * 8) as u8, (y * 15) as u8, 200, 255]));
    let mut store = LayerStore::new();
    store.add(Layer::new("only", LayerKind::Image, raster.clone()));
    assert_eq!(flatten_store(&store), raster);
}

#[test]
fn flatten_ignores_order_of_non_overlapping_layers() {
    let size = 24;
    let left = RgbaImage::from_fn(size, size, |x, _| {
        if x < 10 { Rgba([200, 30, 60, 255]) } else { Rgba([0, 0, 0, 0]) }
    });
    let right = RgbaImage::from_fn(size, size, |x, _| {
        if x >= 14 { Rgba([10, 220, 90, 128]) } else { Rgba([0, 0, 0, 0]) }
    });

    let mut store = LayerStore::new();
    let l = store.add(Layer::new("left", LayerKind::Image, left));
    let r = store.add(Layer::new("right", LayerKind::Image, right));
    store.update(&r, LayerPatch::blend_mode(BlendMode::Screen));
    let forward = flatten_store(&store);

    store.reorder(&[r.clone(), l.clone()]);
    let backward = flatten_store(&store);
    assert_eq!(forward, backward);
    assert_eq!(*forward.get_pixel(2, 2), Rgba([200, 30, 60, 255]));
    assert_eq!(forward.get_pixel(12, 2)[3], 0);
}

#[test]
fn hidden_and_broken_layers_do_not_flatten() {
    let base = Layer::new("base", LayerKind::Image, RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])));
    let mut hidden = Layer::new("hidden", LayerKind::Image, RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255])));
    hidden.visible = false;
    let broken = Layer::with_pixels(
        "broken",
        LayerKind::Image,
        layerkit::canvas::LayerPixels::Broken {
            encoded: "aGVsbG8=".into(),
            reason: "not an image".into(),
        },
    );
    let out = flatten([&base, &hidden, &broken]);
    assert_eq!(out, RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])));
}

#[test]
fn paired_decode_needs_both() {
    let a = encode_base64_png(&mask::solid_mask(3, 3, 255)).unwrap();
    let b = encode_base64_png(&mask::solid_mask(3, 3, 0)).unwrap();
    let (da, db) = decode_pair(&a, &b).unwrap();
    assert_eq!(mask::union(&da, &db).unwrap(), da);
    assert!(decode_pair(&a, "%%%").is_err());
}
