//! Saving a project and loading it back reconstructs an equivalent stack.

use image::{Rgba, RgbaImage};
use layerkit::canvas::{BlendMode, LayerKind};
use layerkit::components::layers::LayerPatch;
use layerkit::io::{load_project, project_from_json};
use layerkit::ops::mask::MaskOp;
use layerkit::project::Project;

fn checker(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 {
            Rgba([240, 240, 240, 255])
        } else {
            Rgba([20, 40, 160, 200])
        }
    })
}

#[test]
fn save_then_load_is_equivalent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scene.json");

    let mut project = Project::new_untitled(1, 16, 12);
    project.name = "scene".to_string();
    let bg = project.add_image_layer("background", LayerKind::Image, checker(16, 12));
    let sel = project.add_image_layer(
        "selection",
        LayerKind::Mask,
        RgbaImage::from_fn(16, 12, |x, _| {
            let v = if x < 8 { 255 } else { 0 };
            Rgba([v, v, v, 255])
        }),
    );
    let cut = project.extract_from_layer(&bg, &sel).unwrap();
    project.layers.update(&cut, LayerPatch::blend_mode(BlendMode::Multiply));
    project.layers.update(&cut, LayerPatch::opacity(0.35));
    project.layers.update(&sel, LayerPatch::visible(false));
    let broken = project.add_encoded_layer("broken", LayerKind::Generated, "aGVsbG8=");

    project.save(&path).unwrap();
    assert!(!project.is_dirty);
    assert_eq!(project.path.as_deref(), Some(path.as_path()));

    let loaded = Project::load(&path).unwrap();
    assert_eq!(loaded.id, project.id);
    assert_eq!(loaded.name, "scene");
    assert_eq!((loaded.width, loaded.height), (16, 12));
    assert_eq!(loaded.layers.len(), project.layers.len());

    for original in project.layers.iter() {
        let copy = loaded.layers.get(&original.id).expect("layer survives");
        assert_eq!(copy.name, original.name);
        assert_eq!(copy.kind(), original.kind());
        assert_eq!(copy.visible, original.visible);
        assert_eq!(copy.opacity, original.opacity);
        assert_eq!(copy.blend_mode, original.blend_mode);
        assert_eq!(copy.order, original.order);
        assert_eq!(copy.raster(), original.raster());
    }

    assert!(loaded.layers.get(&broken).unwrap().pixels().is_broken());
    assert_eq!(loaded.flatten(), project.flatten());
}

#[test]
fn saved_file_uses_documented_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fields.json");

    let mut project = Project::new_untitled(2, 4, 4);
    let a = project.add_image_layer("a", LayerKind::Mask, RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255])));
    let b = project.add_image_layer("b", LayerKind::Mask, RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
    project.combine_mask_layers(&[a, b], MaskOp::Xor, Some("xor")).unwrap();
    project.save(&path).unwrap();

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw["exportedAt"].as_str().is_some_and(|s| s.ends_with('Z')));
    let layers = raw["layers"].as_array().unwrap();
    assert_eq!(layers.len(), 3);
    for key in ["id", "name", "type", "image_base64", "visible", "opacity", "blend_mode", "order"] {
        assert!(layers[0].get(key).is_some(), "missing {}", key);
    }
    assert_eq!(layers[2]["name"], "xor");
    assert_eq!(layers[2]["type"], "mask");
    assert_eq!(layers[2]["blend_mode"], "normal");

    let file = load_project(&path).unwrap();
    assert_eq!(file.layers.len(), 3);
}

#[test]
fn minimal_legacy_document_loads() {
    let png = layerkit::io::encode_base64_png(&RgbaImage::from_pixel(3, 2, Rgba([5, 6, 7, 255]))).unwrap();
    let json = format!(
        r#"{{"layers": [{{"id": "x", "name": "legacy", "type": "image", "image_base64": "data:image/png;base64,{}"}}], "exportedAt": ""}}"#,
        png
    );
    let project = Project::from_file(project_from_json(&json).unwrap(), None);
    assert_eq!((project.width, project.height), (3, 2));
    assert_eq!(project.name, "Unknown");
    let flat = project.flatten();
    assert_eq!(*flat.get_pixel(2, 1), Rgba([5, 6, 7, 255]));
}
