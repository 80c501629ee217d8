use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{SecondsFormat, Utc};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use crate::canvas::{BlendMode, Layer, LayerContent, LayerId, LayerKind, LayerPixels};
use crate::components::layers::LayerStore;
use crate::error::{EngineError, EngineResult};

/// Maximum supported canvas dimension in pixels (per axis).
/// Prevents memory exhaustion from crafted project files.
const MAX_CANVAS_DIM: u32 = 32_768;
/// Maximum number of layers in a project file.
const MAX_LAYERS: usize = 256;

// ============================================================================
// RASTER ENCODE / DECODE
// ============================================================================

/// Drop a `data:<mime>;base64,` prefix if present.
pub fn strip_data_url(data: &str) -> &str {
    let data = data.trim();
    match data.split_once(',') {
        Some((_, payload)) => payload,
        None => data,
    }
}

/// Decode any supported container (PNG, JPEG, WEBP, BMP) into RGBA.
pub fn decode_image_bytes(bytes: &[u8]) -> EngineResult<RgbaImage> {
    let img = image::load_from_memory(bytes).map_err(|e| EngineError::Decode {
        reason: e.to_string(),
    })?;
    Ok(img.to_rgba8())
}

/// Decode a base64 string (optionally a data URL) into RGBA.
pub fn decode_base64_image(data: &str) -> EngineResult<RgbaImage> {
    let bytes = STANDARD.decode(strip_data_url(data))?;
    decode_image_bytes(&bytes)
}

/// Decode two encoded rasters concurrently. Both must succeed; the first
/// failure is returned.
pub fn decode_pair(a: &str, b: &str) -> EngineResult<(RgbaImage, RgbaImage)> {
    let (a, b) = rayon::join(|| decode_base64_image(a), || decode_base64_image(b));
    Ok((a?, b?))
}

/// Load an image file from disk into RGBA.
pub fn load_image_file(path: &Path) -> EngineResult<RgbaImage> {
    let img = image::open(path).map_err(|e| EngineError::Decode {
        reason: format!("{}: {}", path.display(), e),
    })?;
    Ok(img.to_rgba8())
}

pub fn encode_png(img: &RgbaImage) -> EngineResult<Vec<u8>> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(img.as_raw(), img.width(), img.height(), ColorType::Rgba8)?;
    Ok(out)
}

pub fn encode_base64_png(img: &RgbaImage) -> EngineResult<String> {
    Ok(STANDARD.encode(encode_png(img)?))
}

/// Write a flattened raster as PNG.
pub fn export_png(img: &RgbaImage, path: &Path) -> EngineResult<()> {
    std::fs::write(path, encode_png(img)?)?;
    log::info!("Exported {}x{} PNG to {}", img.width(), img.height(), path.display());
    Ok(())
}

/// Decode a layer's encoded pixels, keeping a broken placeholder on failure
/// so one bad layer never takes down the rest.
pub fn decode_layer_pixels(name: &str, encoded: &str) -> LayerPixels {
    match decode_base64_image(encoded) {
        Ok(img) => LayerPixels::Ready(Arc::new(img)),
        Err(e) => {
            log::warn!("Layer '{}' failed to decode: {}", name, e);
            LayerPixels::Broken {
                encoded: encoded.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

// ============================================================================
// PROJECT FILE FORMAT
// ============================================================================

fn default_true() -> bool {
    true
}

fn default_opacity() -> f32 {
    1.0
}

fn default_blend_mode() -> String {
    BlendMode::Normal.as_str().to_string()
}

fn default_kind() -> String {
    LayerKind::Image.as_str().to_string()
}

/// One layer as stored in a project file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayerRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    pub image_base64: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default = "default_blend_mode")]
    pub blend_mode: String,
    #[serde(default)]
    pub order: i64,
}

impl LayerRecord {
    pub fn from_layer(layer: &Layer) -> EngineResult<Self> {
        let image_base64 = match layer.pixels() {
            LayerPixels::Ready(img) => encode_base64_png(img)?,
            // Preserve undecodable data untouched
            LayerPixels::Broken { encoded, .. } => encoded.clone(),
        };
        Ok(Self {
            id: layer.id.to_string(),
            name: layer.name.clone(),
            kind: layer.kind().as_str().to_string(),
            image_base64,
            visible: layer.visible,
            opacity: layer.opacity,
            blend_mode: layer.blend_mode.as_str().to_string(),
            order: layer.order,
        })
    }

    pub fn into_layer(self) -> Layer {
        let kind = match self.kind.as_str() {
            "image" => LayerKind::Image,
            "mask" => LayerKind::Mask,
            "generated" => LayerKind::Generated,
            other => {
                log::warn!("Unknown layer type '{}', treating as image", other);
                LayerKind::Image
            }
        };
        let pixels = decode_layer_pixels(&self.name, &self.image_base64);
        let id = if self.id.is_empty() {
            LayerId::new()
        } else {
            LayerId::from(self.id)
        };
        Layer {
            id,
            name: self.name,
            visible: self.visible,
            opacity: self.opacity.clamp(0.0, 1.0),
            blend_mode: BlendMode::from_name_lossy(&self.blend_mode),
            order: self.order,
            content: LayerContent::new(kind, pixels),
        }
    }
}

/// Serializable project: the layer stack plus optional document metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub layers: Vec<LayerRecord>,
    #[serde(rename = "exportedAt", default)]
    pub exported_at: String,
}

impl ProjectFile {
    /// Snapshot every layer in `store`, bottom to top.
    pub fn from_store(store: &LayerStore) -> EngineResult<Self> {
        let layers = store
            .layers_bottom_to_top()
            .into_par_iter()
            .map(LayerRecord::from_layer)
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Self {
            id: None,
            name: None,
            width: None,
            height: None,
            layers,
            exported_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    /// Rebuild a layer store. Layers that fail to decode are kept as broken
    /// placeholders.
    pub fn into_store(self) -> LayerStore {
        let layers: Vec<Layer> = self
            .layers
            .into_par_iter()
            .map(LayerRecord::into_layer)
            .collect();
        LayerStore::from_layers(layers)
    }

    fn validate(&self) -> EngineResult<()> {
        if self.layers.len() > MAX_LAYERS {
            return Err(EngineError::InvalidProject {
                message: format!(
                    "Project contains {} layers, which exceeds the maximum of {}",
                    self.layers.len(),
                    MAX_LAYERS
                ),
            });
        }
        let (w, h) = (self.width.unwrap_or(0), self.height.unwrap_or(0));
        if w > MAX_CANVAS_DIM || h > MAX_CANVAS_DIM {
            return Err(EngineError::InvalidProject {
                message: format!(
                    "Canvas size {}x{} exceeds maximum allowed {}x{}",
                    w, h, MAX_CANVAS_DIM, MAX_CANVAS_DIM
                ),
            });
        }
        Ok(())
    }
}

pub fn project_to_json(project: &ProjectFile) -> EngineResult<String> {
    Ok(serde_json::to_string_pretty(project)?)
}

/// Parse a project document. A bare array of layer records is accepted too.
pub fn project_from_json(json: &str) -> EngineResult<ProjectFile> {
    let project = match serde_json::from_str::<ProjectFile>(json) {
        Ok(p) => p,
        Err(object_err) => match serde_json::from_str::<Vec<LayerRecord>>(json) {
            Ok(layers) => ProjectFile {
                id: None,
                name: None,
                width: None,
                height: None,
                layers,
                exported_at: String::new(),
            },
            Err(_) => return Err(object_err.into()),
        },
    };
    project.validate()?;
    Ok(project)
}

pub fn save_project(project: &ProjectFile, path: &Path) -> EngineResult<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, project)?;
    log::info!("Saved project ({} layers) to {}", project.layers.len(), path.display());
    Ok(())
}

pub fn load_project(path: &Path) -> EngineResult<ProjectFile> {
    let json = std::fs::read_to_string(path)?;
    let project = project_from_json(&json)?;
    log::info!("Loaded project ({} layers) from {}", project.layers.len(), path.display());
    Ok(project)
}
