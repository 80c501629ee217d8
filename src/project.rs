use image::RgbaImage;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use ab_glyph::FontArc;

use crate::canvas::{blank, Layer, LayerId, LayerKind};
use crate::components::layers::LayerStore;
use crate::components::tools::{CommitOutcome, DrawingOverlay, PointerButton, PointerEvent, Tool, ToolSettings};
use crate::error::{EngineError, EngineResult};
use crate::io::{self, ProjectFile};
use crate::ops::annotate::{annotate, AnnotationStyle, DetectionBox, Segment};
use crate::ops::compositor;
use crate::ops::mask::{self, MaskOp};
use crate::viewport::{CoordinateMapper, SurfaceRect, Viewport};

/// Canvas size for a named aspect ratio with the longer side `base_size`.
/// Unknown ratios fall back to square.
pub fn aspect_ratio_dimensions(aspect_ratio: &str, base_size: u32) -> (u32, u32) {
    let (w_ratio, h_ratio): (u32, u32) = match aspect_ratio {
        "2:3" => (2, 3),
        "3:2" => (3, 2),
        "3:4" => (3, 4),
        "4:3" => (4, 3),
        "4:5" => (4, 5),
        "5:4" => (5, 4),
        "9:16" => (9, 16),
        "16:9" => (16, 9),
        "21:9" => (21, 9),
        _ => (1, 1),
    };
    if w_ratio >= h_ratio {
        (base_size, base_size * h_ratio / w_ratio)
    } else {
        (base_size * w_ratio / h_ratio, base_size)
    }
}

/// Single open document: the layer stack plus the interactive state that
/// edits it. Engine operations receive this explicitly; nothing is global.
pub struct Project {
    pub id: Uuid,
    /// Display name ("Untitled-X" until saved or loaded)
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub layers: LayerStore,
    pub overlay: DrawingOverlay,
    pub viewport: Viewport,
    /// `None` for unsaved/untitled files.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, width: u32, height: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: format!("Untitled-{}", untitled_counter),
            width,
            height,
            layers: LayerStore::new(),
            overlay: DrawingOverlay::new(width, height),
            viewport: Viewport::new(),
            path: None,
            is_dirty: false,
        }
    }

    /// Rebuild a document from a parsed project file. Canvas size comes from
    /// the file, or from the bottom layer when the file does not record it.
    pub fn from_file(file: ProjectFile, path: Option<PathBuf>) -> Self {
        let id = file
            .id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);
        let name = file.name.clone().unwrap_or_else(|| {
            path.as_ref()
                .and_then(|p| p.file_stem())
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string())
        });
        let recorded = file.width.zip(file.height);
        let layers = file.into_store();
        let (width, height) = recorded
            .or_else(|| {
                layers
                    .layers_bottom_to_top()
                    .iter()
                    .find_map(|l| l.dimensions())
            })
            .unwrap_or((0, 0));

        Self {
            id,
            name,
            width,
            height,
            layers,
            overlay: DrawingOverlay::new(width, height),
            viewport: Viewport::new(),
            path,
            is_dirty: false,
        }
    }

    /// Draw with `tools` (usually `Settings::tool_settings`) instead of the
    /// built-in defaults.
    pub fn with_tool_settings(mut self, tools: ToolSettings) -> Self {
        self.overlay.settings = tools;
        self
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let file = io::load_project(path)?;
        Ok(Self::from_file(file, Some(path.to_path_buf())))
    }

    pub fn to_project_file(&self) -> EngineResult<ProjectFile> {
        let mut file = ProjectFile::from_store(&self.layers)?;
        file.id = Some(self.id.to_string());
        file.name = Some(self.name.clone());
        file.width = Some(self.width);
        file.height = Some(self.height);
        Ok(file)
    }

    pub fn save(&mut self, path: &Path) -> EngineResult<()> {
        io::save_project(&self.to_project_file()?, path)?;
        self.path = Some(path.to_path_buf());
        self.mark_clean();
        Ok(())
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }

    fn require(&self, id: &LayerId) -> EngineResult<&Layer> {
        self.layers.get(id).ok_or_else(|| EngineError::LayerNotFound { id: id.to_string() })
    }

    fn require_raster(&self, id: &LayerId) -> EngineResult<&RgbaImage> {
        self.require(id)?.require_raster()
    }

    /// A layer's raster read as a mask (luminance, opaque).
    fn require_mask(&self, id: &LayerId) -> EngineResult<RgbaImage> {
        Ok(mask::to_mask(self.require_raster(id)?))
    }

    fn push_layer(&mut self, name: String, kind: LayerKind, raster: RgbaImage) -> LayerId {
        let id = self.layers.add(Layer::new(name, kind, raster));
        self.mark_dirty();
        id
    }

    // ========================================================================
    // LAYER CREATION
    // ========================================================================

    pub fn add_image_layer(&mut self, name: impl Into<String>, kind: LayerKind, raster: RgbaImage) -> LayerId {
        self.push_layer(name.into(), kind, raster)
    }

    /// Add a layer from base64 (or data URL) content. Undecodable content is
    /// kept as a broken layer rather than rejected.
    pub fn add_encoded_layer(&mut self, name: impl Into<String>, kind: LayerKind, encoded: &str) -> LayerId {
        let name = name.into();
        let pixels = io::decode_layer_pixels(&name, encoded);
        let id = self.layers.add(Layer::with_pixels(name, kind, pixels));
        self.mark_dirty();
        id
    }

    /// Masked copy of a layer ("`name` (Masked)").
    pub fn apply_mask_to_layer(&mut self, layer: &LayerId, mask_layer: &LayerId, invert: bool) -> EngineResult<LayerId> {
        let name = format!("{} (Masked)", self.require(layer)?.name);
        let out = compositor::extract(self.require_raster(layer)?, &self.require_mask(mask_layer)?, invert)?;
        Ok(self.push_layer(name, LayerKind::Image, out))
    }

    /// Selected region of a layer ("`name` (Extracted)").
    pub fn extract_from_layer(&mut self, layer: &LayerId, mask_layer: &LayerId) -> EngineResult<LayerId> {
        let name = format!("{} (Extracted)", self.require(layer)?.name);
        let out = compositor::extract(self.require_raster(layer)?, &self.require_mask(mask_layer)?, false)?;
        Ok(self.push_layer(name, LayerKind::Image, out))
    }

    /// Layer with the selected region cleared ("`name` (Removed)").
    pub fn remove_masked(&mut self, layer: &LayerId, mask_layer: &LayerId) -> EngineResult<LayerId> {
        let name = format!("{} (Removed)", self.require(layer)?.name);
        let out = compositor::remove(self.require_raster(layer)?, &self.require_mask(mask_layer)?)?;
        Ok(self.push_layer(name, LayerKind::Image, out))
    }

    /// Fold the given mask layers with `op` into a new mask layer.
    pub fn combine_mask_layers(&mut self, ids: &[LayerId], op: MaskOp, name: Option<&str>) -> EngineResult<LayerId> {
        let masks = ids
            .iter()
            .map(|id| self.require_mask(id))
            .collect::<EngineResult<Vec<_>>>()?;
        let combined = mask::combine(&masks, op)?;
        let name = name.unwrap_or("Combined Mask").to_string();
        Ok(self.push_layer(name, LayerKind::Mask, combined))
    }

    /// Blend `foreground` onto `background` into a new "Composited Layer".
    pub fn composite_layers(
        &mut self,
        background: &LayerId,
        foreground: &LayerId,
        offset_x: i32,
        offset_y: i32,
        opacity: f32,
    ) -> EngineResult<LayerId> {
        let out = compositor::blend_pair(
            self.require_raster(background)?,
            self.require_raster(foreground)?,
            offset_x,
            offset_y,
            opacity,
        );
        Ok(self.push_layer("Composited Layer".to_string(), LayerKind::Image, out))
    }

    /// One full-canvas mask layer per segment, named by its label.
    pub fn add_segments(&mut self, segments: &[Segment]) -> Vec<LayerId> {
        let (w, h) = (self.width, self.height);
        segments
            .iter()
            .map(|seg| {
                let full = mask::expand_segment_mask(&seg.mask, w, h, &seg.bbox);
                self.push_layer(seg.label.clone(), LayerKind::Mask, full)
            })
            .collect()
    }

    /// Detection overlay of a layer ("`name` (Annotated)"); the source layer
    /// is left untouched.
    pub fn annotate_layer(
        &mut self,
        layer: &LayerId,
        boxes: &[DetectionBox],
        style: &AnnotationStyle,
        font: Option<&FontArc>,
    ) -> EngineResult<LayerId> {
        let name = format!("{} (Annotated)", self.require(layer)?.name);
        let out = annotate(self.require_raster(layer)?, boxes, style, font);
        Ok(self.push_layer(name, LayerKind::Generated, out))
    }

    // ========================================================================
    // OUTPUT
    // ========================================================================

    /// Flatten visible layers; an empty stack gives a transparent canvas of
    /// the document size.
    pub fn flatten(&self) -> RgbaImage {
        let flat = compositor::flatten_store(&self.layers);
        if flat.width() == 0 || flat.height() == 0 {
            return blank(self.width, self.height);
        }
        flat
    }

    pub fn export_png(&self, path: &Path) -> EngineResult<()> {
        io::export_png(&self.flatten(), path)
    }

    // ========================================================================
    // POINTER INPUT
    // ========================================================================

    pub fn set_tool(&mut self, tool: Tool) {
        self.overlay.set_tool(tool);
    }

    /// Dispatch a screen-space pointer event. `container` is the area the
    /// canvas is shown in; pan and zoom place the canvas inside it.
    pub fn handle_pointer(&mut self, event: PointerEvent, container: &SurfaceRect) -> CommitOutcome {
        match event {
            PointerEvent::Down { x, y, button }
                if Viewport::should_pan(self.overlay.tool(), button == PointerButton::Secondary) =>
            {
                self.viewport.begin_pan((x, y));
                return CommitOutcome::Nothing;
            }
            PointerEvent::Move { x, y } if self.viewport.is_panning() => {
                self.viewport.update_pan((x, y));
                return CommitOutcome::Nothing;
            }
            PointerEvent::Up { .. } | PointerEvent::Leave if self.viewport.is_panning() => {
                self.viewport.end_pan();
                return CommitOutcome::Nothing;
            }
            _ => {}
        }

        let rect = self.viewport.displayed_rect(container, self.width, self.height);
        let mapper = CoordinateMapper::new(self.width, self.height);
        let outcome = self.overlay.handle(event, &mapper, &rect, &mut self.layers);
        if outcome != CommitOutcome::Nothing {
            self.mark_dirty();
        }
        outcome
    }
}
