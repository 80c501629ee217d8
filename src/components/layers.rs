use image::RgbaImage;

use crate::canvas::{BlendMode, Layer, LayerId, LayerPixels};

/// Field updates for [`LayerStore::update`]; `None` leaves a field alone.
#[derive(Clone, Debug, Default)]
pub struct LayerPatch {
    pub name: Option<String>,
    pub visible: Option<bool>,
    pub opacity: Option<f32>,
    pub blend_mode: Option<BlendMode>,
    pub order: Option<i64>,
    pub pixels: Option<LayerPixels>,
}

impl LayerPatch {
    pub fn visible(visible: bool) -> Self {
        Self { visible: Some(visible), ..Default::default() }
    }

    pub fn opacity(opacity: f32) -> Self {
        Self { opacity: Some(opacity), ..Default::default() }
    }

    pub fn blend_mode(mode: BlendMode) -> Self {
        Self { blend_mode: Some(mode), ..Default::default() }
    }

    pub fn rename(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Default::default() }
    }
}

/// Owns the layer stack and tracks which layer is active.
///
/// Layers are kept in insertion order; stacking is defined purely by each
/// layer's `order` value. Distinct order values are the caller's
/// responsibility when inserting with explicit orders.
#[derive(Clone, Debug, Default)]
pub struct LayerStore {
    layers: Vec<Layer>,
    active: Option<LayerId>,
}

impl LayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already-ordered layers (e.g. a loaded project).
    /// No layer is active.
    pub fn from_layers(layers: Vec<Layer>) -> Self {
        Self { layers, active: None }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    fn next_order(&self) -> i64 {
        let count = self.layers.len() as i64;
        match self.layers.iter().map(|l| l.order).max() {
            Some(max) if max >= count => max + 1,
            _ => count,
        }
    }

    /// Append `layer` on top of the stack and make it active.
    ///
    /// Its order becomes the layer count, or one above the current maximum
    /// when earlier removals left gaps that would otherwise collide.
    pub fn add(&mut self, mut layer: Layer) -> LayerId {
        layer.order = self.next_order();
        self.insert(layer)
    }

    /// Append `layer` keeping its own `order` and make it active.
    pub fn insert(&mut self, layer: Layer) -> LayerId {
        let id = layer.id.clone();
        log::debug!("Adding layer '{}' ({}) at order {}", layer.name, id, layer.order);
        self.layers.push(layer);
        self.active = Some(id.clone());
        id
    }

    pub fn get(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| &l.id == id)
    }

    fn get_mut(&mut self, id: &LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| &l.id == id)
    }

    /// Merge `patch` into the layer. Returns `false` (and does nothing) for
    /// an unknown id.
    pub fn update(&mut self, id: &LayerId, patch: LayerPatch) -> bool {
        let Some(layer) = self.get_mut(id) else {
            log::debug!("Ignoring update for unknown layer {}", id);
            return false;
        };
        if let Some(name) = patch.name {
            layer.name = name;
        }
        if let Some(visible) = patch.visible {
            layer.visible = visible;
        }
        if let Some(opacity) = patch.opacity {
            layer.opacity = opacity.clamp(0.0, 1.0);
        }
        if let Some(mode) = patch.blend_mode {
            layer.blend_mode = mode;
        }
        if let Some(order) = patch.order {
            layer.order = order;
        }
        if let Some(pixels) = patch.pixels {
            layer.content = layer.content.with_pixels(pixels);
        }
        true
    }

    /// Swap in a whole new raster for the layer.
    pub fn replace_pixels(&mut self, id: &LayerId, raster: RgbaImage) -> bool {
        self.update(
            id,
            LayerPatch {
                pixels: Some(LayerPixels::ready(raster)),
                ..Default::default()
            },
        )
    }

    /// Delete the layer. If it was active, no layer is active afterwards.
    pub fn remove(&mut self, id: &LayerId) -> Option<Layer> {
        let idx = self.layers.iter().position(|l| &l.id == id)?;
        let layer = self.layers.remove(idx);
        if self.active.as_ref() == Some(id) {
            self.active = None;
        }
        log::debug!("Removed layer '{}' ({})", layer.name, id);
        Some(layer)
    }

    /// Assign `order = position` to each id in `ids` (first = bottom).
    ///
    /// Unknown and repeated ids are skipped. Layers not named in `ids` keep
    /// their relative stacking and are placed above the listed ones.
    pub fn reorder(&mut self, ids: &[LayerId]) {
        let mut placed: Vec<LayerId> = Vec::with_capacity(self.layers.len());
        for id in ids {
            if !placed.contains(id) && self.get(id).is_some() {
                placed.push(id.clone());
            }
        }
        let rest: Vec<LayerId> = self
            .layers_bottom_to_top()
            .into_iter()
            .filter(|l| !placed.contains(&l.id))
            .map(|l| l.id.clone())
            .collect();
        for (pos, id) in placed.iter().chain(rest.iter()).enumerate() {
            if let Some(layer) = self.get_mut(id) {
                layer.order = pos as i64;
            }
        }
    }

    /// Swap order with the next layer up. Returns `false` if `id` is unknown
    /// or already on top.
    pub fn move_up(&mut self, id: &LayerId) -> bool {
        self.swap_with_neighbour(id, true)
    }

    /// Swap order with the next layer down.
    pub fn move_down(&mut self, id: &LayerId) -> bool {
        self.swap_with_neighbour(id, false)
    }

    fn swap_with_neighbour(&mut self, id: &LayerId, up: bool) -> bool {
        let Some(order) = self.get(id).map(|l| l.order) else {
            return false;
        };
        let neighbour = self
            .layers
            .iter()
            .filter(|l| if up { l.order > order } else { l.order < order })
            .min_by_key(|l| (l.order - order).abs())
            .map(|l| (l.id.clone(), l.order));
        let Some((other_id, other_order)) = neighbour else {
            return false;
        };
        if let Some(l) = self.get_mut(id) {
            l.order = other_order;
        }
        if let Some(l) = self.get_mut(&other_id) {
            l.order = order;
        }
        true
    }

    /// Copy a layer as "`name` (Copy)" directly above it and make the copy
    /// active. Layers above the source move up by one.
    pub fn duplicate(&mut self, id: &LayerId) -> Option<LayerId> {
        let source = self.get(id)?;
        let mut copy = source.clone();
        copy.id = LayerId::new();
        copy.name = format!("{} (Copy)", source.name);
        copy.order = source.order + 1;
        let source_order = source.order;
        for layer in self.layers.iter_mut().filter(|l| l.order > source_order) {
            layer.order += 1;
        }
        Some(self.insert(copy))
    }

    pub fn active_id(&self) -> Option<&LayerId> {
        self.active.as_ref()
    }

    pub fn active(&self) -> Option<&Layer> {
        self.active.as_ref().and_then(|id| self.get(id))
    }

    /// Make `id` active; unknown ids clear the active layer.
    pub fn set_active(&mut self, id: Option<&LayerId>) {
        self.active = id.filter(|id| self.get(id).is_some()).cloned();
    }

    /// Every layer sorted ascending by order.
    pub fn layers_bottom_to_top(&self) -> Vec<&Layer> {
        let mut sorted: Vec<&Layer> = self.layers.iter().collect();
        sorted.sort_by_key(|l| l.order);
        sorted
    }

    /// Visible layers sorted ascending by order. This is the sequence the
    /// compositor flattens.
    pub fn visible_layers_bottom_to_top(&self) -> Vec<&Layer> {
        let mut sorted: Vec<&Layer> = self.layers.iter().filter(|l| l.visible).collect();
        sorted.sort_by_key(|l| l.order);
        sorted
    }

    /// Topmost visible layer with a non-transparent pixel at `(x, y)`.
    pub fn hit_test(&self, x: u32, y: u32) -> Option<&Layer> {
        self.visible_layers_bottom_to_top()
            .into_iter()
            .rev()
            .find(|l| {
                l.raster()
                    .filter(|r| x < r.width() && y < r.height())
                    .is_some_and(|r| r.get_pixel(x, y)[3] > 0)
            })
    }
}
