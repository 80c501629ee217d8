use image::{Rgba, RgbaImage};

use crate::canvas::{blank, blend_pixel, has_visible_pixels, BlendMode, Layer, LayerId, LayerKind, TRANSPARENT};
use crate::components::layers::LayerStore;
use crate::ops::shapes::{rasterize_outline, PlacedShape, ShapeKind};
use crate::viewport::{CoordinateMapper, SurfaceRect};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    #[default]
    Brush,
    Eraser,
    Rectangle,
    Ellipse,
    /// Handled by the host UI; the overlay ignores it.
    Select,
    /// Pans the view; the overlay ignores it.
    Move,
}

impl Tool {
    /// Whether pointer input with this tool goes through the drawing overlay.
    pub fn draws(&self) -> bool {
        matches!(self, Tool::Brush | Tool::Eraser | Tool::Rectangle | Tool::Ellipse)
    }

    /// Name given to layers committed by this tool.
    pub fn layer_name(&self) -> &'static str {
        match self {
            Tool::Brush => "Brush Stroke",
            Tool::Eraser => "Eraser",
            Tool::Rectangle => "Rectangle",
            Tool::Ellipse => "Ellipse",
            Tool::Select => "Selection",
            Tool::Move => "Move",
        }
    }

    fn shape(&self) -> Option<ShapeKind> {
        match self {
            Tool::Rectangle => Some(ShapeKind::Rectangle),
            Tool::Ellipse => Some(ShapeKind::Ellipse),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolSettings {
    pub color: Rgba<u8>,
    /// Brush/eraser diameter in canvas pixels.
    pub brush_size: f32,
    /// Outline width for rectangle and ellipse.
    pub stroke_width: f32,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            color: Rgba([0, 0, 0, 255]),
            brush_size: 5.0,
            stroke_width: 3.0,
        }
    }
}

/// In-progress stroke. Never persisted.
#[derive(Clone, Debug)]
pub struct Stroke {
    pub tool: Tool,
    pub anchor: (f32, f32),
    pub last: (f32, f32),
    /// Layer the eraser loaded at pointer-down.
    pub target: Option<LayerId>,
}

#[derive(Clone, Debug, Default)]
enum OverlayState {
    #[default]
    Idle,
    Drawing(Stroke),
}

/// Result of ending a stroke.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing was drawn, or no stroke was in progress.
    Nothing,
    /// A new layer holding the stroke was appended on top.
    Created(LayerId),
    /// The erased raster replaced this layer's pixels.
    Erased(LayerId),
    /// Erasing finished but there was no active layer to write back to.
    NoActiveLayer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

/// Raw pointer input in screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Down { x: f32, y: f32, button: PointerButton },
    Move { x: f32, y: f32 },
    Up { x: f32, y: f32 },
    Leave,
}

/// Live drawing surface layered over the canvas.
///
/// Idle until a pointer-down with a drawing tool; then every move updates
/// the overlay buffer, and pointer-up or leaving the canvas commits it into
/// the layer store.
#[derive(Clone, Debug)]
pub struct DrawingOverlay {
    width: u32,
    height: u32,
    tool: Tool,
    pub settings: ToolSettings,
    buffer: RgbaImage,
    state: OverlayState,
}

impl DrawingOverlay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tool: Tool::default(),
            settings: ToolSettings::default(),
            buffer: blank(width, height),
            state: OverlayState::Idle,
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switch tools. A stroke in progress is discarded, not committed.
    pub fn set_tool(&mut self, tool: Tool) {
        if self.is_drawing() {
            log::debug!("Discarding {:?} stroke on tool change", self.tool);
            self.reset_buffer();
            self.state = OverlayState::Idle;
        }
        self.tool = tool;
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, OverlayState::Drawing(_))
    }

    pub fn stroke(&self) -> Option<&Stroke> {
        match &self.state {
            OverlayState::Drawing(stroke) => Some(stroke),
            OverlayState::Idle => None,
        }
    }

    /// Current overlay pixels, for preview.
    pub fn buffer(&self) -> &RgbaImage {
        &self.buffer
    }

    /// Match the overlay to a new canvas size. Any stroke is dropped.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.buffer = blank(width, height);
        self.state = OverlayState::Idle;
    }

    fn reset_buffer(&mut self) {
        self.buffer = blank(self.width, self.height);
    }

    /// Start a stroke at canvas point `point`. Returns `false` when the
    /// current tool does not draw.
    pub fn pointer_down(&mut self, point: (f32, f32), store: &LayerStore) -> bool {
        if !self.tool.draws() {
            return false;
        }

        let mut target = None;
        if self.tool == Tool::Eraser {
            match store.active() {
                Some(layer) => match layer.raster() {
                    Some(raster) => {
                        // Erase real content rather than an empty buffer
                        self.buffer = raster.clone();
                        target = Some(layer.id.clone());
                    }
                    None => {
                        log::warn!("Active layer '{}' has no usable pixels to erase", layer.name);
                        self.reset_buffer();
                    }
                },
                None => self.reset_buffer(),
            }
        }

        self.state = OverlayState::Drawing(Stroke {
            tool: self.tool,
            anchor: point,
            last: point,
            target,
        });
        true
    }

    /// Extend the stroke to `point`.
    pub fn pointer_move(&mut self, point: (f32, f32)) {
        let OverlayState::Drawing(stroke) = &mut self.state else {
            return;
        };
        let settings = &self.settings;
        match stroke.tool {
            Tool::Brush | Tool::Eraser => {
                let erase = stroke.tool == Tool::Eraser;
                draw_line(&mut self.buffer, stroke.last, point, settings.brush_size, settings.color, erase);
                stroke.last = point;
            }
            Tool::Rectangle | Tool::Ellipse => {
                self.buffer = blank(self.width, self.height);
                if let Some(shape) = stroke.tool.shape().and_then(|kind| {
                    PlacedShape::from_drag(kind, stroke.anchor, point, settings.stroke_width, settings.color)
                }) {
                    rasterize_outline(&mut self.buffer, &shape);
                }
                stroke.last = point;
            }
            Tool::Select | Tool::Move => {}
        }
    }

    /// Finish the stroke and commit it into `store`.
    pub fn pointer_up(&mut self, store: &mut LayerStore) -> CommitOutcome {
        self.commit(store)
    }

    /// The pointer left the canvas mid-stroke; treated exactly like release.
    pub fn pointer_leave(&mut self, store: &mut LayerStore) -> CommitOutcome {
        self.commit(store)
    }

    fn commit(&mut self, store: &mut LayerStore) -> CommitOutcome {
        let OverlayState::Drawing(stroke) = std::mem::take(&mut self.state) else {
            return CommitOutcome::Nothing;
        };

        let outcome = if stroke.tool == Tool::Eraser {
            match stroke.target {
                Some(id) if store.get(&id).is_some() => {
                    let erased = std::mem::replace(&mut self.buffer, blank(self.width, self.height));
                    store.replace_pixels(&id, erased);
                    CommitOutcome::Erased(id)
                }
                _ => {
                    log::warn!("Eraser stroke discarded: no active layer");
                    CommitOutcome::NoActiveLayer
                }
            }
        } else if has_visible_pixels(&self.buffer) {
            let pixels = std::mem::replace(&mut self.buffer, blank(self.width, self.height));
            let id = store.add(Layer::new(stroke.tool.layer_name(), LayerKind::Image, pixels));
            CommitOutcome::Created(id)
        } else {
            CommitOutcome::Nothing
        };

        self.reset_buffer();
        outcome
    }

    /// Route a screen-space pointer event through `mapper`.
    ///
    /// Events that map to no canvas point (zero-sized surface) are dropped,
    /// except release and leave which always end the stroke.
    pub fn handle(
        &mut self,
        event: PointerEvent,
        mapper: &CoordinateMapper,
        rect: &SurfaceRect,
        store: &mut LayerStore,
    ) -> CommitOutcome {
        match event {
            PointerEvent::Down { x, y, button: PointerButton::Primary } => {
                if let Some(point) = mapper.to_canvas(rect, x, y) {
                    self.pointer_down(point, store);
                }
                CommitOutcome::Nothing
            }
            PointerEvent::Down { .. } => CommitOutcome::Nothing,
            PointerEvent::Move { x, y } => {
                if let Some(point) = mapper.to_canvas(rect, x, y) {
                    self.pointer_move(point);
                }
                CommitOutcome::Nothing
            }
            PointerEvent::Up { x, y } => {
                if let Some(point) = mapper.to_canvas(rect, x, y) {
                    self.pointer_move(point);
                }
                self.pointer_up(store)
            }
            PointerEvent::Leave => self.pointer_leave(store),
        }
    }
}

/// Stamp hard round dabs of diameter `size` along the segment.
/// `erase` clears pixels (destination-out) instead of painting.
fn draw_line(
    img: &mut RgbaImage,
    start: (f32, f32),
    end: (f32, f32),
    size: f32,
    color: Rgba<u8>,
    erase: bool,
) {
    let dx = end.0 - start.0;
    let dy = end.1 - start.1;
    let distance = (dx * dx + dy * dy).sqrt();

    if distance < 0.1 {
        draw_circle(img, start, size, color, erase);
        return;
    }

    // Dense sub-pixel stepping for smooth lines
    let steps = distance.ceil() as usize;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        draw_circle(img, (start.0 + dx * t, start.1 + dy * t), size, color, erase);
    }
}

fn draw_circle(img: &mut RgbaImage, pos: (f32, f32), size: f32, color: Rgba<u8>, erase: bool) {
    let (width, height) = img.dimensions();
    let radius = size / 2.0;
    let radius_sq = radius * radius;
    if radius_sq < 0.001 || width == 0 || height == 0 {
        return;
    }
    let (cx, cy) = pos;
    if cx + radius < 0.0 || cy + radius < 0.0 {
        return;
    }

    let min_x = (cx - radius).max(0.0) as u32;
    let max_x = ((cx + radius) as u32).min(width - 1);
    let min_y = (cy - radius).max(0.0) as u32;
    let max_y = ((cy + radius) as u32).min(height - 1);
    if min_x > max_x || min_y > max_y {
        return;
    }

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let px = x as f32 + 0.5 - cx;
            let py = y as f32 + 0.5 - cy;
            if px * px + py * py > radius_sq {
                continue;
            }
            let dst = img.get_pixel_mut(x, y);
            if erase {
                *dst = TRANSPARENT;
            } else {
                *dst = blend_pixel(*dst, color, BlendMode::Normal, 1.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_active(raster: RgbaImage) -> (LayerStore, LayerId) {
        let mut store = LayerStore::new();
        let id = store.add(Layer::new("base", LayerKind::Image, raster));
        (store, id)
    }

    #[test]
    fn rectangle_drag_draws_border_only() {
        let mut store = LayerStore::new();
        let mut overlay = DrawingOverlay::new(200, 200);
        overlay.set_tool(Tool::Rectangle);
        assert!(overlay.pointer_down((10.0, 10.0), &store));
        overlay.pointer_move((60.0, 40.0));
        overlay.pointer_move((100.0, 100.0));
        assert_eq!(overlay.buffer().get_pixel(50, 50)[3], 0);
        assert!(overlay.buffer().get_pixel(10, 50)[3] > 0);
        // Earlier preview positions are not kept
        assert_eq!(overlay.buffer().get_pixel(60, 25)[3], 0);

        let CommitOutcome::Created(id) = overlay.pointer_up(&mut store) else {
            panic!("expected a new layer");
        };
        let layer = store.get(&id).unwrap();
        assert_eq!(layer.name, "Rectangle");
        assert!(layer.raster().unwrap().get_pixel(10, 50)[3] > 0);
        assert!(!has_visible_pixels(overlay.buffer()));
        assert!(!overlay.is_drawing());
    }

    #[test]
    fn zero_area_shape_commits_nothing() {
        let mut store = LayerStore::new();
        let mut overlay = DrawingOverlay::new(50, 50);
        overlay.set_tool(Tool::Ellipse);
        overlay.pointer_down((20.0, 20.0), &store);
        overlay.pointer_move((20.0, 20.0));
        assert_eq!(overlay.pointer_leave(&mut store), CommitOutcome::Nothing);
        assert!(store.is_empty());
    }

    #[test]
    fn brush_stroke_becomes_top_layer() {
        let (mut store, base) = store_with_active(RgbaImage::new(40, 40));
        let mut overlay = DrawingOverlay::new(40, 40);
        overlay.settings.color = Rgba([255, 0, 0, 255]);
        overlay.pointer_down((5.0, 20.0), &store);
        overlay.pointer_move((35.0, 20.0));
        let CommitOutcome::Created(id) = overlay.pointer_leave(&mut store) else {
            panic!("expected a new layer");
        };
        let top = store.get(&id).unwrap();
        assert!(top.order > store.get(&base).unwrap().order);
        assert_eq!(*top.raster().unwrap().get_pixel(20, 20), Rgba([255, 0, 0, 255]));
        assert_eq!(top.raster().unwrap().get_pixel(20, 35)[3], 0);
    }

    #[test]
    fn eraser_rewrites_active_layer() {
        let (mut store, base) = store_with_active(RgbaImage::from_pixel(30, 30, Rgba([0, 0, 255, 255])));
        let mut overlay = DrawingOverlay::new(30, 30);
        overlay.set_tool(Tool::Eraser);
        overlay.settings.brush_size = 6.0;
        overlay.pointer_down((2.0, 15.0), &store);
        overlay.pointer_move((28.0, 15.0));
        assert_eq!(overlay.pointer_up(&mut store), CommitOutcome::Erased(base.clone()));
        let raster = store.get(&base).unwrap().raster().unwrap();
        assert_eq!(raster.get_pixel(15, 15)[3], 0);
        assert_eq!(raster.get_pixel(15, 2)[3], 255);
        assert_eq!(store.len(), 1);
        assert_eq!(overlay.buffer().dimensions(), (30, 30));
    }

    #[test]
    fn eraser_without_active_layer_warns() {
        let (mut store, base) = store_with_active(RgbaImage::new(10, 10));
        store.set_active(None);
        let mut overlay = DrawingOverlay::new(10, 10);
        overlay.set_tool(Tool::Eraser);
        overlay.pointer_down((1.0, 1.0), &store);
        assert_eq!(overlay.pointer_up(&mut store), CommitOutcome::NoActiveLayer);
        assert!(store.get(&base).is_some());
    }

    #[test]
    fn non_drawing_tools_are_ignored() {
        let mut store = LayerStore::new();
        let mut overlay = DrawingOverlay::new(10, 10);
        overlay.set_tool(Tool::Move);
        assert!(!overlay.pointer_down((1.0, 1.0), &store));
        assert_eq!(overlay.pointer_up(&mut store), CommitOutcome::Nothing);
    }

    #[test]
    fn tool_change_discards_stroke() {
        let mut store = LayerStore::new();
        let mut overlay = DrawingOverlay::new(20, 20);
        overlay.pointer_down((1.0, 1.0), &store);
        overlay.pointer_move((15.0, 15.0));
        overlay.set_tool(Tool::Ellipse);
        assert!(!overlay.is_drawing());
        assert_eq!(overlay.pointer_up(&mut store), CommitOutcome::Nothing);
        assert!(store.is_empty());
    }

    #[test]
    fn handle_maps_screen_points() {
        let mut store = LayerStore::new();
        let mut overlay = DrawingOverlay::new(100, 100);
        overlay.set_tool(Tool::Rectangle);
        let mapper = CoordinateMapper::new(100, 100);
        let rect = SurfaceRect::new(50.0, 50.0, 200.0, 200.0);
        overlay.handle(PointerEvent::Down { x: 70.0, y: 70.0, button: PointerButton::Primary }, &mapper, &rect, &mut store);
        overlay.handle(PointerEvent::Move { x: 170.0, y: 170.0 }, &mapper, &rect, &mut store);
        let outcome = overlay.handle(PointerEvent::Up { x: 170.0, y: 170.0 }, &mapper, &rect, &mut store);
        let CommitOutcome::Created(id) = outcome else {
            panic!("expected a new layer");
        };
        // Canvas rectangle (10,10)-(60,60)
        let raster = store.get(&id).unwrap().raster().unwrap();
        assert!(raster.get_pixel(10, 30)[3] > 0);
        assert_eq!(raster.get_pixel(30, 30)[3], 0);
    }
}
