//! Screen-to-canvas mapping and the zoom/pan state that positions the
//! canvas on screen.

use crate::components::tools::Tool;

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 5.0;
pub const ZOOM_STEP: f32 = 0.1;

/// On-screen bounding rectangle of the drawing surface, after pan and zoom.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl SurfaceRect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self { left, top, width, height }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.left + self.width * 0.5, self.top + self.height * 0.5)
    }
}

/// Maps pointer positions to canvas pixels.
///
/// The displayed rectangle already encodes pan and zoom, so mapping is a
/// plain offset and rescale; no inverse transform is needed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoordinateMapper {
    pub intrinsic_width: u32,
    pub intrinsic_height: u32,
}

impl CoordinateMapper {
    pub fn new(intrinsic_width: u32, intrinsic_height: u32) -> Self {
        Self { intrinsic_width, intrinsic_height }
    }

    /// Canvas coordinates of the screen point, or `None` while the surface
    /// has no displayed area.
    pub fn to_canvas(&self, rect: &SurfaceRect, screen_x: f32, screen_y: f32) -> Option<(f32, f32)> {
        if rect.width <= 0.0 || rect.height <= 0.0 {
            return None;
        }
        let scale_x = self.intrinsic_width as f32 / rect.width;
        let scale_y = self.intrinsic_height as f32 / rect.height;
        Some(((screen_x - rect.left) * scale_x, (screen_y - rect.top) * scale_y))
    }
}

/// Zoom level and pan offset of the canvas inside its container.
#[derive(Clone, Debug, PartialEq)]
pub struct Viewport {
    pub zoom: f32,
    pub pan: (f32, f32),
    /// Pointer position minus pan, captured when a pan starts.
    pan_anchor: Option<(f32, f32)>,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: (0.0, 0.0),
            pan_anchor: None,
        }
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_zoom(&mut self, zoom: f32) {
        // One decimal place keeps repeated steps from drifting
        self.zoom = ((zoom * 10.0).round() / 10.0).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom + ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom - ZOOM_STEP);
    }

    /// One discrete wheel/gesture event; negative `delta` zooms in.
    pub fn zoom_by_wheel(&mut self, delta: f32) {
        if delta < 0.0 {
            self.zoom_in();
        } else if delta > 0.0 {
            self.zoom_out();
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Panning happens with the move tool or while the secondary button is
    /// held, regardless of tool.
    pub fn should_pan(tool: Tool, secondary_button: bool) -> bool {
        tool == Tool::Move || secondary_button
    }

    pub fn is_panning(&self) -> bool {
        self.pan_anchor.is_some()
    }

    pub fn begin_pan(&mut self, pointer: (f32, f32)) {
        self.pan_anchor = Some((pointer.0 - self.pan.0, pointer.1 - self.pan.1));
    }

    pub fn update_pan(&mut self, pointer: (f32, f32)) {
        if let Some((ax, ay)) = self.pan_anchor {
            self.pan = (pointer.0 - ax, pointer.1 - ay);
        }
    }

    pub fn end_pan(&mut self) {
        self.pan_anchor = None;
    }

    /// Where a canvas of `width` x `height` lands inside `container`:
    /// centred, shifted by the pan offset, scaled by zoom.
    pub fn displayed_rect(&self, container: &SurfaceRect, width: u32, height: u32) -> SurfaceRect {
        let w = width as f32 * self.zoom;
        let h = height as f32 * self.zoom;
        let (cx, cy) = container.center();
        SurfaceRect::new(cx + self.pan.0 - w * 0.5, cy + self.pan.1 - h * 0.5, w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_mapping_is_raw_offset() {
        let mapper = CoordinateMapper::new(200, 100);
        let rect = SurfaceRect::new(30.0, 40.0, 200.0, 100.0);
        assert_eq!(mapper.to_canvas(&rect, 30.0, 40.0), Some((0.0, 0.0)));
        assert_eq!(mapper.to_canvas(&rect, 75.0, 90.0), Some((45.0, 50.0)));
    }

    #[test]
    fn zoomed_rect_scales() {
        let mapper = CoordinateMapper::new(100, 100);
        let rect = SurfaceRect::new(0.0, 0.0, 200.0, 50.0);
        assert_eq!(mapper.to_canvas(&rect, 100.0, 25.0), Some((50.0, 50.0)));
        assert_eq!(mapper.to_canvas(&SurfaceRect::new(0.0, 0.0, 0.0, 10.0), 1.0, 1.0), None);
    }

    #[test]
    fn zoom_is_clamped_and_stepped() {
        let mut vp = Viewport::new();
        for _ in 0..100 {
            vp.zoom_in();
        }
        assert_eq!(vp.zoom, MAX_ZOOM);
        for _ in 0..100 {
            vp.zoom_out();
        }
        assert_eq!(vp.zoom, MIN_ZOOM);
        vp.reset();
        vp.zoom_by_wheel(-1.0);
        assert_eq!(vp.zoom, 1.1);
    }

    #[test]
    fn pan_follows_pointer_from_anchor() {
        let mut vp = Viewport::new();
        vp.pan = (5.0, 5.0);
        vp.begin_pan((100.0, 100.0));
        vp.update_pan((130.0, 90.0));
        assert_eq!(vp.pan, (35.0, -5.0));
        vp.end_pan();
        vp.update_pan((0.0, 0.0));
        assert_eq!(vp.pan, (35.0, -5.0));
        assert!(Viewport::should_pan(Tool::Move, false));
        assert!(Viewport::should_pan(Tool::Brush, true));
        assert!(!Viewport::should_pan(Tool::Brush, false));
    }

    #[test]
    fn displayed_rect_round_trips_through_mapper() {
        let mut vp = Viewport::new();
        vp.zoom = 2.0;
        vp.pan = (10.0, -20.0);
        let container = SurfaceRect::new(0.0, 0.0, 800.0, 600.0);
        let rect = vp.displayed_rect(&container, 100, 50);
        assert_eq!(rect, SurfaceRect::new(310.0, 230.0, 200.0, 100.0));
        let mapper = CoordinateMapper::new(100, 50);
        assert_eq!(mapper.to_canvas(&rect, 410.0, 280.0), Some((50.0, 25.0)));
    }
}
